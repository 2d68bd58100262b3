use kube::runtime::reflector::ObjectRef;
use kube::Resource;

pub fn get_object_ref_from_name<K: Resource>(
    name: impl AsRef<str>,
    ns: Option<impl AsRef<str>>,
) -> ObjectRef<K>
where
    K::DynamicType: Default,
{
    let object_ref = ObjectRef::new(name.as_ref());
    match ns {
        Some(ns) => object_ref.within(ns.as_ref()),
        None => object_ref,
    }
}

#[macro_export]
macro_rules! instrumented {
    ($span:expr, $($tt:tt)+) => {{
        use ::tracing::Instrument;

        let span = $span;
        {
            $($tt)*
        }
        .instrument(span)
    }}
}

#[macro_export]
macro_rules! try_some {
    (@coalesce ($($h:tt)*)) => {
        $($h)*
    };
    (@coalesce ($($h:tt)*) ? $($t:tt)*) => {
        $crate::try_some!(@coalesce ($($h)*.as_ref()?) $($t)*)
    };
    (@coalesce ($($h:tt)*) $m:tt $($t:tt)*) => {
        $crate::try_some!(@coalesce ($($h)* $m) $($t)*)
    };

    (& $($tt:tt)*) => {
        {
            fn call<R>(f: impl FnOnce() ->::std::option::Option<R>) -> ::std::option::Option<R> {
                f()
            }
            call(|| {
                ::std::option::Option::Some(&$crate::try_some!(@coalesce () $($tt)*))
            })
        }
    };
    ($($tt:tt)*) => {
        {
            fn call<R>(f: impl FnOnce() ->::std::option::Option<R>) -> ::std::option::Option<R> {
                f()
            }
            call(|| {
                ::std::option::Option::Some($crate::try_some!(@coalesce () $($tt)*))
            })
        }
    };
}

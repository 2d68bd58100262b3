use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::debug;

use crate::client::ClusterClient;
use crate::error_codes::is_404_not_found_error;
use crate::error_types::Bug;
use crate::report::{warn_report_for, EventReporter};
use crate::try_some;

#[derive(Debug, Error)]
pub enum DeleteExpiringPodsError {
    #[error("delete pod {pod}")]
    DeletePod {
        pod: ObjectRef<Pod>,
        source: kube::Error,
    },
    #[error(transparent)]
    Bug(#[from] Bug),
}

impl DeleteExpiringPodsError {
    pub fn kube_error(&self) -> Option<&kube::Error> {
        match self {
            DeleteExpiringPodsError::DeletePod { source, .. } => Some(source),
            DeleteExpiringPodsError::Bug(_) => None,
        }
    }
}

/// The latest moment the pod can be deleted and still get its whole grace period before the
/// node goes away. `None` if the pod doesn't configure a grace period.
pub fn pod_delete_time(deadline: DateTime<Utc>, pod: &Pod) -> Option<DateTime<Utc>> {
    let grace_period_seconds = *try_some!(pod.spec?.termination_grace_period_seconds?)?;
    let grace_period = TimeDelta::try_seconds(grace_period_seconds)?;
    deadline.checked_sub_signed(grace_period)
}

/// Whatever is left until the deadline, in whole seconds.
pub fn clamped_grace_period_seconds(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let remaining = (deadline - now).num_seconds().max(0);
    u32::try_from(remaining).unwrap_or(u32::MAX)
}

/// Deletes the pods that can no longer finish their grace period before `deadline`, granting
/// them what's left. Returns the pods that are deleted or already gone, so they aren't also
/// evicted in the same pass.
pub async fn delete_expiring_pods<C>(
    client: &C,
    reporter: &dyn EventReporter,
    pods: &[&Pod],
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<ObjectRef<Pod>>, DeleteExpiringPodsError>
where
    C: ClusterClient + ?Sized,
{
    let mut deleted = Vec::new();
    for pod in pods {
        let Some(delete_time) = pod_delete_time(deadline, pod) else {
            continue;
        };
        if now <= delete_time {
            continue;
        }

        let (Some(namespace), Some(name)) = (pod.namespace(), pod.meta().name.clone()) else {
            return Err(Bug {
                message: String::from("pod without a namespace or a name"),
                source: None,
            }
            .into());
        };

        let grace_period_seconds = clamped_grace_period_seconds(deadline, now);
        let configured = try_some!(pod.spec?.termination_grace_period_seconds?)
            .copied()
            .unwrap_or_default();
        warn_report_for(
            reporter,
            &pod.object_ref(&()),
            "Delete",
            "Disrupted",
            format!(
                "Node is terminating at {}. Deleting the pod with grace period {}s instead of {}s",
                deadline.to_rfc3339(),
                grace_period_seconds,
                configured
            ),
        )
        .await;

        match client
            .delete_pod(&namespace, &name, grace_period_seconds)
            .await
        {
            Ok(()) => deleted.push(ObjectRef::from_obj(*pod)),
            Err(err) if is_404_not_found_error(&err) => {
                debug!(pod = %name, %namespace, "pod is already gone");
                deleted.push(ObjectRef::from_obj(*pod));
            }
            Err(source) => {
                return Err(DeleteExpiringPodsError::DeletePod {
                    pod: ObjectRef::from_obj(*pod),
                    source,
                });
            }
        }
    }

    Ok(deleted)
}

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

/// Hands pods to the eviction worker.
///
/// `add` must not block. The worker owns retries and keeps at most one eviction attempt in flight
/// per pod, so adding an already queued pod is fine.
pub trait EvictionQueue: Send + Sync {
    fn add(&self, pods: &[&Pod]);
}

impl EvictionQueue for UnboundedSender<ObjectRef<Pod>> {
    fn add(&self, pods: &[&Pod]) {
        for pod in pods {
            let object_ref = ObjectRef::from_obj(*pod);
            trace!(%object_ref, "queueing eviction");
            if self.send(object_ref).is_err() {
                warn!("eviction queue is closed");
                return;
            }
        }
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, error, info, span, Level};

use crate::client::ClusterClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error_codes::{is_409_conflict_error, is_transient_error};
use crate::error_types::Bug;
use crate::evict::evict;
use crate::eviction_queue::EvictionQueue;
use crate::grace_period::{delete_expiring_pods, DeleteExpiringPodsError};
use crate::instrumented;
use crate::owner::{OwnerChainResolver, OwnerResolveError};
use crate::pod_state::{is_evictable, is_terminating, is_waiting_eviction};
use crate::report::EventReporter;
use crate::restart::{plan_restarts, restart_deployments, RestartDeploymentsError, RestartRecords};
use crate::taint::{build_taint_patch, with_disruption_taint};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrainStatus {
    Complete,
    /// Pods on the node the drain still waits for.
    Incomplete { waiting: usize },
}

impl DrainStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, DrainStatus::Complete)
    }
}

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("list pods")]
    ListPods(#[source] kube::Error),
    #[error("resolve pod owner")]
    ResolveOwner(#[from] OwnerResolveError),
    #[error("delete expiring pods")]
    DeleteExpiringPods(#[from] DeleteExpiringPodsError),
    #[error("restart deployments")]
    RestartDeployments(#[from] RestartDeploymentsError),
    #[error(transparent)]
    Bug(#[from] Bug),
}

impl DrainError {
    fn kube_errors(&self) -> Vec<&kube::Error> {
        match self {
            DrainError::ListPods(err) => vec![err],
            DrainError::ResolveOwner(err) => err.kube_error().into_iter().collect(),
            DrainError::DeleteExpiringPods(err) => err.kube_error().into_iter().collect(),
            DrainError::RestartDeployments(err) => {
                err.failures.iter().map(|(_, err)| err).collect()
            }
            DrainError::Bug(_) => Vec::new(),
        }
    }

    /// Worth retrying on the next pass without anyone looking into it.
    pub fn is_transient(&self) -> bool {
        let errors = self.kube_errors();
        !errors.is_empty()
            && errors
                .into_iter()
                .all(|err| is_transient_error(err) || is_409_conflict_error(err))
    }

    pub fn is_conflict(&self) -> bool {
        self.kube_errors()
            .into_iter()
            .any(is_409_conflict_error)
    }
}

/// Drives nodes out of service.
///
/// `taint` once when the disruption begins, then `drain` until it reports [`DrainStatus::Complete`].
/// Both are safe to repeat. Distinct nodes can be drained concurrently through a shared
/// `Terminator`.
pub struct Terminator<C> {
    client: C,
    eviction_queue: Arc<dyn EvictionQueue>,
    reporter: Arc<dyn EventReporter>,
    clock: Arc<dyn Clock>,
    config: Config,
    restart_records: RestartRecords,
}

impl<C> Terminator<C>
where
    C: ClusterClient,
{
    pub fn new(
        client: C,
        eviction_queue: Arc<dyn EvictionQueue>,
        reporter: Arc<dyn EventReporter>,
        config: Config,
    ) -> Self {
        Self::with_clock(
            client,
            eviction_queue,
            reporter,
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn with_clock(
        client: C,
        eviction_queue: Arc<dyn EvictionQueue>,
        reporter: Arc<dyn EventReporter>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            client,
            eviction_queue,
            reporter,
            clock,
            config,
            restart_records: RestartRecords::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn restart_records(&self) -> &RestartRecords {
        &self.restart_records
    }

    /// Keeps new pods off the node and takes it out of external load balancers.
    ///
    /// The node is patched only if it's missing the taint or the label. A node that changed since
    /// `node` was read fails with a conflict. Read the node again and retry with the fresh copy.
    pub async fn taint(&self, node: &Node, taint: &Taint) -> kube::Result<()> {
        let node_name = node.name_any();
        instrumented!(span!(Level::INFO, "taint", node = %node_name), async {
            self.taint_impl(&node_name, node, taint).await
        })
        .await
    }

    async fn taint_impl(&self, node_name: &str, node: &Node, taint: &Taint) -> kube::Result<()> {
        let desired = with_disruption_taint(node, taint);
        if &desired == node {
            debug!("node is already tainted");
            return Ok(());
        }

        let patch = build_taint_patch(&desired);
        self.client.patch_node(node_name, &patch).await?;

        info!(
            taint.key = %taint.key,
            taint.value = taint.value.as_deref().unwrap_or_default(),
            taint.effect = %taint.effect,
            "tainted node"
        );
        Ok(())
    }

    /// One pass of draining `node`.
    ///
    /// Deployments with all of their replicas on the node are restarted. If the node has a
    /// `deadline`, pods that can't finish their grace period by then are deleted with what's left
    /// of it. The first non-empty eviction tier of the remaining pods is handed to the eviction
    /// queue.
    pub async fn drain(
        &self,
        node: &Node,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<DrainStatus, DrainError> {
        let node_name = node.name_any();
        let result = instrumented!(span!(Level::INFO, "drain", node = %node_name), async {
            self.drain_impl(node, deadline).await
        })
        .await;

        if let Err(err) = result.as_ref() {
            log_drain_error(&node_name, err);
        }

        result
    }

    async fn drain_impl(
        &self,
        node: &Node,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<DrainStatus, DrainError> {
        let node_name = node.metadata.name.as_deref().ok_or_else(|| Bug {
            message: String::from("node without a name"),
            source: None,
        })?;
        let disruption_taint = self.config.disruption_taint();

        let pods = self
            .client
            .list_pods_on_node(node_name)
            .await
            .map_err(DrainError::ListPods)?;

        let mut resolver = OwnerChainResolver::new(&self.client);
        let plan = plan_restarts(&pods, node_name, &mut resolver, &self.restart_records).await?;

        let mut deleted = HashSet::<ObjectRef<Pod>>::new();
        if let Some(deadline) = deadline {
            let now = self.clock.now();
            let expiring: Vec<&Pod> = plan
                .drain
                .iter()
                .copied()
                .filter(|pod| {
                    is_waiting_eviction(
                        pod,
                        &disruption_taint,
                        now,
                        self.config.stuck_terminating_after,
                    ) && !is_terminating(pod)
                })
                .collect();

            deleted.extend(
                delete_expiring_pods(
                    &self.client,
                    self.reporter.as_ref(),
                    &expiring,
                    deadline,
                    now,
                )
                .await?,
            );
            if !deleted.is_empty() {
                debug!(deleted = deleted.len(), %deadline, "deleted pods running out of time");
            }
        }

        let restarted = restart_deployments(
            &self.client,
            self.reporter.as_ref(),
            &plan.restart,
            node_name,
            &self.restart_records,
        )
        .await?;
        if restarted > 0 {
            debug!(restarted, "restarted deployments");
        }

        let evictable = plan
            .drain
            .iter()
            .copied()
            .filter(|pod| is_evictable(pod, &disruption_taint))
            .filter(|pod| !deleted.contains(&ObjectRef::from_obj(*pod)));
        if let Some(tier) = evict(self.eviction_queue.as_ref(), evictable, &self.config) {
            debug!(%tier, "submitted eviction tier");
        }

        let now = self.clock.now();
        let waiting = pods
            .iter()
            .filter(|pod| {
                is_waiting_eviction(
                    pod,
                    &disruption_taint,
                    now,
                    self.config.stuck_terminating_after,
                )
            })
            .count();

        if waiting > 0 {
            debug!(waiting, "pods are still on the node");
            return Ok(DrainStatus::Incomplete { waiting });
        }

        self.restart_records.clear(node_name);
        info!("drained node");
        Ok(DrainStatus::Complete)
    }
}

fn log_drain_error(node_name: &str, err: &DrainError) {
    if err.is_conflict() {
        debug!(node = node_name, %err, "conflict on drain");
    } else if err.is_transient() {
        debug!(node = node_name, %err, "transient error on drain");
    } else {
        error!(node = node_name, ?err, "error on drain");
    }
}

//! Restarting a deployment moves all of its pods off the node at once, through the deployment's
//! own rollout strategy, rather than evicting them one at a time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;
use thiserror::Error;
use tracing::{debug, trace};

use crate::client::ClusterClient;
use crate::consts::RESTARTED_FOR_NODE_ANNOTATION_KEY;
use crate::owner::{OwnerChainResolver, OwnerResolveError};
use crate::report::{report_for, EventReporter};
use crate::try_some;

/// Deployments restarted for each node, since the node's drain began.
///
/// A cache over the marker annotation. Losing it only costs a redundant read of the marker.
#[derive(Debug, Default)]
pub struct RestartRecords {
    records: Mutex<HashMap<String, HashSet<ObjectRef<Deployment>>>>,
}

impl RestartRecords {
    pub fn contains(&self, node_name: &str, deployment: &ObjectRef<Deployment>) -> bool {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .get(node_name)
            .is_some_and(|deployments| deployments.contains(deployment))
    }

    pub fn insert(&self, node_name: &str, deployment: ObjectRef<Deployment>) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(node_name.to_owned())
            .or_default()
            .insert(deployment);
    }

    pub fn clear(&self, node_name: &str) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(node_name);
    }

    pub fn deployments_for(&self, node_name: &str) -> HashSet<ObjectRef<Deployment>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(node_name).cloned().unwrap_or_default()
    }
}

pub fn restarted_for_node(deployment: &Deployment) -> Option<&str> {
    try_some!(deployment.spec?.template.metadata?.annotations?)
        .and_then(|annotations| annotations.get(RESTARTED_FOR_NODE_ANNOTATION_KEY))
        .map(String::as_str)
}

pub fn is_restarted_for(
    deployment: &Deployment,
    node_name: &str,
    records: &RestartRecords,
) -> bool {
    restarted_for_node(deployment) == Some(node_name)
        || records.contains(node_name, &ObjectRef::from_obj(deployment))
}

/// The API server defaults an unset replica count to 1.
pub fn desired_replicas(deployment: &Deployment) -> i32 {
    try_some!(deployment.spec?.replicas?)
        .copied()
        .unwrap_or(1)
}

#[derive(Debug, Default)]
pub struct RestartPlan<'a> {
    /// Deployments with every replica on the node, in the order their pods were listed.
    pub restart: Vec<Arc<Deployment>>,
    /// Pods left for eviction.
    pub drain: Vec<&'a Pod>,
    /// Pods going away with their deployment's restart.
    pub replaced: Vec<&'a Pod>,
}

/// Splits the pods of a node into the ones replaced by a deployment restart and the ones to drain.
///
/// A deployment is restarted only when all of its desired replicas are on this node: evicting
/// them would take the whole deployment down, while a rollout brings new pods up elsewhere first.
/// A deployment restarted earlier for this node keeps its pods out of the drain set even after
/// the rollout changed its replica distribution.
pub async fn plan_restarts<'a, C>(
    pods: &'a [Pod],
    node_name: &str,
    resolver: &mut OwnerChainResolver<'_, C>,
    records: &RestartRecords,
) -> Result<RestartPlan<'a>, OwnerResolveError>
where
    C: ClusterClient + ?Sized,
{
    let mut resolved = Vec::with_capacity(pods.len());
    let mut tally = HashMap::<ObjectRef<Deployment>, i32>::new();
    for pod in pods {
        let deployment = resolver.resolve_deployment(pod).await?;
        if let Some(deployment) = deployment.as_ref() {
            *tally.entry(ObjectRef::from_obj(deployment.as_ref())).or_default() += 1;
        }
        resolved.push((pod, deployment));
    }

    let mut plan = RestartPlan::default();
    let mut candidates = HashSet::new();
    for (pod, deployment) in resolved {
        let Some(deployment) = deployment else {
            plan.drain.push(pod);
            continue;
        };

        let key = ObjectRef::from_obj(deployment.as_ref());
        let on_node = tally.get(&key).copied().unwrap_or_default();
        if on_node == desired_replicas(&deployment) {
            if candidates.insert(key) {
                plan.restart.push(deployment);
            }
            plan.replaced.push(pod);
        } else if is_restarted_for(&deployment, node_name, records) {
            plan.replaced.push(pod);
        } else {
            plan.drain.push(pod);
        }
    }

    trace!(
        restart = plan.restart.len(),
        drain = plan.drain.len(),
        replaced = plan.replaced.len(),
        "planned restarts"
    );
    Ok(plan)
}

#[derive(Debug, Error)]
#[error("failed to restart {} deployment(s):{}", .failures.len(), format_failures(.failures))]
pub struct RestartDeploymentsError {
    pub failures: Vec<(ObjectRef<Deployment>, kube::Error)>,
}

fn format_failures(failures: &[(ObjectRef<Deployment>, kube::Error)]) -> String {
    failures
        .iter()
        .map(|(deployment, err)| format!(" {deployment}: {err};"))
        .collect()
}

/// Marks each deployment as restarted for the node, which changes its pod template and rolls it
/// out. Every deployment is attempted. Returns the number of deployments updated.
pub async fn restart_deployments<C>(
    client: &C,
    reporter: &dyn EventReporter,
    deployments: &[Arc<Deployment>],
    node_name: &str,
    records: &RestartRecords,
) -> Result<usize, RestartDeploymentsError>
where
    C: ClusterClient + ?Sized,
{
    let mut updated = 0;
    let mut failures = Vec::new();
    for deployment in deployments {
        let key = ObjectRef::from_obj(deployment.as_ref());
        if restarted_for_node(deployment) == Some(node_name) {
            debug!(deployment = %key, "already restarted for the node");
            records.insert(node_name, key);
            continue;
        }

        let mut desired = Deployment::clone(deployment);
        desired
            .spec
            .get_or_insert_with(Default::default)
            .template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(Default::default)
            .insert(
                String::from(RESTARTED_FOR_NODE_ANNOTATION_KEY),
                node_name.to_owned(),
            );

        match client.update_deployment(&desired).await {
            Ok(_) => {
                records.insert(node_name, key);
                updated += 1;
                report_for(
                    reporter,
                    &deployment.object_ref(&()),
                    "RestartDeployment",
                    "RestartDeployment",
                    format!("Restarting the deployment since all of its replicas are on the disrupted node '{node_name}'"),
                )
                .await;
            }
            Err(err) => failures.push((key, err)),
        }
    }

    if failures.is_empty() {
        Ok(updated)
    } else {
        Err(RestartDeploymentsError { failures })
    }
}

//! Walks the controller chain pod -> ReplicaSet -> Deployment.
//!
//! Each hop is a single controller-reference lookup. The resolver memoizes by owner identity, so
//! the pods of one ReplicaSet cost one ReplicaSet read and one Deployment read in total.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use thiserror::Error;
use tracing::trace;

use crate::client::ClusterClient;
use crate::error_types::Bug;
use crate::utils::get_object_ref_from_name;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OwnerKind {
    ReplicaSet,
    Deployment,
    DaemonSet,
    /// Mirror pods of static manifests are owned by their node.
    Node,
    Other(String),
}

impl From<&OwnerReference> for OwnerKind {
    fn from(owner: &OwnerReference) -> Self {
        let group = owner
            .api_version
            .rsplit_once('/')
            .map(|(group, _version)| group)
            .unwrap_or("");

        match (group, owner.kind.as_str()) {
            ("apps", "ReplicaSet") => OwnerKind::ReplicaSet,
            ("apps", "Deployment") => OwnerKind::Deployment,
            ("apps", "DaemonSet") => OwnerKind::DaemonSet,
            ("", "Node") => OwnerKind::Node,
            (_, kind) => OwnerKind::Other(kind.to_owned()),
        }
    }
}

/// The controller of an object, named within the object's namespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Owner {
    ReplicaSet(String),
    Deployment(String),
    Other(OwnerKind),
    None,
}

pub fn controller_of(meta: &ObjectMeta) -> Owner {
    let controller = meta
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true));

    let Some(controller) = controller else {
        return Owner::None;
    };

    match OwnerKind::from(controller) {
        OwnerKind::ReplicaSet => Owner::ReplicaSet(controller.name.clone()),
        OwnerKind::Deployment => Owner::Deployment(controller.name.clone()),
        other => Owner::Other(other),
    }
}

/// Every owner kind of the object, controller or not.
pub fn owner_kinds(meta: &ObjectMeta) -> impl Iterator<Item = OwnerKind> + '_ {
    meta.owner_references.iter().flatten().map(OwnerKind::from)
}

#[derive(Debug, Error)]
pub enum OwnerResolveError {
    #[error("get replica set {replica_set}")]
    GetReplicaSet {
        replica_set: ObjectRef<ReplicaSet>,
        source: kube::Error,
    },
    #[error("get deployment {deployment}")]
    GetDeployment {
        deployment: ObjectRef<Deployment>,
        source: kube::Error,
    },
    #[error(transparent)]
    Bug(#[from] Bug),
}

impl OwnerResolveError {
    pub fn kube_error(&self) -> Option<&kube::Error> {
        match self {
            OwnerResolveError::GetReplicaSet { source, .. }
            | OwnerResolveError::GetDeployment { source, .. } => Some(source),
            OwnerResolveError::Bug(_) => None,
        }
    }
}

/// Resolves pods to their deployments. Lives for one drain pass.
pub struct OwnerChainResolver<'a, C: ?Sized> {
    client: &'a C,
    replica_sets: HashMap<ObjectRef<ReplicaSet>, Option<ObjectRef<Deployment>>>,
    deployments: HashMap<ObjectRef<Deployment>, Arc<Deployment>>,
}

impl<'a, C> OwnerChainResolver<'a, C>
where
    C: ClusterClient + ?Sized,
{
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            replica_sets: HashMap::new(),
            deployments: HashMap::new(),
        }
    }

    /// `Ok(None)` for pods not managed by a deployment, e.g. bare pods or DaemonSet pods.
    pub async fn resolve_deployment(
        &mut self,
        pod: &Pod,
    ) -> Result<Option<Arc<Deployment>>, OwnerResolveError> {
        let Owner::ReplicaSet(replica_set_name) = controller_of(&pod.metadata) else {
            return Ok(None);
        };

        let Some(namespace) = pod.namespace() else {
            return Err(Bug {
                message: format!("pod '{}' has no namespace", pod.name_any()),
                source: None,
            }
            .into());
        };

        let replica_set = get_object_ref_from_name(&replica_set_name, Some(&namespace));
        let Some(deployment) = self.deployment_ref_of(replica_set).await? else {
            return Ok(None);
        };

        self.get_deployment(deployment).await.map(Some)
    }

    async fn deployment_ref_of(
        &mut self,
        replica_set: ObjectRef<ReplicaSet>,
    ) -> Result<Option<ObjectRef<Deployment>>, OwnerResolveError> {
        if let Some(cached) = self.replica_sets.get(&replica_set) {
            return Ok(cached.clone());
        }

        let namespace = replica_set.namespace.as_deref().unwrap_or_default();
        let fetched = self
            .client
            .get_replica_set(namespace, &replica_set.name)
            .await
            .map_err(|source| OwnerResolveError::GetReplicaSet {
                replica_set: replica_set.clone(),
                source,
            })?;

        let deployment = match controller_of(&fetched.metadata) {
            Owner::Deployment(name) => Some(get_object_ref_from_name(&name, Some(namespace))),
            _ => None,
        };

        trace!(%replica_set, ?deployment, "resolved replica set");
        self.replica_sets.insert(replica_set, deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(
        &mut self,
        deployment: ObjectRef<Deployment>,
    ) -> Result<Arc<Deployment>, OwnerResolveError> {
        if let Some(cached) = self.deployments.get(&deployment) {
            return Ok(cached.clone());
        }

        let namespace = deployment.namespace.as_deref().unwrap_or_default();
        let fetched = self
            .client
            .get_deployment(namespace, &deployment.name)
            .await
            .map_err(|source| OwnerResolveError::GetDeployment {
                deployment: deployment.clone(),
                source,
            })?;

        let fetched = Arc::new(fetched);
        self.deployments.insert(deployment, fetched.clone());
        Ok(fetched)
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::trace;

/// Remote object operations the drain needs. Kept behind a trait so the drain logic can be
/// exercised against an in-memory cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_pods_on_node(&self, node_name: &str) -> kube::Result<Vec<Pod>>;

    async fn get_replica_set(&self, namespace: &str, name: &str) -> kube::Result<ReplicaSet>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> kube::Result<Deployment>;

    /// Applies a JSON merge patch (RFC 7386) to the node.
    async fn patch_node(&self, name: &str, patch: &serde_json::Value) -> kube::Result<Node>;

    async fn update_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment>;

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> kube::Result<()>;
}

#[async_trait]
impl<C> ClusterClient for Arc<C>
where
    C: ClusterClient + ?Sized,
{
    async fn list_pods_on_node(&self, node_name: &str) -> kube::Result<Vec<Pod>> {
        self.as_ref().list_pods_on_node(node_name).await
    }

    async fn get_replica_set(&self, namespace: &str, name: &str) -> kube::Result<ReplicaSet> {
        self.as_ref().get_replica_set(namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> kube::Result<Deployment> {
        self.as_ref().get_deployment(namespace, name).await
    }

    async fn patch_node(&self, name: &str, patch: &serde_json::Value) -> kube::Result<Node> {
        self.as_ref().patch_node(name, patch).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment> {
        self.as_ref().update_deployment(deployment).await
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> kube::Result<()> {
        self.as_ref()
            .delete_pod(namespace, name, grace_period_seconds)
            .await
    }
}

#[derive(Clone)]
pub struct ApiResolver {
    pub client: Client,
}

impl ApiResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn try_default() -> kube::Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn all<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    pub fn namespaced<K>(&self, ns: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), ns)
    }

    pub fn api_for<K>(&self, res: &K) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        if let Some(ns) = res.namespace() {
            self.namespaced(&ns)
        } else {
            self.all()
        }
    }
}

/// Every pod scheduled to the node, across all namespaces.
fn pods_on_node_params(node_name: &str) -> ListParams {
    ListParams::default().fields(&format!("spec.nodeName={node_name}"))
}

#[async_trait]
impl ClusterClient for ApiResolver {
    async fn list_pods_on_node(&self, node_name: &str) -> kube::Result<Vec<Pod>> {
        let pods = self
            .all::<Pod>()
            .list(&pods_on_node_params(node_name))
            .await?;
        Ok(pods.items)
    }

    async fn get_replica_set(&self, namespace: &str, name: &str) -> kube::Result<ReplicaSet> {
        self.namespaced::<ReplicaSet>(namespace).get(name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> kube::Result<Deployment> {
        self.namespaced::<Deployment>(namespace).get(name).await
    }

    async fn patch_node(&self, name: &str, patch: &serde_json::Value) -> kube::Result<Node> {
        trace!(?patch, "patching node");
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment> {
        self.api_for(deployment)
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> kube::Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..DeleteParams::default()
        };
        self.namespaced::<Pod>(namespace).delete(name, &params).await?;
        Ok(())
    }
}

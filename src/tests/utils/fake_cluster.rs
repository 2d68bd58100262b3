use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use crate::client::ClusterClient;
use crate::error_codes::api_error;

type Key = (String, String);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    ListPods {
        node: String,
    },
    GetReplicaSet {
        namespace: String,
        name: String,
    },
    GetDeployment {
        namespace: String,
        name: String,
    },
    PatchNode {
        name: String,
    },
    UpdateDeployment {
        namespace: String,
        name: String,
    },
    DeletePod {
        namespace: String,
        name: String,
        grace_period_seconds: u32,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallKind {
    ListPods,
    GetReplicaSet,
    GetDeployment,
    PatchNode,
    UpdateDeployment,
    DeletePod,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::ListPods { .. } => CallKind::ListPods,
            Call::GetReplicaSet { .. } => CallKind::GetReplicaSet,
            Call::GetDeployment { .. } => CallKind::GetDeployment,
            Call::PatchNode { .. } => CallKind::PatchNode,
            Call::UpdateDeployment { .. } => CallKind::UpdateDeployment,
            Call::DeletePod { .. } => CallKind::DeletePod,
        }
    }

    fn target(&self) -> &str {
        match self {
            Call::ListPods { node } => node,
            Call::GetReplicaSet { name, .. }
            | Call::GetDeployment { name, .. }
            | Call::PatchNode { name }
            | Call::UpdateDeployment { name, .. }
            | Call::DeletePod { name, .. } => name,
        }
    }
}

struct InjectedFailure {
    kind: CallKind,
    target: String,
    code: u16,
    reason: String,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    pods: BTreeMap<Key, Pod>,
    replica_sets: BTreeMap<Key, ReplicaSet>,
    deployments: BTreeMap<Key, Deployment>,
    calls: Vec<Call>,
    failures: Vec<InjectedFailure>,
    last_resource_version: u64,
    now: DateTime<Utc>,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }

    fn record(&mut self, call: Call) -> kube::Result<()> {
        let failure = self
            .failures
            .iter()
            .find(|failure| failure.kind == call.kind() && failure.target == call.target())
            .map(|failure| api_error(failure.code, &failure.reason));

        self.calls.push(call);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key_of(namespace: &str, name: &str) -> Key {
    (namespace.to_owned(), name.to_owned())
}

fn not_found() -> kube::Error {
    api_error(404, "NotFound")
}

fn conflict() -> kube::Error {
    api_error(409, "Conflict")
}

/// In-memory API server. Applies merge patches and updates with `resourceVersion` checks, and
/// marks deleted pods as terminating the way the API server does for a non-zero grace period.
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(State {
                last_resource_version: 100,
                now,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn insert_node(&self, mut node: Node) -> Node {
        let mut state = self.lock();
        if node.metadata.resource_version.is_none() {
            node.metadata.resource_version = Some(state.next_resource_version());
        }
        state.nodes.insert(node.name_any(), node.clone());
        node
    }

    pub fn insert_pod(&self, pod: Pod) {
        let key = key_of(&pod.namespace().unwrap(), &pod.name_any());
        self.lock().pods.insert(key, pod);
    }

    pub fn insert_replica_set(&self, replica_set: ReplicaSet) {
        let key = key_of(&replica_set.namespace().unwrap(), &replica_set.name_any());
        self.lock().replica_sets.insert(key, replica_set);
    }

    pub fn insert_deployment(&self, mut deployment: Deployment) {
        let mut state = self.lock();
        if deployment.metadata.resource_version.is_none() {
            deployment.metadata.resource_version = Some(state.next_resource_version());
        }
        let key = key_of(&deployment.namespace().unwrap(), &deployment.name_any());
        state.deployments.insert(key, deployment);
    }

    pub fn node(&self, name: &str) -> Node {
        self.lock().nodes.get(name).cloned().unwrap()
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.lock().pods.get(&key_of(namespace, name)).cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Deployment {
        self.lock()
            .deployments
            .get(&key_of(namespace, name))
            .cloned()
            .unwrap()
    }

    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) {
        let mut state = self.lock();
        let pod = state.pods.get_mut(&key_of(namespace, name)).unwrap();
        pod.status.get_or_insert_with(Default::default).phase = Some(phase.to_owned());
    }

    /// Every following call of `kind` against `target` fails with the given API error.
    pub fn fail_on(&self, kind: CallKind, target: &str, code: u16, reason: &str) {
        self.lock().failures.push(InjectedFailure {
            kind,
            target: target.to_owned(),
            code,
            reason: reason.to_owned(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_pods_on_node(&self, node_name: &str) -> kube::Result<Vec<Pod>> {
        let mut state = self.lock();
        state.record(Call::ListPods {
            node: node_name.to_owned(),
        })?;

        let pods = state
            .pods
            .values()
            .filter(|pod| {
                pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref()) == Some(node_name)
            })
            .cloned()
            .collect();
        Ok(pods)
    }

    async fn get_replica_set(&self, namespace: &str, name: &str) -> kube::Result<ReplicaSet> {
        let mut state = self.lock();
        state.record(Call::GetReplicaSet {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        })?;

        state
            .replica_sets
            .get(&key_of(namespace, name))
            .cloned()
            .ok_or_else(not_found)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> kube::Result<Deployment> {
        let mut state = self.lock();
        state.record(Call::GetDeployment {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        })?;

        state
            .deployments
            .get(&key_of(namespace, name))
            .cloned()
            .ok_or_else(not_found)
    }

    async fn patch_node(&self, name: &str, patch: &serde_json::Value) -> kube::Result<Node> {
        let mut state = self.lock();
        state.record(Call::PatchNode {
            name: name.to_owned(),
        })?;

        let current = state.nodes.get(name).ok_or_else(not_found)?;
        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if current.metadata.resource_version.as_deref() != Some(expected) {
                return Err(conflict());
            }
        }

        let mut value = serde_json::to_value(current).unwrap();
        json_patch::merge(&mut value, patch);
        let mut patched: Node = serde_json::from_value(value).unwrap();
        patched.metadata.resource_version = Some(state.next_resource_version());

        state.nodes.insert(name.to_owned(), patched.clone());
        Ok(patched)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment> {
        let namespace = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();

        let mut state = self.lock();
        state.record(Call::UpdateDeployment {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;

        let key = key_of(&namespace, &name);
        let current = state.deployments.get(&key).ok_or_else(not_found)?;
        if let Some(expected) = deployment.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(expected) {
                return Err(conflict());
            }
        }

        let mut updated = deployment.clone();
        updated.metadata.resource_version = Some(state.next_resource_version());
        state.deployments.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> kube::Result<()> {
        let mut state = self.lock();
        state.record(Call::DeletePod {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            grace_period_seconds,
        })?;

        let key = key_of(namespace, name);
        if grace_period_seconds == 0 {
            return state.pods.remove(&key).map(|_| ()).ok_or_else(not_found);
        }

        let now = state.now;
        let pod = state.pods.get_mut(&key).ok_or_else(not_found)?;
        if pod.metadata.deletion_timestamp.is_none() {
            let grace_period = TimeDelta::seconds(i64::from(grace_period_seconds));
            pod.metadata.deletion_timestamp = Some(Time(now + grace_period));
        }
        Ok(())
    }
}

use k8s_openapi::api::core::v1::{Node, Taint};
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use strum_macros::{Display, EnumString};

use crate::consts::{
    EXCLUDE_FROM_LOAD_BALANCERS_LABEL_KEY, EXCLUDE_FROM_LOAD_BALANCERS_LABEL_VALUE,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display, EnumString)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// Same key and effect. The value is not compared.
pub fn match_taint(existing: &Taint, desired: &Taint) -> bool {
    existing.key == desired.key && existing.effect == desired.effect
}

/// Returns the node as it should look while it is being drained.
///
/// A taint sharing only the key with the desired one is replaced, so there is at most one taint
/// per key afterwards. The load balancer exclusion label takes the node out of external target
/// groups before its connections go away.
pub fn with_disruption_taint(node: &Node, taint: &Taint) -> Node {
    let mut desired = node.clone();

    let spec = desired.spec.get_or_insert_with(Default::default);
    let taints = spec.taints.get_or_insert_with(Vec::new);
    if !taints.iter().any(|existing| match_taint(existing, taint)) {
        taints.retain(|existing| existing.key != taint.key);
        taints.push(taint.clone());
    }

    desired.labels_mut().insert(
        String::from(EXCLUDE_FROM_LOAD_BALANCERS_LABEL_KEY),
        String::from(EXCLUDE_FROM_LOAD_BALANCERS_LABEL_VALUE),
    );

    desired
}

/// Merge patch replacing the taint list and merging the labels of `desired`.
///
/// The `resourceVersion` makes the API server reject the patch with a conflict if the node
/// changed since it was read.
pub fn build_taint_patch(desired: &Node) -> Value {
    let mut metadata = Map::new();
    metadata.insert(String::from("labels"), json!(desired.labels()));
    if let Some(resource_version) = desired.resource_version() {
        metadata.insert(
            String::from("resourceVersion"),
            Value::String(resource_version),
        );
    }

    let taints = desired
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref());

    json!({
        "metadata": metadata,
        "spec": {
            "taints": taints,
        },
    })
}

pub const CONTROLLER_NAME: &str = "node-drain-orchestrator";

pub const DISRUPTION_TAINT_KEY: &str = "node-drain-orchestrator/disruption";
pub const DISRUPTION_TAINT_VALUE: &str = "disrupting";

pub const EXCLUDE_FROM_LOAD_BALANCERS_LABEL_KEY: &str =
    "node.kubernetes.io/exclude-from-external-load-balancers";
pub const EXCLUDE_FROM_LOAD_BALANCERS_LABEL_VALUE: &str = CONTROLLER_NAME;

/// Set on a deployment's pod template to the name of the node it was restarted for.
pub const RESTARTED_FOR_NODE_ANNOTATION_KEY: &str = "node-drain-orchestrator/restarted-for-node";

pub const SYSTEM_CLUSTER_CRITICAL: &str = "system-cluster-critical";
pub const SYSTEM_NODE_CRITICAL: &str = "system-node-critical";

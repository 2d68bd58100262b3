mod client;
mod clock;
mod config;
mod consts;
mod error_codes;
mod error_types;
mod evict;
mod eviction_queue;
mod grace_period;
mod owner;
mod pod_state;
mod report;
mod restart;
mod taint;
mod telemetry;
mod terminator;
mod utils;

pub use crate::client::{ApiResolver, ClusterClient};
pub use crate::clock::{Clock, SystemClock};
pub use crate::config::Config;
pub use crate::consts::{
    DISRUPTION_TAINT_KEY, EXCLUDE_FROM_LOAD_BALANCERS_LABEL_KEY, RESTARTED_FOR_NODE_ANNOTATION_KEY,
};
pub use crate::error_codes::{is_404_not_found_error, is_409_conflict_error, is_transient_error};
pub use crate::error_types::Bug;
pub use crate::evict::{evict, EvictionTier, EvictionTiers};
pub use crate::eviction_queue::EvictionQueue;
pub use crate::grace_period::{
    clamped_grace_period_seconds, delete_expiring_pods, pod_delete_time, DeleteExpiringPodsError,
};
pub use crate::owner::{controller_of, Owner, OwnerChainResolver, OwnerKind, OwnerResolveError};
pub use crate::pod_state::{is_evictable, is_waiting_eviction};
pub use crate::report::EventReporter;
pub use crate::restart::{
    plan_restarts, restart_deployments, RestartDeploymentsError, RestartPlan, RestartRecords,
};
pub use crate::taint::{match_taint, with_disruption_taint, TaintEffect};
pub use crate::telemetry::init_tracing_subscriber;
pub use crate::terminator::{DrainError, DrainStatus, Terminator};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
mod tests;

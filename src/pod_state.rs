use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Pod, Taint, Toleration};

use crate::owner::{owner_kinds, OwnerKind};
use crate::try_some;

pub fn is_terminal(pod: &Pod) -> bool {
    matches!(
        try_some!(pod.status?.phase?).map(String::as_str),
        Some("Failed" | "Succeeded")
    )
}

pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// The deletion timestamp already includes the grace period, so a pod still present well after
/// it is no longer worth waiting for.
pub fn is_stuck_terminating(pod: &Pod, now: DateTime<Utc>, threshold: Duration) -> bool {
    let Some(deletion_timestamp) = pod.metadata.deletion_timestamp.as_ref() else {
        return false;
    };

    match (now - deletion_timestamp.0).to_std() {
        Ok(elapsed) => elapsed > threshold,
        Err(_) => false,
    }
}

pub fn is_owned_by_daemon_set(pod: &Pod) -> bool {
    owner_kinds(&pod.metadata).any(|kind| kind == OwnerKind::DaemonSet)
}

pub fn is_owned_by_node(pod: &Pod) -> bool {
    owner_kinds(&pod.metadata).any(|kind| kind == OwnerKind::Node)
}

fn toleration_tolerates_taint(toleration: &Toleration, taint: &Taint) -> bool {
    if let Some(effect) = toleration.effect.as_deref() {
        if !effect.is_empty() && effect != taint.effect {
            return false;
        }
    }

    if let Some(key) = toleration.key.as_deref() {
        if !key.is_empty() && key != taint.key {
            return false;
        }
    }

    match toleration.operator.as_deref() {
        None | Some("") | Some("Equal") => {
            toleration.value.as_deref().unwrap_or_default()
                == taint.value.as_deref().unwrap_or_default()
        }
        Some("Exists") => true,
        Some(_) => false,
    }
}

pub fn tolerates_taint(pod: &Pod, taint: &Taint) -> bool {
    try_some!(pod.spec?.tolerations?)
        .into_iter()
        .flatten()
        .any(|toleration| toleration_tolerates_taint(toleration, taint))
}

/// Whether the eviction API should be called against the pod.
///
/// Pods tolerating the disruption taint would be scheduled right back, and mirror pods can't be
/// removed through the API server at all.
pub fn is_evictable(pod: &Pod, disruption_taint: &Taint) -> bool {
    !is_terminal(pod)
        && !is_terminating(pod)
        && !tolerates_taint(pod, disruption_taint)
        && !is_owned_by_node(pod)
}

/// Whether the drain has to wait for the pod to leave the node.
pub fn is_waiting_eviction(
    pod: &Pod,
    disruption_taint: &Taint,
    now: DateTime<Utc>,
    stuck_terminating_after: Duration,
) -> bool {
    !is_terminal(pod)
        && !is_stuck_terminating(pod, now, stuck_terminating_after)
        && !tolerates_taint(pod, disruption_taint)
        && !is_owned_by_node(pod)
}

use k8s_openapi::api::core::v1::Pod;
use strum_macros::Display;
use tracing::debug;

use crate::config::Config;
use crate::eviction_queue::EvictionQueue;
use crate::pod_state::is_owned_by_daemon_set;
use crate::try_some;

/// Eviction order follows graceful node shutdown: regular workloads first, daemons after them,
/// and critical system pods last.
/// https://kubernetes.io/docs/concepts/architecture/nodes/#graceful-node-shutdown
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum EvictionTier {
    NonCriticalNonDaemon,
    NonCriticalDaemon,
    CriticalNonDaemon,
    CriticalDaemon,
}

impl EvictionTier {
    pub const ORDER: [EvictionTier; 4] = [
        EvictionTier::NonCriticalNonDaemon,
        EvictionTier::NonCriticalDaemon,
        EvictionTier::CriticalNonDaemon,
        EvictionTier::CriticalDaemon,
    ];

    pub fn of(pod: &Pod, config: &Config) -> Self {
        let critical = try_some!(pod.spec?.priority_class_name?)
            .is_some_and(|name| config.is_critical_priority_class(name));
        let daemon = is_owned_by_daemon_set(pod);

        match (critical, daemon) {
            (false, false) => EvictionTier::NonCriticalNonDaemon,
            (false, true) => EvictionTier::NonCriticalDaemon,
            (true, false) => EvictionTier::CriticalNonDaemon,
            (true, true) => EvictionTier::CriticalDaemon,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
pub struct EvictionTiers<'a> {
    tiers: [Vec<&'a Pod>; 4],
}

impl<'a> EvictionTiers<'a> {
    pub fn classify(pods: impl IntoIterator<Item = &'a Pod>, config: &Config) -> Self {
        let mut result = Self::default();
        for pod in pods {
            result.tiers[EvictionTier::of(pod, config).index()].push(pod);
        }

        result
    }

    pub fn tier(&self, tier: EvictionTier) -> &[&'a Pod] {
        &self.tiers[tier.index()]
    }

    pub fn first_non_empty(&self) -> Option<(EvictionTier, &[&'a Pod])> {
        EvictionTier::ORDER
            .into_iter()
            .map(|tier| (tier, self.tier(tier)))
            .find(|(_, pods)| !pods.is_empty())
    }
}

/// Submits only the first non-empty tier. Later tiers are picked up by a later drain pass, once
/// the pods ahead of them are gone.
pub fn evict<'a>(
    queue: &dyn EvictionQueue,
    pods: impl IntoIterator<Item = &'a Pod>,
    config: &Config,
) -> Option<EvictionTier> {
    let tiers = EvictionTiers::classify(pods, config);
    let (tier, pods) = tiers.first_non_empty()?;

    debug!(%tier, count = pods.len(), "submitting pods for eviction");
    queue.add(pods);
    Some(tier)
}

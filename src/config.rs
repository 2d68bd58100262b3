use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use eyre::{eyre, Result};
use humantime::parse_duration;
use k8s_openapi::api::core::v1::Taint;

use crate::consts::{
    DISRUPTION_TAINT_KEY, DISRUPTION_TAINT_VALUE, SYSTEM_CLUSTER_CRITICAL, SYSTEM_NODE_CRITICAL,
};
use crate::taint::TaintEffect;

const DEFAULT_STUCK_TERMINATING_AFTER: Duration = Duration::from_secs(60);

/// Drain settings. Meant to be flattened into the host controller's CLI.
#[derive(Clone, Debug, Eq, PartialEq, Args)]
pub struct Config {
    #[arg(long, default_value = DISRUPTION_TAINT_KEY)]
    pub taint_key: String,

    #[arg(long, default_value = DISRUPTION_TAINT_VALUE)]
    pub taint_value: String,

    #[arg(long, default_value = "NoSchedule", value_parser = parse_taint_effect)]
    pub taint_effect: TaintEffect,

    /// A terminating pod stops counting as waiting for eviction once its
    /// deletion timestamp is older than this.
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub stuck_terminating_after: Duration,

    #[arg(
        long = "critical-priority-class",
        default_values = [SYSTEM_CLUSTER_CRITICAL, SYSTEM_NODE_CRITICAL]
    )]
    pub critical_priority_classes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            taint_key: String::from(DISRUPTION_TAINT_KEY),
            taint_value: String::from(DISRUPTION_TAINT_VALUE),
            taint_effect: TaintEffect::NoSchedule,
            stuck_terminating_after: DEFAULT_STUCK_TERMINATING_AFTER,
            critical_priority_classes: vec![
                String::from(SYSTEM_CLUSTER_CRITICAL),
                String::from(SYSTEM_NODE_CRITICAL),
            ],
        }
    }
}

impl Config {
    pub fn disruption_taint(&self) -> Taint {
        Taint {
            key: self.taint_key.clone(),
            value: Some(self.taint_value.clone()),
            effect: self.taint_effect.to_string(),
            time_added: None,
        }
    }

    pub fn is_critical_priority_class(&self, priority_class_name: &str) -> bool {
        self.critical_priority_classes
            .iter()
            .any(|class| class == priority_class_name)
    }
}

fn parse_taint_effect(input: &str) -> Result<TaintEffect> {
    TaintEffect::from_str(input).map_err(|_| {
        eyre!("taint-effect should be one of NoSchedule, PreferNoSchedule, NoExecute")
    })
}

/// Alert rule presence checks
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{with_timeout, MonitoringApi, RuleGroup, QUERY_TIMEOUT};
use crate::utils::polling::{NotReady, PollingConfig};

/// Alerting rules a component is expected to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertRuleCase {
    /// Rule group name
    pub name: String,

    /// Platforms the case applies to; empty means none
    #[serde(default)]
    pub platforms: Vec<String>,

    /// Expected alerting rule names, in order
    pub alerts: Vec<String>,
}

impl AlertRuleCase {
    pub fn applies_to(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }
}

pub fn default_alert_rules() -> Vec<AlertRuleCase> {
    vec![AlertRuleCase {
        name: "metallb-rules".to_string(),
        platforms: vec!["hcloud".to_string()],
        alerts: vec![
            "MetalLBNoBGPSession".to_string(),
            "MetalLBConfigStale".to_string(),
            "MetalLBControllerPodsAvailability".to_string(),
            "MetalLBSpeakerPodsAvailability".to_string(),
        ],
    }]
}

pub fn alert_rules_polling() -> PollingConfig {
    PollingConfig::new(20, Duration::from_secs(30), "Checking alert rules")
}

/// Compare loaded rule groups with the cases that apply to `platform`.
///
/// The comparison is order-sensitive. When Prometheus reports the same group
/// name twice, the last one wins.
pub fn check_rule_groups(
    groups: &[RuleGroup],
    cases: &[AlertRuleCase],
    platform: &str,
) -> Result<(), NotReady> {
    let loaded: HashMap<&str, Vec<&str>> = groups
        .iter()
        .map(|group| (group.name.as_str(), group.alert_names()))
        .collect();

    for case in cases.iter().filter(|c| c.applies_to(platform)) {
        debug!("Checking existence of {}", case.name);

        let Some(rules) = loaded.get(case.name.as_str()) else {
            return Err(NotReady::new(format!("RuleGroup {:?} not found", case.name)));
        };

        if *rules != case.alerts {
            return Err(NotReady::new(format!(
                "Rules of group {:?} don't match. Expected: {:?}, got: {:?}",
                case.name, case.alerts, rules
            )));
        }
    }

    Ok(())
}

/// One attempt: query the rule groups and check every applicable case
pub async fn probe_alert_rules<A: MonitoringApi + ?Sized>(
    api: &A,
    cases: &[AlertRuleCase],
    platform: &str,
) -> Result<(), NotReady> {
    let groups = with_timeout(QUERY_TIMEOUT, "Listing rules", api.rule_groups())
        .await
        .map_err(|e| NotReady::new(format!("error listing rules: {:#}", e)))?;

    check_rule_groups(&groups, cases, platform)
}

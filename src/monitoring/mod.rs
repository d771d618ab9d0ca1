/// Monitoring stack verification against the Prometheus HTTP API
pub mod alerts;
pub mod prometheus;
pub mod targets;

pub use prometheus::PrometheusClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Upper bound for a single query
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Health value of a target whose last scrape succeeded
pub const HEALTH_UP: &str = "up";

/// A named group of rules as loaded by Prometheus
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// Names of the alerting rules, in the order Prometheus lists them
    pub fn alert_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                Rule::Alerting { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Rule {
    Alerting { name: String },
    Recording { name: String },
    #[serde(other)]
    Unknown,
}

/// A scrape target Prometheus is currently trying to reach
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActiveTarget {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub health: String,
}

impl ActiveTarget {
    /// `namespace/service`, with missing labels left blank
    pub fn service_id(&self) -> String {
        let label = |key: &str| self.labels.get(key).map(String::as_str).unwrap_or_default();
        format!("{}/{}", label("namespace"), label("service"))
    }
}

/// Queries the monitoring probes need
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    async fn rule_groups(&self) -> Result<Vec<RuleGroup>>;

    async fn active_targets(&self) -> Result<Vec<ActiveTarget>>;
}

/// Fail a query that takes longer than `limit`
pub(crate) async fn with_timeout<T, F>(limit: Duration, what: &str, query: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, query)
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", what, limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_types() {
        let group: RuleGroup = serde_json::from_str(
            r#"{
                "name": "metallb-rules",
                "file": "/etc/prometheus/rules/metallb.yaml",
                "rules": [
                    {"type": "alerting", "name": "MetalLBNoBGPSession", "query": "up == 0"},
                    {"type": "recording", "name": "metallb:speakers:count"},
                    {"type": "alerting", "name": "MetalLBConfigStale"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(group.rules.len(), 3);
        assert_eq!(group.alert_names(), ["MetalLBNoBGPSession", "MetalLBConfigStale"]);
    }

    #[test]
    fn test_service_id() {
        let target: ActiveTarget = serde_json::from_str(
            r#"{"labels": {"namespace": "metallb-system", "service": "speaker"}, "health": "down"}"#,
        )
        .unwrap();
        assert_eq!(target.service_id(), "metallb-system/speaker");

        let bare: ActiveTarget = serde_json::from_str(r#"{"health": "unknown"}"#).unwrap();
        assert_eq!(bare.service_id(), "/");
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let slow = with_timeout(Duration::from_millis(5), "rules query", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(slow.unwrap_err().to_string().contains("rules query timed out"));

        let fast = with_timeout(Duration::from_secs(1), "rules query", async { Ok(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }
}

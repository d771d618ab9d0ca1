/// Configuration management for railyard
pub mod diagnostics;
pub mod eval;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use eval::EvalContext;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::monitoring::alerts::{default_alert_rules, AlertRuleCase};

/// Root configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    /// Cluster definition; commands that touch infrastructure require it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterBlock>,

    /// Components installed after the cluster is reachable, in this order
    #[serde(default)]
    pub components: Vec<ComponentSpec>,

    /// Monitoring verification expectations
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Platform selection plus its opaque, platform-specific body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterBlock {
    /// Registered platform name (e.g., "aks", "hcloud")
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// A component to install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
        }
    }
}

/// Expectations used by `monitoring verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfig {
    #[serde(default = "default_alert_rules")]
    pub alert_rules: Vec<AlertRuleCase>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            alert_rules: default_alert_rules(),
        }
    }
}

/// A parsed configuration together with the variables it may reference
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub root: RootConfig,
    pub eval: EvalContext,
}

impl RootConfig {
    /// Load configuration and optional variables from YAML files.
    ///
    /// Component bodies are resolved against the variables here; the cluster
    /// body is resolved by the selected platform.
    pub fn load(path: &Path, vars: Option<&Path>) -> Result<LoadedConfig, Diagnostics> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::error(
                "Failed to read configuration",
                format!("{}: {}", path.display(), e),
            )
        })?;

        let eval = match vars {
            Some(vars) => EvalContext::from_file(vars)?,
            None => EvalContext::new(),
        };

        Self::from_yaml(&content, eval)
    }

    /// Parse configuration text and validate the component list
    pub fn from_yaml(content: &str, eval: EvalContext) -> Result<LoadedConfig, Diagnostics> {
        let mut root: RootConfig = serde_yaml::from_str(content)
            .map_err(|e| Diagnostic::error("Invalid configuration file", e.to_string()))?;

        let mut diags = root.check_components();

        for component in &mut root.components {
            if let Some(body) = &component.config {
                match eval.resolve(body) {
                    Ok(resolved) => component.config = Some(resolved),
                    Err(errors) => diags.extend(errors),
                }
            }
        }

        if !diags.is_empty() {
            return Err(diags);
        }

        Ok(LoadedConfig { root, eval })
    }

    /// Component names must be present and unique
    fn check_components(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();

        for component in &self.components {
            if component.name.trim().is_empty() {
                diags.push(Diagnostic::error(
                    "Component name must not be empty",
                    "Every entry in components needs a name",
                ));
                continue;
            }

            if !seen.insert(component.name.as_str()) && reported.insert(component.name.as_str()) {
                diags.push(Diagnostic::error(
                    "Component names should be unique",
                    format!("Component '{}' is duplicated", component.name),
                ));
            }
        }

        diags
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        let cluster_config: Value = serde_yaml::from_str(
            r#"
asset_dir: ~/railyard/demo
cluster_name: demo
subscription_id: ${var.subscription_id}
tenant_id: ${var.tenant_id}
location: West Europe
application_name: demo-railyard
resource_group_name: demo-railyard
tags:
  owner: platform-team
worker_pools:
  - name: default
    vm_size: Standard_D2_v2
    count: 2
  - name: monitoring
    vm_size: Standard_D4_v2
    count: 1
    labels:
      workload: monitoring
    taints:
      - dedicated=monitoring:NoSchedule
"#,
        )
        .unwrap_or(Value::Null);

        Self {
            cluster: Some(ClusterBlock {
                name: "aks".to_string(),
                config: Some(cluster_config),
            }),
            components: vec![
                ComponentSpec::new("prometheus-operator"),
                ComponentSpec::new("cert-manager"),
            ],
            monitoring: MonitoringConfig::default(),
        }
    }
}

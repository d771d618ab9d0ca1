/// Built-in component charts and per-component overrides
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::config::{Diagnostic, Diagnostics};

/// Everything needed to install one component with Helm
#[derive(Debug, Clone, PartialEq)]
pub struct ChartUnit {
    pub release: String,
    pub chart: String,
    pub repo: String,
    pub version: Option<String>,
    pub namespace: String,
    pub values: Value,
}

/// Fields a component body may set
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartOverrides {
    pub chart: Option<String>,
    pub repo: Option<String>,
    pub version: Option<String>,
    pub namespace: Option<String>,
    pub values: Option<Value>,
}

struct CatalogEntry {
    name: &'static str,
    chart: &'static str,
    repo: &'static str,
    namespace: &'static str,
    values: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "prometheus-operator",
        chart: "kube-prometheus-stack",
        repo: "https://prometheus-community.github.io/helm-charts",
        namespace: "monitoring",
        values: "grafana:\n  enabled: true\n",
    },
    CatalogEntry {
        name: "metallb",
        chart: "metallb",
        repo: "https://metallb.github.io/metallb",
        namespace: "metallb-system",
        values: "prometheus:\n  serviceMonitor:\n    enabled: true\n  prometheusRule:\n    enabled: true\n",
    },
    CatalogEntry {
        name: "cert-manager",
        chart: "cert-manager",
        repo: "https://charts.jetstack.io",
        namespace: "cert-manager",
        values: "crds:\n  enabled: true\n",
    },
    CatalogEntry {
        name: "contour",
        chart: "contour",
        repo: "https://charts.bitnami.com/bitnami",
        namespace: "projectcontour",
        values: "{}\n",
    },
];

/// Names of the components that install without a `chart` override
pub fn builtin_names() -> Vec<&'static str> {
    CATALOG.iter().map(|e| e.name).collect()
}

/// Decode the overrides in a component body
pub fn parse_overrides(name: &str, config: Option<&Value>) -> Result<ChartOverrides, Diagnostic> {
    match config {
        None | Some(Value::Null) => Ok(ChartOverrides::default()),
        Some(body) => serde_yaml::from_value(body.clone()).map_err(|e| {
            Diagnostic::error(
                format!("Invalid configuration for component {:?}", name),
                e.to_string(),
            )
        }),
    }
}

/// Resolve a component to its chart, applying overrides over the catalog defaults
pub fn resolve(name: &str, config: Option<&Value>) -> Result<ChartUnit, Diagnostics> {
    let overrides = parse_overrides(name, config)?;
    let entry = CATALOG.iter().find(|e| e.name == name);

    let (chart, repo) = match (entry, overrides.chart, overrides.repo) {
        (_, Some(chart), Some(repo)) => (chart, repo),
        (Some(entry), chart, repo) => (
            chart.unwrap_or_else(|| entry.chart.to_string()),
            repo.unwrap_or_else(|| entry.repo.to_string()),
        ),
        (None, _, _) => {
            return Err(Diagnostic::error(
                format!("Unknown component {:?}", name),
                format!(
                    "Set both chart and repo, or use one of: {}",
                    builtin_names().join(", ")
                ),
            )
            .into())
        }
    };

    let mut values = match entry {
        Some(entry) => serde_yaml::from_str(entry.values).unwrap_or(Value::Mapping(Mapping::new())),
        None => Value::Mapping(Mapping::new()),
    };
    if let Some(user) = overrides.values {
        merge_values(&mut values, user);
    }

    Ok(ChartUnit {
        release: name.to_string(),
        chart,
        repo,
        version: overrides.version,
        namespace: overrides
            .namespace
            .or_else(|| entry.map(|e| e.namespace.to_string()))
            .unwrap_or_else(|| name.to_string()),
        values,
    })
}

/// Deep-merge `overlay` into `base`; mappings merge key by key, anything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

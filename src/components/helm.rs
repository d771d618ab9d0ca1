/// Component installation with Helm
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use super::catalog::{self, ChartUnit};
use super::{ClusterHandle, ComponentBackend};
use crate::config::{ComponentSpec, Diagnostics};
use crate::utils::command::CommandBuilder;

/// Installs components as Helm releases
#[derive(Debug, Clone)]
pub struct HelmBackend {
    binary: String,
}

impl Default for HelmBackend {
    fn default() -> Self {
        Self {
            binary: "helm".to_string(),
        }
    }
}

impl HelmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different helm binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check if helm is installed
    pub async fn check_helm_installed() -> Result<()> {
        crate::utils::command::check_tool_installed(
            "helm",
            &["version"],
            "https://helm.sh/docs/intro/install/",
        )
        .await
    }

    /// Arguments for `helm upgrade --install`
    fn install_args(unit: &ChartUnit, values_file: &Path) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            unit.release.clone(),
            unit.chart.clone(),
            "--repo".to_string(),
            unit.repo.clone(),
        ];

        if let Some(version) = &unit.version {
            args.extend(["--version".to_string(), version.clone()]);
        }

        args.extend([
            "--namespace".to_string(),
            unit.namespace.clone(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--values".to_string(),
            values_file.to_string_lossy().into_owned(),
        ]);

        args
    }
}

/// Values file for a component inside the asset directory
pub fn values_path(asset_dir: &Path, name: &str) -> PathBuf {
    asset_dir
        .join("components")
        .join(format!("{}-values.yaml", name))
}

fn write_values(path: &Path, values: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(values).context("Failed to serialize chart values")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

#[async_trait]
impl ComponentBackend for HelmBackend {
    fn validate(&self, spec: &ComponentSpec) -> Diagnostics {
        match catalog::resolve(&spec.name, spec.config.as_ref()) {
            Ok(_) => Diagnostics::new(),
            Err(diagnostics) => diagnostics,
        }
    }

    async fn install(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        config: Option<&Value>,
    ) -> Result<()> {
        let unit = catalog::resolve(name, config).map_err(|diags| anyhow::anyhow!("{}", diags))?;
        info!(
            "Installing chart {} into namespace {}...",
            unit.chart, unit.namespace
        );

        let values_file = values_path(&cluster.asset_dir, name);
        write_values(&values_file, &unit.values)?;

        CommandBuilder::new(&self.binary)
            .args(Self::install_args(&unit, &values_file))
            .kubeconfig(&cluster.kubeconfig)
            .context(format!("Failed to install {}", name))
            .run_silent()
            .await
    }
}

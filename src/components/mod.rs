/// Post-cluster components and how they are installed
pub mod catalog;
pub mod helm;
pub mod installer;

pub use helm::HelmBackend;
pub use installer::Installer;

use anyhow::Result;
use async_trait::async_trait;
use serde_yaml::Value;
use std::path::PathBuf;

use crate::config::{ComponentSpec, Diagnostics};

/// What a component backend needs to reach the cluster
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub kubeconfig: PathBuf,
    pub asset_dir: PathBuf,
}

/// Installs a single named component
#[async_trait]
pub trait ComponentBackend: Send + Sync {
    /// Check a component's configuration before anything is installed
    fn validate(&self, _spec: &ComponentSpec) -> Diagnostics {
        Diagnostics::new()
    }

    async fn install(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        config: Option<&Value>,
    ) -> Result<()>;
}

/// Kubernetes API access through kubectl
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::nodes::{parse_node_statuses, NodeStatus, NODE_READY_JSONPATH};
use crate::utils::command::CommandBuilder;
use crate::Error;

/// Per-request timeout handed to kubectl
const REQUEST_TIMEOUT: &str = "--request-timeout=10s";

/// Read-only view of a cluster used by readiness probes
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Names of all namespaces; succeeds only when the API server answers
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>>;
}

#[derive(Deserialize)]
struct KubeconfigFile {
    #[serde(default)]
    clusters: Vec<serde_yaml::Value>,
}

/// Kubernetes client for kubectl operations
#[derive(Debug, Clone)]
pub struct KubernetesClient {
    kubeconfig: PathBuf,
    binary: String,
}

impl KubernetesClient {
    /// Build a client from a kubeconfig file.
    ///
    /// The file must exist, parse as YAML and name at least one cluster.
    pub fn from_kubeconfig(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Kubeconfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let parsed: KubeconfigFile =
            serde_yaml::from_str(&content).map_err(|e| Error::Kubeconfig {
                path: path.to_path_buf(),
                reason: format!("invalid kubeconfig: {}", e),
            })?;

        if parsed.clusters.is_empty() {
            return Err(Error::Kubeconfig {
                path: path.to_path_buf(),
                reason: "no clusters defined".to_string(),
            });
        }

        Ok(Self {
            kubeconfig: path.to_path_buf(),
            binary: "kubectl".to_string(),
        })
    }

    /// Use a different kubectl binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    /// Check if kubectl is installed
    pub async fn check_kubectl_installed() -> Result<()> {
        crate::utils::command::check_tool_installed(
            "kubectl",
            &["version", "--client"],
            "https://kubernetes.io/docs/tasks/tools/",
        )
        .await
    }

    async fn get(&self, args: &[&str], what: &str) -> Result<String> {
        debug!("kubectl {}", args.join(" "));

        CommandBuilder::new(&self.binary)
            .args(args)
            .arg(REQUEST_TIMEOUT)
            .kubeconfig(&self.kubeconfig)
            .context(format!("Failed to list {}", what))
            .run()
            .await
    }
}

#[async_trait]
impl ClusterApi for KubernetesClient {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let stdout = self
            .get(
                &["get", "namespaces", "-o", "jsonpath={.items[*].metadata.name}"],
                "namespaces",
            )
            .await?;

        Ok(stdout.split_whitespace().map(str::to_string).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeStatus>> {
        let jsonpath = format!("jsonpath={}", NODE_READY_JSONPATH);
        let stdout = self
            .get(&["get", "nodes", "-o", &jsonpath], "nodes")
            .await?;

        parse_node_statuses(&stdout).context("Unexpected kubectl node output")
    }
}

/// Azure Kubernetes Service platform
mod template;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

use super::render::{managed_tags, render_template, PoolData};
use super::{
    check_not_empty_workers, check_required, check_worker_pool_names_unique, decode_body,
    ClusterMeta, Platform,
};
use crate::config::{Diagnostics, EvalContext};
use crate::RenderError;

/// A group of identically sized AKS nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerPool {
    pub name: String,

    /// Azure VM size (e.g., "Standard_D2_v2")
    pub vm_size: String,

    pub count: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Kubernetes taints in `key=value:Effect` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<String>,
}

/// Cluster configuration body for the `aks` platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AksConfig {
    pub asset_dir: String,
    pub cluster_name: String,
    pub tags: BTreeMap<String, String>,

    pub subscription_id: String,
    pub tenant_id: String,

    /// Azure region
    pub location: String,

    /// Name of the service principal application created for the cluster
    pub application_name: String,
    pub resource_group_name: String,
    pub kubernetes_version: String,

    /// The first pool becomes the cluster's default node pool
    pub worker_pools: Vec<WorkerPool>,
}

impl Default for AksConfig {
    fn default() -> Self {
        Self {
            asset_dir: String::new(),
            cluster_name: String::new(),
            tags: BTreeMap::new(),
            subscription_id: String::new(),
            tenant_id: String::new(),
            location: "West Europe".to_string(),
            application_name: String::new(),
            resource_group_name: String::new(),
            kubernetes_version: "1.16.7".to_string(),
            worker_pools: Vec::new(),
        }
    }
}

impl AksConfig {
    /// Run every check and collect all problems
    pub fn validate(&self) -> Diagnostics {
        let mut diagnostics = check_required(&[
            ("asset_dir", self.asset_dir.as_str()),
            ("cluster_name", self.cluster_name.as_str()),
            ("subscription_id", self.subscription_id.as_str()),
            ("tenant_id", self.tenant_id.as_str()),
            ("application_name", self.application_name.as_str()),
            ("resource_group_name", self.resource_group_name.as_str()),
        ]);

        diagnostics.extend(check_not_empty_workers(self.worker_pools.len()));
        diagnostics.extend(check_worker_pool_names_unique(
            self.worker_pools.iter().map(|p| p.name.as_str()),
        ));

        diagnostics
    }
}

#[derive(Serialize)]
struct TemplateData<'a> {
    subscription_id: &'a str,
    tenant_id: &'a str,
    application_name: &'a str,
    location: &'a str,
    resource_group_name: &'a str,
    kubernetes_version: &'a str,
    cluster_name: &'a str,
    default_pool: PoolData<'a>,
    extra_pools: Vec<PoolData<'a>>,
}

fn pool_data<'a>(pool: &'a WorkerPool, tags: &'a BTreeMap<String, String>) -> PoolData<'a> {
    PoolData::new(
        &pool.name,
        &pool.vm_size,
        pool.count,
        &pool.labels,
        &pool.taints,
        tags,
    )
}

/// The `aks` platform
#[derive(Debug, Default)]
pub struct Aks {
    config: AksConfig,
}

impl Aks {
    pub fn new(config: AksConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AksConfig {
        &self.config
    }
}

impl Platform for Aks {
    fn name(&self) -> &'static str {
        "aks"
    }

    fn load_config(&mut self, body: Option<&Value>, ctx: &EvalContext) -> Diagnostics {
        let Some(body) = body else {
            return Diagnostics::new();
        };

        match decode_body::<AksConfig>(body, ctx) {
            Ok(config) => self.config = config,
            Err(diagnostics) => return diagnostics,
        }

        self.config.validate()
    }

    fn meta(&self) -> ClusterMeta {
        ClusterMeta {
            asset_dir: self.config.asset_dir.clone(),
            expected_nodes: self.config.worker_pools.iter().map(|p| p.count).sum(),
            managed: true,
        }
    }

    fn render(&self) -> Result<String, RenderError> {
        let config = &self.config;
        let (default_pool, extra_pools) = config
            .worker_pools
            .split_first()
            .ok_or(RenderError::MissingDefaultPool)?;

        let tags = managed_tags(&config.tags);
        let data = TemplateData {
            subscription_id: &config.subscription_id,
            tenant_id: &config.tenant_id,
            application_name: &config.application_name,
            location: &config.location,
            resource_group_name: &config.resource_group_name,
            kubernetes_version: &config.kubernetes_version,
            cluster_name: &config.cluster_name,
            default_pool: pool_data(default_pool, &tags),
            extra_pools: extra_pools.iter().map(|p| pool_data(p, &tags)).collect(),
        };

        render_template("aks", template::CLUSTER_TEMPLATE, &data)
    }
}

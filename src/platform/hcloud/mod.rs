/// Self-managed Kubernetes on Hetzner Cloud
mod template;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use super::render::{managed_tags, render_template, PoolData};
use super::{
    check_not_empty_workers, check_required, check_worker_pool_names_unique, decode_body,
    BundledFile, ClusterMeta, Platform,
};
use crate::config::{Diagnostic, Diagnostics, EvalContext};
use crate::RenderError;

/// Private network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Network CIDR (e.g., "10.0.0.0/16")
    pub cidr: String,

    /// Subnet CIDR for the cluster (e.g., "10.0.1.0/24")
    pub subnet_cidr: String,

    /// Network zone (e.g., "eu-central")
    pub zone: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            subnet_cidr: "10.0.1.0/24".to_string(),
            zone: "eu-central".to_string(),
        }
    }
}

/// A group of identically sized worker servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerPool {
    pub name: String,

    /// Hetzner server type (e.g., "cx21", "cpx31")
    pub server_type: String,

    pub count: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<String>,
}

/// Cluster configuration body for the `hcloud` platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HcloudConfig {
    pub asset_dir: String,
    pub cluster_name: String,

    /// Applied as labels on every Hetzner resource
    pub tags: BTreeMap<String, String>,

    /// Hetzner Cloud region
    pub location: String,
    pub network: NetworkConfig,

    /// Names of SSH keys already uploaded to the project
    pub ssh_keys: Vec<String>,

    pub controller_count: u32,
    pub controller_type: String,
    pub image: String,

    /// The first pool is provisioned together with the control plane
    pub worker_pools: Vec<WorkerPool>,
}

impl Default for HcloudConfig {
    fn default() -> Self {
        Self {
            asset_dir: String::new(),
            cluster_name: String::new(),
            tags: BTreeMap::new(),
            location: "nbg1".to_string(),
            network: NetworkConfig::default(),
            ssh_keys: Vec::new(),
            controller_count: 1,
            controller_type: "cpx21".to_string(),
            image: "ubuntu-22.04".to_string(),
            worker_pools: Vec::new(),
        }
    }
}

impl HcloudConfig {
    /// Run every check and collect all problems
    pub fn validate(&self) -> Diagnostics {
        let mut diagnostics = check_required(&[
            ("asset_dir", self.asset_dir.as_str()),
            ("cluster_name", self.cluster_name.as_str()),
        ]);

        if self.controller_count == 0 {
            diagnostics.push(Diagnostic::error(
                "At least one controller is required",
                "controller_count must be 1 or more",
            ));
        }

        for (field, cidr) in [
            ("network.cidr", &self.network.cidr),
            ("network.subnet_cidr", &self.network.subnet_cidr),
        ] {
            if let Err(reason) = validate_cidr(cidr) {
                diagnostics.push(Diagnostic::error(
                    format!("Invalid CIDR notation in {}", field),
                    format!("{:?}: {}", cidr, reason),
                ));
            }
        }

        diagnostics.extend(check_not_empty_workers(self.worker_pools.len()));
        diagnostics.extend(check_worker_pool_names_unique(
            self.worker_pools.iter().map(|p| p.name.as_str()),
        ));

        diagnostics
    }
}

/// Accept `a.b.c.d/n` with a valid IPv4 address and `n <= 32`
fn validate_cidr(cidr: &str) -> Result<(), &'static str> {
    let (addr, prefix) = cidr.split_once('/').ok_or("missing prefix length")?;

    addr.parse::<Ipv4Addr>()
        .map_err(|_| "not an IPv4 address")?;

    match prefix.parse::<u8>() {
        Ok(len) if len <= 32 => Ok(()),
        _ => Err("prefix length must be between 0 and 32"),
    }
}

#[derive(Serialize)]
struct TemplateData<'a> {
    cluster_name: &'a str,
    location: &'a str,
    tags: &'a BTreeMap<String, String>,
    network: &'a NetworkConfig,
    image: &'a str,
    controller_count: u32,
    controller_type: &'a str,
    ssh_keys: &'a [String],
    default_pool: PoolData<'a>,
    extra_pools: Vec<PoolData<'a>>,
}

fn pool_data<'a>(pool: &'a WorkerPool, tags: &'a BTreeMap<String, String>) -> PoolData<'a> {
    PoolData::new(
        &pool.name,
        &pool.server_type,
        pool.count,
        &pool.labels,
        &pool.taints,
        tags,
    )
}

/// Terraform modules referenced as `../terraform-modules/hcloud/*` from the
/// Terraform root
const MODULES: &[BundledFile] = &[
    BundledFile {
        dir: "terraform-modules/hcloud/cluster",
        name: "main.tf",
        contents: template::CLUSTER_MODULE,
    },
    BundledFile {
        dir: "terraform-modules/hcloud/worker-pool",
        name: "main.tf",
        contents: template::WORKER_POOL_MODULE,
    },
];

/// The `hcloud` platform
#[derive(Debug, Default)]
pub struct Hcloud {
    config: HcloudConfig,
}

impl Hcloud {
    pub fn new(config: HcloudConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HcloudConfig {
        &self.config
    }
}

impl Platform for Hcloud {
    fn name(&self) -> &'static str {
        "hcloud"
    }

    fn load_config(&mut self, body: Option<&Value>, ctx: &EvalContext) -> Diagnostics {
        let Some(body) = body else {
            return Diagnostics::new();
        };

        match decode_body::<HcloudConfig>(body, ctx) {
            Ok(config) => self.config = config,
            Err(diagnostics) => return diagnostics,
        }

        self.config.validate()
    }

    fn meta(&self) -> ClusterMeta {
        ClusterMeta {
            asset_dir: self.config.asset_dir.clone(),
            expected_nodes: self.config.worker_pools.iter().map(|p| p.count).sum(),
            managed: false,
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
            cluster_name: &config.cluster_name,
            location: &config.location,
            tags: &tags,
            network: &config.network,
            image: &config.image,
            controller_count: config.controller_count,
            controller_type: &config.controller_type,
            ssh_keys: &config.ssh_keys,
            default_pool: pool_data(default_pool, &tags),
            extra_pools: extra_pools.iter().map(|p| pool_data(p, &tags)).collect(),
        };

        render_template("hcloud", template::CLUSTER_TEMPLATE, &data)
    }

    fn bundled_files(&self) -> &'static [BundledFile] {
        MODULES
    }
}

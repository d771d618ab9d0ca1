/// Provisioning platforms and the capability set they share
pub mod aks;
pub mod hcloud;
pub mod registry;
pub(crate) mod render;

pub use registry::{PlatformFactory, PlatformRegistry};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{ClusterBlock, Diagnostic, Diagnostics, EvalContext};
use crate::terraform::{self, Executor};
use crate::{Error, RenderError, Result};

/// Read-only summary of a validated platform configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMeta {
    /// Asset directory as configured (may start with `~`)
    pub asset_dir: String,
    /// Sum of all worker-pool counts
    pub expected_nodes: u32,
    /// Whether the control plane is run by the provider
    pub managed: bool,
}

impl ClusterMeta {
    /// Asset directory with a leading `~` expanded
    pub fn expanded_asset_dir(&self) -> std::result::Result<PathBuf, RenderError> {
        expand_home(&self.asset_dir)
    }
}

/// A file shipped with a platform and written into the asset directory next
/// to the cluster definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundledFile {
    /// Directory relative to the asset directory
    pub dir: &'static str,
    pub name: &'static str,
    pub contents: &'static str,
}

/// A provisioning backend.
///
/// Implementations hold their typed configuration. A fresh value comes from
/// the registry, `load_config` fills it in, and after that it is only read.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Name the platform is registered under
    fn name(&self) -> &'static str;

    /// Decode and validate the configuration body.
    ///
    /// An absent body keeps the defaults. All problems are reported; an empty
    /// list means success.
    fn load_config(&mut self, body: Option<&Value>, ctx: &EvalContext) -> Diagnostics;

    fn meta(&self) -> ClusterMeta;

    /// Render the Terraform input for this configuration. Pure.
    fn render(&self) -> std::result::Result<String, RenderError>;

    /// Module sources the rendered definition refers to
    fn bundled_files(&self) -> &'static [BundledFile] {
        &[]
    }

    /// Write the rendered cluster definition into the Terraform root of the
    /// asset directory, plus any bundled files, returning the definition's path
    fn initialize(&self) -> std::result::Result<PathBuf, RenderError> {
        let asset_dir = self.meta().expanded_asset_dir()?;
        let root = terraform::root_dir(&asset_dir);
        let contents = self.render()?;

        for file in self.bundled_files() {
            render::write_config_file(&asset_dir.join(file.dir), file.name, file.contents)?;
        }

        let path = render::write_config_file(&root, terraform::CLUSTER_FILE_NAME, &contents)?;
        info!("Cluster definition written to {}", path.display());
        Ok(path)
    }

    /// Initialize, then apply. Nothing reaches the executor if initializing fails.
    async fn apply(&self, executor: &mut Executor) -> Result<()> {
        self.initialize()?;
        executor.apply().await
    }

    /// Initialize, then destroy. Nothing reaches the executor if initializing fails.
    async fn destroy(&self, executor: &mut Executor) -> Result<()> {
        self.initialize()?;
        executor.destroy().await
    }
}

/// Look up the configured platform and load its configuration.
///
/// Any diagnostic aborts with `Error::Configuration` before anything touches
/// infrastructure.
pub fn load_platform(
    registry: &PlatformRegistry,
    cluster: &ClusterBlock,
    ctx: &EvalContext,
) -> Result<Box<dyn Platform>> {
    let mut platform = registry.create(&cluster.name)?;
    platform
        .load_config(cluster.config.as_ref(), ctx)
        .into_result()?;
    Ok(platform)
}

/// Resolve variables in `body` and decode it into `T`
pub(crate) fn decode_body<T: DeserializeOwned>(
    body: &Value,
    ctx: &EvalContext,
) -> std::result::Result<T, Diagnostics> {
    let resolved = ctx.resolve(body)?;
    serde_yaml::from_value(resolved).map_err(|e| {
        Diagnostics::from(Diagnostic::error(
            "Invalid cluster configuration",
            e.to_string(),
        ))
    })
}

/// At least one worker pool must be defined
pub(crate) fn check_not_empty_workers(pool_count: usize) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    if pool_count == 0 {
        diagnostics.push(Diagnostic::error(
            "At least one worker pool must be defined",
            "Make sure to define at least one worker pool in your cluster configuration",
        ));
    }

    diagnostics
}

/// One diagnostic per duplicated worker pool name, in order of first repeat
pub(crate) fn check_worker_pool_names_unique<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for name in names {
        if seen.insert(name) || !reported.insert(name) {
            continue;
        }

        diagnostics.push(Diagnostic::error(
            "Worker pools name should be unique",
            format!("Worker pool '{}' is duplicated", name),
        ));
    }

    diagnostics
}

/// Required string fields must not be blank
pub(crate) fn check_required(fields: &[(&str, &str)]) -> Diagnostics {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| {
            Diagnostic::error(
                format!("Missing required field \"{}\"", field),
                format!("The cluster configuration must set {}", field),
            )
        })
        .collect()
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_home(path: &str) -> std::result::Result<PathBuf, RenderError> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };

    if !rest.is_empty() && !rest.starts_with('/') {
        return Err(RenderError::AssetDir {
            path: path.to_string(),
            reason: "cannot expand user-specific home dir".to_string(),
        });
    }

    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RenderError::AssetDir {
            path: path.to_string(),
            reason: "HOME is not set".to_string(),
        })?;

    Ok(Path::new(&home).join(rest.trim_start_matches('/')))
}

/// The cluster block, or a configuration error when none is configured
pub fn require_cluster(cluster: Option<&ClusterBlock>) -> Result<&ClusterBlock> {
    cluster.ok_or_else(|| {
        Error::Configuration(Diagnostics::from(Diagnostic::error(
            "No cluster configured",
            "Add a cluster block with a platform name to the configuration",
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_pair_reported_once() {
        let diags = check_worker_pool_names_unique(["default", "default"]);
        assert_eq!(diags.len(), 1);
        assert!(diags.iter().next().unwrap().detail.contains("'default'"));
    }

    #[test]
    fn test_one_diagnostic_per_duplicated_name() {
        let diags = check_worker_pool_names_unique(["a", "b", "a", "a", "b", "c"]);
        let details: Vec<_> = diags.iter().map(|d| d.detail.as_str()).collect();
        assert_eq!(
            details,
            ["Worker pool 'a' is duplicated", "Worker pool 'b' is duplicated"]
        );
    }

    #[test]
    fn test_unique_names_pass() {
        assert!(check_worker_pool_names_unique(["a", "b", "c"]).is_empty());
    }

    #[test]
    fn test_empty_workers() {
        let diags = check_not_empty_workers(0);
        assert_eq!(diags.len(), 1);
        assert!(check_not_empty_workers(2).is_empty());
    }

    #[test]
    fn test_check_required() {
        let diags = check_required(&[("cluster_name", ""), ("tenant_id", "t"), ("asset_dir", "  ")]);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_expand_home() {
        let home = std::env::var("HOME").unwrap();
        assert_eq!(
            expand_home("~/clusters/demo").unwrap(),
            Path::new(&home).join("clusters/demo")
        );
        assert_eq!(expand_home("~").unwrap(), PathBuf::from(&home));
        assert_eq!(expand_home("/srv/demo").unwrap(), PathBuf::from("/srv/demo"));
        assert!(matches!(
            expand_home("~alice/demo"),
            Err(RenderError::AssetDir { .. })
        ));
    }

    #[test]
    fn test_require_cluster() {
        assert!(matches!(
            require_cluster(None),
            Err(Error::Configuration(_))
        ));
    }
}

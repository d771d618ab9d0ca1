/// Ordered component installation
use tracing::info;

use super::{ClusterHandle, ComponentBackend};
use crate::config::{ComponentSpec, Diagnostics};
use crate::{Error, Result};

/// Installs components one after another through a backend
pub struct Installer<'a> {
    backend: &'a dyn ComponentBackend,
}

impl<'a> Installer<'a> {
    pub fn new(backend: &'a dyn ComponentBackend) -> Self {
        Self { backend }
    }

    /// Collect configuration problems for every component
    pub fn validate(&self, specs: &[ComponentSpec]) -> Diagnostics {
        specs
            .iter()
            .flat_map(|spec| self.backend.validate(spec))
            .collect()
    }

    /// Install `specs` in order.
    ///
    /// Stops at the first failure; components installed before it stay in
    /// place.
    pub async fn install_components(
        &self,
        cluster: &ClusterHandle,
        specs: &[ComponentSpec],
    ) -> Result<()> {
        for (index, spec) in specs.iter().enumerate() {
            info!(
                component = %spec.name,
                "Installing component {}/{}: {}",
                index + 1,
                specs.len(),
                spec.name
            );

            self.backend
                .install(cluster, &spec.name, spec.config.as_ref())
                .await
                .map_err(|e| Error::ComponentInstall {
                    component: spec.name.clone(),
                    source: e.into(),
                })?;

            info!("✓ Component {} installed", spec.name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_yaml::Value;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records install calls and fails on the named component
    #[derive(Default)]
    struct RecordingBackend {
        installed: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl ComponentBackend for RecordingBackend {
        async fn install(
            &self,
            _cluster: &ClusterHandle,
            name: &str,
            _config: Option<&Value>,
        ) -> anyhow::Result<()> {
            self.installed.lock().unwrap().push(name.to_string());
            if self.fail_on == Some(name) {
                anyhow::bail!("release {} failed", name);
            }
            Ok(())
        }
    }

    fn handle() -> ClusterHandle {
        ClusterHandle {
            kubeconfig: PathBuf::from("/tmp/demo/auth/kubeconfig"),
            asset_dir: PathBuf::from("/tmp/demo"),
        }
    }

    fn specs(names: &[&str]) -> Vec<ComponentSpec> {
        names.iter().map(|n| ComponentSpec::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_installs_in_configured_order() {
        let backend = RecordingBackend::default();
        Installer::new(&backend)
            .install_components(&handle(), &specs(&["monitoring", "alerting"]))
            .await
            .unwrap();

        assert_eq!(*backend.installed.lock().unwrap(), ["monitoring", "alerting"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let backend = RecordingBackend {
            fail_on: Some("b"),
            ..Default::default()
        };

        let err = Installer::new(&backend)
            .install_components(&handle(), &specs(&["a", "b", "c", "d"]))
            .await
            .unwrap_err();

        match err {
            Error::ComponentInstall { component, source } => {
                assert_eq!(component, "b");
                assert_eq!(source.to_string(), "release b failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(*backend.installed.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_list() {
        let backend = RecordingBackend::default();
        assert!(Installer::new(&backend)
            .install_components(&handle(), &[])
            .await
            .is_ok());
        assert!(backend.installed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_validate_collects_all() {
        let backend = crate::components::HelmBackend::new();
        let diags = Installer::new(&backend).validate(&specs(&["metallb", "foo", "bar"]));
        assert_eq!(diags.len(), 2);
    }
}

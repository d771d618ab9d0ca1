/// Cluster readiness checks run after provisioning
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::k8s::ClusterApi;
use crate::platform::ClusterMeta;
use crate::utils::polling::{NotReady, PollingConfig, UnhealthyEntity};
use crate::Result;

/// Kubeconfig written by the rendered Terraform input
pub fn kubeconfig_path(asset_dir: &Path) -> PathBuf {
    asset_dir.join("auth").join("kubeconfig")
}

pub fn reachability_polling() -> PollingConfig {
    PollingConfig::new(20, Duration::from_secs(30), "Waiting for the cluster API")
}

pub fn nodes_polling() -> PollingConfig {
    PollingConfig::new(20, Duration::from_secs(30), "Waiting for nodes to be Ready")
}

/// Ready when a client can be built and the namespace list comes back.
///
/// `connect` is called on every attempt since the kubeconfig may not exist
/// yet while the control plane is still coming up.
pub async fn probe_reachable<C, F>(connect: &F) -> std::result::Result<(), NotReady>
where
    C: ClusterApi,
    F: Fn() -> Result<C>,
{
    let client = connect().map_err(NotReady::new)?;
    let namespaces = client
        .list_namespaces()
        .await
        .map_err(|e| NotReady::new(format!("{:#}", e)))?;

    info!("Cluster API answered with {} namespaces", namespaces.len());
    Ok(())
}

/// Ready when at least `expected` nodes report Ready
pub async fn probe_nodes_ready<C: ClusterApi + ?Sized>(
    client: &C,
    expected: u32,
) -> std::result::Result<u32, NotReady> {
    let nodes = client
        .list_nodes()
        .await
        .map_err(|e| NotReady::new(format!("{:#}", e)))?;

    let ready = nodes.iter().filter(|n| n.ready).count() as u32;
    if ready >= expected {
        return Ok(ready);
    }

    let unhealthy = nodes
        .iter()
        .filter(|n| !n.ready)
        .map(|n| UnhealthyEntity::new(&n.name, "NotReady"))
        .collect();

    Err(
        NotReady::new(format!("{} of {} expected nodes are Ready", ready, expected))
            .with_unhealthy(unhealthy),
    )
}

/// Poll until the cluster answers and, for self-managed clusters, until the
/// expected number of nodes is Ready.
pub async fn verify_cluster<C, F>(
    meta: &ClusterMeta,
    connect: F,
    reachability: &PollingConfig,
    nodes: &PollingConfig,
) -> Result<()>
where
    C: ClusterApi,
    F: Fn() -> Result<C>,
{
    reachability
        .poll(|| probe_reachable(&connect))
        .await
        .into_result()?;

    if meta.managed || meta.expected_nodes == 0 {
        return Ok(());
    }

    let client = connect()?;
    nodes
        .poll(|| probe_nodes_ready(&client, meta.expected_nodes))
        .await
        .into_result()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::NodeStatus;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Answers once `calls` reaches `ready_after`; nodes become Ready one per call
    #[derive(Clone)]
    struct FakeCluster {
        calls: Arc<AtomicU32>,
        ready_after: u32,
        nodes: Vec<NodeStatus>,
    }

    impl FakeCluster {
        fn new(ready_after: u32) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                ready_after,
                nodes: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.ready_after {
                anyhow::bail!("connection refused");
            }
            Ok(vec!["default".to_string(), "kube-system".to_string()])
        }

        async fn list_nodes(&self) -> anyhow::Result<Vec<NodeStatus>> {
            Ok(self.nodes.clone())
        }
    }

    fn fast(max_attempts: u32) -> PollingConfig {
        PollingConfig::new(max_attempts, Duration::from_millis(1), "test")
    }

    fn meta(managed: bool, expected_nodes: u32) -> ClusterMeta {
        ClusterMeta {
            asset_dir: "/tmp/demo".to_string(),
            expected_nodes,
            managed,
        }
    }

    #[test]
    fn test_kubeconfig_path() {
        assert_eq!(
            kubeconfig_path(Path::new("/srv/demo")),
            PathBuf::from("/srv/demo/auth/kubeconfig")
        );
    }

    #[tokio::test]
    async fn test_reachable_after_retries() {
        let cluster = FakeCluster::new(3);
        let calls = cluster.calls.clone();

        let connect = || -> Result<FakeCluster> { Ok(cluster.clone()) };
        let result = fast(5).poll(|| probe_reachable(&connect)).await;

        assert!(result.succeeded());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_consumes_attempts() {
        let connect = || -> Result<FakeCluster> {
            Err(Error::Kubeconfig {
                path: PathBuf::from("/tmp/demo/auth/kubeconfig"),
                reason: "No such file or directory".to_string(),
            })
        };

        let result = fast(3).poll(|| probe_reachable(&connect)).await;

        assert!(!result.succeeded());
        assert_eq!(result.attempts, 3);
        assert!(result.last_error.unwrap().contains("No such file"));
    }

    #[tokio::test]
    async fn test_nodes_ready_reports_stragglers() {
        let mut cluster = FakeCluster::new(1);
        cluster.nodes = vec![
            NodeStatus::new("worker-0", true),
            NodeStatus::new("worker-1", false),
        ];

        let err = probe_nodes_ready(&cluster, 2).await.unwrap_err();
        assert_eq!(err.cause, "1 of 2 expected nodes are Ready");
        assert_eq!(
            err.unhealthy,
            Some(vec![UnhealthyEntity::new("worker-1", "NotReady")])
        );

        assert_eq!(probe_nodes_ready(&cluster, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_managed_cluster_skips_node_check() {
        // No nodes listed: the node check would never pass
        let cluster = FakeCluster::new(1);
        let result = verify_cluster(
            &meta(true, 3),
            || Ok(cluster.clone()),
            &fast(2),
            &fast(2),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unmanaged_cluster_times_out_on_nodes() {
        let mut cluster = FakeCluster::new(1);
        cluster.nodes = vec![NodeStatus::new("worker-0", false)];

        let err = verify_cluster(
            &meta(false, 1),
            || Ok(cluster.clone()),
            &fast(2),
            &fast(2),
        )
        .await
        .unwrap_err();

        match err {
            Error::ReadinessTimeout {
                attempts,
                unhealthy,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(unhealthy, vec![UnhealthyEntity::new("worker-0", "NotReady")]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

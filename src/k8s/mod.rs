/// Kubernetes cluster access
pub mod client;
pub mod nodes;

pub use client::{ClusterApi, KubernetesClient};
pub use nodes::NodeStatus;

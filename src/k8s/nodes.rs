/// Kubernetes node status
use anyhow::Result;

/// One line per node: name, a tab, then the Ready condition status
pub(crate) const NODE_READY_JSONPATH: &str = r#"{range .items[*]}{.metadata.name}{"\t"}{.status.conditions[?(@.type=="Ready")].status}{"\n"}{end}"#;

/// Ready state of a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub name: String,
    pub ready: bool,
}

impl NodeStatus {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
        }
    }
}

/// Parse the output of `kubectl get nodes -o jsonpath=NODE_READY_JSONPATH`
pub(crate) fn parse_node_statuses(output: &str) -> Result<Vec<NodeStatus>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, status) = line
                .split_once('\t')
                .ok_or_else(|| anyhow::anyhow!("malformed node line: {:?}", line))?;

            // A node without a Ready condition yet reports an empty status
            Ok(NodeStatus::new(
                name.trim(),
                status.trim().eq_ignore_ascii_case("true"),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_statuses() {
        let output = "worker-0\tTrue\nworker-1\tFalse\nworker-2\t\n\n";
        let nodes = parse_node_statuses(output).unwrap();

        assert_eq!(
            nodes,
            [
                NodeStatus::new("worker-0", true),
                NodeStatus::new("worker-1", false),
                NodeStatus::new("worker-2", false),
            ]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_node_statuses("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_line() {
        assert!(parse_node_statuses("worker-0 True\n").is_err());
    }
}

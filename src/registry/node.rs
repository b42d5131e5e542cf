use crate::ID;
use crate::orchestrator::task::TaskId;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;

pub type NodeId = ID<ComputeNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Available,
    Busy,
    Offline,
}

/// what a worker announces about itself when registering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub node_id: Option<NodeId>,
    pub platform: String,
    pub cpu_count: usize,
    pub memory_total_mb: f64,
    pub max_concurrent: usize,
}

/// one worker process as the registry sees it. the registry record is
/// the sole source of truth for liveness; nobody second-guesses it.
#[derive(Debug, Clone, Serialize)]
pub struct ComputeNode {
    pub node_id: NodeId,
    pub platform: String,
    pub cpu_count: usize,
    pub memory_total_mb: f64,
    pub max_concurrent: usize,
    pub current_tasks: Vec<TaskId>,
    pub status: NodeStatus,
    pub total_completed: usize,
    /// wall clock of the last heartbeat, for api consumers
    pub last_heartbeat_ms: u64,
    /// monotonic clock of the last heartbeat, for liveness math
    #[serde(skip_serializing)]
    pub last_seen: Instant,
}

impl ComputeNode {
    pub fn fresh(spec: NodeSpec) -> Self {
        Self {
            node_id: spec.node_id.unwrap_or_default(),
            platform: spec.platform,
            cpu_count: spec.cpu_count,
            memory_total_mb: spec.memory_total_mb,
            max_concurrent: spec.max_concurrent.max(1),
            current_tasks: Vec::new(),
            status: NodeStatus::Available,
            total_completed: 0,
            last_heartbeat_ms: crate::clock(),
            last_seen: Instant::now(),
        }
    }

    /// busy exactly when work is attributed
    pub fn refresh_status(&mut self) {
        self.status = match self.current_tasks.len() {
            0 => NodeStatus::Available,
            _ => NodeStatus::Busy,
        };
        assert!(self.current_tasks.len() <= self.max_concurrent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_nodes_are_available() {
        let node = ComputeNode::fresh(NodeSpec {
            node_id: None,
            platform: String::from("linux"),
            cpu_count: 8,
            memory_total_mb: 16384.0,
            max_concurrent: 4,
        });
        assert!(node.status == NodeStatus::Available);
        assert!(node.current_tasks.is_empty());
    }

    #[test]
    fn status_tracks_attribution() {
        let mut node = ComputeNode::fresh(NodeSpec {
            node_id: None,
            platform: String::from("linux"),
            cpu_count: 1,
            memory_total_mb: 1024.0,
            max_concurrent: 2,
        });
        node.current_tasks.push(TaskId::new());
        node.refresh_status();
        assert!(node.status == NodeStatus::Busy);
        node.current_tasks.clear();
        node.refresh_status();
        assert!(node.status == NodeStatus::Available);
    }
}

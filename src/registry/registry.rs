use super::RegistryError;
use super::node::ComputeNode;
use super::node::NodeId;
use super::node::NodeSpec;
use super::node::NodeStatus;
use crate::bus::messages::Heartbeat;
use crate::orchestrator::task::TaskId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

/// tracks every worker the fleet has heard from: identity, capacity,
/// liveness, and which tasks are attributed where. records live
/// behind per-node locks; the outer map lock is held only to find
/// them.
pub struct Registry {
    nodes: RwLock<BTreeMap<NodeId, Arc<Mutex<ComputeNode>>>>,
    offline_after: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_offline_after(Duration::from_secs(crate::OFFLINE_AFTER_SECS))
    }
    pub fn with_offline_after(offline_after: Duration) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            offline_after,
        }
    }

    fn find(&self, id: &NodeId) -> Option<Arc<Mutex<ComputeNode>>> {
        self.nodes.read().expect("registry lock").get(id).cloned()
    }

    /// idempotent upsert. a returning node comes back AVAILABLE with
    /// a fresh heartbeat, keeping its completion count.
    pub fn register(&self, spec: NodeSpec) -> NodeId {
        let id = spec.node_id.unwrap_or_default();
        let spec = NodeSpec {
            node_id: Some(id),
            ..spec
        };
        match self.find(&id) {
            Some(node) => {
                let mut node = node.lock().expect("node lock");
                node.platform = spec.platform;
                node.cpu_count = spec.cpu_count;
                node.memory_total_mb = spec.memory_total_mb;
                node.max_concurrent = spec.max_concurrent.max(1);
                node.status = NodeStatus::Available;
                node.last_heartbeat_ms = crate::clock();
                node.last_seen = Instant::now();
            }
            None => {
                log::info!("registering compute node {}", id);
                self.nodes
                    .write()
                    .expect("registry lock")
                    .insert(id, Arc::new(Mutex::new(ComputeNode::fresh(spec))));
            }
        }
        id
    }

    /// telemetry update from a known node
    pub fn heartbeat(&self, id: &NodeId, telemetry: &Heartbeat) -> Result<(), RegistryError> {
        let node = self.find(id).ok_or(RegistryError::NotFound)?;
        let mut node = node.lock().expect("node lock");
        node.cpu_count = telemetry.cpu_count;
        node.memory_total_mb = telemetry.memory_total_mb;
        node.max_concurrent = telemetry.max_concurrent.max(1);
        node.current_tasks = telemetry.current_tasks.clone();
        let max_concurrent = node.max_concurrent;
        node.current_tasks.truncate(max_concurrent);
        node.total_completed = node.total_completed.max(telemetry.total_completed);
        node.last_heartbeat_ms = crate::clock();
        node.last_seen = Instant::now();
        node.refresh_status();
        Ok(())
    }

    /// heartbeat off the bus: upserts unknown nodes, since a worker
    /// may come up before anyone registered it over http
    pub fn observe(&self, telemetry: &Heartbeat) {
        if self.find(&telemetry.node_id).is_none() {
            self.register(NodeSpec {
                node_id: Some(telemetry.node_id),
                platform: telemetry.platform.clone(),
                cpu_count: telemetry.cpu_count,
                memory_total_mb: telemetry.memory_total_mb,
                max_concurrent: telemetry.max_concurrent,
            });
        }
        let _ = self.heartbeat(&telemetry.node_id, telemetry);
    }

    /// tie a dispatched task to the node holding it
    pub fn attribute(&self, id: &NodeId, task: TaskId) -> Result<(), RegistryError> {
        let node = self.find(id).ok_or(RegistryError::NotFound)?;
        let mut node = node.lock().expect("node lock");
        if node.current_tasks.contains(&task) {
            return Ok(());
        }
        if node.current_tasks.len() >= node.max_concurrent {
            return Err(RegistryError::Saturated);
        }
        node.current_tasks.push(task);
        node.refresh_status();
        Ok(())
    }

    /// the task reached a terminal outcome on this node
    pub fn release(&self, id: &NodeId, task: TaskId, completed: bool) {
        if let Some(node) = self.find(id) {
            let mut node = node.lock().expect("node lock");
            node.current_tasks.retain(|t| *t != task);
            if completed {
                node.total_completed += 1;
            }
            node.refresh_status();
        }
    }

    /// dispatch candidates: available first, least loaded first,
    /// most recently seen first
    pub fn list_available(&self) -> Vec<ComputeNode> {
        let mut nodes = self
            .list()
            .into_iter()
            .filter(|n| n.status != NodeStatus::Offline)
            .filter(|n| n.current_tasks.len() < n.max_concurrent)
            .collect::<Vec<ComputeNode>>();
        nodes.sort_by(|a, b| {
            (b.status == NodeStatus::Available)
                .cmp(&(a.status == NodeStatus::Available))
                .then(a.current_tasks.len().cmp(&b.current_tasks.len()))
                .then(b.last_heartbeat_ms.cmp(&a.last_heartbeat_ms))
        });
        nodes
    }

    pub fn list(&self) -> Vec<ComputeNode> {
        self.nodes
            .read()
            .expect("registry lock")
            .values()
            .map(|n| n.lock().expect("node lock").clone())
            .collect()
    }

    pub fn get(&self, id: &NodeId) -> Option<ComputeNode> {
        self.find(id).map(|n| n.lock().expect("node lock").clone())
    }

    pub fn remove(&self, id: &NodeId) -> bool {
        self.nodes
            .write()
            .expect("registry lock")
            .remove(id)
            .is_some()
    }

    /// sweep stale records into OFFLINE. returns the tasks that were
    /// attributed to each freshly-dead node so the orchestrator can
    /// reissue them.
    pub fn evict_offline(&self) -> Vec<(NodeId, Vec<TaskId>)> {
        let mut evicted = Vec::new();
        for node in self.nodes.read().expect("registry lock").values() {
            let mut node = node.lock().expect("node lock");
            if node.status != NodeStatus::Offline && node.last_seen.elapsed() > self.offline_after {
                log::warn!("compute node {} went offline", node.node_id);
                node.status = NodeStatus::Offline;
                let orphans = std::mem::take(&mut node.current_tasks);
                evicted.push((node.node_id, orphans));
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NodeSpec {
        NodeSpec {
            node_id: None,
            platform: String::from("linux"),
            cpu_count: 4,
            memory_total_mb: 8192.0,
            max_concurrent: 2,
        }
    }

    fn telemetry(id: NodeId, tasks: Vec<TaskId>) -> Heartbeat {
        Heartbeat {
            node_id: id,
            platform: String::from("linux"),
            cpu_count: 4,
            memory_total_mb: 8192.0,
            max_concurrent: 2,
            current_tasks: tasks,
            total_completed: 0,
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let id = registry.register(spec());
        let again = registry.register(NodeSpec {
            node_id: Some(id),
            ..spec()
        });
        assert!(id == again);
        assert!(registry.list().len() == 1);
        assert!(registry.get(&id).unwrap().status == NodeStatus::Available);
    }

    #[test]
    fn attribution_respects_capacity() {
        let registry = Registry::new();
        let id = registry.register(spec());
        assert!(registry.attribute(&id, TaskId::new()).is_ok());
        assert!(registry.attribute(&id, TaskId::new()).is_ok());
        assert!(matches!(
            registry.attribute(&id, TaskId::new()),
            Err(RegistryError::Saturated)
        ));
        let node = registry.get(&id).unwrap();
        assert!(node.status == NodeStatus::Busy);
        assert!(node.current_tasks.len() <= node.max_concurrent);
    }

    #[test]
    fn release_flips_back_to_available() {
        let registry = Registry::new();
        let id = registry.register(spec());
        let task = TaskId::new();
        registry.attribute(&id, task).unwrap();
        registry.release(&id, task, true);
        let node = registry.get(&id).unwrap();
        assert!(node.status == NodeStatus::Available);
        assert!(node.total_completed == 1);
    }

    #[test]
    fn eviction_returns_orphaned_tasks() {
        let registry = Registry::with_offline_after(Duration::from_millis(0));
        let id = registry.register(spec());
        let task = TaskId::new();
        registry.attribute(&id, task).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let evicted = registry.evict_offline();
        assert!(evicted.len() == 1);
        assert!(evicted[0].0 == id);
        assert!(evicted[0].1 == vec![task]);
        assert!(registry.get(&id).unwrap().status == NodeStatus::Offline);
        // a fresh heartbeat resurrects the node
        registry.observe(&telemetry(id, vec![]));
        assert!(registry.get(&id).unwrap().status == NodeStatus::Available);
    }

    #[test]
    fn available_ordering_prefers_idle_nodes() {
        let registry = Registry::new();
        let a = registry.register(spec());
        let b = registry.register(spec());
        registry.attribute(&a, TaskId::new()).unwrap();
        let ranked = registry.list_available();
        assert!(ranked[0].node_id == b);
        assert!(ranked[1].node_id == a);
    }
}

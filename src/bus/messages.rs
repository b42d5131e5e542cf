use super::BusError;
use super::envelope::Envelope;
use super::queue::Queue;
use crate::cards::hand::Hole;
use crate::cfr::Variant;
use crate::cfr::node::Solution;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::game::Game;
use crate::orchestrator::simulation::SimId;
use crate::orchestrator::simulation::SimKind;
use crate::orchestrator::task::TaskId;
use crate::registry::node::NodeId;
use serde::Deserialize;
use serde::Serialize;

/// one unit of work: solve a subtree for one updating player at one
/// iteration. everything a worker needs rides in the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub simulation_id: SimId,
    pub iteration: usize,
    pub kind: SimKind,
    pub retry_count: usize,
    pub payload: TaskPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub variant: Variant,
    pub root_state: Game,
    pub player_to_update: usize,
    pub sampled_hand: Option<Hole>,
    pub abstraction_params: AbstractionParams,
    /// cumulative regrets as of this wave. workers hold no state of
    /// their own, so the strategy they regret-match against rides in;
    /// a retried task is then a pure function of its payload.
    pub regrets: crate::cfr::node::DeltaMap,
    pub discounting: bool,
    pub alpha: f64,
    /// derives every sampling stream the task may open
    pub seed: u64,
    /// server-side walltime budget for the whole task
    pub budget_ms: u64,
}

impl TaskEnvelope {
    pub const KIND: &'static str = "task";
    pub fn seal(&self) -> Result<Envelope, BusError> {
        Envelope::pack(Self::KIND, self)
    }
    pub fn queue(&self) -> Queue {
        match self.kind {
            SimKind::Preflop => Queue::PreflopTasks,
            SimKind::Postflop => Queue::PostflopTasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// what a worker sends back, success or not. results are folded
/// idempotently by task id, so redelivery is harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultEnvelope {
    pub task_id: TaskId,
    pub simulation_id: SimId,
    pub node_id: NodeId,
    pub status: ResultStatus,
    pub execution_ms: u64,
    pub memory_mb: f64,
    pub results: Option<Solution>,
    pub error: Option<String>,
}

impl TaskResultEnvelope {
    pub const KIND: &'static str = "task_result";
    pub fn seal(&self) -> Result<Envelope, BusError> {
        Envelope::pack(Self::KIND, self)
    }
}

/// periodic node telemetry. held task ids ride along so the
/// orchestrator can reissue work attributed to a node that dies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: NodeId,
    pub platform: String,
    pub cpu_count: usize,
    pub memory_total_mb: f64,
    pub max_concurrent: usize,
    pub current_tasks: Vec<TaskId>,
    pub total_completed: usize,
}

impl Heartbeat {
    pub const KIND: &'static str = "heartbeat";
    pub fn seal(&self) -> Result<Envelope, BusError> {
        Envelope::pack(Self::KIND, self)
    }
}

/// orchestrator-to-worker signalling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Control {
    CancelSimulation { simulation_id: SimId },
}

impl Control {
    pub const KIND: &'static str = "control";
    pub fn seal(&self) -> Result<Envelope, BusError> {
        Envelope::pack(Self::KIND, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::config::GameConfig;

    fn task() -> TaskEnvelope {
        TaskEnvelope {
            task_id: TaskId::new(),
            simulation_id: SimId::new(),
            iteration: 3,
            kind: SimKind::Preflop,
            retry_count: 0,
            payload: TaskPayload {
                variant: Variant::Vanilla,
                root_state: Game::root(GameConfig::default()),
                player_to_update: 1,
                sampled_hand: None,
                abstraction_params: AbstractionParams::default(),
                regrets: Default::default(),
                discounting: false,
                alpha: 0.5,
                seed: 99,
                budget_ms: 30_000,
            },
        }
    }

    #[test]
    fn task_envelope_roundtrips() {
        let task = task();
        let sealed = task.seal().unwrap();
        let raw = sealed.encode().unwrap();
        let opened: TaskEnvelope = Envelope::decode(&raw).unwrap().open().unwrap();
        assert!(opened.task_id == task.task_id);
        assert!(opened.iteration == task.iteration);
        assert!(opened.payload.seed == task.payload.seed);
        assert!(opened.payload.player_to_update == 1);
    }

    #[test]
    fn result_envelope_roundtrips() {
        let result = TaskResultEnvelope {
            task_id: TaskId::new(),
            simulation_id: SimId::new(),
            node_id: NodeId::new(),
            status: ResultStatus::Completed,
            execution_ms: 12,
            memory_mb: 64.0,
            results: Some(Solution::default()),
            error: None,
        };
        let opened: TaskResultEnvelope = result.seal().unwrap().open().unwrap();
        assert!(opened.task_id == result.task_id);
        assert!(opened.status == ResultStatus::Completed);
    }

    #[test]
    fn kind_routes_to_queue() {
        assert!(task().queue() == Queue::PreflopTasks);
    }

    #[test]
    fn control_is_tagged() {
        let control = Control::CancelSimulation {
            simulation_id: SimId::new(),
        };
        let json = serde_json::to_string(&control).unwrap();
        assert!(json.contains("cancel_simulation"));
    }
}

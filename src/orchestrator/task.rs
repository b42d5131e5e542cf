use super::simulation::SimId;
use crate::ID;
use crate::bus::messages::TaskEnvelope;
use crate::registry::node::NodeId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

pub type TaskId = ID<Task>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Dispatched,
    Done,
    Failed,
    Timeout,
}

impl TaskState {
    /// DONE and FAILED stick; TIMEOUT re-enters the queue
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// orchestrator-side bookkeeping for one dispatched unit of work.
/// the envelope is kept verbatim so retries republish byte-identical
/// payloads.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub simulation: SimId,
    pub iteration: usize,
    pub state: TaskState,
    pub retry_count: usize,
    pub node: Option<NodeId>,
    pub dispatched_at: Option<Instant>,
    pub envelope: TaskEnvelope,
}

impl Task {
    pub fn fresh(envelope: TaskEnvelope) -> Self {
        Self {
            id: envelope.task_id,
            simulation: envelope.simulation_id,
            iteration: envelope.iteration,
            state: TaskState::Pending,
            retry_count: envelope.retry_count,
            node: None,
            dispatched_at: None,
            envelope,
        }
    }
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
    pub fn dispatched(&mut self) {
        self.state = TaskState::Dispatched;
        self.dispatched_at = Some(Instant::now());
    }
}

/// all tasks emitted for one iteration of one simulation. the wave
/// closes when every non-discardable task is terminal; only then does
/// the iteration counter move.
#[derive(Debug, Clone)]
pub struct Wave {
    pub iteration: usize,
    pub open: BTreeSet<TaskId>,
    pub total: usize,
    /// tasks lost past the retry cap but tolerated by a sampled run
    pub lost: usize,
}

impl Wave {
    pub fn new(iteration: usize, tasks: impl IntoIterator<Item = TaskId>) -> Self {
        let open = tasks.into_iter().collect::<BTreeSet<_>>();
        let total = open.len();
        Self {
            iteration,
            open,
            total,
            lost: 0,
        }
    }
    pub fn is_closed(&self) -> bool {
        self.open.is_empty()
    }
    pub fn lost_fraction(&self) -> f64 {
        match self.total {
            0 => 0.0,
            total => self.lost as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_closes_when_drained() {
        let a = TaskId::new();
        let b = TaskId::new();
        let mut wave = Wave::new(1, vec![a, b]);
        assert!(!wave.is_closed());
        wave.open.remove(&a);
        wave.open.remove(&b);
        assert!(wave.is_closed());
        assert!(wave.total == 2);
    }

    #[test]
    fn lost_fraction_is_relative() {
        let mut wave = Wave::new(1, (0..10).map(|_| TaskId::new()));
        wave.lost = 1;
        assert!((wave.lost_fraction() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Timeout.is_terminal());
        assert!(!TaskState::Dispatched.is_terminal());
    }
}

use crate::orchestrator::simulation::SimId;
use crate::orchestrator::simulation::SimStatus;
use crate::orchestrator::simulation::Simulation;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Created {
    pub simulation_id: SimId,
    pub status: SimStatus,
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub status: SimStatus,
    pub progress_percentage: f64,
    pub iterations_completed: usize,
    pub total_iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_exploitability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    pub stalled: bool,
}

impl From<&Simulation> for Status {
    fn from(sim: &Simulation) -> Self {
        Self {
            status: sim.status,
            progress_percentage: sim.progress_percentage(),
            iterations_completed: sim.iterations_completed,
            total_iterations: sim.spec.solver_config.max_iterations,
            current_exploitability: sim.current_exploitability,
            estimated_time_remaining: sim.estimated_time_remaining_secs(),
            stalled: sim.stalled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub simulation_id: SimId,
    pub name: Option<String>,
    pub simulation_type: String,
    pub status: SimStatus,
    pub iterations_completed: usize,
    pub created_at: u64,
}

impl From<&Simulation> for SimulationSummary {
    fn from(sim: &Simulation) -> Self {
        Self {
            simulation_id: sim.id,
            name: sim.spec.name.clone(),
            simulation_type: sim.spec.kind.to_string(),
            status: sim.status,
            iterations_completed: sim.iterations_completed,
            created_at: sim.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub preflop_tasks: usize,
    pub postflop_tasks: usize,
    pub pending_results: usize,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_omits_absent_fields() {
        let status = Status {
            status: SimStatus::Pending,
            progress_percentage: 0.0,
            iterations_completed: 0,
            total_iterations: 100,
            current_exploitability: None,
            estimated_time_remaining: None,
            stalled: false,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("current_exploitability"));
        assert!(json.contains("PENDING"));
    }
}

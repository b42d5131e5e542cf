use crate::cfr::Variant;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::config::GameConfig;
use crate::orchestrator::simulation::SimKind;
use crate::orchestrator::simulation::SimulationSpec;
use crate::orchestrator::simulation::SolverConfig;
use serde::Deserialize;

/// POST /simulations body. solver flags arrive in the legacy shape
/// (use_chance_sampling / use_discounting) with an optional explicit
/// variant that wins when present.
#[derive(Debug, Deserialize)]
pub struct CreateSimulation {
    pub simulation_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub game_config: GameConfig,
    pub solver_config: SolverBody,
}

#[derive(Debug, Deserialize)]
pub struct SolverBody {
    pub max_iterations: usize,
    pub target_exploitability: f64,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub use_chance_sampling: bool,
    #[serde(default)]
    pub use_discounting: bool,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default)]
    pub checkpoint_frequency: Option<usize>,
    #[serde(default)]
    pub exploitability_samples: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TryFrom<CreateSimulation> for SimulationSpec {
    type Error = String;
    fn try_from(body: CreateSimulation) -> Result<Self, Self::Error> {
        let kind = match body.simulation_type.as_str() {
            "preflop" => SimKind::Preflop,
            "postflop" => SimKind::Postflop,
            other => return Err(format!("unknown simulation type: {}", other)),
        };
        let variant = match body.solver_config.variant.as_deref() {
            Some("vanilla") => Variant::Vanilla,
            Some("chance_sampling") => Variant::ChanceSampling,
            Some("plus") => Variant::Plus,
            Some(other) => return Err(format!("unknown variant: {}", other)),
            None if body.solver_config.use_chance_sampling => Variant::ChanceSampling,
            None => Variant::Vanilla,
        };
        let solver = &body.solver_config;
        Ok(SimulationSpec {
            kind,
            name: body.name,
            description: body.description,
            game_config: body.game_config,
            solver_config: SolverConfig {
                max_iterations: solver.max_iterations,
                target_exploitability: solver.target_exploitability,
                variant,
                batch_size: solver.batch_size.unwrap_or(32),
                discounting: solver.use_discounting,
                alpha: solver.alpha.unwrap_or(0.5),
                beta: solver.beta.unwrap_or(0.0),
                checkpoint_frequency: solver.checkpoint_frequency.unwrap_or(0),
                exploitability_cadence: crate::EXPLOITABILITY_CADENCE,
                exploitability_samples: solver
                    .exploitability_samples
                    .unwrap_or(crate::EXPLOITABILITY_SAMPLES),
                abstraction: AbstractionParams::default(),
                loss_fraction: crate::LOSS_FRACTION,
                partitions: 1,
                seed: solver.seed.unwrap_or(0),
                task_timeout_ms: crate::TASK_TIMEOUT_SECS * 1000,
            },
        })
    }
}

/// POST /compute-nodes/{id}/heartbeat body; the node id comes from
/// the path
#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub cpu_count: usize,
    #[serde(default)]
    pub memory_total_mb: f64,
    #[serde(default = "HeartbeatBody::one")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub current_tasks: Vec<crate::orchestrator::task::TaskId>,
    #[serde(default)]
    pub total_completed: usize,
}

impl HeartbeatBody {
    fn one() -> usize {
        1
    }
    pub fn telemetry(self, node_id: crate::registry::node::NodeId) -> crate::bus::messages::Heartbeat {
        crate::bus::messages::Heartbeat {
            node_id,
            platform: self.platform.unwrap_or_else(|| String::from("unknown")),
            cpu_count: self.cpu_count,
            memory_total_mb: self.memory_total_mb,
            max_concurrent: self.max_concurrent,
            current_tasks: self.current_tasks,
            total_completed: self.total_completed,
        }
    }
}

/// incoming websocket frames
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        simulation_id: Option<String>,
    },
    Ping,
}

use crate::ID;
use crate::cfr::Variant;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::config::GameConfig;
use serde::Deserialize;
use serde::Serialize;

pub type SimId = ID<Simulation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimKind {
    Preflop,
    Postflop,
}

impl std::fmt::Display for SimKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Preflop => write!(f, "preflop"),
            Self::Postflop => write!(f, "postflop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SimStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
    /// forward-only lifecycle
    pub fn may_become(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for SimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    pub target_exploitability: f64,
    pub variant: Variant,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub discounting: bool,
    #[serde(default = "defaults::alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    /// iterations between checkpoints; 0 disables them
    #[serde(default)]
    pub checkpoint_frequency: usize,
    #[serde(default = "defaults::exploitability_cadence")]
    pub exploitability_cadence: usize,
    #[serde(default = "defaults::exploitability_samples")]
    pub exploitability_samples: usize,
    #[serde(default)]
    pub abstraction: AbstractionParams,
    /// tolerated fraction of permanently-lost tasks per wave, for
    /// sampled variants only
    #[serde(default = "defaults::loss_fraction")]
    pub loss_fraction: f64,
    /// subtree partitions per wave for exhaustive variants
    #[serde(default = "defaults::partitions")]
    pub partitions: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "defaults::task_timeout_ms")]
    pub task_timeout_ms: u64,
}

mod defaults {
    pub fn batch_size() -> usize {
        32
    }
    pub fn alpha() -> f64 {
        0.5
    }
    pub fn exploitability_cadence() -> usize {
        crate::EXPLOITABILITY_CADENCE
    }
    pub fn exploitability_samples() -> usize {
        crate::EXPLOITABILITY_SAMPLES
    }
    pub fn loss_fraction() -> f64 {
        crate::LOSS_FRACTION
    }
    pub fn partitions() -> usize {
        1
    }
    pub fn task_timeout_ms() -> u64 {
        crate::TASK_TIMEOUT_SECS * 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSpec {
    pub kind: SimKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub game_config: GameConfig,
    pub solver_config: SolverConfig,
}

impl SimulationSpec {
    pub fn validate(&self) -> Result<(), String> {
        self.game_config.validate()?;
        let solver = &self.solver_config;
        if solver.max_iterations == 0 {
            return Err(String::from("iteration budget must be positive"));
        }
        if solver.target_exploitability < 0.0 {
            return Err(String::from("exploitability target must be nonnegative"));
        }
        if solver.variant.is_sampled() && solver.batch_size == 0 {
            return Err(String::from("sampled variants need a positive batch size"));
        }
        if solver.partitions == 0 {
            return Err(String::from("at least one partition per wave"));
        }
        if !(0.0..1.0).contains(&solver.loss_fraction) {
            return Err(String::from("loss fraction must be in [0, 1)"));
        }
        if solver.exploitability_samples == 0 {
            return Err(String::from("exploitability needs a sample budget"));
        }
        if self.kind == SimKind::Postflop {
            if let Some(ref board) = self.game_config.board {
                crate::cards::board::Board::try_from(board.as_str())?;
            }
        }
        Ok(())
    }
}

/// the record the orchestrator owns for one solve
#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    pub id: SimId,
    pub spec: SimulationSpec,
    pub status: SimStatus,
    pub iterations_completed: usize,
    pub current_exploitability: Option<f64>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    /// running but unable to dispatch or aggregate: broker trouble
    pub stalled: bool,
    pub error: Option<String>,
}

impl Simulation {
    pub fn fresh(spec: SimulationSpec) -> Self {
        Self {
            id: SimId::new(),
            spec,
            status: SimStatus::Pending,
            iterations_completed: 0,
            current_exploitability: None,
            created_at: crate::clock(),
            started_at: None,
            finished_at: None,
            stalled: false,
            error: None,
        }
    }

    pub fn progress_percentage(&self) -> f64 {
        match self.spec.solver_config.max_iterations {
            0 => 0.0,
            max => 100.0 * self.iterations_completed.min(max) as f64 / max as f64,
        }
    }

    pub fn estimated_time_remaining_secs(&self) -> Option<u64> {
        let started = self.started_at?;
        if self.status != SimStatus::Running || self.iterations_completed == 0 {
            return None;
        }
        let elapsed = crate::clock().saturating_sub(started) as f64 / 1000.0;
        let rate = self.iterations_completed as f64 / elapsed.max(1e-3);
        let left = self
            .spec
            .solver_config
            .max_iterations
            .saturating_sub(self.iterations_completed);
        Some((left as f64 / rate.max(1e-9)) as u64)
    }

    /// guarded, forward-only status change
    pub fn transition(&mut self, next: SimStatus) -> bool {
        if self.status.may_become(next) {
            log::info!("simulation {} {} -> {}", self.id, self.status, next);
            self.status = next;
            match next {
                SimStatus::Running => self.started_at = Some(crate::clock()),
                s if s.is_terminal() => self.finished_at = Some(crate::clock()),
                _ => {}
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn spec() -> SimulationSpec {
        SimulationSpec {
            kind: SimKind::Preflop,
            name: None,
            description: None,
            game_config: GameConfig::default(),
            solver_config: SolverConfig {
                max_iterations: 100,
                target_exploitability: 5.0,
                variant: Variant::Vanilla,
                batch_size: 32,
                discounting: false,
                alpha: 0.5,
                beta: 0.0,
                checkpoint_frequency: 0,
                exploitability_cadence: 50,
                exploitability_samples: 16,
                abstraction: AbstractionParams::default(),
                loss_fraction: 0.1,
                partitions: 1,
                seed: 0,
                task_timeout_ms: 30_000,
            },
        }
    }

    #[test]
    fn status_transitions_are_forward_only() {
        let mut sim = Simulation::fresh(spec());
        assert!(!sim.transition(SimStatus::Completed));
        assert!(sim.transition(SimStatus::Running));
        assert!(!sim.transition(SimStatus::Pending));
        assert!(sim.transition(SimStatus::Completed));
        assert!(!sim.transition(SimStatus::Cancelled));
        assert!(sim.finished_at.is_some());
    }

    #[test]
    fn validation_rejects_bad_specs() {
        let mut bad = spec();
        bad.solver_config.max_iterations = 0;
        assert!(bad.validate().is_err());
        let mut bad = spec();
        bad.solver_config.target_exploitability = -1.0;
        assert!(bad.validate().is_err());
        let mut bad = spec();
        bad.game_config.num_players = 10;
        assert!(bad.validate().is_err());
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn progress_tracks_iterations() {
        let mut sim = Simulation::fresh(spec());
        assert!(sim.progress_percentage() == 0.0);
        sim.iterations_completed = 50;
        assert!(sim.progress_percentage() == 50.0);
        sim.iterations_completed = 200;
        assert!(sim.progress_percentage() == 100.0);
    }

    #[test]
    fn solver_config_defaults_fill_in() {
        let json = r#"{
            "max_iterations": 10,
            "target_exploitability": 0.5,
            "variant": "plus"
        }"#;
        let config: SolverConfig = serde_json::from_str(json).unwrap();
        assert!(config.partitions == 1);
        assert!(config.loss_fraction == crate::LOSS_FRACTION);
        assert!(config.exploitability_cadence == crate::EXPLOITABILITY_CADENCE);
    }
}

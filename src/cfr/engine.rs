use super::EngineError;
use super::node::Solution;
use super::profile::Profile;
use super::rules;
use super::traversal::Traversal;
use crate::bus::messages::TaskEnvelope;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use std::time::Instant;

/// turns tasks into solutions. stateless by design: the regret view a
/// task matches against rides in its payload, so identical tasks give
/// identical solutions no matter which worker runs them or when.
pub struct Engine;

impl Engine {
    pub fn execute(task: &TaskEnvelope, cancel: &AtomicBool) -> Result<Solution, EngineError> {
        let payload = &task.payload;
        let n = payload.root_state.n();
        if payload.player_to_update >= n {
            return Err(EngineError::InvalidTask(format!(
                "player {} out of range for {} seats",
                payload.player_to_update, n
            )));
        }
        let mut root = payload.root_state.clone();
        let mut rng = SmallRng::seed_from_u64(payload.seed);
        if let Some(hole) = payload.sampled_hand {
            root = root
                .with_hole(payload.player_to_update, hole)
                .map_err(EngineError::InvalidTask)?;
        }
        if root.seats().iter().any(|s| s.hole().is_none()) {
            root = root.deal_holes(&mut rng);
        }
        let rules = rules::schedule(payload.variant, payload.discounting, payload.alpha);
        let deadline = Instant::now() + Duration::from_millis(payload.budget_ms);
        let ref mut profile = Profile::from(&payload.regrets);
        Traversal::new(
            profile,
            rules.as_ref(),
            payload.abstraction_params,
            payload.player_to_update,
            task.iteration,
            rng,
            deadline,
            cancel,
        )
        .run(&root)
    }
}

use super::EngineError;
use super::encoder;
use super::node::Solution;
use super::profile::Profile;
use super::rules::Schedule;
use crate::Position;
use crate::Probability;
use crate::Utility;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::game::Game;
use crate::gameplay::game::Phase;
use crate::gameplay::infoset::Path;
use crate::gameplay::infoset::token;
use rand::Rng;
use rand::rngs::SmallRng;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// one pass over the subtree rooted at a task's state. the subtree
/// spans the root's street: once that betting round closes, the
/// remaining board is sampled and hands check down to showdown, so
/// the tree stays bounded no matter the stack depth. reach flows
/// down, values flow up; regret and strategy deltas accumulate at the
/// updating player's infosets. the recursion is CPU-bound and holds
/// no lock of any kind.
pub struct Traversal<'a> {
    profile: &'a mut Profile,
    rules: &'a dyn Schedule,
    params: AbstractionParams,
    updater: Position,
    iteration: usize,
    rng: SmallRng,
    deadline: Instant,
    cancel: &'a AtomicBool,
    solution: Solution,
}

impl<'a> Traversal<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: &'a mut Profile,
        rules: &'a dyn Schedule,
        params: AbstractionParams,
        updater: Position,
        iteration: usize,
        rng: SmallRng,
        deadline: Instant,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            profile,
            rules,
            params,
            updater,
            iteration,
            rng,
            deadline,
            cancel,
            solution: Solution::default(),
        }
    }

    pub fn run(mut self, root: &Game) -> Result<Solution, EngineError> {
        let reach = vec![1.0; root.n()];
        let values = self.walk(root, &Path::default(), &reach)?;
        self.solution.value_estimates = values;
        Ok(self.solution)
    }

    fn walk(
        &mut self,
        game: &Game,
        path: &Path,
        reach: &[Probability],
    ) -> Result<Vec<Utility>, EngineError> {
        self.breathe()?;
        match game.phase() {
            Phase::Terminal => Ok(game.payoffs()),
            Phase::Chance => self.rollout(game),
            Phase::Decision(p) => {
                let choices = encoder::choices(game);
                let key = encoder::encode(game, p, path, self.params);
                self.profile.witness(&key, choices.len());
                let sigma = self.profile.matching(&key);
                if sigma.len() != choices.len() {
                    return Err(EngineError::InvalidTask(format!(
                        "infoset arity drifted at {}",
                        key
                    )));
                }
                if self.rules.samples() && p != self.updater {
                    let index = self.choose(&sigma);
                    let child = game.apply(choices[index]);
                    self.walk(&child, &path.with(token(&choices, index)), reach)
                } else {
                    self.expand(game, p, path, reach, &key, &choices, &sigma)
                }
            }
        }
    }

    /// enumerate every abstracted action, then emit deltas when the
    /// node belongs to the updating player.
    #[allow(clippy::too_many_arguments)]
    fn expand(
        &mut self,
        game: &Game,
        p: Position,
        path: &Path,
        reach: &[Probability],
        key: &crate::gameplay::infoset::InfoSetKey,
        choices: &[crate::gameplay::action::Action],
        sigma: &[Probability],
    ) -> Result<Vec<Utility>, EngineError> {
        let mut values = Vec::with_capacity(choices.len());
        for (index, action) in choices.iter().enumerate() {
            let mut scaled = reach.to_vec();
            scaled[p] *= sigma[index];
            let child = game.apply(*action);
            values.push(self.walk(&child, &path.with(token(choices, index)), &scaled)?);
        }
        let expected = (0..game.n())
            .map(|q| {
                values
                    .iter()
                    .zip(sigma)
                    .map(|(v, s)| v[q] * s)
                    .sum::<Utility>()
            })
            .collect::<Vec<Utility>>();
        if p == self.updater {
            let counterfactual = reach
                .iter()
                .enumerate()
                .filter(|(q, _)| *q != p)
                .map(|(_, r)| r)
                .product::<Probability>();
            let rw = self.rules.regret_weight(self.iteration);
            let sw = self.rules.strategy_weight(self.iteration);
            for (index, value) in values.iter().enumerate() {
                let gain = counterfactual * (value[p] - expected[p]) * rw;
                let mass = counterfactual * sigma[index] * sw;
                self.solution.add_regret(key, index, choices.len(), gain);
                self.solution.add_strategy(key, index, choices.len(), mass);
            }
        }
        Ok(expected)
    }

    /// the round at the horizon closed with the pot contested: deal
    /// the rest of the board and check down to showdown
    fn rollout(&mut self, game: &Game) -> Result<Vec<Utility>, EngineError> {
        self.breathe()?;
        let mut game = game.clone();
        loop {
            match game.phase() {
                Phase::Terminal => return Ok(game.payoffs()),
                Phase::Chance => {
                    let cards = game.draw(&mut self.rng);
                    game = game.deal(cards);
                }
                Phase::Decision(_) => {
                    game = game.apply(crate::gameplay::action::Action::Check);
                }
            }
        }
    }

    /// sample an index from a strategy, uniform when degenerate
    fn choose(&mut self, sigma: &[Probability]) -> usize {
        use rand::distr::Distribution;
        use rand::distr::weighted::WeightedIndex;
        match WeightedIndex::new(sigma) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => self.rng.random_range(0..sigma.len()),
        }
    }

    /// cooperative deadline and cancellation check at state transitions
    fn breathe(&self) -> Result<(), EngineError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        if Instant::now() > self.deadline {
            return Err(EngineError::BudgetExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::rules;
    use crate::gameplay::config::GameConfig;
    use rand::SeedableRng;
    use std::time::Duration;

    fn shallow() -> GameConfig {
        // tiny stacks keep the full tree small for exhaustive tests
        GameConfig {
            stack_size: 4.0,
            allowed_bet_fractions: vec![1.0],
            ..GameConfig::default()
        }
    }

    fn traverse(
        profile: &mut Profile,
        rules: &dyn rules::Schedule,
        updater: usize,
        t: usize,
        seed: u64,
    ) -> Result<Solution, EngineError> {
        let cancel = AtomicBool::new(false);
        let root = Game::root(shallow()).deal_holes(&mut SmallRng::seed_from_u64(seed));
        Traversal::new(
            profile,
            rules,
            AbstractionParams::default(),
            updater,
            t,
            SmallRng::seed_from_u64(seed),
            Instant::now() + Duration::from_secs(30),
            &cancel,
        )
        .run(&root)
    }

    #[test]
    fn emits_deltas_for_updater_only() {
        let mut profile = Profile::default();
        let rules = rules::Vanilla {
            discounting: false,
            alpha: 0.0,
        };
        let solution = traverse(&mut profile, &rules, 0, 1, 7).unwrap();
        assert!(!solution.regret_delta.is_empty());
        assert!(!solution.strategy_delta.is_empty());
        assert!(solution.regret_delta.keys().all(|k| k.player() == 0));
        assert!(solution.value_estimates.len() == 2);
    }

    #[test]
    fn strategy_mass_is_nonnegative() {
        let mut profile = Profile::default();
        let rules = rules::Plus;
        let solution = traverse(&mut profile, &rules, 1, 1, 11).unwrap();
        assert!(
            solution
                .strategy_delta
                .values()
                .flatten()
                .all(|m| *m >= 0.0)
        );
    }

    #[test]
    fn regret_and_strategy_share_arity() {
        let mut profile = Profile::default();
        let rules = rules::ChanceSampling;
        let solution = traverse(&mut profile, &rules, 0, 1, 13).unwrap();
        for (key, regret) in solution.regret_delta.iter() {
            let strategy = solution.strategy_delta.get(key).unwrap();
            assert!(regret.len() == strategy.len());
        }
    }

    #[test]
    fn zero_sum_at_the_root() {
        let mut profile = Profile::default();
        let rules = rules::Vanilla {
            discounting: false,
            alpha: 0.0,
        };
        let solution = traverse(&mut profile, &rules, 0, 1, 17).unwrap();
        let total = solution.value_estimates.iter().sum::<Utility>();
        assert!(total.abs() < 1e-6);
    }

    #[test]
    fn deadline_fails_the_whole_task() {
        let mut profile = Profile::default();
        let rules = rules::Vanilla {
            discounting: false,
            alpha: 0.0,
        };
        let cancel = AtomicBool::new(false);
        let root = Game::root(shallow()).deal_holes(&mut SmallRng::seed_from_u64(1));
        let result = Traversal::new(
            &mut profile,
            &rules,
            AbstractionParams::default(),
            0,
            1,
            SmallRng::seed_from_u64(1),
            Instant::now() - Duration::from_secs(1),
            &cancel,
        )
        .run(&root);
        assert!(matches!(result, Err(EngineError::BudgetExceeded)));
    }

    #[test]
    fn cancellation_is_cooperative() {
        let mut profile = Profile::default();
        let rules = rules::Plus;
        let cancel = AtomicBool::new(true);
        let root = Game::root(shallow()).deal_holes(&mut SmallRng::seed_from_u64(1));
        let result = Traversal::new(
            &mut profile,
            &rules,
            AbstractionParams::default(),
            0,
            1,
            SmallRng::seed_from_u64(1),
            Instant::now() + Duration::from_secs(30),
            &cancel,
        )
        .run(&root);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn is_deterministic_under_seed() {
        let rules = rules::ChanceSampling;
        let mut a = Profile::default();
        let mut b = Profile::default();
        let one = traverse(&mut a, &rules, 0, 1, 99).unwrap();
        let two = traverse(&mut b, &rules, 0, 1, 99).unwrap();
        assert!(one.regret_delta == two.regret_delta);
        assert!(one.strategy_delta == two.strategy_delta);
    }
}

use super::encoder;
use super::node::Nodes;
use crate::Position;
use crate::Probability;
use crate::Utility;
use crate::cards::card::Card;
use crate::cards::hand::Hand;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::game::Game;
use crate::gameplay::game::Phase;
use crate::gameplay::infoset::Path;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::hash::Hash;
use std::hash::Hasher;

/// distance from equilibrium: the average, over sampled deals, of
/// each player's best-response gain against the table's average
/// strategy, normalised by player count. exact enumeration over hand
/// pairs is intractable, so the deal budget is a solver knob.
pub fn exploitability(
    root: &Game,
    nodes: &Nodes,
    samples: usize,
    seed: u64,
    params: AbstractionParams,
) -> Utility {
    assert!(samples > 0);
    let n = root.n();
    let mut total = 0.0;
    for i in 0..samples {
        let ref mut rng = SmallRng::seed_from_u64(mix(seed, i as u64));
        let game = root.clone().deal_holes(rng);
        let walker = Walker {
            nodes,
            params,
            script: script(&game, rng),
            base: game.board().n(),
        };
        let ref path = Path::default();
        let ev = walker.value(&game, path, None);
        for p in 0..n {
            let br = walker.value(&game, path, Some(p));
            total += br[p] - ev[p];
        }
    }
    (total / samples as Utility / n as Utility).max(0.0)
}

/// the cards each street will reveal, fixed up front so the best
/// response and the strategy value walk the same deal
fn script(game: &Game, rng: &mut SmallRng) -> Vec<Card> {
    let mut deck = game.deck();
    (game.board().n()..5)
        .map(|_| {
            deck.deal(1, rng)
                .cards()
                .pop()
                .expect("deck holds enough cards")
        })
        .collect()
}

fn mix(seed: u64, i: u64) -> u64 {
    let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(hasher);
    i.hash(hasher);
    hasher.finish()
}

/// walks the same street-local tree the trainer walks, under the
/// average strategy, with at most one player deviating greedily.
/// closed rounds run out the scripted board and check down.
struct Walker<'a> {
    nodes: &'a Nodes,
    params: AbstractionParams,
    script: Vec<Card>,
    base: usize,
}

impl Walker<'_> {
    fn rollout(&self, game: &Game) -> Vec<Utility> {
        let mut game = game.clone();
        loop {
            match game.phase() {
                Phase::Terminal => return game.payoffs(),
                Phase::Chance => {
                    let offset = game.board().n() - self.base;
                    let n = game.street().n_revealed();
                    let cards = Hand::from(self.script[offset..offset + n].to_vec());
                    game = game.deal(cards);
                }
                Phase::Decision(_) => {
                    game = game.apply(crate::gameplay::action::Action::Check);
                }
            }
        }
    }

    fn value(&self, game: &Game, path: &Path, hero: Option<Position>) -> Vec<Utility> {
        match game.phase() {
            Phase::Terminal => game.payoffs(),
            Phase::Chance => self.rollout(game),
            Phase::Decision(p) => {
                let choices = encoder::choices(game);
                let key = encoder::encode(game, p, path, self.params);
                let sigma = match self.nodes.get(&key) {
                    Some(node) if node.arity() == choices.len() => node.average(),
                    _ => vec![1.0 / choices.len() as Probability; choices.len()],
                };
                let values = choices
                    .iter()
                    .enumerate()
                    .map(|(i, action)| {
                        self.value(
                            &game.apply(*action),
                            &path.with(crate::gameplay::infoset::token(&choices, i)),
                            hero,
                        )
                    })
                    .collect::<Vec<Vec<Utility>>>();
                match hero {
                    // the deviating player picks their best line greedily
                    Some(hero) if hero == p => values
                        .into_iter()
                        .max_by(|a, b| a[p].partial_cmp(&b[p]).expect("values are finite"))
                        .expect("at least one action"),
                    // everyone else plays the average strategy
                    _ => (0..game.n())
                        .map(|q| {
                            values
                                .iter()
                                .zip(sigma.iter())
                                .map(|(v, s)| v[q] * s)
                                .sum()
                        })
                        .collect(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::profile::Profile;
    use crate::cfr::rules;
    use crate::cfr::traversal::Traversal;
    use crate::gameplay::config::GameConfig;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use std::time::Instant;

    fn shallow() -> GameConfig {
        GameConfig {
            stack_size: 4.0,
            allowed_bet_fractions: vec![1.0],
            ..GameConfig::default()
        }
    }

    fn train(iterations: usize) -> Profile {
        let mut profile = Profile::default();
        let rules = rules::Plus;
        let cancel = AtomicBool::new(false);
        for t in 1..=iterations {
            for p in 0..2 {
                let ref mut deal = SmallRng::seed_from_u64(t as u64);
                let root = Game::root(shallow()).deal_holes(deal);
                let solution = Traversal::new(
                    &mut profile,
                    &rules,
                    AbstractionParams::default(),
                    p,
                    t,
                    SmallRng::seed_from_u64(t as u64),
                    Instant::now() + Duration::from_secs(60),
                    &cancel,
                )
                .run(&root)
                .expect("no budget in tests");
                profile.absorb(&solution, &rules);
            }
        }
        profile
    }

    #[test]
    fn is_finite_and_nonnegative() {
        let profile = train(5);
        let root = Game::root(shallow());
        let x = exploitability(&root, profile.nodes(), 16, 42, AbstractionParams::default());
        assert!(x.is_finite());
        assert!(x >= 0.0);
    }

    #[test]
    fn is_deterministic_under_seed() {
        let profile = train(3);
        let root = Game::root(shallow());
        let params = AbstractionParams::default();
        let a = exploitability(&root, profile.nodes(), 8, 7, params);
        let b = exploitability(&root, profile.nodes(), 8, 7, params);
        assert!(a == b);
    }

    #[test]
    fn training_does_not_increase_exploitability_much() {
        let fresh = Profile::default();
        let trained = train(40);
        let root = Game::root(shallow());
        let params = AbstractionParams::default();
        let before = exploitability(&root, fresh.nodes(), 32, 3, params);
        let after = exploitability(&root, trained.nodes(), 32, 3, params);
        assert!(after <= before + 1.0);
    }
}

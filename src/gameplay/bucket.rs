use crate::Equity;
use crate::cards::board::Board;
use crate::cards::card::Card;
use crate::cards::deck::Deck;
use crate::cards::hand::Hand;
use crate::cards::hand::Hole;
use crate::cards::street::Street;
use crate::cards::strength::Strength;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Deserialize;
use serde::Serialize;
use std::hash::Hash;
use std::hash::Hasher;

/// knobs that shape the bucketing, carried inside every task payload
/// so all workers agree on the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractionParams {
    pub equity_buckets: u16,
    pub equity_samples: usize,
}

impl Default for AbstractionParams {
    fn default() -> Self {
        Self {
            equity_buckets: crate::N_EQUITY_BUCKETS,
            equity_samples: crate::EQUITY_SAMPLES,
        }
    }
}

/// bucket index for a hand in context. preflop uses the canonical
/// 169-class partition; postflop hands land above it at
/// 169 + floor(equity * K).
pub fn bucket(hole: Hole, board: Board, params: AbstractionParams) -> u16 {
    match board.street() {
        Street::Pref => preflop(hole),
        _ => {
            let eq = equity(hole, board, params.equity_samples);
            let slot = ((eq * params.equity_buckets as Equity) as u16).min(params.equity_buckets - 1);
            crate::N_PREFLOP_BUCKETS + slot
        }
    }
}

/// the (rank1, rank2, suited?) partition: pairs on the diagonal,
/// suited combos above it, offsuit below.
pub fn preflop(hole: Hole) -> u16 {
    let (hi, lo) = hole.cards();
    let suited = hi.suit() == lo.suit();
    let hi = hi.rank() as u16;
    let lo = lo.rank() as u16;
    match (hi == lo, suited) {
        (true, _) => hi * 13 + hi,
        (_, true) => hi * 13 + lo,
        (_, false) => lo * 13 + hi,
    }
}

/// Monte-Carlo equity of a hand against one uniform opponent on this
/// board. the rng is seeded off the suit-canonical form of the spot,
/// so isomorphic inputs give identical estimates.
pub fn equity(hole: Hole, board: Board, samples: usize) -> Equity {
    assert!(samples > 0);
    let ref mut rng = SmallRng::seed_from_u64(canonical_seed(hole, board));
    let known = hole.hand().add(board.hand());
    let missing = 5 - board.n();
    let mut score = 0.0;
    for _ in 0..samples {
        let mut deck = Deck::from(known);
        let villain = deck.deal(2, rng);
        let runout = deck.deal(missing, rng);
        let full = board.hand().add(runout);
        let hero = Strength::from(hole.hand().add(full));
        let them = Strength::from(villain.add(full));
        score += match hero.cmp(&them) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Equal => 0.5,
            std::cmp::Ordering::Less => 0.0,
        };
    }
    score / samples as Equity
}

/// lexicographically-least relabelling of (board, hole) over all 24
/// suit permutations. hashing this instead of the raw cards makes
/// every derived sample stream invariant under suit relabelling.
fn canonical(hole: Hole, board: Board) -> (u64, u64) {
    const SUITS: [[u8; 4]; 24] = permutations();
    SUITS
        .iter()
        .map(|perm| (relabel(board.hand(), perm), relabel(hole.hand(), perm)))
        .min()
        .expect("24 permutations")
}

fn canonical_seed(hole: Hole, board: Board) -> u64 {
    let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
    canonical(hole, board).hash(hasher);
    hasher.finish()
}

fn relabel(hand: Hand, perm: &[u8; 4]) -> u64 {
    hand.cards()
        .into_iter()
        .map(|c| Card::from((c.rank(), crate::cards::card::Suit::from(perm[c.suit() as usize]))))
        .map(u64::from)
        .fold(0u64, |acc, bit| acc | bit)
}

const fn permutations() -> [[u8; 4]; 24] {
    let mut out = [[0u8; 4]; 24];
    let mut i = 0;
    let mut a = 0;
    while a < 4 {
        let mut b = 0;
        while b < 4 {
            let mut c = 0;
            while c < 4 {
                let mut d = 0;
                while d < 4 {
                    if a != b && a != c && a != d && b != c && b != d && c != d {
                        out[i] = [a as u8, b as u8, c as u8, d as u8];
                        i += 1;
                    }
                    d += 1;
                }
                c += 1;
            }
            b += 1;
        }
        a += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hole(s: &str) -> Hole {
        Hole::try_from(Hand::try_from(s).unwrap()).unwrap()
    }

    #[test]
    fn preflop_has_169_classes() {
        let mut seen = std::collections::BTreeSet::new();
        for a in 0..52u8 {
            for b in 0..52u8 {
                if a != b {
                    let hole = Hole::from((Card::from(a), Card::from(b)));
                    seen.insert(preflop(hole));
                }
            }
        }
        assert!(seen.len() == 169);
        assert!(seen.iter().all(|b| *b < 169));
    }

    #[test]
    fn preflop_distinguishes_suitedness() {
        assert!(preflop(hole("AsKs")) != preflop(hole("AsKd")));
        assert!(preflop(hole("AsKd")) == preflop(hole("AhKc")));
        assert!(preflop(hole("AsAd")) == preflop(hole("AhAc")));
    }

    #[test]
    fn equity_is_sane() {
        let board = Board::try_from("AsKd7c").unwrap();
        let nuts = equity(hole("AhAd"), board, 200);
        let trash = equity(hole("2h3d"), board, 200);
        assert!(nuts > 0.8);
        assert!(trash < 0.5);
        assert!(nuts <= 1.0 && trash >= 0.0);
    }

    #[test]
    fn equity_is_deterministic() {
        let board = Board::try_from("AsKd7c2h").unwrap();
        let a = equity(hole("QhQd"), board, 100);
        let b = equity(hole("QhQd"), board, 100);
        assert!(a == b);
    }

    #[test]
    fn bucketing_is_suit_relabelling_invariant() {
        let params = AbstractionParams::default();
        // swap spades and hearts everywhere
        let a = bucket(hole("QsQd"), Board::try_from("As7s2d").unwrap(), params);
        let b = bucket(hole("QhQd"), Board::try_from("Ah7h2d").unwrap(), params);
        assert!(a == b);
    }

    #[test]
    fn postflop_buckets_live_above_preflop() {
        let params = AbstractionParams::default();
        let board = Board::try_from("AsKd7c").unwrap();
        let bucket = bucket(hole("QhQd"), board, params);
        assert!(bucket >= crate::N_PREFLOP_BUCKETS);
        assert!(bucket < crate::N_PREFLOP_BUCKETS + params.equity_buckets);
    }
}

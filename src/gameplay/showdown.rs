use super::snap;
use crate::Chips;
use crate::cards::strength::Strength;

/// one seat's line in the settlement ledger
#[derive(Debug, Clone)]
pub struct Entry {
    pub reward: Chips,
    pub risked: Chips,
    pub folded: bool,
    /// None for folded seats and for uncontested pots
    pub strength: Option<Strength>,
}

/// settles a finished hand over every side pot. the pot is sliced at
/// each distinct all-in level of a live seat; each slice goes to the
/// strongest eligible hands, ties splitting evenly.
pub struct Showdown(Vec<Entry>);

impl From<Vec<Entry>> for Showdown {
    fn from(entries: Vec<Entry>) -> Self {
        Self(entries)
    }
}

impl Showdown {
    pub fn settle(mut self) -> Vec<Entry> {
        let mut prev = 0.0;
        for tier in self.tiers() {
            let slice = self.slice(prev, tier);
            let winners = self.winners(tier);
            assert!(!winners.is_empty(), "every tier has an eligible winner");
            let share = slice / winners.len() as Chips;
            for winner in winners {
                self.0[winner].reward = snap(self.0[winner].reward + share);
            }
            prev = tier;
        }
        self.0
    }

    /// distinct stakes of live seats, ascending
    fn tiers(&self) -> Vec<Chips> {
        let mut tiers = self
            .0
            .iter()
            .filter(|e| !e.folded)
            .map(|e| e.risked)
            .collect::<Vec<Chips>>();
        tiers.sort_by(|a, b| a.partial_cmp(b).expect("chips are finite"));
        tiers.dedup_by(|a, b| (*a - *b).abs() < super::EPSILON);
        tiers
    }
    /// chips contributed to the pot between two tiers, by everyone
    fn slice(&self, prev: Chips, tier: Chips) -> Chips {
        self.0
            .iter()
            .map(|e| (e.risked.min(tier) - prev).max(0.0))
            .sum()
    }
    /// indices of live seats staked into this tier with the best hand
    fn winners(&self, tier: Chips) -> Vec<usize> {
        let eligible = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.folded)
            .filter(|(_, e)| e.risked + super::EPSILON >= tier)
            .collect::<Vec<_>>();
        let best = eligible.iter().map(|(_, e)| e.strength).max().flatten();
        eligible
            .iter()
            .filter(|(_, e)| e.strength == best)
            .map(|(i, _)| *i)
            .collect()
    }
}

use crate::Probability;
use crate::Utility;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::gameplay::infoset::InfoSetKey;

/// the full regret/strategy state of one simulation, keyed by infoset
pub type Nodes = BTreeMap<InfoSetKey, InfoSetNode>;
/// per-infoset vectors of regret or strategy-sum increments
pub type DeltaMap = BTreeMap<InfoSetKey, Vec<Utility>>;

/// what one traversal learned: regret increments, strategy-sum
/// increments, and the root value estimate per player.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub regret_delta: DeltaMap,
    pub strategy_delta: DeltaMap,
    pub value_estimates: Vec<Utility>,
}

impl Solution {
    pub fn add_regret(&mut self, key: &InfoSetKey, index: usize, arity: usize, amount: Utility) {
        Self::bump(&mut self.regret_delta, key, index, arity, amount);
    }
    pub fn add_strategy(&mut self, key: &InfoSetKey, index: usize, arity: usize, amount: Utility) {
        Self::bump(&mut self.strategy_delta, key, index, arity, amount);
    }
    fn bump(map: &mut DeltaMap, key: &InfoSetKey, index: usize, arity: usize, amount: Utility) {
        let vector = map.entry(key.clone()).or_insert_with(|| vec![0.0; arity]);
        assert!(vector.len() == arity, "delta arity drifted");
        vector[index] += amount;
    }
}

/// accumulated regrets and strategy weights for one information set.
/// both arrays are indexed by the abstracted action list, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoSetNode {
    regret: Vec<Utility>,
    strategy: Vec<Utility>,
}

impl InfoSetNode {
    pub fn new(arity: usize) -> Self {
        assert!(arity > 0, "decision node with no actions");
        Self {
            regret: vec![0.0; arity],
            strategy: vec![0.0; arity],
        }
    }
    pub fn from_parts(regret: Vec<Utility>, strategy: Vec<Utility>) -> Self {
        assert!(regret.len() == strategy.len());
        Self { regret, strategy }
    }
    pub fn arity(&self) -> usize {
        self.regret.len()
    }
    pub fn regret(&self) -> &[Utility] {
        &self.regret
    }
    pub fn regret_mut(&mut self) -> &mut [Utility] {
        &mut self.regret
    }
    pub fn strategy(&self) -> &[Utility] {
        &self.strategy
    }

    /// regret matching: play in proportion to positive regret,
    /// uniform when nothing is positive.
    pub fn matching(&self) -> Vec<Probability> {
        let clipped = self
            .regret
            .iter()
            .map(|r| r.max(0.0))
            .collect::<Vec<Utility>>();
        let total = clipped.iter().sum::<Utility>();
        if total > 0.0 {
            clipped.into_iter().map(|r| r / total).collect()
        } else {
            vec![1.0 / self.arity() as Probability; self.arity()]
        }
    }

    /// time-averaged strategy, uniform before any mass accumulates
    pub fn average(&self) -> Vec<Probability> {
        let total = self.strategy.iter().sum::<Utility>();
        if total > 0.0 {
            self.strategy.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / self.arity() as Probability; self.arity()]
        }
    }

    /// fold in one delta vector. arity mismatches are a data
    /// integrity failure surfaced to the caller, never absorbed.
    pub fn fold_regret(&mut self, delta: &[Utility]) -> Result<(), String> {
        Self::fold(&mut self.regret, delta)
    }
    pub fn fold_strategy(&mut self, delta: &[Utility]) -> Result<(), String> {
        Self::fold(&mut self.strategy, delta)
    }
    fn fold(into: &mut [Utility], delta: &[Utility]) -> Result<(), String> {
        if into.len() != delta.len() {
            return Err(format!(
                "regret arity mismatch: {} vs {}",
                into.len(),
                delta.len()
            ));
        }
        for (slot, d) in into.iter_mut().zip(delta) {
            *slot = (*slot + d).max(crate::REGRET_MIN);
        }
        Ok(())
    }

    /// regret floor for the plus variant
    pub fn clamp(&mut self) {
        for r in self.regret.iter_mut() {
            *r = r.max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_uniform_at_zero() {
        let node = InfoSetNode::new(4);
        let sigma = node.matching();
        assert!(sigma.iter().all(|p| (p - 0.25).abs() < 1e-9));
    }

    #[test]
    fn matching_follows_positive_regret() {
        let mut node = InfoSetNode::new(3);
        node.fold_regret(&[3.0, 1.0, -5.0]).unwrap();
        let sigma = node.matching();
        assert!((sigma[0] - 0.75).abs() < 1e-9);
        assert!((sigma[1] - 0.25).abs() < 1e-9);
        assert!(sigma[2] == 0.0);
        assert!((sigma.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn average_normalizes_strategy_mass() {
        let mut node = InfoSetNode::new(2);
        node.fold_strategy(&[1.0, 3.0]).unwrap();
        let avg = node.average();
        assert!((avg[0] - 0.25).abs() < 1e-9);
        assert!((avg[1] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut node = InfoSetNode::new(2);
        assert!(node.fold_regret(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn clamp_floors_regret() {
        let mut node = InfoSetNode::new(2);
        node.fold_regret(&[-2.0, 5.0]).unwrap();
        node.clamp();
        assert!(node.regret() == [0.0, 5.0]);
    }
}

use crate::cfr::node::DeltaMap;
use crate::cfr::node::InfoSetNode;
use crate::cfr::node::Nodes;
use crate::cfr::node::Solution;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// the aggregated regret/strategy state of one simulation, striped
/// across shard locks by key hash. deltas from one result are applied
/// shard by shard in ascending order, one lock held at a time.
pub struct NodeTable {
    shards: Vec<Mutex<Nodes>>,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new(crate::NODE_TABLE_SHARDS)
    }
}

impl NodeTable {
    pub fn new(shards: usize) -> Self {
        assert!(shards > 0);
        Self {
            shards: (0..shards).map(|_| Mutex::new(BTreeMap::new())).collect(),
        }
    }

    /// fold a completed task's deltas in. `plus` keeps cumulative
    /// regrets clamped at zero after the fold. arity mismatches are a
    /// data integrity failure for the whole simulation.
    pub fn fold(&self, solution: &Solution, plus: bool) -> Result<(), String> {
        // keys arrive sorted from the BTreeMap; group them per shard
        // and take each shard lock once, in index order
        let mut grouped: BTreeMap<usize, std::collections::BTreeSet<&crate::gameplay::infoset::InfoSetKey>> =
            BTreeMap::new();
        for key in solution
            .regret_delta
            .keys()
            .chain(solution.strategy_delta.keys())
        {
            grouped
                .entry(key.shard(self.shards.len()))
                .or_default()
                .insert(key);
        }
        for (shard, keys) in grouped {
            let mut nodes = self.shards[shard].lock().expect("shard lock");
            for key in keys {
                if let Some(delta) = solution.regret_delta.get(key) {
                    let node = nodes
                        .entry(key.clone())
                        .or_insert_with(|| InfoSetNode::new(delta.len()));
                    node.fold_regret(delta)?;
                    if plus {
                        node.clamp();
                    }
                }
                if let Some(delta) = solution.strategy_delta.get(key) {
                    let node = nodes
                        .entry(key.clone())
                        .or_insert_with(|| InfoSetNode::new(delta.len()));
                    node.fold_strategy(delta)?;
                }
            }
        }
        Ok(())
    }

    /// merged copy of every shard
    pub fn snapshot(&self) -> Nodes {
        let mut merged = BTreeMap::new();
        for shard in self.shards.iter() {
            for (key, node) in shard.lock().expect("shard lock").iter() {
                merged.insert(key.clone(), node.clone());
            }
        }
        merged
    }

    /// cumulative regrets only, for shipping inside task payloads
    pub fn regrets(&self) -> DeltaMap {
        let mut merged = BTreeMap::new();
        for shard in self.shards.iter() {
            for (key, node) in shard.lock().expect("shard lock").iter() {
                merged.insert(key.clone(), node.regret().to_vec());
            }
        }
        merged
    }

    /// replace the whole table. all shard locks are taken in index
    /// order so no fold interleaves with the swap.
    pub fn restore(&self, nodes: Nodes) {
        let mut guards = self
            .shards
            .iter()
            .map(|s| s.lock().expect("shard lock"))
            .collect::<Vec<_>>();
        for guard in guards.iter_mut() {
            guard.clear();
        }
        let shards = self.shards.len();
        for (key, node) in nodes {
            guards[key.shard(shards)].insert(key, node);
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("shard lock").len())
            .sum()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arbitrary;
    use crate::gameplay::infoset::InfoSetKey;

    fn solution(key: &InfoSetKey, regret: Vec<f64>) -> Solution {
        let mut solution = Solution::default();
        for (i, r) in regret.iter().enumerate() {
            solution.add_regret(key, i, regret.len(), *r);
            solution.add_strategy(key, i, regret.len(), r.abs());
        }
        solution
    }

    #[test]
    fn fold_accumulates() {
        let table = NodeTable::new(4);
        let key = InfoSetKey::random();
        table.fold(&solution(&key, vec![1.0, -2.0]), false).unwrap();
        table.fold(&solution(&key, vec![1.0, -2.0]), false).unwrap();
        let nodes = table.snapshot();
        assert!(nodes.get(&key).unwrap().regret() == [2.0, -4.0]);
    }

    #[test]
    fn plus_keeps_regret_nonnegative() {
        let table = NodeTable::new(4);
        let key = InfoSetKey::random();
        table.fold(&solution(&key, vec![1.0, -2.0]), true).unwrap();
        let nodes = table.snapshot();
        assert!(nodes.get(&key).unwrap().regret() == [1.0, 0.0]);
    }

    #[test]
    fn arity_mismatch_is_integrity_failure() {
        let table = NodeTable::new(4);
        let key = InfoSetKey::random();
        table.fold(&solution(&key, vec![1.0, 2.0]), false).unwrap();
        assert!(table.fold(&solution(&key, vec![1.0, 2.0, 3.0]), false).is_err());
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let table = NodeTable::new(8);
        for _ in 0..32 {
            table
                .fold(&solution(&InfoSetKey::random(), vec![1.0, 2.0, 3.0]), false)
                .unwrap();
        }
        let snapshot = table.snapshot();
        let other = NodeTable::new(8);
        other.restore(snapshot.clone());
        assert!(other.snapshot() == snapshot);
        assert!(other.len() == table.len());
    }
}

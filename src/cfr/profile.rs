use super::node::InfoSetNode;
use super::node::Nodes;
use super::node::Solution;
use super::rules::Schedule;
use crate::Probability;
use crate::gameplay::infoset::InfoSetKey;

/// the regret view a single traversal matches against. built fresh
/// per task from the cumulative regrets the orchestrator shipped in
/// the payload; infosets first met during the traversal start at
/// zero. the aggregated table held by the orchestrator stays the
/// source of truth.
#[derive(Default)]
pub struct Profile {
    nodes: Nodes,
    iterations: usize,
}

impl From<&super::node::DeltaMap> for Profile {
    fn from(regrets: &super::node::DeltaMap) -> Self {
        Self {
            nodes: regrets
                .iter()
                .map(|(key, regret)| {
                    let node =
                        InfoSetNode::from_parts(regret.clone(), vec![0.0; regret.len()]);
                    (key.clone(), node)
                })
                .collect(),
            iterations: 0,
        }
    }
}

impl Profile {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn iterations(&self) -> usize {
        self.iterations
    }
    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// idempotent first-sight initialization of an infoset
    pub fn witness(&mut self, key: &InfoSetKey, arity: usize) {
        self.nodes
            .entry(key.clone())
            .or_insert_with(|| InfoSetNode::new(arity));
    }
    /// current strategy at an infoset via regret matching
    pub fn matching(&self, key: &InfoSetKey) -> Vec<Probability> {
        self.nodes
            .get(key)
            .expect("infoset witnessed before lookup")
            .matching()
    }

    /// fold a finished task's deltas into the local view
    pub fn absorb(&mut self, solution: &Solution, rules: &dyn Schedule) {
        for (key, delta) in solution.regret_delta.iter() {
            let node = self
                .nodes
                .entry(key.clone())
                .or_insert_with(|| InfoSetNode::new(delta.len()));
            node.fold_regret(delta).expect("own deltas share arity");
            rules.settle(node.regret_mut());
        }
        for (key, delta) in solution.strategy_delta.iter() {
            let node = self
                .nodes
                .entry(key.clone())
                .or_insert_with(|| InfoSetNode::new(delta.len()));
            node.fold_strategy(delta).expect("own deltas share arity");
        }
        self.iterations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arbitrary;
    use crate::cfr::rules::Plus;

    #[test]
    fn absorb_settles_under_plus() {
        let mut profile = Profile::default();
        let key = InfoSetKey::random();
        let mut solution = Solution::default();
        solution.add_regret(&key, 0, 2, -4.0);
        solution.add_regret(&key, 1, 2, 2.0);
        profile.absorb(&solution, &Plus);
        let node = profile.nodes().get(&key).unwrap();
        assert!(node.regret() == [0.0, 2.0]);
        assert!(profile.iterations() == 1);
    }

    #[test]
    fn witness_is_idempotent() {
        let mut profile = Profile::default();
        let key = InfoSetKey::random();
        profile.witness(&key, 3);
        profile.witness(&key, 3);
        assert!(profile.len() == 1);
        assert!(profile.matching(&key).len() == 3);
    }
}

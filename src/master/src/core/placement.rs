use rand::seq::IndexedRandom;

use crate::core::node::{NodeInfo, NodeRuntime};

/// Alive nodes for which `excluded` is false, in id order.
pub fn eligible_nodes<'a, I, F>(nodes: I, excluded: F) -> Vec<&'a NodeInfo>
where
    I: IntoIterator<Item = &'a NodeRuntime>,
    F: Fn(&NodeInfo) -> bool,
{
    nodes
        .into_iter()
        .filter(|n| n.is_alive() && !excluded(&n.info))
        .map(|n| &n.info)
        .collect()
}

/// Uniform pick among the candidates. `None` only when there are none.
pub fn choose_one<'a>(candidates: &[&'a NodeInfo]) -> Option<&'a NodeInfo> {
    candidates.choose(&mut rand::rng()).copied()
}

/// `min(wanted, candidates.len())` distinct candidates, uniformly at random.
pub fn choose_distinct<'a>(candidates: &[&'a NodeInfo], wanted: usize) -> Vec<&'a NodeInfo> {
    let amount = wanted.min(candidates.len());
    candidates
        .choose_multiple(&mut rand::rng(), amount)
        .copied()
        .collect()
}

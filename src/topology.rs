//! Dependency ordering between subsystems.
//!
//! A [`Dependency`] declares that the clocked output of one subsystem feeds
//! the clocked input of another. The edges are fixed for the whole run and
//! are only used to order subsystems that take part in the same event.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::SubsystemId;

/// A dependency edge: `from` must be handled before `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// The upstream subsystem
    pub from: SubsystemId,
    /// The subsystem consuming `from`'s clocked output
    pub to: SubsystemId,
}

impl Dependency {
    /// Creates a new dependency: `to` depends on `from`.
    pub fn new(from: SubsystemId, to: SubsystemId) -> Self {
        Self { from, to }
    }
}

/// Total order over all subsystems that respects every dependency edge.
///
/// Ties are broken by registration order, so the order is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyOrder {
    order: Vec<SubsystemId>,
    rank: HashMap<SubsystemId, usize>,
}

impl DependencyOrder {
    /// Computes the order for `count` subsystems with Kahn's algorithm.
    ///
    /// Returns the subsystems left on a cycle if the graph is not acyclic.
    pub fn compute(
        count: usize,
        dependencies: &[Dependency],
    ) -> Result<Self, Vec<SubsystemId>> {
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];

        for dep in dependencies {
            let (from, to) = (dep.from.index(), dep.to.index());
            if from >= count || to >= count {
                continue;
            }
            adj[from].push(to);
            in_degree[to] += 1;
        }

        // Smallest index first keeps the order stable across runs.
        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();

        let mut order = Vec::with_capacity(count);
        while let Some(node) = ready.pop_first() {
            order.push(SubsystemId(node));
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != count {
            let cyclic = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(SubsystemId)
                .collect();
            return Err(cyclic);
        }

        let rank = order.iter().enumerate().map(|(r, &id)| (id, r)).collect();
        Ok(Self { order, rank })
    }

    /// All subsystems in dependency order.
    pub fn order(&self) -> &[SubsystemId] {
        &self.order
    }

    /// Position of `id` in the order.
    pub fn rank(&self, id: SubsystemId) -> usize {
        self.rank.get(&id).copied().unwrap_or(usize::MAX)
    }

    /// Sorts `ids` into dependency order and removes duplicates.
    pub fn sort(&self, ids: &mut Vec<SubsystemId>) {
        ids.sort_by_key(|&id| self.rank(id));
        ids.dedup();
    }
}

//! Hook graph for deterministic task ordering.
//!
//! `after`/`before` hook declarations are resolved into an explicit
//! dependency graph once at startup. Requesting a task orders it together
//! with every task connected to it through hooks, such that each hook
//! constraint is satisfied. Ties among independent tasks break by
//! declaration order, so the same registry always produces the same
//! execution sequence.

use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::task::Registry;
use crate::{Error, Result};

/// The hook dependency graph over a task registry.
///
/// Nodes are task names; an edge `a -> b` means `a` must run before `b`.
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build the hook graph from a registry.
    ///
    /// Nodes are added in declaration order, which makes `NodeIndex`
    /// ordering the declaration-order tiebreak used by [`execution_order`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTask`] when a hook references a task name
    /// that is not in the registry.
    ///
    /// [`execution_order`]: TaskGraph::execution_order
    pub fn build(registry: &Registry) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in registry.tasks() {
            let node = graph.add_node(task.name.clone());
            index.insert(task.name.clone(), node);
        }

        for task in registry.tasks() {
            let this = index[&task.name];
            for anchor in &task.after {
                let anchor_node = *index
                    .get(anchor)
                    .ok_or_else(|| Error::UnknownTask(anchor.clone()))?;
                graph.add_edge(anchor_node, this, ());
            }
            for anchor in &task.before {
                let anchor_node = *index
                    .get(anchor)
                    .ok_or_else(|| Error::UnknownTask(anchor.clone()))?;
                graph.add_edge(this, anchor_node, ());
            }
        }

        Ok(Self { graph, index })
    }

    /// Check the whole graph for hook cycles.
    ///
    /// Run before execution so a cyclic configuration fails the run with
    /// nothing executed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] naming one cycle.
    pub fn validate(&self) -> Result<()> {
        if is_cyclic_directed(&self.graph) {
            let members: Vec<NodeIndex> = self.graph.node_indices().collect();
            return Err(Error::Cycle(self.name_cycle(&members)));
        }
        Ok(())
    }

    /// Order the requested task together with all tasks connected to it
    /// via hooks, satisfying every hook constraint.
    ///
    /// Uses Kahn's algorithm with a declaration-index priority queue:
    /// whenever several tasks are simultaneously ready, the earliest
    /// declared runs first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTask`] for an unregistered name and
    /// [`Error::Cycle`] naming the cycle when the connected hooks are
    /// cyclic.
    pub fn execution_order(&self, requested: &str) -> Result<Vec<String>> {
        let start = *self
            .index
            .get(requested)
            .ok_or_else(|| Error::UnknownTask(requested.to_string()))?;

        let component = self.connected_component(start);

        let mut in_degree: HashMap<NodeIndex, usize> = component
            .iter()
            .map(|&node| {
                let degree = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|n| component.contains(n))
                    .count();
                (node, degree)
            })
            .collect();

        // Min-heap on NodeIndex order, i.e. declaration order.
        let mut ready: BinaryHeap<std::cmp::Reverse<NodeIndex>> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| std::cmp::Reverse(node))
            .collect();

        let mut order = Vec::with_capacity(component.len());
        while let Some(std::cmp::Reverse(node)) = ready.pop() {
            order.push(self.graph[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(std::cmp::Reverse(next));
                    }
                }
            }
        }

        if order.len() < component.len() {
            let remaining: Vec<NodeIndex> = component
                .iter()
                .copied()
                .filter(|n| !order.contains(&self.graph[*n]))
                .collect();
            return Err(Error::Cycle(self.name_cycle(&remaining)));
        }

        Ok(order)
    }

    /// All nodes reachable from `start` ignoring edge direction.
    fn connected_component(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            for next in self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .chain(self.graph.neighbors_directed(node, Direction::Incoming))
            {
                if !seen.contains(&next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    /// Walk successors among `members` until a node repeats, and format
    /// the loop as `a -> b -> a` for the error message.
    fn name_cycle(&self, members: &[NodeIndex]) -> String {
        let member_set: HashSet<NodeIndex> = members.iter().copied().collect();

        // Start from the earliest-declared member that still has an
        // outgoing edge inside the remainder.
        let mut sorted = members.to_vec();
        sorted.sort();

        for &start in &sorted {
            let mut path = vec![start];
            let mut seen: HashSet<NodeIndex> = [start].into_iter().collect();
            let mut current = start;

            loop {
                let next = self
                    .graph
                    .neighbors_directed(current, Direction::Outgoing)
                    .find(|n| member_set.contains(n));
                let Some(next) = next else { break };

                if seen.contains(&next) {
                    // Trim the lead-in so the path starts at the repeat.
                    let pos = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut names: Vec<&str> = path[pos..]
                        .iter()
                        .map(|&n| self.graph[n].as_str())
                        .collect();
                    names.push(self.graph[next].as_str());
                    return names.join(" -> ");
                }
                seen.insert(next);
                path.push(next);
                current = next;
            }
        }

        // Cyclic subgraph with no walkable loop should not happen; fall
        // back to listing the members.
        sorted
            .iter()
            .map(|&n| self.graph[n].as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.graph.node_count())
            .field("hooks", &self.graph.edge_count())
            .finish()
    }
}

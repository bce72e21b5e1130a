//! Query plans.
//!
//! A plan is an arena of operator nodes plus typed edges. Node identity is
//! the arena index, which stays valid across clones of the id and never
//! depends on where the operator happens to live in memory. Edges carry the
//! argument name the producer feeds on the consumer; list-valued arguments
//! (a union's inputs) accumulate in edge insertion order.

use crate::error::{DbError, DbResult};
use crate::operators::Operator;

use std::fmt;

/// Arena index of one plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One producer-to-consumer connection.
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub input_arg: String,
    pub list_arg: bool,
}

#[derive(Default)]
pub struct Plan {
    nodes: Vec<Box<dyn Operator>>,
    edges: Vec<Edge>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, operator: Box<dyn Operator>) -> NodeId {
        self.nodes.push(operator);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, input_arg: &str) {
        self.edges.push(Edge {
            from,
            to,
            input_arg: input_arg.to_string(),
            list_arg: false,
        });
    }

    /// An edge feeding a list-valued argument; multiple edges with the same
    /// `input_arg` stack in the order they are added.
    pub fn add_list_edge(&mut self, from: NodeId, to: NodeId, input_arg: &str) {
        self.edges.push(Edge {
            from,
            to,
            input_arg: input_arg.to_string(),
            list_arg: true,
        });
    }

    pub fn operator(&self, id: NodeId) -> &dyn Operator {
        self.nodes[id.0].as_ref()
    }

    pub fn in_edges(&self, to: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.to == to)
    }

    /// Kahn's algorithm over the arena; deterministic (smallest ready id
    /// first). A cycle means the plan was built wrong.
    pub fn topo_order(&self) -> DbResult<Vec<NodeId>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            in_degree[edge.to.0] += 1;
        }

        let mut ready: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.iter().min().copied() {
            ready.retain(|&i| i != next);
            order.push(NodeId(next));
            for edge in &self.edges {
                if edge.from.0 == next {
                    in_degree[edge.to.0] -= 1;
                    if in_degree[edge.to.0] == 0 {
                        ready.push(edge.to.0);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(DbError::validation("Query plan contains a cycle"));
        }
        Ok(order)
    }

    /// The sink node: last in topological order.
    pub fn sink(&self) -> DbResult<NodeId> {
        self.topo_order()?
            .last()
            .copied()
            .ok_or_else(|| DbError::validation("Query plan is empty"))
    }
}

/// The seam to an external SQL frontend: anything that can turn query text
/// into a plan can drive the engine.
pub trait Planner: Send + Sync {
    fn plan(&self, sql: &str) -> DbResult<Plan>;
}

//! Data/Action dependency graph of one Context.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, Topo};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Context, DataPool, Scope};
use crate::node::ActionStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowNode {
    Data {
        uuid: Uuid,
        type_path: String,
        name: String,
        scope: Scope,
    },
    Action {
        uuid: Uuid,
        type_path: String,
        name: String,
        status: ActionStatus,
    },
    /// A UUID referenced by an action that no longer resolves
    Dangling(Uuid),
}

impl WorkflowNode {
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Data { uuid, .. } | Self::Action { uuid, .. } | Self::Dangling(uuid) => *uuid,
        }
    }

    pub fn is_dangling(&self) -> bool {
        matches!(self, Self::Dangling(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEdge {
    /// Data node bound to the named parameter
    Input { param: String },
    /// Node produced by the last successful run
    Output,
}

/// Snapshot of which nodes feed which actions.
///
/// Built from stored parameter bindings and recorded outputs; unbound
/// parameters that would be resolved at invocation time do not show up.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    graph: DiGraph<WorkflowNode, WorkflowEdge>,
    index: HashMap<Uuid, NodeIndex>,
}

impl WorkflowGraph {
    pub fn build(context: &Context, global: Option<&DataPool>) -> Self {
        let mut this = Self::default();

        for node in context.data().iter() {
            this.add(WorkflowNode::Data {
                uuid: node.uuid(),
                type_path: node.type_path().to_string(),
                name: node.name().to_string(),
                scope: Scope::Local,
            });
        }
        for action in context.actions() {
            this.add(WorkflowNode::Action {
                uuid: action.uuid(),
                type_path: action.type_path().to_string(),
                name: action.name().to_string(),
                status: action.status(),
            });
        }

        for action in context.actions() {
            let target = this.index[&action.uuid()];
            for (param, binding) in action.params() {
                for uuid in binding.uuids().unwrap_or_default() {
                    let source = this.resolve(context, global, uuid);
                    this.graph.add_edge(
                        source,
                        target,
                        WorkflowEdge::Input {
                            param: param.clone(),
                        },
                    );
                }
            }
            for uuid in action.outputs() {
                let produced = this.resolve(context, global, *uuid);
                this.graph.add_edge(target, produced, WorkflowEdge::Output);
            }
        }
        this
    }

    fn add(&mut self, node: WorkflowNode) -> NodeIndex {
        let uuid = node.uuid();
        let idx = self.graph.add_node(node);
        self.index.insert(uuid, idx);
        idx
    }

    /// Index of a referenced UUID, adding Global or dangling nodes on demand
    fn resolve(&mut self, context: &Context, global: Option<&DataPool>, uuid: Uuid) -> NodeIndex {
        if let Some(idx) = self.index.get(&uuid) {
            return *idx;
        }
        let node = match context.lookup(global, &uuid) {
            Some((node, scope)) => WorkflowNode::Data {
                uuid,
                type_path: node.type_path().to_string(),
                name: node.name().to_string(),
                scope,
            },
            None => WorkflowNode::Dangling(uuid),
        };
        self.add(node)
    }

    pub fn graph(&self) -> &DiGraph<WorkflowNode, WorkflowEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, uuid: &Uuid) -> Option<&WorkflowNode> {
        self.index.get(uuid).map(|idx| &self.graph[*idx])
    }

    /// Referenced UUIDs that resolve to nothing
    pub fn dangling(&self) -> Vec<Uuid> {
        self.graph
            .node_weights()
            .filter(|node| node.is_dangling())
            .map(WorkflowNode::uuid)
            .collect()
    }

    /// `(parameter, node)` pairs feeding an action
    pub fn inputs(&self, action: &Uuid) -> Vec<(String, Uuid)> {
        let Some(idx) = self.index.get(action) else {
            return Vec::new();
        };
        let mut inputs: Vec<(String, Uuid)> = self
            .graph
            .edges_directed(*idx, Direction::Incoming)
            .filter_map(|edge| match edge.weight() {
                WorkflowEdge::Input { param } => {
                    Some((param.clone(), self.graph[edge.source()].uuid()))
                }
                WorkflowEdge::Output => None,
            })
            .collect();
        // petgraph walks edges newest first
        inputs.reverse();
        inputs
    }

    /// Action whose last run produced `data`
    pub fn producer(&self, data: &Uuid) -> Option<Uuid> {
        let idx = self.index.get(data)?;
        self.graph
            .edges_directed(*idx, Direction::Incoming)
            .find(|edge| *edge.weight() == WorkflowEdge::Output)
            .map(|edge| self.graph[edge.source()].uuid())
    }

    /// Actions reading `data`
    pub fn consumers(&self, data: &Uuid) -> Vec<Uuid> {
        let Some(idx) = self.index.get(data) else {
            return Vec::new();
        };
        let mut consumers: Vec<Uuid> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .filter(|edge| matches!(edge.weight(), WorkflowEdge::Input { .. }))
            .map(|edge| self.graph[edge.target()].uuid())
            .collect();
        consumers.reverse();
        consumers.dedup();
        consumers
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Actions ordered so producers come before consumers. Empty when the
    /// graph has a cycle.
    pub fn action_order(&self) -> Vec<Uuid> {
        if self.is_cyclic() {
            return Vec::new();
        }
        let mut order = Vec::new();
        let mut topo = Topo::new(&self.graph);
        while let Some(idx) = topo.next(&self.graph) {
            if let WorkflowNode::Action { uuid, .. } = &self.graph[idx] {
                order.push(*uuid);
            }
        }
        order
    }
}

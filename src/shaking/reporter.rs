//! Provenance recording ("why is this kept").
//!
//! When attached, the enqueuer records one edge per retention decision into
//! a [`KeptGraph`]. Recording is guarded by an `Option` check on the hot
//! path; when no graph is attached the engine behaves identically and pays
//! one branch per transition.

use super::root_set::RetentionReason;
use crate::graph::{ProgramGraph, Reference};
use crate::rules::{Rule, RuleId};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

/// A node in the kept graph: either a rule (a root cause) or a program item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Rule(RuleId),
    Item(Reference),
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    KeptByRule,
    ConditionalKeep,
    ReferencedFrom,
    InstantiatedIn,
    DispatchTarget,
    HolderOfLiveMember,
    SupertypeOfLiveType,
    StaticInitializer,
}

impl EdgeKind {
    pub fn describe(&self) -> &'static str {
        match self {
            EdgeKind::KeptByRule => "kept by rule",
            EdgeKind::ConditionalKeep => "kept by activated conditional rule",
            EdgeKind::ReferencedFrom => "referenced from",
            EdgeKind::InstantiatedIn => "instantiated in",
            EdgeKind::DispatchTarget => "dispatch target of call in",
            EdgeKind::HolderOfLiveMember => "holds live member",
            EdgeKind::SupertypeOfLiveType => "supertype of live type",
            EdgeKind::StaticInitializer => "static initializer of",
        }
    }
}

impl RetentionReason {
    /// The provenance edge a reason induces: cause node and edge kind.
    pub(crate) fn edge(&self) -> (GraphNode, EdgeKind) {
        match *self {
            RetentionReason::KeepRule(rule) => (GraphNode::Rule(rule), EdgeKind::KeptByRule),
            RetentionReason::ConditionalRule(rule) => {
                (GraphNode::Rule(rule), EdgeKind::ConditionalKeep)
            }
            RetentionReason::ReferencedFrom(cause) => {
                (GraphNode::Item(cause), EdgeKind::ReferencedFrom)
            }
            RetentionReason::InstantiatedIn(method) => (
                GraphNode::Item(Reference::Method(method)),
                EdgeKind::InstantiatedIn,
            ),
            RetentionReason::DispatchedFrom(method) => (
                GraphNode::Item(Reference::Method(method)),
                EdgeKind::DispatchTarget,
            ),
            RetentionReason::HolderOfLiveMember(member) => {
                (GraphNode::Item(member), EdgeKind::HolderOfLiveMember)
            }
            RetentionReason::SupertypeOfLiveType(class) => (
                GraphNode::Item(Reference::Class(class)),
                EdgeKind::SupertypeOfLiveType,
            ),
            RetentionReason::StaticInitializerOf(class) => (
                GraphNode::Item(Reference::Class(class)),
                EdgeKind::StaticInitializer,
            ),
        }
    }
}

/// One step on a retention path, from a root rule down to the queried item.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub node: GraphNode,
    /// The edge leading from this node to the next step. `None` on the
    /// final step.
    pub edge: Option<EdgeKind>,
}

/// A path from a root rule to a retained item.
#[derive(Debug, Clone)]
pub struct RetentionPath {
    pub steps: Vec<PathStep>,
}

impl RetentionPath {
    /// Render the path as human-readable lines.
    pub fn render(&self, graph: &ProgramGraph, rules: &[Rule]) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| {
                let name = match step.node {
                    GraphNode::Rule(id) => rules
                        .get(id.0)
                        .map(|rule| rule.describe(id))
                        .unwrap_or_else(|| id.to_string()),
                    GraphNode::Item(reference) => graph.describe(reference),
                };
                match step.edge {
                    Some(edge) => format!("{name} [{}]", edge.describe()),
                    None => name,
                }
            })
            .collect()
    }
}

/// The recorded provenance graph.
#[derive(Debug, Default)]
pub struct KeptGraph {
    graph: DiGraph<GraphNode, EdgeKind>,
    nodes: HashMap<GraphNode, NodeIndex>,
}

impl KeptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, node: GraphNode) -> NodeIndex {
        match self.nodes.get(&node) {
            Some(&index) => index,
            None => {
                let index = self.graph.add_node(node);
                self.nodes.insert(node, index);
                index
            }
        }
    }

    /// Record one cause -> effect edge.
    pub fn record(&mut self, cause: GraphNode, effect: GraphNode, kind: EdgeKind) {
        let cause = self.node(cause);
        let effect = self.node(effect);
        self.graph.add_edge(cause, effect, kind);
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Why is this kept: a path from some root rule to the reference.
    ///
    /// Reverse BFS over recorded edges from the target back to a rule node;
    /// the first path found is returned, with ties broken by edge insertion
    /// order so answers are deterministic.
    pub fn explain(&self, target: Reference) -> Option<RetentionPath> {
        let start = *self.nodes.get(&GraphNode::Item(target))?;

        let mut parent: HashMap<NodeIndex, (NodeIndex, EdgeKind)> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut root = None;

        'search: while let Some(current) = queue.pop_front() {
            // Petgraph iterates a node's edges most-recent-first; sort by
            // edge index to honor insertion order.
            let mut incoming: Vec<(EdgeIndex, NodeIndex, EdgeKind)> = self
                .graph
                .edges_directed(current, petgraph::Direction::Incoming)
                .map(|edge| (edge.id(), edge.source(), *edge.weight()))
                .collect();
            incoming.sort_by_key(|(id, _, _)| *id);

            for (_, source, kind) in incoming {
                if source == current || parent.contains_key(&source) {
                    continue;
                }
                parent.insert(source, (current, kind));
                if matches!(self.graph[source], GraphNode::Rule(_)) {
                    root = Some(source);
                    break 'search;
                }
                queue.push_back(source);
            }
        }

        let root = root?;
        let mut steps = Vec::new();
        let mut current = root;
        loop {
            match parent.get(&current) {
                Some(&(next, kind)) => {
                    steps.push(PathStep {
                        node: self.graph[current],
                        edge: Some(kind),
                    });
                    if next == start {
                        steps.push(PathStep {
                            node: self.graph[start],
                            edge: None,
                        });
                        break;
                    }
                    current = next;
                }
                None => {
                    // root == start can only happen for rule nodes, which
                    // are never queried as items.
                    steps.push(PathStep {
                        node: self.graph[current],
                        edge: None,
                    });
                    break;
                }
            }
        }
        Some(RetentionPath { steps })
    }
}

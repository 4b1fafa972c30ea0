//! The dependency graph under construction.
//!
//! Nodes are requests that must be replayed; an edge `producer -> consumer`
//! says a value in the producer's response feeds a parameter of the
//! consumer. The graph enforces nothing on its own beyond node dedup and
//! edge bookkeeping; the resolver consults [`DependencyGraph::would_cycle`]
//! before committing an edge, and the assembler re-verifies the result.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use crate::extract::Fragment;
use crate::traffic::RecordId;

/// Identifier of a node, assigned in discovery order (`n0` is the target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Overall graph lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Resolution is still adding nodes or bindings.
    Expanding,
    /// A fixpoint was reached; every fragment is resolved or exhausted.
    Stable,
    /// The step budget ran out first. The graph is usable but some
    /// dependencies may be missing.
    Truncated,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expanding => write!(f, "expanding"),
            Self::Stable => write!(f, "stable"),
            Self::Truncated => write!(f, "truncated"),
        }
    }
}

/// Why a fragment ended up with no producer edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeReason {
    /// Every candidate was searched and none matched.
    NoProducer,
    /// The value was too short to search safely.
    BelowMinLength,
    /// The matcher stayed inconclusive through the retry.
    Inconclusive,
    /// The step budget ran out before this fragment could be searched.
    BudgetExhausted,
}

impl fmt::Display for FreeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProducer => write!(f, "no producer found"),
            Self::BelowMinLength => write!(f, "below minimum search length"),
            Self::Inconclusive => write!(f, "matcher inconclusive"),
            Self::BudgetExhausted => write!(f, "step budget exhausted"),
        }
    }
}

/// A fragment covered by a caller-supplied input variable.
#[derive(Debug, Clone)]
pub struct InputBinding {
    /// The covered fragment.
    pub fragment: Fragment,
    /// Name of the variable that covers it.
    pub variable: String,
}

/// A fragment no producer could be found for. Surfaced, never guessed.
#[derive(Debug, Clone)]
pub struct FreeParameter {
    /// The unresolved fragment.
    pub fragment: Fragment,
    /// Why resolution gave up on it.
    pub reason: FreeReason,
}

/// A candidate that matched but lost disambiguation. Kept for diagnostics.
#[derive(Debug, Clone)]
pub struct DiscardedCandidate {
    /// The losing producer.
    pub record: RecordId,
    /// Location its backend reported, when any.
    pub location: Option<String>,
}

/// A resolved fragment: which producer feeds it, and from where.
#[derive(Debug, Clone)]
pub struct ProducerBinding {
    /// The consumer-side fragment.
    pub fragment: Fragment,
    /// The chosen producer record.
    pub producer: RecordId,
    /// Where in the producer's response the value sits, when known.
    pub location: Option<String>,
    /// Candidates that also matched but lost disambiguation.
    pub discarded: Vec<DiscardedCandidate>,
}

/// One request in the graph plus everything known about its parameters.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Discovery-order identifier.
    pub id: NodeId,
    /// The underlying traffic record.
    pub record: RecordId,
    /// Resolution level at which the node entered the graph (target is 0).
    pub level: usize,
    /// Fragments covered by input variables.
    pub input_bindings: Vec<InputBinding>,
    /// Fragments resolved to producers.
    pub bindings: Vec<ProducerBinding>,
    /// Fragments surfaced as free parameters.
    pub free_parameters: Vec<FreeParameter>,
}

/// The graph: nodes in discovery order plus the producer -> consumer edges.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    target: RecordId,
    nodes: Vec<DependencyNode>,
    by_record: HashMap<RecordId, NodeId>,
    edges: BTreeSet<(RecordId, RecordId)>,
    outgoing: HashMap<RecordId, Vec<RecordId>>,
    state: GraphState,
    levels_used: usize,
}

impl DependencyGraph {
    /// Starts a graph containing only the target node.
    #[must_use]
    pub fn new(target: RecordId) -> Self {
        let mut graph = Self {
            target,
            nodes: Vec::new(),
            by_record: HashMap::new(),
            edges: BTreeSet::new(),
            outgoing: HashMap::new(),
            state: GraphState::Expanding,
            levels_used: 0,
        };
        graph.add_node(target, 0);
        graph
    }

    /// The record resolution started from.
    #[must_use]
    pub fn target(&self) -> RecordId {
        self.target
    }

    /// Adds a node for a record, or returns the existing one. Duplicate
    /// producers collapse here, which is what keeps the request set minimal.
    pub fn add_node(&mut self, record: RecordId, level: usize) -> NodeId {
        if let Some(id) = self.by_record.get(&record) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(DependencyNode {
            id,
            record,
            level,
            input_bindings: Vec::new(),
            bindings: Vec::new(),
            free_parameters: Vec::new(),
        });
        self.by_record.insert(record, id);
        id
    }

    /// Node lookup by record.
    #[must_use]
    pub fn node_for(&self, record: RecordId) -> Option<NodeId> {
        self.by_record.get(&record).copied()
    }

    /// All nodes in discovery order.
    #[must_use]
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    /// All `producer -> consumer` edges, deduplicated and ordered.
    pub fn edges(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.edges.iter().copied()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Would adding `producer -> consumer` close a directed cycle?
    ///
    /// True when the producer is already reachable from the consumer, i.e.
    /// the producer transitively consumes the consumer's output.
    #[must_use]
    pub fn would_cycle(&self, producer: RecordId, consumer: RecordId) -> bool {
        if producer == consumer {
            return true;
        }
        let mut queue = VecDeque::from([consumer]);
        let mut seen = BTreeSet::from([consumer]);
        while let Some(current) = queue.pop_front() {
            if current == producer {
                return true;
            }
            if let Some(next) = self.outgoing.get(&current) {
                for &neighbor in next {
                    if seen.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        false
    }

    /// Records a resolved fragment on its consumer node and adds the edge.
    pub fn add_binding(&mut self, consumer: NodeId, binding: ProducerBinding) {
        let Some(node) = self.nodes.get_mut(consumer.0) else {
            return;
        };
        let consumer_record = node.record;
        let producer = binding.producer;
        node.bindings.push(binding);
        if self.edges.insert((producer, consumer_record)) {
            self.outgoing.entry(producer).or_default().push(consumer_record);
        }
    }

    /// Records a fragment covered by an input variable.
    pub fn add_input_binding(&mut self, consumer: NodeId, fragment: Fragment, variable: String) {
        if let Some(node) = self.nodes.get_mut(consumer.0) {
            node.input_bindings.push(InputBinding { fragment, variable });
        }
    }

    /// Records a fragment that resolution gave up on.
    pub fn add_free_parameter(&mut self, consumer: NodeId, fragment: Fragment, reason: FreeReason) {
        if let Some(node) = self.nodes.get_mut(consumer.0) {
            node.free_parameters.push(FreeParameter { fragment, reason });
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Marks the end of resolution.
    pub fn finish(&mut self, state: GraphState, levels_used: usize) {
        self.state = state;
        self.levels_used = levels_used;
    }

    /// How many levels resolution ran for.
    #[must_use]
    pub fn levels_used(&self) -> usize {
        self.levels_used
    }
}

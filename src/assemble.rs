//! Plan assembly: from a finished dependency graph to the serializable
//! request plan the command surface prints, saves, and reloads.
//!
//! Assembly re-verifies what the resolver promised. Every edge must point
//! forward in capture time and the edge set must order topologically; a
//! violation here is a bug upstream, reported as a structural error rather
//! than papered over.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{DependencyGraph, NodeId};
use crate::traffic::TrafficStore;
use crate::{RetraceError, RetraceResult};

/// A replayable plan: the minimal request set, ordered, with every known
/// parameter source spelled out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPlan {
    /// Unique id of this assembly run.
    pub id: String,
    /// When the plan was assembled.
    pub generated_at: DateTime<Utc>,
    /// Path of the capture the plan was derived from.
    pub capture: String,
    /// The action description resolution ran with.
    pub action: String,
    /// Final graph state (`stable` or `truncated`).
    pub state: String,
    /// Resolution levels consumed.
    pub levels: usize,
    /// Node label of the target request.
    pub target: String,
    /// Node labels in replay order, producers before consumers.
    pub execution_order: Vec<String>,
    /// All nodes in discovery order (`n0` is the target).
    pub nodes: Vec<PlanNode>,
    /// Producer -> consumer edges by node label.
    pub edges: Vec<PlanEdge>,
}

/// One request in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node label, `n0` for the target.
    pub id: String,
    /// Record label within the source capture.
    pub record: String,
    /// HTTP method.
    pub method: String,
    /// Full request URL as captured.
    pub url: String,
    /// Captured response status.
    pub status: u16,
    /// Capture timestamp of the underlying record.
    pub captured_at: DateTime<Utc>,
    /// Resolution level the node entered the graph at.
    pub level: usize,
    /// Parameters covered by caller-supplied input variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PlanInput>,
    /// Parameters that must be lifted from an earlier response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<PlanNeed>,
    /// Parameters with no known source. The caller must supply these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub free: Vec<PlanFree>,
}

/// A parameter bound to an input variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInput {
    /// Where the parameter sits in the request.
    pub location: String,
    /// Captured value.
    pub value: String,
    /// Variable that covers it.
    pub variable: String,
}

/// A parameter fed by an earlier response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNeed {
    /// Where the parameter sits in the request.
    pub location: String,
    /// Captured value.
    pub value: String,
    /// Node label of the producer request.
    pub from: String,
    /// Location within the producer's response, when the backend reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    /// Candidates that also matched but lost disambiguation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<PlanRejected>,
}

/// A matching candidate that lost disambiguation. Diagnostic only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRejected {
    /// Record label of the losing candidate.
    pub record: String,
    /// Location its backend reported, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
}

/// A parameter resolution gave up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFree {
    /// Where the parameter sits in the request.
    pub location: String,
    /// Captured value.
    pub value: String,
    /// Why no producer was bound.
    pub reason: String,
}

/// One dependency edge by node label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEdge {
    /// Producer node label.
    pub from: String,
    /// Consumer node label.
    pub to: String,
}

impl RequestPlan {
    /// Serializes the plan as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_yaml(&self) -> RetraceResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Serializes the plan as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_json(&self) -> RetraceResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a plan back from its YAML form.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a plan document.
    pub fn from_yaml_str(text: &str) -> RetraceResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Assembles the final plan from a resolved graph.
///
/// # Errors
///
/// Returns a structural error when an edge violates capture-time causality,
/// when the edge set does not order topologically, or when an edge refers to
/// a record the graph has no node for.
pub fn assemble(
    store: &TrafficStore,
    graph: &DependencyGraph,
    capture: &str,
    action: &str,
) -> RetraceResult<RequestPlan> {
    verify_causality(store, graph)?;
    let order = execution_order(graph)?;
    let target = graph.node_for(graph.target()).ok_or_else(|| {
        RetraceError::structural(format!("target {} has no node", graph.target()))
    })?;

    let mut nodes = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        let record = store.get(node.record).ok_or_else(|| {
            RetraceError::structural(format!("node {} refers to unknown record {}", node.id, node.record))
        })?;

        let mut needs = Vec::with_capacity(node.bindings.len());
        for binding in &node.bindings {
            let producer = graph.node_for(binding.producer).ok_or_else(|| {
                RetraceError::structural(format!(
                    "producer {} of node {} was never added to the graph",
                    binding.producer, node.id
                ))
            })?;
            needs.push(PlanNeed {
                location: binding.fragment.location.to_string(),
                value: binding.fragment.value.clone(),
                from: producer.to_string(),
                at: binding.location.clone(),
                rejected: binding
                    .discarded
                    .iter()
                    .map(|candidate| PlanRejected {
                        record: candidate.record.to_string(),
                        at: candidate.location.clone(),
                    })
                    .collect(),
            });
        }

        nodes.push(PlanNode {
            id: node.id.to_string(),
            record: node.record.to_string(),
            method: record.method.clone(),
            url: record.url.clone(),
            status: record.status,
            captured_at: record.started_at,
            level: node.level,
            inputs: node
                .input_bindings
                .iter()
                .map(|binding| PlanInput {
                    location: binding.fragment.location.to_string(),
                    value: binding.fragment.value.clone(),
                    variable: binding.variable.clone(),
                })
                .collect(),
            needs,
            free: node
                .free_parameters
                .iter()
                .map(|free| PlanFree {
                    location: free.fragment.location.to_string(),
                    value: free.fragment.value.clone(),
                    reason: free.reason.to_string(),
                })
                .collect(),
        });
    }

    let mut edges = Vec::with_capacity(graph.edge_count());
    for (producer, consumer) in graph.edges() {
        let (Some(from), Some(to)) = (graph.node_for(producer), graph.node_for(consumer)) else {
            return Err(RetraceError::structural(format!(
                "edge {producer} -> {consumer} references records outside the graph"
            )));
        };
        edges.push(PlanEdge {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    Ok(RequestPlan {
        id: uuid::Uuid::new_v4().to_string(),
        generated_at: Utc::now(),
        capture: capture.to_string(),
        action: action.to_string(),
        state: graph.state().to_string(),
        levels: graph.levels_used(),
        target: target.to_string(),
        execution_order: order.iter().map(ToString::to_string).collect(),
        nodes,
        edges,
    })
}

/// Checks that every edge points forward in capture time.
fn verify_causality(store: &TrafficStore, graph: &DependencyGraph) -> RetraceResult<()> {
    for (producer, consumer) in graph.edges() {
        let (Some(before), Some(after)) = (store.get(producer), store.get(consumer)) else {
            return Err(RetraceError::structural(format!(
                "edge {producer} -> {consumer} references records outside the capture"
            )));
        };
        if before.started_at >= after.started_at {
            return Err(RetraceError::structural(format!(
                "producer {producer} does not precede consumer {consumer} in the capture"
            )));
        }
    }
    Ok(())
}

/// Kahn's algorithm over the node set, smallest node label first among the
/// ready set so replay order is deterministic.
fn execution_order(graph: &DependencyGraph) -> RetraceResult<Vec<NodeId>> {
    let mut indegree: HashMap<NodeId, usize> =
        graph.nodes().iter().map(|node| (node.id, 0)).collect();
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (producer, consumer) in graph.edges() {
        let (Some(from), Some(to)) = (graph.node_for(producer), graph.node_for(consumer)) else {
            return Err(RetraceError::structural(format!(
                "edge {producer} -> {consumer} references records outside the graph"
            )));
        };
        adjacency.entry(from).or_default().push(to);
        *indegree.entry(to).or_default() += 1;
    }

    let mut ready: BTreeSet<NodeId> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(graph.nodes().len());
    while let Some(next) = ready.iter().next().copied() {
        ready.remove(&next);
        order.push(next);
        for consumer in adjacency.get(&next).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(consumer) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*consumer);
                }
            }
        }
    }

    if order.len() != graph.nodes().len() {
        return Err(RetraceError::structural(
            "dependency graph does not order topologically",
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Fragment, FragmentLocation};
    use crate::graph::{GraphState, ProducerBinding};
    use crate::traffic::RecordId;

    fn chain_store() -> TrafficStore {
        let text = r#"{
          "log": {
            "entries": [
              {
                "startedDateTime": "2024-03-01T10:00:00.000Z",
                "request": {"method": "POST", "url": "https://api.example.com/login"},
                "response": {"status": 200}
              },
              {
                "startedDateTime": "2024-03-01T10:00:05.000Z",
                "request": {"method": "GET", "url": "https://api.example.com/account"},
                "response": {"status": 200}
              },
              {
                "startedDateTime": "2024-03-01T10:00:10.000Z",
                "request": {"method": "GET", "url": "https://api.example.com/bill?accountId=123"},
                "response": {"status": 200}
              }
            ]
          }
        }"#;
        TrafficStore::from_har_str(text).expect("parse")
    }

    fn binding(consumer: RecordId, producer: RecordId, value: &str) -> ProducerBinding {
        ProducerBinding {
            fragment: Fragment {
                record: consumer,
                location: FragmentLocation::Query("x".into()),
                value: value.into(),
            },
            producer,
            location: Some("/id".into()),
            discarded: Vec::new(),
        }
    }

    fn chain_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new(RecordId(2));
        let target = graph.node_for(RecordId(2)).unwrap();
        let account = graph.add_node(RecordId(1), 1);
        graph.add_binding(target, binding(RecordId(2), RecordId(1), "123"));
        graph.add_node(RecordId(0), 2);
        graph.add_binding(account, binding(RecordId(1), RecordId(0), "tok12345"));
        graph.finish(GraphState::Stable, 2);
        graph
    }

    #[test]
    fn producers_come_first_in_execution_order() {
        let store = chain_store();
        let graph = chain_graph();
        let plan = assemble(&store, &graph, "bill.har", "download the bill").expect("assemble");

        assert_eq!(plan.execution_order, vec!["n2", "n1", "n0"]);
        assert_eq!(plan.target, "n0");
        assert_eq!(plan.state, "stable");
        assert_eq!(plan.levels, 2);
        assert_eq!(plan.nodes.len(), 3);
        assert_eq!(plan.nodes[0].id, "n0");
        assert_eq!(plan.nodes[0].url, "https://api.example.com/bill?accountId=123");
        assert_eq!(plan.nodes[0].needs.len(), 1);
        assert_eq!(plan.nodes[0].needs[0].from, "n1");
        assert_eq!(plan.nodes[0].needs[0].at.as_deref(), Some("/id"));
        assert_eq!(plan.edges.len(), 2);
    }

    #[test]
    fn causality_violation_is_fatal() {
        let store = chain_store();
        // target is the earliest record; any producer edge points backward
        let mut graph = DependencyGraph::new(RecordId(0));
        let target = graph.node_for(RecordId(0)).unwrap();
        graph.add_node(RecordId(1), 1);
        graph.add_binding(target, binding(RecordId(0), RecordId(1), "123"));
        graph.finish(GraphState::Stable, 1);

        let err = assemble(&store, &graph, "bill.har", "action").expect_err("causality");
        assert!(matches!(err, RetraceError::Structural(_)));
    }

    #[test]
    fn sibling_producers_replay_in_discovery_order() {
        let store = chain_store();
        let mut graph = DependencyGraph::new(RecordId(2));
        let target = graph.node_for(RecordId(2)).unwrap();
        graph.add_node(RecordId(0), 1);
        graph.add_node(RecordId(1), 1);
        graph.add_binding(target, binding(RecordId(2), RecordId(0), "a1b2c3d4"));
        graph.add_binding(target, binding(RecordId(2), RecordId(1), "123"));
        graph.finish(GraphState::Stable, 1);

        let plan = assemble(&store, &graph, "bill.har", "action").expect("assemble");
        assert_eq!(plan.execution_order, vec!["n1", "n2", "n0"]);
    }

    #[test]
    fn yaml_round_trip_preserves_structure() {
        let store = chain_store();
        let graph = chain_graph();
        let plan = assemble(&store, &graph, "bill.har", "download the bill").expect("assemble");

        let yaml = plan.to_yaml().expect("serialize");
        let reloaded = RequestPlan::from_yaml_str(&yaml).expect("parse");
        assert_eq!(reloaded.id, plan.id);
        assert_eq!(reloaded.execution_order, plan.execution_order);
        assert_eq!(reloaded.nodes.len(), plan.nodes.len());
        assert_eq!(reloaded.nodes[0].needs[0].value, "123");
        assert_eq!(reloaded.action, "download the bill");
    }

    #[test]
    fn free_parameters_survive_assembly() {
        let store = chain_store();
        let mut graph = DependencyGraph::new(RecordId(2));
        let target = graph.node_for(RecordId(2)).unwrap();
        graph.add_free_parameter(
            target,
            Fragment {
                record: RecordId(2),
                location: FragmentLocation::Query("accountId".into()),
                value: "123".into(),
            },
            crate::graph::FreeReason::NoProducer,
        );
        graph.finish(GraphState::Stable, 1);

        let plan = assemble(&store, &graph, "bill.har", "action").expect("assemble");
        assert_eq!(plan.nodes[0].free.len(), 1);
        assert_eq!(plan.nodes[0].free[0].reason, "no producer found");
        assert_eq!(plan.execution_order, vec!["n0"]);
    }
}

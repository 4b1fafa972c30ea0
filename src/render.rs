//! Human-readable views of a request plan: the dependency tree and the
//! flat replay listing.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::assemble::{PlanNode, RequestPlan};

enum Child<'a> {
    Producer { node: &'a PlanNode, context: String },
    Note(String),
}

/// Renders the dependency tree, target at the root.
///
/// A node shared by several consumers is expanded once, at its first
/// appearance; later appearances are cited with `(already shown)`.
#[must_use]
pub fn tree(plan: &RequestPlan) -> String {
    let nodes: HashMap<&str, &PlanNode> =
        plan.nodes.iter().map(|node| (node.id.as_str(), node)).collect();
    let mut out = String::new();
    let Some(target) = nodes.get(plan.target.as_str()) else {
        let _ = writeln!(out, "plan has no target node");
        return out;
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(target.id.clone());
    let _ = writeln!(out, "{}", node_line(target));
    render_children(target, &nodes, "", &mut visited, &mut out);

    if plan.state == "truncated" {
        let _ = writeln!(
            out,
            "\nresolution truncated after {} levels; some dependencies may be missing",
            plan.levels
        );
    }
    out
}

/// Renders the numbered replay listing, producers first.
///
/// Each step names the bindings to substitute into its request, the values
/// the caller must supply by hand, and what its response must provide to
/// later steps.
#[must_use]
pub fn execution_listing(plan: &RequestPlan) -> String {
    let nodes: HashMap<&str, &PlanNode> =
        plan.nodes.iter().map(|node| (node.id.as_str(), node)).collect();

    let mut provides: HashMap<&str, Vec<String>> = HashMap::new();
    for node in &plan.nodes {
        for need in &node.needs {
            provides.entry(need.from.as_str()).or_default().push(format!(
                "lift {} for [{}] {}",
                need.at.as_deref().unwrap_or("a response value"),
                node.id,
                need.location
            ));
        }
    }

    let mut out = String::new();
    for (step, label) in plan.execution_order.iter().enumerate() {
        let Some(node) = nodes.get(label.as_str()) else {
            continue;
        };
        let _ = writeln!(out, "{}. {}", step + 1, node_line(node));
        for need in &node.needs {
            let _ = writeln!(
                out,
                "   fill {} from [{}] {}",
                need.location,
                need.from,
                need.at.as_deref().unwrap_or("response")
            );
        }
        for input in &node.inputs {
            let _ = writeln!(out, "   supply ${} for {}", input.variable, input.location);
        }
        for free in &node.free {
            let _ = writeln!(out, "   free {} = {:?} ({})", free.location, free.value, free.reason);
        }
        for line in provides.get(label.as_str()).into_iter().flatten() {
            let _ = writeln!(out, "   {line}");
        }
    }
    out
}

/// The full report: tree first, replay listing after.
#[must_use]
pub fn report(plan: &RequestPlan) -> String {
    format!("{}\nReplay order:\n{}", tree(plan), execution_listing(plan))
}

fn node_line(node: &PlanNode) -> String {
    format!("[{}] {} {}", node.id, node.method, node.url)
}

fn render_children(
    node: &PlanNode,
    nodes: &HashMap<&str, &PlanNode>,
    prefix: &str,
    visited: &mut HashSet<String>,
    out: &mut String,
) {
    let mut children: Vec<Child<'_>> = Vec::new();
    for need in &node.needs {
        match nodes.get(need.from.as_str()) {
            Some(producer) => children.push(Child::Producer {
                node: producer,
                context: format!(
                    "{} <- {}",
                    need.location,
                    need.at.as_deref().unwrap_or("response")
                ),
            }),
            None => children.push(Child::Note(format!(
                "{} <- missing node {}",
                need.location, need.from
            ))),
        }
    }
    for input in &node.inputs {
        children.push(Child::Note(format!(
            "{} = {:?} covered by ${}",
            input.location, input.value, input.variable
        )));
    }
    for free in &node.free {
        children.push(Child::Note(format!(
            "{} = {:?} unresolved ({})",
            free.location, free.value, free.reason
        )));
    }

    let count = children.len();
    for (index, child) in children.into_iter().enumerate() {
        let last = index + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let continuation = if last { "    " } else { "│   " };
        match child {
            Child::Producer { node: producer, context } => {
                let first_visit = visited.insert(producer.id.clone());
                let citation = if first_visit { "" } else { "  (already shown)" };
                let _ = writeln!(
                    out,
                    "{prefix}{connector}{}  ({context}){citation}",
                    node_line(producer)
                );
                if first_visit {
                    render_children(
                        producer,
                        nodes,
                        &format!("{prefix}{continuation}"),
                        visited,
                        out,
                    );
                }
            }
            Child::Note(text) => {
                let _ = writeln!(out, "{prefix}{connector}{text}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{PlanFree, PlanInput, PlanNeed, RequestPlan};
    use chrono::{TimeZone, Utc};

    fn node(id: &str, method: &str, url: &str) -> PlanNode {
        PlanNode {
            id: id.into(),
            record: id.replace('n', "r"),
            method: method.into(),
            url: url.into(),
            status: 200,
            captured_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            level: 0,
            inputs: Vec::new(),
            needs: Vec::new(),
            free: Vec::new(),
        }
    }

    fn need(location: &str, value: &str, from: &str, at: &str) -> PlanNeed {
        PlanNeed {
            location: location.into(),
            value: value.into(),
            from: from.into(),
            at: Some(at.into()),
            rejected: Vec::new(),
        }
    }

    fn plan(nodes: Vec<PlanNode>, order: &[&str]) -> RequestPlan {
        RequestPlan {
            id: "test-plan".into(),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            capture: "test.har".into(),
            action: "download the bill".into(),
            state: "stable".into(),
            levels: 2,
            target: "n0".into(),
            execution_order: order.iter().map(|s| (*s).to_string()).collect(),
            nodes,
            edges: Vec::new(),
        }
    }

    fn diamond_plan() -> RequestPlan {
        let mut target = node("n0", "GET", "https://api.example.com/bill?accountId=123");
        target.needs.push(need("query:accountId", "123", "n1", "/id"));
        target.needs.push(need("header:authorization", "tok12345", "n2", "/token"));
        let mut account = node("n1", "GET", "https://api.example.com/account");
        account.needs.push(need("header:authorization", "tok12345", "n2", "/token"));
        let login = node("n2", "POST", "https://api.example.com/login");
        plan(vec![target, account, login], &["n2", "n1", "n0"])
    }

    #[test]
    fn tree_expands_shared_producer_once() {
        let rendered = tree(&diamond_plan());
        assert!(rendered.starts_with("[n0] GET https://api.example.com/bill?accountId=123"));
        assert!(rendered.contains(
            "├── [n1] GET https://api.example.com/account  (query:accountId <- /id)"
        ));
        assert!(rendered.contains(
            "│   └── [n2] POST https://api.example.com/login  (header:authorization <- /token)"
        ));
        assert!(rendered.contains("(already shown)"));
        // expanded once: exactly two lines mention n2
        assert_eq!(rendered.matches("[n2] POST").count(), 2);
    }

    #[test]
    fn tree_annotates_inputs_and_free_parameters() {
        let mut target = node("n0", "GET", "https://api.example.com/bill?accountId=123&year=2023");
        target.inputs.push(PlanInput {
            location: "query:year".into(),
            value: "2023".into(),
            variable: "YEAR".into(),
        });
        target.free.push(PlanFree {
            location: "query:accountId".into(),
            value: "123".into(),
            reason: "no producer found".into(),
        });
        let rendered = tree(&plan(vec![target], &["n0"]));
        assert!(rendered.contains("├── query:year = \"2023\" covered by $YEAR"));
        assert!(rendered.contains("└── query:accountId = \"123\" unresolved (no producer found)"));
    }

    #[test]
    fn truncated_plans_carry_a_warning_footer() {
        let mut truncated = plan(vec![node("n0", "GET", "https://api.example.com/a")], &["n0"]);
        truncated.state = "truncated".into();
        let rendered = tree(&truncated);
        assert!(rendered.contains("truncated after 2 levels"));
    }

    #[test]
    fn listing_orders_steps_and_names_lifts() {
        let rendered = execution_listing(&diamond_plan());
        let first = rendered.find("1. [n2] POST").expect("login first");
        let second = rendered.find("2. [n1] GET").expect("account second");
        let third = rendered.find("3. [n0] GET").expect("target last");
        assert!(first < second && second < third);
        assert!(rendered.contains("lift /token for [n0] header:authorization"));
        assert!(rendered.contains("lift /token for [n1] header:authorization"));
        assert!(rendered.contains("lift /id for [n0] query:accountId"));
    }

    #[test]
    fn listing_names_consumed_bindings_per_step() {
        let rendered = execution_listing(&diamond_plan());
        assert!(rendered.contains("fill query:accountId from [n1] /id"));
        assert!(rendered.contains("fill header:authorization from [n2] /token"));
        // the login step consumes nothing
        let login = rendered.find("1. [n2]").expect("login step");
        let next = rendered.find("2. [n1]").expect("account step");
        assert!(!rendered[login..next].contains("fill "));
    }

    #[test]
    fn listing_flags_caller_supplied_values() {
        let mut target = node("n0", "GET", "https://api.example.com/bill?year=2023");
        target.inputs.push(PlanInput {
            location: "query:year".into(),
            value: "2023".into(),
            variable: "YEAR".into(),
        });
        let rendered = execution_listing(&plan(vec![target], &["n0"]));
        assert!(rendered.contains("supply $YEAR for query:year"));
    }

    #[test]
    fn report_contains_both_views() {
        let rendered = report(&diamond_plan());
        assert!(rendered.contains("└── "));
        assert!(rendered.contains("Replay order:"));
        assert!(rendered.contains("1. [n2] POST"));
    }
}

//! Placement diagnostics for allocations the scheduler could not place.

use std::collections::BTreeMap;

use crate::api::{Allocation, AllocationMetric};
use crate::sink::OutputSink;

/// Explain why placement failed, one line per finding.
///
/// Absent metrics are treated as an all-zero record. Maps are walked in
/// name order so repeated calls produce identical output.
pub fn format_placement_failure(metrics: Option<&AllocationMetric>) -> Vec<String> {
    let zero = AllocationMetric::default();
    let metrics = metrics.unwrap_or(&zero);
    let mut lines = Vec::new();

    if metrics.nodes_evaluated == 0 {
        lines.push("No nodes were eligible for evaluation".to_string());
    } else {
        lines.push(format!(
            "{}/{} nodes filtered",
            metrics.nodes_filtered, metrics.nodes_evaluated
        ));
    }

    for (class, count) in nonzero(&metrics.class_filtered) {
        lines.push(format!("Class \"{}\" filtered {} nodes", class, count));
    }
    for (constraint, count) in nonzero(&metrics.constraint_filtered) {
        lines.push(format!(
            "Constraint \"{}\" filtered {} nodes",
            constraint, count
        ));
    }

    if metrics.nodes_exhausted > 0 {
        lines.push(format!(
            "Resources exhausted on {} nodes",
            metrics.nodes_exhausted
        ));
    }
    for (class, count) in nonzero(&metrics.class_exhausted) {
        lines.push(format!("Class \"{}\" exhausted on {} nodes", class, count));
    }
    for (dimension, count) in nonzero(&metrics.dimension_exhausted) {
        lines.push(format!(
            "Dimension \"{}\" exhausted on {} nodes",
            dimension, count
        ));
    }

    for (name, score) in &metrics.scores {
        lines.push(format!("Score \"{}\" = {:.6}", name, score));
    }

    lines
}

/// Header plus bulleted diagnostics for one allocation.
pub fn allocation_status_lines(alloc: &Allocation) -> Vec<String> {
    let mut lines = vec![format!(
        "Allocation \"{}\" (group \"{}\") status \"{}\"",
        alloc.id, alloc.task_group, alloc.client_status
    )];
    lines.extend(
        format_placement_failure(alloc.metrics.as_ref())
            .into_iter()
            .map(|line| format!("  * {}", line)),
    );
    lines
}

/// Write an allocation's placement diagnostics to the sink.
pub fn dump_allocation_status<S: OutputSink + ?Sized>(sink: &mut S, alloc: &Allocation) {
    for line in allocation_status_lines(alloc) {
        sink.output(&line);
    }
}

fn nonzero<'a>(map: &'a BTreeMap<String, u64>) -> impl Iterator<Item = (&'a String, &'a u64)> + 'a {
    map.iter().filter(|(_, count)| **count > 0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::api::{ClientStatus, DesiredStatus};
    use crate::sink::MemorySink;

    fn counts(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect()
    }

    fn allocation(metrics: Option<AllocationMetric>) -> Allocation {
        Allocation {
            id: "alloc1".to_string(),
            eval_id: "eval1".to_string(),
            task_group: "group1".to_string(),
            node_id: String::new(),
            desired_status: DesiredStatus::Run,
            desired_description: String::new(),
            client_status: ClientStatus::Running,
            client_description: String::new(),
            create_index: 1,
            metrics,
        }
    }

    fn busy_cluster() -> AllocationMetric {
        AllocationMetric {
            nodes_evaluated: 10,
            nodes_filtered: 5,
            nodes_exhausted: 1,
            constraint_filtered: counts(&[("$attr.kernel.name = linux", 1)]),
            class_exhausted: counts(&[("web-large", 1)]),
            dimension_exhausted: counts(&[("cpu", 1)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_dump_allocation_status() {
        let mut sink = MemorySink::new();
        dump_allocation_status(&mut sink, &allocation(Some(busy_cluster())));

        let out = sink.text();
        assert!(out.contains("alloc1"), "missing alloc\n\n{out}");
        assert!(out.contains("group1"), "missing group\n\n{out}");
        assert!(out.contains("running"), "missing status\n\n{out}");
        assert!(out.contains("5/10"), "missing filter stats\n\n{out}");
        assert!(out.contains(r#"Constraint "$attr.kernel.name = linux" filtered 1 nodes"#));
        assert!(out.contains("Resources exhausted on 1 nodes"));
        assert!(out.contains(r#"Class "web-large" exhausted on 1 nodes"#));
        assert!(out.contains(r#"Dimension "cpu" exhausted on 1 nodes"#));
        assert!(!out.contains("No nodes were eligible"));
    }

    #[test]
    fn test_no_eligible_nodes_warning_replaces_ratio() {
        let mut metrics = busy_cluster();
        metrics.nodes_evaluated = 0;

        let lines = format_placement_failure(Some(&metrics));
        assert_eq!(lines[0], "No nodes were eligible for evaluation");
        assert!(lines.iter().all(|line| !line.contains("nodes filtered")));
    }

    #[test]
    fn test_absent_metrics() {
        let lines = format_placement_failure(None);
        assert_eq!(lines, vec!["No nodes were eligible for evaluation"]);

        let lines = allocation_status_lines(&allocation(None));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "  * No nodes were eligible for evaluation");
    }

    #[test]
    fn test_zero_counts_are_skipped() {
        let metrics = AllocationMetric {
            nodes_evaluated: 4,
            nodes_filtered: 0,
            constraint_filtered: counts(&[("${node.class} = gpu", 0)]),
            class_exhausted: counts(&[("batch", 0)]),
            ..Default::default()
        };

        assert_eq!(
            format_placement_failure(Some(&metrics)),
            vec!["0/4 nodes filtered"]
        );
    }

    #[test]
    fn test_lines_follow_name_order() {
        let metrics = AllocationMetric {
            nodes_evaluated: 6,
            nodes_filtered: 6,
            class_filtered: counts(&[("storage", 1)]),
            constraint_filtered: counts(&[("zone = b", 2), ("arch = arm64", 3)]),
            ..Default::default()
        };

        assert_eq!(
            format_placement_failure(Some(&metrics)),
            vec![
                "6/6 nodes filtered",
                r#"Class "storage" filtered 1 nodes"#,
                r#"Constraint "arch = arm64" filtered 3 nodes"#,
                r#"Constraint "zone = b" filtered 2 nodes"#,
            ]
        );
    }

    #[test]
    fn test_scores_are_listed() {
        let metrics = AllocationMetric {
            nodes_evaluated: 1,
            scores: [("node1.binpack".to_string(), 2.5)].into_iter().collect(),
            ..Default::default()
        };

        let lines = format_placement_failure(Some(&metrics));
        assert_eq!(lines.last().unwrap(), r#"Score "node1.binpack" = 2.500000"#);
    }

    proptest! {
        #[test]
        fn formatting_is_deterministic(
            evaluated in 0u64..50,
            filtered in 0u64..50,
            constraints in proptest::collection::btree_map("[a-z]{1,8}", 0u64..5, 0..6),
        ) {
            let metrics = AllocationMetric {
                nodes_evaluated: evaluated,
                nodes_filtered: filtered,
                constraint_filtered: constraints.clone(),
                ..Default::default()
            };

            let first = format_placement_failure(Some(&metrics));
            let second = format_placement_failure(Some(&metrics.clone()));
            prop_assert_eq!(&first, &second);

            let constraint_lines = first.iter().filter(|l| l.starts_with("Constraint")).count();
            let expected = constraints.values().filter(|c| **c > 0).count();
            prop_assert_eq!(constraint_lines, expected);
        }
    }
}

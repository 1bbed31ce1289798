//! Deploy ordering.

use solution_deploy::core::{SolutionError, find_solution_error};
use solution_deploy::resolver::{DependencyGraph, order, sort_templates};

use crate::common::{ids, template};

fn cycle_of(err: &anyhow::Error) -> Vec<String> {
    match find_solution_error(err) {
        Some(SolutionError::CyclicDependency {
            cycle,
        }) => cycle.clone(),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_chain_is_created_leaf_first() {
    let templates = vec![
        template("app", "Web Mapping Application", &["map"]),
        template("map", "Web Map", &["svc"]),
        template("svc", "Feature Service", &[]),
    ];
    let sorted = sort_templates(templates).unwrap();
    assert_eq!(ids(&sorted), vec!["svc", "map", "app"]);
}

#[test]
fn test_diamond_creates_shared_dependency_once_and_first() {
    let templates = vec![
        template("a", "Dashboard", &["b", "c"]),
        template("b", "Web Map", &["d"]),
        template("c", "Web Map", &["d"]),
        template("d", "Feature Service", &[]),
    ];
    assert_eq!(order(&templates).unwrap(), vec!["d", "b", "c", "a"]);
}

#[test]
fn test_ties_follow_input_order() {
    let forward = vec![template("x", "PDF", &[]), template("y", "PDF", &[]), template("z", "PDF", &[])];
    assert_eq!(order(&forward).unwrap(), vec!["x", "y", "z"]);

    let reverse = vec![template("z", "PDF", &[]), template("y", "PDF", &[]), template("x", "PDF", &[])];
    assert_eq!(order(&reverse).unwrap(), vec!["z", "y", "x"]);
}

#[test]
fn test_order_is_stable_across_runs() {
    let build = || {
        vec![
            template("g", "Group", &["m1", "m2", "doc"]),
            template("m1", "Web Map", &["svc"]),
            template("m2", "Web Map", &["svc"]),
            template("doc", "PDF", &[]),
            template("svc", "Feature Service", &[]),
        ]
    };
    let first = order(&build()).unwrap();
    for _ in 0..10 {
        assert_eq!(order(&build()).unwrap(), first);
    }
}

#[test]
fn test_external_references_are_ignored() {
    let templates = vec![template("map", "Web Map", &["basemap-outside-solution"])];
    assert_eq!(order(&templates).unwrap(), vec!["map"]);
}

#[test]
fn test_two_node_cycle_is_reported() {
    let templates = vec![template("a", "Web Map", &["b"]), template("b", "Web Map", &["a"])];
    let err = order(&templates).unwrap_err();
    assert_eq!(cycle_of(&err), vec!["a", "b", "a"]);
    assert!(err.to_string().contains("Cyclical dependency"));
}

#[test]
fn test_self_cycle_is_reported() {
    let templates = vec![template("a", "Web Map", &["a"]), template("b", "PDF", &[])];
    let err = sort_templates(templates).unwrap_err();
    assert_eq!(cycle_of(&err), vec!["a", "a"]);
}

#[test]
fn test_cycle_behind_an_acyclic_prefix() {
    let templates = vec![
        template("root", "Dashboard", &["a"]),
        template("a", "Web Map", &["b"]),
        template("b", "Web Map", &["c"]),
        template("c", "Web Map", &["a"]),
    ];
    let err = order(&templates).unwrap_err();
    assert_eq!(cycle_of(&err), vec!["a", "b", "c", "a"]);
}

#[test]
fn test_roots_and_tree() {
    let templates = vec![
        template("app", "Web Mapping Application", &["map"]),
        template("map", "Web Map", &["svc"]),
        template("svc", "Feature Service", &[]),
        template("doc", "PDF", &[]),
    ];
    let graph = DependencyGraph::from_templates(&templates);
    assert_eq!(graph.roots(), vec!["app", "doc"]);

    let tree = graph.to_tree_string("app");
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("app APP (Web Mapping Application)"));
    assert!(lines[2].contains("svc SVC (Feature Service)"));
}

//! Dependency graph and deploy ordering for a set of templates.
//!
//! This module provides the graph data structure and algorithms that turn the
//! `dependencies` lists of a template set into a linear creation sequence,
//! including cycle detection and a human-readable tree for `plan` output.
//!
//! Edges point from a dependent to its dependency: `A → B` means `B` must be
//! created before `A`. Dependencies on ids outside the template set are
//! dangling external references and are ignored for ordering.

use anyhow::Result;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::{ItemTemplate, SolutionError};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Dependency graph over template item ids.
///
/// Node indices are assigned in insertion order, which is what makes
/// [`topological_order`](Self::topological_order) stable: among nodes that are
/// ready at the same time, the one inserted first is emitted first.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<String, ()>,
    /// Map from item ids to their graph indices.
    node_map: HashMap<String, NodeIndex>,
    /// Optional display labels (title and type) per item id.
    labels: HashMap<String, String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a template set, in the set's order.
    #[must_use]
    pub fn from_templates(templates: &[ItemTemplate]) -> Self {
        let mut graph = Self::from_dependencies(
            templates.iter().map(|t| (t.item_id.as_str(), t.dependencies.as_slice())),
        );
        for template in templates {
            graph
                .labels
                .insert(template.item_id.clone(), format!("{} ({})", template.title(), template.item_type));
        }
        graph
    }

    /// Build the graph from `(id, dependencies)` pairs.
    ///
    /// Every id is added as a node first so that node order follows input
    /// order; dependencies on ids absent from the input are dropped.
    pub fn from_dependencies<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let entries: Vec<(&str, &[String])> = entries.into_iter().collect();
        let mut graph = Self::new();
        for (id, _) in &entries {
            graph.ensure_node(id);
        }
        for (id, dependencies) in &entries {
            for dependency in dependencies.iter() {
                if graph.node_map.contains_key(dependency.as_str()) {
                    graph.add_dependency(id, dependency);
                } else {
                    tracing::debug!("Ignoring external reference {} → {}", id, dependency);
                }
            }
        }
        graph
    }

    /// Add a node to the graph if it doesn't already exist.
    ///
    /// Returns the node index in the graph.
    fn ensure_node(&mut self, item_id: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(item_id) {
            index
        } else {
            let index = self.graph.add_node(item_id.to_string());
            self.node_map.insert(item_id.to_string(), index);
            index
        }
    }

    /// Add a dependency relationship to the graph.
    ///
    /// `from` depends on `to`, meaning `to` must be created before `from`.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Detect cycles in the dependency graph using DFS with colors.
    ///
    /// # Errors
    ///
    /// Returns [`SolutionError::CyclicDependency`] with the cycle path, first
    /// id repeated at the end. A node depending on itself is a cycle of one.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Err(SolutionError::CyclicDependency {
                    cycle: cycle.into_iter().map(|idx| self.graph[idx].clone()).collect(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// DFS visit for cycle detection.
    ///
    /// Returns `Some(cycle_path)` if a cycle is detected, None otherwise.
    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.sorted_neighbors(node, Direction::Outgoing) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let cycle_start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[cycle_start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Neighbors in insertion order (petgraph yields most recent edge first).
    fn sorted_neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Get the creation order: every dependency precedes its dependents.
    ///
    /// Kahn's algorithm over remaining-dependency counts. Ties are broken by
    /// insertion order, so the result is deterministic for a given input.
    ///
    /// # Errors
    ///
    /// Returns [`SolutionError::CyclicDependency`] if any node can never
    /// become ready; no partial order is returned.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|node| (node, self.sorted_neighbors(node, Direction::Outgoing).len()))
            .collect();
        let mut ready: BTreeSet<NodeIndex> =
            remaining.iter().filter(|&(_, &count)| count == 0).map(|(&node, _)| node).collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(node) = ready.pop_first() {
            order.push(self.graph[node].clone());
            for dependent in self.sorted_neighbors(node, Direction::Incoming) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < self.graph.node_count() {
            // The DFS names the cycle; the fallback covers nothing it misses.
            self.detect_cycles()?;
            let stuck: Vec<String> = remaining
                .iter()
                .filter(|&(_, &count)| count > 0)
                .map(|(&node, _)| self.graph[node].clone())
                .collect();
            return Err(SolutionError::CyclicDependency {
                cycle: stuck,
            }
            .into());
        }

        Ok(order)
    }

    /// Get direct dependencies for a given item, in insertion order.
    #[must_use]
    pub fn get_direct_deps(&self, item_id: &str) -> Vec<String> {
        self.node_map.get(item_id).map_or_else(Vec::new, |&idx| {
            self.sorted_neighbors(idx, Direction::Outgoing)
                .into_iter()
                .map(|n| self.graph[n].clone())
                .collect()
        })
    }

    /// Items nothing else in the graph depends on.
    #[must_use]
    pub fn roots(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .filter(|&node| self.graph.neighbors_directed(node, Direction::Incoming).next().is_none())
            .map(|node| self.graph[node].clone())
            .collect()
    }

    /// Check if the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Get the total number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the total number of edges (dependencies) in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn display_name(&self, item_id: &str) -> String {
        match self.labels.get(item_id) {
            Some(label) => format!("{item_id} {label}"),
            None => item_id.to_string(),
        }
    }

    /// Build a human-readable dependency tree rooted at `root`.
    #[must_use]
    pub fn to_tree_string(&self, root: &str) -> String {
        let mut result = String::new();
        let mut visited = HashSet::new();
        self.build_tree_string(root, &mut result, "", true, &mut visited);
        result
    }

    fn build_tree_string(
        &self,
        item_id: &str,
        result: &mut String,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<String>,
    ) {
        let connector = if is_last {
            "└── "
        } else {
            "├── "
        };
        result.push_str(&format!("{}{}{}\n", prefix, connector, self.display_name(item_id)));

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };

        if !visited.insert(item_id.to_string()) {
            result.push_str(&format!("{child_prefix}└── (circular reference)\n"));
            return;
        }

        let deps = self.get_direct_deps(item_id);
        for (i, dep) in deps.iter().enumerate() {
            let is_last_child = i == deps.len() - 1;
            self.build_tree_string(dep, result, &child_prefix, is_last_child, visited);
        }
        // Only ancestors count; a shared dependency is not a cycle.
        visited.remove(item_id);
    }
}

/// Order a template set for deployment.
///
/// Returns item ids such that for every template `T` and every `d` in
/// `T.dependencies` that is part of the set, `d` precedes `T`.
///
/// # Errors
///
/// Returns [`SolutionError::CyclicDependency`] if the graph has a cycle,
/// including a template that lists itself.
pub fn order(templates: &[ItemTemplate]) -> Result<Vec<String>> {
    DependencyGraph::from_templates(templates).topological_order()
}

/// Reorder `templates` into deploy order.
///
/// # Errors
///
/// Same as [`order`], and [`SolutionError::InvalidTemplate`] if two templates
/// share an item id.
pub fn sort_templates(templates: Vec<ItemTemplate>) -> Result<Vec<ItemTemplate>> {
    let duplicate = {
        let mut seen = HashSet::with_capacity(templates.len());
        templates.iter().find(|t| !seen.insert(t.item_id.as_str())).map(|t| t.item_id.clone())
    };
    if let Some(item_id) = duplicate {
        return Err(SolutionError::InvalidTemplate {
            item_id,
            reason: "more than one template has this item id".to_string(),
        }
        .into());
    }
    let sequence = order(&templates)?;
    let mut by_id: HashMap<String, ItemTemplate> =
        templates.into_iter().map(|t| (t.item_id.clone(), t)).collect();
    Ok(sequence.into_iter().filter_map(|id| by_id.remove(&id)).collect())
}

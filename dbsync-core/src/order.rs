//! Foreign-key dependency ordering.
//!
//! Tables are loaded parents-first and truncated children-first. The graph is
//! restricted to the tables it was built from; references to tables outside
//! that set are ignored. Cycles never abort ordering: the edge with the
//! lexicographically largest `(table, constraint)` pair inside the remaining
//! cycle is set aside as a [`DeferredEdge`] and ordering continues.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::Schema;

/// One FK edge: `table` depends on `referenced_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEdge {
    /// Referencing (child) table.
    pub table: String,
    /// Constraint name.
    pub foreign_key: String,
    /// Referenced (parent) table.
    pub referenced_table: String,
}

impl std::fmt::Display for DeferredEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}",
            self.table, self.foreign_key, self.referenced_table
        )
    }
}

/// Result of ordering a dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOrder {
    /// Tables in forward (parents first) order.
    pub tables: Vec<String>,
    /// Edges that had to be ignored to produce `tables`.
    pub deferred: Vec<DeferredEdge>,
    /// Topological depth of each entry in `tables`.
    #[serde(skip)]
    levels: Vec<usize>,
}

impl LoadOrder {
    /// Tables in reverse order (children first).
    pub fn truncate_order(&self) -> Vec<String> {
        self.tables.iter().rev().cloned().collect()
    }

    /// Whether ordering needed to break a cycle or self-reference.
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Deferred edges that are part of a real cycle between distinct tables.
    pub fn cycles(&self) -> impl Iterator<Item = &DeferredEdge> {
        self.deferred.iter().filter(|e| e.table != e.referenced_table)
    }

    /// Group tables into waves: every table's parents sit in an earlier wave,
    /// so tables inside one wave are independent of each other.
    pub fn waves(&self) -> Vec<Vec<String>> {
        if self.levels.len() != self.tables.len() {
            return self.tables.iter().map(|t| vec![t.clone()]).collect();
        }
        let mut waves: Vec<Vec<String>> = Vec::new();
        for (table, level) in self.tables.iter().zip(&self.levels) {
            if waves.len() <= *level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[*level].push(table.clone());
        }
        waves
    }
}

#[derive(Debug, Clone)]
struct Edge {
    table: String,
    name: String,
    referenced_table: String,
}

/// Directed FK graph over a set of tables.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    tables: BTreeSet<String>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for every table of a schema.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut graph = Self::new();
        for table in &schema.tables {
            graph.add_table(&table.name);
            for fk in &table.foreign_keys {
                graph.add_dependency(&table.name, &fk.name, &fk.referenced_table);
            }
        }
        graph
    }

    /// Build the graph for a subset of a schema's tables.
    pub fn for_tables(schema: &Schema, tables: &[String]) -> Self {
        let mut graph = Self::new();
        for name in tables {
            graph.add_table(name);
            if let Some(table) = schema.table(name) {
                for fk in &table.foreign_keys {
                    graph.add_dependency(&table.name, &fk.name, &fk.referenced_table);
                }
            }
        }
        graph
    }

    /// Add a node.
    pub fn add_table(&mut self, table: &str) {
        self.tables.insert(table.to_string());
    }

    /// Record that `table` references `referenced_table` through `fk_name`.
    pub fn add_dependency(&mut self, table: &str, fk_name: &str, referenced_table: &str) {
        self.edges.push(Edge {
            table: table.to_string(),
            name: fk_name.to_string(),
            referenced_table: referenced_table.to_string(),
        });
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the graph has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Order tables parents-first, breaking cycles deterministically.
    ///
    /// Among ready tables the lexicographically smallest goes first, so the
    /// order is stable for a given graph.
    pub fn load_order(&self) -> LoadOrder {
        let mut deferred = Vec::new();
        let mut active: Vec<&Edge> = Vec::new();
        for edge in &self.edges {
            if !self.tables.contains(&edge.table) || !self.tables.contains(&edge.referenced_table) {
                continue;
            }
            if edge.table == edge.referenced_table {
                deferred.push(deferred_edge(edge));
            } else {
                active.push(edge);
            }
        }

        let mut remaining: BTreeSet<&str> = self.tables.iter().map(String::as_str).collect();
        let mut tables = Vec::with_capacity(self.tables.len());
        let mut levels = Vec::with_capacity(self.tables.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().copied().find(|t| {
                !active
                    .iter()
                    .any(|e| e.table == *t && remaining.contains(e.referenced_table.as_str()))
            });

            match ready {
                Some(table) => {
                    let level = active
                        .iter()
                        .filter(|e| e.table == table)
                        .filter_map(|e| {
                            tables
                                .iter()
                                .position(|t: &String| *t == e.referenced_table)
                                .map(|i| levels[i] + 1)
                        })
                        .max()
                        .unwrap_or(0);
                    remaining.remove(table);
                    tables.push(table.to_string());
                    levels.push(level);
                }
                None => {
                    // Every remaining table waits on another remaining table.
                    let breaking = active
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| {
                            remaining.contains(e.table.as_str())
                                && remaining.contains(e.referenced_table.as_str())
                        })
                        .max_by(|(_, a), (_, b)| (&a.table, &a.name).cmp(&(&b.table, &b.name)))
                        .map(|(i, _)| i);
                    match breaking {
                        Some(i) => {
                            let edge = active.remove(i);
                            deferred.push(deferred_edge(edge));
                        }
                        None => break,
                    }
                }
            }
        }

        LoadOrder {
            tables,
            deferred,
            levels,
        }
    }

    /// Order tables, failing on any cycle between distinct tables.
    ///
    /// The error message carries the best-effort order.
    pub fn strict_order(&self) -> SyncResult<Vec<String>> {
        let order = self.load_order();
        let cycles: Vec<String> = order.cycles().map(ToString::to_string).collect();
        if cycles.is_empty() {
            Ok(order.tables)
        } else {
            Err(SyncError::dependency_cycle(format!(
                "broke {} edge(s) [{}]; best-effort order: {}",
                cycles.len(),
                cycles.join(", "),
                order.tables.join(", ")
            )))
        }
    }
}

fn deferred_edge(edge: &Edge) -> DeferredEdge {
    DeferredEdge {
        table: edge.table.clone(),
        foreign_key: edge.name.clone(),
        referenced_table: edge.referenced_table.clone(),
    }
}

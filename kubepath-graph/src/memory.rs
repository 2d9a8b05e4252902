// Copyright 2025 KubePath (https://github.com/kubepath)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process property graph.
//!
//! Interprets the same compiled traversals as the remote service:
//! endpoints resolve through the `storeID`/`class` mirror properties,
//! batch order is preserved, and a row whose join matches nothing is
//! dropped and counted, never failed. Backs local runs and every
//! fixture-driven test.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use kubepath_core::{KubepathError, Result};

use crate::driver::{GraphConnection, GraphConnector};
use crate::traversal::{MutationKind, TraversalInput, TraversalRequest, VertexJoin};
use crate::types::{
    AppliedMutation, Expansion, GraphEdge, GraphRequest, GraphResponse, Vertex, VertexId,
    VertexQuery, CLASS_PROPERTY, STORE_ID_PROPERTY,
};

pub struct MemoryGraph {
    vertices: DashMap<VertexId, Vertex>,
    adjacency: DashMap<VertexId, Vec<GraphEdge>>,
    by_store_id: DashMap<String, VertexId>,
    by_class: DashMap<String, Vec<VertexId>>,
    vertex_seq: AtomicI64,
    edge_seq: AtomicI64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            vertices: DashMap::new(),
            adjacency: DashMap::new(),
            by_store_id: DashMap::new(),
            by_class: DashMap::new(),
            vertex_seq: AtomicI64::new(0),
            edge_seq: AtomicI64::new(0),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|entry| entry.len()).sum()
    }

    pub fn find_by_store_id(&self, store_id: &str) -> Option<Vertex> {
        let id = *self.by_store_id.get(store_id)?;
        self.vertices.get(&id).map(|v| v.clone())
    }

    /// Insert a vertex directly; fixture helper and the ensure-vertex path.
    pub fn add_vertex(&self, label: &str, mut properties: Map<String, Value>) -> VertexId {
        let id = VertexId(self.vertex_seq.fetch_add(1, Ordering::SeqCst) + 1);
        properties
            .entry(CLASS_PROPERTY.to_string())
            .or_insert_with(|| Value::String(label.to_string()));
        if let Some(store_id) = properties.get(STORE_ID_PROPERTY).and_then(Value::as_str) {
            self.by_store_id.insert(store_id.to_string(), id);
        }
        let class = properties
            .get(CLASS_PROPERTY)
            .and_then(Value::as_str)
            .unwrap_or(label)
            .to_string();
        self.by_class.entry(class).or_default().push(id);
        self.vertices.insert(
            id,
            Vertex {
                id,
                label: label.to_string(),
                properties,
            },
        );
        self.adjacency.entry(id).or_default();
        id
    }

    /// Insert an edge directly; fixture helper.
    pub fn add_edge(
        &self,
        label: &str,
        out_v: VertexId,
        in_v: VertexId,
        properties: Map<String, Value>,
    ) -> String {
        let id = self.edge_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let edge = GraphEdge {
            id: id.to_string(),
            label: label.to_string(),
            out_v,
            in_v,
            properties,
        };
        self.adjacency.entry(out_v).or_default().push(edge);
        id.to_string()
    }

    fn resolve_join(&self, join: &VertexJoin, row: &TraversalInput) -> Result<Vec<VertexId>> {
        match join {
            VertexJoin::StoreId { field } => {
                let Some(store_id) = row.get(field).and_then(Value::as_str) else {
                    return Err(KubepathError::Decode(format!(
                        "traversal row missing join field {field:?}"
                    )));
                };
                Ok(self
                    .by_store_id
                    .get(store_id)
                    .map(|id| vec![*id])
                    .unwrap_or_default())
            }
            VertexJoin::Class {
                class,
                namespace_field,
            } => {
                let namespace = namespace_field
                    .as_ref()
                    .and_then(|field| row.get(field))
                    .and_then(Value::as_str);
                let Some(ids) = self.by_class.get(class) else {
                    return Ok(Vec::new());
                };
                let matched = ids
                    .iter()
                    .filter(|id| match namespace {
                        None => true,
                        Some(ns) => self
                            .vertices
                            .get(id)
                            .map(|v| v.property_str("namespace") == Some(ns))
                            .unwrap_or(false),
                    })
                    .copied()
                    .collect();
                Ok(matched)
            }
        }
    }

    fn edge_properties(row: &TraversalInput, kind: &MutationKind) -> Map<String, Value> {
        let mut excluded: Vec<&str> = Vec::new();
        let mut prefix: Option<&str> = None;
        match kind {
            MutationKind::Vertex => {}
            MutationKind::Edge { out, r#in } => {
                for join in [out, r#in] {
                    match join {
                        VertexJoin::StoreId { field } => excluded.push(field),
                        VertexJoin::Class {
                            namespace_field, ..
                        } => {
                            if let Some(field) = namespace_field {
                                excluded.push(field);
                            }
                        }
                    }
                }
            }
            MutationKind::EdgeWithVertex {
                out, vertex_prefix, ..
            } => {
                if let VertexJoin::StoreId { field } = out {
                    excluded.push(field);
                }
                prefix = Some(vertex_prefix.as_str());
            }
        }
        row.iter()
            .filter(|(key, _)| {
                !excluded.contains(&key.as_str())
                    && !prefix.map_or(false, |p| key.starts_with(p))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Execute one compiled bulk mutation.
    pub fn apply(&self, request: &TraversalRequest) -> Result<AppliedMutation> {
        if !request.is_terminated() {
            return Err(KubepathError::Graph(format!(
                "refusing unterminated mutation for {}",
                request.label
            )));
        }

        let mut applied = AppliedMutation::default();
        for row in &request.rows {
            match &request.kind {
                MutationKind::Vertex => {
                    if row.get(STORE_ID_PROPERTY).and_then(Value::as_str).is_none() {
                        return Err(KubepathError::Decode(format!(
                            "vertex row for {} missing storeID mirror",
                            request.label
                        )));
                    }
                    self.add_vertex(&request.label, row.clone());
                    applied.created_vertices += 1;
                }
                MutationKind::Edge { out, r#in } => {
                    let outs = self.resolve_join(out, row)?;
                    let ins = self.resolve_join(r#in, row)?;
                    if outs.is_empty() || ins.is_empty() {
                        applied.skipped += 1;
                        continue;
                    }
                    let properties = Self::edge_properties(row, &request.kind);
                    for out_v in &outs {
                        for in_v in &ins {
                            self.add_edge(&request.label, *out_v, *in_v, properties.clone());
                            applied.created_edges += 1;
                        }
                    }
                }
                MutationKind::EdgeWithVertex {
                    out,
                    vertex_label,
                    vertex_prefix,
                } => {
                    let outs = self.resolve_join(out, row)?;
                    if outs.is_empty() {
                        applied.skipped += 1;
                        continue;
                    }

                    let vertex_props: Map<String, Value> = row
                        .iter()
                        .filter(|(key, _)| key.starts_with(vertex_prefix))
                        .map(|(key, value)| {
                            (key[vertex_prefix.len()..].to_string(), value.clone())
                        })
                        .collect();
                    let Some(store_id) =
                        vertex_props.get(STORE_ID_PROPERTY).and_then(Value::as_str)
                    else {
                        return Err(KubepathError::Decode(format!(
                            "derived vertex row for {} missing storeID mirror",
                            request.label
                        )));
                    };

                    let in_v = match self.by_store_id.get(store_id).map(|id| *id) {
                        Some(id) => id,
                        None => {
                            applied.created_vertices += 1;
                            self.add_vertex(vertex_label, vertex_props.clone())
                        }
                    };

                    let properties = Self::edge_properties(row, &request.kind);
                    for out_v in &outs {
                        self.add_edge(&request.label, *out_v, in_v, properties.clone());
                        applied.created_edges += 1;
                    }
                }
            }
        }
        Ok(applied)
    }

    /// Vertices matching a class/property query. Filtering happens on the
    /// `class` mirror property, matching the write contract.
    pub fn vertices_matching(&self, query: &VertexQuery) -> Vec<Vertex> {
        let mut matched: Vec<Vertex> = self
            .vertices
            .iter()
            .filter(|entry| {
                let vertex = entry.value();
                if vertex.property_str(CLASS_PROPERTY) != Some(query.class.as_str()) {
                    return false;
                }
                let eq_ok = query
                    .eq
                    .iter()
                    .all(|(name, value)| vertex.properties.get(name) == Some(value));
                let not_in_ok = query.not_in.iter().all(|(name, values)| {
                    vertex
                        .properties
                        .get(name)
                        .map(|v| !values.contains(v))
                        .unwrap_or(true)
                });
                eq_ok && not_in_ok
            })
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|v| v.id);
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// One outbound hop with landing vertices, in edge insertion order.
    pub fn expand(&self, vertex: VertexId) -> Result<Vec<Expansion>> {
        let Some(edges) = self.adjacency.get(&vertex) else {
            return Ok(Vec::new());
        };
        edges
            .iter()
            .map(|edge| {
                let landing = self.vertices.get(&edge.in_v).map(|v| v.clone()).ok_or_else(
                    || {
                        KubepathError::Decode(format!(
                            "edge {} points at missing vertex {}",
                            edge.id, edge.in_v
                        ))
                    },
                )?;
                Ok(Expansion {
                    edge: edge.clone(),
                    vertex: landing,
                })
            })
            .collect()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection handle over a shared in-process graph.
pub struct MemoryConnection {
    graph: Arc<MemoryGraph>,
}

#[async_trait]
impl GraphConnection for MemoryConnection {
    async fn execute(&self, request: &GraphRequest) -> Result<GraphResponse> {
        match request {
            GraphRequest::Mutate(traversal) => {
                self.graph.apply(traversal).map(GraphResponse::Applied)
            }
            GraphRequest::Vertices(query) => {
                Ok(GraphResponse::Vertices(self.graph.vertices_matching(query)))
            }
            GraphRequest::Expand { vertex } => {
                self.graph.expand(*vertex).map(GraphResponse::Expansion)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector yielding handles onto one shared graph.
pub struct MemoryConnector {
    graph: Arc<MemoryGraph>,
}

impl MemoryConnector {
    pub fn new(graph: Arc<MemoryGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<MemoryGraph> {
        &self.graph
    }
}

#[async_trait]
impl GraphConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        Ok(MemoryConnection {
            graph: Arc::clone(&self.graph),
        })
    }
}

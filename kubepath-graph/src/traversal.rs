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

//! Bulk mutation traversals.
//!
//! A builder's batch compiles into exactly one composed mutation: inject
//! the converted rows as a literal sequence, unfold, locate the join
//! endpoints by the mirrored `storeID` property (never by native graph id —
//! graph ids are not known at this layer), create the element, and
//! terminate with an explicit no-op barrier + limit so the command executes
//! even though no results are consumed. Row order is preserved into the
//! compiled request; there is no ordering guarantee across builders or
//! batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{CLASS_PROPERTY, STORE_ID_PROPERTY};

/// One converted record: a flat map of primitive values.
pub type TraversalInput = Map<String, Value>;

/// How an edge endpoint is located among existing vertices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "join", rename_all = "snake_case")]
pub enum VertexJoin {
    /// Match the single vertex whose `storeID` mirror equals the named
    /// row field.
    StoreId { field: String },
    /// Match every vertex of a class, optionally restricted to the
    /// namespace carried by the named row field. Used by fanout edges
    /// (one permission set reaches every pod in scope).
    Class {
        class: String,
        namespace_field: Option<String>,
    },
}

/// The three mutation shapes the generator emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationKind {
    /// Create one vertex per row.
    Vertex,
    /// Create edges between existing vertices.
    Edge { out: VertexJoin, r#in: VertexJoin },
    /// Create an edge whose in-vertex may not exist yet: ensure a vertex
    /// of `vertex_label` (fields carried on the row under `vertex_prefix`)
    /// and connect to it. Builders of this shape run in the mutating pass.
    EdgeWithVertex {
        out: VertexJoin,
        vertex_label: String,
        vertex_prefix: String,
    },
}

/// Steps of the compiled command, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "spec", rename_all = "snake_case")]
pub enum TraversalStep {
    Inject,
    Unfold,
    MatchOut(VertexJoin),
    MatchIn(VertexJoin),
    AddVertex,
    AddEdge,
    EnsureVertex { label: String, prefix: String },
    Barrier,
    Limit(usize),
}

/// The compiled, side-effecting command sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalRequest {
    pub label: String,
    pub kind: MutationKind,
    pub rows: Vec<TraversalInput>,
    pub steps: Vec<TraversalStep>,
}

impl TraversalRequest {
    /// Whether the command carries the mandatory no-op termination.
    pub fn is_terminated(&self) -> bool {
        matches!(
            self.steps.as_slice(),
            [.., TraversalStep::Barrier, TraversalStep::Limit(0)]
        )
    }
}

/// An accumulated batch for one builder, compiled into one request.
#[derive(Debug, Clone)]
pub struct BulkMutation {
    pub label: String,
    pub kind: MutationKind,
    pub rows: Vec<TraversalInput>,
}

impl BulkMutation {
    pub fn vertex(label: impl Into<String>, rows: Vec<TraversalInput>) -> Self {
        Self {
            label: label.into(),
            kind: MutationKind::Vertex,
            rows,
        }
    }

    pub fn edge(
        label: impl Into<String>,
        out: VertexJoin,
        r#in: VertexJoin,
        rows: Vec<TraversalInput>,
    ) -> Self {
        Self {
            label: label.into(),
            kind: MutationKind::Edge { out, r#in },
            rows,
        }
    }

    pub fn edge_with_vertex(
        label: impl Into<String>,
        out: VertexJoin,
        vertex_label: impl Into<String>,
        vertex_prefix: impl Into<String>,
        rows: Vec<TraversalInput>,
    ) -> Self {
        Self {
            label: label.into(),
            kind: MutationKind::EdgeWithVertex {
                out,
                vertex_label: vertex_label.into(),
                vertex_prefix: vertex_prefix.into(),
            },
            rows,
        }
    }

    /// Compile into the canonical step sequence. Vertex rows get the
    /// `class` mirror stamped here so the write contract holds no matter
    /// which builder produced them.
    pub fn into_request(self) -> TraversalRequest {
        let BulkMutation { label, kind, mut rows } = self;

        if matches!(kind, MutationKind::Vertex) {
            for row in &mut rows {
                row.insert(CLASS_PROPERTY.to_string(), Value::String(label.clone()));
            }
        }

        let mut steps = vec![TraversalStep::Inject, TraversalStep::Unfold];
        match &kind {
            MutationKind::Vertex => steps.push(TraversalStep::AddVertex),
            MutationKind::Edge { out, r#in } => {
                steps.push(TraversalStep::MatchOut(out.clone()));
                steps.push(TraversalStep::MatchIn(r#in.clone()));
                steps.push(TraversalStep::AddEdge);
            }
            MutationKind::EdgeWithVertex {
                out,
                vertex_label,
                vertex_prefix,
            } => {
                steps.push(TraversalStep::MatchOut(out.clone()));
                steps.push(TraversalStep::EnsureVertex {
                    label: vertex_label.clone(),
                    prefix: vertex_prefix.clone(),
                });
                steps.push(TraversalStep::AddEdge);
            }
        }
        steps.push(TraversalStep::Barrier);
        steps.push(TraversalStep::Limit(0));

        TraversalRequest {
            label,
            kind,
            rows,
            steps,
        }
    }
}

/// Convenience constructor for row maps.
pub fn input(pairs: Vec<(&str, Value)>) -> TraversalInput {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Row field helper: the storeID join field every vertex row carries.
pub fn store_id_field() -> String {
    STORE_ID_PROPERTY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vertex_request_stamps_class_mirror() {
        let rows = vec![input(vec![("storeID", json!("abc")), ("name", json!("n1"))])];
        let request = BulkMutation::vertex("Node", rows).into_request();
        assert_eq!(request.rows[0].get("class"), Some(&json!("Node")));
        assert!(request.is_terminated());
        assert_eq!(request.steps[0], TraversalStep::Inject);
        assert_eq!(request.steps[2], TraversalStep::AddVertex);
    }

    #[test]
    fn test_edge_request_shape() {
        let out = VertexJoin::StoreId {
            field: "container".into(),
        };
        let r#in = VertexJoin::StoreId { field: "pod".into() };
        let request = BulkMutation::edge("CONTAINER_ATTACH", out.clone(), r#in.clone(), vec![])
            .into_request();
        assert!(request.is_terminated());
        assert_eq!(request.steps[2], TraversalStep::MatchOut(out));
        assert_eq!(request.steps[3], TraversalStep::MatchIn(r#in));
        assert_eq!(request.steps[4], TraversalStep::AddEdge);
        // Edges never get a class mirror; only vertices carry it.
        assert!(request.rows.is_empty());
    }

    #[test]
    fn test_row_order_preserved() {
        let rows: Vec<TraversalInput> = (0..5)
            .map(|i| input(vec![("storeID", json!(format!("id-{i}")))]))
            .collect();
        let request = BulkMutation::vertex("Pod", rows).into_request();
        let ids: Vec<_> = request
            .rows
            .iter()
            .map(|r| r.get("storeID").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["id-0", "id-1", "id-2", "id-3", "id-4"]);
    }

    #[test]
    fn test_request_wire_round_trip() {
        let rows = vec![input(vec![("storeID", json!("abc"))])];
        let request = BulkMutation::vertex("Node", rows).into_request();
        let wire = serde_json::to_string(&request).unwrap();
        let back: TraversalRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.steps, request.steps);
        assert_eq!(back.rows, request.rows);
        assert!(back.is_terminated());
    }

    #[test]
    fn test_unterminated_request_detected() {
        let mut request = BulkMutation::vertex("Pod", vec![]).into_request();
        request.steps.pop();
        assert!(!request.is_terminated());
    }
}

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

//! Graph element types and the request/response wire shapes.
//!
//! Every vertex write mirrors the store identifier (`storeID`) and its
//! label (`class`) as ordinary properties: the backend does not index
//! labels independently, so every lookup filters on the mirrors instead.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use kubepath_core::{KubepathError, Result};

use crate::traversal::TraversalRequest;

/// Mirrored store identifier property.
pub const STORE_ID_PROPERTY: &str = "storeID";
/// Mirrored label property.
pub const CLASS_PROPERTY: &str = "class";
/// Ingestion run identifier property.
pub const RUN_ID_PROPERTY: &str = "runID";
/// Cluster name property.
pub const CLUSTER_PROPERTY: &str = "cluster";

/// Vertex classes written by the builders.
pub mod vertex_class {
    pub const NODE: &str = "Node";
    pub const POD: &str = "Pod";
    pub const CONTAINER: &str = "Container";
    pub const VOLUME: &str = "Volume";
    pub const IDENTITY: &str = "Identity";
    pub const PERMISSION_SET: &str = "PermissionSet";
}

/// Backend-assigned vertex identifier, opaque to the ETL layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VertexId(pub i64);

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Vertex {
    /// String property accessor.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    pub fn store_id(&self) -> Option<&str> {
        self.property_str(STORE_ID_PROPERTY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Backend edge identifier. Remote backends return the composite
    /// relation-identifier type here; it is decoded and flattened to the
    /// relation id's text form.
    #[serde(deserialize_with = "edge_id_from_value")]
    pub id: String,
    pub label: String,
    pub out_v: VertexId,
    pub in_v: VertexId,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Accept either a plain string id or a decoded relation-identifier map
/// (in which case the `relationId` field becomes the edge id).
fn edge_id_from_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Object(map) => map
            .get("relationId")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .ok_or_else(|| D::Error::custom("edge id object without relationId")),
        other => Err(D::Error::custom(format!("unexpected edge id shape: {other}"))),
    }
}

/// One outbound hop: the traversed edge plus its landing vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expansion {
    pub edge: GraphEdge,
    pub vertex: Vertex,
}

/// Start-set lookup: class mirror plus property equalities/exclusions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VertexQuery {
    pub class: String,
    #[serde(default)]
    pub eq: Vec<(String, Value)>,
    #[serde(default)]
    pub not_in: Vec<(String, Vec<Value>)>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl VertexQuery {
    pub fn for_class(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((property.into(), value.into()));
        self
    }

    pub fn not_in(mut self, property: impl Into<String>, values: Vec<Value>) -> Self {
        self.not_in.push((property.into(), values));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Outcome of one bulk mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMutation {
    pub created_vertices: usize,
    pub created_edges: usize,
    /// Rows whose join matched no vertex; dropped, not failed.
    pub skipped: usize,
}

/// One round-trip to the graph service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphRequest {
    Mutate(TraversalRequest),
    Vertices(VertexQuery),
    Expand { vertex: VertexId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum GraphResponse {
    Applied(AppliedMutation),
    Vertices(Vec<Vertex>),
    Expansion(Vec<Expansion>),
}

impl GraphResponse {
    /// Shape accessors: a mismatch means the backend answered a different
    /// question than asked, which is fatal schema drift.
    pub fn into_applied(self) -> Result<AppliedMutation> {
        match self {
            GraphResponse::Applied(applied) => Ok(applied),
            other => Err(shape_error("applied mutation", &other)),
        }
    }

    pub fn into_vertices(self) -> Result<Vec<Vertex>> {
        match self {
            GraphResponse::Vertices(vertices) => Ok(vertices),
            other => Err(shape_error("vertex list", &other)),
        }
    }

    pub fn into_expansion(self) -> Result<Vec<Expansion>> {
        match self {
            GraphResponse::Expansion(expansion) => Ok(expansion),
            other => Err(shape_error("expansion list", &other)),
        }
    }
}

fn shape_error(expected: &str, got: &GraphResponse) -> KubepathError {
    let kind = match got {
        GraphResponse::Applied(_) => "applied mutation",
        GraphResponse::Vertices(_) => "vertex list",
        GraphResponse::Expansion(_) => "expansion list",
    };
    KubepathError::Decode(format!("expected {expected} response, got {kind}"))
}

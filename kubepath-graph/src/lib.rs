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

//! KubePath Graph
//!
//! Graph element types, the bulk traversal representation, the
//! connection/retry driver, the relation-identifier binary codec, and the
//! remote and in-memory backends.

pub mod driver;
pub mod memory;
pub mod relation_id;
pub mod remote;
pub mod traversal;
pub mod types;

pub use driver::{AuthMode, GraphConnection, GraphConnector, GraphDriver};
pub use memory::{MemoryConnection, MemoryConnector, MemoryGraph};
pub use relation_id::{
    decode as decode_relation_id, encode as encode_relation_id, CustomTypeRegistry,
    RelationIdentifier, VertexRef, RELATION_IDENTIFIER_TYPE,
};
pub use remote::{RemoteConnection, RemoteConnector};
pub use traversal::{
    input, BulkMutation, MutationKind, TraversalInput, TraversalRequest, TraversalStep,
    VertexJoin,
};
pub use types::{
    vertex_class, AppliedMutation, Expansion, GraphEdge, GraphRequest, GraphResponse, Vertex,
    VertexId, VertexQuery, CLASS_PROPERTY, CLUSTER_PROPERTY, RUN_ID_PROPERTY, STORE_ID_PROPERTY,
};

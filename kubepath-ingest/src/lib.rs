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

//! KubePath Ingest
//!
//! The builder pipeline: streams relational records out of the staging
//! store, converts them through the ID resolution cache, and emits batched
//! bulk-mutation traversals into the graph.

pub mod builder;
pub mod edges;
pub mod pipeline;
pub mod registry;
pub mod vertices;

pub use builder::{
    forward_stream, send_record, Builder, BuilderKind, Cache, RunContext, EDGE_BATCH,
    FANOUT_EDGE_BATCH, JOIN_EDGE_BATCH, VERTEX_BATCH,
};
pub use pipeline::{BuilderReport, IngestPipeline, PipelineReport};
pub use registry::BuilderRegistry;
pub use vertices::{DEFAULT_NODE_IDENTITY_KEY, DEFAULT_NODE_IDENTITY_NAME};

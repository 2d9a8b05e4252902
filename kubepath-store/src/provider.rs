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

//! Staging-store read abstraction.
//!
//! The intermediate document store is written by the collectors; the ETL
//! core only queries, projects and aggregates. The pipeline-stage set below
//! is the entire aggregation surface the builders use — anything a backend
//! cannot express here is schema drift, not a feature gap.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;

use kubepath_core::Result;

/// One raw store record.
pub type Document = serde_json::Map<String, Value>;

/// Stream of raw records out of one query or aggregation.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// The eight collections the collectors populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Nodes,
    Pods,
    Containers,
    Volumes,
    Roles,
    RoleBindings,
    Identities,
    PermissionSets,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Nodes => "nodes",
            Collection::Pods => "pods",
            Collection::Containers => "containers",
            Collection::Volumes => "volumes",
            Collection::Roles => "roles",
            Collection::RoleBindings => "rolebindings",
            Collection::Identities => "identities",
            Collection::PermissionSets => "permissionsets",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter over (possibly dotted) field paths.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Ordered aggregation stages.
#[derive(Debug, Clone)]
pub enum PipelineStage {
    /// Keep documents matching the filter.
    Match(Filter),
    /// Keep only the named top-level fields.
    Project(Vec<String>),
    /// Equality join: for each document, collect the documents of `from`
    /// whose `foreign_field` equals this document's `local_field`, as an
    /// array under `as_field`.
    Lookup {
        from: Collection,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Replace each document with one copy per element of the named array
    /// field; documents whose array is empty or missing are dropped.
    Unwind(String),
}

/// Read access to the staging store.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Stream every document of `collection` matching `filter`.
    async fn find(&self, collection: Collection, filter: Filter) -> Result<DocumentStream>;

    /// Stream the result of running `pipeline` over `collection`.
    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: Vec<PipelineStage>,
    ) -> Result<DocumentStream>;
}

/// Look up a dotted field path inside a document.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

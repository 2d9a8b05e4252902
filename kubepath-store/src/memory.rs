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

//! In-memory staging store.
//!
//! Stand-in for the document database during tests and local runs.
//! Evaluates filters and pipeline stages in process; streams yield
//! documents in insertion order.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use kubepath_core::{KubepathError, Result};

use crate::provider::{
    lookup_path, Collection, Document, DocumentStream, Filter, PipelineStage, StoreProvider,
};

pub struct MemoryStore {
    collections: DashMap<Collection, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Insert one raw document.
    pub fn insert_raw(&self, collection: Collection, doc: Document) {
        self.collections.entry(collection).or_default().push(doc);
    }

    /// Insert a typed document (any of the entity shapes).
    pub fn insert<T: Serialize>(&self, collection: Collection, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        match value {
            Value::Object(map) => {
                self.insert_raw(collection, map);
                Ok(())
            }
            other => Err(KubepathError::Store(format!(
                "record for {collection} did not serialize to a document: {other}"
            ))),
        }
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, |v| v.len())
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn snapshot(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .get(&collection)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn apply_stage(&self, docs: Vec<Document>, stage: &PipelineStage) -> Result<Vec<Document>> {
        match stage {
            PipelineStage::Match(filter) => {
                Ok(docs.into_iter().filter(|d| matches(d, filter)).collect())
            }
            PipelineStage::Project(fields) => Ok(docs
                .into_iter()
                .map(|doc| {
                    doc.into_iter()
                        .filter(|(k, _)| fields.iter().any(|f| f == k))
                        .collect()
                })
                .collect()),
            PipelineStage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => {
                let foreign = self.snapshot(*from);
                Ok(docs
                    .into_iter()
                    .map(|mut doc| {
                        let local = lookup_path(&doc, local_field).cloned();
                        let joined: Vec<Value> = foreign
                            .iter()
                            .filter(|f| {
                                local.as_ref().is_some_and(|l| {
                                    lookup_path(f, foreign_field) == Some(l)
                                })
                            })
                            .cloned()
                            .map(Value::Object)
                            .collect();
                        doc.insert(as_field.clone(), Value::Array(joined));
                        doc
                    })
                    .collect())
            }
            PipelineStage::Unwind(field) => {
                let mut out = Vec::new();
                for doc in docs {
                    let Some(Value::Array(items)) = doc.get(field).cloned() else {
                        continue;
                    };
                    for item in items {
                        let mut copy = doc.clone();
                        copy.insert(field.clone(), item);
                        out.push(copy);
                    }
                }
                Ok(out)
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    filter
        .conditions
        .iter()
        .all(|(field, expected)| lookup_path(doc, field) == Some(expected))
}

#[async_trait]
impl StoreProvider for MemoryStore {
    async fn find(&self, collection: Collection, filter: Filter) -> Result<DocumentStream> {
        let docs: Vec<Result<Document>> = self
            .snapshot(collection)
            .into_iter()
            .filter(|d| matches(d, &filter))
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(docs)))
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: Vec<PipelineStage>,
    ) -> Result<DocumentStream> {
        let mut docs = self.snapshot(collection);
        for stage in &pipeline {
            docs = self.apply_stage(docs, stage)?;
        }
        debug!(collection = %collection, stages = pipeline.len(), rows = docs.len(), "aggregation evaluated");
        Ok(Box::pin(stream::iter(docs.into_iter().map(Ok))))
    }
}

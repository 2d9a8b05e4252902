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

//! Builder contract.
//!
//! A builder is a pure descriptor pairing a store query, a record
//! converter and a traversal generator for one vertex or edge type. It
//! holds no mutable state; the pipeline owns batching, channels and
//! flushing.
//!
//! Converters are pure apart from ID-cache access. A record whose
//! expected cache entry is legitimately absent (a pod with no identity,
//! an unscheduled pod) is skipped with `Ok(None)`, never propagated as an
//! error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use kubepath_core::{CacheReader, CacheWriter, KubepathError, Result};
use kubepath_graph::{TraversalInput, TraversalRequest};
use kubepath_store::{Document, DocumentStream, StoreProvider};

/// Batch size for vertex inserts.
pub const VERTEX_BATCH: usize = 500;
/// Batch size for 1:1 edges.
pub const EDGE_BATCH: usize = 250;
/// Batch size for aggregation-joined edges.
pub const JOIN_EDGE_BATCH: usize = 100;
/// Batch size for edges that fan out from one source record to many
/// vertices: a handful of such rows already produces a mutation payload
/// near the backend's per-request limit.
pub const FANOUT_EDGE_BATCH: usize = 5;

/// The closed set of builder kinds, dispatched through one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    /// Applied first: vertex inserts.
    Vertex,
    /// Applied during normal edge ingestion.
    SimpleEdge,
    /// Applied in a strictly later pass: edges whose creation implies
    /// creating a vertex.
    MutatingEdge,
}

/// Per-run context shared by every worker.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub cluster: String,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cluster: cluster.into(),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Combined cache access handed to converters.
pub trait Cache: CacheReader + CacheWriter {}

impl<T: CacheReader + CacheWriter> Cache for T {}

#[async_trait]
pub trait Builder: Send + Sync {
    /// Vertex class or edge label written into the graph.
    fn label(&self) -> &'static str;

    fn kind(&self) -> BuilderKind;

    fn batch_size(&self) -> usize;

    /// Issue one query/aggregation and send each raw record downstream.
    /// Completion is signalled by dropping the sender — exactly once, even
    /// for zero records.
    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()>;

    /// Convert one raw record into a traversal input. `Ok(None)` skips the
    /// record.
    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>>;

    /// Compile an accumulated batch into one bulk mutation.
    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest;
}

/// Send one record downstream, racing the shared cancellation token so a
/// stalled consumer cannot deadlock a cancelled run.
pub async fn send_record(
    ctx: &RunContext,
    tx: &mpsc::Sender<Document>,
    doc: Document,
) -> Result<()> {
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(KubepathError::Cancelled),
        sent = tx.send(doc) => {
            // A dropped receiver means the run is coming down.
            sent.map_err(|_| KubepathError::Cancelled)
        }
    }
}

/// Drain a store stream into the pipeline channel.
pub async fn forward_stream(
    ctx: &RunContext,
    mut docs: DocumentStream,
    tx: mpsc::Sender<Document>,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(KubepathError::Cancelled),
            next = docs.next() => next,
        };
        let Some(doc) = next else {
            return Ok(());
        };
        send_record(ctx, &tx, doc?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn doc(name: &str) -> Document {
        let mut map = Document::new();
        map.insert("name".into(), serde_json::json!(name));
        map
    }

    #[tokio::test]
    async fn test_forward_stream_sends_all_then_closes() {
        let ctx = RunContext::new("test");
        let docs: DocumentStream =
            Box::pin(stream::iter(vec![Ok(doc("a")), Ok(doc("b"))]));
        let (tx, mut rx) = mpsc::channel(4);

        forward_stream(&ctx, docs, tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap()["name"], "a");
        assert_eq!(rx.recv().await.unwrap()["name"], "b");
        // Sender dropped exactly once: channel reports closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_stream_propagates_record_error() {
        let ctx = RunContext::new("test");
        let docs: DocumentStream = Box::pin(stream::iter(vec![
            Ok(doc("a")),
            Err(KubepathError::Store("cursor died".into())),
        ]));
        let (tx, mut rx) = mpsc::channel(4);

        let err = forward_stream(&ctx, docs, tx).await.unwrap_err();
        assert!(matches!(err, KubepathError::Store(_)));
        // The record before the failure still went through.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_stream_observes_cancellation_under_backpressure() {
        let ctx = RunContext::new("test");
        let docs: DocumentStream =
            Box::pin(stream::iter((0..8).map(|i| Ok(doc(&format!("d{i}"))))));
        // Capacity 1 and no consumer: the second send blocks.
        let (tx, _rx) = mpsc::channel(1);

        let cancel = ctx.cancel.clone();
        let handle = tokio::spawn(async move { forward_stream(&ctx, docs, tx).await });
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, KubepathError::Cancelled));
    }
}

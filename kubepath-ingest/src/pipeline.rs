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

//! Ingestion pipeline.
//!
//! Three passes over the registry — vertices, simple edges, mutating
//! edges — each running its builders concurrently. Per builder, a
//! producer task streams store records into a bounded channel while the
//! consumer converts and flushes batches through the retrying graph
//! driver. The first error cancels the shared token; everything else
//! observes cancellation promptly and unwinds.
//!
//! ```text
//! store ──stream──► channel ──process──► batch ──mutate──► graph
//!   (producer task)              (consumer, one per builder)
//! ```

use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use kubepath_core::{
    CacheShard, CacheWriter, IdentityDoc, IngestConfig, KubepathError, MemCache, Result, WriteMode,
};
use kubepath_graph::{GraphConnector, GraphDriver, TraversalInput};
use kubepath_store::{decode_record, Collection, Filter, StoreProvider};

use crate::builder::{Builder, RunContext};
use crate::registry::BuilderRegistry;
use crate::vertices::{DEFAULT_NODE_IDENTITY_KEY, DEFAULT_NODE_IDENTITY_NAME};

/// Per-builder outcome counters.
#[derive(Debug, Clone, Default)]
pub struct BuilderReport {
    pub label: String,
    pub records: usize,
    pub skipped: usize,
    pub flushes: usize,
    pub created_vertices: usize,
    pub created_edges: usize,
}

/// Whole-run outcome.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: String,
    pub cluster: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub builders: Vec<BuilderReport>,
    pub duration: Duration,
}

impl PipelineReport {
    pub fn builder(&self, label: &str) -> Option<&BuilderReport> {
        self.builders.iter().find(|b| b.label == label)
    }

    pub fn total_vertices(&self) -> usize {
        self.builders.iter().map(|b| b.created_vertices).sum()
    }

    pub fn total_edges(&self) -> usize {
        self.builders.iter().map(|b| b.created_edges).sum()
    }
}

pub struct IngestPipeline<C: GraphConnector> {
    store: Arc<dyn StoreProvider>,
    driver: Arc<GraphDriver<C>>,
    cache: Arc<MemCache>,
    config: IngestConfig,
}

impl<C: GraphConnector + 'static> IngestPipeline<C> {
    pub fn new(
        store: Arc<dyn StoreProvider>,
        driver: Arc<GraphDriver<C>>,
        cache: Arc<MemCache>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            driver,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<MemCache> {
        &self.cache
    }

    /// Run every registered builder against the store, in pass order.
    pub async fn run(
        &self,
        registry: &BuilderRegistry,
        ctx: &RunContext,
    ) -> Result<PipelineReport> {
        if ctx.cancel.is_cancelled() {
            return Err(KubepathError::Cancelled);
        }

        let started = Instant::now();
        info!(
            run_id = %ctx.run_id,
            cluster = %ctx.cluster,
            builders = registry.len(),
            "starting ingestion"
        );

        self.resolve_default_node_identity(ctx).await?;

        let mut builders = Vec::new();
        for (pass, partition) in [
            ("vertices", registry.vertices()),
            ("simple-edges", registry.simple_edges()),
            ("mutating-edges", registry.mutating_edges()),
        ] {
            debug!(pass, count = partition.len(), "starting pass");
            let mut reports = self.run_pass(partition, ctx).await?;
            builders.append(&mut reports);
        }

        let report = PipelineReport {
            run_id: ctx.run_id.clone(),
            cluster: ctx.cluster.clone(),
            started_at: ctx.started_at,
            builders,
            duration: started.elapsed(),
        };
        info!(
            run_id = %ctx.run_id,
            vertices = report.total_vertices(),
            edges = report.total_edges(),
            duration_ms = report.duration.as_millis() as u64,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Explicit once-per-run init step: look the default node identity up
    /// in the store and queue it for the node builder. A store failure is
    /// an error; an absent identity is data.
    async fn resolve_default_node_identity(&self, ctx: &RunContext) -> Result<()> {
        let filter = Filter::new().eq("name", DEFAULT_NODE_IDENTITY_NAME);
        let mut docs = self.store.find(Collection::Identities, filter).await?;
        let Some(doc) = docs.next().await else {
            debug!(
                identity = DEFAULT_NODE_IDENTITY_NAME,
                "no default node identity in store"
            );
            return Ok(());
        };
        let identity: IdentityDoc = decode_record(doc?)?;
        self.cache.queue(
            CacheShard::Identity,
            DEFAULT_NODE_IDENTITY_KEY.to_string(),
            identity.id,
            WriteMode::TestAndSet,
        )?;
        info!(run_id = %ctx.run_id, identity = %identity.id, "resolved default node identity");
        Ok(())
    }

    /// Run one partition's builders concurrently. The first failure
    /// cancels the shared token and wins; remaining tasks are drained.
    async fn run_pass(
        &self,
        builders: &[Arc<dyn Builder>],
        ctx: &RunContext,
    ) -> Result<Vec<BuilderReport>> {
        let mut tasks: JoinSet<Result<BuilderReport>> = JoinSet::new();
        for builder in builders {
            let builder = Arc::clone(builder);
            let store = Arc::clone(&self.store);
            let driver = Arc::clone(&self.driver);
            let cache = Arc::clone(&self.cache);
            let ctx = ctx.clone();
            let capacity = self.config.channel_capacity;
            tasks.spawn(async move {
                run_builder(builder, store, driver, cache, ctx, capacity).await
            });
        }

        let mut reports = Vec::new();
        let mut first_error: Option<KubepathError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| KubepathError::Graph(format!("builder task panicked: {e}")))?;
            match result {
                Ok(report) => reports.push(report),
                Err(err) => {
                    if first_error.is_none() {
                        warn!(error = %err, "builder failed, cancelling run");
                        ctx.cancel.cancel();
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}

async fn run_builder<C: GraphConnector + 'static>(
    builder: Arc<dyn Builder>,
    store: Arc<dyn StoreProvider>,
    driver: Arc<GraphDriver<C>>,
    cache: Arc<MemCache>,
    ctx: RunContext,
    capacity: usize,
) -> Result<BuilderReport> {
    let mut report = BuilderReport {
        label: builder.label().to_string(),
        ..BuilderReport::default()
    };

    let (tx, mut rx) = mpsc::channel(capacity);
    let producer = {
        let builder = Arc::clone(&builder);
        let ctx = ctx.clone();
        tokio::spawn(async move { builder.stream(&ctx, store.as_ref(), tx).await })
    };

    let batch_size = builder.batch_size();
    let mut batch: Vec<TraversalInput> = Vec::with_capacity(batch_size);

    loop {
        let msg = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(KubepathError::Cancelled),
            msg = rx.recv() => msg,
        };
        let Some(doc) = msg else {
            break;
        };
        match builder.process(&ctx, cache.as_ref(), doc)? {
            Some(insert) => {
                report.records += 1;
                batch.push(insert);
                if batch.len() >= batch_size {
                    flush(&builder, &driver, &ctx, &mut batch, &mut report).await?;
                }
            }
            None => report.skipped += 1,
        }
    }

    // The stream ended; only a clean producer exit makes the remaining
    // batch flushable.
    producer
        .await
        .map_err(|e| KubepathError::Graph(format!("stream task panicked: {e}")))??;
    flush(&builder, &driver, &ctx, &mut batch, &mut report).await?;

    debug!(
        builder = builder.label(),
        records = report.records,
        skipped = report.skipped,
        flushes = report.flushes,
        "builder complete"
    );
    Ok(report)
}

async fn flush<C: GraphConnector>(
    builder: &Arc<dyn Builder>,
    driver: &GraphDriver<C>,
    ctx: &RunContext,
    batch: &mut Vec<TraversalInput>,
    report: &mut BuilderReport,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    // A cancelled run must not look like a successful write.
    if ctx.cancel.is_cancelled() {
        return Err(KubepathError::Cancelled);
    }

    let inserts = std::mem::take(batch);
    let size = inserts.len();
    let request = builder.mutation(inserts);
    let applied = driver.mutate(request).await?;

    report.flushes += 1;
    report.created_vertices += applied.created_vertices;
    report.created_edges += applied.created_edges;
    debug!(
        builder = builder.label(),
        batch = size,
        vertices = applied.created_vertices,
        edges = applied.created_edges,
        dropped = applied.skipped,
        "flushed mutation"
    );
    Ok(())
}

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

//! Attack-path query engine.
//!
//! Bounded, cycle-free traversal: repeatedly take one outbound edge and
//! its landing vertex, rejecting vertices already on the path, until the
//! target class is reached or the hop bound (default 10) is exhausted.
//! Every single-hop expansion runs under a wall-clock limit to guard
//! against combinatorial blow-up in densely connected clusters.
//!
//! Zero discovered paths is a distinguished no-result condition: the
//! methods return empty collections and batch callers continue.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use kubepath_core::{KubepathError, QueryConfig, Result};
use kubepath_graph::{
    Expansion, GraphConnector, GraphDriver, Vertex, VertexId, STORE_ID_PROPERTY,
};

use crate::filter::PathFilter;
use crate::path::{AttackPath, AttackProfile, PathElement, VulnerableContainer};

pub struct AttackPathEngine<C: GraphConnector> {
    driver: Arc<GraphDriver<C>>,
    config: QueryConfig,
}

impl<C: GraphConnector + Send + Sync + 'static> AttackPathEngine<C>
where
    C::Connection: Send + Sync,
{
    pub fn new(driver: Arc<GraphDriver<C>>, config: QueryConfig) -> Self {
        Self { driver, config }
    }

    async fn start_vertices(&self, filter: &PathFilter) -> Result<Vec<Vertex>> {
        self.driver.vertices(filter.start_query()).await
    }

    /// One outbound hop, bounded by the per-expansion wall clock.
    async fn expand_bounded(
        &self,
        vertex: VertexId,
        limit: Duration,
    ) -> Result<Vec<Expansion>> {
        match tokio::time::timeout(limit, self.driver.expand(vertex)).await {
            Ok(result) => result,
            Err(_) => Err(KubepathError::Timeout),
        }
    }

    /// Depth-first enumeration of simple paths from one start vertex.
    /// With `first_only`, stops at the first complete path.
    async fn paths_from(
        &self,
        start: Vertex,
        target_class: &str,
        limit: Duration,
        first_only: bool,
    ) -> Result<Vec<AttackPath>> {
        let mut found = Vec::new();
        let mut stack: Vec<(Vec<PathElement>, HashSet<VertexId>, VertexId)> = Vec::new();

        let start_id = start.id;
        stack.push((
            vec![PathElement::Vertex(start)],
            HashSet::from([start_id]),
            start_id,
        ));

        while let Some((elements, visited, current)) = stack.pop() {
            let hops = elements.len() / 2;
            if hops >= self.config.max_hops {
                continue;
            }

            for expansion in self.expand_bounded(current, limit).await? {
                let Expansion { edge, vertex } = expansion;
                // Simple paths only: never revisit a vertex on this path.
                if visited.contains(&vertex.id) {
                    continue;
                }

                let landing = vertex.id;
                let mut next = elements.clone();
                next.push(PathElement::Edge(edge));
                next.push(PathElement::Vertex(vertex));

                let reached_target = next
                    .last()
                    .map(|element| element.label() == target_class)
                    .unwrap_or(false);
                if reached_target {
                    found.push(AttackPath { elements: next });
                    if first_only {
                        return Ok(found);
                    }
                    continue;
                }

                let mut next_visited = visited.clone();
                next_visited.insert(landing);
                stack.push((next, next_visited, landing));
            }
        }
        Ok(found)
    }

    /// Full path materialization: every vertex and edge property along
    /// every cycle-free route from the filtered containers to the target
    /// class.
    pub async fn attack_paths(&self, filter: &PathFilter) -> Result<Vec<AttackPath>> {
        let target_class = filter.resolve_target_class(&self.config).to_string();
        let limit = filter.resolve_time_limit(&self.config);

        let starts = self.start_vertices(filter).await?;
        debug!(starts = starts.len(), target = %target_class, "materializing attack paths");

        let mut paths = Vec::new();
        for start in starts {
            let mut from_here = self
                .paths_from(start, &target_class, limit, false)
                .await?;
            paths.append(&mut from_here);
        }
        info!(paths = paths.len(), "attack path query complete");
        Ok(paths)
    }

    /// Stream variant of [`attack_paths`] for downstream encoders.
    pub async fn stream_paths(
        self: Arc<Self>,
        filter: PathFilter,
    ) -> ReceiverStream<Result<AttackPath>> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            match self.attack_paths(&filter).await {
                Ok(paths) => {
                    for path in paths {
                        if tx.send(Ok(path)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    /// Profile aggregation: group paths by their label sequence, counting
    /// distinct containers per profile.
    pub async fn attack_profiles(&self, filter: &PathFilter) -> Result<Vec<AttackProfile>> {
        let paths = self.attack_paths(filter).await?;

        let mut grouped: BTreeMap<String, HashSet<String>> = BTreeMap::new();
        for path in &paths {
            let Some(start) = path.start() else { continue };
            let container = start
                .property_str(STORE_ID_PROPERTY)
                .unwrap_or_default()
                .to_string();
            grouped.entry(path.profile()).or_default().insert(container);
        }

        Ok(grouped
            .into_iter()
            .map(|(profile, containers)| AttackProfile {
                profile,
                containers: containers.len(),
            })
            .collect())
    }

    /// Existence check: which containers have *any* path to the target
    /// class within the hop bound. Cheaper than enumeration — one path per
    /// container, deduplicated by image.
    pub async fn vulnerable_containers(
        &self,
        filter: &PathFilter,
    ) -> Result<Vec<VulnerableContainer>> {
        let target_class = filter.resolve_target_class(&self.config).to_string();
        let limit = filter.resolve_time_limit(&self.config);

        let starts = self.start_vertices(filter).await?;
        let mut seen_images = HashSet::new();
        let mut vulnerable = Vec::new();

        for start in starts {
            let image = start.property_str("image").unwrap_or_default().to_string();
            if seen_images.contains(&image) {
                continue;
            }
            let name = start.property_str("name").unwrap_or_default().to_string();
            let namespace = start
                .property_str("namespace")
                .unwrap_or_default()
                .to_string();

            let paths = self
                .paths_from(start, &target_class, limit, true)
                .await?;
            if !paths.is_empty() {
                seen_images.insert(image.clone());
                vulnerable.push(VulnerableContainer {
                    name,
                    namespace,
                    image,
                });
            }
        }

        vulnerable.sort_by(|a, b| a.image.cmp(&b.image));
        Ok(vulnerable)
    }
}

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

//! Attack-path filter surface.
//!
//! All fields optional, AND-composed. `namespace` and
//! `excluded_namespaces` are mutually exclusive; when both are given,
//! `namespace` wins and the exclusion list is ignored — one rule, applied
//! identically by every query shape.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use kubepath_core::QueryConfig;
use kubepath_graph::{vertex_class, VertexQuery};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathFilter {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    /// Overrides the configured target class for this query.
    #[serde(default)]
    pub target_class: Option<String>,
    /// Overrides the configured per-hop time limit for this query.
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn exclude_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.excluded_namespaces.push(namespace.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn target_class(mut self, class: impl Into<String>) -> Self {
        self.target_class = Some(class.into());
        self
    }

    pub fn time_limit_ms(mut self, millis: u64) -> Self {
        self.time_limit_ms = Some(millis);
        self
    }

    /// Compile the starting vertex set: containers, restricted by the
    /// composable property filters.
    pub fn start_query(&self) -> VertexQuery {
        let mut query = VertexQuery::for_class(vertex_class::CONTAINER);

        match (&self.namespace, self.excluded_namespaces.is_empty()) {
            (Some(namespace), excluded_empty) => {
                if !excluded_empty {
                    debug!(
                        namespace = %namespace,
                        "both namespace and exclusions set; namespace takes precedence"
                    );
                }
                query = query.eq("namespace", namespace.clone());
            }
            (None, false) => {
                let excluded = self
                    .excluded_namespaces
                    .iter()
                    .map(|ns| json!(ns))
                    .collect();
                query = query.not_in("namespace", excluded);
            }
            (None, true) => {}
        }

        if let Some(image) = &self.image {
            query = query.eq("image", image.clone());
        }
        if let Some(app) = &self.app {
            query = query.eq("app", app.clone());
        }
        if let Some(team) = &self.team {
            query = query.eq("team", team.clone());
        }
        query
    }

    pub fn resolve_target_class<'a>(&'a self, config: &'a QueryConfig) -> &'a str {
        self.target_class.as_deref().unwrap_or(&config.target_class)
    }

    pub fn resolve_time_limit(&self, config: &QueryConfig) -> Duration {
        self.time_limit_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.time_limit())
    }
}

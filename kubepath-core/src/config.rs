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

//! KubePath configuration.
//!
//! Loaded with priority file > environment > defaults. The per-query time
//! limit is a single configured default; individual queries may override
//! it through the path filter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{KubepathError, Result};

/// Auth mode names the connection layer accepts.
pub const AUTH_MODE_PLAIN: &str = "plain";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KubepathConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Graph service endpoint URI.
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,

    /// Connection auth mode; only "plain" is implemented.
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Additional attempts after the first failure.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Base sleep between attempts; up to 1000ms of jitter is added.
    #[serde(default = "default_retry_duration_ms")]
    pub retry_duration_ms: u64,

    /// HTTP request timeout per traversal execution.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Bounded channel capacity between store streams and batch writers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Batch size for builders that don't set their own.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Cluster name stamped on the run.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Wall-clock bound on each single-hop expansion, in milliseconds.
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,

    /// Maximum hops in one attack path.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Vertex class a path must reach to count as an escape.
    #[serde(default = "default_target_class")]
    pub target_class: String,
}

fn default_graph_endpoint() -> String {
    "http://127.0.0.1:8182".to_string()
}

fn default_auth_mode() -> String {
    AUTH_MODE_PLAIN.to_string()
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_duration_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    512
}

fn default_batch_size() -> usize {
    250
}

fn default_cluster_name() -> String {
    "default-cluster".to_string()
}

fn default_time_limit_ms() -> u64 {
    3000
}

fn default_max_hops() -> usize {
    10
}

fn default_target_class() -> String {
    "Node".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: default_graph_endpoint(),
            auth_mode: default_auth_mode(),
            username: None,
            password: None,
            retry_limit: default_retry_limit(),
            retry_duration_ms: default_retry_duration_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            default_batch_size: default_batch_size(),
            cluster_name: default_cluster_name(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: default_time_limit_ms(),
            max_hops: default_max_hops(),
            target_class: default_target_class(),
        }
    }
}

impl GraphConfig {
    pub fn retry_duration(&self) -> Duration {
        Duration::from_millis(self.retry_duration_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl QueryConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

impl KubepathConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| KubepathError::Config(e.to_string()))
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - KUBEPATH_GRAPH_ENDPOINT: graph service URI
    /// - KUBEPATH_GRAPH_AUTH_MODE: connection auth mode
    /// - KUBEPATH_GRAPH_USERNAME / KUBEPATH_GRAPH_PASSWORD
    /// - KUBEPATH_RETRY_LIMIT / KUBEPATH_RETRY_DURATION_MS
    /// - KUBEPATH_CLUSTER_NAME
    /// - KUBEPATH_QUERY_TIME_LIMIT_MS
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("KUBEPATH_GRAPH_ENDPOINT") {
            config.graph.endpoint = endpoint;
        }
        if let Ok(mode) = std::env::var("KUBEPATH_GRAPH_AUTH_MODE") {
            config.graph.auth_mode = mode;
        }
        if let Ok(user) = std::env::var("KUBEPATH_GRAPH_USERNAME") {
            config.graph.username = Some(user);
        }
        if let Ok(pass) = std::env::var("KUBEPATH_GRAPH_PASSWORD") {
            config.graph.password = Some(pass);
        }
        if let Ok(limit) = std::env::var("KUBEPATH_RETRY_LIMIT") {
            if let Ok(val) = limit.parse() {
                config.graph.retry_limit = val;
            }
        }
        if let Ok(duration) = std::env::var("KUBEPATH_RETRY_DURATION_MS") {
            if let Ok(val) = duration.parse() {
                config.graph.retry_duration_ms = val;
            }
        }
        if let Ok(cluster) = std::env::var("KUBEPATH_CLUSTER_NAME") {
            config.ingest.cluster_name = cluster;
        }
        if let Ok(limit) = std::env::var("KUBEPATH_QUERY_TIME_LIMIT_MS") {
            if let Ok(val) = limit.parse() {
                config.query.time_limit_ms = val;
            }
        }

        config
    }

    /// Load with priority: file > env > defaults.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading configuration file");
                Self::from_file(path)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::from_env()
            }
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants that would otherwise fail deep in a run.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.graph.endpoint.as_str();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(KubepathError::Config(format!(
                "graph endpoint must be an http(s) URI, got {endpoint:?}"
            )));
        }
        if self.ingest.channel_capacity == 0 {
            return Err(KubepathError::Config(
                "ingest channel capacity must be non-zero".into(),
            ));
        }
        if self.ingest.default_batch_size == 0 {
            return Err(KubepathError::Config("batch size must be non-zero".into()));
        }
        if self.query.max_hops == 0 {
            return Err(KubepathError::Config("max hops must be non-zero".into()));
        }
        Ok(())
    }
}

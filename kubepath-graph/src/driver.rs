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

//! Graph connection management and the retry layer.
//!
//! Every attempt opens a fresh authenticated connection, executes one
//! traversal and closes the connection no matter the outcome. No reuse
//! across attempts: the latency cost buys robustness against half-broken
//! sockets left behind by a failed request.
//!
//! Retry policy: transient failures sleep `retry_duration + Uniform(0,
//! 1000ms)` and retry up to `retry_limit` more times, then surface as
//! `MaxRetries`. A server-reported time-limit abort is a distinct
//! `Timeout` error and is never retried — the traversal would only hit
//! the same bound again; the caller may lower it and resubmit.

use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use kubepath_core::{GraphConfig, KubepathError, Result};

use crate::types::{
    AppliedMutation, Expansion, GraphRequest, GraphResponse, Vertex, VertexId, VertexQuery,
};
use crate::traversal::TraversalRequest;

const JITTER_MAX_MS: u64 = 1000;

/// Credentials resolved from config. Unknown mode names fail here, at
/// construction, never at query time.
#[derive(Debug, Clone)]
pub enum AuthMode {
    Plain { username: String, password: String },
}

impl AuthMode {
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        match config.auth_mode.as_str() {
            kubepath_core::AUTH_MODE_PLAIN => Ok(AuthMode::Plain {
                username: config.username.clone().unwrap_or_default(),
                password: config.password.clone().unwrap_or_default(),
            }),
            other => Err(KubepathError::InvalidAuthMode(other.to_string())),
        }
    }
}

/// One live, authenticated connection.
#[async_trait]
pub trait GraphConnection: Send + Sync {
    async fn execute(&self, request: &GraphRequest) -> Result<GraphResponse>;

    /// Release the connection. Close failures are logged, never fatal.
    async fn close(&self) -> Result<()>;
}

/// Opens connections. One call per attempt.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    type Connection: GraphConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}

/// Retrying executor over a connector.
pub struct GraphDriver<C: GraphConnector> {
    connector: C,
    retry_limit: u32,
    retry_duration: Duration,
}

impl<C: GraphConnector> GraphDriver<C> {
    pub fn new(connector: C, config: &GraphConfig) -> Self {
        Self {
            connector,
            retry_limit: config.retry_limit,
            retry_duration: config.retry_duration(),
        }
    }

    /// Execute one traversal closure with the retry policy. The closure
    /// receives a fresh connection on every attempt.
    pub async fn query<T, F>(&self, mut op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c C::Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut retries = 0u32;
        loop {
            let outcome = match self.connector.connect().await {
                Ok(conn) => {
                    let result = op(&conn).await;
                    if let Err(close_err) = conn.close().await {
                        debug!(error = %close_err, "connection close failed");
                    }
                    result
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => return Ok(value),
                // The backend's own time bound: retrying cannot succeed.
                Err(KubepathError::Timeout) => return Err(KubepathError::Timeout),
                // Nothing matched: a sentinel, not a failure.
                Err(KubepathError::NoResult) => return Err(KubepathError::NoResult),
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                    let jitter = rand::thread_rng().gen_range(0..JITTER_MAX_MS);
                    let backoff = self.retry_duration + Duration::from_millis(jitter);
                    warn!(
                        error = %err,
                        attempt = retries,
                        limit = self.retry_limit,
                        backoff_ms = backoff.as_millis() as u64,
                        "graph query failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(KubepathError::MaxRetries {
                        attempts: retries + 1,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply one compiled bulk mutation.
    pub async fn mutate(&self, request: TraversalRequest) -> Result<AppliedMutation> {
        let request = Arc::new(GraphRequest::Mutate(request));
        self.query(move |conn| {
            let request = Arc::clone(&request);
            Box::pin(async move { conn.execute(&request).await })
        })
        .await?
        .into_applied()
    }

    /// Fetch vertices matching a class/property query.
    pub async fn vertices(&self, query: VertexQuery) -> Result<Vec<Vertex>> {
        let request = Arc::new(GraphRequest::Vertices(query));
        self.query(move |conn| {
            let request = Arc::clone(&request);
            Box::pin(async move { conn.execute(&request).await })
        })
        .await?
        .into_vertices()
    }

    /// Expand one outbound hop from a vertex.
    pub async fn expand(&self, vertex: VertexId) -> Result<Vec<Expansion>> {
        let request = Arc::new(GraphRequest::Expand { vertex });
        self.query(move |conn| {
            let request = Arc::clone(&request);
            Box::pin(async move { conn.execute(&request).await })
        })
        .await?
        .into_expansion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Connector whose connections fail a configured number of times
    /// before succeeding, counting every attempt.
    struct ScriptedConnector {
        attempts: Arc<AtomicU32>,
        failures_before_success: u32,
        error: fn() -> KubepathError,
    }

    struct ScriptedConnection {
        attempt: u32,
        failures_before_success: u32,
        error: fn() -> KubepathError,
    }

    #[async_trait]
    impl GraphConnection for ScriptedConnection {
        async fn execute(&self, _request: &GraphRequest) -> Result<GraphResponse> {
            if self.attempt <= self.failures_before_success {
                Err((self.error)())
            } else {
                Ok(GraphResponse::Applied(AppliedMutation::default()))
            }
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl GraphConnector for ScriptedConnector {
        type Connection = ScriptedConnection;

        async fn connect(&self) -> Result<Self::Connection> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ScriptedConnection {
                attempt,
                failures_before_success: self.failures_before_success,
                error: self.error,
            })
        }
    }

    fn driver_with(
        failures: u32,
        retry_limit: u32,
        error: fn() -> KubepathError,
    ) -> (GraphDriver<ScriptedConnector>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = ScriptedConnector {
            attempts: Arc::clone(&attempts),
            failures_before_success: failures,
            error,
        };
        let config = GraphConfig {
            retry_limit,
            retry_duration_ms: 10,
            ..GraphConfig::default()
        };
        (GraphDriver::new(connector, &config), attempts)
    }

    async fn run_query(driver: &GraphDriver<ScriptedConnector>) -> Result<GraphResponse> {
        let request = Arc::new(GraphRequest::Expand {
            vertex: VertexId(1),
        });
        driver
            .query(move |conn| {
                let request = Arc::clone(&request);
                Box::pin(async move { conn.execute(&request).await })
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_makes_exactly_limit_plus_one_attempts() {
        let (driver, attempts) =
            driver_with(u32::MAX, 3, || KubepathError::Graph("connection refused".into()));

        let err = run_query(&driver).await.unwrap_err();
        assert!(matches!(err, KubepathError::MaxRetries { attempts: 4, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_then_success_takes_two_attempts() {
        let (driver, attempts) =
            driver_with(1, 3, || KubepathError::Graph("broken pipe".into()));

        let response = run_query(&driver).await.unwrap();
        assert!(matches!(response, GraphResponse::Applied(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_short_circuits_after_one_attempt() {
        let (driver, attempts) = driver_with(u32::MAX, 5, || KubepathError::Timeout);

        let err = run_query(&driver).await.unwrap_err();
        assert!(matches!(err, KubepathError::Timeout));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_result_passes_through_unretried() {
        let (driver, attempts) = driver_with(u32::MAX, 5, || KubepathError::NoResult);

        let err = run_query(&driver).await.unwrap_err();
        assert!(err.is_no_result());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_is_not_retried() {
        let (driver, attempts) =
            driver_with(u32::MAX, 5, || KubepathError::Decode("bad shape".into()));

        let err = run_query(&driver).await.unwrap_err();
        assert!(matches!(err, KubepathError::Decode(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auth_mode_plain_parses() {
        let config = GraphConfig {
            username: Some("kp".into()),
            password: Some("secret".into()),
            ..GraphConfig::default()
        };
        let AuthMode::Plain { username, password } = AuthMode::from_config(&config).unwrap();
        assert_eq!(username, "kp");
        assert_eq!(password, "secret");
    }

    #[test]
    fn test_unknown_auth_mode_fails_at_construction() {
        let config = GraphConfig {
            auth_mode: "kerberos".into(),
            ..GraphConfig::default()
        };
        let err = AuthMode::from_config(&config).unwrap_err();
        assert!(matches!(err, KubepathError::InvalidAuthMode(_)));
    }
}

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

//! Error taxonomy shared across the KubePath workspace.
//!
//! Library components return typed errors; only the outermost orchestration
//! decides whether a failure aborts a run or is logged and skipped. Two
//! variants are sentinels rather than failures: `NoResult` (a well-formed
//! query matched nothing) and, at the call sites that expect it, a missing
//! cache entry surfaced as `Option::None` instead of an error.

use thiserror::Error;

/// Result type used throughout the KubePath crates.
pub type Result<T> = std::result::Result<T, KubepathError>;

#[derive(Debug, Error)]
pub enum KubepathError {
    /// A well-formed query legitimately matched nothing. Callers iterating
    /// over namespaces or clusters must treat this as "nothing found" and
    /// continue, never abort the surrounding batch.
    #[error("no result found for query")]
    NoResult,

    /// The graph backend aborted a traversal on its own time bound. Retrying
    /// cannot succeed; the caller may lower the bound and resubmit.
    #[error("graph traversal exceeded its time limit")]
    Timeout,

    /// A transient backend failure survived the whole retry budget.
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    MaxRetries { attempts: u32, last: String },

    /// A result had an unexpected shape: wrong type, missing field, or a
    /// malformed binary layout. Indicates schema drift between this code and
    /// the backend, so it is fatal to the current operation.
    #[error("decode error: {0}")]
    Decode(String),

    /// A test-and-set cache write hit a key that was already populated.
    #[error("cache overwrite on {shard}:{key}")]
    CacheOverwrite { shard: String, key: String },

    /// A cache entry that the caller requires is absent. Distinct from the
    /// benign "entity has no identity" case, which is `None`, not an error.
    #[error("required cache entry missing for {shard}:{key}")]
    CacheEntryNotFound { shard: String, key: String },

    /// Unknown connection auth mode. Raised when the connection is
    /// constructed, never at query time.
    #[error("invalid auth mode: {0}")]
    InvalidAuthMode(String),

    /// Duplicate builder registration within a partition. A programming
    /// error, not a runtime condition to recover from.
    #[error("builder already registered: {label}")]
    Collision { label: String },

    /// The shared run context was cancelled while work was still pending.
    #[error("run cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl KubepathError {
    /// Whether the §retry policy applies: transient backend failures retry,
    /// everything that indicates a data/shape/configuration problem (or a
    /// server-side time bound) surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KubepathError::Graph(_) | KubepathError::Store(_) | KubepathError::Io(_)
        )
    }

    /// Whether this is the distinguished "nothing matched" sentinel.
    pub fn is_no_result(&self) -> bool {
        matches!(self, KubepathError::NoResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(KubepathError::Graph("connection refused".into()).is_retryable());
        assert!(!KubepathError::Timeout.is_retryable());
        assert!(!KubepathError::NoResult.is_retryable());
        assert!(!KubepathError::Decode("bad tag".into()).is_retryable());
        assert!(!KubepathError::InvalidAuthMode("oauth".into()).is_retryable());
    }

    #[test]
    fn test_no_result_sentinel() {
        assert!(KubepathError::NoResult.is_no_result());
        assert!(!KubepathError::Timeout.is_no_result());
    }
}

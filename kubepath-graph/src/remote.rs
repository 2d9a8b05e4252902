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

//! Remote graph service client.
//!
//! Each connect builds a fresh authenticated HTTP client; the driver
//! closes it after every attempt. Custom-typed values inside responses
//! (`{"@type": name, "@value": hex}`) are resolved through the
//! [`CustomTypeRegistry`] before the response is decoded, so relation
//! identifiers surface as ordinary property maps.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use kubepath_core::{GraphConfig, KubepathError, Result};

use crate::driver::{AuthMode, GraphConnection, GraphConnector};
use crate::relation_id::CustomTypeRegistry;
use crate::types::{GraphRequest, GraphResponse};

/// Substring of the server's traversal-time-bound abort message.
const TIME_LIMIT_MARKER: &str = "time limit exceeded";

pub struct RemoteConnector {
    config: GraphConfig,
    auth: AuthMode,
    registry: Arc<CustomTypeRegistry>,
}

impl RemoteConnector {
    /// Fails fast on an unknown auth mode; queries never see it.
    pub fn new(config: GraphConfig) -> Result<Self> {
        let auth = AuthMode::from_config(&config)?;
        Ok(Self {
            config,
            auth,
            registry: Arc::new(CustomTypeRegistry::with_defaults()),
        })
    }

    pub fn with_registry(config: GraphConfig, registry: CustomTypeRegistry) -> Result<Self> {
        let auth = AuthMode::from_config(&config)?;
        Ok(Self {
            config,
            auth,
            registry: Arc::new(registry),
        })
    }
}

#[async_trait]
impl GraphConnector for RemoteConnector {
    type Connection = RemoteConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        let http = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| KubepathError::Graph(format!("failed to build http client: {e}")))?;
        Ok(RemoteConnection {
            http,
            endpoint: self.config.endpoint.clone(),
            auth: self.auth.clone(),
            registry: Arc::clone(&self.registry),
        })
    }
}

pub struct RemoteConnection {
    http: reqwest::Client,
    endpoint: String,
    auth: AuthMode,
    registry: Arc<CustomTypeRegistry>,
}

#[async_trait]
impl GraphConnection for RemoteConnection {
    async fn execute(&self, request: &GraphRequest) -> Result<GraphResponse> {
        let AuthMode::Plain { username, password } = &self.auth;
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(username, Some(password))
            .json(request)
            .send()
            .await
            .map_err(|e| KubepathError::Graph(format!("graph request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KubepathError::Graph(format!("graph response read failed: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| KubepathError::Decode(format!("graph response is not JSON: {e}")))?;
        let resolved = resolve_custom_types(value, &self.registry)?;
        serde_json::from_value(resolved)
            .map_err(|e| KubepathError::Decode(format!("graph response shape: {e}")))
    }

    async fn close(&self) -> Result<()> {
        // Dropping the client tears the connection pool down.
        debug!(endpoint = %self.endpoint, "closing graph connection");
        Ok(())
    }
}

/// Map a failed HTTP exchange onto the error taxonomy. The server's own
/// traversal time bound is a distinct, non-retryable condition.
fn classify_failure(status: u16, body: &str) -> KubepathError {
    if body.to_ascii_lowercase().contains(TIME_LIMIT_MARKER) {
        KubepathError::Timeout
    } else {
        KubepathError::Graph(format!("graph service returned {status}: {body}"))
    }
}

/// Recursively replace `{"@type": name, "@value": hex}` wrappers with the
/// decoded value. An unregistered type name is schema drift, not data.
fn resolve_custom_types(value: Value, registry: &CustomTypeRegistry) -> Result<Value> {
    match value {
        Value::Object(map) => {
            if let (Some(Value::String(type_name)), Some(Value::String(payload)), 2) =
                (map.get("@type"), map.get("@value"), map.len())
            {
                let bytes = hex::decode(payload).map_err(|e| {
                    KubepathError::Decode(format!("custom value for {type_name} is not hex: {e}"))
                })?;
                return registry.decode_bytes(type_name, &bytes);
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                resolved.insert(key, resolve_custom_types(inner, registry)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_custom_types(item, registry))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation_id::{encode, RelationIdentifier, VertexRef, RELATION_IDENTIFIER_TYPE};
    use serde_json::json;

    #[test]
    fn test_classify_time_limit_exceeded() {
        let err = classify_failure(
            500,
            "A timeout occurred: the traversal exceeded the configured Time Limit Exceeded bound",
        );
        assert!(matches!(err, KubepathError::Timeout));
    }

    #[test]
    fn test_classify_other_failures_are_transient() {
        let err = classify_failure(502, "bad gateway");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_resolve_nested_relation_identifier() {
        let registry = CustomTypeRegistry::with_defaults();
        let rel = RelationIdentifier {
            out_vertex_id: VertexRef::Long(8),
            type_id: 3,
            relation_id: 771,
            in_vertex_id: VertexRef::Long(12),
        };
        let payload = hex::encode(encode(&rel));

        let value = json!({
            "result": "expansion",
            "edges": [{
                "id": {"@type": RELATION_IDENTIFIER_TYPE, "@value": payload},
                "label": "POD_ATTACH"
            }]
        });
        let resolved = resolve_custom_types(value, &registry).unwrap();
        assert_eq!(resolved["edges"][0]["id"]["relationId"], 771);
        assert_eq!(resolved["edges"][0]["id"]["outVertexId"], 8);
        assert_eq!(resolved["edges"][0]["label"], "POD_ATTACH");
    }

    #[test]
    fn test_resolve_unknown_custom_type_fails() {
        let registry = CustomTypeRegistry::with_defaults();
        let value = json!({"@type": "janusgraph.Geoshape", "@value": "00"});
        let err = resolve_custom_types(value, &registry).unwrap_err();
        assert!(matches!(err, KubepathError::Decode(_)));
    }

    #[test]
    fn test_plain_objects_pass_through() {
        let registry = CustomTypeRegistry::with_defaults();
        let value = json!({"@type": "not-custom", "extra": 1, "@value": "00"});
        // Three keys: not a custom wrapper, left intact.
        let resolved = resolve_custom_types(value.clone(), &registry).unwrap();
        assert_eq!(resolved, value);
    }
}

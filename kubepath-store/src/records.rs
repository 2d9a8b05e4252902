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

//! Typed decode of raw store documents.
//!
//! The decode-into-shape-T contract: a document that does not deserialize
//! into the expected record type is schema drift and fails the stream, it
//! is never coerced.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kubepath_core::{KubepathError, ObjectId, Result, RoleBindingDoc};

use crate::provider::Document;

/// Decode one raw document into the builder-specific record type.
pub fn decode_record<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| KubepathError::Decode(format!("store record decode failed: {e}")))
}

/// Aggregation row: a permission set joined with the role binding that
/// grants it (`Lookup` + `Unwind` over `rolebindings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSetBindingRow {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub namespace: String,
    pub is_namespaced: bool,
    pub binding: RoleBindingDoc,
}

/// Expanded row for role-bind targets: one row per bindable role name
/// granted by a permission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBindTargetRow {
    pub permission_set_id: ObjectId,
    pub namespace: String,
    pub target_role: String,
}

/// Expanded row for permission grants: one row per role-binding subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectGrantRow {
    pub permission_set_id: ObjectId,
    pub namespace: String,
    pub subject_kind: String,
    pub subject_name: String,
    pub subject_namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_record_ok() {
        let id = ObjectId::generate();
        let doc: Document = serde_json::from_value(json!({
            "permission_set_id": id.to_hex(),
            "namespace": "default",
            "target_role": "admin",
        }))
        .unwrap();
        let row: RoleBindTargetRow = decode_record(doc).unwrap();
        assert_eq!(row.permission_set_id, id);
        assert_eq!(row.target_role, "admin");
    }

    #[test]
    fn test_decode_record_shape_error() {
        let doc: Document = serde_json::from_value(json!({
            "permission_set_id": 42,
            "namespace": "default",
        }))
        .unwrap();
        let err = decode_record::<RoleBindTargetRow>(doc).unwrap_err();
        assert!(matches!(err, KubepathError::Decode(_)));
    }
}

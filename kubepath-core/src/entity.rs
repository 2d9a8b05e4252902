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

//! Normalized store documents for the eight cluster collections.
//!
//! One document per object identifier, with denormalized foreign keys the
//! aggregation pipelines join on. Collectors own the write path; the ETL
//! core only reads these shapes back out of the staging store.

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

/// Run metadata stamped on every ingested record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub run_id: String,
    pub cluster: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub runtime: Runtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub namespace: String,
    /// Scheduled node name (`spec.nodeName`); empty until the pod is placed.
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub share_process_namespace: bool,
    pub runtime: Runtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub pod_id: ObjectId,
    pub node_id: ObjectId,
    pub name: String,
    pub pod_name: String,
    pub namespace: String,
    pub image: String,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub host_pid: bool,
    #[serde(default)]
    pub run_as_user: Option<i64>,
    pub runtime: Runtime,
}

/// Volume source kinds the builders distinguish.
pub mod volume_type {
    pub const HOST_PATH: &str = "HostPath";
    pub const PROJECTED: &str = "Projected";
    pub const EMPTY_DIR: &str = "EmptyDir";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub pod_id: ObjectId,
    pub node_id: ObjectId,
    pub name: String,
    pub namespace: String,
    /// Pod and container the mount belongs to; containers are resolved
    /// through the ID cache rather than a denormalized key.
    pub pod_name: String,
    pub container_name: String,
    pub volume_type: String,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    pub runtime: Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDoc {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub namespace: String,
    pub is_namespaced: bool,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
    pub runtime: Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDoc {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBindingDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub role_id: ObjectId,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub subjects: Vec<SubjectDoc>,
    pub runtime: Runtime,
}

/// Identity kinds carried by role-binding subjects.
pub mod identity_kind {
    pub const SERVICE_ACCOUNT: &str = "ServiceAccount";
    pub const USER: &str = "User";
    pub const GROUP: &str = "Group";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub is_namespaced: bool,
    pub runtime: Runtime,
}

/// A role joined with the binding that grants it. The graph models the
/// pair as one PermissionSet vertex; roles and bindings themselves stay
/// store-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSetDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub role_id: ObjectId,
    pub role_binding_id: ObjectId,
    pub name: String,
    pub role_name: String,
    pub namespace: String,
    pub is_namespaced: bool,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
    pub runtime: Runtime,
}

impl RuleDoc {
    /// Whether any verb of this rule matches, treating `*` as a wildcard.
    pub fn has_verb(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb || v == "*")
    }

    /// Whether any resource of this rule matches, treating `*` as a wildcard.
    pub fn has_resource(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource || r == "*")
    }
}

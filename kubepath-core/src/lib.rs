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

//! KubePath Core
//!
//! Shared types for the KubePath pipeline: object identifiers, normalized
//! store documents, the ID resolution cache, configuration and the error
//! taxonomy.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod object_id;

pub use cache::{keys, CacheReader, CacheShard, CacheWriter, MemCache, WriteMode};
pub use config::{
    GraphConfig, IngestConfig, KubepathConfig, QueryConfig, AUTH_MODE_PLAIN,
};
pub use entity::{
    identity_kind, volume_type, ContainerDoc, IdentityDoc, NodeDoc, PermissionSetDoc, PodDoc,
    RoleBindingDoc, RoleDoc, RuleDoc, Runtime, SubjectDoc, VolumeDoc,
};
pub use error::{KubepathError, Result};
pub use object_id::ObjectId;

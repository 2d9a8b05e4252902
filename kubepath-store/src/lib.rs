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

//! KubePath Store
//!
//! Read access to the intermediate document store the collectors populate:
//! query + project + aggregate, yielding raw records for the builder
//! pipeline.

pub mod memory;
pub mod provider;
pub mod records;

pub use memory::MemoryStore;
pub use provider::{
    lookup_path, Collection, Document, DocumentStream, Filter, PipelineStage, StoreProvider,
};
pub use records::{decode_record, PermissionSetBindingRow, RoleBindTargetRow, SubjectGrantRow};

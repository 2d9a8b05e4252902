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

//! KubePath Query
//!
//! Bounded, cycle-free attack-path queries over the populated graph, and
//! the HexTuple wire codec downstream consumers re-hydrate paths from.

pub mod engine;
pub mod filter;
pub mod hextuple;
pub mod path;

pub use engine::AttackPathEngine;
pub use filter::PathFilter;
pub use hextuple::{
    decode as decode_hextuples, encode as encode_hextuples, from_ndjson, to_ndjson, HexTuple,
    PathEntry, CLASS_PREDICATE, EDGE_SUBJECT_PREFIX, IN_PREDICATE, OUT_PREDICATE,
    PROPERTY_PREDICATE_PREFIX, VERTEX_SUBJECT_PREFIX,
};
pub use path::{AttackPath, AttackProfile, PathElement, VulnerableContainer};

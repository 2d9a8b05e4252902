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

//! JanusGraph relation-identifier codec.
//!
//! Fixed binary layout, decoded bit-exactly:
//!
//! ```text
//! [u32 BE custom-type tag = 0x1001]
//! [u8 value flag = 0 (non-nullable)]
//! [out vertex id: u8 marker, then i64 BE (marker 0) or u32 BE len + UTF-8 (marker 1)]
//! [i64 BE type id]
//! [i64 BE relation id]
//! [in vertex id: same marker encoding]
//! ```
//!
//! The value sits inside a larger response envelope, so decoding advances
//! a shared cursor and never assumes the buffer ends after the record.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use kubepath_core::{KubepathError, Result};

/// Server-side name the decoder registers under, so relation identifiers
/// appear transparently inside ordinary query results.
pub const RELATION_IDENTIFIER_TYPE: &str = "janusgraph.RelationIdentifier";

const CUSTOM_TYPE_TAG: u32 = 0x1001;
const VALUE_FLAG_NON_NULLABLE: u8 = 0;
const MARKER_LONG: u8 = 0;
const MARKER_STRING: u8 = 1;

/// A vertex endpoint inside a relation identifier: numeric or custom
/// string ids, depending on the backend's id allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexRef {
    Long(i64),
    Text(String),
}

impl VertexRef {
    fn to_json(&self) -> Value {
        match self {
            VertexRef::Long(v) => json!(v),
            VertexRef::Text(s) => json!(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationIdentifier {
    pub out_vertex_id: VertexRef,
    pub type_id: i64,
    pub relation_id: i64,
    pub in_vertex_id: VertexRef,
}

impl RelationIdentifier {
    /// The property-map shape exposed to result consumers.
    pub fn to_value(&self) -> Value {
        json!({
            "outVertexId": self.out_vertex_id.to_json(),
            "typeId": self.type_id,
            "relationId": self.relation_id,
            "inVertexId": self.in_vertex_id.to_json(),
        })
    }
}

fn read_vertex_ref(cursor: &mut Cursor<&[u8]>) -> Result<VertexRef> {
    let marker = cursor
        .read_u8()
        .map_err(|e| KubepathError::Decode(format!("relation id: missing vertex marker: {e}")))?;
    match marker {
        MARKER_LONG => {
            let id = cursor.read_i64::<BigEndian>().map_err(|e| {
                KubepathError::Decode(format!("relation id: truncated long vertex id: {e}"))
            })?;
            Ok(VertexRef::Long(id))
        }
        MARKER_STRING => {
            let len = cursor.read_u32::<BigEndian>().map_err(|e| {
                KubepathError::Decode(format!("relation id: truncated string length: {e}"))
            })?;
            let mut buf = vec![0u8; len as usize];
            cursor.read_exact(&mut buf).map_err(|e| {
                KubepathError::Decode(format!("relation id: truncated string vertex id: {e}"))
            })?;
            let text = String::from_utf8(buf).map_err(|e| {
                KubepathError::Decode(format!("relation id: vertex id is not UTF-8: {e}"))
            })?;
            Ok(VertexRef::Text(text))
        }
        other => Err(KubepathError::Decode(format!(
            "relation id: unknown vertex id marker {other:#x}"
        ))),
    }
}

fn write_vertex_ref(out: &mut Vec<u8>, vertex: &VertexRef) {
    match vertex {
        VertexRef::Long(v) => {
            out.write_u8(MARKER_LONG).expect("vec write");
            out.write_i64::<BigEndian>(*v).expect("vec write");
        }
        VertexRef::Text(s) => {
            out.write_u8(MARKER_STRING).expect("vec write");
            out.write_u32::<BigEndian>(s.len() as u32).expect("vec write");
            out.write_all(s.as_bytes()).expect("vec write");
        }
    }
}

/// Decode one relation identifier at the cursor's position, leaving the
/// cursor just past the record.
pub fn decode(cursor: &mut Cursor<&[u8]>) -> Result<RelationIdentifier> {
    let tag = cursor
        .read_u32::<BigEndian>()
        .map_err(|e| KubepathError::Decode(format!("relation id: missing type tag: {e}")))?;
    if tag != CUSTOM_TYPE_TAG {
        return Err(KubepathError::Decode(format!(
            "relation id: bad custom type tag {tag:#06x}, expected {CUSTOM_TYPE_TAG:#06x}"
        )));
    }

    let flag = cursor
        .read_u8()
        .map_err(|e| KubepathError::Decode(format!("relation id: missing value flag: {e}")))?;
    if flag != VALUE_FLAG_NON_NULLABLE {
        return Err(KubepathError::Decode(format!(
            "relation id: unexpected value flag {flag}"
        )));
    }

    let out_vertex_id = read_vertex_ref(cursor)?;
    let type_id = cursor
        .read_i64::<BigEndian>()
        .map_err(|e| KubepathError::Decode(format!("relation id: truncated type id: {e}")))?;
    let relation_id = cursor
        .read_i64::<BigEndian>()
        .map_err(|e| KubepathError::Decode(format!("relation id: truncated relation id: {e}")))?;
    let in_vertex_id = read_vertex_ref(cursor)?;

    Ok(RelationIdentifier {
        out_vertex_id,
        type_id,
        relation_id,
        in_vertex_id,
    })
}

/// Encode per the same layout. Used by fixtures and the round-trip tests;
/// production traffic only ever decodes.
pub fn encode(rel: &RelationIdentifier) -> Vec<u8> {
    let mut out = Vec::with_capacity(38);
    out.write_u32::<BigEndian>(CUSTOM_TYPE_TAG).expect("vec write");
    out.write_u8(VALUE_FLAG_NON_NULLABLE).expect("vec write");
    write_vertex_ref(&mut out, &rel.out_vertex_id);
    out.write_i64::<BigEndian>(rel.type_id).expect("vec write");
    out.write_i64::<BigEndian>(rel.relation_id).expect("vec write");
    write_vertex_ref(&mut out, &rel.in_vertex_id);
    out
}

/// Decoder function shape for registered custom types.
pub type CustomDecoder = fn(&mut Cursor<&[u8]>) -> Result<Value>;

/// Registry mapping the server's custom-type names to binary decoders.
pub struct CustomTypeRegistry {
    decoders: HashMap<String, CustomDecoder>,
}

impl CustomTypeRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with the decoders the graph service is known to emit.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(RELATION_IDENTIFIER_TYPE, |cursor| {
            decode(cursor).map(|rel| rel.to_value())
        });
        registry
    }

    pub fn register(&mut self, type_name: &str, decoder: CustomDecoder) {
        self.decoders.insert(type_name.to_string(), decoder);
    }

    /// Decode one custom value. The cursor may have trailing bytes; they
    /// belong to the surrounding envelope and are left untouched.
    pub fn decode_at(&self, type_name: &str, cursor: &mut Cursor<&[u8]>) -> Result<Value> {
        let decoder = self.decoders.get(type_name).ok_or_else(|| {
            KubepathError::Decode(format!("no decoder registered for custom type {type_name:?}"))
        })?;
        decoder(cursor)
    }

    pub fn decode_bytes(&self, type_name: &str, bytes: &[u8]) -> Result<Value> {
        let mut cursor = Cursor::new(bytes);
        self.decode_at(type_name, &mut cursor)
    }
}

impl Default for CustomTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

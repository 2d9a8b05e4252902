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

//! HexTuple path codec.
//!
//! The sole serialization contract between the query engine and its
//! consumers: a path is an ordered sequence of 6-tuples
//! `[subject, predicate, value, datatype, language, graph]`, one JSON
//! array of exactly six strings per tuple, one tuple per line when
//! streamed. Consecutive tuples sharing a subject describe one vertex or
//! edge; a subject change marks the next path step. Edge adjacency is
//! emitted as `urn:property:in`/`urn:property:out` with vertex-URN values,
//! so a chain is self-describing without the originating graph.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use kubepath_core::{KubepathError, Result};

use crate::path::{AttackPath, PathElement};

pub const VERTEX_SUBJECT_PREFIX: &str = "urn:vertex:";
pub const EDGE_SUBJECT_PREFIX: &str = "urn:edge:";
pub const PROPERTY_PREDICATE_PREFIX: &str = "urn:property:";
pub const IN_PREDICATE: &str = "urn:property:in";
pub const OUT_PREDICATE: &str = "urn:property:out";
pub const CLASS_PREDICATE: &str = "urn:property:class";

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// One path property assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexTuple {
    pub subject: String,
    pub predicate: String,
    pub value: String,
    pub datatype: String,
    pub language: String,
    pub graph: String,
}

impl HexTuple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            value: value.into(),
            datatype: XSD_STRING.to_string(),
            language: String::new(),
            graph: String::new(),
        }
    }
}

impl Serialize for HexTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(6))?;
        seq.serialize_element(&self.subject)?;
        seq.serialize_element(&self.predicate)?;
        seq.serialize_element(&self.value)?;
        seq.serialize_element(&self.datatype)?;
        seq.serialize_element(&self.language)?;
        seq.serialize_element(&self.graph)?;
        seq.end()
    }
}

struct HexTupleVisitor;

impl<'de> Visitor<'de> for HexTupleVisitor {
    type Value = HexTuple;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of exactly 6 strings")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut field = |index: usize| -> std::result::Result<String, A::Error> {
            seq.next_element::<String>()?
                .ok_or_else(|| de::Error::invalid_length(index, &self))
        };
        let tuple = HexTuple {
            subject: field(0)?,
            predicate: field(1)?,
            value: field(2)?,
            datatype: field(3)?,
            language: field(4)?,
            graph: field(5)?,
        };
        if seq.next_element::<String>()?.is_some() {
            return Err(de::Error::invalid_length(7, &self));
        }
        Ok(tuple)
    }
}

impl<'de> Deserialize<'de> for HexTuple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(HexTupleVisitor)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode one path into its tuple sequence, in step order.
pub fn encode(path: &AttackPath) -> Vec<HexTuple> {
    let mut tuples = Vec::new();
    for element in &path.elements {
        match element {
            PathElement::Vertex(vertex) => {
                let subject = format!("{VERTEX_SUBJECT_PREFIX}{}", vertex.id);
                if !vertex.properties.contains_key("class") {
                    tuples.push(HexTuple::new(&subject, CLASS_PREDICATE, &vertex.label));
                }
                for (name, value) in &vertex.properties {
                    tuples.push(HexTuple::new(
                        &subject,
                        format!("{PROPERTY_PREDICATE_PREFIX}{name}"),
                        stringify(value),
                    ));
                }
            }
            PathElement::Edge(edge) => {
                let subject = format!("{EDGE_SUBJECT_PREFIX}{}", edge.id);
                tuples.push(HexTuple::new(&subject, CLASS_PREDICATE, &edge.label));
                for (name, value) in &edge.properties {
                    tuples.push(HexTuple::new(
                        &subject,
                        format!("{PROPERTY_PREDICATE_PREFIX}{name}"),
                        stringify(value),
                    ));
                }
                tuples.push(HexTuple::new(
                    &subject,
                    OUT_PREDICATE,
                    format!("{VERTEX_SUBJECT_PREFIX}{}", edge.out_v),
                ));
                tuples.push(HexTuple::new(
                    &subject,
                    IN_PREDICATE,
                    format!("{VERTEX_SUBJECT_PREFIX}{}", edge.in_v),
                ));
            }
        }
    }
    tuples
}

/// One reconstructed chain entry: an `@id`/`@context`/property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@context")]
    pub context: String,
    pub properties: Map<String, Value>,
}

/// Rebuild per-step entries from a tuple sequence. Tuples with an
/// unrecognized subject namespace or predicate are logged and skipped,
/// never fatal.
pub fn decode(tuples: &[HexTuple]) -> Vec<PathEntry> {
    let mut entries: Vec<PathEntry> = Vec::new();
    let mut current_subject: Option<String> = None;

    for tuple in tuples {
        if !tuple.subject.starts_with(VERTEX_SUBJECT_PREFIX)
            && !tuple.subject.starts_with(EDGE_SUBJECT_PREFIX)
        {
            warn!(subject = %tuple.subject, "unrecognized subject namespace, skipping tuple");
            continue;
        }
        let Some(property) = tuple.predicate.strip_prefix(PROPERTY_PREDICATE_PREFIX) else {
            warn!(predicate = %tuple.predicate, "unknown predicate, skipping tuple");
            continue;
        };

        if current_subject.as_deref() != Some(tuple.subject.as_str()) {
            current_subject = Some(tuple.subject.clone());
            entries.push(PathEntry {
                id: tuple.subject.clone(),
                context: String::new(),
                properties: Map::new(),
            });
        }
        // First tuple of an entry always exists here.
        let entry = entries.last_mut().expect("entry pushed above");

        if property == "class" {
            entry.context = tuple.value.clone();
        }
        entry
            .properties
            .insert(property.to_string(), Value::String(tuple.value.clone()));
    }

    entries
}

/// One tuple per line, each a JSON array of six strings.
pub fn to_ndjson(tuples: &[HexTuple]) -> Result<String> {
    let mut out = String::new();
    for tuple in tuples {
        out.push_str(&serde_json::to_string(tuple)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn from_ndjson(data: &str) -> Result<Vec<HexTuple>> {
    data.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| KubepathError::Decode(format!("malformed hextuple line: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubepath_graph::{GraphEdge, Vertex, VertexId};
    use proptest::prelude::*;
    use serde_json::json;

    fn vertex(id: i64, class: &str, props: Vec<(&str, Value)>) -> Vertex {
        let mut properties = Map::new();
        properties.insert("class".into(), json!(class));
        for (k, v) in props {
            properties.insert(k.into(), v);
        }
        Vertex {
            id: VertexId(id),
            label: class.to_string(),
            properties,
        }
    }

    fn edge(id: &str, label: &str, out: i64, r#in: i64) -> GraphEdge {
        let mut properties = Map::new();
        properties.insert("runID".into(), json!("r1"));
        GraphEdge {
            id: id.to_string(),
            label: label.to_string(),
            out_v: VertexId(out),
            in_v: VertexId(r#in),
            properties,
        }
    }

    fn sample_path() -> AttackPath {
        AttackPath {
            elements: vec![
                PathElement::Vertex(vertex(
                    1,
                    "Container",
                    vec![("name", json!("web")), ("image", json!("img:1"))],
                )),
                PathElement::Edge(edge("100", "CONTAINER_ATTACH", 1, 2)),
                PathElement::Vertex(vertex(2, "Pod", vec![("name", json!("web-0"))])),
                PathElement::Edge(edge("101", "POD_EXEC", 2, 3)),
                PathElement::Vertex(vertex(3, "Node", vec![("name", json!("node-1"))])),
            ],
        }
    }

    #[test]
    fn test_wire_format_is_six_string_array() {
        let tuple = HexTuple::new("urn:vertex:1", "urn:property:name", "web");
        let json = serde_json::to_value(&tuple).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 6);
        assert_eq!(array[0], json!("urn:vertex:1"));
        assert_eq!(array[3], json!(XSD_STRING));

        let back: HexTuple = serde_json::from_value(json).unwrap();
        assert_eq!(back, tuple);
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(serde_json::from_str::<HexTuple>(r#"["a","b","c","d","e"]"#).is_err());
        assert!(
            serde_json::from_str::<HexTuple>(r#"["a","b","c","d","e","f","g"]"#).is_err()
        );
    }

    #[test]
    fn test_encode_emits_adjacency_urns() {
        let tuples = encode(&sample_path());
        let attach_out = tuples
            .iter()
            .find(|t| t.subject == "urn:edge:100" && t.predicate == OUT_PREDICATE)
            .unwrap();
        assert_eq!(attach_out.value, "urn:vertex:1");
        let attach_in = tuples
            .iter()
            .find(|t| t.subject == "urn:edge:100" && t.predicate == IN_PREDICATE)
            .unwrap();
        assert_eq!(attach_in.value, "urn:vertex:2");
    }

    #[test]
    fn test_decode_chains_on_subject_change() {
        let entries = decode(&encode(&sample_path()));
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].id, "urn:vertex:1");
        assert_eq!(entries[0].context, "Container");
        assert_eq!(entries[1].id, "urn:edge:100");
        assert_eq!(entries[1].context, "CONTAINER_ATTACH");
        assert_eq!(entries[4].context, "Node");
        assert_eq!(
            entries[0].properties.get("image"),
            Some(&json!("img:1"))
        );
        assert_eq!(
            entries[1].properties.get("in"),
            Some(&json!("urn:vertex:2"))
        );
    }

    #[test]
    fn test_decode_skips_unknown_predicate_and_subject() {
        let mut tuples = encode(&sample_path());
        tuples.insert(
            0,
            HexTuple::new("urn:vertex:1", "urn:other:thing", "ignored"),
        );
        tuples.insert(0, HexTuple::new("urn:wat:9", "urn:property:name", "ignored"));

        let entries = decode(&tuples);
        assert_eq!(entries.len(), 5);
        assert!(entries
            .iter()
            .all(|entry| !entry.properties.values().any(|v| v == "ignored")));
    }

    #[test]
    fn test_round_trip_reproduces_ordered_property_maps() {
        let path = sample_path();
        let entries = decode(&encode(&path));

        let expected: Vec<(String, Map<String, Value>)> = path
            .elements
            .iter()
            .map(|element| match element {
                PathElement::Vertex(v) => {
                    let props = v
                        .properties
                        .iter()
                        .map(|(k, val)| (k.clone(), Value::String(stringify(val))))
                        .collect();
                    (format!("urn:vertex:{}", v.id), props)
                }
                PathElement::Edge(e) => {
                    let mut props: Map<String, Value> = e
                        .properties
                        .iter()
                        .map(|(k, val)| (k.clone(), Value::String(stringify(val))))
                        .collect();
                    props.insert("class".into(), json!(e.label));
                    props.insert("out".into(), json!(format!("urn:vertex:{}", e.out_v)));
                    props.insert("in".into(), json!(format!("urn:vertex:{}", e.in_v)));
                    (format!("urn:edge:{}", e.id), props)
                }
            })
            .collect();

        assert_eq!(entries.len(), expected.len());
        for (entry, (id, props)) in entries.iter().zip(expected) {
            assert_eq!(entry.id, id);
            assert_eq!(entry.properties, props);
        }
    }

    #[test]
    fn test_ndjson_round_trip() {
        let tuples = encode(&sample_path());
        let ndjson = to_ndjson(&tuples).unwrap();
        assert_eq!(ndjson.lines().count(), tuples.len());
        let back = from_ndjson(&ndjson).unwrap();
        assert_eq!(back, tuples);
    }

    #[test]
    fn test_ndjson_rejects_malformed_line() {
        let err = from_ndjson("[\"only\",\"three\",\"fields\"]\n").unwrap_err();
        assert!(matches!(err, KubepathError::Decode(_)));
    }

    proptest! {
        #[test]
        fn prop_round_trip_arbitrary_paths(
            step_count in 1usize..5,
            prop_count in 1usize..4,
        ) {
            // Alternating vertex/edge chain with `prop_count` properties
            // per step.
            let mut elements = Vec::new();
            for step in 0..step_count {
                let props: Vec<(String, Value)> = (0..prop_count)
                    .map(|p| (format!("p{p}"), json!(format!("value-{step}-{p}"))))
                    .collect();
                let mut properties = Map::new();
                properties.insert("class".into(), json!("Pod"));
                for (k, v) in props {
                    properties.insert(k, v);
                }
                elements.push(PathElement::Vertex(Vertex {
                    id: VertexId(step as i64),
                    label: "Pod".into(),
                    properties,
                }));
                if step + 1 < step_count {
                    elements.push(PathElement::Edge(GraphEdge {
                        id: format!("e{step}"),
                        label: "POD_EXEC".into(),
                        out_v: VertexId(step as i64),
                        in_v: VertexId(step as i64 + 1),
                        properties: Map::new(),
                    }));
                }
            }
            let path = AttackPath { elements };

            let entries = decode(&encode(&path));
            prop_assert_eq!(entries.len(), path.elements.len());
            for (entry, element) in entries.iter().zip(&path.elements) {
                prop_assert_eq!(&entry.context, element.label());
            }
        }
    }
}

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

//! Attack path result types.

use serde::{Deserialize, Serialize};

use kubepath_graph::{GraphEdge, Vertex, CLASS_PROPERTY};

/// One step of a materialized path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum PathElement {
    Vertex(Vertex),
    Edge(GraphEdge),
}

impl PathElement {
    /// Vertex class or edge label; vertices prefer the `class` mirror.
    pub fn label(&self) -> &str {
        match self {
            PathElement::Vertex(v) => v.property_str(CLASS_PROPERTY).unwrap_or(&v.label),
            PathElement::Edge(e) => &e.label,
        }
    }
}

/// An ordered, cycle-free route from a starting container to the target
/// class. Elements alternate vertex, edge, vertex, … starting and ending
/// on a vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPath {
    pub elements: Vec<PathElement>,
}

impl AttackPath {
    /// Number of edges traversed.
    pub fn hops(&self) -> usize {
        self.elements.len() / 2
    }

    pub fn start(&self) -> Option<&Vertex> {
        match self.elements.first() {
            Some(PathElement::Vertex(v)) => Some(v),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&Vertex> {
        match self.elements.last() {
            Some(PathElement::Vertex(v)) => Some(v),
            _ => None,
        }
    }

    /// The attack profile: the alternating vertex/edge label sequence with
    /// no instance data, e.g.
    /// `Container-->CONTAINER_ATTACH-->Pod-->POD_EXEC-->Node`.
    pub fn profile(&self) -> String {
        self.elements
            .iter()
            .map(PathElement::label)
            .collect::<Vec<_>>()
            .join("-->")
    }
}

/// Aggregated path shape with the number of distinct containers sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProfile {
    pub profile: String,
    pub containers: usize,
}

/// Existence-check result, deduplicated by image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerableContainer {
    pub name: String,
    pub namespace: String,
    pub image: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubepath_graph::VertexId;
    use serde_json::json;

    fn vertex(id: i64, class: &str) -> Vertex {
        let mut properties = serde_json::Map::new();
        properties.insert("class".into(), json!(class));
        Vertex {
            id: VertexId(id),
            label: class.to_string(),
            properties,
        }
    }

    fn edge(label: &str, out: i64, r#in: i64) -> GraphEdge {
        GraphEdge {
            id: format!("{out}-{in}", r#in = r#in),
            label: label.to_string(),
            out_v: VertexId(out),
            in_v: VertexId(r#in),
            properties: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_profile_alternates_labels() {
        let path = AttackPath {
            elements: vec![
                PathElement::Vertex(vertex(1, "Container")),
                PathElement::Edge(edge("CONTAINER_ATTACH", 1, 2)),
                PathElement::Vertex(vertex(2, "Pod")),
                PathElement::Edge(edge("POD_EXEC", 2, 3)),
                PathElement::Vertex(vertex(3, "Node")),
            ],
        };
        assert_eq!(
            path.profile(),
            "Container-->CONTAINER_ATTACH-->Pod-->POD_EXEC-->Node"
        );
        assert_eq!(path.hops(), 2);
        assert_eq!(path.start().unwrap().id, VertexId(1));
        assert_eq!(path.target().unwrap().id, VertexId(3));
    }
}

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

//! Builder registry.
//!
//! An explicit value constructed at startup and passed by reference into
//! the pipeline — no process-wide singleton, so concurrent runs in one
//! process never share registration state. Registration partitions by
//! builder kind; a duplicate label within a partition is a programming
//! error and fails immediately.

use std::sync::Arc;

use kubepath_core::{KubepathError, Result};

use crate::builder::{Builder, BuilderKind};
use crate::edges::{
    ContainerAttach, IdentityAssume, PermissionDiscover, PodAttach, PodExec, PodPatch, RoleBind,
    TokenSteal, VolumeAccess, VolumeDiscover,
};
use crate::vertices::{
    ContainerVertex, IdentityVertex, NodeVertex, PermissionSetVertex, PodVertex, VolumeVertex,
};

pub struct BuilderRegistry {
    vertices: Vec<Arc<dyn Builder>>,
    simple: Vec<Arc<dyn Builder>>,
    mutating: Vec<Arc<dyn Builder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            simple: Vec::new(),
            mutating: Vec::new(),
        }
    }

    /// Registry loaded with every builder the pipeline ships.
    pub fn with_default_builders() -> Result<Self> {
        let mut registry = Self::new();

        registry.register(Arc::new(NodeVertex))?;
        registry.register(Arc::new(PodVertex))?;
        registry.register(Arc::new(ContainerVertex))?;
        registry.register(Arc::new(VolumeVertex))?;
        registry.register(Arc::new(IdentityVertex))?;
        registry.register(Arc::new(PermissionSetVertex))?;

        registry.register(Arc::new(ContainerAttach))?;
        registry.register(Arc::new(PodAttach))?;
        registry.register(Arc::new(VolumeDiscover))?;
        registry.register(Arc::new(VolumeAccess))?;
        registry.register(Arc::new(IdentityAssume))?;
        registry.register(Arc::new(PermissionDiscover))?;
        registry.register(Arc::new(PodExec))?;
        registry.register(Arc::new(PodPatch))?;
        registry.register(Arc::new(RoleBind))?;

        registry.register(Arc::new(TokenSteal))?;

        Ok(registry)
    }

    pub fn register(&mut self, builder: Arc<dyn Builder>) -> Result<()> {
        let partition = match builder.kind() {
            BuilderKind::Vertex => &mut self.vertices,
            BuilderKind::SimpleEdge => &mut self.simple,
            BuilderKind::MutatingEdge => &mut self.mutating,
        };
        if partition.iter().any(|b| b.label() == builder.label()) {
            return Err(KubepathError::Collision {
                label: builder.label().to_string(),
            });
        }
        partition.push(builder);
        Ok(())
    }

    pub fn vertices(&self) -> &[Arc<dyn Builder>] {
        &self.vertices
    }

    pub fn simple_edges(&self) -> &[Arc<dyn Builder>] {
        &self.simple
    }

    pub fn mutating_edges(&self) -> &[Arc<dyn Builder>] {
        &self.mutating
    }

    pub fn len(&self) -> usize {
        self.vertices.len() + self.simple.len() + self.mutating.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

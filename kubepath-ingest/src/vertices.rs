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

//! Vertex builders.
//!
//! One builder per vertex class. Each streams its collection, mirrors
//! `storeID` (the `class` mirror is stamped by the traversal generator)
//! and queues the cache entries the edge passes resolve against.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use kubepath_core::{
    keys, CacheShard, ContainerDoc, IdentityDoc, NodeDoc, PermissionSetDoc, PodDoc, Result,
    VolumeDoc, WriteMode,
};
use kubepath_graph::{input, vertex_class, BulkMutation, TraversalInput, TraversalRequest};
use kubepath_store::{decode_record, Collection, Document, Filter, StoreProvider};

use crate::builder::{forward_stream, Builder, BuilderKind, Cache, RunContext, VERTEX_BATCH};

/// Identity every node process runs as; resolved once per run before any
/// builder streams.
pub const DEFAULT_NODE_IDENTITY_NAME: &str = "system:nodes";

/// Cache key the resolved default node identity is queued under. No real
/// identity key can collide: identity keys always contain a `#`.
pub const DEFAULT_NODE_IDENTITY_KEY: &str = "__node-default";

pub struct NodeVertex;

#[async_trait]
impl Builder for NodeVertex {
    fn label(&self) -> &'static str {
        vertex_class::NODE
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::Nodes, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let node: NodeDoc = decode_record(doc)?;
        cache.queue(
            CacheShard::Node,
            keys::node(&node.name),
            node.id,
            WriteMode::Overwrite,
        )?;

        let mut row = input(vec![
            ("storeID", json!(node.id.to_hex())),
            ("name", json!(node.name)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ]);
        if let Some(identity) = cache.get(CacheShard::Identity, DEFAULT_NODE_IDENTITY_KEY) {
            row.insert("nodeIdentity".into(), json!(identity.to_hex()));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

pub struct PodVertex;

#[async_trait]
impl Builder for PodVertex {
    fn label(&self) -> &'static str {
        vertex_class::POD
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::Pods, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let pod: PodDoc = decode_record(doc)?;
        let mut row = input(vec![
            ("storeID", json!(pod.id.to_hex())),
            ("name", json!(pod.name)),
            ("namespace", json!(pod.namespace)),
            ("sharedProcessNamespace", json!(pod.share_process_namespace)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ]);
        if let Some(node) = &pod.node_name {
            row.insert("node".into(), json!(node));
        }
        if let Some(sa) = &pod.service_account {
            row.insert("serviceAccount".into(), json!(sa));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

pub struct ContainerVertex;

#[async_trait]
impl Builder for ContainerVertex {
    fn label(&self) -> &'static str {
        vertex_class::CONTAINER
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::Containers, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let container: ContainerDoc = decode_record(doc)?;
        cache.queue(
            CacheShard::Container,
            keys::container(&container.namespace, &container.pod_name, &container.name),
            container.id,
            WriteMode::Overwrite,
        )?;

        let mut row = input(vec![
            ("storeID", json!(container.id.to_hex())),
            ("name", json!(container.name)),
            ("pod", json!(container.pod_name)),
            ("namespace", json!(container.namespace)),
            ("image", json!(container.image)),
            ("privileged", json!(container.privileged)),
            ("hostPid", json!(container.host_pid)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ]);
        if let Some(app) = &container.app {
            row.insert("app".into(), json!(app));
        }
        if let Some(team) = &container.team {
            row.insert("team".into(), json!(team));
        }
        if let Some(uid) = container.run_as_user {
            row.insert("runAsUser".into(), json!(uid));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

pub struct VolumeVertex;

#[async_trait]
impl Builder for VolumeVertex {
    fn label(&self) -> &'static str {
        vertex_class::VOLUME
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::Volumes, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let volume: VolumeDoc = decode_record(doc)?;
        let mut row = input(vec![
            ("storeID", json!(volume.id.to_hex())),
            ("name", json!(volume.name)),
            ("namespace", json!(volume.namespace)),
            ("type", json!(volume.volume_type)),
            ("readOnly", json!(volume.read_only)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ]);
        if let Some(path) = &volume.source_path {
            row.insert("sourcePath".into(), json!(path));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

pub struct IdentityVertex;

#[async_trait]
impl Builder for IdentityVertex {
    fn label(&self) -> &'static str {
        vertex_class::IDENTITY
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::Identities, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let identity: IdentityDoc = decode_record(doc)?;
        cache.queue(
            CacheShard::Identity,
            keys::identity(&identity.namespace, &identity.name),
            identity.id,
            WriteMode::Overwrite,
        )?;

        Ok(Some(input(vec![
            ("storeID", json!(identity.id.to_hex())),
            ("name", json!(identity.name)),
            ("namespace", json!(identity.namespace)),
            ("type", json!(identity.kind)),
            ("isNamespaced", json!(identity.is_namespaced)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ])))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

pub struct PermissionSetVertex;

#[async_trait]
impl Builder for PermissionSetVertex {
    fn label(&self) -> &'static str {
        vertex_class::PERMISSION_SET
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::Vertex
    }

    fn batch_size(&self) -> usize {
        VERTEX_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let docs = store.find(Collection::PermissionSets, Filter::new()).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let permission_set: PermissionSetDoc = decode_record(doc)?;
        // The role shard maps role coordinates to the permission-set
        // vertex representing the granted role; ROLE_BIND joins on it.
        cache.queue(
            CacheShard::Role,
            keys::role(&permission_set.namespace, &permission_set.role_name),
            permission_set.id,
            WriteMode::Overwrite,
        )?;

        Ok(Some(input(vec![
            ("storeID", json!(permission_set.id.to_hex())),
            ("name", json!(permission_set.name)),
            ("role", json!(permission_set.role_name)),
            ("namespace", json!(permission_set.namespace)),
            ("isNamespaced", json!(permission_set.is_namespaced)),
            ("runID", json!(ctx.run_id)),
            ("cluster", json!(ctx.cluster)),
        ])))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::vertex(self.label(), inserts).into_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubepath_core::{CacheReader, MemCache, ObjectId, Runtime};

    fn ctx() -> RunContext {
        RunContext::new("test-cluster")
    }

    fn runtime() -> Runtime {
        Runtime {
            run_id: "r1".into(),
            cluster: "test-cluster".into(),
        }
    }

    #[test]
    fn test_node_process_caches_and_mirrors() {
        let cache = MemCache::new();
        let node = NodeDoc {
            id: ObjectId::generate(),
            name: "node-1".into(),
            runtime: runtime(),
        };
        let doc = match serde_json::to_value(&node).unwrap() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        let row = NodeVertex.process(&ctx(), &cache, doc).unwrap().unwrap();
        assert_eq!(row["storeID"], json!(node.id.to_hex()));
        assert_eq!(cache.get(CacheShard::Node, "node-1"), Some(node.id));
        // No default node identity resolved: property absent.
        assert!(row.get("nodeIdentity").is_none());
    }

    #[test]
    fn test_pod_process_skips_absent_optionals() {
        let cache = MemCache::new();
        let pod = PodDoc {
            id: ObjectId::generate(),
            name: "web-0".into(),
            namespace: "default".into(),
            node_name: None,
            service_account: None,
            share_process_namespace: false,
            runtime: runtime(),
        };
        let doc = match serde_json::to_value(&pod).unwrap() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        let row = PodVertex.process(&ctx(), &cache, doc).unwrap().unwrap();
        assert!(row.get("node").is_none());
        assert!(row.get("serviceAccount").is_none());
        assert_eq!(row["namespace"], json!("default"));
    }

    #[test]
    fn test_permission_set_process_populates_role_shard() {
        let cache = MemCache::new();
        let permission_set = PermissionSetDoc {
            id: ObjectId::generate(),
            role_id: ObjectId::generate(),
            role_binding_id: ObjectId::generate(),
            name: "exec::rb".into(),
            role_name: "exec".into(),
            namespace: "default".into(),
            is_namespaced: true,
            rules: vec![],
            runtime: runtime(),
        };
        let doc = match serde_json::to_value(&permission_set).unwrap() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        PermissionSetVertex
            .process(&ctx(), &cache, doc)
            .unwrap()
            .unwrap();
        assert_eq!(
            cache.get(CacheShard::Role, "default#exec"),
            Some(permission_set.id)
        );
    }
}

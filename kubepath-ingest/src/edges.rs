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

//! Edge builders.
//!
//! Simple edges connect vertices created by the vertex pass, joining
//! endpoints through the `storeID` mirror (or a class fanout for
//! permission-driven edges). The one mutating edge, TOKEN_STEAL, also
//! creates its derived identity vertex and therefore runs in the strictly
//! later mutating pass.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use kubepath_core::{
    keys, CacheShard, KubepathError, ObjectId, PermissionSetDoc, PodDoc, Result, VolumeDoc,
    WriteMode,
};
use kubepath_core::entity::{identity_kind, volume_type};
use kubepath_graph::{
    input, vertex_class, BulkMutation, TraversalInput, TraversalRequest, VertexJoin,
};
use kubepath_store::{
    decode_record, Collection, Document, Filter, PermissionSetBindingRow, PipelineStage,
    RoleBindTargetRow, StoreProvider, SubjectGrantRow,
};

use crate::builder::{
    forward_stream, send_record, Builder, BuilderKind, Cache, RunContext, EDGE_BATCH,
    FANOUT_EDGE_BATCH, JOIN_EDGE_BATCH,
};

fn store_id_join(field: &str) -> VertexJoin {
    VertexJoin::StoreId {
        field: field.to_string(),
    }
}

fn run_fields(ctx: &RunContext) -> Vec<(&'static str, serde_json::Value)> {
    vec![
        ("runID", json!(ctx.run_id)),
        ("cluster", json!(ctx.cluster)),
    ]
}

/// Container escapes into its parent pod's context.
pub struct ContainerAttach;

#[async_trait]
impl Builder for ContainerAttach {
    fn label(&self) -> &'static str {
        "CONTAINER_ATTACH"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
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
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let container: kubepath_core::ContainerDoc = decode_record(doc)?;
        let mut row = input(run_fields(ctx));
        row.insert("container".into(), json!(container.id.to_hex()));
        row.insert("pod".into(), json!(container.pod_id.to_hex()));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("container"),
            store_id_join("pod"),
            inserts,
        )
        .into_request()
    }
}

/// Pod compromise lands on the node running it.
pub struct PodAttach;

#[async_trait]
impl Builder for PodAttach {
    fn label(&self) -> &'static str {
        "POD_ATTACH"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
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
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let pod: PodDoc = decode_record(doc)?;
        // Unscheduled pods have no node yet.
        let Some(node_name) = &pod.node_name else {
            return Ok(None);
        };
        let Some(node) = cache.get(CacheShard::Node, &keys::node(node_name)) else {
            debug!(pod = %pod.name, node = %node_name, "pod scheduled on unknown node, skipping");
            return Ok(None);
        };

        let mut row = input(run_fields(ctx));
        row.insert("pod".into(), json!(pod.id.to_hex()));
        row.insert("node".into(), json!(node.to_hex()));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("pod"),
            store_id_join("node"),
            inserts,
        )
        .into_request()
    }
}

/// Container can enumerate the volumes mounted into it.
pub struct VolumeDiscover;

#[async_trait]
impl Builder for VolumeDiscover {
    fn label(&self) -> &'static str {
        "VOLUME_DISCOVER"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
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
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let volume: VolumeDoc = decode_record(doc)?;
        let key = keys::container(&volume.namespace, &volume.pod_name, &volume.container_name);
        let Some(container) = cache.get(CacheShard::Container, &key) else {
            debug!(volume = %volume.name, container = %key, "volume mount without container, skipping");
            return Ok(None);
        };

        let mut row = input(run_fields(ctx));
        row.insert("container".into(), json!(container.to_hex()));
        row.insert("volume".into(), json!(volume.id.to_hex()));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("container"),
            store_id_join("volume"),
            inserts,
        )
        .into_request()
    }
}

/// Host-path volumes give write access on the backing node.
pub struct VolumeAccess;

#[async_trait]
impl Builder for VolumeAccess {
    fn label(&self) -> &'static str {
        "VOLUME_ACCESS"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let filter = Filter::new().eq("volume_type", volume_type::HOST_PATH);
        let docs = store.find(Collection::Volumes, filter).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let volume: VolumeDoc = decode_record(doc)?;
        let mut row = input(run_fields(ctx));
        row.insert("volume".into(), json!(volume.id.to_hex()));
        row.insert("node".into(), json!(volume.node_id.to_hex()));
        if let Some(path) = &volume.source_path {
            row.insert("sourcePath".into(), json!(path));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("volume"),
            store_id_join("node"),
            inserts,
        )
        .into_request()
    }
}

/// Pod assumes the identity of its mounted service account.
pub struct IdentityAssume;

#[async_trait]
impl Builder for IdentityAssume {
    fn label(&self) -> &'static str {
        "IDENTITY_ASSUME"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
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
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let pod: PodDoc = decode_record(doc)?;
        // No service account is a legitimate state, not an error.
        let Some(account) = &pod.service_account else {
            return Ok(None);
        };
        let key = keys::identity(&pod.namespace, account);
        let Some(identity) = cache.get(CacheShard::Identity, &key) else {
            debug!(pod = %pod.name, identity = %key, "service account without identity record, skipping");
            return Ok(None);
        };

        // Later passes resolve the pod's identity through this entry.
        cache.queue(
            CacheShard::PodIdentity,
            keys::pod_identity(&pod.namespace, &pod.name),
            identity,
            WriteMode::Overwrite,
        )?;

        let mut row = input(run_fields(ctx));
        row.insert("pod".into(), json!(pod.id.to_hex()));
        row.insert("identity".into(), json!(identity.to_hex()));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("pod"),
            store_id_join("identity"),
            inserts,
        )
        .into_request()
    }
}

/// Identity discovers the permission sets granted to it through role
/// bindings. One streamed record per binding subject.
pub struct PermissionDiscover;

#[async_trait]
impl Builder for PermissionDiscover {
    fn label(&self) -> &'static str {
        "PERMISSION_DISCOVER"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        JOIN_EDGE_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let pipeline = vec![
            PipelineStage::Lookup {
                from: Collection::RoleBindings,
                local_field: "role_binding_id".into(),
                foreign_field: "_id".into(),
                as_field: "binding".into(),
            },
            PipelineStage::Unwind("binding".into()),
        ];
        let mut docs = store.aggregate(Collection::PermissionSets, pipeline).await?;

        loop {
            let next = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(KubepathError::Cancelled),
                next = docs.next() => next,
            };
            let Some(doc) = next else {
                return Ok(());
            };
            let row: PermissionSetBindingRow = decode_record(doc?)?;
            for subject in &row.binding.subjects {
                let grant = SubjectGrantRow {
                    permission_set_id: row.id,
                    namespace: row.namespace.clone(),
                    subject_kind: subject.kind.clone(),
                    subject_name: subject.name.clone(),
                    subject_namespace: subject.namespace.clone(),
                };
                let doc = match serde_json::to_value(&grant)? {
                    serde_json::Value::Object(map) => map,
                    _ => unreachable!("row structs serialize to objects"),
                };
                send_record(ctx, &tx, doc).await?;
            }
        }
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let grant: SubjectGrantRow = decode_record(doc)?;
        if grant.subject_kind != identity_kind::SERVICE_ACCOUNT
            && grant.subject_kind != identity_kind::USER
            && grant.subject_kind != identity_kind::GROUP
        {
            return Ok(None);
        }
        let key = keys::identity(&grant.subject_namespace, &grant.subject_name);
        let Some(identity) = cache.get(CacheShard::Identity, &key) else {
            debug!(identity = %key, "binding subject without identity record, skipping");
            return Ok(None);
        };

        let mut row = input(run_fields(ctx));
        row.insert("identity".into(), json!(identity.to_hex()));
        row.insert(
            "permission_set".into(),
            json!(grant.permission_set_id.to_hex()),
        );
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("identity"),
            store_id_join("permission_set"),
            inserts,
        )
        .into_request()
    }
}

fn grants(permission_set: &PermissionSetDoc, resource: &str, verb: &str) -> bool {
    permission_set
        .rules
        .iter()
        .any(|rule| rule.has_resource(resource) && rule.has_verb(verb))
}

/// Permission set allowing exec reaches every pod in its scope. One source
/// record fans out to a whole namespace (or the cluster), hence the
/// single-digit batch size.
pub struct PodExec;

#[async_trait]
impl Builder for PodExec {
    fn label(&self) -> &'static str {
        "POD_EXEC"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        FANOUT_EDGE_BATCH
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
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let permission_set: PermissionSetDoc = decode_record(doc)?;
        if !grants(&permission_set, "pods/exec", "create") {
            return Ok(None);
        }

        let mut row = input(run_fields(ctx));
        row.insert(
            "permission_set".into(),
            json!(permission_set.id.to_hex()),
        );
        if permission_set.is_namespaced {
            row.insert("namespace".into(), json!(permission_set.namespace));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("permission_set"),
            VertexJoin::Class {
                class: vertex_class::POD.into(),
                namespace_field: Some("namespace".into()),
            },
            inserts,
        )
        .into_request()
    }
}

/// Permission set allowing pod patch reaches every pod in its scope.
pub struct PodPatch;

#[async_trait]
impl Builder for PodPatch {
    fn label(&self) -> &'static str {
        "POD_PATCH"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        FANOUT_EDGE_BATCH
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
        _cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let permission_set: PermissionSetDoc = decode_record(doc)?;
        if !grants(&permission_set, "pods", "patch") {
            return Ok(None);
        }

        let mut row = input(run_fields(ctx));
        row.insert(
            "permission_set".into(),
            json!(permission_set.id.to_hex()),
        );
        if permission_set.is_namespaced {
            row.insert("namespace".into(), json!(permission_set.namespace));
        }
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("permission_set"),
            VertexJoin::Class {
                class: vertex_class::POD.into(),
                namespace_field: Some("namespace".into()),
            },
            inserts,
        )
        .into_request()
    }
}

/// Permission set that can bind named roles escalates to the permission
/// sets representing them. One streamed record per bindable role name.
pub struct RoleBind;

#[async_trait]
impl Builder for RoleBind {
    fn label(&self) -> &'static str {
        "ROLE_BIND"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::SimpleEdge
    }

    fn batch_size(&self) -> usize {
        FANOUT_EDGE_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let mut docs = store.find(Collection::PermissionSets, Filter::new()).await?;

        loop {
            let next = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(KubepathError::Cancelled),
                next = docs.next() => next,
            };
            let Some(doc) = next else {
                return Ok(());
            };
            let permission_set: PermissionSetDoc = decode_record(doc?)?;
            for rule in &permission_set.rules {
                if !rule.has_verb("bind")
                    || !(rule.has_resource("roles") || rule.has_resource("clusterroles"))
                {
                    continue;
                }
                for target_role in &rule.resource_names {
                    let target = RoleBindTargetRow {
                        permission_set_id: permission_set.id,
                        namespace: permission_set.namespace.clone(),
                        target_role: target_role.clone(),
                    };
                    let doc = match serde_json::to_value(&target)? {
                        serde_json::Value::Object(map) => map,
                        _ => unreachable!("row structs serialize to objects"),
                    };
                    send_record(ctx, &tx, doc).await?;
                }
            }
        }
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let target: RoleBindTargetRow = decode_record(doc)?;
        let key = keys::role(&target.namespace, &target.target_role);
        let Some(bound) = cache.get(CacheShard::Role, &key) else {
            debug!(role = %key, "bindable role without permission set, skipping");
            return Ok(None);
        };

        let mut row = input(run_fields(ctx));
        row.insert(
            "permission_set".into(),
            json!(target.permission_set_id.to_hex()),
        );
        row.insert("target".into(), json!(bound.to_hex()));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge(
            self.label(),
            store_id_join("permission_set"),
            store_id_join("target"),
            inserts,
        )
        .into_request()
    }
}

/// A projected service-account token inside a volume can be stolen. The
/// stolen credential is modeled as a derived Identity vertex created by
/// the same mutation, so this builder runs in the mutating pass.
pub struct TokenSteal;

#[async_trait]
impl Builder for TokenSteal {
    fn label(&self) -> &'static str {
        "TOKEN_STEAL"
    }

    fn kind(&self) -> BuilderKind {
        BuilderKind::MutatingEdge
    }

    fn batch_size(&self) -> usize {
        EDGE_BATCH
    }

    async fn stream(
        &self,
        ctx: &RunContext,
        store: &dyn StoreProvider,
        tx: mpsc::Sender<Document>,
    ) -> Result<()> {
        let filter = Filter::new().eq("volume_type", volume_type::PROJECTED);
        let docs = store.find(Collection::Volumes, filter).await?;
        forward_stream(ctx, docs, tx).await
    }

    fn process(
        &self,
        ctx: &RunContext,
        cache: &dyn Cache,
        doc: Document,
    ) -> Result<Option<TraversalInput>> {
        let volume: VolumeDoc = decode_record(doc)?;
        let key = keys::pod_identity(&volume.namespace, &volume.pod_name);
        // A pod with no identity has no token to steal.
        let Some(source_identity) = cache.get(CacheShard::PodIdentity, &key) else {
            return Ok(None);
        };

        // The derived vertex id is write-once per volume; a second write
        // means the volume collection holds duplicate records.
        let derived = ObjectId::generate();
        cache.queue(
            CacheShard::ObjectIdMap,
            keys::object_id(&volume.id),
            derived,
            WriteMode::TestAndSet,
        )?;

        let mut row = input(run_fields(ctx));
        row.insert("volume".into(), json!(volume.id.to_hex()));
        row.insert("sourceIdentity".into(), json!(source_identity.to_hex()));
        row.insert("identity_storeID".into(), json!(derived.to_hex()));
        row.insert(
            "identity_name".into(),
            json!(format!("token::{}/{}", volume.namespace, volume.pod_name)),
        );
        row.insert("identity_namespace".into(), json!(volume.namespace));
        row.insert("identity_type".into(), json!("Token"));
        row.insert("identity_runID".into(), json!(ctx.run_id));
        row.insert("identity_cluster".into(), json!(ctx.cluster));
        Ok(Some(row))
    }

    fn mutation(&self, inserts: Vec<TraversalInput>) -> TraversalRequest {
        BulkMutation::edge_with_vertex(
            self.label(),
            store_id_join("volume"),
            vertex_class::IDENTITY,
            "identity_",
            inserts,
        )
        .into_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubepath_core::{CacheReader, CacheWriter, MemCache, RuleDoc, Runtime};

    fn ctx() -> RunContext {
        RunContext::new("test-cluster")
    }

    fn runtime() -> Runtime {
        Runtime {
            run_id: "r1".into(),
            cluster: "test-cluster".into(),
        }
    }

    fn to_doc<T: serde::Serialize>(record: &T) -> Document {
        match serde_json::to_value(record).unwrap() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn pod(name: &str, node: Option<&str>, account: Option<&str>) -> PodDoc {
        PodDoc {
            id: ObjectId::generate(),
            name: name.into(),
            namespace: "default".into(),
            node_name: node.map(String::from),
            service_account: account.map(String::from),
            share_process_namespace: false,
            runtime: runtime(),
        }
    }

    #[test]
    fn test_pod_attach_skips_unscheduled_pod() {
        let cache = MemCache::new();
        let result = PodAttach
            .process(&ctx(), &cache, to_doc(&pod("pending", None, None)))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_pod_attach_resolves_node_through_cache() {
        let cache = MemCache::new();
        let node_id = ObjectId::generate();
        cache
            .queue(
                CacheShard::Node,
                keys::node("node-1"),
                node_id,
                WriteMode::Overwrite,
            )
            .unwrap();

        let row = PodAttach
            .process(&ctx(), &cache, to_doc(&pod("web", Some("node-1"), None)))
            .unwrap()
            .unwrap();
        assert_eq!(row["node"], json!(node_id.to_hex()));
    }

    #[test]
    fn test_identity_assume_missing_identity_is_skip_not_error() {
        let cache = MemCache::new();
        let result = IdentityAssume
            .process(&ctx(), &cache, to_doc(&pod("web", None, Some("ghost-sa"))))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_identity_assume_populates_pod_identity_shard() {
        let cache = MemCache::new();
        let identity = ObjectId::generate();
        cache
            .queue(
                CacheShard::Identity,
                keys::identity("default", "app-sa"),
                identity,
                WriteMode::Overwrite,
            )
            .unwrap();

        let row = IdentityAssume
            .process(&ctx(), &cache, to_doc(&pod("web", None, Some("app-sa"))))
            .unwrap()
            .unwrap();
        assert_eq!(row["identity"], json!(identity.to_hex()));
        assert_eq!(
            cache.get(CacheShard::PodIdentity, "default#web"),
            Some(identity)
        );
    }

    fn exec_permission_set(namespaced: bool) -> PermissionSetDoc {
        PermissionSetDoc {
            id: ObjectId::generate(),
            role_id: ObjectId::generate(),
            role_binding_id: ObjectId::generate(),
            name: "exec::rb".into(),
            role_name: "exec".into(),
            namespace: "default".into(),
            is_namespaced: namespaced,
            rules: vec![RuleDoc {
                api_groups: vec!["".into()],
                resources: vec!["pods/exec".into()],
                resource_names: vec![],
                verbs: vec!["create".into()],
            }],
            runtime: runtime(),
        }
    }

    #[test]
    fn test_pod_exec_namespaced_row_carries_namespace() {
        let cache = MemCache::new();
        let row = PodExec
            .process(&ctx(), &cache, to_doc(&exec_permission_set(true)))
            .unwrap()
            .unwrap();
        assert_eq!(row["namespace"], json!("default"));
    }

    #[test]
    fn test_pod_exec_cluster_scoped_row_omits_namespace() {
        let cache = MemCache::new();
        let row = PodExec
            .process(&ctx(), &cache, to_doc(&exec_permission_set(false)))
            .unwrap()
            .unwrap();
        assert!(row.get("namespace").is_none());
    }

    #[test]
    fn test_pod_exec_without_grant_is_skipped() {
        let cache = MemCache::new();
        let mut permission_set = exec_permission_set(true);
        permission_set.rules[0].resources = vec!["configmaps".into()];
        let result = PodExec
            .process(&ctx(), &cache, to_doc(&permission_set))
            .unwrap();
        assert!(result.is_none());
    }

    fn projected_volume(name: &str) -> VolumeDoc {
        VolumeDoc {
            id: ObjectId::generate(),
            pod_id: ObjectId::generate(),
            node_id: ObjectId::generate(),
            name: name.into(),
            namespace: "default".into(),
            pod_name: "web".into(),
            container_name: "app".into(),
            volume_type: volume_type::PROJECTED.into(),
            source_path: None,
            read_only: true,
            runtime: runtime(),
        }
    }

    #[test]
    fn test_token_steal_requires_pod_identity() {
        let cache = MemCache::new();
        let result = TokenSteal
            .process(&ctx(), &cache, to_doc(&projected_volume("kube-api-access")))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_token_steal_derives_identity_vertex_fields() {
        let cache = MemCache::new();
        let identity = ObjectId::generate();
        cache
            .queue(
                CacheShard::PodIdentity,
                keys::pod_identity("default", "web"),
                identity,
                WriteMode::Overwrite,
            )
            .unwrap();

        let volume = projected_volume("kube-api-access");
        let row = TokenSteal
            .process(&ctx(), &cache, to_doc(&volume))
            .unwrap()
            .unwrap();
        assert_eq!(row["volume"], json!(volume.id.to_hex()));
        assert_eq!(row["sourceIdentity"], json!(identity.to_hex()));
        assert_eq!(row["identity_name"], json!("token::default/web"));
        // Derived id recorded write-once in the object-id mapping.
        let derived = cache
            .get(CacheShard::ObjectIdMap, &keys::object_id(&volume.id))
            .unwrap();
        assert_eq!(row["identity_storeID"], json!(derived.to_hex()));
    }

    #[test]
    fn test_token_steal_duplicate_volume_record_is_hard_error() {
        let cache = MemCache::new();
        let identity = ObjectId::generate();
        cache
            .queue(
                CacheShard::PodIdentity,
                keys::pod_identity("default", "web"),
                identity,
                WriteMode::Overwrite,
            )
            .unwrap();

        let volume = projected_volume("kube-api-access");
        TokenSteal
            .process(&ctx(), &cache, to_doc(&volume))
            .unwrap()
            .unwrap();
        let err = TokenSteal
            .process(&ctx(), &cache, to_doc(&volume))
            .unwrap_err();
        assert!(matches!(err, KubepathError::CacheOverwrite { .. }));
    }
}

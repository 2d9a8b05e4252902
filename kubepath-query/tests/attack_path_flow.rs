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

//! Whole-stack test: a cluster fixture ingested from the memory store into
//! the memory graph, then queried for attack paths and re-hydrated through
//! the HexTuple codec.

use std::sync::Arc;

use kubepath_core::{
    ContainerDoc, GraphConfig, IngestConfig, MemCache, NodeDoc, ObjectId, PodDoc, QueryConfig,
    Runtime,
};
use kubepath_graph::{GraphDriver, MemoryConnector, MemoryGraph};
use kubepath_ingest::{BuilderRegistry, IngestPipeline, RunContext};
use kubepath_query::{decode_hextuples, encode_hextuples, AttackPathEngine, PathFilter};
use kubepath_store::{Collection, MemoryStore, StoreProvider};

fn runtime() -> Runtime {
    Runtime {
        run_id: "flow-run".into(),
        cluster: "test-cluster".into(),
    }
}

fn pod(name: &str, namespace: &str) -> PodDoc {
    PodDoc {
        id: ObjectId::generate(),
        name: name.into(),
        namespace: namespace.into(),
        node_name: Some("node-1".into()),
        service_account: None,
        share_process_namespace: false,
        runtime: runtime(),
    }
}

fn container(name: &str, pod: &PodDoc, node_id: ObjectId, image: &str) -> ContainerDoc {
    ContainerDoc {
        id: ObjectId::generate(),
        pod_id: pod.id,
        node_id,
        name: name.into(),
        pod_name: pod.name.clone(),
        namespace: pod.namespace.clone(),
        image: image.into(),
        app: None,
        team: None,
        privileged: false,
        host_pid: false,
        run_as_user: None,
        runtime: runtime(),
    }
}

/// One node, two default-namespace containers in one pod, and one
/// kube-system container in its own pod. Every container escapes through
/// Container -> Pod -> Node.
async fn populated_graph() -> Arc<MemoryGraph> {
    let store = Arc::new(MemoryStore::new());

    let node_id = ObjectId::generate();
    store
        .insert(
            Collection::Nodes,
            &NodeDoc {
                id: node_id,
                name: "node-1".into(),
                runtime: runtime(),
            },
        )
        .unwrap();

    let web = pod("web-0", "default");
    let system = pod("proxy-0", "kube-system");
    store.insert(Collection::Pods, &web).unwrap();
    store.insert(Collection::Pods, &system).unwrap();

    store
        .insert(
            Collection::Containers,
            &container("web", &web, node_id, "registry.local/web:1"),
        )
        .unwrap();
    store
        .insert(
            Collection::Containers,
            &container("sidecar", &web, node_id, "registry.local/sidecar:1"),
        )
        .unwrap();
    store
        .insert(
            Collection::Containers,
            &container("proxy", &system, node_id, "registry.local/proxy:1"),
        )
        .unwrap();

    let graph = Arc::new(MemoryGraph::new());
    let driver = Arc::new(GraphDriver::new(
        MemoryConnector::new(Arc::clone(&graph)),
        &GraphConfig::default(),
    ));
    let pipeline = IngestPipeline::new(
        store as Arc<dyn StoreProvider>,
        driver,
        Arc::new(MemCache::new()),
        IngestConfig::default(),
    );
    let registry = BuilderRegistry::with_default_builders().unwrap();
    let ctx = RunContext::new("test-cluster");
    pipeline.run(&registry, &ctx).await.unwrap();
    graph
}

fn engine_over(graph: Arc<MemoryGraph>) -> AttackPathEngine<MemoryConnector> {
    let driver = Arc::new(GraphDriver::new(
        MemoryConnector::new(graph),
        &GraphConfig::default(),
    ));
    AttackPathEngine::new(driver, QueryConfig::default())
}

#[tokio::test]
async fn test_namespace_filter_counts_distinct_containers_per_profile() {
    let graph = populated_graph().await;
    let engine = engine_over(graph);

    let filter = PathFilter::new().namespace("default").target_class("Node");
    let profiles = engine.attack_profiles(&filter).await.unwrap();

    assert_eq!(profiles.len(), 1);
    assert_eq!(
        profiles[0].profile,
        "Container-->CONTAINER_ATTACH-->Pod-->POD_ATTACH-->Node"
    );
    // Both default containers share the profile; kube-system is filtered out.
    assert_eq!(profiles[0].containers, 2);
}

#[tokio::test]
async fn test_excluded_namespaces_drop_system_paths() {
    let graph = populated_graph().await;
    let engine = engine_over(graph);

    let all = engine.attack_paths(&PathFilter::new()).await.unwrap();
    assert_eq!(all.len(), 3);

    let filter = PathFilter::new().exclude_namespace("kube-system");
    let paths = engine.attack_paths(&filter).await.unwrap();
    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert_eq!(
            path.start().unwrap().property_str("namespace"),
            Some("default")
        );
    }
}

#[tokio::test]
async fn test_materialized_path_survives_hextuple_round_trip() {
    let graph = populated_graph().await;
    let engine = engine_over(graph);

    let filter = PathFilter::new().namespace("kube-system");
    let paths = engine.attack_paths(&filter).await.unwrap();
    assert_eq!(paths.len(), 1);
    let path = &paths[0];
    assert_eq!(path.hops(), 2);

    let tuples = encode_hextuples(path);
    let entries = decode_hextuples(&tuples);

    // One chain entry per path element, in step order.
    assert_eq!(entries.len(), path.elements.len());
    assert_eq!(entries[0].context, "Container");
    assert_eq!(entries[2].context, "Pod");
    assert_eq!(entries[4].context, "Node");
    assert_eq!(
        entries[0].properties.get("image").and_then(|v| v.as_str()),
        Some("registry.local/proxy:1")
    );
    // Edge entries carry self-describing adjacency URNs.
    assert_eq!(entries[1].context, "CONTAINER_ATTACH");
    assert_eq!(
        entries[1].properties.get("out").and_then(|v| v.as_str()),
        Some(format!("urn:vertex:{}", path.start().unwrap().id).as_str())
    );
}

#[tokio::test]
async fn test_unmatched_filter_yields_no_result_everywhere() {
    let graph = populated_graph().await;
    let engine = engine_over(graph);

    let filter = PathFilter::new().namespace("missing");
    assert!(engine.attack_paths(&filter).await.unwrap().is_empty());
    assert!(engine.attack_profiles(&filter).await.unwrap().is_empty());
    assert!(engine
        .vulnerable_containers(&filter)
        .await
        .unwrap()
        .is_empty());
}

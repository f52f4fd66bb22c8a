//! Resource distributor tests.
//!
//! # Test Strategy
//!
//! 1. **List and watch**: a watch resumed from a list delivers every later change once
//! 2. **Registration**: capacity errors and disjoint store allocation
//! 3. **Watch protocol**: one watcher per client, required arguments
//! 4. **Ingestion**: duplicates, unroutable events, persistence outages
//! 5. **Concurrency**: list and watch racing an ingest stream

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corelib::{
    Error as CoreError, EventType, Location, LogicalNode, NodeEvent, Region, ResourcePartition,
    ResourceVersionMap,
};
use distributor::{DistributorConfig, DistributorError, FakeStore, ResourceDistributor};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const BJ1: Location = Location::new(Region::Beijing, ResourcePartition::RP1);
const SH2: Location = Location::new(Region::Shanghai, ResourcePartition::RP2);

fn distributor(config: DistributorConfig) -> (Arc<ResourceDistributor>, Arc<FakeStore>) {
    let store = Arc::new(FakeStore::new());
    let dis = ResourceDistributor::new(config, store.clone()).unwrap();
    (Arc::new(dis), store)
}

fn small_config() -> DistributorConfig {
    DistributorConfig {
        region_count: 2,
        partition_count: 2,
        virtual_nodes_per_partition: 10,
        ..Default::default()
    }
}

fn added_batch(location: Location, count: usize, first_rv: u64) -> Vec<NodeEvent> {
    (0..count)
        .map(|i| {
            let id = format!("{}-node-{i}", location.region);
            NodeEvent::added(LogicalNode::new(id, first_rv + i as u64, location))
        })
        .collect()
}

fn modified(node: &LogicalNode, rv: u64) -> NodeEvent {
    let mut node = node.clone();
    node.resource_version = rv.to_string();
    NodeEvent::modified(node)
}

async fn drain(rx: &mut mpsc::Receiver<NodeEvent>, quiet: Duration) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(quiet, rx.recv()).await {
        events.push(event);
    }
    events
}

// ============================================================================
// List and watch
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_then_watch_delivers_every_update_once() {
    let (dis, _) = distributor(DistributorConfig::default());
    let (ok, _) = dis.process_events(added_batch(BJ1, 10_000, 1)).await;
    assert!(ok);
    assert_eq!(dis.node_store().total_host_num(), 10_000);

    let client_id = dis.register_client(500).await.unwrap();
    let (nodes, rv0) = dis.list_nodes_for_client(&client_id).unwrap();
    assert!(nodes.len() >= 500);
    let listed_rv = rv0.get(&BJ1).unwrap();

    let updates: Vec<_> = (0..1_000)
        .map(|i| modified(&nodes[i % nodes.len()], 20_000 + i as u64))
        .collect();
    let (ok, _) = dis.process_events(updates).await;
    assert!(ok);

    let (tx, mut rx) = mpsc::channel(100);
    let (_stop, stop_rx) = oneshot::channel();
    dis.watch(&client_id, &rv0, tx, stop_rx).unwrap();

    let events = drain(&mut rx, Duration::from_millis(300)).await;
    assert_eq!(events.len(), 1_000);
    let mut last = listed_rv;
    for event in &events {
        assert_eq!(event.event_type, EventType::Modified);
        let rv = event.node.resource_version().unwrap();
        assert!(rv > last, "versions must increase within a location");
        last = rv;
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_rejects_requests_below_minimum() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;

    for requested in [0, 49, 50] {
        assert_eq!(
            dis.register_client(requested).await.unwrap_err(),
            DistributorError::HostRequestLessThanMinimal {
                requested,
                minimal: 50
            }
        );
    }
    assert_eq!(dis.client_count(), 0);
}

#[tokio::test]
async fn test_register_rejects_requests_over_total() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;

    assert_eq!(
        dis.register_client(201).await.unwrap_err(),
        DistributorError::HostRequestExceedLimit {
            requested: 201,
            total: 200
        }
    );
}

#[tokio::test]
async fn test_register_rejects_requests_over_free_capacity() {
    let (dis, _) = distributor(DistributorConfig::default());
    dis.process_events(added_batch(BJ1, 10_000, 1)).await;

    let first = dis.register_client(9_000).await.unwrap();
    let hosts: usize = dis
        .virtual_stores_for(&first)
        .unwrap()
        .iter()
        .map(|s| s.host_num())
        .sum();
    assert!(hosts >= 9_000);

    assert_eq!(
        dis.register_client(2_000).await.unwrap_err(),
        DistributorError::HostRequestExceedCapacity { requested: 2_000 }
    );
    assert_eq!(dis.client_count(), 1);
}

#[tokio::test]
async fn test_clients_get_disjoint_stores() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 300, 1)).await;
    dis.process_events(added_batch(SH2, 300, 1)).await;

    let a = dis.register_client(100).await.unwrap();
    let b = dis.register_client(100).await.unwrap();
    assert_ne!(a, b);

    let a_stores: Vec<_> = dis.virtual_stores_for(&a).unwrap().iter().map(|s| s.index()).collect();
    let b_stores: Vec<_> = dis.virtual_stores_for(&b).unwrap().iter().map(|s| s.index()).collect();
    assert!(a_stores.iter().all(|i| !b_stores.contains(i)));

    let (a_nodes, _) = dis.list_nodes_for_client(&a).unwrap();
    let (b_nodes, _) = dis.list_nodes_for_client(&b).unwrap();
    assert!(a_nodes.iter().all(|n| !b_nodes.iter().any(|m| m.id == n.id)));
}

// ============================================================================
// Watch protocol
// ============================================================================

#[tokio::test]
async fn test_second_watch_is_rejected() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;
    let client_id = dis.register_client(60).await.unwrap();
    let (_, rvs) = dis.list_nodes_for_client(&client_id).unwrap();

    let (tx, _rx) = mpsc::channel(10);
    let (stop, stop_rx) = oneshot::channel();
    dis.watch(&client_id, &rvs, tx, stop_rx).unwrap();

    let (tx2, _rx2) = mpsc::channel(10);
    let (_stop2, stop_rx2) = oneshot::channel();
    assert_eq!(
        dis.watch(&client_id, &rvs, tx2, stop_rx2).unwrap_err(),
        DistributorError::Core(CoreError::AlreadyWatching(client_id.clone()))
    );

    stop.send(()).unwrap();
    let mut resubscribed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (tx3, _rx3) = mpsc::channel(10);
        let (_stop3, stop_rx3) = oneshot::channel();
        if dis.watch(&client_id, &rvs, tx3, stop_rx3).is_ok() {
            resubscribed = true;
            break;
        }
    }
    assert!(resubscribed);
}

#[tokio::test]
async fn test_watch_requires_resource_versions() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;
    let client_id = dis.register_client(60).await.unwrap();

    let (tx, _rx) = mpsc::channel(10);
    let (_stop, stop_rx) = oneshot::channel();
    assert_eq!(
        dis.watch(&client_id, &ResourceVersionMap::new(), tx, stop_rx).unwrap_err(),
        DistributorError::MissingWatchArgument("resource versions")
    );
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_duplicate_added_event_is_ignored() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;
    let client_id = dis.register_client(60).await.unwrap();
    let (nodes, rvs) = dis.list_nodes_for_client(&client_id).unwrap();

    let (tx, mut rx) = mpsc::channel(10);
    let (_stop, stop_rx) = oneshot::channel();
    dis.watch(&client_id, &rvs, tx, stop_rx).unwrap();

    let update = modified(&nodes[0], 1_000);
    dis.process_events(vec![update.clone()]).await;
    dis.process_events(vec![update]).await;
    let (ok, _) = dis.process_events(added_batch(BJ1, 200, 1)).await;
    assert!(ok);

    let events = drain(&mut rx, Duration::from_millis(200)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].node.id, nodes[0].id);
    assert_eq!(dis.node_store().total_host_num(), 200);
}

#[tokio::test]
async fn test_unroutable_events_do_not_fail_the_batch() {
    let (dis, store) = distributor(small_config());
    let mut events = added_batch(BJ1, 3, 1);
    // Inside the region table but outside this two-region topology.
    let wulan = Location::new(Region::Wulan, ResourcePartition::RP1);
    events.push(NodeEvent::added(LogicalNode::new("far", 9, wulan)));
    events.push(NodeEvent::new(
        EventType::Bookmark,
        LogicalNode::new("mark", 10, BJ1),
    ));

    let (ok, versions) = dis.process_events(events).await;
    assert!(ok);
    assert_eq!(versions.get(&BJ1), Some(3));
    assert_eq!(versions.get(&wulan), None);
    assert_eq!(dis.node_store().total_host_num(), 3);
    assert!(store.node("MinNode.Beijing-node-0.0.0").is_some());
}

#[tokio::test]
async fn test_persistence_outage_opens_breaker_without_failing_ingest() {
    let config = DistributorConfig {
        persist_retry_limit: 1,
        circuit_breaker_threshold: 2,
        ..small_config()
    };
    let (dis, store) = distributor(config);
    store.fail_next(usize::MAX);

    for i in 0..3 {
        let (ok, _) = dis.process_events(added_batch(BJ1, 1, 100 * i + 1)).await;
        assert!(ok);
    }
    // Two failed calls in the first batch open the breaker; later batches skip.
    assert_eq!(store.attempts(), 2);
    assert!(store.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_and_watch_during_ingest_reconstruct_final_state() {
    let (dis, _) = distributor(small_config());
    dis.process_events(added_batch(BJ1, 200, 1)).await;
    dis.process_events(added_batch(SH2, 200, 1)).await;
    let client_id = dis.register_client(150).await.unwrap();
    let (seed, _) = dis.list_nodes_for_client(&client_id).unwrap();

    let writer = {
        let dis = Arc::clone(&dis);
        let seed = seed.clone();
        tokio::spawn(async move {
            let mut rv = 1_000;
            for _ in 0..20 {
                let batch = seed
                    .iter()
                    .map(|n| {
                        rv += 1;
                        modified(n, rv)
                    })
                    .collect();
                dis.process_events(batch).await;
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    let (listed, rvs) = dis.list_nodes_for_client(&client_id).unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let (_stop, stop_rx) = oneshot::channel();
    dis.watch(&client_id, &rvs, tx, stop_rx).unwrap();

    writer.await.unwrap();
    let events = drain(&mut rx, Duration::from_millis(300)).await;

    let mut view: HashMap<String, u64> = listed
        .iter()
        .map(|n| (n.id.clone(), n.resource_version().unwrap()))
        .collect();
    for event in &events {
        let location = event.node.location().unwrap();
        let rv = event.node.resource_version().unwrap();
        assert!(rv > rvs.get(&location).unwrap(), "event already covered by list");
        let previous = view.insert(event.node.id.clone(), rv).unwrap();
        assert!(rv > previous, "update applied out of order");
    }

    let (final_nodes, _) = dis.list_nodes_for_client(&client_id).unwrap();
    let expected: HashMap<String, u64> = final_nodes
        .iter()
        .map(|n| (n.id.clone(), n.resource_version().unwrap()))
        .collect();
    assert_eq!(view, expected);
}

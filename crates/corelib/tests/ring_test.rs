//! Ring tiling, routing and node store tests.
//!
//! # Test Strategy
//!
//! 1. **Tiling**: location arcs and virtual store arcs cover the ring exactly
//! 2. **Routing**: the same id always lands in the same virtual store
//! 3. **Ingestion**: host counts and resource versions after batches
//! 4. **Thread safety**: concurrent batches against one store

use std::sync::Arc;
use std::thread;

use corelib::ring::RING_DEGREES;
use corelib::{
    Location, LocationRing, LogicalNode, ManagedNodeEvent, NodeEvent, NodeStore, Region,
    ResourcePartition,
};
use proptest::prelude::*;

const BJ1: Location = Location::new(Region::Beijing, ResourcePartition::RP1);

fn added(id: &str, rv: u64, location: Location) -> ManagedNodeEvent {
    ManagedNodeEvent::from_event(NodeEvent::added(LogicalNode::new(id, rv, location))).unwrap()
}

fn modified(id: &str, rv: u64, location: Location) -> ManagedNodeEvent {
    ManagedNodeEvent::from_event(NodeEvent::modified(LogicalNode::new(id, rv, location))).unwrap()
}

// ============================================================================
// Tiling
// ============================================================================

proptest! {
    #[test]
    fn prop_location_arcs_tile_the_ring(
        regions in 1usize..=Region::COUNT,
        partitions in 1usize..=ResourcePartition::COUNT,
    ) {
        let ring = LocationRing::new(regions, partitions).unwrap();
        let arcs: Vec<_> = ring.locations().map(|l| ring.arc_for(&l).unwrap()).collect();

        prop_assert_eq!(arcs.len(), regions * partitions);
        prop_assert_eq!(arcs[0].lower, 0.0);
        prop_assert_eq!(arcs[arcs.len() - 1].upper, RING_DEGREES);
        for pair in arcs.windows(2) {
            // Contiguous, no gap and no overlap.
            prop_assert_eq!(pair[0].upper, pair[1].lower);
            prop_assert!(pair[0].lower < pair[0].upper);
        }
    }

    #[test]
    fn prop_virtual_stores_tile_each_location(
        regions in 1usize..=4,
        partitions in 1usize..=4,
        per_partition in 1usize..=16,
    ) {
        let store = NodeStore::new(per_partition, regions, partitions).unwrap();
        let ring = store.ring();
        for (i, location) in ring.locations().enumerate() {
            let arc = ring.arc_for(&location).unwrap();
            let subs = &store.virtual_stores()[i * per_partition..(i + 1) * per_partition];
            prop_assert_eq!(subs[0].arc().lower, arc.lower);
            prop_assert_eq!(subs[per_partition - 1].arc().upper, arc.upper);
            for pair in subs.windows(2) {
                prop_assert_eq!(pair[0].arc().upper, pair[1].arc().lower);
                prop_assert_eq!(pair[0].location(), location);
            }
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    #[test]
    fn prop_routing_is_deterministic_and_local(
        id in "[a-z0-9-]{1,32}",
        region in 0usize..3,
        partition in 0usize..3,
    ) {
        let store = NodeStore::new(16, 3, 3).unwrap();
        let location = Location::new(Region::ALL[region], ResourcePartition::ALL[partition]);

        let first = store.route(&id, &location).unwrap();
        let second = store.route(&id, &location).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(store.virtual_store(first).unwrap().location(), location);
    }
}

#[test]
fn test_route_outside_topology() {
    let store = NodeStore::new(4, 2, 2).unwrap();
    let outside = Location::new(Region::Guizhou, ResourcePartition::RP1);
    assert_eq!(store.route("node-1", &outside), None);
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_global_resource_version_is_monotonic() {
    let store = NodeStore::new(4, 1, 1).unwrap();

    let (_, v1, _) = store.process_node_events(vec![added("a", 10, BJ1), added("b", 20, BJ1)]);
    assert_eq!(v1.get(&BJ1), Some(20));

    // An older version arriving later never moves the map backwards.
    let (_, v2, _) = store.process_node_events(vec![added("c", 5, BJ1)]);
    assert_eq!(v2.get(&BJ1), Some(20));

    let (_, v3, _) = store.process_node_events(vec![modified("a", 30, BJ1)]);
    assert_eq!(v3.get(&BJ1), Some(30));
    assert_eq!(store.total_host_num(), 3);
}

#[test]
fn test_stale_update_leaves_store_unchanged() {
    let store = NodeStore::new(4, 1, 1).unwrap();
    store.process_node_events(vec![added("a", 10, BJ1)]);

    for rv in [10, 9, 1] {
        let (_, _, stats) = store.process_node_events(vec![modified("a", rv, BJ1)]);
        assert_eq!(stats.ignored, 1);
    }

    let index = store.route("a", &BJ1).unwrap();
    let (nodes, versions) = store.virtual_store(index).unwrap().snapshot();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].resource_version, "10");
    assert_eq!(versions.get(&BJ1), Some(10));
}

#[test]
fn test_host_count_matches_sum_of_stores() {
    let store = NodeStore::new(10, 2, 2).unwrap();
    let ring = store.ring().clone();
    let events = ring
        .locations()
        .flat_map(|l| (0..250).map(move |i| added(&format!("{l}-{i}"), i + 1, l)))
        .collect();
    store.process_node_events(events);

    let sum: usize = store.virtual_stores().iter().map(|vs| vs.host_num()).sum();
    assert_eq!(sum, 1000);
    assert_eq!(store.total_host_num(), sum);
}

// ============================================================================
// Thread safety
// ============================================================================

#[test]
fn test_concurrent_batches() {
    let store = Arc::new(NodeStore::new(8, 2, 2).unwrap());
    let locations: Vec<Location> = store.ring().locations().collect();

    let handles: Vec<_> = locations
        .into_iter()
        .map(|location| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for batch in 0..10u64 {
                    let events = (0..100u64)
                        .map(|i| {
                            let rv = batch * 100 + i + 1;
                            added(&format!("{location}-{rv}"), rv, location)
                        })
                        .collect();
                    store.process_node_events(events);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.total_host_num(), 4 * 1000);
    let versions = store.current_resource_versions();
    for location in store.ring().locations() {
        assert_eq!(versions.get(&location), Some(1000));
    }
}

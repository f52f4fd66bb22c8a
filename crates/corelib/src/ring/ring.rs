//! Location ring: fixed arcs of the 360 degree ring per location.

use crate::error::{Error, Result};
use crate::location::{Location, Region, ResourcePartition};

/// Circumference of the ring in degrees.
pub const RING_DEGREES: f64 = 360.0;

/// Half-open arc `[lower, upper)` on the ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RingArc {
    pub lower: f64,
    pub upper: f64,
}

impl RingArc {
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    #[inline]
    pub fn contains(&self, degrees: f64) -> bool {
        degrees >= self.lower && degrees < self.upper
    }

    /// Split into `n` contiguous sub-arcs; the last one snaps to `upper`.
    pub fn split(&self, n: usize) -> Vec<RingArc> {
        let step = self.width() / n as f64;
        (0..n)
            .map(|i| RingArc {
                lower: self.lower + i as f64 * step,
                upper: if i + 1 == n {
                    self.upper
                } else {
                    self.lower + (i + 1) as f64 * step
                },
            })
            .collect()
    }
}

/// Deterministic (region, partition) → arc lookup.
///
/// Regions split the ring into equal slices, partitions split each region
/// slice. Immutable after construction; safe to share without locking.
#[derive(Debug, Clone)]
pub struct LocationRing {
    region_count: usize,
    partition_count: usize,
    arcs: Vec<RingArc>,
}

impl LocationRing {
    pub fn new(region_count: usize, partition_count: usize) -> Result<Self> {
        if region_count == 0 || region_count > Region::COUNT {
            return Err(Error::Topology(format!(
                "region count {region_count} must be within 1..={}",
                Region::COUNT
            )));
        }
        if partition_count == 0 || partition_count > ResourcePartition::COUNT {
            return Err(Error::Topology(format!(
                "partition count {partition_count} must be within 1..={}",
                ResourcePartition::COUNT
            )));
        }

        let whole = RingArc {
            lower: 0.0,
            upper: RING_DEGREES,
        };
        let arcs = whole
            .split(region_count)
            .into_iter()
            .flat_map(|region| region.split(partition_count))
            .collect();

        Ok(Self {
            region_count,
            partition_count,
            arcs,
        })
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Number of locations on the ring.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Dense index of `location`, or `None` if it is outside the topology.
    pub fn location_index(&self, location: &Location) -> Option<usize> {
        let r = location.region.index();
        let p = location.partition.index();
        (r < self.region_count && p < self.partition_count).then(|| r * self.partition_count + p)
    }

    /// Inverse of [`location_index`](Self::location_index).
    pub fn location_at(&self, index: usize) -> Option<Location> {
        if index >= self.arcs.len() {
            return None;
        }
        Some(Location::new(
            Region::ALL[index / self.partition_count],
            ResourcePartition::ALL[index % self.partition_count],
        ))
    }

    pub fn arc_for(&self, location: &Location) -> Option<RingArc> {
        self.location_index(location).map(|i| self.arcs[i])
    }

    /// All locations in index order.
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        (0..self.arcs.len()).filter_map(|i| self.location_at(i))
    }
}

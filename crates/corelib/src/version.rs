//! Per-location resource version bookkeeping.

use std::collections::hash_map::{self, HashMap};

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Latest observed resource version per location.
///
/// Values only move forward: every write goes through [`observe`], which
/// keeps the maximum. This is the composite resource version (CRV) handed
/// to clients as a watch resumption token.
///
/// [`observe`]: ResourceVersionMap::observe
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersionMap(HashMap<Location, u64>);

impl ResourceVersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` for `location`, keeping the larger of the stored
    /// and incoming value.
    pub fn observe(&mut self, location: Location, version: u64) {
        self.0
            .entry(location)
            .and_modify(|v| *v = (*v).max(version))
            .or_insert(version);
    }

    /// Fold every entry of `other` into `self` (max per location).
    pub fn merge(&mut self, other: &ResourceVersionMap) {
        for (location, version) in other.iter() {
            self.observe(location, version);
        }
    }

    pub fn get(&self, location: &Location) -> Option<u64> {
        self.0.get(location).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Location, u64)> + '_ {
        self.0.iter().map(|(l, v)| (*l, *v))
    }

    pub fn locations(&self) -> hash_map::Keys<'_, Location, u64> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Location, u64)> for ResourceVersionMap {
    fn from_iter<I: IntoIterator<Item = (Location, u64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (location, version) in iter {
            map.observe(location, version);
        }
        map
    }
}

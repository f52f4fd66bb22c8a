//! Region / resource partition naming tables.
//!
//! Wire payloads carry small integers (or names); internal routing always
//! goes through the [`Location`] value type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Geographic region of an upstream resource region manager.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum Region {
    Beijing = 0,
    Shanghai = 1,
    Wulan = 2,
    Guizhou = 3,
    Reserved1 = 4,
    Reserved2 = 5,
    Reserved3 = 6,
    Reserved4 = 7,
    Reserved5 = 8,
}

impl Region {
    /// Number of entries in the region table.
    pub const COUNT: usize = 9;

    /// All regions in table order.
    pub const ALL: [Region; Region::COUNT] = [
        Region::Beijing,
        Region::Shanghai,
        Region::Wulan,
        Region::Guizhou,
        Region::Reserved1,
        Region::Reserved2,
        Region::Reserved3,
        Region::Reserved4,
        Region::Reserved5,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Region::Beijing => "Beijing",
            Region::Shanghai => "Shanghai",
            Region::Wulan => "Wulan",
            Region::Guizhou => "Guizhou",
            Region::Reserved1 => "Reserved1",
            Region::Reserved2 => "Reserved2",
            Region::Reserved3 => "Reserved3",
            Region::Reserved4 => "Reserved4",
            Region::Reserved5 => "Reserved5",
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<i32> for Region {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Region::ALL.get(i).copied())
            .ok_or_else(|| Error::UnknownLocationName(format!("region #{value}")))
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .iter()
            .find(|r| r.name() == s)
            .copied()
            .ok_or_else(|| Error::UnknownLocationName(s.to_string()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource partition within a region.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum ResourcePartition {
    RP1 = 0,
    RP2 = 1,
    RP3 = 2,
    RP4 = 3,
    RP5 = 4,
    RP6 = 5,
    RP7 = 6,
    RP8 = 7,
    RP9 = 8,
    RP10 = 9,
}

impl ResourcePartition {
    /// Number of entries in the partition table.
    pub const COUNT: usize = 10;

    /// All partitions in table order.
    pub const ALL: [ResourcePartition; ResourcePartition::COUNT] = [
        ResourcePartition::RP1,
        ResourcePartition::RP2,
        ResourcePartition::RP3,
        ResourcePartition::RP4,
        ResourcePartition::RP5,
        ResourcePartition::RP6,
        ResourcePartition::RP7,
        ResourcePartition::RP8,
        ResourcePartition::RP9,
        ResourcePartition::RP10,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourcePartition::RP1 => "RP1",
            ResourcePartition::RP2 => "RP2",
            ResourcePartition::RP3 => "RP3",
            ResourcePartition::RP4 => "RP4",
            ResourcePartition::RP5 => "RP5",
            ResourcePartition::RP6 => "RP6",
            ResourcePartition::RP7 => "RP7",
            ResourcePartition::RP8 => "RP8",
            ResourcePartition::RP9 => "RP9",
            ResourcePartition::RP10 => "RP10",
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<i32> for ResourcePartition {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|i| ResourcePartition::ALL.get(i).copied())
            .ok_or_else(|| Error::UnknownLocationName(format!("partition #{value}")))
    }
}

impl FromStr for ResourcePartition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourcePartition::ALL
            .iter()
            .find(|p| p.name() == s)
            .copied()
            .ok_or_else(|| Error::UnknownLocationName(s.to_string()))
    }
}

impl fmt::Display for ResourcePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable (region, resource partition) pair.
///
/// Compared and hashed by value; used as a map key throughout the crate.
/// Serializes as `"<region>/<partition>"` so it can key JSON objects.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Location {
    pub region: Region,
    pub partition: ResourcePartition,
}

impl Location {
    pub const fn new(region: Region, partition: ResourcePartition) -> Self {
        Self { region, partition }
    }

    /// Resolve a location from raw wire integers.
    pub fn from_raw(region: i32, partition: i32) -> Result<Self, Error> {
        match (Region::try_from(region), ResourcePartition::try_from(partition)) {
            (Ok(region), Ok(partition)) => Ok(Self { region, partition }),
            _ => Err(Error::UnknownLocation { region, partition }),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.partition)
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (region, partition) = s
            .split_once('/')
            .ok_or_else(|| Error::UnknownLocationName(s.to_string()))?;
        Ok(Self::new(region.parse()?, partition.parse()?))
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_tables() {
        for region in Region::ALL {
            assert_eq!(region.name().parse::<Region>().unwrap(), region);
            assert_eq!(Region::try_from(region.index() as i32).unwrap(), region);
        }
        for partition in ResourcePartition::ALL {
            assert_eq!(partition.name().parse::<ResourcePartition>().unwrap(), partition);
        }
    }

    #[test]
    fn test_from_raw_rejects_out_of_table_values() {
        assert!(Location::from_raw(0, 0).is_ok());
        assert_eq!(
            Location::from_raw(42, 0),
            Err(Error::UnknownLocation { region: 42, partition: 0 })
        );
        assert!(Location::from_raw(0, -1).is_err());
        assert!(Location::from_raw(0, ResourcePartition::COUNT as i32).is_err());
    }

    #[test]
    fn test_location_display_and_parse() {
        let loc = Location::new(Region::Guizhou, ResourcePartition::RP10);
        assert_eq!(loc.to_string(), "Guizhou/RP10");
        assert_eq!("Guizhou/RP10".parse::<Location>().unwrap(), loc);
        assert!("Guizhou-RP10".parse::<Location>().is_err());
    }
}

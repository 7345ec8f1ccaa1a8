// SPDX-License-Identifier: MPL-2.0

//! Inspection stations
//!
//! The bay has four fixed stations. Their order is the capture sequence order
//! and the index sent to the analysis endpoint, so station data is always held
//! in a [`StationMap`] (a fixed array indexed by [`StationId`]) rather than a
//! map keyed by strings.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// One of the four inspection points of the bay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationId {
    Front,
    Left,
    Right,
    Brake,
}

impl StationId {
    /// All stations in capture order
    pub const ALL: [StationId; 4] = [
        StationId::Front,
        StationId::Left,
        StationId::Right,
        StationId::Brake,
    ];

    /// Canonical index (0=front, 1=left, 2=right, 3=brake)
    pub const fn index(self) -> usize {
        match self {
            StationId::Front => 0,
            StationId::Left => 1,
            StationId::Right => 2,
            StationId::Brake => 3,
        }
    }

    /// Station for a canonical index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Path segment used by the feed endpoints
    pub fn as_str(self) -> &'static str {
        match self {
            StationId::Front => "front",
            StationId::Left => "left",
            StationId::Right => "right",
            StationId::Brake => "brake",
        }
    }

    /// Get display name for the station
    pub fn display_name(self) -> &'static str {
        match self {
            StationId::Front => "Front",
            StationId::Left => "Left",
            StationId::Right => "Right",
            StationId::Brake => "Brake",
        }
    }

    /// Parse a station name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Fixed-size per-station storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationMap<T>([T; 4]);

impl<T> StationMap<T> {
    /// Build a map by calling `f` once per station, in capture order
    pub fn from_fn(mut f: impl FnMut(StationId) -> T) -> Self {
        Self(StationId::ALL.map(&mut f))
    }

    /// Iterate `(station, value)` pairs in capture order
    pub fn iter(&self) -> impl Iterator<Item = (StationId, &T)> {
        StationId::ALL.into_iter().zip(self.0.iter())
    }

    /// Iterate `(station, value)` pairs mutably in capture order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (StationId, &mut T)> {
        StationId::ALL.into_iter().zip(self.0.iter_mut())
    }

    /// Iterate values in capture order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    /// Map every value, keeping station positions
    pub fn map<U>(self, mut f: impl FnMut(StationId, T) -> U) -> StationMap<U> {
        let mut stations = StationId::ALL.into_iter();
        StationMap(self.0.map(|value| {
            // The array and ALL have the same length
            let station = stations.next().unwrap_or(StationId::Brake);
            f(station, value)
        }))
    }
}

impl<T> IntoIterator for StationMap<T> {
    type Item = (StationId, T);
    type IntoIter = std::iter::Zip<std::array::IntoIter<StationId, 4>, std::array::IntoIter<T, 4>>;

    /// Consume the map as `(station, value)` pairs in capture order
    fn into_iter(self) -> Self::IntoIter {
        StationId::ALL.into_iter().zip(self.0)
    }
}

impl<T> From<[T; 4]> for StationMap<T> {
    /// Values in capture order (front, left, right, brake)
    fn from(values: [T; 4]) -> Self {
        Self(values)
    }
}

impl<T> Index<StationId> for StationMap<T> {
    type Output = T;

    fn index(&self, station: StationId) -> &T {
        &self.0[station.index()]
    }
}

impl<T> IndexMut<StationId> for StationMap<T> {
    fn index_mut(&mut self, station: StationId) -> &mut T {
        &mut self.0[station.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_order_matches_index() {
        for (i, station) in StationId::ALL.into_iter().enumerate() {
            assert_eq!(station.index(), i);
            assert_eq!(StationId::from_index(i), Some(station));
        }
        assert_eq!(StationId::from_index(4), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(StationId::parse("BRAKE"), Some(StationId::Brake));
        assert_eq!(StationId::parse(" left "), Some(StationId::Left));
        assert_eq!(StationId::parse("rear"), None);
    }

    #[test]
    fn test_station_map_iterates_in_order() {
        let map = StationMap::from_fn(|s| s.index() * 10);
        let pairs: Vec<_> = map.iter().map(|(s, v)| (s, *v)).collect();
        assert_eq!(
            pairs,
            vec![
                (StationId::Front, 0),
                (StationId::Left, 10),
                (StationId::Right, 20),
                (StationId::Brake, 30),
            ]
        );
        let mapped = map.map(|s, v| format!("{}:{}", s.as_str(), v));
        assert_eq!(mapped[StationId::Right], "right:20");
    }
}

//! Roads group the lanes that share one reference line.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LaneID;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RoadID(pub u64);

impl fmt::Display for RoadID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Road #{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RoadCategory {
    Unknown,
    Rural,
    Motorway,
    Town,
    LowSpeed,
    Pedestrian,
    Bicycle,
}

impl RoadCategory {
    /// Unknown category strings degrade to the conservative `LowSpeed`.
    pub fn parse(category_str: &str) -> RoadCategory {
        match category_str {
            "unknown" => RoadCategory::Unknown,
            "rural" => RoadCategory::Rural,
            "motorway" => RoadCategory::Motorway,
            "town" => RoadCategory::Town,
            "low_speed" => RoadCategory::LowSpeed,
            "pedestrian" => RoadCategory::Pedestrian,
            "bicycle" => RoadCategory::Bicycle,
            _ => RoadCategory::LowSpeed,
        }
    }
}

/// A named stretch of road. Lanes are referenced by id; the map owns them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Road {
    pub id: RoadID,
    pub name: String,
    pub category: RoadCategory,
    pub one_way: bool,
    pub lanes: BTreeSet<LaneID>,
}

impl Road {
    pub fn new(name: &str, id: RoadID, category_str: &str, one_way: bool) -> Road {
        Road {
            id,
            name: name.to_string(),
            category: RoadCategory::parse(category_str),
            one_way,
            lanes: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing_falls_back_to_low_speed() {
        assert_eq!(RoadCategory::parse("motorway"), RoadCategory::Motorway);
        assert_eq!(RoadCategory::parse("NULL"), RoadCategory::LowSpeed);
        assert_eq!(RoadCategory::parse("unknown"), RoadCategory::Unknown);
    }

    #[test]
    fn road_collects_lane_ids() {
        let mut road = Road::new("Hauptstrasse", RoadID(3), "town", false);
        road.lanes.insert(LaneID(1));
        road.lanes.insert(LaneID(2));
        road.lanes.insert(LaneID(1));
        assert_eq!(road.lanes.len(), 2);
        assert_eq!(road.category, RoadCategory::Town);
    }
}

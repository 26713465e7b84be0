//! Lanes: a drivable strip paired from two borders, with its type, surface
//! material, and the speed limit derived from both.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{distance_2d, Border, Borders, RoadCategory, Result, RoadID, BORDER_SPACING};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct LaneID(pub u64);

impl fmt::Display for LaneID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lane #{}", self.0)
    }
}

// German speed limits, km/h converted to m/s (1 km/h = 0.27778 m/s).
pub const DRIVING_SPEED_LIMIT_RURAL: f64 = 100.0 * 0.27778;
pub const DRIVING_SPEED_LIMIT_MOTORWAY: f64 = 130.0 * 0.27778;
pub const DRIVING_SPEED_LIMIT_TOWN: f64 = 50.0 * 0.27778;
pub const DRIVING_SPEED_LIMIT_LOW_SPEED: f64 = 30.0 * 0.27778;
pub const PARKING_SPEED_LIMIT: f64 = 5.0 * 0.27778;
pub const RESTRICTED_SPEED_LIMIT: f64 = 10.0 * 0.27778;
pub const BIKING_SPEED_LIMIT: f64 = 25.0 * 0.27778;
pub const PEDESTRIAN_SPEED_LIMIT: f64 = 5.0 * 0.27778;
/// Fallback for lane types without a defined limit.
pub const DEFAULT_SPEED_LIMIT: f64 = 2.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LaneType {
    Driving,
    Parking,
    Restricted,
    None,
    Sidewalk,
    Biking,
    Shoulder,
    Tram,
    Bus,
}

impl LaneType {
    /// Maps a feed type string, including the spelling variants seen in
    /// production maps. Unknown strings degrade to `None`.
    pub fn parse(type_str: &str) -> LaneType {
        match type_str {
            "driving" => LaneType::Driving,
            "parking" => LaneType::Parking,
            "restricted" => LaneType::Restricted,
            "none" => LaneType::None,
            "sidewalk" | "walking" => LaneType::Sidewalk,
            "biking" | "Bicycle" => LaneType::Biking,
            "shoulder" => LaneType::Shoulder,
            "tram" => LaneType::Tram,
            "bus" => LaneType::Bus,
            _ => LaneType::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LaneMaterial {
    Asphalt,
    Concrete,
    Pavement,
    Cobble,
    Vegetation,
    Soil,
    Gravel,
}

impl LaneMaterial {
    /// Unknown materials are treated as asphalt.
    pub fn parse(material_str: &str) -> LaneMaterial {
        match material_str {
            "asphalt" => LaneMaterial::Asphalt,
            "concrete" => LaneMaterial::Concrete,
            "pavement" => LaneMaterial::Pavement,
            "cobble" => LaneMaterial::Cobble,
            "vegetation" => LaneMaterial::Vegetation,
            "soil" => LaneMaterial::Soil,
            "gravel" => LaneMaterial::Gravel,
            _ => LaneMaterial::Asphalt,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneID,
    pub road_id: RoadID,
    pub borders: Borders,
    pub lane_type: LaneType,
    pub material: LaneMaterial,
    /// True when the lane lies left of its road's reference line; its
    /// center then runs against increasing reference s.
    pub left_of_reference: bool,
    pub speed_limit: f64,
    pub length: f64,
}

impl Lane {
    /// Pairs two borders into a lane. Inner is the border toward the
    /// reference line: `right` when the lane is left of the reference,
    /// `left` otherwise. Both sides are resampled at the standard spacing
    /// and the center is derived from them.
    pub fn new(
        left: Border,
        right: Border,
        id: LaneID,
        road_id: RoadID,
        left_of_reference: bool,
    ) -> Result<Lane> {
        let length = match (left.points.first(), left.points.last()) {
            (Some(first), Some(last)) => last.s - first.s,
            _ => 0.0,
        };
        if length < 0.0 {
            warn!("{} has negative length {}", id, length);
        }

        let (inner, outer) = if left_of_reference {
            (right, left)
        } else {
            (left, right)
        };
        let mut borders = Borders {
            inner,
            outer,
            center: Border::default(),
        };
        borders.interpolate_borders(BORDER_SPACING)?;
        borders.process_center();
        borders.set_parent_id(id);

        Ok(Lane {
            id,
            road_id,
            borders,
            lane_type: LaneType::None,
            material: LaneMaterial::Asphalt,
            left_of_reference,
            speed_limit: DEFAULT_SPEED_LIMIT,
            length,
        })
    }

    /// Lane width at arc length `s`: the distance between the interpolated
    /// inner and outer points. Zero when the borders haven't been resampled.
    pub fn get_width(&self, s: f64) -> f64 {
        if self.borders.inner.interpolated_points.is_empty()
            || self.borders.outer.interpolated_points.is_empty()
        {
            return 0.0;
        }
        match (
            self.borders.inner.get_interpolated_point(s),
            self.borders.outer.get_interpolated_point(s),
        ) {
            (Some(inner), Some(outer)) => distance_2d(&inner, &outer),
            _ => 0.0,
        }
    }

    pub fn set_material(&mut self, material_str: &str) {
        self.material = LaneMaterial::parse(material_str);
    }

    /// Sets the lane type from its feed string and derives the speed limit
    /// from the type and the road's category.
    pub fn set_type(&mut self, type_str: &str, road_category: RoadCategory) {
        self.lane_type = LaneType::parse(type_str);
        self.speed_limit = match self.lane_type {
            LaneType::Driving => match road_category {
                RoadCategory::Rural => DRIVING_SPEED_LIMIT_RURAL,
                RoadCategory::Motorway => DRIVING_SPEED_LIMIT_MOTORWAY,
                RoadCategory::Town => DRIVING_SPEED_LIMIT_TOWN,
                RoadCategory::LowSpeed => DRIVING_SPEED_LIMIT_LOW_SPEED,
                _ => DRIVING_SPEED_LIMIT_RURAL,
            },
            LaneType::Parking => PARKING_SPEED_LIMIT,
            LaneType::Restricted => RESTRICTED_SPEED_LIMIT,
            LaneType::Sidewalk | LaneType::Shoulder | LaneType::Bus => PEDESTRIAN_SPEED_LIMIT,
            LaneType::Biking => BIKING_SPEED_LIMIT,
            LaneType::Tram => DRIVING_SPEED_LIMIT_TOWN,
            LaneType::None => DEFAULT_SPEED_LIMIT,
        };
    }

    pub fn get_speed_limit(&self) -> f64 {
        self.speed_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point2d;

    fn straight_border(y: f64) -> Border {
        let polyline: Vec<Point2d> = (0..=100).map(|x| Point2d::new(x as f64, y)).collect();
        Border::from_polyline(&polyline, LaneID(0))
    }

    fn straight_lane(left_of_reference: bool) -> Lane {
        Lane::new(
            straight_border(4.0),
            straight_border(0.0),
            LaneID(7),
            RoadID(1),
            left_of_reference,
        )
        .unwrap()
    }

    #[test]
    fn width_of_straight_lane() {
        let lane = straight_lane(false);
        assert!((lane.get_width(50.0) - 4.0).abs() < 1e-6);
        assert!((lane.get_width(0.0) - 4.0).abs() < 1e-6);
        // Beyond the end clamps.
        assert!((lane.get_width(500.0) - 4.0).abs() < 1e-6);
        assert!((lane.length - 100.0).abs() < 1e-9);
    }

    #[test]
    fn inner_outer_follow_the_reference_flag() {
        let right_side = straight_lane(false);
        assert!((right_side.borders.inner.points[0].y - 4.0).abs() < 1e-9);
        assert!((right_side.borders.outer.points[0].y - 0.0).abs() < 1e-9);

        let left_side = straight_lane(true);
        assert!((left_side.borders.inner.points[0].y - 0.0).abs() < 1e-9);
        assert!((left_side.borders.outer.points[0].y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn center_carries_the_lane_id() {
        let lane = straight_lane(false);
        assert!(!lane.borders.center.interpolated_points.is_empty());
        assert!(lane
            .borders
            .center
            .interpolated_points
            .iter()
            .all(|p| p.parent_id == LaneID(7)));
        for p in &lane.borders.center.interpolated_points {
            assert!((p.y - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn speed_limits_follow_the_table() {
        let mut lane = straight_lane(false);
        for (type_str, category, expected) in [
            ("driving", RoadCategory::Rural, DRIVING_SPEED_LIMIT_RURAL),
            ("driving", RoadCategory::Motorway, DRIVING_SPEED_LIMIT_MOTORWAY),
            ("driving", RoadCategory::Town, DRIVING_SPEED_LIMIT_TOWN),
            ("driving", RoadCategory::LowSpeed, DRIVING_SPEED_LIMIT_LOW_SPEED),
            ("driving", RoadCategory::Unknown, DRIVING_SPEED_LIMIT_RURAL),
            ("parking", RoadCategory::Town, PARKING_SPEED_LIMIT),
            ("restricted", RoadCategory::Town, RESTRICTED_SPEED_LIMIT),
            ("sidewalk", RoadCategory::Town, PEDESTRIAN_SPEED_LIMIT),
            ("walking", RoadCategory::Town, PEDESTRIAN_SPEED_LIMIT),
            ("shoulder", RoadCategory::Town, PEDESTRIAN_SPEED_LIMIT),
            ("bus", RoadCategory::Town, PEDESTRIAN_SPEED_LIMIT),
            ("biking", RoadCategory::Town, BIKING_SPEED_LIMIT),
            ("Bicycle", RoadCategory::Town, BIKING_SPEED_LIMIT),
            ("tram", RoadCategory::Rural, DRIVING_SPEED_LIMIT_TOWN),
            ("gibberish", RoadCategory::Town, DEFAULT_SPEED_LIMIT),
        ] {
            lane.set_type(type_str, category);
            assert!(
                (lane.speed_limit - expected).abs() < 1e-12,
                "{} on {:?}",
                type_str,
                category
            );
        }
    }

    #[test]
    fn unknown_material_falls_back_to_asphalt() {
        let mut lane = straight_lane(false);
        lane.set_material("cobble");
        assert_eq!(lane.material, LaneMaterial::Cobble);
        lane.set_material("glass");
        assert_eq!(lane.material, LaneMaterial::Asphalt);
    }
}

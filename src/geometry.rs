use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LaneID;

/// Anything with planar coordinates in the map's metric frame. Map and route
/// queries accept vehicle states, poses, or raw points interchangeably
/// through this.
pub trait PlanarPoint {
    fn x(&self) -> f64;
    fn y(&self) -> f64;
}

/// Euclidean distance between any two planar points.
pub fn distance_2d<A: PlanarPoint + ?Sized, B: PlanarPoint + ?Sized>(a: &A, b: &B) -> f64 {
    ((a.x() - b.x()).powi(2) + (a.y() - b.y()).powi(2)).sqrt()
}

/// A sample along a lane border or centerline: a position plus the arc
/// length and lane it was taken from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
    /// Arc length along the parent border, in meters.
    pub s: f64,
    /// The lane this sample belongs to.
    pub parent_id: LaneID,
    /// Speed limit carried over from the parent lane, if known.
    pub max_speed: Option<f64>,
}

impl MapPoint {
    pub fn new(x: f64, y: f64, parent_id: LaneID) -> MapPoint {
        MapPoint {
            x,
            y,
            s: 0.0,
            parent_id,
            max_speed: None,
        }
    }
}

/// Two samples are the same point if their positions coincide; arc length
/// and parentage don't matter for identity.
impl PartialEq for MapPoint {
    fn eq(&self, other: &MapPoint) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl fmt::Display for MapPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "x: {:.2}, y: {:.2}, s: {:.2}, parent: {}",
            self.x, self.y, self.s, self.parent_id
        )
    }
}

impl PlanarPoint for MapPoint {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

/// A bare position in the map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub fn new(x: f64, y: f64) -> Point2d {
        Point2d { x, y }
    }
}

impl fmt::Display for Point2d {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl PlanarPoint for Point2d {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

/// A position plus heading, radians counter-clockwise from +x.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, yaw: f64) -> Pose2d {
        Pose2d { x, y, yaw }
    }
}

impl PlanarPoint for Pose2d {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

impl PlanarPoint for (f64, f64) {
    fn x(&self) -> f64 {
        self.0
    }
    fn y(&self) -> f64 {
        self.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_point_equality_ignores_s_and_parent() {
        let mut a = MapPoint::new(1.0, 2.0, LaneID(1));
        let mut b = MapPoint::new(1.0, 2.0, LaneID(2));
        a.s = 5.0;
        b.s = 10.0;
        assert_eq!(a, b);
        assert_ne!(a, MapPoint::new(1.0, 2.1, LaneID(1)));
    }

    #[test]
    fn distance_mixes_point_types() {
        let p = Point2d::new(0.0, 0.0);
        let q = MapPoint::new(3.0, 4.0, LaneID(0));
        assert_eq!(distance_2d(&p, &q), 5.0);
        assert_eq!(distance_2d(&(3.0, 0.0), &p), 3.0);
    }
}

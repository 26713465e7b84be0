//! Traffic lights referenced by the map, positioned by their control points.

use serde::{Deserialize, Serialize};

use crate::Point2d;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TrafficLightState {
    Green,
    Red,
    Amber,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficLight {
    pub id: u64,
    pub state: TrafficLightState,
    /// Stop-line geometry in the map frame; the first point anchors the
    /// light for spatial filtering.
    pub control_points: Vec<Point2d>,
}

impl TrafficLight {
    pub fn new(id: u64, control_points: Vec<Point2d>) -> TrafficLight {
        TrafficLight {
            id,
            state: TrafficLightState::Unknown,
            control_points,
        }
    }
}

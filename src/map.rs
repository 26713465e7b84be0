//! The assembled map: lanes and roads in id-indexed storage, the quadtree
//! over centerline samples, and the lane connectivity graph. Immutable once
//! built; routes and concurrent readers share it freely.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::make;
use crate::{
    Boundary, BorderFeed, Lane, LaneBorderRecord, LaneID, MapPoint, PlanarPoint, QuadTree,
    ReferenceLineRecord, Result, Road, RoadGraph, RoadID, TrafficLight,
};

/// Returned by speed queries when the lane is unknown.
pub const UNKNOWN_LANE_SPEED_LIMIT: f64 = 13.6;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Map {
    pub quadtree: QuadTree<MapPoint>,
    pub lane_graph: RoadGraph,
    pub roads: BTreeMap<RoadID, Road>,
    pub lanes: BTreeMap<LaneID, Lane>,
    pub traffic_lights: Vec<TrafficLight>,
}

impl Map {
    /// Builds a map by draining a border feed.
    pub fn from_feed<F: BorderFeed>(feed: &mut F) -> Result<Map> {
        let reference_lines = feed.reference_lines()?;
        let lane_borders = feed.lane_borders()?;
        Map::from_records(reference_lines, lane_borders)
    }

    /// Builds a map from already-normalized feed records. Malformed records
    /// are skipped with a warning; the result covers the accepted subset.
    pub fn from_records(
        reference_lines: Vec<ReferenceLineRecord>,
        lane_borders: Vec<LaneBorderRecord>,
    ) -> Result<Map> {
        make::build_map(reference_lines, lane_borders)
    }

    pub fn get_lane(&self, id: LaneID) -> Option<&Lane> {
        self.lanes.get(&id)
    }

    pub fn get_road(&self, id: RoadID) -> Option<&Road> {
        self.roads.get(&id)
    }

    /// The lane's derived speed limit, or the documented default when the
    /// lane is unknown.
    pub fn get_lane_speed_limit(&self, lane_id: LaneID) -> f64 {
        self.lanes
            .get(&lane_id)
            .map(|lane| lane.get_speed_limit())
            .unwrap_or(UNKNOWN_LANE_SPEED_LIMIT)
    }

    /// True when the nearest centerline sample exists and the query point
    /// lies within half the lane's width of it.
    pub fn is_point_on_road<P: PlanarPoint>(&self, point: &P) -> bool {
        let mut min_dist = f64::INFINITY;
        let nearest = match self.quadtree.get_nearest_point(point, &mut min_dist) {
            Some(p) => p,
            None => return false,
        };
        let lane = match self.lanes.get(&nearest.parent_id) {
            Some(lane) => lane,
            None => {
                error!(
                    "nearest point references {} which is not in the map",
                    nearest.parent_id
                );
                return false;
            }
        };
        min_dist < lane.get_width(nearest.s) / 2.0
    }

    /// Extracts the part of the map inside a window around `center`: the
    /// lanes with centerline samples in the window (deep-copied), their
    /// roads restricted to those lanes, a quadtree re-seeded from the copied
    /// centerlines, the induced lane graph, and the traffic lights anchored
    /// inside the window.
    pub fn get_submap<P: PlanarPoint>(&self, center: &P, width: f64, height: f64) -> Map {
        let query_boundary = Boundary::centered_on(center, width, height);

        let mut found_points = Vec::new();
        self.quadtree.query(&query_boundary, &mut found_points);

        let unique_lane_ids: BTreeSet<LaneID> =
            found_points.iter().map(|p| p.parent_id).collect();

        let mut submap = Map {
            quadtree: QuadTree::new(query_boundary, self.quadtree.capacity),
            ..Default::default()
        };

        for lane_id in &unique_lane_ids {
            let lane = match self.lanes.get(lane_id) {
                Some(lane) => lane.clone(),
                None => continue,
            };

            for point in &lane.borders.center.interpolated_points {
                submap.quadtree.insert(*point);
            }

            if let Some(road) = self.roads.get(&lane.road_id) {
                submap
                    .roads
                    .entry(road.id)
                    .or_insert_with(|| Road {
                        lanes: BTreeSet::new(),
                        ..road.clone()
                    })
                    .lanes
                    .insert(*lane_id);
            }
            submap.lanes.insert(*lane_id, lane);
        }

        submap.lane_graph = self.lane_graph.create_subgraph(&unique_lane_ids);
        submap.traffic_lights = self
            .traffic_lights
            .iter()
            .filter(|light| {
                light
                    .control_points
                    .first()
                    .map(|p| query_boundary.contains(p))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        submap
    }

    pub fn set_traffic_lights(&mut self, traffic_lights: Vec<TrafficLight>) {
        self.traffic_lights = traffic_lights;
    }
}

//! Routes: the ordered lane sections along the best path between two
//! positions, with everything keyed by route arc length. A route projects
//! arbitrary states onto its centerline (`get_s`) and interpolates poses at
//! any distance along it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use ordered_float::NotNan;

use crate::{Border, LaneID, Map, MapPoint, PlanarPoint, Point2d, Pose2d};

/// The slice of one lane a route traverses. `route_s` is the arc length at
/// section entry, measured from the route start; `start_s`/`end_s` are in
/// the lane's own centerline parameterization, with `start_s > end_s` when
/// the lane is traversed against increasing local s.
#[derive(Clone, Copy, Debug)]
pub struct RouteSection {
    pub lane_id: LaneID,
    pub route_s: f64,
    pub start_s: f64,
    pub end_s: f64,
}

impl RouteSection {
    pub fn length(&self) -> f64 {
        (self.end_s - self.start_s).abs()
    }
}

#[derive(Clone, Debug)]
pub struct Route {
    pub sections: VecDeque<RouteSection>,
    /// Lane id to index into `sections`.
    pub lane_to_sections: HashMap<LaneID, usize>,
    /// Section-entry route arc length to index into `sections`, ascending.
    pub s_to_sections: BTreeMap<NotNan<f64>, usize>,
    /// Route arc length to centerline sample, ascending.
    pub center_lane: BTreeMap<NotNan<f64>, MapPoint>,
    pub start: Point2d,
    pub destination: Point2d,
    /// The map this route runs on, shared read-only.
    pub map: Arc<Map>,
}

impl Route {
    /// Plans a route between two positions: nearest centerline points around
    /// both, best path through the lane graph, then one section per lane.
    /// The route is empty when either endpoint is off-map or no path exists.
    pub fn new<S: PlanarPoint, E: PlanarPoint>(start_point: &S, end_point: &E, map: Arc<Map>) -> Route {
        let mut route = Route {
            sections: VecDeque::new(),
            lane_to_sections: HashMap::new(),
            s_to_sections: BTreeMap::new(),
            center_lane: BTreeMap::new(),
            start: Point2d::new(start_point.x(), start_point.y()),
            destination: Point2d::new(end_point.x(), end_point.y()),
            map,
        };

        let mut start_dist = f64::INFINITY;
        let nearest_start = route
            .map
            .quadtree
            .get_nearest_point(&route.start, &mut start_dist);
        let mut end_dist = f64::INFINITY;
        let nearest_end = route
            .map
            .quadtree
            .get_nearest_point(&route.destination, &mut end_dist);

        let (nearest_start, nearest_end) = match (nearest_start, nearest_end) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                warn!("route endpoints are not near any mapped lane");
                return route;
            }
        };

        let lane_path = route
            .map
            .lane_graph
            .get_best_path(nearest_start.parent_id, nearest_end.parent_id);

        let map = route.map.clone();
        let mut cumulative_s = 0.0;
        for lane_id in lane_path {
            let lane = match map.lanes.get(&lane_id) {
                Some(lane) => lane,
                None => {
                    warn!("best path crosses {} which is not in the map", lane_id);
                    continue;
                }
            };
            route.add_route_section(
                &lane.borders.center,
                &nearest_start,
                &nearest_end,
                lane.left_of_reference,
                &mut cumulative_s,
            );
        }

        route.initialize_center_lane();
        route
    }

    /// Appends the section of `center` this route traverses. The start
    /// lane's section begins at the projected start point, the destination
    /// lane's ends at the projected end point, and intermediate lanes span
    /// the whole border. `reverse` flips the default direction for lanes
    /// whose centerline runs against the direction of travel. When one lane
    /// is both start and destination, the projected endpoints alone decide
    /// the direction.
    pub fn add_route_section(
        &mut self,
        center: &Border,
        start_point: &MapPoint,
        end_point: &MapPoint,
        reverse: bool,
        cumulative_s: &mut f64,
    ) {
        let (s_min, s_max) = match (center.points.first(), center.points.last()) {
            (Some(first), Some(last)) => (first.s, last.s),
            _ => return,
        };
        let lane_id = center.parent_id();

        let start_s = if lane_id == start_point.parent_id {
            start_point.s
        } else if reverse {
            s_max
        } else {
            s_min
        };
        let end_s = if lane_id == end_point.parent_id {
            end_point.s
        } else if reverse {
            s_min
        } else {
            s_max
        };

        let section = RouteSection {
            lane_id,
            route_s: *cumulative_s,
            start_s,
            end_s,
        };
        *cumulative_s += section.length();
        self.sections.push_back(section);
    }

    /// Rebuilds the lookup tables and the route-s-keyed centerline from the
    /// sections.
    pub fn initialize_center_lane(&mut self) {
        self.lane_to_sections.clear();
        self.s_to_sections.clear();
        self.center_lane.clear();

        let map = self.map.clone();
        for (idx, section) in self.sections.iter().enumerate() {
            self.lane_to_sections.insert(section.lane_id, idx);
            if let Ok(key) = NotNan::new(section.route_s) {
                self.s_to_sections.insert(key, idx);
            }

            let lane = match map.lanes.get(&section.lane_id) {
                Some(lane) => lane,
                None => continue,
            };
            let center = &lane.borders.center;
            let lo = section.start_s.min(section.end_s);
            let hi = section.start_s.max(section.end_s);

            let mut samples: Vec<MapPoint> = Vec::new();
            for endpoint_s in [section.start_s, section.end_s] {
                if let Some(p) = center.get_interpolated_point(endpoint_s) {
                    samples.push(p);
                }
            }
            samples.extend(
                center
                    .interpolated_points
                    .iter()
                    .filter(|p| p.s >= lo && p.s <= hi)
                    .copied(),
            );

            for sample in samples {
                let along = if section.start_s <= section.end_s {
                    sample.s - section.start_s
                } else {
                    section.start_s - sample.s
                };
                if let Ok(key) = NotNan::new(section.route_s + along) {
                    self.center_lane.insert(key, sample);
                }
            }
        }
    }

    /// Total route arc length in meters.
    pub fn get_length(&self) -> f64 {
        self.center_lane
            .keys()
            .next_back()
            .map(|k| k.into_inner())
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Projects a state onto the route: the route arc length of the nearest
    /// centerline point belonging to one of the route's lanes. Infinity when
    /// no route lane is anywhere near the state.
    pub fn get_s<S: PlanarPoint>(&self, state: &S) -> f64 {
        if self.sections.is_empty() {
            return f64::INFINITY;
        }

        let mut min_dist = f64::INFINITY;
        let nearest = self.map.quadtree.get_nearest_point_filtered(
            state,
            &mut min_dist,
            &|p: &MapPoint| self.lane_to_sections.contains_key(&p.parent_id),
        );
        let nearest = match nearest {
            Some(p) => p,
            None => {
                warn!("no centerline point of the route is near the queried state");
                return f64::INFINITY;
            }
        };

        let section = &self.sections[self.lane_to_sections[&nearest.parent_id]];
        let dist_along_section = if section.start_s < section.end_s {
            nearest.s - section.start_s
        } else {
            section.start_s - nearest.s
        };
        section.route_s + dist_along_section
    }

    /// Pose at the given route arc length: linear interpolation between the
    /// bracketing centerline samples, yaw from the bracketing segment.
    /// Distances beyond the route clamp to its ends.
    pub fn interpolate_at_s(&self, distance: f64) -> Pose2d {
        if self.center_lane.len() == 1 {
            let p = self.center_lane.values().next().unwrap();
            return Pose2d::new(p.x, p.y, 0.0);
        }
        let (p1, p2, frac) = match self.bracket(distance) {
            Some(bracket) => bracket,
            None => return Pose2d::default(),
        };

        let dx = p2.x - p1.x;
        let dy = p2.y - p1.y;
        let mut pose = Pose2d::new(p1.x + frac * dx, p1.y + frac * dy, 0.0);
        if dx.abs() >= 1e-9 || dy.abs() >= 1e-9 {
            pose.yaw = dy.atan2(dx);
        }
        pose
    }

    pub fn get_pose_at_s(&self, distance: f64) -> Pose2d {
        self.interpolate_at_s(distance)
    }

    /// Centerline sample interpolated at the given route arc length,
    /// carrying the lane id and speed of the preceding sample.
    pub fn get_map_point_at_s(&self, distance: f64) -> MapPoint {
        if self.center_lane.len() == 1 {
            return *self.center_lane.values().next().unwrap();
        }
        let (p1, p2, frac) = match self.bracket(distance) {
            Some(bracket) => bracket,
            None => return MapPoint::new(0.0, 0.0, LaneID(0)),
        };
        let mut point = MapPoint::new(
            p1.x + frac * (p2.x - p1.x),
            p1.y + frac * (p2.y - p1.y),
            p1.parent_id,
        );
        point.s = distance.clamp(0.0, self.get_length());
        point.max_speed = p1.max_speed;
        point
    }

    /// The centerline window `[start_s, start_s + desired_length]`, with
    /// interpolated points at both window edges. Every returned point's `s`
    /// is its route arc length.
    pub fn get_shortened_route(&self, start_s: f64, desired_length: f64) -> VecDeque<MapPoint> {
        let mut shortened = VecDeque::new();
        if self.center_lane.is_empty() {
            return shortened;
        }
        let end_s = start_s + desired_length;
        shortened.push_back(self.get_map_point_at_s(start_s));
        if let (Ok(lo), Ok(hi)) = (NotNan::new(start_s), NotNan::new(end_s)) {
            for (key, point) in self.center_lane.range(lo..hi) {
                if key.into_inner() > start_s {
                    let mut point = *point;
                    point.s = key.into_inner();
                    shortened.push_back(point);
                }
            }
        }
        shortened.push_back(self.get_map_point_at_s(end_s));
        shortened
    }

    /// The two samples around `distance` and the interpolation fraction
    /// between them, clamped to the first/last segment out of range.
    fn bracket(&self, distance: f64) -> Option<(MapPoint, MapPoint, f64)> {
        if self.center_lane.len() < 2 {
            return None;
        }
        let key = NotNan::new(distance).ok()?;

        let upper = self.center_lane.range(key..).next();
        match upper {
            None => {
                // Past the end: clamp onto the last segment.
                let mut rev = self.center_lane.iter().rev();
                let (_, p2) = rev.next().unwrap();
                let (_, p1) = rev.next().unwrap();
                Some((*p1, *p2, 1.0))
            }
            Some((k2, _)) if *k2 == *self.center_lane.keys().next().unwrap() => {
                // At or before the start: clamp onto the first segment.
                let mut fwd = self.center_lane.iter();
                let (_, p1) = fwd.next().unwrap();
                let (_, p2) = fwd.next().unwrap();
                Some((*p1, *p2, 0.0))
            }
            Some((k2, p2)) => {
                let (k1, p1) = self.center_lane.range(..*k2).next_back().unwrap();
                let denom = k2.into_inner() - k1.into_inner();
                let frac = if denom.abs() < 1e-9 {
                    0.0
                } else {
                    (distance - k1.into_inner()) / denom
                };
                Some((*p1, *p2, frac))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Border, Boundary, Connection, Lane, QuadTree, Road, RoadID};

    /// One straight lane per road along the x-axis, borders at y = ±2, so
    /// the centerline lies exactly on the axis.
    fn axis_map(segments: &[(u64, u64, f64, f64)]) -> Map {
        let mut map = Map::default();
        map.quadtree = QuadTree::new(Boundary::new(-10.0, 500.0, -50.0, 50.0).unwrap(), 10);
        for (road_id, lane_id, x0, x1) in segments {
            let n = (x1 - x0).round() as usize;
            let left: Vec<Point2d> = (0..=n).map(|i| Point2d::new(x0 + i as f64, 2.0)).collect();
            let right: Vec<Point2d> =
                (0..=n).map(|i| Point2d::new(x0 + i as f64, -2.0)).collect();
            let lane = Lane::new(
                Border::from_polyline(&left, LaneID(*lane_id)),
                Border::from_polyline(&right, LaneID(*lane_id)),
                LaneID(*lane_id),
                RoadID(*road_id),
                false,
            )
            .unwrap();
            for point in &lane.borders.center.interpolated_points {
                map.quadtree.insert(*point);
            }
            let mut road = Road::new("axis", RoadID(*road_id), "town", false);
            road.lanes.insert(LaneID(*lane_id));
            map.roads.insert(RoadID(*road_id), road);
            map.lanes.insert(LaneID(*lane_id), lane);
        }
        map
    }

    #[test]
    fn straight_route_projection_and_interpolation() {
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0)]));
        let route = Route::new(&Point2d::new(0.0, 0.0), &Point2d::new(100.0, 0.0), map);

        assert_eq!(route.sections.len(), 1);
        assert!((route.get_length() - 100.0).abs() < 0.6);

        let s = route.get_s(&Point2d::new(37.0, 0.1));
        assert!((s - 37.0).abs() < 0.1, "got s = {}", s);

        let pose = route.interpolate_at_s(50.0);
        assert!((pose.x - 50.0).abs() < 1e-6);
        assert!(pose.y.abs() < 1e-6);
        assert!(pose.yaw.abs() < 1e-9);

        // Clamps beyond both ends.
        assert!(route.interpolate_at_s(-5.0).x.abs() < 1e-6);
        assert!((route.interpolate_at_s(1000.0).x - route.get_length()).abs() < 0.6);
    }

    #[test]
    fn route_spans_consecutive_lanes() {
        let mut map = axis_map(&[(1, 11, 0.0, 100.0), (2, 12, 100.0, 200.0)]);
        map.lane_graph.add_connection(Connection {
            from_id: LaneID(11),
            to_id: LaneID(12),
            weight: 100.0,
        });
        let route = Route::new(
            &Point2d::new(5.0, 0.0),
            &Point2d::new(195.0, 0.0),
            Arc::new(map),
        );

        assert_eq!(route.sections.len(), 2);
        // Sections are contiguous in route_s.
        let first = route.sections[0];
        let second = route.sections[1];
        assert!((first.route_s + first.length() - second.route_s).abs() < 1e-9);

        let s = route.get_s(&Point2d::new(150.0, 0.2));
        // 95 m left on the first lane, then 50 m into the second.
        assert!((s - 145.0).abs() < 0.1, "got s = {}", s);

        let keys: Vec<f64> = route.s_to_sections.keys().map(|k| k.into_inner()).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn same_lane_backwards_route() {
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0)]));
        let route = Route::new(&Point2d::new(80.0, 0.0), &Point2d::new(20.0, 0.0), map);

        assert_eq!(route.sections.len(), 1);
        let section = route.sections[0];
        assert!(section.start_s > section.end_s);
        assert!((route.get_length() - 60.0).abs() < 0.1);

        // Halfway along the route sits at x = 50, heading in -x.
        let pose = route.interpolate_at_s(30.0);
        assert!((pose.x - 50.0).abs() < 0.6);
        assert!((pose.yaw.abs() - std::f64::consts::PI).abs() < 1e-6);

        let s = route.get_s(&Point2d::new(50.0, 0.0));
        assert!((s - 30.0).abs() < 0.1, "got s = {}", s);
    }

    #[test]
    fn unreachable_route_is_empty() {
        // Two disconnected roads.
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0), (2, 12, 300.0, 400.0)]));
        let route = Route::new(&Point2d::new(5.0, 0.0), &Point2d::new(395.0, 0.0), map);
        assert!(route.is_empty());
        assert!(route.get_s(&Point2d::new(5.0, 0.0)).is_infinite());
        assert_eq!(route.get_length(), 0.0);
    }

    #[test]
    fn get_s_clamps_beyond_the_destination() {
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0)]));
        let route = Route::new(&Point2d::new(0.0, 0.0), &Point2d::new(100.0, 0.0), map);
        // Far past the destination the projection lands on the last
        // centerline sample of the route's lane.
        let s = route.get_s(&Point2d::new(500.0, 0.0));
        assert!((s - route.get_length()).abs() < 0.6);
    }

    #[test]
    fn shortened_route_windows_the_centerline() {
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0)]));
        let route = Route::new(&Point2d::new(0.0, 0.0), &Point2d::new(100.0, 0.0), map);
        let window = route.get_shortened_route(20.0, 30.0);
        assert!(window.len() >= 2);
        assert!((window.front().unwrap().x - 20.0).abs() < 0.6);
        assert!((window.back().unwrap().x - 50.0).abs() < 0.6);
        let points: Vec<MapPoint> = window.iter().copied().collect();
        for pair in points.windows(2) {
            assert!(pair[1].x >= pair[0].x - 1e-9);
        }
    }

    #[test]
    fn map_point_interpolation_carries_lane_metadata() {
        let map = Arc::new(axis_map(&[(1, 11, 0.0, 100.0)]));
        let route = Route::new(&Point2d::new(0.0, 0.0), &Point2d::new(100.0, 0.0), map);
        let point = route.get_map_point_at_s(42.0);
        assert_eq!(point.parent_id, LaneID(11));
        assert!((point.x - 42.0).abs() < 0.6);
        assert!((point.s - 42.0).abs() < 1e-9);
    }
}

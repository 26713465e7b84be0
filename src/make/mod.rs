//! Map construction: turns normalized feed records into the published map.
//! Reference lines become roads, lane borders are classified left/right of
//! their reference, paired outward into lanes, and the quadtree and lane
//! graph are derived from the result. Malformed records are skipped; the
//! map covers whatever survived.

use std::collections::{BTreeMap, BTreeSet};

use crate::quadtree::DEFAULT_NODE_CAPACITY;
use crate::{
    distance_2d, Border, Boundary, Connection, Lane, LaneBorderRecord, LaneID, Map, QuadTree,
    ReferenceLineRecord, Result, Road, RoadGraph, RoadID,
};

/// Lane endpoints closer than this (in meters) are considered connected when
/// wiring the graph across road joints.
pub const CONNECTION_ENDPOINT_TOLERANCE: f64 = 2.0;

pub(crate) fn build_map(
    reference_lines: Vec<ReferenceLineRecord>,
    lane_borders: Vec<LaneBorderRecord>,
) -> Result<Map> {
    let mut roads: BTreeMap<RoadID, Road> = BTreeMap::new();
    let mut reference_borders: BTreeMap<RoadID, Border> = BTreeMap::new();
    // Directed road-level adjacency from successor/predecessor fields.
    let mut relations: BTreeSet<(RoadID, RoadID)> = BTreeSet::new();

    for record in &reference_lines {
        if record.id == 0 {
            warn!("skipping reference line without an id");
            continue;
        }
        if record.points.len() < 2 {
            warn!("skipping degenerate reference line {}", record.id);
            continue;
        }
        let road_id = RoadID(record.id);
        roads.insert(
            road_id,
            Road::new(&record.streetname, road_id, &record.category, record.oneway),
        );
        reference_borders.insert(road_id, Border::from_polyline(&record.points, LaneID(0)));
        if record.successor_id != 0 {
            relations.insert((road_id, RoadID(record.successor_id)));
        }
        if record.predecessor_id != 0 {
            relations.insert((RoadID(record.predecessor_id), road_id));
        }
    }

    let mut borders_by_road: BTreeMap<RoadID, Vec<&LaneBorderRecord>> = BTreeMap::new();
    for record in &lane_borders {
        if record.id == 0 {
            warn!("skipping lane border without an id");
            continue;
        }
        if record.points.len() < 2 {
            warn!("skipping degenerate lane border {}", record.id);
            continue;
        }
        let road_id = RoadID(record.parent_id);
        if !roads.contains_key(&road_id) {
            warn!(
                "lane border {} references unknown reference line {}",
                record.id, record.parent_id
            );
            continue;
        }
        borders_by_road.entry(road_id).or_default().push(record);
    }

    let mut lanes: BTreeMap<LaneID, Lane> = BTreeMap::new();
    for (road_id, records) in borders_by_road {
        let reference = &reference_borders[&road_id];
        let road = roads.get_mut(&road_id).unwrap();

        // Classify each border by its side of the reference line and its
        // offset from it, then pair outward along each side.
        let mut left_side = Vec::new();
        let mut right_side = Vec::new();
        for record in records {
            let border = Border::from_polyline(&record.points, LaneID(record.id));
            match classify_side(reference, &border) {
                Some((true, offset)) => left_side.push((offset, record, border)),
                Some((false, offset)) => right_side.push((offset, record, border)),
                None => {
                    warn!("could not classify lane border {} against {}", record.id, road_id);
                }
            }
        }
        left_side.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        right_side.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        build_lanes_for_side(reference, right_side, false, road, &mut lanes);
        build_lanes_for_side(reference, left_side, true, road, &mut lanes);
    }

    let quadtree = seed_quadtree(&lanes);
    let lane_graph = wire_lane_graph(&roads, &lanes, &relations);

    info!(
        "built map with {} roads, {} lanes, {} connections",
        roads.len(),
        lanes.len(),
        lane_graph.len()
    );

    Ok(Map {
        quadtree,
        lane_graph,
        roads,
        lanes,
        traffic_lights: Vec::new(),
    })
}

/// Whether `border` lies left of the reference line (by the cross product of
/// the reference tangent and the offset vector at the border's midpoint),
/// plus the offset distance used for outward ordering.
fn classify_side(reference: &Border, border: &Border) -> Option<(bool, f64)> {
    let midpoint = border.points[border.points.len() / 2];
    let projection = reference.project(&midpoint)?;
    let tangent = reference.tangent_at(projection.s)?;
    let offset = (midpoint.x - projection.x, midpoint.y - projection.y);
    let cross = tangent.0 * offset.1 - tangent.1 * offset.0;
    Some((cross > 0.0, distance_2d(&midpoint, &projection)))
}

/// Pairs one side's borders outward from the reference line into lanes:
/// (reference, first), (first, second), and so on. Each border is
/// reparameterized against the reference first so all lanes of the road
/// share its s-domain. The outer record of each pair names the lane.
fn build_lanes_for_side(
    reference: &Border,
    side: Vec<(f64, &LaneBorderRecord, Border)>,
    left_of_reference: bool,
    road: &mut Road,
    lanes: &mut BTreeMap<LaneID, Lane>,
) {
    let mut previous = reference.clone();
    for (_, record, mut border) in side {
        if let Err(err) = border.reparameterize_based_on_reference(reference) {
            warn!("skipping lane border {}: {}", record.id, err);
            continue;
        }
        let lane_id = LaneID(record.id);
        let (left, right) = if left_of_reference {
            (border.clone(), previous.clone())
        } else {
            (previous.clone(), border.clone())
        };
        match Lane::new(left, right, lane_id, road.id, left_of_reference) {
            Ok(mut lane) => {
                lane.set_type(&record.linetype, road.category);
                lane.set_material(&record.material);
                let speed_limit = lane.speed_limit;
                for point in lane
                    .borders
                    .center
                    .points
                    .iter_mut()
                    .chain(lane.borders.center.interpolated_points.iter_mut())
                {
                    point.max_speed = Some(speed_limit);
                }
                road.lanes.insert(lane_id);
                lanes.insert(lane_id, lane);
            }
            Err(err) => {
                warn!("failed to build {}: {}", lane_id, err);
            }
        }
        previous = border;
    }
}

/// A quadtree over every lane's center samples, bounded by the data plus a
/// meter of padding so edge samples always insert.
fn seed_quadtree(lanes: &BTreeMap<LaneID, Lane>) -> QuadTree<crate::MapPoint> {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for lane in lanes.values() {
        for point in &lane.borders.center.interpolated_points {
            let (x_min, x_max, y_min, y_max) =
                bounds.unwrap_or((point.x, point.x, point.y, point.y));
            bounds = Some((
                x_min.min(point.x),
                x_max.max(point.x),
                y_min.min(point.y),
                y_max.max(point.y),
            ));
        }
    }

    let boundary = match bounds {
        Some((x_min, x_max, y_min, y_max)) => Boundary {
            x_min: x_min - 1.0,
            x_max: x_max + 1.0,
            y_min: y_min - 1.0,
            y_max: y_max + 1.0,
        },
        None => {
            warn!("no centerline samples; map quadtree is empty");
            Boundary::default()
        }
    };

    let mut quadtree = QuadTree::new(boundary, DEFAULT_NODE_CAPACITY);
    for lane in lanes.values() {
        for point in &lane.borders.center.interpolated_points {
            quadtree.insert(*point);
        }
    }
    quadtree
}

/// Connects lanes across related roads wherever one lane's travel end meets
/// another's travel start. Trying both directions per road pair covers the
/// against-reference lanes of two-way roads.
fn wire_lane_graph(
    roads: &BTreeMap<RoadID, Road>,
    lanes: &BTreeMap<LaneID, Lane>,
    relations: &BTreeSet<(RoadID, RoadID)>,
) -> RoadGraph {
    let mut graph = RoadGraph::new();
    for (from_road, to_road) in relations {
        let (upstream, downstream) = match (roads.get(from_road), roads.get(to_road)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                warn!("relation references unknown road {} or {}", from_road, to_road);
                continue;
            }
        };
        for a in &upstream.lanes {
            for b in &downstream.lanes {
                connect_if_adjacent(lanes, &mut graph, *a, *b);
                connect_if_adjacent(lanes, &mut graph, *b, *a);
            }
        }
    }
    graph
}

fn connect_if_adjacent(
    lanes: &BTreeMap<LaneID, Lane>,
    graph: &mut RoadGraph,
    from: LaneID,
    to: LaneID,
) {
    let (from_lane, to_lane) = match (lanes.get(&from), lanes.get(&to)) {
        (Some(f), Some(t)) => (f, t),
        _ => return,
    };
    let end = travel_endpoint(from_lane, true);
    let start = travel_endpoint(to_lane, false);
    if let (Some(end), Some(start)) = (end, start) {
        if distance_2d(end, start) < CONNECTION_ENDPOINT_TOLERANCE {
            graph.add_connection(Connection {
                from_id: from,
                to_id: to,
                weight: from_lane.length.max(0.0),
            });
        }
    }
}

/// The centerline sample where travel enters (`end == false`) or leaves
/// (`end == true`) the lane, honoring reversed left-of-reference lanes.
fn travel_endpoint(lane: &Lane, end: bool) -> Option<&crate::MapPoint> {
    let samples = &lane.borders.center.interpolated_points;
    // Left-of-reference lanes run against increasing s: they enter at the
    // last sample and leave at the first.
    if lane.left_of_reference == end {
        samples.first()
    } else {
        samples.last()
    }
}

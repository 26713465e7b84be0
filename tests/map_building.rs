//! End-to-end construction: raw feature documents through the feed into a
//! map, then routing, projection, and submap queries against it.

use std::sync::Arc;

use serde_json::{json, Value};

use lane_map::{
    BorderFeed, FeatureCollectionFeed, LaneID, LaneType, Map, Point2d, RoadID, Route,
    DRIVING_SPEED_LIMIT_TOWN,
};

fn coordinates(y: f64, x0: f64, x1: f64) -> Value {
    let n = ((x1 - x0) / 5.0).round() as i64;
    Value::Array(
        (0..=n)
            .map(|i| json!([x0 + i as f64 * 5.0, y]))
            .collect(),
    )
}

fn reference_feature(id: u64, y: f64, x0: f64, x1: f64, successor: u64) -> Value {
    json!({
        "properties": {
            "id": id,
            "streetname": "Lilienthalplatz",
            "category": "town",
            "oneway": "false",
            "successor_id": successor,
        },
        "geometry": { "coordinates": coordinates(y, x0, x1) }
    })
}

fn border_feature(id: u64, parent: u64, y: f64, x0: f64, x1: f64) -> Value {
    json!({
        "properties": {
            "id": id,
            "parent_id": parent,
            "type": "driving",
            "material": "asphalt",
        },
        "geometry": { "coordinates": coordinates(y, x0, x1) }
    })
}

/// Two town roads end to end along the x-axis, one driving lane each below
/// the reference line (centerline at y = -2).
fn build_test_map() -> Map {
    let references = json!({ "features": [
        reference_feature(1, 0.0, 0.0, 100.0, 2),
        reference_feature(2, 0.0, 100.0, 200.0, 0),
    ]});
    let borders = json!({ "features": [
        border_feature(11, 1, -4.0, 0.0, 100.0),
        border_feature(21, 2, -4.0, 100.0, 200.0),
    ]});
    let mut feed = FeatureCollectionFeed::new(references, borders);
    Map::from_feed(&mut feed).unwrap()
}

#[test]
fn feature_documents_become_a_queryable_map() {
    let map = build_test_map();

    assert_eq!(map.roads.len(), 2);
    assert_eq!(map.lanes.len(), 2);
    assert_eq!(map.roads[&RoadID(1)].name, "Lilienthalplatz");

    let lane = &map.lanes[&LaneID(11)];
    assert_eq!(lane.lane_type, LaneType::Driving);
    assert!((lane.get_width(50.0) - 4.0).abs() < 0.01);
    assert!((map.get_lane_speed_limit(LaneID(11)) - DRIVING_SPEED_LIMIT_TOWN).abs() < 1e-9);

    assert!(map.is_point_on_road(&Point2d::new(50.0, -2.0)));
    assert!(map.is_point_on_road(&Point2d::new(150.0, -3.5)));
    assert!(!map.is_point_on_road(&Point2d::new(50.0, 10.0)));
}

#[test]
fn route_spans_the_road_joint() {
    let map = Arc::new(build_test_map());
    let route = Route::new(
        &Point2d::new(5.0, -2.0),
        &Point2d::new(195.0, -2.0),
        map,
    );

    assert_eq!(route.sections.len(), 2);
    assert!((route.get_length() - 190.0).abs() < 1.0);

    // Projection a few centimeters off the centerline.
    let s = route.get_s(&Point2d::new(150.0, -1.8));
    assert!((s - 145.0).abs() < 0.2, "got s = {}", s);

    let pose = route.interpolate_at_s(50.0);
    assert!((pose.x - 55.0).abs() < 0.6);
    assert!((pose.y + 2.0).abs() < 0.1);
    assert!(pose.yaw.abs() < 1e-6);

    let point = route.get_map_point_at_s(42.0);
    assert_eq!(point.parent_id, LaneID(11));

    let window = route.get_shortened_route(10.0, 50.0);
    assert!(window.len() >= 2);
    assert!(window.iter().all(|p| (p.y + 2.0).abs() < 0.1));
}

#[test]
fn submap_keeps_only_windowed_lanes() {
    let map = build_test_map();
    let submap = map.get_submap(&Point2d::new(40.0, -2.0), 60.0, 30.0);

    assert!(submap.lanes.contains_key(&LaneID(11)));
    assert!(!submap.lanes.contains_key(&LaneID(21)));
    assert_eq!(submap.roads.len(), 1);
    assert!(submap.is_point_on_road(&Point2d::new(40.0, -2.0)));
}

#[test]
fn static_feed_and_collection_feed_agree() {
    let references = json!({ "features": [reference_feature(1, 0.0, 0.0, 100.0, 0)] });
    let borders = json!({ "features": [border_feature(11, 1, -4.0, 0.0, 100.0)] });

    let mut collection_feed = FeatureCollectionFeed::new(references, borders);
    let reference_records = collection_feed.reference_lines().unwrap();
    let border_records = collection_feed.lane_borders().unwrap();
    assert_eq!(reference_records.len(), 1);
    assert!(!reference_records[0].oneway);

    let mut static_feed = lane_map::StaticFeed::new(reference_records, border_records);
    let map = Map::from_feed(&mut static_feed).unwrap();
    assert_eq!(map.lanes.len(), 1);
}

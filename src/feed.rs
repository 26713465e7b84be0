//! The border feed: the seam between the map core and whatever produces
//! road geometry. Upstream collaborators (the remote feature service, file
//! ingestion) deliver reference-line and lane-border records; this module
//! defines those records, the feed trait, and the normalization of raw
//! GeoJSON-style feature documents into records.
//!
//! Normalization contract: missing or empty string properties become the
//! literal `"NULL"`, missing integers become 0, `oneway` parses
//! case-insensitively, and coordinates are rounded to six decimal places.
//! Malformed features are logged and skipped; ingestion never aborts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MapError, Point2d, Result};

/// A source of road-geometry records in a projected metric frame.
pub trait BorderFeed {
    fn reference_lines(&mut self) -> Result<Vec<ReferenceLineRecord>>;
    fn lane_borders(&mut self) -> Result<Vec<LaneBorderRecord>>;
}

/// The centerline of one road segment, anchoring its lanes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLineRecord {
    pub id: u64,
    pub points: Vec<Point2d>,
    pub streetname: String,
    pub turn: String,
    pub category: String,
    pub oneway: bool,
    pub linetype: String,
    /// 0 when the road has no successor.
    pub successor_id: u64,
    /// 0 when the road has no predecessor.
    pub predecessor_id: u64,
    pub datasource_description_id: u64,
}

/// One side of a single lane, attached to a parent reference line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneBorderRecord {
    pub id: u64,
    pub points: Vec<Point2d>,
    /// The reference line this border hangs off.
    pub parent_id: u64,
    pub material: String,
    pub linetype: String,
    pub datasource_description_id: u64,
}

impl ReferenceLineRecord {
    /// Normalizes one feature document. Fails with `FeedFormat` when the
    /// feature lacks properties or usable geometry.
    pub fn from_feature(feature: &Value) -> Result<ReferenceLineRecord> {
        let props = feature
            .get("properties")
            .ok_or_else(|| MapError::FeedFormat("feature has no properties".to_string()))?;
        Ok(ReferenceLineRecord {
            id: int_prop(props, "id"),
            points: parse_coordinates(feature)?,
            streetname: string_prop(props, "streetname"),
            turn: string_prop(props, "turn"),
            category: string_prop(props, "category"),
            oneway: bool_prop(props, "oneway"),
            linetype: string_prop(props, "linetype"),
            successor_id: int_prop(props, "successor_id"),
            predecessor_id: int_prop(props, "predecessor_id"),
            datasource_description_id: int_prop(props, "datasource_description_id"),
        })
    }
}

impl LaneBorderRecord {
    pub fn from_feature(feature: &Value) -> Result<LaneBorderRecord> {
        let props = feature
            .get("properties")
            .ok_or_else(|| MapError::FeedFormat("feature has no properties".to_string()))?;
        Ok(LaneBorderRecord {
            id: int_prop(props, "id"),
            points: parse_coordinates(feature)?,
            parent_id: int_prop(props, "parent_id"),
            material: string_prop(props, "material"),
            // The service exposes the lane type under "type".
            linetype: string_prop(props, "type"),
            datasource_description_id: int_prop(props, "datasource_description_id"),
        })
    }
}

/// All well-formed reference lines of a feature collection; malformed
/// entries are logged and skipped.
pub fn parse_reference_lines(document: &Value) -> Vec<ReferenceLineRecord> {
    features_of(document)
        .iter()
        .filter_map(|feature| match ReferenceLineRecord::from_feature(feature) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("skipping reference line: {}", err);
                None
            }
        })
        .collect()
}

/// All well-formed lane borders of a feature collection.
pub fn parse_lane_borders(document: &Value) -> Vec<LaneBorderRecord> {
    features_of(document)
        .iter()
        .filter_map(|feature| match LaneBorderRecord::from_feature(feature) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("skipping lane border: {}", err);
                None
            }
        })
        .collect()
}

fn features_of(document: &Value) -> Vec<Value> {
    match document.get("features").and_then(Value::as_array) {
        Some(features) => features.clone(),
        None => {
            error!("feature collection has no 'features' array");
            Vec::new()
        }
    }
}

fn string_prop(props: &Value, key: &str) -> String {
    match props.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => "NULL".to_string(),
    }
}

fn int_prop(props: &Value, key: &str) -> u64 {
    props.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn bool_prop(props: &Value, key: &str) -> bool {
    match props.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Rounds a coordinate to six decimal places, the service's resolution.
pub fn round_to_six_decimal_places(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

fn parse_coordinates(feature: &Value) -> Result<Vec<Point2d>> {
    let coordinates = feature
        .get("geometry")
        .and_then(|geometry| geometry.get("coordinates"))
        .and_then(Value::as_array)
        .ok_or_else(|| MapError::FeedFormat("feature has no coordinate array".to_string()))?;

    let mut points = Vec::with_capacity(coordinates.len());
    for coordinate in coordinates {
        let pair = coordinate.as_array().filter(|pair| pair.len() >= 2);
        let (x, y) = match pair {
            Some(pair) => match (pair[0].as_f64(), pair[1].as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    warn!("invalid coordinate pair in feature, skipping point");
                    continue;
                }
            },
            None => {
                warn!("invalid coordinate format in feature, skipping point");
                continue;
            }
        };
        points.push(Point2d::new(
            round_to_six_decimal_places(x),
            round_to_six_decimal_places(y),
        ));
    }
    Ok(points)
}

/// A feed over records built elsewhere (e.g. by the file-ingestion
/// collaborator). Each accessor hands its records over once.
#[derive(Clone, Debug, Default)]
pub struct StaticFeed {
    pub reference_lines: Vec<ReferenceLineRecord>,
    pub lane_borders: Vec<LaneBorderRecord>,
}

impl StaticFeed {
    pub fn new(
        reference_lines: Vec<ReferenceLineRecord>,
        lane_borders: Vec<LaneBorderRecord>,
    ) -> StaticFeed {
        StaticFeed {
            reference_lines,
            lane_borders,
        }
    }
}

impl BorderFeed for StaticFeed {
    fn reference_lines(&mut self) -> Result<Vec<ReferenceLineRecord>> {
        Ok(std::mem::take(&mut self.reference_lines))
    }

    fn lane_borders(&mut self) -> Result<Vec<LaneBorderRecord>> {
        Ok(std::mem::take(&mut self.lane_borders))
    }
}

/// A feed over the raw feature collections the remote service returns (and
/// the map cache stores).
#[derive(Clone, Debug)]
pub struct FeatureCollectionFeed {
    reference_lines: Value,
    lane_borders: Value,
}

impl FeatureCollectionFeed {
    pub fn new(reference_lines: Value, lane_borders: Value) -> FeatureCollectionFeed {
        FeatureCollectionFeed {
            reference_lines,
            lane_borders,
        }
    }
}

impl BorderFeed for FeatureCollectionFeed {
    fn reference_lines(&mut self) -> Result<Vec<ReferenceLineRecord>> {
        Ok(parse_reference_lines(&self.reference_lines))
    }

    fn lane_borders(&mut self) -> Result<Vec<LaneBorderRecord>> {
        Ok(parse_lane_borders(&self.lane_borders))
    }
}

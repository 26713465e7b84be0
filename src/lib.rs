//! Builds a queryable lane-graph representation of a road network from raw
//! road-geometry features: reference-road centerlines and lane-border
//! polylines in a projected metric frame. On top of that representation it
//! answers nearest-lane lookups, routes between lanes, interpolates poses at
//! arc-length along a route, and caches persisted tile responses from a
//! remote feature service in a two-level (RAM + disk) cache.
//!
//! Construction flow: a [`BorderFeed`] yields reference-line and lane-border
//! records; `make` pairs borders into [`Lane`]s, groups lanes into [`Road`]s,
//! seeds a [`QuadTree`] with centerline samples, and wires the directed
//! [`RoadGraph`] from successor/predecessor relations. The assembled [`Map`]
//! is immutable afterwards; [`Route`]s share it read-only.

#[macro_use]
extern crate log;

mod border;
mod cache;
mod feed;
mod geometry;
mod graph;
mod lane;
mod make;
mod map;
mod quadtree;
mod road;
mod route;
mod spline;
mod traffic_light;

pub use crate::border::{Border, Borders};
pub use crate::cache::{
    BlobStore, FsBlobStore, MapCache, MemoryBlobStore, DEFAULT_DISK_CACHE_SIZE,
    DEFAULT_RAM_CACHE_SIZE,
};
pub use crate::feed::{
    parse_lane_borders, parse_reference_lines, round_to_six_decimal_places, BorderFeed,
    FeatureCollectionFeed, LaneBorderRecord, ReferenceLineRecord, StaticFeed,
};
pub use crate::geometry::{distance_2d, MapPoint, PlanarPoint, Point2d, Pose2d};
pub use crate::graph::{Connection, RoadGraph};
pub use crate::lane::{
    Lane, LaneID, LaneMaterial, LaneType, BIKING_SPEED_LIMIT, DEFAULT_SPEED_LIMIT,
    DRIVING_SPEED_LIMIT_LOW_SPEED, DRIVING_SPEED_LIMIT_MOTORWAY, DRIVING_SPEED_LIMIT_RURAL,
    DRIVING_SPEED_LIMIT_TOWN, PARKING_SPEED_LIMIT, PEDESTRIAN_SPEED_LIMIT,
    RESTRICTED_SPEED_LIMIT,
};
pub use crate::make::CONNECTION_ENDPOINT_TOLERANCE;
pub use crate::map::{Map, UNKNOWN_LANE_SPEED_LIMIT};
pub use crate::quadtree::{Boundary, QuadTree, DEFAULT_NODE_CAPACITY};
pub use crate::road::{Road, RoadCategory, RoadID};
pub use crate::route::{Route, RouteSection};
pub use crate::spline::BorderSpline;
pub use crate::traffic_light::{TrafficLight, TrafficLightState};

use thiserror::Error;

/// Spacing in meters between uniformly resampled border points.
pub const BORDER_SPACING: f64 = 0.5;

/// Consecutive border points closer than this (in arc length) collapse into
/// one.
pub const DUPLICATE_POINT_EPSILON: f64 = 1e-6;

/// Everything that can go wrong in map construction, queries, and caching.
///
/// Queries that merely find nothing (no nearest point, no path, cache miss)
/// return an empty result instead of an error; these variants are for hard
/// failures only.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cache I/O: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("malformed feed record: {0}")]
    FeedFormat(String),
}

pub type Result<T> = std::result::Result<T, MapError>;

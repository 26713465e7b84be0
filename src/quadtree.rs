//! An adaptive point quadtree over the map's centerline samples. Supports
//! rectangular and radius range queries plus a best-first nearest-neighbor
//! search that takes an arbitrary predicate, which is how a route restricts
//! "nearest point" to its own lanes.

use serde::{Deserialize, Serialize};

use crate::{distance_2d, MapError, PlanarPoint, Result};

/// Default number of points a node holds before subdividing.
pub const DEFAULT_NODE_CAPACITY: usize = 10;

/// An axis-aligned rectangle `[x_min, x_max] × [y_min, y_max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Boundary {
    /// Fails with `InvalidInput` when the corners are swapped.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<Boundary> {
        if x_min > x_max || y_min > y_max {
            return Err(MapError::InvalidInput(format!(
                "mismatched boundary corners: [{}, {}] x [{}, {}]",
                x_min, x_max, y_min, y_max
            )));
        }
        Ok(Boundary {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// The window of the given size around a center point.
    pub fn centered_on<P: PlanarPoint>(center: &P, width: f64, height: f64) -> Boundary {
        Boundary {
            x_min: center.x() - width / 2.0,
            x_max: center.x() + width / 2.0,
            y_min: center.y() - height / 2.0,
            y_max: center.y() + height / 2.0,
        }
    }

    pub fn contains<P: PlanarPoint>(&self, point: &P) -> bool {
        point.x() >= self.x_min
            && point.x() <= self.x_max
            && point.y() >= self.y_min
            && point.y() <= self.y_max
    }

    pub fn intersects(&self, range: &Boundary) -> bool {
        !(range.x_min > self.x_max
            || range.x_max < self.x_min
            || range.y_min > self.y_max
            || range.y_max < self.y_min)
    }

    /// Shortest distance from a point to this rectangle; zero inside. Used
    /// to prune subtrees during nearest-neighbor descent.
    pub fn distance_to_point<P: PlanarPoint>(&self, point: &P) -> f64 {
        let dx = (self.x_min - point.x()).max(0.0).max(point.x() - self.x_max);
        let dy = (self.y_min - point.y()).max(0.0).max(point.y() - self.y_max);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn intersects_circle<P: PlanarPoint>(&self, center: &P, radius: f64) -> bool {
        self.distance_to_point(center) <= radius
    }
}

/// Children partition the parent boundary at its midpoint, in fixed
/// NW, NE, SW, SE order.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Quadrants<P> {
    northwest: QuadTree<P>,
    northeast: QuadTree<P>,
    southwest: QuadTree<P>,
    southeast: QuadTree<P>,
}

impl<P> Quadrants<P> {
    fn iter(&self) -> [&QuadTree<P>; 4] {
        [
            &self.northwest,
            &self.northeast,
            &self.southwest,
            &self.southeast,
        ]
    }

    fn iter_mut(&mut self) -> [&mut QuadTree<P>; 4] {
        [
            &mut self.northwest,
            &mut self.northeast,
            &mut self.southwest,
            &mut self.southeast,
        ]
    }
}

/// A quadtree node. A node is either a leaf holding at most `capacity`
/// points, or divided into four children and holding none.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuadTree<P> {
    pub boundary: Boundary,
    pub capacity: usize,
    points: Vec<P>,
    children: Option<Box<Quadrants<P>>>,
}

impl<P> Default for QuadTree<P> {
    fn default() -> Self {
        QuadTree {
            boundary: Boundary::default(),
            capacity: DEFAULT_NODE_CAPACITY,
            points: Vec::new(),
            children: None,
        }
    }
}

impl<P: PlanarPoint + Clone> QuadTree<P> {
    pub fn new(boundary: Boundary, capacity: usize) -> QuadTree<P> {
        QuadTree {
            boundary,
            capacity: capacity.max(1),
            points: Vec::new(),
            children: None,
        }
    }

    /// Inserts a point; false if it lies outside this node's boundary. On
    /// overflow the node subdivides and redistributes its points, after
    /// which every insert descends to the first accepting child.
    pub fn insert(&mut self, point: P) -> bool {
        if !self.boundary.contains(&point) {
            return false;
        }

        if self.children.is_none() {
            if self.points.len() < self.capacity {
                self.points.push(point);
                return true;
            }
            self.subdivide();
        }

        let children = self.children.as_mut().unwrap();
        for child in children.iter_mut() {
            if child.insert(point.clone()) {
                return true;
            }
        }
        // Unreachable when the children exactly partition the boundary.
        error!("quadtree subdivision failed to place a point");
        false
    }

    /// Appends every point inside the axis-aligned `range` to `found`, in
    /// NW, NE, SW, SE depth-first order.
    pub fn query(&self, range: &Boundary, found: &mut Vec<P>) {
        if !self.boundary.intersects(range) {
            return;
        }
        for point in &self.points {
            if range.contains(point) {
                found.push(point.clone());
            }
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(range, found);
            }
        }
    }

    /// Appends every point within `radius` of `center` to `found`.
    pub fn query_range<Q: PlanarPoint>(&self, center: &Q, radius: f64, found: &mut Vec<P>) {
        if !self.boundary.intersects_circle(center, radius) {
            return;
        }
        for point in &self.points {
            if distance_2d(point, center) <= radius {
                found.push(point.clone());
            }
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_range(center, radius, found);
            }
        }
    }

    /// Nearest stored point to `query_point`. The caller seeds `min_dist`
    /// (infinity for an unbounded search) and receives the winning distance
    /// back through it.
    pub fn get_nearest_point<Q: PlanarPoint>(
        &self,
        query_point: &Q,
        min_dist: &mut f64,
    ) -> Option<P> {
        self.get_nearest_point_filtered(query_point, min_dist, &|_| true)
    }

    /// Nearest stored point satisfying `filter`. Best-first descent: children
    /// are visited in ascending boundary-distance order and pruned once the
    /// boundary distance reaches the current best. Ties keep the first point
    /// found.
    pub fn get_nearest_point_filtered<Q: PlanarPoint>(
        &self,
        query_point: &Q,
        min_dist: &mut f64,
        filter: &dyn Fn(&P) -> bool,
    ) -> Option<P> {
        let mut nearest = None;

        for point in &self.points {
            if !filter(point) {
                continue;
            }
            let dist = distance_2d(point, query_point);
            if dist < *min_dist {
                *min_dist = dist;
                nearest = Some(point.clone());
            }
        }

        if let Some(children) = &self.children {
            let mut quadrants: Vec<(f64, &QuadTree<P>)> = children
                .iter()
                .into_iter()
                .map(|child| (child.boundary.distance_to_point(query_point), child))
                .collect();
            quadrants.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

            for (dist_to_boundary, quadrant) in quadrants {
                if dist_to_boundary >= *min_dist {
                    // The list is sorted, so everything after is farther too.
                    break;
                }
                if let Some(child_nearest) =
                    quadrant.get_nearest_point_filtered(query_point, min_dist, filter)
                {
                    nearest = Some(child_nearest);
                }
            }
        }

        nearest
    }

    pub fn len(&self) -> usize {
        self.points.len()
            + self
                .children
                .as_ref()
                .map(|c| c.iter().into_iter().map(|child| child.len()).sum())
                .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subdivide(&mut self) {
        let x_mid = (self.boundary.x_min + self.boundary.x_max) / 2.0;
        let y_mid = (self.boundary.y_min + self.boundary.y_max) / 2.0;
        let quad = |x_min, x_max, y_min, y_max| {
            QuadTree::new(
                Boundary {
                    x_min,
                    x_max,
                    y_min,
                    y_max,
                },
                self.capacity,
            )
        };
        let mut children = Box::new(Quadrants {
            northwest: quad(self.boundary.x_min, x_mid, y_mid, self.boundary.y_max),
            northeast: quad(x_mid, self.boundary.x_max, y_mid, self.boundary.y_max),
            southwest: quad(self.boundary.x_min, x_mid, self.boundary.y_min, y_mid),
            southeast: quad(x_mid, self.boundary.x_max, self.boundary.y_min, y_mid),
        });

        for point in self.points.drain(..) {
            let mut inserted = false;
            for child in children.iter_mut() {
                if child.insert(point.clone()) {
                    inserted = true;
                    break;
                }
            }
            if !inserted {
                error!("quadtree subdivision dropped a point outside all quadrants");
            }
        }
        self.children = Some(children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LaneID, MapPoint, Point2d};

    fn square_tree() -> QuadTree<MapPoint> {
        let boundary = Boundary::new(-2.0, 2.0, -2.0, 2.0).unwrap();
        let mut tree = QuadTree::new(boundary, 2);
        for (i, (x, y)) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .enumerate()
        {
            let mut p = MapPoint::new(*x, *y, LaneID(i as u64));
            p.s = i as f64;
            assert!(tree.insert(p));
        }
        tree
    }

    #[test]
    fn boundary_rejects_swapped_corners() {
        assert!(Boundary::new(1.0, -1.0, 0.0, 1.0).is_err());
        assert!(Boundary::new(-1.0, 1.0, -1.0, 1.0).is_ok());
    }

    #[test]
    fn four_point_square_nearest_and_range() {
        let tree = square_tree();

        let mut min_dist = f64::INFINITY;
        let nearest = tree
            .get_nearest_point(&Point2d::new(0.4, 0.4), &mut min_dist)
            .unwrap();
        assert_eq!((nearest.x, nearest.y), (0.0, 0.0));
        assert!((min_dist - (0.4f64.powi(2) * 2.0).sqrt()).abs() < 1e-9);

        let mut found = Vec::new();
        tree.query(&Boundary::new(0.5, 1.5, 0.5, 1.5).unwrap(), &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].x, found[0].y), (1.0, 1.0));
    }

    #[test]
    fn insert_outside_boundary_is_rejected() {
        let mut tree = square_tree();
        assert!(!tree.insert(MapPoint::new(5.0, 5.0, LaneID(9))));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn range_query_matches_brute_force() {
        let boundary = Boundary::new(0.0, 100.0, 0.0, 100.0).unwrap();
        let mut tree = QuadTree::new(boundary, 4);
        let mut all = Vec::new();
        // A deterministic scatter with enough points to force subdivision.
        for i in 0..200u64 {
            let x = ((i * 37) % 101) as f64;
            let y = ((i * 61) % 97) as f64;
            let p = MapPoint::new(x, y, LaneID(i));
            assert!(tree.insert(p));
            all.push(p);
        }
        assert_eq!(tree.len(), 200);

        let range = Boundary::new(20.0, 60.0, 10.0, 50.0).unwrap();
        let mut found = Vec::new();
        tree.query(&range, &mut found);
        let expected = all.iter().filter(|p| range.contains(*p)).count();
        assert_eq!(found.len(), expected);

        // Radius query against the same scatter.
        let center = Point2d::new(50.0, 50.0);
        let mut in_disk = Vec::new();
        tree.query_range(&center, 25.0, &mut in_disk);
        let expected_disk = all
            .iter()
            .filter(|p| distance_2d(*p, &center) <= 25.0)
            .count();
        assert_eq!(in_disk.len(), expected_disk);

        // Nearest-neighbor beats brute force for several probes.
        for probe in [(13.0, 77.0), (0.0, 0.0), (99.5, 1.5)] {
            let q = Point2d::new(probe.0, probe.1);
            let mut min_dist = f64::INFINITY;
            let nearest = tree.get_nearest_point(&q, &mut min_dist).unwrap();
            let best = all
                .iter()
                .map(|p| distance_2d(p, &q))
                .fold(f64::INFINITY, f64::min);
            assert!((distance_2d(&nearest, &q) - best).abs() < 1e-9);
        }
    }

    #[test]
    fn filtered_nearest_skips_excluded_lanes() {
        let tree = square_tree();
        let mut min_dist = f64::INFINITY;
        // Without the lane-0 point, (1, 0) is closest to the probe.
        let nearest = tree
            .get_nearest_point_filtered(&Point2d::new(0.4, 0.2), &mut min_dist, &|p| {
                p.parent_id != LaneID(0)
            })
            .unwrap();
        assert_eq!((nearest.x, nearest.y), (1.0, 0.0));
    }

    #[test]
    fn filtered_nearest_can_find_nothing() {
        let tree = square_tree();
        let mut min_dist = f64::INFINITY;
        let nearest =
            tree.get_nearest_point_filtered(&Point2d::new(0.0, 0.0), &mut min_dist, &|_| false);
        assert!(nearest.is_none());
        assert!(min_dist.is_infinite());
    }

    #[test]
    fn divided_nodes_hold_no_points() {
        let boundary = Boundary::new(0.0, 16.0, 0.0, 16.0).unwrap();
        let mut tree = QuadTree::new(boundary, 2);
        for i in 0..12u64 {
            let p = MapPoint::new((i % 4) as f64 * 4.0 + 1.0, (i / 4) as f64 * 4.0 + 1.0, LaneID(i));
            assert!(tree.insert(p));
        }
        fn check(node: &QuadTree<MapPoint>) {
            if node.children.is_some() {
                assert!(node.points.is_empty());
                for child in node.children.as_ref().unwrap().iter() {
                    check(child);
                }
            } else {
                assert!(node.points.len() <= node.capacity);
            }
        }
        check(&tree);
        assert_eq!(tree.len(), 12);
    }
}

//! Borders: the ordered polylines along lane edges. A `Border` carries its
//! raw points (with cumulative arc length), an optional fitted spline, and a
//! uniformly resampled copy used for width queries, centerline construction,
//! and quadtree seeding. `Borders` is the inner/outer/center triple owned by
//! a lane.

use serde::{Deserialize, Serialize};

use crate::{
    distance_2d, BorderSpline, LaneID, MapError, MapPoint, PlanarPoint, Point2d, Result,
    DUPLICATE_POINT_EPSILON,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Border {
    /// Original points, ordered, s ascending after `compute_s_values`.
    pub points: Vec<MapPoint>,
    pub spline: Option<BorderSpline>,
    /// Uniformly spaced resample of the polyline, in s order.
    pub interpolated_points: Vec<MapPoint>,
    pub length: f64,
}

impl Border {
    /// Builds a border from raw positions: assigns arc lengths, drops
    /// duplicates, computes the length.
    pub fn from_polyline(polyline: &[Point2d], parent_id: LaneID) -> Border {
        let mut border = Border {
            points: polyline
                .iter()
                .map(|p| MapPoint::new(p.x, p.y, parent_id))
                .collect(),
            ..Default::default()
        };
        border.compute_s_values();
        border.compute_length();
        border
    }

    pub fn parent_id(&self) -> LaneID {
        self.points.first().map(|p| p.parent_id).unwrap_or(LaneID(0))
    }

    /// Assigns cumulative chord length to each point and drops consecutive
    /// points closer than `DUPLICATE_POINT_EPSILON`. Afterwards the
    /// s-sequence is strictly increasing.
    pub fn compute_s_values(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.points[0].s = 0.0;
        for i in 1..self.points.len() {
            let ds = distance_2d(&self.points[i], &self.points[i - 1]);
            self.points[i].s = self.points[i - 1].s + ds;
        }
        remove_duplicate_points(&mut self.points);
    }

    pub fn compute_length(&mut self) -> f64 {
        self.length = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.s - first.s,
            _ => 0.0,
        };
        self.length
    }

    pub fn get_length(&self) -> f64 {
        self.length
    }

    pub fn initialize_spline(&mut self) -> Result<()> {
        self.spline = Some(BorderSpline::new(&self.points)?);
        Ok(())
    }

    /// Resamples the border at the given arc lengths, replacing
    /// `interpolated_points`. Fits the spline first if it hasn't been.
    pub fn interpolate_border(&mut self, s_values: &[f64]) -> Result<()> {
        if self.spline.is_none() {
            self.initialize_spline()?;
        }
        let spline = self.spline.as_ref().unwrap();
        let parent_id = self.parent_id();
        // The spline's own chord parameterization starts at zero; shift the
        // queries when this border's s-domain doesn't.
        let s_offset = self.points.first().map(|p| p.s).unwrap_or(0.0);
        self.interpolated_points = s_values
            .iter()
            .map(|s| {
                let pos = spline.point_at(*s - s_offset);
                let mut point = MapPoint::new(pos.x, pos.y, parent_id);
                point.s = *s;
                point
            })
            .collect();
        Ok(())
    }

    /// Drops internal points whose turning angle exceeds the threshold.
    /// Sharp kinks make the cubic fit oscillate, so they're removed before
    /// `initialize_spline`. Arc lengths are recomputed afterwards.
    pub fn preprocess_points_for_spline(&mut self, angle_threshold_degrees: f64) {
        if self.points.len() < 3 {
            return;
        }
        let mut kept = vec![self.points[0]];
        for i in 1..self.points.len() - 1 {
            let prev = kept.last().unwrap();
            let here = self.points[i];
            let next = self.points[i + 1];
            let incoming = (here.x - prev.x, here.y - prev.y);
            let outgoing = (next.x - here.x, next.y - here.y);
            let norms = (incoming.0.hypot(incoming.1)) * (outgoing.0.hypot(outgoing.1));
            if norms == 0.0 {
                kept.push(here);
                continue;
            }
            let cos = ((incoming.0 * outgoing.0 + incoming.1 * outgoing.1) / norms).clamp(-1.0, 1.0);
            if cos.acos().to_degrees() <= angle_threshold_degrees {
                kept.push(here);
            }
        }
        kept.push(*self.points.last().unwrap());
        self.points = kept;
        self.compute_s_values();
        self.compute_length();
    }

    /// Interpolated position at arc length `s`, linearly between the two
    /// bracketing uniform samples, clamped at the ends. Falls back to the
    /// raw polyline when the border hasn't been resampled.
    pub fn get_interpolated_point(&self, s: f64) -> Option<MapPoint> {
        let points = if self.interpolated_points.is_empty() {
            &self.points
        } else {
            &self.interpolated_points
        };
        interpolate_on_polyline(points, s)
    }

    /// Arc length of the nearest point on the polyline, by piecewise-linear
    /// projection. Ties resolve to the smaller s.
    pub fn find_nearest_s<P: PlanarPoint>(&self, point: &P) -> f64 {
        self.project(point).map(|p| p.s).unwrap_or(0.0)
    }

    /// Projects `point` onto the polyline; returns the closest position with
    /// its arc length. None for a degenerate border.
    pub fn project<P: PlanarPoint>(&self, point: &P) -> Option<MapPoint> {
        if self.points.len() == 1 {
            return Some(self.points[0]);
        }
        let mut best: Option<(f64, MapPoint)> = None;
        for pair in self.points.windows(2) {
            let (p0, p1) = (pair[0], pair[1]);
            let seg = (p1.x - p0.x, p1.y - p0.y);
            let len2 = seg.0 * seg.0 + seg.1 * seg.1;
            let t = if len2 == 0.0 {
                0.0
            } else {
                (((point.x() - p0.x) * seg.0 + (point.y() - p0.y) * seg.1) / len2).clamp(0.0, 1.0)
            };
            let mut candidate = MapPoint::new(p0.x + t * seg.0, p0.y + t * seg.1, p0.parent_id);
            candidate.s = p0.s + t * (p1.s - p0.s);
            candidate.max_speed = p0.max_speed;
            let dist = distance_2d(point, &candidate);
            // Strict comparison in ascending-s order keeps the smaller s on
            // ties.
            if best.map(|(d, _)| dist < d).unwrap_or(true) {
                best = Some((dist, candidate));
            }
        }
        best.map(|(_, p)| p)
    }

    /// Unit direction of the polyline segment containing arc length `s`.
    /// None for a degenerate border or a zero-length segment.
    pub fn tangent_at(&self, s: f64) -> Option<(f64, f64)> {
        if self.points.len() < 2 {
            return None;
        }
        let upper = self
            .points
            .partition_point(|p| p.s < s)
            .clamp(1, self.points.len() - 1);
        let (p0, p1) = (self.points[upper - 1], self.points[upper]);
        let (dx, dy) = (p1.x - p0.x, p1.y - p0.y);
        let norm = dx.hypot(dy);
        if norm == 0.0 {
            return None;
        }
        Some((dx / norm, dy / norm))
    }

    /// New border restricted to `[s_start, s_end]`: the points inside the
    /// window plus interpolated endpoints exactly at the boundaries.
    pub fn make_clipped(&self, s_start: f64, s_end: f64) -> Border {
        let mut points = Vec::new();
        if let Some(start) = self.get_interpolated_point(s_start) {
            points.push(start);
        }
        points.extend(
            self.points
                .iter()
                .filter(|p| p.s > s_start + DUPLICATE_POINT_EPSILON
                    && p.s < s_end - DUPLICATE_POINT_EPSILON)
                .copied(),
        );
        if let Some(end) = self.get_interpolated_point(s_end) {
            points.push(end);
        }

        let interpolated_points = self
            .interpolated_points
            .iter()
            .filter(|p| p.s >= s_start && p.s <= s_end)
            .copied()
            .collect();

        let mut clipped = Border {
            points,
            spline: None,
            interpolated_points,
            length: 0.0,
        };
        clipped.compute_length();
        clipped
    }

    /// Replaces this border's points with the projections of the reference
    /// line's points, each keeping the reference's arc length. Afterwards
    /// this border's s-domain coincides with the reference's, so paired
    /// borders can be resampled on a shared grid.
    pub fn reparameterize_based_on_reference(&mut self, reference_line: &Border) -> Result<()> {
        if self.points.is_empty() || reference_line.points.is_empty() {
            return Err(MapError::InvalidInput(
                "cannot reparameterize a degenerate border".to_string(),
            ));
        }
        let parent_id = self.parent_id();
        let mut points = Vec::with_capacity(reference_line.points.len());
        for reference_point in &reference_line.points {
            let mut projected = match self.project(reference_point) {
                Some(p) => p,
                None => continue,
            };
            projected.s = reference_point.s;
            projected.parent_id = parent_id;
            points.push(projected);
        }
        if points.len() < 2 {
            return Err(MapError::InvalidInput(
                "reference line too short to reparameterize against".to_string(),
            ));
        }
        self.points = points;
        self.spline = None;
        self.interpolated_points.clear();
        self.compute_length();
        Ok(())
    }
}

/// Collapses runs of points whose arc lengths differ by less than the
/// duplicate epsilon, keeping the first of each run.
pub(crate) fn remove_duplicate_points(points: &mut Vec<MapPoint>) {
    points.dedup_by(|b, a| (b.s - a.s).abs() < DUPLICATE_POINT_EPSILON);
}

/// Linear interpolation over an s-sorted polyline, clamped at both ends.
fn interpolate_on_polyline(points: &[MapPoint], s: f64) -> Option<MapPoint> {
    let first = points.first()?;
    let last = points.last()?;
    if s <= first.s {
        return Some(*first);
    }
    if s >= last.s {
        return Some(*last);
    }
    let upper = points.partition_point(|p| p.s < s);
    let (p0, p1) = (points[upper - 1], points[upper]);
    let denom = p1.s - p0.s;
    let frac = if denom.abs() < DUPLICATE_POINT_EPSILON {
        0.0
    } else {
        (s - p0.s) / denom
    };
    let mut point = MapPoint::new(
        p0.x + frac * (p1.x - p0.x),
        p0.y + frac * (p1.y - p0.y),
        p0.parent_id,
    );
    point.s = s;
    point.max_speed = p0.max_speed;
    Some(point)
}

/// The border triple a lane owns. Inner is the side toward the reference
/// line, outer the side away from it, center the derived midline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Borders {
    pub inner: Border,
    pub outer: Border,
    pub center: Border,
}

impl Borders {
    /// Resamples inner and outer at a fixed spacing over their shared
    /// s-range, so the two interpolated sequences correspond pairwise.
    pub fn interpolate_borders(&mut self, spacing_s: f64) -> Result<()> {
        let (start, end) = self.shared_s_range()?;
        let mut s_values = Vec::new();
        let mut s = start;
        while s < end - DUPLICATE_POINT_EPSILON {
            s_values.push(s);
            s += spacing_s;
        }
        s_values.push(end);
        self.inner.interpolate_border(&s_values)?;
        self.outer.interpolate_border(&s_values)?;
        Ok(())
    }

    /// Builds the center border as the pairwise mean of the inner and outer
    /// samples. Requires `interpolate_borders` to have run.
    pub fn process_center(&mut self) {
        let center_points: Vec<MapPoint> = self
            .inner
            .interpolated_points
            .iter()
            .zip(self.outer.interpolated_points.iter())
            .map(|(i, o)| {
                let mut mid = MapPoint::new((i.x + o.x) / 2.0, (i.y + o.y) / 2.0, i.parent_id);
                mid.s = i.s;
                mid
            })
            .collect();
        self.center.points = center_points.clone();
        self.center.interpolated_points = center_points;
        self.center.spline = None;
        self.center.compute_length();
    }

    pub fn set_parent_id(&mut self, parent_id: LaneID) {
        for border in [&mut self.inner, &mut self.outer, &mut self.center] {
            for p in border
                .points
                .iter_mut()
                .chain(border.interpolated_points.iter_mut())
            {
                p.parent_id = parent_id;
            }
        }
    }

    fn shared_s_range(&self) -> Result<(f64, f64)> {
        let range = |b: &Border| match (b.points.first(), b.points.last()) {
            (Some(first), Some(last)) => Some((first.s, last.s)),
            _ => None,
        };
        match (range(&self.inner), range(&self.outer)) {
            (Some((i0, i1)), Some((o0, o1))) => {
                let start = i0.max(o0);
                let end = i1.min(o1);
                if end <= start {
                    Err(MapError::InvalidInput(
                        "inner and outer borders do not overlap in s".to_string(),
                    ))
                } else {
                    Ok((start, end))
                }
            }
            _ => Err(MapError::InvalidInput(
                "cannot interpolate empty borders".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_border(y: f64, x_end: f64, step: f64) -> Border {
        let mut polyline = Vec::new();
        let mut x = 0.0;
        while x <= x_end {
            polyline.push(Point2d::new(x, y));
            x += step;
        }
        Border::from_polyline(&polyline, LaneID(1))
    }

    #[test]
    fn s_values_strictly_increase_and_duplicates_drop() {
        let polyline = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(2.0, 0.0),
        ];
        let border = Border::from_polyline(&polyline, LaneID(1));
        assert_eq!(border.points.len(), 3);
        for pair in border.points.windows(2) {
            assert!(pair[1].s > pair[0].s);
        }
        assert!((border.length - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_s_projects_onto_segments() {
        let border = straight_border(0.0, 10.0, 1.0);
        assert!((border.find_nearest_s(&Point2d::new(3.4, 2.0)) - 3.4).abs() < 1e-9);
        // Beyond the end clamps to the last point.
        assert!((border.find_nearest_s(&Point2d::new(15.0, 0.0)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_s_tie_breaks_to_smaller_s() {
        // A U-shaped border: the query point is equidistant from both legs.
        let polyline = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(10.0, 0.0),
            Point2d::new(10.0, 4.0),
            Point2d::new(0.0, 4.0),
        ];
        let border = Border::from_polyline(&polyline, LaneID(1));
        let s = border.find_nearest_s(&Point2d::new(5.0, 2.0));
        assert!((s - 5.0).abs() < 1e-9, "expected the first leg, got s={}", s);
    }

    #[test]
    fn clipping_adds_exact_endpoints() {
        let mut border = straight_border(0.0, 10.0, 1.0);
        border.interpolate_border(&[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        let clipped = border.make_clipped(2.5, 7.5);
        assert!((clipped.points.first().unwrap().s - 2.5).abs() < 1e-9);
        assert!((clipped.points.last().unwrap().s - 7.5).abs() < 1e-9);
        assert!((clipped.length - 5.0).abs() < 1e-9);
        assert!(clipped
            .interpolated_points
            .iter()
            .all(|p| p.s >= 2.5 && p.s <= 7.5));
    }

    #[test]
    fn reparameterize_aligns_s_domains() {
        // Offset parallel line: projections land at the same x, so the s
        // values must match the reference exactly.
        let reference = straight_border(0.0, 10.0, 2.0);
        let mut border = straight_border(3.0, 10.0, 1.0);
        border.reparameterize_based_on_reference(&reference).unwrap();
        assert_eq!(border.points.len(), reference.points.len());
        for (b, r) in border.points.iter().zip(reference.points.iter()) {
            assert!((b.s - r.s).abs() < 1e-9);
            assert!((b.y - 3.0).abs() < 1e-9);
        }
        assert!((border.length - reference.length).abs() < 1e-9);
    }

    #[test]
    fn preprocess_drops_sharp_kinks() {
        let polyline = vec![
            Point2d::new(0.0, 0.0),
            Point2d::new(5.0, 0.0),
            Point2d::new(5.1, 3.0), // near-right-angle kink
            Point2d::new(10.0, 0.1),
        ];
        let mut border = Border::from_polyline(&polyline, LaneID(1));
        border.preprocess_points_for_spline(70.0);
        assert_eq!(border.points.len(), 3);
        for pair in border.points.windows(2) {
            assert!(pair[1].s > pair[0].s);
        }
    }

    #[test]
    fn center_is_pairwise_mean() {
        let mut borders = Borders {
            inner: straight_border(0.0, 10.0, 1.0),
            outer: straight_border(4.0, 10.0, 1.0),
            center: Border::default(),
        };
        borders.interpolate_borders(0.5).unwrap();
        borders.process_center();
        assert!(!borders.center.interpolated_points.is_empty());
        for p in &borders.center.interpolated_points {
            assert!((p.y - 2.0).abs() < 1e-6);
        }
        assert!((borders.center.length - 10.0).abs() < 1e-6);
    }

    #[test]
    fn set_parent_id_touches_all_three() {
        let mut borders = Borders {
            inner: straight_border(0.0, 4.0, 1.0),
            outer: straight_border(2.0, 4.0, 1.0),
            center: Border::default(),
        };
        borders.interpolate_borders(1.0).unwrap();
        borders.process_center();
        borders.set_parent_id(LaneID(42));
        for border in [&borders.inner, &borders.outer, &borders.center] {
            assert!(border.points.iter().all(|p| p.parent_id == LaneID(42)));
            assert!(border
                .interpolated_points
                .iter()
                .all(|p| p.parent_id == LaneID(42)));
        }
    }
}

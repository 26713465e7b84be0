//! Natural cubic splines over border polylines, parameterized by cumulative
//! chord length. One spline interpolates x(s) and y(s) independently, so a
//! border can be resampled at arbitrary arc lengths.

use serde::{Deserialize, Serialize};

use crate::{distance_2d, MapError, MapPoint, Point2d, Result};

/// Per-axis cubic coefficients: segment i evaluates
/// `a[i] + ds * (b[i] + ds * (c[i] + ds * d[i]))` with `ds = s - knot[i]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Coefficients {
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BorderSpline {
    /// Cumulative chord length at each knot, strictly increasing.
    distances: Vec<f64>,
    x: Coefficients,
    y: Coefficients,
}

impl BorderSpline {
    /// Fits a natural cubic through `points`, skipping zero-distance
    /// duplicates. Fails with `InvalidInput` when fewer than two unique
    /// points remain.
    pub fn new(points: &[MapPoint]) -> Result<BorderSpline> {
        if points.len() < 2 {
            return Err(MapError::InvalidInput(
                "need at least two points for a spline".to_string(),
            ));
        }

        let mut distances = vec![0.0];
        let mut xs = vec![points[0].x];
        let mut ys = vec![points[0].y];
        for pair in points.windows(2) {
            let dist = distance_2d(&pair[0], &pair[1]);
            if dist == 0.0 {
                continue;
            }
            distances.push(distances.last().unwrap() + dist);
            xs.push(pair[1].x);
            ys.push(pair[1].y);
        }

        if distances.len() < 2 {
            return Err(MapError::InvalidInput(
                "need at least two unique points for a spline".to_string(),
            ));
        }

        Ok(BorderSpline {
            x: compute_coefficients(&xs, &distances)?,
            y: compute_coefficients(&ys, &distances)?,
            distances,
        })
    }

    /// Interpolated position at arc length `s`, clamped into the knot range.
    pub fn point_at(&self, s: f64) -> Point2d {
        let (i, ds) = self.interval(s);
        Point2d::new(eval_cubic(&self.x, i, ds), eval_cubic(&self.y, i, ds))
    }

    pub fn points_at(&self, s_values: &[f64]) -> Vec<Point2d> {
        s_values.iter().map(|s| self.point_at(*s)).collect()
    }

    /// dx/ds at `s`.
    pub fn x_prime(&self, s: f64) -> f64 {
        let (i, ds) = self.interval(s);
        self.x.b[i] + ds * (2.0 * self.x.c[i] + 3.0 * self.x.d[i] * ds)
    }

    /// dy/ds at `s`.
    pub fn y_prime(&self, s: f64) -> f64 {
        let (i, ds) = self.interval(s);
        self.y.b[i] + ds * (2.0 * self.y.c[i] + 3.0 * self.y.d[i] * ds)
    }

    pub fn x_double_prime(&self, s: f64) -> f64 {
        let (i, ds) = self.interval(s);
        2.0 * self.x.c[i] + 6.0 * self.x.d[i] * ds
    }

    pub fn y_double_prime(&self, s: f64) -> f64 {
        let (i, ds) = self.interval(s);
        2.0 * self.y.c[i] + 6.0 * self.y.d[i] * ds
    }

    /// Chord length covered by the spline.
    pub fn total_length(&self) -> f64 {
        *self.distances.last().unwrap()
    }

    /// Clamps `s` and finds the predecessor knot by binary search. Returns
    /// the segment index and the offset into it.
    fn interval(&self, s: f64) -> (usize, f64) {
        let s = s.clamp(self.distances[0], *self.distances.last().unwrap());
        let i = match self
            .distances
            .binary_search_by(|knot| knot.partial_cmp(&s).unwrap())
        {
            Ok(exact) => exact,
            Err(insertion) => insertion - 1,
        };
        let i = i.min(self.distances.len() - 2);
        (i, s - self.distances[i])
    }
}

fn eval_cubic(coeff: &Coefficients, i: usize, ds: f64) -> f64 {
    coeff.a[i] + ds * (coeff.b[i] + ds * (coeff.c[i] + ds * coeff.d[i]))
}

/// Solves for the natural-cubic coefficients of one axis. The second
/// derivatives come from a tridiagonal system with c_0 = c_n = 0; b and d
/// follow in closed form.
fn compute_coefficients(values: &[f64], distances: &[f64]) -> Result<Coefficients> {
    let n = values.len() - 1;

    // Tridiagonal rows: sub-, main-, super-diagonal and right-hand side.
    let mut sub = vec![0.0; n + 1];
    let mut main = vec![0.0; n + 1];
    let mut sup = vec![0.0; n + 1];
    let mut rhs = vec![0.0; n + 1];
    main[0] = 1.0;
    main[n] = 1.0;
    for i in 1..n {
        let h1 = distances[i] - distances[i - 1];
        let h2 = distances[i + 1] - distances[i];
        sub[i] = h1;
        main[i] = 2.0 * (h1 + h2);
        sup[i] = h2;
        rhs[i] = 3.0 * ((values[i + 1] - values[i]) / h2 - (values[i] - values[i - 1]) / h1);
    }

    let c = solve_tridiagonal(&sub, &main, &sup, &rhs)?;

    let mut coeff = Coefficients {
        a: vec![0.0; n],
        b: vec![0.0; n],
        c,
        d: vec![0.0; n],
    };
    for i in 0..n {
        let h = distances[i + 1] - distances[i];
        coeff.d[i] = (coeff.c[i + 1] - coeff.c[i]) / (3.0 * h);
        coeff.b[i] =
            (values[i + 1] - values[i]) / h - (2.0 * coeff.c[i] + coeff.c[i + 1]) * h / 3.0;
        coeff.a[i] = values[i];
    }
    Ok(coeff)
}

/// Thomas-algorithm sweep. The natural-cubic matrix is diagonally dominant
/// for strictly increasing knots, so no pivoting is needed; a non-finite
/// intermediate still fails with `NumericalFailure`.
fn solve_tridiagonal(sub: &[f64], main: &[f64], sup: &[f64], rhs: &[f64]) -> Result<Vec<f64>> {
    let n = main.len();
    let mut sup_prime = vec![0.0; n];
    let mut rhs_prime = vec![0.0; n];

    sup_prime[0] = sup[0] / main[0];
    rhs_prime[0] = rhs[0] / main[0];
    for i in 1..n {
        let denom = main[i] - sub[i] * sup_prime[i - 1];
        sup_prime[i] = sup[i] / denom;
        rhs_prime[i] = (rhs[i] - sub[i] * rhs_prime[i - 1]) / denom;
    }

    let mut solution = vec![0.0; n];
    solution[n - 1] = rhs_prime[n - 1];
    for i in (0..n - 1).rev() {
        solution[i] = rhs_prime[i] - sup_prime[i] * solution[i + 1];
    }

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(MapError::NumericalFailure(
            "spline system produced non-finite coefficients".to_string(),
        ));
    }
    Ok(solution)
}

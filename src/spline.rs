use std::fmt;

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    x: f64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Natural cubic spline through a small ordered set of knots.
///
/// Second derivatives at both end knots are pinned to zero. Inputs outside
/// the knot range pass through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    segments: Vec<Segment>,
}

impl CubicSpline {
    /// Fit a spline through `(x[i], y[i])`.
    ///
    /// # Panics
    /// If the arrays differ in length, hold fewer than two knots, or `x` is
    /// not strictly increasing.
    pub fn new(x: &[f64], y: &[f64]) -> Self {
        assert_eq!(x.len(), y.len(), "knot arrays differ in length");
        assert!(x.len() >= 2, "a spline needs at least two knots");
        assert!(
            x.windows(2).all(|w| w[0] < w[1]),
            "knot x values must be strictly increasing: {x:?}"
        );

        let n = x.len();
        let mut segments: Vec<Segment> = x
            .iter()
            .zip(y)
            .map(|(&x, &y)| Segment {
                x,
                a: y,
                b: 0.0,
                c: 0.0,
                d: 0.0,
            })
            .collect();

        // Tridiagonal sweep for the second derivatives.
        let mut alpha = vec![0.0; n - 1];
        let mut beta = vec![0.0; n - 1];
        for i in 1..n - 1 {
            let hi = x[i] - x[i - 1];
            let hi1 = x[i + 1] - x[i];
            let c = 2.0 * (hi + hi1);
            let f = 6.0 * ((y[i + 1] - y[i]) / hi1 - (y[i] - y[i - 1]) / hi);
            let z = hi * alpha[i - 1] + c;
            alpha[i] = -hi1 / z;
            beta[i] = (f - hi * beta[i - 1]) / z;
        }
        for i in (1..n - 1).rev() {
            segments[i].c = alpha[i] * segments[i + 1].c + beta[i];
        }

        for i in (1..n).rev() {
            let hi = x[i] - x[i - 1];
            segments[i].d = (segments[i].c - segments[i - 1].c) / hi;
            segments[i].b =
                hi * (2.0 * segments[i].c + segments[i - 1].c) / 6.0 + (y[i] - y[i - 1]) / hi;
        }

        Self {
            xs: x.to_vec(),
            ys: y.to_vec(),
            segments,
        }
    }

    /// Straight line from `(min, min)` to `(max, max)`.
    pub fn identity(min_value: f64, max_value: f64) -> Self {
        Self::new(&[min_value, max_value], &[min_value, max_value])
    }

    pub fn knots_x(&self) -> &[f64] {
        &self.xs
    }

    pub fn knots_y(&self) -> &[f64] {
        &self.ys
    }

    /// Evaluate the curve at `x`.
    pub fn interpolate(&self, x: f64) -> f64 {
        let first = &self.segments[0];
        let last = &self.segments[self.segments.len() - 1];
        if x < first.x || x > last.x {
            return x;
        }
        if x == first.x {
            return first.a;
        }

        let mut i = 0;
        let mut j = self.segments.len() - 1;
        while i + 1 < j {
            let k = i + (j - i) / 2;
            if x <= self.segments[k].x {
                j = k;
            } else {
                i = k;
            }
        }
        let s = &self.segments[j];
        let dx = x - s.x;
        s.a + (s.b + (s.c / 2.0 + s.d * dx / 6.0) * dx) * dx
    }
}

impl fmt::Display for CubicSpline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CubicSpline: [")?;
        for (i, x) in self.xs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{x:.3}")?;
        }
        write!(f, "] -> [")?;
        for (i, y) in self.ys.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{y:.3}")?;
        }
        f.write_str("]")
    }
}

//! Incremental least-squares fitting of low-degree polynomials.
//!
//! Models `y ≈ β₀ + β₁x + β₂x²` from sample points, minimizing the squared
//! residuals $\lVert X\beta - Y \rVert^2$.
//!
//! # Theory
//!
//! Instead of keeping the points, the fitter accumulates the normal-equation
//! matrices: the $(d+1)\times(d+1)$ Gram matrix $X^TX$ and the vector
//! $X^TY$. The minimizer is $\beta = (X^TX)^{-1}X^TY$.
//!
//! Two properties make this representation attractive here:
//! - **Incremental**: adding a point is $O(d^2)$ with no allocation.
//! - **Mergeable**: for stacked designs,
//!   $[X_1;X_2]^T[X_1;X_2] = X_1^TX_1 + X_2^TX_2$, so two fitters combine by
//!   element-wise addition. A planner can therefore pre-fit fixed blocks
//!   once and try span extensions in $O(1)$ matrix work.
//!
//! Degree is capped at 2, so the normal equations are at most 3×3 and are
//! solved in closed form by Cramer's rule; no general linear-algebra
//! machinery is needed.
//!
//! # What Could Go Wrong
//!
//! Near-singular systems (e.g. fitting a parabola to collinear points)
//! produce inaccurate or non-finite coefficients. `solve` does not detect
//! this: callers are expected to validate the fit against the data, which
//! the encoder does when it picks a residual width.

use std::fmt;

/// Maximum polynomial degree supported by [`PolyFitter`].
pub const MAX_DEGREE: usize = 2;

/// Incremental least-squares fitter for polynomials of degree ≤ 2.
///
/// Accumulates $X^TX$ and $X^TY$ over added points. Cloning yields a deep,
/// independent copy, which is how speculative span extensions are tried.
#[derive(Debug, Clone)]
pub struct PolyFitter {
    n: usize,
    degree: usize,
    /// Row-major (degree+1)×(degree+1) Gram matrix, stride degree+1.
    xtx: [f64; (MAX_DEGREE + 1) * (MAX_DEGREE + 1)],
    xty: [f64; MAX_DEGREE + 1],
}

impl PolyFitter {
    /// Create an empty fitter for polynomials of the given degree (0, 1 or 2).
    ///
    /// # Panics
    ///
    /// Panics if `degree > 2`.
    pub fn new(degree: usize) -> Self {
        assert!(degree <= MAX_DEGREE, "unsupported degree: {degree}");
        Self {
            n: 0,
            degree,
            xtx: [0.0; (MAX_DEGREE + 1) * (MAX_DEGREE + 1)],
            xty: [0.0; MAX_DEGREE + 1],
        }
    }

    /// Accumulate one sample point.
    pub fn add(&mut self, x: f64, y: f64) {
        let m = self.degree + 1;

        let mut xpows = [0.0f64; MAX_DEGREE + 1];
        let mut v = 1.0;
        for p in xpows.iter_mut().take(m) {
            *p = v;
            v *= x;
        }

        for i in 0..m {
            for j in 0..m {
                self.xtx[i * m + j] += xpows[i] * xpows[j];
            }
        }
        for i in 0..m {
            self.xty[i] += xpows[i] * y;
        }
        self.n += 1;
    }

    /// Merge another fitter's accumulated points into this one.
    ///
    /// # Panics
    ///
    /// Panics if the degrees differ; merging fitters of different degree is
    /// a programmer error.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(
            self.degree, other.degree,
            "cannot merge fitters of different degree"
        );
        for (a, b) in self.xtx.iter_mut().zip(&other.xtx) {
            *a += b;
        }
        for (a, b) in self.xty.iter_mut().zip(&other.xty) {
            *a += b;
        }
        self.n += other.n;
    }

    /// Number of points accumulated so far.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Return true if no points have been added.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The degree this fitter was created with.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Mean of the accumulated `y` values, or 0 for an empty fitter.
    ///
    /// `xty[0]` is $\sum y_i$ and `xtx[0]` is the point count, so the mean
    /// falls out of the normal equations for free.
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.xty[0] / self.n as f64
        }
    }

    /// Solve the normal equations for this fitter's full degree.
    ///
    /// Returns `[β₀, β₁, β₂]`; coefficients above the degree are zero. With
    /// fewer points than unknowns the system collapses to the leading
    /// square subsystem and the trailing coefficients are zeroed. An empty
    /// fitter yields all zeros. Near-singular systems are not detected and
    /// may return non-finite values.
    pub fn solve(&self) -> [f64; MAX_DEGREE + 1] {
        self.solve_degree(self.degree)
    }

    /// Solve for a clipped degree `d ≤ self.degree()`.
    ///
    /// The leading $(d+1)\times(d+1)$ corner of the Gram matrix is exactly
    /// the system a degree-`d` fitter would have accumulated, so one
    /// degree-2 fitter can also answer degree-1 and degree-0 fits.
    pub fn solve_degree(&self, degree: usize) -> [f64; MAX_DEGREE + 1] {
        let degree = degree.min(self.degree);
        let stride = self.degree + 1;
        // Under-determined: collapse to the leading n×n system.
        let m = (degree + 1).min(self.n);

        let mut beta = [0.0f64; MAX_DEGREE + 1];
        let v = &self.xtx;
        let y = &self.xty;
        match m {
            0 => {}
            1 => {
                beta[0] = y[0] / v[0];
            }
            2 => {
                let (a, b) = (v[0], v[1]);
                let (c, d) = (v[stride], v[stride + 1]);
                let det = a * d - b * c;
                beta[0] = (y[0] * d - b * y[1]) / det;
                beta[1] = (a * y[1] - y[0] * c) / det;
            }
            _ => {
                // m == 3 implies stride == 3.
                let (a, b, c) = (v[0], v[1], v[2]);
                let (d, e, f) = (v[3], v[4], v[5]);
                let (g, h, i) = (v[6], v[7], v[8]);
                let det = a * e * i + b * f * g + c * d * h - c * e * g - b * d * i - a * f * h;
                let d0 = y[0] * e * i + b * f * y[2] + c * y[1] * h
                    - c * e * y[2]
                    - b * y[1] * i
                    - y[0] * f * h;
                let d1 = a * y[1] * i + y[0] * f * g + c * d * y[2]
                    - c * y[1] * g
                    - y[0] * d * i
                    - a * f * y[2];
                let d2 = a * e * y[2] + b * y[1] * g + y[0] * d * h
                    - y[0] * e * g
                    - b * d * y[2]
                    - a * y[1] * h;
                beta[0] = d0 / det;
                beta[1] = d1 / det;
                beta[2] = d2 / det;
            }
        }
        beta
    }
}

impl fmt::Display for PolyFitter {
    /// Render the accumulated system: point count, degree, $X^TX$ and $X^TY$.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.degree + 1;
        writeln!(f, "n={} degree={}", self.n, self.degree)?;
        for i in 0..m {
            for j in 0..m {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:3.3}", self.xtx[i * m + j])?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        for i in 0..m {
            writeln!(f, "{:3.3}", self.xty[i])?;
        }
        Ok(())
    }
}

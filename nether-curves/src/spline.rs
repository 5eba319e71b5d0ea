//! Interpolating splines through sampled curves.
//!
//! The Akima spline is the reference interpolant the fitters approximate:
//! it passes through every sample and avoids the overshoot of natural cubic
//! splines around sharp keyframes.

use serde::{Deserialize, Serialize};

/// Interpolation used between knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Akima,
    Linear,
}

/// Piecewise cubic Hermite spline with Akima node slopes.
#[derive(Debug, Clone)]
pub struct AkimaSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
}

impl AkimaSpline {
    /// Build a spline through `(xs[i], ys[i])`. `xs` must be strictly increasing.
    pub fn new(xs: &[f64], ys: &[f64]) -> Self {
        debug_assert_eq!(xs.len(), ys.len());
        let n = xs.len();
        let slopes = match n {
            0 | 1 => vec![0.0; n],
            2 => {
                let m = (ys[1] - ys[0]) / (xs[1] - xs[0]);
                vec![m, m]
            }
            _ => akima_slopes(xs, ys),
        };
        Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            slopes,
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        match n {
            0 => return 0.0,
            1 => return self.ys[0],
            _ => {}
        }

        let k = segment_index(&self.xs, x);
        let (x0, x1) = (self.xs[k], self.xs[k + 1]);
        let h = x1 - x0;
        let t = (x - x0) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.ys[k]
            + h10 * h * self.slopes[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.slopes[k + 1]
    }
}

fn akima_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();

    // Segment slopes padded with two extrapolated entries on each side.
    let mut m = vec![0.0; n + 3];
    for i in 0..n - 1 {
        m[i + 2] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]);
    }
    m[1] = 2.0 * m[2] - m[3];
    m[0] = 2.0 * m[1] - m[2];
    m[n + 1] = 2.0 * m[n] - m[n - 1];
    m[n + 2] = 2.0 * m[n + 1] - m[n];

    (0..n)
        .map(|i| {
            let w1 = (m[i + 3] - m[i + 2]).abs();
            let w2 = (m[i + 1] - m[i]).abs();
            if w1 + w2 < f64::EPSILON {
                0.5 * (m[i + 1] + m[i + 2])
            } else {
                (w1 * m[i + 1] + w2 * m[i + 2]) / (w1 + w2)
            }
        })
        .collect()
}

/// Index `k` of the segment `[xs[k], xs[k + 1]]` used for `x`. Clamped at the ends.
fn segment_index(xs: &[f64], x: f64) -> usize {
    let upper = xs.partition_point(|&xk| xk <= x);
    upper.saturating_sub(1).min(xs.len() - 2)
}

/// Interpolant selected by [`Interpolation`].
#[derive(Debug, Clone)]
pub enum Interpolant {
    Akima(AkimaSpline),
    Linear { xs: Vec<f64>, ys: Vec<f64> },
}

impl Interpolant {
    pub fn new(kind: Interpolation, xs: &[f64], ys: &[f64]) -> Self {
        match kind {
            Interpolation::Akima => Self::Akima(AkimaSpline::new(xs, ys)),
            Interpolation::Linear => Self::Linear {
                xs: xs.to_vec(),
                ys: ys.to_vec(),
            },
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            Self::Akima(spline) => spline.evaluate(x),
            Self::Linear { xs, ys } => match xs.len() {
                0 => 0.0,
                1 => ys[0],
                _ => {
                    let k = segment_index(xs, x);
                    let t = (x - xs[k]) / (xs[k + 1] - xs[k]);
                    ys[k] + (ys[k + 1] - ys[k]) * t
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_akima_passes_through_samples() {
        let xs: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|x| (x * 1.7).sin() * 3.0).collect();
        let spline = AkimaSpline::new(&xs, &ys);
        for (x, y) in xs.iter().zip(&ys) {
            assert!((spline.evaluate(*x) - y).abs() < 1e-12, "at x = {x}");
        }
    }

    #[test]
    fn test_akima_reproduces_lines() {
        let xs = [0.0, 1.0, 2.5, 3.0, 7.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x - 1.0).collect();
        let spline = AkimaSpline::new(&xs, &ys);
        for x in [0.25, 1.7, 2.9, 5.5] {
            assert!((spline.evaluate(x) - (2.0 * x - 1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_akima_no_overshoot_on_step() {
        let xs: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let ys = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let spline = AkimaSpline::new(&xs, &ys);
        for i in 0..70 {
            let y = spline.evaluate(i as f64 * 0.1);
            assert!((-1e-12..=1.0 + 1e-12).contains(&y), "overshoot {y}");
        }
    }

    #[test]
    fn test_small_inputs() {
        assert_eq!(AkimaSpline::new(&[], &[]).evaluate(1.0), 0.0);
        assert_eq!(AkimaSpline::new(&[1.0], &[4.0]).evaluate(3.0), 4.0);
        let two = AkimaSpline::new(&[0.0, 2.0], &[0.0, 4.0]);
        assert!((two.evaluate(1.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_interpolant() {
        let lerp = Interpolant::new(Interpolation::Linear, &[0.0, 1.0, 3.0], &[0.0, 2.0, 0.0]);
        assert!((lerp.evaluate(0.5) - 1.0).abs() < 1e-12);
        assert!((lerp.evaluate(2.0) - 1.0).abs() < 1e-12);
        assert!((lerp.evaluate(3.0)).abs() < 1e-12);
    }
}

//! Chebyshev series approximation.
//!
//! Coefficients are computed with a DCT over Chebyshev nodes of an arbitrary
//! function (normally an [`AkimaSpline`](crate::spline::AkimaSpline) through
//! the samples) and evaluated with Clenshaw's recurrence. Lower-order
//! prefixes of the series are valid approximations of their own, which is
//! what makes truncation a cheap compression knob.

use std::f64::consts::PI;

use crate::spline::AkimaSpline;

/// Buckets this short are never fitted.
pub const MIN_FIT_SAMPLES: usize = 5;

/// Chebyshev series over `[min_x, max_x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chebyshev {
    coefficients: Vec<f64>,
    min_x: f64,
    max_x: f64,
}

impl Chebyshev {
    /// Approximate `f` on `[min_x, max_x]` with `count` coefficients.
    pub fn from_fn(f: impl Fn(f64) -> f64, min_x: f64, max_x: f64, count: usize) -> Self {
        let bma = 0.5 * (max_x - min_x);
        let bpa = 0.5 * (max_x + min_x);
        let n = count as f64;

        let values: Vec<f64> = (0..count)
            .map(|k| {
                let y = (PI * (k as f64 + 0.5) / n).cos();
                f(y * bma + bpa)
            })
            .collect();

        let factor = 2.0 / n;
        let coefficients = (0..count)
            .map(|j| {
                let sum: f64 = values
                    .iter()
                    .enumerate()
                    .map(|(k, v)| v * (PI * j as f64 * (k as f64 + 0.5) / n).cos())
                    .sum();
                factor * sum
            })
            .collect();

        Self {
            coefficients,
            min_x,
            max_x,
        }
    }

    pub fn from_coefficients(coefficients: Vec<f64>, min_x: f64, max_x: f64) -> Self {
        Self {
            coefficients,
            min_x,
            max_x,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn count(&self) -> usize {
        self.coefficients.len()
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.min_x, self.max_x)
    }

    /// Evaluate the first `m` terms at `x` (Clenshaw recurrence).
    pub fn evaluate(&self, x: f64, m: usize) -> f64 {
        let m = m.min(self.coefficients.len());
        if m == 0 {
            return 0.0;
        }

        let width = self.max_x - self.min_x;
        let y = if width > 0.0 {
            ((2.0 * x - self.min_x - self.max_x) / width).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let y2 = 2.0 * y;

        let mut d = 0.0;
        let mut dd = 0.0;
        for &c in self.coefficients[1..m].iter().rev() {
            let sv = d;
            d = y2 * d - dd + c;
            dd = sv;
        }
        y * d - dd + 0.5 * self.coefficients[0]
    }

    /// Evaluate the whole series.
    pub fn value(&self, x: f64) -> f64 {
        self.evaluate(x, self.coefficients.len())
    }

    /// Round every coefficient through `f32`, the precision they are stored at.
    pub fn to_f32_precision(&self) -> Self {
        Self {
            coefficients: self
                .coefficients
                .iter()
                .map(|&c| c as f32 as f64)
                .collect(),
            min_x: self.min_x,
            max_x: self.max_x,
        }
    }

    /// Keep only the first `m` coefficients.
    pub fn truncated(&self, m: usize) -> Self {
        Self {
            coefficients: self.coefficients[..m.min(self.coefficients.len())].to_vec(),
            min_x: self.min_x,
            max_x: self.max_x,
        }
    }

    /// Round each coefficient to an `i16` code at `scales[i]` codes per unit.
    pub fn quantize_fixed(&self, scales: &[f64]) -> FixedPointChebyshev {
        let codes: Vec<i16> = self
            .coefficients
            .iter()
            .zip(scales)
            .map(|(&c, &s)| (c * s).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
            .collect();
        let dequantized = dequantize_fixed(&codes, scales, self.min_x, self.max_x);
        FixedPointChebyshev { codes, dequantized }
    }
}

/// Series stored as `i16` codes together with its dequantized form.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPointChebyshev {
    pub codes: Vec<i16>,
    pub dequantized: Chebyshev,
}

/// Per-coefficient scales `exp(i) / error_bound`.
///
/// Higher-order coefficients are smaller in magnitude, so they get finer steps.
pub fn fixed_point_scales(error_bound: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| (i as f64).exp() / error_bound).collect()
}

pub fn dequantize_fixed(codes: &[i16], scales: &[f64], min_x: f64, max_x: f64) -> Chebyshev {
    Chebyshev::from_coefficients(
        codes
            .iter()
            .zip(scales)
            .map(|(&q, &s)| q as f64 / s)
            .collect(),
        min_x,
        max_x,
    )
}

/// Largest `|ys[i] - series(xs[i])|` using `m` terms, or `None` once it exceeds `limit`.
pub fn max_error(series: &Chebyshev, xs: &[f64], ys: &[f64], m: usize, limit: f64) -> Option<f64> {
    let mut worst = 0.0f64;
    for (&x, &y) in xs.iter().zip(ys) {
        let err = (y - series.evaluate(x, m)).abs();
        if err > limit || err.is_nan() {
            return None;
        }
        worst = worst.max(err);
    }
    Some(worst)
}

/// Truncated series for one bucket of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevFit {
    /// Series at `f32` precision, already truncated to the chosen count.
    pub series: Chebyshev,
    /// Max deviation over the bucket's samples.
    pub error: f64,
}

/// Reference series for a bucket: Akima through the samples, one coefficient
/// per sample (capped at `max_count`), rounded to `f32`.
pub fn reference_series(xs: &[f64], ys: &[f64], max_count: usize) -> Chebyshev {
    let spline = AkimaSpline::new(xs, ys);
    let count = xs.len().min(max_count).max(1);
    Chebyshev::from_fn(|x| spline.evaluate(x), xs[0], xs[xs.len() - 1], count)
        .to_f32_precision()
}

/// Smallest `m` whose `m`-term prefix of `series` stays within `tolerance`.
pub fn smallest_fitting_count(
    series: &Chebyshev,
    xs: &[f64],
    ys: &[f64],
    tolerance: f64,
) -> Option<(usize, f64)> {
    (1..=series.count())
        .find_map(|m| max_error(series, xs, ys, m, tolerance).map(|err| (m, err)))
}

/// Fit one bucket with the fewest Chebyshev coefficients that stay within
/// `error_bound`.
///
/// Returns `None` when the bucket is too short to be worth fitting or no
/// count meets the bound; the caller encodes those samples raw.
pub fn fit_truncated(
    xs: &[f64],
    ys: &[f64],
    error_bound: f64,
    max_count: usize,
) -> Option<ChebyshevFit> {
    if xs.len() < MIN_FIT_SAMPLES {
        return None;
    }
    let series = reference_series(xs, ys, max_count);
    let (m, error) = smallest_fitting_count(&series, xs, ys, error_bound)?;
    Some(ChebyshevFit {
        series: series.truncated(m),
        error,
    })
}

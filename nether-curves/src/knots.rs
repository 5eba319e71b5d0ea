//! Adaptive knot selection.
//!
//! Knots are sample indices kept verbatim; everything between them is
//! reconstructed by interpolating the knot values. Refinement repeatedly adds
//! the worst sample of every interval that violates the error rule until no
//! interval does. Several seed sets are refined in parallel and the smallest
//! result wins.

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;

use crate::spline::{Interpolant, Interpolation};

/// Upper bound on random interior seeds per trial.
const MAX_RANDOM_SEEDS: usize = 4;

/// Options shared by every knot fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnotOptions {
    pub interpolation: Interpolation,
    /// Seed sets to refine. Trial 0 always starts from the endpoints alone.
    pub trials: usize,
    pub seed: u64,
}

impl Default for KnotOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Akima,
            trials: 8,
            seed: 0,
        }
    }
}

/// Knot set shared by all axes of a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotFit {
    /// Sorted sample indices; always contains the first and last sample.
    pub knots: Vec<usize>,
    /// Max deviation divided by the axis bound, over all axes.
    pub error: f64,
}

/// Knot fit whose residuals are stored as signed integers.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedKnotFit {
    pub knots: Vec<usize>,
    /// Per axis: one code per sample, `round((y - spline) / step)`.
    pub residuals: Vec<Vec<i8>>,
    /// Per axis residual step, twice the axis bound.
    pub steps: Vec<f64>,
}

/// When an interval sample forces a split.
#[derive(Debug, Clone, Copy)]
enum SplitRule<'a> {
    /// Deviation above the axis bound.
    Bound(&'a [f64]),
    /// Residual code that does not fit in `max_code`.
    Residual { steps: &'a [f64], max_code: i32 },
}

impl SplitRule<'_> {
    /// Normalized excess of `deviation` on `axis`, if it forces a split.
    fn excess(&self, axis: usize, deviation: f64) -> Option<f64> {
        match *self {
            SplitRule::Bound(bounds) => {
                let bound = bounds[axis];
                (deviation.abs() > bound).then(|| deviation.abs() / bound.max(f64::MIN_POSITIVE))
            }
            SplitRule::Residual { steps, max_code } => {
                let code = (deviation / steps[axis]).round();
                (code.abs() > max_code as f64).then(|| deviation.abs() / steps[axis])
            }
        }
    }

    fn normalize(&self, axis: usize, deviation: f64) -> f64 {
        let scale = match *self {
            SplitRule::Bound(bounds) => bounds[axis],
            SplitRule::Residual { steps, .. } => steps[axis],
        };
        deviation.abs() / scale.max(f64::MIN_POSITIVE)
    }
}

/// Knots for a single axis.
pub fn fit_knots(xs: &[f64], ys: &[f64], error_bound: f64, options: &KnotOptions) -> Vec<usize> {
    fit_knots_joint(xs, &[ys], &[error_bound], options).knots
}

/// One knot set for several axes; a violation on any axis splits all of them.
pub fn fit_knots_joint(
    xs: &[f64],
    axes: &[&[f64]],
    bounds: &[f64],
    options: &KnotOptions,
) -> KnotFit {
    best_of_trials(xs, axes, SplitRule::Bound(bounds), options)
}

/// Joint knot fit whose residuals must fit in `bits`-bit signed codes.
///
/// With `bits == 0` no residuals are stored and this behaves like
/// [`fit_knots_joint`].
pub fn fit_knots_quantized(
    xs: &[f64],
    axes: &[&[f64]],
    bounds: &[f64],
    bits: u8,
    options: &KnotOptions,
) -> QuantizedKnotFit {
    let steps: Vec<f64> = bounds.iter().map(|b| 2.0 * b).collect();
    let max_code = if bits == 0 {
        0
    } else {
        (1i32 << (bits - 1)) - 1
    };
    let fit = best_of_trials(xs, axes, SplitRule::Residual { steps: &steps, max_code }, options);

    let residuals = axes
        .iter()
        .enumerate()
        .map(|(axis, ys)| {
            let spline = knot_interpolant(options.interpolation, xs, ys, &fit.knots);
            xs.iter()
                .zip(ys.iter())
                .map(|(&x, &y)| {
                    let code = ((y - spline.evaluate(x)) / steps[axis]).round();
                    code.clamp(-(max_code as f64), max_code as f64) as i8
                })
                .collect()
        })
        .collect();

    QuantizedKnotFit {
        knots: fit.knots,
        residuals,
        steps,
    }
}

/// Interpolant through `ys` restricted to `knots`.
pub fn knot_interpolant(
    interpolation: Interpolation,
    xs: &[f64],
    ys: &[f64],
    knots: &[usize],
) -> Interpolant {
    let kx: Vec<f64> = knots.iter().map(|&k| xs[k]).collect();
    let ky: Vec<f64> = knots.iter().map(|&k| ys[k]).collect();
    Interpolant::new(interpolation, &kx, &ky)
}

fn best_of_trials(
    xs: &[f64],
    axes: &[&[f64]],
    rule: SplitRule<'_>,
    options: &KnotOptions,
) -> KnotFit {
    let n = xs.len();
    if n <= 2 {
        return KnotFit {
            knots: (0..n).collect(),
            error: 0.0,
        };
    }

    let trials = options.trials.max(1);
    let fits: Vec<KnotFit> = (0..trials)
        .into_par_iter()
        .map(|trial| refine(xs, axes, rule, options.interpolation, seed_knots(n, trial, options.seed)))
        .collect();

    // Fewest knots, then lowest error, then earliest trial.
    fits.into_iter()
        .min_by(|a, b| {
            a.knots
                .len()
                .cmp(&b.knots.len())
                .then(a.error.total_cmp(&b.error))
        })
        .unwrap_or(KnotFit {
            knots: vec![0, n - 1],
            error: f64::INFINITY,
        })
}

/// Initial knots for a trial.
///
/// Trial 0 uses only the endpoints and trial 1 adds the quartiles. Later
/// trials add a few random interior samples drawn from `seed ^ trial`.
fn seed_knots(n: usize, trial: usize, seed: u64) -> BTreeSet<usize> {
    let mut knots = BTreeSet::from([0, n - 1]);
    match trial {
        0 => {}
        1 => knots.extend([n / 4, n / 2, 3 * n / 4]),
        _ => {
            let mut rng = Pcg64::seed_from_u64(seed ^ trial as u64);
            let count = rng.random_range(1..=MAX_RANDOM_SEEDS.min(n - 2));
            for _ in 0..count {
                knots.insert(rng.random_range(1..n - 1));
            }
        }
    }
    knots
}

fn refine(
    xs: &[f64],
    axes: &[&[f64]],
    rule: SplitRule<'_>,
    interpolation: Interpolation,
    mut knots: BTreeSet<usize>,
) -> KnotFit {
    loop {
        let sorted: Vec<usize> = knots.iter().copied().collect();
        let splines: Vec<Interpolant> = axes
            .iter()
            .map(|ys| knot_interpolant(interpolation, xs, ys, &sorted))
            .collect();

        let mut splits = Vec::new();
        let mut error = 0.0f64;
        for pair in sorted.windows(2) {
            let mut worst: Option<(usize, f64)> = None;
            for i in pair[0] + 1..pair[1] {
                for (axis, (ys, spline)) in axes.iter().zip(&splines).enumerate() {
                    let deviation = ys[i] - spline.evaluate(xs[i]);
                    error = error.max(rule.normalize(axis, deviation));
                    if let Some(excess) = rule.excess(axis, deviation)
                        && worst.is_none_or(|(_, w)| excess > w)
                    {
                        worst = Some((i, excess));
                    }
                }
            }
            if let Some((i, _)) = worst {
                splits.push(i);
            }
        }

        if splits.is_empty() {
            return KnotFit {
                knots: sorted,
                error,
            };
        }
        knots.extend(splits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / 30.0).collect()
    }

    #[test]
    fn test_endpoints_always_present() {
        let xs = times(50);
        let ys: Vec<f64> = xs.iter().map(|x| (x * 7.0).sin()).collect();
        let knots = fit_knots(&xs, &ys, 0.01, &KnotOptions::default());
        assert_eq!(knots.first(), Some(&0));
        assert_eq!(knots.last(), Some(&49));
        assert!(knots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bound_is_met() {
        let xs = times(90);
        let ys: Vec<f64> = xs.iter().map(|x| (x * 5.0).sin() * 2.0).collect();
        let options = KnotOptions::default();
        let bound = 0.005;
        let knots = fit_knots(&xs, &ys, bound, &options);
        let spline = knot_interpolant(options.interpolation, &xs, &ys, &knots);
        for (&x, &y) in xs.iter().zip(&ys) {
            assert!((spline.evaluate(x) - y).abs() <= bound, "at {x}");
        }
        assert!(knots.len() < xs.len());
    }

    #[test]
    fn test_straight_line_needs_two_knots() {
        let xs = times(40);
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x - 1.0).collect();
        let knots = fit_knots(&xs, &ys, 1e-6, &KnotOptions::default());
        assert_eq!(knots, vec![0, 39]);
    }

    #[test]
    fn test_joint_axes_share_knots() {
        let xs = times(60);
        let flat = vec![0.0; 60];
        let bumpy: Vec<f64> = xs.iter().map(|x| (x * 9.0).sin()).collect();
        let fit = fit_knots_joint(
            &xs,
            &[&flat, &bumpy],
            &[0.01, 0.01],
            &KnotOptions::default(),
        );
        assert!(fit.error <= 1.0);
        for (ys, bound) in [(&flat, 0.01), (&bumpy, 0.01)] {
            let spline = knot_interpolant(Interpolation::Akima, &xs, ys, &fit.knots);
            for (&x, &y) in xs.iter().zip(ys.iter()) {
                assert!((spline.evaluate(x) - y).abs() <= bound);
            }
        }
    }

    #[test]
    fn test_quantized_residuals_fit_width() {
        let xs = times(120);
        let ys: Vec<f64> = xs.iter().map(|x| (x * 4.0).sin() + 0.1 * (x * 31.0).cos()).collect();
        let bound = 0.01;
        let bits = 4;
        let options = KnotOptions::default();
        let fit = fit_knots_quantized(&xs, &[&ys], &[bound], bits, &options);

        let spline = knot_interpolant(options.interpolation, &xs, &ys, &fit.knots);
        for (i, (&x, &y)) in xs.iter().zip(&ys).enumerate() {
            let code = fit.residuals[0][i];
            assert!((code as i32).abs() <= 7);
            let value = spline.evaluate(x) + code as f64 * fit.steps[0];
            assert!((value - y).abs() <= bound + 1e-12, "sample {i}");
        }
    }

    #[test]
    fn test_seeds_are_deterministic() {
        assert_eq!(seed_knots(100, 5, 42), seed_knots(100, 5, 42));
        assert_eq!(seed_knots(100, 0, 42), BTreeSet::from([0, 99]));
    }
}

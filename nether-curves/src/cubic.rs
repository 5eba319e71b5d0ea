//! Incremental least-squares cubic segmentation.
//!
//! Points are consumed left to right while a running set of power sums is
//! updated in O(1) per point. After each point the 4x4 normal equations are
//! solved in closed form; the segment grows while the fit stays within the
//! error bound and a new segment starts at the first point that breaks it.

use glam::{DMat3, DMat4, DVec2, DVec3, DVec4};

use crate::math::{self, DET_EPSILON};

/// Fewest points a free cubic needs.
const MIN_FREE_POINTS: f64 = 4.0;

/// Fewest points a slope-constrained cubic needs.
const MIN_CONNECTED_POINTS: f64 = 3.0;

/// `y = a u^3 + b u^2 + c u + d` with `u = x - x0`.
///
/// Coefficients are held at `f32` precision, which is how they are stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicSegment {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub x0: f64,
    /// First sample covered.
    pub start: usize,
    /// Last sample covered (inclusive).
    pub end: usize,
}

impl CubicSegment {
    pub fn new(coefficients: [f64; 4], x0: f64, start: usize, end: usize) -> Self {
        let [a, b, c, d] = coefficients.map(|v| v as f32 as f64);
        Self {
            a,
            b,
            c,
            d,
            x0,
            start,
            end,
        }
    }

    pub fn coefficients(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let u = x - self.x0;
        ((self.a * u + self.b) * u + self.c) * u + self.d
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let u = x - self.x0;
        (3.0 * self.a * u + 2.0 * self.b) * u + self.c
    }
}

/// Piece of a segmented curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CubicPiece {
    Segment(CubicSegment),
    /// Samples `start..=end` kept verbatim.
    Raw { start: usize, end: usize },
}

impl CubicPiece {
    pub fn range(&self) -> (usize, usize) {
        match *self {
            CubicPiece::Segment(s) => (s.start, s.end),
            CubicPiece::Raw { start, end } => (start, end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicOptions {
    /// Constrain each segment's start slope to the previous segment's slope.
    pub continuous: bool,
    pub det_epsilon: f64,
}

impl Default for CubicOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            det_epsilon: DET_EPSILON,
        }
    }
}

/// Running power sums of `(u, v)` relative to the segment origin.
///
/// `s{i}{j}` is the sum of `u^i * v^j`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PowerSums {
    s00: f64,
    s10: f64,
    s20: f64,
    s30: f64,
    s40: f64,
    s50: f64,
    s60: f64,
    s01: f64,
    s11: f64,
    s21: f64,
    s31: f64,
}

impl PowerSums {
    /// Sums for the segment origin alone.
    fn origin() -> Self {
        Self {
            s00: 1.0,
            ..Self::default()
        }
    }

    fn add(&mut self, p: DVec2) {
        let u = p.x;
        let v = p.y;
        let u2 = u * u;
        let u3 = u2 * u;
        self.s00 += 1.0;
        self.s10 += u;
        self.s20 += u2;
        self.s30 += u3;
        self.s40 += u3 * u;
        self.s50 += u3 * u2;
        self.s60 += u3 * u3;
        self.s01 += v;
        self.s11 += u * v;
        self.s21 += u2 * v;
        self.s31 += u3 * v;
    }

    /// Relative `[a, b, c, d]` of the least-squares cubic.
    fn free_fit(&self, epsilon: f64) -> Option<[f64; 4]> {
        if self.s00 < MIN_FREE_POINTS {
            return None;
        }
        let m = DMat4::from_cols(
            DVec4::new(self.s60, self.s50, self.s40, self.s30),
            DVec4::new(self.s50, self.s40, self.s30, self.s20),
            DVec4::new(self.s40, self.s30, self.s20, self.s10),
            DVec4::new(self.s30, self.s20, self.s10, self.s00),
        );
        let rhs = DVec4::new(self.s31, self.s21, self.s11, self.s01);
        math::solve4(m, rhs, epsilon).map(|x| x.to_array())
    }

    /// Relative `[a, b, c, d]` with the linear term fixed to `c`.
    fn connected_fit(&self, c: f64, epsilon: f64) -> Option<[f64; 4]> {
        if self.s00 < MIN_CONNECTED_POINTS {
            return None;
        }
        let m = DMat3::from_cols(
            DVec3::new(self.s60, self.s50, self.s30),
            DVec3::new(self.s50, self.s40, self.s20),
            DVec3::new(self.s30, self.s20, self.s00),
        );
        let rhs = DVec3::new(
            self.s31 - c * self.s40,
            self.s21 - c * self.s30,
            self.s01 - c * self.s10,
        );
        math::solve3(m, rhs, epsilon).map(|x| [x.x, x.y, c, x.z])
    }
}

fn fits(segment: &CubicSegment, points: &[DVec2], max_error: f64) -> bool {
    points[segment.start..=segment.end]
        .iter()
        .all(|p| (p.y - segment.evaluate(p.x)).abs() <= max_error)
}

/// Split `points` into disjoint cubic segments within `max_error`.
///
/// Points that cannot be covered by any cubic (too few left, or a singular
/// system) become [`CubicPiece::Raw`] pieces. Every point is covered by
/// exactly one piece and pieces are in order.
pub fn fit_cubics(points: &[DVec2], max_error: f64, options: &CubicOptions) -> Vec<CubicPiece> {
    let n = points.len();
    let mut pieces = Vec::new();
    let mut index = 0;
    let mut exit_slope: Option<f64> = None;

    while index < n {
        let start = index;
        let origin = points[start];
        let fixed_slope = if options.continuous { exit_slope } else { None };

        let mut sums = PowerSums::origin();
        let mut fitting: Option<CubicSegment> = None;
        index += 1;

        while index < n {
            sums.add(points[index] - origin);
            let relative = match fixed_slope {
                Some(c) => sums.connected_fit(c, options.det_epsilon),
                None => sums.free_fit(options.det_epsilon),
            };
            let Some([a, b, c, d]) = relative else {
                index += 1;
                continue;
            };

            let candidate = CubicSegment::new([a, b, c, d + origin.y], origin.x, start, index);
            if !fits(&candidate, points, max_error) {
                break;
            }
            fitting = Some(candidate);
            index += 1;
        }

        match fitting {
            Some(segment) => {
                index = segment.end + 1;
                exit_slope = points.get(index).map(|p| segment.derivative(p.x));
                pieces.push(CubicPiece::Segment(segment));
            }
            None => {
                pieces.push(CubicPiece::Raw {
                    start,
                    end: index - 1,
                });
                exit_slope = None;
            }
        }
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize, f: impl Fn(f64) -> f64) -> Vec<DVec2> {
        (0..n)
            .map(|i| {
                let x = i as f64 * 0.25;
                DVec2::new(x, f(x))
            })
            .collect()
    }

    fn assert_covers(pieces: &[CubicPiece], n: usize) {
        let mut next = 0;
        for piece in pieces {
            let (start, end) = piece.range();
            assert_eq!(start, next, "pieces must be contiguous");
            assert!(end >= start);
            next = end + 1;
        }
        assert_eq!(next, n);
    }

    #[test]
    fn test_exact_cubic_is_one_segment() {
        let pts = points(30, |x| 0.5 * x * x * x - x * x + 2.0 * x - 3.0);
        let pieces = fit_cubics(&pts, 1e-3, &CubicOptions::default());
        assert_eq!(pieces.len(), 1);
        let CubicPiece::Segment(segment) = pieces[0] else {
            panic!("expected a segment, got {:?}", pieces[0]);
        };
        assert_eq!((segment.start, segment.end), (0, 29));
        for p in &pts {
            assert!((segment.evaluate(p.x) - p.y).abs() <= 1e-3);
        }
    }

    #[test]
    fn test_short_input_is_raw() {
        let pts = points(3, |x| x);
        let pieces = fit_cubics(&pts, 1e-3, &CubicOptions::default());
        assert_eq!(pieces, vec![CubicPiece::Raw { start: 0, end: 2 }]);
    }

    #[test]
    fn test_segments_cover_and_respect_bound() {
        let pts = points(80, |x| (x * 1.3).sin() * 2.0 + (x * 0.4).cos());
        let bound = 0.01;
        let pieces = fit_cubics(&pts, bound, &CubicOptions::default());
        assert_covers(&pieces, pts.len());
        assert!(pieces.len() > 1);
        for piece in &pieces {
            if let CubicPiece::Segment(segment) = piece {
                for p in &pts[segment.start..=segment.end] {
                    assert!((segment.evaluate(p.x) - p.y).abs() <= bound);
                }
            }
        }
    }

    #[test]
    fn test_continuous_segments_cover() {
        let pts = points(80, |x| (x * 1.3).sin() * 2.0);
        let bound = 0.01;
        let options = CubicOptions {
            continuous: true,
            ..CubicOptions::default()
        };
        let pieces = fit_cubics(&pts, bound, &options);
        assert_covers(&pieces, pts.len());
        for piece in &pieces {
            if let CubicPiece::Segment(segment) = piece {
                for p in &pts[segment.start..=segment.end] {
                    assert!((segment.evaluate(p.x) - p.y).abs() <= bound);
                }
            }
        }
    }

    #[test]
    fn test_power_sums_origin_counts_start_point() {
        let mut sums = PowerSums::origin();
        sums.add(DVec2::new(1.0, 2.0));
        sums.add(DVec2::new(2.0, 3.0));
        assert_eq!(sums.s00, 3.0);
        assert_eq!(sums.s10, 3.0);
        assert_eq!(sums.s31, 1.0 * 2.0 + 8.0 * 3.0);
        assert!(sums.free_fit(DET_EPSILON).is_none());
    }
}

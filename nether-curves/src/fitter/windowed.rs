//! Fixed-point Chebyshev windows.
//!
//! Each bucket is cut greedily into windows. From every window start the
//! search grows the window while an `i16`-coded series of a given length
//! still fits, then keeps the (length, count) pair with the best ratio of
//! input bytes to coefficient bytes. Several caps on the coefficient count
//! are tried in parallel and the smallest total encoding wins.

use rayon::prelude::*;

use crate::chebyshev::{Chebyshev, FixedPointChebyshev, fixed_point_scales};
use crate::config::ErrorBounds;
use crate::error::Result;
use crate::spline::AkimaSpline;
use crate::stream::{EncodedStreams, MAX_RECORD_SPAN, RECORD_HEADER_SIZE};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets, storage_precision};

/// Coefficient caps tried per bucket.
pub const DEFAULT_WINDOW_COUNTS: [usize; 5] = [4, 8, 16, 24, 32];

#[derive(Debug, Clone)]
pub struct WindowedChebyshevFitter {
    bounds: ErrorBounds,
    bucket_len: usize,
    window_counts: Vec<usize>,
}

impl WindowedChebyshevFitter {
    pub fn new(bounds: ErrorBounds, bucket_len: usize, window_counts: Vec<usize>) -> Self {
        Self {
            bounds,
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
            window_counts,
        }
    }
}

#[derive(Debug, Clone)]
enum Window {
    Fixed {
        start: usize,
        end: usize,
        series: FixedPointChebyshev,
    },
    Raw {
        index: usize,
    },
}

impl Window {
    fn end(&self) -> usize {
        match self {
            Window::Fixed { end, .. } => *end,
            Window::Raw { index } => *index,
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            Window::Fixed { series, .. } => RECORD_HEADER_SIZE + 4 + 2 * series.codes.len(),
            Window::Raw { .. } => RECORD_HEADER_SIZE + 4,
        }
    }
}

struct Bucket<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    spline: AkimaSpline,
    bound: f64,
}

impl Bucket<'_> {
    fn fixed_series(&self, start: usize, end: usize, count: usize) -> FixedPointChebyshev {
        let scales = fixed_point_scales(self.bound, count);
        Chebyshev::from_fn(|x| self.spline.evaluate(x), self.xs[start], self.xs[end], count)
            .quantize_fixed(&scales)
    }

    fn fits(&self, series: &Chebyshev, start: usize, end: usize) -> bool {
        (start..=end).all(|i| (series.value(self.xs[i]) - self.ys[i]).abs() <= self.bound)
    }

    /// Longest fitting window from `start` using exactly `count` coefficients.
    ///
    /// The length doubles until a window stops fitting, then the boundary is
    /// bisected.
    fn grow(&self, start: usize, count: usize) -> Option<Window> {
        let last = self.xs.len() - 1;
        let attempt = |end: usize| {
            let series = self.fixed_series(start, end, count);
            self.fits(&series.dequantized, start, end).then_some(series)
        };

        let mut best = None;
        let mut failed = None;
        let mut len = 1;
        loop {
            let end = (start + len).min(last);
            match attempt(end) {
                Some(series) => {
                    best = Some((end, series));
                    if end == last {
                        break;
                    }
                    len *= 2;
                }
                None => {
                    failed = Some(end);
                    break;
                }
            }
        }

        let (mut end, mut series) = best?;
        if let Some(mut bad) = failed {
            while bad - end > 1 {
                let mid = end + (bad - end) / 2;
                match attempt(mid) {
                    Some(s) => {
                        end = mid;
                        series = s;
                    }
                    None => bad = mid,
                }
            }
        }
        Some(Window::Fixed { start, end, series })
    }

    /// Best window from `start` with at most `max_count` coefficients.
    fn best_window(&self, start: usize, max_count: usize) -> Window {
        let grown: Vec<Option<Window>> = (1..=max_count)
            .into_par_iter()
            .map(|count| self.grow(start, count))
            .collect();

        let ratio = |w: &Window| match w {
            Window::Fixed { start, end, series } => {
                ((end - start + 1) * 4) as f64 / (2 + 2 * series.codes.len()) as f64
            }
            Window::Raw { .. } => 0.0,
        };

        // Highest ratio; ties keep the smaller count.
        grown
            .into_iter()
            .flatten()
            .fold(None::<Window>, |best, w| match best {
                Some(b) if ratio(&b) >= ratio(&w) => Some(b),
                _ => Some(w),
            })
            .unwrap_or(Window::Raw { index: start })
    }

    fn partition(&self, max_count: usize) -> (Vec<Window>, usize) {
        let mut windows = Vec::new();
        let mut start = 0;
        while start < self.xs.len() {
            let window = self.best_window(start, max_count);
            start = window.end() + 1;
            windows.push(window);
        }
        let bytes = windows.iter().map(Window::byte_len).sum();
        (windows, bytes)
    }
}

impl ChannelFitter for WindowedChebyshevFitter {
    fn name(&self) -> &'static str {
        "windowed"
    }

    fn fit_channel(
        &self,
        ctx: &ChannelContext<'_>,
        values: &mut [f32],
        streams: &mut EncodedStreams,
    ) -> Result<FitReport> {
        let before = streams.len();
        let bound = storage_precision(self.bounds.get(ctx.property));
        let channel = FitChannel::new(ctx, values, true)?;
        streams.begin_channel(&channel.header);

        let mut fit = channel.axes.clone();
        for (axis, ys) in channel.axes.iter().enumerate() {
            for range in buckets(channel.len(), self.bucket_len) {
                let xs = &channel.xs[range.clone()];
                let bucket = Bucket {
                    xs,
                    ys: &ys[range.clone()],
                    spline: AkimaSpline::new(xs, &ys[range.clone()]),
                    bound,
                };

                let trials: Vec<(Vec<Window>, usize)> = self
                    .window_counts
                    .par_iter()
                    .map(|&max_count| bucket.partition(max_count))
                    .collect();
                let Some((windows, bytes)) = trials
                    .into_iter()
                    .min_by_key(|(_, bytes)| *bytes)
                else {
                    streams.push_raw(bucket.ys);
                    continue;
                };

                tracing::debug!(
                    "node {} {} axis {} [{}..{}] -> {} windows, {} bytes",
                    ctx.node,
                    ctx.property,
                    axis,
                    range.start,
                    range.end,
                    windows.len(),
                    bytes
                );

                let out = &mut fit[axis][range.clone()];
                for window in &windows {
                    match window {
                        Window::Fixed { start, end, series } => {
                            streams.push_fixed_chebyshev(&series.codes, bound, end - start + 1);
                            let covered = *start..=*end;
                            for (slot, &x) in out[covered.clone()].iter_mut().zip(&xs[covered]) {
                                *slot = series.dequantized.value(x);
                            }
                        }
                        Window::Raw { index } => {
                            streams.push_raw(&bucket.ys[*index..=*index]);
                            out[*index] = bucket.ys[*index];
                        }
                    }
                }
            }
        }

        channel.commit(&fit, values);
        Ok(FitReport {
            input_bytes: values.len() * 4,
            output_bytes: streams.len() - before,
        })
    }
}

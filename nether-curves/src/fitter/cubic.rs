use glam::DVec2;

use crate::config::ErrorBounds;
use crate::cubic::{CubicOptions, CubicPiece, fit_cubics};
use crate::error::Result;
use crate::stream::{EncodedStreams, MAX_RECORD_SPAN};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets, storage_precision};

/// Piecewise cubic regression per axis.
#[derive(Debug, Clone)]
pub struct CubicFitter {
    bounds: ErrorBounds,
    bucket_len: usize,
    options: CubicOptions,
}

impl CubicFitter {
    pub fn new(bounds: ErrorBounds, bucket_len: usize, options: CubicOptions) -> Self {
        Self {
            bounds,
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
            options,
        }
    }
}

impl ChannelFitter for CubicFitter {
    fn name(&self) -> &'static str {
        "cubic"
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
                let points: Vec<DVec2> = range
                    .clone()
                    .map(|i| DVec2::new(channel.xs[i], ys[i]))
                    .collect();
                let pieces = fit_cubics(&points, bound, &self.options);

                let raw = pieces
                    .iter()
                    .filter(|p| matches!(p, CubicPiece::Raw { .. }))
                    .count();
                if raw > 0 {
                    tracing::warn!(
                        "node {} {} axis {} [{}..{}]: {} of {} pieces stored raw",
                        ctx.node,
                        ctx.property,
                        axis,
                        range.start,
                        range.end,
                        raw,
                        pieces.len()
                    );
                }

                for piece in &pieces {
                    let (start, end) = piece.range();
                    match piece {
                        CubicPiece::Segment(segment) => {
                            streams.push_cubic(segment);
                            for i in start..=end {
                                fit[axis][range.start + i] = segment.evaluate(points[i].x);
                            }
                        }
                        CubicPiece::Raw { .. } => {
                            let raw_values: Vec<f64> =
                                points[start..=end].iter().map(|p| p.y).collect();
                            streams.push_raw(&raw_values);
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

use crate::chebyshev::fit_truncated;
use crate::config::ErrorBounds;
use crate::error::Result;
use crate::stream::{EncodedStreams, MAX_RECORD_SPAN};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets, storage_precision};

/// Truncated Chebyshev series without residuals.
#[derive(Debug, Clone)]
pub struct ChebyshevFitter {
    bounds: ErrorBounds,
    bucket_len: usize,
}

impl ChebyshevFitter {
    pub fn new(bounds: ErrorBounds, bucket_len: usize) -> Self {
        Self {
            bounds,
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
        }
    }
}

impl ChannelFitter for ChebyshevFitter {
    fn name(&self) -> &'static str {
        "chebyshev"
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
                let bucket_ys = &ys[range.clone()];
                match fit_truncated(xs, bucket_ys, bound, MAX_RECORD_SPAN) {
                    Some(result) => {
                        tracing::debug!(
                            "node {} {} axis {} [{}..{}] -> {}",
                            ctx.node,
                            ctx.property,
                            axis,
                            range.start,
                            range.end,
                            result.series.count()
                        );
                        streams.push_chebyshev(&result.series, xs.len(), 0, bound, &[]);
                        for (slot, &x) in fit[axis][range].iter_mut().zip(xs) {
                            *slot = result.series.value(x);
                        }
                    }
                    None => streams.push_raw(bucket_ys),
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

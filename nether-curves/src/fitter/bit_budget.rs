//! Truncated Chebyshev series plus fixed-width residuals, sized per bucket.

use crate::chebyshev::{MIN_FIT_SAMPLES, reference_series};
use crate::config::ErrorBounds;
use crate::error::Result;
use crate::quantizer::{DEFAULT_BIT_WIDTHS, check_width, quantize_bucket};
use crate::stream::{EncodedStreams, MAX_RECORD_SPAN};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets, storage_precision};

/// Default strategy: every bucket picks the residual width that minimizes
/// its encoded size.
#[derive(Debug, Clone)]
pub struct BitBudgetFitter {
    bounds: ErrorBounds,
    bucket_len: usize,
    bit_widths: Vec<u8>,
}

impl BitBudgetFitter {
    /// Fails when a candidate width is too wide for a residual code.
    pub fn new(bounds: ErrorBounds, bucket_len: usize, bit_widths: Vec<u8>) -> Result<Self> {
        bit_widths.iter().try_for_each(|&bits| check_width(bits))?;
        Ok(Self {
            bounds,
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
            bit_widths,
        })
    }
}

impl Default for BitBudgetFitter {
    fn default() -> Self {
        Self {
            bounds: ErrorBounds::default(),
            bucket_len: MAX_RECORD_SPAN,
            bit_widths: DEFAULT_BIT_WIDTHS.to_vec(),
        }
    }
}

impl ChannelFitter for BitBudgetFitter {
    fn name(&self) -> &'static str {
        "bit-budget"
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

                if xs.len() < MIN_FIT_SAMPLES {
                    streams.push_raw(bucket_ys);
                    continue;
                }

                let series = reference_series(xs, bucket_ys, MAX_RECORD_SPAN);
                match quantize_bucket(xs, bucket_ys, &series, &self.bit_widths, bound)? {
                    Some(bucket) => {
                        tracing::debug!(
                            "node {} {} axis {} [{}..{}] -> {} #{}",
                            ctx.node,
                            ctx.property,
                            axis,
                            range.start,
                            range.end,
                            bucket.count(),
                            bucket.bits
                        );
                        streams.push_chebyshev(
                            &bucket.series,
                            xs.len(),
                            bucket.bits,
                            bound,
                            &bucket.codes,
                        );
                        fit[axis][range].copy_from_slice(&bucket.reconstructed);
                    }
                    None => {
                        tracing::warn!(
                            "node {} {} axis {} [{}..{}] has no fitting series, storing raw",
                            ctx.node,
                            ctx.property,
                            axis,
                            range.start,
                            range.end
                        );
                        streams.push_raw(bucket_ys);
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

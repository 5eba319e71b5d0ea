use crate::config::ErrorBounds;
use crate::error::Result;
use crate::knots::{KnotOptions, fit_knots_quantized, knot_interpolant};
use crate::spline::Interpolation;
use crate::stream::{EncodedStreams, FLAG_LINEAR_KNOTS, MAX_RECORD_SPAN};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets, storage_precision};

/// Shared knots per bucket across all axes, with optional signed residuals.
#[derive(Debug, Clone)]
pub struct KnotFitter {
    bounds: ErrorBounds,
    bucket_len: usize,
    residual_bits: u8,
    options: KnotOptions,
}

impl KnotFitter {
    pub fn new(
        bounds: ErrorBounds,
        bucket_len: usize,
        residual_bits: u8,
        options: KnotOptions,
    ) -> Self {
        Self {
            bounds,
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
            residual_bits,
            options,
        }
    }
}

impl ChannelFitter for KnotFitter {
    fn name(&self) -> &'static str {
        "knots"
    }

    fn fit_channel(
        &self,
        ctx: &ChannelContext<'_>,
        values: &mut [f32],
        streams: &mut EncodedStreams,
    ) -> Result<FitReport> {
        let before = streams.len();
        let bound = storage_precision(self.bounds.get(ctx.property));
        let mut channel = FitChannel::new(ctx, values, true)?;
        if self.options.interpolation == Interpolation::Linear {
            channel.header.flags |= FLAG_LINEAR_KNOTS;
        }
        // Knot values are stored verbatim, so fit against what will be stored.
        for axis in &mut channel.axes {
            axis.iter_mut().for_each(|v| *v = storage_precision(*v));
        }
        streams.begin_channel(&channel.header);

        let dims = channel.axes.len();
        let bounds = vec![bound; dims];
        let mut fit = channel.axes.clone();

        for range in buckets(channel.len(), self.bucket_len) {
            let xs = &channel.xs[range.clone()];
            let axes: Vec<&[f64]> = channel.axes.iter().map(|a| &a[range.clone()]).collect();
            let result = fit_knots_quantized(xs, &axes, &bounds, self.residual_bits, &self.options);

            tracing::debug!(
                "node {} {} [{}..{}] -> {} knots #{}",
                ctx.node,
                ctx.property,
                range.start,
                range.end,
                result.knots.len(),
                self.residual_bits
            );

            let knot_values: Vec<Vec<f64>> = result
                .knots
                .iter()
                .map(|&k| axes.iter().map(|ys| ys[k]).collect())
                .collect();
            streams.push_knots(
                &result.knots,
                &knot_values,
                xs.len(),
                self.residual_bits,
                &result.steps,
                &result.residuals,
            );

            for (axis, ys) in axes.iter().enumerate() {
                let spline = knot_interpolant(self.options.interpolation, xs, ys, &result.knots);
                for (i, &x) in xs.iter().enumerate() {
                    let mut value = spline.evaluate(x);
                    if self.residual_bits > 0 {
                        value += result.residuals[axis][i] as f64 * result.steps[axis];
                    }
                    fit[axis][range.start + i] = value;
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

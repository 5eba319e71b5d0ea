use crate::error::{CurveError, Result};
use crate::stream::{EncodedStreams, MAX_RECORD_SPAN};

use super::{ChannelContext, ChannelFitter, FitChannel, FitReport, buckets};

/// Per-sample uniform quantization with the property's fixed table.
///
/// Rotations are quantized component-wise without the log mapping.
#[derive(Debug, Clone)]
pub struct UniformQuantizer {
    bucket_len: usize,
}

impl UniformQuantizer {
    pub fn new(bucket_len: usize) -> Self {
        Self {
            bucket_len: bucket_len.min(MAX_RECORD_SPAN),
        }
    }
}

impl ChannelFitter for UniformQuantizer {
    fn name(&self) -> &'static str {
        "quantize"
    }

    fn fit_channel(
        &self,
        ctx: &ChannelContext<'_>,
        values: &mut [f32],
        streams: &mut EncodedStreams,
    ) -> Result<FitReport> {
        let before = streams.len();
        let spec = ctx.property.quantization(ctx.is_root);
        let channel = FitChannel::new(ctx, values, false)?;
        streams.begin_channel(&channel.header);

        let mut fit = channel.axes.clone();
        for (axis, ys) in channel.axes.iter().enumerate() {
            for range in buckets(channel.len(), self.bucket_len) {
                let codes = ys[range.clone()]
                    .iter()
                    .map(|&v| {
                        let code = (v * spec.scale).round() as i64;
                        if code < spec.min_code() || code > spec.max_code() {
                            return Err(CurveError::ValueOutOfRange {
                                value: v as f32,
                                bits: spec.bits,
                            });
                        }
                        Ok(code)
                    })
                    .collect::<Result<Vec<_>>>()?;

                streams.push_quantized(&codes, spec.scale, spec.bits);
                for (slot, &code) in fit[axis][range].iter_mut().zip(&codes) {
                    *slot = code as f64 / spec.scale;
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

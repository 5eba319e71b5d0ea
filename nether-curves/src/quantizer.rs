//! Bit-budget residual quantizer.
//!
//! A bucket is stored as a truncated Chebyshev series plus an optional
//! fixed-width residual per sample. Wider residuals let the polynomial stray
//! further from the samples, so fewer coefficients are needed; the quantizer
//! tries every candidate width and keeps the cheapest encoding.
//!
//! For a width of `b` bits the residual codes are centered on
//! `mid = 2^(b-1) - 0.5`:
//!
//! ```text
//! span  = error_bound * max(mid, 1)          // allowed polynomial deviation
//! code  = round(mid * (y - p) / span + mid)  // in [0, 2^b - 1]
//! y'    = p + (code - mid) / mid * span      // |y - y'| <= error_bound / 2
//! ```

use rayon::prelude::*;

use crate::chebyshev::{Chebyshev, smallest_fitting_count};
use crate::error::{CurveError, Result};

/// Candidate residual widths tried per bucket.
pub const DEFAULT_BIT_WIDTHS: [u8; 4] = [0, 2, 4, 8];

/// Widest residual code; codes are stored as `u8`.
pub const MAX_RESIDUAL_BITS: u8 = 8;

/// Errors below this need no residuals at all.
pub const PERFECT_ERROR: f64 = 1e-6;

/// Bytes per stored coefficient.
const COEFFICIENT_BYTES: usize = 4;

/// Codec for one residual width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualQuantizer {
    bits: u8,
    mid: f64,
    span: f64,
}

impl ResidualQuantizer {
    pub fn new(bits: u8, error_bound: f64) -> Result<Self> {
        check_width(bits)?;
        let mid = if bits == 0 {
            0.0
        } else {
            (1u32 << (bits - 1)) as f64 - 0.5
        };
        Ok(Self {
            bits,
            mid,
            span: error_bound * mid.max(1.0),
        })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// How far the polynomial may deviate from the samples.
    pub fn tolerance(&self) -> f64 {
        self.span
    }

    pub fn max_code(&self) -> u32 {
        if self.bits == 0 {
            0
        } else {
            (1u32 << self.bits) - 1
        }
    }

    /// Encode `residual = y - p`.
    pub fn encode(&self, residual: f64) -> Result<u8> {
        let code = (self.mid * residual / self.span + self.mid).round();
        let out_of_range = CurveError::ResidualOutOfRange {
            code,
            bits: self.bits,
        };
        if !(0.0..=self.max_code() as f64).contains(&code) {
            return Err(out_of_range);
        }
        u8::try_from(code as u32).map_err(|_| out_of_range)
    }

    pub fn decode(&self, code: u8) -> f64 {
        if self.bits == 0 {
            return 0.0;
        }
        (code as f64 - self.mid) / self.mid * self.span
    }
}

/// Reject residual widths that do not fit a `u8` code.
pub fn check_width(bits: u8) -> Result<()> {
    if bits > MAX_RESIDUAL_BITS {
        return Err(CurveError::ResidualWidth {
            bits,
            max: MAX_RESIDUAL_BITS,
        });
    }
    Ok(())
}

/// Cheapest encoding of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedBucket {
    /// Series truncated to the chosen coefficient count.
    pub series: Chebyshev,
    /// Residual width; `0` when no residuals are stored.
    pub bits: u8,
    /// One code per sample, empty when the fit is exact enough.
    pub codes: Vec<u8>,
    /// Values the decoder will reproduce.
    pub reconstructed: Vec<f64>,
    /// Max `|y - y'|` over the bucket.
    pub error: f64,
    /// Modelled size: `1 + count * 4 + ceil(n * bits / 8)`.
    pub byte_len: usize,
}

impl QuantizedBucket {
    pub fn count(&self) -> usize {
        self.series.count()
    }
}

/// Pick the bit width and coefficient count that minimize the bucket's size.
///
/// `series` is the reference series at storage precision. Returns `Ok(None)`
/// when no width admits a fitting prefix; the caller raw-encodes the bucket.
/// Ties prefer fewer coefficients, then lower error, then the earlier width.
pub fn quantize_bucket(
    xs: &[f64],
    ys: &[f64],
    series: &Chebyshev,
    bit_widths: &[u8],
    error_bound: f64,
) -> Result<Option<QuantizedBucket>> {
    let candidates = bit_widths
        .par_iter()
        .map(|&bits| {
            let quantizer = ResidualQuantizer::new(bits, error_bound)?;
            encode_candidate(xs, ys, series, quantizer)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(candidates.into_iter().flatten().min_by(|a, b| {
        (a.byte_len, a.count())
            .cmp(&(b.byte_len, b.count()))
            .then(a.error.total_cmp(&b.error))
    }))
}

fn encode_candidate(
    xs: &[f64],
    ys: &[f64],
    series: &Chebyshev,
    quantizer: ResidualQuantizer,
) -> Result<Option<QuantizedBucket>> {
    let Some((m, fit_error)) = smallest_fitting_count(series, xs, ys, quantizer.tolerance())
    else {
        return Ok(None);
    };
    let series = series.truncated(m);
    let approx: Vec<f64> = xs.iter().map(|&x| series.value(x)).collect();

    let perfect = quantizer.bits() == 0 || fit_error < PERFECT_ERROR;
    let (codes, reconstructed, error) = if perfect {
        (Vec::new(), approx, fit_error)
    } else {
        let mut codes = Vec::with_capacity(xs.len());
        let mut reconstructed = Vec::with_capacity(xs.len());
        let mut error = 0.0f64;
        for (&y, &p) in ys.iter().zip(&approx) {
            let code = quantizer.encode(y - p)?;
            let value = p + quantizer.decode(code);
            error = error.max((y - value).abs());
            codes.push(code);
            reconstructed.push(value);
        }
        (codes, reconstructed, error)
    };

    let bits = if perfect { 0 } else { quantizer.bits() };
    let residual_bytes = (xs.len() * bits as usize).div_ceil(8);
    Ok(Some(QuantizedBucket {
        byte_len: 1 + m * COEFFICIENT_BYTES + residual_bytes,
        series,
        bits,
        codes,
        reconstructed,
        error,
    }))
}

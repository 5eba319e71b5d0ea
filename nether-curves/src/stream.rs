//! Compressed channel byte streams.
//!
//! Compression appends to two streams: `curves` holds channel headers and
//! fitted records, `residuals` holds the bit-packed residual codes of the
//! records that need them. Both are append-only and written in processing
//! order, so a decoder walks them in lockstep.
//!
//! # Channel layout
//!
//! ```text
//! ChannelHeader (11 bytes)
//!   u32 node
//!   u8  property
//!   u8  axes             values per sample in fit space
//!   u8  flags            bit 0: rotation stored as quaternion log
//!                        bit 1: knots use linear interpolation
//!   u32 sample_count
//! Record*
//! ```
//!
//! # Record layout
//!
//! ```text
//! u8 kind  u8 count-1  u8 span-1  u8 residual_bits
//! payload (kind specific, little-endian)
//! ```
//!
//! | Kind           | Payload                                          |
//! |----------------|--------------------------------------------------|
//! | Raw            | span x f32                                       |
//! | Chebyshev      | [f32 bound if bits > 0] count x f32              |
//! | FixedChebyshev | f32 bound, count x i16                           |
//! | Knots          | count x u8 offset, count x axes x f32,           |
//! |                | [axes x f32 step if bits > 0]                    |
//! | Cubic          | 4 x f32 (a, b, c, d)                             |
//! | Quantized      | f32 scale                                        |
//!
//! Knot records cover every axis at once. All other records cover one axis,
//! and a channel lists all records of axis 0 before those of axis 1.
//!
//! Each record with residuals owns a byte-aligned block of
//! `ceil(span * axes_covered * bits / 8)` bytes in the residual stream.

use crate::chebyshev::{Chebyshev, dequantize_fixed, fixed_point_scales};
use crate::cubic::CubicSegment;
use crate::error::{CurveError, Result};
use crate::knots::knot_interpolant;
use crate::math::{quat_exp, vec3_from_slice};
use crate::property::PropertyKind;
use crate::quantizer::{MAX_RESIDUAL_BITS, ResidualQuantizer};
use crate::spline::Interpolation;

// ============================================================================
// Constants
// ============================================================================

/// Longest span (and largest count) a record can describe.
pub const MAX_RECORD_SPAN: usize = 256;

pub const CHANNEL_HEADER_SIZE: usize = 11;
pub const RECORD_HEADER_SIZE: usize = 4;

/// Widest uniformly quantized sample; codes are read into a `u32`.
pub const MAX_QUANTIZED_BITS: u8 = 32;

pub const FLAG_LOG_ROTATION: u8 = 1 << 0;
pub const FLAG_LINEAR_KNOTS: u8 = 1 << 1;

// ============================================================================
// Headers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Raw = 0,
    Chebyshev = 1,
    FixedChebyshev = 2,
    Knots = 3,
    Cubic = 4,
    Quantized = 5,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Raw,
            1 => Self::Chebyshev,
            2 => Self::FixedChebyshev,
            3 => Self::Knots,
            4 => Self::Cubic,
            5 => Self::Quantized,
            other => return Err(CurveError::UnknownRecord(other)),
        })
    }

    /// Whether one record covers every axis of the channel.
    pub fn is_joint(self) -> bool {
        matches!(self, Self::Knots)
    }

    /// Widest residual code a record of this kind may declare.
    pub fn max_residual_bits(self) -> u8 {
        match self {
            Self::Raw | Self::FixedChebyshev | Self::Cubic => 0,
            Self::Chebyshev | Self::Knots => MAX_RESIDUAL_BITS,
            Self::Quantized => MAX_QUANTIZED_BITS,
        }
    }
}

/// Per-channel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHeader {
    pub node: u32,
    pub property: PropertyKind,
    /// Values per sample in fit space.
    pub axes: u8,
    pub flags: u8,
    pub sample_count: u32,
}

impl ChannelHeader {
    pub fn to_bytes(&self) -> [u8; CHANNEL_HEADER_SIZE] {
        let mut bytes = [0u8; CHANNEL_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.node.to_le_bytes());
        bytes[4] = self.property.index() as u8;
        bytes[5] = self.axes;
        bytes[6] = self.flags;
        bytes[7..11].copy_from_slice(&self.sample_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHANNEL_HEADER_SIZE {
            return Err(CurveError::Truncated);
        }
        Ok(Self {
            node: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            property: PropertyKind::from_index(bytes[4])?,
            axes: bytes[5],
            flags: bytes[6],
            sample_count: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
        })
    }

    /// Values per sample once decoded.
    pub fn output_dimension(&self) -> usize {
        if self.flags & FLAG_LOG_ROTATION != 0 {
            4
        } else {
            self.axes as usize
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        if self.flags & FLAG_LINEAR_KNOTS != 0 {
            Interpolation::Linear
        } else {
            Interpolation::Akima
        }
    }
}

/// Per-record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    /// Coefficients or knots, `1..=256`.
    pub count: usize,
    /// Samples covered, `1..=256`.
    pub span: usize,
    pub residual_bits: u8,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        debug_assert!((1..=MAX_RECORD_SPAN).contains(&self.count));
        debug_assert!((1..=MAX_RECORD_SPAN).contains(&self.span));
        [
            self.kind as u8,
            (self.count - 1) as u8,
            (self.span - 1) as u8,
            self.residual_bits,
        ]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(CurveError::Truncated);
        }
        let kind = RecordKind::from_u8(bytes[0])?;
        let residual_bits = bytes[3];
        if residual_bits > kind.max_residual_bits() {
            return Err(CurveError::ResidualWidth {
                bits: residual_bits,
                max: kind.max_residual_bits(),
            });
        }
        Ok(Self {
            kind,
            count: bytes[1] as usize + 1,
            span: bytes[2] as usize + 1,
            residual_bits,
        })
    }
}

// ============================================================================
// Bit packing
// ============================================================================

/// LSB-first bit writer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value`.
    pub fn write(&mut self, value: u32, bits: u8) {
        for i in 0..bits {
            let bit = self.bit_len % 8;
            if bit == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 != 0
                && let Some(last) = self.bytes.last_mut()
            {
                *last |= 1 << bit;
            }
            self.bit_len += 1;
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reader for [`BitWriter`] output.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    pub fn read(&mut self, bits: u8) -> Result<u32> {
        let mut value = 0u32;
        for i in 0..bits {
            let byte = self
                .bytes
                .get(self.bit_pos / 8)
                .ok_or(CurveError::Truncated)?;
            if (byte >> (self.bit_pos % 8)) & 1 != 0 {
                value |= 1 << i;
            }
            self.bit_pos += 1;
        }
        Ok(value)
    }
}

/// Bytes occupied by `values` codes of `bits` bits.
pub fn packed_len(values: usize, bits: u8) -> usize {
    (values * bits as usize).div_ceil(8)
}

// ============================================================================
// Writer
// ============================================================================

/// Append-only curve and residual streams.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EncodedStreams {
    pub curves: Vec<u8>,
    pub residuals: Vec<u8>,
}

impl EncodedStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes across both streams.
    pub fn len(&self) -> usize {
        self.curves.len() + self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty() && self.residuals.is_empty()
    }

    pub fn begin_channel(&mut self, header: &ChannelHeader) {
        self.curves.extend_from_slice(&header.to_bytes());
    }

    fn push_header(&mut self, kind: RecordKind, count: usize, span: usize, residual_bits: u8) {
        let header = RecordHeader {
            kind,
            count,
            span,
            residual_bits,
        };
        self.curves.extend_from_slice(&header.to_bytes());
    }

    fn push_f32(&mut self, value: f64) {
        self.curves.extend_from_slice(&(value as f32).to_le_bytes());
    }

    fn push_residuals(&mut self, codes: impl IntoIterator<Item = u32>, bits: u8) {
        let mut writer = BitWriter::new();
        for code in codes {
            writer.write(code, bits);
        }
        self.residuals.extend_from_slice(&writer.into_bytes());
    }

    pub fn push_raw(&mut self, values: &[f64]) {
        self.push_header(RecordKind::Raw, 1, values.len(), 0);
        for &v in values {
            self.push_f32(v);
        }
    }

    /// Truncated series with optional residual codes of `bits` bits.
    pub fn push_chebyshev(
        &mut self,
        series: &Chebyshev,
        span: usize,
        bits: u8,
        error_bound: f64,
        codes: &[u8],
    ) {
        self.push_header(RecordKind::Chebyshev, series.count(), span, bits);
        if bits > 0 {
            self.push_f32(error_bound);
        }
        for &c in series.coefficients() {
            self.push_f32(c);
        }
        if bits > 0 {
            self.push_residuals(codes.iter().map(|&c| c as u32), bits);
        }
    }

    pub fn push_fixed_chebyshev(&mut self, codes: &[i16], error_bound: f64, span: usize) {
        self.push_header(RecordKind::FixedChebyshev, codes.len(), span, 0);
        self.push_f32(error_bound);
        for &q in codes {
            self.curves.extend_from_slice(&q.to_le_bytes());
        }
    }

    /// Joint knot record.
    ///
    /// `values[k][axis]` is the fit-space value at knot `k`. `residuals` holds
    /// one signed code per sample per axis, axis-major, when `bits > 0`.
    pub fn push_knots(
        &mut self,
        offsets: &[usize],
        values: &[Vec<f64>],
        span: usize,
        bits: u8,
        steps: &[f64],
        residuals: &[Vec<i8>],
    ) {
        self.push_header(RecordKind::Knots, offsets.len(), span, bits);
        for &offset in offsets {
            self.curves.push(offset as u8);
        }
        for knot in values {
            for &v in knot {
                self.push_f32(v);
            }
        }
        if bits > 0 {
            for &step in steps {
                self.push_f32(step);
            }
            let bias = 1i32 << (bits - 1);
            self.push_residuals(
                residuals
                    .iter()
                    .flatten()
                    .map(|&r| (r as i32 + bias) as u32),
                bits,
            );
        }
    }

    pub fn push_cubic(&mut self, segment: &CubicSegment) {
        let span = segment.end - segment.start + 1;
        self.push_header(RecordKind::Cubic, 4, span, 0);
        for c in segment.coefficients() {
            self.push_f32(c);
        }
    }

    /// Uniformly quantized samples: `codes[i]` is `round(v * scale)`.
    pub fn push_quantized(&mut self, codes: &[i64], scale: f64, magnitude_bits: u32) {
        let bits = (magnitude_bits + 1) as u8;
        self.push_header(RecordKind::Quantized, 1, codes.len(), bits);
        self.push_f32(scale);
        let bias = 1i64 << magnitude_bits;
        self.push_residuals(codes.iter().map(|&q| (q + bias) as u32), bits);
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Samples of one decoded channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub header: ChannelHeader,
    /// `sample_count * output_dimension` values, sample-major.
    pub values: Vec<f32>,
}

/// Sequential decoder over a pair of streams.
#[derive(Debug)]
pub struct ChannelReader<'a> {
    curves: &'a [u8],
    residuals: &'a [u8],
    curve_pos: usize,
    residual_pos: usize,
}

impl<'a> ChannelReader<'a> {
    pub fn new(curves: &'a [u8], residuals: &'a [u8]) -> Self {
        Self {
            curves,
            residuals,
            curve_pos: 0,
            residual_pos: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.curve_pos >= self.curves.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.curve_pos + len;
        let bytes = self
            .curves
            .get(self.curve_pos..end)
            .ok_or(CurveError::Truncated)?;
        self.curve_pos = end;
        Ok(bytes)
    }

    fn read_f32(&mut self) -> Result<f64> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
    }

    fn residual_block(&mut self, values: usize, bits: u8) -> Result<BitReader<'a>> {
        let len = packed_len(values, bits);
        let end = self.residual_pos + len;
        let bytes = self
            .residuals
            .get(self.residual_pos..end)
            .ok_or(CurveError::Truncated)?;
        self.residual_pos = end;
        Ok(BitReader::new(bytes))
    }

    /// Decode the next channel. `times` is the shared timeline.
    pub fn decode_channel(&mut self, times: &[f32]) -> Result<DecodedChannel> {
        let header = ChannelHeader::from_bytes(self.take(CHANNEL_HEADER_SIZE)?)?;
        let n = header.sample_count as usize;
        let axes = header.axes as usize;
        if times.len() < n {
            return Err(CurveError::SampleCountMismatch {
                node: header.node as usize,
                property: header.property,
                expected: times.len(),
                actual: n,
            });
        }
        let xs: Vec<f64> = times[..n].iter().map(|&t| t as f64).collect();

        let mut fit = vec![vec![0.0f64; n]; axes];
        let mut filled = vec![0usize; axes];

        while let Some(axis) = filled.iter().position(|&f| f < n) {
            let record = RecordHeader::from_bytes(self.take(RECORD_HEADER_SIZE)?)?;
            let start = filled[axis];
            let end = start + record.span;
            if end > n {
                return Err(CurveError::Truncated);
            }
            let window = &xs[start..end];

            if record.kind.is_joint() {
                if filled.iter().any(|&f| f != start) {
                    return Err(CurveError::Truncated);
                }
                self.read_knots(&record, &header, window, &mut fit, start)?;
                filled.iter_mut().for_each(|f| *f = end);
            } else {
                let values = self.read_axis_record(&record, window)?;
                fit[axis][start..end].copy_from_slice(&values);
                filled[axis] = end;
            }
        }

        Ok(DecodedChannel {
            header,
            values: from_fit_space(&header, &fit),
        })
    }

    fn read_axis_record(&mut self, record: &RecordHeader, xs: &[f64]) -> Result<Vec<f64>> {
        let span = record.span;
        let (min_x, max_x) = (xs[0], xs[span - 1]);
        match record.kind {
            RecordKind::Raw => (0..span).map(|_| self.read_f32()).collect(),
            RecordKind::Chebyshev => {
                let bits = record.residual_bits;
                let bound = if bits > 0 { self.read_f32()? } else { 0.0 };
                let coefficients = (0..record.count)
                    .map(|_| self.read_f32())
                    .collect::<Result<Vec<_>>>()?;
                let series = Chebyshev::from_coefficients(coefficients, min_x, max_x);
                let mut values: Vec<f64> = xs.iter().map(|&x| series.value(x)).collect();
                if bits > 0 {
                    let quantizer = ResidualQuantizer::new(bits, bound)?;
                    let mut reader = self.residual_block(span, bits)?;
                    for v in &mut values {
                        *v += quantizer.decode(reader.read(bits)? as u8);
                    }
                }
                Ok(values)
            }
            RecordKind::FixedChebyshev => {
                let bound = self.read_f32()?;
                let codes = (0..record.count)
                    .map(|_| {
                        let b = self.take(2)?;
                        Ok(i16::from_le_bytes([b[0], b[1]]))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let scales = fixed_point_scales(bound, codes.len());
                let series = dequantize_fixed(&codes, &scales, min_x, max_x);
                Ok(xs.iter().map(|&x| series.value(x)).collect())
            }
            RecordKind::Cubic => {
                let mut c = [0.0f64; 4];
                for v in &mut c {
                    *v = self.read_f32()?;
                }
                let segment = CubicSegment::new(c, min_x, 0, span - 1);
                Ok(xs.iter().map(|&x| segment.evaluate(x)).collect())
            }
            RecordKind::Quantized => {
                let scale = self.read_f32()?;
                let bits = record.residual_bits;
                let bias = 1i64 << bits.saturating_sub(1);
                let mut reader = self.residual_block(span, bits)?;
                (0..span)
                    .map(|_| Ok((reader.read(bits)? as i64 - bias) as f64 / scale))
                    .collect()
            }
            RecordKind::Knots => Err(CurveError::UnknownRecord(record.kind as u8)),
        }
    }

    fn read_knots(
        &mut self,
        record: &RecordHeader,
        header: &ChannelHeader,
        xs: &[f64],
        fit: &mut [Vec<f64>],
        start: usize,
    ) -> Result<()> {
        let axes = fit.len();
        let offsets: Vec<usize> = self.take(record.count)?.iter().map(|&o| o as usize).collect();
        if offsets.iter().any(|&o| o >= record.span) {
            return Err(CurveError::Truncated);
        }

        let mut knot_values = vec![vec![0.0f64; xs.len()]; axes];
        for &offset in &offsets {
            for axis_values in knot_values.iter_mut() {
                axis_values[offset] = self.read_f32()?;
            }
        }

        let bits = record.residual_bits;
        let steps = if bits > 0 {
            (0..axes).map(|_| self.read_f32()).collect::<Result<Vec<_>>>()?
        } else {
            vec![0.0; axes]
        };
        let mut residuals = if bits > 0 {
            Some(self.residual_block(xs.len() * axes, bits)?)
        } else {
            None
        };
        let bias = if bits > 0 { 1i32 << (bits - 1) } else { 0 };

        for (axis, axis_values) in knot_values.iter().enumerate() {
            let spline = knot_interpolant(header.interpolation(), xs, axis_values, &offsets);
            for (i, &x) in xs.iter().enumerate() {
                let mut value = spline.evaluate(x);
                if let Some(reader) = residuals.as_mut() {
                    let code = reader.read(bits)? as i32 - bias;
                    value += code as f64 * steps[axis];
                }
                fit[axis][start + i] = value;
            }
        }
        Ok(())
    }
}

/// Convert fit-space axes back into sample-major channel values.
pub fn from_fit_space(header: &ChannelHeader, fit: &[Vec<f64>]) -> Vec<f32> {
    let n = header.sample_count as usize;
    let mut values = Vec::with_capacity(n * header.output_dimension());
    for i in 0..n {
        if header.flags & FLAG_LOG_ROTATION != 0 {
            let log = [fit[0][i] as f32, fit[1][i] as f32, fit[2][i] as f32];
            let q = quat_exp(vec3_from_slice(&log));
            values.extend([q.x as f32, q.y as f32, q.z as f32, q.w as f32]);
        } else {
            values.extend(fit.iter().map(|axis| axis[i] as f32));
        }
    }
    values
}

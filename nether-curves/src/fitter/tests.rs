use super::*;
use crate::config::ErrorBounds;
use crate::cubic::CubicOptions;
use crate::knots::KnotOptions;
use crate::math::{DET_EPSILON, quat_distance_squared};
use crate::spline::Interpolation;
use crate::stream::{ChannelReader, FLAG_LINEAR_KNOTS};
use glam::{DQuat, DVec3};

const SAMPLES: usize = 300;

fn times() -> Vec<f32> {
    (0..SAMPLES).map(|i| i as f32 / 30.0).collect()
}

fn translation_values(times: &[f32]) -> Vec<f32> {
    times
        .iter()
        .flat_map(|&t| [t.sin() * 2.0, 0.5 * t, (t * 0.7).cos()])
        .collect()
}

fn rotation_values(times: &[f32]) -> Vec<f32> {
    times
        .iter()
        .flat_map(|&t| {
            let q = DQuat::from_axis_angle(DVec3::new(1.0, 2.0, 0.5).normalize(), t as f64 * 0.8);
            [q.x as f32, q.y as f32, q.z as f32, q.w as f32]
        })
        .collect()
}

fn every_fitter() -> Vec<Box<dyn ChannelFitter>> {
    let bounds = ErrorBounds::default();
    vec![
        Box::new(BitBudgetFitter::default()),
        Box::new(ChebyshevFitter::new(bounds, 256)),
        Box::new(WindowedChebyshevFitter::new(
            bounds,
            256,
            DEFAULT_WINDOW_COUNTS.to_vec(),
        )),
        Box::new(KnotFitter::new(bounds, 256, 0, KnotOptions::default())),
        Box::new(KnotFitter::new(bounds, 256, 4, KnotOptions::default())),
        Box::new(CubicFitter::new(
            bounds,
            256,
            CubicOptions {
                continuous: false,
                det_epsilon: DET_EPSILON,
            },
        )),
        Box::new(UniformQuantizer::new(256)),
    ]
}

fn context(property: PropertyKind, dimension: usize, times: &[f32]) -> ChannelContext<'_> {
    ChannelContext {
        node: 3,
        property,
        dimension,
        is_root: true,
        times,
    }
}

#[test]
fn test_buckets_cover_range() {
    let ranges: Vec<_> = buckets(600, 256).collect();
    assert_eq!(ranges, vec![0..256, 256..512, 512..600]);
    assert_eq!(buckets(0, 256).count(), 0);
}

#[test]
fn test_rotation_log_axes_stay_continuous() {
    // Second sample is the same rotation with flipped sign.
    let values = [0.0, 0.0, 0.1, 0.995, -0.0, -0.0, -0.11, -0.994];
    let axes = rotation_log_axes(&values);
    assert_eq!(axes.len(), 3);
    assert!((axes[2][0] - axes[2][1]).abs() < 0.05);
}

#[test]
fn test_translation_respects_bound() {
    let times = times();
    let original = translation_values(&times);
    let bound = ErrorBounds::default().translation;
    for fitter in every_fitter() {
        let mut values = original.clone();
        let mut streams = EncodedStreams::new();
        let report = fitter
            .fit_channel(
                &context(PropertyKind::Translation, 3, &times),
                &mut values,
                &mut streams,
            )
            .unwrap();

        assert_eq!(report.input_bytes, original.len() * 4);
        assert_eq!(report.output_bytes, streams.len());
        let worst = original
            .iter()
            .zip(&values)
            .map(|(a, b)| (a - b).abs() as f64)
            .fold(0.0, f64::max);
        assert!(
            worst <= bound + 1e-4,
            "{} error {worst} exceeds {bound}",
            fitter.name()
        );
    }
}

#[test]
fn test_rotation_respects_bound() {
    let times = times();
    let original = rotation_values(&times);
    for fitter in every_fitter() {
        let mut values = original.clone();
        let mut streams = EncodedStreams::new();
        fitter
            .fit_channel(
                &context(PropertyKind::Rotation, 4, &times),
                &mut values,
                &mut streams,
            )
            .unwrap();

        for (a, b) in original.chunks_exact(4).zip(values.chunks_exact(4)) {
            let distance = quat_distance_squared(quat_from_slice(a), quat_from_slice(b)).sqrt();
            assert!(distance < 0.01, "{} drifted by {distance}", fitter.name());
        }
    }
}

#[test]
fn test_streams_decode_to_committed_values() {
    let times = times();
    for fitter in every_fitter() {
        let mut translation = translation_values(&times);
        let mut rotation = rotation_values(&times);
        let mut streams = EncodedStreams::new();
        fitter
            .fit_channel(
                &context(PropertyKind::Translation, 3, &times),
                &mut translation,
                &mut streams,
            )
            .unwrap();
        fitter
            .fit_channel(
                &context(PropertyKind::Rotation, 4, &times),
                &mut rotation,
                &mut streams,
            )
            .unwrap();

        let mut reader = ChannelReader::new(&streams.curves, &streams.residuals);
        let decoded_translation = reader.decode_channel(&times).unwrap();
        let decoded_rotation = reader.decode_channel(&times).unwrap();
        assert!(reader.is_finished(), "{} left trailing bytes", fitter.name());

        assert_eq!(decoded_translation.header.property, PropertyKind::Translation);
        assert_eq!(decoded_rotation.header.property, PropertyKind::Rotation);
        for (decoded, committed) in [
            (&decoded_translation.values, &translation),
            (&decoded_rotation.values, &rotation),
        ] {
            assert_eq!(decoded.len(), committed.len());
            for (d, c) in decoded.iter().zip(committed.iter()) {
                assert!((d - c).abs() < 1e-5, "{}: {d} != {c}", fitter.name());
            }
        }
    }
}

#[test]
fn test_short_channel_is_stored_raw() {
    let times = [0.0, 0.1, 0.2];
    let original = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    let mut values = original.clone();
    let mut streams = EncodedStreams::new();
    BitBudgetFitter::default()
        .fit_channel(
            &context(PropertyKind::Scale, 3, &times),
            &mut values,
            &mut streams,
        )
        .unwrap();
    assert_eq!(values, original);
}

#[test]
fn test_sample_count_mismatch() {
    let times = times();
    let mut values = vec![0.0; 10];
    let err = BitBudgetFitter::default()
        .fit_channel(
            &context(PropertyKind::Translation, 3, &times),
            &mut values,
            &mut EncodedStreams::new(),
        )
        .unwrap_err();
    assert!(matches!(err, CurveError::SampleCountMismatch { .. }));
}

#[test]
fn test_quantizer_rejects_out_of_range() {
    let times = times();
    let mut values = vec![1.0e6; SAMPLES * 3];
    let err = UniformQuantizer::new(256)
        .fit_channel(
            &context(PropertyKind::Translation, 3, &times),
            &mut values,
            &mut EncodedStreams::new(),
        )
        .unwrap_err();
    assert!(matches!(err, CurveError::ValueOutOfRange { .. }));
}

#[test]
fn test_child_translation_range_is_narrower() {
    let times = times();
    // 420 units is 4200 codes: inside the root range, outside a child's.
    let values = vec![420.0f32; SAMPLES * 3];
    let child = ChannelContext {
        is_root: false,
        ..context(PropertyKind::Translation, 3, &times)
    };
    let err = UniformQuantizer::new(256)
        .fit_channel(&child, &mut values.clone(), &mut EncodedStreams::new())
        .unwrap_err();
    assert!(matches!(err, CurveError::ValueOutOfRange { bits: 12, .. }));

    let mut root_values = values.clone();
    UniformQuantizer::new(256)
        .fit_channel(
            &context(PropertyKind::Translation, 3, &times),
            &mut root_values,
            &mut EncodedStreams::new(),
        )
        .unwrap();
    assert_eq!(root_values, values);
}

#[test]
fn test_linear_knots_set_header_flag() {
    let times = times();
    let mut values = translation_values(&times);
    let mut streams = EncodedStreams::new();
    let fitter = KnotFitter::new(
        ErrorBounds::default(),
        256,
        0,
        KnotOptions {
            interpolation: Interpolation::Linear,
            ..KnotOptions::default()
        },
    );
    fitter
        .fit_channel(
            &context(PropertyKind::Translation, 3, &times),
            &mut values,
            &mut streams,
        )
        .unwrap();
    let header = ChannelHeader::from_bytes(&streams.curves).unwrap();
    assert_ne!(header.flags & FLAG_LINEAR_KNOTS, 0);
    assert_eq!(header.interpolation(), Interpolation::Linear);
}

#[test]
fn test_weights_channel_keeps_dimension() {
    let times = times();
    let original: Vec<f32> = times
        .iter()
        .flat_map(|&t| [t.sin().abs(), 1.0 - t.sin().abs()])
        .collect();
    let mut values = original.clone();
    let mut streams = EncodedStreams::new();
    BitBudgetFitter::default()
        .fit_channel(
            &context(PropertyKind::Weights, 2, &times),
            &mut values,
            &mut streams,
        )
        .unwrap();
    let header = ChannelHeader::from_bytes(&streams.curves).unwrap();
    assert_eq!(header.axes, 2);
    assert_eq!(header.output_dimension(), 2);
    assert_eq!(values.len(), original.len());
}

#[test]
fn test_bit_budget_rejects_wide_residuals() {
    let bounds = ErrorBounds::default();
    assert!(matches!(
        BitBudgetFitter::new(bounds, 256, vec![0, 4, 9]),
        Err(CurveError::ResidualWidth { bits: 9, max: 8 })
    ));
    assert!(BitBudgetFitter::new(bounds, 256, vec![0, 2, 4, 8]).is_ok());
}

#[test]
fn test_bounds_are_taken_at_storage_precision() {
    let times = times();
    let original = translation_values(&times);
    let exact = ErrorBounds {
        translation: 0.03,
        ..ErrorBounds::default()
    };
    let stored = ErrorBounds {
        translation: storage_precision(0.03),
        ..exact
    };
    assert_ne!(exact.translation, stored.translation);

    let options = CubicOptions::default();
    let fitters = |bounds: ErrorBounds| -> Vec<Box<dyn ChannelFitter>> {
        vec![
            Box::new(ChebyshevFitter::new(bounds, 256)),
            Box::new(CubicFitter::new(bounds, 256, options)),
            Box::new(BitBudgetFitter::new(bounds, 256, vec![0, 2, 4, 8]).unwrap()),
        ]
    };
    for (a, b) in fitters(exact).into_iter().zip(fitters(stored)) {
        let (mut va, mut vb) = (original.clone(), original.clone());
        let (mut sa, mut sb) = (EncodedStreams::new(), EncodedStreams::new());
        let ctx = context(PropertyKind::Translation, 3, &times);
        a.fit_channel(&ctx, &mut va, &mut sa).unwrap();
        b.fit_channel(&ctx, &mut vb, &mut sb).unwrap();
        assert_eq!(va, vb, "{} committed different values", a.name());
        assert_eq!(sa.curves, sb.curves, "{} wrote different records", a.name());

        let worst = original
            .iter()
            .zip(&va)
            .map(|(x, y)| (x - y).abs() as f64)
            .fold(0.0, f64::max);
        assert!(worst <= stored.translation + 1e-5, "{} error {worst}", a.name());
    }
}

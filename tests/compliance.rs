//! Crate-level black-box scenarios: the six testable properties and the
//! EBU Tech 3341 anchor cases, driven only through the public API.

use r128meter::{ChannelRole, Error, MeasurementEngine, Mode, Reconfigured, NEGATIVE_INFINITY};
use std::f64::consts::PI;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Initializes a subscriber once per test binary so the engine's internal
/// `tracing::debug!`/`warn!` calls are visible under `--nocapture` instead
/// of going nowhere. Gated at `WARN` by default, same as the app binary
/// this library was split out of.
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::WARN.into()),
            )
            .with_test_writer()
            .init();
    });
}

fn sine(amplitude: f64, freq_hz: f64, fs: u32, seconds: f64, channels: usize) -> Vec<f64> {
    let n = (fs as f64 * seconds) as usize;
    let mut out = Vec::with_capacity(n * channels);
    for i in 0..n {
        let s = (2.0 * PI * freq_hz * i as f64 / fs as f64).sin() * amplitude;
        for _ in 0..channels {
            out.push(s);
        }
    }
    out
}

fn dbfs_amplitude(dbfs: f64) -> f64 {
    10f64.powf(dbfs / 20.0)
}

#[test]
fn silence_is_negative_infinity_across_every_measurement() {
    init_tracing();
    let mode = Mode::MOMENTARY
        | Mode::SHORT_TERM
        | Mode::INTEGRATED
        | Mode::LRA
        | Mode::SAMPLE_PEAK
        | Mode::TRUE_PEAK;
    let mut engine = MeasurementEngine::new(2, 48_000, mode).unwrap();
    engine.add_frames(&vec![0.0f64; 48_000 * 8 * 2]).unwrap();

    assert_eq!(engine.loudness_momentary().unwrap(), NEGATIVE_INFINITY);
    assert_eq!(engine.loudness_shortterm().unwrap(), NEGATIVE_INFINITY);
    assert_eq!(engine.loudness_global().unwrap(), NEGATIVE_INFINITY);
    assert_eq!(engine.loudness_range().unwrap(), 0.0);
    assert_eq!(engine.sample_peak(0).unwrap(), 0.0);
    assert_eq!(engine.true_peak(0).unwrap(), 0.0);
}

#[test]
fn pure_dc_never_registers_loudness() {
    init_tracing();
    // The high-pass stage of K-weighting removes DC entirely; a constant
    // input should settle to the silence sentinel once the transient has
    // passed through the 400 ms window.
    let mut engine = MeasurementEngine::new(1, 48_000, Mode::MOMENTARY).unwrap();
    engine.add_frames(&vec![0.8f64; 48_000 * 2]).unwrap();
    assert_eq!(engine.loudness_momentary().unwrap(), NEGATIVE_INFINITY);
}

#[test]
fn sample_format_equivalence() {
    init_tracing();
    let fs = 48_000;
    let f64_samples = sine(0.3, 1000.0, fs, 2.0, 2);
    let f32_samples: Vec<f32> = f64_samples.iter().map(|&s| s as f32).collect();
    let i16_samples: Vec<i16> = f64_samples
        .iter()
        .map(|&s| (s * 32768.0).round() as i16)
        .collect();
    let i32_samples: Vec<i32> = f64_samples
        .iter()
        .map(|&s| (s * 2_147_483_648.0).round() as i32)
        .collect();

    let mut e64 = MeasurementEngine::new(2, fs, Mode::INTEGRATED).unwrap();
    let mut e32 = MeasurementEngine::new(2, fs, Mode::INTEGRATED).unwrap();
    let mut e16 = MeasurementEngine::new(2, fs, Mode::INTEGRATED).unwrap();
    let mut e32i = MeasurementEngine::new(2, fs, Mode::INTEGRATED).unwrap();

    e64.add_frames(&f64_samples).unwrap();
    e32.add_frames(&f32_samples).unwrap();
    e16.add_frames(&i16_samples).unwrap();
    e32i.add_frames(&i32_samples).unwrap();

    let reference = e64.loudness_global().unwrap();
    for (name, got) in [
        ("f32", e32.loudness_global().unwrap()),
        ("i16", e16.loudness_global().unwrap()),
        ("i32", e32i.loudness_global().unwrap()),
    ] {
        assert!(
            (reference - got).abs() < 0.1,
            "{name}: expected ~{reference}, got {got}"
        );
    }
}

#[test]
fn frame_chunking_is_additive() {
    init_tracing();
    let samples = sine(0.4, 440.0, 48_000, 5.0, 2);

    let mut whole = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    whole.add_frames(&samples).unwrap();

    let mut chunked = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    for chunk in samples.chunks(2 * 433) {
        chunked.add_frames(chunk).unwrap();
    }

    assert_eq!(
        whole.loudness_global().unwrap(),
        chunked.loudness_global().unwrap()
    );
    assert_eq!(
        whole.loudness_range().unwrap(),
        chunked.loudness_range().unwrap()
    );
}

#[test]
fn multi_instance_aggregation_matches_concatenation() {
    init_tracing();
    let samples = sine(0.3, 1000.0, 48_000, 12.0, 2);
    let split = samples.len() / 2 / 2 * 2;

    let mut reference = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    reference.add_frames(&samples).unwrap();

    let mut a = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    let mut b = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    a.add_frames(&samples[..split]).unwrap();
    b.add_frames(&samples[split..]).unwrap();

    let merged_integrated = MeasurementEngine::loudness_global_multiple(&[&a, &b]).unwrap();
    let merged_range = MeasurementEngine::loudness_range_multiple(&[&a, &b]).unwrap();

    assert!(
        (merged_integrated - reference.loudness_global().unwrap()).abs() < 0.01
    );
    assert!((merged_range - reference.loudness_range().unwrap()).abs() < 0.1);
}

#[test]
fn histogram_mode_approximates_precise_mode() {
    init_tracing();
    let samples = sine(0.25, 997.0, 48_000, 30.0, 2);

    let mut precise = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED | Mode::LRA).unwrap();
    let mut hist = MeasurementEngine::new(
        2,
        48_000,
        Mode::INTEGRATED | Mode::LRA | Mode::HISTOGRAM,
    )
    .unwrap();

    precise.add_frames(&samples).unwrap();
    hist.add_frames(&samples).unwrap();

    let diff = (precise.loudness_global().unwrap() - hist.loudness_global().unwrap()).abs();
    assert!(diff < 0.2, "integrated diff={diff}");
}

#[test]
fn ebu_tech_3341_minus_23_lufs_sine_anchor() {
    init_tracing();
    let amp = dbfs_amplitude(-23.0);
    let samples = sine(amp, 1000.0, 48_000, 20.0, 2);
    let mut engine = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED).unwrap();
    engine.add_frames(&samples).unwrap();
    let measured = engine.loudness_global().unwrap();
    assert!(
        (measured - (-23.0)).abs() < 0.1,
        "expected -23.0 +/- 0.1 LUFS, got {measured}"
    );
}

#[test]
fn ebu_tech_3341_minus_33_lufs_sine_anchor() {
    init_tracing();
    let amp = dbfs_amplitude(-33.0);
    let samples = sine(amp, 1000.0, 48_000, 20.0, 2);
    let mut engine = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED).unwrap();
    engine.add_frames(&samples).unwrap();
    let measured = engine.loudness_global().unwrap();
    assert!(
        (measured - (-33.0)).abs() < 0.1,
        "expected -33.0 +/- 0.1 LUFS, got {measured}"
    );
}

#[test]
fn ebu_tech_3341_zero_dbfs_sine_true_peak_anchor() {
    init_tracing();
    let samples = sine(1.0, 1000.0, 48_000, 5.0, 2);
    let mut engine =
        MeasurementEngine::new(2, 48_000, Mode::SAMPLE_PEAK | Mode::TRUE_PEAK).unwrap();
    engine.add_frames(&samples).unwrap();
    for ch in 0..2 {
        let tp = engine.true_peak(ch).unwrap();
        assert!(
            (1.0..=1.01).contains(&tp),
            "channel {ch}: true peak {tp} outside [1.0, 1.01]"
        );
    }
}

#[test]
fn ebu_tech_3341_intersample_peak_exceeds_sample_peak_by_half_a_db() {
    init_tracing();
    // 997 Hz at -6 dBFS is the EBU Tech 3341 case chosen specifically
    // because its inter-sample excursion clears the true/sample peak gap
    // by at least 0.5 dB, not merely `tp >= sp`.
    let fs = 48_000;
    let amp = dbfs_amplitude(-6.0);
    let samples = sine(amp, 997.0, fs, 1.0, 1);
    let mut engine =
        MeasurementEngine::new(1, fs, Mode::SAMPLE_PEAK | Mode::TRUE_PEAK).unwrap();
    engine.add_frames(&samples).unwrap();
    let sp = engine.sample_peak(0).unwrap();
    let tp = engine.true_peak(0).unwrap();
    let margin_db = 20.0 * (tp / sp).log10();
    assert!(
        margin_db >= 0.5,
        "true peak {tp} only {margin_db} dB above sample peak {sp}, expected >= 0.5 dB"
    );
}

#[test]
fn true_peak_exceeds_sample_peak_on_inter_sample_overshoot() {
    init_tracing();
    // A near-Nyquist sine has most of its true peak energy between
    // samples; oversampled true peak should read at or above sample peak.
    let fs = 48_000;
    let samples = sine(0.99, (fs as f64) * 0.45, fs, 1.0, 1);
    let mut engine =
        MeasurementEngine::new(1, fs, Mode::SAMPLE_PEAK | Mode::TRUE_PEAK).unwrap();
    engine.add_frames(&samples).unwrap();
    let sp = engine.sample_peak(0).unwrap();
    let tp = engine.true_peak(0).unwrap();
    assert!(tp >= sp - 1e-9, "true peak {tp} below sample peak {sp}");
}

#[test]
fn ebu_tech_3341_two_segment_programme_integrated_and_range() {
    init_tracing();
    let fs = 48_000;
    let mut samples = sine(dbfs_amplitude(-26.0), 1000.0, fs, 20.0, 2);
    samples.extend(sine(dbfs_amplitude(-20.0), 1000.0, fs, 20.0, 2));

    let mut engine = MeasurementEngine::new(2, fs, Mode::INTEGRATED | Mode::LRA).unwrap();
    engine.add_frames(&samples).unwrap();

    let integrated = engine.loudness_global().unwrap();
    assert!(
        (integrated - (-23.0)).abs() < 0.1,
        "expected -23.0 +/- 0.1 LUFS, got {integrated}"
    );

    let lra = engine.loudness_range().unwrap();
    assert!(
        (lra - 6.0).abs() < 1.0,
        "expected 6.0 +/- 1.0 LU, got {lra}"
    );
}

#[test]
fn ebu_tech_3341_silence_gated_programme_through_full_engine() {
    init_tracing();
    let fs = 48_000;
    let mut samples = sine(dbfs_amplitude(-20.0), 1000.0, fs, 30.0, 2);
    samples.extend(sine(dbfs_amplitude(-80.0), 1000.0, fs, 30.0, 2));

    let mut engine = MeasurementEngine::new(2, fs, Mode::INTEGRATED).unwrap();
    engine.add_frames(&samples).unwrap();

    let measured = engine.loudness_global().unwrap();
    assert!(
        (measured - (-20.0)).abs() < 0.1,
        "expected the -80 LUFS tail to be absolute-gated out, got {measured}"
    );
}

#[test]
fn reconfigure_discards_history_and_no_change_is_a_noop() {
    init_tracing();
    let mut engine = MeasurementEngine::new(2, 48_000, Mode::MOMENTARY).unwrap();
    engine.add_frames(&sine(0.5, 1000.0, 48_000, 1.0, 2)).unwrap();
    assert!(engine.loudness_momentary().unwrap() != NEGATIVE_INFINITY);

    assert_eq!(engine.reconfigure(2, 48_000).unwrap(), Reconfigured::NoChange);
    assert!(engine.loudness_momentary().unwrap() != NEGATIVE_INFINITY);

    assert_eq!(
        engine.reconfigure(2, 44_100).unwrap(),
        Reconfigured::Applied
    );
    assert_eq!(engine.loudness_momentary().unwrap(), NEGATIVE_INFINITY);
}

#[test]
fn rejects_queries_outside_the_configured_mode() {
    init_tracing();
    let engine = MeasurementEngine::new(2, 48_000, Mode::MOMENTARY).unwrap();
    assert_eq!(engine.loudness_global().unwrap_err(), Error::InvalidMode);
    assert_eq!(engine.loudness_range().unwrap_err(), Error::InvalidMode);
    assert_eq!(engine.sample_peak(0).unwrap_err(), Error::InvalidMode);
}

#[test]
fn channel_roles_govern_weighted_sum() {
    init_tracing();
    let mut engine = MeasurementEngine::new(2, 48_000, Mode::MOMENTARY).unwrap();
    engine.set_channel(0, ChannelRole::LeftSurround).unwrap();
    engine.set_channel(1, ChannelRole::RightSurround).unwrap();

    let samples = sine(0.3, 1000.0, 48_000, 1.0, 2);
    engine.add_frames(&samples).unwrap();
    let surround_loudness = engine.loudness_momentary().unwrap();

    let mut stereo = MeasurementEngine::new(2, 48_000, Mode::MOMENTARY).unwrap();
    stereo.add_frames(&samples).unwrap();
    let stereo_loudness = stereo.loudness_momentary().unwrap();

    // The 1.41x surround weight raises the weighted energy sum relative to
    // the default L/R (weight 1.0) assignment of the same signal.
    assert!(surround_loudness > stereo_loudness);
}

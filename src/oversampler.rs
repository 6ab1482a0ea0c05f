//! Polyphase FIR oversampler used only for true-peak detection (§4.4).
//!
//! The prototype is a Kaiser-windowed sinc low-pass, generalizing the
//! hard-coded 4x/16-tap polyphase table a fixed-factor true-peak limiter
//! would ship with into one computed at init from the factor the sample
//! rate selects. The oversampling factor is chosen once, at init/
//! reconfigure, from `fs`:
//!
//! - `fs < 96_000` → 4x
//! - `96_000 <= fs < 192_000` → 2x
//! - `fs >= 192_000` → 1x (bypass: true peak degenerates to sample peak)
//!
//! Only the peak of the oversampled stream is ever needed (not the
//! resampled signal itself), so [`Oversampler::push_and_peak`] returns a
//! scalar rather than a resampled buffer.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// FIR taps per polyphase branch. Combined with the Kaiser beta below this
/// places the first alias comfortably past -60 dB for both supported
/// factors (§4.4's quality requirement).
const TAPS_PER_PHASE: usize = 16;

/// Kaiser window shape parameter. `beta = 0.1102 * (A_db - 8.7)` for a
/// target stopband attenuation `A_db >= 50` (Kaiser's empirical formula);
/// evaluated here at `A_db = 60`.
const KAISER_BETA: f64 = 5.653;

/// Selects the oversampling factor for a given sample rate (§4.4).
pub fn factor_for_rate(fs: u32) -> usize {
    if fs < 96_000 {
        4
    } else if fs < 192_000 {
        2
    } else {
        1
    }
}

/// Modified Bessel function of the first kind, order 0, via its power
/// series. Converges quickly for the magnitude of argument the Kaiser
/// window uses here.
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let half_x = x / 2.0;
    let mut k = 1.0;
    loop {
        term *= (half_x / k) * (half_x / k);
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
        k += 1.0;
    }
    sum
}

fn kaiser_window(n: usize, len: usize, beta: f64) -> f64 {
    let m = (len - 1) as f64;
    let r = (2.0 * n as f64 - m) / m;
    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / bessel_i0(beta)
}

/// Windowed-sinc low-pass prototype, decomposed into `factor` polyphase
/// branches of `TAPS_PER_PHASE` taps each (§4.4).
#[derive(Debug, Clone)]
struct PolyphaseCoeffs {
    factor: usize,
    /// `phases[p][k]` is tap `k` of branch `p`.
    phases: Vec<Vec<f64>>,
}

impl PolyphaseCoeffs {
    fn design(factor: usize) -> Result<Self> {
        let len = TAPS_PER_PHASE * factor;
        let center = (len - 1) as f64 / 2.0;
        let cutoff = PI / factor as f64;

        let mut prototype = Vec::new();
        prototype
            .try_reserve_exact(len)
            .map_err(|_| Error::OutOfMemory)?;
        prototype.resize(len, 0.0);
        for (n, slot) in prototype.iter_mut().enumerate() {
            let m = n as f64 - center;
            let ideal = if m == 0.0 {
                cutoff / PI
            } else {
                (cutoff * m).sin() / (PI * m)
            };
            *slot = ideal * kaiser_window(n, len, KAISER_BETA);
        }

        // Restore unity passband gain: zero-stuffed interpolation needs the
        // filter's DC gain to equal the factor it upsamples by.
        let dc_gain: f64 = prototype.iter().sum();
        let scale = factor as f64 / dc_gain;
        for v in &mut prototype {
            *v *= scale;
        }

        let mut phases = Vec::new();
        phases
            .try_reserve_exact(factor)
            .map_err(|_| Error::OutOfMemory)?;
        for _ in 0..factor {
            let mut phase = Vec::new();
            phase
                .try_reserve_exact(TAPS_PER_PHASE)
                .map_err(|_| Error::OutOfMemory)?;
            phases.push(phase);
        }
        for (n, &c) in prototype.iter().enumerate() {
            phases[n % factor].push(c);
        }

        Ok(Self { factor, phases })
    }
}

/// Per-channel oversampler history (a ring of the last `TAPS_PER_PHASE`
/// input samples feeding every polyphase branch).
#[derive(Debug, Clone)]
struct ChannelHistory {
    buf: Vec<f64>,
    pos: usize,
}

impl ChannelHistory {
    fn new(taps: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(taps).map_err(|_| Error::OutOfMemory)?;
        buf.resize(taps, 0.0);
        Ok(Self { buf, pos: 0 })
    }

    fn push(&mut self, x: f64) {
        self.buf[self.pos] = x;
        self.pos = (self.pos + 1) % self.buf.len();
    }

    /// Tap `k` samples behind the most recently pushed sample.
    fn tap(&self, k: usize) -> f64 {
        let len = self.buf.len();
        self.buf[(self.pos + len - 1 - k) % len]
    }
}

/// Per-channel polyphase oversampler. `None` coefficients mean bypass
/// (factor 1): the oversampled peak is just the input sample's magnitude.
#[derive(Debug, Clone)]
pub struct Oversampler {
    coeffs: Option<PolyphaseCoeffs>,
    history: Vec<ChannelHistory>,
}

impl Oversampler {
    /// Builds an oversampler for `channels` channels at sample rate `fs`,
    /// selecting the factor per [`factor_for_rate`].
    pub fn new(channels: usize, fs: u32) -> Result<Self> {
        let factor = factor_for_rate(fs);
        if factor == 1 {
            return Ok(Self {
                coeffs: None,
                history: Vec::new(),
            });
        }
        let coeffs = PolyphaseCoeffs::design(factor)?;
        let mut history = Vec::new();
        history
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        for _ in 0..channels {
            history.push(ChannelHistory::new(TAPS_PER_PHASE)?);
        }
        Ok(Self {
            coeffs: Some(coeffs),
            history,
        })
    }

    /// Rebuilds for a new channel count / sample rate. Per §4.4, any
    /// pending tail is lost: the history ring starts from zero again.
    pub fn rebuild(&mut self, channels: usize, fs: u32) -> Result<()> {
        *self = Self::new(channels, fs)?;
        Ok(())
    }

    /// Feeds one (unweighted, scaled-float) sample of channel `ch` through
    /// the oversampler and returns the maximum absolute value among the
    /// oversampled points it produces — the true peak detector only ever
    /// needs that maximum, never the resampled waveform itself.
    #[inline]
    pub fn push_and_peak(&mut self, ch: usize, x: f64) -> f64 {
        let Some(coeffs) = &self.coeffs else {
            return x.abs();
        };
        let hist = &mut self.history[ch];
        hist.push(x);

        let mut max_peak: f64 = 0.0;
        for phase in &coeffs.phases {
            let mut acc = 0.0;
            for (k, &c) in phase.iter().enumerate() {
                acc += hist.tap(k) * c;
            }
            max_peak = max_peak.max(acc.abs());
        }
        max_peak
    }
}

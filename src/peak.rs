//! Per-channel sample peak and oversampled true peak (§4.3).

use crate::error::{Error, Result};
use crate::oversampler::Oversampler;

/// Tracks `max |x|` (sample peak) and, when enabled, `max |x_upsampled|`
/// (true peak) for every channel. Sample peak is scanned directly off the
/// input before K-weighting; true peak runs the same samples through an
/// [`Oversampler`] whose internal tail carries across calls so the result
/// reflects continuous filtering of the concatenated input, not one call
/// at a time in isolation.
#[derive(Debug, Clone)]
pub struct PeakTracker {
    sample_peak: Vec<f64>,
    true_peak: Vec<f64>,
    oversampler: Option<Oversampler>,
}

impl PeakTracker {
    /// Builds a tracker for `channels` channels. `true_peak_enabled`
    /// mirrors whether `Mode::TRUE_PEAK` was set — the oversampler is only
    /// constructed (and its cost only paid) when true peak is wanted.
    pub fn new(channels: usize, fs: u32, true_peak_enabled: bool) -> Result<Self> {
        let mut sample_peak = Vec::new();
        sample_peak
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        sample_peak.resize(channels, 0.0);

        let mut true_peak = Vec::new();
        true_peak
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        true_peak.resize(channels, 0.0);

        let oversampler = if true_peak_enabled {
            Some(Oversampler::new(channels, fs)?)
        } else {
            None
        };

        Ok(Self {
            sample_peak,
            true_peak,
            oversampler,
        })
    }

    /// Rebuilds for a new channel count / sample rate (reconfigure
    /// semantics: peaks reset to 0.0, any oversampler tail is discarded).
    pub fn rebuild(&mut self, channels: usize, fs: u32, true_peak_enabled: bool) -> Result<()> {
        *self = Self::new(channels, fs, true_peak_enabled)?;
        Ok(())
    }

    /// Records one sample of channel `ch` (in the scaled-float domain,
    /// before K-weighting) against both peak trackers.
    #[inline]
    pub fn observe(&mut self, ch: usize, x: f64) {
        let ax = x.abs();
        if ax > self.sample_peak[ch] {
            self.sample_peak[ch] = ax;
        }
        if let Some(os) = &mut self.oversampler {
            let tp = os.push_and_peak(ch, x);
            if tp > self.true_peak[ch] {
                self.true_peak[ch] = tp;
            }
        }
    }

    /// Current sample peak for channel `ch` (linear amplitude, 1.0 = 0 dBFS).
    pub fn sample_peak(&self, ch: usize) -> f64 {
        self.sample_peak[ch]
    }

    /// Current true peak for channel `ch`, or `None` if true-peak tracking
    /// was not enabled at construction.
    pub fn true_peak(&self, ch: usize) -> Option<f64> {
        self.oversampler.as_ref().map(|_| self.true_peak[ch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_yields_zero_peaks() {
        let mut pt = PeakTracker::new(2, 48_000, true).unwrap();
        for _ in 0..1000 {
            pt.observe(0, 0.0);
            pt.observe(1, 0.0);
        }
        assert_eq!(pt.sample_peak(0), 0.0);
        assert_eq!(pt.true_peak(0), Some(0.0));
    }

    #[test]
    fn sample_peak_tracks_maximum_magnitude() {
        let mut pt = PeakTracker::new(1, 48_000, false).unwrap();
        for &x in &[0.1, -0.9, 0.3, 0.2] {
            pt.observe(0, x);
        }
        assert_eq!(pt.sample_peak(0), 0.9);
        assert_eq!(pt.true_peak(0), None);
    }

    #[test]
    fn true_peak_at_least_sample_peak() {
        let mut pt = PeakTracker::new(1, 48_000, true).unwrap();
        for i in 0..4800 {
            let x = (i as f64 * 2.0 * std::f64::consts::PI * 1000.0 / 48_000.0).sin() * 0.8;
            pt.observe(0, x);
        }
        assert!(pt.true_peak(0).unwrap() >= pt.sample_peak(0) - 1e-9);
    }

    #[test]
    fn full_scale_dc_sample_peak_is_exact() {
        let mut pt = PeakTracker::new(1, 48_000, false).unwrap();
        for _ in 0..48_000 {
            pt.observe(0, 1.0);
        }
        assert_eq!(pt.sample_peak(0), 1.0);
    }
}

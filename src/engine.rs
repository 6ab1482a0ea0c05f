//! [`MeasurementEngine`]: the façade binding every component together,
//! validating modes, and coordinating multi-instance aggregation (§4.6).

use crate::block_energy::BlockEnergy;
use crate::channel::{ChannelMap, ChannelRole};
use crate::error::{Error, Result};
use crate::filter::FilterBank;
use crate::gating::{self, GatingAccumulator};
use crate::mode::Mode;
use crate::peak::PeakTracker;
use crate::sample::IntoNormalizedF64;

/// Minimum sample rate this engine supports (§3, §9 Open Question).
///
/// Below this the bilinear pre-warp of the ~38 Hz high-pass stage pushes
/// the discretized pole close enough to the Nyquist/4 region that its Q
/// degrades and, further down, the section becomes unstable.
pub const MIN_SAMPLE_RATE_HZ: u32 = 8_000;

/// Sentinel returned for "negative infinity" loudness results, matching
/// the C ABI's `-HUGE_VAL` convention this core is specified against: the
/// most-negative finite value, safe to keep comparing and doing further
/// arithmetic with.
pub const NEGATIVE_INFINITY: f64 = f64::MIN;

/// Outcome of a successful [`MeasurementEngine::reconfigure`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigured {
    /// The sample rate and/or channel count differed; filters, peaks, and
    /// block history were rebuilt from scratch.
    Applied,
    /// Both parameters already matched the current configuration; treated
    /// as a success-no-op, nothing was reset.
    NoChange,
}

/// The EBU R128 / ITU-R BS.1770 loudness measurement engine.
///
/// Owns every buffer it allocates; dropping it releases all of them. Not
/// safely shareable across threads by reference — the caller serializes
/// access to a single instance, same as any other plain Rust value with
/// interior mutation through `&mut self` (§5).
#[derive(Debug, Clone)]
pub struct MeasurementEngine {
    channels: usize,
    sample_rate: u32,
    mode: Mode,
    channel_map: ChannelMap,
    filter_bank: FilterBank,
    block_energy: BlockEnergy,
    peak_tracker: PeakTracker,
    gating: GatingAccumulator,
    scratch: Vec<f64>,
}

impl MeasurementEngine {
    /// Creates a new engine for `channels` channels at `sample_rate` Hz,
    /// tracking the measurements named in `mode` (implied bits are folded
    /// in automatically, see [`Mode::normalize`]).
    pub fn new(channels: usize, sample_rate: u32, mode: Mode) -> Result<Self> {
        validate_geometry(channels, sample_rate)?;
        let mode = mode.normalize();

        tracing::debug!(channels, sample_rate, ?mode, "measurement engine initialized");

        Ok(Self {
            channels,
            sample_rate,
            mode,
            channel_map: ChannelMap::default_for(channels)?,
            filter_bank: FilterBank::new(channels, sample_rate)?,
            block_energy: BlockEnergy::new(channels, sample_rate)?,
            peak_tracker: PeakTracker::new(channels, sample_rate, mode.contains(Mode::TRUE_PEAK))?,
            gating: GatingAccumulator::new(mode.contains(Mode::HISTOGRAM)),
            scratch: try_scratch_vec(channels)?,
        })
    }

    /// Number of channels this engine is currently configured for.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample rate this engine is currently configured for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The mode bitset this engine was (effectively) initialized with.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Reassigns channel `idx`'s semantic role.
    pub fn set_channel(&mut self, idx: usize, role: ChannelRole) -> Result<()> {
        self.channel_map.set_role(idx, role)
    }

    /// Rebuilds for a new channel count and/or sample rate, discarding the
    /// current partial sub-block, filter state, peaks, and oversampler
    /// tail. Returns [`Reconfigured::NoChange`] without resetting anything
    /// if both parameters already match (§4.6).
    pub fn reconfigure(&mut self, channels: usize, sample_rate: u32) -> Result<Reconfigured> {
        validate_geometry(channels, sample_rate)?;

        if channels == self.channels && sample_rate == self.sample_rate {
            return Ok(Reconfigured::NoChange);
        }

        self.channel_map = ChannelMap::default_for(channels)?;
        self.filter_bank.rebuild(channels, sample_rate)?;
        self.block_energy.rebuild(channels, sample_rate)?;
        self.peak_tracker
            .rebuild(channels, sample_rate, self.mode.contains(Mode::TRUE_PEAK))?;
        self.scratch = try_scratch_vec(channels)?;
        self.channels = channels;
        self.sample_rate = sample_rate;

        tracing::debug!(channels, sample_rate, "measurement engine reconfigured");
        Ok(Reconfigured::Applied)
    }

    /// Consumes `samples.len() / channels()` interleaved frames of any
    /// supported PCM format (`i16`, `i32`, `f32`, `f64`), advancing peak,
    /// filter, and block state. One generic routine serves every format
    /// via [`IntoNormalizedF64`] rather than four duplicated inner loops
    /// (§9).
    pub fn add_frames<T: IntoNormalizedF64>(&mut self, samples: &[T]) -> Result<()> {
        debug_assert_eq!(
            samples.len() % self.channels,
            0,
            "add_frames requires a whole number of frames"
        );
        let frames = samples.len() / self.channels;

        for frame in 0..frames {
            let base = frame * self.channels;
            for ch in 0..self.channels {
                let x = samples[base + ch].into_normalized_f64();
                self.peak_tracker.observe(ch, x);
                self.scratch[ch] = self.filter_bank.process(ch, x);
            }

            let boundary = self.block_energy.add_frame(&self.scratch);

            if boundary.momentary_ready && self.mode.contains(Mode::INTEGRATED) {
                let l = self.weighted_loudness(|c| self.block_energy.momentary_channel_energy(c));
                if l != NEGATIVE_INFINITY {
                    self.gating.record_block(l).map_err(|e| {
                        tracing::warn!("allocation failure recording block loudness");
                        e
                    })?;
                }
            }
            if boundary.short_term_ready && self.mode.contains(Mode::LRA) {
                let l =
                    self.weighted_loudness(|c| self.block_energy.short_term_channel_energy(c));
                if l != NEGATIVE_INFINITY {
                    self.gating.record_short_term(l).map_err(|e| {
                        tracing::warn!("allocation failure recording short-term loudness");
                        e
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Current momentary (400 ms) loudness.
    pub fn loudness_momentary(&self) -> Result<f64> {
        self.require_mode(Mode::MOMENTARY)?;
        Ok(self.weighted_loudness(|c| self.block_energy.momentary_channel_energy(c)))
    }

    /// Current short-term (3 s) loudness.
    pub fn loudness_shortterm(&self) -> Result<f64> {
        self.require_mode(Mode::SHORT_TERM)?;
        Ok(self.weighted_loudness(|c| self.block_energy.short_term_channel_energy(c)))
    }

    /// Gated integrated loudness over the whole programme seen so far.
    pub fn loudness_global(&self) -> Result<f64> {
        self.require_mode(Mode::INTEGRATED)?;
        Ok(self.gating.integrated_loudness())
    }

    /// Loudness range over the whole programme seen so far.
    pub fn loudness_range(&self) -> Result<f64> {
        self.require_mode(Mode::LRA)?;
        self.gating.loudness_range()
    }

    /// The integrated loudness relative gate the programme currently
    /// implies (supplements the distilled core's query set — read-only,
    /// no state change).
    pub fn relative_threshold(&self) -> Result<f64> {
        self.require_mode(Mode::INTEGRATED)?;
        Ok(self.gating.relative_threshold())
    }

    /// Current sample peak of channel `ch` (1.0 == 0 dBFS).
    pub fn sample_peak(&self, ch: usize) -> Result<f64> {
        self.require_mode(Mode::SAMPLE_PEAK)?;
        self.check_channel(ch)?;
        Ok(self.peak_tracker.sample_peak(ch))
    }

    /// Current oversampled true peak of channel `ch` (may exceed 1.0).
    pub fn true_peak(&self, ch: usize) -> Result<f64> {
        self.require_mode(Mode::TRUE_PEAK)?;
        self.check_channel(ch)?;
        self.peak_tracker.true_peak(ch).ok_or(Error::InvalidMode)
    }

    /// Gated integrated loudness merged across every given engine's block
    /// records, as if they were one programme (§4.6, multi-instance).
    /// Every engine must have been initialized with `INTEGRATED`.
    pub fn loudness_global_multiple(engines: &[&MeasurementEngine]) -> Result<f64> {
        for e in engines {
            e.require_mode(Mode::INTEGRATED)?;
        }
        Ok(GatingAccumulator::merged_integrated_loudness(
            engines.iter().map(|e| &e.gating),
        ))
    }

    /// Loudness range merged across every given engine's short-term
    /// records (§4.6, multi-instance). Every engine must have been
    /// initialized with `LRA`.
    pub fn loudness_range_multiple(engines: &[&MeasurementEngine]) -> Result<f64> {
        for e in engines {
            e.require_mode(Mode::LRA)?;
        }
        GatingAccumulator::merged_loudness_range(engines.iter().map(|e| &e.gating))
    }

    fn require_mode(&self, bit: Mode) -> Result<()> {
        if self.mode.contains(bit) {
            Ok(())
        } else {
            tracing::warn!(?bit, "query rejected: mode not enabled at init");
            Err(Error::InvalidMode)
        }
    }

    fn check_channel(&self, ch: usize) -> Result<()> {
        if ch < self.channels {
            Ok(())
        } else {
            Err(Error::InvalidChannelIndex {
                idx: ch,
                channels: self.channels,
            })
        }
    }

    /// Combines every channel's windowed mean square with its channel-map
    /// weight into the `-0.691 + 10·log10(Σ G_c z_c)` loudness formula
    /// (§3). Returns [`NEGATIVE_INFINITY`] if any channel's window is not
    /// yet fully populated (all channels share the same sub-block ring
    /// fill count, so this is all-or-nothing).
    fn weighted_loudness(&self, energy_of_channel: impl Fn(usize) -> Option<f64>) -> f64 {
        let mut z = 0.0;
        for ch in 0..self.channels {
            match energy_of_channel(ch) {
                Some(e) => z += self.channel_map.weight_contribution(ch) * e,
                None => return NEGATIVE_INFINITY,
            }
        }
        gating::loudness_of(z)
    }
}

fn validate_geometry(channels: usize, sample_rate: u32) -> Result<()> {
    if channels == 0 {
        return Err(Error::InvalidChannelCount);
    }
    if sample_rate < MIN_SAMPLE_RATE_HZ {
        return Err(Error::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

/// The per-channel filtered-sample scratch buffer is one of init/
/// reconfigure's genuine growth points, so it reserves fallibly like every
/// other per-channel buffer built at those two call sites (§7).
fn try_scratch_vec(channels: usize) -> Result<Vec<f64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(channels)
        .map_err(|_| Error::OutOfMemory)?;
    v.resize(channels, 0.0);
    Ok(v)
}

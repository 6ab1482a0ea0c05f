//! Mean-square accumulation over 100 ms sub-blocks, and the momentary (4
//! sub-block) / short-term (30 sub-block) sliding windows built from them.
//!
//! Momentary and short-term loudness, and the block/short-term records fed
//! to [`crate::gating::GatingAccumulator`], all read from the same ring of
//! per-channel sub-block mean squares — there is exactly one accumulation
//! pass over the input, shared across every window length the engine
//! tracks (§2: "share storage ... without recomputation").

use crate::error::{Error, Result};

/// Sub-blocks retained per channel: 3 s of history at 100 ms each.
const RING_LEN: usize = 30;
/// Sub-blocks spanning the momentary (400 ms) window.
const MOMENTARY_SUBBLOCKS: usize = 4;

/// A fixed-capacity ring of the last `RING_LEN` sub-block mean squares for
/// one channel. Mirrors a simple circular buffer: write position plus a
/// saturating fill count, no allocation after construction.
#[derive(Debug, Clone)]
struct ChannelRing {
    buf: [f64; RING_LEN],
    write_pos: usize,
    filled: usize,
}

impl ChannelRing {
    fn new() -> Self {
        Self {
            buf: [0.0; RING_LEN],
            write_pos: 0,
            filled: 0,
        }
    }

    fn push(&mut self, mean_square: f64) {
        self.buf[self.write_pos] = mean_square;
        self.write_pos = (self.write_pos + 1) % RING_LEN;
        if self.filled < RING_LEN {
            self.filled += 1;
        }
    }

    /// Mean of the last `n` pushed values, most recent first order doesn't
    /// matter since we only need the sum. `None` if fewer than `n` have
    /// ever been pushed.
    fn mean_of_last(&self, n: usize) -> Option<f64> {
        if self.filled < n {
            return None;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let idx = (self.write_pos + RING_LEN - 1 - i) % RING_LEN;
            sum += self.buf[idx];
        }
        Some(sum / n as f64)
    }
}

/// What happened when a frame was pushed into [`BlockEnergy`]: whether a
/// sub-block boundary was crossed and, if so, whether the momentary and/or
/// short-term windows became newly computable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubblockBoundary {
    /// The momentary (4 sub-block) window is fully populated.
    pub momentary_ready: bool,
    /// The short-term (30 sub-block) window is fully populated.
    pub short_term_ready: bool,
}

/// Per-channel 100 ms accumulator plus the 3 s ring of completed sub-blocks.
#[derive(Debug, Clone)]
pub struct BlockEnergy {
    samples_per_subblock: usize,
    current_sumsq: Vec<f64>,
    frame_count: usize,
    rings: Vec<ChannelRing>,
}

impl BlockEnergy {
    /// Builds an accumulator for `channels` channels at sample rate `fs`.
    ///
    /// The two per-channel vectors are genuine growth points paid for at
    /// init/reconfigure, so they reserve fallibly (§7).
    pub fn new(channels: usize, fs: u32) -> Result<Self> {
        let mut current_sumsq = Vec::new();
        current_sumsq
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        current_sumsq.resize(channels, 0.0);

        let mut rings = Vec::new();
        rings
            .try_reserve_exact(channels)
            .map_err(|_| Error::OutOfMemory)?;
        rings.resize(channels, ChannelRing::new());

        Ok(Self {
            samples_per_subblock: (fs / 10).max(1) as usize,
            current_sumsq,
            frame_count: 0,
            rings,
        })
    }

    /// Rebuilds for a new channel count / sample rate, discarding the
    /// partial sub-block and all history (reconfigure semantics, §4.2).
    pub fn rebuild(&mut self, channels: usize, fs: u32) -> Result<()> {
        *self = Self::new(channels, fs)?;
        Ok(())
    }

    /// Feeds one frame's worth of K-weighted samples (`weighted[ch]`) into
    /// the per-channel sub-block accumulators, rotating the ring when a
    /// 100 ms sub-block completes.
    pub fn add_frame(&mut self, weighted: &[f64]) -> SubblockBoundary {
        debug_assert_eq!(weighted.len(), self.current_sumsq.len());
        for (acc, &x) in self.current_sumsq.iter_mut().zip(weighted) {
            *acc += x * x;
        }
        self.frame_count += 1;

        if self.frame_count < self.samples_per_subblock {
            return SubblockBoundary {
                momentary_ready: false,
                short_term_ready: false,
            };
        }

        let n = self.frame_count as f64;
        for (ring, acc) in self.rings.iter_mut().zip(self.current_sumsq.iter_mut()) {
            ring.push(*acc / n);
            *acc = 0.0;
        }
        self.frame_count = 0;

        SubblockBoundary {
            momentary_ready: self.rings[0].filled >= MOMENTARY_SUBBLOCKS,
            short_term_ready: self.rings[0].filled >= RING_LEN,
        }
    }

    /// Per-channel mean square over the momentary window, or `None` if
    /// fewer than 400 ms have elapsed since init/reconfigure.
    pub fn momentary_channel_energy(&self, ch: usize) -> Option<f64> {
        self.rings[ch].mean_of_last(MOMENTARY_SUBBLOCKS)
    }

    /// Per-channel mean square over the short-term window, or `None` if
    /// fewer than 3 s have elapsed since init/reconfigure.
    pub fn short_term_channel_energy(&self, ch: usize) -> Option<f64> {
        self.rings[ch].mean_of_last(RING_LEN)
    }

}

//! The mode bitset selecting which measurements an engine instance tracks.

use bitflags::bitflags;

bitflags! {
    /// Which measurements a [`crate::MeasurementEngine`] tracks.
    ///
    /// Some bits imply others: `SHORT_TERM` implies `MOMENTARY`, `INTEGRATED`
    /// implies `MOMENTARY`, and `LRA` implies `SHORT_TERM` (and transitively
    /// `MOMENTARY`). [`Mode::normalize`] folds these in so callers don't have
    /// to remember the implication table; `init` always normalizes.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Mode: u32 {
        /// Momentary loudness (400 ms window).
        const MOMENTARY   = 1 << 0;
        /// Short-term loudness (3 s window).
        const SHORT_TERM  = 1 << 1;
        /// Integrated (gated, whole-programme) loudness.
        const INTEGRATED  = 1 << 2;
        /// Loudness range.
        const LRA         = 1 << 3;
        /// Per-channel sample peak.
        const SAMPLE_PEAK = 1 << 4;
        /// Per-channel true (oversampled) peak.
        const TRUE_PEAK   = 1 << 5;
        /// Use bounded-memory histogram gating storage instead of a growable list.
        const HISTOGRAM   = 1 << 6;
    }
}

impl Mode {
    /// Applies the bit implications documented on the type: `SHORT_TERM`,
    /// `INTEGRATED`, and `LRA` each pull in the windows they depend on.
    pub fn normalize(self) -> Mode {
        let mut m = self;
        if m.intersects(Mode::SHORT_TERM | Mode::INTEGRATED | Mode::SAMPLE_PEAK | Mode::TRUE_PEAK)
        {
            m |= Mode::MOMENTARY;
        }
        if m.contains(Mode::LRA) {
            m |= Mode::SHORT_TERM | Mode::MOMENTARY;
        }
        m
    }
}

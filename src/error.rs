//! Error type returned by fallible [`crate::MeasurementEngine`] operations.

use thiserror::Error;

/// Everything that can go wrong when driving a [`crate::MeasurementEngine`].
///
/// `Reconfigured::NoChange` (see [`crate::Reconfigured`]) is deliberately *not*
/// a variant here: the spec treats a no-op reconfigure as success, not failure,
/// so it is folded into the `Ok` side of `reconfigure`'s return type instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A heap allocation failed while growing the gating list, building the
    /// per-channel filter/oversampler state, or sorting short-term records
    /// for a loudness-range query.
    ///
    /// The state the error was returned from must be discarded; no further
    /// operation on it has defined behavior.
    #[error("allocation failed")]
    OutOfMemory,

    /// The requested measurement's mode bit was not set at `init`.
    #[error("measurement not enabled by the mode bitset at init")]
    InvalidMode,

    /// `idx >= channel_count` in `set_channel`, `sample_peak`, or `true_peak`.
    #[error("channel index {idx} out of range for {channels} channel(s)")]
    InvalidChannelIndex {
        /// The offending index.
        idx: usize,
        /// The engine's configured channel count.
        channels: usize,
    },

    /// `set_channel` was given a role outside the declared enum. Only
    /// reachable from an FFI-style integer-to-enum boundary; in-process Rust
    /// callers can only ever construct a valid [`crate::ChannelRole`].
    #[error("unrecognized channel role")]
    InvalidChannelRole,

    /// `init`/`reconfigure` requested a sample rate below
    /// [`crate::MIN_SAMPLE_RATE_HZ`].
    #[error("sample rate {0} Hz is below the supported floor")]
    InvalidSampleRate(u32),

    /// `init`/`reconfigure` requested zero channels.
    #[error("channel count must be at least 1")]
    InvalidChannelCount,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

//! Loudness measurement core implementing EBU R128 / ITU-R BS.1770-4.
//!
//! [`MeasurementEngine`] is the entry point: it K-weights incoming PCM,
//! accumulates momentary (400 ms) and short-term (3 s) sliding windows from
//! shared 100 ms sub-block energies, gates them into integrated loudness and
//! loudness range per BS.1770 Annex 2 / EBU Tech 3342, and optionally tracks
//! per-channel sample and oversampled true peak.
//!
//! ```
//! use r128meter::{MeasurementEngine, Mode};
//!
//! let mut engine = MeasurementEngine::new(2, 48_000, Mode::INTEGRATED).unwrap();
//! let silence = vec![0.0f32; 48_000 * 2];
//! engine.add_frames(&silence).unwrap();
//! assert_eq!(engine.loudness_global().unwrap(), r128meter::NEGATIVE_INFINITY);
//! ```

mod block_energy;
mod channel;
mod engine;
mod error;
mod filter;
mod gating;
mod mode;
mod oversampler;
mod peak;
mod sample;

pub use channel::ChannelRole;
pub use engine::{MeasurementEngine, Reconfigured, MIN_SAMPLE_RATE_HZ, NEGATIVE_INFINITY};
pub use error::{Error, Result};
pub use mode::Mode;
pub use sample::IntoNormalizedF64;

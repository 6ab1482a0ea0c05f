//! Normalizes the four supported PCM sample formats to a common 64-bit float.
//!
//! `add_frames` is written once, generic over [`IntoNormalizedF64`], instead
//! of being duplicated per sample format: "any sample format with a known
//! full-scale constant becomes a normalized double" (§9).

/// A PCM sample type the engine can consume directly.
///
/// Integer formats are scaled by `1 / 2^(bits-1)` so the most negative
/// representable integer maps to exactly -1.0 and full-scale positive maps
/// to just under +1.0, matching §4.1. Float formats pass through unscaled
/// (after widening to `f64`).
pub trait IntoNormalizedF64: Copy {
    /// Converts one sample to a normalized `f64` where `1.0` is 0 dBFS.
    fn into_normalized_f64(self) -> f64;
}

impl IntoNormalizedF64 for i16 {
    #[inline]
    fn into_normalized_f64(self) -> f64 {
        self as f64 / 32768.0
    }
}

impl IntoNormalizedF64 for i32 {
    #[inline]
    fn into_normalized_f64(self) -> f64 {
        self as f64 / 2147483648.0
    }
}

impl IntoNormalizedF64 for f32 {
    #[inline]
    fn into_normalized_f64(self) -> f64 {
        self as f64
    }
}

impl IntoNormalizedF64 for f64 {
    #[inline]
    fn into_normalized_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_full_scale() {
        assert!((i16::MIN.into_normalized_f64() - (-1.0)).abs() < 1e-9);
        assert!(i16::MAX.into_normalized_f64() < 1.0);
        assert!(i16::MAX.into_normalized_f64() > 0.9999);
    }

    #[test]
    fn i32_full_scale() {
        assert!((i32::MIN.into_normalized_f64() - (-1.0)).abs() < 1e-9);
        assert!(i32::MAX.into_normalized_f64() < 1.0);
    }

    #[test]
    fn floats_pass_through() {
        assert_eq!(0.5f32.into_normalized_f64(), 0.5f64);
        assert_eq!((-0.25f64).into_normalized_f64(), -0.25f64);
    }
}

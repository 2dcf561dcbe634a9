//! Mathematical utility functions for DSP and control laws.
//!
//! Provides the level conversions and 7-bit control-value laws shared by the
//! filter bank, the effects and the mixer. All functions are allocation-free
//! and suitable for `no_std`.
//!
//! # Level Conversions
//!
//! - [`db_to_linear`] / [`linear_to_db`] - Convert between dB and linear gain
//!
//! # Control Laws
//!
//! Control values arrive as 7-bit integers (0..=127). The mixer maps them with
//! empirically tuned exponential laws that must be kept exactly:
//!
//! | Function | Law | Used for |
//! |----------|-----|----------|
//! | [`send_gain`] | `0.1^((1 - v/96) * 2)` | part → system effect, effect → effect sends |
//! | [`volume_gain`] | `dB(((v - 96) / 96) * 40)` | master and part volume |
//! | [`unit_control`] | `v / 127` | panning, crossover, generic 0..1 controls |
//!
//! # Block Interpolation
//!
//! - [`above_amplitude_threshold`] - Decide whether a gain change is audible
//! - [`interpolate_amplitude`] - Linear ramp position within a block

use libm::{expf, logf, powf};

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use cadenza_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels.
///
/// # Example
/// ```rust
/// use cadenza_core::linear_to_db;
///
/// assert!((linear_to_db(1.0) - 0.0).abs() < 0.001);
/// assert!((linear_to_db(0.5) - (-6.02)).abs() < 0.01);
/// ```
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Map a 7-bit control value to `0.0..=1.0`.
#[inline]
pub fn unit_control(value: u8) -> f32 {
    f32::from(value.min(127)) / 127.0
}

/// Send level for a 0..127 control value.
///
/// `0.1^((1 - v/96) * 2)`: 96 is unity, 127 is about +5.7 dB. A value of 0
/// still yields a small non-zero gain, so callers treat 0 as "no send"
/// and skip the mix entirely.
#[inline]
pub fn send_gain(value: u8) -> f32 {
    powf(0.1, (1.0 - f32::from(value.min(127)) / 96.0) * 2.0)
}

/// Volume gain for a 0..127 control value.
///
/// 96 is unity, 0 is -40 dB, 127 is about +12.9 dB.
#[inline]
pub fn volume_gain(value: u8) -> f32 {
    db_to_linear((f32::from(value.min(127)) - 96.0) / 96.0 * 40.0)
}

/// Returns true when moving from gain `a` to gain `b` is large enough to need
/// a per-sample ramp instead of a step.
#[inline]
pub fn above_amplitude_threshold(a: f32, b: f32) -> bool {
    2.0 * (b - a).abs() / (b + a + 1e-10).abs() > 1e-4
}

/// Gain at position `index` of a `len`-sample linear ramp from `a` to `b`.
#[inline]
pub fn interpolate_amplitude(a: f32, b: f32, index: usize, len: usize) -> f32 {
    a + (b - a) * index as f32 / len as f32
}

/// Flush denormal values to zero.
///
/// Denormals are very small floating-point numbers that can cause
/// severe CPU slowdowns in feedback paths. Call this on values that
/// recirculate (delay lines, filter history).
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_linear_roundtrip() {
        let original = 0.5;
        let db = linear_to_db(original);
        let back = db_to_linear(db);
        assert!((original - back).abs() < 1e-5);
    }

    #[test]
    fn test_send_gain_calibration() {
        assert!((send_gain(96) - 1.0).abs() < 1e-6);
        assert!((send_gain(0) - 0.01).abs() < 1e-6);
        assert!((send_gain(48) - 0.1).abs() < 1e-6);
        assert!(send_gain(127) > 1.0);
    }

    #[test]
    fn test_volume_gain_calibration() {
        assert!((volume_gain(96) - 1.0).abs() < 1e-6);
        assert!((linear_to_db(volume_gain(0)) + 40.0).abs() < 1e-3);
        // Default master volume (80) is -6.67 dB
        assert!((linear_to_db(volume_gain(80)) + 6.6667).abs() < 1e-3);
    }

    #[test]
    fn test_amplitude_threshold() {
        assert!(!above_amplitude_threshold(0.5, 0.5));
        assert!(!above_amplitude_threshold(0.5, 0.500_01));
        assert!(above_amplitude_threshold(0.5, 0.6));
        assert!(above_amplitude_threshold(0.0, 1.0));
    }

    #[test]
    fn test_interpolate_amplitude_endpoints() {
        assert_eq!(interpolate_amplitude(0.2, 1.0, 0, 64), 0.2);
        let last = interpolate_amplitude(0.2, 1.0, 63, 64);
        assert!(last < 1.0 && last > 0.98);
    }

    #[test]
    fn test_unit_control_clamps() {
        assert_eq!(unit_control(0), 0.0);
        assert_eq!(unit_control(127), 1.0);
        assert_eq!(unit_control(200), 1.0);
    }

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1e-25), 0.0);
        assert_eq!(flush_denormal(0.5), 0.5);
    }
}

//! Stereo feedback echo with cross-channel bleed and high damping.
//!
//! Two independent delay lines whose lengths differ by the L/R delay. Each
//! sample the two taps are cross-mixed, emitted as wet output and fed back
//! through a one-pole low-pass into the lines together with the panned dry
//! input.
//!
//! | Index | Parameter | Mapping of `p` (0..=127) |
//! |-------|-----------|--------------------------|
//! | 0 | Volume | see [`Echo::set_volume`](crate::Effect::set_volume) |
//! | 1 | Panning | `p / 127` |
//! | 2 | Delay | `p / 127 * 1.5` s |
//! | 3 | L/R delay | `sign(p - 64) * (2^(abs(p - 64) / 64 * 9) - 1) / 1000` s |
//! | 4 | L/R crossover | `p / 127` |
//! | 5 | Feedback | `p / 127 * 0.9922` |
//! | 6 | High damping | `1 - p / 127` |

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use libm::{powf, roundf};

use crate::effect::{Effect, EffectRole};
use crate::math::flush_denormal;

const PARAM_COUNT: usize = 7;

/// Longest base delay in seconds.
const MAX_DELAY: f32 = 1.5;

/// Longest L/R offset in seconds (`(2^9 - 1) / 1000`).
const MAX_LR_DELAY: f32 = 0.511;

const PARAM_NAMES: [&str; PARAM_COUNT] = [
    "Volume",
    "Panning",
    "Delay",
    "L/R Delay",
    "L/R Crossover",
    "Feedback",
    "High Damping",
];

const PRESETS: [[u8; PARAM_COUNT]; 9] = [
    [67, 64, 35, 64, 30, 59, 0],
    [67, 64, 21, 64, 30, 59, 0],
    [67, 75, 60, 64, 30, 59, 10],
    [67, 60, 44, 64, 30, 0, 0],
    [67, 60, 102, 50, 30, 82, 48],
    [67, 64, 44, 17, 0, 82, 24],
    [81, 60, 46, 118, 100, 68, 18],
    [81, 60, 26, 100, 127, 67, 36],
    [62, 64, 28, 64, 100, 90, 55],
];

const PRESET_NAMES: [&str; 9] = [
    "Echo 1",
    "Echo 2",
    "Echo 3",
    "Simple Echo",
    "Canyon",
    "Panning Echo 1",
    "Panning Echo 2",
    "Panning Echo 3",
    "Feedback Echo",
];

/// Stereo echo effect.
///
/// Delay buffers are allocated once at their maximum length; parameter
/// changes only resize within that capacity.
///
/// # Example
///
/// ```rust
/// use cadenza_core::{Echo, Effect, EffectRole};
///
/// let mut echo = Echo::new(EffectRole::Insertion, 44100.0, 256);
/// echo.set_preset(4); // Canyon
///
/// let input = [0.25f32; 256];
/// echo.out(&input, &input);
/// assert_eq!(echo.output_l().len(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct Echo {
    role: EffectRole,
    sample_rate: f32,
    preset: usize,
    par: [u8; PARAM_COUNT],

    volume: f32,
    out_volume: f32,
    panning: f32,
    delay: f32,
    lr_delay: f32,
    crossover: f32,
    feedback: f32,
    hi_damp: f32,

    line_l: Vec<f32>,
    line_r: Vec<f32>,
    pos_l: usize,
    pos_r: usize,
    old_l: f32,
    old_r: f32,

    efx_l: Vec<f32>,
    efx_r: Vec<f32>,
}

impl Echo {
    /// Create an echo for the given role, loaded with preset 0.
    pub fn new(role: EffectRole, sample_rate: f32, block_size: usize) -> Self {
        let capacity = 2 + roundf((MAX_DELAY + MAX_LR_DELAY) * sample_rate) as usize;
        let mut echo = Self {
            role,
            sample_rate,
            preset: 0,
            par: [50, 64, 60, 100, 64, 40, 60],
            volume: 0.0,
            out_volume: 0.0,
            panning: 0.5,
            delay: 0.0,
            lr_delay: 0.0,
            crossover: 0.5,
            feedback: 0.0,
            hi_damp: 0.5,
            line_l: Vec::with_capacity(capacity),
            line_r: Vec::with_capacity(capacity),
            pos_l: 0,
            pos_r: 0,
            old_l: 0.0,
            old_r: 0.0,
            efx_l: vec![0.0; block_size],
            efx_r: vec![0.0; block_size],
        };
        echo.set_preset(0);
        echo
    }

    /// Role this echo was built for.
    pub fn role(&self) -> EffectRole {
        self.role
    }

    /// Current left and right delay-line lengths in samples.
    pub fn delay_lengths(&self) -> (usize, usize) {
        (self.line_l.len(), self.line_r.len())
    }

    fn line_length(&self, seconds: f32) -> usize {
        let samples = roundf(seconds * self.sample_rate);
        if samples < 0.0 {
            1
        } else {
            1 + samples as usize
        }
    }

    fn init_delays(&mut self) {
        let len_l = self.line_length(self.delay - self.lr_delay);
        let len_r = self.line_length(self.delay + self.lr_delay);
        self.line_l.clear();
        self.line_l.resize(len_l, 0.0);
        self.line_r.clear();
        self.line_r.resize(len_r, 0.0);
        self.cleanup();
    }

    fn apply_volume(&mut self, value: u8) {
        self.par[0] = value;
        let v = f32::from(value) / 127.0;
        match self.role {
            EffectRole::System => {
                self.out_volume = powf(0.01, 1.0 - v) * 4.0;
                self.volume = 1.0;
            }
            EffectRole::Insertion => {
                self.volume = v;
                self.out_volume = v;
            }
        }
        if value == 0 {
            self.cleanup();
        }
    }

    fn apply_lr_delay(&mut self, value: u8) {
        self.par[3] = value;
        let offset = f32::from(value) - 64.0;
        let seconds = (powf(2.0, offset.abs() / 64.0 * 9.0) - 1.0) / 1000.0;
        self.lr_delay = if offset < 0.0 { -seconds } else { seconds };
        self.init_delays();
    }
}

impl Effect for Echo {
    fn name(&self) -> &'static str {
        "Echo"
    }

    fn out(&mut self, in_l: &[f32], in_r: &[f32]) {
        let n = in_l.len().min(in_r.len()).min(self.efx_l.len());
        let len_l = self.line_l.len();
        let len_r = self.line_r.len();
        // Samples past a short input must not repeat the previous block
        self.efx_l[n..].fill(0.0);
        self.efx_r[n..].fill(0.0);
        if len_l == 0 || len_r == 0 {
            self.efx_l[..n].fill(0.0);
            self.efx_r[..n].fill(0.0);
            return;
        }

        for i in 0..n {
            let tap_l = self.line_l[self.pos_l];
            let tap_r = self.line_r[self.pos_r];
            let l = tap_l * (1.0 - self.crossover) + tap_r * self.crossover;
            let r = tap_r * (1.0 - self.crossover) + tap_l * self.crossover;

            self.efx_l[i] = l * 2.0;
            self.efx_r[i] = r * 2.0;

            let mut feed_l = in_l[i] * self.panning - l * self.feedback;
            let mut feed_r = in_r[i] * (1.0 - self.panning) - r * self.feedback;

            // One-pole high damping
            feed_l = flush_denormal(feed_l * self.hi_damp + self.old_l * (1.0 - self.hi_damp));
            feed_r = flush_denormal(feed_r * self.hi_damp + self.old_r * (1.0 - self.hi_damp));
            self.old_l = feed_l;
            self.old_r = feed_r;
            self.line_l[self.pos_l] = feed_l;
            self.line_r[self.pos_r] = feed_r;

            self.pos_l = (self.pos_l + 1) % len_l;
            self.pos_r = (self.pos_r + 1) % len_r;
        }
    }

    fn output_l(&self) -> &[f32] {
        &self.efx_l
    }

    fn output_r(&self) -> &[f32] {
        &self.efx_r
    }

    fn change_par(&mut self, index: usize, value: u8) {
        let value = value.min(127);
        let p = f32::from(value) / 127.0;
        match index {
            0 => self.apply_volume(value),
            1 => {
                self.par[1] = value;
                self.panning = p;
            }
            2 => {
                self.par[2] = value;
                self.delay = p * MAX_DELAY;
                self.init_delays();
            }
            3 => self.apply_lr_delay(value),
            4 => {
                self.par[4] = value;
                self.crossover = p;
            }
            5 => {
                self.par[5] = value;
                self.feedback = p * 0.9922;
            }
            6 => {
                self.par[6] = value;
                self.hi_damp = 1.0 - p;
            }
            _ => {}
        }
    }

    fn get_par(&self, index: usize) -> u8 {
        self.par.get(index).copied().unwrap_or(0)
    }

    fn param_count(&self) -> usize {
        PARAM_COUNT
    }

    fn param_name(&self, index: usize) -> Option<&'static str> {
        PARAM_NAMES.get(index).copied()
    }

    fn cleanup(&mut self) {
        self.line_l.fill(0.0);
        self.line_r.fill(0.0);
        self.pos_l = 0;
        self.pos_r = 0;
        self.old_l = 0.0;
        self.old_r = 0.0;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn out_volume(&self) -> f32 {
        self.out_volume
    }

    fn preset_count(&self) -> usize {
        PRESETS.len()
    }

    fn preset_name(&self, index: usize) -> Option<&'static str> {
        PRESET_NAMES.get(index).copied()
    }

    fn set_preset(&mut self, index: usize) {
        let index = index.min(PRESETS.len() - 1);
        let values = PRESETS[index];
        for (i, value) in values.iter().enumerate() {
            self.change_par(i, *value);
        }
        if self.role == EffectRole::Insertion {
            self.change_par(0, values[0] / 2);
        }
        self.preset = index;
        #[cfg(feature = "tracing")]
        tracing::debug!("echo preset {index} ({})", PRESET_NAMES[index]);
    }

    fn preset(&self) -> usize {
        self.preset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;
    const BLOCK: usize = 2048;

    fn dry_echo(pan: u8, cross: u8, delay: u8) -> Echo {
        let mut echo = Echo::new(EffectRole::Insertion, SR, BLOCK);
        echo.change_par(1, pan);
        echo.change_par(2, delay);
        echo.change_par(3, 64);
        echo.change_par(4, cross);
        echo.change_par(5, 0);
        echo.change_par(6, 0);
        echo
    }

    #[test]
    fn test_golden_delay_identity() {
        let mut echo = dry_echo(40, 30, 1);
        let (dl, dr) = echo.delay_lengths();
        assert_eq!(dl, dr);
        // 1/127 * 1.5 s at 44.1 kHz
        assert_eq!(dl, 1 + roundf(1.0 / 127.0 * 1.5 * SR) as usize);

        let pan = 40.0 / 127.0;
        let cross = 30.0 / 127.0;
        let in_l: Vec<f32> = (0..BLOCK).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        let in_r: Vec<f32> = (0..BLOCK).map(|i| ((i * 5) % 11) as f32 / 11.0 - 0.5).collect();
        echo.out(&in_l, &in_r);
        let out_l = echo.output_l().to_vec();

        for t in 0..dl {
            assert_eq!(out_l[t], 0.0);
        }
        for t in 0..(BLOCK - dl) {
            let expected =
                2.0 * ((1.0 - cross) * pan * in_l[t] + cross * (1.0 - pan) * in_r[t]);
            assert!(
                (out_l[t + dl] - expected).abs() < 1e-6,
                "t={t}: {} vs {expected}",
                out_l[t + dl]
            );
        }
    }

    #[test]
    fn test_short_input_clears_output_tail() {
        let mut echo = dry_echo(64, 0, 1);
        let input = vec![0.5f32; BLOCK];
        echo.out(&input, &input);
        assert!(echo.output_l()[BLOCK - 1] != 0.0);

        echo.out(&input[..100], &input[..100]);
        assert!(echo.output_l()[100..].iter().all(|s| *s == 0.0));
        assert!(echo.output_r()[100..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_lr_delay_splits_lengths() {
        let mut echo = Echo::new(EffectRole::Insertion, SR, 256);
        echo.change_par(2, 64);
        echo.change_par(3, 96);
        let (dl, dr) = echo.delay_lengths();
        assert!(dr > dl);
        echo.change_par(3, 32);
        let (dl, dr) = echo.delay_lengths();
        assert!(dl > dr);
    }

    #[test]
    fn test_minimum_length_is_one() {
        let mut echo = Echo::new(EffectRole::Insertion, SR, 256);
        echo.change_par(2, 0);
        echo.change_par(3, 127);
        let (dl, dr) = echo.delay_lengths();
        assert_eq!(dl, 1);
        assert!(dr > 1);
    }

    #[test]
    fn test_presets_fan_out() {
        let mut echo = Echo::new(EffectRole::System, SR, 256);
        echo.set_preset(4);
        assert_eq!(echo.preset(), 4);
        for i in 0..PARAM_COUNT {
            assert_eq!(echo.get_par(i), PRESETS[4][i]);
        }
        echo.set_preset(100);
        assert_eq!(echo.preset(), 8);
        assert_eq!(echo.preset_name(8), Some("Feedback Echo"));
    }

    #[test]
    fn test_insertion_preset_halves_volume() {
        let mut echo = Echo::new(EffectRole::Insertion, SR, 256);
        echo.set_preset(6);
        assert_eq!(echo.get_par(0), 81 / 2);
        assert!((echo.volume() - 40.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_laws() {
        let mut system = Echo::new(EffectRole::System, SR, 256);
        system.set_volume(127);
        assert_eq!(system.volume(), 1.0);
        assert!((system.out_volume() - 4.0).abs() < 1e-5);
        system.set_volume(0);
        assert!((system.out_volume() - 0.04).abs() < 1e-5);

        let mut insertion = Echo::new(EffectRole::Insertion, SR, 256);
        insertion.set_volume(127);
        assert_eq!(insertion.volume(), 1.0);
        assert_eq!(insertion.out_volume(), 1.0);
    }

    #[test]
    fn test_zero_volume_cleans_up() {
        let mut echo = dry_echo(64, 0, 1);
        echo.out(&[1.0; 512], &[1.0; 512]);
        assert!(echo.line_l.iter().any(|s| *s != 0.0));
        echo.set_volume(0);
        assert!(echo.line_l.iter().all(|s| *s == 0.0));
        assert_eq!(echo.pos_l, 0);
    }

    #[test]
    fn test_unknown_param_is_noop() {
        let mut echo = Echo::new(EffectRole::Insertion, SR, 256);
        let before = echo.par;
        echo.change_par(42, 100);
        assert_eq!(echo.par, before);
        assert_eq!(echo.get_par(42), 0);
        assert_eq!(echo.param_name(6), Some("High Damping"));
    }

    #[test]
    fn test_delay_change_does_not_reallocate() {
        let mut echo = Echo::new(EffectRole::Insertion, SR, 256);
        let cap = echo.line_l.capacity();
        echo.change_par(2, 127);
        echo.change_par(3, 0);
        assert_eq!(echo.line_l.capacity(), cap);
        assert_eq!(echo.line_r.capacity(), cap);
    }

    #[test]
    fn test_feedback_decays() {
        let mut echo = dry_echo(64, 0, 2);
        echo.change_par(5, 100);
        let mut impulse = vec![0.0f32; 512];
        impulse[0] = 1.0;
        let silence = vec![0.0f32; 512];
        echo.out(&impulse, &impulse);
        let mut peak = 0.0f32;
        for _ in 0..400 {
            echo.out(&silence, &silence);
            peak = echo.output_l().iter().fold(0.0, |m, s| m.max(s.abs()));
        }
        assert!(peak < 1e-3);
    }
}

//! Output level metering.
//!
//! The render path updates the meter only when it can take the VU lock
//! without waiting; readers on other threads copy out a [`VuData`] snapshot.

use crate::mix_graph::NUM_MIDI_PARTS;

/// Floor for peak and RMS values, so meters in dB never see zero.
const LEVEL_FLOOR: f32 = 1e-12;

/// Value peaks are reset to.
const RESET_LEVEL: f32 = 1e-9;

/// A copy of the meter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VuData {
    /// Peak of the last block, left
    pub out_peak_l: f32,
    /// Peak of the last block, right
    pub out_peak_r: f32,
    /// Highest peak since the last reset, left
    pub max_out_peak_l: f32,
    /// Highest peak since the last reset, right
    pub max_out_peak_r: f32,
    /// RMS of the last block, left
    pub rms_peak_l: f32,
    /// RMS of the last block, right
    pub rms_peak_r: f32,
    /// A block exceeded full scale since the last reset
    pub clipped: bool,
    /// Per-part peak of `|l + r|` scaled by master volume
    pub part_peaks: [f32; NUM_MIDI_PARTS],
    /// Per-part note activity, decaying by one per block while disabled
    pub fake_peaks: [u8; NUM_MIDI_PARTS],
}

impl Default for VuData {
    fn default() -> Self {
        Self {
            out_peak_l: RESET_LEVEL,
            out_peak_r: RESET_LEVEL,
            max_out_peak_l: RESET_LEVEL,
            max_out_peak_r: RESET_LEVEL,
            rms_peak_l: RESET_LEVEL,
            rms_peak_r: RESET_LEVEL,
            clipped: false,
            part_peaks: [RESET_LEVEL; NUM_MIDI_PARTS],
            fake_peaks: [0; NUM_MIDI_PARTS],
        }
    }
}

/// Per-part input to a meter update.
#[derive(Debug, Clone, Copy)]
pub struct PartLevel<'a> {
    /// Part renders
    pub enabled: bool,
    /// Part left block after volume and panning
    pub out_l: &'a [f32],
    /// Part right block
    pub out_r: &'a [f32],
}

/// Meter state, owned behind the VU mutex.
#[derive(Debug, Clone, Default)]
pub struct VuMeter {
    data: VuData,
}

impl VuMeter {
    /// Fresh meter with all levels at the reset floor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current levels.
    pub fn snapshot(&self) -> VuData {
        self.data
    }

    /// Reset peaks, maxima and the clip flag now.
    pub fn reset_peaks(&mut self) {
        let d = &mut self.data;
        d.out_peak_l = RESET_LEVEL;
        d.out_peak_r = RESET_LEVEL;
        d.max_out_peak_l = RESET_LEVEL;
        d.max_out_peak_r = RESET_LEVEL;
        d.rms_peak_l = RESET_LEVEL;
        d.rms_peak_r = RESET_LEVEL;
        d.part_peaks = [RESET_LEVEL; NUM_MIDI_PARTS];
        d.clipped = false;
    }

    /// Meter one finished master block.
    ///
    /// `fake_peaks` is the mixer's note-activity array; entries of disabled
    /// parts decay by one here and the result is copied into the snapshot.
    pub fn update<'a>(
        &mut self,
        out_l: &[f32],
        out_r: &[f32],
        parts: impl IntoIterator<Item = PartLevel<'a>>,
        master_volume: f32,
        fake_peaks: &mut [u8; NUM_MIDI_PARTS],
    ) {
        let d = &mut self.data;

        d.out_peak_l = out_l.iter().fold(LEVEL_FLOOR, |m, s| m.max(s.abs()));
        d.out_peak_r = out_r.iter().fold(LEVEL_FLOOR, |m, s| m.max(s.abs()));
        if d.out_peak_l > 1.0 || d.out_peak_r > 1.0 {
            d.clipped = true;
        }
        d.max_out_peak_l = d.max_out_peak_l.max(d.out_peak_l);
        d.max_out_peak_r = d.max_out_peak_r.max(d.out_peak_r);

        d.rms_peak_l = rms(out_l);
        d.rms_peak_r = rms(out_r);

        for (i, part) in parts.into_iter().take(NUM_MIDI_PARTS).enumerate() {
            d.part_peaks[i] = LEVEL_FLOOR;
            if part.enabled {
                let peak = part
                    .out_l
                    .iter()
                    .zip(part.out_r)
                    .fold(LEVEL_FLOOR, |m, (l, r)| m.max((l + r).abs()));
                d.part_peaks[i] = peak * master_volume;
            } else if fake_peaks[i] > 1 {
                fake_peaks[i] -= 1;
            }
        }
        d.fake_peaks = *fake_peaks;
    }
}

fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return LEVEL_FLOOR;
    }
    let sum: f32 = block.iter().map(|s| s * s).sum();
    ((LEVEL_FLOOR + sum) / block.len() as f32).sqrt()
}

//! Parts: independently addressable instrument slots.
//!
//! A part receives MIDI on one channel, owns a fixed pool of voices and
//! renders them into its own stereo block buffers. Volume and panning are
//! stored here but applied by the mixer, which interpolates between the
//! previous and the new gains across a block.
//!
//! In legato mode the part keeps a pair of voices for the held note, one
//! audible and one silent. An overlapping note sends a legato update to
//! both: the audible voice fades out and catches up, the silent one fades in
//! at the new pitch, and they swap roles on every legato note.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use cadenza_core::{FilterType, MAX_FILTER_STAGES, unit_control, volume_gain};
use libm::powf;

use crate::basic_note::{BasicNote, VoiceSettings};
use crate::midi::cc;
use crate::note::{NoteParams, SynthNote};

/// Voices per part.
pub const VOICES_PER_PART: usize = 16;

/// Default volume control value (unity).
pub const DEFAULT_VOLUME: u8 = 96;

/// Default panning control value (center).
pub const DEFAULT_PANNING: u8 = 64;

/// Default filter cutoff control value (about 3.8 kHz).
pub const DEFAULT_CUTOFF: u8 = 96;

/// Default filter resonance control value (0.707).
pub const DEFAULT_Q: u8 = 64;

/// Filter cutoff in Hz for a 0..127 control value: 20 Hz to 20.48 kHz,
/// exponential.
pub fn cutoff_hz(value: u8) -> f32 {
    20.0 * powf(2.0, f32::from(value.min(127)) / 127.0 * 10.0)
}

/// Filter resonance for a 0..127 control value; 64 is 0.707.
pub fn resonance_q(value: u8) -> f32 {
    0.707 * powf(2.0, (f32::from(value.min(127)) - 64.0) / 16.0)
}

#[derive(Debug, Clone)]
struct VoiceSlot {
    note: BasicNote,
    key: u8,
    age: u64,
    sustained: bool,
}

/// One instrument slot.
#[derive(Debug, Clone)]
pub struct Part {
    enabled: bool,
    channel: u8,

    volume_par: u8,
    panning_par: u8,
    expression: f32,
    volume: f32,
    panning: f32,
    previous_gains: (f32, f32),

    legato: bool,
    sustain: bool,

    filter_type: FilterType,
    cutoff_par: u8,
    q_par: u8,
    stages: usize,
    settings: VoiceSettings,

    voices: [Option<VoiceSlot>; VOICES_PER_PART],
    legato_pair: Option<[usize; 2]>,
    next_age: u64,

    sample_rate: f32,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
    tmp_l: Vec<f32>,
    tmp_r: Vec<f32>,
}

impl Part {
    /// Create a disabled part receiving on `channel`, with block buffers of
    /// `block_size` samples.
    pub fn new(channel: u8, sample_rate: f32, block_size: usize) -> Self {
        let mut part = Self {
            enabled: false,
            channel,
            volume_par: DEFAULT_VOLUME,
            panning_par: DEFAULT_PANNING,
            expression: 1.0,
            volume: 1.0,
            panning: 0.5,
            previous_gains: (1.0, 1.0),
            legato: false,
            sustain: false,
            filter_type: FilterType::LowPass2,
            cutoff_par: DEFAULT_CUTOFF,
            q_par: DEFAULT_Q,
            stages: 0,
            settings: VoiceSettings::default(),
            voices: core::array::from_fn(|_| None),
            legato_pair: None,
            next_age: 0,
            sample_rate,
            out_l: vec![0.0; block_size],
            out_r: vec![0.0; block_size],
            tmp_l: vec![0.0; block_size],
            tmp_r: vec![0.0; block_size],
        };
        part.defaults();
        part
    }

    /// Restore default controls and silence the part. Keeps the channel.
    pub fn defaults(&mut self) {
        self.set_volume(DEFAULT_VOLUME);
        self.set_panning(DEFAULT_PANNING);
        self.expression = 1.0;
        self.update_volume();
        self.legato = false;
        self.sustain = false;
        self.filter_type = FilterType::LowPass2;
        self.cutoff_par = DEFAULT_CUTOFF;
        self.q_par = DEFAULT_Q;
        self.stages = 0;
        self.update_settings();
        self.previous_gains = self.target_gains();
        self.cleanup();
    }

    // ---- enable / routing ----

    /// Whether the part renders and receives notes.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable. Enabling snaps the interpolation state to the
    /// current gains so no stale ramp is replayed.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.previous_gains = self.target_gains();
        }
        self.enabled = enabled;
    }

    /// Receive channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Set the receive channel (wrapped to 0..=15).
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel % crate::midi::NUM_MIDI_CHANNELS;
    }

    // ---- volume / panning ----

    /// Volume control value.
    pub fn volume_par(&self) -> u8 {
        self.volume_par
    }

    /// Set the volume control (0..=127, 96 is unity).
    pub fn set_volume(&mut self, value: u8) {
        self.volume_par = value.min(127);
        self.update_volume();
    }

    fn update_volume(&mut self) {
        self.volume = volume_gain(self.volume_par) * self.expression;
    }

    /// Linear volume including expression.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Panning control value.
    pub fn panning_par(&self) -> u8 {
        self.panning_par
    }

    /// Set the panning control (0..=127, 64 is center).
    pub fn set_panning(&mut self, value: u8) {
        self.panning_par = value.min(127);
        self.panning = unit_control(self.panning_par);
    }

    /// Panning position, 0.0..=1.0.
    pub fn panning(&self) -> f32 {
        self.panning
    }

    /// Left/right gains for the current volume and panning. Panning below
    /// the midpoint attenuates the left channel, above it the right.
    pub fn target_gains(&self) -> (f32, f32) {
        let mut left = self.volume;
        let mut right = self.volume;
        if self.panning < 0.5 {
            left *= self.panning * 2.0;
        } else {
            right *= (1.0 - self.panning) * 2.0;
        }
        (left, right)
    }

    /// Gains applied to the previous block.
    pub fn previous_gains(&self) -> (f32, f32) {
        self.previous_gains
    }

    /// Record the gains applied to the current block.
    pub fn set_previous_gains(&mut self, gains: (f32, f32)) {
        self.previous_gains = gains;
    }

    // ---- voice settings ----

    /// Legato (mono, click-free glide between overlapping notes) mode.
    pub fn is_legato(&self) -> bool {
        self.legato
    }

    /// Switch legato mode. Leaving it releases the held pair.
    pub fn set_legato(&mut self, legato: bool) {
        if !legato {
            self.release_legato_pair();
        }
        self.legato = legato;
    }

    /// Voice filter type.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Set the voice filter type.
    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
        self.update_settings();
    }

    /// Cutoff control value.
    pub fn filter_cutoff(&self) -> u8 {
        self.cutoff_par
    }

    /// Set the cutoff control (see [`cutoff_hz`]).
    pub fn set_filter_cutoff(&mut self, value: u8) {
        self.cutoff_par = value.min(127);
        self.update_settings();
    }

    /// Resonance control value.
    pub fn filter_q(&self) -> u8 {
        self.q_par
    }

    /// Set the resonance control (see [`resonance_q`]).
    pub fn set_filter_q(&mut self, value: u8) {
        self.q_par = value.min(127);
        self.update_settings();
    }

    /// Extra cascaded filter sections.
    pub fn filter_stages(&self) -> usize {
        self.stages
    }

    /// Set the filter stage count (clamped to `MAX_FILTER_STAGES`).
    pub fn set_filter_stages(&mut self, stages: usize) {
        self.stages = stages.min(MAX_FILTER_STAGES);
        self.update_settings();
    }

    /// Settings new voices start with.
    pub fn voice_settings(&self) -> &VoiceSettings {
        &self.settings
    }

    fn update_settings(&mut self) {
        self.settings.filter_type = self.filter_type;
        self.settings.cutoff = cutoff_hz(self.cutoff_par);
        self.settings.q = resonance_q(self.q_par);
        self.settings.stages = self.stages;
        let settings = self.settings;
        for slot in self.voices.iter_mut().flatten() {
            slot.note.apply_settings(&settings);
        }
    }

    // ---- notes ----

    /// Number of voices currently allocated.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().flatten().count()
    }

    fn allocate(&mut self) -> usize {
        let index = self
            .voices
            .iter()
            .position(Option::is_none)
            .or_else(|| self.oldest(|slot| slot.note.is_released()))
            .or_else(|| self.oldest(|_| true))
            .unwrap_or(0);

        if self.voices[index].is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!("part ch={} stealing voice {index}", self.channel);
            if self.legato_pair.is_some_and(|pair| pair.contains(&index)) {
                self.legato_pair = None;
            }
        }
        index
    }

    fn oldest(&self, filter: impl Fn(&VoiceSlot) -> bool) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().filter(|s| filter(s)).map(|s| (i, s.age)))
            .min_by_key(|(_, age)| *age)
            .map(|(i, _)| i)
    }

    fn start_voice(&mut self, params: NoteParams, key: u8, silent: bool) -> usize {
        let index = self.allocate();
        let note = BasicNote::new(params, &self.settings, self.sample_rate, silent);
        self.voices[index] = Some(VoiceSlot {
            note,
            key,
            age: self.next_age,
            sustained: false,
        });
        self.next_age += 1;
        index
    }

    fn held_pair(&self) -> Option<[usize; 2]> {
        let pair = self.legato_pair?;
        let held = pair.iter().all(|&i| {
            self.voices[i]
                .as_ref()
                .is_some_and(|slot| !slot.note.is_released())
        });
        held.then_some(pair)
    }

    /// Start a note. `key_shift` transposes in semitones.
    pub fn note_on(&mut self, note: u8, velocity: u8, key_shift: i32) {
        let params = NoteParams::from_midi(note, velocity, key_shift);

        if !self.legato {
            self.start_voice(params, note, false);
            return;
        }

        if let Some(pair) = self.held_pair() {
            for index in pair {
                if let Some(slot) = self.voices[index].as_mut() {
                    slot.note.legato_note(params, true);
                    slot.key = note;
                }
            }
            return;
        }

        self.release_legato_pair();
        let audible = self.start_voice(params, note, false);
        let silent = self.start_voice(params, note, true);
        self.legato_pair = Some([audible, silent]);
    }

    /// Release every voice playing `note`, or mark it sustained while the
    /// pedal is down.
    pub fn note_off(&mut self, note: u8) {
        let sustain = self.sustain;
        for slot in self.voices.iter_mut().flatten() {
            if slot.key == note && !slot.note.is_released() {
                if sustain {
                    slot.sustained = true;
                } else {
                    slot.note.release_key();
                }
            }
        }
        self.forget_released_pair();
    }

    /// Release every sounding voice.
    pub fn release_all(&mut self) {
        for slot in self.voices.iter_mut().flatten() {
            slot.note.release_key();
            slot.sustained = false;
        }
        self.legato_pair = None;
    }

    fn release_legato_pair(&mut self) {
        if let Some(pair) = self.legato_pair.take() {
            for index in pair {
                if let Some(slot) = self.voices[index].as_mut() {
                    slot.note.release_key();
                }
            }
        }
    }

    fn forget_released_pair(&mut self) {
        if self.legato_pair.is_some() && self.held_pair().is_none() {
            self.legato_pair = None;
        }
    }

    fn set_sustain(&mut self, on: bool) {
        self.sustain = on;
        if !on {
            for slot in self.voices.iter_mut().flatten() {
                if slot.sustained {
                    slot.sustained = false;
                    slot.note.release_key();
                }
            }
            self.forget_released_pair();
        }
    }

    /// Handle a channel controller.
    pub fn set_controller(&mut self, number: u16, value: u16) {
        let value = value.min(127) as u8;
        match number {
            cc::VOLUME => self.set_volume(value),
            cc::PANNING => self.set_panning(value),
            cc::EXPRESSION => {
                self.expression = unit_control(value);
                self.update_volume();
            }
            cc::SUSTAIN => self.set_sustain(value >= 64),
            cc::FILTER_CUTOFF => self.set_filter_cutoff(value),
            cc::FILTER_Q => self.set_filter_q(value),
            cc::ALL_SOUNDS_OFF => self.cleanup(),
            cc::RESET_ALL_CONTROLLERS => {
                self.expression = 1.0;
                self.update_volume();
                self.set_sustain(false);
            }
            cc::ALL_NOTES_OFF => self.release_all(),
            _ => {}
        }
    }

    // ---- rendering ----

    /// Render all voices into the part buffers.
    pub fn compute(&mut self) {
        let Self {
            voices,
            out_l,
            out_r,
            tmp_l,
            tmp_r,
            ..
        } = self;
        out_l.fill(0.0);
        out_r.fill(0.0);

        for slot in voices.iter_mut() {
            let Some(voice) = slot.as_mut() else {
                continue;
            };
            voice.note.note_out(tmp_l, tmp_r);
            for (o, s) in out_l.iter_mut().zip(tmp_l.iter()) {
                *o += *s;
            }
            for (o, s) in out_r.iter_mut().zip(tmp_r.iter()) {
                *o += *s;
            }
            if voice.note.is_finished() {
                *slot = None;
            }
        }
        self.forget_released_pair();
    }

    /// Kill every voice immediately and zero the buffers.
    pub fn cleanup(&mut self) {
        for slot in self.voices.iter_mut() {
            if let Some(voice) = slot.as_mut() {
                voice.note.cleanup();
            }
            *slot = None;
        }
        self.legato_pair = None;
        self.out_l.fill(0.0);
        self.out_r.fill(0.0);
    }

    /// Left output of the last [`compute`](Self::compute).
    pub fn output_l(&self) -> &[f32] {
        &self.out_l
    }

    /// Right output of the last [`compute`](Self::compute).
    pub fn output_r(&self) -> &[f32] {
        &self.out_r
    }

    /// Both output buffers, for in-place processing.
    pub fn buffers_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.out_l, &mut self.out_r)
    }

    /// Legato machine states of the held pair, audible voice first.
    pub fn legato_pair_states(&self) -> Option<[(crate::LegatoState, bool); 2]> {
        let [a, b] = self.legato_pair?;
        let state = |i: usize| {
            self.voices[i]
                .as_ref()
                .map(|slot| (slot.note.legato().state(), slot.note.legato().is_silent()))
        };
        Some([state(a)?, state(b)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;
    const BLOCK: usize = 256;

    fn enabled_part() -> Part {
        let mut part = Part::new(0, SR, BLOCK);
        part.set_enabled(true);
        part
    }

    fn peak(part: &Part) -> f32 {
        part.output_l()
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_pan_law() {
        let mut part = Part::new(0, SR, BLOCK);
        part.set_volume(96);
        part.set_panning(0);
        let (l, r) = part.target_gains();
        assert_eq!(l, 0.0);
        assert!((r - 1.0).abs() < 1e-6);
        part.set_panning(127);
        let (l, r) = part.target_gains();
        assert!((l - 1.0).abs() < 1e-6);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_poly_notes_allocate_voices() {
        let mut part = enabled_part();
        part.note_on(60, 100, 0);
        part.note_on(64, 100, 0);
        part.note_on(67, 100, 0);
        assert_eq!(part.active_voices(), 3);
        part.compute();
        assert!(peak(&part) > 0.0);
    }

    #[test]
    fn test_voice_stealing_keeps_pool_size() {
        let mut part = enabled_part();
        for n in 0..(VOICES_PER_PART as u8 + 4) {
            part.note_on(40 + n, 100, 0);
        }
        assert_eq!(part.active_voices(), VOICES_PER_PART);
    }

    #[test]
    fn test_sustain_holds_released_notes() {
        let mut part = enabled_part();
        part.set_controller(cc::SUSTAIN, 127);
        part.note_on(60, 100, 0);
        part.note_off(60);
        for _ in 0..40 {
            part.compute();
        }
        assert_eq!(part.active_voices(), 1);
        part.set_controller(cc::SUSTAIN, 0);
        for _ in 0..40 {
            part.compute();
        }
        assert_eq!(part.active_voices(), 0);
    }

    #[test]
    fn test_all_sounds_off_is_immediate() {
        let mut part = enabled_part();
        part.note_on(60, 100, 0);
        part.compute();
        part.set_controller(cc::ALL_SOUNDS_OFF, 0);
        assert_eq!(part.active_voices(), 0);
        assert!(part.output_l().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_expression_scales_volume() {
        let mut part = Part::new(0, SR, BLOCK);
        part.set_controller(cc::EXPRESSION, 0);
        assert_eq!(part.volume(), 0.0);
        part.set_controller(cc::RESET_ALL_CONTROLLERS, 0);
        assert!((part.volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_legato_pair_created() {
        let mut part = enabled_part();
        part.set_legato(true);
        part.note_on(60, 100, 0);
        assert_eq!(part.active_voices(), 2);
        let states = part.legato_pair_states().expect("pair");
        assert!(!states[0].1);
        assert!(states[1].1);
    }

    #[test]
    fn test_controller_clamps_filter() {
        let mut part = Part::new(0, SR, BLOCK);
        part.set_controller(cc::FILTER_CUTOFF, 300);
        assert_eq!(part.filter_cutoff(), 127);
        part.set_filter_stages(99);
        assert_eq!(part.filter_stages(), MAX_FILTER_STAGES);
        assert!((resonance_q(64) - 0.707).abs() < 1e-6);
        assert!((cutoff_hz(127) - 20480.0).abs() < 1.0);
    }
}

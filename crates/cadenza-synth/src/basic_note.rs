//! Minimal built-in voice: saw oscillator → analog filter → linear envelope.
//!
//! Exists so that parts produce audio and the mixer can be exercised end to
//! end. The legato transition runs last, on the finished block.

use cadenza_core::{AnalogFilter, FilterType};

use crate::legato::{Legato, LegatoUpdate};
use crate::note::{NoteParams, SynthNote};

/// Peak output of one voice at full velocity.
const VOICE_LEVEL: f32 = 0.25;

/// Voice-level settings shared by every note of a part.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceSettings {
    /// Filter response
    pub filter_type: FilterType,
    /// Filter cutoff in Hz
    pub cutoff: f32,
    /// Filter resonance
    pub q: f32,
    /// Extra cascaded filter sections
    pub stages: usize,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            filter_type: FilterType::LowPass2,
            cutoff: 4000.0,
            q: 0.707,
            stages: 0,
            attack: 0.005,
            release: 0.1,
        }
    }
}

/// A single saw voice.
///
/// # Example
///
/// ```rust
/// use cadenza_synth::{BasicNote, NoteParams, SynthNote, VoiceSettings};
///
/// let params = NoteParams::from_midi(60, 100, 0);
/// let mut note = BasicNote::new(params, &VoiceSettings::default(), 44100.0, false);
///
/// let mut l = [0.0f32; 256];
/// let mut r = [0.0f32; 256];
/// note.note_out(&mut l, &mut r);
/// note.release_key();
/// ```
#[derive(Debug, Clone)]
pub struct BasicNote {
    sample_rate: f32,
    phase: f32,
    phase_inc: f32,
    amplitude: f32,
    filter: AnalogFilter,
    envelope: f32,
    attack_step: f32,
    release_step: f32,
    released: bool,
    finished: bool,
    legato: Legato,
}

impl BasicNote {
    /// Start a note. A `silent` note is the muted half of a legato pair.
    pub fn new(params: NoteParams, settings: &VoiceSettings, sample_rate: f32, silent: bool) -> Self {
        let mut filter = AnalogFilter::new(
            settings.filter_type,
            settings.cutoff,
            settings.q,
            settings.stages,
            sample_rate,
        );
        filter.set_frequency(settings.cutoff);
        let mut note = Self {
            sample_rate,
            phase: 0.0,
            phase_inc: 0.0,
            amplitude: 0.0,
            filter,
            envelope: 0.0,
            attack_step: step_for(settings.attack, sample_rate),
            release_step: step_for(settings.release, sample_rate),
            released: false,
            finished: false,
            legato: Legato::new(params, sample_rate, silent),
        };
        note.retune(params);
        note
    }

    fn retune(&mut self, params: NoteParams) {
        self.phase_inc = params.freq / self.sample_rate;
        self.amplitude = params.velocity * VOICE_LEVEL;
    }

    /// Apply new part-level settings to the sounding note.
    pub fn apply_settings(&mut self, settings: &VoiceSettings) {
        if self.filter.filter_type() != settings.filter_type {
            self.filter.set_type(settings.filter_type);
        }
        if self.filter.stages() != settings.stages {
            self.filter.set_stages(settings.stages);
        }
        self.filter.set_frequency_and_q(settings.cutoff, settings.q);
        self.attack_step = step_for(settings.attack, self.sample_rate);
        self.release_step = step_for(settings.release, self.sample_rate);
    }

    /// Legato machine of this note.
    pub fn legato(&self) -> &Legato {
        &self.legato
    }

    /// True once [`release_key`](SynthNote::release_key) was called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Current oscillator frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.phase_inc * self.sample_rate
    }
}

fn step_for(seconds: f32, sample_rate: f32) -> f32 {
    let samples = (seconds * sample_rate).max(1.0);
    1.0 / samples
}

impl SynthNote for BasicNote {
    fn note_out(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len().min(out_r.len());
        if self.finished {
            out_l[..n].fill(0.0);
            out_r[..n].fill(0.0);
            return;
        }

        for sample in out_l[..n].iter_mut() {
            *sample = 2.0 * self.phase - 1.0;
            self.phase += self.phase_inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        self.filter.process(&mut out_l[..n]);

        for i in 0..n {
            if self.released {
                self.envelope -= self.release_step;
                if self.envelope <= 0.0 {
                    self.envelope = 0.0;
                    self.finished = true;
                }
            } else {
                self.envelope = (self.envelope + self.attack_step).min(1.0);
            }
            let s = out_l[i] * self.envelope * self.amplitude;
            out_l[i] = s;
            out_r[i] = s;
        }

        if let Some(params) = self.legato.apply(&mut out_l[..n], &mut out_r[..n]) {
            self.retune(params);
        }
    }

    fn release_key(&mut self) {
        self.released = true;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn legato_note(&mut self, params: NoteParams, external: bool) {
        if self.legato.update(params, external) == LegatoUpdate::Apply {
            self.retune(params);
        }
    }

    fn cleanup(&mut self) {
        self.filter.cleanup();
        self.envelope = 0.0;
        self.finished = true;
    }
}

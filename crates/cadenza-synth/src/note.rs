//! The voice contract.

/// Parameters a voice is (re)tuned to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteParams {
    /// Frequency in Hz
    pub freq: f32,
    /// Velocity, 0.0..=1.0
    pub velocity: f32,
    /// Glide into the new pitch instead of jumping
    pub portamento: bool,
    /// MIDI note number that produced this pitch
    pub midi_note: u8,
}

impl NoteParams {
    /// Parameters for a MIDI note with 7-bit velocity, shifted by `key_shift`
    /// semitones.
    pub fn from_midi(note: u8, velocity: u8, key_shift: i32) -> Self {
        Self {
            freq: crate::midi::note_to_frequency(i32::from(note) + key_shift),
            velocity: f32::from(velocity.min(127)) / 127.0,
            portamento: false,
            midi_note: note,
        }
    }
}

/// A single sounding note.
///
/// Implementations render one block at a time into caller-provided buffers
/// and run their own [`Legato`](crate::Legato) transition on the result.
pub trait SynthNote {
    /// Render one block into `out_l` / `out_r`, overwriting them.
    fn note_out(&mut self, out_l: &mut [f32], out_r: &mut [f32]);

    /// Key released; start the release phase.
    fn release_key(&mut self);

    /// True once the note has fully decayed and can be reclaimed.
    fn is_finished(&self) -> bool;

    /// Move the sounding note to new parameters without retriggering.
    ///
    /// `external` forces the transition machine back to its initial state,
    /// abandoning any fade in progress.
    fn legato_note(&mut self, params: NoteParams, external: bool);

    /// Drop all internal state.
    fn cleanup(&mut self);
}

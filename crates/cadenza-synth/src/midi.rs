//! MIDI events as the engine consumes them.
//!
//! Events are already decoded by the driver: a channel, a kind, a number
//! (note or controller) and a value (velocity or controller value).

use libm::powf;

/// Number of MIDI channels.
pub const NUM_MIDI_CHANNELS: u8 = 16;

/// Kind of a decoded MIDI event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Note on/off; `value` is the velocity, 0 means note-off
    Note,
    /// Control change; `number` is the controller
    Controller,
}

/// A decoded MIDI event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    /// Channel 0..=15
    pub channel: u8,
    /// Event kind
    pub kind: EventKind,
    /// Note or controller number
    pub number: u16,
    /// Velocity or controller value
    pub value: u16,
}

impl MidiEvent {
    /// Note event. A velocity of 0 is a note-off.
    pub fn note(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            channel,
            kind: EventKind::Note,
            number: u16::from(note),
            value: u16::from(velocity),
        }
    }

    /// Note-off event.
    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::note(channel, note, 0)
    }

    /// Controller event.
    pub fn controller(channel: u8, number: u16, value: u16) -> Self {
        Self {
            channel,
            kind: EventKind::Controller,
            number,
            value,
        }
    }

    /// True for a note event with velocity 0.
    pub fn is_note_off(&self) -> bool {
        self.kind == EventKind::Note && self.value == 0
    }
}

impl core::fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            EventKind::Note => write!(
                f,
                "note ch={} num={} vel={}",
                self.channel, self.number, self.value
            ),
            EventKind::Controller => write!(
                f,
                "ctl ch={} num={} val={}",
                self.channel, self.number, self.value
            ),
        }
    }
}

/// Controller numbers the engine understands.
pub mod cc {
    /// Data entry, coarse
    pub const DATA_ENTRY_HI: u16 = 6;
    /// Channel volume
    pub const VOLUME: u16 = 7;
    /// Pan position
    pub const PANNING: u16 = 10;
    /// Expression (relative volume)
    pub const EXPRESSION: u16 = 11;
    /// Data entry, fine
    pub const DATA_ENTRY_LO: u16 = 38;
    /// Sustain pedal
    pub const SUSTAIN: u16 = 64;
    /// Filter resonance
    pub const FILTER_Q: u16 = 71;
    /// Filter cutoff
    pub const FILTER_CUTOFF: u16 = 74;
    /// NRPN parameter number, fine
    pub const NRPN_LO: u16 = 98;
    /// NRPN parameter number, coarse
    pub const NRPN_HI: u16 = 99;
    /// All sounds off (immediate silence)
    pub const ALL_SOUNDS_OFF: u16 = 120;
    /// Reset all controllers
    pub const RESET_ALL_CONTROLLERS: u16 = 121;
    /// All notes off (release)
    pub const ALL_NOTES_OFF: u16 = 123;
}

/// Equal-tempered frequency of a (possibly shifted) MIDI note, A4 = 440 Hz.
pub fn note_to_frequency(note: i32) -> f32 {
    440.0 * powf(2.0, (note - 69) as f32 / 12.0)
}

//! Cadenza Synth - Voice layer for the cadenza engine
//!
//! This crate sits between decoded MIDI and the mixer: it turns note and
//! controller events into rendered stereo blocks, one per part.
//!
//! # Core Components
//!
//! ## MIDI
//!
//! - [`MidiEvent`] / [`EventKind`] - Decoded note and controller events
//! - [`cc`] - Controller numbers the engine understands
//!
//! ## Voices
//!
//! - [`SynthNote`] - The voice contract (render, release, legato retune)
//! - [`NoteParams`] - Frequency, velocity and note a voice is tuned to
//! - [`BasicNote`] - Saw → [`AnalogFilter`](cadenza_core::AnalogFilter) → linear
//!   envelope, enough to drive the mixer end to end
//!
//! ## Legato
//!
//! - [`Legato`] - Fade-out / catch-up / fade-in state machine that moves a
//!   sounding voice to a new pitch without a click
//!
//! ## Parts
//!
//! - [`Part`] - Channel-addressed voice pool with volume, panning, sustain,
//!   filter controls and legato pairs
//!
//! # Example
//!
//! ```rust
//! use cadenza_synth::{Part, cc};
//!
//! let mut part = Part::new(0, 44100.0, 256);
//! part.set_enabled(true);
//! part.set_controller(cc::VOLUME, 100);
//! part.note_on(60, 100, 0);
//! part.compute();
//! assert_eq!(part.output_l().len(), 256);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod basic_note;
pub mod legato;
pub mod midi;
pub mod note;
pub mod part;

pub use basic_note::{BasicNote, VoiceSettings};
pub use legato::{Legato, LegatoState, LegatoUpdate};
pub use midi::{EventKind, MidiEvent, NUM_MIDI_CHANNELS, cc, note_to_frequency};
pub use note::{NoteParams, SynthNote};
pub use part::{
    DEFAULT_CUTOFF, DEFAULT_PANNING, DEFAULT_Q, DEFAULT_VOLUME, Part, VOICES_PER_PART, cutoff_hz,
    resonance_q,
};

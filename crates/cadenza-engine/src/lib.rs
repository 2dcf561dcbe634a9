//! Cadenza Engine - Real-time mixing core
//!
//! Turns note and controller events into a continuous stereo stream: parts
//! render their voices, insertion effects run in series on parts or the
//! master, system effects are fed by sends and returned in parallel, and a
//! VU meter samples the result.
//!
//! # Core Components
//!
//! - [`Engine`] - Shared context: the coarse-locked [`MixGraph`], the
//!   [`VuMeter`] and the [`EventQueue`]
//! - [`MixGraph`] - Parts, effect slots, routing and the per-block algorithm
//! - [`EventQueue`] / [`Dispatcher`] - Non-blocking producers, a consumer
//!   thread that sleeps until events arrive
//! - [`EffectSlot`] - Insertion / system output laws around an effect
//! - [`ParamTree`] - Every control by stable dotted key, persisted as TOML
//! - [`EngineConfig`] - Sample rate, block size and startup controls
//!
//! # Threading
//!
//! One audio thread calls [`Engine::render_block`]; any number of control
//! threads mutate the graph. Both take the same mutex, so a block never sees
//! a half-applied change. The render path only try-locks the VU meter and
//! skips metering for a block rather than wait.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cadenza_engine::{Dispatcher, Engine, EngineConfig};
//! use cadenza_synth::MidiEvent;
//!
//! let engine = Arc::new(Engine::new(EngineConfig::default()).unwrap());
//! let mut dispatcher = Dispatcher::spawn(Arc::clone(&engine)).unwrap();
//!
//! engine.put_event(MidiEvent::note(0, 60, 100)).unwrap();
//!
//! let mut l = vec![0.0f32; 256];
//! let mut r = vec![0.0f32; 256];
//! engine.render_block(&mut l, &mut r);
//! dispatcher.stop();
//! ```

pub mod config;
pub mod dispatcher;
pub mod effect_slot;
pub mod engine;
pub mod error;
pub mod event_queue;
pub mod mix_graph;
pub mod nrpn;
pub mod params;
pub mod vu;

pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use effect_slot::{EffectKind, EffectSlot};
pub use engine::{Engine, EventSink, dispatch};
pub use error::{EngineError, QueueFull, Result};
pub use event_queue::{DEFAULT_QUEUE_CAPACITY, Drain, EventQueue};
pub use mix_graph::{
    DEFAULT_MASTER_VOLUME, KEY_SHIFT_CENTER, MixGraph, NUM_INS_EFX, NUM_MIDI_PARTS, NUM_SYS_EFX,
    RoutingTarget,
};
pub use nrpn::{Nrpn, NrpnDecoder};
pub use params::ParamTree;
pub use vu::{PartLevel, VuData, VuMeter};

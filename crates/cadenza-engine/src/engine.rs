//! The engine context: mix graph, VU meter and event queue behind one handle.
//!
//! An [`Engine`] is built once at startup and shared as `Arc<Engine>`. The
//! audio thread calls [`render_block`](Engine::render_block) (or
//! [`tick`](Engine::tick), which first dispatches pending events); control
//! threads call the note, controller and parameter methods. All of them
//! serialize on one coarse mutex around the [`MixGraph`], so a block is
//! always rendered from a consistent state. The VU meter has its own mutex
//! that the render path only ever try-locks.

use cadenza_synth::{EventKind, MidiEvent};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{QueueFull, Result};
use crate::event_queue::EventQueue;
use crate::mix_graph::MixGraph;
use crate::params::ParamTree;
use crate::vu::{VuData, VuMeter};

/// Receiver of decoded MIDI events.
pub trait EventSink {
    /// Note on; velocity 0 means note off.
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    /// Note off.
    fn note_off(&mut self, channel: u8, note: u8);

    /// Controller change.
    fn set_controller(&mut self, channel: u8, number: u16, value: u16);
}

impl EventSink for MixGraph {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        MixGraph::note_on(self, channel, note, velocity);
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        MixGraph::note_off(self, channel, note);
    }

    fn set_controller(&mut self, channel: u8, number: u16, value: u16) {
        MixGraph::set_controller(self, channel, number, value);
    }
}

/// Route one event to `sink`. Note events with value 0 become note offs.
pub fn dispatch(sink: &mut impl EventSink, event: MidiEvent) {
    match event.kind {
        EventKind::Note => {
            let note = event.number.min(127) as u8;
            if event.value == 0 {
                sink.note_off(event.channel, note);
            } else {
                sink.note_on(event.channel, note, event.value.min(127) as u8);
            }
        }
        EventKind::Controller => sink.set_controller(event.channel, event.number, event.value),
    }
}

/// Shared engine state.
///
/// # Example
///
/// ```rust
/// use cadenza_engine::{Engine, EngineConfig};
/// use cadenza_synth::MidiEvent;
///
/// let engine = Engine::new(EngineConfig::default()).unwrap();
/// engine.put_event(MidiEvent::note(0, 60, 100)).unwrap();
///
/// let mut l = vec![0.0f32; 256];
/// let mut r = vec![0.0f32; 256];
/// engine.tick(&mut l, &mut r);
/// assert!(engine.vu().out_peak_l > 0.0);
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    graph: Mutex<MixGraph>,
    vu: Mutex<VuMeter>,
    queue: EventQueue,
}

impl Engine {
    /// Build an engine from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut graph = MixGraph::new(config.sample_rate_f32(), config.block_size);
        graph.set_master_volume(config.master_volume);
        graph.set_key_shift(config.key_shift);
        graph.set_swap_lr(config.swap_lr);
        tracing::info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            queue_capacity = config.queue_capacity,
            "engine ready"
        );
        Ok(Self {
            queue: EventQueue::new(config.queue_capacity),
            graph: Mutex::new(graph),
            vu: Mutex::new(VuMeter::new()),
            config,
        })
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// The MIDI event queue.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Hand an event to the queue from any thread. Never blocks.
    pub fn put_event(&self, event: MidiEvent) -> std::result::Result<(), QueueFull> {
        self.queue.put(event)
    }

    /// Dispatch events to the mix graph under a single lock, in order.
    /// Returns how many were dispatched.
    pub fn dispatch_events(&self, events: impl IntoIterator<Item = MidiEvent>) -> usize {
        let mut graph = self.graph.lock();
        let mut count = 0;
        for event in events {
            tracing::trace!(%event, "dispatch");
            dispatch(&mut *graph, event);
            count += 1;
        }
        count
    }

    /// Dispatch whatever is queued right now, without waiting.
    pub fn flush_events(&self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        self.dispatch_events(self.queue.drain())
    }

    /// Render one block. Both buffers must be [`block_size`](Self::block_size)
    /// long; otherwise they are zero-filled.
    pub fn render_block(&self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.graph.lock().render(out_l, out_r, &self.vu);
    }

    /// Dispatch pending events, then render one block.
    pub fn tick(&self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.flush_events();
        self.render_block(out_l, out_r);
    }

    /// Run `f` with exclusive access to the mix graph.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut MixGraph) -> R) -> R {
        f(&mut self.graph.lock())
    }

    /// Note on (velocity 0 is a note off).
    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.graph.lock().note_on(channel, note, velocity);
    }

    /// Note off.
    pub fn note_off(&self, channel: u8, note: u8) {
        self.graph.lock().note_off(channel, note);
    }

    /// Controller change.
    pub fn set_controller(&self, channel: u8, number: u16, value: u16) {
        self.graph.lock().set_controller(channel, number, value);
    }

    /// Enable or disable a part.
    pub fn part_on_off(&self, part: usize, enabled: bool) {
        self.graph.lock().part_on_off(part, enabled);
    }

    /// Master volume control (0..=127).
    pub fn set_master_volume(&self, value: u8) {
        self.graph.lock().set_master_volume(value);
    }

    /// Key shift control (0..=127, 64 is none).
    pub fn set_key_shift(&self, value: u8) {
        self.graph.lock().set_key_shift(value);
    }

    /// Fade out and clear everything on the next block.
    pub fn shut_up(&self) {
        self.graph.lock().shut_up();
    }

    /// Copy of the VU meter.
    pub fn vu(&self) -> VuData {
        self.vu.lock().snapshot()
    }

    /// Reset VU peaks and the clip flag.
    pub fn reset_vu_peaks(&self) {
        self.vu.lock().reset_peaks();
    }

    /// Every mix graph control.
    pub fn snapshot(&self) -> ParamTree {
        self.graph.lock().snapshot()
    }

    /// Apply a parameter tree.
    pub fn apply(&self, tree: &ParamTree) -> Result<()> {
        self.graph.lock().apply(tree)
    }
}

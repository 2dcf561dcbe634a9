//! The master mixing and routing graph.
//!
//! Owns every part and effect slot and produces one stereo block per
//! [`render`](MixGraph::render) call:
//!
//! 1. swap the output channels if configured
//! 2. zero the outputs
//! 3. render every enabled part
//! 4. run insertion effects routed to an enabled part, on that part's block
//! 5. apply part volume and panning, ramped across the block when the gain
//!    moved audibly since the previous block
//! 6. run system effects in index order; each is fed by the part sends and
//!    by lower-indexed system effects' output from this same block, and its
//!    output is added to the master at the effect's return level
//! 7. add the dry part blocks to the master
//! 8. run insertion effects routed to the master
//! 9. apply master volume
//! 10. update the VU meter if its lock is free
//! 11. if a shut-up was requested, fade the block out and clear everything
//!
//! A send of 0, an empty effect slot or a routing of [`RoutingTarget::None`]
//! contributes nothing. Disabled parts are skipped before any per-sample
//! work.

use cadenza_core::{
    EffectRole, above_amplitude_threshold, interpolate_amplitude, send_gain, volume_gain,
};
use cadenza_synth::{NUM_MIDI_CHANNELS, Part, cc};
use parking_lot::Mutex;

use crate::effect_slot::{EffectKind, EffectSlot};
use crate::nrpn::NrpnDecoder;
use crate::vu::{PartLevel, VuMeter};

/// Number of parts.
pub const NUM_MIDI_PARTS: usize = 16;

/// Number of system effect slots.
pub const NUM_SYS_EFX: usize = 4;

/// Number of insertion effect slots.
pub const NUM_INS_EFX: usize = 8;

/// Default master volume control value.
pub const DEFAULT_MASTER_VOLUME: u8 = 80;

/// Key shift control value meaning no transposition.
pub const KEY_SHIFT_CENTER: u8 = 64;

/// NRPN parameter-high byte addressing system effects.
const NRPN_SYSTEM_EFFECTS: u8 = 0x04;

/// NRPN parameter-high byte addressing insertion effects.
const NRPN_INSERTION_EFFECTS: u8 = 0x08;

/// Where an insertion effect is wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RoutingTarget {
    /// Not in the signal path
    #[default]
    None,
    /// On the master output, after the system effects
    Master,
    /// On one part's block, before its volume and panning
    Part(usize),
}

impl RoutingTarget {
    /// Decode the integer control form: -2 master, -1 none, 0.. a part.
    /// Part indices past the last part decode as `None`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -2 => RoutingTarget::Master,
            n if n >= 0 && (n as usize) < NUM_MIDI_PARTS => RoutingTarget::Part(n as usize),
            _ => RoutingTarget::None,
        }
    }

    /// Integer control form.
    pub fn to_raw(self) -> i32 {
        match self {
            RoutingTarget::None => -1,
            RoutingTarget::Master => -2,
            RoutingTarget::Part(n) => n as i32,
        }
    }
}

/// A 0..127 send control with its derived gain.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SendLevel {
    value: u8,
    gain: f32,
}

impl SendLevel {
    fn new(value: u8) -> Self {
        let value = value.min(127);
        Self {
            value,
            gain: send_gain(value),
        }
    }
}

/// All parts and effects of the synthesizer, plus the master controls.
#[derive(Debug)]
pub struct MixGraph {
    sample_rate: f32,
    block_size: usize,

    pub(crate) parts: Vec<Part>,
    pub(crate) sys_effects: Vec<EffectSlot>,
    pub(crate) ins_effects: Vec<EffectSlot>,
    ins_routes: [RoutingTarget; NUM_INS_EFX],
    part_sends: [[SendLevel; NUM_MIDI_PARTS]; NUM_SYS_EFX],
    effect_sends: [[SendLevel; NUM_SYS_EFX]; NUM_SYS_EFX],

    volume_par: u8,
    volume: f32,
    key_shift_par: u8,
    swap_lr: bool,
    shutup: bool,

    nrpn: NrpnDecoder,
    fake_peaks: [u8; NUM_MIDI_PARTS],
    vu_reset_pending: bool,

    tmp_l: Vec<f32>,
    tmp_r: Vec<f32>,
}

impl MixGraph {
    /// Create a graph in its default state.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cadenza_engine::{MixGraph, VuMeter};
    /// use parking_lot::Mutex;
    ///
    /// let mut graph = MixGraph::new(44100.0, 128);
    /// let vu = Mutex::new(VuMeter::new());
    /// graph.note_on(0, 60, 100);
    ///
    /// let mut l = vec![0.0f32; 128];
    /// let mut r = vec![0.0f32; 128];
    /// graph.render(&mut l, &mut r, &vu);
    /// assert!(l.iter().any(|s| *s != 0.0));
    /// ```
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let mut graph = Self {
            sample_rate,
            block_size,
            parts: (0..NUM_MIDI_PARTS)
                .map(|i| Part::new(default_channel(i), sample_rate, block_size))
                .collect(),
            sys_effects: (0..NUM_SYS_EFX)
                .map(|_| EffectSlot::new(EffectRole::System, sample_rate, block_size))
                .collect(),
            ins_effects: (0..NUM_INS_EFX)
                .map(|_| EffectSlot::new(EffectRole::Insertion, sample_rate, block_size))
                .collect(),
            ins_routes: [RoutingTarget::None; NUM_INS_EFX],
            part_sends: [[SendLevel::new(0); NUM_MIDI_PARTS]; NUM_SYS_EFX],
            effect_sends: [[SendLevel::new(0); NUM_SYS_EFX]; NUM_SYS_EFX],
            volume_par: DEFAULT_MASTER_VOLUME,
            volume: volume_gain(DEFAULT_MASTER_VOLUME),
            key_shift_par: KEY_SHIFT_CENTER,
            swap_lr: false,
            shutup: false,
            nrpn: NrpnDecoder::new(),
            fake_peaks: [0; NUM_MIDI_PARTS],
            vu_reset_pending: false,
            tmp_l: vec![0.0; block_size],
            tmp_r: vec![0.0; block_size],
        };
        graph.defaults();
        graph
    }

    /// Reset every control to its default and silence everything.
    ///
    /// Part *i* receives on channel `i % 16`; only part 0 is enabled; all
    /// sends are 0, all insertion effects unrouted, all slots empty.
    pub fn defaults(&mut self) {
        self.set_master_volume(DEFAULT_MASTER_VOLUME);
        self.set_key_shift(KEY_SHIFT_CENTER);
        self.swap_lr = false;
        self.nrpn = NrpnDecoder::new();

        for (i, part) in self.parts.iter_mut().enumerate() {
            part.defaults();
            part.set_channel(default_channel(i));
            part.set_enabled(i == 0);
        }
        for slot in self.ins_effects.iter_mut().chain(self.sys_effects.iter_mut()) {
            slot.change_effect(EffectKind::None);
            slot.cleanup();
        }
        self.ins_routes = [RoutingTarget::None; NUM_INS_EFX];
        self.part_sends = [[SendLevel::new(0); NUM_MIDI_PARTS]; NUM_SYS_EFX];
        self.effect_sends = [[SendLevel::new(0); NUM_SYS_EFX]; NUM_SYS_EFX];
        self.fake_peaks = [0; NUM_MIDI_PARTS];
        self.shutup = false;
    }

    /// Sample rate the graph was built for.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    // ---- MIDI ----

    /// Note on for every part on `channel`. Velocity 0 is a note off.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }
        let key_shift = self.key_shift();
        let velocity = velocity.min(127);
        for (i, part) in self.parts.iter_mut().enumerate() {
            if part.channel() == channel {
                self.fake_peaks[i] = velocity * 2;
                if part.is_enabled() {
                    part.note_on(note, velocity, key_shift);
                }
            }
        }
    }

    /// Note off for every enabled part on `channel`.
    pub fn note_off(&mut self, channel: u8, note: u8) {
        for part in self.parts.iter_mut() {
            if part.channel() == channel && part.is_enabled() {
                part.note_off(note);
            }
        }
    }

    /// Handle a controller.
    ///
    /// NRPN and data entry controllers are decoded here regardless of
    /// channel; a complete NRPN with parameter-high 0x04 sets a system
    /// effect parameter, 0x08 an insertion effect parameter. Everything else
    /// goes to the enabled parts on `channel`. All-sounds-off also clears
    /// every effect.
    pub fn set_controller(&mut self, channel: u8, number: u16, value: u16) {
        if NrpnDecoder::handles(number) {
            if let Some(msg) = self.nrpn.feed(number, value) {
                let slot = usize::from(msg.param_lo);
                let (index, par) = (usize::from(msg.value_hi), msg.value_lo);
                match msg.param_hi {
                    NRPN_SYSTEM_EFFECTS if slot < NUM_SYS_EFX => {
                        self.sys_effects[slot].change_par(index, par);
                    }
                    NRPN_INSERTION_EFFECTS if slot < NUM_INS_EFX => {
                        self.ins_effects[slot].change_par(index, par);
                    }
                    _ => {}
                }
            }
            return;
        }

        for part in self.parts.iter_mut() {
            if part.channel() == channel && part.is_enabled() {
                part.set_controller(number, value);
            }
        }
        if number == cc::ALL_SOUNDS_OFF {
            for slot in self.sys_effects.iter_mut().chain(self.ins_effects.iter_mut()) {
                slot.cleanup();
            }
        }
    }

    /// Whether completed NRPN messages are acted on.
    pub fn nrpn_receive(&self) -> bool {
        self.nrpn.receive()
    }

    /// Enable or disable NRPN handling.
    pub fn set_nrpn_receive(&mut self, receive: bool) {
        self.nrpn.set_receive(receive);
    }

    // ---- parts ----

    /// Part `index`.
    pub fn part(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    /// Part `index`, mutable.
    pub fn part_mut(&mut self, index: usize) -> Option<&mut Part> {
        self.parts.get_mut(index)
    }

    /// Enable or disable a part. Disabling silences it, and every insertion
    /// effect routed to it, at once.
    pub fn part_on_off(&mut self, index: usize, enabled: bool) {
        let Some(part) = self.parts.get_mut(index) else {
            return;
        };
        self.fake_peaks[index] = 0;
        part.set_enabled(enabled);
        if !enabled {
            part.cleanup();
            for (slot, route) in self.ins_effects.iter_mut().zip(self.ins_routes.iter()) {
                if *route == RoutingTarget::Part(index) {
                    slot.cleanup();
                }
            }
        }
    }

    // ---- master controls ----

    /// Master volume control value.
    pub fn master_volume_par(&self) -> u8 {
        self.volume_par
    }

    /// Master linear gain.
    pub fn master_volume(&self) -> f32 {
        self.volume
    }

    /// Set the master volume (0..=127, 96 is unity).
    pub fn set_master_volume(&mut self, value: u8) {
        self.volume_par = value.min(127);
        self.volume = volume_gain(self.volume_par);
    }

    /// Key shift control value.
    pub fn key_shift_par(&self) -> u8 {
        self.key_shift_par
    }

    /// Transposition in semitones applied to new notes.
    pub fn key_shift(&self) -> i32 {
        i32::from(self.key_shift_par) - i32::from(KEY_SHIFT_CENTER)
    }

    /// Set the key shift control (0..=127, 64 is no shift).
    pub fn set_key_shift(&mut self, value: u8) {
        self.key_shift_par = value.min(127);
    }

    /// Whether the output channels are swapped.
    pub fn swap_lr(&self) -> bool {
        self.swap_lr
    }

    /// Swap the output channels.
    pub fn set_swap_lr(&mut self, swap: bool) {
        self.swap_lr = swap;
    }

    /// Fade the next rendered block out and then clear every part and effect.
    pub fn shut_up(&mut self) {
        self.shutup = true;
    }

    /// True while a shut-up is pending.
    pub fn is_shutting_up(&self) -> bool {
        self.shutup
    }

    /// Note activity per part, for meters of disabled parts.
    pub fn fake_peaks(&self) -> &[u8; NUM_MIDI_PARTS] {
        &self.fake_peaks
    }

    // ---- effects ----

    /// System effect slot `index`.
    pub fn sys_effect(&self, index: usize) -> Option<&EffectSlot> {
        self.sys_effects.get(index)
    }

    /// System effect slot `index`, mutable.
    pub fn sys_effect_mut(&mut self, index: usize) -> Option<&mut EffectSlot> {
        self.sys_effects.get_mut(index)
    }

    /// Insertion effect slot `index`.
    pub fn ins_effect(&self, index: usize) -> Option<&EffectSlot> {
        self.ins_effects.get(index)
    }

    /// Insertion effect slot `index`, mutable.
    pub fn ins_effect_mut(&mut self, index: usize) -> Option<&mut EffectSlot> {
        self.ins_effects.get_mut(index)
    }

    /// Where insertion effect `index` is wired.
    pub fn insertion_route(&self, index: usize) -> RoutingTarget {
        self.ins_routes
            .get(index)
            .copied()
            .unwrap_or(RoutingTarget::None)
    }

    /// Rewire insertion effect `index`. The effect is cleaned so no tail
    /// from the old position leaks into the new one.
    pub fn set_insertion_route(&mut self, index: usize, target: RoutingTarget) {
        let target = match target {
            RoutingTarget::Part(n) if n >= NUM_MIDI_PARTS => RoutingTarget::None,
            t => t,
        };
        if let Some(route) = self.ins_routes.get_mut(index)
            && *route != target
        {
            *route = target;
            self.ins_effects[index].cleanup();
        }
    }

    /// Send control from `part` into system effect `effect`.
    pub fn part_send(&self, effect: usize, part: usize) -> u8 {
        self.part_sends
            .get(effect)
            .and_then(|row| row.get(part))
            .map_or(0, |s| s.value)
    }

    /// Set the send from `part` into system effect `effect` (0..=127).
    pub fn set_part_send(&mut self, effect: usize, part: usize, value: u8) {
        if let Some(send) = self
            .part_sends
            .get_mut(effect)
            .and_then(|row| row.get_mut(part))
        {
            *send = SendLevel::new(value);
        }
    }

    /// Send control from system effect `from` into system effect `to`.
    pub fn effect_send(&self, from: usize, to: usize) -> u8 {
        self.effect_sends
            .get(from)
            .and_then(|row| row.get(to))
            .map_or(0, |s| s.value)
    }

    /// Set the send from system effect `from` into `to` (0..=127).
    ///
    /// Effects only feed higher-indexed effects; other pairs are ignored.
    pub fn set_effect_send(&mut self, from: usize, to: usize, value: u8) {
        if from >= to || to >= NUM_SYS_EFX {
            tracing::debug!(from, to, "ignoring backward or self effect send");
            return;
        }
        self.effect_sends[from][to] = SendLevel::new(value);
    }

    // ---- rendering ----

    /// Produce one block into `out_l` / `out_r`.
    ///
    /// Both buffers must be exactly [`block_size`](Self::block_size) long;
    /// otherwise they are zero-filled and nothing else happens.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32], vu: &Mutex<VuMeter>) {
        let n = self.block_size;
        if out_l.len() != n || out_r.len() != n {
            tracing::warn!(
                expected = n,
                left = out_l.len(),
                right = out_r.len(),
                "render buffer length mismatch, emitting silence"
            );
            out_l.fill(0.0);
            out_r.fill(0.0);
            return;
        }

        let (out_l, out_r) = if self.swap_lr {
            (out_r, out_l)
        } else {
            (out_l, out_r)
        };
        out_l.fill(0.0);
        out_r.fill(0.0);

        for part in self.parts.iter_mut().filter(|p| p.is_enabled()) {
            part.compute();
        }

        for (slot, route) in self.ins_effects.iter_mut().zip(self.ins_routes.iter()) {
            if let RoutingTarget::Part(index) = *route {
                let part = &mut self.parts[index];
                if part.is_enabled() {
                    let (l, r) = part.buffers_mut();
                    slot.out(l, r);
                }
            }
        }

        for part in self.parts.iter_mut().filter(|p| p.is_enabled()) {
            apply_part_gains(part);
        }

        self.mix_system_effects(out_l, out_r);

        for part in self.parts.iter().filter(|p| p.is_enabled()) {
            add_into(out_l, part.output_l());
            add_into(out_r, part.output_r());
        }

        for (slot, route) in self.ins_effects.iter_mut().zip(self.ins_routes.iter()) {
            if *route == RoutingTarget::Master {
                slot.out(out_l, out_r);
            }
        }

        let volume = self.volume;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            *l *= volume;
            *r *= volume;
        }

        if let Some(mut meter) = vu.try_lock() {
            if self.vu_reset_pending {
                meter.reset_peaks();
                self.vu_reset_pending = false;
            }
            let parts = self.parts.iter().map(|p| PartLevel {
                enabled: p.is_enabled(),
                out_l: p.output_l(),
                out_r: p.output_r(),
            });
            meter.update(out_l, out_r, parts, volume, &mut self.fake_peaks);
        }

        if self.shutup {
            for i in 0..n {
                let fade = (n - i) as f32 / n as f32;
                out_l[i] *= fade;
                out_r[i] *= fade;
            }
            self.shut_up_now(vu);
        }
    }

    fn mix_system_effects(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let Self {
            parts,
            sys_effects,
            part_sends,
            effect_sends,
            tmp_l,
            tmp_r,
            ..
        } = self;

        for nefx in 0..NUM_SYS_EFX {
            let (lower, rest) = sys_effects.split_at_mut(nefx);
            let slot = &mut rest[0];
            if !slot.is_active() {
                continue;
            }

            tmp_l.fill(0.0);
            tmp_r.fill(0.0);

            for (part, send) in parts.iter().zip(part_sends[nefx].iter()) {
                if send.value == 0 || !part.is_enabled() {
                    continue;
                }
                add_scaled(tmp_l, part.output_l(), send.gain);
                add_scaled(tmp_r, part.output_r(), send.gain);
            }

            for (from, source) in lower.iter().enumerate() {
                let send = effect_sends[from][nefx];
                if send.value == 0 {
                    continue;
                }
                add_scaled(tmp_l, source.output_l(), send.gain);
                add_scaled(tmp_r, source.output_r(), send.gain);
            }

            slot.out(tmp_l, tmp_r);

            let out_volume = slot.out_volume();
            add_scaled(out_l, tmp_l, out_volume);
            add_scaled(out_r, tmp_r, out_volume);
        }
    }

    /// Clear every part and effect immediately.
    fn shut_up_now(&mut self, vu: &Mutex<VuMeter>) {
        for part in self.parts.iter_mut() {
            part.cleanup();
        }
        self.fake_peaks = [0; NUM_MIDI_PARTS];
        for slot in self.ins_effects.iter_mut().chain(self.sys_effects.iter_mut()) {
            slot.cleanup();
        }
        match vu.try_lock() {
            Some(mut meter) => meter.reset_peaks(),
            None => self.vu_reset_pending = true,
        }
        self.shutup = false;
    }
}

fn default_channel(part: usize) -> u8 {
    (part % usize::from(NUM_MIDI_CHANNELS)) as u8
}

/// Apply volume and panning to a part block, ramping from the previous
/// block's gains when the change is audible.
fn apply_part_gains(part: &mut Part) {
    let (old_l, old_r) = part.previous_gains();
    let (new_l, new_r) = part.target_gains();
    let ramp = above_amplitude_threshold(old_l, new_l) || above_amplitude_threshold(old_r, new_r);

    let (l, r) = part.buffers_mut();
    let len = l.len();
    if ramp {
        for (i, (sl, sr)) in l.iter_mut().zip(r.iter_mut()).enumerate() {
            *sl *= interpolate_amplitude(old_l, new_l, i, len);
            *sr *= interpolate_amplitude(old_r, new_r, i, len);
        }
        part.set_previous_gains((new_l, new_r));
    } else {
        for (sl, sr) in l.iter_mut().zip(r.iter_mut()) {
            *sl *= new_l;
            *sr *= new_r;
        }
    }
}

fn add_into(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

fn add_scaled(dst: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s * gain;
    }
}

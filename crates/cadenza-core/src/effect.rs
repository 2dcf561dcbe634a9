//! The effect-module contract.
//!
//! Every effect the mixer hosts implements [`Effect`]. Effects are stereo and
//! block-based: [`Effect::out`] reads a pair of input blocks and writes into
//! buffers the effect owns, which the host then reads back through
//! [`Effect::output_l`] / [`Effect::output_r`]. Parameters are addressed by a
//! small integer index and take 7-bit values, so any effect can be driven
//! from MIDI controllers, presets or a persisted parameter tree without
//! knowing its concrete type.
//!
//! Index 0 is always the effect's volume, and presets are applied by fanning
//! out to [`Effect::change_par`].

/// Where an effect sits in the mix. Fixed at construction because the volume
/// law depends on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectRole {
    /// In series with one part or the master; mixes wet into dry itself.
    #[default]
    Insertion,
    /// Fed by sends; its wet output is returned to the master in parallel.
    System,
}

/// Stereo block effect driven by 7-bit parameters.
///
/// All methods are real-time safe; none allocate after construction.
pub trait Effect {
    /// Display name of the effect type.
    fn name(&self) -> &'static str;

    /// Process one block. Output lands in the effect's own buffers.
    ///
    /// Only `min(in_l.len(), in_r.len(), block_size)` samples are processed;
    /// the rest of the output buffers is zeroed.
    fn out(&mut self, in_l: &[f32], in_r: &[f32]);

    /// Left output of the last [`out`](Self::out) call.
    fn output_l(&self) -> &[f32];

    /// Right output of the last [`out`](Self::out) call.
    fn output_r(&self) -> &[f32];

    /// Set parameter `index` to `value` (0..=127). Unknown indices are ignored.
    fn change_par(&mut self, index: usize, value: u8);

    /// Current value of parameter `index`, or 0 for unknown indices.
    fn get_par(&self, index: usize) -> u8;

    /// Number of addressable parameters.
    fn param_count(&self) -> usize;

    /// Name of parameter `index`.
    fn param_name(&self, _index: usize) -> Option<&'static str> {
        None
    }

    /// Zero all internal state (delay lines, filter histories).
    fn cleanup(&mut self);

    /// Set the volume control (parameter 0).
    fn set_volume(&mut self, value: u8) {
        self.change_par(0, value);
    }

    /// Wet gain the host applies to the effect output.
    fn volume(&self) -> f32;

    /// Gain applied when a system effect's output returns to the master.
    fn out_volume(&self) -> f32;

    /// Number of built-in presets.
    fn preset_count(&self) -> usize;

    /// Name of preset `index`.
    fn preset_name(&self, _index: usize) -> Option<&'static str> {
        None
    }

    /// Apply a preset. Indices past the table are clamped to the last entry.
    fn set_preset(&mut self, index: usize);

    /// Index of the last applied preset.
    fn preset(&self) -> usize;
}

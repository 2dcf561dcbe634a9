//! Effect slots: an effect plus the role-dependent wet/dry mixing around it.
//!
//! The mixer never talks to an [`Effect`] directly. A slot owns the effect,
//! knows whether it is an insertion or a system effect, and applies the
//! matching output law:
//!
//! - **Insertion**: the block is replaced in place by
//!   `dry * v1 + wet * v2`, where the effect volume `v` crossfades
//!   (`v < 0.5`: `v1 = 1`, `v2 = 2v`; otherwise `v1 = 2(1 - v)`, `v2 = 1`).
//!   Echo's wet curve is squared.
//! - **System**: the wet output is scaled by `2 * volume` and replaces the
//!   input block; the mixer then adds it to the master at
//!   [`out_volume`](EffectSlot::out_volume).
//!
//! An empty slot leaves insertion blocks untouched and silences system
//! blocks.

use cadenza_core::{Echo, Effect, EffectRole};

/// Effect types a slot can host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Empty slot
    #[default]
    None,
    /// [`Echo`]
    Echo,
}

impl EffectKind {
    /// All kinds, by index.
    pub const ALL: [EffectKind; 2] = [EffectKind::None, EffectKind::Echo];

    /// Kind for a control index; unknown indices give [`EffectKind::None`].
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(EffectKind::None)
    }

    /// Control index of this kind.
    pub fn index(self) -> usize {
        match self {
            EffectKind::None => 0,
            EffectKind::Echo => 1,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::None => "None",
            EffectKind::Echo => "Echo",
        }
    }

    /// Whether the insertion wet gain is squared (non-linear wet curve).
    fn squared_wet(self) -> bool {
        matches!(self, EffectKind::Echo)
    }
}

/// One insertion or system effect slot.
pub struct EffectSlot {
    role: EffectRole,
    sample_rate: f32,
    block_size: usize,
    kind: EffectKind,
    effect: Option<Box<dyn Effect + Send>>,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
}

impl core::fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EffectSlot")
            .field("role", &self.role)
            .field("kind", &self.kind)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

impl EffectSlot {
    /// An empty slot in `role`.
    pub fn new(role: EffectRole, sample_rate: f32, block_size: usize) -> Self {
        Self {
            role,
            sample_rate,
            block_size,
            kind: EffectKind::None,
            effect: None,
            out_l: vec![0.0; block_size],
            out_r: vec![0.0; block_size],
        }
    }

    /// Host a hand-built effect, for exercising the mixer with probes.
    #[cfg(test)]
    pub(crate) fn with_effect(
        role: EffectRole,
        block_size: usize,
        effect: Box<dyn Effect + Send>,
    ) -> Self {
        let mut slot = Self::new(role, 44100.0, block_size);
        slot.effect = Some(effect);
        slot
    }

    /// Role fixed at construction.
    pub fn role(&self) -> EffectRole {
        self.role
    }

    /// Hosted effect type.
    pub fn effect_kind(&self) -> EffectKind {
        self.kind
    }

    /// True when the slot hosts an effect.
    pub fn is_active(&self) -> bool {
        self.effect.is_some()
    }

    /// Hosted effect, if any.
    pub fn effect(&self) -> Option<&(dyn Effect + Send)> {
        self.effect.as_deref()
    }

    /// Replace the hosted effect. Allocates; call from the control path.
    pub fn change_effect(&mut self, kind: EffectKind) {
        if kind == self.kind && (self.effect.is_some() || kind == EffectKind::None) {
            return;
        }
        self.kind = kind;
        self.effect = match kind {
            EffectKind::None => None,
            EffectKind::Echo => Some(Box::new(Echo::new(
                self.role,
                self.sample_rate,
                self.block_size,
            ))),
        };
        self.out_l.fill(0.0);
        self.out_r.fill(0.0);
        tracing::debug!(role = ?self.role, effect = kind.name(), "effect changed");
    }

    /// Set effect parameter `index`. Ignored on an empty slot.
    pub fn change_par(&mut self, index: usize, value: u8) {
        if let Some(effect) = self.effect.as_mut() {
            effect.change_par(index, value);
        }
    }

    /// Effect parameter `index`, or 0 on an empty slot or unknown index.
    pub fn get_par(&self, index: usize) -> u8 {
        self.effect.as_ref().map_or(0, |e| e.get_par(index))
    }

    /// Number of parameters of the hosted effect.
    pub fn param_count(&self) -> usize {
        self.effect.as_ref().map_or(0, |e| e.param_count())
    }

    /// Set the effect volume (parameter 0).
    pub fn set_volume(&mut self, value: u8) {
        if let Some(effect) = self.effect.as_mut() {
            effect.set_volume(value);
        }
    }

    /// Apply a preset of the hosted effect (clamped to its table).
    pub fn set_preset(&mut self, index: usize) {
        if let Some(effect) = self.effect.as_mut() {
            effect.set_preset(index);
        }
    }

    /// Last applied preset.
    pub fn preset(&self) -> usize {
        self.effect.as_ref().map_or(0, |e| e.preset())
    }

    /// Gain for returning a system effect's output to the master.
    pub fn out_volume(&self) -> f32 {
        self.effect.as_ref().map_or(1.0, |e| e.out_volume())
    }

    /// Zero the effect state and the output buffers.
    pub fn cleanup(&mut self) {
        if let Some(effect) = self.effect.as_mut() {
            effect.cleanup();
        }
        self.out_l.fill(0.0);
        self.out_r.fill(0.0);
    }

    /// Output of the last [`out`](Self::out), after the role's output law.
    pub fn output_l(&self) -> &[f32] {
        &self.out_l
    }

    /// Right output of the last [`out`](Self::out).
    pub fn output_r(&self) -> &[f32] {
        &self.out_r
    }

    /// Process a block in place according to the slot role.
    pub fn out(&mut self, smps_l: &mut [f32], smps_r: &mut [f32]) {
        let n = smps_l.len().min(smps_r.len()).min(self.block_size);
        let Some(effect) = self.effect.as_mut() else {
            if self.role == EffectRole::System {
                smps_l[..n].fill(0.0);
                smps_r[..n].fill(0.0);
                self.out_l.fill(0.0);
                self.out_r.fill(0.0);
            }
            return;
        };

        effect.out(&smps_l[..n], &smps_r[..n]);
        self.out_l[..n].copy_from_slice(&effect.output_l()[..n]);
        self.out_r[..n].copy_from_slice(&effect.output_r()[..n]);
        self.out_l[n..].fill(0.0);
        self.out_r[n..].fill(0.0);
        let volume = effect.volume();

        match self.role {
            EffectRole::Insertion => {
                let (v1, mut v2) = if volume < 0.5 {
                    (1.0, volume * 2.0)
                } else {
                    ((1.0 - volume) * 2.0, 1.0)
                };
                if self.kind.squared_wet() {
                    v2 *= v2;
                }
                for i in 0..n {
                    smps_l[i] = smps_l[i] * v1 + self.out_l[i] * v2;
                    smps_r[i] = smps_r[i] * v1 + self.out_r[i] * v2;
                }
            }
            EffectRole::System => {
                let gain = 2.0 * volume;
                for i in 0..n {
                    self.out_l[i] *= gain;
                    self.out_r[i] *= gain;
                }
                smps_l[..n].copy_from_slice(&self.out_l[..n]);
                smps_r[..n].copy_from_slice(&self.out_r[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 64;

    #[test]
    fn test_kind_index_roundtrip_and_fallback() {
        for kind in EffectKind::ALL {
            assert_eq!(EffectKind::from_index(kind.index()), kind);
        }
        assert_eq!(EffectKind::from_index(99), EffectKind::None);
    }

    #[test]
    fn test_empty_insertion_passes_through() {
        let mut slot = EffectSlot::new(EffectRole::Insertion, 44100.0, BLOCK);
        let mut l = [0.5f32; BLOCK];
        let mut r = [-0.5f32; BLOCK];
        slot.out(&mut l, &mut r);
        assert!(l.iter().all(|s| *s == 0.5));
        assert!(r.iter().all(|s| *s == -0.5));
        assert_eq!(slot.get_par(0), 0);
        assert_eq!(slot.out_volume(), 1.0);
    }

    #[test]
    fn test_empty_system_silences() {
        let mut slot = EffectSlot::new(EffectRole::System, 44100.0, BLOCK);
        let mut l = [0.5f32; BLOCK];
        let mut r = [0.5f32; BLOCK];
        slot.out(&mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn test_change_effect_uses_slot_role() {
        let mut slot = EffectSlot::new(EffectRole::System, 44100.0, BLOCK);
        slot.change_effect(EffectKind::Echo);
        assert!(slot.is_active());
        assert_eq!(slot.effect_kind(), EffectKind::Echo);
        assert_eq!(slot.param_count(), 7);
        slot.set_volume(127);
        // System role: out volume 0.01^0 * 4
        assert!((slot.out_volume() - 4.0).abs() < 1e-5);

        slot.change_effect(EffectKind::None);
        assert!(!slot.is_active());
        assert_eq!(slot.param_count(), 0);
    }

    #[test]
    fn test_insertion_volume_zero_is_dry() {
        let mut slot = EffectSlot::new(EffectRole::Insertion, 44100.0, BLOCK);
        slot.change_effect(EffectKind::Echo);
        slot.set_volume(0);
        let mut l = [0.3f32; BLOCK];
        let mut r = [0.3f32; BLOCK];
        slot.out(&mut l, &mut r);
        assert!(l.iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_system_output_replaces_input() {
        let mut slot = EffectSlot::new(EffectRole::System, 44100.0, BLOCK);
        slot.change_effect(EffectKind::Echo);
        let mut l = [0.3f32; BLOCK];
        let mut r = [0.3f32; BLOCK];
        slot.out(&mut l, &mut r);
        assert_eq!(&l[..], slot.output_l());
        assert_eq!(&r[..], slot.output_r());
    }

    #[test]
    fn test_cleanup_zeroes_outputs() {
        let mut slot = EffectSlot::new(EffectRole::System, 44100.0, BLOCK);
        slot.change_effect(EffectKind::Echo);
        slot.set_preset(3);
        let mut l = [1.0f32; BLOCK];
        let mut r = [1.0f32; BLOCK];
        slot.out(&mut l, &mut r);
        slot.cleanup();
        assert!(slot.output_l().iter().all(|s| *s == 0.0));
    }
}

//! Flat parameter tree for persistence.
//!
//! Every control the mix graph owns is reachable through a stable dotted
//! key and an integer value:
//!
//! | Key | Range |
//! |-----|-------|
//! | `master.volume`, `master.key_shift` | 0..=127 |
//! | `master.nrpn_receive`, `master.swap_lr` | 0 or 1 |
//! | `part.N.enabled`, `part.N.legato` | 0 or 1 |
//! | `part.N.channel` | 0..=15 |
//! | `part.N.volume`, `part.N.panning` | 0..=127 |
//! | `part.N.filter.type` | 0..=8 |
//! | `part.N.filter.cutoff`, `part.N.filter.q` | 0..=127 |
//! | `part.N.filter.stages` | 0..=5 |
//! | `sysefx.N.type`, `insefx.N.type` | 0 (none), 1 (echo) |
//! | `sysefx.N.preset`, `insefx.N.preset` | preset index |
//! | `sysefx.N.par.K`, `insefx.N.par.K` | 0..=127 |
//! | `sysefx.N.part.P` | send from part P, 0..=127 |
//! | `sysefx.N.send.M` | send to system effect M > N, 0..=127 |
//! | `insefx.N.route` | -2 master, -1 none, 0..=15 part |
//!
//! 7-bit controls are clamped; enumerated values outside their set are
//! rejected with [`EngineError::InvalidValue`].

use std::collections::BTreeMap;
use std::path::Path;

use cadenza_core::{FilterType, MAX_FILTER_STAGES};
use serde::{Deserialize, Serialize};

use crate::effect_slot::{EffectKind, EffectSlot};
use crate::error::{EngineError, Result};
use crate::mix_graph::{MixGraph, NUM_INS_EFX, NUM_MIDI_PARTS, NUM_SYS_EFX, RoutingTarget};

/// Key → value map of mix graph controls.
///
/// Serialises to TOML as a flat table of quoted dotted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTree {
    values: BTreeMap<String, i32>,
}

impl ParamTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }

    /// Store `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: i32) {
        self.values.insert(key.into(), value);
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a tree from TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialise to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a tree from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Save the tree to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| EngineError::write_file(path, e))?;
        Ok(())
    }
}

/// A parsed parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    MasterVolume,
    MasterKeyShift,
    MasterNrpnReceive,
    MasterSwapLr,
    PartEnabled(usize),
    PartChannel(usize),
    PartVolume(usize),
    PartPanning(usize),
    PartLegato(usize),
    PartFilterType(usize),
    PartFilterCutoff(usize),
    PartFilterQ(usize),
    PartFilterStages(usize),
    Effect(EffectAddr, EffectKey),
    SysPartSend(usize, usize),
    SysEffectSend(usize, usize),
    InsRoute(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectAddr {
    System(usize),
    Insertion(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectKey {
    Type,
    Preset,
    Par(usize),
}

fn index(s: &str, limit: usize) -> Option<usize> {
    s.parse::<usize>().ok().filter(|n| *n < limit)
}

impl Key {
    fn parse(key: &str) -> Option<Key> {
        let parts: Vec<&str> = key.split('.').collect();
        let key = match parts.as_slice() {
            ["master", "volume"] => Key::MasterVolume,
            ["master", "key_shift"] => Key::MasterKeyShift,
            ["master", "nrpn_receive"] => Key::MasterNrpnReceive,
            ["master", "swap_lr"] => Key::MasterSwapLr,
            ["part", n, rest @ ..] => {
                let n = index(n, NUM_MIDI_PARTS)?;
                match rest {
                    ["enabled"] => Key::PartEnabled(n),
                    ["channel"] => Key::PartChannel(n),
                    ["volume"] => Key::PartVolume(n),
                    ["panning"] => Key::PartPanning(n),
                    ["legato"] => Key::PartLegato(n),
                    ["filter", "type"] => Key::PartFilterType(n),
                    ["filter", "cutoff"] => Key::PartFilterCutoff(n),
                    ["filter", "q"] => Key::PartFilterQ(n),
                    ["filter", "stages"] => Key::PartFilterStages(n),
                    _ => return None,
                }
            }
            ["sysefx", n, rest @ ..] => {
                let n = index(n, NUM_SYS_EFX)?;
                match rest {
                    ["part", p] => Key::SysPartSend(n, index(p, NUM_MIDI_PARTS)?),
                    ["send", m] => {
                        let m = index(m, NUM_SYS_EFX)?;
                        if m <= n {
                            return None;
                        }
                        Key::SysEffectSend(n, m)
                    }
                    _ => Key::Effect(EffectAddr::System(n), EffectKey::parse(rest)?),
                }
            }
            ["insefx", n, rest @ ..] => {
                let n = index(n, NUM_INS_EFX)?;
                match rest {
                    ["route"] => Key::InsRoute(n),
                    _ => Key::Effect(EffectAddr::Insertion(n), EffectKey::parse(rest)?),
                }
            }
            _ => return None,
        };
        Some(key)
    }
}

impl EffectKey {
    fn parse(rest: &[&str]) -> Option<EffectKey> {
        match rest {
            ["type"] => Some(EffectKey::Type),
            ["preset"] => Some(EffectKey::Preset),
            ["par", k] => k.parse().ok().map(EffectKey::Par),
            _ => None,
        }
    }

    /// Application order: type replaces the effect, a preset overwrites the
    /// parameters, so both must come before individual parameters.
    fn phase(self) -> u8 {
        match self {
            EffectKey::Type => 0,
            EffectKey::Preset => 1,
            EffectKey::Par(_) => 2,
        }
    }
}

fn control(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

fn flag(key: &str, value: i32) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(EngineError::invalid_value(key, value)),
    }
}

fn bounded(key: &str, value: i32, max: usize) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| EngineError::invalid_value(key, value))
}

impl MixGraph {
    fn slot(&self, addr: EffectAddr) -> &EffectSlot {
        match addr {
            EffectAddr::System(n) => &self.sys_effects[n],
            EffectAddr::Insertion(n) => &self.ins_effects[n],
        }
    }

    fn slot_mut(&mut self, addr: EffectAddr) -> &mut EffectSlot {
        match addr {
            EffectAddr::System(n) => &mut self.sys_effects[n],
            EffectAddr::Insertion(n) => &mut self.ins_effects[n],
        }
    }

    fn part_ref(&self, n: usize) -> &cadenza_synth::Part {
        &self.parts[n]
    }

    fn part_at(&mut self, n: usize) -> &mut cadenza_synth::Part {
        &mut self.parts[n]
    }

    /// Value of the control at `key`.
    pub fn param(&self, key: &str) -> Result<i32> {
        let parsed = Key::parse(key).ok_or_else(|| EngineError::UnknownParam(key.to_string()))?;
        let value = match parsed {
            Key::MasterVolume => i32::from(self.master_volume_par()),
            Key::MasterKeyShift => i32::from(self.key_shift_par()),
            Key::MasterNrpnReceive => i32::from(self.nrpn_receive()),
            Key::MasterSwapLr => i32::from(self.swap_lr()),
            Key::PartEnabled(n) => i32::from(self.part_ref(n).is_enabled()),
            Key::PartChannel(n) => i32::from(self.part_ref(n).channel()),
            Key::PartVolume(n) => i32::from(self.part_ref(n).volume_par()),
            Key::PartPanning(n) => i32::from(self.part_ref(n).panning_par()),
            Key::PartLegato(n) => i32::from(self.part_ref(n).is_legato()),
            Key::PartFilterType(n) => i32::from(self.part_ref(n).filter_type().index()),
            Key::PartFilterCutoff(n) => i32::from(self.part_ref(n).filter_cutoff()),
            Key::PartFilterQ(n) => i32::from(self.part_ref(n).filter_q()),
            Key::PartFilterStages(n) => self.part_ref(n).filter_stages() as i32,
            Key::Effect(addr, EffectKey::Type) => self.slot(addr).effect_kind().index() as i32,
            Key::Effect(addr, EffectKey::Preset) => self.slot(addr).preset() as i32,
            Key::Effect(addr, EffectKey::Par(k)) => i32::from(self.slot(addr).get_par(k)),
            Key::SysPartSend(n, p) => i32::from(self.part_send(n, p)),
            Key::SysEffectSend(n, m) => i32::from(self.effect_send(n, m)),
            Key::InsRoute(n) => self.insertion_route(n).to_raw(),
        };
        Ok(value)
    }

    /// Set the control at `key`.
    pub fn set_param(&mut self, key: &str, value: i32) -> Result<()> {
        let parsed = Key::parse(key).ok_or_else(|| EngineError::UnknownParam(key.to_string()))?;
        match parsed {
            Key::MasterVolume => self.set_master_volume(control(value)),
            Key::MasterKeyShift => self.set_key_shift(control(value)),
            Key::MasterNrpnReceive => self.set_nrpn_receive(flag(key, value)?),
            Key::MasterSwapLr => self.set_swap_lr(flag(key, value)?),
            Key::PartEnabled(n) => {
                let enabled = flag(key, value)?;
                self.part_on_off(n, enabled);
            }
            Key::PartChannel(n) => {
                let channel = bounded(key, value, 15)?;
                self.part_at(n).set_channel(channel as u8);
            }
            Key::PartVolume(n) => self.part_at(n).set_volume(control(value)),
            Key::PartPanning(n) => self.part_at(n).set_panning(control(value)),
            Key::PartLegato(n) => {
                let legato = flag(key, value)?;
                self.part_at(n).set_legato(legato);
            }
            Key::PartFilterType(n) => {
                let index = bounded(key, value, FilterType::ALL.len() - 1)?;
                self.part_at(n)
                    .set_filter_type(FilterType::from_index(index as u8));
            }
            Key::PartFilterCutoff(n) => self.part_at(n).set_filter_cutoff(control(value)),
            Key::PartFilterQ(n) => self.part_at(n).set_filter_q(control(value)),
            Key::PartFilterStages(n) => {
                let stages = bounded(key, value, MAX_FILTER_STAGES)?;
                self.part_at(n).set_filter_stages(stages);
            }
            Key::Effect(addr, EffectKey::Type) => {
                let index = bounded(key, value, EffectKind::ALL.len() - 1)?;
                self.slot_mut(addr)
                    .change_effect(EffectKind::from_index(index));
            }
            Key::Effect(addr, EffectKey::Preset) => {
                let preset = usize::try_from(value).unwrap_or(0);
                self.slot_mut(addr).set_preset(preset);
            }
            Key::Effect(addr, EffectKey::Par(k)) => {
                self.slot_mut(addr).change_par(k, control(value));
            }
            Key::SysPartSend(n, p) => self.set_part_send(n, p, control(value)),
            Key::SysEffectSend(n, m) => self.set_effect_send(n, m, control(value)),
            Key::InsRoute(n) => {
                if !(-2..NUM_MIDI_PARTS as i32).contains(&value) {
                    return Err(EngineError::invalid_value(key, value));
                }
                self.set_insertion_route(n, RoutingTarget::from_raw(value));
            }
        }
        Ok(())
    }

    /// Every control as a parameter tree.
    pub fn snapshot(&self) -> ParamTree {
        let mut keys = vec![
            "master.volume".to_string(),
            "master.key_shift".to_string(),
            "master.nrpn_receive".to_string(),
            "master.swap_lr".to_string(),
        ];
        for n in 0..NUM_MIDI_PARTS {
            for field in [
                "enabled",
                "channel",
                "volume",
                "panning",
                "legato",
                "filter.type",
                "filter.cutoff",
                "filter.q",
                "filter.stages",
            ] {
                keys.push(format!("part.{n}.{field}"));
            }
        }
        for n in 0..NUM_SYS_EFX {
            effect_keys(&mut keys, "sysefx", n, self.slot(EffectAddr::System(n)));
            keys.extend((0..NUM_MIDI_PARTS).map(|p| format!("sysefx.{n}.part.{p}")));
            keys.extend((n + 1..NUM_SYS_EFX).map(|m| format!("sysefx.{n}.send.{m}")));
        }
        for n in 0..NUM_INS_EFX {
            effect_keys(&mut keys, "insefx", n, self.slot(EffectAddr::Insertion(n)));
            keys.push(format!("insefx.{n}.route"));
        }

        let mut tree = ParamTree::new();
        for key in keys {
            if let Ok(value) = self.param(&key) {
                tree.insert(key, value);
            }
        }
        tree
    }

    /// Apply every entry of `tree`.
    ///
    /// Effect types are applied first, then presets, then everything else,
    /// so a tree taken by [`snapshot`](Self::snapshot) restores exactly.
    /// Stops at the first unknown key or invalid value.
    pub fn apply(&mut self, tree: &ParamTree) -> Result<()> {
        let phase = |key: &str| match Key::parse(key) {
            Some(Key::Effect(_, k)) => k.phase(),
            _ => 2,
        };
        let mut entries: Vec<(&str, i32)> = tree.iter().collect();
        entries.sort_by_key(|&(key, _)| phase(key));
        for (key, value) in entries {
            self.set_param(key, value)?;
        }
        tracing::debug!(entries = tree.len(), "applied parameter tree");
        Ok(())
    }
}

fn effect_keys(keys: &mut Vec<String>, prefix: &str, n: usize, slot: &EffectSlot) {
    keys.push(format!("{prefix}.{n}.type"));
    if slot.is_active() {
        keys.push(format!("{prefix}.{n}.preset"));
        keys.extend((0..slot.param_count()).map(|k| format!("{prefix}.{n}.par.{k}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> MixGraph {
        MixGraph::new(44100.0, 64)
    }

    #[test]
    fn test_master_keys() {
        let mut g = graph();
        g.set_param("master.volume", 100).unwrap();
        g.set_param("master.key_shift", 76).unwrap();
        assert_eq!(g.param("master.volume").unwrap(), 100);
        assert_eq!(g.key_shift(), 12);
    }

    #[test]
    fn test_controls_clamp() {
        let mut g = graph();
        g.set_param("part.2.volume", 300).unwrap();
        assert_eq!(g.param("part.2.volume").unwrap(), 127);
        g.set_param("part.2.panning", -5).unwrap();
        assert_eq!(g.param("part.2.panning").unwrap(), 0);
    }

    #[test]
    fn test_unknown_keys() {
        let g = graph();
        for key in [
            "master.tempo",
            "part.16.volume",
            "part.x.volume",
            "sysefx.4.type",
            "sysefx.2.send.1",
            "insefx.0.par",
            "",
        ] {
            assert!(
                matches!(g.param(key), Err(EngineError::UnknownParam(_))),
                "{key}"
            );
        }
    }

    #[test]
    fn test_invalid_enumerated_values() {
        let mut g = graph();
        assert!(g.set_param("part.0.enabled", 2).is_err());
        assert!(g.set_param("part.0.channel", 16).is_err());
        assert!(g.set_param("part.0.filter.type", 9).is_err());
        assert!(g.set_param("insefx.0.route", -3).is_err());
        assert!(g.set_param("sysefx.0.type", 5).is_err());
    }

    #[test]
    fn test_effect_keys() {
        let mut g = graph();
        g.set_param("insefx.1.type", 1).unwrap();
        g.set_param("insefx.1.preset", 4).unwrap();
        g.set_param("insefx.1.par.5", 20).unwrap();
        g.set_param("insefx.1.route", -2).unwrap();
        assert_eq!(g.ins_effect(1).unwrap().effect_kind(), EffectKind::Echo);
        assert_eq!(g.param("insefx.1.preset").unwrap(), 4);
        assert_eq!(g.param("insefx.1.par.5").unwrap(), 20);
        assert_eq!(g.insertion_route(1), RoutingTarget::Master);
        // Unknown parameter index reads 0
        assert_eq!(g.param("insefx.1.par.40").unwrap(), 0);
    }

    #[test]
    fn test_snapshot_lists_active_effect_params() {
        let mut g = graph();
        let before = g.snapshot().len();
        g.set_param("sysefx.0.type", 1).unwrap();
        let tree = g.snapshot();
        // preset + 7 parameters
        assert_eq!(tree.len(), before + 8);
        assert_eq!(tree.get("sysefx.0.par.2"), Some(i32::from(g.sys_effect(0).unwrap().get_par(2))));
        assert!(tree.get("sysefx.0.send.0").is_none());
        assert!(tree.get("sysefx.0.send.3").is_some());
    }

    #[test]
    fn test_apply_restores_snapshot() {
        let mut g = graph();
        g.set_param("sysefx.1.type", 1).unwrap();
        g.set_param("sysefx.1.preset", 6).unwrap();
        g.set_param("sysefx.1.par.0", 33).unwrap();
        g.set_param("sysefx.1.part.3", 70).unwrap();
        g.set_param("insefx.0.type", 1).unwrap();
        g.set_param("insefx.0.route", 3).unwrap();
        g.set_param("part.3.enabled", 1).unwrap();
        g.set_param("part.3.filter.stages", 2).unwrap();
        let tree = g.snapshot();

        let mut restored = graph();
        restored.apply(&tree).unwrap();
        assert_eq!(restored.snapshot(), tree);
        assert_eq!(restored.param("sysefx.1.par.0").unwrap(), 33);
    }
}

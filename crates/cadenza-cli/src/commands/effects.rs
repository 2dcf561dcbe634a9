//! Effect listing command.

#![allow(clippy::print_literal)]

use cadenza_core::EffectRole;
use cadenza_engine::{EffectKind, EffectSlot};
use clap::Args;

#[derive(Args)]
pub struct EffectsArgs {
    /// Show parameters and presets for one effect type
    #[arg(value_name = "EFFECT")]
    effect: Option<String>,
}

pub fn run(args: EffectsArgs) -> anyhow::Result<()> {
    let Some(name) = &args.effect else {
        println!("Available Effects");
        println!("=================");
        println!();
        for kind in EffectKind::ALL {
            println!("  {:2}  {}", kind.index(), kind.name());
        }
        println!();
        println!("Use 'cadenza effects <name>' for parameters and presets.");
        return Ok(());
    };

    let kind = EffectKind::ALL
        .into_iter()
        .find(|k| k.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow::anyhow!("Unknown effect: {}", name))?;

    let mut slot = EffectSlot::new(EffectRole::System, 44100.0, 256);
    slot.change_effect(kind);
    let Some(effect) = slot.effect() else {
        println!("{} has no parameters.", kind.name());
        return Ok(());
    };

    println!("{}", kind.name());
    println!("{}", "=".repeat(kind.name().len()));
    println!();
    println!("Parameters:");
    println!();
    println!("  {:5}  {:16}  {}", "Index", "Name", "Default");
    println!("  {:5}  {:16}  {}", "-----", "----", "-------");
    for i in 0..effect.param_count() {
        println!(
            "  {:5}  {:16}  {}",
            i,
            effect.param_name(i).unwrap_or("-"),
            effect.get_par(i)
        );
    }

    println!();
    println!("Presets:");
    println!();
    for p in 0..effect.preset_count() {
        println!("  {:2}  {}", p, effect.preset_name(p).unwrap_or("-"));
    }
    Ok(())
}

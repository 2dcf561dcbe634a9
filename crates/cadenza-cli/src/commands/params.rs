//! Parameter tree command.

use cadenza_engine::{EffectKind, MixGraph, ParamTree};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ParamsArgs {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load a tree from this file, validate it and print the merged result
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Put an echo in every effect slot so their parameters are listed
    #[arg(long)]
    with_effects: bool,
}

pub fn run(args: ParamsArgs) -> anyhow::Result<()> {
    let mut graph = MixGraph::new(44100.0, 256);

    if args.with_effects {
        for n in 0..cadenza_engine::NUM_SYS_EFX {
            if let Some(slot) = graph.sys_effect_mut(n) {
                slot.change_effect(EffectKind::Echo);
            }
        }
        for n in 0..cadenza_engine::NUM_INS_EFX {
            if let Some(slot) = graph.ins_effect_mut(n) {
                slot.change_effect(EffectKind::Echo);
            }
        }
    }

    if let Some(path) = &args.input {
        let tree = ParamTree::load(path)?;
        graph.apply(&tree)?;
    }

    let tree = graph.snapshot();
    match &args.output {
        Some(path) => {
            tree.save(path)?;
            println!("Wrote {} parameters to {}", tree.len(), path.display());
        }
        None => print!("{}", tree.to_toml()?),
    }
    Ok(())
}

//! Headless render command.
//!
//! Plays an arpeggio through the event queue while the dispatcher thread
//! feeds the mix graph, renders the requested duration block by block and
//! prints what the VU meter saw.

use cadenza_core::linear_to_db;
use cadenza_engine::{Dispatcher, EffectKind, Engine, EngineConfig, ParamTree};
use cadenza_synth::MidiEvent;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const ARPEGGIO: [u8; 4] = [60, 64, 67, 72];

#[derive(Args)]
pub struct RenderArgs {
    /// Seconds of audio to render
    #[arg(short, long, default_value = "2.0")]
    seconds: f32,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter tree to apply before rendering (TOML)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Write the final parameter tree here (TOML)
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// Override the configured sample rate
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Override the configured block size
    #[arg(long)]
    block_size: Option<usize>,

    /// Arpeggio tempo in beats per minute (sixteenth notes)
    #[arg(long, default_value = "120")]
    bpm: f32,

    /// MIDI channel the arpeggio plays on
    #[arg(long, default_value = "0")]
    channel: u8,

    /// Put an echo on system effect 0 and send part 0 to it
    #[arg(long)]
    echo: bool,
}

/// One arpeggio step: the note to release and the note to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    release: Option<u8>,
    play: u8,
}

/// Arpeggio steps starting inside `[start, start + len)`, in samples.
fn steps_in_block(start: u64, len: u64, step_samples: u64) -> impl Iterator<Item = Step> {
    let first = start.div_ceil(step_samples);
    let end = (start + len).div_ceil(step_samples);
    (first..end).map(|i| Step {
        release: i
            .checked_sub(1)
            .map(|prev| ARPEGGIO[(prev % ARPEGGIO.len() as u64) as usize]),
        play: ARPEGGIO[(i % ARPEGGIO.len() as u64) as usize],
    })
}

fn load_config(args: &RenderArgs) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(sample_rate) = args.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    config.validate()?;
    Ok(config)
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        anyhow::bail!("--seconds must be positive");
    }
    if !(args.bpm.is_finite() && args.bpm > 0.0) {
        anyhow::bail!("--bpm must be positive");
    }
    if args.channel > 15 {
        anyhow::bail!("--channel must be 0..=15");
    }

    let config = load_config(&args)?;
    let engine = Arc::new(Engine::new(config.clone())?);

    if let Some(path) = &args.params {
        let tree = ParamTree::load(path)?;
        engine.apply(&tree)?;
        println!("Applied {} parameters from {}", tree.len(), path.display());
    }
    if args.echo {
        engine.with_graph(|g| {
            if let Some(slot) = g.sys_effect_mut(0) {
                slot.change_effect(EffectKind::Echo);
            }
            g.set_part_send(0, 0, 80);
        });
    }

    let block = config.block_size as u64;
    let total_samples = (args.seconds * config.sample_rate_f32()) as u64;
    let blocks = total_samples.div_ceil(block);
    let step_samples = ((config.sample_rate_f32() * 15.0 / args.bpm) as u64).max(1);

    println!(
        "Rendering {:.2} s at {} Hz in {} blocks of {}",
        args.seconds, config.sample_rate, blocks, config.block_size
    );

    let mut dispatcher = Dispatcher::spawn(Arc::clone(&engine))?;
    let mut l = vec![0.0f32; config.block_size];
    let mut r = vec![0.0f32; config.block_size];
    let mut dropped = 0u64;
    let mut last_note = None;

    let started = Instant::now();
    for b in 0..blocks {
        for step in steps_in_block(b * block, block, step_samples) {
            if let Some(note) = step.release
                && engine.put_event(MidiEvent::note_off(args.channel, note)).is_err()
            {
                dropped += 1;
            }
            if engine
                .put_event(MidiEvent::note(args.channel, step.play, 100))
                .is_err()
            {
                dropped += 1;
            }
            last_note = Some(step.play);
        }
        engine.render_block(&mut l, &mut r);
    }
    let elapsed = started.elapsed();

    if let Some(note) = last_note {
        let _ = engine.put_event(MidiEvent::note_off(args.channel, note));
    }
    dispatcher.stop();
    engine.flush_events();

    let vu = engine.vu();
    let rendered = blocks as f64 * block as f64 / f64::from(config.sample_rate);
    let speed = rendered / elapsed.as_secs_f64().max(1e-9);

    println!();
    println!("Render time:  {:.1} ms ({speed:.1}x real time)", elapsed.as_secs_f64() * 1000.0);
    println!("Events:       {} dispatched, {dropped} dropped", dispatcher.dispatched());
    println!(
        "Peak L/R:     {:.1} / {:.1} dBFS",
        linear_to_db(vu.max_out_peak_l),
        linear_to_db(vu.max_out_peak_r)
    );
    println!(
        "RMS L/R:      {:.1} / {:.1} dBFS",
        linear_to_db(vu.rms_peak_l),
        linear_to_db(vu.rms_peak_r)
    );
    println!("Clipped:      {}", if vu.clipped { "yes" } else { "no" });

    if let Some(path) = &args.save_params {
        engine.snapshot().save(path)?;
        println!("Saved parameters to {}", path.display());
    }

    tracing::info!(blocks, dropped, "render finished");
    Ok(())
}

//! Integration tests for cadenza-synth.
//!
//! Covers the legato state machine over full cycles with arbitrary block
//! sizes, the audible/silent voice pair swapping inside a part, and channel
//! controllers driving the voices.

use cadenza_synth::{
    Legato, LegatoState, LegatoUpdate, NoteParams, Part, cc, note_to_frequency,
};
use proptest::prelude::*;

const SR: f32 = 44100.0;
const BLOCK: usize = 256;

fn params(note: u8) -> NoteParams {
    NoteParams::from_midi(note, 100, 0)
}

/// Run `legato` over unit blocks until `done` holds, collecting the gain it
/// applied per sample.
fn run_until(
    legato: &mut Legato,
    block: usize,
    max_blocks: usize,
    done: impl Fn(&Legato) -> bool,
) -> Vec<f32> {
    let mut gains = Vec::new();
    for _ in 0..max_blocks {
        let mut l = vec![1.0f32; block];
        let mut r = vec![1.0f32; block];
        legato.apply(&mut l, &mut r);
        gains.extend_from_slice(&l);
        if done(legato) {
            break;
        }
    }
    gains
}

// ---------------------------------------------------------------------------
// 1. Legato state machine
// ---------------------------------------------------------------------------

#[test]
fn full_cycle_returns_to_normal_with_unit_ramp() {
    let mut legato = Legato::new(params(60), SR, false);
    assert_eq!(legato.update(params(64), true), LegatoUpdate::Deferred);

    let mut visited = vec![legato.state()];
    for _ in 0..10 {
        let mut l = [1.0f32; BLOCK];
        let mut r = [1.0f32; BLOCK];
        legato.apply(&mut l, &mut r);
        if visited.last() != Some(&legato.state()) {
            visited.push(legato.state());
        }
    }
    assert_eq!(
        visited,
        vec![LegatoState::FadeOut, LegatoState::CatchUp, LegatoState::Normal]
    );
    assert_eq!(legato.ramp(), 1.0);
    assert!(legato.is_silent());
}

#[test]
fn fade_in_ends_at_exactly_one() {
    let mut legato = Legato::new(params(60), SR, true);
    legato.update(params(67), true);
    run_until(&mut legato, 100, 10, |l| l.state() == LegatoState::Normal);
    assert_eq!(legato.state(), LegatoState::Normal);
    assert_eq!(legato.ramp(), 1.0);
    assert!(!legato.is_silent());
}

#[test]
fn catch_up_then_real_target() {
    let mut legato = Legato::new(params(60), SR, false);
    legato.update(params(72), true);

    let mut retunes = Vec::new();
    for _ in 0..6 {
        let mut l = [1.0f32; BLOCK];
        let mut r = [1.0f32; BLOCK];
        if let Some(p) = legato.apply(&mut l, &mut r) {
            retunes.push(p.freq);
        }
    }
    let f60 = note_to_frequency(60);
    let f72 = note_to_frequency(72);
    assert_eq!(retunes.len(), 2);
    assert!((retunes[0] - f72 * (f72 / f60)).abs() < 1e-2);
    assert!((retunes[1] - f72).abs() < 1e-3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Gains fall strictly during a fade-out, whatever the block size.
    #[test]
    fn fade_out_monotonic(block in 1usize..512) {
        let mut legato = Legato::new(params(60), SR, false);
        legato.update(params(62), true);
        let gains = run_until(&mut legato, block, 2000, |l| l.state() != LegatoState::FadeOut);
        let fading: Vec<f32> = gains.iter().copied().take_while(|g| *g > 0.0).collect();
        prop_assert_eq!(fading.len(), legato.fade_len() - 1);
        for w in fading.windows(2) {
            prop_assert!(w[1] < w[0]);
        }
        prop_assert!(gains[fading.len()..].iter().all(|g| *g == 0.0));
    }

    /// Gains rise strictly during a fade-in, whatever the block size.
    #[test]
    fn fade_in_monotonic(block in 1usize..512) {
        let mut legato = Legato::new(params(60), SR, true);
        legato.update(params(62), true);
        let gains = run_until(&mut legato, block, 2000, |l| l.state() == LegatoState::Normal);
        let fading = &gains[..legato.fade_len() - 1];
        for w in fading.windows(2) {
            prop_assert!(w[1] > w[0]);
        }
        prop_assert!(fading.iter().all(|g| *g > 0.0 && *g < 1.0));
        prop_assert_eq!(legato.ramp(), 1.0);
    }

    /// Any block size completes the cycle at unit ramp in `Normal`.
    #[test]
    fn cycle_completes_for_any_block(block in 1usize..1024) {
        let mut legato = Legato::new(params(48), SR, false);
        legato.update(params(55), true);
        run_until(&mut legato, block, 4000, |l| l.state() == LegatoState::Normal);
        prop_assert_eq!(legato.state(), LegatoState::Normal);
        prop_assert_eq!(legato.ramp(), 1.0);
    }
}

// ---------------------------------------------------------------------------
// 2. Part legato pair
// ---------------------------------------------------------------------------

fn block_peak(part: &Part) -> f32 {
    part.output_l()
        .iter()
        .fold(0.0f32, |m, s| m.max(s.abs()))
}

#[test]
fn legato_pair_swaps_roles() {
    let mut part = Part::new(0, SR, BLOCK);
    part.set_enabled(true);
    part.set_legato(true);

    part.note_on(60, 100, 0);
    for _ in 0..4 {
        part.compute();
    }

    part.note_on(67, 100, 0);
    let [first, second] = part.legato_pair_states().expect("pair held");
    assert_eq!(first.0, LegatoState::FadeOut);
    assert_eq!(second.0, LegatoState::FadeIn);

    for _ in 0..4 {
        part.compute();
        assert!(block_peak(&part) > 0.01, "legato transition dropped out");
    }
    let [first, second] = part.legato_pair_states().expect("pair held");
    assert_eq!(first, (LegatoState::Normal, true));
    assert_eq!(second, (LegatoState::Normal, false));

    // Roles swap on the next legato note
    part.note_on(72, 100, 0);
    let [first, second] = part.legato_pair_states().expect("pair held");
    assert_eq!(first.0, LegatoState::FadeIn);
    assert_eq!(second.0, LegatoState::FadeOut);
    assert_eq!(part.active_voices(), 2);
}

#[test]
fn legato_release_frees_pair() {
    let mut part = Part::new(0, SR, BLOCK);
    part.set_enabled(true);
    part.set_legato(true);
    part.note_on(60, 100, 0);
    part.note_on(64, 100, 0);
    part.note_off(64);
    assert!(part.legato_pair_states().is_none());
    for _ in 0..40 {
        part.compute();
    }
    assert_eq!(part.active_voices(), 0);

    // A fresh note starts a new pair instead of gliding
    part.note_on(62, 100, 0);
    let [first, _] = part.legato_pair_states().expect("new pair");
    assert_eq!(first.0, LegatoState::Normal);
}

// ---------------------------------------------------------------------------
// 3. Controllers
// ---------------------------------------------------------------------------

#[test]
fn all_notes_off_releases_every_voice() {
    let mut part = Part::new(3, SR, BLOCK);
    part.set_enabled(true);
    for n in [60, 64, 67] {
        part.note_on(n, 90, 0);
    }
    part.set_controller(cc::ALL_NOTES_OFF, 0);
    for _ in 0..40 {
        part.compute();
    }
    assert_eq!(part.active_voices(), 0);
    assert_eq!(block_peak(&part), 0.0);
}

#[test]
fn cutoff_controller_darkens_output() {
    let render = |cutoff: u16| {
        let mut part = Part::new(0, SR, BLOCK);
        part.set_enabled(true);
        part.set_controller(cc::FILTER_CUTOFF, cutoff);
        part.note_on(45, 127, 0);
        let mut energy = 0.0f32;
        for _ in 0..8 {
            part.compute();
            energy += part.output_l().iter().map(|s| s * s).sum::<f32>();
        }
        energy
    };
    assert!(render(20) < render(120) * 0.5);
}

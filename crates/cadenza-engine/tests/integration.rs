//! Integration tests for cadenza-engine.
//!
//! Drives the engine the way a host does: events through the queue, the
//! dispatcher thread, block rendering, effect routing, and persistence of
//! the parameter tree and configuration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_engine::{
    Dispatcher, EffectKind, Engine, EngineConfig, EngineError, EventQueue, EventSink, ParamTree,
    RoutingTarget, dispatch,
};
use cadenza_synth::{MidiEvent, cc};
use proptest::prelude::*;
use tempfile::TempDir;

const BLOCK: usize = 128;

fn engine() -> Engine {
    Engine::new(EngineConfig {
        block_size: BLOCK,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn render(engine: &Engine) -> (Vec<f32>, Vec<f32>) {
    let mut l = vec![0.0f32; BLOCK];
    let mut r = vec![0.0f32; BLOCK];
    engine.render_block(&mut l, &mut r);
    (l, r)
}

fn peak(block: &[f32]) -> f32 {
    block.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

// ---------------------------------------------------------------------------
// 1. Event pipeline
// ---------------------------------------------------------------------------

#[test]
fn queue_overflow_keeps_first_capacity_events() {
    let queue = EventQueue::new(100);
    for i in 0..101u16 {
        let _ = queue.put(MidiEvent::controller(0, cc::VOLUME, i));
    }
    assert_eq!(queue.dropped(), 1);
    let values: Vec<u16> = queue.drain().map(|ev| ev.value).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());
}

#[derive(Default)]
struct Recorder {
    note_ons: Vec<(u8, u8, u8)>,
    other: usize,
}

impl EventSink for Recorder {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.note_ons.push((channel, note, velocity));
    }
    fn note_off(&mut self, _channel: u8, _note: u8) {
        self.other += 1;
    }
    fn set_controller(&mut self, _channel: u8, _number: u16, _value: u16) {
        self.other += 1;
    }
}

#[test]
fn note_on_reaches_sink_exactly_once() {
    let queue = EventQueue::new(8);
    queue.put(MidiEvent::note(0, 60, 100)).unwrap();

    let mut sink = Recorder::default();
    for event in queue.drain() {
        dispatch(&mut sink, event);
    }
    assert_eq!(sink.note_ons, vec![(0, 60, 100)]);
    assert_eq!(sink.other, 0);
    assert_eq!(queue.drain().count(), 0);
}

#[test]
fn note_on_reaches_parts_on_channel() {
    let engine = engine();
    engine.with_graph(|g| {
        g.part_on_off(1, true);
        g.part_mut(1).unwrap().set_channel(0);
        g.part_on_off(2, true);
    });
    engine.put_event(MidiEvent::note(0, 60, 100)).unwrap();
    assert_eq!(engine.flush_events(), 1);

    engine.with_graph(|g| {
        assert_eq!(g.part(0).unwrap().active_voices(), 1);
        assert_eq!(g.part(1).unwrap().active_voices(), 1);
        // Part 2 listens on channel 2
        assert_eq!(g.part(2).unwrap().active_voices(), 0);
        assert_eq!(g.fake_peaks()[0], 200);
    });
}

#[test]
fn dispatcher_thread_feeds_render() {
    let engine = Arc::new(engine());
    let dispatcher = Dispatcher::spawn(Arc::clone(&engine)).unwrap();
    engine.put_event(MidiEvent::note(0, 57, 120)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while dispatcher.dispatched() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    let (l, _) = render(&engine);
    assert!(peak(&l) > 0.0);
}

#[test]
fn events_dispatch_in_fifo_order() {
    let engine = engine();
    // On then off for the same key: FIFO leaves the voice released
    engine.put_event(MidiEvent::note(0, 60, 100)).unwrap();
    engine.put_event(MidiEvent::note_off(0, 60)).unwrap();
    engine.put_event(MidiEvent::note(0, 64, 100)).unwrap();
    engine.flush_events();
    for _ in 0..60 {
        render(&engine);
    }
    engine.with_graph(|g| assert_eq!(g.part(0).unwrap().active_voices(), 1));
}

// ---------------------------------------------------------------------------
// 2. Mixing
// ---------------------------------------------------------------------------

#[test]
fn disabling_part_silences_within_one_block() {
    let engine = engine();
    engine.note_on(0, 48, 127);
    for _ in 0..4 {
        render(&engine);
    }
    engine.part_on_off(0, false);
    let (l, r) = render(&engine);
    assert_eq!(peak(&l), 0.0);
    assert_eq!(peak(&r), 0.0);

    // Re-enabling starts clean: no voice, no interpolation tail
    engine.part_on_off(0, true);
    let (l, _) = render(&engine);
    assert_eq!(peak(&l), 0.0);
}

#[test]
fn system_effect_chain_forwards_only_through_send() {
    let chained_energy = |effect_send: u8| {
        let engine = engine();
        engine.with_graph(|g| {
            g.sys_effect_mut(0).unwrap().change_effect(EffectKind::Echo);
            g.sys_effect_mut(1).unwrap().change_effect(EffectKind::Echo);
            g.sys_effect_mut(0).unwrap().set_preset(3);
            g.sys_effect_mut(1).unwrap().set_preset(3);
            // Short delays keep both echoes inside the rendered window
            g.sys_effect_mut(0).unwrap().change_par(2, 5);
            g.sys_effect_mut(1).unwrap().change_par(2, 5);
            // Only effect 0 listens to the part
            g.set_part_send(0, 0, 96);
            g.set_effect_send(0, 1, effect_send);
        });
        engine.note_on(0, 60, 127);
        let mut energy = 0.0f32;
        for _ in 0..200 {
            render(&engine);
            energy += engine.with_graph(|g| {
                g.sys_effect(1)
                    .unwrap()
                    .output_l()
                    .iter()
                    .map(|s| s * s)
                    .sum::<f32>()
            });
        }
        energy
    };
    assert_eq!(chained_energy(0), 0.0);
    assert!(chained_energy(96) > 0.0);
}

#[test]
fn insertion_effect_on_master_adds_echo_tail() {
    let engine = engine();
    engine.with_graph(|g| {
        g.ins_effect_mut(0).unwrap().change_effect(EffectKind::Echo);
        g.ins_effect_mut(0).unwrap().set_preset(3);
        g.ins_effect_mut(0).unwrap().change_par(2, 10);
        g.set_insertion_route(0, RoutingTarget::Master);
    });
    engine.note_on(0, 60, 127);
    render(&engine);
    engine.part_on_off(0, false);

    let mut tail = 0.0f32;
    for _ in 0..200 {
        let (l, _) = render(&engine);
        tail = tail.max(peak(&l));
    }
    assert!(tail > 0.0);
}

#[test]
fn shut_up_silences_everything() {
    let engine = engine();
    engine.with_graph(|g| {
        g.sys_effect_mut(0).unwrap().change_effect(EffectKind::Echo);
        g.set_part_send(0, 0, 110);
    });
    engine.note_on(0, 60, 127);
    for _ in 0..8 {
        render(&engine);
    }
    engine.shut_up();
    // Faded block
    render(&engine);
    for _ in 0..4 {
        let (l, r) = render(&engine);
        assert_eq!(peak(&l), 0.0);
        assert_eq!(peak(&r), 0.0);
    }
}

#[test]
fn nrpn_through_queue_sets_insertion_parameter() {
    let engine = engine();
    engine.with_graph(|g| g.ins_effect_mut(3).unwrap().change_effect(EffectKind::Echo));
    for (n, v) in [
        (cc::NRPN_HI, 0x08),
        (cc::NRPN_LO, 3),
        (cc::DATA_ENTRY_HI, 6),
        (cc::DATA_ENTRY_LO, 100),
    ] {
        engine.put_event(MidiEvent::controller(5, n, v)).unwrap();
    }
    engine.flush_events();
    let par = engine.with_graph(|g| g.ins_effect(3).unwrap().get_par(6));
    assert_eq!(par, 100);
}

#[test]
fn vu_tracks_output() {
    let engine = engine();
    engine.note_on(0, 60, 127);
    for _ in 0..4 {
        render(&engine);
    }
    let vu = engine.vu();
    assert!(vu.out_peak_l > 1e-4);
    assert!(vu.rms_peak_l > 1e-5);
    assert!(vu.part_peaks[0] > 1e-4);
    engine.reset_vu_peaks();
    assert!(engine.vu().max_out_peak_l < 1e-6);
}

#[test]
fn concurrent_control_and_render() {
    let engine = Arc::new(engine());
    let control = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for i in 0..500u16 {
                let note = 40 + (i % 40) as u8;
                engine.note_on(0, note, 100);
                engine.set_controller(0, cc::PANNING, i % 128);
                engine.note_off(0, note);
                let _ = engine.vu();
            }
        })
    };
    for _ in 0..200 {
        let (l, r) = render(&engine);
        assert!(l.iter().chain(r.iter()).all(|s| s.is_finite()));
    }
    control.join().unwrap();
}

// ---------------------------------------------------------------------------
// 3. Persistence
// ---------------------------------------------------------------------------

#[test]
fn param_tree_roundtrips_through_toml_file() {
    let engine = engine();
    engine.with_graph(|g| {
        g.set_param("master.volume", 101).unwrap();
        g.set_param("part.4.enabled", 1).unwrap();
        g.set_param("part.4.legato", 1).unwrap();
        g.set_param("part.4.filter.type", 6).unwrap();
        g.set_param("sysefx.2.type", 1).unwrap();
        g.set_param("sysefx.2.preset", 5).unwrap();
        g.set_param("sysefx.2.part.4", 77).unwrap();
        g.set_param("insefx.7.type", 1).unwrap();
        g.set_param("insefx.7.route", 4).unwrap();
    });
    let tree = engine.snapshot();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("params.toml");
    tree.save(&path).unwrap();

    let loaded = ParamTree::load(&path).unwrap();
    assert_eq!(loaded, tree);

    let fresh = self::engine();
    fresh.apply(&loaded).unwrap();
    assert_eq!(fresh.snapshot(), tree);
    fresh.with_graph(|g| {
        assert_eq!(g.insertion_route(7), RoutingTarget::Part(4));
        assert_eq!(g.part_send(2, 4), 77);
    });
}

#[test]
fn apply_reports_unknown_key() {
    let mut tree = ParamTree::new();
    tree.insert("part.0.volume", 90);
    tree.insert("part.0.vibrato", 1);
    let err = engine().apply(&tree).unwrap_err();
    assert!(matches!(err, EngineError::UnknownParam(ref k) if k == "part.0.vibrato"));
}

#[test]
fn config_file_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        EngineConfig::load(&missing),
        Err(EngineError::ReadFile { .. })
    ));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "sample_rate = [").unwrap();
    assert!(matches!(
        EngineConfig::load(&bad),
        Err(EngineError::TomlParse(_))
    ));

    let invalid = dir.path().join("invalid.toml");
    std::fs::write(&invalid, "queue_capacity = 0").unwrap();
    assert!(matches!(
        EngineConfig::load(&invalid),
        Err(EngineError::Config(_))
    ));
}

// ---------------------------------------------------------------------------
// 4. Robustness
// ---------------------------------------------------------------------------

fn arb_event() -> impl Strategy<Value = MidiEvent> {
    prop_oneof![
        (0u8..16, 0u8..128, 0u8..128).prop_map(|(ch, n, v)| MidiEvent::note(ch, n, v)),
        (0u8..16, 0u16..128, 0u16..128).prop_map(|(ch, n, v)| MidiEvent::controller(ch, n, v)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary event streams never produce non-finite output.
    #[test]
    fn arbitrary_events_render_finite(events in prop::collection::vec(arb_event(), 1..80)) {
        let engine = engine();
        engine.with_graph(|g| {
            g.sys_effect_mut(0).unwrap().change_effect(EffectKind::Echo);
            g.set_part_send(0, 0, 64);
        });
        for chunk in events.chunks(8) {
            for ev in chunk {
                let _ = engine.put_event(*ev);
            }
            let mut l = vec![0.0f32; BLOCK];
            let mut r = vec![0.0f32; BLOCK];
            engine.tick(&mut l, &mut r);
            prop_assert!(l.iter().chain(r.iter()).all(|s| s.is_finite()));
        }
    }
}

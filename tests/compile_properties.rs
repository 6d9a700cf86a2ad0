use ndarray::Array2;
use proptest::prelude::*;
use pulsecompiler_backend::*;

const NUM_CHANNELS: usize = 4;

fn ledger_strategy() -> impl Strategy<Value = Vec<(f64, usize, bool)>> {
    prop::collection::vec(
        (
            (0u32..800).prop_map(|quarters| quarters as f64 * 0.25),
            0..NUM_CHANNELS,
            any::<bool>(),
        ),
        0..60,
    )
}

fn config_strategy() -> impl Strategy<Value = HardwareConfig> {
    (1u64..5, 0u64..12, 1u64..6).prop_map(|(quantum, min_stable, max_quanta)| {
        // one sample per time unit; max wait kept small so splitting is exercised
        HardwareConfig::new(
            1000.,
            1e-3,
            NUM_CHANNELS,
            quantum,
            min_stable.min(quantum * max_quanta),
            quantum * max_quanta,
        )
        .unwrap()
    })
}

fn to_ledger(transitions: &[(f64, usize, bool)]) -> Ledger {
    let mut ledger = Ledger::new();
    for &(time, channel, state) in transitions {
        ledger.raw(time, channel, state);
    }
    ledger
}

// Each frame's state held for its aligned wait, laid end to end
fn expected_signal(config: &HardwareConfig, ledger: &Ledger) -> Array2<u8> {
    let frames = build_frames(config, ledger.transitions()).unwrap();
    let waits = aligned_waits(config, &frames);
    let total: u64 = waits.iter().sum();
    let mut signal = Array2::<u8>::zeros((NUM_CHANNELS, total as usize));
    let mut start = 0usize;
    for (frame, &wait) in frames.iter().zip(&waits) {
        for (channel, &high) in frame.state.bits().iter().enumerate() {
            for sample in start..start + wait as usize {
                signal[[channel, sample]] = high as u8;
            }
        }
        start += wait as usize;
    }
    signal
}

proptest! {
    #[test]
    fn compile_twice_gives_identical_output(
        transitions in ledger_strategy(),
        config in config_strategy(),
    ) {
        let ledger = to_ledger(&transitions);
        let first = compile(&config, &ledger).unwrap();
        let second = compile(&config, &ledger).unwrap();
        prop_assert_eq!(first.to_xml(), second.to_xml());
    }

    #[test]
    fn waits_are_aligned_and_bounded(
        transitions in ledger_strategy(),
        config in config_strategy(),
    ) {
        let artifact = compile(&config, &to_ledger(&transitions)).unwrap();
        for instruction in &artifact.script.instructions {
            if let ScriptInstruction::Wait(cycles) = instruction {
                prop_assert!(*cycles > 0);
                prop_assert_eq!(cycles % config.alignment_quantum(), 0);
                prop_assert!(*cycles <= config.max_wait_cycles());
            }
        }
        for waveform in artifact.waveforms.values() {
            prop_assert_eq!(waveform.len() as u64 % config.alignment_quantum(), 0);
        }
    }

    #[test]
    fn rendered_artifact_matches_aligned_frames(
        transitions in ledger_strategy(),
        config in config_strategy(),
    ) {
        let ledger = to_ledger(&transitions);
        let artifact = compile(&config, &ledger).unwrap();
        let signal = render(&artifact, &config).unwrap();
        prop_assert_eq!(signal, expected_signal(&config, &ledger));
    }

    #[test]
    fn every_generate_is_defined(
        transitions in ledger_strategy(),
        config in config_strategy(),
    ) {
        let artifact = compile(&config, &to_ledger(&transitions)).unwrap();
        let mut complex_refs = 0;
        for instruction in &artifact.script.instructions {
            if let ScriptInstruction::Generate(name) = instruction {
                prop_assert!(artifact.waveforms.contains_key(name));
                if name.starts_with('c') {
                    complex_refs += 1;
                }
            }
        }
        // complex waveforms are referenced exactly once
        let complex_defs = artifact.waveforms.keys().filter(|n| n.starts_with('c')).count();
        prop_assert_eq!(complex_refs, complex_defs);
    }
}

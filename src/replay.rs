//! Reading an artifact back into frames and per-sample signals.
//!
//! This is the inverse of assembly, used to check compiled output and to plot
//! what the card will play. A `generate` plays its waveform; the final quantum
//! of the waveform is held through the `wait`s that follow it, so the frame it
//! starts lasts for the sum of those waits.

use ndarray::{s, Array2};

use crate::assembler::Artifact;
use crate::config::HardwareConfig;
use crate::error::ParseError;
use crate::frame::{ChannelState, Frame};
use crate::script::ScriptInstruction;

/// Reconstructs the frame sequence played by `artifact`.
///
/// Adjacent samples with the same state form one frame, so two consecutive
/// frames with identical state come back merged.
pub fn frames_from_artifact(artifact: &Artifact, quantum: u64) -> Result<Vec<Frame>, ParseError> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut cursor: u64 = 0;

    for instruction in &artifact.script.instructions {
        match instruction {
            ScriptInstruction::Generate(name) => {
                let waveform = artifact
                    .waveforms
                    .get(name)
                    .ok_or_else(|| ParseError::UnknownWaveform(name.clone()))?;
                let quantum_len = quantum as usize;
                if waveform.len() < quantum_len || waveform.is_empty() {
                    return Err(ParseError::ShortWaveform {
                        name: name.clone(),
                        len: waveform.len(),
                        quantum,
                    });
                }
                let (body, tail) = waveform.samples.split_at(waveform.len() - quantum_len);
                for state in body {
                    push_run(&mut frames, cursor, state, 1);
                    cursor += 1;
                }
                push_run(&mut frames, cursor, &tail[0], 0);
            }
            ScriptInstruction::Wait(cycles) => {
                if let Some(frame) = frames.last_mut() {
                    frame.duration += cycles;
                }
                cursor += cycles;
            }
        }
    }
    Ok(frames)
}

// Extends the last frame if it has the same state, otherwise starts a new one
fn push_run(frames: &mut Vec<Frame>, index: u64, state: &ChannelState, duration: u64) {
    match frames.last_mut() {
        Some(last) if last.state == *state && last.index + last.duration == index => {
            last.duration += duration;
        }
        _ => frames.push(Frame {
            index,
            state: state.clone(),
            duration,
        }),
    }
}

/// Expands `artifact` into one row of samples per channel.
///
/// The result has shape `(num_channels, total_samples)` with `0`/`1` entries.
/// Long waits expand to as many columns, so this is meant for short sequences.
pub fn render(artifact: &Artifact, config: &HardwareConfig) -> Result<Array2<u8>, ParseError> {
    let frames = frames_from_artifact(artifact, config.alignment_quantum())?;
    let total = frames
        .last()
        .map_or(0, |frame| frame.index + frame.duration) as usize;
    let mut signal = Array2::<u8>::zeros((config.num_channels(), total));
    for frame in &frames {
        let start = frame.index as usize;
        let end = start + frame.duration as usize;
        for (channel, &high) in frame
            .state
            .bits()
            .iter()
            .enumerate()
            .take(config.num_channels())
        {
            if high {
                signal.slice_mut(s![channel, start..end]).fill(1);
            }
        }
    }
    Ok(signal)
}

#[cfg(test)]
mod test {
    use crate::assembler::compile;
    use crate::ledger::Ledger;
    use crate::replay::*;
    use crate::script::Script;
    use indexmap::IndexMap;
    use ndarray::array;

    fn config(quantum: u64, min_stable: u64) -> HardwareConfig {
        HardwareConfig::new(1000., 1e-3, 2, quantum, min_stable, 1 << 20).unwrap()
    }

    #[test]
    fn simple_waveforms_replay_to_frames() {
        let mut ledger = Ledger::new();
        ledger.raw(2., 0, true);
        ledger.raw(5., 1, true);
        let artifact = compile(&config(1, 0), &ledger).unwrap();
        let frames = frames_from_artifact(&artifact, 1).unwrap();
        let layout: Vec<(u64, u64)> = frames.iter().map(|f| (f.index, f.duration)).collect();
        assert_eq!(layout, vec![(0, 2), (2, 3), (5, 1)]);
    }

    #[test]
    fn render_shows_each_channel() {
        let mut ledger = Ledger::new();
        ledger.raw(1., 0, true);
        ledger.raw(3., 1, true);
        ledger.raw(4., 0, false);
        let artifact = compile(&config(1, 0), &ledger).unwrap();
        let signal = render(&artifact, &config(1, 0)).unwrap();
        assert_eq!(signal, array![[0u8, 1, 1, 1, 0], [0, 0, 0, 1, 1]]);
    }

    #[test]
    fn fused_frames_render_the_same() {
        let mut ledger = Ledger::new();
        ledger.raw(1., 0, true);
        ledger.raw(2., 1, true);
        ledger.raw(9., 0, false);
        let plain = compile(&config(1, 0), &ledger).unwrap();
        let fused = compile(&config(1, 3), &ledger).unwrap();
        assert_ne!(plain, fused);
        assert_eq!(
            render(&plain, &config(1, 0)).unwrap(),
            render(&fused, &config(1, 3)).unwrap()
        );
    }

    #[test]
    fn unknown_waveform_is_reported() {
        let artifact = Artifact {
            script: Script::parse("script main\n  generate w7\nend script").unwrap(),
            waveforms: IndexMap::new(),
        };
        assert_eq!(
            frames_from_artifact(&artifact, 1),
            Err(ParseError::UnknownWaveform("w7".to_string()))
        );
    }
}

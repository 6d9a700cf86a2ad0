//! Waveform and script assembly: the last stage of a compile.
//!
//! [`compile`] runs the whole pipeline on a ledger:
//! 1. repeat regions are checked for overlap ([`validate_repeat_regions`]);
//! 2. transitions are quantized into frames ([`build_frames`]);
//! 3. frame durations are aligned to the quantum ([`aligned_waits`]);
//! 4. frames are walked and emitted as `generate`/`wait` pairs ([`assemble`]).
//!
//! Frames whose aligned wait is below `min_stable_wait_cycles` cannot be
//! separated by a wait. They are fused with the frames that follow into one
//! complex waveform, up to and including the first frame whose wait is long
//! enough. A group of one frame becomes a simple, deduplicated waveform.
//!
//! Every compile starts from an empty [`WaveformRegistry`], so names and
//! numbering are fresh each time and compiling the same ledger twice gives
//! identical output.

use indexmap::IndexMap;
use log::{debug, trace};

use crate::config::HardwareConfig;
use crate::error::{CompileError, Result};
use crate::frame::{build_frames, Frame};
use crate::ledger::{Ledger, RepeatRegion};
use crate::script::{Script, ScriptInstruction};
use crate::timing::{aligned_waits, split_wait};
use crate::utils::TickTimer;
use crate::waveform::{Waveform, WaveformRegistry};

/// Output of a compile: the script and the waveforms it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    pub script: Script,
    pub waveforms: IndexMap<String, Waveform>,
}

impl Artifact {
    /// The `<script>` and `<waveforms>` elements sent to the card.
    pub fn to_xml(&self) -> String {
        format!(
            "<script>{}</script>\n<waveforms>{}</waveforms>\n",
            self.script,
            self.waveforms_xml()
        )
    }

    pub fn waveforms_xml(&self) -> String {
        self.waveforms.values().map(Waveform::to_xml).collect()
    }
}

/// Fails if any two repeat regions overlap once sorted by start time.
///
/// Regions that touch (`tf` of one equal to `t0` of the next) are allowed.
pub fn validate_repeat_regions(regions: &[RepeatRegion]) -> Result<()> {
    let mut sorted: Vec<&RepeatRegion> = regions.iter().collect();
    sorted.sort_by(|a, b| a.t0.total_cmp(&b.t0));
    for pair in sorted.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if first.tf > second.t0 {
            return Err(CompileError::OverlappingRepeatRegions {
                first_t0: first.t0,
                first_tf: first.tf,
                second_t0: second.t0,
            });
        }
    }
    Ok(())
}

/// Walks the frames and emits the script and the waveforms it needs.
///
/// `waits` holds the aligned wait of each frame.
pub fn assemble(config: &HardwareConfig, frames: &[Frame], waits: &[u64]) -> Artifact {
    let quantum = config.alignment_quantum();
    let mut registry = WaveformRegistry::new();
    let mut script = Script::new();

    let mut group_start = 0;
    for (i, &wait) in waits.iter().enumerate() {
        let is_last = i + 1 == frames.len();
        if wait < config.min_stable_wait_cycles() && !is_last {
            continue;
        }
        let group = &frames[group_start..=i];
        let name = if group.len() == 1 {
            registry.register_simple(&group[0].state, quantum)
        } else {
            registry.register_complex(group, &waits[group_start..=i], quantum)
        };
        trace!(
            "Frames {}..={} (samples {}..) -> generate {} + wait {}",
            group_start,
            i,
            group[0].index,
            name,
            wait
        );
        script.push(ScriptInstruction::Generate(name));
        for cycles in split_wait(wait, config.max_wait_cycles()) {
            script.push(ScriptInstruction::Wait(cycles));
        }
        group_start = i + 1;
    }

    Artifact {
        script,
        waveforms: registry.finish(),
    }
}

/// Compiles a ledger into an artifact.
///
/// The ledger is only read; nothing is emitted if any check fails.
///
/// ```
/// use pulsecompiler_backend::assembler::compile;
/// use pulsecompiler_backend::config::HardwareConfig;
/// use pulsecompiler_backend::ledger::Ledger;
///
/// let config = HardwareConfig::new(1000., 1e-3, 2, 1, 0, 1 << 29).unwrap();
/// let mut ledger = Ledger::new();
/// ledger.raw(0., 0, false);
/// ledger.raw(5., 0, true);
/// let artifact = compile(&config, &ledger).unwrap();
/// assert_eq!(
///     artifact.script.to_string(),
///     "script main\n  generate w0\n  wait 5\n  generate w1\n  wait 1\nend script\n"
/// );
/// ```
pub fn compile(config: &HardwareConfig, ledger: &Ledger) -> Result<Artifact> {
    let mut timer = TickTimer::new();
    validate_repeat_regions(ledger.repeat_regions())?;

    let frames = build_frames(config, ledger.transitions())?;
    timer.tick_log("build_frames");
    let waits = aligned_waits(config, &frames);
    let artifact = assemble(config, &frames, &waits);
    timer.tick_log("assemble");

    debug!(
        "Compiled {} transitions into {} frames, {} instructions and {} waveforms",
        ledger.len(),
        frames.len(),
        artifact.script.len(),
        artifact.waveforms.len()
    );
    Ok(artifact)
}

#[cfg(test)]
mod test {
    use crate::assembler::*;
    use crate::frame::ChannelState;
    use crate::script::ScriptInstruction::{Generate, Wait};

    fn region(t0: f64, tf: f64) -> RepeatRegion {
        RepeatRegion {
            t0,
            dt: tf - t0,
            tf,
            repeats: 1,
            cycles_per_repeat: 0,
            start_index: 0,
            stop_index: 0,
        }
    }

    fn frames(states: &[(u64, &[u8])], last_duration: u64) -> Vec<Frame> {
        let mut frames: Vec<Frame> = states
            .iter()
            .map(|&(index, bits)| Frame {
                index,
                state: ChannelState::from_bits(bits.iter().map(|&b| b == 1).collect()),
                duration: 0,
            })
            .collect();
        for i in 0..frames.len() {
            frames[i].duration = match frames.get(i + 1) {
                Some(next) => next.index - frames[i].index,
                None => last_duration,
            };
        }
        frames
    }

    fn config(quantum: u64, min_stable: u64, max_wait: u64) -> HardwareConfig {
        HardwareConfig::new(1000., 1e-3, 2, quantum, min_stable, max_wait).unwrap()
    }

    #[test]
    fn regions_in_any_order() {
        assert!(validate_repeat_regions(&[region(10., 20.), region(0., 10.)]).is_ok());
        assert_eq!(
            validate_repeat_regions(&[region(5., 15.), region(0., 10.)]),
            Err(CompileError::OverlappingRepeatRegions {
                first_t0: 0.,
                first_tf: 10.,
                second_t0: 5.
            })
        );
    }

    #[test]
    fn no_fusion_gives_one_generate_per_frame() {
        let frames = frames(&[(0, &[0, 0]), (3, &[1, 0]), (10, &[0, 0])], 1);
        let waits = aligned_waits(&config(1, 0, 1 << 20), &frames);
        let artifact = assemble(&config(1, 0, 1 << 20), &frames, &waits);
        assert_eq!(
            artifact.script.instructions,
            vec![
                Generate("w0".into()),
                Wait(3),
                Generate("w1".into()),
                Wait(7),
                Generate("w0".into()),
                Wait(1),
            ]
        );
        assert_eq!(artifact.waveforms.len(), 2);
    }

    #[test]
    fn short_frames_are_fused_up_to_a_stable_one() {
        let config = config(1, 4, 1 << 20);
        let frames = frames(&[(0, &[1, 0]), (1, &[0, 1]), (3, &[1, 1]), (20, &[0, 0])], 1);
        let waits = aligned_waits(&config, &frames);
        let artifact = assemble(&config, &frames, &waits);
        assert_eq!(
            artifact.script.instructions,
            vec![Generate("c0".into()), Wait(17), Generate("w0".into()), Wait(1)]
        );
        // 1 + 2 samples of body, one quantum of the stable frame
        let c0 = &artifact.waveforms["c0"];
        assert_eq!(c0.len(), 4);
        assert_eq!(c0.samples[3].bits(), &[true, true]);
    }

    #[test]
    fn waits_are_aligned_and_split() {
        let config = config(4, 0, 8);
        let frames = frames(&[(0, &[1, 0]), (18, &[0, 0])], 1);
        let waits = aligned_waits(&config, &frames);
        let artifact = assemble(&config, &frames, &waits);
        assert_eq!(
            artifact.script.instructions,
            vec![
                Generate("w1".into()),
                Wait(8),
                Wait(8),
                Wait(4),
                Generate("w0".into()),
                Wait(4),
            ]
        );
        assert_eq!(artifact.waveforms["w1"].len(), 4);
    }

    #[test]
    fn empty_ledger_compiles_to_empty_script() {
        let artifact = compile(&config(1, 0, 1 << 20), &Ledger::new()).unwrap();
        assert!(artifact.script.is_empty());
        assert!(artifact.waveforms.is_empty());
    }

    #[test]
    fn xml_contains_script_and_waveforms() {
        let mut ledger = Ledger::new();
        ledger.raw(0., 1, true);
        let artifact = compile(&config(1, 0, 1 << 20), &ledger).unwrap();
        assert_eq!(
            artifact.to_xml(),
            "<script>script main\n  generate w2\n  wait 1\nend script\n</script>\n\
            <waveforms><waveform><name>w2</name><transitions>0</transitions><states>0 1</states>\n</waveform>\n</waveforms>\n"
        );
    }
}

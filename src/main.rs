use pulsecompiler_backend::*;

use indexmap::IndexMap;

fn main() {
    let config = HardwareConfig::new(1e6, 1e-3, 40, 1, 4, HSDIO_MAX_WAIT_CYCLES).unwrap();
    let mut seq = Sequencer::with_config(config);

    let mut profiles = IndexMap::new();
    profiles.insert("MOT".to_string(), vec![false, false, false]);
    profiles.insert("PGC".to_string(), vec![true, false, false]);
    profiles.insert("off".to_string(), vec![false, true, false]);
    seq.add_grey_code_group("mot", vec![32, 33, 34], profiles, 0., 1e-3)
        .unwrap();
    seq.add_switch("shutter", 36, None, 0.).unwrap();

    let t = seq.initialize("mot", 0., "MOT").unwrap();
    seq.profile("shutter", t, "on").unwrap();
    let t = seq.profile("mot", 1., "PGC").unwrap();
    let t = seq
        .mark_repeat(
            t + 0.5,
            |seq, t| {
                seq.raw(t, 0, true)?;
                seq.raw(t + 0.01, 0, false)?;
                Ok(t + 0.1)
            },
            5,
        )
        .unwrap();
    seq.profile("mot", t, "off").unwrap();
    seq.profile("shutter", t + 2., "off").unwrap();

    println!("{:?}", seq.calc_signal().unwrap().shape());
    let artifact = seq.compile().unwrap();
    println!("{}", artifact.script);
    for waveform in artifact.waveforms.values() {
        println!("{} ({} samples)", waveform.name, waveform.len());
    }
}

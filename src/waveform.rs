//! Waveform payloads and the per-compile naming/dedup registry.
//!
//! A *simple* waveform holds one frame's state for one alignment quantum. Its
//! name is derived from the state (`w` + hex), so every frame with that state
//! refers to the same payload. A *complex* waveform holds a run of frames that
//! were too short to be separated by waits; it gets a fresh `c<n>` name and is
//! never shared.

use indexmap::IndexMap;
use log::debug;

use crate::frame::{ChannelState, Frame};

/// A named payload: one [`ChannelState`] per sample, offsets `0, 1, 2, ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    pub name: String,
    pub samples: Vec<ChannelState>,
}

impl Waveform {
    pub fn new(name: String, samples: Vec<ChannelState>) -> Self {
        Self { name, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(offset, state)` pairs of the payload.
    pub fn payload(&self) -> impl Iterator<Item = (usize, &ChannelState)> {
        self.samples.iter().enumerate()
    }

    /// The `<waveform>` element understood by the card's host software.
    ///
    /// ```
    /// use pulsecompiler_backend::frame::ChannelState;
    /// use pulsecompiler_backend::waveform::Waveform;
    ///
    /// let state = ChannelState::from_bits(vec![true, false]);
    /// let waveform = Waveform::new("w1".to_string(), vec![state.clone(), state]);
    /// assert_eq!(
    ///     waveform.to_xml(),
    ///     "<waveform><name>w1</name><transitions>0 1</transitions><states>1 0\n1 0</states>\n</waveform>\n"
    /// );
    /// ```
    pub fn to_xml(&self) -> String {
        let (transitions, states): (Vec<String>, Vec<String>) = self
            .payload()
            .map(|(offset, state)| (offset.to_string(), state.to_string()))
            .unzip();
        format!(
            "<waveform><name>{}</name><transitions>{}</transitions><states>{}</states>\n</waveform>\n",
            self.name,
            transitions.join(" "),
            states.join("\n"),
        )
    }
}

/// Name of the simple waveform holding `state`.
pub fn simple_name(state: &ChannelState) -> String {
    format!("w{}", state.hex())
}

/// Sample-by-sample payload of a fused group of frames.
///
/// Every frame but the last is repeated for its full aligned wait; the last
/// frame contributes a single quantum, after which its state persists through
/// the `wait` that follows the `generate`.
///
/// `frames` and `aligned_waits` must have the same length.
///
/// ```
/// use pulsecompiler_backend::frame::{ChannelState, Frame};
/// use pulsecompiler_backend::waveform::unroll_group;
///
/// let a = ChannelState::from_bits(vec![false]);
/// let b = ChannelState::from_bits(vec![true]);
/// let frames = vec![
///     Frame { index: 0, state: a.clone(), duration: 3 },
///     Frame { index: 3, state: b.clone(), duration: 1 },
/// ];
/// let samples = unroll_group(&frames, &[4, 2], 2);
/// assert_eq!(samples, vec![a.clone(), a.clone(), a.clone(), a, b.clone(), b]);
/// ```
pub fn unroll_group(frames: &[Frame], aligned_waits: &[u64], quantum: u64) -> Vec<ChannelState> {
    let Some((last, body)) = frames.split_last() else {
        return Vec::new();
    };
    let body_len: u64 = aligned_waits.iter().take(body.len()).sum();
    let mut samples = Vec::with_capacity((body_len + quantum) as usize);
    for (frame, &wait) in body.iter().zip(aligned_waits) {
        samples.extend(std::iter::repeat(frame.state.clone()).take(wait as usize));
    }
    samples.extend(std::iter::repeat(last.state.clone()).take(quantum as usize));
    samples
}

/// Names and payloads defined during one compile, in definition order.
///
/// Simple waveforms are keyed by their exact state so a recurring state maps
/// to the name registered the first time.
#[derive(Debug, Default)]
pub struct WaveformRegistry {
    simple: IndexMap<ChannelState, String>,
    waveforms: IndexMap<String, Waveform>,
    next_complex: usize,
}

impl WaveformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the name of the simple waveform for `state`, defining its
    /// payload the first time the state is seen.
    pub fn register_simple(&mut self, state: &ChannelState, quantum: u64) -> String {
        if let Some(name) = self.simple.get(state) {
            debug!("Reusing waveform {name}");
            return name.clone();
        }
        let name = simple_name(state);
        let samples = vec![state.clone(); quantum as usize];
        self.simple.insert(state.clone(), name.clone());
        self.waveforms
            .insert(name.clone(), Waveform::new(name.clone(), samples));
        name
    }

    /// Defines a fresh complex waveform for a fused group and returns its name.
    pub fn register_complex(&mut self, frames: &[Frame], aligned_waits: &[u64], quantum: u64) -> String {
        let name = format!("c{}", self.next_complex);
        self.next_complex += 1;
        let samples = unroll_group(frames, aligned_waits, quantum);
        self.waveforms
            .insert(name.clone(), Waveform::new(name.clone(), samples));
        name
    }

    pub fn waveforms(&self) -> &IndexMap<String, Waveform> {
        &self.waveforms
    }

    pub fn finish(self) -> IndexMap<String, Waveform> {
        self.waveforms
    }
}

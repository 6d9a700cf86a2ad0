//! Time quantizer and frame builder.
//!
//! [`build_frames`] turns the ledger's transitions into an ordered list of
//! [`Frame`]s: one per distinct sample index, each carrying the full state of
//! every channel from that sample until the next frame.

use std::fmt;

use crate::config::HardwareConfig;
use crate::error::{CompileError, Result};
use crate::ledger::Transition;
use crate::utils::quantize;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Level of every card channel at one instant, channel 0 first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelState(Vec<bool>);

impl ChannelState {
    /// All channels low.
    pub fn low(num_channels: usize) -> Self {
        Self(vec![false; num_channels])
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn num_channels(&self) -> usize {
        self.0.len()
    }

    /// Level of `channel`, or `None` past the last channel.
    pub fn get(&self, channel: usize) -> Option<bool> {
        self.0.get(channel).copied()
    }

    pub fn set(&mut self, channel: usize, state: bool) {
        self.0[channel] = state;
    }

    /// Lowercase hex of the state read as an integer with channel `i` as bit `i`,
    /// without leading zeros.
    ///
    /// ```
    /// use pulsecompiler_backend::frame::ChannelState;
    ///
    /// assert_eq!(ChannelState::low(32).hex(), "0");
    /// assert_eq!(ChannelState::from_bits(vec![true, false]).hex(), "1");
    /// let mut state = ChannelState::low(40);
    /// state.set(4, true);
    /// state.set(35, true);
    /// assert_eq!(state.hex(), "800000010");
    /// ```
    pub fn hex(&self) -> String {
        let nibbles: Vec<u8> = self
            .0
            .chunks(4)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (bit, &high)| acc | ((high as u8) << bit))
            })
            .collect();
        let digits: String = nibbles
            .iter()
            .rev()
            .skip_while(|&&nibble| nibble == 0)
            .map(|&nibble| HEX_DIGITS[nibble as usize] as char)
            .collect();
        if digits.is_empty() {
            "0".to_string()
        } else {
            digits
        }
    }

    /// Parses the space-separated `0`/`1` form produced by `Display`.
    pub fn parse(text: &str) -> Option<Self> {
        text.split_whitespace()
            .map(|bit| match bit {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            })
            .collect::<Option<Vec<bool>>>()
            .map(Self)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &bit) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", bit as u8)?;
        }
        Ok(())
    }
}

/// One quantized instant: the state starting at sample `index` and held for
/// `duration` samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub state: ChannelState,
    pub duration: u64,
}

/// Quantizes and merges the ledger into frames.
///
/// Transitions are stably sorted by sample index, so among transitions that
/// land on the same sample the later-appended one wins. An all-low frame at
/// index 0 is inserted when the first transition comes later. The last
/// frame's duration is 1.
///
/// ```
/// use pulsecompiler_backend::config::HardwareConfig;
/// use pulsecompiler_backend::frame::build_frames;
/// use pulsecompiler_backend::ledger::Transition;
///
/// let config = HardwareConfig::new(1000., 1e-3, 2, 1, 0, 1 << 20).unwrap();
/// let frames = build_frames(&config, &[
///     Transition::new(7., 1, true),
///     Transition::new(3., 0, true),
/// ]).unwrap();
/// let layout: Vec<(u64, u64)> = frames.iter().map(|f| (f.index, f.duration)).collect();
/// assert_eq!(layout, vec![(0, 3), (3, 4), (7, 1)]);
/// ```
pub fn build_frames(config: &HardwareConfig, transitions: &[Transition]) -> Result<Vec<Frame>> {
    let num_channels = config.num_channels();

    let mut quantized: Vec<(u64, usize, bool)> = Vec::with_capacity(transitions.len());
    for transition in transitions {
        if transition.channel >= num_channels {
            return Err(CompileError::ChannelIndexOutOfRange {
                channel: transition.channel,
                num_channels,
            });
        }
        let index = quantize(transition.time, config.clock_rate(), config.units())?;
        quantized.push((index, transition.channel, transition.state));
    }
    // sort_by_key is stable: ties keep arrival order
    quantized.sort_by_key(|&(index, _, _)| index);

    let mut frames: Vec<Frame> = Vec::new();
    if let Some(&(first_index, _, _)) = quantized.first() {
        if first_index > 0 {
            frames.push(Frame {
                index: 0,
                state: ChannelState::low(num_channels),
                duration: 0,
            });
        }
    }
    for (index, channel, state) in quantized {
        let previous = frames.last().map(|frame| frame.index);
        if previous != Some(index) {
            let carried = frames
                .last()
                .map(|frame| frame.state.clone())
                .unwrap_or_else(|| ChannelState::low(num_channels));
            frames.push(Frame {
                index,
                state: carried,
                duration: 0,
            });
        }
        if let Some(frame) = frames.last_mut() {
            frame.state.set(channel, state);
        }
    }

    for i in 0..frames.len() {
        frames[i].duration = match frames.get(i + 1) {
            Some(next) => next.index - frames[i].index,
            None => 1,
        };
    }
    Ok(frames)
}

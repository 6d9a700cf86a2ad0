//! Channel capabilities: profile-driven drivers that translate named states
//! into raw level-change requests.
//!
//! Two kinds of groups are provided:
//! - [`GreyCodeGroup`]: several channels selecting one of a set of hardware
//!   profiles (e.g. the profile pins of a DDS). Only the bits that differ are
//!   flipped, and successive flips are spaced by a minimum profile delay so
//!   that no transient invalid combination is latched.
//! - [`Switch`]: a single channel with named levels, no grey coding and no
//!   delay bookkeeping.
//!
//! Both implement [`BaseChannelGroup`] and append their requests to any
//! [`TransitionSink`], normally the sequencer's [`Ledger`](crate::ledger::Ledger).
//! The [`ChannelGroup`] enum holds either kind so that a sequencer can keep
//! them in one map.

use indexmap::IndexMap;
use log::warn;
use maplit::hashmap;
use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::ledger::TransitionSink;

/// Minimum spacing between two bit flips of one grey-code group, in caller
/// time units.
pub const DEFAULT_PROFILE_DELAY: f64 = 1e-4;

pub trait BaseChannelGroup {
    fn name(&self) -> &str;
    /// Card channels driven by this group, in bit order.
    fn channels(&self) -> Vec<usize>;

    /// Switches to the profile `name` at time `t`, returning the time of the
    /// last emitted change.
    fn profile(&mut self, sink: &mut dyn TransitionSink, t: f64, name: &str) -> Result<f64>;

    /// Restores the state the group was created with.
    fn reset(&mut self);

    fn unknown_profile(&self, name: &str) -> CompileError {
        CompileError::UnknownProfile {
            group: self.name().to_string(),
            name: name.to_string(),
        }
    }
}

/// A multi-channel group switched with grey coding.
///
/// Calls on one instance must arrive in non-decreasing time order; the delay
/// state machine only looks at the time of this group's own last flip.
#[derive(Debug, Clone, PartialEq)]
pub struct GreyCodeGroup {
    name: String,
    channels: Vec<usize>,
    profiles: IndexMap<String, Vec<bool>>,
    bits: Vec<bool>,
    last_change: f64,
    initial_time: f64,
    profile_delay: f64,
}

impl GreyCodeGroup {
    /// Creates a group; every profile must have exactly one bit per channel.
    ///
    /// `t` is taken as the time of the last change, so the first flip is
    /// delayed if it comes within `profile_delay` of it.
    ///
    /// ```
    /// use pulsecompiler_backend::channel::*;
    /// use pulsecompiler_backend::ledger::Ledger;
    /// use indexmap::IndexMap;
    ///
    /// let mut profiles = IndexMap::new();
    /// profiles.insert("MOT".to_string(), vec![false, false]);
    /// profiles.insert("off".to_string(), vec![true, true]);
    /// let mut mot = GreyCodeGroup::new("mot", vec![4, 5], profiles, 0., 0.1).unwrap();
    ///
    /// let mut ledger = Ledger::new();
    /// let t = mot.profile(&mut ledger, 1., "off").unwrap();
    /// // The second bit is pushed back by one profile delay
    /// assert_eq!(t, 1.1);
    /// assert_eq!(ledger.len(), 2);
    /// ```
    pub fn new(
        name: &str,
        channels: Vec<usize>,
        profiles: IndexMap<String, Vec<bool>>,
        t: f64,
        profile_delay: f64,
    ) -> Result<Self> {
        if let Some((profile, bits)) = profiles
            .iter()
            .find(|(_, bits)| bits.len() != channels.len())
        {
            return Err(CompileError::ProfileWidthMismatch {
                group: name.to_string(),
                profile: profile.clone(),
                expected: channels.len(),
                found: bits.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            bits: vec![false; channels.len()],
            channels,
            profiles,
            last_change: t,
            initial_time: t,
            profile_delay,
        })
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn last_change(&self) -> f64 {
        self.last_change
    }

    pub fn profiles(&self) -> &IndexMap<String, Vec<bool>> {
        &self.profiles
    }

    /// Pushes `t` back by one profile delay if the group flipped too recently,
    /// then records `t` as the latest flip.
    pub fn delay(&mut self, t: f64) -> f64 {
        let t = if t <= self.last_change + self.profile_delay {
            t + self.profile_delay
        } else {
            t
        };
        self.last_change = t;
        t
    }

    /// Flips only the bits that differ from the current state.
    ///
    /// The stored state becomes `new_bits` even for bits that were not flipped.
    pub fn set(&mut self, sink: &mut dyn TransitionSink, mut t: f64, new_bits: &[bool]) -> Result<f64> {
        self.check_width(new_bits)?;
        for i in 0..self.channels.len() {
            if self.bits[i] != new_bits[i] {
                t = self.delay(t);
                sink.add_transition(t, self.channels[i], new_bits[i]);
            }
        }
        self.bits = new_bits.to_vec();
        Ok(t)
    }

    /// Writes every bit regardless of the current state.
    pub fn initialize(
        &mut self,
        sink: &mut dyn TransitionSink,
        mut t: f64,
        new_bits: &[bool],
    ) -> Result<f64> {
        self.check_width(new_bits)?;
        for i in 0..self.channels.len() {
            t = self.delay(t);
            sink.add_transition(t, self.channels[i], new_bits[i]);
        }
        self.bits = new_bits.to_vec();
        Ok(t)
    }

    fn check_width(&self, new_bits: &[bool]) -> Result<()> {
        if new_bits.len() != self.channels.len() {
            return Err(CompileError::ProfileWidthMismatch {
                group: self.name.clone(),
                profile: format!("{new_bits:?}"),
                expected: self.channels.len(),
                found: new_bits.len(),
            });
        }
        Ok(())
    }

    /// Writes every bit of profile `name`, see [`GreyCodeGroup::initialize`].
    pub fn initialize_profile(
        &mut self,
        sink: &mut dyn TransitionSink,
        t: f64,
        name: &str,
    ) -> Result<f64> {
        let bits = self.lookup(name)?;
        self.initialize(sink, t, &bits)
    }

    fn lookup(&self, name: &str) -> Result<Vec<bool>> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown_profile(name))
    }
}

impl BaseChannelGroup for GreyCodeGroup {
    fn name(&self) -> &str {
        &self.name
    }
    fn channels(&self) -> Vec<usize> {
        self.channels.clone()
    }
    fn profile(&mut self, sink: &mut dyn TransitionSink, t: f64, name: &str) -> Result<f64> {
        let bits = self.lookup(name)?;
        self.set(sink, t, &bits)
    }
    fn reset(&mut self) {
        self.bits = vec![false; self.channels.len()];
        self.last_change = self.initial_time;
    }
}

/// A single channel with named levels.
///
/// A positive `offset` makes the channel fire later than requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    name: String,
    channel: usize,
    profiles: HashMap<String, bool>,
    offset: f64,
}

impl Switch {
    pub fn new(name: &str, channel: usize, profiles: Option<HashMap<String, bool>>, offset: f64) -> Self {
        Self {
            name: name.to_string(),
            channel,
            profiles: profiles.unwrap_or_else(Self::default_profiles),
            offset,
        }
    }

    /// Active-high output: `"on"` drives the channel high, `"off"` low.
    pub fn default_profiles() -> HashMap<String, bool> {
        hashmap! {
            "on".to_string() => true,
            "off".to_string() => false,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl BaseChannelGroup for Switch {
    fn name(&self) -> &str {
        &self.name
    }
    fn channels(&self) -> Vec<usize> {
        vec![self.channel]
    }
    /// Emits exactly one transition at `t + offset` and returns `t`.
    fn profile(&mut self, sink: &mut dyn TransitionSink, t: f64, name: &str) -> Result<f64> {
        let state = *self
            .profiles
            .get(name)
            .ok_or_else(|| self.unknown_profile(name))?;
        let mut t_actual = t + self.offset;
        if t_actual < 0. {
            warn!(
                "Switch '{}' (channel {}) change at t={} moved to negative time {}, clamping to 0",
                self.name, self.channel, t, t_actual
            );
            t_actual = 0.;
        }
        sink.add_transition(t_actual, self.channel, state);
        Ok(t)
    }
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelGroup {
    GreyCode(GreyCodeGroup),
    Switch(Switch),
}

impl BaseChannelGroup for ChannelGroup {
    fn name(&self) -> &str {
        match self {
            ChannelGroup::GreyCode(group) => group.name(),
            ChannelGroup::Switch(switch) => switch.name(),
        }
    }
    fn channels(&self) -> Vec<usize> {
        match self {
            ChannelGroup::GreyCode(group) => group.channels(),
            ChannelGroup::Switch(switch) => switch.channels(),
        }
    }
    fn profile(&mut self, sink: &mut dyn TransitionSink, t: f64, name: &str) -> Result<f64> {
        match self {
            ChannelGroup::GreyCode(group) => group.profile(sink, t, name),
            ChannelGroup::Switch(switch) => switch.profile(sink, t, name),
        }
    }
    fn reset(&mut self) {
        match self {
            ChannelGroup::GreyCode(group) => group.reset(),
            ChannelGroup::Switch(switch) => switch.reset(),
        }
    }
}

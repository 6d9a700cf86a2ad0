//! The sequencer is the single place where sequences are recorded and compiled,
//! and the single place through which methods are exposed to python.
//!
//! ## Overview
//!
//! A [`Sequencer`] owns a [`HardwareConfig`], the [`Ledger`] of the current
//! experiment iteration, and the registered channel groups. Its behaviour is
//! defined by the [`BaseSequencer`] trait through default implementations, so
//! any struct exposing the same fields can reuse it; the
//! [`impl_seq_boilerplate`] macro generates the field accessors together with
//! python wrappers for the trait methods.
//!
//! ## Lifecycle
//!
//! 1. Register channel groups with [`BaseSequencer::add_grey_code_group`] and
//!    [`BaseSequencer::add_switch`].
//! 2. Record the iteration with [`BaseSequencer::profile`],
//!    [`BaseSequencer::raw`] and [`BaseSequencer::mark_repeat`].
//! 3. [`BaseSequencer::compile`] produces the [`Artifact`]. On success the
//!    ledger is discarded and every group returns to its initial state, ready
//!    for the next iteration. On failure nothing is discarded.

use indexmap::IndexMap;
use ndarray::Array2;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::HashMap;

use crate::assembler::{compile, Artifact};
use crate::channel::*;
use crate::config::{HardwareConfig, HSDIO_MAX_WAIT_CYCLES};
use crate::error::{CompileError, Result};
use crate::ledger::{unroll_repeats, Ledger, RepeatSpan};
use crate::replay::render;

/// Behaviour of a sequencer, provided through default implementations on top
/// of a few field accessors.
///
/// Methods fall in three groups:
/// 1. Group registration: [`add_grey_code_group`], [`add_switch`], [`add_group`].
/// 2. Recording: [`profile`], [`initialize`], [`raw`], [`mark_repeat`].
/// 3. Compilation: [`compile_artifact`], [`compile`], [`calc_signal`], [`clear`].
///
/// [`add_grey_code_group`]: BaseSequencer::add_grey_code_group
/// [`add_switch`]: BaseSequencer::add_switch
/// [`add_group`]: BaseSequencer::add_group
/// [`profile`]: BaseSequencer::profile
/// [`initialize`]: BaseSequencer::initialize
/// [`raw`]: BaseSequencer::raw
/// [`mark_repeat`]: BaseSequencer::mark_repeat
/// [`compile_artifact`]: BaseSequencer::compile_artifact
/// [`compile`]: BaseSequencer::compile
/// [`calc_signal`]: BaseSequencer::calc_signal
/// [`clear`]: BaseSequencer::clear
pub trait BaseSequencer {
    // FIELD methods
    fn config(&self) -> &HardwareConfig;
    fn ledger(&self) -> &Ledger;
    fn ledger_(&mut self) -> &mut Ledger;
    fn groups(&self) -> &IndexMap<String, ChannelGroup>;
    fn groups_(&mut self) -> &mut IndexMap<String, ChannelGroup>;
    fn ledger_and_groups_(&mut self) -> (&mut Ledger, &mut IndexMap<String, ChannelGroup>);

    fn check_channel(&self, channel: usize) -> Result<()> {
        let num_channels = self.config().num_channels();
        if channel >= num_channels {
            return Err(CompileError::ChannelIndexOutOfRange {
                channel,
                num_channels,
            });
        }
        Ok(())
    }

    /// Registers a group under its name.
    ///
    /// Fails if the name is taken or if the group drives a channel the card
    /// does not have.
    fn add_group(&mut self, group: ChannelGroup) -> Result<()> {
        let name = group.name().to_string();
        if self.groups().contains_key(&name) {
            return Err(CompileError::DuplicateGroup(name));
        }
        for channel in group.channels() {
            self.check_channel(channel)?;
        }
        self.groups_().insert(name, group);
        Ok(())
    }

    fn add_grey_code_group(
        &mut self,
        name: &str,
        channels: Vec<usize>,
        profiles: IndexMap<String, Vec<bool>>,
        t: f64,
        profile_delay: f64,
    ) -> Result<()> {
        let group = GreyCodeGroup::new(name, channels, profiles, t, profile_delay)?;
        self.add_group(ChannelGroup::GreyCode(group))
    }

    /// Registers a switch; `profiles` defaults to `{"on": true, "off": false}`.
    fn add_switch(
        &mut self,
        name: &str,
        channel: usize,
        profiles: Option<HashMap<String, bool>>,
        offset: f64,
    ) -> Result<()> {
        self.add_group(ChannelGroup::Switch(Switch::new(name, channel, profiles, offset)))
    }

    /// Switches group `group` to profile `name` at time `t`.
    ///
    /// Returns the time of the last recorded change, which may be later than
    /// `t` for grey-code groups.
    fn profile(&mut self, group: &str, t: f64, name: &str) -> Result<f64> {
        let (ledger, groups) = self.ledger_and_groups_();
        let group = groups
            .get_mut(group)
            .ok_or_else(|| CompileError::UnknownGroup(group.to_string()))?;
        group.profile(ledger, t, name)
    }

    /// Writes every bit of profile `name`; equivalent to `profile` for switches.
    fn initialize(&mut self, group: &str, t: f64, name: &str) -> Result<f64> {
        let (ledger, groups) = self.ledger_and_groups_();
        match groups.get_mut(group) {
            Some(ChannelGroup::GreyCode(grey)) => grey.initialize_profile(ledger, t, name),
            Some(other) => other.profile(ledger, t, name),
            None => Err(CompileError::UnknownGroup(group.to_string())),
        }
    }

    /// Records a single level change on `channel` at time `t`.
    fn raw(&mut self, t: f64, channel: usize, state: bool) -> Result<f64> {
        self.check_channel(channel)?;
        Ok(self.ledger_().raw(t, channel, state))
    }

    /// Records `repeats` repetitions of `period_fn` starting at `t0` and marks
    /// them as a repeat region.
    ///
    /// `period_fn` records one repetition starting at the given time and
    /// returns its end time. Returns the end time of the last repetition.
    fn mark_repeat<F>(&mut self, t0: f64, period_fn: F, repeats: u64) -> Result<f64>
    where
        Self: Sized,
        F: FnMut(&mut Self, f64) -> Result<f64>,
    {
        let start_index = self.ledger().len();
        let unrolled = match unroll_repeats(self, t0, repeats, period_fn) {
            Ok(unrolled) => unrolled,
            Err(err) => {
                self.ledger_().truncate(start_index);
                return Err(err);
            }
        };
        let Some((dt, tf)) = unrolled else {
            return Ok(t0);
        };
        let config = self.config().clone();
        let span = RepeatSpan {
            t0,
            dt,
            tf,
            repeats,
            start_index,
            stop_index: self.ledger().len(),
        };
        self.ledger_().register_repeat(&config, span);
        Ok(tf)
    }

    /// Compiles the current ledger without consuming it.
    fn compile_artifact(&self) -> Result<Artifact> {
        compile(self.config(), self.ledger())
    }

    /// Compiles the current ledger, then starts a fresh iteration.
    fn compile(&mut self) -> Result<Artifact> {
        let artifact = self.compile_artifact()?;
        self.clear();
        Ok(artifact)
    }

    /// Per-sample signal of the current ledger, shape `(num_channels, samples)`.
    fn calc_signal(&self) -> Result<Array2<u8>> {
        let artifact = self.compile_artifact()?;
        Ok(render(&artifact, self.config())?)
    }

    /// Drops everything recorded and resets every group.
    fn clear(&mut self) {
        self.ledger_().clear();
        for group in self.groups_().values_mut() {
            group.reset();
        }
    }
}

/// Reads a python profile table, accepting `True`/`False` or `1`/`0` bits.
pub fn extract_bit(obj: &PyAny) -> PyResult<bool> {
    match obj.extract::<bool>() {
        Ok(bit) => Ok(bit),
        Err(_) => Ok(obj.extract::<i64>()? != 0),
    }
}

pub fn extract_grey_profiles(profiles: &PyDict) -> PyResult<IndexMap<String, Vec<bool>>> {
    let mut table = IndexMap::new();
    for (name, bits) in profiles.iter() {
        let bits = bits
            .iter()?
            .map(|bit| extract_bit(bit?))
            .collect::<PyResult<Vec<bool>>>()?;
        table.insert(name.extract::<String>()?, bits);
    }
    Ok(table)
}

pub fn extract_switch_profiles(profiles: &PyDict) -> PyResult<HashMap<String, bool>> {
    profiles
        .iter()
        .map(|(name, bit)| -> PyResult<(String, bool)> {
            Ok((name.extract::<String>()?, extract_bit(bit)?))
        })
        .collect()
}

/// Generates the [`BaseSequencer`] field accessors and python wrappers for a
/// struct with `config`, `ledger` and `groups` fields.
///
/// PyO3 cannot expose trait methods directly, so every trait method that
/// python needs gets a thin `#[pymethods]` wrapper here. `mark_repeat` takes a
/// python callable and is implemented separately on [`Sequencer`].
///
/// Usage:
/// ```rust
/// use pulsecompiler_backend::*;
/// use pyo3::prelude::*;
/// use indexmap::IndexMap;
///
/// #[pyclass]
/// struct LabSequencer {
///     config: HardwareConfig,
///     ledger: Ledger,
///     groups: IndexMap<String, ChannelGroup>,
///     shot: u32,
/// }
/// impl_seq_boilerplate!(LabSequencer);
///
/// #[pymethods]
/// impl LabSequencer {
///     #[new]
///     pub fn new(shot: u32) -> Self {
///         Self {
///             config: HardwareConfig::default(),
///             ledger: Ledger::new(),
///             groups: IndexMap::new(),
///             shot,
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_seq_boilerplate {
    ($seq_type: ty) => {
        impl $crate::sequencer::BaseSequencer for $seq_type {
            fn config(&self) -> &$crate::config::HardwareConfig {
                &self.config
            }
            fn ledger(&self) -> &$crate::ledger::Ledger {
                &self.ledger
            }
            fn ledger_(&mut self) -> &mut $crate::ledger::Ledger {
                &mut self.ledger
            }
            fn groups(&self) -> &indexmap::IndexMap<String, $crate::channel::ChannelGroup> {
                &self.groups
            }
            fn groups_(&mut self) -> &mut indexmap::IndexMap<String, $crate::channel::ChannelGroup> {
                &mut self.groups
            }
            fn ledger_and_groups_(
                &mut self,
            ) -> (
                &mut $crate::ledger::Ledger,
                &mut indexmap::IndexMap<String, $crate::channel::ChannelGroup>,
            ) {
                (&mut self.ledger, &mut self.groups)
            }
        }

        #[pymethods]
        impl $seq_type {
            #[pyo3(name = "add_grey_code_group", signature = (name, channels, profiles, t=0., profile_delay=None))]
            pub fn py_add_grey_code_group(
                &mut self,
                name: &str,
                channels: Vec<usize>,
                profiles: &pyo3::types::PyDict,
                t: f64,
                profile_delay: Option<f64>,
            ) -> PyResult<()> {
                let profiles = $crate::sequencer::extract_grey_profiles(profiles)?;
                let profile_delay = profile_delay.unwrap_or($crate::channel::DEFAULT_PROFILE_DELAY);
                Ok($crate::sequencer::BaseSequencer::add_grey_code_group(
                    self, name, channels, profiles, t, profile_delay,
                )?)
            }

            #[pyo3(name = "add_switch", signature = (name, channel, profiles=None, offset=0.))]
            pub fn py_add_switch(
                &mut self,
                name: &str,
                channel: usize,
                profiles: Option<&pyo3::types::PyDict>,
                offset: f64,
            ) -> PyResult<()> {
                let profiles = profiles
                    .map($crate::sequencer::extract_switch_profiles)
                    .transpose()?;
                Ok($crate::sequencer::BaseSequencer::add_switch(
                    self, name, channel, profiles, offset,
                )?)
            }

            #[pyo3(name = "profile")]
            pub fn py_profile(&mut self, group: &str, t: f64, name: &str) -> PyResult<f64> {
                Ok($crate::sequencer::BaseSequencer::profile(self, group, t, name)?)
            }

            #[pyo3(name = "initialize")]
            pub fn py_initialize(&mut self, group: &str, t: f64, name: &str) -> PyResult<f64> {
                Ok($crate::sequencer::BaseSequencer::initialize(self, group, t, name)?)
            }

            #[pyo3(name = "raw")]
            pub fn py_raw(&mut self, t: f64, channel: usize, state: bool) -> PyResult<f64> {
                Ok($crate::sequencer::BaseSequencer::raw(self, t, channel, state)?)
            }

            /// Returns `(script, waveforms_xml)` and starts a fresh iteration.
            #[pyo3(name = "compile")]
            pub fn py_compile(&mut self) -> PyResult<(String, String)> {
                let artifact = $crate::sequencer::BaseSequencer::compile(self)?;
                Ok((artifact.script.to_string(), artifact.waveforms_xml()))
            }

            /// Full `<script>`/`<waveforms>` document of the current ledger,
            /// without discarding it.
            pub fn to_xml(&self) -> PyResult<String> {
                let artifact = $crate::sequencer::BaseSequencer::compile_artifact(self)?;
                Ok(artifact.to_xml())
            }

            #[pyo3(name = "calc_signal")]
            pub fn py_calc_signal(&self, py: Python) -> PyResult<PyObject> {
                let arr = $crate::sequencer::BaseSequencer::calc_signal(self)?;
                Ok(numpy::PyArray::from_array(py, &arr).to_object(py))
            }

            #[pyo3(name = "clear")]
            pub fn py_clear(&mut self) {
                $crate::sequencer::BaseSequencer::clear(self);
            }

            pub fn num_transitions(&self) -> usize {
                $crate::sequencer::BaseSequencer::ledger(self).len()
            }

            pub fn group_names(&self) -> Vec<String> {
                $crate::sequencer::BaseSequencer::groups(self).keys().cloned().collect()
            }

            #[getter]
            pub fn clock_rate(&self) -> f64 {
                $crate::sequencer::BaseSequencer::config(self).clock_rate()
            }

            #[getter]
            pub fn units(&self) -> f64 {
                $crate::sequencer::BaseSequencer::config(self).units()
            }

            #[getter]
            pub fn num_channels(&self) -> usize {
                $crate::sequencer::BaseSequencer::config(self).num_channels()
            }

            #[getter]
            pub fn alignment_quantum(&self) -> u64 {
                $crate::sequencer::BaseSequencer::config(self).alignment_quantum()
            }

            #[getter]
            pub fn min_stable_wait_cycles(&self) -> u64 {
                $crate::sequencer::BaseSequencer::config(self).min_stable_wait_cycles()
            }

            #[getter]
            pub fn max_wait_cycles(&self) -> u64 {
                $crate::sequencer::BaseSequencer::config(self).max_wait_cycles()
            }
        }
    };
}

/// Records and compiles the digital output of one card.
///
/// # Example (python)
/// ```python
/// from pulsecompiler_backend import Sequencer
///
/// seq = Sequencer(clock_rate=1e6, units=1e-3, num_channels=40)
/// seq.add_grey_code_group("mot", [32, 33, 34], {"MOT": (0, 0, 0), "off": (0, 1, 0)})
/// seq.add_switch("shutter", 36)
/// t = seq.profile("mot", 1.0, "off")
/// seq.profile("shutter", t, "on")
/// script, waveforms = seq.compile()
/// ```
#[pyclass]
pub struct Sequencer {
    config: HardwareConfig,
    ledger: Ledger,
    groups: IndexMap<String, ChannelGroup>,
}

impl Sequencer {
    pub fn with_config(config: HardwareConfig) -> Self {
        Self {
            config,
            ledger: Ledger::new(),
            groups: IndexMap::new(),
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::with_config(HardwareConfig::default())
    }
}

#[pymethods]
impl Sequencer {
    #[new]
    #[pyo3(signature = (
        clock_rate=1000.,
        units=1.,
        num_channels=32,
        alignment_quantum=1,
        min_stable_wait_cycles=0,
        max_wait_cycles=HSDIO_MAX_WAIT_CYCLES
    ))]
    pub fn new(
        clock_rate: f64,
        units: f64,
        num_channels: usize,
        alignment_quantum: u64,
        min_stable_wait_cycles: u64,
        max_wait_cycles: u64,
    ) -> PyResult<Self> {
        let config = HardwareConfig::new(
            clock_rate,
            units,
            num_channels,
            alignment_quantum,
            min_stable_wait_cycles,
            max_wait_cycles,
        )?;
        Ok(Self::with_config(config))
    }

    /// Python counterpart of [`BaseSequencer::mark_repeat`].
    ///
    /// `period_fn(t)` records one repetition through this sequencer and returns
    /// its end time. No borrow is held while it runs.
    #[pyo3(name = "mark_repeat")]
    pub fn py_mark_repeat(
        slf: &PyCell<Self>,
        t0: f64,
        period_fn: &PyAny,
        repeats: u64,
    ) -> PyResult<f64> {
        let start_index = slf.borrow().ledger.len();
        let unrolled = unroll_repeats(&mut (), t0, repeats, |_, t| {
            period_fn.call1((t,))?.extract::<f64>()
        });
        let unrolled = match unrolled {
            Ok(unrolled) => unrolled,
            Err(err) => {
                slf.borrow_mut().ledger.truncate(start_index);
                return Err(err);
            }
        };
        let Some((dt, tf)) = unrolled else {
            return Ok(t0);
        };
        let mut seq = slf.borrow_mut();
        let config = seq.config.clone();
        let span = RepeatSpan {
            t0,
            dt,
            tf,
            repeats,
            start_index,
            stop_index: seq.ledger.len(),
        };
        seq.ledger.register_repeat(&config, span);
        Ok(tf)
    }
}

impl_seq_boilerplate!(Sequencer);

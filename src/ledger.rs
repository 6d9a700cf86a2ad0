//! The transition ledger: raw level-change requests in arrival order.
//!
//! Channel groups and direct `raw` calls append [`Transition`]s to a [`Ledger`]
//! through the [`TransitionSink`] trait. The ledger imposes no time ordering;
//! arrival order is kept and later serves as the tie-break when several
//! transitions quantize to the same sample.
//!
//! The ledger also keeps the bookkeeping for repeat regions
//! ([`RepeatRegion`]), spans that were recorded by running a period function
//! several times in a row. The body of every repetition is recorded in full,
//! so compiling a ledger with or without regions yields the same timing.

use log::{debug, warn};

use crate::config::HardwareConfig;
use crate::utils::is_near_integer;

/// A single requested level change.
///
/// `time` is in caller units (see [`HardwareConfig::units`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub time: f64,
    pub channel: usize,
    pub state: bool,
}

impl Transition {
    pub fn new(time: f64, channel: usize, state: bool) -> Self {
        Self {
            time,
            channel,
            state,
        }
    }
}

/// Anything that accepts level-change requests.
pub trait TransitionSink {
    fn add_transition(&mut self, time: f64, channel: usize, state: bool);
}

/// A span recorded by [`Ledger::mark_repeat`] or [`Ledger::register_repeat`].
///
/// `start_index..stop_index` is the range of ledger entries produced by the
/// repetitions; `tf` is the time returned by the last repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatRegion {
    pub t0: f64,
    pub dt: f64,
    pub tf: f64,
    pub repeats: u64,
    pub cycles_per_repeat: u64,
    pub start_index: usize,
    pub stop_index: usize,
}

/// Raw measurements of a finished repetition run, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatSpan {
    pub t0: f64,
    pub dt: f64,
    pub tf: f64,
    pub repeats: u64,
    pub start_index: usize,
    pub stop_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    transitions: Vec<Transition>,
    repeat_regions: Vec<RepeatRegion>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Records a single level change and returns `time` unchanged.
    pub fn raw(&mut self, time: f64, channel: usize, state: bool) -> f64 {
        self.append(Transition::new(time, channel, state));
        time
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn repeat_regions(&self) -> &[RepeatRegion] {
        &self.repeat_regions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.repeat_regions.clear();
    }

    /// Drops every transition past the first `len`, along with any repeat
    /// region that covered them.
    pub fn truncate(&mut self, len: usize) {
        self.transitions.truncate(len);
        self.repeat_regions.retain(|region| region.stop_index <= len);
    }

    /// Runs `period_fn` `repeats` times starting at `t0` and records the span.
    ///
    /// `period_fn` receives the ledger and the start time of one repetition,
    /// records that repetition's transitions and returns its end time. The
    /// period `dt` is measured on the first repetition. Returns the end time of
    /// the last repetition (`t0` if `repeats == 0`).
    ///
    /// ```
    /// use pulsecompiler_backend::config::HardwareConfig;
    /// use pulsecompiler_backend::ledger::Ledger;
    ///
    /// let config = HardwareConfig::default();
    /// let mut ledger = Ledger::new();
    /// let tf = ledger
    ///     .mark_repeat(&config, 10., |ledger, t| {
    ///         ledger.raw(t, 0, true);
    ///         ledger.raw(t + 0.5, 0, false);
    ///         Ok(t + 1.)
    ///     }, 3)
    ///     .unwrap();
    /// assert_eq!(tf, 13.);
    /// assert_eq!(ledger.len(), 6);
    /// assert_eq!(ledger.repeat_regions()[0].cycles_per_repeat, 1000);
    /// ```
    pub fn mark_repeat<F>(
        &mut self,
        config: &HardwareConfig,
        t0: f64,
        period_fn: F,
        repeats: u64,
    ) -> crate::error::Result<f64>
    where
        F: FnMut(&mut Self, f64) -> crate::error::Result<f64>,
    {
        let start_index = self.len();
        let unrolled = match unroll_repeats(self, t0, repeats, period_fn) {
            Ok(unrolled) => unrolled,
            Err(err) => {
                self.truncate(start_index);
                return Err(err);
            }
        };
        let Some((dt, tf)) = unrolled else {
            return Ok(t0);
        };
        let span = RepeatSpan {
            t0,
            dt,
            tf,
            repeats,
            start_index,
            stop_index: self.len(),
        };
        self.register_repeat(config, span);
        Ok(tf)
    }

    /// Validates and stores a finished repetition run.
    ///
    /// A period that is not a whole number of samples or that is shorter than
    /// the stability threshold only produces a warning. A second region with
    /// the same `t0` is dropped and `None` is returned.
    pub fn register_repeat(
        &mut self,
        config: &HardwareConfig,
        span: RepeatSpan,
    ) -> Option<&RepeatRegion> {
        if self.repeat_regions.iter().any(|region| region.t0 == span.t0) {
            debug!("A repeat region already starts at t0={}, ignoring the new one", span.t0);
            return None;
        }
        let cycles = config.samples(span.dt);
        if !is_near_integer(cycles) {
            warn!(
                "Repeat period dt={} at t0={} is {} samples, which is not an integer; it will be rounded",
                span.dt, span.t0, cycles
            );
        }
        let cycles_per_repeat = cycles.max(0.).round_ties_even() as u64;
        if cycles_per_repeat < config.min_stable_wait_cycles() {
            warn!(
                "Repeat period at t0={} is {} samples, below the stability threshold of {} samples",
                span.t0,
                cycles_per_repeat,
                config.min_stable_wait_cycles()
            );
        }
        self.repeat_regions.push(RepeatRegion {
            t0: span.t0,
            dt: span.dt,
            tf: span.tf,
            repeats: span.repeats,
            cycles_per_repeat,
            start_index: span.start_index,
            stop_index: span.stop_index,
        });
        self.repeat_regions.last()
    }
}

impl TransitionSink for Ledger {
    fn add_transition(&mut self, time: f64, channel: usize, state: bool) {
        self.append(Transition::new(time, channel, state));
    }
}

/// Calls `period_fn` `repeats` times, chaining each returned end time into the
/// next call. Returns `(dt, tf)`, or `None` when there is nothing to repeat.
pub fn unroll_repeats<C, F, E>(
    ctx: &mut C,
    t0: f64,
    repeats: u64,
    mut period_fn: F,
) -> std::result::Result<Option<(f64, f64)>, E>
where
    C: ?Sized,
    F: FnMut(&mut C, f64) -> std::result::Result<f64, E>,
{
    if repeats == 0 {
        warn!("Repeat at t0={t0} requested with 0 repeats; nothing is recorded");
        return Ok(None);
    }
    let mut t = period_fn(ctx, t0)?;
    let dt = t - t0;
    for _ in 1..repeats {
        t = period_fn(ctx, t)?;
    }
    Ok(Some((dt, t)))
}

#[cfg(test)]
mod test {
    use crate::ledger::*;

    fn pulse(ledger: &mut Ledger, t: f64) -> crate::error::Result<f64> {
        ledger.raw(t, 1, true);
        ledger.raw(t + 2., 1, false);
        Ok(t + 4.)
    }

    #[test]
    fn keeps_arrival_order() {
        let mut ledger = Ledger::new();
        ledger.raw(5., 0, true);
        ledger.raw(1., 1, true);
        ledger.add_transition(3., 2, false);
        let times: Vec<f64> = ledger.transitions().iter().map(|tr| tr.time).collect();
        assert_eq!(times, vec![5., 1., 3.]);
    }

    #[test]
    fn mark_repeat_unrolls_the_body() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        ledger.raw(0., 0, true);
        let tf = ledger.mark_repeat(&config, 1., pulse, 5).unwrap();
        assert_eq!(tf, 21.);
        assert_eq!(ledger.len(), 1 + 2 * 5);

        let region = &ledger.repeat_regions()[0];
        assert_eq!(region.t0, 1.);
        assert_eq!(region.dt, 4.);
        assert_eq!(region.tf, 21.);
        assert_eq!(region.repeats, 5);
        assert_eq!(region.cycles_per_repeat, 4000);
        assert_eq!((region.start_index, region.stop_index), (1, 11));
    }

    #[test]
    fn zero_repeats_records_nothing() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        let tf = ledger.mark_repeat(&config, 7., pulse, 0).unwrap();
        assert_eq!(tf, 7.);
        assert!(ledger.is_empty());
        assert!(ledger.repeat_regions().is_empty());
    }

    #[test]
    fn duplicate_t0_is_dropped() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        ledger.mark_repeat(&config, 0., pulse, 2).unwrap();
        ledger.mark_repeat(&config, 0., pulse, 3).unwrap();
        assert_eq!(ledger.repeat_regions().len(), 1);
        assert_eq!(ledger.repeat_regions()[0].repeats, 2);
        // The body of the rejected region is still recorded
        assert_eq!(ledger.len(), 2 * 2 + 2 * 3);
    }

    #[test]
    fn fractional_period_is_rounded() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        ledger
            .mark_repeat(&config, 0., |_, t| Ok(t + 0.0026), 2)
            .unwrap();
        // 2.6 samples per period rounds to 3
        assert_eq!(ledger.repeat_regions()[0].cycles_per_repeat, 3);
    }

    #[test]
    fn short_period_is_still_registered() {
        let config = HardwareConfig::default()
            .with_min_stable_wait_cycles(10)
            .unwrap();
        let mut ledger = Ledger::new();
        let tf = ledger
            .mark_repeat(&config, 0., |ledger, t| {
                ledger.raw(t, 0, true);
                Ok(t + 0.003)
            }, 4)
            .unwrap();
        assert_eq!(tf, 0.012);
        let region = &ledger.repeat_regions()[0];
        assert_eq!(region.cycles_per_repeat, 3);
        assert!(region.cycles_per_repeat < config.min_stable_wait_cycles());
        assert_eq!((region.start_index, region.stop_index), (0, 4));
    }

    #[test]
    fn failed_repeat_leaves_no_partial_body() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        ledger.raw(0., 0, true);
        let result = ledger.mark_repeat(
            &config,
            1.,
            |ledger, t| {
                if t >= 9. {
                    return Err(crate::error::CompileError::InvalidTime(t));
                }
                pulse(ledger, t)
            },
            3,
        );
        assert_eq!(result, Err(crate::error::CompileError::InvalidTime(9.)));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.repeat_regions().is_empty());
    }

    #[test]
    fn period_errors_propagate() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        let result = ledger.mark_repeat(
            &config,
            0.,
            |_, t| Err(crate::error::CompileError::InvalidTime(t)),
            2,
        );
        assert!(result.is_err());
        assert!(ledger.repeat_regions().is_empty());
    }

    #[test]
    fn clear_empties_everything() {
        let config = HardwareConfig::default();
        let mut ledger = Ledger::new();
        ledger.mark_repeat(&config, 0., pulse, 2).unwrap();
        ledger.clear();
        assert!(ledger.is_empty());
        assert!(ledger.repeat_regions().is_empty());
    }
}

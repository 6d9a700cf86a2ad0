//! Hardware configuration consumed by the compiler.
//!
//! A [`HardwareConfig`] is validated once, at construction, and is read-only
//! afterwards. The compile entry point borrows it for the whole pass, so a
//! compile always sees one consistent snapshot.

use crate::error::{CompileError, Result};

/// Longest single `wait` the card accepts, in sample clock cycles (2^29).
pub const HSDIO_MAX_WAIT_CYCLES: u64 = 536_870_912;

/// Describes the sample clock and the timing constraints of the card.
///
/// # Fields
/// - `clock_rate`: samples per second per channel.
/// - `units`: multiplier applied to every caller-supplied time value
///   (e.g. `1e-3` when the caller works in milliseconds).
/// - `num_channels`: number of digital lines driven by the card.
/// - `alignment_quantum`: smallest addressable block of samples; every wait and
///   every waveform length is a multiple of it.
/// - `min_stable_wait_cycles`: waits shorter than this are not allowed between
///   two waveforms; such frames are fused into one explicit waveform instead.
/// - `max_wait_cycles`: ceiling of a single `wait` instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareConfig {
    clock_rate: f64,
    units: f64,
    num_channels: usize,
    alignment_quantum: u64,
    min_stable_wait_cycles: u64,
    max_wait_cycles: u64,
}

impl HardwareConfig {
    /// Builds and validates a configuration.
    ///
    /// ```
    /// use pulsecompiler_backend::config::HardwareConfig;
    ///
    /// let config = HardwareConfig::new(1000., 1e-3, 8, 2, 4, 1 << 20).unwrap();
    /// assert_eq!(config.samples(2.5), 2.5);
    ///
    /// // The ceiling must itself be aligned to the quantum
    /// assert!(HardwareConfig::new(1000., 1e-3, 8, 2, 4, 7).is_err());
    /// ```
    pub fn new(
        clock_rate: f64,
        units: f64,
        num_channels: usize,
        alignment_quantum: u64,
        min_stable_wait_cycles: u64,
        max_wait_cycles: u64,
    ) -> Result<Self> {
        let config = Self {
            clock_rate,
            units,
            num_channels,
            alignment_quantum,
            min_stable_wait_cycles,
            max_wait_cycles,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(CompileError::InvalidConfig(reason));
        if !(self.clock_rate.is_finite() && self.clock_rate > 0.) {
            return invalid(format!("clock_rate must be positive, got {}", self.clock_rate));
        }
        if !(self.units.is_finite() && self.units > 0.) {
            return invalid(format!("units must be positive, got {}", self.units));
        }
        if self.num_channels == 0 {
            return invalid("num_channels must be at least 1".to_string());
        }
        if self.alignment_quantum == 0 {
            return invalid("alignment_quantum must be at least 1".to_string());
        }
        if self.max_wait_cycles < self.alignment_quantum
            || self.max_wait_cycles % self.alignment_quantum != 0
        {
            return invalid(format!(
                "max_wait_cycles {} must be a non-zero multiple of alignment_quantum {}",
                self.max_wait_cycles, self.alignment_quantum
            ));
        }
        if self.min_stable_wait_cycles > self.max_wait_cycles {
            return invalid(format!(
                "min_stable_wait_cycles {} exceeds max_wait_cycles {}",
                self.min_stable_wait_cycles, self.max_wait_cycles
            ));
        }
        Ok(())
    }

    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }
    pub fn units(&self) -> f64 {
        self.units
    }
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }
    pub fn alignment_quantum(&self) -> u64 {
        self.alignment_quantum
    }
    pub fn min_stable_wait_cycles(&self) -> u64 {
        self.min_stable_wait_cycles
    }
    pub fn max_wait_cycles(&self) -> u64 {
        self.max_wait_cycles
    }

    /// Unrounded sample count for a caller time, `(time * clock_rate) * units`.
    ///
    /// The factors are applied left to right so half-sample ties round the
    /// same way as `rint(times * clock_rate * units)`.
    pub fn samples(&self, time: f64) -> f64 {
        time * self.clock_rate * self.units
    }

    pub fn with_timebase(self, clock_rate: f64, units: f64) -> Result<Self> {
        Self::new(
            clock_rate,
            units,
            self.num_channels,
            self.alignment_quantum,
            self.min_stable_wait_cycles,
            self.max_wait_cycles,
        )
    }

    pub fn with_num_channels(self, num_channels: usize) -> Result<Self> {
        Self::new(
            self.clock_rate,
            self.units,
            num_channels,
            self.alignment_quantum,
            self.min_stable_wait_cycles,
            self.max_wait_cycles,
        )
    }

    pub fn with_alignment_quantum(self, alignment_quantum: u64) -> Result<Self> {
        Self::new(
            self.clock_rate,
            self.units,
            self.num_channels,
            alignment_quantum,
            self.min_stable_wait_cycles,
            self.max_wait_cycles,
        )
    }

    pub fn with_min_stable_wait_cycles(self, min_stable_wait_cycles: u64) -> Result<Self> {
        Self::new(
            self.clock_rate,
            self.units,
            self.num_channels,
            self.alignment_quantum,
            min_stable_wait_cycles,
            self.max_wait_cycles,
        )
    }

    pub fn with_max_wait_cycles(self, max_wait_cycles: u64) -> Result<Self> {
        Self::new(
            self.clock_rate,
            self.units,
            self.num_channels,
            self.alignment_quantum,
            self.min_stable_wait_cycles,
            max_wait_cycles,
        )
    }
}

impl Default for HardwareConfig {
    /// 1 kS/s clock, unit multiplier 1, 32 channels, quantum 1, no frame
    /// fusion, and the card's 2^29-cycle wait ceiling.
    fn default() -> Self {
        Self {
            clock_rate: 1000.,
            units: 1.,
            num_channels: 32,
            alignment_quantum: 1,
            min_stable_wait_cycles: 0,
            max_wait_cycles: HSDIO_MAX_WAIT_CYCLES,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::config::*;

    #[test]
    fn default_is_valid() {
        let config = HardwareConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_wait_cycles(), 1 << 29);
    }

    #[test]
    fn rejects_bad_values() {
        let base = HardwareConfig::default();
        assert!(base.clone().with_timebase(0., 1.).is_err());
        assert!(base.clone().with_timebase(1e6, f64::NAN).is_err());
        assert!(base.clone().with_num_channels(0).is_err());
        assert!(base.clone().with_alignment_quantum(0).is_err());
        // 2^29 is not a multiple of 3
        assert!(base.clone().with_alignment_quantum(3).is_err());
        assert!(base
            .clone()
            .with_min_stable_wait_cycles(HSDIO_MAX_WAIT_CYCLES + 1)
            .is_err());
        assert!(base.clone().with_max_wait_cycles(0).is_err());
        assert!(base.clone().with_max_wait_cycles(HSDIO_MAX_WAIT_CYCLES / 2).is_ok());
    }

    #[test]
    fn error_names_the_offending_field() {
        let err = HardwareConfig::default().with_num_channels(0).unwrap_err();
        match err {
            CompileError::InvalidConfig(reason) => assert!(reason.contains("num_channels")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}

// The "utils" module holds the numeric helpers shared by the compile stages
use std::time::Instant;

use crate::error::{CompileError, Result};

/// Tolerance used when checking that a floating-point sample count is integral.
pub const SAMPLE_TOLERANCE: f64 = 1e-6;

/// Converts a caller time into a sample index, rounding half to even.
///
/// Negative, NaN, infinite, or out-of-range times are rejected.
///
/// ```
/// use pulsecompiler_backend::utils::quantize;
///
/// assert_eq!(quantize(2.5, 1.0, 1.0).unwrap(), 2);
/// assert_eq!(quantize(3.5, 1.0, 1.0).unwrap(), 4);
/// assert!(quantize(-1.0, 1.0, 1.0).is_err());
/// ```
pub fn quantize(time: f64, clock_rate: f64, units: f64) -> Result<u64> {
    if !time.is_finite() || time < 0. {
        return Err(CompileError::InvalidTime(time));
    }
    let samples = (time * clock_rate * units).round_ties_even();
    if !samples.is_finite() || samples >= u64::MAX as f64 {
        return Err(CompileError::InvalidTime(time));
    }
    Ok(samples as u64)
}

pub fn is_near_integer(value: f64) -> bool {
    (value - value.round()).abs() <= SAMPLE_TOLERANCE
}

// Utility class for timing the compile stages
pub struct TickTimer {
    last: Instant,
}

impl TickTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the previous tick.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let diff = now.duration_since(self.last).as_secs_f64() * 1e3;
        self.last = now;
        diff
    }

    pub fn tick_log(&mut self, msg: &str) -> f64 {
        let diff = self.tick();
        log::debug!("{}: {:.3} ms", msg, diff);
        diff
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use crate::utils::*;

    #[test]
    fn quantize_rounds_half_to_even() {
        assert_eq!(quantize(0.5, 1., 1.).unwrap(), 0);
        assert_eq!(quantize(1.5, 1., 1.).unwrap(), 2);
        assert_eq!(quantize(5.0005, 1000., 1e-3).unwrap(), 5);
        assert_eq!(quantize(1.25, 1000., 1.).unwrap(), 1250);
    }

    #[test]
    fn quantize_scales_clock_before_units() {
        // (2.0485 * 1e6) * 1e-3 is just above 2048.5; 2.0485 * (1e6 * 1e-3) is exactly on the tie
        assert_eq!(quantize(2.0485, 1e6, 1e-3).unwrap(), 2049);
    }

    #[test]
    fn quantize_rejects_malformed_time() {
        assert_eq!(quantize(f64::NAN, 1., 1.).is_err(), true);
        assert_eq!(quantize(f64::INFINITY, 1., 1.).is_err(), true);
        assert_eq!(quantize(-0.1, 1., 1.).unwrap_err(), CompileError::InvalidTime(-0.1));
        assert_eq!(quantize(1e30, 1., 1.).is_err(), true);
    }

    #[test]
    fn near_integer() {
        assert!(is_near_integer(3.0000000001));
        assert!(!is_near_integer(3.4));
    }
}

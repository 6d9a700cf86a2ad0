//! # Pulse-sequence compiler backend
//!
//! Compiles timestamped per-channel level requests for a high-speed digital
//! output card into a deduplicated set of waveforms and a `generate`/`wait`
//! script.
//!
//! ## Pipeline
//!
//! - [`channel`]: grey-code groups and switches turn named profiles into raw
//!   level changes.
//! - [`ledger`]: the level changes of one experiment iteration, in arrival
//!   order, plus repeat-region bookkeeping.
//! - [`frame`]: quantization to sample indices and merging into frames.
//! - [`timing`]: alignment of waits to the hardware quantum.
//! - [`waveform`], [`script`], [`assembler`]: emission of the artifact.
//! - [`replay`]: the artifact read back, for verification and plotting.
//! - [`sequencer`]: the [`Sequencer`] class tying it together, exposed to python.
//!
//! ## Example
//!
//! ```
//! use pulsecompiler_backend::*;
//!
//! let config = HardwareConfig::new(1000., 1e-3, 8, 1, 0, HSDIO_MAX_WAIT_CYCLES).unwrap();
//! let mut seq = Sequencer::with_config(config);
//! seq.add_switch("shutter", 3, None, 0.).unwrap();
//! seq.profile("shutter", 2., "on").unwrap();
//! seq.profile("shutter", 7., "off").unwrap();
//!
//! let artifact = seq.compile().unwrap();
//! assert_eq!(
//!     artifact.script.to_string(),
//!     "script main\n  generate w0\n  wait 2\n  generate w8\n  wait 5\n  generate w0\n  wait 1\nend script\n"
//! );
//! // w0 is defined once and referenced twice
//! assert_eq!(artifact.waveforms.len(), 2);
//! ```

use pyo3::prelude::*;

pub mod assembler;
pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod ledger;
pub mod replay;
pub mod script;
pub mod sequencer;
pub mod timing;
pub mod utils;
pub mod waveform;

pub use assembler::*;
pub use channel::*;
pub use config::*;
pub use error::*;
pub use frame::*;
pub use ledger::*;
pub use replay::*;
pub use script::*;
pub use sequencer::*;
pub use timing::*;
pub use utils::*;
pub use waveform::*;

#[pymodule]
fn pulsecompiler_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    pyo3_log::init();
    m.add_class::<Sequencer>()?;
    Ok(())
}

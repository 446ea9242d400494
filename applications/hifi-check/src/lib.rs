//! HiFi Check
//!
//! Command-line front end for `hifi-analysis`: loads configuration, reads and
//! writes WAV files, and prints analysis reports.
//!
//! This library exposes the I/O components for testing purposes.

pub mod config;
pub mod error;
pub mod wav;

pub use config::CheckConfig;
pub use error::{CheckError, Result};
pub use wav::{read_recording, write_stimulus, Recording};

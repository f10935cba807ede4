//! Logging utilities.
//!
//! The crate logs through the `log` facade only. [`init_logging`] installs an
//! `env_logger` backend for binaries and tests that do not bring their own.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};

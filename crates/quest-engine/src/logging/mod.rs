//! Logging utilities.
//!
//! Engines log through the `log` facade only; the binary decides whether to
//! install `env_logger` via [`init_logging`].

mod init;

pub use init::{LoggingConfig, init_logging};

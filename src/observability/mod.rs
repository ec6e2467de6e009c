//! Observability for the command-line client
//!
//! Structured logging to stderr; stdout stays reserved for command output.

pub mod logging;

pub use logging::{init_default_logging, init_logging, level_for_verbosity, LogFormat};

// Span macros for structured logging
pub use logging::mqtt_span;

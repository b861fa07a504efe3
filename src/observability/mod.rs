//! Observability for the bridge process
//!
//! Structured logging only; the bridge exposes no metrics or health endpoints.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::session_span;

//! Testing utilities and mock implementations
//!
//! This module provides test doubles for the broker session and the
//! measurement source, so the bridge can be tested without an MQTT broker or
//! a radio receiver.

pub mod mocks;

pub use mocks::*;

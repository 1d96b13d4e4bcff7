//! Shared foundation for the Compass compliance assistant.
//!
//! This crate carries the two things every other crate needs: the layered
//! application configuration (`config`) and the session chat transcript
//! (`transcript`). It deliberately knows nothing about HTTP or about how the
//! compliance crew is executed.

pub mod config;
pub mod transcript;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use transcript::{ChatRole, ChatTurn, Transcript};

//! Local model runtime onboarding.
//!
//! Detects a local Ollama runtime, waits for the user to install it when it
//! is missing, pulls the preferred model, and commits the provider settings
//! the assistant reads on startup.

pub mod commands;
pub mod config;
mod error;
pub mod logging;
pub mod settings;
pub mod setup;

pub use error::Error;

//! Client for a local Ollama runtime.
//!
//! This crate covers the pieces of onboarding that talk to the runtime
//! itself: a liveness probe, the installed-model inventory, and model pulls
//! with streamed progress. Absence of the runtime is an expected outcome,
//! so [`OllamaClient::probe`] and [`OllamaClient::has_model`] never fail and
//! [`OllamaClient::pull`] reports failure through its final progress event.
//!
//! # Example
//!
//! ```no_run
//! use onboard_ollama::OllamaClient;
//!
//! # async fn demo() -> Result<(), onboard_ollama::OllamaError> {
//! let client = OllamaClient::from_host("localhost")?;
//! if client.probe().await.is_running && !client.has_model("gpt-oss:20b").await {
//!     let ok = client
//!         .pull("gpt-oss:20b", |progress| {
//!             println!("{} {:?}", progress.status, progress.percent());
//!         })
//!         .await;
//!     println!("pulled: {ok}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod host;
mod progress;
mod status;

pub use client::{LocalModel, OllamaClient, DEFAULT_PROBE_TIMEOUT};
pub use host::{download_url, resolve_base_url, DEFAULT_HOST, DEFAULT_PORT};
pub use progress::{PullPhase, PullProgress};
pub use status::ServiceStatus;

use thiserror::Error;

/// Errors that can occur when talking to the runtime.
///
/// Only the inventory listing and client construction surface these
/// directly; probing and pulling fold them into their results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OllamaError {
    /// The configured host could not be turned into a base URL.
    #[error("Invalid Ollama host '{0}'")]
    InvalidHost(String),

    /// Transport failure (connection refused, timeout, TLS, ...).
    #[error("Request to Ollama failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The runtime answered with a non-success status.
    #[error("Ollama returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The runtime reported an error inside a streamed response.
    #[error("{0}")]
    Server(String),

    /// A response body was not the JSON we expected.
    #[error("Malformed response from Ollama: {0}")]
    Decode(#[from] serde_json::Error),

    /// The pull stream closed without a final `success` status.
    #[error("Pull ended before the model was ready")]
    Incomplete,
}

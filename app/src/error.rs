use derive_more::{Display, From};

use crate::config::ConfigError;
use crate::setup::SetupError;
use onboard_ollama::OllamaError;

#[derive(Debug, From, Display)]
pub enum Error {
    #[from]
    Config(ConfigError),

    #[from]
    Ollama(OllamaError),

    #[from]
    Setup(SetupError),

    #[from]
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl Error {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Error::Config(ConfigError::NoConfigDir) => {
                "Could not find a place to store settings on this system.".to_string()
            }
            Error::Config(e) => format!("Could not read or write settings: {}", e),
            Error::Ollama(OllamaError::InvalidHost(host)) => format!(
                "'{}' is not a valid Ollama host. Use something like localhost:11434.",
                host
            ),
            Error::Ollama(OllamaError::Http(_)) => {
                "Could not reach Ollama. Is it running?".to_string()
            }
            Error::Ollama(e) => e.to_string(),
            Error::Setup(e) => e.user_message(),
            Error::Io(e) => e.to_string(),
        }
    }
}

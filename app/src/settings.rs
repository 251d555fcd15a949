use std::time::Duration;

use onboard_ollama::{resolve_base_url, OllamaError, DEFAULT_HOST, DEFAULT_PROBE_TIMEOUT};

/// Model recommended for the assistant when running on Ollama
pub const DEFAULT_MODEL: &str = "gpt-oss:20b";

/// How often to look for the runtime while the user installs it
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const HOST_ENV: &str = "OLLAMA_HOST";
const MODEL_ENV: &str = "ONBOARD_MODEL";

/// Knobs for one setup session
#[derive(Debug, Clone, PartialEq)]
pub struct SetupSettings {
    /// Host as written to the assistant's config (`localhost`, `host:port`, URL)
    pub host: String,
    /// Model to check for and pull
    pub model: String,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    /// Give up waiting for the runtime after this long (`None` waits forever)
    pub poll_timeout: Option<Duration>,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_timeout: None,
        }
    }
}

impl SetupSettings {
    /// Defaults overridden by `OLLAMA_HOST` and `ONBOARD_MODEL`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(host) = lookup(HOST_ENV).filter(|v| !v.trim().is_empty()) {
            settings.host = host.trim().to_string();
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            settings.model = model.trim().to_string();
        }
        settings
    }

    /// Base URL the client should talk to
    pub fn base_url(&self) -> Result<String, OllamaError> {
        resolve_base_url(&self.host)
    }
}

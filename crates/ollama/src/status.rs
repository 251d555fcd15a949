use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of a single liveness probe - produced fresh every time, never updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Did the runtime answer the probe?
    pub is_running: bool,
    /// Extra facts gathered by the probe (`host`, `models`, `error`)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceStatus {
    pub const HOST: &'static str = "host";
    pub const MODELS: &'static str = "models";
    pub const ERROR: &'static str = "error";

    pub fn running(host: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(Self::HOST.to_string(), host.to_string());
        Self {
            is_running: true,
            metadata,
        }
    }

    pub fn not_running(host: &str, error: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(Self::HOST.to_string(), host.to_string());
        metadata.insert(Self::ERROR.to_string(), error.into());
        Self {
            is_running: false,
            metadata,
        }
    }

    pub fn with_model_count(mut self, count: usize) -> Self {
        self.metadata
            .insert(Self::MODELS.to_string(), count.to_string());
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.metadata.get(Self::HOST).map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.get(Self::ERROR).map(String::as_str)
    }

    pub fn model_count(&self) -> Option<usize> {
        self.metadata.get(Self::MODELS).and_then(|v| v.parse().ok())
    }
}

//! Seams between the setup flow and the runtime it drives.

use async_trait::async_trait;
use onboard_ollama::{OllamaClient, PullProgress, ServiceStatus};

/// Anything that can answer "is the runtime up?"
#[async_trait]
pub trait Prober: Send + Sync {
    /// Single liveness check. Absence is a normal answer, not an error.
    async fn probe(&self) -> ServiceStatus;
}

/// The runtime operations the setup flow needs
#[async_trait]
pub trait LocalService: Prober {
    async fn has_model(&self, name: &str) -> bool;

    /// Pull `name`. The last progress event is always terminal.
    async fn pull(&self, name: &str, on_progress: &mut (dyn FnMut(PullProgress) + Send)) -> bool;
}

#[async_trait]
impl Prober for OllamaClient {
    async fn probe(&self) -> ServiceStatus {
        OllamaClient::probe(self).await
    }
}

#[async_trait]
impl LocalService for OllamaClient {
    async fn has_model(&self, name: &str) -> bool {
        OllamaClient::has_model(self, name).await
    }

    async fn pull(&self, name: &str, on_progress: &mut (dyn FnMut(PullProgress) + Send)) -> bool {
        OllamaClient::pull(self, name, |progress| on_progress(progress)).await
    }
}

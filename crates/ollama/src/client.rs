use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::host::resolve_base_url;
use crate::progress::PullProgress;
use crate::status::ServiceStatus;
use crate::OllamaError;

/// Probe timeout: short so a hung connection can't stall polling.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect timeout for inventory and pull requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A model installed in the local runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl LocalModel {
    /// Does this entry satisfy a request for `name`?
    ///
    /// An untagged request matches the `:latest` tag.
    pub fn matches(&self, name: &str) -> bool {
        let candidates = std::iter::once(self.name.as_str()).chain(self.model.as_deref());
        for candidate in candidates {
            if candidate == name {
                return true;
            }
            if !name.contains(':') && candidate.strip_suffix(":latest") == Some(name) {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    // Older runtimes only read `name`
    name: &'a str,
    stream: bool,
}

/// One line of the newline-delimited pull stream.
#[derive(Debug, Deserialize)]
struct PullEvent {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for one Ollama runtime.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    /// Client with a short overall timeout, for liveness checks
    probe_client: reqwest::Client,
    /// Client without an overall timeout - pulls can take hours
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for an `OLLAMA_HOST`-style host value.
    pub fn from_host(host: &str) -> Result<Self, OllamaError> {
        Self::new(resolve_base_url(host)?, DEFAULT_PROBE_TIMEOUT)
    }

    /// Create a client for an already resolved base URL (e.g. `http://127.0.0.1:11434`).
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Result<Self, OllamaError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let probe_client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .connect_timeout(probe_timeout)
            .build()?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url,
            probe_client,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Single liveness check. Never fails: any problem means "not running".
    pub async fn probe(&self) -> ServiceStatus {
        let response = match self.probe_client.get(self.url("/api/tags")).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Ollama probe at {} failed: {}", self.base_url, e);
                return ServiceStatus::not_running(&self.base_url, e.to_string());
            }
        };

        if !response.status().is_success() {
            debug!(
                "Ollama probe at {} returned HTTP {}",
                self.base_url,
                response.status()
            );
            return ServiceStatus::not_running(
                &self.base_url,
                format!("HTTP {}", response.status()),
            );
        }

        let status = ServiceStatus::running(&self.base_url);
        // The count is informational; a body we can't read doesn't make the runtime absent.
        match response.json::<TagsResponse>().await {
            Ok(tags) => status.with_model_count(tags.models.len()),
            Err(e) => {
                debug!("Could not read model list from probe: {}", e);
                status
            }
        }
    }

    /// List the models installed in the runtime.
    pub async fn list_models(&self) -> Result<Vec<LocalModel>, OllamaError> {
        let response = self.client.get(self.url("/api/tags")).send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        let tags: TagsResponse = serde_json::from_slice(&bytes)?;
        Ok(tags.models)
    }

    /// Is `name` installed? An unreachable runtime counts as "no".
    pub async fn has_model(&self, name: &str) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|m| m.matches(name)),
            Err(e) => {
                debug!("Model check for '{}' failed: {}", name, e);
                false
            }
        }
    }

    /// Pull `name`, forwarding progress as it streams in.
    ///
    /// Returns `true` once the runtime reports success. Every failure
    /// (transport, HTTP status, error inside the stream, truncated stream)
    /// returns `false`. Either way the last event passed to `on_progress`
    /// is terminal, and a failed one carries the reason in `status`.
    pub async fn pull<F>(&self, name: &str, mut on_progress: F) -> bool
    where
        F: FnMut(PullProgress) + Send,
    {
        info!("Pulling model '{}' from {}", name, self.base_url);

        match self.stream_pull(name, &mut on_progress).await {
            Ok(total) => {
                info!("Model '{}' pulled successfully", name);
                on_progress(PullProgress::succeeded(total));
                true
            }
            Err(e) => {
                warn!("Pull of '{}' failed: {}", name, e);
                on_progress(PullProgress::failed(e.to_string()));
                false
            }
        }
    }

    /// Drive the pull stream. Returns the last known total size on success.
    async fn stream_pull<F>(&self, name: &str, on_progress: &mut F) -> Result<Option<u64>, OllamaError>
    where
        F: FnMut(PullProgress) + Send,
    {
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&PullRequest {
                model: name,
                name,
                stream: true,
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut last_total = None;
        let mut succeeded = false;

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if handle_line(&line, on_progress, &mut last_total)? {
                    succeeded = true;
                }
            }
        }

        // Last line may arrive without a trailing newline
        if handle_line(&buffer, on_progress, &mut last_total)? {
            succeeded = true;
        }

        if succeeded {
            Ok(last_total)
        } else {
            Err(OllamaError::Incomplete)
        }
    }
}

/// Parse one stream line and forward it. Returns `true` for the success line.
fn handle_line<F>(
    line: &[u8],
    on_progress: &mut F,
    last_total: &mut Option<u64>,
) -> Result<bool, OllamaError>
where
    F: FnMut(PullProgress) + Send,
{
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }

    let event: PullEvent = serde_json::from_str(text)?;

    if let Some(error) = event.error {
        return Err(OllamaError::Server(error));
    }

    if event.status == "success" {
        return Ok(true);
    }

    if event.total.is_some() {
        *last_total = event.total;
    }

    on_progress(PullProgress::running(event.status).with_bytes(event.completed, event.total));
    Ok(false)
}

/// Turn a non-success response into an error, reading the `{"error": ...}` body if present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OllamaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    Err(OllamaError::Status {
        status: status.as_u16(),
        message,
    })
}

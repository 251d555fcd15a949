//! Host resolution and platform download pages.

use reqwest::Url;

use crate::OllamaError;

/// Host value written to the assistant's configuration by default.
pub const DEFAULT_HOST: &str = "localhost";

/// Port Ollama listens on when none is given.
pub const DEFAULT_PORT: u16 = 11434;

/// Turn an `OLLAMA_HOST`-style value into a base URL without a trailing slash.
///
/// Accepts `localhost`, `host:port`, `http://host`, `https://host:port/prefix`.
/// A missing scheme means `http`; a missing port on `http` means 11434.
/// An empty value resolves to the loopback default.
pub fn resolve_base_url(host: &str) -> Result<String, OllamaError> {
    let trimmed = host.trim().trim_end_matches('/');
    let with_scheme = if trimmed.is_empty() {
        format!("http://127.0.0.1:{}", DEFAULT_PORT)
    } else if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url =
        Url::parse(&with_scheme).map_err(|_| OllamaError::InvalidHost(host.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(OllamaError::InvalidHost(host.to_string()));
    }

    // Url drops the port when it equals the scheme default, so only plain
    // http without any port gets the Ollama default.
    if url.scheme() == "http" && url.port().is_none() && !has_explicit_port(&with_scheme) {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| OllamaError::InvalidHost(host.to_string()))?;
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn has_explicit_port(url: &str) -> bool {
    let authority = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or_default();

    // Skip past an IPv6 literal before looking for the port separator.
    let after_host = match authority.rfind(']') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };
    after_host.contains(':')
}

#[cfg(target_os = "macos")]
const PLATFORM_DOWNLOAD_URL: &str = "https://ollama.com/download/mac";
#[cfg(target_os = "windows")]
const PLATFORM_DOWNLOAD_URL: &str = "https://ollama.com/download/windows";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_DOWNLOAD_URL: &str = "https://ollama.com/download/linux";

/// Download page for the platform this binary was built for.
pub const fn download_url() -> &'static str {
    PLATFORM_DOWNLOAD_URL
}

//! Terminal front end: one module per subcommand.

pub mod models;
pub mod pull;
pub mod setup;
pub mod status;

use onboard_ollama::{OllamaClient, PullPhase, PullProgress};

use crate::error::Error;
use crate::settings::SetupSettings;

fn client_for(settings: &SetupSettings) -> Result<OllamaClient, Error> {
    Ok(OllamaClient::new(settings.base_url()?, settings.probe_timeout)?)
}

/// Human-readable size using decimal units, like the Ollama CLI
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}

/// One status line for a progress event
pub fn render_progress(progress: &PullProgress) -> String {
    match progress.phase {
        PullPhase::Succeeded => "Download complete".to_string(),
        PullPhase::Failed => format!("Download failed: {}", progress.status),
        PullPhase::Running => match (progress.percent(), progress.completed, progress.total) {
            (Some(pct), Some(completed), Some(total)) => format!(
                "{} {:>5.1}% ({} / {})",
                progress.status,
                pct,
                format_bytes(completed),
                format_bytes(total)
            ),
            _ => progress.status.clone(),
        },
    }
}

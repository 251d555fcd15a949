use onboard_ollama::download_url;

use super::client_for;
use crate::config::{load_provider_config, ConfigStore};
use crate::error::Error;
use crate::settings::SetupSettings;

/// Print whether the runtime is up and what configuration is committed.
///
/// Returns `false` when the runtime is not running.
pub async fn run<S: ConfigStore>(settings: &SetupSettings, store: Option<&S>) -> Result<bool, Error> {
    let client = client_for(settings)?;
    let status = client.probe().await;

    if status.is_running {
        match status.model_count() {
            Some(count) => println!(
                "Ollama is running at {} ({} models installed)",
                client.base_url(),
                count
            ),
            None => println!("Ollama is running at {}", client.base_url()),
        }
    } else {
        println!(
            "Ollama is not running at {} ({})",
            client.base_url(),
            status.error().unwrap_or("no response")
        );
        println!("Download it from {}", download_url());
    }

    match store.and_then(load_provider_config) {
        Some(config) => println!(
            "Assistant configured for {} / {} @ {}",
            config.provider, config.model, config.host
        ),
        None => println!("Assistant is not configured yet. Run `onboard setup`."),
    }

    Ok(status.is_running)
}

use std::io::{self, Write};

use onboard_ollama::PullPhase;

use super::{client_for, render_progress};
use crate::error::Error;
use crate::settings::SetupSettings;

/// Pull the configured model outside of the setup flow.
pub async fn run(settings: &SetupSettings) -> Result<bool, Error> {
    let client = client_for(settings)?;
    println!("Pulling {} from {}", settings.model, client.base_url());

    let ok = client
        .pull(&settings.model, |progress| {
            let line = render_progress(&progress);
            if progress.phase == PullPhase::Running {
                print!("\r\x1b[2K{}", line);
                let _ = io::stdout().flush();
            } else {
                println!("\r\x1b[2K{}", line);
            }
        })
        .await;

    Ok(ok)
}

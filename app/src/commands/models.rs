use super::{client_for, format_bytes};
use crate::error::Error;
use crate::settings::SetupSettings;

/// List installed models, marking the one setup would use.
pub async fn run(settings: &SetupSettings) -> Result<bool, Error> {
    let client = client_for(settings)?;
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("No models installed. Run `onboard pull` to download {}.", settings.model);
        return Ok(true);
    }

    println!("  {:<40} {:>10}  {}", "NAME", "SIZE", "MODIFIED");
    for model in &models {
        let marker = if model.matches(&settings.model) { "*" } else { " " };
        println!(
            "{} {:<40} {:>10}  {}",
            marker,
            model.name,
            model.size.map(format_bytes).unwrap_or_default(),
            model.modified_at.as_deref().unwrap_or("")
        );
    }

    Ok(true)
}

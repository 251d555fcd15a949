use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use onboard_ollama::{download_url, PullPhase};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{client_for, render_progress};
use crate::config::ConfigStore;
use crate::error::Error;
use crate::settings::SetupSettings;
use crate::setup::{
    NotificationKind, SetupController, SetupError, SetupStage, SetupStateChanged,
};

/// Interactive setup: probe, wait for install, pull, connect.
///
/// Returns `true` once the configuration is committed, `false` if the user
/// stopped before that.
pub async fn run<S: ConfigStore>(
    settings: SetupSettings,
    store: S,
    assume_yes: bool,
) -> Result<bool, Error> {
    let client = client_for(&settings)?;
    let model = settings.model.clone();
    println!("Looking for Ollama at {} ...", client.base_url());

    let (controller, mut events) = SetupController::new(Arc::new(client), store, settings);
    let mut printer = EventPrinter::default();

    let mut stage = drive(controller.check(), &mut events, &mut printer).await?;

    loop {
        stage = match stage {
            SetupStage::ServiceAbsent => {
                println!("Ollama is not running.");
                println!("Download and install it from {}", download_url());
                if !confirm("Wait for Ollama to start?", assume_yes).await? {
                    break;
                }
                controller.start_install()?;
                println!("Waiting for Ollama to start (Ctrl-C to quit)...");
                drive(controller.wait_for_service(), &mut events, &mut printer).await?
            }
            SetupStage::ModelAbsent => {
                let question = format!("{} is not installed. Download it now?", model);
                if !confirm(&question, assume_yes).await? {
                    break;
                }
                drive(controller.download_model(), &mut events, &mut printer).await?
            }
            SetupStage::ModelAvailable => {
                let question = format!("Use {} on Ollama for the assistant?", model);
                if !confirm(&question, assume_yes).await? {
                    break;
                }
                let next = drive(controller.connect(), &mut events, &mut printer).await?;
                if next == SetupStage::ModelAvailable && assume_yes {
                    // Commit failed; don't spin on it unattended
                    break;
                }
                next
            }
            SetupStage::Failed => {
                if !confirm("Check for Ollama again?", assume_yes).await? {
                    break;
                }
                drive(controller.retry(), &mut events, &mut printer).await?
            }
            SetupStage::Connected => break,
            other => {
                log::warn!("Setup stopped in unexpected stage: {}", other);
                break;
            }
        };
    }

    let connected = controller.stage() == SetupStage::Connected;
    if !connected {
        println!("Setup stopped. Run `onboard setup` to continue.");
    }
    Ok(connected)
}

/// Await one controller operation while printing the events it produces
async fn drive<F>(
    operation: F,
    events: &mut UnboundedReceiver<SetupStateChanged>,
    printer: &mut EventPrinter,
) -> Result<SetupStage, SetupError>
where
    F: Future<Output = Result<SetupStage, SetupError>>,
{
    tokio::pin!(operation);

    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => printer.print(&event),
            result = &mut operation => {
                while let Ok(event) = events.try_recv() {
                    printer.print(&event);
                }
                printer.finish_line();
                return result;
            }
        }
    }
}

/// Renders setup events to the terminal; progress rewrites a single line.
#[derive(Default)]
struct EventPrinter {
    progress_open: bool,
    polls: usize,
}

impl EventPrinter {
    fn print(&mut self, event: &SetupStateChanged) {
        match event {
            SetupStateChanged::StageChanged { from, to } => {
                log::debug!("Stage {} -> {}", from, to);
            }
            SetupStateChanged::ServiceObserved { status } => {
                self.polls += 1;
                if !status.is_running && self.polls > 1 {
                    log::debug!("Ollama still not reachable: {:?}", status.error());
                }
            }
            SetupStateChanged::Progress { progress } => {
                let line = render_progress(progress);
                if progress.phase == PullPhase::Running {
                    print!("\r\x1b[2K{}", line);
                    let _ = io::stdout().flush();
                    self.progress_open = true;
                } else {
                    self.finish_line();
                    if progress.phase == PullPhase::Succeeded {
                        println!("{}", line);
                    }
                }
            }
            SetupStateChanged::Notification { notification } => {
                self.finish_line();
                let marker = match notification.kind {
                    NotificationKind::Success => "ok",
                    NotificationKind::Error => "error",
                };
                println!("[{}] {}: {}", marker, notification.title, notification.message);
                if let Some(detail) = &notification.detail {
                    println!("        {}", detail);
                }
            }
        }
    }

    fn finish_line(&mut self) {
        if self.progress_open {
            println!();
            self.progress_open = false;
        }
    }
}

/// Yes/no prompt on stdin. Empty input means yes; EOF means no.
async fn confirm(question: &str, assume_yes: bool) -> Result<bool, Error> {
    if assume_yes {
        println!("{} yes", question);
        return Ok(true);
    }

    print!("{} [Y/n] ", question);
    io::stdout().flush()?;

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map(|read| (read, line))
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

    Ok(parse_answer(answer.0, &answer.1))
}

fn parse_answer(bytes_read: usize, line: &str) -> bool {
    if bytes_read == 0 {
        return false;
    }
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    )
}

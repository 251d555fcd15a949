use std::sync::{Arc, Mutex};

use onboard_ollama::{download_url, PullPhase, PullProgress, ServiceStatus};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{commit_provider_config, ConfigStore, ProviderConfig};
use crate::settings::SetupSettings;
use crate::setup::{
    events::{Notification, SetupStateChanged},
    poller::{start_polling, PollHandle},
    service::LocalService,
    SetupEvent, SetupStage, SetupStateManager, TransitionRejection, TransitionResult,
};

/// Errors returned by controller operations.
///
/// Runtime absence and failed pulls or commits are not errors: they show up
/// as stages and notifications.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Rejected(#[from] TransitionRejection),

    #[error("Setup session has been shut down")]
    Closed,
}

impl SetupError {
    pub fn user_message(&self) -> String {
        match self {
            SetupError::Rejected(rejection) => format!(
                "That step isn't available while setup is in the {} stage.",
                rejection.current_state
            ),
            SetupError::Closed => "Setup was closed.".to_string(),
        }
    }
}

/// State reachable from the poll task and spawned model checks
struct Shared {
    service: Arc<dyn LocalService>,
    state_manager: SetupStateManager,
    events: mpsc::UnboundedSender<SetupStateChanged>,
    /// Parent of every poll handle; cancelled when the controller goes away
    session: CancellationToken,
    settings: SetupSettings,
    session_id: Uuid,
}

impl Shared {
    fn emit(&self, event: SetupStateChanged) {
        if self.session.is_cancelled() {
            return;
        }
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(SetupStateChanged::Notification { notification });
    }

    /// Run one event through the state machine and publish the change
    fn apply(&self, event: SetupEvent) -> Result<SetupStage, SetupError> {
        if self.session.is_cancelled() {
            return Err(SetupError::Closed);
        }

        match self.state_manager.transition(event)? {
            TransitionResult::Changed { from, to } => {
                log::info!("[{}] {} -> {} ({})", self.session_id, from, to, event);
                self.emit(SetupStateChanged::StageChanged { from, to });
                Ok(to)
            }
            TransitionResult::Unchanged => Ok(self.state_manager.current()),
        }
    }

    fn observe(&self, status: &ServiceStatus) {
        self.emit(SetupStateChanged::ServiceObserved {
            status: status.clone(),
        });
    }

    async fn check_model(&self) -> Result<SetupStage, SetupError> {
        let found = self.service.has_model(&self.settings.model).await;
        log::debug!("Model '{}' installed: {}", self.settings.model, found);

        self.apply(if found {
            SetupEvent::ModelFound
        } else {
            SetupEvent::ModelMissing
        })
    }

    /// Poll callback: stop at the first running observation and move on to the model check
    fn on_poll_update(self: &Arc<Self>, status: &ServiceStatus, handle: &PollHandle) {
        self.observe(status);

        if !status.is_running {
            return;
        }

        handle.cancel();

        match self.apply(SetupEvent::ServiceRunning) {
            Ok(_) => {
                self.notify(Notification::success(
                    "Ollama detected",
                    "Ollama is running. Checking for the model...",
                ));

                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = shared.check_model().await {
                        log::debug!("Model check after polling dropped: {}", e);
                    }
                });
            }
            Err(e) => log::debug!("Ignoring poll result: {}", e),
        }
    }
}

/// Drives one setup session from the first probe to a committed configuration.
///
/// Operations are meant to be awaited one at a time. The only concurrent
/// work is the poller started by [`start_install`](Self::start_install).
/// Dropping the controller (or calling [`shutdown`](Self::shutdown)) stops
/// that poller and silences the session: no stage change or event after it.
pub struct SetupController<S: ConfigStore> {
    shared: Arc<Shared>,
    poll: Mutex<Option<PollHandle>>,
    store: S,
}

impl<S: ConfigStore> SetupController<S> {
    pub fn new(
        service: Arc<dyn LocalService>,
        store: S,
        settings: SetupSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SetupStateChanged>) {
        let (events, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            service,
            state_manager: SetupStateManager::new(),
            events,
            session: CancellationToken::new(),
            settings,
            session_id: Uuid::new_v4(),
        });

        log::debug!(
            "[{}] Setup session created for model '{}' on {}",
            shared.session_id,
            shared.settings.model,
            shared.settings.host
        );

        let controller = SetupController {
            shared,
            poll: Mutex::new(None),
            store,
        };
        (controller, events_rx)
    }

    pub fn stage(&self) -> SetupStage {
        self.shared.state_manager.current()
    }

    /// Watch stage changes without consuming the event stream
    pub fn subscribe(&self) -> watch::Receiver<SetupStage> {
        self.shared.state_manager.subscribe()
    }

    pub fn settings(&self) -> &SetupSettings {
        &self.shared.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Initial probe, followed by the model check when the runtime is up.
    pub async fn check(&self) -> Result<SetupStage, SetupError> {
        let current = self.stage();
        if current != SetupStage::Checking {
            return Err(TransitionRejection {
                current_state: current,
                attempted_event: SetupEvent::ServiceRunning,
            }
            .into());
        }

        let status = self.shared.service.probe().await;
        self.shared.observe(&status);

        if !status.is_running {
            log::info!(
                "Ollama not running at {}: {}",
                status.host().unwrap_or("unknown host"),
                status.error().unwrap_or("no response")
            );
            return self.shared.apply(SetupEvent::ServiceMissing);
        }

        self.shared.apply(SetupEvent::ServiceRunning)?;
        self.shared.check_model().await
    }

    /// The user went off to install the runtime: poll until it shows up.
    pub fn start_install(&self) -> Result<SetupStage, SetupError> {
        let stage = self.shared.apply(SetupEvent::StartInstall)?;
        log::info!("Waiting for Ollama; download page: {}", download_url());

        let shared = Arc::clone(&self.shared);
        let handle = start_polling(
            Arc::clone(&self.shared.service),
            self.shared.settings.poll_interval,
            self.shared.session.child_token(),
            move |status, handle| shared.on_poll_update(status, handle),
        );

        if let Some(limit) = self.shared.settings.poll_timeout {
            let shared = Arc::clone(&self.shared);
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = handle.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        handle.cancel();
                        if shared.apply(SetupEvent::PollTimedOut).is_ok() {
                            log::warn!("Ollama did not start within {:?}", limit);
                            shared.notify(Notification::error(
                                "Ollama not detected",
                                format!("Ollama did not start within {} seconds.", limit.as_secs()),
                            ));
                        }
                    }
                }
            });
        }

        match self.poll.lock() {
            Ok(mut guard) => {
                if let Some(previous) = guard.replace(handle) {
                    previous.cancel();
                }
            }
            Err(e) => log::error!("Failed to lock poll handle: {}", e),
        }

        Ok(stage)
    }

    /// Wait until polling has produced a result: the model check finished,
    /// or the poll deadline passed.
    pub async fn wait_for_service(&self) -> Result<SetupStage, SetupError> {
        let mut rx = self.subscribe();

        tokio::select! {
            biased;
            _ = self.shared.session.cancelled() => Err(SetupError::Closed),
            result = rx.wait_for(|stage| {
                !matches!(stage, SetupStage::Polling | SetupStage::ModelChecking)
            }) => result.map(|stage| *stage).map_err(|_| SetupError::Closed),
        }
    }

    /// Pull the configured model, publishing progress as it arrives.
    pub async fn download_model(&self) -> Result<SetupStage, SetupError> {
        self.shared.apply(SetupEvent::StartDownload)?;

        let model = self.shared.settings.model.as_str();
        let shared = &*self.shared;
        shared.emit(SetupStateChanged::Progress {
            progress: PullProgress::running("Starting download..."),
        });

        let mut failure: Option<String> = None;
        let mut forward = |progress: PullProgress| {
            if progress.phase == PullPhase::Failed {
                failure = Some(progress.status.clone());
            }
            shared.emit(SetupStateChanged::Progress { progress });
        };

        let ok = shared.service.pull(model, &mut forward).await;

        if ok {
            let stage = shared.apply(SetupEvent::DownloadSucceeded)?;
            shared.notify(Notification::success(
                "Model ready",
                format!("{} is downloaded and ready to use.", model),
            ));
            Ok(stage)
        } else {
            let stage = shared.apply(SetupEvent::DownloadFailed)?;
            let mut notification =
                Notification::error("Download failed", format!("Could not download {}.", model));
            if let Some(reason) = failure {
                notification = notification.with_detail(reason);
            }
            shared.notify(notification);
            Ok(stage)
        }
    }

    /// Commit provider, model and host to the configuration store.
    pub async fn connect(&self) -> Result<SetupStage, SetupError> {
        self.shared.apply(SetupEvent::Connect)?;

        let settings = &self.shared.settings;
        let config = ProviderConfig::ollama(&settings.model, &settings.host);

        match commit_provider_config(&self.store, &config) {
            Ok(()) => {
                let stage = self.shared.apply(SetupEvent::CommitSucceeded)?;
                self.shared.notify(Notification::success(
                    "Connected",
                    format!("The assistant will use {} on Ollama.", settings.model),
                ));
                Ok(stage)
            }
            Err(e) => {
                log::error!("Failed to commit Ollama configuration: {}", e);
                let stage = self.shared.apply(SetupEvent::CommitFailed)?;
                self.shared.notify(
                    Notification::error(
                        "Connection failed",
                        "Could not save the Ollama configuration.",
                    )
                    .with_detail(e.to_string()),
                );
                Ok(stage)
            }
        }
    }

    /// Start over after polling gave up.
    pub async fn retry(&self) -> Result<SetupStage, SetupError> {
        self.shared.apply(SetupEvent::Retry)?;
        self.check().await
    }

    /// Stop any live poller and silence the session. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.session.is_cancelled() {
            log::debug!("[{}] Setup session shut down", self.shared.session_id);
        }
        self.shared.session.cancel();
    }
}

impl<S: ConfigStore> Drop for SetupController<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::MockConfigStore;
    use crate::config::ConfigKey;
    use crate::setup::events::NotificationKind;
    use crate::setup::service::Prober;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const HOST: &str = "http://localhost:11434";

    /// Scripted runtime: probes pop from a queue, then fall back to `running`
    struct FakeService {
        script: Mutex<VecDeque<bool>>,
        running: AtomicBool,
        probes: AtomicUsize,
        has_model: AtomicBool,
        pull_error: Option<&'static str>,
    }

    impl FakeService {
        fn new(script: &[bool], running: bool) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                running: AtomicBool::new(running),
                probes: AtomicUsize::new(0),
                has_model: AtomicBool::new(false),
                pull_error: None,
            }
        }

        fn with_model(self) -> Self {
            self.has_model.store(true, Ordering::SeqCst);
            self
        }

        fn failing_pull(mut self, reason: &'static str) -> Self {
            self.pull_error = Some(reason);
            self
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for FakeService {
        async fn probe(&self) -> ServiceStatus {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let scripted = self.script.lock().unwrap().pop_front();
            if scripted.unwrap_or_else(|| self.running.load(Ordering::SeqCst)) {
                ServiceStatus::running(HOST)
            } else {
                ServiceStatus::not_running(HOST, "connection refused")
            }
        }
    }

    #[async_trait]
    impl LocalService for FakeService {
        async fn has_model(&self, _name: &str) -> bool {
            self.has_model.load(Ordering::SeqCst)
        }

        async fn pull(
            &self,
            _name: &str,
            on_progress: &mut (dyn FnMut(PullProgress) + Send),
        ) -> bool {
            on_progress(PullProgress::running("pulling manifest"));
            on_progress(PullProgress::running("pulling aa42").with_bytes(Some(50), Some(100)));
            match self.pull_error {
                Some(reason) => {
                    on_progress(PullProgress::failed(reason));
                    false
                }
                None => {
                    self.has_model.store(true, Ordering::SeqCst);
                    on_progress(PullProgress::succeeded(Some(100)));
                    true
                }
            }
        }
    }

    fn settings() -> SetupSettings {
        SetupSettings {
            poll_interval: Duration::from_secs(3),
            ..SetupSettings::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SetupStateChanged>) -> Vec<SetupStateChanged> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn stages(events: &[SetupStateChanged]) -> Vec<SetupStage> {
        events
            .iter()
            .filter_map(|e| match e {
                SetupStateChanged::StageChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    fn notifications(events: &[SetupStateChanged]) -> Vec<&Notification> {
        events
            .iter()
            .filter_map(|e| match e {
                SetupStateChanged::Notification { notification } => Some(notification),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_poll_and_download() {
        // Initial probe plus two polled misses, then running on the third tick
        let service = Arc::new(FakeService::new(&[false, false, false], true));
        let (controller, mut rx) =
            SetupController::new(service.clone(), MockConfigStore::new(), settings());

        assert_eq!(controller.check().await.unwrap(), SetupStage::ServiceAbsent);
        assert_eq!(controller.start_install().unwrap(), SetupStage::Polling);

        assert_eq!(
            controller.wait_for_service().await.unwrap(),
            SetupStage::ModelAbsent
        );

        // Poller stopped itself on the running observation
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.probes(), 4);

        assert_eq!(
            controller.download_model().await.unwrap(),
            SetupStage::ModelAvailable
        );

        let events = drain(&mut rx);
        assert_eq!(
            stages(&events),
            vec![
                SetupStage::ServiceAbsent,
                SetupStage::Polling,
                SetupStage::ModelChecking,
                SetupStage::ModelAbsent,
                SetupStage::Downloading,
                SetupStage::ModelAvailable,
            ]
        );

        let observed = events
            .iter()
            .filter(|e| matches!(e, SetupStateChanged::ServiceObserved { .. }))
            .count();
        assert_eq!(observed, 4);

        let progress: Vec<&PullProgress> = events
            .iter()
            .filter_map(|e| match e {
                SetupStateChanged::Progress { progress } => Some(progress),
                _ => None,
            })
            .collect();
        assert!(progress.len() >= 2);
        assert_eq!(progress.last().unwrap().phase, PullPhase::Succeeded);

        let titles: Vec<&str> = notifications(&events)
            .iter()
            .map(|n| n.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Ollama detected", "Model ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_installed_connects() {
        let service = Arc::new(FakeService::new(&[], true).with_model());
        let (controller, mut rx) =
            SetupController::new(service, MockConfigStore::new(), settings());

        assert_eq!(controller.check().await.unwrap(), SetupStage::ModelAvailable);
        assert_eq!(controller.connect().await.unwrap(), SetupStage::Connected);

        let store = controller.store();
        assert_eq!(store.get(&ConfigKey::PROVIDER).as_deref(), Some("ollama"));
        assert_eq!(store.get(&ConfigKey::MODEL).as_deref(), Some("gpt-oss:20b"));
        assert_eq!(store.get(&ConfigKey::OLLAMA_HOST).as_deref(), Some("localhost"));

        let events = drain(&mut rx);
        let last = notifications(&events).pop().unwrap().clone();
        assert_eq!(last.kind, NotificationKind::Success);
        assert_eq!(last.title, "Connected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_failure_returns_to_model_available() {
        let service = Arc::new(FakeService::new(&[], true).with_model());
        let (controller, mut rx) = SetupController::new(
            service,
            MockConfigStore::failing_on(&ConfigKey::OLLAMA_HOST),
            settings(),
        );

        controller.check().await.unwrap();
        assert_eq!(
            controller.connect().await.unwrap(),
            SetupStage::ModelAvailable
        );

        // Provider and model were written first and then rolled back
        assert!(controller.store().keys().is_empty());

        let events = drain(&mut rx);
        let seen = stages(&events);
        assert_eq!(
            seen[seen.len() - 2..],
            [SetupStage::Connecting, SetupStage::ModelAvailable]
        );
        let error = notifications(&events).pop().unwrap().clone();
        assert!(error.is_error());
        assert!(error.detail.unwrap().contains("backend unavailable"));

        // Connecting again is allowed
        assert_eq!(
            controller.connect().await.unwrap(),
            SetupStage::ModelAvailable
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_failure_returns_to_model_absent() {
        let service =
            Arc::new(FakeService::new(&[], true).failing_pull("no space left on device"));
        let (controller, mut rx) =
            SetupController::new(service, MockConfigStore::new(), settings());

        assert_eq!(controller.check().await.unwrap(), SetupStage::ModelAbsent);
        assert_eq!(
            controller.download_model().await.unwrap(),
            SetupStage::ModelAbsent
        );

        let events = drain(&mut rx);
        let error = notifications(&events).pop().unwrap().clone();
        assert_eq!(error.title, "Download failed");
        assert_eq!(error.detail.as_deref(), Some("no space left on device"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_then_retry() {
        let service = Arc::new(FakeService::new(&[], false).with_model());
        let settings = SetupSettings {
            poll_timeout: Some(Duration::from_secs(10)),
            ..settings()
        };
        let (controller, mut rx) =
            SetupController::new(service.clone(), MockConfigStore::new(), settings);

        controller.check().await.unwrap();
        controller.start_install().unwrap();
        assert_eq!(
            controller.wait_for_service().await.unwrap(),
            SetupStage::Failed
        );

        // Probes at 3s, 6s, 9s; nothing after the deadline
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.probes(), 4);

        let events = drain(&mut rx);
        assert_eq!(
            notifications(&events).pop().unwrap().title,
            "Ollama not detected"
        );

        service.running.store(true, Ordering::SeqCst);
        assert_eq!(controller.retry().await.unwrap(), SetupStage::ModelAvailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_operations_leave_stage_alone() {
        let service = Arc::new(FakeService::new(&[], false));
        let (controller, _rx) =
            SetupController::new(service, MockConfigStore::new(), settings());

        let err = controller.download_model().await.unwrap_err();
        assert!(matches!(err, SetupError::Rejected(_)));
        assert!(controller.connect().await.is_err());
        assert!(controller.retry().await.is_err());
        assert_eq!(controller.stage(), SetupStage::Checking);

        controller.check().await.unwrap();
        assert!(matches!(
            controller.check().await,
            Err(SetupError::Rejected(_))
        ));
        assert_eq!(controller.stage(), SetupStage::ServiceAbsent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_poller_and_events() {
        let service = Arc::new(FakeService::new(&[], false));
        let (controller, mut rx) =
            SetupController::new(service.clone(), MockConfigStore::new(), settings());

        controller.check().await.unwrap();
        controller.start_install().unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(service.probes(), 2);
        drain(&mut rx);

        drop(controller);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(service.probes(), 2);
        // Poll task has exited, so the last sender is gone
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let service = Arc::new(FakeService::new(&[], false));
        let (controller, _rx) =
            SetupController::new(service, MockConfigStore::new(), settings());

        controller.shutdown();
        controller.shutdown();

        assert!(matches!(controller.check().await, Err(SetupError::Closed)));
        assert!(matches!(
            controller.wait_for_service().await,
            Err(SetupError::Closed)
        ));
    }
}

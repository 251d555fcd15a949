use serde::{Deserialize, Serialize};

/// Where a pull stands as of a given progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullPhase {
    /// More events will follow
    Running,
    /// Final event: the model is ready
    Succeeded,
    /// Final event: the pull failed, `status` carries the reason
    Failed,
}

/// One progress update of a model pull.
///
/// Each event supersedes the previous one. Byte counts are per layer as the
/// runtime reports them, so `completed` may drop back when a new layer starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullProgress {
    /// Human-readable status ("pulling manifest", "verifying sha256 digest", ...)
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub phase: PullPhase,
}

impl PullProgress {
    pub fn running(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            completed: None,
            total: None,
            phase: PullPhase::Running,
        }
    }

    pub fn with_bytes(mut self, completed: Option<u64>, total: Option<u64>) -> Self {
        self.completed = completed;
        self.total = total;
        self
    }

    pub fn succeeded(total: Option<u64>) -> Self {
        Self {
            status: "success".to_string(),
            completed: total,
            total,
            phase: PullPhase::Succeeded,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: reason.into(),
            completed: None,
            total: None,
            phase: PullPhase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase != PullPhase::Running
    }

    /// Completion percentage for display, clamped to `0.0..=100.0`.
    ///
    /// `None` unless both byte counts are known and `total` is non-zero.
    /// Source data reporting `completed > total` is clamped, not rejected.
    pub fn percent(&self) -> Option<f64> {
        match (self.completed, self.total) {
            (Some(completed), Some(total)) if total > 0 => {
                let pct = completed as f64 / total as f64 * 100.0;
                Some(pct.clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let cases = vec![
            ("no bytes", None, None, None),
            ("only total", None, Some(100), None),
            ("only completed", Some(10), None, None),
            ("zero total", Some(0), Some(0), None),
            ("start", Some(0), Some(200), Some(0.0)),
            ("half", Some(100), Some(200), Some(50.0)),
            ("done", Some(200), Some(200), Some(100.0)),
            ("overshoot is clamped", Some(450), Some(200), Some(100.0)),
        ];

        for (description, completed, total, expected) in cases {
            let progress = PullProgress::running("pulling").with_bytes(completed, total);
            assert_eq!(progress.percent(), expected, "{}", description);
        }
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!PullProgress::running("pulling manifest").is_terminal());

        let done = PullProgress::succeeded(Some(42));
        assert!(done.is_terminal());
        assert_eq!(done.percent(), Some(100.0));

        let failed = PullProgress::failed("no space left on device");
        assert!(failed.is_terminal());
        assert_eq!(failed.status, "no space left on device");
        assert_eq!(failed.percent(), None);
    }
}

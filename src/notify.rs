use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Success => tracing::info!("success: {}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices().pop()
    }

    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|notice| notice.severity == severity)
            .map(|notice| notice.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                severity,
                message: message.to_string(),
            });
        }
    }
}

//! Terminal notifications
//!
//! The dispatcher surfaces the end of every turn through [`Notifier`]. How
//! a notification is shown is up to the front end.

use colored::Colorize;
use std::sync::Mutex;

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    /// Show `title` with an optional detail line
    fn notify(&self, title: &str, detail: Option<&str>);
}

/// Prints notifications to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, title: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => eprintln!("{} {}", title.bold(), detail.red()),
            None => eprintln!("{}", title.green().bold()),
        }
    }
}

/// Emits notifications as log events only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => tracing::warn!(%title, %detail, "notification"),
            None => tracing::info!(%title, "notification"),
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far
    pub fn notifications(&self) -> Vec<(String, Option<String>)> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, detail: Option<&str>) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((title.to_string(), detail.map(str::to_string)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify("first", None);
        notifier.notify("second", Some("detail"));
        assert_eq!(
            notifier.notifications(),
            vec![
                ("first".to_string(), None),
                ("second".to_string(), Some("detail".to_string()))
            ]
        );
    }

    #[test]
    fn test_terminal_notifier_does_not_panic() {
        TerminalNotifier.notify("Answer Generation Successful", None);
        TerminalNotifier.notify("Answer Generation Failed", Some("boom"));
    }
}

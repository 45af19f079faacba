//! Notification dispatch for run outcomes.
//!
//! Delivery transport (email, webhooks) lives outside this crate; the
//! scheduler only needs a narrow `Notifier` seam. The default implementation
//! emits structured log events.

use arca_core::CoreResult;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Delivers run-outcome notifications to a recipient list.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one notification; recipients may be empty (no-op).
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; the scheduler logs and
    /// continues.
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> CoreResult<()>;
}

/// Notifier that records notifications as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> CoreResult<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        tracing::info!(
            recipients = recipients.join(","),
            subject,
            body,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Notifier that captures every call; used by tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

impl RecordingNotifier {
    /// Construct an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured notifications, in dispatch order.
    #[must_use]
    pub fn sent(&self) -> Vec<(Vec<String>, String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> CoreResult<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        self.sent
            .lock()
            .push((recipients.to_vec(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

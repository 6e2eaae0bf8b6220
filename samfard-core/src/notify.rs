use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Action,
    Alert,
}

#[derive(Debug, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification delivery (push/email behind one seam).
///
/// Delivery is fire-and-forget from the engine's perspective: a failed send
/// never rolls back the state transition that triggered it.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        sender_name: &str,
        severity: Severity,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sender_name: String,
    pub severity: Severity,
}

/// Collects sends in memory so tests can assert the engine notified the
/// right party without wiring a delivery provider.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<SentNotification> {
        std::mem::take(&mut *self.sent.lock().expect("sender poisoned"))
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("sender poisoned").len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        sender_name: &str,
        severity: Severity,
    ) -> Result<(), NotifyError> {
        self.sent.lock().expect("sender poisoned").push(SentNotification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            sender_name: sender_name.to_string(),
            severity,
        });
        Ok(())
    }
}

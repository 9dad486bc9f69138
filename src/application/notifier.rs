use crate::domain::notification::Notification;
use crate::domain::ports::NotificationSinkRef;

/// Hands notifications to a sink without ever failing the caller.
#[derive(Clone)]
pub struct Notifier {
    sink: NotificationSinkRef,
}

impl Notifier {
    pub fn new(sink: NotificationSinkRef) -> Self {
        Self { sink }
    }

    /// Spawns delivery of `notification`; failures are logged and dropped.
    pub fn send(&self, notification: Notification) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&notification).await {
                tracing::warn!(
                    recipient = %notification.recipient,
                    subject = notification.subject(),
                    error = %e,
                    "notification not delivered"
                );
            }
        });
    }
}

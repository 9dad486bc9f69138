use crate::domain::notification::Notification;
use crate::domain::ports::{NotificationSink, NotificationSinkRef};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            subject = notification.subject(),
            body = %notification.body(),
            "notification"
        );
        Ok(())
    }
}

/// Bounded queue in front of a slow sink.
///
/// `deliver` never waits: when the queue is full the notification is dropped
/// and an error returned. A single worker task drains the queue into the
/// inner sink in order.
#[derive(Clone)]
pub struct QueuedSink {
    tx: mpsc::Sender<Notification>,
}

impl QueuedSink {
    /// Creates the queue and spawns its worker. The worker exits once every
    /// `QueuedSink` clone has been dropped and the queue is drained.
    pub fn spawn(inner: NotificationSinkRef, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = inner.deliver(&notification).await {
                    tracing::warn!(
                        recipient = %notification.recipient,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
            tracing::debug!("notification queue closed");
        });
        (Self { tx }, worker)
    }
}

#[async_trait]
impl NotificationSink for QueuedSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.tx
            .try_send(notification.clone())
            .map_err(|e| match e {
                TrySendError::Full(n) => BookingError::Notification(format!(
                    "queue full, dropped {:?} for user {}",
                    n.subject(),
                    n.recipient
                )),
                TrySendError::Closed(_) => {
                    BookingError::Notification("queue closed".to_string())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::UserId;
    use crate::domain::membership::Package;
    use crate::domain::notification::Template;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Records deliveries; blocks each one until released.
    struct GatedSink {
        seen: Mutex<Vec<UserId>>,
        gate: Notify,
    }

    #[async_trait]
    impl NotificationSink for GatedSink {
        async fn deliver(&self, notification: &Notification) -> Result<()> {
            self.gate.notified().await;
            self.seen.lock().unwrap().push(notification.recipient);
            Ok(())
        }
    }

    fn receipt(user: u64) -> Notification {
        Notification {
            recipient: UserId(user),
            template: Template::PaymentReceipt {
                package: Package::Monthly,
                amount: dec!(30),
                currency: "AUD".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let inner = Arc::new(GatedSink {
            seen: Mutex::new(Vec::new()),
            gate: Notify::new(),
        });
        let (sink, worker) = QueuedSink::spawn(inner.clone(), 1);

        // The worker takes the first one and blocks on the gate; the second
        // fills the queue; the third is refused.
        sink.deliver(&receipt(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sink.deliver(&receipt(2)).await.unwrap();
        assert!(matches!(
            sink.deliver(&receipt(3)).await,
            Err(BookingError::Notification(_))
        ));

        inner.gate.notify_one();
        inner.gate.notify_one();
        drop(sink);
        worker.await.unwrap();
        assert_eq!(*inner.seen.lock().unwrap(), vec![UserId(1), UserId(2)]);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_everything() {
        assert!(TracingSink.deliver(&receipt(9)).await.is_ok());
    }
}

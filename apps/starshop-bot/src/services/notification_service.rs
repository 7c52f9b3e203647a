use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::action::Action;

/// An outbound message, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Telegram HTML.
    pub text: String,
    pub buttons: Vec<Vec<NoticeButton>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeButton {
    Action(String, Action),
}

impl Notice {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<NoticeButton>) -> Self {
        self.buttons.push(row);
        self
    }
}

/// Pushes a message to an arbitrary chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, notice: &Notice) -> Result<()>;
}

/// Best-effort delivery. Failures are logged and never propagated.
#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn notify(&self, chat_id: i64, notice: &Notice) -> bool {
        match self.notifier.send(chat_id, notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!("✗ Failed to notify {}: {:#}", chat_id, e);
                false
            }
        }
    }

    /// Returns how many recipients were reached.
    pub async fn broadcast(&self, chat_ids: &[i64], notice: &Notice) -> usize {
        if chat_ids.is_empty() {
            warn!("Broadcast skipped: no recipients configured");
            return 0;
        }

        let mut notified_count = 0;
        let mut failed_count = 0;

        for &chat_id in chat_ids {
            if self.notify(chat_id, notice).await {
                notified_count += 1;
                info!("✓ Notified {}", chat_id);
            } else {
                failed_count += 1;
            }
        }

        info!(
            "Broadcast complete: {}/{} sent, {} failed",
            notified_count,
            chat_ids.len(),
            failed_count
        );
        notified_count
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every message; chats listed in `failing` error out.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, Notice)>>,
        pub failing: Vec<i64>,
    }

    impl RecordingNotifier {
        pub fn failing_for(failing: Vec<i64>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing,
            }
        }

        pub async fn sent_to(&self, chat_id: i64) -> Vec<Notice> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|(id, _)| *id == chat_id)
                .map(|(_, n)| n.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: i64, notice: &Notice) -> Result<()> {
            if self.failing.contains(&chat_id) {
                anyhow::bail!("chat {} blocked the bot", chat_id);
            }
            self.sent.lock().await.push((chat_id, notice.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let notifier = Arc::new(RecordingNotifier::failing_for(vec![2]));
        let service = NotificationService::new(notifier.clone());

        let reached = service.broadcast(&[1, 2, 3], &Notice::text("hello")).await;

        assert_eq!(reached, 2);
        assert_eq!(notifier.sent_to(1).await.len(), 1);
        assert!(notifier.sent_to(2).await.is_empty());
        assert_eq!(notifier.sent_to(3).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_recipient_list_is_a_noop() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = NotificationService::new(notifier.clone());
        assert_eq!(service.broadcast(&[], &Notice::text("x")).await, 0);
        assert!(notifier.sent.lock().await.is_empty());
    }
}

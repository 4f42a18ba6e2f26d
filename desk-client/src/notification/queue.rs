// desk-client/src/notification/queue.rs
// 系统通知队列 - 一次只展示一条, 确认成功才出队

use parking_lot::Mutex;
use shared::SystemNotification;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ClientError, ClientResult};
use crate::http::DeskApi;
use crate::session::NoticeSink;

/// Queue-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing to show
    Idle,
    /// The head is being presented
    Draining,
}

/// Per-notification state while queued
///
/// Acknowledged notifications leave the queue, so they have no phase here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPhase {
    Pending,
    Presented,
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<SystemNotification>,
    /// User whose pending list was loaded this session
    loaded_for: Option<i64>,
    acknowledging: bool,
    error: Option<String>,
    /// Bumped by `reset`; in-flight calls of an older session are ignored
    epoch: u64,
}

/// Pending system notifications (news, announcements, changelogs)
///
/// FIFO in server order; only the head is ever presented and it leaves the
/// queue only after the backend confirmed the read.
pub struct NotificationQueue {
    api: Arc<dyn DeskApi>,
    notices: Arc<dyn NoticeSink>,
    inner: Mutex<QueueInner>,
    version: watch::Sender<u64>,
}

/// Clears the in-flight flag even if the acknowledge future is dropped
struct AckGuard<'a> {
    queue: &'a NotificationQueue,
    epoch: u64,
}

impl Drop for AckGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.queue.inner.lock();
        if inner.epoch == self.epoch {
            inner.acknowledging = false;
        }
    }
}

impl NotificationQueue {
    pub fn new(api: Arc<dyn DeskApi>, notices: Arc<dyn NoticeSink>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            api,
            notices,
            inner: Mutex::new(QueueInner::default()),
            version,
        }
    }

    /// Fill the queue once per session; returns the number of queued items
    ///
    /// Calling it again for the same user is a no-op. A different user
    /// starts over.
    pub async fn load_pending(&self, user_id: i64) -> ClientResult<usize> {
        let epoch = {
            let mut inner = self.inner.lock();
            match inner.loaded_for {
                Some(loaded) if loaded == user_id => return Ok(inner.items.len()),
                Some(_) => {
                    let epoch = inner.epoch + 1;
                    *inner = QueueInner {
                        epoch,
                        ..QueueInner::default()
                    };
                }
                None => {}
            }
            inner.loaded_for = Some(user_id);
            inner.epoch
        };

        let result = self.api.pending_notifications().await;

        let outcome = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return Ok(0);
            }
            match result {
                Ok(notifications) => {
                    inner.items = notifications.into_iter().filter(|n| n.active).collect();
                    inner.error = None;
                    tracing::info!(user_id, count = inner.items.len(), "Pending notifications loaded");
                    Ok(inner.items.len())
                }
                Err(e) => {
                    // allow a later retry
                    inner.loaded_for = None;
                    inner.error = Some(e.user_message());
                    Err(e)
                }
            }
        };
        self.changed();

        if let Err(e) = &outcome {
            tracing::warn!(user_id, "Loading pending notifications failed: {e}");
        }
        outcome
    }

    /// The only notification that may be rendered
    pub fn current(&self) -> Option<SystemNotification> {
        self.inner.lock().items.front().cloned()
    }

    /// Mark the head as read; it is popped only when the backend confirms
    ///
    /// On failure the head stays presented and the call may be repeated.
    pub async fn acknowledge(&self) -> ClientResult<()> {
        let (notification_id, epoch) = {
            let mut inner = self.inner.lock();
            if inner.acknowledging {
                return Err(ClientError::AcknowledgeInFlight);
            }
            let head = inner.items.front().ok_or(ClientError::QueueEmpty)?;
            let id = head.id;
            inner.acknowledging = true;
            (id, inner.epoch)
        };
        let _guard = AckGuard { queue: self, epoch };
        self.changed();

        let result = self.api.mark_notification_read(notification_id).await;

        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return result;
            }
            inner.acknowledging = false;
            match &result {
                Ok(()) => {
                    if inner.items.front().is_some_and(|n| n.id == notification_id) {
                        inner.items.pop_front();
                    }
                    inner.error = None;
                }
                Err(e) => inner.error = Some(e.user_message()),
            }
        }
        self.changed();

        match &result {
            Ok(()) => tracing::debug!(notification_id, "Notification acknowledged"),
            Err(e) => {
                tracing::warn!(notification_id, "Acknowledging notification failed: {e}");
                self.notices.error(&e.user_message());
            }
        }
        result
    }

    /// Close the head without marking it read
    ///
    /// Only optional notifications; they come back next session.
    pub fn dismiss(&self) -> ClientResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.acknowledging {
                return Err(ClientError::AcknowledgeInFlight);
            }
            let head = inner.items.front().ok_or(ClientError::QueueEmpty)?;
            if head.mandatory {
                return Err(ClientError::MandatoryNotification(head.id));
            }
            inner.items.pop_front();
        }
        self.changed();
        Ok(())
    }

    /// Whether the presentation layer may offer a close button
    pub fn can_dismiss(&self) -> bool {
        let inner = self.inner.lock();
        !inner.acknowledging && inner.items.front().is_some_and(|n| !n.mandatory)
    }

    pub fn state(&self) -> QueueState {
        if self.inner.lock().items.is_empty() {
            QueueState::Idle
        } else {
            QueueState::Draining
        }
    }

    pub fn phase_of(&self, notification_id: i64) -> Option<NotificationPhase> {
        let inner = self.inner.lock();
        let position = inner.items.iter().position(|n| n.id == notification_id)?;
        Some(if position == 0 {
            NotificationPhase::Presented
        } else {
            NotificationPhase::Pending
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_acknowledging(&self) -> bool {
        self.inner.lock().acknowledging
    }

    /// Last load / acknowledge error
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// Sign-out: empty the queue and forget the loaded user
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            let epoch = inner.epoch + 1;
            *inner = QueueInner {
                epoch,
                ..QueueInner::default()
            };
        }
        self.changed();
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn changed(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

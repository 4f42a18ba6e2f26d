// desk-client/src/notification/alert.rs
// 个人提醒 - 声音 + 系统通知 + 点击跳转

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared::message::decode_payload;
use shared::{TicketAlert, Topic};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channel::{EventChannel, Subscription};
use crate::error::ClientResult;

/// Platform notification permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// Never asked
    #[default]
    Default,
    Granted,
    Denied,
}

/// Notification handed to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformNotification {
    pub title: String,
    pub body: String,
    /// Same tag replaces the previous notification instead of stacking
    pub tag: String,
    pub ticket_id: i64,
}

impl From<&TicketAlert> for PlatformNotification {
    fn from(alert: &TicketAlert) -> Self {
        Self {
            title: alert.title.clone(),
            body: alert.message.clone(),
            tag: alert.tag(),
            ticket_id: alert.ticket_id,
        }
    }
}

/// Device side effects of a personal alert
///
/// Implemented by the host (desktop shell, browser bridge, terminal).
#[async_trait]
pub trait AlertPlatform: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the user; returns the resulting permission
    async fn request_permission(&self) -> Permission;

    fn play_sound(&self, asset: &str) -> ClientResult<()>;

    fn show_notification(&self, notification: &PlatformNotification) -> ClientResult<()>;

    fn focus_window(&self);

    fn navigate_to_ticket(&self, ticket_id: i64);
}

/// Headless platform: alerts only go to the log
#[derive(Debug)]
pub struct TracingAlertPlatform {
    permission: Mutex<Permission>,
    /// Latest notification per tag
    shown: Mutex<BTreeMap<String, PlatformNotification>>,
}

impl TracingAlertPlatform {
    pub fn new() -> Self {
        Self::with_permission(Permission::Granted)
    }

    pub fn with_permission(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
            shown: Mutex::new(BTreeMap::new()),
        }
    }

    /// Visible notifications, one per tag
    pub fn shown(&self) -> Vec<PlatformNotification> {
        self.shown.lock().values().cloned().collect()
    }
}

impl Default for TracingAlertPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertPlatform for TracingAlertPlatform {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> Permission {
        let mut permission = self.permission.lock();
        if *permission == Permission::Default {
            *permission = Permission::Granted;
        }
        *permission
    }

    fn play_sound(&self, asset: &str) -> ClientResult<()> {
        tracing::debug!(asset, "Alert sound");
        Ok(())
    }

    fn show_notification(&self, notification: &PlatformNotification) -> ClientResult<()> {
        tracing::info!(
            tag = %notification.tag,
            title = %notification.title,
            "{}",
            notification.body
        );
        self.shown
            .lock()
            .insert(notification.tag.clone(), notification.clone());
        Ok(())
    }

    fn focus_window(&self) {
        tracing::debug!("Focus window");
    }

    fn navigate_to_ticket(&self, ticket_id: i64) {
        tracing::info!(ticket_id, "Open ticket");
    }
}

#[derive(Default)]
struct BridgeState {
    user_id: Option<i64>,
    subscription: Option<Subscription>,
    /// Permission already requested this session
    prompted: bool,
}

/// Turns personal alerts (`user/{id}/notifications`) into a sound and a
/// platform notification, whatever view is open
pub struct AlertBridge {
    channel: EventChannel,
    platform: Arc<dyn AlertPlatform>,
    sound: String,
    state: Mutex<BridgeState>,
}

impl AlertBridge {
    pub fn new(channel: EventChannel, platform: Arc<dyn AlertPlatform>, sound: impl Into<String>) -> Self {
        Self {
            channel,
            platform,
            sound: sound.into(),
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Start listening for `user_id`; once per session
    pub async fn activate(&self, user_id: i64) {
        let should_prompt = {
            let mut state = self.state.lock();
            if state.user_id == Some(user_id) {
                return;
            }
            if state.user_id.is_some() {
                // different user without deactivate in between
                state.subscription = None;
            }
            state.user_id = Some(user_id);
            let prompt = !state.prompted && self.platform.permission() == Permission::Default;
            if prompt {
                state.prompted = true;
            }
            prompt
        };

        if should_prompt {
            let permission = self.platform.request_permission().await;
            tracing::info!(user_id, ?permission, "Notification permission requested");
        }

        let platform = self.platform.clone();
        let sound = self.sound.clone();
        let subscription = self
            .channel
            .subscribe(Topic::user_notifications(user_id), move |payload| {
                handle_alert(platform.as_ref(), &sound, payload);
            });

        let mut state = self.state.lock();
        if state.user_id == Some(user_id) {
            state.subscription = Some(subscription);
        }
    }

    /// Click-through: bring the window up and open the ticket
    pub fn on_click(&self, ticket_id: i64) {
        self.platform.focus_window();
        self.platform.navigate_to_ticket(ticket_id);
    }

    /// Stop listening; idempotent
    pub fn deactivate(&self) {
        let subscription = {
            let mut state = self.state.lock();
            let subscription = state.subscription.take();
            *state = BridgeState::default();
            subscription
        };
        if subscription.is_some() {
            tracing::debug!("Alert bridge deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.state.lock().user_id
    }
}

fn handle_alert(platform: &dyn AlertPlatform, sound: &str, payload: &Value) {
    let alert: TicketAlert = match decode_payload(payload) {
        Ok(alert) => alert,
        Err(e) => {
            tracing::warn!("Dropping malformed alert: {e}");
            return;
        }
    };

    // autoplay 被拦截等情况只记录日志
    if let Err(e) = platform.play_sound(sound) {
        tracing::warn!(ticket_id = alert.ticket_id, "Alert sound failed: {e}");
    }

    if platform.permission() != Permission::Granted {
        tracing::debug!(ticket_id = alert.ticket_id, "Notification permission not granted");
        return;
    }
    if let Err(e) = platform.show_notification(&PlatformNotification::from(&alert)) {
        tracing::warn!(ticket_id = alert.ticket_id, "Showing notification failed: {e}");
    }
}

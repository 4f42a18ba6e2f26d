// desk-client/tests/common/mod.rs
// 测试替身: 可编排的 DeskApi, 记录型 NoticeSink / AlertPlatform

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use desk_client::{
    AlertPlatform, Attachment, ClientConfig, ClientError, ClientResult, Connector, DeskApi,
    EventChannel, MemoryBroker, NoticeLevel, NoticeSink, Permission, PlatformNotification,
};
use parking_lot::Mutex;
use shared::models::{
    InteractionType, NotificationType, SystemNotification, TeamRef, Ticket, TicketInteraction,
    TicketPriority, TicketQuery, TicketStatus, UserRef,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// ========== fixtures ==========

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

pub fn ticket(id: i64, status: TicketStatus) -> Ticket {
    Ticket {
        id,
        title: format!("Chamado {id}"),
        description: "Impressora não imprime".to_string(),
        priority: TicketPriority::Medium,
        status,
        requester: UserRef {
            id: 100,
            name: "Ana".to_string(),
            email: None,
        },
        assignee: None,
        target_team: TeamRef {
            id: 3,
            name: "Suporte".to_string(),
        },
        due_date: None,
        created_at: at(0),
        updated_at: at(0),
        closed_at: None,
        satisfaction_rating: None,
        satisfaction_comment: None,
    }
}

pub fn interaction(id: i64, ticket_id: i64, minute: u32) -> TicketInteraction {
    TicketInteraction {
        id,
        ticket_id,
        user: Some(UserRef {
            id: 100,
            name: "Ana".to_string(),
            email: None,
        }),
        interaction_type: InteractionType::Comment,
        content: format!("comentário {id}"),
        attachment_url: None,
        created_at: at(minute),
    }
}

pub fn system_log(id: i64, ticket_id: i64, minute: u32) -> TicketInteraction {
    TicketInteraction {
        user: None,
        interaction_type: InteractionType::SystemLog,
        content: "Status alterado".to_string(),
        ..interaction(id, ticket_id, minute)
    }
}

pub fn notification(id: i64, mandatory: bool) -> SystemNotification {
    SystemNotification {
        id,
        title: format!("Aviso {id}"),
        content: String::new(),
        notification_type: NotificationType::SystemAnnouncement,
        mandatory,
        image_url: None,
        action_url: None,
        target_roles: Vec::new(),
        active: true,
        created_at: at(0),
    }
}

pub fn query_key(query: &TicketQuery) -> String {
    query
        .to_query_pairs()
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

// ========== scripted DeskApi ==========

/// In-memory DeskApi
///
/// Calls can be held back with `gate(method)` (one gate per call, in order)
/// and made to fail with `fail_next(method, status)`.
#[derive(Default)]
pub struct FakeDeskApi {
    tickets: Mutex<HashMap<i64, Ticket>>,
    timelines: Mutex<HashMap<i64, Vec<TicketInteraction>>>,
    lists: Mutex<HashMap<String, Vec<Ticket>>>,
    notifications: Mutex<Vec<SystemNotification>>,
    gates: Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
    failures: Mutex<HashMap<&'static str, VecDeque<u16>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeDeskApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_ticket(&self, ticket: Ticket) {
        self.tickets.lock().insert(ticket.id, ticket);
    }

    pub fn put_timeline(&self, ticket_id: i64, entries: Vec<TicketInteraction>) {
        self.timelines.lock().insert(ticket_id, entries);
    }

    pub fn put_list(&self, query: &TicketQuery, tickets: Vec<Ticket>) {
        self.lists.lock().insert(query_key(query), tickets);
    }

    pub fn put_notifications(&self, notifications: Vec<SystemNotification>) {
        *self.notifications.lock() = notifications;
    }

    /// Hold the next call of `method` until the returned sender fires
    pub fn gate(&self, method: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().entry(method).or_default().push_back(rx);
        tx
    }

    pub fn fail_next(&self, method: &'static str, status: u16) {
        self.failures.lock().entry(method).or_default().push_back(status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn enter(&self, method: &'static str, detail: String) -> ClientResult<()> {
        self.calls.lock().push(format!("{method}:{detail}"));
        let gate = self.gates.lock().get_mut(method).and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let failure = self.failures.lock().get_mut(method).and_then(VecDeque::pop_front);
        match failure {
            Some(401) => Err(ClientError::Unauthorized),
            Some(status) => Err(ClientError::Api {
                status,
                message: format!("{method} failed"),
            }),
            None => Ok(()),
        }
    }

    fn find_ticket(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.tickets
            .lock()
            .get(&ticket_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("ticket {ticket_id}")))
    }
}

#[async_trait]
impl DeskApi for FakeDeskApi {
    async fn list_tickets(&self, query: &TicketQuery) -> ClientResult<Vec<Ticket>> {
        let key = query_key(query);
        self.enter("list_tickets", key.clone()).await?;
        Ok(self.lists.lock().get(&key).cloned().unwrap_or_default())
    }

    async fn get_ticket(&self, ticket_id: i64) -> ClientResult<Ticket> {
        // answered with the state at request time, even when gated
        let ticket = self.find_ticket(ticket_id);
        self.enter("get_ticket", ticket_id.to_string()).await?;
        ticket
    }

    async fn get_timeline(&self, ticket_id: i64) -> ClientResult<Vec<TicketInteraction>> {
        self.enter("get_timeline", ticket_id.to_string()).await?;
        Ok(self
            .timelines
            .lock()
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_comment(
        &self,
        ticket_id: i64,
        content: &str,
        attachment: Option<Attachment>,
    ) -> ClientResult<()> {
        let file = attachment.map(|a| a.file_name).unwrap_or_default();
        self.enter("add_comment", format!("{ticket_id}:{content}:{file}"))
            .await
    }

    async fn claim(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.enter("claim", ticket_id.to_string()).await?;
        let mut ticket = self.find_ticket(ticket_id)?;
        ticket.status = TicketStatus::InProgress;
        ticket.assignee = Some(UserRef {
            id: 7,
            name: "Carlos".to_string(),
            email: None,
        });
        self.put_ticket(ticket.clone());
        Ok(ticket)
    }

    async fn resolve(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.enter("resolve", ticket_id.to_string()).await?;
        let mut ticket = self.find_ticket(ticket_id)?;
        ticket.status = TicketStatus::Resolved;
        self.put_ticket(ticket.clone());
        Ok(ticket)
    }

    async fn rate(&self, ticket_id: i64, rating: u8, comment: Option<String>) -> ClientResult<()> {
        self.enter("rate", format!("{ticket_id}:{rating}")).await?;
        let mut ticket = self.find_ticket(ticket_id)?;
        ticket.satisfaction_rating = Some(rating);
        ticket.satisfaction_comment = comment;
        self.put_ticket(ticket);
        Ok(())
    }

    async fn pending_notifications(&self) -> ClientResult<Vec<SystemNotification>> {
        self.enter("pending_notifications", String::new()).await?;
        Ok(self.notifications.lock().clone())
    }

    async fn mark_notification_read(&self, notification_id: i64) -> ClientResult<()> {
        self.enter("mark_notification_read", notification_id.to_string())
            .await
    }
}

// ========== recorders ==========

#[derive(Default)]
pub struct RecordingNotices {
    pub notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|(level, _)| *level == NoticeLevel::Error)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl NoticeSink for RecordingNotices {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().push((level, message.to_string()));
    }
}

pub struct RecordingPlatform {
    pub permission: Mutex<Permission>,
    /// What `request_permission` resolves to
    pub answer: Permission,
    pub prompts: Mutex<u32>,
    pub sounds: Mutex<Vec<String>>,
    pub shown: Mutex<Vec<PlatformNotification>>,
    pub focused: Mutex<u32>,
    pub navigated: Mutex<Vec<i64>>,
    pub sound_fails: bool,
}

impl RecordingPlatform {
    pub fn new(permission: Permission, answer: Permission) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            answer,
            prompts: Mutex::new(0),
            sounds: Mutex::new(Vec::new()),
            shown: Mutex::new(Vec::new()),
            focused: Mutex::new(0),
            navigated: Mutex::new(Vec::new()),
            sound_fails: false,
        })
    }

    pub fn with_blocked_sound(permission: Permission) -> Arc<Self> {
        Arc::new(Self {
            sound_fails: true,
            ..Arc::into_inner(Self::new(permission, permission)).unwrap()
        })
    }
}

#[async_trait]
impl AlertPlatform for RecordingPlatform {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> Permission {
        *self.prompts.lock() += 1;
        *self.permission.lock() = self.answer;
        self.answer
    }

    fn play_sound(&self, asset: &str) -> ClientResult<()> {
        self.sounds.lock().push(asset.to_string());
        if self.sound_fails {
            return Err(ClientError::Platform("autoplay blocked".into()));
        }
        Ok(())
    }

    fn show_notification(&self, notification: &PlatformNotification) -> ClientResult<()> {
        self.shown.lock().push(notification.clone());
        Ok(())
    }

    fn focus_window(&self) {
        *self.focused.lock() += 1;
    }

    fn navigate_to_ticket(&self, ticket_id: i64) {
        self.navigated.lock().push(ticket_id);
    }
}

// ========== helpers ==========

pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_reconnect_delay(Duration::from_millis(20))
        .with_heartbeat_interval(Duration::ZERO)
        .with_alert_sound("/sounds/notification.mp3")
}

pub fn memory_channel(broker: &MemoryBroker) -> EventChannel {
    EventChannel::with_connector(test_config(), Connector::Memory(broker.clone()))
}

/// Poll until `check` holds (2 s budget)
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

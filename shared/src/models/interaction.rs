//! Ticket interaction (timeline entry)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserRef;

/// 时间线条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Comment,
    /// Generated by the backend on a state transition (claim, resolve, ...)
    SystemLog,
    Attachment,
    #[serde(other)]
    Unknown,
}

/// Append-only timeline entry of a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketInteraction {
    pub id: i64,
    pub ticket_id: i64,
    /// None => system generated
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(with = "crate::time::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl TicketInteraction {
    pub fn is_system_log(&self) -> bool {
        self.interaction_type == InteractionType::SystemLog
    }

    pub fn is_system_generated(&self) -> bool {
        self.user.is_none()
    }
}

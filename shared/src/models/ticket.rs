//! Ticket Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::user::{TeamRef, UserRef};

/// 工单优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
    /// Value not known to this client version
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// 工单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Waiting,
    Resolved,
    Closed,
    #[serde(other)]
    Unknown,
}

impl TicketStatus {
    /// Wire name used in query strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Waiting => "WAITING",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Still being worked on (not resolved or closed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress | Self::Waiting)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service desk ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub requester: UserRef,
    #[serde(default)]
    pub assignee: Option<UserRef>,
    pub target_team: TeamRef,
    #[serde(default, with = "crate::time::option_timestamp")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(with = "crate::time::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time::timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "crate::time::option_timestamp")]
    pub closed_at: Option<DateTime<Utc>>,
    /// 1..=5, attached after closure
    #[serde(default)]
    pub satisfaction_rating: Option<u8>,
    #[serde(default)]
    pub satisfaction_comment: Option<String>,
}

impl Ticket {
    /// Valid satisfaction rating range
    pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

    pub fn is_assigned(&self) -> bool {
        self.assignee.is_some()
    }

    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.assignee.as_ref().is_some_and(|a| a.id == user_id)
    }

    /// A claim is only possible while open and unassigned
    pub fn can_claim(&self) -> bool {
        self.status == TicketStatus::Open && self.assignee.is_none()
    }

    /// Rating is attached post-closure, once
    pub fn can_rate(&self) -> bool {
        matches!(self.status, TicketStatus::Resolved | TicketStatus::Closed)
            && self.satisfaction_rating.is_none()
    }
}

/// Assignee filter for `GET /tickets`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssigneeFilter {
    /// Assigned to the given user
    User(i64),
    /// No assignee
    Unassigned,
}

/// Query for `GET /tickets`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketQuery {
    pub assignee: Option<AssigneeFilter>,
    pub requester_id: Option<i64>,
    pub team_id: Option<i64>,
    pub statuses: Vec<TicketStatus>,
}

impl TicketQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assigned_to(mut self, user_id: i64) -> Self {
        self.assignee = Some(AssigneeFilter::User(user_id));
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.assignee = Some(AssigneeFilter::Unassigned);
        self
    }

    pub fn requested_by(mut self, user_id: i64) -> Self {
        self.requester_id = Some(user_id);
        self
    }

    pub fn for_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_statuses(mut self, statuses: &[TicketStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Query string pairs, in a stable order
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        match self.assignee {
            Some(AssigneeFilter::User(id)) => pairs.push(("assigneeId", id.to_string())),
            Some(AssigneeFilter::Unassigned) => pairs.push(("assigneeId", "null".to_string())),
            None => {}
        }
        if let Some(id) = self.requester_id {
            pairs.push(("requesterId", id.to_string()));
        }
        if let Some(id) = self.team_id {
            pairs.push(("teamId", id.to_string()));
        }
        if !self.statuses.is_empty() {
            let joined = self
                .statuses
                .iter()
                .map(TicketStatus::as_str)
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("status", joined));
        }
        pairs
    }
}

/// `POST /tickets/{id}/comments` (JSON form, without attachment)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// `POST /tickets/{id}/rating`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

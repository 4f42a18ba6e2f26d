//! Push channel message types
//!
//! Topic naming and payload shapes shared between the desk backend's broker
//! and clients. The channel itself is payload agnostic: it routes by topic
//! and hands over the decoded JSON body.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod payload;
pub use payload::*;

/// Destination prefix of broker topics
pub const TOPIC_PREFIX: &str = "/topic/";

/// A named stream of messages inside the push connection
///
/// The name is relative (`tickets/42`); the broker destination adds the
/// `/topic/` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Arbitrary topic name (leading `/topic/` or `/` is stripped)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name
            .strip_prefix(TOPIC_PREFIX)
            .or_else(|| name.strip_prefix("topic/"))
            .unwrap_or(name.as_str())
            .trim_start_matches('/');
        Self(trimmed.to_string())
    }

    /// Ticket-scoped interaction / system-log events
    pub fn ticket(ticket_id: i64) -> Self {
        Self(format!("tickets/{ticket_id}"))
    }

    /// Per-user alert events
    pub fn user_notifications(user_id: i64) -> Self {
        Self(format!("user/{user_id}/notifications"))
    }

    /// Parse a broker destination (`/topic/...`)
    pub fn from_destination(destination: &str) -> Option<Self> {
        destination
            .strip_prefix(TOPIC_PREFIX)
            .filter(|name| !name.is_empty())
            .map(|name| Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Broker destination for SUBSCRIBE frames
    pub fn destination(&self) -> String {
        format!("{TOPIC_PREFIX}{}", self.0)
    }

    /// Ticket id if this is a ticket topic
    pub fn ticket_id(&self) -> Option<i64> {
        self.0.strip_prefix("tickets/")?.parse().ok()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

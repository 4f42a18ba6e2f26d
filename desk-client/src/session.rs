//! Session collaborators
//!
//! Authentication lives outside this crate. The core only needs the current
//! identity (bearer token + user id) and a place to report 401s; user-visible
//! messages go to a [`NoticeSink`] instead of a global toast.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Signed-in user as seen by the core
#[derive(Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: i64,
    /// Bearer credential
    pub token: String,
    /// Team used by the `team_queue` list view
    pub team_id: Option<i64>,
}

impl SessionIdentity {
    pub fn new(user_id: i64, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Token stays out of logs
impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

/// Source of the current identity
pub trait SessionProvider: Send + Sync {
    /// Current identity, `None` when signed out
    fn identity(&self) -> Option<SessionIdentity>;

    /// Called when the backend answered 401; sign-out is the provider's call
    fn on_unauthorized(&self);
}

/// Simple in-memory provider, updated by the host's auth flow
#[derive(Debug, Default, Clone)]
pub struct SessionHandle {
    identity: Arc<RwLock<Option<SessionIdentity>>>,
    unauthorized: Arc<RwLock<u32>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: SessionIdentity) -> Self {
        let handle = Self::new();
        handle.set(Some(identity));
        handle
    }

    pub fn set(&self, identity: Option<SessionIdentity>) {
        *self.identity.write() = identity;
    }

    /// Number of 401s reported since creation
    pub fn unauthorized_count(&self) -> u32 {
        *self.unauthorized.read()
    }
}

impl SessionProvider for SessionHandle {
    fn identity(&self) -> Option<SessionIdentity> {
        self.identity.read().clone()
    }

    fn on_unauthorized(&self) {
        *self.unauthorized.write() += 1;
        tracing::warn!("Backend rejected credentials (401)");
    }
}

/// Severity of a user-visible notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// User-visible, non-fatal messages (toasts)
pub trait NoticeSink: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NoticeLevel::Success, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Notice sink that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => tracing::warn!(notice = %message, "User notice"),
            _ => tracing::info!(notice = %message, "User notice"),
        }
    }
}

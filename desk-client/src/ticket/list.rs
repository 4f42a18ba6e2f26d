// desk-client/src/ticket/list.rs
// 工单列表 - 三种视图, 最后一次请求为准

use parking_lot::Mutex;
use shared::models::TicketQuery;
use shared::{Ticket, TicketStatus};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ClientError, ClientResult};
use crate::http::DeskApi;
use crate::session::{NoticeSink, SessionIdentity, SessionProvider};

/// Mutually exclusive ticket list filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListView {
    /// Assigned to me and still open
    #[default]
    MyAssignments,
    /// Unassigned and open, for my team
    TeamQueue,
    /// Requested by me
    CreatedByMe,
}

impl ListView {
    pub const ALL: [ListView; 3] = [Self::MyAssignments, Self::TeamQueue, Self::CreatedByMe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MyAssignments => "my_assignments",
            Self::TeamQueue => "team_queue",
            Self::CreatedByMe => "created_by_me",
        }
    }

    /// REST filter for this view
    pub fn query(&self, identity: &SessionIdentity) -> TicketQuery {
        match self {
            Self::MyAssignments => TicketQuery::new()
                .assigned_to(identity.user_id)
                .with_statuses(&[
                    TicketStatus::Open,
                    TicketStatus::InProgress,
                    TicketStatus::Waiting,
                ]),
            Self::TeamQueue => {
                let query = TicketQuery::new()
                    .unassigned()
                    .with_statuses(&[TicketStatus::Open]);
                match identity.team_id {
                    Some(team_id) => query.for_team(team_id),
                    None => query,
                }
            }
            Self::CreatedByMe => TicketQuery::new().requested_by(identity.user_id),
        }
    }
}

impl fmt::Display for ListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ListView {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|view| view.as_str() == s)
            .ok_or_else(|| ClientError::Validation(format!("Unknown list view: {s}")))
    }
}

/// Read-only snapshot of the list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListSnapshot {
    pub view: ListView,
    pub tickets: Vec<Ticket>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct ListState {
    view: ListView,
    generation: u64,
    tickets: Vec<Ticket>,
    loading: bool,
    error: Option<String>,
}

/// Ticket list behind the three list views
///
/// Every fetch carries a generation number; only the most recent request may
/// write its result, so a slow response for an abandoned view is dropped.
pub struct TicketListStore {
    api: Arc<dyn DeskApi>,
    session: Arc<dyn SessionProvider>,
    notices: Arc<dyn NoticeSink>,
    state: Mutex<ListState>,
    version: watch::Sender<u64>,
}

impl TicketListStore {
    pub fn new(
        api: Arc<dyn DeskApi>,
        session: Arc<dyn SessionProvider>,
        notices: Arc<dyn NoticeSink>,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            api,
            session,
            notices,
            state: Mutex::new(ListState::default()),
            version,
        }
    }

    /// Switch view: the old list is discarded immediately, then refetched
    pub async fn set_view(&self, view: ListView) -> ClientResult<()> {
        let generation = {
            let mut state = self.state.lock();
            state.view = view;
            state.tickets.clear();
            state.error = None;
            state.generation += 1;
            state.loading = true;
            state.generation
        };
        self.changed();
        self.fetch(view, generation).await
    }

    /// Re-run the current view; a later refresh supersedes an earlier one
    pub async fn refresh(&self) -> ClientResult<()> {
        let (view, generation) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.loading = true;
            (state.view, state.generation)
        };
        self.changed();
        self.fetch(view, generation).await
    }

    async fn fetch(&self, view: ListView, generation: u64) -> ClientResult<()> {
        let Some(identity) = self.session.identity() else {
            return self.finish(generation, Err(ClientError::NoSession));
        };
        let query = view.query(&identity);
        tracing::debug!(view = %view, generation, "Fetching ticket list");

        let result = self.api.list_tickets(&query).await;
        self.finish(generation, result)
    }

    fn finish(&self, generation: u64, result: ClientResult<Vec<Ticket>>) -> ClientResult<()> {
        let outcome = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(generation, current = state.generation, "Discarding stale list response");
                return result.map(|_| ());
            }
            state.loading = false;
            match result {
                Ok(tickets) => {
                    state.tickets = tickets;
                    state.error = None;
                    Ok(())
                }
                Err(e) => {
                    // 保留旧列表
                    state.error = Some(e.user_message());
                    Err(e)
                }
            }
        };
        self.changed();

        if let Err(e) = &outcome {
            tracing::warn!("Ticket list fetch failed: {e}");
            self.notices.error(&e.user_message());
        }
        outcome
    }

    /// Sign-out: forget everything, pending fetches included
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            let generation = state.generation + 1;
            *state = ListState {
                generation,
                ..ListState::default()
            };
        }
        self.changed();
    }

    pub fn view(&self) -> ListView {
        self.state.lock().view
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().tickets.clone()
    }

    pub fn snapshot(&self) -> ListSnapshot {
        let state = self.state.lock();
        ListSnapshot {
            view: state.view,
            tickets: state.tickets.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn changed(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

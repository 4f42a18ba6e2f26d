// desk-client/src/ticket/sync.rs
// 工单详情同步 - REST 快照 + 推送事件合并

use parking_lot::Mutex;
use serde_json::Value;
use shared::message::decode_payload;
use shared::{Ticket, TicketInteraction, Topic};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use super::timeline::Timeline;
use crate::channel::{EventChannel, Subscription};
use crate::error::{ClientError, ClientResult};
use crate::http::{Attachment, DeskApi};
use crate::session::NoticeSink;

/// Read-only snapshot of the open ticket view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketView {
    pub ticket_id: Option<i64>,
    pub ticket: Option<Ticket>,
    pub timeline: Vec<TicketInteraction>,
    /// Initial fetch running
    pub loading: bool,
    /// A write (comment / claim / resolve / rating) is running
    pub submitting: bool,
    /// Last load failure, rendered inline with a retry action
    pub error: Option<String>,
}

#[derive(Default)]
struct SyncState {
    ticket_id: Option<i64>,
    /// Bumped on every load / close; results of older generations are dropped
    generation: u64,
    ticket: Option<Ticket>,
    timeline: Timeline,
    loading: bool,
    submitting: bool,
    error: Option<String>,
    subscription: Option<Subscription>,
    /// Issue order of ticket requests (load, refetch, claim / resolve / rate)
    ticket_seq: u64,
    /// Sequence of the response currently in `ticket`
    applied_seq: u64,
}

impl SyncState {
    fn next_ticket_seq(&mut self) -> u64 {
        self.ticket_seq += 1;
        self.ticket_seq
    }

    /// Store a ticket response unless a later request already answered
    fn accept_ticket(&mut self, seq: u64, ticket: Ticket) -> bool {
        if seq <= self.applied_seq {
            tracing::debug!(
                ticket_id = ticket.id,
                seq,
                applied = self.applied_seq,
                "Dropping older ticket response"
            );
            return false;
        }
        self.applied_seq = seq;
        self.ticket = Some(ticket);
        true
    }
}

struct SyncShared {
    api: Arc<dyn DeskApi>,
    notices: Arc<dyn NoticeSink>,
    state: Mutex<SyncState>,
    version: watch::Sender<u64>,
}

impl SyncShared {
    fn changed(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Live interaction pushed on `tickets/{id}`
    fn on_event(self: &Arc<Self>, payload: &Value) {
        let interaction: TicketInteraction = match decode_payload(payload) {
            Ok(interaction) => interaction,
            Err(e) => {
                tracing::warn!("Dropping malformed ticket event: {e}");
                return;
            }
        };

        let ticket_id = interaction.ticket_id;
        let system_log = interaction.is_system_log();
        let (added, generation, seq) = {
            let mut state = self.state.lock();
            if state.ticket_id != Some(ticket_id) {
                tracing::debug!(ticket_id, "Ignoring event for another ticket");
                return;
            }
            let seq = system_log.then(|| state.next_ticket_seq());
            (state.timeline.insert(interaction), state.generation, seq)
        };
        if added {
            self.changed();
        }

        // 状态/负责人变更不在事件里, 需要重新拉取工单
        if let Some(seq) = seq {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(self.clone().refetch_ticket(ticket_id, generation, seq));
                }
                Err(_) => tracing::warn!(ticket_id, "No runtime for ticket refetch"),
            }
        }
    }

    async fn refetch_ticket(self: Arc<Self>, ticket_id: i64, generation: u64, seq: u64) {
        match self.api.get_ticket(ticket_id).await {
            Ok(ticket) => {
                let applied = {
                    let mut state = self.state.lock();
                    state.generation == generation && state.accept_ticket(seq, ticket)
                };
                if applied {
                    self.changed();
                }
            }
            Err(e) => tracing::warn!(ticket_id, "Ticket refetch failed: {e}"),
        }
    }
}

/// State of one open ticket view
///
/// Merges the REST snapshot (ticket + timeline) with live interactions from
/// the `tickets/{id}` topic. The timeline is keyed by interaction id, so
/// pushes that duplicate the snapshot or arrive out of order are harmless.
pub struct TicketSyncStore {
    shared: Arc<SyncShared>,
    channel: EventChannel,
}

impl TicketSyncStore {
    pub fn new(api: Arc<dyn DeskApi>, channel: EventChannel, notices: Arc<dyn NoticeSink>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(SyncShared {
                api,
                notices,
                state: Mutex::new(SyncState::default()),
                version,
            }),
            channel,
        }
    }

    /// Open `ticket_id`, replacing whatever was loaded before
    pub async fn load(&self, ticket_id: i64) -> ClientResult<()> {
        let (generation, previous) = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.ticket_id = Some(ticket_id);
            state.ticket = None;
            state.timeline.clear();
            state.loading = true;
            state.submitting = false;
            state.error = None;
            (state.generation, state.subscription.take())
        };
        drop(previous);
        self.shared.changed();

        // Subscribe before fetching so nothing published meanwhile is missed
        let weak: Weak<SyncShared> = Arc::downgrade(&self.shared);
        let subscription = self.channel.subscribe(Topic::ticket(ticket_id), move |payload| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(payload);
            }
        });
        let seq = {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.subscription = Some(subscription);
            state.next_ticket_seq()
        };

        tracing::debug!(ticket_id, generation, "Loading ticket");
        let api = &self.shared.api;
        let (ticket, timeline) = tokio::join!(api.get_ticket(ticket_id), api.get_timeline(ticket_id));

        let result = {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                tracing::debug!(ticket_id, generation, "Discarding stale ticket load");
                return Ok(());
            }
            state.loading = false;
            match ticket.and_then(|t| timeline.map(|entries| (t, entries))) {
                Ok((ticket, entries)) => {
                    let mut snapshot = Timeline::from_snapshot(entries);
                    // 加载期间收到的推送
                    let live = std::mem::take(&mut state.timeline);
                    snapshot.merge(live);
                    state.accept_ticket(seq, ticket);
                    state.timeline = snapshot;
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(ticket_id, "Ticket load failed: {e}");
                    state.error = Some(e.user_message());
                    Err(e)
                }
            }
        };
        self.shared.changed();

        if let Err(e) = &result {
            self.shared.notices.error(&e.user_message());
        }
        result
    }

    /// Re-run the load of the current ticket
    pub async fn retry(&self) -> ClientResult<()> {
        let ticket_id = self.ticket_id().ok_or(ClientError::NoActiveTicket)?;
        self.load(ticket_id).await
    }

    /// Apply a pushed interaction (normally called by the channel handler)
    pub fn on_event(&self, payload: &Value) {
        self.shared.on_event(payload);
    }

    /// Post a comment; the interaction itself arrives through the channel
    pub async fn add_comment(&self, content: &str, attachment: Option<Attachment>) -> ClientResult<()> {
        if content.trim().is_empty() && attachment.is_none() {
            return Err(ClientError::Validation("Comentário vazio".into()));
        }
        let (ticket_id, generation) = self.begin_write()?;
        let result = self.shared.api.add_comment(ticket_id, content, attachment).await;
        self.end_write(generation);
        self.report(result, "Comentário enviado")
    }

    /// Assign the ticket to the current user
    pub async fn claim(&self) -> ClientResult<()> {
        let (ticket_id, generation) = self.begin_write()?;
        let seq = self.shared.state.lock().next_ticket_seq();
        let result = self.shared.api.claim(ticket_id).await;
        let result = self.apply_ticket(generation, seq, result);
        self.report(result, "Chamado assumido")
    }

    pub async fn resolve(&self) -> ClientResult<()> {
        let (ticket_id, generation) = self.begin_write()?;
        let seq = self.shared.state.lock().next_ticket_seq();
        let result = self.shared.api.resolve(ticket_id).await;
        let result = self.apply_ticket(generation, seq, result);
        self.report(result, "Chamado resolvido")
    }

    /// Satisfaction rating (1..=5) of a resolved ticket
    pub async fn rate(&self, rating: u8, comment: Option<String>) -> ClientResult<()> {
        if !Ticket::RATING_RANGE.contains(&rating) {
            return Err(ClientError::Validation(format!(
                "Avaliação deve estar entre 1 e 5 (recebido {rating})"
            )));
        }
        let comment = comment.filter(|c| !c.trim().is_empty());
        let (ticket_id, generation) = self.begin_write()?;

        let result = match self.shared.api.rate(ticket_id, rating, comment).await {
            Ok(()) => {
                let seq = self.shared.state.lock().next_ticket_seq();
                let ticket = self.shared.api.get_ticket(ticket_id).await;
                self.apply_ticket(generation, seq, ticket)
            }
            Err(e) => {
                self.end_write(generation);
                Err(e)
            }
        };
        self.report(result, "Avaliação enviada")
    }

    /// Leave the ticket view: unsubscribe and drop all state
    pub fn close(&self) {
        let subscription = {
            let mut state = self.shared.state.lock();
            let generation = state.generation + 1;
            let subscription = state.subscription.take();
            *state = SyncState {
                generation,
                ..SyncState::default()
            };
            subscription
        };
        if let Some(subscription) = subscription {
            tracing::debug!(topic = %subscription.topic(), "Ticket view closed");
        }
        self.shared.changed();
    }

    pub fn ticket_id(&self) -> Option<i64> {
        self.shared.state.lock().ticket_id
    }

    pub fn snapshot(&self) -> TicketView {
        let state = self.shared.state.lock();
        TicketView {
            ticket_id: state.ticket_id,
            ticket: state.ticket.clone(),
            timeline: state.timeline.entries().to_vec(),
            loading: state.loading,
            submitting: state.submitting,
            error: state.error.clone(),
        }
    }

    /// Version counter bumped on every state change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    /// Whether the ticket topic is currently subscribed
    pub fn is_subscribed(&self) -> bool {
        self.shared
            .state
            .lock()
            .subscription
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    fn begin_write(&self) -> ClientResult<(i64, u64)> {
        let ids = {
            let mut state = self.shared.state.lock();
            let ticket_id = state.ticket_id.ok_or(ClientError::NoActiveTicket)?;
            state.submitting = true;
            (ticket_id, state.generation)
        };
        self.shared.changed();
        Ok(ids)
    }

    fn end_write(&self, generation: u64) {
        {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return;
            }
            state.submitting = false;
        }
        self.shared.changed();
    }

    /// Write response; an older response never replaces a newer ticket
    fn apply_ticket(&self, generation: u64, seq: u64, result: ClientResult<Ticket>) -> ClientResult<()> {
        let outcome = {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                // view moved on: keep the outcome, drop the data
                return result.map(|_| ());
            }
            state.submitting = false;
            result.map(|ticket| {
                state.accept_ticket(seq, ticket);
            })
        };
        self.shared.changed();
        outcome
    }

    fn report(&self, result: ClientResult<()>, success: &str) -> ClientResult<()> {
        match &result {
            Ok(()) => self.shared.notices.success(success),
            Err(e) => {
                tracing::warn!("Ticket action failed: {e}");
                self.shared.notices.error(&e.user_message());
            }
        }
        result
    }
}

impl std::fmt::Debug for TicketSyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TicketSyncStore")
            .field("ticket_id", &state.ticket_id)
            .field("generation", &state.generation)
            .field("timeline", &state.timeline.len())
            .finish()
    }
}

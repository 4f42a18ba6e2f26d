// desk-client/src/client.rs
// DeskClient - 会话生命周期 (登录 / 登出)

use parking_lot::Mutex;
use std::sync::Arc;

use crate::channel::{Connector, EventChannel};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::http::{DeskApi, NetworkDeskApi};
use crate::notification::{AlertBridge, AlertPlatform, NotificationQueue, TracingAlertPlatform};
use crate::session::{NoticeSink, SessionHandle, SessionIdentity, SessionProvider, TracingNoticeSink};
use crate::ticket::{TicketListStore, TicketSyncStore};

/// Builder for [`DeskClient`]
///
/// # Example
///
/// ```no_run
/// use desk_client::{ClientConfig, DeskClient};
///
/// let client = DeskClient::builder(ClientConfig::from_env())
///     .build()
///     .expect("Failed to build client");
/// ```
pub struct DeskClientBuilder {
    config: ClientConfig,
    session: SessionHandle,
    api: Option<Arc<dyn DeskApi>>,
    connector: Option<Connector>,
    notices: Arc<dyn NoticeSink>,
    platform: Arc<dyn AlertPlatform>,
}

impl DeskClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: SessionHandle::new(),
            api: None,
            connector: None,
            notices: Arc::new(TracingNoticeSink),
            platform: Arc::new(TracingAlertPlatform::new()),
        }
    }

    /// Share an existing session handle with the host's auth flow
    pub fn session(mut self, session: SessionHandle) -> Self {
        self.session = session;
        self
    }

    /// Replace the REST client (tests, offline hosts)
    pub fn api(mut self, api: Arc<dyn DeskApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Replace the push transport (e.g. an in-process broker)
    pub fn connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn notice_sink(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    pub fn alert_platform(mut self, platform: Arc<dyn AlertPlatform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn build(self) -> ClientResult<DeskClient> {
        let provider: Arc<dyn SessionProvider> = Arc::new(self.session.clone());
        let api = match self.api {
            Some(api) => api,
            None => Arc::new(NetworkDeskApi::new(&self.config, provider.clone())?),
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Connector::websocket(self.config.channel_url()));
        let channel = EventChannel::with_connector(self.config.clone(), connector);

        Ok(DeskClient {
            alerts: AlertBridge::new(channel.clone(), self.platform, self.config.alert_sound.clone()),
            notifications: NotificationQueue::new(api.clone(), self.notices.clone()),
            lists: TicketListStore::new(api.clone(), provider, self.notices.clone()),
            config: self.config,
            session: self.session,
            api,
            channel,
            notices: self.notices,
            signed_in: Mutex::new(None),
        })
    }
}

/// Session owner
///
/// Holds the single push connection of the session and the session-wide
/// components. `sign_in` brings everything up, `sign_out` tears it down
/// exactly once.
pub struct DeskClient {
    config: ClientConfig,
    session: SessionHandle,
    api: Arc<dyn DeskApi>,
    channel: EventChannel,
    notices: Arc<dyn NoticeSink>,
    alerts: AlertBridge,
    notifications: NotificationQueue,
    lists: TicketListStore,
    /// User of the running session
    signed_in: Mutex<Option<i64>>,
}

impl DeskClient {
    /// Network client with headless defaults
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> DeskClientBuilder {
        DeskClientBuilder::new(config)
    }

    /// Start a session
    ///
    /// Connects the push channel, activates personal alerts and loads the
    /// pending notifications. Signing in as someone else ends the current
    /// session first; the same user with a refreshed token only swaps the
    /// credential, subscriptions stay. A failed notification load does not
    /// fail the sign-in.
    pub async fn sign_in(&self, identity: SessionIdentity) {
        let user_id = identity.user_id;
        let current = *self.signed_in.lock();
        match current {
            Some(active) if active == user_id => {
                // 同一用户换 token: 通道重连, 订阅保留
                self.session.set(Some(identity.clone()));
                self.channel.connect(Some(identity)).await;
                return;
            }
            Some(_) => self.sign_out().await,
            None => {}
        }

        tracing::info!(user_id, "Signing in");
        *self.signed_in.lock() = Some(user_id);
        self.session.set(Some(identity.clone()));
        self.channel.connect(Some(identity)).await;
        self.alerts.activate(user_id).await;

        if let Err(e) = self.notifications.load_pending(user_id).await {
            self.notices.error(&e.user_message());
        }
    }

    /// End the session; idempotent
    pub async fn sign_out(&self) {
        let Some(user_id) = self.signed_in.lock().take() else {
            return;
        };
        tracing::info!(user_id, "Signing out");
        self.alerts.deactivate();
        self.notifications.reset();
        self.lists.reset();
        self.channel.disconnect().await;
        self.session.set(None);
    }

    /// Open a ticket view; a load failure is kept in the view's state
    pub async fn open_ticket(&self, ticket_id: i64) -> TicketSyncStore {
        let store = self.ticket_store();
        if let Err(e) = store.load(ticket_id).await {
            tracing::debug!(ticket_id, "Ticket view opened with error: {e}");
        }
        store
    }

    /// Unloaded ticket view bound to this session's channel
    pub fn ticket_store(&self) -> TicketSyncStore {
        TicketSyncStore::new(self.api.clone(), self.channel.clone(), self.notices.clone())
    }

    pub fn signed_in_user(&self) -> Option<i64> {
        *self.signed_in.lock()
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.session.identity()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn api(&self) -> &Arc<dyn DeskApi> {
        &self.api
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn alerts(&self) -> &AlertBridge {
        &self.alerts
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn lists(&self) -> &TicketListStore {
        &self.lists
    }
}

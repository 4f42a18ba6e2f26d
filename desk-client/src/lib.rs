//! Desk Client - real-time ticket sync and notifications
//!
//! Client core of the service desk: a STOMP push channel per session, the
//! open-ticket and ticket-list stores, the system notification queue and the
//! personal alert bridge. Presentation is left to the host; everything here
//! is observable state plus async operations.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod notification;
pub mod session;
pub mod ticket;

pub use channel::{ChannelState, Connector, EventChannel, MemoryBroker, Subscription};
pub use client::{DeskClient, DeskClientBuilder};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::{Attachment, DeskApi, NetworkDeskApi};
pub use notification::{
    AlertBridge, AlertPlatform, NotificationPhase, NotificationQueue, Permission,
    PlatformNotification, QueueState, TracingAlertPlatform,
};
pub use session::{
    NoticeLevel, NoticeSink, SessionHandle, SessionIdentity, SessionProvider, TracingNoticeSink,
};
pub use ticket::{ListSnapshot, ListView, TicketListStore, TicketSyncStore, TicketView};

// Re-export shared types for convenience
pub use shared::{
    SystemNotification, Ticket, TicketAlert, TicketInteraction, TicketPriority, TicketStatus, Topic,
};

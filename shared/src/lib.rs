//! Shared types for the service desk client
//!
//! Wire types exchanged with the desk backend: ticket models, system
//! notifications and the push-channel topic / payload definitions.

pub mod message;
pub mod models;
pub mod time;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use message::{Topic, TicketAlert};
pub use models::{
    InteractionType, NotificationType, SystemNotification, TeamRef, Ticket, TicketInteraction,
    TicketPriority, TicketStatus, UserRef,
};

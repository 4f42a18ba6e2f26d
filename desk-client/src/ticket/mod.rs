//! Ticket views
//!
//! - [`TicketSyncStore`]: one open ticket, REST snapshot merged with pushes
//! - [`TicketListStore`]: the three list views
//! - [`display`]: priority / status labels and colors

pub mod display;
pub mod list;
pub mod sync;
pub mod timeline;

pub use list::{ListSnapshot, ListView, TicketListStore};
pub use sync::{TicketSyncStore, TicketView};
pub use timeline::Timeline;

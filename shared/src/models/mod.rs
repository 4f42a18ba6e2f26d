//! Data models
//!
//! Read-mostly copies of backend entities. The backend owns these records;
//! the client only caches them per view. All IDs are `i64`.

pub mod interaction;
pub mod notification;
pub mod ticket;
pub mod user;

// Re-exports
pub use interaction::*;
pub use notification::*;
pub use ticket::*;
pub use user::*;

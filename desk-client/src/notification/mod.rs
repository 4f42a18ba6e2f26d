//! System notifications and personal alerts
//!
//! - [`NotificationQueue`]: pending announcements, presented one at a time
//! - [`AlertBridge`]: per-user pushes turned into sound + platform notification

pub mod alert;
pub mod queue;

pub use alert::{AlertBridge, AlertPlatform, Permission, PlatformNotification, TracingAlertPlatform};
pub use queue::{NotificationPhase, NotificationQueue, QueueState};

//! System notification (news / announcement / changelog)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 系统通知类型
///
/// The backend mixes upper-case editorial kinds with lower-case severity
/// kinds; the wire names are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    #[serde(rename = "NEWS")]
    News,
    #[serde(rename = "SYSTEM_ANNOUNCEMENT")]
    SystemAnnouncement,
    #[serde(rename = "CHANGELOG")]
    Changelog,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "critical")]
    Critical,
    #[serde(other)]
    Unknown,
}

/// A system notification delivered to the user as "pending" until read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotification {
    pub id: i64,
    pub title: String,
    /// Markdown or plain text
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Must not be dismissed without an acknowledgment round-trip
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(with = "crate::time::timestamp")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_case_types() {
        let json = r#"[
            {"id":1,"title":"Nova versão","type":"CHANGELOG","mandatory":true,"createdAt":"2024-05-01T09:00:00"},
            {"id":2,"title":"Manutenção","type":"warning","createdAt":"2024-05-01T09:30:00"},
            {"id":3,"title":"?","type":"PROMO","createdAt":"2024-05-01T09:45:00"}
        ]"#;
        let list: Vec<SystemNotification> = serde_json::from_str(json).unwrap();
        assert_eq!(list[0].notification_type, NotificationType::Changelog);
        assert!(list[0].mandatory);
        assert!(list[0].active);
        assert_eq!(list[1].notification_type, NotificationType::Warning);
        assert!(!list[1].mandatory);
        assert_eq!(list[2].notification_type, NotificationType::Unknown);
    }
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 个人提醒载荷 (服务端 -> 客户端)
///
/// Published on `user/{id}/notifications` whenever something happens to a
/// ticket the user cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAlert {
    pub title: String,
    pub message: String,
    pub ticket_id: i64,
}

impl TicketAlert {
    /// Platform notification tag; a later alert for the same ticket replaces
    /// the earlier one instead of stacking.
    pub fn tag(&self) -> String {
        format!("ticket-{}", self.ticket_id)
    }
}

/// Decode a push payload into a typed message
pub fn decode_payload<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_decode_and_tag() {
        let value = serde_json::json!({
            "title": "Novo comentário",
            "message": "Ana comentou no chamado #42",
            "ticketId": 42
        });
        let alert: TicketAlert = decode_payload(&value).unwrap();
        assert_eq!(alert.ticket_id, 42);
        assert_eq!(alert.tag(), "ticket-42");
    }

    #[test]
    fn test_alert_decode_rejects_wrong_shape() {
        let value = serde_json::json!({ "id": 1, "content": "x" });
        assert!(decode_payload::<TicketAlert>(&value).is_err());
    }
}

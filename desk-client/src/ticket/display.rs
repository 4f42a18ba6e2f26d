//! Display mappings for ticket lists
//!
//! Pure and total: every enum value maps to a label and a color class, and
//! values the client does not know fall back to a neutral style.

use shared::{TicketPriority, TicketStatus};

/// Neutral style for unknown values
pub const NEUTRAL_COLOR: &str = "bg-gray-100 text-gray-800";
pub const UNKNOWN_LABEL: &str = "Desconhecido";

pub fn priority_label(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "Baixa",
        TicketPriority::Medium => "Média",
        TicketPriority::High => "Alta",
        TicketPriority::Critical => "Crítica",
        TicketPriority::Unknown => UNKNOWN_LABEL,
    }
}

pub fn priority_color(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "bg-green-100 text-green-800",
        TicketPriority::Medium => "bg-yellow-100 text-yellow-800",
        TicketPriority::High => "bg-orange-100 text-orange-800",
        TicketPriority::Critical => "bg-red-100 text-red-800",
        TicketPriority::Unknown => NEUTRAL_COLOR,
    }
}

pub fn status_label(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "Aberto",
        TicketStatus::InProgress => "Em andamento",
        TicketStatus::Waiting => "Aguardando",
        TicketStatus::Resolved => "Resolvido",
        TicketStatus::Closed => "Fechado",
        TicketStatus::Unknown => UNKNOWN_LABEL,
    }
}

pub fn status_color(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "bg-blue-100 text-blue-800",
        TicketStatus::InProgress => "bg-purple-100 text-purple-800",
        TicketStatus::Waiting => "bg-yellow-100 text-yellow-800",
        TicketStatus::Resolved => "bg-green-100 text-green-800",
        TicketStatus::Closed => "bg-slate-100 text-slate-600",
        TicketStatus::Unknown => NEUTRAL_COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_values_use_neutral_default() {
        let priority: TicketPriority = serde_json::from_str("\"URGENTISSIMO\"").unwrap();
        assert_eq!(priority_label(priority), UNKNOWN_LABEL);
        assert_eq!(priority_color(priority), NEUTRAL_COLOR);

        let status: TicketStatus = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(status_label(status), UNKNOWN_LABEL);
        assert_eq!(status_color(status), NEUTRAL_COLOR);
    }

    #[test]
    fn test_known_labels() {
        assert_eq!(priority_label(TicketPriority::Critical), "Crítica");
        assert_eq!(status_label(TicketStatus::InProgress), "Em andamento");
        assert_eq!(status_color(TicketStatus::Resolved), "bg-green-100 text-green-800");
        assert_ne!(priority_color(TicketPriority::Low), NEUTRAL_COLOR);
    }
}

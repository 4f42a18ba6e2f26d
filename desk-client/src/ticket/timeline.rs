// desk-client/src/ticket/timeline.rs
// 时间线合并 - 按 id 去重, 按 createdAt 排序

use shared::TicketInteraction;
use std::collections::HashSet;

/// Interaction timeline keyed by id
///
/// Entries stay sorted by `created_at` ascending; entries with the same
/// timestamp keep their arrival order. An id is stored at most once, the first
/// copy wins.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TicketInteraction>,
    ids: HashSet<i64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a REST snapshot (duplicates inside the snapshot are dropped)
    pub fn from_snapshot(entries: Vec<TicketInteraction>) -> Self {
        let mut timeline = Self::new();
        for entry in entries {
            timeline.insert(entry);
        }
        timeline
    }

    /// Insert unless the id is already present; returns whether it was added
    pub fn insert(&mut self, entry: TicketInteraction) -> bool {
        if !self.ids.insert(entry.id) {
            return false;
        }
        let at = self
            .entries
            .partition_point(|e| e.created_at <= entry.created_at);
        self.entries.insert(at, entry);
        true
    }

    /// Merge entries from another timeline (ids already present are skipped)
    pub fn merge(&mut self, other: Timeline) -> usize {
        other
            .entries
            .into_iter()
            .map(|entry| self.insert(entry))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn entries(&self) -> &[TicketInteraction] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::InteractionType;

    fn entry(id: i64, minute: u32) -> TicketInteraction {
        TicketInteraction {
            id,
            ticket_id: 1,
            user: None,
            interaction_type: InteractionType::Comment,
            content: format!("#{id}"),
            attachment_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut timeline = Timeline::from_snapshot(vec![entry(1, 0), entry(2, 1), entry(3, 2)]);
        assert!(!timeline.insert(entry(2, 1)));
        assert!(timeline.insert(entry(4, 3)));
        assert_eq!(timeline.ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_order_arrival_is_sorted() {
        let mut timeline = Timeline::new();
        timeline.insert(entry(3, 5));
        timeline.insert(entry(1, 1));
        timeline.insert(entry(2, 3));
        timeline.insert(entry(1, 1));
        assert_eq!(timeline.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut timeline = Timeline::new();
        timeline.insert(entry(9, 0));
        timeline.insert(entry(5, 0));
        timeline.insert(entry(7, 0));
        assert_eq!(timeline.ids(), vec![9, 5, 7]);
    }

    #[test]
    fn test_merge_skips_known_ids() {
        let mut snapshot = Timeline::from_snapshot(vec![entry(1, 0), entry(2, 1)]);
        let live = Timeline::from_snapshot(vec![entry(2, 1), entry(3, 2)]);
        assert_eq!(snapshot.merge(live), 1);
        assert_eq!(snapshot.ids(), vec![1, 2, 3]);
        assert!(snapshot.contains(3));

        snapshot.clear();
        assert!(snapshot.is_empty());
        assert!(!snapshot.contains(1));
    }
}

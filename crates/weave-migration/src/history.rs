//! Bounded log of finished migrations.

use std::collections::VecDeque;

use crate::types::{MigrationId, MigrationStatus};

/// Default number of finished migrations retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Append-only record of terminal migrations.
///
/// The history keeps at most `max_entries` statuses and evicts the oldest
/// entry when full.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    max_entries: usize,
    entries: VecDeque<MigrationStatus>,
}

impl Default for MigrationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl MigrationHistory {
    /// Creates a history holding up to `max_entries` statuses. A limit of
    /// zero is raised to one.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            entries: VecDeque::with_capacity(max_entries.min(DEFAULT_HISTORY_LIMIT)),
        }
    }

    /// Appends a terminal status, evicting the oldest if at capacity.
    pub fn record(&mut self, status: MigrationStatus) {
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(status);
    }

    /// Finds a migration by id.
    #[must_use]
    pub fn find(&self, id: &MigrationId) -> Option<&MigrationStatus> {
        self.entries.iter().find(|s| &s.id == id)
    }

    /// The most recent `count` entries, newest first.
    #[must_use]
    pub fn list_recent(&self, count: usize) -> Vec<MigrationStatus> {
        self.entries.iter().rev().take(count).cloned().collect()
    }

    /// Oldest retained entry.
    #[must_use]
    pub fn oldest(&self) -> Option<&MigrationStatus> {
        self.entries.front()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use weave_container::ContainerId;

    use super::*;
    use crate::types::{MigrationReason, MigrationRequest};

    fn finished() -> MigrationStatus {
        let request = MigrationRequest::new(
            ContainerId::generate(),
            "edge-1",
            "edge-2",
            MigrationReason::LoadBalancing,
        );
        MigrationStatus::pending(MigrationId::new(), request, Utc::now())
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(MigrationHistory::new(0).capacity(), 1);
        assert_eq!(MigrationHistory::default().capacity(), DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = MigrationHistory::new(2);
        let first = finished();
        let second = finished();
        let third = finished();
        history.record(first.clone());
        history.record(second.clone());
        history.record(third.clone());

        assert_eq!(history.len(), 2);
        assert!(history.find(&first.id).is_none());
        assert_eq!(history.oldest().map(|s| s.id), Some(second.id));

        let recent = history.list_recent(5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, third.id);
    }

    #[test]
    fn test_empty() {
        let history = MigrationHistory::new(4);
        assert!(history.is_empty());
        assert!(history.list_recent(3).is_empty());
    }
}

//! Global notification log, newest first.

use shared::models::{Notification, NotificationId, NotificationStatus};
use tracing::debug;

use crate::reconcile;

/// Identifies one `fetch_all` round; only the latest may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

#[derive(Debug)]
pub struct NotificationStore {
    items: Vec<Notification>,
    loading: bool,
    generation: u64,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Empty store, loading until its first fetch resolves.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            generation: 0,
        }
    }

    pub fn begin_fetch(&mut self) -> RefreshTicket {
        self.generation += 1;
        self.loading = true;
        RefreshTicket(self.generation)
    }

    /// Replaces the log. Superseded fetches are ignored.
    pub fn apply_fetch(&mut self, ticket: RefreshTicket, items: Vec<Notification>) -> bool {
        if ticket.0 != self.generation {
            debug!("discarding superseded notification fetch");
            return false;
        }
        self.items = items;
        self.loading = false;
        true
    }

    /// Leaves the log untouched.
    pub fn fail_fetch(&mut self, ticket: RefreshTicket) -> bool {
        if ticket.0 != self.generation {
            return false;
        }
        self.loading = false;
        true
    }

    /// Flips every entry with `id` to `viewed`, repeated pushes included.
    /// Returns `false` if the id is unknown.
    pub fn mark_viewed(&mut self, id: &NotificationId) -> bool {
        let changed = reconcile::update_all(&mut self.items, id, |notification| {
            notification.status = NotificationStatus::Viewed;
        });
        changed > 0
    }

    /// Removes every entry with `id`. Returns `false` if the id is unknown.
    pub fn remove(&mut self, id: &NotificationId) -> bool {
        reconcile::remove_all(&mut self.items, id) > 0
    }

    /// Adds a pushed notification at the front. No deduplication.
    pub fn prepend(&mut self, notification: Notification) {
        self.items.insert(0, notification);
    }

    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items
            .iter()
            .filter(|notification| notification.is_unread())
            .count()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

pub mod conversation;
pub mod notifications;
pub mod view;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use conversation::{
    ConversationStore, DEFAULT_PAGE_SIZE, FetchTicket, IngestOutcome, OlderPageRequest,
    PendingSend, SendRejected,
};
pub use notifications::{NotificationStore, RefreshTicket};
pub use view::{ScrollAnchor, ScrollBehavior, ViewEffect, ViewportMetrics};

/// Store locks are never held across an await point; a poisoned lock still holds a usable log.
pub(crate) fn lock<T>(store: &Mutex<T>) -> MutexGuard<'_, T> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

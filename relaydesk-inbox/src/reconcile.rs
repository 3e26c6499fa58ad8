//! Optimistic-then-reconcile helpers shared by the message and notification logs.
//!
//! A store applies a tentative entry locally, then either confirms it (swap
//! the tentative entry for the server's version, matched by key), marks it
//! failed, or resyncs. These helpers implement the key-matching half once.

use shared::models::{Message, MessageId, Notification, NotificationId};

/// An entry addressable by key within its log.
///
/// Message logs keep keys unique. The notification log does not, since a
/// repeated push is prepended again.
pub trait Keyed {
    type Key: PartialEq;

    fn key(&self) -> &Self::Key;
}

impl Keyed for Message {
    type Key = MessageId;

    fn key(&self) -> &MessageId {
        &self.id
    }
}

impl Keyed for Notification {
    type Key = NotificationId;

    fn key(&self) -> &NotificationId {
        &self.id
    }
}

/// What [`confirm`] did with a tentative entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The tentative entry was replaced in place.
    Replaced,
    /// The confirmed key was already present; the tentative entry was dropped.
    Deduplicated,
    /// No entry carried the tentative key.
    Missing,
}

pub fn position<T: Keyed>(log: &[T], key: &T::Key) -> Option<usize> {
    log.iter().position(|entry| entry.key() == key)
}

pub fn contains<T: Keyed>(log: &[T], key: &T::Key) -> bool {
    position(log, key).is_some()
}

/// Applies `change` to the entry with `key`. Returns `false` if absent.
pub fn update<T: Keyed>(log: &mut [T], key: &T::Key, change: impl FnOnce(&mut T)) -> bool {
    match log.iter_mut().find(|entry| entry.key() == key) {
        Some(entry) => {
            change(entry);
            true
        }
        None => false,
    }
}

/// Replaces the entry keyed `tentative` with `confirmed`, keeping its position.
///
/// Keys stay unique: when another entry already carries the confirmed key,
/// the tentative entry is removed instead.
pub fn confirm<T: Keyed>(log: &mut Vec<T>, tentative: &T::Key, confirmed: T) -> Confirmation {
    let Some(index) = position(log, tentative) else {
        return Confirmation::Missing;
    };

    let duplicate = log
        .iter()
        .enumerate()
        .any(|(other, entry)| other != index && entry.key() == confirmed.key());
    if duplicate {
        log.remove(index);
        return Confirmation::Deduplicated;
    }

    log[index] = confirmed;
    Confirmation::Replaced
}

/// Applies `change` to every entry with `key`. Returns how many matched.
pub fn update_all<T: Keyed>(log: &mut [T], key: &T::Key, mut change: impl FnMut(&mut T)) -> usize {
    let mut matched = 0;
    for entry in log.iter_mut().filter(|entry| entry.key() == key) {
        change(entry);
        matched += 1;
    }
    matched
}

/// Removes every entry with `key`. Returns how many were removed.
pub fn remove_all<T: Keyed>(log: &mut Vec<T>, key: &T::Key) -> usize {
    let before = log.len();
    log.retain(|entry| entry.key() != key);
    before - log.len()
}

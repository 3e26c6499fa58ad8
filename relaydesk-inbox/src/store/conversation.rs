//! Message log of the currently open conversation.
//!
//! The store is a synchronous state machine. Every network-backed operation
//! is split into a `begin_*` step that mutates the log optimistically and
//! hands out a request description, and an `apply_*`/`confirm_*`/`fail_*`
//! step fed with the outcome. Requests carry a [`FetchTicket`]; outcomes for
//! a conversation that is no longer open are discarded.

use std::{fmt, mem};

use shared::models::{
    Contact, DeliveryStatus, IncomingMessage, Message, MessageId, SendReceipt, Timestamp,
};
use tracing::debug;

use super::view::{ScrollAnchor, ScrollBehavior, ViewEffect};
use crate::reconcile::{self, Confirmation};

pub const DEFAULT_PAGE_SIZE: usize = 20;

const PUSH_ID_PREFIX: &str = "push-";

/// Identifies the conversation generation a request was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    contact_id: String,
    generation: u64,
}

impl FetchTicket {
    #[must_use]
    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }
}

/// A backward page to fetch: up to `limit` messages older than `before`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlderPageRequest {
    pub ticket: FetchTicket,
    pub before: Timestamp,
    pub limit: usize,
}

/// An optimistic send awaiting its HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub ticket: FetchTicket,
    pub temp_id: MessageId,
    pub phone_number: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    NoConversation,
    Blank,
    /// The automated agent owns the conversation until the operator takes over.
    BotActive,
}

impl fmt::Display for SendRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoConversation => "no conversation is open",
            Self::Blank => "message is empty",
            Self::BotActive => "the bot is handling this conversation",
        })
    }
}

/// Result of ingesting a pushed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message belongs to a conversation that is not open.
    OtherConversation,
    /// A pending entry was upgraded to the server id.
    Reconciled(MessageId),
    /// The server id was already in the log.
    Duplicate,
    Appended(ViewEffect),
}

#[derive(Debug)]
pub struct ConversationStore {
    contact: Option<Contact>,
    generation: u64,
    messages: Vec<Message>,
    has_more: bool,
    loading_initial: bool,
    loading_older: bool,
    older_cursor: Option<Timestamp>,
    page_size: usize,
    local_seq: u64,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl ConversationStore {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            contact: None,
            generation: 0,
            messages: Vec::new(),
            has_more: false,
            loading_initial: false,
            loading_older: false,
            older_cursor: None,
            page_size: page_size.max(1),
            local_seq: 0,
        }
    }

    /// Switches to `contact`, discarding the previous log, and returns the
    /// ticket for the initial history fetch.
    pub fn open(&mut self, contact: Contact) -> FetchTicket {
        self.generation += 1;
        debug!(contact_id = %contact.id, generation = self.generation, "opening conversation");
        let ticket = FetchTicket {
            contact_id: contact.id.clone(),
            generation: self.generation,
        };
        self.contact = Some(contact);
        self.messages.clear();
        self.has_more = false;
        self.loading_initial = true;
        self.loading_older = false;
        self.older_cursor = None;
        ticket
    }

    /// Replaces the log with the newest page.
    ///
    /// Entries created locally or pushed while the page was in flight are
    /// kept after it unless the page already contains them.
    pub fn apply_initial(&mut self, ticket: &FetchTicket, page: Vec<Message>) -> Option<ViewEffect> {
        if !self.is_current(ticket) {
            debug!(contact_id = %ticket.contact_id, "discarding stale history page");
            return None;
        }

        let fetched = page.len();
        let mut log = normalize(page);
        for entry in mem::take(&mut self.messages) {
            if !reconcile::contains(&log, &entry.id) {
                log.push(entry);
            }
        }

        self.messages = log;
        self.has_more = fetched == self.page_size;
        self.loading_initial = false;
        Some(ViewEffect::ScrollToBottom(ScrollBehavior::Instant))
    }

    /// Returns `true` if the failure belonged to the open conversation.
    pub fn fail_initial(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading_initial = false;
        true
    }

    /// Starts a backward page load, or returns `None` when one is already in
    /// flight, the log is empty, or there is nothing older.
    pub fn begin_load_older(&mut self) -> Option<OlderPageRequest> {
        if self.loading_older || !self.has_more {
            return None;
        }
        let ticket = self.ticket()?;
        let before = self.messages.iter().map(|message| message.timestamp).min()?;

        self.loading_older = true;
        self.older_cursor = Some(before);
        Some(OlderPageRequest {
            ticket,
            before,
            limit: self.page_size,
        })
    }

    /// Prepends an older page and reports the anchor to keep in view.
    pub fn apply_older(&mut self, ticket: &FetchTicket, page: Vec<Message>) -> Option<ViewEffect> {
        if !self.is_current(ticket) {
            debug!(contact_id = %ticket.contact_id, "discarding stale older page");
            return None;
        }

        self.loading_older = false;
        self.has_more = page.len() == self.page_size;
        let cursor = self.older_cursor.take();

        let older: Vec<Message> = normalize(page)
            .into_iter()
            .filter(|message| cursor.is_none_or(|before| message.timestamp <= before))
            .filter(|message| !reconcile::contains(&self.messages, &message.id))
            .collect();
        if older.is_empty() {
            return None;
        }

        let anchor_id = self.messages.first()?.id.clone();
        let prepended = older.len();
        self.messages.splice(0..0, older);
        Some(ViewEffect::PreserveAnchor(ScrollAnchor {
            anchor_id,
            prepended,
        }))
    }

    pub fn fail_older(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading_older = false;
        self.older_cursor = None;
        true
    }

    /// Appends a pending owner message and returns the request to issue.
    ///
    /// # Errors
    /// Rejects blank content, a missing conversation, or a conversation the bot is handling.
    pub fn begin_send(&mut self, content: &str) -> Result<(PendingSend, ViewEffect), SendRejected> {
        let ticket = self.ticket().ok_or(SendRejected::NoConversation)?;
        if content.trim().is_empty() {
            return Err(SendRejected::Blank);
        }
        let contact = self.contact.as_ref().ok_or(SendRejected::NoConversation)?;
        if contact.is_bot_active {
            return Err(SendRejected::BotActive);
        }
        let phone_number = contact.phone_number.clone();

        let now = Timestamp::now();
        let temp_id = MessageId::temporary(now, self.next_seq());
        self.messages
            .push(Message::pending(temp_id.clone(), content, now));

        let send = PendingSend {
            ticket,
            temp_id,
            phone_number,
            content: content.to_string(),
        };
        Ok((send, ViewEffect::ScrollToBottom(ScrollBehavior::Smooth)))
    }

    /// Upgrades the pending entry with the server's id and timestamp.
    ///
    /// A receipt without an id leaves the temporary id in place with status `sent`.
    pub fn confirm_send(&mut self, send: &PendingSend, receipt: SendReceipt) -> Confirmation {
        if !self.is_current(&send.ticket) {
            return Confirmation::Missing;
        }
        let Some(index) = reconcile::position(&self.messages, &send.temp_id) else {
            return Confirmation::Missing;
        };

        let tentative = &self.messages[index];
        let confirmed = Message {
            id: receipt.id.unwrap_or_else(|| send.temp_id.clone()),
            role: tentative.role,
            content: tentative.content.clone(),
            timestamp: receipt.timestamp.unwrap_or(tentative.timestamp),
            status: DeliveryStatus::Sent,
        };
        reconcile::confirm(&mut self.messages, &send.temp_id, confirmed)
    }

    /// Marks the pending entry `failed` in place. Returns `false` if it is gone.
    pub fn fail_send(&mut self, send: &PendingSend) -> bool {
        if !self.is_current(&send.ticket) {
            return false;
        }
        reconcile::update(&mut self.messages, &send.temp_id, |message| {
            if message.is_pending() {
                message.status = DeliveryStatus::Failed;
            }
        })
    }

    /// Reconciles a pushed message with the log.
    ///
    /// Known server ids are dropped. Otherwise the oldest pending entry with
    /// the same content and role is upgraded in place; failing that the
    /// message is appended without re-sorting.
    pub fn ingest(&mut self, incoming: IncomingMessage) -> IngestOutcome {
        let belongs = self.contact.as_ref().is_some_and(|contact| {
            contact.matches(incoming.contact_id.as_deref(), incoming.phone_number.as_deref())
        });
        if !belongs {
            return IngestOutcome::OtherConversation;
        }

        let now = Timestamp::now();
        let id = match incoming.id {
            Some(id) => id,
            None => {
                let seq = self.next_seq();
                MessageId::new(format!("{PUSH_ID_PREFIX}{}-{seq}", now.timestamp_millis()))
            }
        };
        if reconcile::contains(&self.messages, &id) {
            return IngestOutcome::Duplicate;
        }

        let message = Message {
            id: id.clone(),
            role: incoming.role,
            content: incoming.content,
            timestamp: incoming.timestamp.unwrap_or(now),
            status: DeliveryStatus::Sent,
        };

        let pending = self
            .messages
            .iter()
            .find(|entry| {
                entry.is_pending() && entry.role == message.role && entry.content == message.content
            })
            .map(|entry| entry.id.clone());
        if let Some(temp_id) = pending {
            reconcile::confirm(&mut self.messages, &temp_id, message);
            return IngestOutcome::Reconciled(id);
        }

        self.messages.push(message);
        IngestOutcome::Appended(ViewEffect::ScrollToBottom(ScrollBehavior::Smooth))
    }

    /// Overwrites the status of a loaded message; unknown ids are ignored.
    pub fn update_status(&mut self, id: &MessageId, status: DeliveryStatus) -> bool {
        reconcile::update(&mut self.messages, id, |message| message.status = status)
    }

    /// Mirrors a bot toggle on the open contact.
    pub fn set_bot_active(&mut self, contact_id: &str, active: bool) -> bool {
        match self.contact.as_mut() {
            Some(contact) if contact.id == contact_id => {
                contact.is_bot_active = active;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn is_loading_initial(&self) -> bool {
        self.loading_initial
    }

    #[must_use]
    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Ticket for the open conversation, if any.
    #[must_use]
    pub fn ticket(&self) -> Option<FetchTicket> {
        self.contact.as_ref().map(|contact| FetchTicket {
            contact_id: contact.id.clone(),
            generation: self.generation,
        })
    }

    #[must_use]
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self
                .contact
                .as_ref()
                .is_some_and(|contact| contact.id == ticket.contact_id)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.local_seq;
        self.local_seq += 1;
        seq
    }
}

/// Server pages are ascending, unique, and never `pending`.
fn normalize(page: Vec<Message>) -> Vec<Message> {
    let mut log: Vec<Message> = Vec::with_capacity(page.len());
    for mut message in page {
        if reconcile::contains(&log, &message.id) {
            continue;
        }
        if message.status == DeliveryStatus::Pending {
            message.status = DeliveryStatus::Sent;
        }
        log.push(message);
    }
    log.sort_by_key(|message| message.timestamp);
    log
}

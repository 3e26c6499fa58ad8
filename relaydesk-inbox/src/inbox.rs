//! # Inbox Controller
//!
//! Drives the stores through the request gateway. Each user intent runs the
//! store's optimistic step, awaits the request with no lock held, then feeds
//! the outcome back. Changes are announced as [`InboxSignal`]s.
//!
//! Nothing on the send, push, or notification paths returns an error: failures
//! end in a status change or a resync plus a log line.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use metrics::counter;
use shared::models::{
    Appointment, AppointmentStatus, Contact, Message, MessageId, Notification, NotificationId,
    Timestamp,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::GatewayResult,
    gateway::RequestGateway,
    reconcile::Confirmation,
    router::EventRouter,
    store::{ConversationStore, NotificationStore, SendRejected, ViewEffect, lock},
};

/// Change notifications for whatever renders the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxSignal {
    MessagesChanged,
    NotificationsChanged,
    /// Conversation summaries (contact list, previews) are stale.
    RefreshSummaries,
    View(ViewEffect),
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server accepted it; `id` is the entry's final id.
    Delivered { id: MessageId, confirmation: Confirmation },
    /// The entry stays in the log with status `failed`.
    Failed { temp_id: MessageId },
}

#[derive(Clone)]
pub struct Inbox {
    gateway: Arc<dyn RequestGateway>,
    conversation: Arc<Mutex<ConversationStore>>,
    notifications: Arc<Mutex<NotificationStore>>,
    signals: mpsc::UnboundedSender<InboxSignal>,
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("conversation", &self.conversation)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}

impl Inbox {
    /// Creates an inbox and the receiving end of its signals.
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        page_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<InboxSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let inbox = Self {
            gateway,
            conversation: Arc::new(Mutex::new(ConversationStore::new(page_size))),
            notifications: Arc::new(Mutex::new(NotificationStore::new())),
            signals,
        };
        (inbox, receiver)
    }

    /// Router bound to this inbox's stores, for the push stream.
    #[must_use]
    pub fn router(&self) -> EventRouter {
        EventRouter::new(
            Arc::clone(&self.conversation),
            Arc::clone(&self.notifications),
            self.signals.clone(),
        )
    }

    /// Switches to `contact` and loads its newest page.
    ///
    /// # Errors
    /// Returns the gateway error if the page could not be fetched. The log is
    /// left empty and the conversation stays open.
    pub async fn open_conversation(&self, contact: Contact) -> GatewayResult<()> {
        let (ticket, page_size) = {
            let mut store = lock(&self.conversation);
            (store.open(contact), store.page_size())
        };
        self.emit(InboxSignal::MessagesChanged);

        let result = self
            .gateway
            .fetch_history(ticket.contact_id(), page_size, None)
            .await;

        match result {
            Ok(page) => {
                let count = page.len();
                let effect = lock(&self.conversation).apply_initial(&ticket, page);
                if let Some(effect) = effect {
                    info!(contact_id = %ticket.contact_id(), count, "conversation loaded");
                    self.emit(InboxSignal::MessagesChanged);
                    self.emit(InboxSignal::View(effect));
                }
                Ok(())
            }
            Err(err) => {
                if lock(&self.conversation).fail_initial(&ticket) {
                    error!(contact_id = %ticket.contact_id(), error = %err, "failed to load conversation");
                    self.emit(InboxSignal::MessagesChanged);
                }
                Err(err)
            }
        }
    }

    /// Loads one older page. Returns `false` without a request when a load is
    /// already running or there is nothing older.
    pub async fn load_older(&self) -> bool {
        let request = lock(&self.conversation).begin_load_older();
        let Some(request) = request else {
            debug!("load older skipped");
            return false;
        };

        let result = self
            .gateway
            .fetch_history(request.ticket.contact_id(), request.limit, Some(request.before))
            .await;

        match result {
            Ok(page) => {
                let effect = lock(&self.conversation).apply_older(&request.ticket, page);
                self.emit(InboxSignal::MessagesChanged);
                if let Some(effect) = effect {
                    self.emit(InboxSignal::View(effect));
                }
            }
            Err(err) => {
                if lock(&self.conversation).fail_older(&request.ticket) {
                    warn!(contact_id = %request.ticket.contact_id(), error = %err, "failed to load older messages");
                    self.emit(InboxSignal::MessagesChanged);
                }
            }
        }
        true
    }

    /// Sends `content` to the open conversation, showing it immediately as pending.
    ///
    /// # Errors
    /// Rejects the send before any request when it cannot be attempted.
    pub async fn send(&self, content: &str) -> Result<SendOutcome, SendRejected> {
        let (send, effect) = lock(&self.conversation).begin_send(content)?;
        self.emit(InboxSignal::MessagesChanged);
        self.emit(InboxSignal::View(effect));

        let result = self
            .gateway
            .send_message(&send.phone_number, &send.content)
            .await;

        let outcome = match result {
            Ok(receipt) => {
                let id = receipt.id.clone().unwrap_or_else(|| send.temp_id.clone());
                let confirmation = lock(&self.conversation).confirm_send(&send, receipt);
                debug!(temp_id = %send.temp_id, message_id = %id, ?confirmation, "send confirmed");
                SendOutcome::Delivered { id, confirmation }
            }
            Err(err) => {
                counter!("relaydesk_sends_failed_total").increment(1);
                error!(temp_id = %send.temp_id, error = %err, "failed to send message");
                lock(&self.conversation).fail_send(&send);
                SendOutcome::Failed {
                    temp_id: send.temp_id.clone(),
                }
            }
        };
        self.emit(InboxSignal::MessagesChanged);
        Ok(outcome)
    }

    /// Replaces the notification log. Failures keep the previous log and
    /// return `false`.
    pub async fn fetch_notifications(&self) -> bool {
        let ticket = lock(&self.notifications).begin_fetch();
        self.emit(InboxSignal::NotificationsChanged);

        let fetched = match self.gateway.fetch_notifications().await {
            Ok(items) => {
                lock(&self.notifications).apply_fetch(ticket, items);
                true
            }
            Err(err) => {
                error!(error = %err, "failed to fetch notifications");
                lock(&self.notifications).fail_fetch(ticket);
                false
            }
        };
        self.emit(InboxSignal::NotificationsChanged);
        fetched
    }

    /// Marks a notification viewed. A rejected confirmation is only logged.
    pub async fn mark_notification_viewed(&self, id: &NotificationId) {
        if lock(&self.notifications).mark_viewed(id) {
            self.emit(InboxSignal::NotificationsChanged);
        }
        if let Err(err) = self.gateway.mark_notification_viewed(id).await {
            warn!(notification_id = %id, error = %err, "failed to mark notification viewed");
        }
    }

    /// Removes a notification. If the server rejects the delete, the whole
    /// log is fetched again.
    pub async fn delete_notification(&self, id: &NotificationId) {
        if lock(&self.notifications).remove(id) {
            self.emit(InboxSignal::NotificationsChanged);
        }
        if let Err(err) = self.gateway.delete_notification(id).await {
            error!(notification_id = %id, error = %err, "failed to delete notification, resyncing");
            self.fetch_notifications().await;
        }
    }

    /// # Errors
    /// Returns the gateway error unchanged.
    pub async fn fetch_contacts(&self) -> GatewayResult<Vec<Contact>> {
        self.gateway.fetch_contacts().await
    }

    /// Hands a conversation to or from the bot.
    ///
    /// # Errors
    /// Returns the gateway error; the open conversation is not changed then.
    pub async fn toggle_bot(&self, contact_id: &str, active: bool) -> GatewayResult<Contact> {
        let contact = self.gateway.toggle_bot(contact_id, active).await?;
        lock(&self.conversation).set_bot_active(contact_id, contact.is_bot_active);
        info!(contact_id, active = contact.is_bot_active, "bot toggled");
        self.emit(InboxSignal::RefreshSummaries);
        Ok(contact)
    }

    /// # Errors
    /// Returns the gateway error unchanged.
    pub async fn fetch_appointments(
        &self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> GatewayResult<Vec<Appointment>> {
        self.gateway.fetch_appointments(start, end).await
    }

    /// # Errors
    /// Returns the gateway error unchanged.
    pub async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> GatewayResult<()> {
        self.gateway
            .update_appointment_status(appointment_id, status)
            .await
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.conversation).messages().to_vec()
    }

    #[must_use]
    pub fn open_contact(&self) -> Option<Contact> {
        lock(&self.conversation).contact().cloned()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        lock(&self.conversation).has_more()
    }

    #[must_use]
    pub fn is_loading_older(&self) -> bool {
        lock(&self.conversation).is_loading_older()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).notifications().to_vec()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        lock(&self.notifications).unread_count()
    }

    #[must_use]
    pub fn is_loading_notifications(&self) -> bool {
        lock(&self.notifications).is_loading()
    }

    fn emit(&self, signal: InboxSignal) {
        let _ = self.signals.send(signal);
    }
}

//! Classifies raw push events and feeds them to the stores.

use std::sync::{Arc, Mutex};

use metrics::counter;
use serde::de::DeserializeOwned;
use shared::models::{IncomingMessage, MessageStatusUpdate, Notification};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    error::RouteError,
    inbox::InboxSignal,
    store::{ConversationStore, IngestOutcome, NotificationStore, lock},
    stream::{EventHandler, RawEvent},
};

pub const NEW_MESSAGE: &str = "NEW_MESSAGE";
pub const MESSAGE_STATUS_UPDATE: &str = "MESSAGE_STATUS_UPDATE";
pub const NEW_NOTIFICATION: &str = "NEW_NOTIFICATION";

/// A push event decoded once at the router boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    NewMessage(IncomingMessage),
    MessageStatusUpdate(MessageStatusUpdate),
    NewNotification(Notification),
    /// A type this client does not handle; the payload is not parsed.
    Unknown { kind: String },
}

impl PushEvent {
    /// # Errors
    /// Returns an error if a recognized event carries a malformed payload.
    pub fn decode(event: &RawEvent) -> Result<Self, RouteError> {
        match event.kind.as_str() {
            NEW_MESSAGE => parse(event).map(Self::NewMessage),
            MESSAGE_STATUS_UPDATE => parse(event).map(Self::MessageStatusUpdate),
            NEW_NOTIFICATION => parse(event).map(Self::NewNotification),
            other => Ok(Self::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

fn parse<T: DeserializeOwned>(event: &RawEvent) -> Result<T, RouteError> {
    serde_json::from_str(&event.data).map_err(|source| RouteError {
        kind: event.kind.clone(),
        source,
    })
}

/// What routing one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Message(IngestOutcome),
    /// Whether a loaded message carried the id.
    StatusUpdated(bool),
    NotificationAdded,
    Ignored,
    Malformed,
}

/// Dispatches push events to the conversation and notification stores and
/// announces the resulting changes.
#[derive(Debug, Clone)]
pub struct EventRouter {
    conversation: Arc<Mutex<ConversationStore>>,
    notifications: Arc<Mutex<NotificationStore>>,
    signals: mpsc::UnboundedSender<InboxSignal>,
}

impl EventRouter {
    pub(crate) fn new(
        conversation: Arc<Mutex<ConversationStore>>,
        notifications: Arc<Mutex<NotificationStore>>,
        signals: mpsc::UnboundedSender<InboxSignal>,
    ) -> Self {
        Self {
            conversation,
            notifications,
            signals,
        }
    }

    /// Routes one event. Malformed payloads are logged and dropped.
    pub fn route(&self, event: &RawEvent) -> RouteOutcome {
        let decoded = match PushEvent::decode(event) {
            Ok(decoded) => decoded,
            Err(err) => {
                counter!("relaydesk_push_parse_failures_total").increment(1);
                warn!(error = %err, "dropping malformed push event");
                return RouteOutcome::Malformed;
            }
        };

        match decoded {
            PushEvent::NewMessage(incoming) => {
                let outcome = lock(&self.conversation).ingest(incoming);
                match &outcome {
                    IngestOutcome::Appended(effect) => {
                        self.emit(InboxSignal::MessagesChanged);
                        self.emit(InboxSignal::View(effect.clone()));
                    }
                    IngestOutcome::Reconciled(id) => {
                        debug!(message_id = %id, "push confirmed a pending send");
                        self.emit(InboxSignal::MessagesChanged);
                    }
                    IngestOutcome::Duplicate | IngestOutcome::OtherConversation => {}
                }
                // Summaries carry last-message previews for every conversation.
                self.emit(InboxSignal::RefreshSummaries);
                RouteOutcome::Message(outcome)
            }
            PushEvent::MessageStatusUpdate(update) => {
                let found = lock(&self.conversation).update_status(&update.message_id, update.status);
                if found {
                    self.emit(InboxSignal::MessagesChanged);
                } else {
                    trace!(message_id = %update.message_id, "status update for unloaded message");
                }
                RouteOutcome::StatusUpdated(found)
            }
            PushEvent::NewNotification(notification) => {
                lock(&self.notifications).prepend(notification);
                self.emit(InboxSignal::NotificationsChanged);
                RouteOutcome::NotificationAdded
            }
            PushEvent::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unrecognized push event");
                RouteOutcome::Ignored
            }
        }
    }

    /// Stream callback that routes every event through this router.
    #[must_use]
    pub fn handler(&self) -> EventHandler {
        let router = self.clone();
        Arc::new(move |event: RawEvent| {
            router.route(&event);
        })
    }

    fn emit(&self, signal: InboxSignal) {
        // Nobody listening is not an error.
        let _ = self.signals.send(signal);
    }
}

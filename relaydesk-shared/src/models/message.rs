use std::fmt;

use serde::{Deserialize, Serialize};

use super::Timestamp;

const TEMPORARY_PREFIX: &str = "temp-";

/// Identifier of a chat message.
///
/// Server-issued identifiers are opaque. Locally created messages carry a
/// temporary identifier (`temp-<millis>-<seq>`) until the server confirms them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds a temporary identifier for an optimistic entry created at `at`.
    ///
    /// `seq` disambiguates sends issued within the same millisecond.
    #[must_use]
    pub fn temporary(at: Timestamp, seq: u64) -> Self {
        Self(format!("{TEMPORARY_PREFIX}{}-{seq}", at.timestamp_millis()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The customer on the other end of the conversation.
    User,
    /// The automated agent.
    Assistant,
    /// The human operator who took over the conversation.
    Owner,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Locally originated and awaiting server confirmation.
    Pending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

/// One entry of a conversation log.
///
/// History pages may omit `status`; such entries decode as [`DeliveryStatus::Sent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl Message {
    /// Creates the optimistic entry shown while an operator send is in flight.
    #[must_use]
    pub fn pending(id: MessageId, content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            role: MessageRole::Owner,
            content: content.into(),
            timestamp,
            status: DeliveryStatus::Pending,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub user_phone: String,
    pub message: String,
}

/// What the server returns for an accepted send. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendReceipt {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

//! Payloads carried in the `data` field of push-stream events.

use serde::{Deserialize, Serialize};

use super::{DeliveryStatus, MessageId, MessageRole, Timestamp};

/// `NEW_MESSAGE` payload.
///
/// The conversation is identified either by `contactId` or by `phoneNumber`
/// depending on which side of the bot produced the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// `MESSAGE_STATUS_UPDATE` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusUpdate {
    pub message_id: MessageId,
    pub status: DeliveryStatus,
}

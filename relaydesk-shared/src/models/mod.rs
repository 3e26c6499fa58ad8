pub mod appointment;
pub mod contact;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod message;
pub mod notification;
pub mod timestamp;

pub use appointment::{Appointment, AppointmentStatus, AppointmentUpdate};
pub use contact::{Contact, ToggleBotRequest};
pub use envelope::ApiEnvelope;
pub use errors::ErrorResponse;
pub use events::{IncomingMessage, MessageStatusUpdate};
pub use message::{DeliveryStatus, Message, MessageId, MessageRole, SendMessageRequest, SendReceipt};
pub use notification::{Notification, NotificationId, NotificationStatus};
pub use timestamp::Timestamp;

//! Real-time synchronization core of the RelayDesk console.
//!
//! A [`stream::StreamConnection`] keeps the server push channel alive, an
//! [`router::EventRouter`] decodes its events into the conversation and
//! notification stores, and the [`inbox::Inbox`] controller applies operator
//! intents optimistically and reconciles them with the
//! [`gateway::RequestGateway`] responses.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod gateway;
pub mod inbox;
pub mod reconcile;
pub mod router;
pub mod session;
pub mod store;
pub mod stream;

pub use error::{GatewayError, GatewayResult, RouteError, StreamError};
pub use gateway::{HttpGateway, RequestGateway};
pub use inbox::{Inbox, InboxSignal, SendOutcome};
pub use router::{EventRouter, PushEvent, RouteOutcome};
pub use session::{ConsoleSession, SessionContext};
pub use stream::{
    ConnectionState, EventHandler, HttpSseTransport, RawEvent, StreamConnection, StreamHandle,
};

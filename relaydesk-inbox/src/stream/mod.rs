//! # Push Stream
//!
//! Maintains one long-lived server-push connection per [`StreamHandle`] and
//! reconnects after a fixed delay whenever it fails.
//!
//! The connection is driven by a single task, so at most one transport handle
//! and at most one reconnect timer exist at any time, and never both at once.
//! The event handler can be swapped through [`StreamHandle::rebind`] without
//! touching the connection.

pub mod sse;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{FutureExt, Stream, StreamExt};
use metrics::counter;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::StreamError, session::SessionContext};

pub use transport::HttpSseTransport;

/// Fixed delay between a failure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One dispatched server-sent event: its type name and raw payload text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: String,
    pub data: String,
}

/// Events of one open connection; an `Err` item or the end of the stream ends it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, StreamError>> + Send>>;

/// Callback invoked for every event, in arrival order.
pub type EventHandler = Arc<dyn Fn(RawEvent) + Send + Sync>;

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: Url,
    pub credential: String,
}

/// Opens push connections. Implemented over HTTP by [`HttpSseTransport`].
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens a connection. Dropping the returned stream closes it.
    async fn connect(&self, request: ConnectRequest) -> Result<EventStream, StreamError>;
}

/// Lifecycle of a stream as seen through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// A failure happened; the reconnect timer is pending.
    Backoff,
    /// No credential was available; waiting for [`StreamHandle::reconnect`].
    AwaitingCredential,
    Closed,
}

/// Builder for a push stream bound to a transport and a session.
pub struct StreamConnection {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionContext>,
    reconnect_delay: Duration,
}

impl StreamConnection {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionContext>) -> Self {
        Self {
            transport,
            session,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Starts the connection task for `endpoint` and returns its handle.
    ///
    /// The device id is appended as `sessionId` on every attempt. Must be
    /// called from within a tokio runtime.
    pub fn open(self, endpoint: Url, handler: EventHandler) -> StreamHandle {
        let cancel = CancellationToken::new();
        let handler = Arc::new(RwLock::new(handler));
        let wake = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = ConnectionTask {
            transport: self.transport,
            session: self.session,
            endpoint,
            reconnect_delay: self.reconnect_delay,
            cancel: cancel.clone(),
            handler: Arc::clone(&handler),
            wake: Arc::clone(&wake),
            state: state_tx,
        };
        tokio::spawn(task.run());

        StreamHandle {
            inner: Arc::new(HandleInner {
                cancel,
                handler,
                wake,
                state: state_rx,
            }),
        }
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("transport", &self.transport)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}

/// Controls a running push stream. Clones share the same stream; dropping the
/// last clone closes it.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    cancel: CancellationToken,
    handler: Arc<RwLock<EventHandler>>,
    wake: Arc<Notify>,
    state: watch::Receiver<ConnectionState>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for HandleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleInner")
            .field("closed", &self.cancel.is_cancelled())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl StreamHandle {
    /// Closes the connection and cancels any pending reconnect. Idempotent.
    pub fn close(&self) {
        if !self.inner.cancel.is_cancelled() {
            debug!("closing push stream");
        }
        self.inner.cancel.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Routes subsequent events to `handler`. The connection is not touched.
    pub fn rebind(&self, handler: EventHandler) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Abandons the current connection or pending timer and connects again now.
    ///
    /// This is also how a stream parked without a credential is resumed.
    /// Calls made before the next attempt starts are folded into it; a call
    /// made while that attempt is connecting replaces it once more.
    pub fn reconnect(&self) {
        self.inner.wake.notify_one();
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver for state transitions, e.g. to wait until the stream is connected.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }
}

struct ConnectionTask {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionContext>,
    endpoint: Url,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    handler: Arc<RwLock<EventHandler>>,
    wake: Arc<Notify>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionTask {
    async fn run(self) {
        'session: loop {
            // This attempt satisfies any reconnect requested before it.
            let _ = self.wake.notified().now_or_never();

            let Some(credential) = self.session.credential() else {
                info!(endpoint = %self.endpoint, "no credential available, push stream idle");
                self.state.send_replace(ConnectionState::AwaitingCredential);
                tokio::select! {
                    () = self.cancel.cancelled() => break 'session,
                    () = self.wake.notified() => continue 'session,
                }
            };

            self.state.send_replace(ConnectionState::Connecting);
            let request = ConnectRequest {
                url: self.stream_url(),
                credential,
            };
            debug!(endpoint = %self.endpoint, "connecting push stream");
            counter!("relaydesk_stream_connects_total").increment(1);

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break 'session,
                result = self.transport.connect(request) => result,
            };

            let failure = match connected {
                Ok(mut events) => {
                    info!(endpoint = %self.endpoint, "push stream connected");
                    self.state.send_replace(ConnectionState::Connected);
                    loop {
                        tokio::select! {
                            () = self.cancel.cancelled() => break 'session,
                            () = self.wake.notified() => {
                                info!("reconnect requested, replacing push stream");
                                continue 'session;
                            }
                            next = events.next() => match next {
                                Some(Ok(event)) => self.dispatch(event),
                                Some(Err(err)) => break err,
                                None => break StreamError::Closed,
                            },
                        }
                    }
                }
                Err(err) => err,
            };

            // The failed connection has been dropped by now.
            counter!("relaydesk_stream_failures_total").increment(1);
            warn!(
                error = %failure,
                delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                "push stream failed, reconnect scheduled"
            );
            self.state.send_replace(ConnectionState::Backoff);

            tokio::select! {
                () = self.cancel.cancelled() => break 'session,
                () = tokio::time::sleep(self.reconnect_delay) => {}
                () = self.wake.notified() => {}
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        debug!(endpoint = %self.endpoint, "push stream closed");
    }

    fn stream_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("sessionId", &self.session.device_id());
        url
    }

    fn dispatch(&self, event: RawEvent) {
        let handler = Arc::clone(&*self.handler.read().unwrap_or_else(PoisonError::into_inner));
        handler(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConsoleSession;
    use fake::FakeTransport;
    use tokio::{sync::mpsc, time::timeout};

    fn endpoint() -> Url {
        Url::parse("http://localhost:3000/api/events").unwrap()
    }

    fn signed_in() -> Arc<ConsoleSession> {
        Arc::new(ConsoleSession::new("device_1_abc", Some("token".into())))
    }

    fn ignore() -> EventHandler {
        Arc::new(|_| {})
    }

    fn recorder() -> (EventHandler, mpsc::UnboundedReceiver<RawEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (handler, rx)
    }

    fn event(kind: &str) -> RawEvent {
        RawEvent {
            kind: kind.into(),
            data: "{}".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_schedules_exactly_one_retry_after_fixed_delay() {
        let (transport, mut attempts) = FakeTransport::new();
        let handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());

        let first = attempts.recv().await.unwrap();
        first
            .feed
            .send(Err(StreamError::Body("connection reset".into())))
            .unwrap();

        let second = attempts.recv().await.unwrap();
        assert_eq!(second.at - first.at, DEFAULT_RECONNECT_DELAY);
        assert!(
            timeout(Duration::from_secs(60), attempts.recv())
                .await
                .is_err(),
            "a healthy connection must not be replaced"
        );
        assert_eq!(transport.peak(), 1);
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn server_ending_the_stream_counts_as_failure() {
        let (transport, mut attempts) = FakeTransport::new();
        let _handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());

        let first = attempts.recv().await.unwrap();
        drop(first.feed);

        let second = attempts.recv().await.unwrap();
        assert_eq!(second.at - first.at, DEFAULT_RECONNECT_DELAY);
        assert_eq!(transport.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_url_carries_device_id() {
        let (transport, mut attempts) = FakeTransport::new();
        let _handle = StreamConnection::new(transport, signed_in()).open(endpoint(), ignore());

        let attempt = attempts.recv().await.unwrap();
        assert_eq!(attempt.request.credential, "token");
        assert_eq!(
            attempt.request.url.as_str(),
            "http://localhost:3000/api/events?sessionId=device_1_abc"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_waits_for_reconnect() {
        let (transport, mut attempts) = FakeTransport::new();
        let session = Arc::new(ConsoleSession::new("device_1_abc", None));
        let handle = StreamConnection::new(transport, session.clone()).open(endpoint(), ignore());

        assert!(
            timeout(Duration::from_secs(30), attempts.recv())
                .await
                .is_err()
        );
        assert_eq!(handle.state(), ConnectionState::AwaitingCredential);

        session.set_credential(Some("fresh".into()));
        handle.reconnect();

        let attempt = attempts.recv().await.unwrap();
        assert_eq!(attempt.request.credential, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn credential_lost_before_retry_parks_the_stream() {
        let (transport, mut attempts) = FakeTransport::new();
        let session = signed_in();
        let handle = StreamConnection::new(transport, session.clone()).open(endpoint(), ignore());

        let first = attempts.recv().await.unwrap();
        session.set_credential(None);
        first
            .feed
            .send(Err(StreamError::Body("reset".into())))
            .unwrap();

        assert!(
            timeout(Duration::from_secs(60), attempts.recv())
                .await
                .is_err()
        );
        assert_eq!(handle.state(), ConnectionState::AwaitingCredential);
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_backoff_cancels_retry() {
        let (transport, mut attempts) = FakeTransport::new();
        let handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());
        let mut state = handle.subscribe_state();

        let first = attempts.recv().await.unwrap();
        first
            .feed
            .send(Err(StreamError::Body("reset".into())))
            .unwrap();
        state
            .wait_for(|state| *state == ConnectionState::Backoff)
            .await
            .unwrap();

        handle.close();
        handle.close();
        assert!(handle.is_closed());

        assert!(
            timeout(Duration::from_secs(60), attempts.recv())
                .await
                .is_err()
        );
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replaces_live_connection_immediately() {
        let (transport, mut attempts) = FakeTransport::new();
        let handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());

        let first = attempts.recv().await.unwrap();
        let mut state = handle.subscribe_state();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();

        handle.reconnect();
        let second = attempts.recv().await.unwrap();
        assert_eq!(second.at, first.at);
        assert_eq!(transport.peak(), 1);
        assert!(first.feed.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reconnect_requests_collapse_into_one_attempt() {
        let (transport, mut attempts) = FakeTransport::new();
        let handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());
        let mut state = handle.subscribe_state();

        let _first = attempts.recv().await.unwrap();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();

        handle.reconnect();
        handle.reconnect();

        let _second = attempts.recv().await.unwrap();
        assert!(
            timeout(Duration::from_secs(60), attempts.recv())
                .await
                .is_err(),
            "the second request must not replace the new connection"
        );
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(transport.peak(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rebind_routes_events_without_reconnecting() {
        let (transport, mut attempts) = FakeTransport::new();
        let (first_handler, mut first_events) = recorder();
        let handle = StreamConnection::new(transport, signed_in()).open(endpoint(), first_handler);

        let attempt = attempts.recv().await.unwrap();
        attempt.feed.send(Ok(event("NEW_MESSAGE"))).unwrap();
        assert_eq!(first_events.recv().await.unwrap().kind, "NEW_MESSAGE");

        let (second_handler, mut second_events) = recorder();
        handle.rebind(second_handler);
        attempt.feed.send(Ok(event("NEW_NOTIFICATION"))).unwrap();

        assert_eq!(second_events.recv().await.unwrap().kind, "NEW_NOTIFICATION");
        assert!(first_events.try_recv().is_err());
        assert!(
            timeout(Duration::from_secs(60), attempts.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_closes_stream() {
        let (transport, mut attempts) = FakeTransport::new();
        let handle = StreamConnection::new(transport.clone(), signed_in()).open(endpoint(), ignore());
        let mut state = handle.subscribe_state();

        let attempt = attempts.recv().await.unwrap();
        let clone = handle.clone();
        drop(handle);
        assert!(!clone.is_closed());
        drop(clone);

        state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await
            .unwrap();
        assert!(attempt.feed.is_closed());
        assert_eq!(transport.live(), 0);
    }
}

//! Scriptable in-memory transport for exercising the connection loop.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use futures_util::stream;
use tokio::{sync::mpsc, time::Instant};

use super::{ConnectRequest, EventStream, RawEvent, Transport};
use crate::error::StreamError;

/// One connection attempt observed by the fake. Sending on `feed` delivers
/// items on that connection; dropping it ends the stream.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub at: Instant,
    pub request: ConnectRequest,
    pub feed: mpsc::UnboundedSender<Result<RawEvent, StreamError>>,
}

#[derive(Debug)]
pub(crate) struct FakeTransport {
    attempts: mpsc::UnboundedSender<Attempt>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Attempt>) {
        let (attempts, rx) = mpsc::unbounded_channel();
        let transport = Self {
            attempts,
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        };
        (Arc::new(transport), rx)
    }

    /// Connections currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most connections that were ever open at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<EventStream, StreamError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));

        let (feed, items) = mpsc::unbounded_channel();
        let _ = self.attempts.send(Attempt {
            at: Instant::now(),
            request,
            feed,
        });

        Ok(Box::pin(stream::unfold(
            (items, guard),
            |(mut items, guard)| async move {
                let item = items.recv().await?;
                Some((item, (items, guard)))
            },
        )))
    }
}

//! reqwest-backed server-sent-events transport.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::{
    Client, Response,
    header::{ACCEPT, CACHE_CONTROL},
};
use shared::config::CredentialPlacement;
use tracing::trace;

use super::{ConnectRequest, EventStream, Transport, sse::SseDecoder};
use crate::error::StreamError;

/// Opens `GET` event streams, carrying the credential as a bearer header or a
/// `token` query parameter.
#[derive(Debug, Clone)]
pub struct HttpSseTransport {
    client: Client,
    placement: CredentialPlacement,
}

impl HttpSseTransport {
    /// Builds a transport with its own HTTP client.
    ///
    /// # Errors
    /// Returns an error if the underlying client cannot be initialised.
    pub fn new(placement: CredentialPlacement) -> Result<Self, StreamError> {
        let client = Client::builder()
            .user_agent("relaydesk-inbox")
            .build()
            .map_err(|err| StreamError::Connect(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, placement))
    }

    #[must_use]
    pub fn with_client(client: Client, placement: CredentialPlacement) -> Self {
        Self { client, placement }
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<EventStream, StreamError> {
        let mut url = request.url;
        if self.placement == CredentialPlacement::Query {
            url.query_pairs_mut()
                .append_pair("token", &request.credential);
        }

        let mut builder = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if self.placement == CredentialPlacement::Header {
            builder = builder.bearer_auth(&request.credential);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| StreamError::Connect(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
            });
        }

        Ok(decode_events(response))
    }
}

fn decode_events(response: Response) -> EventStream {
    let body = Box::pin(response.bytes_stream());
    let state = (body, SseDecoder::default(), VecDeque::new(), false);

    Box::pin(stream::unfold(
        state,
        |(mut body, mut decoder, mut ready, mut done)| async move {
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (body, decoder, ready, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => {
                        trace!(bytes = chunk.len(), "stream chunk");
                        ready.extend(decoder.feed(&chunk));
                    }
                    Some(Err(err)) => {
                        done = true;
                        return Some((
                            Err(StreamError::Body(err.to_string())),
                            (body, decoder, ready, done),
                        ));
                    }
                    None => {
                        done = true;
                        ready.extend(decoder.finish());
                    }
                }
            }
        },
    ))
}

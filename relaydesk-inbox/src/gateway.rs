//! # Request Gateway
//!
//! The REST surface the inbox consumes. The core only depends on the
//! [`RequestGateway`] trait; [`HttpGateway`] is the reqwest implementation
//! against the dashboard API, whose responses are wrapped in `{ "data": ... }`.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    config::api_url,
    models::{
        ApiEnvelope, Appointment, AppointmentStatus, AppointmentUpdate, Contact, ErrorResponse,
        Message, Notification, NotificationId, SendMessageRequest, SendReceipt, Timestamp,
        ToggleBotRequest,
    },
};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    error::{GatewayError, GatewayResult},
    session::SessionContext,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestGateway: Send + Sync {
    /// Up to `limit` messages of a conversation, optionally older than `before`.
    async fn fetch_history(
        &self,
        contact_id: &str,
        limit: usize,
        before: Option<Timestamp>,
    ) -> GatewayResult<Vec<Message>>;

    async fn send_message(&self, phone_number: &str, content: &str) -> GatewayResult<SendReceipt>;

    async fn fetch_notifications(&self) -> GatewayResult<Vec<Notification>>;

    async fn mark_notification_viewed(&self, id: &NotificationId) -> GatewayResult<()>;

    async fn delete_notification(&self, id: &NotificationId) -> GatewayResult<()>;

    async fn fetch_contacts(&self) -> GatewayResult<Vec<Contact>>;

    async fn toggle_bot(&self, contact_id: &str, active: bool) -> GatewayResult<Contact>;

    async fn fetch_appointments(
        &self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> GatewayResult<Vec<Appointment>>;

    async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> GatewayResult<()>;
}

/// Dashboard API client. The bearer credential is read from the session on
/// every request.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    session: Arc<dyn SessionContext>,
}

impl fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url.as_str())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(base_url: Url, session: Arc<dyn SessionContext>) -> GatewayResult<Self> {
        let client = Client::builder().user_agent("relaydesk-inbox").build()?;
        Ok(Self::with_client(client, base_url, session))
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: Url, session: Arc<dyn SessionContext>) -> Self {
        Self {
            client,
            base_url,
            session,
        }
    }

    fn url(&self, path: &str) -> GatewayResult<Url> {
        Ok(api_url(&self.base_url, path)?)
    }

    async fn execute(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let request = match self.session.credential() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match ErrorResponse::from_body(&body) {
            Some(error) => error.to_string(),
            None if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            None => body,
        };
        Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn list<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<Vec<T>> {
        let envelope: ApiEnvelope<Vec<T>> = self.execute(request).await?.json().await?;
        Ok(envelope.into_list())
    }

    async fn single<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> GatewayResult<T> {
        let envelope: ApiEnvelope<T> = self.execute(request).await?.json().await?;
        envelope.into_data().ok_or_else(|| GatewayError::MissingData {
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl RequestGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        contact_id: &str,
        limit: usize,
        before: Option<Timestamp>,
    ) -> GatewayResult<Vec<Message>> {
        let url = self.url(&format!("dashboard/contacts/{contact_id}/messages"))?;
        let mut request = self
            .client
            .get(url)
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before.to_cursor())]);
        }
        let page: Vec<Message> = self.list(request).await?;
        debug!(count = page.len(), "fetched history page");
        Ok(page)
    }

    #[instrument(skip(self, content))]
    async fn send_message(&self, phone_number: &str, content: &str) -> GatewayResult<SendReceipt> {
        let url = self.url("chat")?;
        let body = SendMessageRequest {
            user_phone: phone_number.to_string(),
            message: content.to_string(),
        };
        let envelope: ApiEnvelope<SendReceipt> = self
            .execute(self.client.post(url).json(&body))
            .await?
            .json()
            .await?;
        Ok(envelope.into_data().unwrap_or_default())
    }

    async fn fetch_notifications(&self) -> GatewayResult<Vec<Notification>> {
        let url = self.url("notifications")?;
        self.list(self.client.get(url)).await
    }

    async fn mark_notification_viewed(&self, id: &NotificationId) -> GatewayResult<()> {
        let url = self.url(&format!("notifications/{id}/viewed"))?;
        self.execute(self.client.patch(url)).await?;
        Ok(())
    }

    async fn delete_notification(&self, id: &NotificationId) -> GatewayResult<()> {
        let url = self.url(&format!("notifications/{id}"))?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn fetch_contacts(&self) -> GatewayResult<Vec<Contact>> {
        let url = self.url("dashboard/contacts")?;
        self.list(self.client.get(url)).await
    }

    async fn toggle_bot(&self, contact_id: &str, active: bool) -> GatewayResult<Contact> {
        let endpoint = format!("dashboard/contacts/{contact_id}/toggle-bot");
        let url = self.url(&endpoint)?;
        let body = ToggleBotRequest {
            is_bot_active: active,
        };
        self.single(self.client.post(url).json(&body), &endpoint)
            .await
    }

    async fn fetch_appointments(
        &self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> GatewayResult<Vec<Appointment>> {
        let url = self.url("dashboard/appointments")?;
        let mut request = self.client.get(url);
        if let Some(start) = start {
            request = request.query(&[("start", start.to_cursor())]);
        }
        if let Some(end) = end {
            request = request.query(&[("end", end.to_cursor())]);
        }
        self.list(request).await
    }

    async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> GatewayResult<()> {
        let url = self.url(&format!("dashboard/appointments/{appointment_id}"))?;
        self.execute(self.client.put(url).json(&AppointmentUpdate { status }))
            .await?;
        Ok(())
    }
}

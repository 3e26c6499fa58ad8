pub mod appointments;
pub mod completion;
pub mod config;
pub mod contacts;
pub mod follow;
pub mod notifications;

use std::sync::Arc;

use anyhow::{Context, Result};
use inbox::{ConsoleSession, HttpGateway, Inbox, InboxSignal};
use shared::config::Config;
use tokio::sync::mpsc;

/// Everything a command needs to talk to the dashboard.
pub struct Console {
    pub session: Arc<ConsoleSession>,
    pub inbox: Inbox,
    pub signals: mpsc::UnboundedReceiver<InboxSignal>,
}

/// Builds the session, the HTTP gateway and the inbox from `config`.
pub fn connect(config: &Config) -> Result<Console> {
    let device_path = config.resolved_device_id_path();
    let session = Arc::new(
        ConsoleSession::persistent(&device_path, config.auth.token.clone()).with_context(|| {
            format!("failed to prepare device id at {}", device_path.display())
        })?,
    );
    let gateway = HttpGateway::new(config.api_base_url.clone(), session.clone())
        .context("failed to build HTTP client")?;
    let (inbox, signals) = Inbox::new(Arc::new(gateway), config.history.page_size);

    Ok(Console {
        session,
        inbox,
        signals,
    })
}

/// Short local rendering of an API timestamp.
pub fn format_time(at: shared::models::Timestamp) -> String {
    at.0.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use shared::{
    config::Config,
    models::{Notification, NotificationId},
};

use super::{connect, format_time};

#[derive(Args, Debug)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub action: Option<NotificationAction>,
}

#[derive(Subcommand, Debug)]
pub enum NotificationAction {
    /// List notifications, newest first (the default)
    List,
    /// Mark a notification as viewed
    View {
        /// Notification identifier
        id: String,
    },
    /// Delete a notification
    Delete {
        /// Notification identifier
        id: String,
    },
}

pub async fn run(config: &Config, args: NotificationsArgs) -> Result<()> {
    let console = connect(config)?;
    let inbox = &console.inbox;
    if !inbox.fetch_notifications().await {
        bail!("failed to fetch notifications");
    }

    match args.action.unwrap_or(NotificationAction::List) {
        NotificationAction::List => {
            let notifications = inbox.notifications();
            println!("{} unread of {}", inbox.unread_count(), notifications.len());
            for notification in &notifications {
                println!("{}", render_notification(notification));
            }
        }
        NotificationAction::View { id } => {
            let id = NotificationId::new(id);
            inbox.mark_notification_viewed(&id).await;
            println!("{} unread", inbox.unread_count());
        }
        NotificationAction::Delete { id } => {
            let id = NotificationId::new(id);
            inbox.delete_notification(&id).await;
            // A rejected delete resyncs the log, which brings the entry back.
            if inbox.notifications().iter().any(|n| n.id == id) {
                bail!("delete rejected for notification {id}");
            }
            println!("Deleted {id}; {} unread", inbox.unread_count());
        }
    }
    Ok(())
}

fn render_notification(notification: &Notification) -> String {
    let marker = if notification.is_unread() { "*" } else { " " };
    format!(
        "{marker} {}  {}  {}: {}",
        notification.id,
        format_time(notification.created_at),
        notification.title,
        notification.message
    )
}

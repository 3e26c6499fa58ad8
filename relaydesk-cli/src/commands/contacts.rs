use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use shared::{config::Config, models::Contact};

use super::{connect, format_time};

#[derive(Args, Debug)]
pub struct ContactsArgs {
    #[command(subcommand)]
    pub action: Option<ContactAction>,
}

#[derive(Subcommand, Debug)]
pub enum ContactAction {
    /// List every contact (the default)
    List,
    /// Let the bot answer this contact again
    BotOn {
        /// Contact identifier
        contact_id: String,
    },
    /// Take the conversation over from the bot
    BotOff {
        /// Contact identifier
        contact_id: String,
    },
}

pub async fn run(config: &Config, args: ContactsArgs) -> Result<()> {
    let console = connect(config)?;
    match args.action.unwrap_or(ContactAction::List) {
        ContactAction::List => {
            let contacts = console
                .inbox
                .fetch_contacts()
                .await
                .context("failed to fetch contacts")?;
            if contacts.is_empty() {
                println!("No contacts yet.");
            }
            for contact in &contacts {
                println!("{}", render_contact(contact));
            }
        }
        ContactAction::BotOn { contact_id } => toggle(&console.inbox, &contact_id, true).await?,
        ContactAction::BotOff { contact_id } => toggle(&console.inbox, &contact_id, false).await?,
    }
    Ok(())
}

async fn toggle(inbox: &inbox::Inbox, contact_id: &str, active: bool) -> Result<()> {
    let contact = inbox
        .toggle_bot(contact_id, active)
        .await
        .with_context(|| format!("failed to toggle bot for {contact_id}"))?;
    let state = if contact.is_bot_active {
        "bot active"
    } else {
        "operator in control"
    };
    println!("{}: {state}", contact.display_name());
    Ok(())
}

fn render_contact(contact: &Contact) -> String {
    let mut line = format!("{}  {}  {}", contact.id, contact.display_name(), contact.phone_number);
    if contact.is_bot_active {
        line.push_str("  [bot]");
    }
    if let Some(at) = contact.last_interaction {
        line.push_str(&format!("  last {}", format_time(at)));
    }
    line
}

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result, anyhow};
use clap::Args;
use inbox::{
    ConnectionState, HttpSseTransport, Inbox, InboxSignal, SendOutcome, StreamConnection,
    store::ViewEffect,
};
use shared::{
    config::Config,
    models::{DeliveryStatus, Message, MessageId, MessageRole},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::{connect, format_time};

#[derive(Args, Debug)]
#[command(about = "Open a conversation and follow it live")]
pub struct FollowArgs {
    /// Contact identifier or phone number of the conversation
    #[arg()]
    pub contact: String,

    /// Print the newest page and exit without opening the push stream
    #[arg(long)]
    pub history_only: bool,
}

/// Tracks what has been printed so repeated change signals only print news.
#[derive(Default)]
struct Transcript {
    seen: HashMap<MessageId, DeliveryStatus>,
}

impl Transcript {
    fn render(&mut self, messages: &[Message]) {
        // Temporary ids disappear once the server id replaces them.
        self.seen
            .retain(|id, _| messages.iter().any(|message| &message.id == id));

        for message in messages {
            match self.seen.get(&message.id) {
                None => println!("{}", render_message(message)),
                Some(status) if *status != message.status => {
                    println!("    {} is now {}", message.id, message.status.as_str());
                }
                Some(_) => {}
            }
            self.seen.insert(message.id.clone(), message.status);
        }
    }
}

pub async fn run(config: &Config, args: FollowArgs) -> Result<()> {
    let mut console = connect(config)?;
    let inbox = console.inbox.clone();

    let contacts = inbox
        .fetch_contacts()
        .await
        .context("failed to fetch contacts")?;
    let contact = contacts
        .into_iter()
        .find(|c| c.id == args.contact || c.phone_number == args.contact)
        .ok_or_else(|| anyhow!("no contact matches '{}'", args.contact))?;

    println!(
        "Conversation with {} ({}){}",
        contact.display_name(),
        contact.phone_number,
        if contact.is_bot_active { " [bot active]" } else { "" }
    );
    inbox
        .open_conversation(contact)
        .await
        .context("failed to load conversation")?;

    let mut transcript = Transcript::default();
    transcript.render(&inbox.messages());
    if args.history_only {
        return Ok(());
    }

    let transport = HttpSseTransport::new(config.stream.credential_placement)?;
    let endpoint = config.endpoint(&config.stream.path)?;
    let stream = StreamConnection::new(Arc::new(transport), console.session.clone())
        .with_reconnect_delay(config.stream.reconnect_delay())
        .open(endpoint, inbox.router().handler());
    let mut states = stream.subscribe_state();

    println!("Type a message to send. Commands: /older, /bot on, /bot off, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&inbox, line.trim()).await {
                    break;
                }
            }
            Some(signal) = console.signals.recv() => match signal {
                InboxSignal::MessagesChanged => transcript.render(&inbox.messages()),
                InboxSignal::View(ViewEffect::PreserveAnchor(anchor)) => {
                    println!("-- {} older messages loaded above {} --", anchor.prepended, anchor.anchor_id);
                }
                other => debug!(?other, "signal"),
            },
            Ok(()) = states.changed() => {
                let state = *states.borrow_and_update();
                match state {
                    ConnectionState::Connected => eprintln!("[stream] connected"),
                    ConnectionState::Backoff => eprintln!("[stream] disconnected, retrying"),
                    ConnectionState::AwaitingCredential => {
                        eprintln!("[stream] no credential; set RELAYDESK_TOKEN and restart");
                    }
                    ConnectionState::Connecting | ConnectionState::Closed => {}
                }
            }
        }
    }

    stream.close();
    Ok(())
}

/// Applies one line of operator input. Returns `false` to stop following.
async fn handle_input(inbox: &Inbox, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/older" => {
            if !inbox.load_older().await {
                println!("-- nothing older to load --");
            }
        }
        "/bot on" | "/bot off" => {
            let Some(contact) = inbox.open_contact() else {
                return true;
            };
            let active = line == "/bot on";
            match inbox.toggle_bot(&contact.id, active).await {
                Ok(contact) if contact.is_bot_active => println!("-- bot active --"),
                Ok(_) => println!("-- operator in control --"),
                Err(err) => eprintln!("failed to toggle bot: {err}"),
            }
        }
        content => {
            // Sends run in the background so pushes keep rendering meanwhile.
            let inbox = inbox.clone();
            let content = content.to_string();
            tokio::spawn(async move {
                match inbox.send(&content).await {
                    Ok(SendOutcome::Delivered { .. }) => {}
                    Ok(SendOutcome::Failed { temp_id }) => eprintln!("send {temp_id} failed"),
                    Err(rejected) => eprintln!("not sent: {rejected}"),
                }
            });
        }
    }
    true
}

fn render_message(message: &Message) -> String {
    let who = match message.role {
        MessageRole::User => "customer",
        MessageRole::Assistant => "bot",
        MessageRole::Owner => "you",
    };
    let status = match message.status {
        DeliveryStatus::Pending => " (sending)",
        DeliveryStatus::Failed => " (failed)",
        _ => "",
    };
    format!(
        "[{}] {who:>8}: {}{status}",
        format_time(message.timestamp),
        message.content
    )
}

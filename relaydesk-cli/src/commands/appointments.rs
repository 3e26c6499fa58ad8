use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use shared::{
    config::Config,
    models::{Appointment, AppointmentStatus, Timestamp},
};

use super::{connect, format_time};

#[derive(Args, Debug)]
pub struct AppointmentsArgs {
    #[command(subcommand)]
    pub action: Option<AppointmentAction>,
}

#[derive(Subcommand, Debug)]
pub enum AppointmentAction {
    /// List appointments, optionally within a window
    List {
        /// Earliest start (RFC 3339, e.g. 2024-05-01T00:00:00Z)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Latest start (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Change the status of an appointment
    SetStatus {
        /// Appointment identifier
        id: String,
        /// New status
        #[arg(value_parser = parse_status)]
        status: AppointmentStatus,
    },
}

pub async fn run(config: &Config, args: AppointmentsArgs) -> Result<()> {
    let console = connect(config)?;
    let action = args.action.unwrap_or(AppointmentAction::List {
        start: None,
        end: None,
    });

    match action {
        AppointmentAction::List { start, end } => {
            let appointments = console
                .inbox
                .fetch_appointments(start.map(Timestamp), end.map(Timestamp))
                .await
                .context("failed to fetch appointments")?;
            if appointments.is_empty() {
                println!("No appointments.");
            }
            for appointment in &appointments {
                println!("{}", render_appointment(appointment));
            }
        }
        AppointmentAction::SetStatus { id, status } => {
            console
                .inbox
                .update_appointment_status(&id, status)
                .await
                .with_context(|| format!("failed to update appointment {id}"))?;
            println!("Appointment {id} is now {}", status.as_str());
        }
    }
    Ok(())
}

fn parse_status(value: &str) -> Result<AppointmentStatus, String> {
    AppointmentStatus::try_from(value.to_ascii_lowercase().as_str()).map_err(|_| {
        "expected one of: pending, confirmed, cancelled, completed".to_string()
    })
}

fn render_appointment(appointment: &Appointment) -> String {
    let who = appointment
        .contact
        .as_ref()
        .map_or("unknown contact", |contact| contact.display_name());
    let mut line = format!(
        "{}  {}  {:<9}  {who}",
        appointment.id,
        format_time(appointment.date_time),
        appointment.status.as_str()
    );
    if let Some(service) = &appointment.service {
        line.push_str(&format!("  ({service})"));
    }
    line
}

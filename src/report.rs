//! Reporting: uptime queries, fleet rollups and the daily mail job

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, error, info, instrument};

use crate::mail::{Mailer, OutgoingMail};
use crate::observation::{FleetHealth, ObservationResult, ObservationStore};

/// Deadline for report generation queries.
const REPORT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ReportService {
    observations: ObservationStore,
    mailer: Arc<dyn Mailer>,
}

impl ReportService {
    pub fn new(observations: ObservationStore, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            observations,
            mailer,
        }
    }

    /// Weighted uptime percentage for one server over `[start, end)`.
    pub async fn uptime_percentage(
        &self,
        server_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationResult<f64> {
        self.observations
            .uptime_percentage(server_id, start, end)
            .await
    }

    pub async fn fleet_health(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationResult<FleetHealth> {
        self.observations.fleet_health(start, end).await
    }

    /// Aggregate the window and hand the rendered summary to the mail
    /// collaborator.
    #[instrument(skip(self))]
    pub async fn send_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        recipient: &str,
    ) -> anyhow::Result<()> {
        let health = tokio::time::timeout(REPORT_DEADLINE, self.fleet_health(start, end))
            .await
            .map_err(|_| anyhow::anyhow!("report generation exceeded deadline"))??;

        let subject = format!(
            "Servers Status Report From {} To {}",
            start.format("%Y-%m-%d %H:%M:%S UTC"),
            (end - chrono::Duration::seconds(1)).format("%Y-%m-%d %H:%M:%S UTC")
        );

        self.mailer
            .send(OutgoingMail {
                to: vec![recipient.to_string()],
                subject,
                html_body: render_html_body(&health),
                text_body: render_text_body(&health),
            })
            .await?;

        info!("report sent to {recipient}");
        Ok(())
    }
}

fn render_text_body(health: &FleetHealth) -> String {
    format!(
        "--- SUMMARY ---\n\
         Total Servers: {}\n\
         Healthy: {}\n\
         Unhealthy: {}\n\
         Inactive: {}\n\
         Configuration Error: {}\n\
         Network Error: {}\n\n\
         Average Uptime Across All Servers: {:.2}%",
        health.total_servers,
        health.healthy,
        health.unhealthy,
        health.inactive,
        health.configuration_error,
        health.network_error,
        health.average_uptime_percentage,
    )
}

fn render_html_body(health: &FleetHealth) -> String {
    let row = |label: &str, value: String| {
        format!(
            "<tr>\
             <td style=\"border: 1px solid #dddddd; text-align: left; padding: 8px; background-color: #f2f2f2;\">{label}</td>\
             <td style=\"border: 1px solid #dddddd; text-align: left; padding: 8px;\">{value}</td>\
             </tr>"
        )
    };

    format!(
        "<body><table style=\"width:100%; border-collapse: collapse;\">{}{}{}{}{}{}{}</table></body>",
        row("Total Servers:", health.total_servers.to_string()),
        row("Healthy Servers:", health.healthy.to_string()),
        row("Unhealthy Servers:", health.unhealthy.to_string()),
        row("Inactive Servers:", health.inactive.to_string()),
        row(
            "Configuration Error Servers:",
            health.configuration_error.to_string()
        ),
        row("Network Error Servers:", health.network_error.to_string()),
        row(
            "Average Uptime Percentage:",
            format!("{:.2}%", health.average_uptime_percentage)
        ),
    )
}

/// Spawn the daily report task: at each local midnight, report on the
/// trailing 24 hours to the admin recipient.
pub fn spawn_daily_report(service: ReportService, recipient: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let sleep_for = until_next_local_midnight();
            debug!(
                "next daily report in {}s",
                sleep_for.as_secs()
            );
            tokio::time::sleep(sleep_for).await;

            let end = Utc::now();
            let start = end - chrono::Duration::hours(24);
            if let Err(e) = service.send_report(start, end, &recipient).await {
                error!("daily report failed: {e}");
            }
        }
    })
}

fn until_next_local_midnight() -> Duration {
    let now = Local::now();
    let tomorrow = (now + chrono::Duration::days(1)).date_naive();
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    // earliest() only fails when midnight falls into a DST gap; a
    // plain 24h hop is close enough then.
    let next = midnight
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| now + chrono::Duration::days(1));
    let delta = next.signed_duration_since(now);
    delta.to_std().unwrap_or(Duration::from_secs(1))
}

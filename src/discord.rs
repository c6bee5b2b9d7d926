//! Run notifications through a Discord webhook.

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::pipeline::RunOutput;

const USERNAME: &str = "roadscout";

const COLOR_OK: u32 = 0x00FF00;
const COLOR_WARN: u32 = 0xFFA500;
const COLOR_FAIL: u32 = 0xFF0000;

#[derive(Serialize, Debug)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Serialize, Debug)]
struct DiscordPayload {
    username: String,
    embeds: Vec<DiscordEmbed>,
}

fn payload(title: &str, description: &str, color: u32) -> DiscordPayload {
    DiscordPayload {
        username: USERNAME.to_string(),
        embeds: vec![DiscordEmbed {
            title: title.to_string(),
            description: description.to_string(),
            color,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }],
    }
}

/// Summary line for a finished run, plus whether any site logged an error
fn describe_run(output: &RunOutput) -> (String, bool) {
    let with_errors = output
        .logs
        .iter()
        .filter(|log| log.errors().next().is_some())
        .count();
    let description = format!(
        "Evaluated **{}** sites, {} with errors. {} provider calls, {} cached routes.",
        output.records.len(),
        with_errors,
        output.call_count,
        output.cache.entries
    );
    (description, with_errors > 0)
}

pub struct DiscordWebhook {
    url: String,
    client: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    async fn send(&self, payload: &DiscordPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            error!("Failed to send Discord notification: {}", error_text);
            anyhow::bail!("Discord notification failed: {}", error_text);
        }

        if let Some(embed) = payload.embeds.first() {
            info!("Sent Discord notification: {}", embed.title);
        }
        Ok(())
    }

    pub async fn send_notification(&self, title: &str, description: &str, success: bool) -> Result<()> {
        let color = if success { COLOR_OK } else { COLOR_FAIL };
        self.send(&payload(title, description, color)).await
    }

    pub async fn run_started(&self, label: &str, sites: usize) -> Result<()> {
        self.send_notification(
            "Evaluation Started",
            &format!("Evaluating **{}** sites from **{}**", sites, label),
            true,
        )
        .await
    }

    /// Completion notice; amber when any site logged an error
    pub async fn run_finished(&self, output: &RunOutput) -> Result<()> {
        let (description, had_errors) = describe_run(output);
        let color = if had_errors { COLOR_WARN } else { COLOR_OK };
        self.send(&payload("Evaluation Complete", &description, color))
            .await
    }

    pub async fn run_failed(&self, reason: &str) -> Result<()> {
        self.send_notification("Evaluation Failed", reason, false).await
    }
}

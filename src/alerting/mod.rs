//! Alert notifications for alert-worthy verdicts
//!
//! Verdicts are queued on a channel and sent by [`AlertDispatcher::run`]
//! to Slack, Discord and any number of generic webhooks.

use crate::config::{AlertConfig, DiscordConfig, SlackConfig, WebhookConfig};
use crate::models::{AnomalyVerdict, VerdictSeverity};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the alert channel
const ALERT_QUEUE_SIZE: usize = 100;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Sends queued verdicts to the configured channels
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the channel verdicts are queued on
    pub fn create_channel() -> (mpsc::Sender<AnomalyVerdict>, mpsc::Receiver<AnomalyVerdict>) {
        mpsc::channel(ALERT_QUEUE_SIZE)
    }

    /// Whether `verdict` passes the configured filters
    pub fn should_dispatch(&self, verdict: &AnomalyVerdict) -> bool {
        self.config.enabled
            && verdict.is_alert_worthy()
            && (verdict.risk_score >= self.config.min_risk_score
                || verdict.severity == VerdictSeverity::Critical)
    }

    /// Receive verdicts until the channel closes, dispatching those that pass the filters
    pub async fn run(self, mut rx: mpsc::Receiver<AnomalyVerdict>) {
        log::info!("Alert dispatcher started");

        while let Some(verdict) = rx.recv().await {
            if !self.should_dispatch(&verdict) {
                log::debug!(
                    "Skipping alert ({} risk {} < min {})",
                    verdict.severity,
                    verdict.risk_score,
                    self.config.min_risk_score
                );
                continue;
            }

            log::info!(
                "Dispatching alert: {} (risk {}/10)",
                verdict.severity,
                verdict.risk_score
            );

            if let Err(e) = self.dispatch_alert(&verdict).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Send to every configured channel, returning the first failure
    async fn dispatch_alert(&self, verdict: &AnomalyVerdict) -> Result<(), AlertError> {
        let mut first_error = None;

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, verdict).await {
                log::error!("Slack alert failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(ref discord) = self.config.discord {
            if let Err(e) = self.send_discord_alert(discord, verdict).await {
                log::error!("Discord alert failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, verdict).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_slack_alert(
        &self,
        config: &SlackConfig,
        verdict: &AnomalyVerdict,
    ) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&slack_payload(config, verdict))
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Slack returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_discord_alert(
        &self,
        config: &DiscordConfig,
        verdict: &AnomalyVerdict,
    ) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&discord_payload(config, verdict))
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Discord returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        verdict: &AnomalyVerdict,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(verdict).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

fn summary_text(verdict: &AnomalyVerdict) -> String {
    if verdict.anomalies.is_empty() {
        "No specific anomalies listed".to_string()
    } else {
        verdict
            .anomalies
            .iter()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn slack_payload(config: &SlackConfig, verdict: &AnomalyVerdict) -> serde_json::Value {
    let color = match verdict.severity {
        VerdictSeverity::Critical => "danger",
        VerdictSeverity::Warning => "warning",
        VerdictSeverity::Normal => "good",
    };

    serde_json::json!({
        "channel": config.channel,
        "username": config.username.as_deref().unwrap_or("NetSage"),
        "icon_emoji": ":shield:",
        "attachments": [{
            "color": color,
            "title": format!(":rotating_light: Network anomaly: {}", verdict.severity),
            "fields": [
                { "title": "Risk score", "value": format!("{}/10", verdict.risk_score), "short": true },
                { "title": "Model", "value": &verdict.model_id, "short": true },
                { "title": "Affected observations", "value": verdict.affected_observation_count.to_string(), "short": true },
            ],
            "text": summary_text(verdict),
            "ts": verdict.timestamp.timestamp(),
        }]
    })
}

fn discord_payload(config: &DiscordConfig, verdict: &AnomalyVerdict) -> serde_json::Value {
    let color = match verdict.severity {
        VerdictSeverity::Critical => 0xFF0000,
        VerdictSeverity::Warning => 0xFFCC00,
        VerdictSeverity::Normal => 0x00FF00,
    };

    serde_json::json!({
        "username": config.username.as_deref().unwrap_or("NetSage"),
        "embeds": [{
            "title": format!(":shield: Network anomaly: {}", verdict.severity),
            "description": summary_text(verdict),
            "color": color,
            "fields": [
                { "name": "Risk score", "value": format!("{}/10", verdict.risk_score), "inline": true },
                { "name": "Model", "value": &verdict.model_id, "inline": true },
            ],
            "timestamp": verdict.timestamp.to_rfc3339(),
            "footer": { "text": "NetSage network monitor" }
        }]
    })
}

/// Sync-friendly handle for queueing alerts
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<AnomalyVerdict>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<AnomalyVerdict>) -> Self {
        AlertQueue { tx }
    }

    /// Queue without blocking; the verdict is dropped if the queue is full
    pub fn queue_alert(&self, verdict: AnomalyVerdict) {
        if let Err(e) = self.tx.try_send(verdict) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    pub async fn queue_alert_async(&self, verdict: AnomalyVerdict) -> Result<(), AlertError> {
        self.tx
            .send(verdict)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

//! Alert delivery: SMTP e-mail, generic JSON webhook, Discord webhook
//!
//! Each channel reports whether it delivered. A disabled channel reports
//! `false` without attempting anything; a failing one logs and reports
//! `false` so one broken channel never stops the others.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wssi_common::Result;

use crate::config::{ChannelsConfig, DiscordChannel, EmailChannel, WebhookChannel};
use crate::message::RenderedAlert;

pub const CHANNEL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Webhook,
    Discord,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Webhook => "webhook",
            Channel::Discord => "discord",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub channel: Channel,
    pub delivered: bool,
}

#[derive(Error, Debug)]
enum ChannelError {
    #[error("channel is enabled but {0} is not set")]
    Misconfigured(&'static str),

    #[error("bad address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("message build failed: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint answered {0}")]
    Status(u16),
}

type ChannelResult = std::result::Result<(), ChannelError>;

/// Sends rendered alerts through the configured channels
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(CHANNEL_TIMEOUT).build()?;
        Ok(Self { http })
    }

    /// Try every channel; results come back in email, webhook, discord order
    pub async fn dispatch(&self, channels: &ChannelsConfig, alert: &RenderedAlert) -> Vec<Delivery> {
        vec![
            Delivery {
                channel: Channel::Email,
                delivered: self.send_email(&channels.email, alert).await,
            },
            Delivery {
                channel: Channel::Webhook,
                delivered: self.send_webhook(&channels.webhook, &alert.webhook).await,
            },
            Delivery {
                channel: Channel::Discord,
                delivered: self.send_discord(&channels.discord, &alert.discord).await,
            },
        ]
    }

    pub async fn send_email(&self, config: &EmailChannel, alert: &RenderedAlert) -> bool {
        if !config.enabled {
            return false;
        }
        report(Channel::Email, try_email(config, alert).await)
    }

    pub async fn send_webhook(&self, config: &WebhookChannel, payload: &Value) -> bool {
        if !config.enabled {
            return false;
        }
        report(Channel::Webhook, self.try_webhook(config, payload).await)
    }

    pub async fn send_discord(&self, config: &DiscordChannel, payload: &Value) -> bool {
        if !config.enabled {
            return false;
        }
        report(Channel::Discord, self.try_discord(config, payload).await)
    }

    async fn try_webhook(&self, config: &WebhookChannel, payload: &Value) -> ChannelResult {
        if config.url.trim().is_empty() {
            return Err(ChannelError::Misconfigured("url"));
        }
        let mut request = self.http.post(&config.url).json(payload);
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        check_status(request.send().await?)
    }

    async fn try_discord(&self, config: &DiscordChannel, payload: &Value) -> ChannelResult {
        if config.webhook_url.trim().is_empty() {
            return Err(ChannelError::Misconfigured("webhook_url"));
        }
        let response = self.http.post(&config.webhook_url).json(payload).send().await?;
        check_status(response)
    }
}

fn check_status(response: reqwest::Response) -> ChannelResult {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ChannelError::Status(status.as_u16()));
    }
    Ok(())
}

fn report(channel: Channel, result: ChannelResult) -> bool {
    match result {
        Ok(()) => {
            debug!("{} alert delivered", channel.as_str());
            true
        }
        Err(e) => {
            warn!("{} alert failed: {}", channel.as_str(), e);
            false
        }
    }
}

fn build_email(config: &EmailChannel, alert: &RenderedAlert) -> std::result::Result<Message, ChannelError> {
    if config.to.is_empty() {
        return Err(ChannelError::Misconfigured("to"));
    }
    let mut builder = Message::builder()
        .from(config.sender().parse::<Mailbox>()?)
        .subject(alert.subject.as_str());
    for recipient in &config.to {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }
    let message = builder.multipart(MultiPart::alternative_plain_html(alert.text.clone(), alert.html.clone()))?;
    Ok(message)
}

async fn try_email(config: &EmailChannel, alert: &RenderedAlert) -> ChannelResult {
    if config.smtp_host.trim().is_empty() {
        return Err(ChannelError::Misconfigured("smtp_host"));
    }
    let message = build_email(config, alert)?;

    let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        .port(config.smtp_port)
        .timeout(Some(CHANNEL_TIMEOUT));
    if !config.username.is_empty() {
        transport = transport.credentials(Credentials::new(config.username.clone(), config.password.clone()));
    }

    transport.build().send(message).await?;
    info!("Alert e-mailed to {} recipient(s)", config.to.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{test_alert, test_snapshot};
    use crate::message::render;
    use chrono::Utc;

    fn rendered() -> RenderedAlert {
        let now = Utc::now();
        render(&test_alert(), &test_snapshot(now), now, "https://dash.example.com")
    }

    #[tokio::test]
    async fn test_disabled_channels_report_false() {
        let dispatcher = Dispatcher::new().unwrap();
        let results = dispatcher.dispatch(&ChannelsConfig::default(), &rendered()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].channel, Channel::Email);
        assert_eq!(results[2].channel, Channel::Discord);
        assert!(results.iter().all(|d| !d.delivered));
    }

    #[tokio::test]
    async fn test_enabled_but_unconfigured_channels_fail_cleanly() {
        let dispatcher = Dispatcher::new().unwrap();
        let alert = rendered();

        let email = EmailChannel {
            enabled: true,
            ..EmailChannel::default()
        };
        assert!(!dispatcher.send_email(&email, &alert).await);

        let webhook = WebhookChannel {
            enabled: true,
            ..WebhookChannel::default()
        };
        assert!(!dispatcher.send_webhook(&webhook, &alert.webhook).await);

        let discord = DiscordChannel {
            enabled: true,
            webhook_url: String::new(),
        };
        assert!(!dispatcher.send_discord(&discord, &alert.discord).await);
    }

    #[test]
    fn test_build_email_multipart() {
        let config = EmailChannel {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            username: "alerts@example.com".to_string(),
            to: vec!["ops@example.com".to_string(), "oncall@example.com".to_string()],
            ..EmailChannel::default()
        };
        let message = build_email(&config, &rendered()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: alerts@example.com"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("oncall@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_build_email_rejects_bad_recipients() {
        let mut config = EmailChannel {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            ..EmailChannel::default()
        };
        assert!(matches!(build_email(&config, &rendered()), Err(ChannelError::Misconfigured("to"))));

        config.to = vec!["not an address".to_string()];
        assert!(matches!(build_email(&config, &rendered()), Err(ChannelError::Address(_))));
    }
}

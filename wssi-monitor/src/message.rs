//! Alert rendering for each delivery channel

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use wssi_common::analytics::WssiSnapshot;
use wssi_common::Severity;

use crate::check::Alert;

/// One alert rendered for every channel
#[derive(Debug, Clone)]
pub struct RenderedAlert {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub webhook: Value,
    pub discord: Value,
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[CRITICAL]",
        Severity::Approaching => "[APPROACHING]",
        Severity::Watch => "[WATCH]",
        Severity::Stable => "[INFO]",
    }
}

fn html_colour(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#ff3864",
        Severity::Approaching => "#ff9f1c",
        _ => "#00d4aa",
    }
}

/// Embed colour as Discord's decimal RGB
pub fn discord_colour(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 0xFF0000,
        Severity::Approaching => 0xFFA500,
        _ => 0x3498DB,
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn render(alert: &Alert, snapshot: &WssiSnapshot, now: DateTime<Utc>, dashboard_url: &str) -> RenderedAlert {
    let level = alert.severity.as_str().to_uppercase();
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let subject = format!("{} WSSI Alert: {}", marker(alert.severity), alert.message);

    let text = format!(
        "WSSI Alert - {level}\n\n\
         {message}\n\n\
         Current WSSI: {wssi:.2}\n\
         Active Themes: {active}\n\
         Above Warning: {above}\n\n\
         Time: {timestamp}\n\n\
         View Dashboard: {dashboard}\n",
        level = level,
        message = alert.message,
        wssi = snapshot.wssi_value,
        active = snapshot.active_theme_count(),
        above = snapshot.above_warning,
        timestamp = timestamp,
        dashboard = dashboard_url,
    );

    let html = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; padding: 20px;">
    <h2 style="color: {colour};">WSSI {level} Alert</h2>
    <p style="font-size: 18px;">{message}</p>
    <table style="width: 100%; border-collapse: collapse; margin: 20px 0;">
        <tr style="border-bottom: 1px solid #ddd;"><td style="padding: 10px;">WSSI Value:</td><td style="padding: 10px; font-weight: bold;">{wssi:.2}</td></tr>
        <tr style="border-bottom: 1px solid #ddd;"><td style="padding: 10px;">Active Themes:</td><td style="padding: 10px;">{active}</td></tr>
        <tr><td style="padding: 10px;">Above Warning:</td><td style="padding: 10px;">{above}</td></tr>
    </table>
    <p><a href="{dashboard}">View dashboard</a></p>
    <p style="color: #666; font-size: 12px;">{time}</p>
</div>
"#,
        colour = html_colour(alert.severity),
        level = level,
        message = escape(&alert.message),
        wssi = snapshot.wssi_value,
        active = snapshot.active_theme_count(),
        above = snapshot.above_warning,
        dashboard = escape(dashboard_url),
        time = now.format("%Y-%m-%d %H:%M UTC"),
    );

    let webhook = json!({
        "alert_type": alert.kind.as_str(),
        "severity": alert.severity,
        "message": alert.message,
        "wssi_value": snapshot.wssi_value,
        "theme_id": alert.theme_id,
        "value": alert.value,
        "threshold": alert.threshold,
        "timestamp": timestamp,
    });

    let discord = json!({
        "content": subject,
        "embeds": [{
            "title": format!("WSSI {} Alert", level),
            "description": alert.message,
            "color": discord_colour(alert.severity),
            "fields": [
                {"name": "WSSI Value", "value": format!("{:.2}", snapshot.wssi_value), "inline": true},
                {"name": "Active Themes", "value": snapshot.active_theme_count().to_string(), "inline": true}
            ],
            "timestamp": timestamp,
        }]
    });

    RenderedAlert {
        subject,
        text,
        html,
        webhook,
        discord,
    }
}

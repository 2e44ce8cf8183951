//! HTML rendering for brief editions and the archive page
//!
//! Pages are self-contained (inline CSS, no scripts). Every value that comes
//! from analytics or request data goes through [`escape`].

use serde_json::Value;

use super::model::{BriefDocument, Variant};
use crate::db::releases::BriefReleaseRecord;

/// Escape text for HTML element and attribute content
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
        * { box-sizing: border-box; }
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #f6f5f1;
            color: #1d1d1d;
            line-height: 1.55;
            margin: 0;
        }
        .container { max-width: 860px; margin: 0 auto; padding: 32px 20px; }
        header { border-bottom: 2px solid #1d1d1d; margin-bottom: 24px; }
        h1 { font-size: 28px; margin: 0 0 4px 0; }
        h2 { font-size: 19px; margin-top: 32px; border-bottom: 1px solid #ccc; padding-bottom: 4px; }
        .subtitle { color: #666; font-size: 14px; margin-bottom: 12px; }
        .headline { display: flex; gap: 24px; flex-wrap: wrap; }
        .metric { background: #fff; border: 1px solid #ddd; border-radius: 6px; padding: 12px 16px; min-width: 140px; }
        .metric .label { font-size: 12px; color: #666; text-transform: uppercase; }
        .metric .value { font-size: 24px; font-weight: 600; }
        table { width: 100%; border-collapse: collapse; background: #fff; }
        th, td { text-align: left; padding: 6px 10px; border-bottom: 1px solid #e4e4e4; font-size: 14px; }
        th { background: #efeee9; }
        .level-critical { color: #b00020; font-weight: 600; }
        .level-approaching { color: #c75b00; font-weight: 600; }
        .level-watch { color: #8a7400; }
        .level-stable { color: #2e7d32; }
        .notice { background: #fff8e1; border: 1px solid #f0d27a; padding: 12px 16px; border-radius: 6px; margin-top: 24px; }
        .notes li { font-size: 14px; color: #444; }
        footer { margin-top: 40px; font-size: 12px; color: #888; }
        a { color: #1f4fa3; }
"#;

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
<div class="container">
{body}
</div>
</body>
</html>
"#,
        title = escape(title),
        style = STYLE,
        body = body,
    )
}

fn level_class(level: &str) -> String {
    let level = level.to_lowercase();
    match level.as_str() {
        "critical" | "approaching" | "watch" | "stable" => format!("level-{}", level),
        _ => "level-unknown".to_string(),
    }
}

fn fmt_num(value: Option<f64>, places: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", places, v),
        _ => "n/a".to_string(),
    }
}

fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Full HTML page for one edition
pub fn render_brief(doc: &BriefDocument) -> String {
    let edition = match doc.variant {
        Variant::Free => "Free edition",
        Variant::Paid => "Subscriber edition",
    };
    let h = &doc.headline;
    let mut body = String::new();

    body.push_str(&format!(
        r#"<header>
    <h1>Fragility Brief</h1>
    <div class="subtitle">{date} &middot; {edition} &middot; WSSI computed {calc}</div>
</header>
<section class="headline">
    <div class="metric"><div class="label">WSSI</div><div class="value">{value}</div></div>
    <div class="metric"><div class="label">Score</div><div class="value">{score}</div></div>
    <div class="metric"><div class="label">Change</div><div class="value">{delta}</div></div>
    <div class="metric"><div class="label">Stress level</div><div class="value {level_class}">{level}</div></div>
    <div class="metric"><div class="label">Trend</div><div class="value">{trend}</div></div>
</section>
"#,
        date = escape(&doc.release_date),
        edition = edition,
        calc = escape(&h.calculation_timestamp),
        value = fmt_num(Some(h.wssi_value), 2),
        score = fmt_num(Some(h.wssi_score), 1),
        delta = format!("{:+.2}", h.wssi_delta),
        level_class = level_class(&h.stress_level),
        level = escape(&h.stress_level),
        trend = escape(&h.trend),
    ));

    body.push_str("<h2>Theme stress</h2>\n<table>\n<tr><th>Theme</th><th>Category</th><th>Level</th><th>Z</th></tr>\n");
    for theme in &doc.themes {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td></tr>\n",
            escape(&theme.theme_name),
            escape(&theme.category),
            level_class(&theme.stress_level),
            escape(&theme.stress_level),
            fmt_num(theme.value, 2),
        ));
    }
    body.push_str("</table>\n");

    body.push_str(&format!(
        "<h2>Alerts</h2>\n<p>{} active alert{}.</p>\n",
        doc.active_alert_count,
        if doc.active_alert_count == 1 { "" } else { "s" }
    ));
    if let Some(alerts) = &doc.active_alerts {
        if !alerts.is_empty() {
            body.push_str("<table>\n<tr><th>Alert</th><th>Severity</th><th>Detail</th></tr>\n");
            for alert in alerts {
                let title = [text(alert, "title"), text(alert, "theme_name"), text(alert, "id")]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or_default();
                body.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape(&title),
                    escape(&text(alert, "severity")),
                    escape(&text(alert, "message")),
                ));
            }
            body.push_str("</table>\n");
        }
    }

    if let Some(patterns) = &doc.pattern_matches {
        body.push_str("<h2>Historical analogs</h2>\n<table>\n<tr><th>Episode</th><th>Period</th><th>Similarity</th><th>Confidence</th></tr>\n");
        for m in patterns {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}%</td><td>{}</td></tr>\n",
                escape(&text(m, "label")),
                escape(&text(m, "period")),
                fmt_num(m.get("similarity_pct").and_then(Value::as_f64), 1),
                escape(&text(m, "confidence_tier")),
            ));
        }
        body.push_str("</table>\n");
    }

    if let Some(pairs) = &doc.correlations {
        body.push_str("<h2>Strongest correlations</h2>\n<table>\n<tr><th>Pair</th><th>r</th></tr>\n");
        for pair in pairs {
            let a = [text(pair, "theme_a"), text(pair, "source"), text(pair, "a")]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or_default();
            let b = [text(pair, "theme_b"), text(pair, "target"), text(pair, "b")]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or_default();
            body.push_str(&format!(
                "<tr><td>{} &harr; {}</td><td>{}</td></tr>\n",
                escape(&a),
                escape(&b),
                fmt_num(pair.get("pearson_r").and_then(Value::as_f64), 3),
            ));
        }
        body.push_str("</table>\n");
    }

    if let Some(network) = &doc.network {
        body.push_str(&format!(
            "<h2>Stress network</h2>\n<p>{} nodes, {} edges.</p>\n<table>\n<tr><th>Node</th><th>Links</th></tr>\n",
            network.node_count, network.edge_count
        ));
        for node in &network.top_nodes {
            body.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>\n", escape(&node.label), node.degree));
        }
        body.push_str("</table>\n");
    }

    if let Some(notice) = &doc.upgrade_notice {
        body.push_str(&format!("<div class=\"notice\">{}</div>\n", escape(notice)));
    }

    if !doc.notes.is_empty() {
        body.push_str("<h2>Notes</h2>\n<ul class=\"notes\">\n");
        for note in &doc.notes {
            body.push_str(&format!("<li>{}</li>\n", escape(note)));
        }
        body.push_str("</ul>\n");
    }

    body.push_str(&format!(
        "<footer>Generated {} &middot; WSSI API v{}</footer>\n",
        doc.generated_at.format("%Y-%m-%d %H:%M UTC"),
        env!("CARGO_PKG_VERSION"),
    ));

    page(&format!("Fragility Brief {} ({})", doc.release_date, doc.variant.as_str()), &body)
}

/// Archive listing page
pub fn render_archive_page(releases: &[BriefReleaseRecord]) -> String {
    let mut body = String::from(
        "<header>\n    <h1>Fragility Brief archive</h1>\n    <div class=\"subtitle\">Published releases, newest first</div>\n</header>\n",
    );

    if releases.is_empty() {
        body.push_str("<p>No releases have been published yet.</p>\n");
    } else {
        body.push_str("<table>\n<tr><th>Date</th><th>WSSI</th><th>Level</th><th>Free</th><th>Subscribers</th></tr>\n");
        for r in releases {
            let id = escape(&r.release_id);
            body.push_str(&format!(
                "<tr><td>{date}</td><td>{value}</td><td class=\"{class}\">{level}</td>\
                 <td><a href=\"/api/v1/briefs/releases/{id}/free\">read</a></td>\
                 <td><a href=\"/api/v1/briefs/releases/{id}/paid\">read</a></td></tr>\n",
                date = escape(&r.release_date),
                value = fmt_num(r.wssi_value, 2),
                class = level_class(r.stress_level.as_deref().unwrap_or("")),
                level = escape(r.stress_level.as_deref().unwrap_or("unknown")),
                id = id,
            ));
        }
        body.push_str("</table>\n");
    }

    page("Fragility Brief archive", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefs::model::{Headline, ThemeSummary};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn doc(variant: Variant) -> BriefDocument {
        BriefDocument {
            variant,
            release_date: "2026-10-19".to_string(),
            generated_at: Utc::now(),
            headline: Headline {
                wssi_value: 1.84,
                wssi_score: 86.8,
                wssi_delta: -0.12,
                trend: "rising".to_string(),
                stress_level: "approaching".to_string(),
                active_themes: 2,
                above_warning: 1,
                calculation_timestamp: "2026-10-19T06:00:00Z".to_string(),
            },
            themes: vec![ThemeSummary {
                theme_id: "x".to_string(),
                theme_name: "<script>alert(1)</script>".to_string(),
                category: "Political".to_string(),
                stress_level: "critical".to_string(),
                value: Some(2.3),
            }],
            active_alert_count: 0,
            active_alerts: None,
            pattern_matches: None,
            correlations: None,
            network: None,
            dataset_freshness: BTreeMap::new(),
            notes: vec![],
            upgrade_notice: None,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }

    #[test]
    fn test_brief_values_are_escaped() {
        let html = render_brief(&doc(Variant::Paid));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("1.84"));
        assert!(html.contains("-0.12"));
        assert!(html.contains("Subscriber edition"));
    }

    #[test]
    fn test_free_brief_shows_notice() {
        let mut free = doc(Variant::Free);
        free.upgrade_notice = Some("Upgrade for more".to_string());
        let html = render_brief(&free);
        assert!(html.contains("Free edition"));
        assert!(html.contains("Upgrade for more"));
        assert!(!html.contains("Historical analogs"));
    }

    #[test]
    fn test_archive_page() {
        assert!(render_archive_page(&[]).contains("No releases"));

        let release = BriefReleaseRecord {
            release_id: "fb-2026-10-19-abcd1234".to_string(),
            release_date: "2026-10-19".to_string(),
            published_at: Utc::now(),
            created_by: "test".to_string(),
            notes: None,
            wssi_value: Some(1.5),
            wssi_score: Some(80.0),
            stress_level: Some("approaching".to_string()),
            free_path: String::new(),
            paid_path: String::new(),
        };
        let html = render_archive_page(&[release]);
        assert!(html.contains("/api/v1/briefs/releases/fb-2026-10-19-abcd1234/free"));
        assert!(html.contains("level-approaching"));
    }
}

//! Slack incoming-webhook markup and payloads.
//!
//! Slack's mrkdwn uses single-character delimiters and parses `:word:` as an
//! emoji shortcode, so clock times use a dot separator (`09.00 PM`).

use serde_json::{Value, json};

use super::{FormattedReport, Platform, PlatformFormatter};
use crate::batch::{Batch, BatchLimits};

const DAY_COLORS: [&str; 7] = [
    "#E53935", "#FB8C00", "#FFD600", "#43A047", "#1E88E5", "#5E35B1", "#8E24AA",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlackFormatter;

impl SlackFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformFormatter for SlackFormatter {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    fn bold(&self, text: &str) -> String {
        format!("*{text}*")
    }

    fn italic(&self, text: &str) -> String {
        format!("_{text}_")
    }

    fn strike(&self, text: &str) -> String {
        format!("~{text}~")
    }

    fn time_separator(&self) -> &'static str {
        "."
    }

    fn emoji_spacing(&self) -> &'static str {
        "  "
    }

    fn header(&self, text: &str) -> String {
        text.to_string()
    }

    fn limits(&self) -> BatchLimits {
        BatchLimits::SLACK
    }

    fn header_payload(&self, report: &FormattedReport) -> Value {
        json!({
            "text": report.header,
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": report.header, "emoji": true }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": report.subheader }
                }
            ]
        })
    }

    fn batch_payload(&self, batch: &Batch) -> Value {
        let attachments: Vec<Value> = batch
            .blocks
            .iter()
            .map(|block| {
                let mut attachment = json!({
                    "color": DAY_COLORS[block.position % DAY_COLORS.len()],
                    "text": block.body,
                    "mrkdwn_in": ["text"],
                });
                if !block.title.is_empty() {
                    attachment["title"] = Value::String(block.title.clone());
                }
                attachment
            })
            .collect();

        json!({ "attachments": attachments })
    }

    fn footer_payload(&self, footer: &str) -> Value {
        json!({
            "text": footer,
            "blocks": [
                { "type": "section", "text": { "type": "mrkdwn", "text": footer } }
            ]
        })
    }
}

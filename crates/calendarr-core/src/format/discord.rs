//! Discord webhook markup and payloads.

use serde_json::{Value, json};

use super::{FormattedReport, Platform, PlatformFormatter};
use crate::batch::{Batch, BatchLimits};

/// Embed colours, red through violet, indexed by weekday position.
const DAY_COLORS: [u32; 7] = [
    15158332, // red
    15844367, // orange
    16776960, // yellow
    5763719,  // green
    3447003,  // blue
    10181046, // indigo
    9846527,  // violet
];

/// Discord formatter. Supports an optional role mention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordFormatter {
    mention_role_id: Option<String>,
    mention_text: Option<String>,
}

impl DiscordFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pings `role_id` in the header message, followed by `text` when given.
    pub fn with_mention(mut self, role_id: impl Into<String>, text: Option<String>) -> Self {
        let role_id = role_id.into();
        self.mention_role_id = (!role_id.trim().is_empty()).then(|| role_id.trim().to_string());
        self.mention_text = text.filter(|t| !t.trim().is_empty());
        self
    }

    fn color(position: usize) -> u32 {
        DAY_COLORS[position % DAY_COLORS.len()]
    }
}

impl PlatformFormatter for DiscordFormatter {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn bold(&self, text: &str) -> String {
        format!("**{text}**")
    }

    fn italic(&self, text: &str) -> String {
        format!("*{text}*")
    }

    fn strike(&self, text: &str) -> String {
        format!("~~{text}~~")
    }

    fn time_separator(&self) -> &'static str {
        ":"
    }

    fn header(&self, text: &str) -> String {
        format!("# {text}")
    }

    fn mention(&self) -> Option<String> {
        let role = self.mention_role_id.as_ref()?;
        Some(match &self.mention_text {
            Some(text) => format!("<@&{role}> {text}"),
            None => format!("<@&{role}>"),
        })
    }

    fn limits(&self) -> BatchLimits {
        BatchLimits::DISCORD
    }

    fn header_payload(&self, report: &FormattedReport) -> Value {
        let mut content = String::new();
        if let Some(mention) = &report.mention {
            content.push_str(mention);
            content.push('\n');
        }
        content.push_str(&report.header);
        content.push('\n');
        content.push_str(&report.subheader);

        json!({ "content": content })
    }

    fn batch_payload(&self, batch: &Batch) -> Value {
        let embeds: Vec<Value> = batch
            .blocks
            .iter()
            .map(|block| {
                let mut embed = json!({
                    "description": block.body,
                    "color": Self::color(block.position),
                });
                // Discord rejects empty titles.
                if !block.title.is_empty() {
                    embed["title"] = Value::String(block.title.clone());
                }
                embed
            })
            .collect();

        json!({ "embeds": embeds })
    }

    fn footer_payload(&self, footer: &str) -> Value {
        json!({ "content": footer })
    }
}

//! Dry run: print what would be posted.

use calendarr_core::{Platform, PlatformMessage};
use calendarr_server::{RunSettings, Runner};
use chrono::Utc;
use serde_json::{Value, json};

use crate::error::{ClientError, ClientResult};

/// Builds the messages and prints their payloads as JSON.
pub async fn preview(settings: RunSettings, platform: Option<Platform>) -> ClientResult<()> {
    if let Some(platform) = platform
        && settings.target(platform).is_none()
    {
        return Err(ClientError::PlatformDisabled(platform));
    }

    let runner = Runner::new(settings)?;
    let messages = runner.preview(Utc::now(), platform).await?;
    println!("{}", render(&messages)?);
    Ok(())
}

/// One JSON document per platform, with the payloads in send order.
pub fn render(messages: &[PlatformMessage]) -> ClientResult<String> {
    let doc: Vec<Value> = messages
        .iter()
        .map(|message| {
            json!({
                "platform": message.platform,
                "lines": message.line_count(),
                "payloads": message.payloads(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&doc).map_err(|e| ClientError::Serialize {
        what: "preview",
        message: e.to_string(),
    })
}

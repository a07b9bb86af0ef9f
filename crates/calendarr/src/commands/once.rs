//! Single run.

use calendarr_server::{RunSettings, Runner};

use crate::error::ClientResult;

/// Fetches the feeds and posts one report to every enabled platform.
pub async fn once(settings: RunSettings) -> ClientResult<()> {
    let runner = Runner::new(settings)?;
    let summary = runner.run_once().await?;

    for (platform, sent) in &summary.delivered {
        println!("{platform}: {sent} message(s) sent");
    }
    if summary.failed_feeds > 0 {
        println!("{} feed(s) could not be loaded", summary.failed_feeds);
    }
    Ok(())
}

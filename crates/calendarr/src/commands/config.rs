//! Configuration commands.

use std::path::Path;

use calendarr_server::Settings;

use crate::config;
use crate::error::{ClientError, ClientResult};

/// Show the configuration file path.
pub fn path(config_path: &Path) -> ClientResult<()> {
    let note = if config_path.exists() { "" } else { " (missing)" };
    println!("config: {}{note}", config_path.display());
    Ok(())
}

/// Print the configuration as loaded, with URLs masked.
pub fn show(config_path: &Path, explicit: bool) -> ClientResult<()> {
    let settings = config::load(config_path, explicit)?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", to_toml(&settings)?);
    Ok(())
}

/// Validate the configuration, including secret references and footers.
pub fn validate(config_path: &Path, explicit: bool) -> ClientResult<()> {
    let run = config::load_run_settings(config_path, explicit)?;
    let platforms: Vec<&str> = run.targets.iter().map(|t| t.platform.as_str()).collect();
    println!("Configuration is valid.");
    println!("  feeds:     {}", run.feeds.len());
    println!("  platforms: {}", platforms.join(", "));
    println!("  schedule:  {} ({})", run.schedule, run.timezone);
    Ok(())
}

/// Serializes the masked settings.
pub fn to_toml(settings: &Settings) -> ClientResult<String> {
    toml::to_string_pretty(&settings.redacted()).map_err(|e| ClientError::Serialize {
        what: "config",
        message: e.to_string(),
    })
}

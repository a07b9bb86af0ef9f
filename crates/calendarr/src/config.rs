//! Configuration file handling.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/calendarr/config.toml`. Webhook and feed URLs accept `env::VAR`
//! secret references, and `footer_file` entries are read into the matching
//! footer.

use std::path::{Path, PathBuf};

use calendarr_server::{RunSettings, Settings};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Returns the default configuration directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("calendarr")
}

/// Returns the default configuration file path.
pub fn default_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// The path given on the command line, or the default one.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(default_path, Path::to_path_buf)
}

/// Parses settings from TOML text.
pub fn parse(content: &str, path: &Path) -> ClientResult<Settings> {
    toml::from_str(content).map_err(|e| ClientError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Loads settings from `path` without resolving anything.
///
/// A missing file at the default location yields the defaults, which then
/// fail validation with a useful message. A missing explicit file is an
/// error.
pub fn load(path: &Path, explicit: bool) -> ClientResult<Settings> {
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, path)
}

/// Replaces secret references in URLs with their values.
pub fn resolve_secrets(mut settings: Settings) -> ClientResult<Settings> {
    for (index, feed) in settings.calendar.feeds.iter_mut().enumerate() {
        if secret::is_reference(&feed.url) {
            feed.url = secret::resolve(&feed.url)
                .map_err(|e| ClientError::secret(format!("calendar.feeds[{index}].url"), e))?;
        }
    }
    for (field, url) in [
        ("discord.webhook_url", &mut settings.discord.webhook_url),
        ("slack.webhook_url", &mut settings.slack.webhook_url),
    ] {
        if let Some(value) = url
            && secret::is_reference(value)
        {
            *value = secret::resolve(value).map_err(|e| ClientError::secret(field, e))?;
        }
    }
    Ok(settings)
}

/// Reads `footer_file` entries into the footer text when no inline footer
/// is set. Relative paths are taken from `base_dir`.
///
/// An unreadable footer file is logged and skipped; a report without its
/// footer is still worth sending.
pub fn load_footers(mut settings: Settings, base_dir: &Path) -> Settings {
    for (platform, footer, file) in [
        (
            "discord",
            &mut settings.discord.footer,
            settings.discord.footer_file.as_deref(),
        ),
        (
            "slack",
            &mut settings.slack.footer,
            settings.slack.footer_file.as_deref(),
        ),
    ] {
        let Some(file) = file else { continue };
        if footer.as_deref().is_some_and(|f| !f.trim().is_empty()) {
            debug!(platform, "Inline footer set, ignoring footer_file");
            continue;
        }
        let path = base_dir.join(file);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(platform, path = %path.display(), "Loaded footer");
                *footer = Some(text.trim_end().to_string());
            }
            Err(e) => {
                warn!(platform, path = %path.display(), error = %e, "Cannot read footer file, sending without footer");
            }
        }
    }
    settings
}

/// Loads, resolves and validates the settings used for a run.
pub fn load_run_settings(path: &Path, explicit: bool) -> ClientResult<RunSettings> {
    let settings = load(path, explicit)?;
    let settings = resolve_secrets(settings)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let settings = load_footers(settings, base_dir);
    Ok(settings.validate()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendarr_core::Platform;
    use calendarr_server::ConfigError;
    use std::io::Write;

    const MINIMAL: &str = r#"
[calendar]
timezone = "Europe/Paris"

[[calendar.feeds]]
url = "http://sonarr:8989/feed/v3/calendar/Sonarr.ics?apikey=abc"

[[calendar.feeds]]
url = "http://radarr:7878/feed/v3/calendar/Radarr.ics?apikey=def"
type = "movie"

[discord]
webhook_url = "https://discord.com/api/webhooks/1/token"
"#;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    mod loading {
        use super::*;

        #[test]
        fn default_path_ends_with_app_dir() {
            let path = default_path();
            assert!(path.ends_with("calendarr/config.toml"));
            assert_eq!(resolve_path(Some(Path::new("/tmp/x.toml"))), PathBuf::from("/tmp/x.toml"));
        }

        #[test]
        fn parses_minimal_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(dir.path(), MINIMAL);
            let settings = load(&path, true).unwrap();
            assert_eq!(settings.calendar.feeds.len(), 2);
            assert_eq!(settings.calendar.feeds[0].kind, "tv");
            assert_eq!(settings.calendar.feeds[1].kind, "movie");
            assert_eq!(settings.display.header, "TV Guide");
            assert!(settings.discord.enabled);
            assert!(!settings.slack.enabled);
        }

        #[test]
        fn missing_default_file_gives_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            let settings = load(&path, false).unwrap();
            assert_eq!(settings, Settings::default());
        }

        #[test]
        fn missing_explicit_file_errors() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nope.toml");
            let err = load(&path, true).unwrap_err();
            assert!(matches!(err, ClientError::ConfigRead { .. }));
        }

        #[test]
        fn unknown_key_is_a_parse_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(dir.path(), "[display]\nheadr = \"typo\"\n");
            let err = load(&path, true).unwrap_err();
            assert!(matches!(err, ClientError::ConfigParse { .. }));
            assert!(err.to_string().contains("headr"));
        }

        #[test]
        fn no_feeds_fails_validation() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(dir.path(), "[discord]\nwebhook_url = \"https://d.invalid/h\"\n");
            let err = load_run_settings(&path, true).unwrap_err();
            assert!(matches!(err, ClientError::Config(ConfigError::NoCalendars)));
        }

        #[test]
        fn full_run_settings() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(dir.path(), MINIMAL);
            let run = load_run_settings(&path, true).unwrap();
            assert_eq!(run.feeds.len(), 2);
            assert_eq!(run.timezone.name(), "Europe/Paris");
            assert_eq!(run.targets.len(), 1);
            assert_eq!(run.targets[0].platform, Platform::Discord);
        }
    }

    mod secrets {
        use super::*;

        #[test]
        fn webhook_reference_resolved() {
            unsafe {
                std::env::set_var("_CALENDARR_CFG_SLACK_HOOK", "https://hooks.slack.com/services/T/B/X");
            }
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.slack.enabled = true;
            settings.slack.webhook_url = Some("env::_CALENDARR_CFG_SLACK_HOOK".to_string());

            let resolved = resolve_secrets(settings).unwrap();
            assert_eq!(
                resolved.slack.webhook_url.as_deref(),
                Some("https://hooks.slack.com/services/T/B/X")
            );
            assert_eq!(
                resolved.discord.webhook_url.as_deref(),
                Some("https://discord.com/api/webhooks/1/token")
            );
            unsafe {
                std::env::remove_var("_CALENDARR_CFG_SLACK_HOOK");
            }
        }

        #[test]
        fn unresolved_reference_names_the_field() {
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.discord.webhook_url = Some("env::_CALENDARR_CFG_UNSET_HOOK".to_string());
            let err = resolve_secrets(settings).unwrap_err();
            assert!(matches!(err, ClientError::Secret { ref field, .. } if field == "discord.webhook_url"));
        }

        #[test]
        fn feed_reference_resolved() {
            unsafe {
                std::env::set_var(
                    "_CALENDARR_CFG_FEED",
                    "http://sonarr:8989/feed/v3/calendar/Sonarr.ics?apikey=zzz",
                );
            }
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.calendar.feeds[0].url = "env::_CALENDARR_CFG_FEED".to_string();
            let resolved = resolve_secrets(settings).unwrap();
            assert!(resolved.calendar.feeds[0].url.ends_with("apikey=zzz"));
            unsafe {
                std::env::remove_var("_CALENDARR_CFG_FEED");
            }
        }
    }

    mod footers {
        use super::*;

        #[test]
        fn footer_file_read_relative_to_config() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("footer.md"), "Enjoy the week!\n\n").unwrap();
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.discord.footer_file = Some(PathBuf::from("footer.md"));

            let settings = load_footers(settings, dir.path());
            assert_eq!(settings.discord.footer.as_deref(), Some("Enjoy the week!"));
        }

        #[test]
        fn inline_footer_wins() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("footer.md"), "from file").unwrap();
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.slack.footer = Some("inline".to_string());
            settings.slack.footer_file = Some(PathBuf::from("footer.md"));

            let settings = load_footers(settings, dir.path());
            assert_eq!(settings.slack.footer.as_deref(), Some("inline"));
        }

        #[test]
        fn missing_footer_file_is_skipped() {
            let dir = tempfile::tempdir().unwrap();
            let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
            settings.discord.footer_file = Some(PathBuf::from("missing.md"));

            let settings = load_footers(settings, dir.path());
            assert_eq!(settings.discord.footer, None);
        }
    }
}

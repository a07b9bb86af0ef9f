//! Command-line interface definition.

use std::path::PathBuf;

use calendarr_core::{Platform, TracingConfig, TracingOutputFormat};
use clap::{Parser, Subcommand};

/// calendarr - Sonarr/Radarr release calendars posted to Discord and Slack
#[derive(Debug, Parser)]
#[command(name = "calendarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALENDARR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "CALENDARR_LOG_FORMAT")]
    pub log_format: Option<TracingOutputFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The command to run; `run` when none was given.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Logging setup for this invocation.
    ///
    /// The scheduler logs JSON by default, one-shot commands log compact
    /// lines. `--debug` raises the level and `--log-format` wins over both.
    pub fn tracing_config(&self) -> TracingConfig {
        let config = if self.debug {
            TracingConfig::cli_debug()
        } else if matches!(self.resolved_command(), Command::Run) {
            TracingConfig::daemon()
        } else {
            TracingConfig::default()
        };
        match self.log_format {
            Some(format) => config.with_format(format),
            None => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Post reports on the configured schedule until interrupted
    Run,

    /// Fetch the feeds and post one report now
    Once,

    /// Print the payloads that would be posted, without sending them
    Preview {
        /// Only build the message for this platform
        #[arg(long, short)]
        platform: Option<Platform>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Show the configuration file path
    Path,
    /// Print the configuration with secrets masked
    Show,
    /// Validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tracing::Level;

    #[test]
    fn verify_cli() {
        <Cli as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn defaults_to_run() {
        let cli = Cli::try_parse_from(["calendarr"]).unwrap();
        assert_eq!(cli.resolved_command(), Command::Run);
        assert!(!cli.debug);
    }

    #[test]
    fn preview_platform() {
        let cli = Cli::try_parse_from(["calendarr", "preview", "--platform", "slack"]).unwrap();
        assert_eq!(
            cli.resolved_command(),
            Command::Preview {
                platform: Some(Platform::Slack)
            }
        );

        assert!(Cli::try_parse_from(["calendarr", "preview", "-p", "teams"]).is_err());
    }

    #[test]
    fn config_actions() {
        let cli =
            Cli::try_parse_from(["calendarr", "--config", "/etc/calendarr.toml", "config", "show"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/calendarr.toml")));
        assert_eq!(
            cli.resolved_command(),
            Command::Config {
                action: ConfigAction::Show
            }
        );
    }

    mod logging {
        use super::*;

        #[test]
        fn run_logs_json() {
            let cli = Cli::try_parse_from(["calendarr", "run"]).unwrap();
            let config = cli.tracing_config();
            assert_eq!(config.output_format, TracingOutputFormat::Json);
            assert_eq!(config.default_level, Level::INFO);
        }

        #[test]
        fn one_shot_logs_compact() {
            let cli = Cli::try_parse_from(["calendarr", "once"]).unwrap();
            assert_eq!(cli.tracing_config().output_format, TracingOutputFormat::Compact);
        }

        #[test]
        fn debug_and_format_override() {
            let cli =
                Cli::try_parse_from(["calendarr", "-v", "--log-format", "pretty", "run"]).unwrap();
            let config = cli.tracing_config();
            assert_eq!(config.default_level, Level::DEBUG);
            assert_eq!(config.output_format, TracingOutputFormat::Pretty);
        }
    }
}

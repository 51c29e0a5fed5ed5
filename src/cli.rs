//! Command-line interface for voxgate
//!
//! Provides argument parsing using clap derive macros.

use crate::platform::Platform;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Real-time voice gateway
#[derive(Parser, Debug)]
#[command(name = "voxgate", version, about = "Real-time voice gateway")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log verbosity (-v: info, -vv: debug, -vvv: trace). RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Timeout for remote capability requests. Examples: 30s, 2m
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
}

/// Parse a timeout string.
///
/// Bare numbers are seconds; anything else goes through `humantime`
/// (`30s`, `2m`, `1m30s`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be positive".to_string());
    }
    Ok(duration)
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the WebSocket gateway
    Serve {
        /// Listen address (default: 127.0.0.1:8765)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Decode, segment and transcribe one audio file, printing the text
    Transcribe {
        /// Audio file (WAV, raw PCM, WebM/Opus or u-law depending on --platform)
        file: PathBuf,

        /// Input format: web, telephony or raw
        #[arg(long, value_name = "PLATFORM", default_value = "raw", value_parser = parse_platform)]
        platform: Platform,

        /// Language code (default: configured language)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Recognition hint, e.g. expected names or vocabulary
        #[arg(long, value_name = "TEXT")]
        prompt: Option<String>,
    },

    /// View and initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and environment)
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["voxgate", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_transcribe_defaults_to_raw() {
        let cli = Cli::try_parse_from(["voxgate", "transcribe", "clip.wav"]).unwrap();
        match cli.command {
            Commands::Transcribe {
                file,
                platform,
                language,
                prompt,
            } => {
                assert_eq!(file, PathBuf::from("clip.wav"));
                assert_eq!(platform, Platform::Raw);
                assert!(language.is_none());
                assert!(prompt.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_transcribe_accepts_twilio_alias() {
        let cli = Cli::try_parse_from([
            "voxgate",
            "transcribe",
            "call.ulaw",
            "--platform",
            "twilio",
            "--language",
            "en-US",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Transcribe {
                platform: Platform::Telephony,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_unknown_platform() {
        let result = Cli::try_parse_from(["voxgate", "transcribe", "a.wav", "--platform", "fax"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "voxgate", "config", "show", "-vv", "--log-json", "--timeout", "1m30s",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        assert_eq!(cli.timeout, Some(Duration::from_secs(90)));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn parse_timeout_formats() {
        assert_eq!(parse_timeout("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_timeout("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_timeout(" 10s "), Ok(Duration::from_secs(10)));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn parse_config_init_force() {
        let cli = Cli::try_parse_from(["voxgate", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}

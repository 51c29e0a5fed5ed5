use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxgate::app::{build_coordinator, transcribe_file};
use voxgate::cli::{Cli, Commands, ConfigAction};
use voxgate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = load_config(cli.config.as_deref(), cli.timeout)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            voxgate::server::serve(config).await?;
        }
        Commands::Transcribe {
            file,
            platform,
            language,
            prompt,
        } => {
            let config = load_config(cli.config.as_deref(), cli.timeout)?;
            config.validate()?;
            let language = language.unwrap_or_else(|| config.stt.language.clone());
            let coordinator = build_coordinator(&config)?;
            let result = transcribe_file(
                &coordinator,
                &file,
                platform,
                &language,
                prompt.as_deref(),
            )
            .await
            .with_context(|| format!("failed to transcribe {}", file.display()))?;
            if result.is_empty() {
                eprintln!("{}", "No transcript".yellow());
                std::process::exit(1);
            }
            println!("{}", result.text);
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref(), cli.timeout)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxgate",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` count picks the level.
fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_ansi(std::io::stderr().is_terminal()).init();
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default path, falling back to built-in defaults
/// 3. Environment variable overrides on top
/// 4. `--timeout` on top of everything
fn load_config(custom_path: Option<&Path>, timeout: Option<Duration>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    Ok(match timeout {
        Some(timeout) => config.with_request_timeout(timeout),
        None => config,
    })
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path, timeout)?;
            print!("{}", config.to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("{}", format!("Warning: {e}").yellow());
            }
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&config_path, Config::default().to_toml()?)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
            println!("{} {}", "Wrote".green(), config_path.display());
        }
    }
    Ok(())
}

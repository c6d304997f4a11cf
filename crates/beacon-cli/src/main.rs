//! Beacon CLI - send analytics events and manage the local event cache.

mod commands;
mod output;

use beacon_config_and_utils::{init_logging, LogFormat, DEFAULT_LOG_LEVEL};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Beacon CLI - Deliver analytics events to the collector.
#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Send analytics events and manage the local event cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormatArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send one event and wait for its outcome
    Send {
        /// Collection name
        collection: String,
        /// JSON payload
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        payload: Option<String>,
        /// Read the JSON payload from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Seconds to wait for the outcome
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Resend cached events until the cache is empty
    Flush {
        /// Give up after this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Show cache location and pending events
    Status,

    /// Show the effective settings
    Config {
        /// Write the effective settings to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .clone()
        .or_else(commands::configured_log_level)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    init_logging(&log_level, cli.log_format.into());

    let result = match cli.command {
        Commands::Send {
            collection,
            payload,
            file,
            timeout,
        } => {
            commands::send(
                &collection,
                payload.as_deref(),
                file.as_deref(),
                timeout,
                &cli.format,
            )
            .await
        }
        Commands::Flush { timeout } => commands::flush(timeout, &cli.format).await,
        Commands::Status => commands::status(&cli.format),
        Commands::Config { save } => commands::config(save, &cli.format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_takes_inline_payload() {
        let cli = Cli::try_parse_from(["beacon", "send", "clicks", r#"{"x":1}"#]).unwrap();
        match cli.command {
            Commands::Send {
                collection,
                payload,
                file,
                timeout,
            } => {
                assert_eq!(collection, "clicks");
                assert_eq!(payload.as_deref(), Some(r#"{"x":1}"#));
                assert!(file.is_none());
                assert_eq!(timeout, 30);
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn send_requires_exactly_one_payload_source() {
        assert!(Cli::try_parse_from(["beacon", "send", "clicks"]).is_err());
        assert!(Cli::try_parse_from([
            "beacon", "send", "clicks", "{}", "--file", "event.json"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["beacon", "send", "clicks", "--file", "event.json"]).is_ok());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "beacon",
            "status",
            "--format",
            "json",
            "--log-format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.format, output::OutputFormat::Json));
        assert!(matches!(cli.log_format, LogFormatArg::Json));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}

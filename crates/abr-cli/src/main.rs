mod backfill;
mod config;
mod upload;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{CommonArgs, Settings};
use std::env;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "abr")]
#[command(about = "Counts how often the assistant tells you you're absolutely right", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recount every day from the full conversation history
    Backfill(backfill::BackfillArgs),
    /// Poll for new records and keep the counters live
    Watch(watch::WatchArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let settings = Settings::from_env(&cli.common);
    match cli.command {
        Commands::Backfill(args) => backfill::run(&settings, &args).await,
        Commands::Watch(args) => watch::run(&settings, &args).await,
    }
}

fn init_logging() {
    let level = env::var("ABR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "abr",
            "backfill",
            "--json",
            "--projects",
            "/tmp/logs",
            "--pattern-right",
            "",
        ])
        .expect("parse args");

        assert_eq!(
            cli.common.projects.as_deref(),
            Some(std::path::Path::new("/tmp/logs"))
        );
        assert_eq!(cli.common.pattern_right.as_deref(), Some(""));
        match cli.command {
            Commands::Backfill(args) => {
                assert!(args.json);
                assert!(!args.no_save);
            }
            Commands::Watch(_) => panic!("expected backfill"),
        }
    }

    #[test]
    fn watch_accepts_interval_and_upload() {
        let cli = Cli::try_parse_from([
            "abr",
            "watch",
            "--interval",
            "30",
            "--upload",
            "https://collector.example",
        ])
        .expect("parse args");

        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.interval, Some(30));
                assert_eq!(args.upload.as_deref(), Some("https://collector.example"));
                assert!(args.secret.is_none());
            }
            Commands::Backfill(_) => panic!("expected watch"),
        }
    }
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "transcriber",
    about = "Channel Transcriber - Transcribe every video of a YouTube channel, resumably",
    version,
    long_about = "Downloads the audio of each video in a channel, converts it to mono 16 kHz PCM, transcribes it with a speech-to-text service and publishes the text as HTML. Progress is tracked in a CSV ledger so interrupted runs pick up where they stopped."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file (defaults to ./config.yaml or the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Overrides shared by the commands that touch the ledger
#[derive(Args, Debug, Clone, Default)]
pub struct LedgerArgs {
    /// Ledger CSV file (overrides app.ledger_path)
    #[arg(long, value_name = "FILE")]
    pub ledger: Option<PathBuf>,
}

/// Overrides for the catalog source
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Channel URL, @handle or UC... id (overrides youtube.channel)
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// YouTube Data API key (overrides youtube.api_key)
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub youtube_api_key: Option<String>,
}

/// Overrides for the speech backend
#[derive(Args, Debug, Clone, Default)]
pub struct SpeechArgs {
    /// Google Speech-to-Text API key (overrides speech.google.api_key)
    #[arg(long, env = "GOOGLE_SPEECH_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub speech_api_key: Option<String>,

    /// Language code for transcription (overrides speech.language)
    #[arg(short, long, value_name = "LANG")]
    pub language: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh the catalog and transcribe the selected videos
    Run {
        /// Process every offered video without prompting
        #[arg(long)]
        all: bool,

        /// Offer videos that already have a transcript as well
        #[arg(long)]
        redo: bool,

        /// Work on the stored ledger without fetching the catalog
        #[arg(long)]
        offline: bool,

        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        speech: SpeechArgs,
    },

    /// Fetch the catalog and merge it into the ledger without transcribing
    Refresh {
        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Transcribe a single video by id
    Transcribe {
        /// Video id
        #[arg(value_name = "VIDEO_ID")]
        id: String,

        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        speech: SpeechArgs,
    },

    /// Show the ledger rows and status counts
    Ledger {
        #[command(flatten)]
        ledger: LedgerArgs,
    },

    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["transcriber", "run", "--all", "--offline", "--ledger", "v.csv"]);
        match cli.command {
            Commands::Run {
                all,
                redo,
                offline,
                ledger,
                ..
            } => {
                assert!(all);
                assert!(!redo);
                assert!(offline);
                assert_eq!(ledger.ledger, Some(PathBuf::from("v.csv")));
            }
            _ => panic!("expected run"),
        }
    }
}

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channel_transcriber::batch::{self, BatchRunner, IncludeAll, LinePrompt, SelectionPolicy};
use channel_transcriber::catalog::youtube::YoutubeCatalog;
use channel_transcriber::cli::{CatalogArgs, Cli, Commands, LedgerArgs, SpeechArgs};
use channel_transcriber::config::{Config, SpeechBackend};
use channel_transcriber::stages::{
    AwsTranscriber, FfmpegTranscoder, GoogleSpeechTranscriber, HtmlRenderer, Transcriber,
    YtDlpFetcher,
};
use channel_transcriber::{output, utils, BatchSummary, CatalogItem, ItemPipeline, Ledger};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path).await?;

    match cli.command {
        Commands::Run {
            all,
            redo,
            offline,
            ledger,
            catalog,
            speech,
        } => {
            apply_ledger_args(&mut config, &ledger);
            apply_catalog_args(&mut config, &catalog);
            apply_speech_args(&mut config, &speech);

            config.validate_speech()?;
            if !offline {
                config.validate_catalog()?;
            }
            warn_missing_tools(&config).await;

            let pipeline = build_pipeline(&config, !cli.quiet).await;
            let policy: Box<dyn SelectionPolicy> = if all {
                Box::new(IncludeAll)
            } else {
                Box::new(LinePrompt::stdio())
            };

            let mut runner = BatchRunner::new(&pipeline, policy, &config.app.ledger_path)
                .with_persist(config.app.persist)
                .with_redo(redo);

            let (_, summary) = if offline {
                runner.run_offline().await?
            } else {
                let source = youtube_catalog(&config);
                runner.run(&source).await?
            };

            output::print_summary(&summary);
        }
        Commands::Refresh { ledger, catalog } => {
            apply_ledger_args(&mut config, &ledger);
            apply_catalog_args(&mut config, &catalog);
            config.validate_catalog()?;

            let source = youtube_catalog(&config);
            let (ledger, stats) = batch::refresh_ledger(&source, &config.app.ledger_path).await?;

            println!(
                "Ledger {} now has {} items ({} added, {} refreshed)",
                config.app.ledger_path.display(),
                ledger.len(),
                stats.added,
                stats.refreshed
            );
        }
        Commands::Transcribe { id, ledger, speech } => {
            apply_ledger_args(&mut config, &ledger);
            apply_speech_args(&mut config, &speech);
            config.validate_speech()?;
            warn_missing_tools(&config).await;

            let mut ledger = Ledger::load(&config.app.ledger_path)?;
            let item = ledger
                .get(&id)
                .cloned()
                .unwrap_or_else(|| CatalogItem::new(id.clone(), id.clone(), "", Utc::now()));

            let pipeline = build_pipeline(&config, !cli.quiet).await;
            tracing::info!("Starting transcription for {}", item.canonical_url());
            let outcome = pipeline.process(&item).await;
            output::report_item(&item, &outcome);

            match ledger.get_mut(&id) {
                Some(row) => {
                    batch::record_outcome(row, &outcome, &mut BatchSummary::default());
                    ledger.save(&config.app.ledger_path)?;
                }
                None => tracing::info!("{} is not in the ledger, nothing recorded", id),
            }

            match outcome {
                Ok(processed) => println!(
                    "Transcript saved to: {}",
                    pipeline
                        .renderer()
                        .output_dir()
                        .join(&processed.transcript_link)
                        .display()
                ),
                Err(failure) => anyhow::bail!("Transcription of {} failed: {}", id, failure),
            }
        }
        Commands::Ledger { ledger } => {
            apply_ledger_args(&mut config, &ledger);
            let ledger = Ledger::load(&config.app.ledger_path)?;
            output::print_ledger(&ledger);
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", config_path.display());
                println!("Run with --show to print the effective settings.");
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "channel_transcriber=debug"
    } else {
        "channel_transcriber=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn apply_ledger_args(config: &mut Config, args: &LedgerArgs) {
    if let Some(path) = &args.ledger {
        config.app.ledger_path = path.clone();
    }
}

fn apply_catalog_args(config: &mut Config, args: &CatalogArgs) {
    if let Some(channel) = &args.channel {
        config.youtube.channel = channel.clone();
    }
    if let Some(key) = &args.youtube_api_key {
        config.youtube.api_key = key.clone();
    }
}

fn apply_speech_args(config: &mut Config, args: &SpeechArgs) {
    if let Some(key) = &args.speech_api_key {
        config.speech.google.api_key = key.clone();
    }
    if let Some(language) = &args.language {
        config.speech.language = language.clone();
    }
}

fn youtube_catalog(config: &Config) -> YoutubeCatalog {
    YoutubeCatalog::new(
        &config.youtube.base_url,
        &config.youtube.api_key,
        &config.youtube.channel,
    )
}

async fn warn_missing_tools(config: &Config) {
    // Non-fatal: the stage itself reports a missing tool per item
    let missing = utils::check_dependencies(&config.app.yt_dlp_path, &config.app.ffmpeg_path).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

async fn build_pipeline(config: &Config, show_progress: bool) -> ItemPipeline {
    let transcriber: Box<dyn Transcriber> = match config.speech.backend {
        SpeechBackend::Google => Box::new(GoogleSpeechTranscriber::new(
            &config.speech.google.endpoint,
            &config.speech.google.api_key,
            &config.speech.language,
            config.speech.sample_rate,
        )),
        SpeechBackend::Aws => Box::new(
            AwsTranscriber::new(
                &config.speech.aws,
                &config.speech.language,
                config.speech.sample_rate,
            )
            .await,
        ),
    };

    ItemPipeline::new(
        Box::new(YtDlpFetcher::new(config.app.yt_dlp_path.clone())),
        Box::new(FfmpegTranscoder::new(
            config.app.ffmpeg_path.clone(),
            config.speech.sample_rate,
        )),
        transcriber,
        HtmlRenderer::new(config.app.output_dir.clone()),
        config.app.work_dir.clone(),
    )
    .with_stage_timeout(config.stage_timeout())
    .with_keep_audio(config.app.keep_audio)
    .with_progress(show_progress)
}

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mangabox::api::{self, AppState, models::LivenessResponse};
use mangabox::config::Config;
use mangabox::observability::init_tracing;
use mangabox::models::ChapterStatus;
use mangabox::pipeline::{ChapterRequest, ScrapeRequest};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if let Commands::Health = cli.command {
        println!("{}", serde_json::to_string(&LivenessResponse::ok())?);
        return Ok(());
    }

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Serve => api::run(config).await?,
        Commands::Scrape(args) => {
            let state = AppState::from_config(config)?;
            let request = ScrapeRequest::builder()
                .maybe_work_url(args.url)
                .maybe_work_id(args.work_id)
                .maybe_source_id(args.source)
                .maybe_max_chapters(args.max_chapters)
                .build();

            cancel_on_interrupt(state.shutdown.clone());
            let report = state
                .orchestrator
                .run(&request, state.shutdown.child_token())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_aborted() {
                std::process::exit(2);
            }
        }
        Commands::Chapter(args) => {
            let state = AppState::from_config(config)?;
            let request = ChapterRequest::builder()
                .work_id(args.work_id)
                .chapter_url(args.url)
                .chapter_number(args.number)
                .maybe_source_id(args.source)
                .build();

            cancel_on_interrupt(state.shutdown.clone());
            let report = state
                .orchestrator
                .run_chapter(&request, state.shutdown.child_token())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status != ChapterStatus::Complete {
                std::process::exit(2);
            }
        }
        Commands::ListWorks(args) => {
            let state = AppState::from_config(config)?;
            let works = state
                .orchestrator
                .list_works(&args.source, args.page, state.shutdown.child_token())
                .await?;
            for url in works {
                println!("{url}");
            }
        }
        Commands::Health => {}
    }

    Ok(())
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing in-flight pages");
            cancel.cancel();
        }
    });
}

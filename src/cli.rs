use clap::{Parser, Subcommand};
use mangabox::models::ChapterNumber;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mangabox")]
#[command(about = "Polite manga scraper: fetch, normalize, dedup, store", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MANGABOX_CONFIG or config/mangabox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP invocation server
    Serve,
    /// Scrape one work and print the run report as JSON
    Scrape(ScrapeArgs),
    /// Scrape one chapter of a catalogued work, leaving its cursor alone
    Chapter(ChapterArgs),
    /// Print work URLs from a source's latest-updates listing
    ListWorks(ListWorksArgs),
    /// Print liveness without touching any backend
    Health,
}

#[derive(clap::Args, Debug)]
pub struct ScrapeArgs {
    /// Work page URL on the source site
    #[arg(long)]
    pub url: Option<String>,

    /// Id of a work already in the catalog
    #[arg(long)]
    pub work_id: Option<String>,

    /// Source id; inferred from the URL when omitted
    #[arg(long)]
    pub source: Option<String>,

    /// Stop after this many chapters
    #[arg(long)]
    pub max_chapters: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct ChapterArgs {
    /// Id of a work already in the catalog
    #[arg(long)]
    pub work_id: String,

    /// Chapter reader URL on the source site
    #[arg(long)]
    pub url: String,

    /// Chapter number, e.g. 12 or 12.5
    #[arg(long)]
    pub number: ChapterNumber,

    /// Source id; defaults to the work's recorded source
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListWorksArgs {
    /// Source id, e.g. mangakakalot
    #[arg(long)]
    pub source: String,

    /// Listing page, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

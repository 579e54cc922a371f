use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gale::config::Config;
use gale::scheduler::Scheduler;
use gale::storage::ArticleStore;

#[derive(Parser)]
#[command(
    name = "gale",
    version,
    about = "Multi-source news crawler with dedup clustering and story ranking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Path to a TOML config file (environment variables otherwise)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the given publishers once
    Crawl {
        /// Comma-separated publisher tokens (e.g. us,uk,cnn,npr)
        #[arg(short, long)]
        publishers: String,

        /// Maximum articles per publisher
        #[arg(short = 'n', long, default_value = "25")]
        max_articles: usize,

        /// Keep only articles in this language
        #[arg(short, long)]
        language: Option<String>,

        /// Concurrent source workers (config default when omitted)
        #[arg(long)]
        workers: Option<usize>,

        /// Label recorded on the crawl run row
        #[arg(long, default_value = "crawl")]
        run_label: String,
    },

    /// Recompute duplicate clusters
    Dedup {
        /// Rebuild all clusters from scratch instead of an incremental pass
        #[arg(long, default_value = "false")]
        full: bool,
    },

    /// Print a page of ranked stories
    Stories {
        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,

        /// Only stories whose lead article has this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Print a page of ranked articles (MMR-diversified flat list)
    Articles {
        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,
    },

    /// Run crawl + enrich + dedup cycles on an interval
    Schedule {
        /// Comma-separated publisher tokens
        #[arg(short, long)]
        publishers: String,

        /// Keep only articles in this language
        #[arg(short, long)]
        language: Option<String>,

        /// Run a single cycle then exit
        #[arg(long, default_value = "false")]
        run_once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(std::path::Path::new(path))?,
        None => Config::from_env()?,
    };
    config.validate()?;

    if let Err(err) = gale::metrics::init_metrics() {
        tracing::warn!(error = %err, "metrics initialization failed, continuing without");
    }

    let store = Arc::new(ArticleStore::new(&config.database.sqlite_path)?);

    match cli.command {
        Commands::Crawl {
            publishers,
            max_articles,
            language,
            workers,
            run_label,
        } => {
            let tokens = split_tokens(&publishers);
            let workers = workers.unwrap_or(config.fetch.workers);
            tracing::info!(
                publishers = %publishers,
                max_articles,
                workers,
                "starting crawl command"
            );

            let ingestor = gale::ingest::Ingestor::new(Arc::clone(&store), &config.fetch)?;
            let result = ingestor
                .crawl_once(&tokens, max_articles, language.as_deref(), workers, &run_label)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Dedup { full } => {
            tracing::info!(full, "starting dedup command");
            let changed = if full {
                gale::dedup::run_full_dedup(&store, &config.dedup)?
            } else {
                gale::dedup::run_dedup_all(&store, &config.dedup)?
            };
            println!("{changed} articles changed cluster");
        }

        Commands::Stories {
            page,
            page_size,
            category,
        } => {
            let stories = gale::ranking::story::ranked_stories(
                &store,
                &config.ranking,
                &config.dedup,
                page,
                page_size,
                category.as_deref(),
            )?;
            println!("{}", serde_json::to_string_pretty(&stories)?);
        }

        Commands::Articles { page, page_size } => {
            let (articles, total) =
                gale::ranking::story::ranked_articles(&store, &config.ranking, page, page_size)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "articles": articles,
                    "total": total,
                }))?
            );
        }

        Commands::Schedule {
            publishers,
            language,
            run_once,
        } => {
            let tokens = split_tokens(&publishers);
            tracing::info!(publishers = %publishers, run_once, "starting schedule command");

            let scheduler = Scheduler::new(Arc::clone(&store), config)?;
            if run_once {
                let report = scheduler.run_cycle(&tokens, language.as_deref()).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                scheduler.run_loop(&tokens, language.as_deref()).await;
            }
        }
    }

    Ok(())
}

fn split_tokens(publishers: &str) -> Vec<String> {
    publishers
        .split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("gale=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("gale=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

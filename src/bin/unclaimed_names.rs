//! unclaimed-names CLI
//!
//! Usage:
//!   cargo run --bin unclaimed-names -- migrate
//!   cargo run --bin unclaimed-names -- ingest --min-frequency 100
//!   cargo run --bin unclaimed-names -- top --limit 20
//!   cargo run --bin unclaimed-names -- resolve "the beatles"
//!   cargo run --bin unclaimed-names -- generate --limit 10
//!   cargo run --bin unclaimed-names -- serve --bind 127.0.0.1:3000
//!
//! Configuration comes from the environment (a `.env` file is honoured):
//! `DATABASE_URL`, `CORPUS_*`, `INGEST_*`, `SPOTIFY_*`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unclaimed_names::authority::SpotifyClient;
use unclaimed_names::candidates::CandidateGenerator;
use unclaimed_names::config::AppConfig;
use unclaimed_names::corpus::CorpusFetcher;
use unclaimed_names::ingest::{Ingestor, ShardOutcome};
use unclaimed_names::resolver::EntityResolver;
use unclaimed_names::store::{NameStore, PgStore};

#[derive(Parser, Debug)]
#[command(name = "unclaimed-names")]
#[command(about = "Find frequent English words nobody has named a band after yet")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Download and ingest the configured corpus shards
    Ingest {
        /// Minimum summed frequency for a word to be stored
        #[arg(long, short = 'm')]
        min_frequency: Option<u64>,
    },

    /// Show the most frequent stored words
    Top {
        #[arg(long, short = 'l', default_value_t = 20)]
        limit: usize,
    },

    /// Look a single name up against the authority service
    Resolve {
        name: String,
    },

    /// Evaluate unclaimed words and record the ones nobody has taken
    Generate {
        #[arg(long, short = 'l', default_value_t = 10)]
        limit: usize,
    },

    /// Run the HTTP server
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unclaimed_names=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let pg = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    if let Command::Migrate = args.command {
        pg.migrate().await.context("Failed to apply migrations")?;
        println!("Migrations applied");
        return Ok(());
    }

    let store: Arc<dyn NameStore> = Arc::new(pg);
    let resolver = || -> Result<Arc<EntityResolver>> {
        let search_limit = config.authority.search_limit;
        let client = SpotifyClient::new(config.authority.clone())?;
        Ok(Arc::new(EntityResolver::new(
            Arc::new(client),
            store.clone(),
            search_limit,
        )))
    };
    let ingestor = || -> Result<Ingestor> {
        let fetcher = CorpusFetcher::new(config.corpus.clone())?;
        Ok(Ingestor::new(fetcher, store.clone(), config.ingest.clone()))
    };

    match args.command {
        Command::Migrate => {}

        Command::Ingest { min_frequency } => {
            let ingestor = ingestor()?;
            let report = match min_frequency {
                Some(min) => ingestor.run(min).await?,
                None => ingestor.run_default().await?,
            };
            for outcome in &report.shards {
                match outcome {
                    ShardOutcome::Skipped { filename, .. } => {
                        println!("{filename}: already processed")
                    }
                    ShardOutcome::Processed {
                        filename,
                        lines_read,
                        skipped_lines,
                        committed,
                        ..
                    } => println!(
                        "{filename}: {lines_read} lines, {skipped_lines} skipped, {committed} words committed"
                    ),
                }
            }
        }

        Command::Top { limit } => {
            for record in store.top_words(limit).await? {
                println!("{:>12}  {}", record.frequency, record.word);
            }
        }

        Command::Resolve { name } => match resolver()?.resolve_name(&name).await? {
            Some(entity) => println!("{} (popularity {})", entity.name, entity.popularity),
            None => println!("No entity named {name:?}"),
        },

        Command::Generate { limit } => {
            let generator = CandidateGenerator::new(store.clone(), resolver()?);
            let report = generator.run(limit).await?;
            for word in &report.rejected {
                println!("+ {word}");
            }
            for entity in &report.confirmed {
                println!("- {} (popularity {})", entity.name, entity.popularity);
            }
            if !report.failed.is_empty() {
                println!("failed: {}", report.failed.join(", "));
            }
        }

        #[cfg(feature = "server")]
        Command::Serve { bind } => {
            use unclaimed_names::api::{create_router, AppState};

            let state = AppState::new(store.clone(), Arc::new(ingestor()?), resolver()?);
            let app = create_router(state);

            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            tracing::info!(addr = %bind, "Server listening");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

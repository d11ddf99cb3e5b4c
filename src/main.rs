use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use testscore::analysis::{analyze, AnalysisRequest};
use testscore::charts::ChartStore;
use testscore::config::{AppConfig, CHARTS_WEB_PREFIX};
use testscore::db;
use testscore::export::{export, ExportFormat};
use testscore::metrics::round2;
use testscore::session::SessionStore;
use testscore::web::{self, AppState};

#[derive(Parser)]
#[command(name = "testscore-analyzer")]
#[command(about = "Pre/post test score analysis with narrative, charts and exports", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web application
    Serve,
    /// Create or upgrade the session schema
    InitDb,
    /// Analyze a file without the server and optionally export a report
    Analyze {
        file: PathBuf,
        #[arg(long)]
        disaggregate: bool,
        /// word, pdf or excel
        #[arg(long)]
        format: Option<String>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Print the full result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Serve => {
            let sessions = match config.database_url.as_deref() {
                Some(url) => SessionStore::postgres(connect(url).await?, config.session_ttl()),
                None => {
                    tracing::info!(
                        max_sessions = config.max_sessions,
                        "no database configured; sessions are kept in memory"
                    );
                    SessionStore::in_memory_with(config.session_ttl(), config.max_sessions)
                }
            };
            web::serve(AppState::new(config, sessions)).await?;
        }
        Commands::InitDb => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to initialize the session schema")?;
            let pool = connect(url).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Analyze {
            file,
            disaggregate,
            format,
            out,
            json,
        } => {
            let format = format
                .as_deref()
                .map(|slug| {
                    ExportFormat::from_slug(slug)
                        .with_context(|| format!("unknown export format '{slug}'"))
                })
                .transpose()?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let source_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .context("input path has no usable file name")?;

            let charts = ChartStore::new(config.charts_dir(), CHARTS_WEB_PREFIX);
            let request = AnalysisRequest {
                source_name,
                bytes: &bytes,
                disaggregate,
            };
            let result = analyze(&request, config.limits(), &charts)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.narrative);
                for notice in &result.notices {
                    println!("- {notice}");
                }
                println!(
                    "N={} mean pre {:.2}, mean post {:.2}, gain {:.2}",
                    result.overall.count,
                    round2(result.overall.mean_pre),
                    round2(result.overall.mean_post),
                    round2(result.overall.mean_gain)
                );
                for chart in &result.charts {
                    println!("Chart written to {}.", charts.path_of(chart).display());
                }
            }

            if let Some(format) = format {
                let document = export(&result, format, &charts)?;
                std::fs::create_dir_all(&out)?;
                let path = out.join(&document.file_name);
                std::fs::write(&path, &document.bytes)?;
                println!("Report written to {}.", path.display());
            }
        }
    }

    Ok(())
}

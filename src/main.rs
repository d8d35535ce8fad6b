use admiscraper::{
    config::AppConfig,
    enrich,
    pipeline::{self, SessionMeta},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Extract admissible candidates from exam-result PDFs and look up their contacts"
)]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the admissible candidates of a results PDF to CSV
    ExtractAdmissibles {
        #[arg(long)]
        pdf_path: PathBuf,
        #[arg(long)]
        output_csv: PathBuf,
        #[arg(long)]
        departement: String,
        #[arg(long)]
        session_date: String,
    },
    /// Add phone, email and their provenance to a candidate CSV
    Enrich {
        #[arg(long)]
        input_csv: PathBuf,
        #[arg(long)]
        output_csv: PathBuf,
        /// Rows to look up; defaults to the configured limit
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Print the version and the effective configuration
    Info,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "debug,html5ever=info,selectors=info"
    } else {
        "info"
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::ExtractAdmissibles {
            pdf_path,
            output_csv,
            departement,
            session_date,
        } => {
            let meta = SessionMeta::new(&departement, &session_date)?;
            let extraction = cfg.extraction.clone();
            let out = output_csv.clone();

            // lopdf parsing is CPU-bound; keep it off the async workers
            let (set, report) = tokio::task::spawn_blocking(move || {
                pipeline::extract_admissibles(&pdf_path, &out, &meta, &extraction)
            })
            .await
            .context("extraction task failed")??;

            for w in &report.warnings {
                warn!("{w}");
            }
            let table = set.to_table();
            for (category, count) in table.count_by("categorie") {
                info!(category = %category, count, "admissible by category");
            }
            info!(
                admissible = set.len(),
                pages = report.pages,
                skipped_pages = report.pages_skipped(),
                output = %output_csv.display(),
                "done"
            );
        }
        Command::Enrich {
            input_csv,
            output_csv,
            max_rows,
        } => {
            let stats = enrich::enrich_csv(&input_csv, &output_csv, &cfg.enrichment, max_rows).await?;
            let found = stats.get(&enrich::EnrichmentStatus::Found).copied().unwrap_or(0);
            info!(found, output = %output_csv.display(), "done");
        }
        Command::Info => {
            let mut shown = cfg;
            if shown.enrichment.hunter_api_key.is_some() {
                shown.enrichment.hunter_api_key = Some("********".into());
            }
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            println!("providers: registry, directory, hunter");
            print!("{}", serde_yaml::to_string(&shown)?);
        }
    }
    Ok(())
}

mod error;
mod fetch;
mod parser;
mod settings;
mod sql;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use settings::Settings;
use sql::Dialect;

#[derive(Parser)]
#[command(
    name = "region_sql",
    about = "Convert published administrative-division tables into SQL"
)]
struct Cli {
    /// Settings file (default: ./region.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch configured snapshots and write region_<date>.sql for each
    Run {
        /// Only these snapshot dates (e.g. 2017-08); repeatable
        #[arg(long)]
        only: Vec<String>,
    },
    /// Convert saved HTML pages into SQL files
    Convert {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output directory (default: settings output_dir)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Override the configured SQL dialect
        #[arg(long, value_enum)]
        dialect: Option<Dialect>,
    },
    /// Print the province/city/area tree of a saved page as JSON
    Tree { file: PathBuf },
    /// List configured snapshots
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run { only } => {
            let sources: Vec<_> = settings
                .sources
                .iter()
                .filter(|s| only.is_empty() || only.contains(&s.date))
                .cloned()
                .collect();
            if sources.is_empty() {
                println!("No matching sources. Check 'sources' or --only.");
                return Ok(());
            }

            println!("Fetching {} snapshots into {:?}...", sources.len(), settings.output_dir);
            let stats = fetch::run_sources(&settings, sources).await?;
            println!(
                "Done: {} snapshots ({} ok, {} failed).",
                stats.total,
                stats.ok,
                stats.failed.len()
            );
            for (date, reason) in &stats.failed {
                println!("  {}: {}", date, reason);
            }
            if stats.failed.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} snapshots failed", stats.failed.len()))
            }
        }
        Commands::Convert {
            files,
            out_dir,
            dialect,
        } => {
            if let Some(d) = dialect {
                settings.dialect = d;
            }
            let out_dir = out_dir.unwrap_or_else(|| settings.output_dir.clone());
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {:?}", out_dir))?;
            convert_files(&settings, &files, &out_dir)
        }
        Commands::Tree { file } => {
            let html = read_page(&file)?;
            let records = parser::cells::extract(&html)?;
            let tree = parser::hierarchy::build(&records, &settings.hierarchy_options())?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
            Ok(())
        }
        Commands::Sources => {
            for s in &settings.sources {
                println!("{:<8} {:<20} {}", s.date, s.file_name(), s.url);
            }
            println!("\n{} sources | output: {:?}", settings.sources.len(), settings.output_dir);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Convert local pages in parallel; one bad page does not stop the others.
fn convert_files(settings: &Settings, files: &[PathBuf], out_dir: &Path) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let tree_opts = settings.hierarchy_options();
    let sql_opts = settings.sql_options();

    let results: Vec<(&PathBuf, Result<usize>)> = files
        .par_iter()
        .map(|file| {
            let res = (|| -> Result<usize> {
                let html = read_page(file)?;
                let conversion = parser::process_page(&html, &tree_opts, &sql_opts)?;
                let target = out_dir.join(output_name(file));
                std::fs::write(&target, &conversion.sql)
                    .with_context(|| format!("failed to write {:?}", target))?;
                Ok(conversion.rows.len())
            })();
            pb.inc(1);
            (file, res)
        })
        .collect();
    pb.finish_and_clear();

    let mut failed = 0;
    for (file, res) in &results {
        match res {
            Ok(rows) => info!(file = ?file, rows, "Converted page"),
            Err(e) => {
                failed += 1;
                warn!("Failed to convert {:?}: {:#}", file, e);
            }
        }
    }

    println!(
        "Converted {} of {} pages into {:?}.",
        results.len() - failed,
        results.len(),
        out_dir
    );
    if failed > 0 {
        bail!("{} pages failed", failed);
    }
    Ok(())
}

fn read_page(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))
}

/// `pages/2017-08.html` → `region_2017_08.sql`
fn output_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().replace('-', "_"))
        .unwrap_or_else(|| "page".to_string());
    if stem.starts_with("region_") {
        format!("{}.sql", stem)
    } else {
        format!("region_{}.sql", stem)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

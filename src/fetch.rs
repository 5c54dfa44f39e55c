use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::parser;
use crate::parser::hierarchy::HierarchyOptions;
use crate::settings::{Settings, Source};
use crate::sql::SqlOptions;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Run stats returned after completion.
pub struct RunStats {
    pub total: usize,
    pub ok: usize,
    pub failed: Vec<(String, String)>,
}

struct Fetched {
    source: Source,
    body: Result<String>,
    latency_ms: u128,
}

/// Download every source concurrently and convert each page as it arrives.
/// A failing page is logged and counted; the remaining pages still run.
pub async fn run_sources(settings: &Settings, sources: Vec<Source>) -> Result<RunStats> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("region_sql/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));
    let total = sources.len();

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("failed to create {:?}", settings.output_dir))?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Fetched>(settings.concurrency * 2);

    for source in sources {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let start = Instant::now();
            let body = fetch_with_retry(&client, &source).await;
            let latency_ms = start.elapsed().as_millis();
            let _ = tx
                .send(Fetched {
                    source,
                    body,
                    latency_ms,
                })
                .await;
        });
    }

    // rx closes once every spawned task has dropped its sender
    drop(tx);

    let tree_opts = settings.hierarchy_options();
    let sql_opts = settings.sql_options();
    let mut ok = 0usize;
    let mut failed = Vec::new();

    while let Some(fetched) = rx.recv().await {
        let date = fetched.source.date.clone();
        pb.set_message(date.clone());

        let outcome = match fetched.body {
            Ok(html) => {
                info!(
                    date = %date,
                    bytes = html.len(),
                    latency_ms = fetched.latency_ms as u64,
                    "Fetched page"
                );
                let out_dir = &settings.output_dir;
                convert_and_write(&html, &fetched.source, out_dir, &tree_opts, &sql_opts).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(path) => {
                ok += 1;
                info!(date = %date, path = ?path, "Wrote snapshot");
            }
            Err(e) => {
                warn!("Snapshot {} failed: {:#}", date, e);
                failed.push((date, format!("{:#}", e)));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Processed {} snapshots ({} ok, {} failed)", total, ok, failed.len());

    Ok(RunStats { total, ok, failed })
}

async fn convert_and_write(
    html: &str,
    source: &Source,
    out_dir: &Path,
    tree_opts: &HierarchyOptions,
    sql_opts: &SqlOptions,
) -> Result<PathBuf> {
    let conversion = parser::process_page(html, tree_opts, sql_opts)?;
    let path = out_dir.join(source.file_name());
    tokio::fs::write(&path, conversion.sql)
        .await
        .with_context(|| format!("failed to write {:?}", path))?;
    info!(date = %source.date, rows = conversion.rows.len(), "Converted snapshot");
    Ok(path)
}

async fn fetch_with_retry(client: &Client, source: &Source) -> Result<String> {
    let mut attempt = 0;
    loop {
        match fetch_one(client, &source.url).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Fetch of {} failed (attempt {}/{}): {}, backing off {:.1}s",
                    source.date,
                    attempt + 1,
                    MAX_RETRIES,
                    e,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e.context(format!("fetching {}", source.url))),
        }
    }
}

async fn fetch_one(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        bail!(HttpStatus(status));
    }
    // decodes using the charset from Content-Type
    Ok(response.text().await?)
}

#[derive(Debug)]
struct HttpStatus(StatusCode);

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.0)
    }
}

impl std::error::Error for HttpStatus {}

fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(HttpStatus(status)) = err.downcast_ref::<HttpStatus>() {
        return *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    }
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_timeout() || e.is_connect())
}

// ── Tests ──

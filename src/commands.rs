use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use indicatif::HumanBytes;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use slicedl::{CancellationToken, DownloadJob, DownloadReport, EventSink, JobOptions, SliceRange, SliceStatus};

use crate::cli::ProgressMode;
use crate::progress;
use crate::utils::resolve_destination;

pub struct DownloadRequest {
    pub url: String,
    pub output: PathBuf,
    pub headers: Vec<(String, String)>,
    pub slices: usize,
    pub options: JobOptions,
    pub progress: ProgressMode,
    pub report: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReportFile<'a> {
    url: &'a str,
    destination: &'a Path,
    total_size: u64,
    success: bool,
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    slices: Vec<ReportSlice>,
}

#[derive(Serialize)]
struct ReportSlice {
    id: usize,
    range: SliceRange,
    status: &'static str,
    bytes_written: u64,
    error: Option<String>,
}

impl ReportSlice {
    fn from_outcome(outcome: &slicedl::SliceOutcome) -> Self {
        let (status, bytes_written, error) = match &outcome.status {
            SliceStatus::Completed { bytes_written } => ("completed", *bytes_written, None),
            SliceStatus::Skipped => ("skipped", 0, None),
            SliceStatus::Failed(failure) => ("failed", 0, Some(failure.to_string())),
        };
        Self {
            id: outcome.id,
            range: outcome.range,
            status,
            bytes_written,
            error,
        }
    }
}

pub async fn run_download(request: DownloadRequest) -> Result<()> {
    let destination = resolve_destination(&request.output, &request.url)?;
    let headers: HashMap<String, String> = request.headers.into_iter().collect();

    let job = DownloadJob::new(request.url.clone(), destination, &headers, request.slices)
        .and_then(|job| job.with_options(request.options))
        .context("Invalid download job")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling slices");
            ctrl_c.cancel();
        }
    });

    let (sink, rx) = EventSink::channel();
    let renderer = tokio::spawn(progress::render(rx, request.progress));

    let started_at = Local::now();
    let result = job.run(&sink, cancel).await;
    // Closing the channel lets the renderer drain and exit.
    drop(sink);
    let tally = renderer.await.context("Progress renderer failed")?;
    info!(completed = tally.completed, failed = tally.failed, "slice events received");
    let report = result.with_context(|| format!("Failed to download {}", request.url))?;
    let finished_at = Local::now();

    if let Some(path) = &request.report {
        write_report(path, &report, started_at, finished_at).await?;
    }

    if report.was_skipped() {
        info!("{} is already complete", report.destination.display());
        println!("Skipped     {} ({})", report.destination.display(), HumanBytes(report.total_size));
        return Ok(());
    }

    if !report.is_success() {
        for (id, failure) in report.failures() {
            eprintln!("slice {} failed: {}", id, failure);
        }
        bail!(
            "{} of {} slices failed for {}",
            tally.failed,
            report.slices.len(),
            request.url
        );
    }

    println!(
        "Completed   {} ({} in {} slices)",
        report.destination.display(),
        HumanBytes(report.bytes_written()),
        report.slices.len()
    );
    Ok(())
}

async fn write_report(
    path: &Path,
    report: &DownloadReport,
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
) -> Result<()> {
    let file = ReportFile {
        url: &report.url,
        destination: &report.destination,
        total_size: report.total_size,
        success: report.is_success(),
        started_at,
        finished_at,
        slices: report.slices.iter().map(ReportSlice::from_outcome).collect(),
    };
    let content = serde_json::to_string_pretty(&file)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create report directory")?;
        }
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write report {:?}", path))?;
    Ok(())
}

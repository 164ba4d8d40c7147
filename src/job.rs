use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::error::{JobError, SliceFailure};
use crate::events::EventSink;
use crate::plan::{plan_slices, validate_slice_count, DEFAULT_LOWER_BOUND};
use crate::probe::probe_total_size;
use crate::scheduler::{run_all, SliceOutcome};
use crate::worker::{SliceContext, SliceStatus, SliceTask};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Minimum slice width in bytes.
    pub lower_bound: u64,
    /// Read buffer size used when streaming a slice to disk.
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            lower_bound: DEFAULT_LOWER_BOUND,
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: concat!("slicedl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Everything needed to fetch one resource. Built once, never mutated by `run`.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    url: String,
    destination: PathBuf,
    headers: HeaderMap,
    requested_slices: usize,
    options: JobOptions,
}

impl DownloadJob {
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        headers: &HashMap<String, String>,
        requested_slices: usize,
    ) -> Result<Self, JobError> {
        let url = url.into();
        Url::parse(&url).map_err(|e| JobError::InvalidConfiguration(format!("invalid URL {:?}: {}", url, e)))?;
        validate_slice_count(requested_slices)?;

        Ok(Self {
            url,
            destination: destination.into(),
            headers: build_headers(headers)?,
            requested_slices,
            options: JobOptions::default(),
        })
    }

    pub fn with_options(mut self, options: JobOptions) -> Result<Self, JobError> {
        if options.lower_bound == 0 {
            return Err(JobError::InvalidConfiguration(
                "minimum slice size must be positive".to_string(),
            ));
        }
        if options.chunk_size == 0 {
            return Err(JobError::InvalidConfiguration(
                "chunk size must be positive".to_string(),
            ));
        }
        self.options = options;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn requested_slices(&self) -> usize {
        self.requested_slices
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Probe, plan and fetch every slice, returning once all workers are done.
    ///
    /// Probe and planning failures abort the job, and so does cancellation
    /// before the slices start. Slice failures do not; they are reported
    /// through `events` and in the returned report.
    pub async fn run(&self, events: &EventSink, cancel: CancellationToken) -> Result<DownloadReport, JobError> {
        let client = Client::builder()
            .user_agent(self.options.user_agent.as_str())
            .build()
            .map_err(|e| JobError::InvalidConfiguration(format!("cannot build HTTP client: {}", e)))?;

        info!(url = %self.url, destination = %self.destination.display(), "starting sliced download");
        let total_size = probe_total_size(&client, &self.url, &self.headers, &cancel).await?;
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let ranges = plan_slices(total_size, self.requested_slices, self.options.lower_bound)?;

        if ranges.is_empty() {
            touch(&self.destination).await?;
        }

        let existing_len = fs::metadata(&self.destination)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        let tasks: Vec<SliceTask> = ranges
            .iter()
            .enumerate()
            .map(|(id, range)| SliceTask {
                id,
                range: *range,
                expected_len: range.len_within(total_size),
            })
            .collect();

        let ctx = Arc::new(SliceContext {
            client,
            url: self.url.clone(),
            destination: self.destination.clone(),
            headers: self.headers.clone(),
            chunk_size: self.options.chunk_size,
            total_size,
            existing_len,
            events: events.clone(),
            cancel,
        });
        let slices = run_all(ctx, tasks).await;

        let report = DownloadReport {
            url: self.url.clone(),
            destination: self.destination.clone(),
            total_size,
            slices,
        };
        info!(
            slices = report.slices.len(),
            failed = report.failures().count(),
            bytes_written = report.bytes_written(),
            "sliced download finished"
        );
        Ok(report)
    }
}

/// Per-slice outcomes of one `run`, in slice order.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub url: String,
    pub destination: PathBuf,
    pub total_size: u64,
    pub slices: Vec<SliceOutcome>,
}

impl DownloadReport {
    pub fn is_success(&self) -> bool {
        self.slices.iter().all(|slice| !slice.status.is_failure())
    }

    pub fn bytes_written(&self) -> u64 {
        self.slices
            .iter()
            .map(|slice| match slice.status {
                SliceStatus::Completed { bytes_written } => bytes_written,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SliceFailure)> {
        self.slices.iter().filter_map(|slice| match &slice.status {
            SliceStatus::Failed(failure) => Some((slice.id, failure)),
            _ => None,
        })
    }

    /// True when the destination was already complete and nothing was fetched.
    pub fn was_skipped(&self) -> bool {
        !self.slices.is_empty()
            && self
                .slices
                .iter()
                .all(|slice| matches!(slice.status, SliceStatus::Skipped))
    }
}

// Any casing of "Range" is dropped; the probe and workers set their own.
fn build_headers(raw: &HashMap<String, String>) -> Result<HeaderMap, JobError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        if name.eq_ignore_ascii_case(RANGE.as_str()) {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| JobError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| JobError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

async fn touch(path: &Path) -> Result<(), JobError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    OpenOptions::new().write(true).create(true).open(path).await?;
    Ok(())
}

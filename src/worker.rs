use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use futures::TryStreamExt;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SliceFailure;
use crate::events::EventSink;
use crate::range::SliceRange;

/// One planned span bound to its write offset (`range.start`).
#[derive(Debug, Clone, Copy)]
pub struct SliceTask {
    pub id: usize,
    pub range: SliceRange,
    /// Bytes this slice should deliver, derived from the probed total.
    pub expected_len: u64,
}

#[derive(Debug, Clone)]
pub enum SliceStatus {
    Completed { bytes_written: u64 },
    /// The destination already held the whole resource; nothing was fetched.
    Skipped,
    Failed(SliceFailure),
}

impl SliceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, SliceStatus::Failed(_))
    }
}

/// State shared by every worker of one job.
#[derive(Debug, Clone)]
pub struct SliceContext {
    pub client: Client,
    pub url: String,
    pub destination: PathBuf,
    /// Caller headers with any `Range` entry already removed.
    pub headers: HeaderMap,
    pub chunk_size: usize,
    pub total_size: u64,
    /// Destination length observed before any worker started.
    pub existing_len: u64,
    pub events: EventSink,
    pub cancel: CancellationToken,
}

/// Fetch one slice and report through the event sink. `Complete` is always
/// emitted last, also after an `Error`.
pub async fn run_slice(ctx: Arc<SliceContext>, task: SliceTask) -> SliceStatus {
    debug!(slice = task.id, range = %task.range, "slice started");

    let status = match fetch_slice(&ctx, &task).await {
        Ok(Some(bytes_written)) => {
            debug!(slice = task.id, bytes_written, "slice finished");
            SliceStatus::Completed { bytes_written }
        }
        Ok(None) => {
            debug!(slice = task.id, "destination already complete, skipping");
            SliceStatus::Skipped
        }
        Err(failure) => {
            warn!(slice = task.id, range = %task.range, error = %failure, "slice failed");
            ctx.events.error(task.id, failure.clone());
            SliceStatus::Failed(failure)
        }
    };

    ctx.events.complete(task.id);
    status
}

async fn fetch_slice(ctx: &SliceContext, task: &SliceTask) -> Result<Option<u64>, SliceFailure> {
    if let Some(parent) = ctx.destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    if ctx.existing_len == ctx.total_size {
        return Ok(None);
    }

    if ctx.cancel.is_cancelled() {
        return Err(SliceFailure::Cancelled);
    }

    let request = ctx
        .client
        .get(&ctx.url)
        .headers(ctx.headers.clone())
        .header(RANGE, task.range.header_value());

    let response = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(SliceFailure::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    // A plain 200 carries the same bytes only when the slice is the whole resource.
    let whole_resource = task.range.start == 0 && task.range.is_open();
    if status != StatusCode::PARTIAL_CONTENT && !(whole_resource && status == StatusCode::OK) {
        return Err(SliceFailure::UnexpectedStatus(status));
    }

    // Judged against the probed total, not this response's Content-Length,
    // so a server that shortens an open-ended slice is still caught.
    let expected = task.expected_len;
    // Closed spans never write past their own end, whatever the server sends.
    let limit = task.range.end.map(|_| task.expected_len);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&ctx.destination)
        .await?;
    file.seek(SeekFrom::Start(task.range.start)).await?;

    let stream = response.bytes_stream().map_err(io::Error::other);
    let reader = StreamReader::new(stream);
    tokio::pin!(reader);
    let mut buffer = vec![0u8; ctx.chunk_size.max(1)];
    let mut written: u64 = 0;
    let mut estimate = 0.0_f64;

    loop {
        let read = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SliceFailure::Cancelled),
            read = reader.read(&mut buffer) => read.map_err(classify_read_error)?,
        };
        if read == 0 {
            break;
        }

        let keep = match limit {
            Some(limit) => (limit - written).min(read as u64) as usize,
            None => read,
        };
        file.write_all(&buffer[..keep]).await?;
        written += keep as u64;

        if expected > 0 {
            estimate = estimate.max((written as f64 / expected as f64).min(1.0));
        }
        ctx.events.progress(task.id, estimate);

        if limit.is_some_and(|limit| written >= limit) {
            break;
        }
    }

    file.flush().await?;

    if written < expected {
        return Err(SliceFailure::Incomplete {
            expected,
            received: written,
        });
    }
    Ok(Some(written))
}

// Transport errors come back wrapped in io::Error by StreamReader.
fn classify_read_error(err: io::Error) -> SliceFailure {
    let is_network = err
        .get_ref()
        .is_some_and(|inner| inner.is::<reqwest::Error>());
    if !is_network {
        return err.into();
    }
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<reqwest::Error>() {
            Ok(network) => SliceFailure::Network(Arc::new(*network)),
            Err(other) => io::Error::new(kind, other).into(),
        },
        None => io::Error::from(kind).into(),
    }
}

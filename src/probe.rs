use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE, RANGE};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::JobError;
use crate::range::{ContentRange, ContentRangeError, PROBE_RANGE};

/// Discover the resource length with a single `Range: bytes=0-0` request.
///
/// Only the response head is inspected; the body is dropped unread. A
/// server that never answers is only escaped through `cancel`.
pub async fn probe_total_size(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    cancel: &CancellationToken,
) -> Result<u64, JobError> {
    let mut headers = headers.clone();
    headers.insert(RANGE, HeaderValue::from_static(PROBE_RANGE));

    let request = client.get(url).headers(headers);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(JobError::Cancelled),
        response = request.send() => response.map_err(JobError::Probe)?,
    };

    let status = response.status();
    let total = total_from_headers(response.headers())?;
    debug!(%url, %status, total, "probed resource length");
    Ok(total)
}

pub fn total_from_headers(headers: &HeaderMap) -> Result<u64, ContentRangeError> {
    let value = headers.get(CONTENT_RANGE).ok_or(ContentRangeError::Missing)?;
    let value = value.to_str().map_err(|_| ContentRangeError::NotUtf8)?;
    let parsed: ContentRange = value.parse()?;
    Ok(parsed.total)
}

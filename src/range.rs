use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Range header value sent by the probe.
pub const PROBE_RANGE: &str = "bytes=0-0";

/// Inclusive byte span of the remote resource. `end == None` means
/// "until the server closes the stream" and is only used for the last slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SliceRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl SliceRange {
    pub fn closed(start: u64, end: u64) -> Self {
        Self { start, end: Some(end) }
    }

    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Number of bytes the span covers once the resource size is known.
    pub fn len_within(&self, total: u64) -> u64 {
        let last = match self.end {
            Some(end) => end.min(total.saturating_sub(1)),
            None => total.saturating_sub(1),
        };
        if total == 0 || self.start > last {
            0
        } else {
            last - self.start + 1
        }
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, <open>]", self.start),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentRangeError {
    #[error("response has no Content-Range header")]
    Missing,

    #[error("Content-Range header is not valid ASCII")]
    NotUtf8,

    #[error("unsupported range unit in {0:?}")]
    UnknownUnit(String),

    #[error("malformed Content-Range {0:?}")]
    Malformed(String),

    #[error("invalid number {0:?} in Content-Range")]
    InvalidNumber(String),

    #[error("inconsistent Content-Range {value:?}: start {start}, end {end}, total {total}")]
    Inconsistent {
        value: String,
        start: u64,
        end: u64,
        total: u64,
    },
}

/// A satisfied `Content-Range` value: `bytes <start>-<end>/<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl FromStr for ContentRange {
    type Err = ContentRangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (unit, spec) = trimmed
            .split_once(' ')
            .ok_or_else(|| ContentRangeError::Malformed(value.to_string()))?;
        if unit != "bytes" {
            return Err(ContentRangeError::UnknownUnit(value.to_string()));
        }

        let (span, total) = spec
            .split_once('/')
            .ok_or_else(|| ContentRangeError::Malformed(value.to_string()))?;
        let (start, end) = span
            .split_once('-')
            .ok_or_else(|| ContentRangeError::Malformed(value.to_string()))?;

        let start = parse_decimal(start)?;
        let end = parse_decimal(end)?;
        let total = parse_decimal(total)?;

        if start > end || end >= total {
            return Err(ContentRangeError::Inconsistent {
                value: value.to_string(),
                start,
                end,
                total,
            });
        }

        Ok(ContentRange { start, end, total })
    }
}

// u64::from_str accepts a leading '+', the header grammar does not.
fn parse_decimal(digits: &str) -> Result<u64, ContentRangeError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ContentRangeError::InvalidNumber(digits.to_string()));
    }
    digits
        .parse()
        .map_err(|_| ContentRangeError::InvalidNumber(digits.to_string()))
}

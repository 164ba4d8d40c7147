//! Download one HTTP resource as concurrent byte-range slices written in place.
//!
//! A [`DownloadJob`] probes the resource length, plans disjoint ranges, and
//! runs one worker per range. Each worker writes through its own file handle
//! at its own offsets, so the destination file needs no locking.

pub mod error;
pub mod events;
pub mod job;
pub mod plan;
pub mod probe;
pub mod range;
pub mod scheduler;
pub mod worker;

pub use error::{JobError, SliceFailure};
pub use events::{EventSink, SliceEvent};
pub use job::{DownloadJob, DownloadReport, JobOptions, DEFAULT_CHUNK_SIZE};
pub use plan::{plan_slices, DEFAULT_LOWER_BOUND, MAX_SLICES};
pub use range::{ContentRange, ContentRangeError, SliceRange};
pub use scheduler::SliceOutcome;
pub use tokio_util::sync::CancellationToken;
pub use worker::SliceStatus;

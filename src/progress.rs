use std::collections::{BTreeMap, BTreeSet};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use slicedl::SliceEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::cli::ProgressMode;

// Progress estimates are fractions; bars count in thousandths.
const BAR_SCALE: u64 = 1000;

/// What the caller saw of each slice, aggregated from events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SliceTally {
    pub completed: usize,
    pub failed: usize,
}

struct Bars {
    multi: MultiProgress,
    header: ProgressBar,
    slices: BTreeMap<usize, ProgressBar>,
    failed: BTreeSet<usize>,
    style: ProgressStyle,
}

impl Bars {
    fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        let header = multi.add(ProgressBar::new(0));
        header.set_style(ProgressStyle::default_bar().template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
        header.set_message("Probing...");

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        Self {
            multi,
            header,
            slices: BTreeMap::new(),
            failed: BTreeSet::new(),
            style,
        }
    }

    fn bar(&mut self, slice_id: usize) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.slices.entry(slice_id).or_insert_with(|| {
            let pb = multi.add(ProgressBar::new(BAR_SCALE));
            pb.set_style(style.clone());
            pb.set_message(format!("slice {}", slice_id));
            pb
        })
    }

    fn summarize(&self, tally: &SliceTally) {
        self.header.set_message(summary_line(tally));
        self.header.tick();
    }
}

// The planned slice count is never announced, so only finished slices are counted.
fn summary_line(tally: &SliceTally) -> String {
    format!("Slices done: {} | Failed: {}", tally.completed, tally.failed)
}

/// Drain slice events until every sender is gone.
pub async fn render(mut rx: UnboundedReceiver<SliceEvent>, mode: ProgressMode) -> SliceTally {
    let mut tally = SliceTally::default();
    let mut bars = match mode {
        ProgressMode::Bars => Some(Bars::new()),
        _ => None,
    };

    while let Some(event) = rx.recv().await {
        match &event {
            SliceEvent::Complete { .. } => tally.completed += 1,
            SliceEvent::Error { .. } => tally.failed += 1,
            SliceEvent::Progress { .. } => {}
        }

        if let Some(bars) = bars.as_mut() {
            match event {
                SliceEvent::Progress { slice_id, estimate } => {
                    bars.bar(slice_id).set_position((estimate * BAR_SCALE as f64) as u64);
                }
                SliceEvent::Error { slice_id, failure } => {
                    bars.failed.insert(slice_id);
                    bars.bar(slice_id).set_message(format!("slice {} failed: {}", slice_id, failure));
                }
                SliceEvent::Complete { slice_id } => {
                    // Error and Complete both arrive for a failed slice; keep the failure text.
                    if bars.failed.contains(&slice_id) {
                        bars.bar(slice_id).abandon();
                    } else {
                        bars.bar(slice_id).finish_with_message(format!("slice {} done", slice_id));
                    }
                }
            }
            bars.summarize(&tally);
        } else if mode == ProgressMode::Log {
            match event {
                SliceEvent::Progress { .. } => {}
                SliceEvent::Error { slice_id, failure } => warn!(slice = slice_id, error = %failure, "slice error"),
                SliceEvent::Complete { slice_id } => info!(slice = slice_id, "slice complete"),
            }
        }
    }

    if let Some(bars) = bars {
        bars.header.finish();
    }
    tally
}

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::SliceFailure;
use crate::plan::MAX_SLICES;
use crate::range::SliceRange;
use crate::worker::{run_slice, SliceContext, SliceStatus, SliceTask};

#[derive(Debug, Clone)]
pub struct SliceOutcome {
    pub id: usize,
    pub range: SliceRange,
    pub status: SliceStatus,
}

/// Run one worker per task and wait for every one of them, failed or not.
///
/// Outcomes come back in task order. A failing slice never stops its siblings.
pub async fn run_all(ctx: Arc<SliceContext>, tasks: Vec<SliceTask>) -> Vec<SliceOutcome> {
    run_all_with(ctx, tasks, run_slice).await
}

/// At most `MAX_SLICES` workers hold a permit at once. Planned jobs stay below
/// that, so for them every slice starts immediately.
pub(crate) async fn run_all_with<W, Fut>(ctx: Arc<SliceContext>, tasks: Vec<SliceTask>, worker: W) -> Vec<SliceOutcome>
where
    W: Fn(Arc<SliceContext>, SliceTask) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = SliceStatus> + Send + 'static,
{
    let pool = Arc::new(Semaphore::new(MAX_SLICES));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let ctx = ctx.clone();
        let pool = pool.clone();
        let worker = worker.clone();
        let handle = tokio::spawn(async move {
            // The pool is never closed, so the permit is always granted.
            let _permit = pool.acquire_owned().await.ok();
            worker(ctx, task).await
        });
        handles.push((task, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (task, handle) in handles {
        let status = match handle.await {
            Ok(status) => status,
            Err(join_err) => {
                // The worker never reached its own Error/Complete events.
                let failure = SliceFailure::Aborted(join_err.to_string());
                ctx.events.error(task.id, failure.clone());
                ctx.events.complete(task.id);
                SliceStatus::Failed(failure)
            }
        };
        outcomes.push(SliceOutcome {
            id: task.id,
            range: task.range,
            status,
        });
    }

    debug!(slices = outcomes.len(), "all slice workers finished");
    outcomes
}

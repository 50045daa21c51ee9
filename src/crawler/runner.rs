//! Bounded concurrent runner
//!
//! [`run_all`] fans a batch of items out over at most `concurrency` tokio
//! tasks. Every item gets exactly one [`TaskSlot`] in input order; a failing
//! or panicking item never affects the others. Cancellation aborts in-flight
//! tasks and leaves unstarted items [`TaskSlot::Pending`].

use crate::cancel::CancelToken;
use crate::HarvestError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

/// Per-item result of a run
#[derive(Debug)]
pub enum TaskSlot<E> {
    /// Never started, or aborted by cancellation before finishing
    Pending,
    Succeeded,
    Failed(E),
    /// The task panicked; holds the panic message
    Panicked(String),
}

impl<E> TaskSlot<E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for both failed and panicked items
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of [`run_all`]
#[derive(Debug)]
pub struct RunOutcome<E> {
    /// One slot per input item, in input order
    pub slots: Vec<TaskSlot<E>>,
    /// True when the run was cut short by cancellation
    pub cancelled: bool,
}

impl<E> RunOutcome<E> {
    pub fn succeeded(&self) -> usize {
        self.slots.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_failure()).count()
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_pending()).count()
    }

    /// Iterates over `(index, error)` for failed items
    pub fn errors(&self) -> impl Iterator<Item = (usize, &E)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.error().map(|e| (i, e)))
    }

    /// Converts a cancelled run into [`HarvestError::Cancelled`]
    pub fn into_result(self) -> Result<Vec<TaskSlot<E>>, HarvestError> {
        if self.cancelled {
            Err(HarvestError::Cancelled)
        } else {
            Ok(self.slots)
        }
    }
}

/// Runs `f` over every item with at most `concurrency` invocations in flight
///
/// `concurrency` is clamped to `[1, items.len()]`. Each invocation receives a
/// clone of the run's cancellation token. A token that is already cancelled
/// returns immediately without running anything.
///
/// # Example
///
/// ```
/// use sumi_harvest::crawler::run_all;
/// use sumi_harvest::CancelToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let outcome = run_all(&CancelToken::new(), vec![1, 2, 3], 2, |_, n: u32| async move {
///     if n == 2 { Err(format!("item {} failed", n)) } else { Ok(()) }
/// })
/// .await;
///
/// assert_eq!(outcome.succeeded(), 2);
/// assert_eq!(outcome.failed(), 1);
/// # }
/// ```
pub async fn run_all<T, E, F, Fut>(
    cancel: &CancelToken,
    items: Vec<T>,
    concurrency: usize,
    f: F,
) -> RunOutcome<E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(CancelToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let total = items.len();
    let mut slots: Vec<TaskSlot<E>> = (0..total).map(|_| TaskSlot::Pending).collect();

    if cancel.is_cancelled() {
        return RunOutcome {
            slots,
            cancelled: true,
        };
    }
    if total == 0 {
        return RunOutcome {
            slots,
            cancelled: false,
        };
    }

    let limit = concurrency.clamp(1, total);
    debug!("Running {} items with concurrency {}", total, limit);

    let semaphore = Arc::new(Semaphore::new(limit));
    let f = Arc::new(f);
    let mut tasks: JoinSet<(usize, TaskSlot<E>)> = JoinSet::new();
    let mut cancelled = false;

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            cancelled = true;
            break;
        };

        let f = Arc::clone(&f);
        let token = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let slot = match AssertUnwindSafe(f(token, item)).catch_unwind().await {
                Ok(Ok(())) => TaskSlot::Succeeded,
                Ok(Err(e)) => TaskSlot::Failed(e),
                Err(payload) => TaskSlot::Panicked(panic_message(payload)),
            };
            (index, slot)
        });
    }

    while !cancelled {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = tasks.join_next() => Some(next),
        };
        match next {
            None => cancelled = true,
            Some(None) => break,
            Some(Some(joined)) => record(&mut slots, joined),
        }
    }

    if cancelled {
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            record(&mut slots, joined);
        }
        debug!(
            "Run cancelled with {} items still pending",
            slots.iter().filter(|s| s.is_pending()).count()
        );
    }

    RunOutcome { slots, cancelled }
}

/// Stores a joined task's result; aborted tasks leave their slot pending
fn record<E>(slots: &mut [TaskSlot<E>], joined: Result<(usize, TaskSlot<E>), JoinError>) {
    if let Ok((index, slot)) = joined {
        slots[index] = slot;
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

//! Streaming task pool
//!
//! [`TaskPool`] is the open-ended sibling of [`run_all`](super::run_all):
//! producers submit items while consumers read results as they complete.
//! A single dispatcher task owns the `JoinSet` and the concurrency limit.

use crate::cancel::CancelToken;
use crate::crawler::runner::{panic_message, TaskSlot};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::debug;

/// A completed item, tagged with its submission sequence number
#[derive(Debug)]
pub struct PoolResult<E> {
    /// 0-based submission order
    pub seq: u64,
    pub slot: TaskSlot<E>,
}

/// Streaming bounded pool
///
/// ```
/// use sumi_harvest::crawler::TaskPool;
/// use sumi_harvest::CancelToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut pool = TaskPool::spawn(CancelToken::new(), 2, |_, n: u32| async move {
///     if n > 0 { Ok(()) } else { Err("zero") }
/// });
/// for n in 0..3 {
///     pool.submit(n).await.unwrap();
/// }
/// pool.close();
///
/// let mut done = 0;
/// while let Some(result) = pool.next().await {
///     done += 1;
///     assert_eq!(result.slot.is_success(), result.seq != 0);
/// }
/// assert_eq!(done, 3);
/// # }
/// ```
pub struct TaskPool<T, E> {
    cancel: CancelToken,
    input: Option<mpsc::Sender<T>>,
    results: mpsc::UnboundedReceiver<PoolResult<E>>,
    dispatcher: Option<JoinHandle<()>>,
}

enum Event<T, E> {
    Cancelled,
    Item(Option<T>),
    Done(Option<Result<PoolResult<E>, JoinError>>),
}

impl<T, E> TaskPool<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Starts the dispatcher; at most `concurrency` invocations of `f` run at
    /// once (a concurrency of 0 is treated as 1)
    pub fn spawn<F, Fut>(cancel: CancelToken, concurrency: usize, f: F) -> Self
    where
        F: Fn(CancelToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let limit = concurrency.max(1);
        let (input_tx, input_rx) = mpsc::channel(limit);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let dispatcher = tokio::spawn(dispatch(
            cancel.clone(),
            limit,
            Arc::new(f),
            input_rx,
            result_tx,
        ));

        Self {
            cancel,
            input: Some(input_tx),
            results: result_rx,
            dispatcher: Some(dispatcher),
        }
    }

    /// Submits an item, waiting while the input queue is full
    ///
    /// Returns the item back if the pool is closed or cancelled.
    pub async fn submit(&self, item: T) -> Result<(), T> {
        if self.cancel.is_cancelled() {
            return Err(item);
        }
        match &self.input {
            Some(tx) => tx.send(item).await.map_err(|e| e.0),
            None => Err(item),
        }
    }

    /// Stops accepting items; already submitted items still run
    pub fn close(&mut self) {
        self.input = None;
    }

    /// Returns the next completed item, or `None` once the pool is closed
    /// (or cancelled) and drained
    pub async fn next(&mut self) -> Option<PoolResult<E>> {
        self.results.recv().await
    }

    /// Closes the pool, aborts outstanding work and waits for the dispatcher
    pub async fn shutdown(mut self) {
        self.input = None;
        if let Some(handle) = self.dispatcher.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl<T, E> Drop for TaskPool<T, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.take() {
            handle.abort();
        }
    }
}

async fn dispatch<T, E, F, Fut>(
    cancel: CancelToken,
    limit: usize,
    f: Arc<F>,
    mut input: mpsc::Receiver<T>,
    results: mpsc::UnboundedSender<PoolResult<E>>,
) where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(CancelToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks: JoinSet<PoolResult<E>> = JoinSet::new();
    let mut input_open = true;
    let mut seq: u64 = 0;

    loop {
        if !input_open && tasks.is_empty() {
            break;
        }

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::Cancelled,
            done = tasks.join_next(), if !tasks.is_empty() => Event::Done(done),
            item = input.recv(), if input_open && semaphore.available_permits() > 0 => Event::Item(item),
        };

        match event {
            Event::Cancelled => {
                tasks.abort_all();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(result) = joined {
                        let _ = results.send(result);
                    }
                }
                debug!("Task pool cancelled after {} submissions", seq);
                break;
            }
            Event::Done(Some(Ok(result))) => {
                let _ = results.send(result);
            }
            Event::Done(_) => {}
            Event::Item(None) => input_open = false,
            Event::Item(Some(item)) => {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let f = Arc::clone(&f);
                let token = cancel.clone();
                let index = seq;
                seq += 1;
                tasks.spawn(async move {
                    let _permit = permit;
                    let slot = match AssertUnwindSafe(f(token, item)).catch_unwind().await {
                        Ok(Ok(())) => TaskSlot::Succeeded,
                        Ok(Err(e)) => TaskSlot::Failed(e),
                        Err(payload) => TaskSlot::Panicked(panic_message(payload)),
                    };
                    PoolResult { seq: index, slot }
                });
            }
        }
    }
}

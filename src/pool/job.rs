//! Job description and the bounded executor.
//!
//! A fixed number of workers pull `(index, input)` records from one shared
//! queue and hand `(index, result)` records to a single collector, which
//! writes each result into its pre-sized slot. Completion order never leaks
//! into result order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::batch::BatchResult;
use crate::error::PoolError;

/// Worker count used when a job asks for zero workers.
pub const DEFAULT_WORKERS: usize = 10;

/// One unit of queued work.
struct TaskRecord<I> {
    index: usize,
    input: I,
}

/// One finished unit of work on its way to the collector.
struct Completed<O, E> {
    index: usize,
    result: Result<O, E>,
}

/// A batch of independent tasks: ordered inputs, a task function and a
/// worker budget.
pub struct Job<I, F> {
    inputs: Vec<I>,
    workers: usize,
    task: F,
    cancel: CancellationToken,
}

impl<I, F> Job<I, F> {
    /// Create a job running `task` once per input with the default worker count.
    pub fn new(task: F, inputs: Vec<I>) -> Self {
        Self {
            inputs,
            workers: DEFAULT_WORKERS,
            task,
            cancel: CancellationToken::new(),
        }
    }

    /// Request a worker count. Zero selects [`DEFAULT_WORKERS`].
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Stop dispatching new inputs once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number of workers the executor will actually start.
    ///
    /// Never more than the number of inputs and at least one when there is
    /// any input.
    pub fn workers(&self) -> usize {
        if self.inputs.is_empty() {
            return 0;
        }

        let requested = if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        };

        requested.min(self.inputs.len())
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl<I, F, Fut, O, E> Job<I, F>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    /// Run every input through the task and collect index-aligned results.
    ///
    /// Each task runs exactly once unless the job is cancelled before it is
    /// dispatched. A failing task never affects the others. Cancellation
    /// stops dispatch only; tasks already handed to a worker finish normally
    /// and the call returns once they have.
    pub async fn execute(self) -> BatchResult<O, E> {
        let total = self.inputs.len();
        let mut batch = BatchResult::with_len(total);

        if total == 0 {
            return batch;
        }

        if self.cancel.is_cancelled() {
            batch.interrupted = Some(PoolError::Cancelled {
                dispatched: 0,
                total,
            });
            return batch;
        }

        if total == 1 {
            if let Some(input) = self.inputs.into_iter().next() {
                batch.fill(0, (self.task)(input).await);
            }
            return batch;
        }

        self.run_pool(batch).await
    }

    async fn run_pool(self, mut batch: BatchResult<O, E>) -> BatchResult<O, E> {
        let total = self.inputs.len();
        let workers = self.workers();
        let task = Arc::new(self.task);

        let (task_tx, task_rx) = mpsc::channel::<TaskRecord<I>>(1);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completed<O, E>>();

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let task = Arc::clone(&task);
            let task_rx = Arc::clone(&task_rx);
            let done_tx = done_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = task_rx.lock().await.recv().await;
                    let Some(record) = next else {
                        break;
                    };

                    trace!(worker, index = record.index, "Running task");
                    let result = (*task)(record.input).await;

                    if done_tx
                        .send(Completed {
                            index: record.index,
                            result,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }
        // Only workers hold senders now, so the collector ends when they do.
        drop(done_tx);

        let cancel = self.cancel.clone();
        let inputs = self.inputs;
        let dispatcher = tokio::spawn(async move {
            for (index, input) in inputs.into_iter().enumerate() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(PoolError::Cancelled { dispatched: index, total });
                    }
                    sent = task_tx.send(TaskRecord { index, input }) => {
                        if sent.is_err() {
                            return Err(PoolError::Dispatcher("all workers exited".to_string()));
                        }
                    }
                }
            }
            Ok(())
        });

        while let Some(done) = done_rx.recv().await {
            batch.fill(done.index, done.result);
        }

        batch.interrupted = match dispatcher.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(err) => Some(PoolError::Dispatcher(err.to_string())),
        };

        for handle in handles {
            if let Err(err) = handle.await
                && err.is_panic()
            {
                std::panic::resume_unwind(err.into_panic());
            }
        }

        debug!(
            total,
            workers,
            failed = batch.failed_count(),
            interrupted = batch.is_interrupted(),
            "Batch finished"
        );

        batch
    }
}

use crate::wordlist::{Task, WordlistError};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

/// Errors that can occur while dispatching tasks.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The task source failed mid-run. Dispatch stopped, but executions that
    /// were already running were allowed to finish.
    #[error("Task source failed: {0}")]
    Source(#[from] WordlistError),
    /// One or more executions panicked instead of producing a result.
    #[error("{0} execution(s) aborted unexpectedly")]
    Join(usize),
    /// The concurrency limiter was closed while tasks were still pending.
    #[error("Scheduler concurrency limiter closed")]
    LimiterClosed,
}

/// The future running one task to completion.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Turns a task into the work to run for it.
pub type Job = Arc<dyn Fn(Task) -> JobFuture + Send + Sync>;

/// Items flowing from the task producer to the scheduler.
pub type TaskReceiver = mpsc::Receiver<Result<Task, WordlistError>>;

/// A `Scheduler` decides when the work for each task is launched.
///
/// It pulls tasks from the channel until the producer is done, runs `job`
/// for each of them and only returns once every launched job has completed.
/// No ordering is imposed on job completion.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Dispatches every received task and waits for all of them.
    ///
    /// # Returns
    /// The number of tasks dispatched, or the first error encountered. Even
    /// on error, every job that was launched has finished when this returns.
    async fn dispatch(&self, tasks: TaskReceiver, job: Job) -> Result<usize, SchedulerError>;
}

/// Counts panicked jobs while joining.
#[derive(Default)]
struct JoinTracker {
    failed: usize,
}

impl JoinTracker {
    fn record(&mut self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!("execution task failed: {e}");
            self.failed += 1;
        }
    }

    fn reap_finished(&mut self, in_flight: &mut JoinSet<()>) {
        while let Some(joined) = in_flight.try_join_next() {
            self.record(joined);
        }
    }

    async fn join_all(&mut self, in_flight: &mut JoinSet<()>) {
        while let Some(joined) = in_flight.join_next().await {
            self.record(joined);
        }
    }

    fn finish(
        self,
        dispatched: usize,
        source_error: Option<WordlistError>,
    ) -> Result<usize, SchedulerError> {
        if let Some(e) = source_error {
            return Err(SchedulerError::Source(e));
        }
        if self.failed > 0 {
            return Err(SchedulerError::Join(self.failed));
        }
        Ok(dispatched)
    }
}

/// Launches one concurrent job per task with no cap on how many run at once.
///
/// Only the launch rate is throttled: `delay` is slept between two launches,
/// regardless of whether earlier jobs have completed.
#[derive(Debug, Clone, Default)]
pub struct UnboundedScheduler {
    delay: Duration,
}

impl UnboundedScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Scheduler for UnboundedScheduler {
    async fn dispatch(&self, mut tasks: TaskReceiver, job: Job) -> Result<usize, SchedulerError> {
        let mut in_flight = JoinSet::new();
        let mut tracker = JoinTracker::default();
        let mut dispatched = 0usize;
        let mut source_error = None;

        while let Some(item) = tasks.recv().await {
            let task = match item {
                Ok(task) => task,
                Err(e) => {
                    source_error = Some(e);
                    break;
                }
            };
            if dispatched > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            in_flight.spawn(job(task));
            dispatched += 1;
            tracker.reap_finished(&mut in_flight);
        }
        drop(tasks);

        debug!(dispatched, in_flight = in_flight.len(), "dispatch finished, joining");
        tracker.join_all(&mut in_flight).await;
        tracker.finish(dispatched, source_error)
    }
}

/// Like [`UnboundedScheduler`], but never lets more than `max_in_flight`
/// jobs run at the same time.
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    delay: Duration,
    max_in_flight: usize,
}

impl BoundedScheduler {
    /// `max_in_flight` is raised to 1 if zero.
    pub fn new(delay: Duration, max_in_flight: usize) -> Self {
        Self {
            delay,
            max_in_flight: max_in_flight.max(1),
        }
    }
}

#[async_trait]
impl Scheduler for BoundedScheduler {
    async fn dispatch(&self, mut tasks: TaskReceiver, job: Job) -> Result<usize, SchedulerError> {
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight = JoinSet::new();
        let mut tracker = JoinTracker::default();
        let mut dispatched = 0usize;
        let mut source_error = None;
        let mut limiter_closed = false;

        while let Some(item) = tasks.recv().await {
            let task = match item {
                Ok(task) => task,
                Err(e) => {
                    source_error = Some(e);
                    break;
                }
            };
            if dispatched > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                limiter_closed = true;
                break;
            };
            let work = job(task);
            in_flight.spawn(async move {
                work.await;
                drop(permit);
            });
            dispatched += 1;
            tracker.reap_finished(&mut in_flight);
        }
        drop(tasks);

        tracker.join_all(&mut in_flight).await;
        if limiter_closed && source_error.is_none() {
            return Err(SchedulerError::LimiterClosed);
        }
        tracker.finish(dispatched, source_error)
    }
}

//! Run orchestration: tasks in, filtered results out.

use crate::config::{ConfigError, FuzzConfig};
use crate::executor::{ExecutionResult, Executor, ShellExecutor};
use crate::filter;
use crate::output::ResultSink;
use crate::scheduler::{Job, JobFuture, Scheduler, SchedulerError, UnboundedScheduler};
use crate::substitution::render;
use crate::wordlist::{Task, TaskSource, WordlistError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Tasks buffered between the wordlist reader and the scheduler.
const TASK_CHANNEL_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("Invalid configuration: {}", join_errors(.0))]
    Config(Vec<ConfigError>),
    #[error(transparent)]
    Wordlist(#[from] WordlistError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub reported: usize,
    pub timed_out: usize,
    /// Executions that did not exit cleanly, timeouts included.
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executed, {} reported, {} failed, {} timed out",
            self.dispatched, self.reported, self.failed, self.timed_out
        )
    }
}

#[derive(Default)]
struct RunStats {
    completed: AtomicUsize,
    reported: AtomicUsize,
    timed_out: AtomicUsize,
    failed: AtomicUsize,
}

impl RunStats {
    fn record(&self, result: &ExecutionResult) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if result.timed_out {
            self.timed_out.fetch_add(1, Ordering::Relaxed);
        }
        if !result.is_success() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn summary(&self, dispatched: usize) -> RunSummary {
        RunSummary {
            dispatched,
            reported: self.reported.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs a complete fuzzing session with the default shell executor and
/// unbounded scheduler, reporting surviving results to `sink`.
///
/// Configuration and wordlist errors are returned before any command runs.
pub async fn run(config: FuzzConfig, sink: Arc<dyn ResultSink>) -> Result<RunSummary, FuzzError> {
    config.validate().map_err(FuzzError::Config)?;
    let tasks = TaskSource::open(&config)?;
    if let Some(total) = tasks.known_len() {
        info!(tasks = total, "spider mode task product ready");
    }

    let executor = Arc::new(ShellExecutor::new(config.shell.clone(), config.timeout()));
    let scheduler = UnboundedScheduler::new(config.delay());
    run_with(Arc::new(config), tasks, &scheduler, executor, sink).await
}

/// Runs `tasks` through `scheduler` and `executor`, filtering each result
/// against `config` before handing it to `sink`.
///
/// The task iterator is drained on a blocking thread and fed to the
/// scheduler through a bounded channel, so wordlist I/O never stalls the
/// runtime.
pub async fn run_with<I, S, E>(
    config: Arc<FuzzConfig>,
    tasks: I,
    scheduler: &S,
    executor: Arc<E>,
    sink: Arc<dyn ResultSink>,
) -> Result<RunSummary, FuzzError>
where
    I: Iterator<Item = Result<Task, WordlistError>> + Send + 'static,
    S: Scheduler + ?Sized,
    E: Executor + 'static,
{
    let (sender, receiver) = mpsc::channel(TASK_CHANNEL_CAPACITY);
    let producer = tokio::task::spawn_blocking(move || {
        for item in tasks {
            let failed = item.is_err();
            if sender.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    let stats = Arc::new(RunStats::default());
    let job: Job = {
        let stats = Arc::clone(&stats);
        Arc::new(move |task: Task| -> JobFuture {
            let config = Arc::clone(&config);
            let executor = Arc::clone(&executor);
            let sink = Arc::clone(&sink);
            let stats = Arc::clone(&stats);
            Box::pin(async move {
                let command = render(&config, &task);
                let result = executor.execute(task.display(), command).await;
                stats.record(&result);
                if !filter::passes(&config.filters, config.hide, &result) {
                    return;
                }
                match sink.report(&result) {
                    Ok(()) => {
                        stats.reported.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => warn!(substitution = %result.substitution, "failed to write result: {e}"),
                }
            })
        })
    };

    let dispatched = scheduler.dispatch(receiver, job).await;
    if let Err(e) = producer.await {
        warn!("task producer stopped abnormally: {e}");
    }
    let dispatched = dispatched?;

    let summary = stats.summary(dispatched);
    debug_assert_eq!(stats.completed.load(Ordering::Relaxed), dispatched);
    info!(%summary, "fuzzing run finished");
    Ok(summary)
}

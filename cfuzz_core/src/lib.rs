pub mod config;
pub mod display;
pub mod executor;
pub mod filter;
pub mod fuzz;
pub mod output;
pub mod scheduler;
pub mod substitution;
pub mod wordlist;

pub use config::{ConfigError, ConfigLoadError, FuzzConfig};
pub use display::DisplayMode;
pub use executor::{ExecutionResult, Executor, ShellExecutor};
pub use filter::Filter;
pub use fuzz::{FuzzError, RunSummary};
pub use output::{LineFormatter, LineSink, MemorySink, OutputFormat, ResultSink};
pub use scheduler::{BoundedScheduler, Scheduler, SchedulerError, UnboundedScheduler};
pub use substitution::RenderedCommand;
pub use wordlist::{Task, TaskSource, WordlistError};

use crate::config::FuzzConfig;
use crate::display::{DisplayMode, effective_modes, format_line};
use crate::executor::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Tab separated columns chosen by the display modes.
    #[default]
    Text,
    /// One JSON object per result.
    Json,
}

/// Receives every result that survived the filters.
///
/// Results arrive concurrently and in completion order; implementations must
/// keep each reported line intact.
pub trait ResultSink: Send + Sync {
    fn report(&self, result: &ExecutionResult) -> io::Result<()>;
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    substitution: &'a str,
    stdout: Cow<'a, str>,
    stderr: Cow<'a, str>,
    stdout_len: usize,
    stderr_len: usize,
    elapsed_ms: u128,
    exit_code: &'a str,
    timed_out: bool,
    error: Option<&'a str>,
}

/// Turns a result into a single output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormatter {
    modes: Vec<DisplayMode>,
    format: OutputFormat,
}

impl LineFormatter {
    pub fn new(modes: &[DisplayMode], format: OutputFormat) -> Self {
        Self {
            modes: effective_modes(modes).to_vec(),
            format,
        }
    }

    pub fn for_config(config: &FuzzConfig) -> Self {
        Self::new(&config.display_modes, config.output_format)
    }

    pub fn format(&self, result: &ExecutionResult) -> io::Result<String> {
        match self.format {
            OutputFormat::Text => Ok(format_line(result, &self.modes)),
            OutputFormat::Json => {
                let record = JsonRecord {
                    substitution: &result.substitution,
                    stdout: result.stdout_text(),
                    stderr: result.stderr_text(),
                    stdout_len: result.stdout_len(),
                    stderr_len: result.stderr_len(),
                    elapsed_ms: result.elapsed.as_millis(),
                    exit_code: &result.exit_code,
                    timed_out: result.timed_out,
                    error: result.error.as_deref(),
                };
                serde_json::to_string(&record).map_err(io::Error::other)
            }
        }
    }
}

/// Writes one line per result to `W`, serialized behind a mutex and flushed
/// after every line.
pub struct LineSink<W: Write + Send> {
    formatter: LineFormatter,
    writer: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W, formatter: LineFormatter) -> Self {
        Self {
            formatter,
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ResultSink for LineSink<W> {
    fn report(&self, result: &ExecutionResult) -> io::Result<()> {
        let line = self.formatter.format(result)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

/// Keeps formatted lines in memory, in arrival order.
#[derive(Debug)]
pub struct MemorySink {
    formatter: LineFormatter,
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(formatter: LineFormatter) -> Self {
        Self {
            formatter,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for MemorySink {
    fn report(&self, result: &ExecutionResult) -> io::Result<()> {
        let line = self.formatter.format(result)?;
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        Ok(())
    }
}

use crate::display::DisplayMode;
use crate::filter::Filter;
use crate::output::OutputFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A problem with the content of a [`FuzzConfig`] that prevents a run.
///
/// [`FuzzConfig::validate`] reports every problem it finds, so callers usually
/// receive these as a list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No wordlist provided. Please indicate a wordlist to use for fuzzing (-w, --wordlist)")]
    MissingWordlist,
    #[error("Fuzzing keyword can't be an empty string")]
    EmptyKeyword,
    #[error(
        "No command provided. Please indicate it using environment variable CFUZZ_CMD or cfuzz [flags] [command]"
    )]
    EmptyCommand,
    #[error("Fuzzing keyword has not been found in command. keyword: {keyword} command: {command}")]
    KeywordNotInCommand { keyword: String, command: String },
    #[error("Fuzzing keyword has not been found in stdin. keyword: {keyword} input: {input}")]
    KeywordNotInInput { keyword: String, input: String },
    #[error("Stdin fuzzing is enabled but no input was provided (-i, --input)")]
    MissingInput,
    #[error(
        "Keyword {keyword} appears {occurrences} time(s) but {wordlists} wordlists were provided"
    )]
    KeywordCountMismatch {
        keyword: String,
        occurrences: usize,
        wordlists: usize,
    },
    #[error("{0} wordlists were provided but spider mode is disabled")]
    MultipleWordlistsWithoutSpider(usize),
    #[error("Timeout must be at least one second")]
    ZeroTimeout,
}

/// Failure to read or parse a TOML configuration file.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything a fuzzing run needs. Built once, then shared read-only by all
/// concurrent executions.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzConfig {
    #[serde(default)]
    pub command: String,
    /// Stdin template, only sent to the child when `stdin_fuzzing` is set.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub stdin_fuzzing: bool,
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default)]
    pub wordlists: Vec<PathBuf>,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub display_modes: Vec<DisplayMode>,
    /// Report results that fail the filters instead of those that pass.
    #[serde(default)]
    pub hide: bool,
    /// Multi-wordlist mode: one keyword occurrence per wordlist, cartesian product of values.
    #[serde(default)]
    pub spider: bool,
    #[serde(default)]
    pub output_format: OutputFormat,
}

pub fn default_keyword() -> String {
    "FUZZ".to_string()
}

pub fn default_shell() -> String {
    "/bin/bash".to_string()
}

pub fn default_timeout_secs() -> u64 {
    30
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            input: None,
            stdin_fuzzing: false,
            keyword: default_keyword(),
            wordlists: Vec::new(),
            shell: default_shell(),
            timeout_secs: default_timeout_secs(),
            delay_ms: 0,
            filters: Vec::new(),
            display_modes: Vec::new(),
            hide: false,
            spider: false,
            output_format: OutputFormat::default(),
        }
    }
}

impl FuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// The stdin template that will actually be piped to each execution.
    pub fn stdin_template(&self) -> Option<&str> {
        if self.stdin_fuzzing {
            self.input.as_deref()
        } else {
            None
        }
    }

    /// Number of keyword occurrences across the command and the piped stdin template.
    pub fn keyword_occurrences(&self) -> usize {
        if self.keyword.is_empty() {
            return 0;
        }
        let in_command = self.command.matches(self.keyword.as_str()).count();
        let in_input = self
            .stdin_template()
            .map_or(0, |input| input.matches(self.keyword.as_str()).count());
        in_command + in_input
    }

    /// Checks that the configuration describes a runnable fuzzing session.
    ///
    /// All problems are collected rather than stopping at the first one, so a
    /// user can fix their invocation in a single pass.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.wordlists.is_empty() {
            errors.push(ConfigError::MissingWordlist);
        }
        if self.keyword.is_empty() {
            errors.push(ConfigError::EmptyKeyword);
        }
        if self.command.is_empty() {
            errors.push(ConfigError::EmptyCommand);
        }
        if self.stdin_fuzzing && self.input.is_none() {
            errors.push(ConfigError::MissingInput);
        }
        if self.timeout_secs == 0 {
            errors.push(ConfigError::ZeroTimeout);
        }
        if self.wordlists.len() > 1 && !self.spider {
            errors.push(ConfigError::MultipleWordlistsWithoutSpider(
                self.wordlists.len(),
            ));
        }

        if !self.keyword.is_empty() && !self.command.is_empty() {
            if self.spider {
                let occurrences = self.keyword_occurrences();
                if !self.wordlists.is_empty() && occurrences != self.wordlists.len() {
                    errors.push(ConfigError::KeywordCountMismatch {
                        keyword: self.keyword.clone(),
                        occurrences,
                        wordlists: self.wordlists.len(),
                    });
                }
            } else if self.stdin_fuzzing {
                if let Some(input) = &self.input {
                    if !input.contains(self.keyword.as_str()) {
                        errors.push(ConfigError::KeywordNotInInput {
                            keyword: self.keyword.clone(),
                            input: input.clone(),
                        });
                    }
                }
            } else if !self.command.contains(self.keyword.as_str()) {
                errors.push(ConfigError::KeywordNotInCommand {
                    keyword: self.keyword.clone(),
                    command: self.command.clone(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

use cfuzz_core::config::{ConfigError, ConfigLoadError, FuzzConfig};
use cfuzz_core::display::DisplayMode;
use cfuzz_core::filter::Filter;
use cfuzz_core::output::OutputFormat;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    name = "cfuzz",
    author,
    version,
    about = "Fuzz command line execution and filter results",
    long_about = "Fuzz command line execution and filter results.\n\n\
                  The command is taken from the CFUZZ_CMD environment variable when set, \
                  otherwise from the trailing arguments."
)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Wordlist used by the fuzzer; repeat it to fuzz several keyword occurrences (spider mode)
    #[arg(short, long = "wordlist", value_name = "FILE")]
    wordlists: Vec<PathBuf>,

    /// Keyword marking the zone to fuzz [default: FUZZ]
    #[arg(short, long)]
    keyword: Option<String>,

    /// Shell used for execution [default: /bin/bash]
    #[arg(short, long)]
    shell: Option<String>,

    /// Delay in ms between two command launches [default: 0]
    #[arg(short, long, value_name = "MS")]
    delay: Option<u64>,

    /// Command execution timeout in seconds; the command is killed when reached [default: 30]
    #[arg(long, visible_alias = "to", value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Stdin template provided to the command
    #[arg(short, long)]
    input: Option<String>,

    /// Fuzz stdin (the --input template) instead of the command line
    #[arg(long = "stdin-fuzzing", visible_alias = "if")]
    stdin_fuzzing: bool,

    /// Display stdout number of characters
    #[arg(long = "oc", visible_alias = "stdout", help_heading = "Display")]
    show_stdout: bool,

    /// Display stderr number of characters
    #[arg(long = "ec", visible_alias = "stderr", help_heading = "Display")]
    show_stderr: bool,

    /// Display execution time
    #[arg(short = 't', long = "time", help_heading = "Display")]
    show_time: bool,

    /// Display exit code
    #[arg(short = 'c', long = "code", help_heading = "Display")]
    show_code: bool,

    /// Only display results whose stdout has at most N characters
    #[arg(long = "omax", visible_alias = "stdout-max", value_name = "N", help_heading = "Filters")]
    stdout_max: Vec<usize>,

    /// Only display results whose stdout has at least N characters
    #[arg(long = "omin", visible_alias = "stdout-min", value_name = "N", help_heading = "Filters")]
    stdout_min: Vec<usize>,

    /// Only display results whose stdout has exactly N characters
    #[arg(long = "oeq", visible_alias = "stdout-equal", value_name = "N", help_heading = "Filters")]
    stdout_eq: Vec<usize>,

    /// Only display results whose stdout contains WORD
    #[arg(long = "ow", visible_alias = "stdout-word", value_name = "WORD", help_heading = "Filters")]
    stdout_word: Vec<String>,

    /// Only display results whose stderr has at most N characters
    #[arg(long = "emax", visible_alias = "stderr-max", value_name = "N", help_heading = "Filters")]
    stderr_max: Vec<usize>,

    /// Only display results whose stderr has at least N characters
    #[arg(long = "emin", visible_alias = "stderr-min", value_name = "N", help_heading = "Filters")]
    stderr_min: Vec<usize>,

    /// Only display results whose stderr has exactly N characters
    #[arg(long = "eeq", visible_alias = "stderr-equal", value_name = "N", help_heading = "Filters")]
    stderr_eq: Vec<usize>,

    /// Only display results whose stderr contains WORD
    #[arg(long = "ew", visible_alias = "stderr-word", value_name = "WORD", help_heading = "Filters")]
    stderr_word: Vec<String>,

    /// Only display results that ran for at most N seconds
    #[arg(long = "tmax", visible_alias = "time-max", value_name = "N", help_heading = "Filters")]
    time_max: Vec<u64>,

    /// Only display results that ran for at least N seconds
    #[arg(long = "tmin", visible_alias = "time-min", value_name = "N", help_heading = "Filters")]
    time_min: Vec<u64>,

    /// Only display results that ran for exactly N seconds
    #[arg(long = "teq", visible_alias = "time-equal", value_name = "N", help_heading = "Filters")]
    time_eq: Vec<u64>,

    /// Only display results with a zero exit code
    #[arg(long, help_heading = "Filters")]
    success: bool,

    /// Only display results with a non-zero exit code
    #[arg(long, help_heading = "Filters")]
    failure: bool,

    /// Display results that do not pass the filters instead
    #[arg(short = 'H', long, help_heading = "Filters")]
    hide: bool,

    /// Print one JSON object per result
    #[arg(long)]
    json: bool,

    /// Do not print the configuration summary
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Command to fuzz
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error(transparent)]
    Load(#[from] ConfigLoadError),
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<ConfigError>),
}

/// A parsed command line: the validated run configuration plus
/// presentation options that never reach the engine.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub config: FuzzConfig,
    pub quiet: bool,
    pub verbosity: u8,
}

/// Values of a repeatable option paired with their position on the command line.
fn indexed<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Vec<(usize, T)> {
    match (matches.indices_of(id), matches.get_many::<T>(id)) {
        (Some(indices), Some(values)) => indices.zip(values.cloned()).collect(),
        _ => Vec::new(),
    }
}

fn flag_index(matches: &ArgMatches, id: &str) -> Option<usize> {
    matches
        .get_flag(id)
        .then(|| matches.index_of(id).unwrap_or(usize::MAX))
}

fn push_filters<T: Clone + Send + Sync + 'static>(
    out: &mut Vec<(usize, Filter)>,
    matches: &ArgMatches,
    id: &str,
    make: fn(T) -> Filter,
) {
    out.extend(
        indexed::<T>(matches, id)
            .into_iter()
            .map(|(index, value)| (index, make(value))),
    );
}

/// Filters in the order their flags appeared.
fn collect_filters(matches: &ArgMatches) -> Vec<Filter> {
    let mut filters = Vec::new();
    push_filters(&mut filters, matches, "stdout_max", Filter::StdoutMax);
    push_filters(&mut filters, matches, "stdout_min", Filter::StdoutMin);
    push_filters(&mut filters, matches, "stdout_eq", Filter::StdoutEq);
    push_filters(&mut filters, matches, "stdout_word", Filter::StdoutWord);
    push_filters(&mut filters, matches, "stderr_max", Filter::StderrMax);
    push_filters(&mut filters, matches, "stderr_min", Filter::StderrMin);
    push_filters(&mut filters, matches, "stderr_eq", Filter::StderrEq);
    push_filters(&mut filters, matches, "stderr_word", Filter::StderrWord);
    push_filters(&mut filters, matches, "time_max", Filter::TimeMax);
    push_filters(&mut filters, matches, "time_min", Filter::TimeMin);
    push_filters(&mut filters, matches, "time_eq", Filter::TimeEq);
    if let Some(index) = flag_index(matches, "success") {
        filters.push((index, Filter::ExitCode { success: true }));
    }
    if let Some(index) = flag_index(matches, "failure") {
        filters.push((index, Filter::ExitCode { success: false }));
    }
    filters.sort_by_key(|(index, _)| *index);
    filters.into_iter().map(|(_, filter)| filter).collect()
}

/// Display columns in the order their flags appeared.
fn collect_display_modes(matches: &ArgMatches) -> Vec<DisplayMode> {
    let mut modes: Vec<(usize, DisplayMode)> = [
        ("show_stdout", DisplayMode::StdoutChars),
        ("show_stderr", DisplayMode::StderrChars),
        ("show_time", DisplayMode::Time),
        ("show_code", DisplayMode::ExitCode),
    ]
    .into_iter()
    .filter_map(|(id, mode)| flag_index(matches, id).map(|index| (index, mode)))
    .collect();
    modes.sort_by_key(|(index, _)| *index);
    modes.into_iter().map(|(_, mode)| mode).collect()
}

/// Builds a validated [`FuzzConfig`] from command line arguments.
///
/// `env_command` is the value of `CFUZZ_CMD`; when non-empty it takes
/// precedence over the trailing command arguments. Values from `--config`
/// are loaded first and overridden by flags.
pub fn parse_config<I, T>(args: I, env_command: Option<String>) -> Result<Invocation, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;

    let mut config = match &cli.config {
        Some(path) => FuzzConfig::load_from_file(path)?,
        None => FuzzConfig::default(),
    };

    if let Some(command) = env_command.filter(|c| !c.is_empty()) {
        config.command = command;
    } else if !cli.command.is_empty() {
        config.command = cli.command.join(" ");
    }
    if !cli.wordlists.is_empty() {
        config.wordlists = cli.wordlists;
    }
    if let Some(keyword) = cli.keyword {
        config.keyword = keyword;
    }
    if let Some(shell) = cli.shell {
        config.shell = shell;
    }
    if let Some(delay) = cli.delay {
        config.delay_ms = delay;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(input) = cli.input {
        config.input = Some(input);
    }
    config.stdin_fuzzing |= cli.stdin_fuzzing;
    config.hide |= cli.hide;
    if cli.json {
        config.output_format = OutputFormat::Json;
    }

    let modes = collect_display_modes(&matches);
    if !modes.is_empty() {
        config.display_modes = modes;
    }
    config.filters.extend(collect_filters(&matches));
    config.spider |= config.wordlists.len() > 1;

    config.validate().map_err(CliError::Invalid)?;

    Ok(Invocation {
        config,
        quiet: cli.quiet,
        verbosity: cli.verbose,
    })
}

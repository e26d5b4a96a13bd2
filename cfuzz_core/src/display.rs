use crate::executor::ExecutionResult;
use serde::Deserialize;
use std::time::Duration;

/// A column shown after the substituted value for each reported result.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayMode {
    /// Number of bytes written to stdout.
    #[serde(rename = "stdout")]
    StdoutChars,
    /// Number of bytes written to stderr.
    #[serde(rename = "stderr")]
    StderrChars,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "code")]
    ExitCode,
}

const DEFAULT_MODES: &[DisplayMode] = &[DisplayMode::StdoutChars];

impl DisplayMode {
    pub fn name(&self) -> &'static str {
        match self {
            DisplayMode::StdoutChars => "stdout characters",
            DisplayMode::StderrChars => "stderr characters",
            DisplayMode::Time => "execution time",
            DisplayMode::ExitCode => "exit code",
        }
    }

    pub fn render(&self, result: &ExecutionResult) -> String {
        match self {
            DisplayMode::StdoutChars => result.stdout_len().to_string(),
            DisplayMode::StderrChars => result.stderr_len().to_string(),
            // A timed out result already carries the timeout as its elapsed time.
            DisplayMode::Time => format_duration(result.elapsed),
            DisplayMode::ExitCode => result.exit_code.clone(),
        }
    }
}

/// Renders a duration as hours, minutes and fractional seconds, e.g.
/// `1h0m0s`, `1m30.5s` or `2s`. Sub-second values keep their unit (`250ms`).
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    if duration < Duration::from_secs(1) {
        return format!("{duration:?}");
    }

    let total = duration.as_secs();
    let (hours, minutes, secs) = (total / 3600, total / 60 % 60, total % 60);
    let nanos = duration.subsec_nanos();
    let seconds = if nanos == 0 {
        secs.to_string()
    } else {
        let fraction = format!("{nanos:09}");
        format!("{secs}.{}", fraction.trim_end_matches('0'))
    };

    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, minutes) => format!("{minutes}m{seconds}s"),
        (hours, minutes) => format!("{hours}h{minutes}m{seconds}s"),
    }
}

/// The modes actually displayed: stdout length when none are configured.
pub fn effective_modes(modes: &[DisplayMode]) -> &[DisplayMode] {
    if modes.is_empty() { DEFAULT_MODES } else { modes }
}

/// One output row: the substitution followed by each column, tab separated.
pub fn format_line(result: &ExecutionResult, modes: &[DisplayMode]) -> String {
    let mut line = result.substitution.clone();
    for mode in effective_modes(modes) {
        line.push('\t');
        line.push_str(&mode.render(result));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::result_with;

    #[test]
    fn default_shows_stdout_length_only() {
        let result = ExecutionResult {
            substitution: "foo".to_string(),
            ..result_with("foo\n", "0")
        };
        assert_eq!(format_line(&result, &[]), "foo\t4");
    }

    #[test]
    fn columns_follow_configured_order() {
        let mut result = result_with("abc", "exit status 2");
        result.stderr = b"e".to_vec();
        result.elapsed = Duration::from_millis(1500);
        let line = format_line(
            &result,
            &[
                DisplayMode::ExitCode,
                DisplayMode::StderrChars,
                DisplayMode::Time,
                DisplayMode::StdoutChars,
            ],
        );
        assert_eq!(line, "value\texit status 2\t1\t1.5s\t3");
    }

    #[test]
    fn timed_out_result_shows_the_timeout() {
        let mut result = result_with("", "signal: killed");
        result.timed_out = true;
        result.elapsed = Duration::from_secs(1);
        assert_eq!(DisplayMode::Time.render(&result), "1s");
    }

    #[test]
    fn durations_split_into_hours_minutes_seconds() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_millis(61_500)), "1m1.5s");
        assert_eq!(format_duration(Duration::from_millis(2_003)), "2.003s");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
    }

    #[test]
    fn sub_second_durations_keep_their_unit() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1.5ms");
    }

    #[test]
    fn timed_out_minute_long_timeout_renders_minutes() {
        let mut result = result_with("", "signal: killed");
        result.timed_out = true;
        result.elapsed = Duration::from_secs(90);
        assert_eq!(DisplayMode::Time.render(&result), "1m30s");
    }

    #[test]
    fn effective_modes_falls_back_to_stdout() {
        assert_eq!(effective_modes(&[]), &[DisplayMode::StdoutChars]);
        assert_eq!(
            effective_modes(&[DisplayMode::Time]),
            &[DisplayMode::Time]
        );
    }
}

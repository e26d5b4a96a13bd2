use crate::executor::ExecutionResult;
use serde::Deserialize;

/// A predicate deciding whether an [`ExecutionResult`] is worth reporting.
///
/// Lengths are byte counts of the captured streams. Time thresholds are whole
/// seconds and compare against the elapsed time truncated to seconds.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Filter {
    StdoutMax(usize),
    StdoutMin(usize),
    StdoutEq(usize),
    /// Stdout contains the given substring.
    StdoutWord(String),
    StderrMax(usize),
    StderrMin(usize),
    StderrEq(usize),
    StderrWord(String),
    TimeMax(u64),
    TimeMin(u64),
    TimeEq(u64),
    /// `success = true` keeps exit code `0`, `false` keeps everything else.
    ExitCode { success: bool },
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::StdoutMax(_) => "stdout characters max",
            Filter::StdoutMin(_) => "stdout characters min",
            Filter::StdoutEq(_) => "stdout characters equal",
            Filter::StdoutWord(_) => "stdout word",
            Filter::StderrMax(_) => "stderr characters max",
            Filter::StderrMin(_) => "stderr characters min",
            Filter::StderrEq(_) => "stderr characters equal",
            Filter::StderrWord(_) => "stderr word",
            Filter::TimeMax(_) => "time max",
            Filter::TimeMin(_) => "time min",
            Filter::TimeEq(_) => "time equal",
            Filter::ExitCode { success: true } => "on success",
            Filter::ExitCode { success: false } => "non-zero exit code",
        }
    }

    /// The value the filter compares against, if it has one.
    pub fn threshold(&self) -> Option<String> {
        match self {
            Filter::StdoutMax(n)
            | Filter::StdoutMin(n)
            | Filter::StdoutEq(n)
            | Filter::StderrMax(n)
            | Filter::StderrMin(n)
            | Filter::StderrEq(n) => Some(n.to_string()),
            Filter::StdoutWord(word) | Filter::StderrWord(word) => Some(format!("{word:?}")),
            Filter::TimeMax(secs) | Filter::TimeMin(secs) | Filter::TimeEq(secs) => {
                Some(format!("{secs}s"))
            }
            Filter::ExitCode { .. } => None,
        }
    }

    pub fn evaluate(&self, result: &ExecutionResult) -> bool {
        let seconds = result.elapsed.as_secs();
        match self {
            Filter::StdoutMax(max) => result.stdout_len() <= *max,
            Filter::StdoutMin(min) => result.stdout_len() >= *min,
            Filter::StdoutEq(eq) => result.stdout_len() == *eq,
            Filter::StdoutWord(word) => result.stdout_text().contains(word.as_str()),
            Filter::StderrMax(max) => result.stderr_len() <= *max,
            Filter::StderrMin(min) => result.stderr_len() >= *min,
            Filter::StderrEq(eq) => result.stderr_len() == *eq,
            Filter::StderrWord(word) => result.stderr_text().contains(word.as_str()),
            Filter::TimeMax(max) => seconds <= *max,
            Filter::TimeMin(min) => seconds >= *min,
            Filter::TimeEq(eq) => seconds == *eq,
            Filter::ExitCode { success } => result.is_success() == *success,
        }
    }
}

/// Decides whether `result` is reported.
///
/// Without `hide`, every filter has to accept the result. With `hide`, the
/// result is dropped as soon as one filter accepts it, so only results failing
/// every filter are reported. No filters means everything is reported.
pub fn passes(filters: &[Filter], hide: bool, result: &ExecutionResult) -> bool {
    filters.iter().all(|filter| filter.evaluate(result) != hide)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::result_with;
    use std::time::Duration;

    #[test]
    fn length_filters_compare_stdout_bytes() {
        let result = result_with("hello", "0");
        assert!(Filter::StdoutMax(5).evaluate(&result));
        assert!(!Filter::StdoutMax(4).evaluate(&result));
        assert!(Filter::StdoutMin(5).evaluate(&result));
        assert!(!Filter::StdoutMin(6).evaluate(&result));
        assert!(Filter::StdoutEq(5).evaluate(&result));
        assert!(!Filter::StdoutEq(3).evaluate(&result));
    }

    #[test]
    fn stderr_filters_look_at_stderr_only() {
        let mut result = result_with("lots of stdout", "0");
        result.stderr = b"denied".to_vec();
        assert!(Filter::StderrEq(6).evaluate(&result));
        assert!(Filter::StderrMax(6).evaluate(&result));
        assert!(!Filter::StderrMin(7).evaluate(&result));
        assert!(Filter::StderrWord("deni".to_string()).evaluate(&result));
        assert!(!Filter::StderrWord("stdout".to_string()).evaluate(&result));
    }

    #[test]
    fn word_filter_is_substring_containment() {
        let result = result_with("uid=0(root) gid=0(root)", "0");
        assert!(Filter::StdoutWord("root".to_string()).evaluate(&result));
        assert!(Filter::StdoutWord("oo".to_string()).evaluate(&result));
        assert!(!Filter::StdoutWord("admin".to_string()).evaluate(&result));
    }

    #[test]
    fn time_filters_truncate_to_whole_seconds() {
        let mut result = result_with("", "0");
        result.elapsed = Duration::from_millis(2_900);
        assert!(Filter::TimeEq(2).evaluate(&result));
        assert!(Filter::TimeMax(2).evaluate(&result));
        assert!(!Filter::TimeMin(3).evaluate(&result));
        assert!(Filter::TimeMin(2).evaluate(&result));
    }

    #[test]
    fn exit_code_filter_selects_success_or_failure() {
        let ok = result_with("", "0");
        let failed = result_with("", "exit status 1");
        let success = Filter::ExitCode { success: true };
        let failure = Filter::ExitCode { success: false };
        assert!(success.evaluate(&ok));
        assert!(!success.evaluate(&failed));
        assert!(failure.evaluate(&failed));
        assert!(!failure.evaluate(&ok));
    }

    #[test]
    fn no_filters_pass_everything() {
        assert!(passes(&[], false, &result_with("x", "exit status 2")));
    }

    #[test]
    fn filters_are_combined_with_and() {
        let filters = [Filter::StdoutMax(5), Filter::ExitCode { success: true }];
        assert!(
            !passes(&filters, false, &result_with("0123456789", "0")),
            "10 characters of stdout must fail stdout-max(5) despite exit code 0"
        );
        assert!(passes(&filters, false, &result_with("abc", "0")));
        assert!(!passes(&filters, false, &result_with("abc", "exit status 1")));
    }

    #[test]
    fn hide_mode_reports_results_that_fail_the_filters() {
        let filters = [Filter::ExitCode { success: true }];
        assert!(
            !passes(&filters, true, &result_with("", "0")),
            "a successful result must be hidden"
        );
        assert!(
            passes(&filters, true, &result_with("", "exit status 1")),
            "a failing result must be reported"
        );
    }

    #[test]
    fn hide_mode_drops_when_any_filter_accepts() {
        let filters = [Filter::StdoutMax(5), Filter::ExitCode { success: true }];
        assert!(!passes(&filters, true, &result_with("0123456789", "0")));
        assert!(passes(&filters, true, &result_with("0123456789", "exit status 1")));
    }

    #[test]
    fn names_describe_the_filter() {
        assert_eq!(Filter::StdoutMax(1).name(), "stdout characters max");
        assert_eq!(Filter::ExitCode { success: true }.name(), "on success");
        assert_eq!(Filter::ExitCode { success: false }.name(), "non-zero exit code");
        assert_eq!(Filter::StdoutMax(1).threshold().as_deref(), Some("1"));
        assert_eq!(Filter::TimeMin(3).threshold().as_deref(), Some("3s"));
        assert_eq!(
            Filter::StderrWord("root".to_string()).threshold().as_deref(),
            Some("\"root\"")
        );
        assert_eq!(Filter::ExitCode { success: true }.threshold(), None);
    }
}

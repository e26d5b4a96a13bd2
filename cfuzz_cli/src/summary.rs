use cfuzz_core::config::FuzzConfig;
use cfuzz_core::display::effective_modes;
use std::fmt::Write;

const RULE: &str = "[*] ----------------------~~~~~~~~~~~~~~~~~~~---------------------- [*]";

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{:<20}{}", format!("{label}:"), value);
}

/// Human readable description of what is about to be fuzzed.
pub fn render(config: &FuzzConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}\n");

    if config.stdin_fuzzing {
        field(&mut out, "command", &config.command);
        field(&mut out, "stdin fuzzed", config.input.as_deref().unwrap_or_default());
    } else {
        field(&mut out, "command fuzzed", &config.command);
        if let Some(input) = &config.input {
            field(&mut out, "stdin", input);
        }
    }

    let wordlists: Vec<String> = config
        .wordlists
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let label = if config.spider { "wordlists (spider)" } else { "wordlist" };
    field(&mut out, label, &wordlists.join(", "));
    field(&mut out, "keyword", &config.keyword);
    field(&mut out, "shell", &config.shell);
    field(&mut out, "timeout", &format!("{}s", config.timeout_secs));
    if config.delay_ms > 0 {
        field(&mut out, "delay", &format!("{}ms", config.delay_ms));
    }

    let columns: Vec<&str> = effective_modes(&config.display_modes)
        .iter()
        .map(|mode| mode.name())
        .collect();
    field(&mut out, "columns", &columns.join(", "));

    if !config.filters.is_empty() {
        let filters: Vec<String> = config
            .filters
            .iter()
            .map(|filter| match filter.threshold() {
                Some(value) => format!("{} {value}", filter.name()),
                None => filter.name().to_string(),
            })
            .collect();
        field(&mut out, "filters", &filters.join(", "));
        if config.hide {
            let _ = writeln!(out, "Only results that do not pass the filters are displayed");
        }
    }

    let _ = writeln!(out, "\n{RULE}");
    out
}

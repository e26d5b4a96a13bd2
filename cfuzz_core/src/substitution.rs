//! Keyword substitution into command and stdin templates.
//!
//! Values are inserted verbatim, byte for byte. Nothing is quoted or escaped:
//! the resulting command is handed to a shell as-is.

use crate::config::FuzzConfig;
use crate::wordlist::Task;

/// A command line and optional stdin payload ready to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub command: Vec<u8>,
    pub stdin: Option<Vec<u8>>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Replaces every occurrence of `keyword` in `template` with `value`.
pub fn substitute_all(template: &[u8], keyword: &[u8], value: &[u8]) -> Vec<u8> {
    if keyword.is_empty() {
        return template.to_vec();
    }

    let mut rendered = Vec::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = find(rest, keyword) {
        rendered.extend_from_slice(&rest[..at]);
        rendered.extend_from_slice(value);
        rest = &rest[at + keyword.len()..];
    }
    rendered.extend_from_slice(rest);
    rendered
}

/// Replaces keyword occurrences left to right, one value per occurrence.
///
/// Returns the rendered bytes and how many values were consumed. Text that
/// has already been substituted is never searched again, so a value that
/// itself contains the keyword does not steal the next slot. Occurrences left
/// over once `values` runs out are kept literally.
pub fn substitute_positional<S: AsRef<[u8]>>(
    template: &[u8],
    keyword: &[u8],
    values: &[S],
) -> (Vec<u8>, usize) {
    if keyword.is_empty() {
        return (template.to_vec(), 0);
    }

    let mut rendered = Vec::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;
    while let Some(value) = values.get(consumed) {
        let Some(at) = find(rest, keyword) else {
            break;
        };
        rendered.extend_from_slice(&rest[..at]);
        rendered.extend_from_slice(value.as_ref());
        rest = &rest[at + keyword.len()..];
        consumed += 1;
    }
    rendered.extend_from_slice(rest);
    (rendered, consumed)
}

/// Builds the concrete command (and stdin payload) for one task.
///
/// In spider mode the task's values fill the command's occurrences first and
/// then continue into the stdin template.
pub fn render(config: &FuzzConfig, task: &Task) -> RenderedCommand {
    let keyword = config.keyword.as_bytes();
    let command = config.command.as_bytes();
    let stdin_template = config.stdin_template().map(str::as_bytes);

    if config.spider {
        let (command, used) = substitute_positional(command, keyword, task.values());
        let stdin = stdin_template
            .map(|template| substitute_positional(template, keyword, &task.values()[used..]).0);
        RenderedCommand { command, stdin }
    } else {
        let value = task.values().first().map(Vec::as_slice).unwrap_or_default();
        RenderedCommand {
            command: substitute_all(command, keyword, value),
            stdin: stdin_template.map(|template| substitute_all(template, keyword, value)),
        }
    }
}

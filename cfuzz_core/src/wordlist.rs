use crate::config::FuzzConfig;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest wordlist line accepted, newline excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Errors raised while turning wordlists into tasks. All of them are fatal to a run.
#[derive(Error, Debug)]
pub enum WordlistError {
    #[error("No wordlist configured")]
    NoWordlist,
    #[error("Failed to open wordlist {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read wordlist {path:?} at line {line}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Wordlist {path:?} line {line} is longer than {MAX_LINE_LEN} bytes")]
    LineTooLong { path: PathBuf, line: usize },
}

/// One unit of work: the values substituted for the keyword occurrences, in order.
///
/// Simple mode tasks carry a single value; spider mode tasks carry one value
/// per wordlist. Values are the raw line bytes, so a line that is not UTF-8
/// still reaches the command unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    values: Vec<Vec<u8>>,
}

impl Task {
    pub fn new<V: Into<Vec<u8>>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(value: impl Into<Vec<u8>>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// The form shown in the first output column. Lossy for non UTF-8 values.
    pub fn display(&self) -> String {
        self.values
            .iter()
            .map(|value| String::from_utf8_lossy(value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Reads one line without ever buffering more than `MAX_LINE_LEN` plus its
/// line terminator.
fn read_line<R: BufRead>(
    reader: &mut R,
    path: &Path,
    line: usize,
) -> Result<Option<Vec<u8>>, WordlistError> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 2)
        .read_until(b'\n', &mut buf)
        .map_err(|source| WordlistError::Read {
            path: path.to_path_buf(),
            line,
            source,
        })?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > MAX_LINE_LEN {
        return Err(WordlistError::LineTooLong {
            path: path.to_path_buf(),
            line,
        });
    }
    Ok(Some(buf))
}

/// Lazily yields one single-value task per wordlist line, in file order.
///
/// The stream is consumed once. After the first error it is exhausted.
pub struct WordlistStream<R = BufReader<File>> {
    reader: R,
    path: PathBuf,
    line: usize,
    finished: bool,
}

impl WordlistStream<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, WordlistError> {
        let file = File::open(path).map_err(|source| WordlistError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), path))
    }
}

impl<R: BufRead> WordlistStream<R> {
    pub fn from_reader(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            line: 0,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for WordlistStream<R> {
    type Item = Result<Task, WordlistError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.line += 1;
        match read_line(&mut self.reader, &self.path, self.line) {
            Ok(Some(value)) => Some(Ok(Task::single(value))),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads a whole wordlist into memory, one entry per line.
pub fn read_wordlist(path: &Path) -> Result<Vec<Vec<u8>>, WordlistError> {
    let mut lines = Vec::new();
    for task in WordlistStream::open(path)? {
        lines.extend(task?.values);
    }
    Ok(lines)
}

/// Every combination of one value per list, rightmost list varying fastest.
///
/// The result holds the product of the list lengths; an empty list (or no
/// list at all) produces no tasks.
pub fn cartesian_product<V: AsRef<[u8]>>(lists: &[Vec<V>]) -> Vec<Task> {
    if lists.is_empty() || lists.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut tuples: Vec<Vec<Vec<u8>>> = vec![Vec::with_capacity(lists.len())];
    for list in lists {
        let mut extended = Vec::with_capacity(tuples.len().saturating_mul(list.len()));
        for prefix in &tuples {
            for value in list {
                let mut tuple = prefix.clone();
                tuple.push(value.as_ref().to_vec());
                extended.push(tuple);
            }
        }
        tuples = extended;
    }
    tuples.into_iter().map(Task::new).collect()
}

/// Where a run takes its tasks from.
pub enum TaskSource {
    /// Simple mode: lines streamed from a single wordlist.
    Stream(WordlistStream),
    /// Spider mode: the fully materialized cartesian product.
    Product(std::vec::IntoIter<Task>),
}

impl TaskSource {
    /// Opens the wordlist(s) named by `config`.
    ///
    /// Every file is opened (and in spider mode fully read) before this
    /// returns, so a missing wordlist fails the run before anything is
    /// dispatched.
    pub fn open(config: &FuzzConfig) -> Result<Self, WordlistError> {
        if config.spider {
            let lists = config
                .wordlists
                .iter()
                .map(|path| read_wordlist(path))
                .collect::<Result<Vec<_>, _>>()?;
            let tasks = cartesian_product(&lists);
            tracing::debug!(
                wordlists = lists.len(),
                tasks = tasks.len(),
                "built spider task product"
            );
            Ok(TaskSource::Product(tasks.into_iter()))
        } else {
            let path = config.wordlists.first().ok_or(WordlistError::NoWordlist)?;
            Ok(TaskSource::Stream(WordlistStream::open(path)?))
        }
    }

    /// Number of remaining tasks, when known up front.
    pub fn known_len(&self) -> Option<usize> {
        match self {
            TaskSource::Stream(_) => None,
            TaskSource::Product(tasks) => Some(tasks.len()),
        }
    }
}

impl Iterator for TaskSource {
    type Item = Result<Task, WordlistError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TaskSource::Stream(stream) => stream.next(),
            TaskSource::Product(tasks) => tasks.next().map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn stream_of(content: &str) -> Vec<String> {
        WordlistStream::from_reader(Cursor::new(content.as_bytes().to_vec()), Path::new("mem"))
            .map(|task| task.expect("in-memory read should not fail").display())
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn write_wordlist(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).expect("create wordlist");
        file.write_all(content.as_bytes()).expect("write wordlist");
        path
    }

    #[test]
    fn stream_yields_each_line_including_empty_ones() {
        assert_eq!(stream_of("foo\n\nbar\n"), strings(&["foo", "", "bar"]));
    }

    #[test]
    fn stream_accepts_missing_trailing_newline_and_crlf() {
        assert_eq!(stream_of("a\r\nb"), strings(&["a", "b"]));
    }

    #[test]
    fn stream_of_empty_file_yields_nothing() {
        assert!(stream_of("").is_empty());
    }

    #[test]
    fn overlong_line_is_rejected_and_ends_the_stream() {
        let content = format!("ok\n{}\nnever\n", "x".repeat(MAX_LINE_LEN + 1));
        let mut stream =
            WordlistStream::from_reader(Cursor::new(content.into_bytes()), Path::new("big"));

        assert_eq!(stream.next().unwrap().unwrap(), Task::single("ok"));
        match stream.next() {
            Some(Err(WordlistError::LineTooLong { line, .. })) => assert_eq!(line, 2),
            other => panic!("expected LineTooLong, got {other:?}"),
        }
        assert!(stream.next().is_none(), "stream must stop after an error");
    }

    #[test]
    fn exact_limit_line_is_accepted_with_crlf() {
        let long = "y".repeat(MAX_LINE_LEN);
        let content = format!("{long}\r\nnext");
        assert_eq!(stream_of(&content), vec![long, "next".to_string()]);
    }

    #[test]
    fn endless_line_is_rejected_without_buffering_it() {
        let mut stream = WordlistStream::from_reader(
            BufReader::new(std::io::repeat(b'x')),
            Path::new("endless"),
        );
        match stream.next() {
            Some(Err(WordlistError::LineTooLong { line, .. })) => assert_eq!(line, 1),
            other => panic!("expected LineTooLong, got {other:?}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn non_utf8_lines_keep_their_bytes() {
        let mut stream = WordlistStream::from_reader(
            Cursor::new(b"\xffab\n\xc3\x28\n".to_vec()),
            Path::new("binary"),
        );
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.values(), &[b"\xffab".to_vec()]);
        assert_eq!(first.display(), "\u{FFFD}ab", "only the display form is lossy");
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.values(), &[vec![0xc3, 0x28]]);
        assert!(stream.next().is_none());
    }

    #[test]
    fn read_wordlist_returns_raw_lines() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("raw.txt");
        std::fs::write(&path, b"plain\n\xfe\n").expect("write wordlist");
        assert_eq!(
            read_wordlist(&path).unwrap(),
            vec![b"plain".to_vec(), vec![0xfe]]
        );
    }

    #[test]
    fn product_of_two_lists_is_odometer_ordered() {
        let tasks = cartesian_product(&[strings(&["a", "b"]), strings(&["1", "2", "3"])]);
        let rendered: Vec<String> = tasks.iter().map(Task::display).collect();
        assert_eq!(
            rendered,
            strings(&["a,1", "a,2", "a,3", "b,1", "b,2", "b,3"])
        );
    }

    #[test]
    fn product_count_is_product_of_lengths_and_tuples_are_unique() {
        let lists = vec![
            strings(&["a", "b", "c"]),
            strings(&["1", "2"]),
            strings(&["x", "y", "z", "w"]),
        ];
        let tasks = cartesian_product(&lists);
        assert_eq!(tasks.len(), 3 * 2 * 4);

        let unique: std::collections::HashSet<&Task> = tasks.iter().collect();
        assert_eq!(unique.len(), tasks.len(), "every tuple must appear once");

        assert_eq!(tasks[0].display(), "a,1,x");
        assert_eq!(tasks[1].display(), "a,1,y");
        assert_eq!(tasks[4].display(), "a,2,x");
        assert_eq!(tasks[23].display(), "c,2,w");
    }

    #[test]
    fn product_keeps_first_element_of_every_list() {
        let tasks = cartesian_product(&[strings(&["a"]), strings(&["b", "c"])]);
        assert_eq!(
            tasks,
            vec![
                Task::new(strings(&["a", "b"])),
                Task::new(strings(&["a", "c"]))
            ]
        );
    }

    #[test]
    fn product_with_an_empty_list_is_empty() {
        assert!(cartesian_product(&[strings(&["a"]), Vec::new()]).is_empty());
        assert!(cartesian_product::<String>(&[]).is_empty());
    }

    #[test]
    fn task_source_streams_single_wordlist() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = write_wordlist(&dir, "words.txt", "foo\nbar\n");
        let config = FuzzConfig {
            wordlists: vec![path],
            ..FuzzConfig::default()
        };

        let source = TaskSource::open(&config).expect("wordlist should open");
        assert_eq!(source.known_len(), None);
        let tasks: Vec<Task> = source.map(|t| t.unwrap()).collect();
        assert_eq!(tasks, vec![Task::single("foo"), Task::single("bar")]);
    }

    #[test]
    fn task_source_builds_product_in_spider_mode() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let first = write_wordlist(&dir, "first.txt", "a\nb\n");
        let second = write_wordlist(&dir, "second.txt", "1\n2");
        let config = FuzzConfig {
            wordlists: vec![first, second],
            spider: true,
            ..FuzzConfig::default()
        };

        let source = TaskSource::open(&config).expect("wordlists should open");
        assert_eq!(source.known_len(), Some(4));
        let rendered: Vec<String> = source.map(|t| t.unwrap().display()).collect();
        assert_eq!(rendered, strings(&["a,1", "a,2", "b,1", "b,2"]));
    }

    #[test]
    fn missing_wordlist_fails_to_open() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let present = write_wordlist(&dir, "present.txt", "a\n");
        let config = FuzzConfig {
            wordlists: vec![present, dir.path().join("absent.txt")],
            spider: true,
            ..FuzzConfig::default()
        };
        match TaskSource::open(&config) {
            Err(WordlistError::Open { path, .. }) => assert!(path.ends_with("absent.txt")),
            Err(e) => panic!("expected an open error, got {e:?}"),
            Ok(_) => panic!("a missing wordlist must be fatal"),
        }
    }

    #[test]
    fn no_wordlist_is_an_error() {
        match TaskSource::open(&FuzzConfig::default()) {
            Err(WordlistError::NoWordlist) => {}
            Err(e) => panic!("expected NoWordlist, got {e:?}"),
            Ok(_) => panic!("opening without a wordlist must fail"),
        }
    }
}

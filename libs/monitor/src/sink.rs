//! Output sink the monitor writes human-readable lines to.

/// Severity of a written line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Output,
    Info,
    Error,
}

/// Append-only line sink.
///
/// Every call carries exactly one whole line without a trailing newline.
pub trait OutputSink: Send {
    /// Write a plain change event line.
    fn output(&mut self, line: &str);

    /// Write a progress line (session start, completion).
    fn info(&mut self, line: &str);

    /// Write an error line.
    fn error(&mut self, line: &str);
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn output(&mut self, line: &str) {
        (**self).output(line);
    }

    fn info(&mut self, line: &str) {
        (**self).info(line);
    }

    fn error(&mut self, line: &str) {
        (**self).error(line);
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn output(&mut self, line: &str) {
        (**self).output(line);
    }

    fn info(&mut self, line: &str) {
        (**self).info(line);
    }

    fn error(&mut self, line: &str) {
        (**self).error(line);
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Vec<(Level, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[(Level, String)] {
        &self.lines
    }

    /// All lines joined with newlines, regardless of level.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (_, line) in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Lines written at the given level.
    pub fn at(&self, level: Level) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl OutputSink for MemorySink {
    fn output(&mut self, line: &str) {
        self.lines.push((Level::Output, line.to_string()));
    }

    fn info(&mut self, line: &str) {
        self.lines.push((Level::Info, line.to_string()));
    }

    fn error(&mut self, line: &str) {
        self.lines.push((Level::Error, line.to_string()));
    }
}

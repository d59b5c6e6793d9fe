//! Output sinks for the `@print` compile-time debug intrinsic.
//!
//! Implement [`PrintWriter`] to capture or redirect output produced while the
//! elaborator evaluates `@print` calls. The default implementation `StdPrint`
//! writes to stdout; `CollectStringPrint` collects into a string for tests.

use std::{
    borrow::Cow,
    io::{self, Write as _},
};

/// Trait for handling output from the `@print` intrinsic.
pub trait PrintWriter {
    /// Called once for each formatted value passed to `@print`.
    ///
    /// This method writes only the value's text; the trailing newline is
    /// emitted via [`PrintWriter::push`].
    fn write(&mut self, output: Cow<'_, str>);

    /// Adds a single character, generally the newline terminating a `@print`.
    fn push(&mut self, end: char);
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write(&mut self, output: Cow<'_, str>) {
        let _ = io::stdout().write_all(output.as_bytes());
    }

    fn push(&mut self, end: char) {
        let mut buffer = [0u8; 4];
        let _ = io::stdout().write_all(end.encode_utf8(&mut buffer).as_bytes());
        let _ = io::stdout().flush();
    }
}

/// A `PrintWriter` that discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write(&mut self, _output: Cow<'_, str>) {}

    fn push(&mut self, _end: char) {}
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful in tests to assert on compile-time print output.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    output: String,
}

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected output, leaving the collector empty.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Returns the collected output without consuming it.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl PrintWriter for CollectStringPrint {
    fn write(&mut self, output: Cow<'_, str>) {
        self.output.push_str(&output);
    }

    fn push(&mut self, end: char) {
        self.output.push(end);
    }
}

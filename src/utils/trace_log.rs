//! Execution log written next to a program run.
//!
//! The file starts with the program source, followed by an empty line and one
//! timestamped line per executed instruction:
//!
//! ```text
//! SET 4 0
//! OUT 0
//!
//! 2024/01/01 - 13:45:30.000250:  	[0000] SET  Set value '4' into #0
//! 2024/01/01 - 13:45:30.000261:  	[0001] OUT  Output from #0 ('4')
//! ```

use crate::utils::log::Timestamp;
use crate::virtual_machine::vm::{TraceEntry, TraceSink};
use std::fs;
use std::io;
use std::path::Path;

/// [`TraceSink`] that buffers a run's trace for a log file.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    program: String,
    lines: Vec<String>,
}

impl TraceLog {
    /// Starts a log for the given program source.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            lines: Vec::new(),
        }
    }

    /// Appends a free-form line, such as the error that stopped the run.
    pub fn note(&mut self, text: impl AsRef<str>) {
        self.push(Timestamp::now(), text.as_ref());
    }

    fn push(&mut self, at: Timestamp, text: &str) {
        self.lines.push(format!(
            "{:04}/{:02}/{:02} - {:02}:{:02}:{:02}.{:06}:  \t{}",
            at.year, at.month, at.day, at.hour, at.minute, at.second, at.micros, text
        ));
    }

    /// Number of logged lines after the program header.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The full log file content.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.program.len() + 2 + self.lines.len() * 64);
        out.push_str(self.program.trim_end());
        out.push_str("\n\n");
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.render())
    }
}

impl TraceSink for TraceLog {
    fn record(&mut self, entry: TraceEntry) {
        self.push(Timestamp::now(), &entry.to_string());
    }
}

//! Console and clock collaborators of the machine.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Services the machine needs from its environment.
///
/// `IN` and `OUT` go through [`read_line`](Host::read_line) and
/// [`write_line`](Host::write_line); `TIME` reads [`now_nanos`](Host::now_nanos).
pub trait Host {
    /// Reads one line of input without its line terminator.
    ///
    /// Returns an empty string once the input is exhausted.
    fn read_line(&mut self) -> io::Result<String>;

    /// Writes one line of output.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Current wall-clock time in nanoseconds.
    fn now_nanos(&mut self) -> i64;
}

/// Host backed by the process's standard input and output.
#[derive(Debug, Default)]
pub struct StdHost {
    /// Printed before each read, without a newline.
    prompt: Option<String>,
}

impl StdHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints `prompt` before every `IN`.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

impl Host for StdHost {
    fn read_line(&mut self) -> io::Result<String> {
        if let Some(prompt) = &self.prompt {
            let mut stdout = io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
        }

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()
    }

    fn now_nanos(&mut self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64
    }
}

/// In-memory host with scripted input, captured output and a stepping clock.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHost {
    input: VecDeque<String>,
    output: Vec<String>,
    clock: i64,
    clock_step: i64,
}

impl ScriptedHost {
    /// Creates a host that answers `IN` with `lines`, in order.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The clock starts at `start` and advances by `step` on every reading.
    pub fn with_clock(mut self, start: i64, step: i64) -> Self {
        self.clock = start;
        self.clock_step = step;
        self
    }

    /// Lines written so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Input lines not consumed yet.
    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Host for ScriptedHost {
    fn read_line(&mut self) -> io::Result<String> {
        Ok(self.input.pop_front().unwrap_or_default())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.output.push(line.to_string());
        Ok(())
    }

    fn now_nanos(&mut self) -> i64 {
        let now = self.clock;
        self.clock = self.clock.wrapping_add(self.clock_step);
        now
    }
}

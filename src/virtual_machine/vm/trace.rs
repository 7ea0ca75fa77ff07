use std::fmt;

/// One executed instruction, as seen by a [`TraceSink`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    /// Zero-based index of the cycle that executed the instruction.
    pub cycle: u64,
    /// Position of the instruction.
    pub pc: usize,
    pub mnemonic: &'static str,
    /// What the instruction did, with the addresses and values involved.
    pub detail: String,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:04}] {:<4} {}", self.pc, self.mnemonic, self.detail)
    }
}

/// Side channel receiving one entry per executed instruction.
pub trait TraceSink {
    /// Whether entries should be produced at all.
    ///
    /// Handlers skip formatting the detail text when this returns `false`.
    fn enabled(&self) -> bool {
        true
    }

    fn record(&mut self, entry: TraceEntry);
}

/// Discards everything; tracing is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&mut self, _entry: TraceEntry) {}
}

/// Keeps every entry in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<TraceEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detail texts only, in execution order.
    pub fn details(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.detail.as_str()).collect()
    }
}

impl TraceSink for MemorySink {
    fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }
}

impl<T: TraceSink + ?Sized> TraceSink for &mut T {
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn record(&mut self, entry: TraceEntry) {
        (**self).record(entry)
    }
}

/// Instruction tape size of a default machine.
pub const DEFAULT_INSTRUCTION_CAPACITY: usize = 256;
/// Value tape size of a default machine.
pub const DEFAULT_VALUE_CAPACITY: usize = 256;

/// Sizing and budget of one machine run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MachineConfig {
    /// Number of instruction cells; longer programs are rejected at load.
    pub instruction_capacity: usize,
    /// Number of value cells.
    pub value_capacity: usize,
    /// Maximum number of executed instructions, unbounded when `None`.
    pub cycle_limit: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            instruction_capacity: DEFAULT_INSTRUCTION_CAPACITY,
            value_capacity: DEFAULT_VALUE_CAPACITY,
            cycle_limit: None,
        }
    }
}

impl MachineConfig {
    pub fn with_instruction_capacity(mut self, capacity: usize) -> Self {
        self.instruction_capacity = capacity;
        self
    }

    pub fn with_value_capacity(mut self, capacity: usize) -> Self {
        self.value_capacity = capacity;
        self
    }

    pub fn with_cycle_limit(mut self, limit: u64) -> Self {
        self.cycle_limit = Some(limit);
        self
    }
}

/// Why the machine stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Halt {
    /// A `TERM` instruction was executed.
    Terminated,
    /// The program counter moved past the last instruction.
    EndOfProgram,
    /// An instruction failed. The step that ran it returned the error; the
    /// machine executes nothing afterwards.
    Faulted,
}

/// Call stack frame storing the position of the calling instruction.
#[derive(Clone, Copy, Debug)]
pub(super) struct CallFrame {
    /// Position of the `CALL`; execution resumes right after it.
    pub(super) call_site: usize,
}

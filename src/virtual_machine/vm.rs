mod context;
mod host;
mod profile;
#[cfg(test)]
mod tests;
mod trace;

use crate::virtual_machine::errors::{RuntimeError, RuntimeErrorKind};
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::operand::{Parameter, parse_i64};
use crate::virtual_machine::program::{Instruction, Program};
use crate::virtual_machine::tape::Tape;
use context::CallFrame;

pub use context::{DEFAULT_INSTRUCTION_CAPACITY, DEFAULT_VALUE_CAPACITY, Halt, MachineConfig};
pub use host::{Host, ScriptedHost, StdHost};
pub use profile::{CycleCategory, CycleProfile};
pub use trace::{MemorySink, NullSink, TraceEntry, TraceSink};

/// Outcome of one opcode handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Flow {
    /// Continue with the next instruction.
    Next,
    /// Continue at the given position.
    Jump(usize),
    /// Stop normally.
    Halt,
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        host = $host:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    let instr_name = $opcode.mnemonic();
                    exec_vm!(@call $vm, $host, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that talks to the host (semicolon separator)
    (@call $vm:ident, $host:ident, $instr_name:expr, $handler:ident,
        (host; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        let ($( $field, )*) = exec_vm!(@operands $vm, $( $field : $kind ),*);
        $vm.$handler($instr_name, $host, $( $field ),*)
    }};

    // Handler without host access (no semicolon)
    (@call $vm:ident, $host:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        let ($( $field, )*) = exec_vm!(@operands $vm, $( $field : $kind ),*);
        $vm.$handler($instr_name, $( $field ),*)
    }};

    // Copy the operands out of the current instruction
    (@operands $vm:ident, $( $field:ident : $kind:ident ),*) => {{
        let params = $vm.fetch()?.params();
        let &[$( $field ),*] = params else {
            unreachable!("operand count is checked by Instruction::new");
        };
        ($( exec_vm!(@read $field, $kind), )*)
    }};

    // Literal payload
    (@read $param:ident, Value) => { $param.data };
    // Address operand, resolved by the handler
    (@read $param:ident, Addr) => { $param };
    // Non-negative instruction position
    (@read $param:ident, Label) => { $param.data as usize };
}

/// Operands and result of a binary arithmetic instruction.
struct Arithmetic {
    a: i64,
    va: i64,
    b: i64,
    vb: i64,
    dst: i64,
    result: i64,
}

/// Tape virtual machine.
///
/// Owns an instruction tape, a value tape, the program counter and the call
/// stack for exactly one program run. Executes one instruction per cycle
/// until `TERM`, until the counter leaves the program, or until a fault.
///
/// Every executed instruction is reported to the [`TraceSink`] `T`; the default
/// [`NullSink`] disables tracing.
pub struct VM<T: TraceSink = NullSink> {
    /// Loaded program; cells past the last instruction stay unset.
    instructions: Tape<Instruction>,
    /// Program data.
    values: Tape<i64>,
    /// Position of the next instruction to execute.
    pc: usize,
    /// Call stack for subroutine calls.
    call_stack: Vec<CallFrame>,
    config: MachineConfig,
    /// Instructions executed so far.
    cycles: u64,
    profile: CycleProfile,
    trace: T,
    halted: Option<Halt>,
}

impl VM<NullSink> {
    /// Creates a VM with tracing disabled.
    pub fn new(program: Program, config: MachineConfig) -> Result<Self, RuntimeError> {
        Self::with_trace(program, config, NullSink)
    }
}

impl<T: TraceSink> VM<T> {
    /// Loads the program into a fresh instruction tape.
    ///
    /// Fails with [`RuntimeErrorKind::ProgramTooLarge`] when the program does
    /// not fit `config.instruction_capacity`; the error points at the first
    /// instruction left over.
    pub fn with_trace(
        program: Program,
        config: MachineConfig,
        trace: T,
    ) -> Result<Self, RuntimeError> {
        let capacity = config.instruction_capacity;
        if let Some(overflow) = program.get(capacity) {
            return Err(RuntimeError {
                pc: capacity,
                mnemonic: overflow.opcode().mnemonic(),
                kind: RuntimeErrorKind::ProgramTooLarge {
                    length: program.len(),
                    capacity,
                },
            });
        }

        let mut instructions = Tape::new(capacity);
        for (position, instruction) in program.into_instructions().into_iter().enumerate() {
            let mnemonic = instruction.opcode().mnemonic();
            instructions
                .write(position as i64, instruction)
                .map_err(|err| RuntimeError {
                    pc: position,
                    mnemonic,
                    kind: err.into(),
                })?;
        }

        Ok(Self {
            instructions,
            values: Tape::new(config.value_capacity),
            pc: 0,
            call_stack: Vec::new(),
            config,
            cycles: 0,
            profile: CycleProfile::new(),
            trace,
            halted: None,
        })
    }

    /// Executes instructions until the program halts or faults.
    pub fn run<H: Host>(&mut self, host: &mut H) -> Result<Halt, RuntimeError> {
        loop {
            if let Some(halt) = self.step(host)? {
                return Ok(halt);
            }
        }
    }

    /// Executes a single instruction.
    ///
    /// Returns `Some` once the machine has halted; further calls keep
    /// returning the same halt without executing anything. A failing
    /// instruction returns its error once and leaves the machine in
    /// [`Halt::Faulted`].
    pub fn step<H: Host>(&mut self, host: &mut H) -> Result<Option<Halt>, RuntimeError> {
        if self.halted.is_some() {
            return Ok(self.halted);
        }
        let result = self.cycle(host);
        if result.is_err() {
            self.halted = Some(Halt::Faulted);
        }
        result
    }

    fn cycle<H: Host>(&mut self, host: &mut H) -> Result<Option<Halt>, RuntimeError> {
        let pc = self.pc;
        // an unset cell or a counter past the tape both mean the program is over
        let Some(opcode) = self
            .instructions
            .get(pc as i64)
            .ok()
            .flatten()
            .map(Instruction::opcode)
        else {
            self.halted = Some(Halt::EndOfProgram);
            return Ok(self.halted);
        };

        if let Some(limit) = self.config.cycle_limit.filter(|&limit| self.cycles >= limit) {
            return Err(RuntimeError {
                pc,
                mnemonic: opcode.mnemonic(),
                kind: RuntimeErrorKind::CycleLimitExceeded { limit },
            });
        }

        let result = self.exec(opcode, host);
        self.cycles += 1;
        self.profile.add(opcode.category(), 1);

        let flow = result.map_err(|kind| RuntimeError {
            pc,
            mnemonic: opcode.mnemonic(),
            kind,
        })?;
        match flow {
            Flow::Next => self.pc += 1,
            Flow::Jump(target) => self.pc = target,
            Flow::Halt => self.halted = Some(Halt::Terminated),
        }
        Ok(self.halted)
    }

    /// Position of the next instruction to execute.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Number of calls awaiting a return.
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn values(&self) -> &Tape<i64> {
        &self.values
    }

    /// Instructions executed so far, including one that faulted.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn profile(&self) -> &CycleProfile {
        &self.profile
    }

    pub fn halted(&self) -> Option<Halt> {
        self.halted
    }

    pub fn trace(&self) -> &T {
        &self.trace
    }

    pub fn into_trace(self) -> T {
        self.trace
    }

    /// Returns the instruction under the program counter.
    fn fetch(&self) -> Result<&Instruction, RuntimeErrorKind> {
        Ok(self.instructions.read(self.pc as i64)?)
    }

    /// Executes the instruction under the program counter.
    fn exec<H: Host>(&mut self, opcode: Opcode, host: &mut H) -> Result<Flow, RuntimeErrorKind> {
        exec_vm! {
            vm = self,
            host = host,
            opcode = opcode,
            {
                // Memory
                Set => op_set(value: Value, dst: Addr),
                Mov => op_mov(src: Addr, dst: Addr),
                Time => op_time(host; dst: Addr),
                // Console
                In => op_in(host; dst: Addr),
                Out => op_out(host; src: Addr),
                // Integer arithmetic
                Add => op_add(a: Addr, b: Addr, dst: Addr),
                Sub => op_sub(a: Addr, b: Addr, dst: Addr),
                Mul => op_mul(a: Addr, b: Addr, dst: Addr),
                Div => op_div(a: Addr, b: Addr, dst: Addr),
                Mod => op_mod(a: Addr, b: Addr, dst: Addr),
                // Control Flow
                Jmp => op_jmp(target: Label),
                Jgt => op_jgt(a: Addr, b: Addr, target: Label),
                Jeq => op_jeq(a: Addr, b: Addr, target: Label),
                Jlt => op_jlt(a: Addr, b: Addr, target: Label),
                Call => op_call(target: Label),
                Ret => op_ret(),
                Term => op_term(),
            }
        }
    }

    /// Returns the effective address of an address operand.
    ///
    /// A reference is followed exactly once: the cell it names holds the address.
    #[inline]
    fn resolve(&self, param: Parameter) -> Result<i64, RuntimeErrorKind> {
        if param.is_reference {
            self.load(param.data)
        } else {
            Ok(param.data)
        }
    }

    #[inline]
    fn load(&self, address: i64) -> Result<i64, RuntimeErrorKind> {
        Ok(*self.values.read(address)?)
    }

    #[inline]
    fn store(&mut self, address: i64, value: i64) -> Result<(), RuntimeErrorKind> {
        Ok(self.values.write(address, value)?)
    }

    /// Reports the current instruction; `detail` only runs when tracing is on.
    #[inline]
    fn record(&mut self, instr: &'static str, detail: impl FnOnce() -> String) {
        if self.trace.enabled() {
            let entry = TraceEntry {
                cycle: self.cycles,
                pc: self.pc,
                mnemonic: instr,
                detail: detail(),
            };
            self.trace.record(entry);
        }
    }

    fn op_set(
        &mut self,
        instr: &'static str,
        value: i64,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let dst = self.resolve(dst)?;
        self.store(dst, value)?;
        self.record(instr, || format!("Set value '{value}' into #{dst}"));
        Ok(Flow::Next)
    }

    fn op_mov(
        &mut self,
        instr: &'static str,
        src: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let src = self.resolve(src)?;
        let value = self.load(src)?;
        let dst = self.resolve(dst)?;
        self.store(dst, value)?;
        self.record(instr, || format!("Move #{src} ('{value}') into #{dst}"));
        Ok(Flow::Next)
    }

    fn op_time<H: Host>(
        &mut self,
        instr: &'static str,
        host: &mut H,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let dst = self.resolve(dst)?;
        let now = host.now_nanos();
        self.store(dst, now)?;
        self.record(instr, || format!("Time {now} into #{dst}"));
        Ok(Flow::Next)
    }

    fn op_in<H: Host>(
        &mut self,
        instr: &'static str,
        host: &mut H,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let dst = self.resolve(dst)?;
        let line = host.read_line()?;
        let input = line.trim();
        let value = parse_i64(input).ok_or_else(|| RuntimeErrorKind::InputParseFailure {
            input: input.to_string(),
        })?;
        self.store(dst, value)?;
        self.record(instr, || format!("Input value '{value}' into #{dst}"));
        Ok(Flow::Next)
    }

    fn op_out<H: Host>(
        &mut self,
        instr: &'static str,
        host: &mut H,
        src: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let src = self.resolve(src)?;
        let value = self.load(src)?;
        host.write_line(&value.to_string())?;
        self.record(instr, || format!("Output from #{src} ('{value}')"));
        Ok(Flow::Next)
    }

    /// Reads both operands, applies `op` and writes the result.
    ///
    /// `op` returns `None` for a zero divisor.
    fn arithmetic(
        &mut self,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<Arithmetic, RuntimeErrorKind> {
        let a = self.resolve(a)?;
        let va = self.load(a)?;
        let b = self.resolve(b)?;
        let vb = self.load(b)?;
        let result = op(va, vb).ok_or(RuntimeErrorKind::DivisionByZero)?;
        let dst = self.resolve(dst)?;
        self.store(dst, result)?;
        Ok(Arithmetic {
            a,
            va,
            b,
            vb,
            dst,
            result,
        })
    }

    fn op_add(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let op = self.arithmetic(a, b, dst, |x, y| Some(x.wrapping_add(y)))?;
        self.record(instr, || {
            format!(
                "Add #{} ('{}') and #{} ('{}') into #{} ('{}')",
                op.a, op.va, op.b, op.vb, op.dst, op.result
            )
        });
        Ok(Flow::Next)
    }

    fn op_sub(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let op = self.arithmetic(a, b, dst, |x, y| Some(x.wrapping_sub(y)))?;
        self.record(instr, || {
            format!(
                "Subtract #{} ('{}') from #{} ('{}') into #{} ('{}')",
                op.b, op.vb, op.a, op.va, op.dst, op.result
            )
        });
        Ok(Flow::Next)
    }

    fn op_mul(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let op = self.arithmetic(a, b, dst, |x, y| Some(x.wrapping_mul(y)))?;
        self.record(instr, || {
            format!(
                "Multiply #{} ('{}') and #{} ('{}') into #{} ('{}')",
                op.a, op.va, op.b, op.vb, op.dst, op.result
            )
        });
        Ok(Flow::Next)
    }

    fn op_div(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let op = self.arithmetic(a, b, dst, |x, y| (y != 0).then(|| x.wrapping_div(y)))?;
        self.record(instr, || {
            format!(
                "Divide #{} ('{}') by #{} ('{}') into #{} ('{}')",
                op.a, op.va, op.b, op.vb, op.dst, op.result
            )
        });
        Ok(Flow::Next)
    }

    fn op_mod(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        dst: Parameter,
    ) -> Result<Flow, RuntimeErrorKind> {
        let op = self.arithmetic(a, b, dst, |x, y| (y != 0).then(|| x.wrapping_rem(y)))?;
        self.record(instr, || {
            format!(
                "Modulo #{} ('{}') by #{} ('{}') into #{} ('{}')",
                op.a, op.va, op.b, op.vb, op.dst, op.result
            )
        });
        Ok(Flow::Next)
    }

    fn op_jmp(&mut self, instr: &'static str, target: usize) -> Result<Flow, RuntimeErrorKind> {
        self.record(instr, || format!("Jump to {target}"));
        Ok(Flow::Jump(target))
    }

    /// Jumps to `target` when `holds` is true for the two operand values.
    fn branch(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        target: usize,
        symbol: &'static str,
        holds: fn(&i64, &i64) -> bool,
    ) -> Result<Flow, RuntimeErrorKind> {
        let a = self.resolve(a)?;
        let va = self.load(a)?;
        let b = self.resolve(b)?;
        let vb = self.load(b)?;
        let taken = holds(&va, &vb);

        self.record(instr, || {
            let condition = format!("#{a} ('{va}') {symbol} #{b} ('{vb}')");
            if taken {
                format!("Jump to {target} [{condition}]")
            } else {
                format!("No jump [{condition} is false]")
            }
        });

        Ok(if taken { Flow::Jump(target) } else { Flow::Next })
    }

    fn op_jgt(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        target: usize,
    ) -> Result<Flow, RuntimeErrorKind> {
        self.branch(instr, a, b, target, ">", i64::gt)
    }

    fn op_jeq(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        target: usize,
    ) -> Result<Flow, RuntimeErrorKind> {
        self.branch(instr, a, b, target, "==", i64::eq)
    }

    fn op_jlt(
        &mut self,
        instr: &'static str,
        a: Parameter,
        b: Parameter,
        target: usize,
    ) -> Result<Flow, RuntimeErrorKind> {
        self.branch(instr, a, b, target, "<", i64::lt)
    }

    fn op_call(&mut self, instr: &'static str, target: usize) -> Result<Flow, RuntimeErrorKind> {
        self.call_stack.push(CallFrame { call_site: self.pc });
        self.record(instr, || format!("Call {target}"));
        Ok(Flow::Jump(target))
    }

    fn op_ret(&mut self, instr: &'static str) -> Result<Flow, RuntimeErrorKind> {
        let Some(frame) = self.call_stack.pop() else {
            // nothing to return to
            self.record(instr, || "Return (noop)".to_string());
            return Ok(Flow::Next);
        };

        let resume = frame.call_site + 1;
        self.record(instr, || format!("Return to {resume}"));
        Ok(Flow::Jump(resume))
    }

    fn op_term(&mut self, instr: &'static str) -> Result<Flow, RuntimeErrorKind> {
        self.record(instr, || "Terminate".to_string());
        Ok(Flow::Halt)
    }
}

/// Runs `program` on standard input and output with `value_capacity` value
/// cells. The instruction tape is sized to hold the whole program.
pub fn run(program: Program, value_capacity: usize) -> Result<Halt, RuntimeError> {
    let config = MachineConfig::default()
        .with_value_capacity(value_capacity)
        .with_instruction_capacity(program.len().max(DEFAULT_INSTRUCTION_CAPACITY));
    VM::new(program, config)?.run(&mut StdHost::new())
}

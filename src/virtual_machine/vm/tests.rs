use super::*;
use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::errors::{RuntimeError, RuntimeErrorKind};
use proptest::prelude::*;

fn load(source: &str, config: MachineConfig) -> VM<MemorySink> {
    let program = assemble_source(source).expect("assembly failed");
    VM::with_trace(program, config, MemorySink::new()).expect("vm new failed")
}

fn run_with(
    source: &str,
    input: &[&str],
    config: MachineConfig,
) -> (VM<MemorySink>, ScriptedHost, Result<Halt, RuntimeError>) {
    let mut vm = load(source, config);
    let mut host = ScriptedHost::new(input.iter().copied());
    let result = vm.run(&mut host);
    (vm, host, result)
}

fn run_with_input(source: &str, input: &[&str]) -> (VM<MemorySink>, Vec<String>) {
    let (vm, host, result) = run_with(source, input, MachineConfig::default());
    result.expect("vm run failed");
    (vm, host.output().to_vec())
}

fn run_vm(source: &str) -> (VM<MemorySink>, Vec<String>) {
    run_with_input(source, &[])
}

fn output(source: &str) -> Vec<String> {
    run_vm(source).1
}

fn run_expect_err(source: &str) -> RuntimeError {
    run_expect_err_with(source, &[], MachineConfig::default())
}

fn run_expect_err_with(source: &str, input: &[&str], config: MachineConfig) -> RuntimeError {
    let (_, _, result) = run_with(source, input, config);
    result.expect_err("expected error")
}

// ==================== Memory ====================

#[test]
fn set_overwrites_direct_cell() {
    assert_eq!(output("SET 5 0\nSET 7 0\nOUT 0"), ["7"]);
}

#[test]
fn indirect_write_goes_through_cell() {
    let (vm, out) = run_vm(
        r#"
            SET 10 0
            SET 99 &0
            OUT 10
        "#,
    );
    assert_eq!(out, ["99"]);
    assert_eq!(vm.values().read(0), Ok(&10));
    assert_eq!(vm.values().read(10), Ok(&99));
}

#[test]
fn indirection_is_applied_once() {
    // cell 0 -> 1, cell 1 -> 2: &0 means cell 1, never cell 2
    let out = output("SET 1 0\nSET 2 1\nSET 5 2\nOUT &0");
    assert_eq!(out, ["2"]);
}

#[test]
fn indirect_through_unset_cell_fails() {
    let err = run_expect_err("SET 5 &0");
    assert_eq!(err.pc, 0);
    assert_eq!(err.mnemonic, "SET");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::UninitializedRead { address: 0 }
    ));
}

#[test]
fn mov_copies_value() {
    assert_eq!(output("SET 8 0\nMOV 0 1\nOUT 1"), ["8"]);
    assert_eq!(output("SET 8 0\nSET 3 1\nMOV 0 &1\nOUT 3"), ["8"]);
}

#[test]
fn mov_from_unset_cell_fails() {
    let err = run_expect_err("MOV 0 1");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::UninitializedRead { address: 0 }
    ));
}

#[test]
fn time_reads_host_clock() {
    let mut vm = load(
        "TIME 0\nTIME 1\nSUB 1 0 2\nOUT 2",
        MachineConfig::default(),
    );
    let mut host = ScriptedHost::default().with_clock(1_000, 10);
    vm.run(&mut host).unwrap();
    assert_eq!(vm.values().read(0), Ok(&1_000));
    assert_eq!(host.output(), ["10"]);
}

// ==================== Bounds ====================

#[test]
fn uninitialized_read() {
    let err = run_expect_err("OUT 3");
    assert_eq!((err.pc, err.mnemonic), (0, "OUT"));
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::UninitializedRead { address: 3 }
    ));
}

#[test]
fn write_past_capacity() {
    let config = MachineConfig::default().with_value_capacity(4);
    let err = run_expect_err_with("SET 1 3\nSET 1 4", &[], config);
    assert_eq!(err.pc, 1);
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::OutOfBounds {
            address: 4,
            capacity: 4
        }
    ));
}

#[test]
fn negative_address() {
    let err = run_expect_err("SET 1 -1");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::OutOfBounds { address: -1, .. }
    ));
}

#[test]
fn indirect_address_out_of_bounds() {
    let err = run_expect_err("SET 300 0\nSET 1 &0");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::OutOfBounds {
            address: 300,
            capacity: DEFAULT_VALUE_CAPACITY
        }
    ));
}

// ==================== Arithmetic ====================

#[test]
fn add_prints_sum() {
    assert_eq!(output("SET 4 0\nSET 6 1\nADD 0 1 2\nOUT 2"), ["10"]);
}

#[test]
fn signed_arithmetic() {
    let out = output(
        r#"
            SET 7 0
            SET -2 1
            SUB 0 1 2
            MUL 0 1 3
            DIV 0 1 4
            MOD 0 1 5
            OUT 2
            OUT 3
            OUT 4
            OUT 5
        "#,
    );
    assert_eq!(out, ["9", "-14", "-3", "1"]);
}

#[test]
fn arithmetic_wraps() {
    let out = output(
        r#"
            SET 9223372036854775807 0
            SET 1 1
            ADD 0 1 2
            OUT 2
            SET -9223372036854775808 3
            SET -1 4
            DIV 3 4 5
            MOD 3 4 6
            OUT 5
            OUT 6
        "#,
    );
    assert_eq!(
        out,
        ["-9223372036854775808", "-9223372036854775808", "0"]
    );
}

#[test]
fn division_by_zero() {
    let (vm, _, result) = run_with("SET 4 0\nSET 0 1\nDIV 0 1 2", &[], MachineConfig::default());
    let err = result.unwrap_err();
    assert_eq!((err.pc, err.mnemonic), (2, "DIV"));
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
    assert_eq!(vm.values().get(2), Ok(None));
}

#[test]
fn modulo_by_zero() {
    let err = run_expect_err("SET 4 0\nSET 0 1\nMOD 0 1 2");
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
}

// ==================== Control Flow ====================

#[test]
fn jlt_loop_falls_through_once() {
    let (vm, out) = run_vm(
        r#"
            SET 0 0
            SET 1 1
            SET 3 2
        loop:
            OUT 0
            ADD 0 1 0
            JLT 0 2 loop
            OUT 2
        "#,
    );
    assert_eq!(out, ["0", "1", "2", "3"]);
    assert_eq!(vm.halted(), Some(Halt::EndOfProgram));
}

#[test]
fn jgt_taken() {
    let source = r#"
        SET 5 0
        SET 3 1
        JGT 0 1 big
        OUT 1
        TERM
    big: OUT 0
    "#;
    assert_eq!(output(source), ["5"]);
}

#[test]
fn jeq_not_taken() {
    assert_eq!(
        output("SET 1 0\nSET 2 1\nJEQ 0 1 skip\nOUT 0\nskip: OUT 1"),
        ["1", "2"]
    );
}

#[test]
fn jmp_to_trailing_label_ends_program() {
    let (vm, out) = run_vm("JMP end\nOUT 0\nend:");
    assert!(out.is_empty());
    assert_eq!(vm.halted(), Some(Halt::EndOfProgram));
    assert_eq!(vm.cycles(), 1);
}

#[test]
fn call_resumes_after_call_site() {
    let (vm, out) = run_vm(
        r#"
            CALL sub
            OUT 0
            TERM
        sub: SET 1 0
            RET
        "#,
    );
    assert_eq!(out, ["1"]);
    assert_eq!(vm.halted(), Some(Halt::Terminated));
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn nested_calls() {
    let out = output(
        r#"
            CALL outer
            OUT 0
            TERM
        outer:
            SET 1 0
            CALL inner
            RET
        inner:
            ADD 0 0 0
            RET
        "#,
    );
    assert_eq!(out, ["2"]);
}

#[test]
fn bare_ret_is_noop() {
    let (vm, out) = run_vm("RET\nSET 2 0\nOUT 0");
    assert_eq!(out, ["2"]);
    assert_eq!(vm.halted(), Some(Halt::EndOfProgram));
    assert_eq!(vm.trace().details()[0], "Return (noop)");
}

#[test]
fn term_stops_execution() {
    let (vm, out) = run_vm("SET 1 0\nTERM\nOUT 0");
    assert!(out.is_empty());
    assert_eq!(vm.halted(), Some(Halt::Terminated));
    assert_eq!(vm.pc(), 1);
}

#[test]
fn empty_program_ends_immediately() {
    let (vm, out) = run_vm("// nothing here\n");
    assert!(out.is_empty());
    assert_eq!(vm.halted(), Some(Halt::EndOfProgram));
    assert_eq!(vm.cycles(), 0);
}

#[test]
fn step_executes_one_instruction() {
    let mut vm = load("SET 1 0\nTERM", MachineConfig::default());
    let mut host = ScriptedHost::default();
    assert_eq!(vm.step(&mut host).unwrap(), None);
    assert_eq!(vm.pc(), 1);
    assert_eq!(vm.step(&mut host).unwrap(), Some(Halt::Terminated));
    assert_eq!(vm.step(&mut host).unwrap(), Some(Halt::Terminated));
    assert_eq!(vm.cycles(), 2);
}

#[test]
fn step_after_fault_executes_nothing() {
    let mut vm = load("IN 0\nOUT 0", MachineConfig::default());
    let mut host = ScriptedHost::new(["abc", "7"]);
    let err = vm.step(&mut host).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::InputParseFailure { .. }));
    assert_eq!(vm.halted(), Some(Halt::Faulted));

    assert_eq!(vm.step(&mut host).unwrap(), Some(Halt::Faulted));
    assert_eq!(vm.run(&mut host).unwrap(), Halt::Faulted);
    assert_eq!(vm.pc(), 0);
    assert_eq!(vm.cycles(), 1);
    assert_eq!(host.remaining_input(), 1);
    assert!(host.output().is_empty());
}

#[test]
fn cycle_limit_fault_is_final() {
    let config = MachineConfig::default().with_cycle_limit(1);
    let (mut vm, mut host, result) = run_with("SET 1 0\nOUT 0", &[], config);
    assert!(result.is_err());
    assert_eq!(vm.step(&mut host).unwrap(), Some(Halt::Faulted));
    assert!(host.output().is_empty());
}

// ==================== Console ====================

#[test]
fn input_is_stored() {
    let (_, out) = run_with_input("IN 0\nIN 1\nADD 0 1 2\nOUT 2", &["40", "  2  "]);
    assert_eq!(out, ["42"]);
}

#[test]
fn input_through_reference() {
    let (vm, _) = run_with_input("SET 5 0\nIN &0", &["-3"]);
    assert_eq!(vm.values().read(5), Ok(&-3));
}

#[test]
fn input_parse_failure() {
    let err = run_expect_err_with("IN 0", &["abc"], MachineConfig::default());
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::InputParseFailure { ref input } if input == "abc"
    ));
}

#[test]
fn input_exhausted() {
    let err = run_expect_err_with("IN 0\nIN 1", &["1"], MachineConfig::default());
    assert_eq!(err.pc, 1);
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::InputParseFailure { ref input } if input.is_empty()
    ));
}

// ==================== Configuration ====================

#[test]
fn cycle_limit_stops_runaway_loop() {
    let config = MachineConfig::default().with_cycle_limit(10);
    let (vm, _, result) = run_with("loop: JMP loop", &[], config);
    let err = result.unwrap_err();
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::CycleLimitExceeded { limit: 10 }
    ));
    assert_eq!(vm.cycles(), 10);
}

#[test]
fn cycle_limit_allows_exact_budget() {
    let config = MachineConfig::default().with_cycle_limit(2);
    let (_, host, result) = run_with("SET 1 0\nOUT 0", &[], config);
    assert_eq!(result.unwrap(), Halt::EndOfProgram);
    assert_eq!(host.output(), ["1"]);
}

#[test]
fn program_too_large() {
    let program = assemble_source("SET 1 0\nSET 2 1\nOUT 0").unwrap();
    let config = MachineConfig::default().with_instruction_capacity(2);
    let err = VM::new(program, config).err().expect("expected error");
    assert_eq!((err.pc, err.mnemonic), (2, "OUT"));
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::ProgramTooLarge {
            length: 3,
            capacity: 2
        }
    ));
}

#[test]
fn program_filling_the_tape_runs() {
    let program = assemble_source("SET 1 0\nOUT 0").unwrap();
    let config = MachineConfig::default().with_instruction_capacity(2);
    let mut vm = VM::new(program, config).unwrap();
    let mut host = ScriptedHost::default();
    assert_eq!(vm.run(&mut host).unwrap(), Halt::EndOfProgram);
    assert_eq!(host.output(), ["1"]);
}

#[test]
fn free_run_with_default_machine() {
    let program = assemble_source("SET 1 0\nTERM").unwrap();
    assert_eq!(run(program, 16).unwrap(), Halt::Terminated);
}

#[test]
fn free_run_fits_long_programs() {
    let source = format!("{}TERM", "SET 1 0\n".repeat(300));
    let program = assemble_source(&source).unwrap();
    assert_eq!(program.len(), 301);
    assert_eq!(run(program, 16).unwrap(), Halt::Terminated);
}

// ==================== Trace and profile ====================

#[test]
fn trace_describes_each_instruction() {
    let (vm, _) = run_vm("SET 5 3\nSET 4 0\nSET 6 1\nADD 0 1 2\nOUT 2\nTERM");
    assert_eq!(
        vm.trace().details(),
        [
            "Set value '5' into #3",
            "Set value '4' into #0",
            "Set value '6' into #1",
            "Add #0 ('4') and #1 ('6') into #2 ('10')",
            "Output from #2 ('10')",
            "Terminate",
        ]
    );
    for (index, entry) in vm.trace().entries.iter().enumerate() {
        assert_eq!(entry.cycle, index as u64);
        assert_eq!(entry.pc, index);
    }
    assert_eq!(vm.trace().entries[3].mnemonic, "ADD");
}

#[test]
fn trace_describes_branches_and_calls() {
    let (vm, _) = run_vm(
        r#"
            SET 1 0
            SET 3 1
            JLT 0 1 next
        next:
            JLT 1 0 next
            CALL sub
            TERM
        sub:
            SUB 1 0 2
            RET
        "#,
    );
    let details = vm.into_trace().details().join("\n");
    assert_eq!(
        details,
        "Set value '1' into #0\n\
         Set value '3' into #1\n\
         Jump to 3 [#0 ('1') < #1 ('3')]\n\
         No jump [#1 ('3') < #0 ('1') is false]\n\
         Call 6\n\
         Subtract #0 ('1') from #1 ('3') into #2 ('2')\n\
         Return to 5\n\
         Terminate"
    );
}

#[test]
fn profile_counts_categories() {
    let (vm, _) = run_vm(
        r#"
            SET 0 0
            SET 1 1
            SET 3 2
        loop:
            OUT 0
            ADD 0 1 0
            JLT 0 2 loop
            OUT 2
        "#,
    );
    let profile = vm.profile();
    assert_eq!(profile.get(CycleCategory::Memory), 3);
    assert_eq!(profile.get(CycleCategory::Io), 4);
    assert_eq!(profile.get(CycleCategory::Arithmetic), 3);
    assert_eq!(profile.get(CycleCategory::Branch), 3);
    assert_eq!(profile.total(), 13);
    assert_eq!(vm.cycles(), 13);
}

#[test]
fn faulting_instruction_is_counted() {
    let (vm, _, result) = run_with("SET 1 0\nOUT 1", &[], MachineConfig::default());
    assert!(result.is_err());
    assert_eq!(vm.cycles(), 2);
    assert_eq!(vm.trace().entries.len(), 1);
}

#[test]
fn null_sink_runs_untraced() {
    let program = assemble_source("SET 2 0\nOUT 0").unwrap();
    let mut vm = VM::new(program, MachineConfig::default()).unwrap();
    let mut host = ScriptedHost::default();
    vm.run(&mut host).unwrap();
    assert_eq!(host.output(), ["2"]);
    assert!(!vm.trace().enabled());
}

#[test]
fn runs_are_deterministic() {
    let source = r#"
            IN 0
            SET 0 1
            SET 1 2
        loop:
            ADD 1 2 1
            MUL 1 0 3
            OUT 3
            JLT 1 0 loop
        "#;
    let first = run_with(source, &["4"], MachineConfig::default());
    let second = run_with(source, &["4"], MachineConfig::default());
    assert_eq!(first.1.output(), second.1.output());
    assert_eq!(first.2.unwrap(), second.2.unwrap());
    assert_eq!(first.0.trace().entries, second.0.trace().entries);
}

// ==================== Properties ====================

const LABELLED_PROGRAM: &str = "\
SET 0 0
SET 1 1
SET 4 2
loop:
ADD 0 1 0
JLT 0 2 loop
CALL show
TERM
show: OUT 0
RET";

const FILLERS: [&str; 4] = ["// note", "", "   ", "    // indented note"];

/// Inserts comment and blank lines between the lines of `source`.
fn with_fillers(source: &str, inserts: &[(usize, usize)]) -> String {
    let mut lines: Vec<&str> = source.lines().collect();
    for &(at, which) in inserts {
        let at = at % (lines.len() + 1);
        lines.insert(at, FILLERS[which % FILLERS.len()]);
    }
    lines.join("\n")
}

proptest! {
    #[test]
    fn labels_ignore_inserted_comments(
        inserts in prop::collection::vec((any::<usize>(), any::<usize>()), 0..12)
    ) {
        let plain = assemble_source(LABELLED_PROGRAM).unwrap();
        let padded = assemble_source(&with_fillers(LABELLED_PROGRAM, &inserts)).unwrap();
        prop_assert_eq!(plain.instructions(), padded.instructions());
        prop_assert_eq!(plain.labels(), padded.labels());
        prop_assert_eq!(padded.label("loop"), Some(3));
        prop_assert_eq!(padded.label("show"), Some(7));
    }

    #[test]
    fn arithmetic_matches_wrapping_integers(x in any::<i64>(), y in any::<i64>()) {
        let source = format!(
            "SET {x} 0\nSET {y} 1\nADD 0 1 2\nSUB 0 1 3\nMUL 0 1 4\nOUT 2\nOUT 3\nOUT 4"
        );
        let expected = [x.wrapping_add(y), x.wrapping_sub(y), x.wrapping_mul(y)]
            .map(|v| v.to_string());
        prop_assert_eq!(output(&source), expected);
    }

    #[test]
    fn division_matches_rust_semantics(
        x in any::<i64>(),
        y in any::<i64>().prop_filter("non-zero divisor", |y| *y != 0)
    ) {
        let source = format!("SET {x} 0\nSET {y} 1\nDIV 0 1 2\nMOD 0 1 3\nOUT 2\nOUT 3");
        let expected = [x.wrapping_div(y), x.wrapping_rem(y)].map(|v| v.to_string());
        prop_assert_eq!(output(&source), expected);
    }
}

//! The stack machine that runs compiled programs.
//!
//! Execution is a flat loop over the opcode buffer. Function calls push
//! a `StackFrame` onto an explicit call stack rather than recursing, so
//! a run can be suspended at any opcode and picked up again later.

use crate::compiler::Program;
use crate::config::{ExecutionThreshold, InterpreterConfig};
use crate::exit_code::FailureCause;
use crate::machine::{MachineState, Overrun};
use crate::opcodes::Operator;
use std::collections::{HashMap, VecDeque};
use std::mem;
use std::ops::Range;
use std::time::{Duration, Instant};

#[cfg(test)]
use crate::compiler::CompilationMode;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// How many opcodes run between two threshold checks.
pub const THRESHOLD_CHECK_INTERVAL: u32 = 1024;

/// One activation of the root script or of a function body. `offset`
/// is the opcode being run by this frame: while a callee runs, the
/// caller's offset rests on its `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub range: Range<usize>,
    pub offset: usize,
}

impl StackFrame {
    fn new(range: Range<usize>) -> Self {
        StackFrame {
            offset: range.start,
            range,
        }
    }
}

/// A function declared by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    /// The cell value the function was declared with, and is called by.
    pub value: u16,
    /// Declaration order.
    pub index: usize,
    /// Source offset of the `(`.
    pub offset: usize,
    pub body: String,
}

/// Why the executor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    Completed,
    Breakpoint,
    /// The opcode on top of the call stack failed after `applied` of its
    /// repeats took effect.
    Fault { cause: FailureCause, applied: usize },
}

impl Halt {
    fn fault(cause: FailureCause) -> Self {
        Halt::Fault { cause, applied: 0 }
    }
}

impl From<Overrun> for Halt {
    fn from(overrun: Overrun) -> Self {
        Halt::Fault {
            cause: overrun.cause,
            applied: overrun.applied,
        }
    }
}

/// Everything a suspended run needs to carry on where it stopped.
#[derive(Debug)]
pub struct ExecutionState {
    program: Program,
    /// Flags indexed by opcode. Empty when no breakpoints were set.
    breakpoints: Vec<bool>,
    machine: MachineState,
    frames: Vec<StackFrame>,
    functions: HashMap<u16, Range<usize>>,
    definitions: Vec<FunctionDefinition>,
    stdin: VecDeque<char>,
    stdout: String,
    stdout_len: usize,
    stdout_limit: usize,
    stack_limit: usize,
    threshold: Option<ExecutionThreshold>,
    total_operations: u64,
    elapsed: Duration,
    /// Opcodes left before the next threshold check. Carried across
    /// pauses so that frequent breakpoints cannot starve the check.
    until_check: u32,
    /// Set when paused on a breakpoint, so resuming runs that opcode.
    resuming: bool,
    terminal: Option<Halt>,
}

impl ExecutionState {
    pub(crate) fn new(
        program: Program,
        stdin: &str,
        breakpoints: Vec<bool>,
        config: &InterpreterConfig,
    ) -> Self {
        let root = StackFrame::new(0..program.len());
        ExecutionState {
            program,
            breakpoints,
            machine: MachineState::new(config.memory_size, config.cell_width, config.overflow),
            frames: vec![root],
            functions: HashMap::new(),
            definitions: vec![],
            stdin: stdin.chars().collect(),
            stdout: String::new(),
            stdout_len: 0,
            stdout_limit: config.stdout_limit,
            stack_limit: config.stack_limit,
            threshold: config.threshold,
            total_operations: 0,
            elapsed: Duration::default(),
            until_check: THRESHOLD_CHECK_INTERVAL,
            resuming: false,
            terminal: None,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn machine(&self) -> &MachineState {
        &self.machine
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn function_definitions(&self) -> &[FunctionDefinition] {
        &self.definitions
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// The part of stdin the script has not read yet.
    pub fn remaining_stdin(&self) -> String {
        self.stdin.iter().collect()
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Run until the script ends, faults, or reaches a breakpoint. Once
    /// the run has ended, this keeps returning the same halt.
    pub(crate) fn resume(&mut self) -> Halt {
        if let Some(halt) = self.terminal {
            return halt;
        }

        let started = Instant::now();
        let halt = self.run_until_halt(started);
        self.elapsed += started.elapsed();

        if halt != Halt::Breakpoint {
            self.terminal = Some(halt);
        }
        halt
    }

    fn run_until_halt(&mut self, started: Instant) -> Halt {
        loop {
            let depth = match self.frames.len().checked_sub(1) {
                Some(depth) => depth,
                None => return Halt::Completed,
            };
            let offset = self.frames[depth].offset;

            // Implicit return.
            if offset == self.frames[depth].range.end {
                self.frames.pop();
                match self.frames.last_mut() {
                    Some(caller) => caller.offset += 1,
                    None => return Halt::Completed,
                }
                continue;
            }

            let skip_breakpoint = mem::take(&mut self.resuming);
            if !skip_breakpoint && self.breakpoints.get(offset) == Some(&true) {
                self.resuming = true;
                return Halt::Breakpoint;
            }

            self.until_check -= 1;
            if self.until_check == 0 {
                self.until_check = THRESHOLD_CHECK_INTERVAL;
                if self.threshold_exceeded(started) {
                    return Halt::fault(FailureCause::ThresholdExceeded);
                }
            }

            let opcode = self.program.opcode(offset);
            let count = opcode.count as usize;
            let mut next = offset + 1;

            match opcode.operator {
                Operator::Plus | Operator::Minus | Operator::ForwardPtr | Operator::BackwardPtr => {
                    let outcome = match opcode.operator {
                        Operator::Plus => self.machine.increment(count),
                        Operator::Minus => self.machine.decrement(count),
                        Operator::ForwardPtr => self.machine.move_next(count),
                        _ => self.machine.move_back(count),
                    };
                    if let Err(overrun) = outcome {
                        self.total_operations += overrun.applied as u64;
                        return overrun.into();
                    }
                    self.total_operations += count as u64;
                }
                Operator::PrintChar => {
                    if self.stdout_len == self.stdout_limit {
                        return Halt::fault(FailureCause::StdoutBufferLimitExceeded);
                    }
                    self.stdout.push(self.machine.output());
                    self.stdout_len += 1;
                    self.total_operations += 1;
                }
                Operator::ReadChar => {
                    let c = match self.stdin.pop_front() {
                        Some(c) => c,
                        None => return Halt::fault(FailureCause::StdinBufferExhausted),
                    };
                    if let Err(cause) = self.machine.input(c) {
                        return Halt::fault(cause);
                    }
                    self.total_operations += 1;
                }
                Operator::LoopStart => {
                    if self.machine.current() == 0 {
                        next = self.program.jump_target(offset) + 1;
                    }
                    self.total_operations += 1;
                }
                Operator::LoopEnd => {
                    // Back to the `[`, which tests the cell again.
                    next = self.program.jump_target(offset);
                    self.total_operations += 1;
                }
                Operator::FunctionStart => {
                    let value = self.machine.current();
                    if self.functions.contains_key(&value) {
                        return Halt::fault(FailureCause::DuplicateFunctionDefinition);
                    }

                    let end = self.program.jump_target(offset);
                    let body = offset + 1..end;
                    let mut text = String::new();
                    self.program.write_range(body.clone(), &mut text);

                    self.definitions.push(FunctionDefinition {
                        value,
                        index: self.definitions.len(),
                        offset: self.program.source_offset(offset, 0),
                        body: text,
                    });
                    self.functions.insert(value, body);

                    next = end + 1;
                    self.total_operations += 1;
                }
                Operator::FunctionEnd => {}
                Operator::FunctionCall => {
                    let body = match self.functions.get(&self.machine.current()) {
                        Some(body) => body.clone(),
                        None => return Halt::fault(FailureCause::UndefinedFunctionCalled),
                    };
                    if self.frames.len() >= self.stack_limit {
                        return Halt::fault(FailureCause::StackLimitExceeded);
                    }

                    self.total_operations += 1;
                    self.frames.push(StackFrame::new(body));
                    continue;
                }
            }

            self.frames[depth].offset = next;
        }
    }

    fn threshold_exceeded(&self, started: Instant) -> bool {
        match self.threshold {
            Some(ExecutionThreshold::Operations(limit)) => self.total_operations > limit,
            Some(ExecutionThreshold::Elapsed(limit)) => self.elapsed + started.elapsed() > limit,
            None => false,
        }
    }

    /// Rebuild the operator text run by each frame, innermost first. The
    /// innermost frame shows `units` repeats of its current opcode, and
    /// every other frame ends on its `:`.
    pub(crate) fn stack_trace(&self, units: usize) -> Vec<String> {
        let innermost = self.frames.len().saturating_sub(1);

        self.frames
            .iter()
            .enumerate()
            .rev()
            .map(|(depth, frame)| {
                let mut text = String::new();
                self.program
                    .write_range(frame.range.start..frame.offset, &mut text);
                let shown = if depth == innermost { units } else { 1 };
                self.program
                    .opcode(frame.offset)
                    .write_prefix_to(&mut text, shown);
                text
            })
            .collect()
    }

    /// The opcode index and repeat the run stopped on, if it stopped
    /// inside the program.
    pub(crate) fn halting_point(&self, applied: usize) -> Option<(usize, usize)> {
        let frame = self.frames.last()?;
        if frame.offset < frame.range.end {
            Some((frame.offset, applied))
        } else {
            None
        }
    }
}

#[cfg(test)]
fn execute(source: &str, stdin: &str, config: &InterpreterConfig) -> (ExecutionState, Halt) {
    let program = Program::compile(source, CompilationMode::Release).unwrap();
    let mut state = ExecutionState::new(program, stdin, vec![], config);
    let halt = state.resume();
    (state, halt)
}

#[cfg(test)]
fn execute_default(source: &str) -> (ExecutionState, Halt) {
    execute(source, "", &InterpreterConfig::default())
}

#[test]
fn increments_cell() {
    let (state, halt) = execute_default("+++++");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.machine().current(), 5);
}

#[test]
fn increment_then_decrement() {
    let (state, halt) = execute_default("+++++---");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.machine().current(), 2);
    assert_eq!(state.total_operations(), 8);
}

#[test]
fn reads_and_writes() {
    let (state, halt) = execute(",++.", "0", &InterpreterConfig::default());
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.stdout(), "2");
    assert_eq!(state.machine().current(), 50);
}

#[test]
fn empty_loop_is_skipped() {
    let (state, halt) = execute_default("[]");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.machine().current(), 0);
    assert_eq!(state.total_operations(), 1);
}

#[test]
fn clear_loop() {
    let (state, halt) = execute(",[-]", "0", &InterpreterConfig::default());
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.machine().current(), 0);
}

#[test]
fn multiply_loop() {
    let (state, halt) = execute_default("+++[>++<-]>");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(&state.machine().cells()[..2], &[0, 6]);
    assert_eq!(state.machine().position(), 1);
}

#[test]
fn functions_are_called_by_cell_value() {
    let (state, halt) = execute_default("(+++):>:");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(&state.machine().cells()[..2], &[3, 3]);
    assert_eq!(state.stdout(), "");
    assert_eq!(state.total_operations(), 10);
    assert_eq!(
        state.function_definitions(),
        [FunctionDefinition {
            value: 0,
            index: 0,
            offset: 0,
            body: "+++".to_owned(),
        }]
    );
}

#[test]
fn undefined_function() {
    let (state, halt) = execute_default("(++++):::");
    assert_eq!(
        halt,
        Halt::Fault {
            cause: FailureCause::UndefinedFunctionCalled,
            applied: 0,
        }
    );
    let (index, unit) = state.halting_point(0).unwrap();
    assert_eq!(state.program().source_offset(index, unit), 7);
}

#[test]
fn duplicate_function() {
    let (_, halt) = execute_default("(+)(-)");
    assert_eq!(halt, Halt::fault(FailureCause::DuplicateFunctionDefinition));

    let (state, halt) = execute_default("(+)+(-)");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.function_definitions().len(), 2);
    assert_eq!(state.function_definitions()[1].value, 1);
}

#[test]
fn recursion_hits_the_stack_limit() {
    let config = InterpreterConfig::default().with_stack_limit(16);
    let (state, halt) = execute("(:):", "", &config);
    assert_eq!(halt, Halt::fault(FailureCause::StackLimitExceeded));
    assert_eq!(state.frames().len(), 16);
}

#[test]
fn functions_can_call_functions() {
    // f0 bumps the next cell, f1 calls f0 twice.
    let (state, halt) = execute_default("(>+<)+(-::+):");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(&state.machine().cells()[..2], &[1, 2]);
}

#[test]
fn pointer_bounds() {
    let (state, halt) = execute_default("<");
    assert_eq!(
        halt,
        Halt::Fault {
            cause: FailureCause::LowerBoundExceeded,
            applied: 0,
        }
    );
    assert_eq!(state.machine().position(), 0);

    let config = InterpreterConfig::default().with_memory_size(4);
    let (state, halt) = execute(">>>>>", "", &config);
    assert_eq!(
        halt,
        Halt::Fault {
            cause: FailureCause::UpperBoundExceeded,
            applied: 3,
        }
    );
    assert_eq!(state.machine().position(), 3);
    assert_eq!(state.total_operations(), 3);
}

#[test]
fn negative_value_faults_without_overflow() {
    let (_, halt) = execute_default("-");
    assert_eq!(halt, Halt::fault(FailureCause::NegativeValue));
}

#[test]
fn stdin_exhaustion() {
    let (state, halt) = execute(",,", "a", &InterpreterConfig::default());
    assert_eq!(halt, Halt::fault(FailureCause::StdinBufferExhausted));
    assert_eq!(state.machine().current(), 'a' as u16);
    assert_eq!(state.remaining_stdin(), "");
}

#[test]
fn stdout_limit() {
    let config = InterpreterConfig::default().with_stdout_limit(3);
    let (state, halt) = execute("+[.]", "", &config);
    assert_eq!(halt, Halt::fault(FailureCause::StdoutBufferLimitExceeded));
    assert_eq!(state.stdout().chars().count(), 3);
}

#[test]
fn threshold_stops_infinite_loops() {
    let config =
        InterpreterConfig::default().with_threshold(ExecutionThreshold::Operations(10_000));
    let (state, halt) = execute("+[]", "", &config);
    assert_eq!(halt, Halt::fault(FailureCause::ThresholdExceeded));
    assert!(state.total_operations() > 10_000);
}

#[test]
fn elapsed_threshold_stops_infinite_loops() {
    let config = InterpreterConfig::default()
        .with_threshold(ExecutionThreshold::Elapsed(Duration::from_millis(20)));
    let (_, halt) = execute("+[]", "", &config);
    assert_eq!(halt, Halt::fault(FailureCause::ThresholdExceeded));
}

#[test]
fn terminal_runs_do_not_resume() {
    let (mut state, halt) = execute_default("+-");
    assert_eq!(halt, Halt::Completed);
    assert_eq!(state.resume(), Halt::Completed);
    assert_eq!(state.total_operations(), 2);
}

#[test]
fn stack_trace_of_nested_fault() {
    let (state, halt) = execute_default("(+>-):");
    assert_eq!(halt, Halt::fault(FailureCause::NegativeValue));
    assert_eq!(state.stack_trace(1), ["+>-", "(+>-):"]);
}

#[test]
fn stack_trace_stops_inside_compressed_runs() {
    let config = InterpreterConfig::default().with_memory_size(3);
    let (state, halt) = execute("+>>>>>", "", &config);
    assert_eq!(
        halt,
        Halt::Fault {
            cause: FailureCause::UpperBoundExceeded,
            applied: 2,
        }
    );
    assert_eq!(state.stack_trace(3), ["+>>>"]);
    let (index, unit) = state.halting_point(2).unwrap();
    assert_eq!(state.program().source_offset(index, unit), 3);
}

#[test]
fn threshold_trace_ends_before_the_pending_opcode() {
    let config = InterpreterConfig::default().with_threshold(ExecutionThreshold::Operations(100));
    let (state, halt) = execute("+[]", "", &config);
    assert_eq!(halt, Halt::fault(FailureCause::ThresholdExceeded));
    assert_eq!(state.total_operations(), THRESHOLD_CHECK_INTERVAL as u64 - 1);
    assert_eq!(state.halting_point(0), Some((1, 0)));
    assert_eq!(state.stack_trace(0), ["+"]);
}

//! Running scripts, either to completion or as a debugging session that
//! pauses on breakpoints.

use crate::compiler::{CompilationMode, Program};
use crate::config::{ConfigError, InterpreterConfig};
use crate::execution::{ExecutionState, FunctionDefinition, Halt, StackFrame};
use crate::exit_code::{ExitCode, ExitCodeFlags, FailureCause};
use crate::machine::MachineState;
use crate::opcodes::Operator;
use crate::validator::SyntaxError;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use crate::config::ExecutionThreshold;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// Reasons a script cannot be started at all. Anything that goes wrong
/// once the script is running is reported through `ExitCode` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Where a run stopped before reaching the end of the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltedExecutionInfo {
    /// The operators run by each active frame, innermost first. Each
    /// entry ends with the operator the frame stopped on, except after a
    /// threshold halt, where the innermost entry stops before it.
    pub stack_trace: Vec<String>,
    pub halting_operator: char,
    /// Source offset of `halting_operator`.
    pub halting_offset: usize,
}

/// A snapshot of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterResult {
    pub source: String,
    pub exit_code: ExitCode,
    pub halting_info: Option<HaltedExecutionInfo>,
    pub machine_state: MachineState,
    pub function_definitions: Vec<FunctionDefinition>,
    /// Input the script did not read.
    pub stdin: String,
    pub stdout: String,
    pub elapsed: Duration,
    pub total_operations: u64,
}

impl InterpreterResult {
    /// The packed exit code, including whether anything was printed.
    pub fn exit_flags(&self) -> ExitCodeFlags {
        let output = if self.stdout.is_empty() {
            ExitCodeFlags::NO_OUTPUT
        } else {
            ExitCodeFlags::TEXT_OUTPUT
        };
        self.exit_code.flags() | output
    }

    fn capture(state: &ExecutionState, source: &str, halt: Halt) -> Self {
        let (exit_code, applied) = match halt {
            Halt::Completed => (ExitCode::Success, None),
            Halt::Breakpoint => (ExitCode::BreakpointReached, Some(0)),
            Halt::Fault { cause, applied } => (ExitCode::Failure(cause), Some(applied)),
        };

        let halting_info = applied.and_then(|applied| {
            let (index, unit) = state.halting_point(applied)?;
            let program = state.program();
            // The threshold stops the run before its current opcode.
            let units = match exit_code {
                ExitCode::Failure(FailureCause::ThresholdExceeded) => 0,
                _ => applied + 1,
            };
            Some(HaltedExecutionInfo {
                stack_trace: state.stack_trace(units),
                halting_operator: program.opcode(index).operator.as_char(),
                halting_offset: program.source_offset(index, unit),
            })
        });

        InterpreterResult {
            source: source.to_owned(),
            exit_code,
            halting_info,
            machine_state: state.machine().clone(),
            function_definitions: state.function_definitions().to_vec(),
            stdin: state.remaining_stdin(),
            stdout: state.stdout().to_owned(),
            elapsed: state.elapsed(),
            total_operations: state.total_operations(),
        }
    }
}

/// Run `source` to completion.
pub fn run(
    source: &str,
    stdin: &str,
    config: &InterpreterConfig,
) -> Result<InterpreterResult, InterpreterError> {
    config.validate()?;
    let program = Program::compile(source, CompilationMode::Release)?;

    let mut state = ExecutionState::new(program, stdin, vec![], config);
    let halt = state.resume();
    let result = InterpreterResult::capture(&state, source, halt);

    debug!(
        exit_code = %result.exit_code,
        operations = result.total_operations,
        "run finished"
    );
    Ok(result)
}

/// A run that pauses before each breakpoint and can then be continued.
#[derive(Debug)]
pub struct InterpreterExecutionSession {
    state: ExecutionState,
    result: InterpreterResult,
}

impl InterpreterExecutionSession {
    /// Start a session and run it up to the first breakpoint, or to the
    /// end. `breakpoints` are source offsets: each one flags the first
    /// operator at or after it. A `)` never runs, so its breakpoint moves
    /// on to the operator after it.
    pub fn new(
        source: &str,
        stdin: &str,
        breakpoints: &[usize],
        config: &InterpreterConfig,
    ) -> Result<Self, InterpreterError> {
        config.validate()?;
        let program = Program::compile(source, CompilationMode::Debug)?;

        let mut flags = vec![false; program.len()];
        for &offset in breakpoints {
            let opcode = program
                .operator_at_or_after(offset)
                .and_then(|operator| program.opcode_of_operator(operator))
                .map(|opcode| match program.opcode(opcode).operator {
                    Operator::FunctionEnd => opcode + 1,
                    _ => opcode,
                });
            if let Some(opcode) = opcode.filter(|&opcode| opcode < program.len()) {
                flags[opcode] = true;
            }
        }
        debug!(
            opcodes = program.len(),
            breakpoints = flags.iter().filter(|&&flag| flag).count(),
            "starting session"
        );

        let mut state = ExecutionState::new(program, stdin, flags, config);
        let halt = state.resume();
        let result = InterpreterResult::capture(&state, source, halt);
        log_halt(&result);

        Ok(InterpreterExecutionSession { state, result })
    }

    pub fn current_result(&self) -> &InterpreterResult {
        &self.result
    }

    /// Whether the session is paused, rather than finished.
    pub fn can_continue(&self) -> bool {
        self.result.exit_code == ExitCode::BreakpointReached
    }

    /// Run up to the next breakpoint, or to the end. Does nothing once
    /// the session has finished.
    pub fn continue_execution(&mut self) -> &InterpreterResult {
        if self.can_continue() {
            let halt = self.state.resume();
            self.result = InterpreterResult::capture(&self.state, &self.result.source, halt);
            log_halt(&self.result);
        }
        &self.result
    }

    /// Drop the remaining breakpoints and run to the end.
    pub fn run_to_completion(&mut self) -> &InterpreterResult {
        self.state.clear_breakpoints();
        self.continue_execution()
    }

    /// The live call stack, root frame first. Ranges index the opcodes of
    /// `program()`.
    pub fn call_stack(&self) -> &[StackFrame] {
        self.state.frames()
    }

    pub fn program(&self) -> &Program {
        self.state.program()
    }

    pub fn into_result(self) -> InterpreterResult {
        self.result
    }
}

fn log_halt(result: &InterpreterResult) {
    match &result.halting_info {
        Some(info) => debug!(
            exit_code = %result.exit_code,
            offset = info.halting_offset,
            operator = %info.halting_operator,
            depth = info.stack_trace.len(),
            "session halted"
        ),
        None => debug!(exit_code = %result.exit_code, "session finished"),
    }
}

#[cfg(test)]
fn session(source: &str, breakpoints: &[usize]) -> InterpreterExecutionSession {
    InterpreterExecutionSession::new(source, "", breakpoints, &InterpreterConfig::default())
        .unwrap()
}

#[test]
fn breakpoint_in_root_frame() {
    let session = session("++[>++>-]>+", &[7]);
    let result = session.current_result();

    assert!(session.can_continue());
    assert_eq!(result.exit_code, ExitCode::BreakpointReached);
    assert_eq!(
        result.halting_info,
        Some(HaltedExecutionInfo {
            stack_trace: vec!["++[>++>-".to_owned()],
            halting_operator: '-',
            halting_offset: 7,
        })
    );
    assert_eq!(&result.machine_state.cells()[..3], &[2, 2, 0]);
    assert_eq!(result.machine_state.position(), 2);
}

#[test]
fn breakpoint_inside_call() {
    let session = session("(+>):+", &[2]);
    let info = session.current_result().halting_info.clone().unwrap();

    assert_eq!(info.stack_trace, ["+>", "(+>):"]);
    assert_eq!(info.halting_operator, '>');
    assert_eq!(info.halting_offset, 2);

    let frames = session.call_stack();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], StackFrame { range: 1..3, offset: 2 });
    assert_eq!(frames[0].offset, 4);
}

#[test]
fn continue_reaches_the_same_end() {
    let source = "++[>++<-]>+";
    let mut paused = session(source, &[7]);
    let unbroken = run(source, "", &InterpreterConfig::default()).unwrap();

    // The `-` runs once per iteration of the loop.
    let mut breakpoints_hit = 1;
    while paused.continue_execution().exit_code == ExitCode::BreakpointReached {
        breakpoints_hit += 1;
    }
    let result = paused.into_result();

    assert_eq!(breakpoints_hit, 2);
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.halting_info, None);
    assert_eq!(result.machine_state, unbroken.machine_state);
    assert_eq!(result.total_operations, unbroken.total_operations);
    assert_eq!(&result.machine_state.cells()[..2], &[0, 5]);
}

#[test]
fn run_to_completion_ignores_breakpoints() {
    let mut session = session("+++[-]", &[4]);
    assert!(session.can_continue());

    let result = session.run_to_completion();
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.machine_state.current(), 0);
    assert!(!session.can_continue());
}

#[test]
fn breakpoints_on_comments_move_to_the_next_operator() {
    let session = session("+ x +", &[1]);
    let info = session.current_result().halting_info.clone().unwrap();
    assert_eq!(info.halting_offset, 4);
    assert_eq!(info.stack_trace, ["++"]);
}

#[test]
fn breakpoints_past_the_end_are_ignored() {
    let session = session("++", &[10]);
    assert_eq!(session.current_result().exit_code, ExitCode::Success);
    assert!(!session.can_continue());
}

#[test]
fn faults_end_sessions() {
    let mut session = session("+>-<-", &[4]);
    assert!(!session.can_continue());

    let result = session.continue_execution();
    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::NegativeValue)
    );
    let info = result.halting_info.as_ref().unwrap();
    assert_eq!(info.halting_offset, 2);
    assert_eq!(info.stack_trace, ["+>-"]);
}

#[test]
fn undefined_call_is_reported_at_its_offset() {
    let result = run("(++++):::", "", &InterpreterConfig::default()).unwrap();
    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::UndefinedFunctionCalled)
    );
    assert!(result.exit_flags().contains(
        ExitCodeFlags::FAILURE
            | ExitCodeFlags::EXCEPTION_THROWN
            | ExitCodeFlags::UNDEFINED_FUNCTION_CALLED
    ));
    let info = result.halting_info.unwrap();
    assert_eq!(info.halting_offset, 7);
    assert_eq!(info.halting_operator, ':');
    assert_eq!(info.stack_trace, ["(++++)::"]);
}

#[test]
fn construction_errors() {
    assert_eq!(
        run("[", "", &InterpreterConfig::default()).unwrap_err(),
        InterpreterError::Syntax(SyntaxError {
            kind: crate::validator::SyntaxErrorKind::IncompleteLoop,
            offset: 0,
        })
    );
    assert_eq!(
        run("+", "", &InterpreterConfig::default().with_memory_size(0)).unwrap_err(),
        InterpreterError::InvalidConfig(ConfigError::EmptyMemory)
    );
}

#[test]
fn breakpoints_on_function_ends_move_to_the_next_operator() {
    let session = session("(+>):+", &[3]);
    assert!(session.can_continue());

    let info = session.current_result().halting_info.clone().unwrap();
    assert_eq!(info.halting_operator, ':');
    assert_eq!(info.halting_offset, 4);
    assert_eq!(info.stack_trace, ["(+>):"]);
}

#[test]
fn threshold_applies_across_breakpoints() {
    let config = InterpreterConfig::default().with_threshold(ExecutionThreshold::Operations(100));
    let mut session = InterpreterExecutionSession::new("+[]", "", &[2], &config).unwrap();

    let mut continues = 0;
    while session.can_continue() && continues < 10_000 {
        session.continue_execution();
        continues += 1;
    }
    let result = session.into_result();

    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::ThresholdExceeded)
    );
    assert_eq!(continues, 511);
    let info = result.halting_info.unwrap();
    assert_eq!(info.halting_offset, 1);
    assert_eq!(info.stack_trace, ["+"]);
}

//! How a run ended.

use bitflags::bitflags;
use std::fmt;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// The specific reason a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    NegativeValue,
    MaxValueExceeded,
    LowerBoundExceeded,
    UpperBoundExceeded,
    StdinBufferExhausted,
    StdoutBufferLimitExceeded,
    UndefinedFunctionCalled,
    DuplicateFunctionDefinition,
    StackLimitExceeded,
    ThresholdExceeded,
}

impl FailureCause {
    /// Faults raised by the script itself, as opposed to the host
    /// stopping it.
    pub fn is_exception(self) -> bool {
        !matches!(self, FailureCause::ThresholdExceeded)
    }

    pub fn description(self) -> &'static str {
        match self {
            FailureCause::NegativeValue => "a cell was decremented below zero",
            FailureCause::MaxValueExceeded => "a cell was incremented past its maximum value",
            FailureCause::LowerBoundExceeded => "the pointer moved before the first cell",
            FailureCause::UpperBoundExceeded => "the pointer moved past the last cell",
            FailureCause::StdinBufferExhausted => "the script read past the end of stdin",
            FailureCause::StdoutBufferLimitExceeded => "the stdout buffer is full",
            FailureCause::UndefinedFunctionCalled => "the called function is not defined",
            FailureCause::DuplicateFunctionDefinition => "a function with this value already exists",
            FailureCause::StackLimitExceeded => "the call stack limit was exceeded",
            FailureCause::ThresholdExceeded => "the execution threshold was exceeded",
        }
    }

    fn flag(self) -> ExitCodeFlags {
        match self {
            FailureCause::NegativeValue => ExitCodeFlags::NEGATIVE_VALUE,
            FailureCause::MaxValueExceeded => ExitCodeFlags::MAX_VALUE_EXCEEDED,
            FailureCause::LowerBoundExceeded => ExitCodeFlags::LOWER_BOUND_EXCEEDED,
            FailureCause::UpperBoundExceeded => ExitCodeFlags::UPPER_BOUND_EXCEEDED,
            FailureCause::StdinBufferExhausted => ExitCodeFlags::STDIN_BUFFER_EXHAUSTED,
            FailureCause::StdoutBufferLimitExceeded => ExitCodeFlags::STDOUT_BUFFER_LIMIT_EXCEEDED,
            FailureCause::UndefinedFunctionCalled => ExitCodeFlags::UNDEFINED_FUNCTION_CALLED,
            FailureCause::DuplicateFunctionDefinition => {
                ExitCodeFlags::DUPLICATE_FUNCTION_DEFINITION
            }
            FailureCause::StackLimitExceeded => ExitCodeFlags::STACK_LIMIT_EXCEEDED,
            FailureCause::ThresholdExceeded => ExitCodeFlags::THRESHOLD_EXCEEDED,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    Success,
    /// Paused before a flagged opcode. The run can be continued.
    BreakpointReached,
    Failure(FailureCause),
}

impl ExitCode {
    pub fn is_success(self) -> bool {
        !matches!(self, ExitCode::Failure(_))
    }

    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    pub fn failure_cause(self) -> Option<FailureCause> {
        match self {
            ExitCode::Failure(cause) => Some(cause),
            _ => None,
        }
    }

    /// Project this exit code onto the packed flag representation. Output
    /// bits depend on the run, see `InterpreterResult::exit_flags`.
    pub fn flags(self) -> ExitCodeFlags {
        match self {
            ExitCode::Success => ExitCodeFlags::SUCCESS,
            ExitCode::BreakpointReached => {
                ExitCodeFlags::SUCCESS | ExitCodeFlags::BREAKPOINT_REACHED
            }
            ExitCode::Failure(cause) => {
                let category = if cause.is_exception() {
                    ExitCodeFlags::EXCEPTION_THROWN
                } else {
                    ExitCodeFlags::HALTED
                };
                ExitCodeFlags::FAILURE | category | cause.flag()
            }
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::BreakpointReached => write!(f, "breakpoint reached"),
            ExitCode::Failure(cause) => write!(f, "failure: {}", cause),
        }
    }
}

bitflags! {
    /// The packed representation of an exit code.
    pub struct ExitCodeFlags: u32 {
        const SUCCESS = 1;
        const FAILURE = 1 << 1;
        const NO_OUTPUT = 1 << 2;
        const TEXT_OUTPUT = 1 << 3;
        const EXCEPTION_THROWN = 1 << 4;
        const HALTED = 1 << 5;
        const BREAKPOINT_REACHED = 1 << 6;
        const NEGATIVE_VALUE = 1 << 7;
        const MAX_VALUE_EXCEEDED = 1 << 8;
        const LOWER_BOUND_EXCEEDED = 1 << 9;
        const UPPER_BOUND_EXCEEDED = 1 << 10;
        const STDIN_BUFFER_EXHAUSTED = 1 << 11;
        const STDOUT_BUFFER_LIMIT_EXCEEDED = 1 << 12;
        const UNDEFINED_FUNCTION_CALLED = 1 << 13;
        const DUPLICATE_FUNCTION_DEFINITION = 1 << 14;
        const STACK_LIMIT_EXCEEDED = 1 << 15;
        const THRESHOLD_EXCEEDED = 1 << 16;
    }
}

#[test]
fn failure_flags_carry_category_and_cause() {
    let flags = ExitCode::Failure(FailureCause::NegativeValue).flags();
    assert_eq!(
        flags,
        ExitCodeFlags::FAILURE | ExitCodeFlags::EXCEPTION_THROWN | ExitCodeFlags::NEGATIVE_VALUE
    );
    assert!(!flags.contains(ExitCodeFlags::SUCCESS));
}

#[test]
fn threshold_is_a_halt_not_an_exception() {
    let flags = ExitCode::Failure(FailureCause::ThresholdExceeded).flags();
    assert!(flags.contains(ExitCodeFlags::HALTED));
    assert!(!flags.contains(ExitCodeFlags::EXCEPTION_THROWN));
}

#[test]
fn breakpoints_are_successful() {
    let code = ExitCode::BreakpointReached;
    assert!(code.is_success());
    assert!(code.flags().contains(ExitCodeFlags::SUCCESS | ExitCodeFlags::BREAKPOINT_REACHED));
    assert_eq!(code.failure_cause(), None);
}

#![warn(trivial_numeric_casts)]

//! pbrain validates, compiles and runs BF programs extended with PBrain
//! functions, with breakpoints and stack traces for debugging.
//! The validator and opcode layout descend from [bfc](https://github.com/Wilfred/bfc).

pub use compiler::{CompilationMode, Program};
pub use config::{ConfigError, ExecutionThreshold, InterpreterConfig};
pub use diagnostics::{Diagnostic, Level, Position};
pub use execution::{FunctionDefinition, StackFrame};
pub use exit_code::{ExitCode, ExitCodeFlags, FailureCause};
pub use machine::{CellWidth, MachineState, OverflowMode};
pub use opcodes::{Opcode, Operator};
pub use session::{
    run, HaltedExecutionInfo, InterpreterError, InterpreterExecutionSession, InterpreterResult,
};
pub use validator::{check_syntax, SyntaxError, SyntaxErrorKind, SyntaxValidationResult};

mod compiler;
mod config;
mod diagnostics;
mod execution;
mod exit_code;
mod machine;
mod opcodes;
mod session;
mod validator;

#[cfg(test)]
mod soundness_tests;

// End-to-end behaviour of the public interpreter API.

use pbrain::{
    check_syntax, run, CellWidth, ExecutionThreshold, ExitCode, ExitCodeFlags, FailureCause,
    InterpreterConfig, InterpreterExecutionSession, OverflowMode, SyntaxErrorKind,
};
use pretty_assertions::assert_eq;

fn run_default(source: &str, stdin: &str) -> pbrain::InterpreterResult {
    run(source, stdin, &InterpreterConfig::default()).expect("script should compile")
}

#[test]
fn test_increments() {
    let result = run_default("+++++", "");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.machine_state.current(), 5);
}

#[test]
fn test_increment_and_decrement() {
    let result = run_default("+++++---", "");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.machine_state.current(), 2);
}

#[test]
fn test_read_and_print() {
    let result = run_default(",++.", "0");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.stdout, "2");
    assert_eq!(result.machine_state.current(), 50);
    assert!(result.exit_flags().contains(ExitCodeFlags::TEXT_OUTPUT));
}

#[test]
fn test_empty_loop() {
    let result = run_default("[]", "");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.machine_state.current(), 0);
}

#[test]
fn test_clear_loop() {
    let result = run_default(",[-]", "0");
    assert_eq!(result.machine_state.current(), 0);
    assert_eq!(result.stdin, "");
}

#[test]
fn test_hello_world() {
    let source = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
    let result = run_default(source, "");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.stdout, "Hello World!\n");
}

#[test]
fn test_function_call() {
    let result = run_default("(+++):>:", "");
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(
        result.exit_flags(),
        ExitCodeFlags::SUCCESS | ExitCodeFlags::NO_OUTPUT
    );
    assert_eq!(&result.machine_state.cells()[..2], &[3, 3]);
    assert_eq!(result.total_operations, 10);
    assert_eq!(result.function_definitions.len(), 1);
    assert_eq!(result.function_definitions[0].body, "+++");
}

#[test]
fn test_undefined_function() {
    let result = run_default("(++++):::", "");
    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::UndefinedFunctionCalled)
    );
    assert_eq!(
        result.exit_flags(),
        ExitCodeFlags::FAILURE
            | ExitCodeFlags::EXCEPTION_THROWN
            | ExitCodeFlags::UNDEFINED_FUNCTION_CALLED
            | ExitCodeFlags::NO_OUTPUT
    );
    assert_eq!(result.halting_info.unwrap().halting_offset, 7);
}

#[test]
fn test_wide_cells_with_overflow() {
    let config = InterpreterConfig::default()
        .with_cell_width(CellWidth::U16)
        .with_overflow(OverflowMode::Wrap);
    let result = run("-", "", &config).unwrap();
    assert_eq!(result.exit_code, ExitCode::Success);
    assert_eq!(result.machine_state.current(), u16::MAX);
}

#[test]
fn test_byte_cells_without_overflow() {
    let source = "+".repeat(256);
    let result = run_default(&source, "");
    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::MaxValueExceeded)
    );
    assert_eq!(result.machine_state.current(), 255);
    assert_eq!(result.total_operations, 255);
    assert_eq!(result.halting_info.unwrap().halting_offset, 255);
}

#[test]
fn test_infinite_loop_is_halted() {
    let config =
        InterpreterConfig::default().with_threshold(ExecutionThreshold::Operations(100_000));
    let result = run("+[>+<]", "", &config.with_overflow(OverflowMode::Wrap)).unwrap();
    assert_eq!(
        result.exit_code,
        ExitCode::Failure(FailureCause::ThresholdExceeded)
    );
    assert!(result
        .exit_flags()
        .contains(ExitCodeFlags::FAILURE | ExitCodeFlags::HALTED));
    assert!(result.halting_info.is_some());
}

#[test]
fn test_syntax_errors_prevent_runs() {
    let validation = check_syntax("+[");
    assert!(!validation.is_valid());
    assert_eq!(validation.error_kind(), Some(SyntaxErrorKind::IncompleteLoop));
    assert_eq!(validation.error_offset(), Some(1));
    assert!(run("+[", "", &InterpreterConfig::default()).is_err());
}

#[test]
fn test_breakpoint_and_resume() {
    let source = "+++[>+<-]>.";
    let config = InterpreterConfig::default();
    let mut session = InterpreterExecutionSession::new(source, "", &[5], &config).unwrap();

    let paused = session.current_result();
    assert!(session.can_continue());
    assert_eq!(paused.exit_code, ExitCode::BreakpointReached);
    assert_eq!(&paused.machine_state.cells()[..2], &[3, 0]);
    assert_eq!(paused.machine_state.position(), 1);
    let info = paused.halting_info.as_ref().unwrap();
    assert_eq!(info.stack_trace, ["+++[>+"]);
    assert_eq!(info.halting_operator, '+');

    let result = session.run_to_completion().clone();
    let unbroken = run(source, "", &config).unwrap();
    assert_eq!(result.exit_code, unbroken.exit_code);
    assert_eq!(result.machine_state, unbroken.machine_state);
    assert_eq!(result.stdout, unbroken.stdout);
}

#[test]
fn test_nested_stack_trace() {
    let session =
        InterpreterExecutionSession::new("(+>):+", "", &[2], &InterpreterConfig::default())
            .unwrap();
    let info = session.current_result().halting_info.clone().unwrap();
    assert_eq!(info.stack_trace, ["+>", "(+>):"]);
    assert_eq!(info.halting_operator, '>');
    assert_eq!(info.halting_offset, 2);
}

#[test]
fn test_sessions_are_send() {
    fn assert_send<T: Send>() {}
    assert_send::<InterpreterExecutionSession>();
}

use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};

use crate::config::{ExecutionThreshold, InterpreterConfig};
use crate::exit_code::{ExitCode, FailureCause};
use crate::session::{run, InterpreterExecutionSession, InterpreterResult};
use crate::validator::check_syntax;

/// Give up on pausing sessions after this many continues.
const MAX_CONTINUES: usize = 2_000;

const OPERATION_LIMIT: u64 = 20_000;

/// A script that always passes syntax validation.
#[derive(Clone, Debug)]
struct Script(String);

impl Arbitrary for Script {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        let choices: Vec<u8> = Arbitrary::arbitrary(g);
        let mut source = String::new();
        let mut depth = 0;

        // Declare up to two functions before the main body.
        let functions = u8::arbitrary(g) % 3;
        for i in 0..functions {
            source.push_str(if i == 0 { "(>+<)" } else { "+(-.+)" });
        }

        for choice in choices {
            match choice % 11 {
                0 => source.push('+'),
                1 => source.push('-'),
                2 => source.push('>'),
                3 => source.push('<'),
                4 => source.push('.'),
                5 => source.push(','),
                6 => {
                    source.push('[');
                    depth += 1;
                }
                7 if depth > 0 => {
                    source.push(']');
                    depth -= 1;
                }
                8 => source.push(':'),
                9 => source.push(' '),
                _ => source.push('+'),
            }
        }
        for _ in 0..depth {
            source.push(']');
        }

        Script(source)
    }
}

/// Runs near the threshold may stop at different points depending on
/// how opcodes were compressed.
fn near_threshold(result: &InterpreterResult) -> bool {
    result.exit_code == ExitCode::Failure(FailureCause::ThresholdExceeded)
        || result.total_operations > OPERATION_LIMIT
}

fn test_config() -> InterpreterConfig {
    InterpreterConfig::default()
        .with_memory_size(16)
        .with_threshold(ExecutionThreshold::Operations(OPERATION_LIMIT))
}

#[test]
fn check_syntax_is_idempotent() {
    fn prop(source: String) -> bool {
        check_syntax(&source) == check_syntax(&source)
    }
    quickcheck(prop as fn(String) -> bool);
}

#[test]
fn generated_scripts_are_valid() {
    fn prop(script: Script) -> TestResult {
        if script.0.trim().is_empty() {
            return TestResult::discard();
        }
        TestResult::from_bool(check_syntax(&script.0).is_valid())
    }
    quickcheck(prop as fn(Script) -> TestResult);
}

#[test]
fn runs_without_io_are_deterministic() {
    fn prop(script: Script) -> TestResult {
        let source = script.0.replace(|c: char| c == '.' || c == ',', "");
        if !check_syntax(&source).is_valid() {
            return TestResult::discard();
        }

        let first = run(&source, "", &test_config()).unwrap();
        let second = run(&source, "", &test_config()).unwrap();

        TestResult::from_bool(
            first.exit_code == second.exit_code
                && first.machine_state == second.machine_state
                && first.total_operations == second.total_operations,
        )
    }
    quickcheck(prop as fn(Script) -> TestResult);
}

#[test]
fn compression_does_not_change_results() {
    fn prop(script: Script, stdin: String) -> TestResult {
        if !check_syntax(&script.0).is_valid() {
            return TestResult::discard();
        }

        let released = run(&script.0, &stdin, &test_config()).unwrap();
        if near_threshold(&released) {
            return TestResult::discard();
        }
        let debugged = InterpreterExecutionSession::new(&script.0, &stdin, &[], &test_config())
            .unwrap()
            .into_result();

        TestResult::from_bool(
            released.exit_code == debugged.exit_code
                && released.machine_state == debugged.machine_state
                && released.stdout == debugged.stdout
                && released.stdin == debugged.stdin
                && released.total_operations == debugged.total_operations
                && released.halting_info == debugged.halting_info,
        )
    }
    quickcheck(prop as fn(Script, String) -> TestResult);
}

#[test]
fn continuing_matches_an_unbroken_run() {
    fn prop(script: Script, breakpoint: usize) -> TestResult {
        let source = &script.0;
        if !check_syntax(source).is_valid() {
            return TestResult::discard();
        }

        let unbroken = run(source, "abc", &test_config()).unwrap();
        if near_threshold(&unbroken) {
            return TestResult::discard();
        }

        let offset = breakpoint % source.chars().count();
        let mut session =
            InterpreterExecutionSession::new(source, "abc", &[offset], &test_config()).unwrap();
        let mut continues = 0;
        while session.can_continue() {
            if continues == MAX_CONTINUES {
                return TestResult::discard();
            }
            session.continue_execution();
            continues += 1;
        }
        let result = session.into_result();

        TestResult::from_bool(
            result.exit_code == unbroken.exit_code
                && result.machine_state == unbroken.machine_state
                && result.stdout == unbroken.stdout
                && result.total_operations == unbroken.total_operations,
        )
    }
    quickcheck(prop as fn(Script, usize) -> TestResult);
}

#[test]
fn stdin_is_never_over_consumed() {
    fn prop(script: Script, stdin: String) -> TestResult {
        let source = &script.0;
        if !check_syntax(source).is_valid() {
            return TestResult::discard();
        }

        // Pause before every `,` to count how many of them run.
        let reads: Vec<usize> = source
            .chars()
            .enumerate()
            .filter(|&(_, c)| c == ',')
            .map(|(offset, _)| offset)
            .collect();
        let mut session =
            InterpreterExecutionSession::new(source, &stdin, &reads, &test_config()).unwrap();

        let mut executed_reads = 0;
        while session.can_continue() {
            if executed_reads == MAX_CONTINUES {
                return TestResult::discard();
            }
            session.continue_execution();
            executed_reads += 1;
        }

        let result = session.current_result();
        let consumed = stdin.chars().count() - result.stdin.chars().count();
        TestResult::from_bool(consumed <= executed_reads)
    }
    quickcheck(prop as fn(Script, String) -> TestResult);
}

//! Command line runner for PBrain scripts.

use clap::{Parser, ValueEnum};
use pbrain::{
    check_syntax, CellWidth, Diagnostic, ExecutionThreshold, InterpreterConfig,
    InterpreterError, InterpreterExecutionSession, InterpreterResult, OverflowMode,
};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "pbrain")]
#[command(about = "Run a BF/PBrain script")]
struct Cli {
    /// Path to the script
    file: PathBuf,

    /// Text fed to the script's `,` operators
    #[arg(long, default_value = "")]
    stdin: String,

    /// Number of cells on the tape
    #[arg(long, default_value_t = pbrain_defaults().memory_size)]
    memory_size: usize,

    #[arg(long, value_enum, default_value = "u8")]
    cell_width: Width,

    /// Wrap cell values instead of failing on overflow
    #[arg(long)]
    allow_overflow: bool,

    /// Maximum number of call stack frames
    #[arg(long, default_value_t = pbrain_defaults().stack_limit)]
    stack_limit: usize,

    /// Halt after roughly this many operations
    #[arg(long, conflicts_with = "timeout_ms")]
    max_operations: Option<u64>,

    /// Halt after roughly this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Pause before the operator at this source offset (repeatable)
    #[arg(long = "breakpoint")]
    breakpoints: Vec<usize>,

    /// Only check the syntax of the script
    #[arg(long)]
    check: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Width {
    U8,
    U16,
}

fn pbrain_defaults() -> InterpreterConfig {
    InterpreterConfig::default()
}

impl Cli {
    fn config(&self) -> InterpreterConfig {
        let mut config = InterpreterConfig::default()
            .with_memory_size(self.memory_size)
            .with_stack_limit(self.stack_limit)
            .with_cell_width(match self.cell_width {
                Width::U8 => CellWidth::U8,
                Width::U16 => CellWidth::U16,
            })
            .with_overflow(if self.allow_overflow {
                OverflowMode::Wrap
            } else {
                OverflowMode::Fault
            });

        if let Some(operations) = self.max_operations {
            config = config.with_threshold(ExecutionThreshold::Operations(operations));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_threshold(ExecutionThreshold::Elapsed(Duration::from_millis(ms)));
        }
        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let filename = cli.file.display().to_string();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not open file {}: {}", filename, e);
            process::exit(2);
        }
    };

    if cli.check {
        match check_syntax(&source).error {
            Some(error) => {
                eprintln!("{}", Diagnostic::from_syntax_error(&filename, &source, &error));
                process::exit(2);
            }
            None => return,
        }
    }

    let mut session =
        match InterpreterExecutionSession::new(&source, &cli.stdin, &cli.breakpoints, &cli.config())
        {
            Ok(session) => session,
            Err(InterpreterError::Syntax(error)) => {
                eprintln!("{}", Diagnostic::from_syntax_error(&filename, &source, &error));
                process::exit(2);
            }
            Err(e) => {
                eprintln!("{}", e);
                process::exit(2);
            }
        };

    while session.can_continue() {
        report_pause(&filename, session.current_result());
        session.continue_execution();
    }

    let result = session.into_result();
    print!("{}", result.stdout);
    debug!(
        operations = result.total_operations,
        elapsed = ?result.elapsed,
        "finished"
    );

    if let Some(diagnostic) = Diagnostic::from_result(&filename, &result) {
        eprintln!();
        eprintln!("{}", diagnostic);
        print_stack_trace(&result);
    }
    if result.exit_code.is_failure() {
        process::exit(1);
    }
}

fn report_pause(filename: &str, result: &InterpreterResult) {
    if let Some(diagnostic) = Diagnostic::from_result(filename, result) {
        eprintln!("{}", diagnostic);
        print_stack_trace(result);
        let state = &result.machine_state;
        eprintln!(
            "  position {} = {} ({} operations so far)",
            state.position(),
            state.current(),
            result.total_operations
        );
    }
}

fn print_stack_trace(result: &InterpreterResult) {
    if let Some(info) = &result.halting_info {
        for (depth, frame) in info.stack_trace.iter().enumerate() {
            eprintln!("  #{} {}", depth, frame);
        }
    }
}

//! Human-readable errors and halt reports for the CLI.

use crate::session::InterpreterResult;
use crate::validator::SyntaxError;
use colored::*;
use std::fmt;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// An inclusive range of character offsets in source code.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn at(offset: usize) -> Self {
        Position {
            start: offset,
            end: offset,
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Level {
    Error,
    Note,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub filename: String,
    pub message: String,
    pub position: Option<Position>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn from_syntax_error(filename: &str, source: &str, error: &SyntaxError) -> Self {
        Diagnostic {
            level: Level::Error,
            filename: filename.to_owned(),
            message: error.kind.message().to_owned(),
            position: Some(Position::at(error.offset)),
            source: Some(source.to_owned()),
        }
    }

    /// Describe a run that did not finish successfully, or `None` if it
    /// did.
    pub fn from_result(filename: &str, result: &InterpreterResult) -> Option<Self> {
        let info = result.halting_info.as_ref()?;
        let level = if result.exit_code.is_failure() {
            Level::Error
        } else {
            Level::Note
        };

        Some(Diagnostic {
            level,
            filename: filename.to_owned(),
            message: format!("{} at '{}'", result.exit_code, info.halting_operator),
            position: Some(Position::at(info.halting_offset)),
            source: Some(result.source.clone()),
        })
    }
}

/// Find the line containing `offset`, returning its number (from
/// zero), its text, and the column of `offset` in it.
fn line_of(source: &str, offset: usize) -> (usize, &str, usize) {
    let mut line_start = 0;
    let mut chars_before = 0;

    for (line_idx, line) in source.split('\n').enumerate() {
        let len = line.chars().count();
        if offset <= chars_before + len {
            return (line_idx, line, offset - chars_before);
        }
        chars_before += len + 1;
        line_start = line_idx + 1;
    }

    (line_start, "", 0)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level = match self.level {
            Level::Error => "error".red().bold(),
            Level::Note => "note".cyan().bold(),
        };

        match (self.position, &self.source) {
            (Some(position), Some(source)) => {
                let (line_idx, line, column) = line_of(source, position.start);
                writeln!(
                    f,
                    "{}:{}:{} {}: {}",
                    self.filename,
                    line_idx + 1,
                    column + 1,
                    level,
                    self.message.bold()
                )?;
                writeln!(f, "{}", line)?;

                let width = position.end.saturating_sub(position.start) + 1;
                write!(
                    f,
                    "{}{}",
                    " ".repeat(column),
                    "^".repeat(width).green().bold()
                )
            }
            _ => write!(f, "{}: {} {}", self.filename, level, self.message.bold()),
        }
    }
}

#[test]
fn finds_lines_by_character_offset() {
    let source = "+++\n>>é<\n.";
    assert_eq!(line_of(source, 0), (0, "+++", 0));
    assert_eq!(line_of(source, 6), (1, ">>é<", 2));
    assert_eq!(line_of(source, 9), (2, ".", 0));
}

#[test]
fn renders_caret_under_error() {
    colored::control::set_override(false);

    let source = "++\n+]";
    let error = crate::validator::check_syntax(source).error.unwrap();
    let rendered = Diagnostic::from_syntax_error("foo.bf", source, &error).to_string();

    assert_eq!(
        rendered,
        "foo.bf:2:2 error: This ] has no matching [\n+]\n ^"
    );
}

#[test]
fn successful_runs_have_no_diagnostic() {
    let result = crate::session::run("+", "", &Default::default()).unwrap();
    assert_eq!(Diagnostic::from_result("foo.bf", &result), None);
}

#[test]
fn faults_are_errors() {
    colored::control::set_override(false);

    let result = crate::session::run("+<", "", &Default::default()).unwrap();
    let diagnostic = Diagnostic::from_result("foo.bf", &result).unwrap();
    assert_eq!(diagnostic.level, Level::Error);
    assert_eq!(diagnostic.position, Some(Position::at(1)));
    assert_eq!(
        diagnostic.message,
        "failure: the pointer moved before the first cell at '<'"
    );
}

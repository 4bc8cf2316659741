//! Static structural checks for PBrain source code. A single pass
//! reports the first problem it finds, so callers can point at it.

use crate::opcodes::Operator;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    /// A `]` with no open `[` in the same scope.
    MismatchedSquareBracket,
    /// A `[` that is never closed.
    IncompleteLoop,
    /// The source has no operators at all.
    MissingOperators,
    /// A `(` inside a loop.
    InvalidFunctionDeclaration,
    /// A `(` inside another function body.
    NestedFunctionDeclaration,
    /// `()` with no operators in the body.
    EmptyFunctionDeclaration,
    /// A `(` that is never closed.
    IncompleteFunctionDeclaration,
    /// A `)` with no open `(`.
    MismatchedParenthesis,
}

impl SyntaxErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            SyntaxErrorKind::MismatchedSquareBracket => "This ] has no matching [",
            SyntaxErrorKind::IncompleteLoop => "This [ has no matching ]",
            SyntaxErrorKind::MissingOperators => "The script does not contain any operators",
            SyntaxErrorKind::InvalidFunctionDeclaration => "Functions cannot be declared inside a loop",
            SyntaxErrorKind::NestedFunctionDeclaration => {
                "Functions cannot be declared inside another function"
            }
            SyntaxErrorKind::EmptyFunctionDeclaration => "This function has an empty body",
            SyntaxErrorKind::IncompleteFunctionDeclaration => "This ( has no matching )",
            SyntaxErrorKind::MismatchedParenthesis => "This ) has no matching (",
        }
    }
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The first structural error in a script. `offset` is a character
/// offset into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} (offset {offset})")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub offset: usize,
}

impl SyntaxError {
    fn at(kind: SyntaxErrorKind, offset: usize) -> Self {
        SyntaxError { kind, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxValidationResult {
    pub error: Option<SyntaxError>,
    /// How many operators were seen before the scan stopped.
    pub operators_count: usize,
}

impl SyntaxValidationResult {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<SyntaxErrorKind> {
        self.error.map(|e| e.kind)
    }

    pub fn error_offset(&self) -> Option<usize> {
        self.error.map(|e| e.offset)
    }

    pub fn into_result(self) -> Result<usize, SyntaxError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.operators_count),
        }
    }
}

/// An open `(` and what we have seen of its body so far.
struct OpenFunction {
    start: usize,
    loops: Vec<usize>,
    operators: usize,
}

/// Check that `source` is a well formed PBrain script.
pub fn check_syntax(source: &str) -> SyntaxValidationResult {
    let mut operators = 0;
    let error = scan(source, &mut operators).err();

    SyntaxValidationResult {
        error,
        operators_count: operators,
    }
}

fn scan(source: &str, operators: &mut usize) -> Result<(), SyntaxError> {
    use SyntaxErrorKind::*;

    // Offsets of the open `[` outside of any function.
    let mut root_loops: Vec<usize> = vec![];
    let mut function: Option<OpenFunction> = None;

    for (offset, c) in source.chars().enumerate() {
        let op = match Operator::from_char(c) {
            Some(op) => op,
            None => continue,
        };
        *operators += 1;

        if let Some(open) = function.as_mut() {
            if !matches!(op, Operator::FunctionStart | Operator::FunctionEnd) {
                open.operators += 1;
            }
        }

        match op {
            Operator::LoopStart => match function.as_mut() {
                Some(open) => open.loops.push(offset),
                None => root_loops.push(offset),
            },
            Operator::LoopEnd => {
                let loops = match function.as_mut() {
                    Some(open) => &mut open.loops,
                    None => &mut root_loops,
                };
                if loops.pop().is_none() {
                    return Err(SyntaxError::at(MismatchedSquareBracket, offset));
                }
            }
            Operator::FunctionStart => {
                if function.is_some() {
                    return Err(SyntaxError::at(NestedFunctionDeclaration, offset));
                }
                if !root_loops.is_empty() {
                    return Err(SyntaxError::at(InvalidFunctionDeclaration, offset));
                }
                function = Some(OpenFunction {
                    start: offset,
                    loops: vec![],
                    operators: 0,
                });
            }
            Operator::FunctionEnd => {
                let open = match function.take() {
                    Some(open) => open,
                    None => return Err(SyntaxError::at(MismatchedParenthesis, offset)),
                };
                if let Some(&loop_start) = open.loops.last() {
                    return Err(SyntaxError::at(IncompleteLoop, loop_start));
                }
                if open.operators == 0 {
                    return Err(SyntaxError::at(EmptyFunctionDeclaration, offset));
                }
            }
            _ => {}
        }
    }

    if let Some(open) = function {
        return Err(SyntaxError::at(IncompleteFunctionDeclaration, open.start));
    }
    if let Some(&loop_start) = root_loops.last() {
        return Err(SyntaxError::at(IncompleteLoop, loop_start));
    }
    if *operators == 0 {
        return Err(SyntaxError::at(MissingOperators, 0));
    }

    Ok(())
}

#[cfg(test)]
fn error_of(source: &str) -> Option<(SyntaxErrorKind, usize)> {
    check_syntax(source).error.map(|e| (e.kind, e.offset))
}

#[test]
fn valid_scripts() {
    for source in &["+", "[]", "++[>++>-]>+", "(+++):>:", "(+[-]):", "hello . world"] {
        assert!(check_syntax(source).is_valid(), "{:?} should be valid", source);
    }
}

#[test]
fn counts_operators() {
    assert_eq!(check_syntax("a+b-c").operators_count, 2);
}

#[test]
fn unbalanced_loops() {
    use SyntaxErrorKind::*;
    assert_eq!(error_of("]"), Some((MismatchedSquareBracket, 0)));
    assert_eq!(error_of("[]]["), Some((MismatchedSquareBracket, 2)));
    assert_eq!(error_of("["), Some((IncompleteLoop, 0)));
    assert_eq!(error_of("[[]+[+"), Some((IncompleteLoop, 4)));
}

#[test]
fn missing_operators() {
    assert_eq!(error_of(""), Some((SyntaxErrorKind::MissingOperators, 0)));
    assert_eq!(
        error_of("just a comment"),
        Some((SyntaxErrorKind::MissingOperators, 0))
    );
}

#[test]
fn function_declarations() {
    use SyntaxErrorKind::*;
    assert_eq!(error_of("[(+)]"), Some((InvalidFunctionDeclaration, 1)));
    assert_eq!(error_of("(+(-))"), Some((NestedFunctionDeclaration, 2)));
    assert_eq!(error_of("+()"), Some((EmptyFunctionDeclaration, 2)));
    assert_eq!(error_of("( comment )"), Some((EmptyFunctionDeclaration, 10)));
    assert_eq!(error_of("+(+"), Some((IncompleteFunctionDeclaration, 1)));
    assert_eq!(error_of("+)"), Some((MismatchedParenthesis, 1)));
}

#[test]
fn loops_cannot_cross_function_bodies() {
    use SyntaxErrorKind::*;
    assert_eq!(error_of("(+[)]"), Some((IncompleteLoop, 2)));
    assert_eq!(error_of("(+])"), Some((MismatchedSquareBracket, 2)));
}

#[test]
fn first_error_wins() {
    assert_eq!(
        error_of("]("),
        Some((SyntaxErrorKind::MismatchedSquareBracket, 0))
    );
}

#[test]
fn offsets_count_characters_not_bytes() {
    assert_eq!(
        error_of("é]"),
        Some((SyntaxErrorKind::MismatchedSquareBracket, 1))
    );
}

#[test]
fn check_syntax_is_idempotent() {
    let source = "+(+[-)";
    assert_eq!(check_syntax(source), check_syntax(source));
}

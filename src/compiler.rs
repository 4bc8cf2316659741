//! Compile validated source text into a flat opcode buffer.
//!
//! Runs of `+ - > <` are merged into a single opcode with a repeat
//! count, and the targets of every `[`, `]` and `(` are computed ahead
//! of time so the executor never has to scan for a matching bracket.

use crate::opcodes::{Opcode, Operator, MAX_OPCODE_COUNT};
use crate::validator::{check_syntax, SyntaxError};
use itertools::Itertools;
use std::ops::Range;
use tracing::trace;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationMode {
    /// Merge runs of compressible operators.
    Release,
    /// One opcode per operator, so breakpoints can land on any of them.
    Debug,
}

/// A compiled script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    opcodes: Vec<Opcode>,
    /// Matching opcode index for `[`, `]` and `(`. Unused elsewhere.
    jumps: Vec<usize>,
    /// Operator index of the first unit of each opcode.
    first_operator: Vec<usize>,
    /// Source character offset of each operator.
    source_offsets: Vec<usize>,
    mode: CompilationMode,
}

impl Program {
    /// Validate `source` and compile it.
    pub fn compile(source: &str, mode: CompilationMode) -> Result<Program, SyntaxError> {
        check_syntax(source).into_result()?;
        Ok(compile(source, mode))
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn mode(&self) -> CompilationMode {
        self.mode
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn opcode(&self, index: usize) -> Opcode {
        self.opcodes[index]
    }

    /// The matching opcode of the `[`, `]` or `(` at `index`.
    pub fn jump_target(&self, index: usize) -> usize {
        self.jumps[index]
    }

    /// Total number of operators in the source, comments excluded.
    pub fn operators_count(&self) -> usize {
        self.source_offsets.len()
    }

    /// The operator index of the `unit`-th repeat of the opcode at `index`.
    pub fn operator_index(&self, index: usize, unit: usize) -> usize {
        self.first_operator[index] + unit
    }

    /// The source character offset of the `unit`-th repeat of the opcode
    /// at `index`.
    pub fn source_offset(&self, index: usize, unit: usize) -> usize {
        self.source_offsets[self.operator_index(index, unit)]
    }

    /// The index of the first operator found at or after the given
    /// source offset.
    pub fn operator_at_or_after(&self, source_offset: usize) -> Option<usize> {
        let index = self
            .source_offsets
            .partition_point(|&offset| offset < source_offset);
        if index < self.source_offsets.len() {
            Some(index)
        } else {
            None
        }
    }

    /// The opcode containing the given operator.
    pub fn opcode_of_operator(&self, operator_index: usize) -> Option<usize> {
        if operator_index >= self.operators_count() {
            return None;
        }
        Some(
            self.first_operator
                .partition_point(|&first| first <= operator_index)
                - 1,
        )
    }

    /// Write the operator text of the opcodes in `range`.
    pub fn write_range(&self, range: Range<usize>, out: &mut String) {
        for opcode in &self.opcodes[range] {
            opcode.write_to(out);
        }
    }

    /// The operator text of the whole program, without comments.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.operators_count());
        self.write_range(0..self.len(), &mut text);
        text
    }

    fn push(&mut self, opcode: Opcode, first_operator: usize) {
        self.opcodes.push(opcode);
        self.first_operator.push(first_operator);
    }
}

/// Compile source text that has already passed `check_syntax`.
pub(crate) fn compile(source: &str, mode: CompilationMode) -> Program {
    let operators: Vec<(usize, Operator)> = source
        .chars()
        .enumerate()
        .filter_map(|(offset, c)| Operator::from_char(c).map(|op| (offset, op)))
        .collect();

    let mut program = Program {
        opcodes: Vec::with_capacity(operators.len()),
        jumps: vec![],
        first_operator: Vec::with_capacity(operators.len()),
        source_offsets: operators.iter().map(|&(offset, _)| offset).collect(),
        mode,
    };

    let runs = operators
        .iter()
        .map(|&(_, op)| op)
        .enumerate()
        .group_by(|&(_, op)| op);

    for (operator, run) in &runs {
        let indices: Vec<usize> = run.map(|(index, _)| index).collect();

        if mode == CompilationMode::Release && operator.is_compressible() {
            for chunk in indices.chunks(MAX_OPCODE_COUNT) {
                program.push(Opcode::repeated(operator, chunk.len() as u16), chunk[0]);
            }
        } else {
            for index in indices {
                program.push(Opcode::single(operator), index);
            }
        }
    }

    program.jumps = jump_table(&program.opcodes);

    trace!(
        operators = operators.len(),
        opcodes = program.len(),
        ?mode,
        "compiled script"
    );

    program
}

fn jump_table(opcodes: &[Opcode]) -> Vec<usize> {
    let mut jumps = vec![0; opcodes.len()];
    let mut open = vec![];

    for (index, opcode) in opcodes.iter().enumerate() {
        match opcode.operator {
            Operator::LoopStart | Operator::FunctionStart => open.push(index),
            Operator::LoopEnd | Operator::FunctionEnd => {
                if let Some(start) = open.pop() {
                    jumps[start] = index;
                    jumps[index] = start;
                }
            }
            _ => {}
        }
    }

    jumps
}

#[cfg(test)]
fn opcodes_of(source: &str) -> Vec<String> {
    Program::compile(source, CompilationMode::Release)
        .unwrap()
        .opcodes()
        .iter()
        .map(|opcode| opcode.to_string())
        .collect()
}

#[test]
fn compresses_runs() {
    assert_eq!(opcodes_of("+++++---"), ["+x5", "-x3"]);
    assert_eq!(opcodes_of(">>><<"), [">x3", "<x2"]);
}

#[test]
fn runs_merge_across_comments() {
    assert_eq!(opcodes_of("+ + hello +"), ["+x3"]);
}

#[test]
fn control_operators_are_never_merged() {
    assert_eq!(opcodes_of("..,,[[]]"), [".", ".", ",", ",", "[", "[", "]", "]"]);
    assert_eq!(opcodes_of("(+):::"), ["(", "+", ")", ":", ":", ":"]);
}

#[test]
fn long_runs_are_split() {
    let source = "+".repeat(70_000);
    let program = Program::compile(&source, CompilationMode::Release).unwrap();

    assert_eq!(
        program.opcodes(),
        [
            Opcode::repeated(Operator::Plus, 65_535),
            Opcode::repeated(Operator::Plus, 4_465),
        ]
    );
    assert_eq!(program.operator_index(1, 0), 65_535);
}

#[test]
fn precomputes_jumps() {
    let program = Program::compile("++[>++>-]>+", CompilationMode::Release).unwrap();
    // +x2 [ > +x2 > - ] > +
    assert_eq!(program.len(), 9);
    assert_eq!(program.jump_target(1), 6);
    assert_eq!(program.jump_target(6), 1);

    let program = Program::compile("(+[-]):", CompilationMode::Release).unwrap();
    assert_eq!(program.jump_target(0), 5);
    assert_eq!(program.jump_target(2), 4);
}

#[test]
fn debug_mode_keeps_every_operator() {
    let program = Program::compile("a+++b", CompilationMode::Debug).unwrap();
    assert_eq!(program.len(), 3);
    assert_eq!(program.source_offset(2, 0), 3);
}

#[test]
fn buffer_is_never_longer_than_source() {
    for source in &["+", "+-+-", "[>+<-]", "(+>):+", "x+y+z"] {
        let program = Program::compile(source, CompilationMode::Debug).unwrap();
        assert!(program.len() <= source.chars().count());
    }
}

#[test]
fn maps_source_offsets_to_operators() {
    let program = Program::compile("+ + [-]", CompilationMode::Release).unwrap();
    assert_eq!(program.operator_at_or_after(0), Some(0));
    assert_eq!(program.operator_at_or_after(1), Some(1));
    assert_eq!(program.operator_at_or_after(3), Some(2));
    assert_eq!(program.operator_at_or_after(7), None);

    assert_eq!(program.opcode_of_operator(1), Some(0));
    assert_eq!(program.opcode_of_operator(2), Some(1));
    assert_eq!(program.opcode_of_operator(5), None);
}

#[test]
fn rebuilds_text_without_comments() {
    let program = Program::compile("+ + [ - ] done.", CompilationMode::Release).unwrap();
    assert_eq!(program.text(), "++[-].");
}

#[test]
fn rejects_invalid_source() {
    assert!(Program::compile("[", CompilationMode::Release).is_err());
}

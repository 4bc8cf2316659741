//! The closed set of operators understood by the interpreter, and the
//! compiled instruction built from them.

use std::fmt;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// The largest repeat count a single `Opcode` can carry.
pub const MAX_OPCODE_COUNT: usize = u16::MAX as usize;

/// `Operator` is one of the eleven characters that have meaning in a
/// PBrain program. Every other character is a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    ForwardPtr,
    BackwardPtr,
    PrintChar,
    ReadChar,
    LoopStart,
    LoopEnd,
    FunctionStart,
    FunctionEnd,
    FunctionCall,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Operator> {
        match c {
            '+' => Some(Operator::Plus),
            '-' => Some(Operator::Minus),
            '>' => Some(Operator::ForwardPtr),
            '<' => Some(Operator::BackwardPtr),
            '.' => Some(Operator::PrintChar),
            ',' => Some(Operator::ReadChar),
            '[' => Some(Operator::LoopStart),
            ']' => Some(Operator::LoopEnd),
            '(' => Some(Operator::FunctionStart),
            ')' => Some(Operator::FunctionEnd),
            ':' => Some(Operator::FunctionCall),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Operator::Plus => '+',
            Operator::Minus => '-',
            Operator::ForwardPtr => '>',
            Operator::BackwardPtr => '<',
            Operator::PrintChar => '.',
            Operator::ReadChar => ',',
            Operator::LoopStart => '[',
            Operator::LoopEnd => ']',
            Operator::FunctionStart => '(',
            Operator::FunctionEnd => ')',
            Operator::FunctionCall => ':',
        }
    }

    /// The stable byte code of this operator.
    pub fn code(self) -> u8 {
        match self {
            Operator::Plus => 0,
            Operator::Minus => 1,
            Operator::ForwardPtr => 2,
            Operator::BackwardPtr => 3,
            Operator::PrintChar => 4,
            Operator::ReadChar => 5,
            Operator::LoopStart => 6,
            Operator::LoopEnd => 7,
            Operator::FunctionStart => 8,
            Operator::FunctionEnd => 9,
            Operator::FunctionCall => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Operator> {
        match code {
            0 => Some(Operator::Plus),
            1 => Some(Operator::Minus),
            2 => Some(Operator::ForwardPtr),
            3 => Some(Operator::BackwardPtr),
            4 => Some(Operator::PrintChar),
            5 => Some(Operator::ReadChar),
            6 => Some(Operator::LoopStart),
            7 => Some(Operator::LoopEnd),
            8 => Some(Operator::FunctionStart),
            9 => Some(Operator::FunctionEnd),
            10 => Some(Operator::FunctionCall),
            _ => None,
        }
    }

    /// Only cell updates and pointer moves are merged into runs.
    pub fn is_compressible(self) -> bool {
        matches!(
            self,
            Operator::Plus | Operator::Minus | Operator::ForwardPtr | Operator::BackwardPtr
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A single compiled instruction. `count` is always at least one, and
/// is only ever greater than one for compressible operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub operator: Operator,
    pub count: u16,
}

impl Opcode {
    pub fn single(operator: Operator) -> Self {
        Opcode { operator, count: 1 }
    }

    pub fn repeated(operator: Operator, count: u16) -> Self {
        debug_assert!(count > 0, "opcodes always repeat at least once");
        debug_assert!(count == 1 || operator.is_compressible());
        Opcode { operator, count }
    }

    /// Write the operator text this opcode was compiled from.
    pub fn write_to(&self, out: &mut String) {
        self.write_prefix_to(out, self.count as usize);
    }

    /// Write at most `units` repeats of this opcode's operator.
    pub fn write_prefix_to(&self, out: &mut String, units: usize) {
        let units = units.min(self.count as usize);
        out.extend(std::iter::repeat(self.operator.as_char()).take(units));
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{}", self.operator)
        } else {
            write!(f, "{}x{}", self.operator, self.count)
        }
    }
}

#[test]
fn operator_chars_round_trip() {
    for c in "+-><.,[]():".chars() {
        let op = Operator::from_char(c).unwrap();
        assert_eq!(op.as_char(), c);
        assert_eq!(Operator::from_code(op.code()), Some(op));
    }
}

#[test]
fn comments_are_not_operators() {
    assert_eq!(Operator::from_char('a'), None);
    assert_eq!(Operator::from_char(' '), None);
    assert_eq!(Operator::from_code(11), None);
}

#[test]
fn opcode_prefix_is_capped_at_count() {
    let mut text = String::new();
    Opcode::repeated(Operator::Minus, 3).write_prefix_to(&mut text, 10);
    assert_eq!(text, "---");

    let mut text = String::new();
    Opcode::repeated(Operator::ForwardPtr, 5).write_prefix_to(&mut text, 2);
    assert_eq!(text, ">>");
}

#[test]
fn opcode_display() {
    assert_eq!(format!("{}", Opcode::single(Operator::FunctionCall)), ":");
    assert_eq!(format!("{}", Opcode::repeated(Operator::Plus, 12)), "+x12");
}

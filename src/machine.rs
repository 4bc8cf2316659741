//! The tape a script runs against. Every cell update and pointer move
//! goes through `MachineState`, so the executor never has to know about
//! cell widths or overflow rules.

use crate::exit_code::FailureCause;
use std::fmt;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellWidth {
    U8,
    U16,
}

impl CellWidth {
    pub fn max_value(self) -> u16 {
        match self {
            CellWidth::U8 => u8::MAX as u16,
            CellWidth::U16 => u16::MAX,
        }
    }

    fn modulus(self) -> u32 {
        self.max_value() as u32 + 1
    }
}

/// What happens when a cell goes past zero or its maximum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowMode {
    Wrap,
    Fault,
}

/// A fault raised part way through a batched update. `applied` is how
/// many units took effect before the limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overrun {
    pub cause: FailureCause,
    pub applied: usize,
}

#[derive(Clone, PartialEq, Eq)]
pub struct MachineState {
    cells: Vec<u16>,
    position: usize,
    width: CellWidth,
    overflow: OverflowMode,
}

impl MachineState {
    /// Create a zeroed tape of `size` cells. `size` must not be zero.
    pub fn new(size: usize, width: CellWidth, overflow: OverflowMode) -> Self {
        assert!(size > 0, "a machine needs at least one cell");
        MachineState {
            cells: vec![0; size],
            position: 0,
            width,
            overflow,
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn width(&self) -> CellWidth {
        self.width
    }

    pub fn overflow(&self) -> OverflowMode {
        self.overflow
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.cells.get(index).copied()
    }

    pub fn current(&self) -> u16 {
        self.cells[self.position]
    }

    pub fn increment(&mut self, count: usize) -> Result<(), Overrun> {
        let max = self.width.max_value() as usize;
        let value = self.cells[self.position] as usize;

        match self.overflow {
            OverflowMode::Wrap => {
                self.cells[self.position] = self.wrap(value as u64 + count as u64);
                Ok(())
            }
            OverflowMode::Fault if value + count > max => {
                self.cells[self.position] = max as u16;
                Err(Overrun {
                    cause: FailureCause::MaxValueExceeded,
                    applied: max - value,
                })
            }
            OverflowMode::Fault => {
                self.cells[self.position] = (value + count) as u16;
                Ok(())
            }
        }
    }

    pub fn decrement(&mut self, count: usize) -> Result<(), Overrun> {
        let modulus = self.width.modulus() as u64;
        let value = self.cells[self.position] as usize;

        match self.overflow {
            OverflowMode::Wrap => {
                let down = count as u64 % modulus;
                self.cells[self.position] = self.wrap(value as u64 + modulus - down);
                Ok(())
            }
            OverflowMode::Fault if count > value => {
                self.cells[self.position] = 0;
                Err(Overrun {
                    cause: FailureCause::NegativeValue,
                    applied: value,
                })
            }
            OverflowMode::Fault => {
                self.cells[self.position] = (value - count) as u16;
                Ok(())
            }
        }
    }

    pub fn move_next(&mut self, count: usize) -> Result<(), Overrun> {
        let last = self.cells.len() - 1;
        if count > last - self.position {
            let applied = last - self.position;
            self.position = last;
            return Err(Overrun {
                cause: FailureCause::UpperBoundExceeded,
                applied,
            });
        }
        self.position += count;
        Ok(())
    }

    pub fn move_back(&mut self, count: usize) -> Result<(), Overrun> {
        if count > self.position {
            let applied = self.position;
            self.position = 0;
            return Err(Overrun {
                cause: FailureCause::LowerBoundExceeded,
                applied,
            });
        }
        self.position -= count;
        Ok(())
    }

    /// Store a character read from stdin in the current cell.
    pub fn input(&mut self, c: char) -> Result<(), FailureCause> {
        let code = c as u32;
        if code > self.width.max_value() as u32 {
            if self.overflow == OverflowMode::Fault {
                return Err(FailureCause::MaxValueExceeded);
            }
            self.cells[self.position] = self.wrap(code as u64);
        } else {
            self.cells[self.position] = code as u16;
        }
        Ok(())
    }

    /// The current cell as a character.
    pub fn output(&self) -> char {
        char::from_u32(self.current() as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn wrap(&self, value: u64) -> u16 {
        (value % self.width.modulus() as u64) as u16
    }
}

impl fmt::Debug for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Trailing zero cells are just noise.
        let used = self
            .cells
            .iter()
            .rposition(|&cell| cell != 0)
            .map_or(0, |last| last + 1)
            .max(self.position + 1);

        f.debug_struct("MachineState")
            .field("cells", &&self.cells[..used])
            .field("size", &self.cells.len())
            .field("position", &self.position)
            .field("width", &self.width)
            .field("overflow", &self.overflow)
            .finish()
    }
}

#[cfg(test)]
fn machine(width: CellWidth, overflow: OverflowMode) -> MachineState {
    MachineState::new(4, width, overflow)
}

#[test]
fn increments_and_decrements() {
    let mut state = machine(CellWidth::U8, OverflowMode::Fault);
    state.increment(5).unwrap();
    state.decrement(3).unwrap();
    assert_eq!(state.current(), 2);
}

#[test]
fn byte_cells_wrap() {
    let mut state = machine(CellWidth::U8, OverflowMode::Wrap);
    state.decrement(1).unwrap();
    assert_eq!(state.current(), 255);
    state.increment(258).unwrap();
    assert_eq!(state.current(), 1);
    state.decrement(513).unwrap();
    assert_eq!(state.current(), 0);
}

#[test]
fn wide_cells_wrap() {
    let mut state = machine(CellWidth::U16, OverflowMode::Wrap);
    state.increment(300).unwrap();
    assert_eq!(state.current(), 300);
    state.decrement(301).unwrap();
    assert_eq!(state.current(), u16::MAX);
}

#[test]
fn faults_stop_at_the_limit() {
    let mut state = machine(CellWidth::U8, OverflowMode::Fault);
    state.increment(250).unwrap();
    assert_eq!(
        state.increment(10),
        Err(Overrun {
            cause: FailureCause::MaxValueExceeded,
            applied: 5,
        })
    );
    assert_eq!(state.current(), 255);

    let mut state = machine(CellWidth::U8, OverflowMode::Fault);
    state.increment(2).unwrap();
    assert_eq!(
        state.decrement(3),
        Err(Overrun {
            cause: FailureCause::NegativeValue,
            applied: 2,
        })
    );
    assert_eq!(state.current(), 0);
}

#[test]
fn pointer_stays_in_bounds() {
    let mut state = machine(CellWidth::U8, OverflowMode::Fault);
    state.move_next(2).unwrap();
    assert_eq!(
        state.move_next(5),
        Err(Overrun {
            cause: FailureCause::UpperBoundExceeded,
            applied: 1,
        })
    );
    assert_eq!(state.position(), 3);
    assert_eq!(
        state.move_back(4),
        Err(Overrun {
            cause: FailureCause::LowerBoundExceeded,
            applied: 3,
        })
    );
    assert_eq!(state.position(), 0);
}

#[test]
fn pointer_moves_do_not_wrap() {
    let mut state = machine(CellWidth::U8, OverflowMode::Wrap);
    assert!(state.move_back(1).is_err());
}

#[test]
fn input_respects_cell_width() {
    let mut state = machine(CellWidth::U8, OverflowMode::Fault);
    state.input('0').unwrap();
    assert_eq!(state.current(), 48);
    assert_eq!(state.input('€'), Err(FailureCause::MaxValueExceeded));

    let mut state = machine(CellWidth::U8, OverflowMode::Wrap);
    state.input('€').unwrap();
    assert_eq!(state.current(), ('€' as u32 % 256) as u16);

    let mut state = machine(CellWidth::U16, OverflowMode::Fault);
    state.input('€').unwrap();
    assert_eq!(state.output(), '€');
}

#[test]
fn surrogates_print_as_replacement() {
    let mut state = machine(CellWidth::U16, OverflowMode::Fault);
    state.increment(0xD800).unwrap();
    assert_eq!(state.output(), char::REPLACEMENT_CHARACTER);
}

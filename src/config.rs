//! Settings for a single run or session.

use crate::machine::{CellWidth, OverflowMode};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use pretty_assertions::assert_eq;

pub const DEFAULT_MEMORY_SIZE: usize = 128;
pub const DEFAULT_STDOUT_LIMIT: usize = 8 * 1024;
pub const DEFAULT_STACK_LIMIT: usize = 512;

/// A limit after which a run is forcibly halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionThreshold {
    /// Total operators executed.
    Operations(u64),
    /// Wall clock time of a single run or continuation.
    Elapsed(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("memory size must be at least one cell")]
    EmptyMemory,
    #[error("stdout limit must be at least one character")]
    EmptyStdout,
    #[error("stack limit must allow at least the root frame")]
    EmptyStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub memory_size: usize,
    pub cell_width: CellWidth,
    pub overflow: OverflowMode,
    /// Maximum number of characters a script may print.
    pub stdout_limit: usize,
    /// Maximum number of frames on the call stack, root frame included.
    pub stack_limit: usize,
    pub threshold: Option<ExecutionThreshold>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            memory_size: DEFAULT_MEMORY_SIZE,
            cell_width: CellWidth::U8,
            overflow: OverflowMode::Fault,
            stdout_limit: DEFAULT_STDOUT_LIMIT,
            stack_limit: DEFAULT_STACK_LIMIT,
            threshold: None,
        }
    }
}

impl InterpreterConfig {
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_cell_width(mut self, cell_width: CellWidth) -> Self {
        self.cell_width = cell_width;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowMode) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_stdout_limit(mut self, stdout_limit: usize) -> Self {
        self.stdout_limit = stdout_limit;
        self
    }

    pub fn with_stack_limit(mut self, stack_limit: usize) -> Self {
        self.stack_limit = stack_limit;
        self
    }

    pub fn with_threshold(mut self, threshold: ExecutionThreshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.stdout_limit == 0 {
            return Err(ConfigError::EmptyStdout);
        }
        if self.stack_limit == 0 {
            return Err(ConfigError::EmptyStack);
        }
        Ok(())
    }
}

#[test]
fn default_config_is_valid() {
    assert_eq!(InterpreterConfig::default().validate(), Ok(()));
}

#[test]
fn builder_sets_fields() {
    let config = InterpreterConfig::default()
        .with_memory_size(16)
        .with_cell_width(CellWidth::U16)
        .with_overflow(OverflowMode::Wrap)
        .with_threshold(ExecutionThreshold::Operations(100));

    assert_eq!(config.memory_size, 16);
    assert_eq!(config.cell_width, CellWidth::U16);
    assert_eq!(config.overflow, OverflowMode::Wrap);
    assert_eq!(config.threshold, Some(ExecutionThreshold::Operations(100)));
}

#[test]
fn rejects_zero_limits() {
    let config = InterpreterConfig::default();
    assert_eq!(
        config.clone().with_memory_size(0).validate(),
        Err(ConfigError::EmptyMemory)
    );
    assert_eq!(
        config.clone().with_stdout_limit(0).validate(),
        Err(ConfigError::EmptyStdout)
    );
    assert_eq!(
        config.with_stack_limit(0).validate(),
        Err(ConfigError::EmptyStack)
    );
}

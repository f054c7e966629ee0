//! Construction-time errors.

use thiserror::Error;

use crate::types::{LaneShape, ValueType};

/// A malformed instruction sequence or module, caught before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{op}: operand stack is empty, expected {expected}")]
    StackUnderflow {
        op: &'static str,
        expected: ValueType,
    },

    #[error("{op}: expected {expected} operand, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: ValueType,
        found: ValueType,
    },

    #[error("{op}: lane {lane} out of range for {shape}")]
    LaneOutOfRange {
        op: &'static str,
        shape: LaneShape,
        lane: u8,
    },

    #[error("{op}: not defined for {shape}")]
    UnsupportedShape { op: &'static str, shape: LaneShape },

    #[error("local {0} is not declared")]
    UnknownLocal(u32),

    #[error("function {0} is not defined in this module")]
    UnknownFunction(u32),

    #[error("global {0} is not defined in this module")]
    UnknownGlobal(u32),

    #[error("function {function}: body leaves {found:?} on the stack, signature returns {expected:?}")]
    ResultMismatch {
        function: u32,
        expected: Vec<ValueType>,
        found: Vec<ValueType>,
    },

    #[error("export name `{0}` is already used")]
    DuplicateExport(String),

    #[error("module is already built; functions and globals are frozen")]
    Sealed,
}

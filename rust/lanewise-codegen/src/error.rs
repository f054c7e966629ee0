//! Engine errors and trap codes.

use thiserror::Error;

/// Errors that can occur while compiling, instantiating or calling a module.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("target error: {0}")]
    Target(String),

    #[error("invalid module: {0}")]
    Invalid(#[from] wasmparser::BinaryReaderError),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("lowering error: {0}")]
    Lowering(String),

    #[error("JIT module error: {0}")]
    Module(String),

    #[error("function {0} not found")]
    UnknownFunction(u32),

    #[error("export `{0}` not found")]
    UnknownExport(String),

    #[error("global {0} not found")]
    UnknownGlobal(u32),

    #[error("bad call to function {func}: {reason}")]
    BadCall { func: u32, reason: String },

    #[error("wasm trap: {0}")]
    Trap(TrapCode),
}

impl From<cranelift_module::ModuleError> for CodegenError {
    fn from(e: cranelift_module::ModuleError) -> Self {
        CodegenError::Module(e.to_string())
    }
}

/// Why generated code aborted a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapCode {
    IntegerDivisionByZero,
    IntegerOverflow,
    Unknown(u32),
}

impl TrapCode {
    /// The value generated code writes into the trap slot.
    pub fn raw(self) -> u32 {
        match self {
            TrapCode::IntegerDivisionByZero => 1,
            TrapCode::IntegerOverflow => 2,
            TrapCode::Unknown(code) => code,
        }
    }

    pub fn from_raw(code: u32) -> Self {
        match code {
            1 => TrapCode::IntegerDivisionByZero,
            2 => TrapCode::IntegerOverflow,
            other => TrapCode::Unknown(other),
        }
    }
}

impl std::fmt::Display for TrapCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrapCode::IntegerDivisionByZero => f.write_str("integer divide by zero"),
            TrapCode::IntegerOverflow => f.write_str("integer overflow"),
            TrapCode::Unknown(code) => write!(f, "unknown trap {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_codes_round_trip() {
        for code in [
            TrapCode::IntegerDivisionByZero,
            TrapCode::IntegerOverflow,
            TrapCode::Unknown(77),
        ] {
            assert_eq!(TrapCode::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn trap_display() {
        let err = CodegenError::Trap(TrapCode::IntegerDivisionByZero);
        assert_eq!(err.to_string(), "wasm trap: integer divide by zero");
    }
}

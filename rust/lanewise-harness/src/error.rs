//! Harness errors. Every failure after module construction names the
//! execution configuration it happened under.

use lanewise_codegen::{CodegenError, TrapCode};
use lanewise_wasm::EncodeError;
use thiserror::Error;

use crate::runner::ExecConfig;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("module construction failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("[{config}] compilation failed: {source}")]
    Compile {
        config: ExecConfig,
        #[source]
        source: CodegenError,
    },

    #[error("[{config}] trapped: {code}")]
    Trap { config: ExecConfig, code: TrapCode },

    #[error("[{config}] engine error: {source}")]
    Engine {
        config: ExecConfig,
        #[source]
        source: CodegenError,
    },

    #[error("[{config}] {check}: expected {expected}, got {actual}")]
    Mismatch {
        config: ExecConfig,
        check: String,
        expected: String,
        actual: String,
    },

    #[error("[{config}] {check}: got {actual}, but [{reference}] got {expected}")]
    Disagreement {
        config: ExecConfig,
        reference: ExecConfig,
        check: String,
        expected: String,
        actual: String,
    },

    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),

    #[error("config error: {0}")]
    Config(String),
}

impl HarnessError {
    /// Attribute an engine error to `config`.
    pub fn from_engine(config: ExecConfig, err: CodegenError) -> Self {
        match err {
            CodegenError::Trap(code) => HarnessError::Trap { config, code },
            source => HarnessError::Engine { config, source },
        }
    }

    /// The configuration the failure happened under, if any.
    pub fn config(&self) -> Option<ExecConfig> {
        match self {
            HarnessError::Compile { config, .. }
            | HarnessError::Trap { config, .. }
            | HarnessError::Engine { config, .. }
            | HarnessError::Mismatch { config, .. }
            | HarnessError::Disagreement { config, .. } => Some(*config),
            HarnessError::Encode(_)
            | HarnessError::UnknownScenario(_)
            | HarnessError::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanewise_codegen::{LoweringMode, Tier};

    #[test]
    fn traps_are_split_from_other_engine_errors() {
        let config = ExecConfig::new(LoweringMode::Native, Tier::Baseline);
        let trap = HarnessError::from_engine(
            config,
            CodegenError::Trap(TrapCode::IntegerDivisionByZero),
        );
        assert!(matches!(trap, HarnessError::Trap { .. }));
        assert_eq!(trap.to_string(), "[native/baseline] trapped: integer divide by zero");

        let other = HarnessError::from_engine(config, CodegenError::UnknownFunction(4));
        assert!(matches!(other, HarnessError::Engine { .. }));
        assert_eq!(other.config(), Some(config));
    }

    #[test]
    fn mismatch_message_names_config() {
        let err = HarnessError::Mismatch {
            config: ExecConfig::new(LoweringMode::ScalarLowered, Tier::Optimizing),
            check: "lane 0".into(),
            expected: "1".into(),
            actual: "2".into(),
        };
        assert_eq!(
            err.to_string(),
            "[scalar-lowered/optimizing] lane 0: expected 1, got 2"
        );
    }
}

//! Compiling and instantiating one built module under one execution
//! configuration.

use lanewise_codegen::{Engine, EngineConfig, LoweringMode, Tier, Val};
use lanewise_wasm::{Module, V128};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::debug;

use crate::error::HarnessError;

/// Lowering mode and tier a scenario runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecConfig {
    pub mode: LoweringMode,
    pub tier: Tier,
}

impl ExecConfig {
    /// The configuration every scenario runs under at minimum.
    pub const BASELINE_REQUIREMENT: ExecConfig = ExecConfig {
        mode: LoweringMode::ScalarLowered,
        tier: Tier::Optimizing,
    };

    pub fn new(mode: LoweringMode, tier: Tier) -> Self {
        Self { mode, tier }
    }

    /// Every mode at every tier, native first.
    pub fn matrix() -> Vec<ExecConfig> {
        Self::product(
            &LoweringMode::iter().collect::<Vec<_>>(),
            &Tier::iter().collect::<Vec<_>>(),
        )
    }

    /// Every combination of `modes` and `tiers`, duplicates removed.
    pub fn product(modes: &[LoweringMode], tiers: &[Tier]) -> Vec<ExecConfig> {
        let mut out = Vec::new();
        for &mode in modes {
            for &tier in tiers {
                let config = ExecConfig::new(mode, tier);
                if !out.contains(&config) {
                    out.push(config);
                }
            }
        }
        out
    }

    pub fn engine_config(self, simd: bool) -> EngineConfig {
        EngineConfig::new(self.mode, self.tier).with_simd(simd)
    }
}

impl std::fmt::Display for ExecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mode, self.tier)
    }
}

/// Compiles modules with the vector feature gate on or off.
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    simd: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self { simd: true }
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_simd(mut self, simd: bool) -> Self {
        self.simd = simd;
        self
    }

    pub fn simd(&self) -> bool {
        self.simd
    }

    /// Compile `module` under `config` and create a fresh instance.
    pub fn instantiate(&self, module: &Module, config: ExecConfig) -> Result<Instance, HarnessError> {
        let engine = Engine::new(config.engine_config(self.simd));
        let compiled = engine
            .compile(module.bytes())
            .map_err(|source| HarnessError::Compile { config, source })?;
        let inner = compiled
            .instantiate()
            .map_err(|source| HarnessError::Compile { config, source })?;
        debug!(%config, simd = self.simd, "instance ready");
        Ok(Instance { config, inner })
    }
}

/// An engine instance whose errors are attributed to its configuration.
#[derive(Debug)]
pub struct Instance {
    config: ExecConfig,
    inner: lanewise_codegen::Instance,
}

impl Instance {
    pub fn config(&self) -> ExecConfig {
        self.config
    }

    pub fn call(&mut self, index: u32, args: &[Val]) -> Result<Vec<Val>, HarnessError> {
        self.inner
            .call(index, args)
            .map_err(|e| HarnessError::from_engine(self.config, e))
    }

    pub fn call_export(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, HarnessError> {
        self.inner
            .call_export(name, args)
            .map_err(|e| HarnessError::from_engine(self.config, e))
    }

    /// Call a function with exactly one result.
    pub fn call1(&mut self, index: u32, args: &[Val]) -> Result<Val, HarnessError> {
        let results = self.call(index, args)?;
        match results.as_slice() {
            [value] => Ok(*value),
            other => Err(HarnessError::Engine {
                config: self.config,
                source: lanewise_codegen::CodegenError::BadCall {
                    func: index,
                    reason: format!("expected one result, got {}", other.len()),
                },
            }),
        }
    }

    /// The 16 raw bytes of global `index`.
    pub fn read_global(&self, index: u32) -> Result<[u8; 16], HarnessError> {
        self.inner
            .read_global(index)
            .map_err(|e| HarnessError::from_engine(self.config, e))
    }

    pub fn read_global_v128(&self, index: u32) -> Result<V128, HarnessError> {
        self.read_global(index).map(V128::from_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanewise_wasm::{FuncType, LaneShape, ModuleBuilder, ValueType};

    #[test]
    fn matrix_covers_all_four() {
        let matrix = ExecConfig::matrix();
        assert_eq!(matrix.len(), 4);
        assert!(matrix.contains(&ExecConfig::BASELINE_REQUIREMENT));
        assert_eq!(matrix[0].to_string(), "native/baseline");
    }

    #[test]
    fn product_removes_duplicates() {
        let configs = ExecConfig::product(
            &[LoweringMode::Native, LoweringMode::Native],
            &[Tier::Optimizing],
        );
        assert_eq!(configs, vec![ExecConfig::new(LoweringMode::Native, Tier::Optimizing)]);
    }

    fn vector_module() -> Module {
        let mut b = ModuleBuilder::new();
        let f = b
            .new_function(FuncType::new([ValueType::I32], [ValueType::I32]))
            .unwrap();
        b.body(&f)
            .unwrap()
            .local_get(0)
            .unwrap()
            .splat(LaneShape::I32x4)
            .unwrap()
            .extract_lane(LaneShape::I32x4, 2)
            .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn instantiate_and_call() {
        let module = vector_module();
        for config in ExecConfig::matrix() {
            let mut inst = Runner::new().instantiate(&module, config).unwrap();
            assert_eq!(inst.call1(0, &[Val::I32(9)]).unwrap(), Val::I32(9));
            assert_eq!(inst.config(), config);
        }
    }

    #[test]
    fn compile_failure_names_config() {
        let module = vector_module();
        let config = ExecConfig::new(LoweringMode::Native, Tier::Baseline);
        let err = Runner::new()
            .with_simd(false)
            .instantiate(&module, config)
            .unwrap_err();
        assert!(matches!(err, HarnessError::Compile { config: c, .. } if c == config));
        assert!(err.to_string().starts_with("[native/baseline] compilation failed"));
    }
}

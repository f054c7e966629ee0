//! Engine configuration: lowering mode, optimization tier, feature gates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How 128-bit vector values are represented in generated code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LoweringMode {
    /// One native vector value per `v128`.
    Native,
    /// Four `i32` words per `v128`, every lane operation expanded to scalar
    /// code.
    ScalarLowered,
}

/// Compilation strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// No optimization passes (fastest compile).
    Baseline,
    /// Optimize for execution speed.
    Optimizing,
}

impl Tier {
    /// Cranelift `opt_level` setting for this tier.
    pub fn opt_level(self) -> &'static str {
        match self {
            Tier::Baseline => "none",
            Tier::Optimizing => "speed",
        }
    }
}

/// Everything that selects how a module is compiled.
///
/// `simd` is the vector feature gate: with it off, any module that mentions
/// `v128` fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: LoweringMode,
    pub tier: Tier,
    pub simd: bool,
}

impl EngineConfig {
    pub fn new(mode: LoweringMode, tier: Tier) -> Self {
        Self {
            mode,
            tier,
            simd: true,
        }
    }

    pub fn with_simd(mut self, simd: bool) -> Self {
        self.simd = simd;
        self
    }

    pub(crate) fn features(&self) -> wasmparser::WasmFeatures {
        use wasmparser::WasmFeatures;
        let mut features = WasmFeatures::default();
        features.set(WasmFeatures::SIMD, self.simd);
        features.set(WasmFeatures::RELAXED_SIMD, false);
        features
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(LoweringMode::ScalarLowered, Tier::Optimizing)
    }
}

impl std::fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mode, self.tier)?;
        if !self.simd {
            f.write_str(" (simd off)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names_round_trip() {
        assert_eq!(LoweringMode::ScalarLowered.to_string(), "scalar-lowered");
        assert_eq!(
            LoweringMode::from_str("native").unwrap(),
            LoweringMode::Native
        );
        assert_eq!(Tier::from_str("optimizing").unwrap(), Tier::Optimizing);
        assert!(Tier::from_str("turbo").is_err());
    }

    #[test]
    fn default_is_lowered_optimizing_with_simd() {
        let config = EngineConfig::default();
        assert_eq!(config.to_string(), "scalar-lowered/optimizing");
        assert!(config.simd);
        assert_eq!(
            config.with_simd(false).to_string(),
            "scalar-lowered/optimizing (simd off)"
        );
    }

    #[test]
    fn feature_gate_controls_simd() {
        use wasmparser::WasmFeatures;
        let on = EngineConfig::default().features();
        let off = EngineConfig::default().with_simd(false).features();
        assert!(on.contains(WasmFeatures::SIMD));
        assert!(!off.contains(WasmFeatures::SIMD));
    }

    #[test]
    fn tiers_map_to_opt_levels() {
        assert_eq!(Tier::Baseline.opt_level(), "none");
        assert_eq!(Tier::Optimizing.opt_level(), "speed");
    }
}

//! Compilation context: host ISA detection and per-tier settings.

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};

use crate::config::Tier;
use crate::error::CodegenError;

/// Build the host ISA with the optimization level of `tier`.
pub fn host_isa(tier: Tier) -> Result<OwnedTargetIsa, CodegenError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", tier.opt_level())
        .map_err(|e| CodegenError::Target(format!("failed to set opt_level: {e}")))?;
    // JIT code is placed at arbitrary addresses.
    flag_builder
        .set("use_colocated_libcalls", "false")
        .map_err(|e| CodegenError::Target(format!("failed to set libcall mode: {e}")))?;
    flag_builder
        .set("is_pic", "false")
        .map_err(|e| CodegenError::Target(format!("failed to set is_pic: {e}")))?;

    let isa_builder = cranelift_native::builder()
        .map_err(|e| CodegenError::Target(format!("host is not supported: {e}")))?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| CodegenError::Target(format!("failed to build ISA: {e}")))
}

/// A fresh JIT module for one compilation.
pub fn jit_module(tier: Tier) -> Result<JITModule, CodegenError> {
    let isa = host_isa(tier)?;
    let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    Ok(JITModule::new(builder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_tiers_build_a_host_isa() {
        for tier in [Tier::Baseline, Tier::Optimizing] {
            let isa = host_isa(tier).expect("host ISA");
            assert_eq!(isa.flags().opt_level().to_string(), tier.opt_level());
        }
    }

    #[test]
    fn pointer_type_is_64_bit_on_host() {
        let isa = host_isa(Tier::Baseline).unwrap();
        assert_eq!(isa.pointer_type(), cranelift_codegen::ir::types::I64);
    }
}

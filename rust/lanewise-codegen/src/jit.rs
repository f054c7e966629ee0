//! In-process compilation and execution of wasm modules.
//!
//! [`Engine::compile`] validates module bytes, translates every function with
//! the configured [`LoweringMode`] at the configured
//! [`Tier`](crate::config::Tier), and finalizes
//! the code in a private `JITModule`. Each wasm function gets a host entry
//! trampoline that reads arguments from and writes results to an array of
//! 16-byte slots, so the host never needs to know how vectors are passed.
//!
//! Executable memory lives as long as the [`CompiledModule`] or any
//! [`Instance`] created from it.

use std::rc::Rc;

use cranelift_codegen::ir::{InstBuilder, UserFuncName, Value};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};
use tracing::{debug, trace};

use crate::config::{EngineConfig, LoweringMode};
use crate::context::jit_module;
use crate::decode::{decode, FuncSig, ModuleInfo};
use crate::error::{CodegenError, TrapCode};
use crate::lower::ScalarLanes;
use crate::native::NativeVectors;
use crate::translate::translate_function;
use crate::types::{slot_flags, trampoline_signature, value_parts, wasm_signature};
use crate::val::{Val, ValType};
use crate::vector::VectorLowering;
use crate::vmctx::{slot_count, Slot, SLOT_SIZE};

/// Host entry point: `(vmctx, values)`.
type Trampoline = unsafe extern "C" fn(*mut u8, *mut Slot);

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compiles modules under one [`EngineConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Validate and compile `bytes`.
    pub fn compile(&self, bytes: &[u8]) -> Result<CompiledModule, CodegenError> {
        let info = decode(bytes, self.config.features())?;
        debug!(
            config = %self.config,
            functions = info.signatures.len(),
            globals = info.globals.len(),
            "compiling module"
        );

        let mut module = jit_module(self.config.tier)?;
        let compiled = match self.config.mode {
            LoweringMode::Native => define_all::<NativeVectors>(&mut module, &info),
            LoweringMode::ScalarLowered => define_all::<ScalarLanes>(&mut module, &info),
        }
        .and_then(|trampolines| {
            module.finalize_definitions()?;
            Ok(trampolines)
        });
        let trampoline_ids = match compiled {
            Ok(ids) => ids,
            Err(e) => {
                // SAFETY: no pointer into this module has been handed out.
                unsafe { module.free_memory() };
                return Err(e);
            }
        };

        let functions = info
            .signatures
            .iter()
            .zip(&trampoline_ids)
            .map(|(sig, id)| {
                let ptr = module.get_finalized_function(*id);
                // SAFETY: the trampoline was defined with
                // `trampoline_signature` under the host's default calling
                // convention, which `extern "C"` matches.
                let trampoline = unsafe { std::mem::transmute::<*const u8, Trampoline>(ptr) };
                FunctionEntry {
                    sig: sig.clone(),
                    trampoline,
                }
            })
            .collect();

        Ok(CompiledModule {
            artifacts: Rc::new(Artifacts {
                code: JitCode(Some(module)),
                config: self.config,
                functions,
                globals: info.globals.iter().map(|g| (g.ty, g.init)).collect(),
                exports: info.exports.clone(),
            }),
        })
    }
}

/// Declare and define every function and its trampoline. Returns the
/// trampoline ids in function order.
fn define_all<L: VectorLowering>(
    module: &mut JITModule,
    info: &ModuleInfo<'_>,
) -> Result<Vec<FuncId>, CodegenError> {
    let pointer = module.target_config().pointer_type();
    let host_cc = module.isa().default_call_conv();

    let mut func_ids = Vec::with_capacity(info.signatures.len());
    for (i, sig) in info.signatures.iter().enumerate() {
        let clif_sig = wasm_signature::<L>(pointer, &sig.params, &sig.results);
        func_ids.push(module.declare_function(&format!("wasm_{i}"), Linkage::Local, &clif_sig)?);
    }
    let tramp_sig = trampoline_signature(host_cc, pointer);
    let mut tramp_ids = Vec::with_capacity(info.signatures.len());
    for i in 0..info.signatures.len() {
        tramp_ids.push(module.declare_function(
            &format!("wasm_{i}_entry"),
            Linkage::Local,
            &tramp_sig,
        )?);
    }

    let mut ctx = module.make_context();
    let mut fb_ctx = FunctionBuilderContext::new();

    for (i, sig) in info.signatures.iter().enumerate() {
        ctx.func.signature = wasm_signature::<L>(pointer, &sig.params, &sig.results);
        ctx.func.name = UserFuncName::user(0, i as u32);
        let callees: Vec<_> = func_ids
            .iter()
            .map(|id| module.declare_func_in_func(*id, &mut ctx.func))
            .collect();
        translate_function::<L>(info, i, &callees, &mut ctx.func, &mut fb_ctx)?;
        define(module, func_ids[i], &mut ctx, L::MODE, i)?;
    }

    for (i, sig) in info.signatures.iter().enumerate() {
        ctx.func.signature = tramp_sig.clone();
        ctx.func.name = UserFuncName::user(1, i as u32);
        let callee = module.declare_func_in_func(func_ids[i], &mut ctx.func);
        build_trampoline::<L>(sig, callee, &mut ctx, &mut fb_ctx);
        define(module, tramp_ids[i], &mut ctx, L::MODE, i)?;
    }

    Ok(tramp_ids)
}

fn define(
    module: &mut JITModule,
    id: FuncId,
    ctx: &mut Context,
    mode: LoweringMode,
    index: usize,
) -> Result<(), CodegenError> {
    let result = module.define_function(id, ctx);
    if let Err(e) = &result {
        debug!(%mode, index, error = %e, "define_function failed");
    }
    module.clear_context(ctx);
    result.map_err(CodegenError::from)
}

/// `values` holds one slot per argument on entry and one slot per result
/// on exit. Vector parts are packed into their slot in order.
fn build_trampoline<L: VectorLowering>(
    sig: &FuncSig,
    callee: cranelift_codegen::ir::FuncRef,
    ctx: &mut Context,
    fb_ctx: &mut FunctionBuilderContext,
) {
    let mut b = FunctionBuilder::new(&mut ctx.func, fb_ctx);
    let entry = b.create_block();
    b.append_block_params_for_function_params(entry);
    b.switch_to_block(entry);
    let vmctx = b.block_params(entry)[0];
    let values = b.block_params(entry)[1];

    let mut args: Vec<Value> = vec![vmctx];
    for (slot, ty) in sig.params.iter().enumerate() {
        let mut offset = (slot * SLOT_SIZE) as i32;
        for part in value_parts::<L>(*ty) {
            args.push(b.ins().load(*part, slot_flags(), values, offset));
            offset += part.bytes() as i32;
        }
    }
    let call = b.ins().call(callee, &args);
    let results = b.inst_results(call).to_vec();

    let mut at = 0;
    for (slot, ty) in sig.results.iter().enumerate() {
        let mut offset = (slot * SLOT_SIZE) as i32;
        for part in value_parts::<L>(*ty) {
            b.ins().store(slot_flags(), results[at], values, offset);
            at += 1;
            offset += part.bytes() as i32;
        }
    }
    b.ins().return_(&[]);
    b.seal_all_blocks();
    b.finalize();
}

// ---------------------------------------------------------------------------
// Compiled module and instances
// ---------------------------------------------------------------------------

/// Owns the executable memory of one compilation.
struct JitCode(Option<JITModule>);

impl Drop for JitCode {
    fn drop(&mut self) {
        if let Some(module) = self.0.take() {
            // SAFETY: every trampoline pointer lives in `Artifacts` next to
            // this value and is dropped with it.
            unsafe { module.free_memory() };
        }
    }
}

struct FunctionEntry {
    sig: FuncSig,
    trampoline: Trampoline,
}

struct Artifacts {
    functions: Vec<FunctionEntry>,
    code: JitCode,
    config: EngineConfig,
    globals: Vec<(ValType, Val)>,
    exports: Vec<(String, u32)>,
}

/// The result of [`Engine::compile`].
#[derive(Clone)]
pub struct CompiledModule {
    artifacts: Rc<Artifacts>,
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("config", &self.artifacts.config)
            .field("functions", &self.artifacts.functions.len())
            .field("globals", &self.artifacts.globals.len())
            .finish()
    }
}

impl CompiledModule {
    pub fn config(&self) -> EngineConfig {
        self.artifacts.config
    }

    pub fn function_count(&self) -> usize {
        self.artifacts.functions.len()
    }

    /// Create an instance with freshly initialized globals.
    pub fn instantiate(&self) -> Result<Instance, CodegenError> {
        let mut vmctx = vec![Slot::ZERO; slot_count(self.artifacts.globals.len())]
            .into_boxed_slice();
        for (i, (_, init)) in self.artifacts.globals.iter().enumerate() {
            vmctx[i + 1] = init.to_slot();
        }
        debug!(
            config = %self.artifacts.config,
            globals = self.artifacts.globals.len(),
            "instantiated module"
        );
        Ok(Instance {
            artifacts: Rc::clone(&self.artifacts),
            vmctx,
        })
    }
}

/// A compiled module with its own globals.
pub struct Instance {
    artifacts: Rc<Artifacts>,
    vmctx: Box<[Slot]>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("config", &self.artifacts.config)
            .field("globals", &self.artifacts.globals.len())
            .finish()
    }
}

impl Instance {
    pub fn config(&self) -> EngineConfig {
        self.artifacts.config
    }

    /// Call function `index` with `args`.
    pub fn call(&mut self, index: u32, args: &[Val]) -> Result<Vec<Val>, CodegenError> {
        let entry = self
            .artifacts
            .functions
            .get(index as usize)
            .ok_or(CodegenError::UnknownFunction(index))?;
        let sig = &entry.sig;
        if args.len() != sig.params.len() {
            return Err(CodegenError::BadCall {
                func: index,
                reason: format!("expected {} arguments, got {}", sig.params.len(), args.len()),
            });
        }
        for (n, (arg, ty)) in args.iter().zip(&sig.params).enumerate() {
            if arg.ty() != *ty {
                return Err(CodegenError::BadCall {
                    func: index,
                    reason: format!("argument {n} should be {ty}, got {}", arg.ty()),
                });
            }
        }

        let mut values =
            vec![Slot::ZERO; sig.params.len().max(sig.results.len()).max(1)];
        for (slot, arg) in values.iter_mut().zip(args) {
            *slot = arg.to_slot();
        }
        self.vmctx[0] = Slot::ZERO;

        trace!(index, ?args, "calling");
        // SAFETY: `values` has a slot for every parameter and result, the
        // context block has a slot for every global, and both outlive the
        // call.
        unsafe {
            (entry.trampoline)(self.vmctx.as_mut_ptr().cast::<u8>(), values.as_mut_ptr());
        }

        let trap = self.vmctx[0].low_u32();
        if trap != 0 {
            self.vmctx[0] = Slot::ZERO;
            let code = TrapCode::from_raw(trap);
            debug!(index, %code, "call trapped");
            return Err(CodegenError::Trap(code));
        }
        Ok(sig
            .results
            .iter()
            .zip(&values)
            .map(|(ty, slot)| Val::from_slot(*ty, slot))
            .collect())
    }

    /// Call the function exported as `name`.
    pub fn call_export(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, CodegenError> {
        let index = self
            .artifacts
            .exports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
            .ok_or_else(|| CodegenError::UnknownExport(name.to_string()))?;
        self.call(index, args)
    }

    /// The raw 16 storage bytes of global `index`, little-endian. Scalar
    /// globals occupy the low bytes.
    pub fn read_global(&self, index: u32) -> Result<[u8; 16], CodegenError> {
        self.vmctx
            .get(index as usize + 1)
            .filter(|_| (index as usize) < self.artifacts.globals.len())
            .map(|slot| slot.0)
            .ok_or(CodegenError::UnknownGlobal(index))
    }

    /// Global `index` as a typed value.
    pub fn global_value(&self, index: u32) -> Result<Val, CodegenError> {
        let (ty, _) = self
            .artifacts
            .globals
            .get(index as usize)
            .ok_or(CodegenError::UnknownGlobal(index))?;
        let slot = Slot(self.read_global(index)?);
        Ok(Val::from_slot(*ty, &slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use wasm_encoder::{
        CodeSection, Function, FunctionSection, Instruction, Module as WasmModule, TypeSection,
        ValType as EncValType,
    };

    fn configs() -> Vec<EngineConfig> {
        let mut out = Vec::new();
        for mode in [LoweringMode::Native, LoweringMode::ScalarLowered] {
            for tier in [Tier::Baseline, Tier::Optimizing] {
                out.push(EngineConfig::new(mode, tier));
            }
        }
        out
    }

    /// `(i32) -> (i32)`: splat as i8x16, add to itself, extract lane 5.
    fn doubled_lane_module() -> Vec<u8> {
        let mut module = WasmModule::new();
        let mut types = TypeSection::new();
        types.ty().function([EncValType::I32], [EncValType::I32]);
        module.section(&types);
        let mut funcs = FunctionSection::new();
        funcs.function(0);
        module.section(&funcs);
        let mut code = CodeSection::new();
        let mut f = Function::new([]);
        f.instruction(&Instruction::LocalGet(0));
        f.instruction(&Instruction::I8x16Splat);
        f.instruction(&Instruction::LocalGet(0));
        f.instruction(&Instruction::I8x16Splat);
        f.instruction(&Instruction::I8x16Add);
        f.instruction(&Instruction::I8x16ExtractLaneS(5));
        f.instruction(&Instruction::End);
        code.function(&f);
        module.section(&code);
        module.finish()
    }

    #[test]
    fn every_config_compiles_and_agrees() {
        let bytes = doubled_lane_module();
        for config in configs() {
            let compiled = Engine::new(config).compile(&bytes).unwrap();
            let mut instance = compiled.instantiate().unwrap();
            // 0x41 + 0x41 = 0x82, sign-extended.
            assert_eq!(
                instance.call(0, &[Val::I32(0x41)]).unwrap(),
                vec![Val::I32(-126)],
                "{config}"
            );
        }
    }

    #[test]
    fn wrong_arguments_are_rejected() {
        let bytes = doubled_lane_module();
        let mut instance = Engine::default()
            .compile(&bytes)
            .unwrap()
            .instantiate()
            .unwrap();
        assert!(matches!(
            instance.call(0, &[]),
            Err(CodegenError::BadCall { func: 0, .. })
        ));
        assert!(matches!(
            instance.call(0, &[Val::f32(1.0)]),
            Err(CodegenError::BadCall { func: 0, .. })
        ));
        assert!(matches!(
            instance.call(3, &[Val::I32(1)]),
            Err(CodegenError::UnknownFunction(3))
        ));
        assert!(matches!(
            instance.read_global(0),
            Err(CodegenError::UnknownGlobal(0))
        ));
    }

    #[test]
    fn instance_outlives_compiled_module() {
        let bytes = doubled_lane_module();
        let mut instance = {
            let compiled = Engine::default().compile(&bytes).unwrap();
            compiled.instantiate().unwrap()
        };
        assert_eq!(instance.call(0, &[Val::I32(1)]).unwrap(), vec![Val::I32(2)]);
    }
}

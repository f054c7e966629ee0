//! Cranelift JIT for WebAssembly modules using 128-bit SIMD.
//!
//! One module can be compiled two ways: with native vector codegen, where
//! every `v128` is a machine vector, or scalar-lowered, where every `v128` is
//! four `i32` words and each lane operation becomes scalar code. Both modes
//! run at a baseline or an optimizing tier. The observable results of the
//! two must be bit-identical.
//!
//! ```no_run
//! use lanewise_codegen::{Engine, EngineConfig, LoweringMode, Tier, Val};
//!
//! # fn run(bytes: &[u8]) -> Result<(), lanewise_codegen::CodegenError> {
//! let engine = Engine::new(EngineConfig::new(LoweringMode::ScalarLowered, Tier::Optimizing));
//! let mut instance = engine.compile(bytes)?.instantiate()?;
//! let results = instance.call(0, &[Val::I32(7)])?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod decode;
pub mod error;
pub mod jit;
pub mod lower;
pub mod native;
mod translate;
pub mod types;
pub mod val;
pub mod vector;
pub mod vmctx;

pub use config::{EngineConfig, LoweringMode, Tier};
pub use error::{CodegenError, TrapCode};
pub use jit::{CompiledModule, Engine, Instance};
pub use val::{Val, ValType};

//! Typed builder for small WebAssembly modules exercising 128-bit SIMD.
//!
//! Bodies are type-checked as they are built, so a malformed instruction
//! sequence fails at construction, never inside an engine.

pub mod body;
pub mod error;
pub mod module;
pub mod ops;
pub mod types;
pub mod v128;

pub use body::FunctionBody;
pub use error::EncodeError;
pub use module::{ConstValue, FuncRef, GlobalRef, Module, ModuleBuilder};
pub use ops::{Instr, ScalarOp, SimdBinop, SimdUnop};
pub use types::{FuncType, LaneShape, Signedness, ValueType};
pub use v128::V128;

//! Module assembly using wasm-encoder.
//!
//! [`ModuleBuilder`] collects globals and function bodies and emits a wasm
//! module with:
//!
//! - **Type section**: one entry per unique function signature.
//! - **Function section**: maps each function to its type index.
//! - **Global section**: every global is mutable with a constant initializer.
//! - **Export section**: the explicitly exported functions.
//! - **Code section**: the encoded bodies.
//!
//! Function and global indices are handed out in creation order starting at
//! zero and are never reused.

use std::collections::HashSet;

use wasm_encoder::{
    CodeSection, ConstExpr, ExportKind, ExportSection, FunctionSection, GlobalSection,
    GlobalType, Module as WasmModule, TypeSection,
};

use crate::body::FunctionBody;
use crate::error::EncodeError;
use crate::ops::Instr;
use crate::types::{FuncType, ValueType};
use crate::v128::V128;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A function of a module under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncRef {
    index: u32,
    ty: FuncType,
}

impl FuncRef {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn func_type(&self) -> &FuncType {
        &self.ty
    }
}

/// A global of a module under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRef {
    index: u32,
    ty: ValueType,
}

impl GlobalRef {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

/// Constant initial value of a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    V128(V128),
}

impl ConstValue {
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => ConstValue::I32(0),
            ValueType::I64 => ConstValue::I64(0),
            ValueType::F32 => ConstValue::F32(0),
            ValueType::F64 => ConstValue::F64(0),
            ValueType::V128 => ConstValue::V128(V128::ZERO),
        }
    }

    pub fn ty(&self) -> ValueType {
        match self {
            ConstValue::I32(_) => ValueType::I32,
            ConstValue::I64(_) => ValueType::I64,
            ConstValue::F32(_) => ValueType::F32,
            ConstValue::F64(_) => ValueType::F64,
            ConstValue::V128(_) => ValueType::V128,
        }
    }

    fn const_expr(&self) -> ConstExpr {
        match *self {
            ConstValue::I32(v) => ConstExpr::i32_const(v),
            ConstValue::I64(v) => ConstExpr::i64_const(v),
            ConstValue::F32(bits) => ConstExpr::f32_const(f32::from_bits(bits)),
            ConstValue::F64(bits) => ConstExpr::f64_const(f64::from_bits(bits)),
            ConstValue::V128(v) => ConstExpr::v128_const(v.to_i128()),
        }
    }
}

// ---------------------------------------------------------------------------
// Built module
// ---------------------------------------------------------------------------

/// An immutable, encoded module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    bytes: Vec<u8>,
    functions: Vec<FuncType>,
    globals: Vec<ConstValue>,
    exports: Vec<(String, u32)>,
}

impl Module {
    /// The wasm binary.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn functions(&self) -> &[FuncType] {
        &self.functions
    }

    pub fn function_type(&self, index: u32) -> Option<&FuncType> {
        self.functions.get(index as usize)
    }

    /// Initial values of the globals, in index order.
    pub fn globals(&self) -> &[ConstValue] {
        &self.globals
    }

    pub fn export_index(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }

    /// Whether any signature or global mentions `v128`.
    pub fn uses_v128(&self) -> bool {
        self.functions.iter().any(FuncType::uses_v128)
            || self.globals.iter().any(|g| g.ty() == ValueType::V128)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Incrementally builds one [`Module`].
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    bodies: Vec<FunctionBody>,
    globals: Vec<ConstValue>,
    exports: Vec<(String, u32)>,
    built: Option<Module>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), EncodeError> {
        match self.built {
            Some(_) => Err(EncodeError::Sealed),
            None => Ok(()),
        }
    }

    /// Add a zero-initialized mutable global.
    pub fn add_global(&mut self, ty: ValueType) -> Result<GlobalRef, EncodeError> {
        self.add_global_init(ConstValue::zero(ty))
    }

    /// Add a mutable global with an explicit initial value.
    pub fn add_global_init(&mut self, init: ConstValue) -> Result<GlobalRef, EncodeError> {
        self.ensure_open()?;
        let index = self.globals.len() as u32;
        self.globals.push(init);
        Ok(GlobalRef {
            index,
            ty: init.ty(),
        })
    }

    /// Create a function with an empty body.
    pub fn new_function(&mut self, ty: FuncType) -> Result<FuncRef, EncodeError> {
        self.ensure_open()?;
        let index = self.bodies.len() as u32;
        self.bodies.push(FunctionBody::new(index, ty.clone()));
        Ok(FuncRef { index, ty })
    }

    /// The body of `func`, for appending instructions.
    pub fn body(&mut self, func: &FuncRef) -> Result<&mut FunctionBody, EncodeError> {
        self.ensure_open()?;
        self.bodies
            .get_mut(func.index as usize)
            .filter(|b| b.func_type() == &func.ty)
            .ok_or(EncodeError::UnknownFunction(func.index))
    }

    pub fn export(&mut self, func: &FuncRef, name: &str) -> Result<(), EncodeError> {
        self.ensure_open()?;
        if self.exports.iter().any(|(n, _)| n == name) {
            return Err(EncodeError::DuplicateExport(name.to_string()));
        }
        if func.index as usize >= self.bodies.len() {
            return Err(EncodeError::UnknownFunction(func.index));
        }
        self.exports.push((name.to_string(), func.index));
        Ok(())
    }

    /// Encode the module. The first successful call seals the builder;
    /// later calls return the same snapshot.
    pub fn build(&mut self) -> Result<Module, EncodeError> {
        if let Some(module) = &self.built {
            return Ok(module.clone());
        }
        self.check_references()?;

        let mut module = WasmModule::new();

        // ---- 1. Type section ---------------------------------------------
        let sigs: Vec<&FuncType> = self.bodies.iter().map(|b| b.func_type()).collect();
        let mut unique: Vec<&FuncType> = Vec::new();
        for sig in &sigs {
            if !unique.contains(sig) {
                unique.push(sig);
            }
        }
        let mut types = TypeSection::new();
        for sig in &unique {
            types.ty().function(
                sig.params().iter().map(|t| t.to_wasm()),
                sig.results().iter().map(|t| t.to_wasm()),
            );
        }
        module.section(&types);

        // ---- 3. Function section -----------------------------------------
        let mut functions = FunctionSection::new();
        for sig in &sigs {
            let type_idx = unique.iter().position(|u| u == sig).unwrap_or(0);
            functions.function(type_idx as u32);
        }
        module.section(&functions);

        // ---- 6. Global section -------------------------------------------
        let mut globals = GlobalSection::new();
        for init in &self.globals {
            globals.global(
                GlobalType {
                    val_type: init.ty().to_wasm(),
                    mutable: true,
                    shared: false,
                },
                &init.const_expr(),
            );
        }
        module.section(&globals);

        // ---- 7. Export section -------------------------------------------
        let mut exports = ExportSection::new();
        for (name, index) in &self.exports {
            exports.export(name, ExportKind::Func, *index);
        }
        module.section(&exports);

        // ---- 10. Code section --------------------------------------------
        let mut code = CodeSection::new();
        for body in &self.bodies {
            code.function(&body.encode()?);
        }
        module.section(&code);

        let built = Module {
            bytes: module.finish(),
            functions: self.bodies.iter().map(|b| b.func_type().clone()).collect(),
            globals: self.globals.clone(),
            exports: self.exports.clone(),
        };
        self.built = Some(built.clone());
        Ok(built)
    }

    /// Calls and global accesses may name handles from another builder: the
    /// index has to exist here and carry the type the body was checked with.
    fn check_references(&self) -> Result<(), EncodeError> {
        for body in &self.bodies {
            for instr in body.instructions() {
                match instr {
                    Instr::Call { index, ty } => {
                        let callee = self.bodies.get(*index as usize);
                        if callee.map_or(true, |c| c.func_type() != ty) {
                            return Err(EncodeError::UnknownFunction(*index));
                        }
                    }
                    Instr::GlobalGet { index, ty } | Instr::GlobalSet { index, ty } => {
                        let global = self.globals.get(*index as usize);
                        if global.map_or(true, |g| g.ty() != *ty) {
                            return Err(EncodeError::UnknownGlobal(*index));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

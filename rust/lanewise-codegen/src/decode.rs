//! Validation and decoding of module bytes with wasmparser.
//!
//! The engine accepts self-contained modules: types, functions, mutable or
//! immutable globals with constant initializers, function exports and code.
//! Imports, memories, tables and start functions are reported as
//! unsupported rather than silently ignored.

use wasmparser::{
    CompositeInnerType, ExternalKind, Operator, Parser, Payload, Validator, WasmFeatures,
};

use crate::error::CodegenError;
use crate::val::{Val, ValType};

/// Parameter and result types of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSig {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// A global's type and initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalInfo {
    pub ty: ValType,
    pub init: Val,
}

/// Declared locals (parameters excluded) and the operator stream of one body.
#[derive(Debug, Clone)]
pub struct FunctionCode<'a> {
    pub locals: Vec<ValType>,
    pub operators: Vec<Operator<'a>>,
}

/// Everything the translator needs from a module.
#[derive(Debug, Default)]
pub struct ModuleInfo<'a> {
    pub signatures: Vec<FuncSig>,
    pub globals: Vec<GlobalInfo>,
    pub exports: Vec<(String, u32)>,
    pub code: Vec<FunctionCode<'a>>,
}

fn val_type(ty: wasmparser::ValType) -> Result<ValType, CodegenError> {
    ValType::try_from(ty).map_err(CodegenError::Unsupported)
}

fn const_value(expr: &wasmparser::ConstExpr<'_>) -> Result<Val, CodegenError> {
    let mut reader = expr.get_operators_reader();
    let value = match reader.read()? {
        Operator::I32Const { value } => Val::I32(value),
        Operator::I64Const { value } => Val::I64(value),
        Operator::F32Const { value } => Val::F32(value.bits()),
        Operator::F64Const { value } => Val::F64(value.bits()),
        Operator::V128Const { value } => Val::V128(*value.bytes()),
        other => {
            return Err(CodegenError::Unsupported(format!(
                "global initializer {other:?}"
            )))
        }
    };
    Ok(value)
}

/// Validate `bytes` under `features`, then decode them.
pub fn decode(bytes: &[u8], features: WasmFeatures) -> Result<ModuleInfo<'_>, CodegenError> {
    Validator::new_with_features(features).validate_all(bytes)?;

    let mut types: Vec<FuncSig> = Vec::new();
    let mut info = ModuleInfo::default();

    for payload in Parser::new(0).parse_all(bytes) {
        match payload? {
            Payload::TypeSection(reader) => {
                for group in reader {
                    for sub in group?.into_types() {
                        match sub.composite_type.inner {
                            CompositeInnerType::Func(func) => {
                                let params = func
                                    .params()
                                    .iter()
                                    .map(|t| val_type(*t))
                                    .collect::<Result<_, _>>()?;
                                let results = func
                                    .results()
                                    .iter()
                                    .map(|t| val_type(*t))
                                    .collect::<Result<_, _>>()?;
                                types.push(FuncSig { params, results });
                            }
                            other => {
                                return Err(CodegenError::Unsupported(format!(
                                    "composite type {other:?}"
                                )))
                            }
                        }
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    let type_index = type_index?;
                    let sig = types.get(type_index as usize).cloned().ok_or_else(|| {
                        CodegenError::Lowering(format!("type index {type_index} out of range"))
                    })?;
                    info.signatures.push(sig);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    info.globals.push(GlobalInfo {
                        ty: val_type(global.ty.content_type)?,
                        init: const_value(&global.init_expr)?,
                    });
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    match export.kind {
                        ExternalKind::Func => {
                            info.exports.push((export.name.to_string(), export.index))
                        }
                        kind => {
                            return Err(CodegenError::Unsupported(format!(
                                "export of kind {kind:?}"
                            )))
                        }
                    }
                }
            }
            Payload::CodeSectionEntry(body) => {
                let mut locals = Vec::new();
                for local in body.get_locals_reader()? {
                    let (count, ty) = local?;
                    let ty = val_type(ty)?;
                    locals.extend(std::iter::repeat(ty).take(count as usize));
                }
                let mut operators = Vec::new();
                let mut reader = body.get_operators_reader()?;
                while !reader.eof() {
                    operators.push(reader.read()?);
                }
                info.code.push(FunctionCode { locals, operators });
            }
            Payload::ImportSection(_) => {
                return Err(CodegenError::Unsupported("imports".to_string()))
            }
            Payload::MemorySection(_) | Payload::DataSection(_) => {
                return Err(CodegenError::Unsupported("linear memory".to_string()))
            }
            Payload::TableSection(_) | Payload::ElementSection(_) => {
                return Err(CodegenError::Unsupported("tables".to_string()))
            }
            Payload::StartSection { .. } => {
                return Err(CodegenError::Unsupported("start function".to_string()))
            }
            _ => {}
        }
    }

    if info.code.len() != info.signatures.len() {
        return Err(CodegenError::Lowering(format!(
            "{} function declarations but {} bodies",
            info.signatures.len(),
            info.code.len()
        )));
    }
    Ok(info)
}

//! Mapping of wasm value types and signatures to Cranelift.

use cranelift_codegen::ir::{types, AbiParam, Endianness, MemFlags, Signature, Type as ClifType};
use cranelift_codegen::isa::CallConv;

use crate::val::ValType;
use crate::vector::VectorLowering;

/// Flags for every access to the context block and the argument buffer.
/// Both are 16-byte aligned and always valid while generated code runs.
pub fn slot_flags() -> MemFlags {
    MemFlags::trusted().with_endianness(Endianness::Little)
}

/// Flags for lane-layout changing `bitcast`s between vector types.
pub fn lane_cast_flags() -> MemFlags {
    MemFlags::new().with_endianness(Endianness::Little)
}

/// Cranelift parts of one wasm value under lowering `L`.
pub fn value_parts<L: VectorLowering>(ty: ValType) -> &'static [ClifType] {
    match ty {
        ValType::I32 => &[types::I32],
        ValType::I64 => &[types::I64],
        ValType::F32 => &[types::F32],
        ValType::F64 => &[types::F64],
        ValType::V128 => L::PARTS,
    }
}

/// Signature of a compiled wasm function: the context pointer, then every
/// parameter's parts; every result's parts.
///
/// The `tail` convention is used because lowered signatures can return more
/// values than the platform convention allows in registers.
pub fn wasm_signature<L: VectorLowering>(
    pointer: ClifType,
    params: &[ValType],
    results: &[ValType],
) -> Signature {
    let mut sig = Signature::new(CallConv::Tail);
    sig.params.push(AbiParam::new(pointer));
    for ty in params {
        sig.params
            .extend(value_parts::<L>(*ty).iter().map(|t| AbiParam::new(*t)));
    }
    for ty in results {
        sig.returns
            .extend(value_parts::<L>(*ty).iter().map(|t| AbiParam::new(*t)));
    }
    sig
}

/// Signature of a host entry trampoline: `(vmctx, values) -> ()`.
pub fn trampoline_signature(call_conv: CallConv, pointer: ClifType) -> Signature {
    let mut sig = Signature::new(call_conv);
    sig.params.push(AbiParam::new(pointer));
    sig.params.push(AbiParam::new(pointer));
    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::ScalarLanes;
    use crate::native::NativeVectors;

    #[test]
    fn vectors_split_only_when_lowered() {
        assert_eq!(value_parts::<NativeVectors>(ValType::V128), &[types::I8X16]);
        assert_eq!(value_parts::<ScalarLanes>(ValType::V128).len(), 4);
        assert_eq!(value_parts::<ScalarLanes>(ValType::F32), &[types::F32]);
    }

    #[test]
    fn lowered_signature_flattens_vectors() {
        let sig = wasm_signature::<ScalarLanes>(
            types::I64,
            &[ValType::V128, ValType::V128],
            &[ValType::V128],
        );
        assert_eq!(sig.call_conv, CallConv::Tail);
        assert_eq!(sig.params.len(), 1 + 8);
        assert_eq!(sig.returns.len(), 4);
        assert!(sig.params[1..].iter().all(|p| p.value_type == types::I32));
    }

    #[test]
    fn native_signature_keeps_vectors_whole() {
        let sig = wasm_signature::<NativeVectors>(types::I64, &[ValType::V128], &[ValType::I32]);
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].value_type, types::I8X16);
        assert_eq!(sig.returns[0].value_type, types::I32);
    }
}

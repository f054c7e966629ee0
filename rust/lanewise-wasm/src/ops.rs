//! Instruction catalog and its wasm opcode encoding.

use strum::{Display, EnumIter};
use wasm_encoder::Instruction;

use crate::types::{FuncType, LaneShape, Signedness, ValueType};
use crate::v128::V128;

/// Element-wise vector unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SimdUnop {
    I8x16Neg,
    I16x8Neg,
    I32x4Neg,
    F32x4Neg,
    F32x4Abs,
    F32x4Sqrt,
    V128Not,
}

impl SimdUnop {
    /// Lane shape the operation interprets its operand as; `None` for
    /// bitwise operations.
    pub fn shape(self) -> Option<LaneShape> {
        match self {
            SimdUnop::I8x16Neg => Some(LaneShape::I8x16),
            SimdUnop::I16x8Neg => Some(LaneShape::I16x8),
            SimdUnop::I32x4Neg => Some(LaneShape::I32x4),
            SimdUnop::F32x4Neg | SimdUnop::F32x4Abs | SimdUnop::F32x4Sqrt => {
                Some(LaneShape::F32x4)
            }
            SimdUnop::V128Not => None,
        }
    }

    fn encode(self) -> Instruction<'static> {
        match self {
            SimdUnop::I8x16Neg => Instruction::I8x16Neg,
            SimdUnop::I16x8Neg => Instruction::I16x8Neg,
            SimdUnop::I32x4Neg => Instruction::I32x4Neg,
            SimdUnop::F32x4Neg => Instruction::F32x4Neg,
            SimdUnop::F32x4Abs => Instruction::F32x4Abs,
            SimdUnop::F32x4Sqrt => Instruction::F32x4Sqrt,
            SimdUnop::V128Not => Instruction::V128Not,
        }
    }
}

/// Element-wise vector binary operations. Comparisons produce all-ones or
/// all-zeros integer lanes of the operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SimdBinop {
    I8x16Add,
    I8x16Sub,
    I8x16Eq,
    I8x16Ne,
    I16x8Add,
    I16x8Sub,
    I16x8Mul,
    I16x8Eq,
    I16x8Ne,
    I32x4Add,
    I32x4Sub,
    I32x4Mul,
    I32x4Eq,
    I32x4Ne,
    F32x4Add,
    F32x4Sub,
    F32x4Mul,
    F32x4Div,
    F32x4Min,
    F32x4Max,
    F32x4Eq,
    F32x4Ne,
    V128And,
    V128Or,
    V128Xor,
}

impl SimdBinop {
    pub fn shape(self) -> Option<LaneShape> {
        use SimdBinop::*;
        match self {
            I8x16Add | I8x16Sub | I8x16Eq | I8x16Ne => Some(LaneShape::I8x16),
            I16x8Add | I16x8Sub | I16x8Mul | I16x8Eq | I16x8Ne => Some(LaneShape::I16x8),
            I32x4Add | I32x4Sub | I32x4Mul | I32x4Eq | I32x4Ne => Some(LaneShape::I32x4),
            F32x4Add | F32x4Sub | F32x4Mul | F32x4Div | F32x4Min | F32x4Max | F32x4Eq
            | F32x4Ne => Some(LaneShape::F32x4),
            V128And | V128Or | V128Xor => None,
        }
    }

    fn encode(self) -> Instruction<'static> {
        use SimdBinop::*;
        match self {
            I8x16Add => Instruction::I8x16Add,
            I8x16Sub => Instruction::I8x16Sub,
            I8x16Eq => Instruction::I8x16Eq,
            I8x16Ne => Instruction::I8x16Ne,
            I16x8Add => Instruction::I16x8Add,
            I16x8Sub => Instruction::I16x8Sub,
            I16x8Mul => Instruction::I16x8Mul,
            I16x8Eq => Instruction::I16x8Eq,
            I16x8Ne => Instruction::I16x8Ne,
            I32x4Add => Instruction::I32x4Add,
            I32x4Sub => Instruction::I32x4Sub,
            I32x4Mul => Instruction::I32x4Mul,
            I32x4Eq => Instruction::I32x4Eq,
            I32x4Ne => Instruction::I32x4Ne,
            F32x4Add => Instruction::F32x4Add,
            F32x4Sub => Instruction::F32x4Sub,
            F32x4Mul => Instruction::F32x4Mul,
            F32x4Div => Instruction::F32x4Div,
            F32x4Min => Instruction::F32x4Min,
            F32x4Max => Instruction::F32x4Max,
            F32x4Eq => Instruction::F32x4Eq,
            F32x4Ne => Instruction::F32x4Ne,
            V128And => Instruction::V128And,
            V128Or => Instruction::V128Or,
            V128Xor => Instruction::V128Xor,
        }
    }
}

/// Scalar `i32` operations used to feed and consume vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ScalarOp {
    I32Add,
    I32Sub,
    I32Mul,
    /// Traps on a zero divisor and on `i32::MIN / -1`.
    I32DivS,
    /// Traps on a zero divisor.
    I32DivU,
    I32And,
    I32Or,
    I32Xor,
    I32Eq,
    I32Ne,
    I32Eqz,
}

impl ScalarOp {
    /// Number of `i32` operands consumed.
    pub fn arity(self) -> usize {
        match self {
            ScalarOp::I32Eqz => 1,
            _ => 2,
        }
    }

    fn encode(self) -> Instruction<'static> {
        match self {
            ScalarOp::I32Add => Instruction::I32Add,
            ScalarOp::I32Sub => Instruction::I32Sub,
            ScalarOp::I32Mul => Instruction::I32Mul,
            ScalarOp::I32DivS => Instruction::I32DivS,
            ScalarOp::I32DivU => Instruction::I32DivU,
            ScalarOp::I32And => Instruction::I32And,
            ScalarOp::I32Or => Instruction::I32Or,
            ScalarOp::I32Xor => Instruction::I32Xor,
            ScalarOp::I32Eq => Instruction::I32Eq,
            ScalarOp::I32Ne => Instruction::I32Ne,
            ScalarOp::I32Eqz => Instruction::I32Eqz,
        }
    }
}

/// One typed instruction of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet {
        index: u32,
        ty: ValueType,
    },
    GlobalSet {
        index: u32,
        ty: ValueType,
    },
    I32Const(i32),
    I64Const(i64),
    /// Raw IEEE-754 bits, so NaN payloads survive encoding.
    F32Const(u32),
    F64Const(u64),
    V128Const(V128),
    Drop,
    /// The callee's signature is kept so the module can check it against
    /// the function actually at `index`.
    Call {
        index: u32,
        ty: FuncType,
    },
    Scalar(ScalarOp),
    Splat(LaneShape),
    ExtractLane {
        shape: LaneShape,
        lane: u8,
        sign: Option<Signedness>,
    },
    ReplaceLane {
        shape: LaneShape,
        lane: u8,
    },
    Unop(SimdUnop),
    Binop(SimdBinop),
    AllTrue(LaneShape),
    AnyTrue(LaneShape),
}

impl Instr {
    /// The wasm instruction this encodes to.
    pub fn encode(&self) -> Instruction<'static> {
        match *self {
            Instr::LocalGet(i) => Instruction::LocalGet(i),
            Instr::LocalSet(i) => Instruction::LocalSet(i),
            Instr::LocalTee(i) => Instruction::LocalTee(i),
            Instr::GlobalGet { index, .. } => Instruction::GlobalGet(index),
            Instr::GlobalSet { index, .. } => Instruction::GlobalSet(index),
            Instr::I32Const(v) => Instruction::I32Const(v),
            Instr::I64Const(v) => Instruction::I64Const(v),
            Instr::F32Const(bits) => Instruction::F32Const(f32::from_bits(bits)),
            Instr::F64Const(bits) => Instruction::F64Const(f64::from_bits(bits)),
            Instr::V128Const(v) => Instruction::V128Const(v.to_i128()),
            Instr::Drop => Instruction::Drop,
            Instr::Call { index, .. } => Instruction::Call(index),
            Instr::Scalar(op) => op.encode(),
            Instr::Splat(shape) => match shape {
                LaneShape::I8x16 => Instruction::I8x16Splat,
                LaneShape::I16x8 => Instruction::I16x8Splat,
                LaneShape::I32x4 => Instruction::I32x4Splat,
                LaneShape::F32x4 => Instruction::F32x4Splat,
            },
            Instr::ExtractLane { shape, lane, sign } => match (shape, sign) {
                (LaneShape::I8x16, Some(Signedness::Unsigned)) => {
                    Instruction::I8x16ExtractLaneU(lane)
                }
                (LaneShape::I8x16, _) => Instruction::I8x16ExtractLaneS(lane),
                (LaneShape::I16x8, Some(Signedness::Unsigned)) => {
                    Instruction::I16x8ExtractLaneU(lane)
                }
                (LaneShape::I16x8, _) => Instruction::I16x8ExtractLaneS(lane),
                (LaneShape::I32x4, _) => Instruction::I32x4ExtractLane(lane),
                (LaneShape::F32x4, _) => Instruction::F32x4ExtractLane(lane),
            },
            Instr::ReplaceLane { shape, lane } => match shape {
                LaneShape::I8x16 => Instruction::I8x16ReplaceLane(lane),
                LaneShape::I16x8 => Instruction::I16x8ReplaceLane(lane),
                LaneShape::I32x4 => Instruction::I32x4ReplaceLane(lane),
                LaneShape::F32x4 => Instruction::F32x4ReplaceLane(lane),
            },
            Instr::Unop(op) => op.encode(),
            Instr::Binop(op) => op.encode(),
            // `FunctionBody::all_true` rejects float shapes.
            Instr::AllTrue(shape) => match shape {
                LaneShape::I8x16 => Instruction::I8x16AllTrue,
                LaneShape::I16x8 => Instruction::I16x8AllTrue,
                LaneShape::I32x4 | LaneShape::F32x4 => Instruction::I32x4AllTrue,
            },
            // Any set bit means some lane is nonzero at every width, so the
            // standardized opcode carries no shape.
            Instr::AnyTrue(_) => Instruction::V128AnyTrue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_shaped_binop_names_its_shape() {
        for op in SimdBinop::iter() {
            let name = op.to_string().to_lowercase();
            match op.shape() {
                Some(shape) => assert!(name.starts_with(&shape.to_string()), "{name}"),
                None => assert!(name.starts_with("v128"), "{name}"),
            }
        }
    }

    #[test]
    fn every_shaped_unop_names_its_shape() {
        for op in SimdUnop::iter() {
            let name = op.to_string().to_lowercase();
            match op.shape() {
                Some(shape) => assert!(name.starts_with(&shape.to_string()), "{name}"),
                None => assert!(name.starts_with("v128"), "{name}"),
            }
        }
    }

    #[test]
    fn any_true_is_shape_independent_on_the_wire() {
        for shape in [LaneShape::I8x16, LaneShape::I16x8, LaneShape::I32x4] {
            assert!(matches!(
                Instr::AnyTrue(shape).encode(),
                Instruction::V128AnyTrue
            ));
        }
    }

    #[test]
    fn scalar_arity() {
        assert_eq!(ScalarOp::I32Eqz.arity(), 1);
        assert_eq!(ScalarOp::I32DivS.arity(), 2);
    }
}

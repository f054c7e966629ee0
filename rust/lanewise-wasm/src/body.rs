//! Function body construction with operand-stack type checking.
//!
//! Every primitive checks the pending operand stack before it appends
//! anything, so a malformed sequence is rejected at the call that broke it
//! and the body is left unchanged. [`FunctionBody::encode`] additionally
//! checks that the final stack matches the declared results.

use wasm_encoder::Function;

use crate::error::EncodeError;
use crate::module::{FuncRef, GlobalRef};
use crate::ops::{Instr, ScalarOp, SimdBinop, SimdUnop};
use crate::types::{FuncType, LaneShape, Signedness, ValueType};
use crate::v128::V128;

use ValueType::{F32, F64, I32, I64, V128 as Vec128};

/// The instruction sequence of one function, plus its declared locals.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    index: u32,
    ty: FuncType,
    locals: Vec<ValueType>,
    instrs: Vec<Instr>,
    stack: Vec<ValueType>,
}

impl FunctionBody {
    pub(crate) fn new(index: u32, ty: FuncType) -> Self {
        Self {
            index,
            ty,
            locals: Vec::new(),
            instrs: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn func_type(&self) -> &FuncType {
        &self.ty
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    /// Types currently on the operand stack, bottom first.
    pub fn stack(&self) -> &[ValueType] {
        &self.stack
    }

    /// Declare a local after the parameters; returns its local index.
    pub fn add_local(&mut self, ty: ValueType) -> u32 {
        self.locals.push(ty);
        (self.ty.params().len() + self.locals.len() - 1) as u32
    }

    fn local_type(&self, index: u32) -> Result<ValueType, EncodeError> {
        let index = index as usize;
        let params = self.ty.params();
        params
            .get(index)
            .or_else(|| self.locals.get(index.wrapping_sub(params.len())))
            .copied()
            .ok_or(EncodeError::UnknownLocal(index as u32))
    }

    /// Check that the top of the stack holds `operands` (pushed in order),
    /// then pop them.
    fn consume(&mut self, op: &'static str, operands: &[ValueType]) -> Result<(), EncodeError> {
        let depth = self.stack.len();
        for (k, &expected) in operands.iter().rev().enumerate() {
            match depth.checked_sub(k + 1).map(|i| self.stack[i]) {
                None => return Err(EncodeError::StackUnderflow { op, expected }),
                Some(found) if found != expected => {
                    return Err(EncodeError::TypeMismatch {
                        op,
                        expected,
                        found,
                    })
                }
                Some(_) => {}
            }
        }
        self.stack.truncate(depth - operands.len());
        Ok(())
    }

    fn emit(
        &mut self,
        op: &'static str,
        operands: &[ValueType],
        instr: Instr,
        results: &[ValueType],
    ) -> Result<&mut Self, EncodeError> {
        self.consume(op, operands)?;
        self.stack.extend_from_slice(results);
        self.instrs.push(instr);
        Ok(self)
    }

    fn check_lane(op: &'static str, shape: LaneShape, lane: u8) -> Result<(), EncodeError> {
        if lane >= shape.lane_count() {
            return Err(EncodeError::LaneOutOfRange { op, shape, lane });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Locals, globals, constants
    // ---------------------------------------------------------------------

    pub fn local_get(&mut self, index: u32) -> Result<&mut Self, EncodeError> {
        let ty = self.local_type(index)?;
        self.emit("local.get", &[], Instr::LocalGet(index), &[ty])
    }

    pub fn local_set(&mut self, index: u32) -> Result<&mut Self, EncodeError> {
        let ty = self.local_type(index)?;
        self.emit("local.set", &[ty], Instr::LocalSet(index), &[])
    }

    pub fn local_tee(&mut self, index: u32) -> Result<&mut Self, EncodeError> {
        let ty = self.local_type(index)?;
        self.emit("local.tee", &[ty], Instr::LocalTee(index), &[ty])
    }

    pub fn global_get(&mut self, global: &GlobalRef) -> Result<&mut Self, EncodeError> {
        self.emit(
            "global.get",
            &[],
            Instr::GlobalGet {
                index: global.index(),
                ty: global.ty(),
            },
            &[global.ty()],
        )
    }

    pub fn global_set(&mut self, global: &GlobalRef) -> Result<&mut Self, EncodeError> {
        self.emit(
            "global.set",
            &[global.ty()],
            Instr::GlobalSet {
                index: global.index(),
                ty: global.ty(),
            },
            &[],
        )
    }

    pub fn i32_const(&mut self, value: i32) -> Result<&mut Self, EncodeError> {
        self.emit("i32.const", &[], Instr::I32Const(value), &[I32])
    }

    pub fn i64_const(&mut self, value: i64) -> Result<&mut Self, EncodeError> {
        self.emit("i64.const", &[], Instr::I64Const(value), &[I64])
    }

    pub fn f32_const(&mut self, value: f32) -> Result<&mut Self, EncodeError> {
        self.emit("f32.const", &[], Instr::F32Const(value.to_bits()), &[F32])
    }

    pub fn f64_const(&mut self, value: f64) -> Result<&mut Self, EncodeError> {
        self.emit("f64.const", &[], Instr::F64Const(value.to_bits()), &[F64])
    }

    pub fn v128_const(&mut self, value: V128) -> Result<&mut Self, EncodeError> {
        self.emit("v128.const", &[], Instr::V128Const(value), &[Vec128])
    }

    pub fn drop_value(&mut self) -> Result<&mut Self, EncodeError> {
        let ty = *self.stack.last().ok_or(EncodeError::StackUnderflow {
            op: "drop",
            expected: I32,
        })?;
        self.emit("drop", &[ty], Instr::Drop, &[])
    }

    // ---------------------------------------------------------------------
    // Calls and scalar arithmetic
    // ---------------------------------------------------------------------

    /// Call another function of the same module, consuming its parameters
    /// and pushing its results.
    pub fn call(&mut self, callee: &FuncRef) -> Result<&mut Self, EncodeError> {
        let ty = callee.func_type().clone();
        let instr = Instr::Call {
            index: callee.index(),
            ty: ty.clone(),
        };
        self.emit("call", ty.params(), instr, ty.results())
    }

    pub fn scalar(&mut self, op: ScalarOp) -> Result<&mut Self, EncodeError> {
        let operands = [I32; 2];
        self.emit("i32 op", &operands[..op.arity()], Instr::Scalar(op), &[I32])
    }

    // ---------------------------------------------------------------------
    // Vector primitives
    // ---------------------------------------------------------------------

    /// Replicate a scalar into every lane of `shape`. Integer shapes take an
    /// `i32` and keep its low lane-width bits.
    pub fn splat(&mut self, shape: LaneShape) -> Result<&mut Self, EncodeError> {
        self.emit(
            "splat",
            &[shape.scalar_type()],
            Instr::Splat(shape),
            &[Vec128],
        )
    }

    /// Read a 32-bit lane (`i32x4` or `f32x4`).
    pub fn extract_lane(&mut self, shape: LaneShape, lane: u8) -> Result<&mut Self, EncodeError> {
        if shape.is_narrow() {
            return Err(EncodeError::UnsupportedShape {
                op: "extract_lane",
                shape,
            });
        }
        self.extract(shape, lane, None)
    }

    /// Read a narrow lane, sign-extended to `i32`.
    pub fn extract_lane_s(&mut self, shape: LaneShape, lane: u8) -> Result<&mut Self, EncodeError> {
        self.extract_narrow("extract_lane_s", shape, lane, Signedness::Signed)
    }

    /// Read a narrow lane, zero-extended to `i32`.
    pub fn extract_lane_u(&mut self, shape: LaneShape, lane: u8) -> Result<&mut Self, EncodeError> {
        self.extract_narrow("extract_lane_u", shape, lane, Signedness::Unsigned)
    }

    fn extract_narrow(
        &mut self,
        op: &'static str,
        shape: LaneShape,
        lane: u8,
        sign: Signedness,
    ) -> Result<&mut Self, EncodeError> {
        if !shape.is_narrow() {
            return Err(EncodeError::UnsupportedShape { op, shape });
        }
        self.extract(shape, lane, Some(sign))
    }

    fn extract(
        &mut self,
        shape: LaneShape,
        lane: u8,
        sign: Option<Signedness>,
    ) -> Result<&mut Self, EncodeError> {
        Self::check_lane("extract_lane", shape, lane)?;
        self.emit(
            "extract_lane",
            &[Vec128],
            Instr::ExtractLane { shape, lane, sign },
            &[shape.scalar_type()],
        )
    }

    /// Overwrite one lane with a scalar: `[v128, scalar] -> [v128]`.
    pub fn replace_lane(&mut self, shape: LaneShape, lane: u8) -> Result<&mut Self, EncodeError> {
        Self::check_lane("replace_lane", shape, lane)?;
        self.emit(
            "replace_lane",
            &[Vec128, shape.scalar_type()],
            Instr::ReplaceLane { shape, lane },
            &[Vec128],
        )
    }

    pub fn unop(&mut self, op: SimdUnop) -> Result<&mut Self, EncodeError> {
        self.emit("vector unop", &[Vec128], Instr::Unop(op), &[Vec128])
    }

    pub fn binop(&mut self, op: SimdBinop) -> Result<&mut Self, EncodeError> {
        self.emit(
            "vector binop",
            &[Vec128, Vec128],
            Instr::Binop(op),
            &[Vec128],
        )
    }

    /// `1` if every lane of `shape` is nonzero, else `0`.
    pub fn all_true(&mut self, shape: LaneShape) -> Result<&mut Self, EncodeError> {
        if shape.is_float() {
            return Err(EncodeError::UnsupportedShape {
                op: "all_true",
                shape,
            });
        }
        self.emit("all_true", &[Vec128], Instr::AllTrue(shape), &[I32])
    }

    /// `1` if any lane of `shape` is nonzero, else `0`.
    pub fn any_true(&mut self, shape: LaneShape) -> Result<&mut Self, EncodeError> {
        if shape.is_float() {
            return Err(EncodeError::UnsupportedShape {
                op: "any_true",
                shape,
            });
        }
        self.emit("any_true", &[Vec128], Instr::AnyTrue(shape), &[I32])
    }

    // ---------------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------------

    /// Encode into a wasm function body. Fails if the pending stack does
    /// not match the declared results.
    pub(crate) fn encode(&self) -> Result<Function, EncodeError> {
        if self.stack != self.ty.results() {
            return Err(EncodeError::ResultMismatch {
                function: self.index,
                expected: self.ty.results().to_vec(),
                found: self.stack.clone(),
            });
        }
        let mut func = Function::new_with_locals_types(self.locals.iter().map(|t| t.to_wasm()));
        for instr in &self.instrs {
            func.instruction(&instr.encode());
        }
        func.instruction(&wasm_encoder::Instruction::End);
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(params: &[ValueType], results: &[ValueType]) -> FunctionBody {
        FunctionBody::new(0, FuncType::new(params.to_vec(), results.to_vec()))
    }

    #[test]
    fn splat_then_reduce_types_to_i32() {
        let mut b = body(&[I32], &[I32]);
        b.local_get(0)
            .unwrap()
            .splat(LaneShape::I32x4)
            .unwrap()
            .all_true(LaneShape::I8x16)
            .unwrap();
        assert_eq!(b.stack(), &[I32]);
        assert!(b.encode().is_ok());
    }

    #[test]
    fn binop_on_short_stack_is_rejected_without_mutation() {
        let mut b = body(&[], &[]);
        b.v128_const(V128::ZERO).unwrap();
        let err = b.binop(SimdBinop::I8x16Eq).unwrap_err();
        assert_eq!(
            err,
            EncodeError::StackUnderflow {
                op: "vector binop",
                expected: Vec128
            }
        );
        assert_eq!(b.stack(), &[Vec128]);
        assert_eq!(b.instructions().len(), 1);
    }

    #[test]
    fn splat_rejects_wrong_scalar() {
        let mut b = body(&[I32], &[]);
        b.local_get(0).unwrap();
        let err = b.splat(LaneShape::F32x4).unwrap_err();
        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                op: "splat",
                expected: F32,
                found: I32
            }
        );
    }

    #[test]
    fn lane_index_is_checked_per_shape() {
        let mut b = body(&[], &[I32]);
        b.v128_const(V128::ZERO).unwrap();
        assert!(matches!(
            b.extract_lane(LaneShape::I32x4, 4),
            Err(EncodeError::LaneOutOfRange { lane: 4, .. })
        ));
        b.extract_lane_s(LaneShape::I8x16, 15).unwrap();
        assert_eq!(b.stack(), &[I32]);
    }

    #[test]
    fn extract_sign_only_on_narrow_shapes() {
        let mut b = body(&[], &[]);
        b.v128_const(V128::ZERO).unwrap();
        assert!(matches!(
            b.extract_lane_s(LaneShape::I32x4, 0),
            Err(EncodeError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            b.extract_lane(LaneShape::I16x8, 0),
            Err(EncodeError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn any_true_shape_is_recorded_but_encodes_one_opcode() {
        let shapes = [LaneShape::I8x16, LaneShape::I16x8, LaneShape::I32x4];
        let mut recorded = Vec::new();
        let mut encoded = Vec::new();
        for shape in shapes {
            let mut b = body(&[], &[I32]);
            b.v128_const(V128::ZERO).unwrap().any_true(shape).unwrap();
            let instr = b.instructions()[1].clone();
            encoded.push(format!("{:?}", instr.encode()));
            recorded.push(instr);
        }
        assert_eq!(recorded, shapes.map(Instr::AnyTrue).to_vec());
        assert!(encoded.iter().all(|e| e == &encoded[0]));
    }

    #[test]
    fn float_reductions_are_rejected() {
        let mut b = body(&[], &[]);
        b.v128_const(V128::ZERO).unwrap();
        assert!(b.all_true(LaneShape::F32x4).is_err());
        assert!(b.any_true(LaneShape::F32x4).is_err());
    }

    #[test]
    fn result_mismatch_detected_at_encode() {
        let mut b = body(&[], &[F32]);
        b.i32_const(1).unwrap();
        assert!(matches!(
            b.encode(),
            Err(EncodeError::ResultMismatch { function: 0, .. })
        ));
    }

    #[test]
    fn locals_are_indexed_after_params() {
        let mut b = body(&[I32, F32], &[]);
        assert_eq!(b.add_local(Vec128), 2);
        b.v128_const(V128::ZERO).unwrap().local_set(2).unwrap();
        assert!(matches!(b.local_get(3), Err(EncodeError::UnknownLocal(3))));
        b.local_get(1).unwrap().drop_value().unwrap();
        assert!(b.stack().is_empty());
    }

    #[test]
    fn replace_lane_takes_vector_then_scalar() {
        let mut b = body(&[], &[Vec128]);
        b.v128_const(V128::ZERO)
            .unwrap()
            .f32_const(2.5)
            .unwrap()
            .replace_lane(LaneShape::F32x4, 3)
            .unwrap();
        assert_eq!(b.stack(), &[Vec128]);
    }

    #[test]
    fn scalar_op_arity() {
        let mut b = body(&[], &[I32]);
        b.i32_const(0).unwrap().scalar(ScalarOp::I32Eqz).unwrap();
        assert!(b.scalar(ScalarOp::I32Add).is_err());
    }
}

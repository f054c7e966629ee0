//! Native vector codegen: one Cranelift vector value per `v128`.
//!
//! Values are kept as `i8x16` between operations and bitcast to the lane
//! layout an operation needs.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, ConstantData, InstBuilder, Type as ClifType, Value};
use cranelift_frontend::FunctionBuilder;

use crate::config::LoweringMode;
use crate::types::{lane_cast_flags, slot_flags};
use crate::vector::{Binop, Shape, Unop, VectorLowering};

pub struct NativeVectors;

fn typed(b: &mut FunctionBuilder, shape: Shape, v: Value) -> Value {
    if shape == Shape::I8x16 {
        v
    } else {
        b.ins().bitcast(shape.vector_type(), lane_cast_flags(), v)
    }
}

fn canonical(b: &mut FunctionBuilder, v: Value) -> Value {
    let ty = b.func.dfg.value_type(v);
    if ty == types::I8X16 {
        v
    } else {
        b.ins().bitcast(types::I8X16, lane_cast_flags(), v)
    }
}

/// Narrow an `i32` operand to the lane type of `shape`.
fn lane_operand(b: &mut FunctionBuilder, shape: Shape, x: Value) -> Value {
    if shape.is_narrow() {
        b.ins().ireduce(shape.lane_type(), x)
    } else {
        x
    }
}

impl VectorLowering for NativeVectors {
    type Repr = Value;

    const MODE: LoweringMode = LoweringMode::Native;
    const PARTS: &'static [ClifType] = &[types::I8X16];

    fn assemble(parts: &[Value]) -> Value {
        parts[0]
    }

    fn parts(v: Value) -> Vec<Value> {
        vec![v]
    }

    fn constant(b: &mut FunctionBuilder, bytes: [u8; 16]) -> Value {
        let handle = b.func.dfg.constants.insert(ConstantData::from(&bytes[..]));
        b.ins().vconst(types::I8X16, handle)
    }

    fn load(b: &mut FunctionBuilder, base: Value, offset: i32) -> Value {
        b.ins().load(types::I8X16, slot_flags(), base, offset)
    }

    fn store(b: &mut FunctionBuilder, v: Value, base: Value, offset: i32) {
        b.ins().store(slot_flags(), v, base, offset);
    }

    fn splat(b: &mut FunctionBuilder, shape: Shape, x: Value) -> Value {
        let lane = lane_operand(b, shape, x);
        let v = b.ins().splat(shape.vector_type(), lane);
        canonical(b, v)
    }

    fn extract_lane(
        b: &mut FunctionBuilder,
        shape: Shape,
        lane: u8,
        signed: bool,
        v: Value,
    ) -> Value {
        let v = typed(b, shape, v);
        let x = b.ins().extractlane(v, lane);
        match (shape.is_narrow(), signed) {
            (true, true) => b.ins().sextend(types::I32, x),
            (true, false) => b.ins().uextend(types::I32, x),
            (false, _) => x,
        }
    }

    fn replace_lane(b: &mut FunctionBuilder, shape: Shape, lane: u8, v: Value, x: Value) -> Value {
        let v = typed(b, shape, v);
        let x = lane_operand(b, shape, x);
        let r = b.ins().insertlane(v, x, lane);
        canonical(b, r)
    }

    fn unary(b: &mut FunctionBuilder, op: Unop, v: Value) -> Value {
        let r = match op {
            Unop::Neg(Shape::F32x4) => {
                let v = typed(b, Shape::F32x4, v);
                b.ins().fneg(v)
            }
            Unop::Neg(shape) => {
                let v = typed(b, shape, v);
                b.ins().ineg(v)
            }
            Unop::FAbs => {
                let v = typed(b, Shape::F32x4, v);
                b.ins().fabs(v)
            }
            Unop::FSqrt => {
                let v = typed(b, Shape::F32x4, v);
                b.ins().sqrt(v)
            }
            Unop::Not => b.ins().bnot(v),
        };
        canonical(b, r)
    }

    fn binary(b: &mut FunctionBuilder, op: Binop, x: Value, y: Value) -> Value {
        let shape = match op {
            Binop::Add(s) | Binop::Sub(s) | Binop::Mul(s) | Binop::Eq(s) | Binop::Ne(s) => s,
            Binop::FDiv | Binop::FMin | Binop::FMax => Shape::F32x4,
            Binop::And | Binop::Or | Binop::Xor => Shape::I8x16,
        };
        let x = typed(b, shape, x);
        let y = typed(b, shape, y);
        let float = shape.is_float();
        let r = match op {
            Binop::Add(_) if float => b.ins().fadd(x, y),
            Binop::Sub(_) if float => b.ins().fsub(x, y),
            Binop::Mul(_) if float => b.ins().fmul(x, y),
            Binop::Eq(_) if float => b.ins().fcmp(FloatCC::Equal, x, y),
            Binop::Ne(_) if float => b.ins().fcmp(FloatCC::NotEqual, x, y),
            Binop::Add(_) => b.ins().iadd(x, y),
            Binop::Sub(_) => b.ins().isub(x, y),
            Binop::Mul(_) => b.ins().imul(x, y),
            Binop::Eq(_) => b.ins().icmp(IntCC::Equal, x, y),
            Binop::Ne(_) => b.ins().icmp(IntCC::NotEqual, x, y),
            Binop::FDiv => b.ins().fdiv(x, y),
            Binop::FMin => b.ins().fmin(x, y),
            Binop::FMax => b.ins().fmax(x, y),
            Binop::And => b.ins().band(x, y),
            Binop::Or => b.ins().bor(x, y),
            Binop::Xor => b.ins().bxor(x, y),
        };
        canonical(b, r)
    }

    fn all_true(b: &mut FunctionBuilder, shape: Shape, v: Value) -> Value {
        let v = typed(b, shape, v);
        let t = b.ins().vall_true(v);
        b.ins().uextend(types::I32, t)
    }

    fn any_true(b: &mut FunctionBuilder, v: Value) -> Value {
        let t = b.ins().vany_true(v);
        b.ins().uextend(types::I32, t)
    }
}

//! The seam between the translator and a vector representation.
//!
//! The translator never touches 128-bit values directly. Every vector
//! operation goes through a [`VectorLowering`], so swapping the
//! implementation swaps the codegen strategy for a whole module:
//! [`crate::native::NativeVectors`] keeps one machine vector per value,
//! [`crate::lower::ScalarLanes`] splits it into four `i32` words.

use cranelift_codegen::ir::{types, Type as ClifType, Value};
use cranelift_frontend::FunctionBuilder;

use crate::config::LoweringMode;

/// Lane interpretation of a 128-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Shape {
    I8x16,
    I16x8,
    I32x4,
    F32x4,
}

impl Shape {
    pub fn lanes(self) -> u8 {
        match self {
            Shape::I8x16 => 16,
            Shape::I16x8 => 8,
            Shape::I32x4 | Shape::F32x4 => 4,
        }
    }

    pub fn lane_bits(self) -> u32 {
        128 / u32::from(self.lanes())
    }

    /// Lanes narrower than an `i32` scalar.
    pub fn is_narrow(self) -> bool {
        matches!(self, Shape::I8x16 | Shape::I16x8)
    }

    pub fn is_float(self) -> bool {
        self == Shape::F32x4
    }

    /// Cranelift vector type with this lane layout.
    pub fn vector_type(self) -> ClifType {
        match self {
            Shape::I8x16 => types::I8X16,
            Shape::I16x8 => types::I16X8,
            Shape::I32x4 => types::I32X4,
            Shape::F32x4 => types::F32X4,
        }
    }

    /// Cranelift type of one lane.
    pub fn lane_type(self) -> ClifType {
        self.vector_type().lane_type()
    }

    /// Mask covering one lane in its low bits.
    pub fn lane_mask(self) -> i64 {
        match self {
            Shape::I8x16 => 0xff,
            Shape::I16x8 => 0xffff,
            Shape::I32x4 | Shape::F32x4 => 0xffff_ffff,
        }
    }
}

/// Vector unary operations. `Neg(F32x4)` is a sign flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unop {
    Neg(Shape),
    FAbs,
    FSqrt,
    Not,
}

/// Vector binary operations. `Add`, `Sub`, `Mul`, `Eq` and `Ne` carry the
/// lane shape; for `F32x4` they are the IEEE operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binop {
    Add(Shape),
    Sub(Shape),
    Mul(Shape),
    Eq(Shape),
    Ne(Shape),
    FDiv,
    FMin,
    FMax,
    And,
    Or,
    Xor,
}

/// A codegen strategy for `v128` values.
///
/// `Repr` is what the translator keeps on its operand stack for one vector.
/// At function boundaries and in locals a vector is flattened into
/// [`Self::PARTS`] SSA values, in order, and rebuilt with
/// [`Self::assemble`].
pub trait VectorLowering {
    type Repr: Copy;

    const MODE: LoweringMode;

    /// Cranelift types of the flattened parts.
    const PARTS: &'static [ClifType];

    fn assemble(parts: &[Value]) -> Self::Repr;

    fn parts(v: Self::Repr) -> Vec<Value>;

    /// Materialize 16 little-endian bytes.
    fn constant(b: &mut FunctionBuilder, bytes: [u8; 16]) -> Self::Repr;

    fn load(b: &mut FunctionBuilder, base: Value, offset: i32) -> Self::Repr;

    fn store(b: &mut FunctionBuilder, v: Self::Repr, base: Value, offset: i32);

    /// `x` is an `i32` for integer shapes and an `f32` for `F32x4`.
    fn splat(b: &mut FunctionBuilder, shape: Shape, x: Value) -> Self::Repr;

    /// Returns an `i32` (sign- or zero-extended for narrow shapes) or an
    /// `f32`.
    fn extract_lane(
        b: &mut FunctionBuilder,
        shape: Shape,
        lane: u8,
        signed: bool,
        v: Self::Repr,
    ) -> Value;

    fn replace_lane(
        b: &mut FunctionBuilder,
        shape: Shape,
        lane: u8,
        v: Self::Repr,
        x: Value,
    ) -> Self::Repr;

    fn unary(b: &mut FunctionBuilder, op: Unop, v: Self::Repr) -> Self::Repr;

    fn binary(b: &mut FunctionBuilder, op: Binop, x: Self::Repr, y: Self::Repr) -> Self::Repr;

    /// `i32` 1 iff every lane at `shape` width is nonzero.
    fn all_true(b: &mut FunctionBuilder, shape: Shape, v: Self::Repr) -> Value;

    /// `i32` 1 iff any bit is set.
    fn any_true(b: &mut FunctionBuilder, v: Self::Repr) -> Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_geometry() {
        for shape in [Shape::I8x16, Shape::I16x8, Shape::I32x4, Shape::F32x4] {
            assert_eq!(u32::from(shape.lanes()) * shape.lane_bits(), 128);
            assert_eq!(shape.vector_type().bits(), 128);
            assert_eq!(shape.lane_type().bits(), shape.lane_bits());
        }
    }

    #[test]
    fn narrow_shapes() {
        assert!(Shape::I8x16.is_narrow());
        assert!(Shape::I16x8.is_narrow());
        assert!(!Shape::I32x4.is_narrow());
        assert!(Shape::F32x4.is_float());
        assert_eq!(Shape::I16x8.lane_mask(), 0xffff);
    }
}

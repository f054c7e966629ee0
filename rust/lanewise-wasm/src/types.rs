//! Value types, function signatures and vector lane shapes.

use strum::{Display, EnumIter};
use wasm_encoder::ValType;

/// A WebAssembly value type understood by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl ValueType {
    /// Map to the `wasm-encoder` value type.
    pub fn to_wasm(self) -> ValType {
        match self {
            ValueType::I32 => ValType::I32,
            ValueType::I64 => ValType::I64,
            ValueType::F32 => ValType::F32,
            ValueType::F64 => ValType::F64,
            ValueType::V128 => ValType::V128,
        }
    }
}

/// Ordered parameter and result types of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    params: Vec<ValueType>,
    results: Vec<ValueType>,
}

impl FuncType {
    pub fn new(
        params: impl IntoIterator<Item = ValueType>,
        results: impl IntoIterator<Item = ValueType>,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn results(&self) -> &[ValueType] {
        &self.results
    }

    /// Whether any parameter or result is a 128-bit vector.
    pub fn uses_v128(&self) -> bool {
        self.params
            .iter()
            .chain(self.results.iter())
            .any(|t| *t == ValueType::V128)
    }
}

impl std::fmt::Display for FuncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |tys: &[ValueType]| {
            tys.iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// How a 128-bit vector is split into lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum LaneShape {
    I8x16,
    I16x8,
    I32x4,
    F32x4,
}

impl LaneShape {
    pub fn lane_count(self) -> u8 {
        match self {
            LaneShape::I8x16 => 16,
            LaneShape::I16x8 => 8,
            LaneShape::I32x4 | LaneShape::F32x4 => 4,
        }
    }

    pub fn lane_bits(self) -> u32 {
        128 / u32::from(self.lane_count())
    }

    /// The scalar type a lane is read as or splatted from.
    pub fn scalar_type(self) -> ValueType {
        match self {
            LaneShape::F32x4 => ValueType::F32,
            _ => ValueType::I32,
        }
    }

    pub fn is_float(self) -> bool {
        self == LaneShape::F32x4
    }

    /// Narrow integer lanes need an explicit sign choice on extraction.
    pub fn is_narrow(self) -> bool {
        matches!(self, LaneShape::I8x16 | LaneShape::I16x8)
    }
}

/// Sign handling when a narrow lane is widened to `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Signedness {
    Signed,
    Unsigned,
}

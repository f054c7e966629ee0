//! Runtime values crossing the host/generated-code boundary.

use serde::{Deserialize, Serialize};

use crate::vmctx::{Slot, SLOT_SIZE};

/// Value type as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl TryFrom<wasmparser::ValType> for ValType {
    type Error = String;

    fn try_from(ty: wasmparser::ValType) -> Result<Self, Self::Error> {
        match ty {
            wasmparser::ValType::I32 => Ok(ValType::I32),
            wasmparser::ValType::I64 => Ok(ValType::I64),
            wasmparser::ValType::F32 => Ok(ValType::F32),
            wasmparser::ValType::F64 => Ok(ValType::F64),
            wasmparser::ValType::V128 => Ok(ValType::V128),
            wasmparser::ValType::Ref(r) => Err(format!("reference type {r:?}")),
        }
    }
}

/// A typed runtime value. Floats are carried as raw bits so comparisons are
/// bit-exact and NaN payloads survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    V128([u8; 16]),
}

impl Val {
    pub fn f32(value: f32) -> Self {
        Val::F32(value.to_bits())
    }

    pub fn f64(value: f64) -> Self {
        Val::F64(value.to_bits())
    }

    pub fn ty(&self) -> ValType {
        match self {
            Val::I32(_) => ValType::I32,
            Val::I64(_) => ValType::I64,
            Val::F32(_) => ValType::F32,
            Val::F64(_) => ValType::F64,
            Val::V128(_) => ValType::V128,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Val::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Val::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Val::F32(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Val::F64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_v128(&self) -> Option<[u8; 16]> {
        match *self {
            Val::V128(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The zero value of `ty`.
    pub fn zero(ty: ValType) -> Self {
        Self::from_slot(ty, &Slot::ZERO)
    }

    /// Little-endian storage form, zero-padded to a full slot.
    pub(crate) fn to_slot(self) -> Slot {
        let mut slot = Slot::ZERO;
        match self {
            Val::I32(v) => slot.0[..4].copy_from_slice(&v.to_le_bytes()),
            Val::I64(v) => slot.0[..8].copy_from_slice(&v.to_le_bytes()),
            Val::F32(bits) => slot.0[..4].copy_from_slice(&bits.to_le_bytes()),
            Val::F64(bits) => slot.0[..8].copy_from_slice(&bits.to_le_bytes()),
            Val::V128(bytes) => slot.0 = bytes,
        }
        slot
    }

    pub(crate) fn from_slot(ty: ValType, slot: &Slot) -> Self {
        let b = &slot.0;
        let mut lo4 = [0u8; 4];
        lo4.copy_from_slice(&b[..4]);
        let mut lo8 = [0u8; 8];
        lo8.copy_from_slice(&b[..8]);
        match ty {
            ValType::I32 => Val::I32(i32::from_le_bytes(lo4)),
            ValType::I64 => Val::I64(i64::from_le_bytes(lo8)),
            ValType::F32 => Val::F32(u32::from_le_bytes(lo4)),
            ValType::F64 => Val::F64(u64::from_le_bytes(lo8)),
            ValType::V128 => {
                let mut bytes = [0u8; SLOT_SIZE];
                bytes.copy_from_slice(b);
                Val::V128(bytes)
            }
        }
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Val::I32(v) => write!(f, "i32:{v} (0x{:08x})", v as u32),
            Val::I64(v) => write!(f, "i64:{v}"),
            Val::F32(bits) => write!(f, "f32:{} (0x{bits:08x})", f32::from_bits(bits)),
            Val::F64(bits) => write!(f, "f64:{} (0x{bits:016x})", f64::from_bits(bits)),
            Val::V128(bytes) => {
                f.write_str("v128:")?;
                for (i, chunk) in bytes.chunks(4).enumerate() {
                    if i > 0 {
                        f.write_str("_")?;
                    }
                    for byte in chunk {
                        write!(f, "{byte:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trip_preserves_bits() {
        let vals = [
            Val::I32(-7),
            Val::I64(i64::MIN),
            Val::f32(-0.0),
            Val::F32(0x7fc0_0001),
            Val::f64(1.5),
            Val::V128([0xab; 16]),
        ];
        for v in vals {
            assert_eq!(Val::from_slot(v.ty(), &v.to_slot()), v);
        }
    }

    #[test]
    fn negative_zero_differs_from_zero() {
        assert_ne!(Val::f32(-0.0), Val::f32(0.0));
    }

    #[test]
    fn zero_of_each_type() {
        assert_eq!(Val::zero(ValType::I32), Val::I32(0));
        assert_eq!(Val::zero(ValType::V128), Val::V128([0; 16]));
    }

    #[test]
    fn display_shows_bits() {
        assert_eq!(Val::I32(-1).to_string(), "i32:-1 (0xffffffff)");
        assert_eq!(Val::f32(1.0).to_string(), "f32:1 (0x3f800000)");
        let mut bytes = [0u8; 16];
        bytes[0] = 1;
        assert_eq!(
            Val::V128(bytes).to_string(),
            "v128:01000000_00000000_00000000_00000000"
        );
    }

    #[test]
    fn accessors_check_type() {
        assert_eq!(Val::I32(3).as_i32(), Some(3));
        assert_eq!(Val::I32(3).as_f32(), None);
        assert_eq!(Val::f32(2.5).as_f32(), Some(2.5));
    }
}

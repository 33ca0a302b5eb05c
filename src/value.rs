use std::fmt::{Display, Formatter};

use crate::signature::ValType;

/// A typed WebAssembly value, as exchanged with the embedder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    /// The zero value of a kind, used to initialise locals.
    pub fn default_of(ty: ValType) -> Value {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0.0),
            ValType::F64 => Value::F64(0.0),
        }
    }

    pub fn as_i32(&self) -> Option<i32> { if let Value::I32(v) = self { Some(*v) } else { None } }
    pub fn as_i64(&self) -> Option<i64> { if let Value::I64(v) = self { Some(*v) } else { None } }
    pub fn as_f32(&self) -> Option<f32> { if let Value::F32(v) = self { Some(*v) } else { None } }
    pub fn as_f64(&self) -> Option<f64> { if let Value::F64(v) = self { Some(*v) } else { None } }
}

impl From<i32> for Value { fn from(v: i32) -> Self { Value::I32(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::I64(v) } }
impl From<f32> for Value { fn from(v: f32) -> Self { Value::F32(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::F64(v) } }

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{v}"),
            Value::F64(v) => write!(f, "f64:{v}"),
        }
    }
}

/// Untagged 64-bit stack slot. Kinds are known statically after validation,
/// so the interpreter never needs a tag at runtime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WasmValue(pub u64);

impl WasmValue {
    #[inline] pub fn from_i32(v: i32) -> Self { Self(v as u32 as u64) }
    #[inline] pub fn as_i32(self) -> i32 { self.0 as u32 as i32 }
    #[inline] pub fn from_u32(v: u32) -> Self { Self(v as u64) }
    #[inline] pub fn as_u32(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_i64(v: i64) -> Self { Self(v as u64) }
    #[inline] pub fn as_i64(self) -> i64 { self.0 as i64 }
    #[inline] pub fn from_u64(v: u64) -> Self { Self(v) }
    #[inline] pub fn as_u64(self) -> u64 { self.0 }
    #[inline] pub fn from_f32_bits(bits: u32) -> Self { Self(bits as u64) }
    #[inline] pub fn as_f32_bits(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_f64_bits(bits: u64) -> Self { Self(bits) }
    #[inline] pub fn as_f64_bits(self) -> u64 { self.0 }
    #[inline] pub fn from_f32(v: f32) -> Self { Self::from_f32_bits(v.to_bits()) }
    #[inline] pub fn as_f32(self) -> f32 { f32::from_bits(self.as_f32_bits()) }
    #[inline] pub fn from_f64(v: f64) -> Self { Self::from_f64_bits(v.to_bits()) }
    #[inline] pub fn as_f64(self) -> f64 { f64::from_bits(self.as_f64_bits()) }

    pub fn to_value(self, ty: ValType) -> Value {
        match ty {
            ValType::I32 => Value::I32(self.as_i32()),
            ValType::I64 => Value::I64(self.as_i64()),
            ValType::F32 => Value::F32(self.as_f32()),
            ValType::F64 => Value::F64(self.as_f64()),
        }
    }
}

impl From<Value> for WasmValue {
    fn from(v: Value) -> Self {
        match v {
            Value::I32(x) => WasmValue::from_i32(x),
            Value::I64(x) => WasmValue::from_i64(x),
            Value::F32(x) => WasmValue::from_f32(x),
            Value::F64(x) => WasmValue::from_f64(x),
        }
    }
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::byte_iter::ByteIter;
use crate::error::*;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
}

impl ValType {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<ValType> {
        match byte {
            0x7f => Some(ValType::I32),
            0x7e => Some(ValType::I64),
            0x7d => Some(ValType::F32),
            0x7c => Some(ValType::F64),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 { self as u8 }

    pub(crate) fn read(it: &mut ByteIter) -> Result<ValType, Error> {
        ValType::from_byte(it.read_u8()?).ok_or(Error::Malformed(INVALID_VALUE_TYPE))
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        })
    }
}

/// A function type: parameter kinds and result kinds.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl Signature {
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self { params: params.to_vec(), results: results.to_vec() }
    }

    pub(crate) fn read(it: &mut ByteIter) -> Result<Signature, Error> {
        const FUNC_FORM: u8 = 0x60;
        if it.read_u8()? != FUNC_FORM { return malformed(INVALID_FUNC_TYPE); }
        let params = read_val_types(it)?;
        let results = read_val_types(it)?;
        Ok(Signature { params, results })
    }
}

fn read_val_types(it: &mut ByteIter) -> Result<Vec<ValType>, Error> {
    let n = it.read_count(1)?;
    (0..n).map(|_| ValType::read(it)).collect()
}

pub(crate) fn list_to_string(types: &[ValType]) -> String {
    let names: Vec<String> = types.iter().map(ValType::to_string).collect();
    format!("[{}]", names.join(" "))
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", list_to_string(&self.params), list_to_string(&self.results))
    }
}

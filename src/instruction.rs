use crate::byte_iter::ByteIter;
use crate::error::*;
use crate::signature::ValType;

/// Type of a structured instruction: empty, a single result, or a type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    Func(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    pub fn new(align: u32, offset: u32) -> Self { Self { align, offset } }
}

/// A decoded instruction. Numeric opcodes carry their raw opcode byte,
/// everything with an immediate gets its own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable(Box<[u32]>, u32),
    Return,
    Call(u32),
    CallIndirect(u32),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(u8, MemArg),
    Store(u8, MemArg),
    MemorySize,
    MemoryGrow,
    I32Const(i32),
    I64Const(i64),
    /// Raw bits, so NaN payloads survive and `Eq` holds.
    F32Const(u32),
    F64Const(u64),
    Numeric(u8),
    /// Saturating float-to-int conversion, `0xfc` prefix with sub-opcode 0..=7.
    TruncSat(u8),
}

#[allow(dead_code)]
pub mod op {
    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0b;
    pub const BR: u8 = 0x0c;
    pub const BR_IF: u8 = 0x0d;
    pub const BR_TABLE: u8 = 0x0e;
    pub const RETURN: u8 = 0x0f;
    pub const CALL: u8 = 0x10;
    pub const CALL_INDIRECT: u8 = 0x11;
    pub const DROP: u8 = 0x1a;
    pub const SELECT: u8 = 0x1b;
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;

    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2a;
    pub const F64_LOAD: u8 = 0x2b;
    pub const I32_LOAD8_S: u8 = 0x2c;
    pub const I32_LOAD8_U: u8 = 0x2d;
    pub const I32_LOAD16_S: u8 = 0x2e;
    pub const I32_LOAD16_U: u8 = 0x2f;
    pub const I64_LOAD8_S: u8 = 0x30;
    pub const I64_LOAD8_U: u8 = 0x31;
    pub const I64_LOAD16_S: u8 = 0x32;
    pub const I64_LOAD16_U: u8 = 0x33;
    pub const I64_LOAD32_S: u8 = 0x34;
    pub const I64_LOAD32_U: u8 = 0x35;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;
    pub const I32_STORE8: u8 = 0x3a;
    pub const I32_STORE16: u8 = 0x3b;
    pub const I64_STORE8: u8 = 0x3c;
    pub const I64_STORE16: u8 = 0x3d;
    pub const I64_STORE32: u8 = 0x3e;
    pub const MEMORY_SIZE: u8 = 0x3f;
    pub const MEMORY_GROW: u8 = 0x40;

    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;

    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_LT_U: u8 = 0x49;
    pub const I32_GT_S: u8 = 0x4a;
    pub const I32_GT_U: u8 = 0x4b;
    pub const I32_LE_S: u8 = 0x4c;
    pub const I32_LE_U: u8 = 0x4d;
    pub const I32_GE_S: u8 = 0x4e;
    pub const I32_GE_U: u8 = 0x4f;
    pub const I64_EQZ: u8 = 0x50;
    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_LT_U: u8 = 0x54;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_GT_U: u8 = 0x56;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_LE_U: u8 = 0x58;
    pub const I64_GE_S: u8 = 0x59;
    pub const I64_GE_U: u8 = 0x5a;
    pub const F32_EQ: u8 = 0x5b;
    pub const F32_NE: u8 = 0x5c;
    pub const F32_LT: u8 = 0x5d;
    pub const F32_GT: u8 = 0x5e;
    pub const F32_LE: u8 = 0x5f;
    pub const F32_GE: u8 = 0x60;
    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;

    pub const I32_CLZ: u8 = 0x67;
    pub const I32_CTZ: u8 = 0x68;
    pub const I32_POPCNT: u8 = 0x69;
    pub const I32_ADD: u8 = 0x6a;
    pub const I32_SUB: u8 = 0x6b;
    pub const I32_MUL: u8 = 0x6c;
    pub const I32_DIV_S: u8 = 0x6d;
    pub const I32_DIV_U: u8 = 0x6e;
    pub const I32_REM_S: u8 = 0x6f;
    pub const I32_REM_U: u8 = 0x70;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;
    pub const I32_SHL: u8 = 0x74;
    pub const I32_SHR_S: u8 = 0x75;
    pub const I32_SHR_U: u8 = 0x76;
    pub const I32_ROTL: u8 = 0x77;
    pub const I32_ROTR: u8 = 0x78;
    pub const I64_CLZ: u8 = 0x79;
    pub const I64_CTZ: u8 = 0x7a;
    pub const I64_POPCNT: u8 = 0x7b;
    pub const I64_ADD: u8 = 0x7c;
    pub const I64_SUB: u8 = 0x7d;
    pub const I64_MUL: u8 = 0x7e;
    pub const I64_DIV_S: u8 = 0x7f;
    pub const I64_DIV_U: u8 = 0x80;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_REM_U: u8 = 0x82;
    pub const I64_AND: u8 = 0x83;
    pub const I64_OR: u8 = 0x84;
    pub const I64_XOR: u8 = 0x85;
    pub const I64_SHL: u8 = 0x86;
    pub const I64_SHR_S: u8 = 0x87;
    pub const I64_SHR_U: u8 = 0x88;
    pub const I64_ROTL: u8 = 0x89;
    pub const I64_ROTR: u8 = 0x8a;

    pub const F32_ABS: u8 = 0x8b;
    pub const F32_NEG: u8 = 0x8c;
    pub const F32_CEIL: u8 = 0x8d;
    pub const F32_FLOOR: u8 = 0x8e;
    pub const F32_TRUNC: u8 = 0x8f;
    pub const F32_NEAREST: u8 = 0x90;
    pub const F32_SQRT: u8 = 0x91;
    pub const F32_ADD: u8 = 0x92;
    pub const F32_SUB: u8 = 0x93;
    pub const F32_MUL: u8 = 0x94;
    pub const F32_DIV: u8 = 0x95;
    pub const F32_MIN: u8 = 0x96;
    pub const F32_MAX: u8 = 0x97;
    pub const F32_COPYSIGN: u8 = 0x98;
    pub const F64_ABS: u8 = 0x99;
    pub const F64_NEG: u8 = 0x9a;
    pub const F64_CEIL: u8 = 0x9b;
    pub const F64_FLOOR: u8 = 0x9c;
    pub const F64_TRUNC: u8 = 0x9d;
    pub const F64_NEAREST: u8 = 0x9e;
    pub const F64_SQRT: u8 = 0x9f;
    pub const F64_ADD: u8 = 0xa0;
    pub const F64_SUB: u8 = 0xa1;
    pub const F64_MUL: u8 = 0xa2;
    pub const F64_DIV: u8 = 0xa3;
    pub const F64_MIN: u8 = 0xa4;
    pub const F64_MAX: u8 = 0xa5;
    pub const F64_COPYSIGN: u8 = 0xa6;

    pub const I32_WRAP_I64: u8 = 0xa7;
    pub const I32_TRUNC_F32_S: u8 = 0xa8;
    pub const I32_TRUNC_F32_U: u8 = 0xa9;
    pub const I32_TRUNC_F64_S: u8 = 0xaa;
    pub const I32_TRUNC_F64_U: u8 = 0xab;
    pub const I64_EXTEND_I32_S: u8 = 0xac;
    pub const I64_EXTEND_I32_U: u8 = 0xad;
    pub const I64_TRUNC_F32_S: u8 = 0xae;
    pub const I64_TRUNC_F32_U: u8 = 0xaf;
    pub const I64_TRUNC_F64_S: u8 = 0xb0;
    pub const I64_TRUNC_F64_U: u8 = 0xb1;
    pub const F32_CONVERT_I32_S: u8 = 0xb2;
    pub const F32_CONVERT_I32_U: u8 = 0xb3;
    pub const F32_CONVERT_I64_S: u8 = 0xb4;
    pub const F32_CONVERT_I64_U: u8 = 0xb5;
    pub const F32_DEMOTE_F64: u8 = 0xb6;
    pub const F64_CONVERT_I32_S: u8 = 0xb7;
    pub const F64_CONVERT_I32_U: u8 = 0xb8;
    pub const F64_CONVERT_I64_S: u8 = 0xb9;
    pub const F64_CONVERT_I64_U: u8 = 0xba;
    pub const F64_PROMOTE_F32: u8 = 0xbb;
    pub const I32_REINTERPRET_F32: u8 = 0xbc;
    pub const I64_REINTERPRET_F64: u8 = 0xbd;
    pub const F32_REINTERPRET_I32: u8 = 0xbe;
    pub const F64_REINTERPRET_I64: u8 = 0xbf;

    pub const I32_EXTEND8_S: u8 = 0xc0;
    pub const I32_EXTEND16_S: u8 = 0xc1;
    pub const I64_EXTEND8_S: u8 = 0xc2;
    pub const I64_EXTEND16_S: u8 = 0xc3;
    pub const I64_EXTEND32_S: u8 = 0xc4;

    pub const PREFIX_FC: u8 = 0xfc;
    // 0xfc sub-opcodes
    pub const I32_TRUNC_SAT_F32_S: u8 = 0;
    pub const I32_TRUNC_SAT_F32_U: u8 = 1;
    pub const I32_TRUNC_SAT_F64_S: u8 = 2;
    pub const I32_TRUNC_SAT_F64_U: u8 = 3;
    pub const I64_TRUNC_SAT_F32_S: u8 = 4;
    pub const I64_TRUNC_SAT_F32_U: u8 = 5;
    pub const I64_TRUNC_SAT_F64_S: u8 = 6;
    pub const I64_TRUNC_SAT_F64_U: u8 = 7;
}

// Upper bound on br_table targets accepted before allocation
const MAX_BR_TABLE_LEN: u32 = 1 << 16;

impl BlockType {
    pub(crate) fn read(it: &mut ByteIter) -> Result<BlockType, Error> {
        const VOID: u8 = 0x40;
        let byte = it.peek_u8()?;
        if byte == VOID {
            it.read_u8()?;
            return Ok(BlockType::Empty);
        }
        if let Some(vt) = ValType::from_byte(byte) {
            it.read_u8()?;
            return Ok(BlockType::Value(vt));
        }
        let n = it.read_s33()?;
        if n < 0 {
            return malformed(INVALID_VALUE_TYPE);
        }
        Ok(BlockType::Func(n as u32))
    }
}

fn read_memarg(it: &mut ByteIter) -> Result<MemArg, Error> {
    let align = it.read_u32()?;
    let offset = it.read_u32()?;
    Ok(MemArg { align, offset })
}

fn zero_flag(it: &mut ByteIter) -> Result<(), Error> {
    if it.read_u8()? != 0 { return malformed(ZERO_FLAG_EXPECTED); }
    Ok(())
}

/// Decodes one instruction.
pub(crate) fn decode_instr(it: &mut ByteIter) -> Result<Instr, Error> {
    use Instr::*;
    let opcode = it.read_u8()?;
    let instr = match opcode {
        op::UNREACHABLE => Unreachable,
        op::NOP => Nop,
        op::BLOCK => Block(BlockType::read(it)?),
        op::LOOP => Loop(BlockType::read(it)?),
        op::IF => If(BlockType::read(it)?),
        op::ELSE => Else,
        op::END => End,
        op::BR => Br(it.read_u32()?),
        op::BR_IF => BrIf(it.read_u32()?),
        op::BR_TABLE => {
            let n = it.read_count(1)?;
            if n > MAX_BR_TABLE_LEN { return malformed(LENGTH_OUT_OF_BOUNDS); }
            let targets = (0..n).map(|_| it.read_u32()).collect::<Result<Vec<_>, _>>()?;
            BrTable(targets.into_boxed_slice(), it.read_u32()?)
        }
        op::RETURN => Return,
        op::CALL => Call(it.read_u32()?),
        op::CALL_INDIRECT => {
            let ty = it.read_u32()?;
            zero_flag(it)?;
            CallIndirect(ty)
        }
        op::DROP => Drop,
        op::SELECT => Select,
        op::LOCAL_GET => LocalGet(it.read_u32()?),
        op::LOCAL_SET => LocalSet(it.read_u32()?),
        op::LOCAL_TEE => LocalTee(it.read_u32()?),
        op::GLOBAL_GET => GlobalGet(it.read_u32()?),
        op::GLOBAL_SET => GlobalSet(it.read_u32()?),
        op::I32_LOAD..=op::I64_LOAD32_U => Load(opcode, read_memarg(it)?),
        op::I32_STORE..=op::I64_STORE32 => Store(opcode, read_memarg(it)?),
        op::MEMORY_SIZE => {
            zero_flag(it)?;
            MemorySize
        }
        op::MEMORY_GROW => {
            zero_flag(it)?;
            MemoryGrow
        }
        op::I32_CONST => I32Const(it.read_i32()?),
        op::I64_CONST => I64Const(it.read_i64()?),
        op::F32_CONST => F32Const(it.read_f32_bits()?),
        op::F64_CONST => F64Const(it.read_f64_bits()?),
        op::I32_EQZ..=op::I64_EXTEND32_S => Numeric(opcode),
        op::PREFIX_FC => {
            let sub = it.read_u32()?;
            if sub > op::I64_TRUNC_SAT_F64_U as u32 { return malformed(UNKNOWN_INSTRUCTION); }
            TruncSat(sub as u8)
        }
        _ => return malformed(UNKNOWN_INSTRUCTION),
    };
    Ok(instr)
}

// Operand/result kinds for the numeric opcodes, grouped by opcode range
const I32_1: &[ValType] = &[ValType::I32];
const I32_2: &[ValType] = &[ValType::I32, ValType::I32];
const I64_1: &[ValType] = &[ValType::I64];
const I64_2: &[ValType] = &[ValType::I64, ValType::I64];
const F32_1: &[ValType] = &[ValType::F32];
const F32_2: &[ValType] = &[ValType::F32, ValType::F32];
const F64_1: &[ValType] = &[ValType::F64];
const F64_2: &[ValType] = &[ValType::F64, ValType::F64];

/// Operand kinds and result kind of a `Numeric` opcode.
pub(crate) fn numeric_signature(opcode: u8) -> Option<(&'static [ValType], ValType)> {
    use ValType::*;
    let sig = match opcode {
        0x45 => (I32_1, I32),
        0x46..=0x4f => (I32_2, I32),
        0x50 => (I64_1, I32),
        0x51..=0x5a => (I64_2, I32),
        0x5b..=0x60 => (F32_2, I32),
        0x61..=0x66 => (F64_2, I32),
        0x67..=0x69 => (I32_1, I32),
        0x6a..=0x78 => (I32_2, I32),
        0x79..=0x7b => (I64_1, I64),
        0x7c..=0x8a => (I64_2, I64),
        0x8b..=0x91 => (F32_1, F32),
        0x92..=0x98 => (F32_2, F32),
        0x99..=0x9f => (F64_1, F64),
        0xa0..=0xa6 => (F64_2, F64),
        0xa7 => (I64_1, I32),
        0xa8 | 0xa9 => (F32_1, I32),
        0xaa | 0xab => (F64_1, I32),
        0xac | 0xad => (I32_1, I64),
        0xae | 0xaf => (F32_1, I64),
        0xb0 | 0xb1 => (F64_1, I64),
        0xb2 | 0xb3 => (I32_1, F32),
        0xb4 | 0xb5 => (I64_1, F32),
        0xb6 => (F64_1, F32),
        0xb7 | 0xb8 => (I32_1, F64),
        0xb9 | 0xba => (I64_1, F64),
        0xbb => (F32_1, F64),
        0xbc => (F32_1, I32),
        0xbd => (F64_1, I64),
        0xbe => (I32_1, F32),
        0xbf => (I64_1, F64),
        0xc0 | 0xc1 => (I32_1, I32),
        0xc2..=0xc4 => (I64_1, I64),
        _ => return None,
    };
    Some(sig)
}

/// Operand and result kind of a saturating truncation sub-opcode.
pub(crate) fn trunc_sat_signature(sub: u8) -> Option<(ValType, ValType)> {
    use ValType::*;
    let sig = match sub {
        0 | 1 => (F32, I32),
        2 | 3 => (F64, I32),
        4 | 5 => (F32, I64),
        6 | 7 => (F64, I64),
        _ => return None,
    };
    Some(sig)
}

/// Value kind and natural access width in bytes of a load or store opcode.
pub(crate) fn memory_access(opcode: u8) -> Option<(ValType, u32)> {
    use ValType::*;
    let access = match opcode {
        op::I32_LOAD | op::I32_STORE => (I32, 4),
        op::I64_LOAD | op::I64_STORE => (I64, 8),
        op::F32_LOAD | op::F32_STORE => (F32, 4),
        op::F64_LOAD | op::F64_STORE => (F64, 8),
        op::I32_LOAD8_S | op::I32_LOAD8_U | op::I32_STORE8 => (I32, 1),
        op::I32_LOAD16_S | op::I32_LOAD16_U | op::I32_STORE16 => (I32, 2),
        op::I64_LOAD8_S | op::I64_LOAD8_U | op::I64_STORE8 => (I64, 1),
        op::I64_LOAD16_S | op::I64_LOAD16_U | op::I64_STORE16 => (I64, 2),
        op::I64_LOAD32_S | op::I64_LOAD32_U | op::I64_STORE32 => (I64, 4),
        _ => return None,
    };
    Some(access)
}

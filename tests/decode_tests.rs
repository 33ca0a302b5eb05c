mod common;

use wasmling::error::*;
use wasmling::*;

fn malformed_reason(bytes: &[u8]) -> &'static str {
    match Module::decode(bytes) {
        Err(Error::Malformed(reason)) => reason,
        other => panic!("expected a malformed module, got {other:?}"),
    }
}

#[test]
fn decoding_is_deterministic() {
    let bytes = common::add_module();
    let a = Module::decode(&bytes).unwrap();
    let b = Module::decode(&bytes).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.imports.len(), 1);
    assert_eq!(a.imports[0].module, "env");
    assert_eq!(a.imports[0].field, "print_int");
    assert_eq!(a.exports[0].name, "add_two_int_32");
    assert_eq!(a.exports[0].index, 1);
    assert_eq!(a.func_type(1), Some(&Signature::new(&[ValType::I32, ValType::I32], &[ValType::I32])));
}

#[test]
fn empty_module() {
    let m = Module::decode(b"\0asm\x01\0\0\0").unwrap();
    assert_eq!(m, Module::default());
}

#[test]
fn preamble() {
    assert_eq!(malformed_reason(b""), UNEXPECTED_END);
    assert_eq!(malformed_reason(b"\0asn\x01\0\0\0"), NO_MAGIC_HEADER);
    assert_eq!(malformed_reason(b"\0asm\x01\0"), UNEXPECTED_END);
    assert_eq!(malformed_reason(b"\0asm\x02\0\0\0"), UNKNOWN_BINARY_VERSION);
}

#[test]
fn section_ordering() {
    // type section twice
    let dup = b"\0asm\x01\0\0\0\x01\x01\x00\x01\x01\x00";
    assert_eq!(malformed_reason(dup), DUPLICATE_SECTION);
    // memory before table
    let swapped = b"\0asm\x01\0\0\0\x05\x01\x00\x04\x01\x00";
    assert_eq!(malformed_reason(swapped), SECTION_OUT_OF_ORDER);
    assert_eq!(malformed_reason(b"\0asm\x01\0\0\0\x0d\x00"), INVALID_SECTION_ID);
}

#[test]
fn section_sizes_are_checked() {
    // section claims more bytes than remain
    assert_eq!(malformed_reason(b"\0asm\x01\0\0\0\x01\x05\x00"), UNEXPECTED_END);
    // type section with a count of zero followed by a stray byte
    assert_eq!(malformed_reason(b"\0asm\x01\0\0\0\x01\x02\x00\x00"), SECTION_SIZE_MISMATCH);
}

#[test]
fn function_without_code() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    b.func(ty, &[], vec![]);
    let mut m = b.into_module();
    let bytes = encode(&m);
    assert!(Module::decode(&bytes).is_ok());

    m.functions.clear();
    let mut no_code = encode(&m);
    // Re-add a function section declaring one function
    no_code.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
    assert_eq!(malformed_reason(&no_code), FUNC_CODE_INCONSISTENT);
}

#[test]
fn data_count_must_match() {
    let mut m = Module::default();
    m.data_count = Some(1);
    assert_eq!(malformed_reason(&encode(&m)), DATA_COUNT_INCONSISTENT);
}

#[test]
fn custom_sections_are_recorded() {
    let mut b = ModuleBuilder::new();
    b.custom("name", &[0xde, 0xad]);
    let m = Module::decode(&b.build()).unwrap();
    assert_eq!(m.custom_sections.len(), 1);
    assert_eq!(m.custom_sections[0].name, "name");
    assert_eq!(m.custom_sections[0].data, vec![0xde, 0xad]);
}

#[test]
fn overlong_leb128_is_rejected() {
    // type section whose count uses six bytes
    let bytes = b"\0asm\x01\0\0\0\x01\x06\x80\x80\x80\x80\x80\x00";
    assert_eq!(malformed_reason(bytes), INT_TOO_LONG);
}

#[test]
fn unknown_opcode_in_body() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    b.func(ty, &[], vec![Instr::Nop]);
    let mut bytes = b.build();
    // The body is `nop end`; turn the nop into an unassigned opcode
    let nop_at = bytes.len() - 2;
    assert_eq!(bytes[nop_at], op::NOP);
    bytes[nop_at] = 0xd7;
    assert_eq!(malformed_reason(&bytes), UNKNOWN_INSTRUCTION);
}

#[test]
fn missing_end_in_body() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    b.func(ty, &[], vec![Instr::Block(BlockType::Empty)]);
    // block without its own end: the function's end closes the block
    assert_eq!(malformed_reason(&b.build()), END_EXPECTED);
}

#[test]
fn too_many_locals() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    b.func(ty, &[], vec![]);
    let mut m = b.into_module();
    m.functions[0].locals = vec![(40_000, ValType::I32), (20_000, ValType::I64)];
    assert_eq!(malformed_reason(&encode(&m)), TOO_MANY_LOCALS);
}

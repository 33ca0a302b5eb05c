//! Binary encoding of a [`Module`], the inverse of [`Module::decode`], plus a
//! small builder for assembling modules in code.

use nohash_hasher::IntMap;

use crate::instruction::{op, BlockType, Instr};
use crate::leb128::{write_leb128, write_sleb128};
use crate::module::*;
use crate::signature::{Signature, ValType};

struct Section {
    id: u8,
    payload: Vec<u8>,
}

impl Section {
    fn new(id: u8) -> Self { Self { id, payload: Vec::new() } }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.id);
        write_u32(out, self.payload.len() as u32);
        out.extend_from_slice(&self.payload);
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32) { write_leb128(out, v as u64) }

fn write_name(out: &mut Vec<u8>, name: &str) {
    write_u32(out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
}

fn write_limits(out: &mut Vec<u8>, limits: &ResizableLimits) {
    match limits.max {
        None => {
            out.push(0);
            write_u32(out, limits.min);
        }
        Some(max) => {
            out.push(1);
            write_u32(out, limits.min);
            write_u32(out, max);
        }
    }
}

fn write_global_type(out: &mut Vec<u8>, ty: &GlobalType) {
    out.push(ty.ty.to_byte());
    out.push(ty.mutable as u8);
}

fn write_block_type(out: &mut Vec<u8>, bt: BlockType) {
    match bt {
        BlockType::Empty => out.push(0x40),
        BlockType::Value(ty) => out.push(ty.to_byte()),
        BlockType::Func(idx) => write_sleb128(out, idx as i64),
    }
}

/// Appends the binary form of one instruction.
pub fn encode_instr(out: &mut Vec<u8>, instr: &Instr) {
    match instr {
        Instr::Unreachable => out.push(op::UNREACHABLE),
        Instr::Nop => out.push(op::NOP),
        Instr::Block(bt) => { out.push(op::BLOCK); write_block_type(out, *bt); }
        Instr::Loop(bt) => { out.push(op::LOOP); write_block_type(out, *bt); }
        Instr::If(bt) => { out.push(op::IF); write_block_type(out, *bt); }
        Instr::Else => out.push(op::ELSE),
        Instr::End => out.push(op::END),
        Instr::Br(depth) => { out.push(op::BR); write_u32(out, *depth); }
        Instr::BrIf(depth) => { out.push(op::BR_IF); write_u32(out, *depth); }
        Instr::BrTable(targets, default) => {
            out.push(op::BR_TABLE);
            write_u32(out, targets.len() as u32);
            for t in targets.iter() {
                write_u32(out, *t);
            }
            write_u32(out, *default);
        }
        Instr::Return => out.push(op::RETURN),
        Instr::Call(idx) => { out.push(op::CALL); write_u32(out, *idx); }
        Instr::CallIndirect(ty) => {
            out.push(op::CALL_INDIRECT);
            write_u32(out, *ty);
            out.push(0x00); // table index
        }
        Instr::Drop => out.push(op::DROP),
        Instr::Select => out.push(op::SELECT),
        Instr::LocalGet(i) => { out.push(op::LOCAL_GET); write_u32(out, *i); }
        Instr::LocalSet(i) => { out.push(op::LOCAL_SET); write_u32(out, *i); }
        Instr::LocalTee(i) => { out.push(op::LOCAL_TEE); write_u32(out, *i); }
        Instr::GlobalGet(i) => { out.push(op::GLOBAL_GET); write_u32(out, *i); }
        Instr::GlobalSet(i) => { out.push(op::GLOBAL_SET); write_u32(out, *i); }
        Instr::Load(opcode, arg) | Instr::Store(opcode, arg) => {
            out.push(*opcode);
            write_u32(out, arg.align);
            write_u32(out, arg.offset);
        }
        Instr::MemorySize => { out.push(op::MEMORY_SIZE); out.push(0x00); }
        Instr::MemoryGrow => { out.push(op::MEMORY_GROW); out.push(0x00); }
        Instr::I32Const(v) => { out.push(op::I32_CONST); write_sleb128(out, *v as i64); }
        Instr::I64Const(v) => { out.push(op::I64_CONST); write_sleb128(out, *v); }
        Instr::F32Const(bits) => { out.push(op::F32_CONST); out.extend_from_slice(&bits.to_le_bytes()); }
        Instr::F64Const(bits) => { out.push(op::F64_CONST); out.extend_from_slice(&bits.to_le_bytes()); }
        Instr::Numeric(opcode) => out.push(*opcode),
        Instr::TruncSat(sub) => { out.push(op::PREFIX_FC); write_u32(out, *sub as u32); }
    }
}

fn write_const_expr(out: &mut Vec<u8>, expr: &[Instr]) {
    for instr in expr {
        encode_instr(out, instr);
    }
    out.push(op::END);
}

fn write_body(out: &mut Vec<u8>, function: &Function) {
    let mut body = Vec::new();
    write_u32(&mut body, function.locals.len() as u32);
    for (n, ty) in &function.locals {
        write_u32(&mut body, *n);
        body.push(ty.to_byte());
    }
    for instr in &function.body {
        encode_instr(&mut body, instr);
    }
    write_u32(out, body.len() as u32);
    out.extend_from_slice(&body);
}

/// Encodes a module in canonical section order. Empty sections are left out
/// and custom sections go last.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut sections = Vec::new();

    if !module.types.is_empty() {
        let mut s = Section::new(1);
        write_u32(&mut s.payload, module.types.len() as u32);
        for sig in &module.types {
            s.payload.push(0x60);
            write_u32(&mut s.payload, sig.params.len() as u32);
            s.payload.extend(sig.params.iter().map(|t| t.to_byte()));
            write_u32(&mut s.payload, sig.results.len() as u32);
            s.payload.extend(sig.results.iter().map(|t| t.to_byte()));
        }
        sections.push(s);
    }
    if !module.imports.is_empty() {
        let mut s = Section::new(2);
        write_u32(&mut s.payload, module.imports.len() as u32);
        for import in &module.imports {
            write_name(&mut s.payload, &import.module);
            write_name(&mut s.payload, &import.field);
            s.payload.push(import.desc.kind() as u8);
            match &import.desc {
                ImportDesc::Func(ty) => write_u32(&mut s.payload, *ty),
                ImportDesc::Table(limits) => {
                    s.payload.push(0x70);
                    write_limits(&mut s.payload, limits);
                }
                ImportDesc::Memory(limits) => write_limits(&mut s.payload, limits),
                ImportDesc::Global(ty) => write_global_type(&mut s.payload, ty),
            }
        }
        sections.push(s);
    }
    if !module.functions.is_empty() {
        let mut s = Section::new(3);
        write_u32(&mut s.payload, module.functions.len() as u32);
        for f in &module.functions {
            write_u32(&mut s.payload, f.type_idx);
        }
        sections.push(s);
    }
    if !module.tables.is_empty() {
        let mut s = Section::new(4);
        write_u32(&mut s.payload, module.tables.len() as u32);
        for limits in &module.tables {
            s.payload.push(0x70);
            write_limits(&mut s.payload, limits);
        }
        sections.push(s);
    }
    if !module.memories.is_empty() {
        let mut s = Section::new(5);
        write_u32(&mut s.payload, module.memories.len() as u32);
        for limits in &module.memories {
            write_limits(&mut s.payload, limits);
        }
        sections.push(s);
    }
    if !module.globals.is_empty() {
        let mut s = Section::new(6);
        write_u32(&mut s.payload, module.globals.len() as u32);
        for global in &module.globals {
            write_global_type(&mut s.payload, &global.ty);
            write_const_expr(&mut s.payload, &global.init);
        }
        sections.push(s);
    }
    if !module.exports.is_empty() {
        let mut s = Section::new(7);
        write_u32(&mut s.payload, module.exports.len() as u32);
        for export in &module.exports {
            write_name(&mut s.payload, &export.name);
            s.payload.push(export.kind as u8);
            write_u32(&mut s.payload, export.index);
        }
        sections.push(s);
    }
    if let Some(start) = module.start {
        let mut s = Section::new(8);
        write_u32(&mut s.payload, start);
        sections.push(s);
    }
    if !module.elements.is_empty() {
        let mut s = Section::new(9);
        write_u32(&mut s.payload, module.elements.len() as u32);
        for segment in &module.elements {
            write_u32(&mut s.payload, 0);
            write_const_expr(&mut s.payload, &segment.offset);
            write_u32(&mut s.payload, segment.init.len() as u32);
            for idx in &segment.init {
                write_u32(&mut s.payload, *idx);
            }
        }
        sections.push(s);
    }
    if let Some(count) = module.data_count {
        let mut s = Section::new(12);
        write_u32(&mut s.payload, count);
        sections.push(s);
    }
    if !module.functions.is_empty() {
        let mut s = Section::new(10);
        write_u32(&mut s.payload, module.functions.len() as u32);
        for f in &module.functions {
            write_body(&mut s.payload, f);
        }
        sections.push(s);
    }
    if !module.data.is_empty() {
        let mut s = Section::new(11);
        write_u32(&mut s.payload, module.data.len() as u32);
        for segment in &module.data {
            write_u32(&mut s.payload, 0);
            write_const_expr(&mut s.payload, &segment.offset);
            write_u32(&mut s.payload, segment.init.len() as u32);
            s.payload.extend_from_slice(&segment.init);
        }
        sections.push(s);
    }
    for custom in &module.custom_sections {
        let mut s = Section::new(0);
        write_name(&mut s.payload, &custom.name);
        s.payload.extend_from_slice(&custom.data);
        sections.push(s);
    }

    let mut out = Vec::with_capacity(8 + sections.iter().map(|s| s.payload.len() + 6).sum::<usize>());
    out.extend_from_slice(&MAGIC_HEADER);
    out.extend_from_slice(&VERSION.to_le_bytes());
    for section in &sections {
        section.encode_into(&mut out);
    }
    out
}

/// Assembles a [`Module`] piece by piece.
///
/// Function and global indices returned by the builder include imports, so
/// declare every import before the first local function or global.
///
/// ```
/// use wasmling::{ModuleBuilder, Instr, ValType, op};
///
/// let mut b = ModuleBuilder::new();
/// let ty = b.ty(&[ValType::I32, ValType::I32], &[ValType::I32]);
/// let add = b.func(ty, &[], vec![
///     Instr::LocalGet(0),
///     Instr::LocalGet(1),
///     Instr::Numeric(op::I32_ADD),
/// ]);
/// b.export_func("add", add);
/// let bytes = b.build();
/// assert_eq!(&bytes[..4], b"\0asm");
/// ```
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self { Self::default() }

    /// Index of the function type `params -> results`, added if not yet present.
    pub fn ty(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        let sig = Signature::new(params, results);
        match self.module.types.iter().position(|t| *t == sig) {
            Some(idx) => idx as u32,
            None => {
                self.module.types.push(sig);
                (self.module.types.len() - 1) as u32
            }
        }
    }

    fn import(&mut self, module: &str, field: &str, desc: ImportDesc) {
        self.module.imports.push(Import { module: module.to_string(), field: field.to_string(), desc });
    }

    pub fn import_func(&mut self, module: &str, field: &str, ty: u32) -> u32 {
        self.import(module, field, ImportDesc::Func(ty));
        (self.module.num_imported_funcs() - 1) as u32
    }

    pub fn import_memory(&mut self, module: &str, field: &str, min: u32, max: Option<u32>) {
        self.import(module, field, ImportDesc::Memory(ResizableLimits { min, max }));
    }

    pub fn import_global(&mut self, module: &str, field: &str, ty: ValType, mutable: bool) -> u32 {
        self.import(module, field, ImportDesc::Global(GlobalType { ty, mutable }));
        (self.module.num_imported_globals() - 1) as u32
    }

    /// Adds a function. `locals` excludes the parameters; the final `End` is
    /// appended to `body`, as is the branch side table.
    pub fn func(&mut self, ty: u32, locals: &[ValType], body: Vec<Instr>) -> u32 {
        let mut groups: Vec<(u32, ValType)> = Vec::new();
        for ty in locals {
            match groups.last_mut() {
                Some((n, last)) if last == ty => *n += 1,
                _ => groups.push((1, *ty)),
            }
        }

        let mut function = Function { type_idx: ty, locals: groups, ..Default::default() };
        let mut block_ends = IntMap::default();
        let mut else_at = IntMap::default();
        let mut open = Vec::new();
        for (pos, instr) in body.iter().enumerate() {
            let pos = pos as u32;
            match instr {
                Instr::Block(_) | Instr::Loop(_) | Instr::If(_) => open.push(pos),
                Instr::Else => {
                    if let Some(at) = open.last() { else_at.insert(*at, pos); }
                }
                Instr::End => {
                    if let Some(at) = open.pop() { block_ends.insert(at, pos); }
                }
                _ => {}
            }
        }
        function.body = body;
        function.body.push(Instr::End);
        function.block_ends = block_ends;
        function.else_at = else_at;

        self.module.functions.push(function);
        (self.module.num_imported_funcs() + self.module.functions.len() - 1) as u32
    }

    pub fn memory(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.module.memories.push(ResizableLimits { min, max });
        self
    }

    pub fn table(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.module.tables.push(ResizableLimits { min, max });
        self
    }

    pub fn global(&mut self, ty: ValType, mutable: bool, init: Instr) -> u32 {
        self.module.globals.push(GlobalDef { ty: GlobalType { ty, mutable }, init: vec![init] });
        (self.module.num_imported_globals() + self.module.globals.len() - 1) as u32
    }

    pub fn export(&mut self, name: &str, kind: ExternKind, index: u32) -> &mut Self {
        self.module.exports.push(Export { name: name.to_string(), kind, index });
        self
    }

    pub fn export_func(&mut self, name: &str, index: u32) -> &mut Self {
        self.export(name, ExternKind::Func, index)
    }

    pub fn start(&mut self, func: u32) -> &mut Self {
        self.module.start = Some(func);
        self
    }

    /// Active data segment for memory 0 at a constant offset.
    pub fn data(&mut self, offset: u32, bytes: &[u8]) -> &mut Self {
        self.module.data.push(DataSegment {
            offset: vec![Instr::I32Const(offset as i32)],
            init: bytes.to_vec(),
        });
        self
    }

    /// Active element segment for table 0 at a constant offset.
    pub fn element(&mut self, offset: u32, funcs: &[u32]) -> &mut Self {
        self.module.elements.push(ElementSegment {
            offset: vec![Instr::I32Const(offset as i32)],
            init: funcs.to_vec(),
        });
        self
    }

    pub fn custom(&mut self, name: &str, data: &[u8]) -> &mut Self {
        self.module.custom_sections.push(CustomSection { name: name.to_string(), data: data.to_vec() });
        self
    }

    pub fn module(&self) -> &Module { &self.module }

    pub fn into_module(self) -> Module { self.module }

    pub fn build(&self) -> Vec<u8> { encode(&self.module) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode() {
        let mut b = ModuleBuilder::new();
        let unary = b.ty(&[ValType::I32], &[ValType::I32]);
        assert_eq!(b.import_func("env", "print", unary), 0);
        let g = b.global(ValType::I64, true, Instr::I64Const(-7));
        let f = b.func(unary, &[ValType::I32, ValType::I32, ValType::F64], vec![
            Instr::LocalGet(0),
            Instr::If(BlockType::Value(ValType::I32)),
            Instr::I32Const(1),
            Instr::Else,
            Instr::I32Const(-1),
            Instr::End,
        ]);
        b.memory(1, Some(2)).table(1, None).element(0, &[f]).data(16, b"hi");
        b.export_func("f", f).export("g", ExternKind::Global, g).custom("note", &[1, 2, 3]);

        let decoded = Module::decode(&b.build()).unwrap();
        assert_eq!(&decoded, b.module());
        assert_eq!(f, 1);
        assert_eq!(decoded.functions[0].locals, vec![(2, ValType::I32), (1, ValType::F64)]);
        assert_eq!(decoded.functions[0].else_at.get(&1), Some(&3));
        assert_eq!(decoded.functions[0].block_ends.get(&1), Some(&5));
    }

    #[test]
    fn types_are_deduplicated() {
        let mut b = ModuleBuilder::new();
        let a = b.ty(&[ValType::I32], &[]);
        let c = b.ty(&[], &[ValType::F32]);
        assert_eq!(b.ty(&[ValType::I32], &[]), a);
        assert_ne!(a, c);
        assert_eq!(b.module().types.len(), 2);
    }

    #[test]
    fn data_count_precedes_code() {
        let mut m = Module::default();
        m.data_count = Some(0);
        m.types.push(Signature::new(&[], &[]));
        m.functions.push(Function { type_idx: 0, body: vec![Instr::End], ..Default::default() });
        let bytes = encode(&m);
        let ids: Vec<u8> = {
            let mut ids = Vec::new();
            let mut pc = 8;
            while pc < bytes.len() {
                ids.push(bytes[pc]);
                let size = bytes[pc + 1] as usize;
                pc += 2 + size;
            }
            ids
        };
        assert_eq!(ids, vec![1, 3, 12, 10]);
        assert_eq!(Module::decode(&bytes).unwrap(), m);
    }
}

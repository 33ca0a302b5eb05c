use log::{debug, warn};
use nohash_hasher::IntMap;

use crate::byte_iter::*;
use crate::error::*;
use crate::instruction::{decode_instr, Instr};
use crate::signature::*;

// ---------------- Import/Export related ----------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternKind {
    Func = 0,
    Table = 1,
    Memory = 2,
    Global = 3,
}

impl ExternKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ExternKind::Func),
            1 => Some(ExternKind::Table),
            2 => Some(ExternKind::Memory),
            3 => Some(ExternKind::Global),
            _ => None,
        }
    }
}

/// Page (or element) counts of a memory or table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizableLimits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func(u32),
    Table(ResizableLimits),
    Memory(ResizableLimits),
    Global(GlobalType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternKind {
        match self {
            ImportDesc::Func(_) => ExternKind::Func,
            ImportDesc::Table(_) => ExternKind::Table,
            ImportDesc::Memory(_) => ExternKind::Memory,
            ImportDesc::Global(_) => ExternKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

// ---------------- Structures ----------------

/// A locally defined function. `body` always ends with the function's own `End`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Function {
    pub type_idx: u32,
    /// Declared local groups as `(count, type)`, parameters excluded.
    pub locals: Vec<(u32, ValType)>,
    pub body: Vec<Instr>,
    /// Position of each `block`/`loop`/`if` mapped to the position of its `end`.
    pub block_ends: IntMap<u32, u32>,
    /// Position of each `if` that has an `else`, mapped to the `else` position.
    pub else_at: IntMap<u32, u32>,
}

impl Function {
    pub fn num_locals(&self) -> usize {
        self.locals.iter().map(|(n, _)| *n as usize).sum()
    }

    pub fn local_types(&self) -> impl Iterator<Item = ValType> + '_ {
        self.locals.iter().flat_map(|(n, ty)| std::iter::repeat(*ty).take(*n as usize))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDef {
    pub ty: GlobalType,
    /// Constant initializer, without its terminating `End`.
    pub init: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub offset: Vec<Instr>,
    pub init: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: Vec<Instr>,
    pub init: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

// ---------------- Module Structure ----------------

/// The decoded form of a binary module. Index spaces for functions and
/// globals start with the imported items, followed by the local ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<Signature>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<ResizableLimits>,
    pub memories: Vec<ResizableLimits>,
    pub globals: Vec<GlobalDef>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub data_count: Option<u32>,
    pub custom_sections: Vec<CustomSection>,
}

pub(crate) const MAGIC_HEADER: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
pub(crate) const VERSION: u32 = 1;

// Canonical position of each section id; the data count section sits between element and code
fn section_rank(id: u8) -> Option<u8> {
    match id {
        1..=9 => Some(id),
        12 => Some(10),
        10 => Some(11),
        11 => Some(12),
        _ => None,
    }
}

impl Module {
    pub const MAX_LOCALS: u64 = 50000;

    /// Decodes a binary module. Performs no validation beyond what the binary
    /// format itself requires.
    pub fn decode(bytes: &[u8]) -> Result<Module, Error> {
        if bytes.len() < 4 { return malformed(UNEXPECTED_END); }
        if bytes[0..4] != MAGIC_HEADER { return malformed(NO_MAGIC_HEADER); }
        if bytes.len() < 8 { return malformed(UNEXPECTED_END); }
        if u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) != VERSION {
            return malformed(UNKNOWN_BINARY_VERSION);
        }

        let mut m = Module::default();
        let mut it = ByteIter::new(bytes, 8);
        let mut last_rank = 0;
        let mut has_code = false;

        while !it.empty() {
            let id = it.read_u8()?;
            let size = it.read_u32()? as usize;
            if !it.has_n_left(size) { return malformed(UNEXPECTED_END); }
            let start = it.cur();
            let mut section = ByteIter::new(&bytes[..start + size], start);

            if id == 0 {
                m.parse_custom_section(&mut section)?;
            } else {
                let rank = section_rank(id).ok_or(Error::Malformed(INVALID_SECTION_ID))?;
                if rank == last_rank { return malformed(DUPLICATE_SECTION); }
                if rank < last_rank { return malformed(SECTION_OUT_OF_ORDER); }
                last_rank = rank;
                debug!("decoding section {id} ({size} bytes)");

                match id {
                    1 => m.parse_type_section(&mut section)?,
                    2 => m.parse_import_section(&mut section)?,
                    3 => m.parse_function_section(&mut section)?,
                    4 => m.parse_table_section(&mut section)?,
                    5 => m.parse_memory_section(&mut section)?,
                    6 => m.parse_global_section(&mut section)?,
                    7 => m.parse_export_section(&mut section)?,
                    8 => m.start = Some(section.read_u32()?),
                    9 => m.parse_element_section(&mut section)?,
                    12 => m.data_count = Some(section.read_u32()?),
                    10 => {
                        m.parse_code_section(&mut section)?;
                        has_code = true;
                    }
                    _ => m.parse_data_section(&mut section)?,
                }
                if !section.empty() { return malformed(SECTION_SIZE_MISMATCH); }
            }
            it.idx = start + size;
        }

        if !has_code && !m.functions.is_empty() { return malformed(FUNC_CODE_INCONSISTENT); }
        if let Some(n) = m.data_count {
            if n as usize != m.data.len() { return malformed(DATA_COUNT_INCONSISTENT); }
        }
        debug!(
            "decoded module: {} types, {} imports, {} functions, {} exports",
            m.types.len(), m.imports.len(), m.functions.len(), m.exports.len()
        );
        Ok(m)
    }

    fn parse_custom_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let name = it.read_name()?;
        let len = it.bytes.len() - it.cur();
        let data = it.read_bytes(len)?.to_vec();
        warn!("skipping custom section `{}` ({} bytes)", name, data.len());
        self.custom_sections.push(CustomSection { name, data });
        Ok(())
    }

    fn parse_type_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_types = it.read_count(3)?;
        self.types.reserve_exact(n_types as usize);
        for _ in 0..n_types {
            self.types.push(Signature::read(it)?);
        }
        Ok(())
    }

    fn parse_import_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_imports = it.read_count(4)?;
        for _ in 0..n_imports {
            let module = it.read_name()?;
            let field = it.read_name()?;
            let kind = ExternKind::from_byte(it.read_u8()?).ok_or(Error::Malformed(MALFORMED_IMPORT_KIND))?;
            let desc = match kind {
                ExternKind::Func => ImportDesc::Func(it.read_u32()?),
                ExternKind::Table => ImportDesc::Table(get_table_type(it)?),
                ExternKind::Memory => ImportDesc::Memory(get_limits(it)?),
                ExternKind::Global => ImportDesc::Global(get_global_type(it)?),
            };
            self.imports.push(Import { module, field, desc });
        }
        Ok(())
    }

    fn parse_function_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_functions = it.read_count(1)?;
        self.functions.reserve(n_functions as usize);
        for _ in 0..n_functions {
            let type_idx = it.read_u32()?;
            self.functions.push(Function { type_idx, ..Default::default() });
        }
        Ok(())
    }

    fn parse_table_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_tables = it.read_count(2)?;
        for _ in 0..n_tables {
            self.tables.push(get_table_type(it)?);
        }
        Ok(())
    }

    fn parse_memory_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_memories = it.read_count(2)?;
        for _ in 0..n_memories {
            self.memories.push(get_limits(it)?);
        }
        Ok(())
    }

    fn parse_global_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_globals = it.read_count(3)?;
        for _ in 0..n_globals {
            let ty = get_global_type(it)?;
            let init = read_const_expr(it)?;
            self.globals.push(GlobalDef { ty, init });
        }
        Ok(())
    }

    fn parse_export_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_exports = it.read_count(3)?;
        for _ in 0..n_exports {
            let name = it.read_name()?;
            let kind = ExternKind::from_byte(it.read_u8()?).ok_or(Error::Malformed(MALFORMED_EXPORT_KIND))?;
            let index = it.read_u32()?;
            self.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    fn parse_element_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_segments = it.read_count(4)?;
        for _ in 0..n_segments {
            if it.read_u32()? != 0 { return malformed(INVALID_ELEM_SEG_FLAG); }
            let offset = read_const_expr(it)?;
            let n = it.read_count(1)?;
            let init = (0..n).map(|_| it.read_u32()).collect::<Result<Vec<_>, _>>()?;
            self.elements.push(ElementSegment { offset, init });
        }
        Ok(())
    }

    fn parse_code_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_functions = it.read_count(2)?;
        if n_functions as usize != self.functions.len() { return malformed(FUNC_CODE_INCONSISTENT); }

        let bytes = it.bytes;
        for function in self.functions.iter_mut() {
            let size = it.read_u32()? as usize;
            if !it.has_n_left(size) { return malformed(UNEXPECTED_END); }
            let start = it.cur();
            let mut body = ByteIter::new(&bytes[..start + size], start);

            let n_local_decls = body.read_count(2)?;
            let mut total: u64 = 0;
            for _ in 0..n_local_decls {
                let n = body.read_u32()?;
                total += n as u64;
                if total > Module::MAX_LOCALS { return malformed(TOO_MANY_LOCALS); }
                let ty = ValType::read(&mut body)?;
                function.locals.push((n, ty));
            }
            decode_body(&mut body, function)?;
            it.idx = start + size;
        }
        Ok(())
    }

    fn parse_data_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        let n_segments = it.read_count(3)?;
        for _ in 0..n_segments {
            if it.read_u32()? != 0 { return malformed(INVALID_DATA_SEG_FLAG); }
            let offset = read_const_expr(it)?;
            let init = it.read_vec_bytes()?.to_vec();
            self.data.push(DataSegment { offset, init });
        }
        Ok(())
    }

    // ---------------- Index space helpers ----------------

    pub fn num_imported_funcs(&self) -> usize {
        self.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Func(_))).count()
    }

    pub fn num_imported_globals(&self) -> usize {
        self.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Global(_))).count()
    }

    /// Type index of every function in the function index space.
    pub fn func_type_indices(&self) -> Vec<u32> {
        let imported = self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Func(ty) => Some(ty),
            _ => None,
        });
        imported.chain(self.functions.iter().map(|f| f.type_idx)).collect()
    }

    /// Type of every global in the global index space.
    pub fn global_types(&self) -> Vec<GlobalType> {
        let imported = self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Global(ty) => Some(ty),
            _ => None,
        });
        imported.chain(self.globals.iter().map(|g| g.ty)).collect()
    }

    /// Signature of function `idx`, if both the function and its type exist.
    pub fn func_type(&self, idx: u32) -> Option<&Signature> {
        let ty = *self.func_type_indices().get(idx as usize)?;
        self.types.get(ty as usize)
    }

    /// Limits of the memory at index 0, whether imported or defined.
    pub fn memory_limits(&self) -> Option<ResizableLimits> {
        self.imports.iter()
            .find_map(|i| match i.desc { ImportDesc::Memory(l) => Some(l), _ => None })
            .or_else(|| self.memories.first().copied())
    }

    /// Limits of the table at index 0, whether imported or defined.
    pub fn table_limits(&self) -> Option<ResizableLimits> {
        self.imports.iter()
            .find_map(|i| match i.desc { ImportDesc::Table(l) => Some(l), _ => None })
            .or_else(|| self.tables.first().copied())
    }
}

// ---------------- Helper Functions ----------------
fn decode_body(it: &mut ByteIter, function: &mut Function) -> Result<(), Error> {
    let mut open: Vec<u32> = Vec::new();
    loop {
        if it.empty() { return malformed(END_EXPECTED); }
        let pos = function.body.len() as u32;
        let instr = decode_instr(it)?;
        match instr {
            Instr::Block(_) | Instr::Loop(_) | Instr::If(_) => open.push(pos),
            Instr::Else => {
                let at = *open.last().ok_or(Error::Malformed(ELSE_MUST_CLOSE_IF))?;
                if !matches!(function.body[at as usize], Instr::If(_)) || function.else_at.contains_key(&at) {
                    return malformed(ELSE_MUST_CLOSE_IF);
                }
                function.else_at.insert(at, pos);
            }
            Instr::End => match open.pop() {
                Some(at) => { function.block_ends.insert(at, pos); }
                None => {
                    function.body.push(instr);
                    if !it.empty() { return malformed(SECTION_SIZE_MISMATCH); }
                    return Ok(());
                }
            },
            _ => {}
        }
        function.body.push(instr);
    }
}

fn read_const_expr(it: &mut ByteIter) -> Result<Vec<Instr>, Error> {
    let mut expr = Vec::new();
    loop {
        if it.empty() { return malformed(END_EXPECTED); }
        match decode_instr(it)? {
            Instr::End => return Ok(expr),
            instr => expr.push(instr),
        }
    }
}

fn get_limits(it: &mut ByteIter) -> Result<ResizableLimits, Error> {
    let flags = it.read_u8()?;
    let min = it.read_u32()?;
    let max = match flags {
        0 => None,
        1 => Some(it.read_u32()?),
        _ => return malformed(MALFORMED_LIMITS),
    };
    Ok(ResizableLimits { min, max })
}

fn get_table_type(it: &mut ByteIter) -> Result<ResizableLimits, Error> {
    const FUNCREF: u8 = 0x70;
    if it.read_u8()? != FUNCREF { return malformed(MALFORMED_REF_TYPE); }
    get_limits(it)
}

fn get_global_type(it: &mut ByteIter) -> Result<GlobalType, Error> {
    let ty = ValType::read(it)?;
    let mutable = match it.read_u8()? {
        0 => false,
        1 => true,
        _ => return malformed(INVALID_MUTABILITY),
    };
    Ok(GlobalType { ty, mutable })
}

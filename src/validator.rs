use std::ops::Deref;
use std::rc::Rc;

use log::debug;

use crate::error::*;
use crate::instruction::*;
use crate::module::*;
use crate::signature::*;
use crate::wasm_memory::WasmMemory;

// ---------------- Control Flow Structures ----------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlType {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug, Clone)]
struct ControlFrame {
    control_type: ControlType,
    params: Vec<ValType>,
    results: Vec<ValType>,
    /// Operand stack height when the frame was entered.
    height: usize,
    /// Body position of the opening `block`/`loop`/`if`.
    start: u32,
    unreachable: bool,
}

impl ControlFrame {
    /// Kinds a branch to this frame carries: loops restart with their params.
    fn label_types(&self) -> &[ValType] {
        if self.control_type == ControlType::Loop { &self.params } else { &self.results }
    }
}

// ---------------- ValidatorStack for Type Checking ----------------

/// Operand kinds plus open control frames. `None` marks an operand of unknown
/// kind, produced by popping from a polymorphic (unreachable) stack.
#[derive(Default)]
struct ValidatorStack {
    vals: Vec<Option<ValType>>,
    ctrls: Vec<ControlFrame>,
}

type Check<T = ()> = Result<T, &'static str>;

impl ValidatorStack {
    fn push(&mut self, ty: Option<ValType>) { self.vals.push(ty); }

    fn push_slice(&mut self, tys: &[ValType]) {
        self.vals.extend(tys.iter().map(|ty| Some(*ty)));
    }

    fn frame(&self) -> Check<&ControlFrame> {
        self.ctrls.last().ok_or(UNKNOWN_LABEL)
    }

    fn pop(&mut self) -> Check<Option<ValType>> {
        let frame = self.frame()?;
        if self.vals.len() == frame.height {
            return if frame.unreachable { Ok(None) } else { Err(TYPE_MISMATCH) };
        }
        Ok(self.vals.pop().flatten())
    }

    fn pop_expect(&mut self, expected: ValType) -> Check<ValType> {
        match self.pop()? {
            Some(actual) if actual != expected => Err(TYPE_MISMATCH),
            _ => Ok(expected),
        }
    }

    fn pop_slice(&mut self, expected: &[ValType]) -> Check {
        for ty in expected.iter().rev() {
            self.pop_expect(*ty)?;
        }
        Ok(())
    }

    fn push_ctrl(&mut self, control_type: ControlType, start: u32, params: Vec<ValType>, results: Vec<ValType>) {
        let height = self.vals.len();
        self.push_slice(&params);
        self.ctrls.push(ControlFrame { control_type, params, results, height, start, unreachable: false });
    }

    fn pop_ctrl(&mut self) -> Check<ControlFrame> {
        let results = self.frame()?.results.clone();
        self.pop_slice(&results)?;
        let frame = self.ctrls.pop().ok_or(UNKNOWN_LABEL)?;
        if self.vals.len() != frame.height { return Err(TYPE_MISMATCH); }
        Ok(frame)
    }

    fn label_types(&self, depth: u32) -> Check<Vec<ValType>> {
        let depth = depth as usize;
        if depth >= self.ctrls.len() { return Err(UNKNOWN_LABEL); }
        Ok(self.ctrls[self.ctrls.len() - 1 - depth].label_types().to_vec())
    }

    fn set_unreachable(&mut self) -> Check {
        let frame = self.ctrls.last_mut().ok_or(UNKNOWN_LABEL)?;
        self.vals.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }
}

// ---------------- Function Validation ----------------
struct Validator<'a> {
    module: &'a Module,
    func_types: &'a [u32],
    global_types: &'a [GlobalType],
    has_memory: bool,
    has_table: bool,
}

impl Validator<'_> {
    fn func_sig(&self, idx: u32) -> Check<&Signature> {
        let ty = *self.func_types.get(idx as usize).ok_or(UNKNOWN_FUNC)?;
        self.module.types.get(ty as usize).ok_or(UNKNOWN_TYPE)
    }

    fn block_sig(&self, bt: BlockType) -> Check<(Vec<ValType>, Vec<ValType>)> {
        match bt {
            BlockType::Empty => Ok((vec![], vec![])),
            BlockType::Value(ty) => Ok((vec![], vec![ty])),
            BlockType::Func(idx) => {
                let sig = self.module.types.get(idx as usize).ok_or(UNKNOWN_TYPE)?;
                Ok((sig.params.clone(), sig.results.clone()))
            }
        }
    }

    fn check_memarg(&self, opcode: u8, memarg: MemArg) -> Check<ValType> {
        if !self.has_memory { return Err(UNKNOWN_MEMORY); }
        let (ty, width) = memory_access(opcode).ok_or(UNKNOWN_INSTRUCTION)?;
        if memarg.align >= 32 || (1u32 << memarg.align) > width {
            return Err(ALIGNMENT_TOO_LARGE);
        }
        Ok(ty)
    }

    fn validate_function(&self, function: &Function) -> Check {
        let sig = self.module.types.get(function.type_idx as usize).ok_or(UNKNOWN_TYPE)?;
        let declared: u64 = function.locals.iter().map(|(n, _)| *n as u64).sum();
        if declared > Module::MAX_LOCALS { return Err(TOO_MANY_LOCALS); }
        let locals: Vec<ValType> = sig.params.iter().copied().chain(function.local_types()).collect();
        let mut stack = ValidatorStack::default();
        stack.push_ctrl(ControlType::Function, 0, vec![], sig.results.clone());

        for (pos, instr) in function.body.iter().enumerate() {
            let pos = pos as u32;
            crate::wasm_trace!("validate {:?}", instr);
            match instr {
                Instr::Unreachable => stack.set_unreachable()?,
                Instr::Nop => {}
                Instr::Block(bt) | Instr::Loop(bt) => {
                    let (params, results) = self.block_sig(*bt)?;
                    stack.pop_slice(&params)?;
                    let kind = if matches!(instr, Instr::Loop(_)) { ControlType::Loop } else { ControlType::Block };
                    stack.push_ctrl(kind, pos, params, results);
                }
                Instr::If(bt) => {
                    let (params, results) = self.block_sig(*bt)?;
                    stack.pop_expect(ValType::I32)?;
                    stack.pop_slice(&params)?;
                    stack.push_ctrl(ControlType::If, pos, params, results);
                }
                Instr::Else => {
                    let frame = stack.pop_ctrl()?;
                    if frame.control_type != ControlType::If { return Err(ELSE_MUST_CLOSE_IF); }
                    if function.else_at.get(&frame.start) != Some(&pos) { return Err(CONTROL_TABLE_MISMATCH); }
                    stack.push_ctrl(ControlType::Else, frame.start, frame.params, frame.results);
                }
                Instr::End => {
                    let frame = stack.pop_ctrl()?;
                    if frame.control_type == ControlType::If && frame.params != frame.results {
                        return Err(TYPE_MISMATCH);
                    }
                    // Side tables must agree with the body
                    if frame.control_type != ControlType::Function {
                        if function.block_ends.get(&frame.start) != Some(&pos) { return Err(CONTROL_TABLE_MISMATCH); }
                        if frame.control_type == ControlType::If && function.else_at.contains_key(&frame.start) {
                            return Err(CONTROL_TABLE_MISMATCH);
                        }
                    }
                    stack.push_slice(&frame.results);
                }
                Instr::Br(depth) => {
                    let tys = stack.label_types(*depth)?;
                    stack.pop_slice(&tys)?;
                    stack.set_unreachable()?;
                }
                Instr::BrIf(depth) => {
                    stack.pop_expect(ValType::I32)?;
                    let tys = stack.label_types(*depth)?;
                    stack.pop_slice(&tys)?;
                    stack.push_slice(&tys);
                }
                Instr::BrTable(targets, default) => {
                    stack.pop_expect(ValType::I32)?;
                    let default_tys = stack.label_types(*default)?;
                    for target in targets.iter() {
                        let tys = stack.label_types(*target)?;
                        if tys.len() != default_tys.len() { return Err(TYPE_MISMATCH); }
                        // Each target checks against the same operands, so pop and put them back
                        let mut popped = Vec::with_capacity(tys.len());
                        for ty in tys.iter().rev() {
                            popped.push(stack.pop()?);
                            if matches!(popped.last(), Some(Some(actual)) if actual != ty) {
                                return Err(TYPE_MISMATCH);
                            }
                        }
                        for ty in popped.into_iter().rev() {
                            stack.push(ty);
                        }
                    }
                    stack.pop_slice(&default_tys)?;
                    stack.set_unreachable()?;
                }
                Instr::Return => {
                    stack.pop_slice(&sig.results)?;
                    stack.set_unreachable()?;
                }
                Instr::Call(idx) => {
                    let callee = self.func_sig(*idx)?;
                    stack.pop_slice(&callee.params)?;
                    stack.push_slice(&callee.results);
                }
                Instr::CallIndirect(ty) => {
                    if !self.has_table { return Err(UNKNOWN_TABLE); }
                    let callee = self.module.types.get(*ty as usize).ok_or(UNKNOWN_TYPE)?;
                    stack.pop_expect(ValType::I32)?;
                    stack.pop_slice(&callee.params)?;
                    stack.push_slice(&callee.results);
                }
                Instr::Drop => { stack.pop()?; }
                Instr::Select => {
                    stack.pop_expect(ValType::I32)?;
                    let t1 = stack.pop()?;
                    let t2 = stack.pop()?;
                    if let (Some(a), Some(b)) = (t1, t2) {
                        if a != b { return Err(TYPE_MISMATCH); }
                    }
                    stack.push(t1.or(t2));
                }
                Instr::LocalGet(idx) => {
                    let ty = *locals.get(*idx as usize).ok_or(UNKNOWN_LOCAL)?;
                    stack.push(Some(ty));
                }
                Instr::LocalSet(idx) => {
                    let ty = *locals.get(*idx as usize).ok_or(UNKNOWN_LOCAL)?;
                    stack.pop_expect(ty)?;
                }
                Instr::LocalTee(idx) => {
                    let ty = *locals.get(*idx as usize).ok_or(UNKNOWN_LOCAL)?;
                    stack.pop_expect(ty)?;
                    stack.push(Some(ty));
                }
                Instr::GlobalGet(idx) => {
                    let global = self.global_types.get(*idx as usize).ok_or(UNKNOWN_GLOBAL)?;
                    stack.push(Some(global.ty));
                }
                Instr::GlobalSet(idx) => {
                    let global = self.global_types.get(*idx as usize).ok_or(UNKNOWN_GLOBAL)?;
                    if !global.mutable { return Err(GLOBAL_IS_IMMUTABLE); }
                    stack.pop_expect(global.ty)?;
                }
                Instr::Load(opcode, memarg) => {
                    let ty = self.check_memarg(*opcode, *memarg)?;
                    stack.pop_expect(ValType::I32)?;
                    stack.push(Some(ty));
                }
                Instr::Store(opcode, memarg) => {
                    let ty = self.check_memarg(*opcode, *memarg)?;
                    stack.pop_expect(ty)?;
                    stack.pop_expect(ValType::I32)?;
                }
                Instr::MemorySize => {
                    if !self.has_memory { return Err(UNKNOWN_MEMORY); }
                    stack.push(Some(ValType::I32));
                }
                Instr::MemoryGrow => {
                    if !self.has_memory { return Err(UNKNOWN_MEMORY); }
                    stack.pop_expect(ValType::I32)?;
                    stack.push(Some(ValType::I32));
                }
                Instr::I32Const(_) => stack.push(Some(ValType::I32)),
                Instr::I64Const(_) => stack.push(Some(ValType::I64)),
                Instr::F32Const(_) => stack.push(Some(ValType::F32)),
                Instr::F64Const(_) => stack.push(Some(ValType::F64)),
                Instr::Numeric(opcode) => {
                    let (params, result) = numeric_signature(*opcode).ok_or(UNKNOWN_INSTRUCTION)?;
                    stack.pop_slice(params)?;
                    stack.push(Some(result));
                }
                Instr::TruncSat(sub) => {
                    let (from, to) = trunc_sat_signature(*sub).ok_or(UNKNOWN_INSTRUCTION)?;
                    stack.pop_expect(from)?;
                    stack.push(Some(to));
                }
            }
        }
        if !stack.ctrls.is_empty() { return Err(END_EXPECTED); }
        Ok(())
    }
}

// ---------------- Module Validation ----------------

fn check_limits(limits: ResizableLimits, upper: Option<u32>) -> Check {
    if let Some(upper) = upper {
        if limits.min > upper || limits.max.is_some_and(|max| max > upper) {
            return Err(MEMORY_SIZE_LIMIT);
        }
    }
    if limits.max.is_some_and(|max| max < limits.min) {
        return Err(MIN_GREATER_THAN_MAX);
    }
    Ok(())
}

/// Constant expressions are a single `*.const`, or a `global.get` of an
/// imported immutable global.
fn check_const_expr(expr: &[Instr], expected: ValType, imported_globals: &[GlobalType]) -> Check {
    let ty = match expr {
        [Instr::I32Const(_)] => ValType::I32,
        [Instr::I64Const(_)] => ValType::I64,
        [Instr::F32Const(_)] => ValType::F32,
        [Instr::F64Const(_)] => ValType::F64,
        [Instr::GlobalGet(idx)] => {
            let global = imported_globals.get(*idx as usize).ok_or(UNKNOWN_GLOBAL)?;
            if global.mutable { return Err(CONST_EXP_REQUIRED); }
            global.ty
        }
        [] => return Err(TYPE_MISMATCH),
        _ => return Err(CONST_EXP_REQUIRED),
    };
    if ty != expected { return Err(TYPE_MISMATCH); }
    Ok(())
}

fn validate_module(module: &Module, func_types: &[u32], global_types: &[GlobalType]) -> Check {
    for import in &module.imports {
        match import.desc {
            ImportDesc::Func(ty) if ty as usize >= module.types.len() => return Err(UNKNOWN_TYPE),
            ImportDesc::Memory(limits) => check_limits(limits, Some(WasmMemory::MAX_PAGES))?,
            ImportDesc::Table(_) => return Err(TABLE_IMPORT_UNSUPPORTED),
            _ => {}
        }
    }
    if module.functions.iter().any(|f| f.type_idx as usize >= module.types.len()) {
        return Err(UNKNOWN_TYPE);
    }

    let n_memories = module.memories.len() + module.imports.iter().filter(|i| i.desc.kind() == ExternKind::Memory).count();
    if n_memories > 1 { return Err(MULTIPLE_MEMORIES); }
    let n_tables = module.tables.len() + module.imports.iter().filter(|i| i.desc.kind() == ExternKind::Table).count();
    if n_tables > 1 { return Err(MULTIPLE_TABLES); }
    for limits in &module.memories {
        check_limits(*limits, Some(WasmMemory::MAX_PAGES))?;
    }
    for limits in &module.tables {
        check_limits(*limits, None)?;
    }

    let imported_globals = &global_types[..module.num_imported_globals()];
    for global in &module.globals {
        check_const_expr(&global.init, global.ty.ty, imported_globals)?;
    }

    for export in &module.exports {
        let idx = export.index as usize;
        match export.kind {
            ExternKind::Func if idx >= func_types.len() => return Err(UNKNOWN_FUNC),
            ExternKind::Table if idx >= n_tables => return Err(UNKNOWN_TABLE),
            ExternKind::Memory if idx >= n_memories => return Err(UNKNOWN_MEMORY),
            ExternKind::Global if idx >= global_types.len() => return Err(UNKNOWN_GLOBAL),
            _ => {}
        }
    }

    if let Some(start) = module.start {
        let ty = *func_types.get(start as usize).ok_or(UNKNOWN_FUNC)?;
        let sig = module.types.get(ty as usize).ok_or(UNKNOWN_TYPE)?;
        if !sig.params.is_empty() || !sig.results.is_empty() { return Err(START_FUNC); }
    }

    for segment in &module.elements {
        if n_tables == 0 { return Err(UNKNOWN_TABLE); }
        check_const_expr(&segment.offset, ValType::I32, imported_globals)?;
        if segment.init.iter().any(|idx| *idx as usize >= func_types.len()) {
            return Err(UNKNOWN_FUNC);
        }
    }

    for segment in &module.data {
        if n_memories == 0 { return Err(UNKNOWN_MEMORY); }
        check_const_expr(&segment.offset, ValType::I32, imported_globals)?;
    }
    Ok(())
}

/// Checks a decoded module for type and index correctness.
pub fn validate(module: &Module) -> Result<(), Error> {
    let func_types = module.func_type_indices();
    let global_types = module.global_types();
    validate_module(module, &func_types, &global_types)
        .map_err(|reason| Error::Validation { func: None, reason })?;

    let validator = Validator {
        module,
        func_types: &func_types,
        global_types: &global_types,
        has_memory: module.memory_limits().is_some(),
        has_table: module.table_limits().is_some(),
    };
    let n_imported = module.num_imported_funcs();
    for (i, function) in module.functions.iter().enumerate() {
        validator.validate_function(function).map_err(|reason| Error::Validation {
            func: Some((n_imported + i) as u32),
            reason,
        })?;
    }
    debug!("validated module with {} functions", func_types.len());
    Ok(())
}

/// A module that passed validation. Cheap to clone; every instance linked
/// from it shares the same decoded code.
#[derive(Debug, Clone)]
pub struct ValidatedModule {
    module: Rc<Module>,
}

impl ValidatedModule {
    pub fn new(module: Module) -> Result<Self, Error> {
        validate(&module)?;
        Ok(Self { module: Rc::new(module) })
    }

    pub fn module(&self) -> &Module { &self.module }
}

impl Deref for ValidatedModule {
    type Target = Module;

    fn deref(&self) -> &Module { &self.module }
}

impl Module {
    /// Decodes and validates in one step.
    pub fn compile(bytes: &[u8]) -> Result<ValidatedModule, Error> {
        ValidatedModule::new(Module::decode(bytes)?)
    }
}

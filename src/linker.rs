use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use log::debug;

use crate::error::*;
use crate::instance::*;
use crate::instruction::Instr;
use crate::interpreter;
use crate::module::{Import, ImportDesc, ResizableLimits};
use crate::signature::{list_to_string, Signature, ValType};
use crate::validator::ValidatedModule;
use crate::value::{Value, WasmValue};
use crate::wasm_memory::WasmMemory;

type HostCallback = dyn Fn(&[Value]) -> Result<Vec<Value>, HostError>;

/// A host function with a declared signature. Cloning shares the closure.
#[derive(Clone)]
pub struct HostFunc {
    signature: Rc<Signature>,
    callback: Rc<HostCallback>,
}

impl HostFunc {
    pub fn new(
        params: &[ValType],
        results: &[ValType],
        callback: impl Fn(&[Value]) -> Result<Vec<Value>, HostError> + 'static,
    ) -> Self {
        Self {
            signature: Rc::new(Signature::new(params, results)),
            callback: Rc::new(callback),
        }
    }

    pub fn signature(&self) -> &Signature { &self.signature }

    /// Runs the callback and checks what it returned against the declared results.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, Trap> {
        let results = (self.callback)(args).map_err(Trap::Host)?;
        let kinds: Vec<ValType> = results.iter().map(Value::ty).collect();
        if kinds != self.signature.results {
            return Err(Trap::Host(Box::new(HostResultMismatch {
                expected: list_to_string(&self.signature.results),
                actual: list_to_string(&kinds),
            })));
        }
        Ok(results)
    }
}

impl Debug for HostFunc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostFunc({})", self.signature)
    }
}

/// Something a module import can be bound to.
#[derive(Debug, Clone)]
pub enum Extern {
    Func(HostFunc),
    Memory(SharedMemory),
    Global(SharedGlobal),
}

impl Extern {
    pub fn memory(memory: WasmMemory) -> Self { Extern::Memory(Rc::new(RefCell::new(memory))) }
    pub fn global(global: WasmGlobal) -> Self { Extern::Global(Rc::new(global)) }
}

/// Resolves `(module, field)` import names to bindings.
pub trait ImportProvider {
    fn resolve(&self, module: &str, field: &str) -> Option<Extern>;
}

pub type ModuleImports = HashMap<String, Extern>;
pub type Imports = HashMap<String, ModuleImports>;

impl ImportProvider for Imports {
    fn resolve(&self, module: &str, field: &str) -> Option<Extern> {
        self.get(module)?.get(field).cloned()
    }
}

/// Adapts a closure into an [`ImportProvider`].
pub struct FnProvider<F>(pub F);

impl<F> ImportProvider for FnProvider<F>
where F: Fn(&str, &str) -> Option<Extern> {
    fn resolve(&self, module: &str, field: &str) -> Option<Extern> {
        (self.0)(module, field)
    }
}

fn limits_match(actual_min: u32, actual_max: Option<u32>, wanted: ResizableLimits) -> bool {
    if actual_min < wanted.min { return false; }
    match (wanted.max, actual_max) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => actual <= wanted,
        (Some(_), None) => false,
    }
}

/// Value of a validated constant expression.
fn eval_const(expr: &[Instr], globals: &[SharedGlobal]) -> Result<WasmValue, Error> {
    match expr {
        [Instr::I32Const(v)] => Ok(WasmValue::from_i32(*v)),
        [Instr::I64Const(v)] => Ok(WasmValue::from_i64(*v)),
        [Instr::F32Const(bits)] => Ok(WasmValue::from_f32_bits(*bits)),
        [Instr::F64Const(bits)] => Ok(WasmValue::from_f64_bits(*bits)),
        [Instr::GlobalGet(idx)] => globals.get(*idx as usize)
            .map(|g| g.raw())
            .ok_or(Error::Validation { func: None, reason: UNKNOWN_GLOBAL }),
        _ => Err(Error::Validation { func: None, reason: CONST_EXP_REQUIRED }),
    }
}

fn allocation_failed(trap: Trap) -> Error {
    Error::Uninstantiable { reason: ALLOCATION_FAILED, trap: Some(trap) }
}

#[derive(Default)]
struct ResolvedImports {
    functions: Vec<RuntimeFunction>,
    globals: Vec<SharedGlobal>,
    memory: Option<SharedMemory>,
}

fn resolve_import(import: &Import, module: &ValidatedModule, binding: Extern, out: &mut ResolvedImports) -> Result<(), Error> {
    let which = || format!("{}.{}", import.module, import.field);
    let mismatch = || link_error(LinkErrorKind::SignatureMismatch, which());
    match (&import.desc, binding) {
        (ImportDesc::Func(ty), Extern::Func(host)) => {
            if module.types.get(*ty as usize) != Some(host.signature()) { return Err(mismatch()); }
            out.functions.push(RuntimeFunction::Host(host));
        }
        (ImportDesc::Global(ty), Extern::Global(global)) => {
            if global.ty() != ty.ty || global.is_mutable() != ty.mutable { return Err(mismatch()); }
            out.globals.push(global);
        }
        (ImportDesc::Memory(limits), Extern::Memory(memory)) => {
            let ok = {
                let m = memory.borrow();
                limits_match(m.size(), m.declared_max(), *limits)
            };
            if !ok { return Err(mismatch()); }
            out.memory = Some(memory);
        }
        _ => return Err(mismatch()),
    }
    debug!("resolved import {}", which());
    Ok(())
}

impl Instance {
    /// Links a validated module against host bindings with default [`Limits`].
    pub fn link(module: &ValidatedModule, imports: &dyn ImportProvider) -> Result<Instance, Error> {
        Self::link_with_limits(module, imports, Limits::default())
    }

    pub fn link_with_limits(module: &ValidatedModule, imports: &dyn ImportProvider, limits: Limits) -> Result<Instance, Error> {
        // Imports, in declaration order, before anything is allocated
        let mut resolved = ResolvedImports::default();
        for import in &module.imports {
            let binding = imports.resolve(&import.module, &import.field).ok_or_else(|| {
                link_error(LinkErrorKind::UnresolvedImport, format!("{}.{}", import.module, import.field))
            })?;
            resolve_import(import, module, binding, &mut resolved)?;
        }

        let memory = match (resolved.memory, module.memories.first()) {
            (Some(imported), _) => Some(imported),
            (None, Some(l)) => {
                if l.min > limits.max_memory_pages {
                    return Err(Error::Uninstantiable { reason: MEMORY_LIMIT_EXCEEDED, trap: None });
                }
                let memory = WasmMemory::new(l.min, l.max).map_err(allocation_failed)?;
                Some(Rc::new(RefCell::new(memory)))
            }
            (None, None) => None,
        };
        let table = match module.tables.first() {
            Some(l) => {
                if l.min > limits.max_table_size {
                    return Err(Error::Uninstantiable { reason: TABLE_LIMIT_EXCEEDED, trap: None });
                }
                let table = WasmTable::new(l.min, l.max).map_err(allocation_failed)?;
                Some(Rc::new(RefCell::new(table)))
            }
            None => None,
        };

        let mut functions = resolved.functions;
        functions.reserve(module.functions.len());
        for (index, function) in module.functions.iter().enumerate() {
            let sig = &module.types[function.type_idx as usize];
            functions.push(RuntimeFunction::Owned {
                index,
                n_params: sig.params.len(),
                n_locals: function.num_locals(),
                n_results: sig.results.len(),
            });
        }

        let mut globals = resolved.globals;
        for global in &module.globals {
            let value = eval_const(&global.init, &globals)?;
            let value = value.to_value(global.ty.ty);
            globals.push(Rc::new(WasmGlobal::new(value, global.ty.mutable)));
        }

        let mut exports = HashMap::with_capacity(module.exports.len());
        for export in &module.exports {
            if exports.insert(export.name.clone(), (export.kind, export.index)).is_some() {
                return Err(link_error(LinkErrorKind::DuplicateExport, export.name.clone()));
            }
        }

        // Every segment must fit before any of them is written
        let mut pending_elements = Vec::with_capacity(module.elements.len());
        for segment in &module.elements {
            let offset = eval_const(&segment.offset, &globals)?.as_u32();
            let size = table.as_ref().map_or(0, |t| t.borrow().size());
            if offset as u64 + segment.init.len() as u64 > size as u64 {
                return Err(Error::Uninstantiable { reason: ELEM_SEG_DNF, trap: None });
            }
            pending_elements.push((offset, &segment.init));
        }
        let mut pending_data = Vec::with_capacity(module.data.len());
        for segment in &module.data {
            let offset = eval_const(&segment.offset, &globals)?.as_u32();
            let fits = memory.as_ref().is_some_and(|m| m.borrow().fits(offset, segment.init.len()));
            if !fits {
                return Err(Error::Uninstantiable { reason: DATA_SEG_DNF, trap: None });
            }
            pending_data.push((offset, &segment.init));
        }

        if let Some(table) = &table {
            let mut table = table.borrow_mut();
            for (offset, init) in pending_elements {
                for (i, func) in init.iter().enumerate() {
                    table.set(offset + i as u32, Some(*func))?;
                }
            }
        }
        if let Some(memory) = &memory {
            let mut memory = memory.borrow_mut();
            for (offset, init) in pending_data {
                memory.write(offset, init)?;
            }
        }

        let instance = Instance {
            module: module.clone(),
            memory,
            table,
            globals,
            functions,
            exports,
            fuel: Cell::new(limits.fuel),
            limits,
            state: Cell::new(InvocationState::Idle),
        };
        debug!(
            "linked instance: {} functions, {} globals, {} exports",
            instance.functions.len(), instance.globals.len(), instance.exports.len()
        );

        if let Some(start) = module.start {
            debug!("running start function {start}");
            instance.state.set(InvocationState::Running);
            let result = interpreter::execute(&instance, start, Vec::new());
            instance.state.set(InvocationState::Idle);
            if let Err(trap) = result {
                return Err(Error::Uninstantiable { reason: START_TRAPPED, trap: Some(trap) });
            }
        }
        Ok(instance)
    }
}

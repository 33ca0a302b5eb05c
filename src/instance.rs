use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::interpreter;
use crate::linker::HostFunc;
use crate::module::ExternKind;
use crate::signature::{Signature, ValType};
use crate::validator::ValidatedModule;
use crate::value::{Value, WasmValue};
use crate::wasm_memory::{reserve_zeroed, WasmMemory};

pub type SharedMemory = Rc<RefCell<WasmMemory>>;
pub type SharedTable = Rc<RefCell<WasmTable>>;
pub type SharedGlobal = Rc<WasmGlobal>;

/// Resource limits applied to every invocation on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of nested wasm and host calls.
    pub max_call_depth: usize,
    /// Maximum number of value slots (operands plus locals) across all frames.
    pub max_value_stack: usize,
    /// Units available for loop iterations and calls; `None` means unbounded.
    pub fuel: Option<u64>,
    /// Trap on a failed `memory.grow` instead of pushing -1.
    pub trap_on_failed_grow: bool,
    /// Largest memory, in pages, an instance may create or grow to.
    pub max_memory_pages: u32,
    /// Largest table, in elements, an instance may create.
    pub max_table_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            max_value_stack: 1 << 20,
            fuel: None,
            trap_on_failed_grow: true,
            max_memory_pages: WasmMemory::MAX_PAGES,
            max_table_size: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationState {
    #[default]
    Idle,
    ArgsChecked,
    Running,
    Returned,
    Trapped,
}

/// Table of function references, indexed by the owning instance's function space.
#[derive(Debug)]
pub struct WasmTable {
    elements: Vec<Option<u32>>,
    maximum: Option<u32>,
}

impl WasmTable {
    /// Fails with [`Trap::OutOfMemory`] when the slots cannot be allocated.
    pub fn new(initial: u32, maximum: Option<u32>) -> Result<Self, Trap> {
        let mut elements = Vec::new();
        reserve_zeroed(&mut elements, initial as usize)?;
        Ok(Self { elements, maximum })
    }
    pub fn size(&self) -> u32 { self.elements.len() as u32 }
    pub fn max(&self) -> Option<u32> { self.maximum }

    pub fn grow(&mut self, delta: u32, init: Option<u32>) -> Result<u32, Trap> {
        let old = self.size();
        let limit = self.maximum.unwrap_or(u32::MAX);
        if delta > limit.saturating_sub(old) { return Err(Trap::OutOfMemory); }
        let len = (old + delta) as usize;
        self.elements.try_reserve_exact(delta as usize).map_err(|_| Trap::OutOfMemory)?;
        self.elements.resize(len, init);
        Ok(old)
    }
    pub fn get(&self, idx: u32) -> Result<Option<u32>, Trap> {
        self.elements.get(idx as usize).copied().ok_or(Trap::TableOutOfBounds)
    }
    pub fn set(&mut self, idx: u32, value: Option<u32>) -> Result<(), Trap> {
        let slot = self.elements.get_mut(idx as usize).ok_or(Trap::TableOutOfBounds)?;
        *slot = value;
        Ok(())
    }
}

#[derive(Debug)]
pub struct WasmGlobal {
    ty: ValType,
    mutable: bool,
    value: Cell<WasmValue>,
}

impl WasmGlobal {
    pub fn new(value: Value, mutable: bool) -> Self {
        Self { ty: value.ty(), mutable, value: Cell::new(value.into()) }
    }
    pub fn ty(&self) -> ValType { self.ty }
    pub fn is_mutable(&self) -> bool { self.mutable }
    pub fn get(&self) -> Value { self.value.get().to_value(self.ty) }

    /// Host-side write. Kind and mutability are checked; wasm code is
    /// checked statically instead.
    pub fn set(&self, value: Value) -> Result<(), Error> {
        if !self.mutable { return Err(Error::Argument(GLOBAL_IS_IMMUTABLE.to_string())); }
        if value.ty() != self.ty {
            return Err(Error::Argument(format!("{TYPE_MISMATCH}: global is {}, got {}", self.ty, value.ty())));
        }
        self.value.set(value.into());
        Ok(())
    }

    pub(crate) fn raw(&self) -> WasmValue { self.value.get() }
    pub(crate) fn set_raw(&self, value: WasmValue) { self.value.set(value) }
}

// --------------- Imports/Exports and Functions ---------------

#[derive(Debug, Clone)]
pub(crate) enum RuntimeFunction {
    Owned {
        /// Index into the module's locally defined functions.
        index: usize,
        n_params: usize,
        n_locals: usize,
        n_results: usize,
    },
    Host(HostFunc),
}

/// A linked module: memory, table, globals and resolved functions, ready to
/// run exported functions. Not `Send`; create one instance per thread.
#[derive(Debug)]
pub struct Instance {
    pub(crate) module: ValidatedModule,
    pub(crate) memory: Option<SharedMemory>,
    pub(crate) table: Option<SharedTable>,
    pub(crate) globals: Vec<SharedGlobal>,
    pub(crate) functions: Vec<RuntimeFunction>,
    pub(crate) exports: HashMap<String, (ExternKind, u32)>,
    pub(crate) limits: Limits,
    pub(crate) fuel: Cell<Option<u64>>,
    pub(crate) state: Cell<InvocationState>,
}

impl Instance {
    pub fn module(&self) -> &ValidatedModule { &self.module }
    pub fn limits(&self) -> &Limits { &self.limits }
    pub fn state(&self) -> InvocationState { self.state.get() }
    /// Remaining fuel, `None` when unmetered.
    pub fn fuel(&self) -> Option<u64> { self.fuel.get() }
    pub fn set_fuel(&self, fuel: Option<u64>) { self.fuel.set(fuel) }

    /// Export names and kinds, in module order.
    pub fn exports(&self) -> impl Iterator<Item = (&str, ExternKind)> + '_ {
        self.module.exports.iter().map(|e| (e.name.as_str(), e.kind))
    }

    fn export(&self, name: &str, kind: ExternKind) -> Option<u32> {
        match self.exports.get(name) {
            Some((k, idx)) if *k == kind => Some(*idx),
            _ => None,
        }
    }

    pub fn export_memory(&self, name: &str) -> Option<SharedMemory> {
        self.export(name, ExternKind::Memory)?;
        self.memory.clone()
    }

    pub fn export_table(&self, name: &str) -> Option<SharedTable> {
        self.export(name, ExternKind::Table)?;
        self.table.clone()
    }

    pub fn export_global(&self, name: &str) -> Option<SharedGlobal> {
        let idx = self.export(name, ExternKind::Global)?;
        self.globals.get(idx as usize).cloned()
    }

    /// Signature of an exported function.
    pub fn export_signature(&self, name: &str) -> Option<&Signature> {
        let idx = self.export(name, ExternKind::Func)?;
        Some(self.func_signature(idx))
    }

    pub(crate) fn func_signature(&self, idx: u32) -> &Signature {
        match &self.functions[idx as usize] {
            RuntimeFunction::Owned { index, .. } => {
                &self.module.types[self.module.functions[*index].type_idx as usize]
            }
            RuntimeFunction::Host(host) => host.signature(),
        }
    }

    /// Calls an exported function. Arguments are checked against its
    /// signature before anything runs.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        if self.state.get() == InvocationState::Running {
            return Err(Error::Argument(ALREADY_RUNNING.to_string()));
        }
        let idx = match self.exports.get(name) {
            Some((ExternKind::Func, idx)) => *idx,
            Some(_) => return Err(Error::Argument(format!("{NOT_A_FUNCTION}: `{name}`"))),
            None => return Err(Error::Argument(format!("{UNKNOWN_EXPORT}: `{name}`"))),
        };
        let sig = self.func_signature(idx).clone();
        if args.len() != sig.params.len() {
            return Err(Error::Argument(format!(
                "{INVALID_NUM_ARG}: `{name}` expects {}, got {}", sig.params.len(), args.len()
            )));
        }
        for (i, (arg, ty)) in args.iter().zip(&sig.params).enumerate() {
            if arg.ty() != *ty {
                return Err(Error::Argument(format!(
                    "{INVALID_ARG_TYPE}: argument {i} of `{name}` is {}, expected {ty}", arg.ty()
                )));
            }
        }
        self.state.set(InvocationState::ArgsChecked);

        let raw = args.iter().map(|v| WasmValue::from(*v)).collect();
        self.state.set(InvocationState::Running);
        match interpreter::execute(self, idx, raw) {
            Ok(results) => {
                self.state.set(InvocationState::Returned);
                Ok(results.iter().zip(&sig.results).map(|(v, ty)| v.to_value(*ty)).collect())
            }
            Err(trap) => {
                self.state.set(InvocationState::Trapped);
                debug!("invocation of `{name}` trapped: {trap}");
                Err(Error::Trap(trap))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_grow_respects_maximum() {
        let mut table = WasmTable::new(1, Some(3)).unwrap();
        assert_eq!(table.grow(2, Some(7)).unwrap(), 1);
        assert_eq!(table.get(2).unwrap(), Some(7));
        assert!(matches!(table.grow(1, None), Err(Trap::OutOfMemory)));
        assert_eq!(table.size(), 3);
    }

    #[test]
    fn table_bounds() {
        let mut table = WasmTable::new(2, None).unwrap();
        assert_eq!(table.get(1).unwrap(), None);
        table.set(1, Some(4)).unwrap();
        assert_eq!(table.get(1).unwrap(), Some(4));
        assert!(matches!(table.get(2), Err(Trap::TableOutOfBounds)));
        assert!(matches!(table.set(2, None), Err(Trap::TableOutOfBounds)));
    }

    #[test]
    fn global_reads_back_typed_value() {
        let global = WasmGlobal::new(Value::F64(-1.5), true);
        assert_eq!(global.ty(), ValType::F64);
        global.set(Value::F64(2.25)).unwrap();
        assert_eq!(global.get(), Value::F64(2.25));
    }
}

#![deny(unsafe_code)]

//! A small embeddable WebAssembly interpreter.
//!
//! The pipeline is split into independent phases so one decoded and
//! validated module can back any number of instances:
//!
//! ```text
//! bytes --Module::decode--> Module --validate--> ValidatedModule
//!       --Instance::link(imports)--> Instance --invoke--> Vec<Value>
//! ```

mod byte_iter;
pub mod encoder;
pub mod error;
pub mod instance;
pub mod instruction;
mod interpreter;
pub mod leb128;
pub mod linker;
pub mod module;
pub mod signature;
pub mod validator;
pub mod value;
pub mod wasm_memory;

// Per-instruction execution trace, compiled in only with the `wasm_debug` feature
#[cfg(feature = "wasm_debug")]
macro_rules! wasm_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}

#[cfg(not(feature = "wasm_debug"))]
macro_rules! wasm_trace {
    ($($arg:tt)*) => {};
}

pub(crate) use wasm_trace;

pub use encoder::{encode, encode_instr, ModuleBuilder};
pub use error::{Error, HostError, HostResultMismatch, LinkErrorKind, Trap};
pub use instance::{Instance, InvocationState, Limits, SharedGlobal, SharedMemory, SharedTable, WasmGlobal, WasmTable};
pub use instruction::{op, BlockType, Instr, MemArg};
pub use linker::{Extern, FnProvider, HostFunc, ImportProvider, Imports, ModuleImports};
pub use module::{Export, ExternKind, GlobalType, Import, ImportDesc, Module, ResizableLimits};
pub use signature::{Signature, ValType};
pub use validator::{validate, ValidatedModule};
pub use value::Value;
pub use wasm_memory::WasmMemory;

use std::fmt::{Display, Formatter};

/// Error returned by a host function. Any error type the embedder likes.
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed module: {0}")]
    Malformed(&'static str),
    #[error("invalid module: {reason}{}", in_func(.func))]
    Validation { func: Option<u32>, reason: &'static str },
    #[error("link error: {kind} `{which}`")]
    Link { kind: LinkErrorKind, which: String },
    #[error("module is uninstantiable: {reason}")]
    Uninstantiable {
        reason: &'static str,
        #[source]
        trap: Option<Trap>,
    },
    #[error("invalid invocation: {0}")]
    Argument(String),
    #[error(transparent)]
    Trap(#[from] Trap),
}

fn in_func(func: &Option<u32>) -> String {
    match func {
        Some(idx) => format!(" (in function {idx})"),
        None => String::new(),
    }
}

impl Error {
    /// The trap behind this error, if execution trapped.
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Error::Trap(trap) => Some(trap),
            Error::Uninstantiable { trap, .. } => trap.as_ref(),
            _ => None,
        }
    }
}

pub(crate) fn malformed<T>(msg: &'static str) -> Result<T, Error> {
    Err(Error::Malformed(msg))
}

pub(crate) fn link_error(kind: LinkErrorKind, which: impl Into<String>) -> Error {
    Error::Link {
        kind,
        which: which.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    UnresolvedImport,
    SignatureMismatch,
    DuplicateExport,
}

impl Display for LinkErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LinkErrorKind::UnresolvedImport => UNKNOWN_IMPORT,
            LinkErrorKind::SignatureMismatch => INCOMPATIBLE_IMPORT,
            LinkErrorKind::DuplicateExport => DUP_EXPORT_NAME,
        })
    }
}

/// Runtime fault. Aborts the current invocation; the instance stays usable.
#[derive(Debug, thiserror::Error)]
pub enum Trap {
    #[error("{DIVIDE_BY_ZERO}")]
    DivideByZero,
    #[error("{INTEGER_OVERFLOW}")]
    IntegerOverflow,
    #[error("{INVALID_CONV_TO_INT}")]
    InvalidConversion,
    #[error("{OOB_MEMORY_ACCESS}")]
    MemoryOutOfBounds,
    #[error("{OUT_OF_MEMORY}")]
    OutOfMemory,
    #[error("{BUDGET_EXCEEDED}")]
    BudgetExceeded,
    #[error("{STACK_EXHAUSTED}")]
    StackExhausted,
    #[error("{STACK_UNDERFLOW}")]
    StackUnderflow,
    #[error("{UNREACHABLE}")]
    Unreachable,
    #[error("{OOB_TABLE_ACCESS}")]
    TableOutOfBounds,
    #[error("{UNINITIALIZED_ELEM}")]
    UninitializedElement,
    #[error("{INDIRECT_CALL_MISMATCH}")]
    IndirectCallTypeMismatch,
    #[error("host function failed: {0}")]
    Host(#[source] HostError),
}

/// A host function returned values that disagree with its declared results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("host function returned {actual}, expected {expected}")]
pub struct HostResultMismatch {
    pub expected: String,
    pub actual: String,
}

// Malformed errors
pub const DATA_COUNT_INCONSISTENT: &str = "data count and data section have inconsistent lengths";
pub const DUPLICATE_SECTION: &str = "duplicate section";
pub const END_EXPECTED: &str = "END opcode expected";
pub const FUNC_CODE_INCONSISTENT: &str = "function and code section have inconsistent lengths";
pub const INT_TOO_LARGE: &str = "integer too large";
pub const INT_TOO_LONG: &str = "integer representation too long";
pub const INVALID_DATA_SEG_FLAG: &str = "invalid data segment flag";
pub const INVALID_ELEM_SEG_FLAG: &str = "invalid elements segment flag";
pub const INVALID_FUNC_TYPE: &str = "malformed function type";
pub const INVALID_MUTABILITY: &str = "malformed mutability";
pub const INVALID_SECTION_ID: &str = "malformed section id";
pub const INVALID_UTF8: &str = "malformed UTF-8 encoding";
pub const INVALID_VALUE_TYPE: &str = "invalid value type";
pub const JUNK_AFTER_LAST: &str = "junk after last section";
pub const LENGTH_OUT_OF_BOUNDS: &str = "length out of bounds";
pub const MALFORMED_EXPORT_KIND: &str = "malformed export kind";
pub const MALFORMED_IMPORT_KIND: &str = "malformed import kind";
pub const MALFORMED_LIMITS: &str = "malformed limits flags";
pub const MALFORMED_REF_TYPE: &str = "malformed reference type";
pub const NO_MAGIC_HEADER: &str = "magic header not detected";
pub const SECTION_OUT_OF_ORDER: &str = "section out of order";
pub const SECTION_SIZE_MISMATCH: &str = "section size mismatch";
pub const TOO_MANY_LOCALS: &str = "too many locals";
pub const UNEXPECTED_END: &str = "unexpected end of section or function";
pub const UNKNOWN_BINARY_VERSION: &str = "unknown binary version";
pub const UNKNOWN_INSTRUCTION: &str = "unknown instruction";
pub const UNMATCHED_END: &str = "unmatched END opcode";
pub const ZERO_FLAG_EXPECTED: &str = "zero flag expected";
// Validation errors
pub const ALIGNMENT_TOO_LARGE: &str = "alignment must not be larger than natural";
pub const CONST_EXP_REQUIRED: &str = "constant expression required";
pub const CONTROL_TABLE_MISMATCH: &str = "block ends do not match the function body";
pub const ELSE_MUST_CLOSE_IF: &str = "else must close an if";
pub const GLOBAL_IS_IMMUTABLE: &str = "global is immutable";
pub const MEMORY_SIZE_LIMIT: &str = "memory size must be at most 65536 pages (4GiB)";
pub const MIN_GREATER_THAN_MAX: &str = "size minimum must not be greater than maximum";
pub const MULTIPLE_MEMORIES: &str = "multiple memories";
pub const MULTIPLE_TABLES: &str = "multiple tables";
pub const START_FUNC: &str = "start function";
pub const TABLE_IMPORT_UNSUPPORTED: &str = "table imports are not supported";
pub const TYPE_MISMATCH: &str = "type mismatch";
pub const UNKNOWN_FUNC: &str = "unknown function";
pub const UNKNOWN_GLOBAL: &str = "unknown global";
pub const UNKNOWN_LABEL: &str = "unknown label";
pub const UNKNOWN_LOCAL: &str = "unknown local";
pub const UNKNOWN_MEMORY: &str = "unknown memory";
pub const UNKNOWN_TABLE: &str = "unknown table";
pub const UNKNOWN_TYPE: &str = "unknown type";
// Trap errors
pub const BUDGET_EXCEEDED: &str = "fuel exhausted";
pub const DIVIDE_BY_ZERO: &str = "integer divide by zero";
pub const INDIRECT_CALL_MISMATCH: &str = "indirect call type mismatch";
pub const INTEGER_OVERFLOW: &str = "integer overflow";
pub const INVALID_CONV_TO_INT: &str = "invalid conversion to integer";
pub const OOB_MEMORY_ACCESS: &str = "out of bounds memory access";
pub const OOB_TABLE_ACCESS: &str = "out of bounds table access";
pub const OUT_OF_MEMORY: &str = "out of memory";
pub const STACK_EXHAUSTED: &str = "call stack exhausted";
pub const STACK_UNDERFLOW: &str = "stack underflow";
pub const UNINITIALIZED_ELEM: &str = "uninitialized element";
pub const UNREACHABLE: &str = "unreachable";
// Link errors
pub const ALLOCATION_FAILED: &str = "allocation failed";
pub const DATA_SEG_DNF: &str = "data segment does not fit";
pub const DUP_EXPORT_NAME: &str = "duplicate export name";
pub const ELEM_SEG_DNF: &str = "elements segment does not fit";
pub const INCOMPATIBLE_IMPORT: &str = "incompatible import type";
pub const MEMORY_LIMIT_EXCEEDED: &str = "memory exceeds the instance limit";
pub const START_TRAPPED: &str = "start function trapped";
pub const TABLE_LIMIT_EXCEEDED: &str = "table exceeds the instance limit";
pub const UNKNOWN_IMPORT: &str = "unknown import";
// Invocation errors
pub const ALREADY_RUNNING: &str = "instance is already running";
pub const INVALID_NUM_ARG: &str = "invalid number of arguments";
pub const INVALID_ARG_TYPE: &str = "invalid argument type";
pub const NOT_A_FUNCTION: &str = "export is not a function";
pub const UNKNOWN_EXPORT: &str = "unknown export";

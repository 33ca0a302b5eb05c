#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasmling::*;

/// Calls made to `env.print_int`, in order.
pub type PrintLog = Rc<RefCell<Vec<i32>>>;

/// `env.print_int(i32) -> ()` that records every argument it sees.
pub fn print_int() -> (HostFunc, PrintLog) {
    let log = PrintLog::default();
    let sink = log.clone();
    let func = HostFunc::new(&[ValType::I32], &[], move |args| {
        if let Some(v) = args[0].as_i32() {
            sink.borrow_mut().push(v);
        }
        Ok(vec![])
    });
    (func, log)
}

pub fn env(fields: Vec<(&str, Extern)>) -> Imports {
    let module: ModuleImports = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    HashMap::from([("env".to_string(), module)])
}

/// Imports `env.print_int` and exports `add_two_int_32(i32, i32) -> i32`.
pub fn add_module() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let print_ty = b.ty(&[ValType::I32], &[]);
    let add_ty = b.ty(&[ValType::I32, ValType::I32], &[ValType::I32]);
    b.import_func("env", "print_int", print_ty);
    let add = b.func(add_ty, &[], vec![
        Instr::LocalGet(0),
        Instr::LocalGet(1),
        Instr::Numeric(op::I32_ADD),
    ]);
    b.export_func("add_two_int_32", add);
    b.build()
}

pub fn instantiate(bytes: &[u8], imports: &dyn ImportProvider) -> Instance {
    let module = Module::compile(bytes).unwrap();
    Instance::link(&module, imports).unwrap()
}

/// Instance of a module whose only function is exported as `f`. A one-page
/// memory and a table of four slots are always present.
pub fn single(params: &[ValType], results: &[ValType], locals: &[ValType], body: Vec<Instr>) -> Instance {
    single_with_limits(params, results, locals, body, Limits::default())
}

pub fn single_with_limits(
    params: &[ValType],
    results: &[ValType],
    locals: &[ValType],
    body: Vec<Instr>,
    limits: Limits,
) -> Instance {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(params, results);
    let f = b.func(ty, locals, body);
    b.memory(1, Some(2)).table(4, None).export_func("f", f);
    let module = Module::compile(&b.build()).unwrap();
    Instance::link_with_limits(&module, &Imports::new(), limits).unwrap()
}

pub fn binary_i32(opcode: u8) -> Vec<Instr> {
    vec![Instr::LocalGet(0), Instr::LocalGet(1), Instr::Numeric(opcode)]
}

pub fn trap_of(result: Result<Vec<Value>, Error>) -> Trap {
    match result {
        Err(Error::Trap(trap)) => trap,
        other => panic!("expected a trap, got {other:?}"),
    }
}

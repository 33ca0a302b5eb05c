mod common;

use std::cell::RefCell;
use std::rc::Rc;

use wasmling::error::*;
use wasmling::*;

fn link_err(module: &ValidatedModule, imports: &dyn ImportProvider) -> Error {
    match Instance::link(module, imports) {
        Ok(_) => panic!("link unexpectedly succeeded"),
        Err(err) => err,
    }
}

#[test]
fn exports_match_declarations() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[ValType::I32]);
    let f = b.func(ty, &[], vec![Instr::I32Const(1)]);
    let g = b.global(ValType::F64, true, Instr::F64Const(2.5f64.to_bits()));
    b.memory(1, None).table(2, Some(2));
    b.export_func("one", f)
        .export("mem", ExternKind::Memory, 0)
        .export("counter", ExternKind::Global, g)
        .export("tbl", ExternKind::Table, 0);
    let instance = common::instantiate(&b.build(), &Imports::new());

    let exports: Vec<(&str, ExternKind)> = instance.exports().collect();
    assert_eq!(exports, vec![
        ("one", ExternKind::Func),
        ("mem", ExternKind::Memory),
        ("counter", ExternKind::Global),
        ("tbl", ExternKind::Table),
    ]);
    assert_eq!(instance.export_memory("mem").unwrap().borrow().size(), 1);
    assert_eq!(instance.export_global("counter").unwrap().get(), Value::F64(2.5));
    assert_eq!(instance.export_table("tbl").unwrap().borrow().size(), 2);
    assert_eq!(instance.export_signature("one"), Some(&Signature::new(&[], &[ValType::I32])));
    assert!(instance.export_memory("one").is_none());
    assert_eq!(instance.state(), InvocationState::Idle);
}

#[test]
fn unresolved_import() {
    let module = Module::compile(&common::add_module()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::UnresolvedImport, ref which } if which == "env.print_int"));
    assert_eq!(err.to_string(), "link error: unknown import `env.print_int`");
}

#[test]
fn signature_mismatch() {
    let module = Module::compile(&common::add_module()).unwrap();
    // one parameter too many
    let wrong = HostFunc::new(&[ValType::I32, ValType::I32], &[], |_| Ok(vec![]));
    let err = link_err(&module, &common::env(vec![("print_int", Extern::Func(wrong))]));
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::SignatureMismatch, .. }));

    // right name, wrong kind
    let global = Extern::global(WasmGlobal::new(Value::I32(0), false));
    let err = link_err(&module, &common::env(vec![("print_int", global)]));
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::SignatureMismatch, .. }));
}

#[test]
fn closure_provider() {
    let module = Module::compile(&common::add_module()).unwrap();
    let (print, _) = common::print_int();
    let provider = FnProvider(move |module: &str, field: &str| match (module, field) {
        ("env", "print_int") => Some(Extern::Func(print.clone())),
        _ => None,
    });
    let instance = Instance::link(&module, &provider).unwrap();
    assert_eq!(instance.invoke("add_two_int_32", &[Value::I32(2), Value::I32(2)]).unwrap(), vec![Value::I32(4)]);
}

#[test]
fn one_module_many_instances() {
    let mut b = ModuleBuilder::new();
    let get_ty = b.ty(&[], &[ValType::I32]);
    let get = b.import_func("env", "get", get_ty);
    let call = b.func(get_ty, &[], vec![Instr::Call(get)]);
    b.export_func("call", call);
    let module = Module::compile(&b.build()).unwrap();

    let constant = |v: i32| {
        let f = HostFunc::new(&[], &[ValType::I32], move |_| Ok(vec![Value::I32(v)]));
        common::env(vec![("get", Extern::Func(f))])
    };
    let a = Instance::link(&module, &constant(10)).unwrap();
    let b = Instance::link(&module, &constant(20)).unwrap();
    assert_eq!(a.invoke("call", &[]).unwrap(), vec![Value::I32(10)]);
    assert_eq!(b.invoke("call", &[]).unwrap(), vec![Value::I32(20)]);
}

#[test]
fn imported_memory_is_shared() {
    let mut b = ModuleBuilder::new();
    b.import_memory("env", "memory", 1, Some(4));
    let ty = b.ty(&[ValType::I32, ValType::I32], &[]);
    let store = b.func(ty, &[], vec![
        Instr::LocalGet(0),
        Instr::LocalGet(1),
        Instr::Store(op::I32_STORE, MemArg::new(2, 0)),
    ]);
    b.export_func("store", store);
    b.data(8, &[1, 2, 3, 4]);
    let module = Module::compile(&b.build()).unwrap();

    let memory = Rc::new(RefCell::new(WasmMemory::new(1, Some(2)).unwrap()));
    let imports = common::env(vec![("memory", Extern::Memory(memory.clone()))]);
    let instance = Instance::link(&module, &imports).unwrap();
    assert_eq!(memory.borrow().load_u32(8, 0).unwrap(), 0x0403_0201);

    instance.invoke("store", &[Value::I32(100), Value::I32(-1)]).unwrap();
    assert_eq!(memory.borrow().load_u32(100, 0).unwrap(), u32::MAX);

    // a memory that may outgrow the declared maximum does not fit
    let unbounded = Extern::memory(WasmMemory::new(1, None).unwrap());
    let err = link_err(&module, &common::env(vec![("memory", unbounded)]));
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::SignatureMismatch, .. }));
}

#[test]
fn imported_globals() {
    let mut b = ModuleBuilder::new();
    let base = b.import_global("env", "base", ValType::I32, false);
    let counter = b.import_global("env", "counter", ValType::I64, true);
    let derived = b.global(ValType::I32, false, Instr::GlobalGet(base));
    let ty = b.ty(&[], &[]);
    let bump = b.func(ty, &[], vec![
        Instr::GlobalGet(counter),
        Instr::I64Const(1),
        Instr::Numeric(op::I64_ADD),
        Instr::GlobalSet(counter),
    ]);
    b.export_func("bump", bump).export("derived", ExternKind::Global, derived);
    let module = Module::compile(&b.build()).unwrap();

    let counter = Rc::new(WasmGlobal::new(Value::I64(41), true));
    let imports = common::env(vec![
        ("base", Extern::global(WasmGlobal::new(Value::I32(1024), false))),
        ("counter", Extern::Global(counter.clone())),
    ]);
    let instance = Instance::link(&module, &imports).unwrap();
    assert_eq!(instance.export_global("derived").unwrap().get(), Value::I32(1024));
    instance.invoke("bump", &[]).unwrap();
    assert_eq!(counter.get(), Value::I64(42));

    // mutability must agree
    let imports = common::env(vec![
        ("base", Extern::global(WasmGlobal::new(Value::I32(0), true))),
        ("counter", Extern::Global(counter)),
    ]);
    let err = link_err(&module, &imports);
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::SignatureMismatch, ref which } if which == "env.base"));
}

#[test]
fn duplicate_export_names() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    let f = b.func(ty, &[], vec![]);
    b.export_func("f", f).export_func("f", f);
    let module = Module::compile(&b.build()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Link { kind: LinkErrorKind::DuplicateExport, .. }));
}

#[test]
fn segments_must_fit() {
    let mut b = ModuleBuilder::new();
    b.memory(1, None).data(65535, &[1, 2]);
    let module = Module::compile(&b.build()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Uninstantiable { reason: DATA_SEG_DNF, trap: None }));

    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    let f = b.func(ty, &[], vec![]);
    b.table(1, None).element(1, &[f]);
    let module = Module::compile(&b.build()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Uninstantiable { reason: ELEM_SEG_DNF, .. }));
}

#[test]
fn no_segment_is_written_unless_all_fit() {
    let mut b = ModuleBuilder::new();
    b.import_memory("env", "memory", 1, None);
    b.data(0, &[0xaa]).data(70_000, &[0xbb]);
    let module = Module::compile(&b.build()).unwrap();
    let memory = Rc::new(RefCell::new(WasmMemory::new(1, None).unwrap()));
    let err = link_err(&module, &common::env(vec![("memory", Extern::Memory(memory.clone()))]));
    assert!(matches!(err, Error::Uninstantiable { reason: DATA_SEG_DNF, .. }));
    assert_eq!(memory.borrow().load_u8(0, 0).unwrap(), 0);
}

#[test]
fn start_function_runs_once_at_link() {
    let mut b = ModuleBuilder::new();
    let print_ty = b.ty(&[ValType::I32], &[]);
    let print = b.import_func("env", "print_int", print_ty);
    let ty = b.ty(&[], &[]);
    let start = b.func(ty, &[], vec![Instr::I32Const(99), Instr::Call(print)]);
    b.start(start);
    let module = Module::compile(&b.build()).unwrap();

    let (print, log) = common::print_int();
    let instance = Instance::link(&module, &common::env(vec![("print_int", Extern::Func(print))])).unwrap();
    assert_eq!(*log.borrow(), vec![99]);
    assert_eq!(instance.state(), InvocationState::Idle);
}

#[test]
fn trapping_start_function() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[]);
    let start = b.func(ty, &[], vec![Instr::Unreachable]);
    b.start(start);
    let module = Module::compile(&b.build()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Uninstantiable { reason: START_TRAPPED, .. }));
    assert!(matches!(err.trap(), Some(Trap::Unreachable)));
}

#[test]
fn oversized_table_is_refused() {
    let mut b = ModuleBuilder::new();
    b.table(u32::MAX, None);
    let module = Module::compile(&b.build()).unwrap();
    let err = link_err(&module, &Imports::new());
    assert!(matches!(err, Error::Uninstantiable { reason: TABLE_LIMIT_EXCEEDED, trap: None }));

    let roomy = Limits { max_table_size: 64, ..Limits::default() };
    let mut b = ModuleBuilder::new();
    b.table(64, None).export("tbl", ExternKind::Table, 0);
    let module = Module::compile(&b.build()).unwrap();
    let instance = Instance::link_with_limits(&module, &Imports::new(), roomy).unwrap();
    assert_eq!(instance.export_table("tbl").unwrap().borrow().size(), 64);
}

#[test]
fn oversized_memory_is_refused() {
    let mut b = ModuleBuilder::new();
    b.memory(8, None);
    let module = Module::compile(&b.build()).unwrap();
    let small = Limits { max_memory_pages: 4, ..Limits::default() };
    match Instance::link_with_limits(&module, &Imports::new(), small) {
        Err(Error::Uninstantiable { reason, .. }) => assert_eq!(reason, MEMORY_LIMIT_EXCEEDED),
        other => panic!("unexpected {other:?}"),
    }
}

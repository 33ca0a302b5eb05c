use paste::paste;

use crate::error::Trap;
use crate::instance::{Instance, RuntimeFunction};
use crate::instruction::{op, BlockType, Instr};
use crate::linker::HostFunc;
use crate::module::Module;
use crate::value::{Value, WasmValue};
use crate::wasm_trace;

/// Structured-control target. Branching to it keeps `arity` values on top of
/// the stack at `height` and continues at `cont`.
#[derive(Debug, Clone, Copy)]
struct Label {
    height: usize,
    arity: usize,
    cont: usize,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Index into the module's locally defined functions.
    func: usize,
    locals_base: usize,
    label_base: usize,
    return_pc: usize,
    n_results: usize,
}

fn block_arity(module: &Module, bt: BlockType) -> (usize, usize) {
    match bt {
        BlockType::Empty => (0, 0),
        BlockType::Value(_) => (0, 1),
        BlockType::Func(idx) => {
            let sig = &module.types[idx as usize];
            (sig.params.len(), sig.results.len())
        }
    }
}

fn consume_fuel(inst: &Instance) -> Result<(), Trap> {
    if let Some(fuel) = inst.fuel.get() {
        if fuel == 0 { return Err(Trap::BudgetExceeded); }
        inst.fuel.set(Some(fuel - 1));
    }
    Ok(())
}

/// Pops the host function's parameters, runs it and pushes its results.
fn call_host(host: &HostFunc, stack: &mut Vec<WasmValue>) -> Result<(), Trap> {
    let sig = host.signature();
    let base = stack.len().checked_sub(sig.params.len()).ok_or(Trap::StackUnderflow)?;
    let args: Vec<Value> = stack[base..].iter()
        .zip(&sig.params)
        .map(|(v, ty)| v.to_value(*ty))
        .collect();
    stack.truncate(base);
    let results = host.call(&args)?;
    stack.extend(results.into_iter().map(WasmValue::from));
    Ok(())
}

/// Unwinds to the label `depth` levels out and returns where to continue, or
/// `None` when the branch targets the function itself.
#[inline]
fn branch(stack: &mut Vec<WasmValue>, labels: &mut Vec<Label>, label_base: usize, depth: u32) -> Option<usize> {
    let depth = depth as usize;
    if depth >= labels.len() - label_base { return None; }
    let idx = labels.len() - 1 - depth;
    let Label { height, arity, cont } = labels[idx];
    let top = stack.len() - arity;
    stack.copy_within(top.., height);
    stack.truncate(height + arity);
    labels.truncate(idx);
    Some(cont)
}

// NaN-propagating min/max that order -0 below +0, and round-half-to-even
macro_rules! float_helpers {
    ($t:ident) => {
        paste! {
            fn [<$t _min>](a: $t, b: $t) -> $t {
                if a.is_nan() || b.is_nan() { return a + b; }
                if a == 0.0 && b == 0.0 {
                    return if a.is_sign_negative() { a } else { b };
                }
                a.min(b)
            }

            fn [<$t _max>](a: $t, b: $t) -> $t {
                if a.is_nan() || b.is_nan() { return a + b; }
                if a == 0.0 && b == 0.0 {
                    return if a.is_sign_positive() { a } else { b };
                }
                a.max(b)
            }

            fn [<$t _nearest>](x: $t) -> $t {
                if !x.is_finite() { return x; }
                let rounded = if (x - x.trunc()).abs() == 0.5 {
                    2.0 * (x / 2.0).round()
                } else {
                    x.round()
                };
                rounded.copysign(x)
            }
        }
    };
}

float_helpers!(f32);
float_helpers!(f64);

/// Runs function `func_idx` of `inst` with `args` already on the stack and
/// returns its results. Wasm-to-wasm calls push frames instead of recursing.
pub(crate) fn execute(inst: &Instance, func_idx: u32, args: Vec<WasmValue>) -> Result<Vec<WasmValue>, Trap> {
    let module: &Module = &inst.module;
    let limits = &inst.limits;
    let mut stack = args;
    let mut labels: Vec<Label> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();

    consume_fuel(inst)?;
    let (first, n_params, n_locals, n_results) = match &inst.functions[func_idx as usize] {
        RuntimeFunction::Host(host) => {
            call_host(host, &mut stack)?;
            return Ok(stack);
        }
        RuntimeFunction::Owned { index, n_params, n_locals, n_results } => (*index, *n_params, *n_locals, *n_results),
    };

    let mut func = &module.functions[first];
    let mut pc = 0usize;
    let mut locals_base = 0usize;
    let mut label_base = 0usize;

    macro_rules! pop { () => {{
        match stack.pop() { Some(v) => v, None => return Err(Trap::StackUnderflow) }
    }} }
    macro_rules! enter {
        ($index:expr, $n_params:expr, $n_locals:expr, $n_results:expr) => {{
            if frames.len() >= limits.max_call_depth { return Err(Trap::StackExhausted); }
            let base = match stack.len().checked_sub($n_params) {
                Some(base) => base,
                None => return Err(Trap::StackUnderflow),
            };
            if stack.len() + $n_locals > limits.max_value_stack { return Err(Trap::StackExhausted); }
            stack.resize(stack.len() + $n_locals, WasmValue::default());
            frames.push(Frame {
                func: $index,
                locals_base: base,
                label_base: labels.len(),
                return_pc: pc,
                n_results: $n_results,
            });
            func = &module.functions[$index];
            pc = 0;
            locals_base = base;
            label_base = labels.len();
        }};
    }
    macro_rules! do_return { () => {{
        let frame = match frames.pop() { Some(f) => f, None => return Err(Trap::StackUnderflow) };
        let top = stack.len() - frame.n_results;
        stack.copy_within(top.., frame.locals_base);
        stack.truncate(frame.locals_base + frame.n_results);
        labels.truncate(frame.label_base);
        match frames.last() {
            None => return Ok(stack),
            Some(caller) => {
                func = &module.functions[caller.func];
                locals_base = caller.locals_base;
                label_base = caller.label_base;
                pc = frame.return_pc;
            }
        }
    }} }
    macro_rules! br { ($depth:expr) => {{
        match branch(&mut stack, &mut labels, label_base, $depth) {
            Some(cont) => pc = cont,
            None => do_return!(),
        }
    }} }
    macro_rules! call { ($idx:expr) => {{
        consume_fuel(inst)?;
        match &inst.functions[$idx as usize] {
            RuntimeFunction::Owned { index, n_params, n_locals, n_results } => {
                enter!(*index, *n_params, *n_locals, *n_results);
            }
            RuntimeFunction::Host(host) => {
                if frames.len() >= limits.max_call_depth { return Err(Trap::StackExhausted); }
                call_host(host, &mut stack)?;
            }
        }
    }} }
    macro_rules! unop {
        ($t:ident, |$a:ident| $e:expr) => {{
            paste! {
                let $a = pop!().[<as_ $t>]();
                stack.push(WasmValue::[<from_ $t>]($e));
            }
        }};
    }
    macro_rules! binop {
        ($t:ident, |$a:ident, $b:ident| $e:expr) => {{
            paste! {
                let $b = pop!().[<as_ $t>]();
                let $a = pop!().[<as_ $t>]();
                stack.push(WasmValue::[<from_ $t>]($e));
            }
        }};
    }
    macro_rules! relop {
        ($t:ident, |$a:ident, $b:ident| $e:expr) => {{
            paste! {
                let $b = pop!().[<as_ $t>]();
                let $a = pop!().[<as_ $t>]();
                stack.push(WasmValue::from_u32($e as u32));
            }
        }};
    }
    // Division and remainder trap on a zero divisor and otherwise wrap, so
    // MIN / -1 is MIN and MIN % -1 is 0
    macro_rules! divop {
        ($t:ident, $method:ident) => {{
            paste! {
                let divisor = pop!().[<as_ $t>]();
                let dividend = pop!().[<as_ $t>]();
                if divisor == 0 { return Err(Trap::DivideByZero); }
                stack.push(WasmValue::[<from_ $t>](dividend.$method(divisor)));
            }
        }};
    }
    // `as` saturates float-to-int and maps NaN to 0, which is exactly trunc_sat
    macro_rules! cast {
        ($from:ident -> $to:ident) => {{
            paste! {
                let v = pop!().[<as_ $from>]();
                stack.push(WasmValue::[<from_ $to>](v as $to));
            }
        }};
    }
    // Checked float-to-int: the exclusive bounds are the nearest representable
    // values outside the target range
    macro_rules! trunc {
        ($from:ident -> $to:ident, $lo:expr, $hi:expr) => {{
            paste! {
                let v = pop!().[<as_ $from>]();
                if v.is_nan() { return Err(Trap::InvalidConversion); }
                if !(v > $lo && v < $hi) { return Err(Trap::IntegerOverflow); }
                stack.push(WasmValue::[<from_ $to>](v as $to));
            }
        }};
    }
    let memory = || inst.memory.as_ref().ok_or(Trap::MemoryOutOfBounds);
    macro_rules! load { ($offset:expr, $method:ident, $push:expr) => {{
        let addr = pop!().as_u32();
        let v = memory()?.borrow().$method(addr, $offset)?;
        stack.push(($push)(v));
    }} }
    macro_rules! store { ($offset:expr, $method:ident, $from:expr) => {{
        let raw = pop!();
        let addr = pop!().as_u32();
        memory()?.borrow_mut().$method(addr, $offset, ($from)(raw))?;
    }} }

    enter!(first, n_params, n_locals, n_results);

    loop {
        let instr = &func.body[pc];
        wasm_trace!("{:>5} {:?}", pc, instr);
        pc += 1;
        match instr {
            Instr::Unreachable => return Err(Trap::Unreachable),
            Instr::Nop => {}
            Instr::Block(bt) => {
                let (params, results) = block_arity(module, *bt);
                let end = func.block_ends[&((pc - 1) as u32)] as usize;
                labels.push(Label { height: stack.len() - params, arity: results, cont: end + 1 });
            }
            Instr::Loop(bt) => {
                consume_fuel(inst)?;
                let (params, _) = block_arity(module, *bt);
                labels.push(Label { height: stack.len() - params, arity: params, cont: pc - 1 });
            }
            Instr::If(bt) => {
                let at = (pc - 1) as u32;
                let cond = pop!().as_u32();
                let (params, results) = block_arity(module, *bt);
                let end = func.block_ends[&at] as usize;
                let label = Label { height: stack.len() - params, arity: results, cont: end + 1 };
                if cond != 0 {
                    labels.push(label);
                } else if let Some(else_pos) = func.else_at.get(&at) {
                    labels.push(label);
                    pc = *else_pos as usize + 1;
                } else {
                    pc = end + 1;
                }
            }
            // Reached only at the end of a taken `then` arm
            Instr::Else => br!(0),
            Instr::End => {
                if labels.len() == label_base {
                    do_return!();
                } else {
                    labels.pop();
                }
            }
            Instr::Br(depth) => br!(*depth),
            Instr::BrIf(depth) => {
                if pop!().as_u32() != 0 { br!(*depth); }
            }
            Instr::BrTable(targets, default) => {
                let i = pop!().as_u32() as usize;
                let depth = targets.get(i).copied().unwrap_or(*default);
                br!(depth);
            }
            Instr::Return => do_return!(),
            Instr::Call(idx) => call!(*idx),
            Instr::CallIndirect(ty) => {
                let i = pop!().as_u32();
                let table = inst.table.as_ref().ok_or(Trap::TableOutOfBounds)?;
                let target = table.borrow().get(i)?.ok_or(Trap::UninitializedElement)?;
                if target as usize >= inst.functions.len() { return Err(Trap::UninitializedElement); }
                if inst.func_signature(target) != &module.types[*ty as usize] {
                    return Err(Trap::IndirectCallTypeMismatch);
                }
                call!(target);
            }
            Instr::Drop => { pop!(); }
            Instr::Select => {
                let cond = pop!().as_u32();
                let v2 = pop!();
                let v1 = pop!();
                stack.push(if cond != 0 { v1 } else { v2 });
            }
            Instr::LocalGet(local) => {
                let v = stack[locals_base + *local as usize];
                stack.push(v);
            }
            Instr::LocalSet(local) => {
                let v = pop!();
                stack[locals_base + *local as usize] = v;
            }
            Instr::LocalTee(local) => {
                let v = match stack.last() { Some(v) => *v, None => return Err(Trap::StackUnderflow) };
                stack[locals_base + *local as usize] = v;
            }
            Instr::GlobalGet(idx) => stack.push(inst.globals[*idx as usize].raw()),
            Instr::GlobalSet(idx) => {
                let v = pop!();
                inst.globals[*idx as usize].set_raw(v);
            }
            Instr::Load(opcode, arg) => match *opcode {
                op::I32_LOAD => load!(arg.offset, load_u32, |v: u32| WasmValue::from_u32(v)),
                op::I64_LOAD => load!(arg.offset, load_u64, |v: u64| WasmValue::from_u64(v)),
                op::F32_LOAD => load!(arg.offset, load_f32, |v: f32| WasmValue::from_f32(v)),
                op::F64_LOAD => load!(arg.offset, load_f64, |v: f64| WasmValue::from_f64(v)),
                op::I32_LOAD8_S => load!(arg.offset, load_i8, |v: i8| WasmValue::from_i32(v as i32)),
                op::I32_LOAD8_U => load!(arg.offset, load_u8, |v: u8| WasmValue::from_u32(v as u32)),
                op::I32_LOAD16_S => load!(arg.offset, load_i16, |v: i16| WasmValue::from_i32(v as i32)),
                op::I32_LOAD16_U => load!(arg.offset, load_u16, |v: u16| WasmValue::from_u32(v as u32)),
                op::I64_LOAD8_S => load!(arg.offset, load_i8, |v: i8| WasmValue::from_i64(v as i64)),
                op::I64_LOAD8_U => load!(arg.offset, load_u8, |v: u8| WasmValue::from_u64(v as u64)),
                op::I64_LOAD16_S => load!(arg.offset, load_i16, |v: i16| WasmValue::from_i64(v as i64)),
                op::I64_LOAD16_U => load!(arg.offset, load_u16, |v: u16| WasmValue::from_u64(v as u64)),
                op::I64_LOAD32_S => load!(arg.offset, load_i32, |v: i32| WasmValue::from_i64(v as i64)),
                op::I64_LOAD32_U => load!(arg.offset, load_u32, |v: u32| WasmValue::from_u64(v as u64)),
                _ => return Err(Trap::Unreachable),
            },
            Instr::Store(opcode, arg) => match *opcode {
                op::I32_STORE => store!(arg.offset, store_u32, |w: WasmValue| w.as_u32()),
                op::I64_STORE => store!(arg.offset, store_u64, |w: WasmValue| w.as_u64()),
                op::F32_STORE => store!(arg.offset, store_f32, |w: WasmValue| w.as_f32()),
                op::F64_STORE => store!(arg.offset, store_f64, |w: WasmValue| w.as_f64()),
                op::I32_STORE8 | op::I64_STORE8 => store!(arg.offset, store_u8, |w: WasmValue| w.as_u64() as u8),
                op::I32_STORE16 | op::I64_STORE16 => store!(arg.offset, store_u16, |w: WasmValue| w.as_u64() as u16),
                op::I64_STORE32 => store!(arg.offset, store_u32, |w: WasmValue| w.as_u64() as u32),
                _ => return Err(Trap::Unreachable),
            },
            Instr::MemorySize => stack.push(WasmValue::from_u32(memory()?.borrow().size())),
            Instr::MemoryGrow => {
                let delta = pop!().as_u32();
                let mem = memory()?;
                let within_limit = mem.borrow().size() as u64 + delta as u64 <= limits.max_memory_pages as u64;
                let grown = if within_limit { mem.borrow_mut().grow(delta) } else { Err(Trap::OutOfMemory) };
                match grown {
                    Ok(old) => stack.push(WasmValue::from_u32(old)),
                    Err(trap) if limits.trap_on_failed_grow => return Err(trap),
                    Err(_) => stack.push(WasmValue::from_i32(-1)),
                }
            }
            Instr::I32Const(v) => stack.push(WasmValue::from_i32(*v)),
            Instr::I64Const(v) => stack.push(WasmValue::from_i64(*v)),
            Instr::F32Const(bits) => stack.push(WasmValue::from_f32_bits(*bits)),
            Instr::F64Const(bits) => stack.push(WasmValue::from_f64_bits(*bits)),
            Instr::TruncSat(sub) => match *sub {
                op::I32_TRUNC_SAT_F32_S => cast!(f32 -> i32),
                op::I32_TRUNC_SAT_F32_U => cast!(f32 -> u32),
                op::I32_TRUNC_SAT_F64_S => cast!(f64 -> i32),
                op::I32_TRUNC_SAT_F64_U => cast!(f64 -> u32),
                op::I64_TRUNC_SAT_F32_S => cast!(f32 -> i64),
                op::I64_TRUNC_SAT_F32_U => cast!(f32 -> u64),
                op::I64_TRUNC_SAT_F64_S => cast!(f64 -> i64),
                op::I64_TRUNC_SAT_F64_U => cast!(f64 -> u64),
                // validation rejects every other sub-opcode
                _ => return Err(Trap::Unreachable),
            },
            Instr::Numeric(opcode) => match *opcode {
                op::I32_EQZ => unop!(u32, |a| (a == 0) as u32),
                op::I32_EQ => relop!(u32, |a, b| a == b),
                op::I32_NE => relop!(u32, |a, b| a != b),
                op::I32_LT_S => relop!(i32, |a, b| a < b),
                op::I32_LT_U => relop!(u32, |a, b| a < b),
                op::I32_GT_S => relop!(i32, |a, b| a > b),
                op::I32_GT_U => relop!(u32, |a, b| a > b),
                op::I32_LE_S => relop!(i32, |a, b| a <= b),
                op::I32_LE_U => relop!(u32, |a, b| a <= b),
                op::I32_GE_S => relop!(i32, |a, b| a >= b),
                op::I32_GE_U => relop!(u32, |a, b| a >= b),

                op::I64_EQZ => {
                    let a = pop!().as_u64();
                    stack.push(WasmValue::from_u32((a == 0) as u32));
                }
                op::I64_EQ => relop!(u64, |a, b| a == b),
                op::I64_NE => relop!(u64, |a, b| a != b),
                op::I64_LT_S => relop!(i64, |a, b| a < b),
                op::I64_LT_U => relop!(u64, |a, b| a < b),
                op::I64_GT_S => relop!(i64, |a, b| a > b),
                op::I64_GT_U => relop!(u64, |a, b| a > b),
                op::I64_LE_S => relop!(i64, |a, b| a <= b),
                op::I64_LE_U => relop!(u64, |a, b| a <= b),
                op::I64_GE_S => relop!(i64, |a, b| a >= b),
                op::I64_GE_U => relop!(u64, |a, b| a >= b),

                op::F32_EQ => relop!(f32, |a, b| a == b),
                op::F32_NE => relop!(f32, |a, b| a != b),
                op::F32_LT => relop!(f32, |a, b| a < b),
                op::F32_GT => relop!(f32, |a, b| a > b),
                op::F32_LE => relop!(f32, |a, b| a <= b),
                op::F32_GE => relop!(f32, |a, b| a >= b),

                op::F64_EQ => relop!(f64, |a, b| a == b),
                op::F64_NE => relop!(f64, |a, b| a != b),
                op::F64_LT => relop!(f64, |a, b| a < b),
                op::F64_GT => relop!(f64, |a, b| a > b),
                op::F64_LE => relop!(f64, |a, b| a <= b),
                op::F64_GE => relop!(f64, |a, b| a >= b),

                op::I32_CLZ => unop!(u32, |a| a.leading_zeros()),
                op::I32_CTZ => unop!(u32, |a| a.trailing_zeros()),
                op::I32_POPCNT => unop!(u32, |a| a.count_ones()),
                op::I32_ADD => binop!(u32, |a, b| a.wrapping_add(b)),
                op::I32_SUB => binop!(u32, |a, b| a.wrapping_sub(b)),
                op::I32_MUL => binop!(u32, |a, b| a.wrapping_mul(b)),
                op::I32_DIV_S => divop!(i32, wrapping_div),
                op::I32_DIV_U => divop!(u32, wrapping_div),
                op::I32_REM_S => divop!(i32, wrapping_rem),
                op::I32_REM_U => divop!(u32, wrapping_rem),
                op::I32_AND => binop!(u32, |a, b| a & b),
                op::I32_OR => binop!(u32, |a, b| a | b),
                op::I32_XOR => binop!(u32, |a, b| a ^ b),
                // wrapping shifts take the count modulo the bit width
                op::I32_SHL => binop!(u32, |a, b| a.wrapping_shl(b)),
                op::I32_SHR_S => binop!(i32, |a, b| a.wrapping_shr(b as u32)),
                op::I32_SHR_U => binop!(u32, |a, b| a.wrapping_shr(b)),
                op::I32_ROTL => binop!(u32, |a, b| a.rotate_left(b)),
                op::I32_ROTR => binop!(u32, |a, b| a.rotate_right(b)),

                op::I64_CLZ => unop!(u64, |a| a.leading_zeros() as u64),
                op::I64_CTZ => unop!(u64, |a| a.trailing_zeros() as u64),
                op::I64_POPCNT => unop!(u64, |a| a.count_ones() as u64),
                op::I64_ADD => binop!(u64, |a, b| a.wrapping_add(b)),
                op::I64_SUB => binop!(u64, |a, b| a.wrapping_sub(b)),
                op::I64_MUL => binop!(u64, |a, b| a.wrapping_mul(b)),
                op::I64_DIV_S => divop!(i64, wrapping_div),
                op::I64_DIV_U => divop!(u64, wrapping_div),
                op::I64_REM_S => divop!(i64, wrapping_rem),
                op::I64_REM_U => divop!(u64, wrapping_rem),
                op::I64_AND => binop!(u64, |a, b| a & b),
                op::I64_OR => binop!(u64, |a, b| a | b),
                op::I64_XOR => binop!(u64, |a, b| a ^ b),
                op::I64_SHL => binop!(u64, |a, b| a.wrapping_shl(b as u32)),
                op::I64_SHR_S => binop!(i64, |a, b| a.wrapping_shr(b as u32)),
                op::I64_SHR_U => binop!(u64, |a, b| a.wrapping_shr(b as u32)),
                op::I64_ROTL => binop!(u64, |a, b| a.rotate_left(b as u32)),
                op::I64_ROTR => binop!(u64, |a, b| a.rotate_right(b as u32)),

                op::F32_ABS => unop!(f32, |a| a.abs()),
                op::F32_NEG => unop!(f32, |a| -a),
                op::F32_CEIL => unop!(f32, |a| a.ceil()),
                op::F32_FLOOR => unop!(f32, |a| a.floor()),
                op::F32_TRUNC => unop!(f32, |a| a.trunc()),
                op::F32_NEAREST => unop!(f32, |a| f32_nearest(a)),
                op::F32_SQRT => unop!(f32, |a| a.sqrt()),
                op::F32_ADD => binop!(f32, |a, b| a + b),
                op::F32_SUB => binop!(f32, |a, b| a - b),
                op::F32_MUL => binop!(f32, |a, b| a * b),
                op::F32_DIV => binop!(f32, |a, b| a / b),
                op::F32_MIN => binop!(f32, |a, b| f32_min(a, b)),
                op::F32_MAX => binop!(f32, |a, b| f32_max(a, b)),
                op::F32_COPYSIGN => binop!(f32, |a, b| a.copysign(b)),

                op::F64_ABS => unop!(f64, |a| a.abs()),
                op::F64_NEG => unop!(f64, |a| -a),
                op::F64_CEIL => unop!(f64, |a| a.ceil()),
                op::F64_FLOOR => unop!(f64, |a| a.floor()),
                op::F64_TRUNC => unop!(f64, |a| a.trunc()),
                op::F64_NEAREST => unop!(f64, |a| f64_nearest(a)),
                op::F64_SQRT => unop!(f64, |a| a.sqrt()),
                op::F64_ADD => binop!(f64, |a, b| a + b),
                op::F64_SUB => binop!(f64, |a, b| a - b),
                op::F64_MUL => binop!(f64, |a, b| a * b),
                op::F64_DIV => binop!(f64, |a, b| a / b),
                op::F64_MIN => binop!(f64, |a, b| f64_min(a, b)),
                op::F64_MAX => binop!(f64, |a, b| f64_max(a, b)),
                op::F64_COPYSIGN => binop!(f64, |a, b| a.copysign(b)),

                op::I32_WRAP_I64 => cast!(u64 -> u32),
                op::I32_TRUNC_F32_S => trunc!(f32 -> i32, -2147483904.0, 2147483648.0),
                op::I32_TRUNC_F32_U => trunc!(f32 -> u32, -1.0, 4294967296.0),
                op::I32_TRUNC_F64_S => trunc!(f64 -> i32, -2147483649.0, 2147483648.0),
                op::I32_TRUNC_F64_U => trunc!(f64 -> u32, -1.0, 4294967296.0),
                op::I64_EXTEND_I32_S => cast!(i32 -> i64),
                op::I64_EXTEND_I32_U => cast!(u32 -> u64),
                op::I64_TRUNC_F32_S => trunc!(f32 -> i64, -9223373136366403584.0, 9223372036854775808.0),
                op::I64_TRUNC_F32_U => trunc!(f32 -> u64, -1.0, 18446744073709551616.0),
                op::I64_TRUNC_F64_S => trunc!(f64 -> i64, -9223372036854777856.0, 9223372036854775808.0),
                op::I64_TRUNC_F64_U => trunc!(f64 -> u64, -1.0, 18446744073709551616.0),
                op::F32_CONVERT_I32_S => cast!(i32 -> f32),
                op::F32_CONVERT_I32_U => cast!(u32 -> f32),
                op::F32_CONVERT_I64_S => cast!(i64 -> f32),
                op::F32_CONVERT_I64_U => cast!(u64 -> f32),
                op::F32_DEMOTE_F64 => cast!(f64 -> f32),
                op::F64_CONVERT_I32_S => cast!(i32 -> f64),
                op::F64_CONVERT_I32_U => cast!(u32 -> f64),
                op::F64_CONVERT_I64_S => cast!(i64 -> f64),
                op::F64_CONVERT_I64_U => cast!(u64 -> f64),
                op::F64_PROMOTE_F32 => cast!(f32 -> f64),
                // values are stored as raw bits already
                op::I32_REINTERPRET_F32 | op::I64_REINTERPRET_F64
                | op::F32_REINTERPRET_I32 | op::F64_REINTERPRET_I64 => {}

                op::I32_EXTEND8_S => unop!(i32, |a| a as i8 as i32),
                op::I32_EXTEND16_S => unop!(i32, |a| a as i16 as i32),
                op::I64_EXTEND8_S => unop!(i64, |a| a as i8 as i64),
                op::I64_EXTEND16_S => unop!(i64, |a| a as i16 as i64),
                op::I64_EXTEND32_S => unop!(i64, |a| a as i32 as i64),
                // validation rejects opcodes without a numeric signature
                _ => return Err(Trap::Unreachable),
            },
        }
    }
}

//! Textual IR serializer
//!
//! Renders a [`Module`] into a deterministic, human-readable dump used for
//! debugging and golden tests. Determinism matters more than beauty here:
//! two serializations of the same module are byte-identical, so tests can
//! compare output directly.
//!
//! The layout follows the usual assembly shape: a module header as comments,
//! optional type-definition and global sections, then one `define` per
//! function with labeled blocks and two-space-indented instructions.

use crate::ir::{BasicBlock, Function, Instruction, Module, Op, Register, Terminator};

/// Serialize a whole module.
pub fn serialize_module(module: &Module) -> String {
    let mut out = String::new();
    out.push_str(&format!("; Module: {}\n", module.name));
    out.push_str(&format!("; Source: {}\n", module.source_file));

    if !module.type_defs.is_empty() {
        out.push('\n');
        for def in &module.type_defs {
            out.push_str(&format!("%{} = type {}\n", def.name, def.ty));
        }
    }

    if !module.globals.is_empty() {
        out.push('\n');
        for global in &module.globals {
            out.push_str(&format!("@{} = global {}\n", global.name, global.ty));
        }
    }

    for func in &module.functions {
        out.push('\n');
        serialize_function(func, &mut out);
    }
    out
}

/// Serialize one function into `out`.
pub fn serialize_function(func: &Function, out: &mut String) {
    let export = if func.is_exported { "export " } else { "" };
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} %{}", p.ty, p.name))
        .collect();
    out.push_str(&format!(
        "define {}{} @{}({}) {{\n",
        export,
        func.return_type,
        func.name,
        params.join(", ")
    ));
    for block in &func.blocks {
        serialize_block(func, block, out);
    }
    out.push_str("}\n");
}

fn serialize_block(func: &Function, block: &BasicBlock, out: &mut String) {
    out.push_str(&format!("{}:\n", block.label));
    for instr in &block.instructions {
        out.push_str("  ");
        serialize_instruction(func, instr, out);
        out.push('\n');
    }
    if let Some(term) = &block.terminator {
        out.push_str(&format!("  {}\n", render_terminator(func, term)));
    }
}

fn serialize_instruction(func: &Function, instr: &Instruction, out: &mut String) {
    if let Some(result) = &instr.result {
        out.push_str(&format!("{} = ", reg(result)));
    }
    out.push_str(&render_op(func, &instr.op));
}

fn reg(r: &Register) -> String {
    format!("%{}", r.id)
}

fn regs(list: &[Register]) -> String {
    list.iter().map(reg).collect::<Vec<_>>().join(", ")
}

fn label(func: &Function, block: crate::ir::BlockId) -> String {
    func.blocks[block.0].label.clone()
}

fn render_op(func: &Function, op: &Op) -> String {
    match op {
        Op::Add { lhs, rhs } => format!("add {}, {}", reg(lhs), reg(rhs)),
        Op::Sub { lhs, rhs } => format!("sub {}, {}", reg(lhs), reg(rhs)),
        Op::Mul { lhs, rhs } => format!("mul {}, {}", reg(lhs), reg(rhs)),
        Op::Div { lhs, rhs } => format!("div {}, {}", reg(lhs), reg(rhs)),
        Op::Mod { lhs, rhs } => format!("mod {}, {}", reg(lhs), reg(rhs)),
        Op::Pow { lhs, rhs } => format!("pow {}, {}", reg(lhs), reg(rhs)),
        Op::Neg { value } => format!("neg {}", reg(value)),

        Op::BitAnd { lhs, rhs } | Op::And { lhs, rhs } => {
            format!("and {}, {}", reg(lhs), reg(rhs))
        }
        Op::BitOr { lhs, rhs } | Op::Or { lhs, rhs } => {
            format!("or {}, {}", reg(lhs), reg(rhs))
        }
        Op::BitXor { lhs, rhs } => format!("xor {}, {}", reg(lhs), reg(rhs)),
        Op::Shl { lhs, rhs } => format!("shl {}, {}", reg(lhs), reg(rhs)),
        Op::Shr { lhs, rhs } => format!("shr {}, {}", reg(lhs), reg(rhs)),
        Op::BitNot { value } | Op::Not { value } => format!("not {}", reg(value)),

        Op::Eq { lhs, rhs } => format!("eq {}, {}", reg(lhs), reg(rhs)),
        Op::Ne { lhs, rhs } => format!("ne {}, {}", reg(lhs), reg(rhs)),
        Op::Lt { lhs, rhs } => format!("lt {}, {}", reg(lhs), reg(rhs)),
        Op::Le { lhs, rhs } => format!("le {}, {}", reg(lhs), reg(rhs)),
        Op::Gt { lhs, rhs } => format!("gt {}, {}", reg(lhs), reg(rhs)),
        Op::Ge { lhs, rhs } => format!("ge {}, {}", reg(lhs), reg(rhs)),
        Op::Identical { lhs, rhs } => format!("identical {}, {}", reg(lhs), reg(rhs)),
        Op::NotIdentical { lhs, rhs } => {
            format!("not_identical {}, {}", reg(lhs), reg(rhs))
        }
        Op::Spaceship { lhs, rhs } => format!("spaceship {}, {}", reg(lhs), reg(rhs)),

        Op::Alloca { ty, count } => format!("alloca {}, count={}", ty, count),
        Op::Load { ptr, ty } => format!("load {}, {}", ty, reg(ptr)),
        Op::Store { ptr, value } => format!("store {} <- {}", reg(ptr), reg(value)),

        Op::ConstInt(v) => format!("const.i64 {}", v),
        Op::ConstFloat(v) => format!("const.f64 {:?}", v),
        Op::ConstBool(v) => format!("const.bool {}", v),
        Op::ConstString(id) => format!("const.string ${}", id.0),
        Op::ConstNull => "const.null".to_string(),

        Op::Call {
            func_name,
            args,
            return_type,
        } => format!("call @{}({}) : {}", func_name, regs(args), return_type),
        Op::CallIndirect {
            func_ptr,
            args,
            return_type,
        } => format!(
            "call_indirect {}({}) : {}",
            reg(func_ptr),
            regs(args),
            return_type
        ),

        Op::Cast { value, from, to } => format!("cast {} : {} -> {}", reg(value), from, to),
        Op::TypeCheck { value, expected } => format!("type_check {}, {}", reg(value), expected),
        Op::GetType { value } => format!("get_type {}", reg(value)),

        Op::ArrayNew { capacity } => format!("array.new capacity={}", capacity),
        Op::ArrayGet { array, key } => format!("array.get {}, {}", reg(array), reg(key)),
        Op::ArraySet { array, key, value } => {
            format!("array.set {}, {} <- {}", reg(array), reg(key), reg(value))
        }
        Op::ArrayPush { array, value } => {
            format!("array.push {} <- {}", reg(array), reg(value))
        }
        Op::ArrayCount { array } => format!("array.count {}", reg(array)),
        Op::ArrayKeyExists { array, key } => {
            format!("array.key_exists {}, {}", reg(array), reg(key))
        }
        Op::ArrayUnset { array, key } => format!("array.unset {}, {}", reg(array), reg(key)),

        Op::Concat { lhs, rhs } => format!("concat {}, {}", reg(lhs), reg(rhs)),
        Op::Strlen { value } => format!("strlen {}", reg(value)),
        Op::Interpolate { parts } => format!("interpolate {}", regs(parts)),

        Op::NewObject { class, args } => format!("new {}({})", class, regs(args)),
        Op::PropertyGet { object, name } => format!("property.get {}, {}", reg(object), name),
        Op::PropertySet {
            object,
            name,
            value,
        } => format!("property.set {}, {} <- {}", reg(object), name, reg(value)),
        Op::MethodCall { object, name, args } => {
            format!("method.call {}, {}({})", reg(object), name, regs(args))
        }
        Op::Clone { object } => format!("clone {}", reg(object)),
        Op::Instanceof { object, class } => format!("instanceof {}, {}", reg(object), class),

        Op::Box { value, from } => format!("box {} : {}", reg(value), from),
        Op::Unbox { value, to } => format!("unbox {} : {}", reg(value), to),
        Op::Retain { value } => format!("retain {}", reg(value)),
        Op::Release { value } => format!("release {}", reg(value)),

        Op::Phi { incoming } => {
            let parts: Vec<String> = incoming
                .iter()
                .map(|(r, b)| format!("[{}, {}]", reg(r), label(func, *b)))
                .collect();
            format!("phi {}", parts.join(", "))
        }
        Op::Select {
            cond,
            then_value,
            else_value,
        } => format!(
            "select {}, {}, {}",
            reg(cond),
            reg(then_value),
            reg(else_value)
        ),

        Op::TryBegin => "try.begin".to_string(),
        Op::TryEnd => "try.end".to_string(),
        Op::Catch { class } => match class {
            Some(name) => format!("catch {}", name),
            None => "catch".to_string(),
        },
        Op::GetException => "get_exception".to_string(),
        Op::ClearException => "clear_exception".to_string(),

        Op::DebugPrint { value } => format!("debug.print {}", reg(value)),
    }
}

fn render_terminator(func: &Function, term: &Terminator) -> String {
    match term {
        Terminator::Ret(None) => "ret".to_string(),
        Terminator::Ret(Some(value)) => format!("ret {}", reg(value)),
        Terminator::Br(target) => format!("br {}", label(func, *target)),
        Terminator::CondBr {
            cond,
            then_block,
            else_block,
        } => format!(
            "br {}, {}, {}",
            reg(cond),
            label(func, *then_block),
            label(func, *else_block)
        ),
        Terminator::Switch {
            value,
            cases,
            default,
        } => {
            let parts: Vec<String> = cases
                .iter()
                .map(|(v, b)| format!("{} -> {}", v, label(func, *b)))
                .collect();
            format!(
                "switch {}, [{}], default {}",
                reg(value),
                parts.join(", "),
                label(func, *default)
            )
        }
        Terminator::Unreachable => "unreachable".to_string(),
        Terminator::Throw(value) => format!("throw {}", reg(value)),
    }
}

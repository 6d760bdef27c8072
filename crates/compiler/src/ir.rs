//! SSA intermediate representation
//!
//! The in-memory IR the builder produces and the native backend consumes.
//! Ownership is strictly tree-shaped: a [`Module`] owns its functions,
//! globals, type definitions and string table; a [`Function`] owns its
//! blocks; a [`BasicBlock`] owns its instructions. Cross-references that
//! would form cycles (block predecessors/successors) are [`BlockId`] index
//! handles into the owning function's block list, never pointers.
//!
//! Registers are SSA values: each value-producing instruction defines a
//! fresh register, identified by a per-function counter. A register's type
//! is a *view*; two registers with the same id are the same value even when
//! read through different typed views.

use crate::ast::{SourceLocation, StringId, StringTable};
use crate::types::IrType;
use std::collections::HashSet;

/// Index handle of a block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// A virtual register: the value produced by one instruction.
///
/// Identity is the `id` alone; `ty` is the type view at the producing site.
#[derive(Debug, Clone)]
pub struct Register {
    pub id: u32,
    pub ty: IrType,
}

impl PartialEq for Register {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Register {}

impl std::hash::Hash for Register {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The operation of one instruction, with its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // Arithmetic
    Add { lhs: Register, rhs: Register },
    Sub { lhs: Register, rhs: Register },
    Mul { lhs: Register, rhs: Register },
    Div { lhs: Register, rhs: Register },
    Mod { lhs: Register, rhs: Register },
    Pow { lhs: Register, rhs: Register },
    Neg { value: Register },

    // Bitwise
    BitAnd { lhs: Register, rhs: Register },
    BitOr { lhs: Register, rhs: Register },
    BitXor { lhs: Register, rhs: Register },
    Shl { lhs: Register, rhs: Register },
    Shr { lhs: Register, rhs: Register },
    BitNot { value: Register },

    // Comparison
    Eq { lhs: Register, rhs: Register },
    Ne { lhs: Register, rhs: Register },
    Lt { lhs: Register, rhs: Register },
    Le { lhs: Register, rhs: Register },
    Gt { lhs: Register, rhs: Register },
    Ge { lhs: Register, rhs: Register },
    Identical { lhs: Register, rhs: Register },
    NotIdentical { lhs: Register, rhs: Register },
    /// `<=>`: result is -1, 0 or 1 as an i64.
    Spaceship { lhs: Register, rhs: Register },

    // Logical
    And { lhs: Register, rhs: Register },
    Or { lhs: Register, rhs: Register },
    Not { value: Register },

    // Memory
    Alloca { ty: IrType, count: u32 },
    Load { ptr: Register, ty: IrType },
    Store { ptr: Register, value: Register },

    // Constants
    ConstInt(i64),
    ConstFloat(f64),
    ConstBool(bool),
    ConstString(StringId),
    ConstNull,

    // Calls
    Call {
        func_name: String,
        args: Vec<Register>,
        return_type: IrType,
    },
    CallIndirect {
        func_ptr: Register,
        args: Vec<Register>,
        return_type: IrType,
    },

    // Type operations
    Cast {
        value: Register,
        from: IrType,
        to: IrType,
    },
    TypeCheck { value: Register, expected: IrType },
    GetType { value: Register },

    // Arrays
    ArrayNew { capacity: u32 },
    ArrayGet { array: Register, key: Register },
    ArraySet {
        array: Register,
        key: Register,
        value: Register,
    },
    ArrayPush { array: Register, value: Register },
    ArrayCount { array: Register },
    ArrayKeyExists { array: Register, key: Register },
    ArrayUnset { array: Register, key: Register },

    // Strings
    Concat { lhs: Register, rhs: Register },
    Strlen { value: Register },
    Interpolate { parts: Vec<Register> },

    // Objects
    NewObject { class: String, args: Vec<Register> },
    PropertyGet { object: Register, name: String },
    PropertySet {
        object: Register,
        name: String,
        value: Register,
    },
    MethodCall {
        object: Register,
        name: String,
        args: Vec<Register>,
    },
    Clone { object: Register },
    Instanceof { object: Register, class: String },

    // Boxed-value operations
    Box { value: Register, from: IrType },
    Unbox { value: Register, to: IrType },
    Retain { value: Register },
    Release { value: Register },

    // Control helpers
    Phi { incoming: Vec<(Register, BlockId)> },
    Select {
        cond: Register,
        then_value: Register,
        else_value: Register,
    },

    // Exceptions
    TryBegin,
    TryEnd,
    Catch { class: Option<String> },
    GetException,
    ClearException,

    // Debugging
    DebugPrint { value: Register },
}

impl Op {
    /// Void ops never carry a result register.
    pub fn is_void(&self) -> bool {
        match self {
            Op::Store { .. }
            | Op::ArraySet { .. }
            | Op::ArrayPush { .. }
            | Op::ArrayUnset { .. }
            | Op::PropertySet { .. }
            | Op::Retain { .. }
            | Op::Release { .. }
            | Op::TryBegin
            | Op::TryEnd
            | Op::Catch { .. }
            | Op::ClearException
            | Op::DebugPrint { .. } => true,
            Op::Call { return_type, .. } | Op::CallIndirect { return_type, .. } => {
                return_type.is_void()
            }
            _ => false,
        }
    }
}

/// Final instruction of a block; transfers control.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<Register>),
    Br(BlockId),
    CondBr {
        cond: Register,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: Register,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Unreachable,
    Throw(Register),
}

impl Terminator {
    /// Blocks this terminator can transfer control to.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Ret(_) | Terminator::Unreachable | Terminator::Throw(_) => Vec::new(),
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut targets: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                targets.push(*default);
                targets
            }
        }
    }
}

/// One IR instruction. `result` is absent exactly when the op is void.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<Register>,
    pub op: Op,
    pub location: SourceLocation,
}

/// A straight-line instruction sequence ended by one terminator.
///
/// An absent terminator is an intermediate construction state; finalized
/// functions have one per block.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

impl BasicBlock {
    fn new(label: String) -> Self {
        BasicBlock {
            label,
            instructions: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// A function parameter. Parameters occupy the first register ids of the
/// function, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: IrType,
    pub blocks: Vec<BasicBlock>,
    pub is_exported: bool,
    pub is_method: bool,
    pub class_name: Option<String>,
    pub location: SourceLocation,
    pub next_register_id: u32,
}

impl Function {
    /// Create a function. Registers `0..params.len()` are reserved for the
    /// parameters; instruction results start after them.
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        return_type: IrType,
        location: SourceLocation,
    ) -> Self {
        let next_register_id = params.len() as u32;
        Function {
            name: name.into(),
            params,
            return_type,
            blocks: Vec::new(),
            is_exported: false,
            is_method: false,
            class_name: None,
            location,
            next_register_id,
        }
    }

    /// The register bound to parameter `index`.
    pub fn param_register(&self, index: usize) -> Register {
        Register {
            id: index as u32,
            ty: self.params[index].ty.clone(),
        }
    }

    /// Allocate a fresh register of the given type. No storage is involved;
    /// this only advances the counter.
    pub fn new_register(&mut self, ty: IrType) -> Register {
        let id = self.next_register_id;
        self.next_register_id += 1;
        Register { id, ty }
    }

    /// Append an empty block. Creation does not reposition any cursor; the
    /// builder decides where instructions go.
    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(label.into()));
        BlockId(self.blocks.len() - 1)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// Record an explicit control-flow edge (used for exception edges which
    /// no terminator expresses).
    pub fn link(&mut self, pred: BlockId, succ: BlockId) {
        if !self.blocks[pred.0].successors.contains(&succ) {
            self.blocks[pred.0].successors.push(succ);
        }
        if !self.blocks[succ.0].predecessors.contains(&pred) {
            self.blocks[succ.0].predecessors.push(pred);
        }
    }

    /// Set the terminator of `block` and wire the edges it implies.
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        for target in terminator.targets() {
            self.link(block, target);
        }
        self.blocks[block.0].terminator = Some(terminator);
    }

    /// Drop the most recently added block. Only legal while nothing
    /// references it; the builder uses this for merge blocks that turned out
    /// to have no predecessors.
    pub fn pop_unreferenced_block(&mut self, id: BlockId) -> bool {
        if id.0 == self.blocks.len() - 1 && self.blocks[id.0].predecessors.is_empty() {
            self.blocks.pop();
            true
        } else {
            false
        }
    }
}

/// A module-level variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
}

/// A named type alias emitted for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub ty: IrType,
}

/// The unit of compilation handed to the backend.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub source_file: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub type_defs: Vec<TypeDef>,
    pub strings: StringTable,
}

impl Module {
    pub fn new(name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            source_file: source_file.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            type_defs: Vec::new(),
            strings: StringTable::new(),
        }
    }

    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }
}

/// Check the structural SSA contract of a finalized function: every block
/// terminated, every register defined by exactly one instruction, the
/// defined ids contiguous from the parameter registers up to the counter,
/// and phi incomings only from predecessors.
///
/// Returns every violation found, so a broken builder surfaces all of its
/// problems at once instead of the first.
pub fn verify_function(func: &Function) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    let mut defined: HashSet<u32> = HashSet::new();
    let param_count = func.params.len() as u32;

    for block in &func.blocks {
        if block.terminator.is_none() {
            problems.push(format!(
                "{}: block '{}' has no terminator",
                func.name, block.label
            ));
        }
        for instr in &block.instructions {
            match (&instr.result, instr.op.is_void()) {
                (Some(_), true) => problems.push(format!(
                    "{}: void op in '{}' carries a result",
                    func.name, block.label
                )),
                (None, false) => problems.push(format!(
                    "{}: value op in '{}' has no result",
                    func.name, block.label
                )),
                _ => {}
            }
            if let Some(result) = &instr.result {
                if result.id < param_count {
                    problems.push(format!(
                        "{}: register %{} in '{}' collides with a parameter",
                        func.name, result.id, block.label
                    ));
                } else if !defined.insert(result.id) {
                    problems.push(format!(
                        "{}: register %{} is defined more than once ('{}')",
                        func.name, result.id, block.label
                    ));
                } else if result.id >= func.next_register_id {
                    problems.push(format!(
                        "{}: register %{} in '{}' is past the counter ({})",
                        func.name, result.id, block.label, func.next_register_id
                    ));
                }
            }
            if let Op::Phi { incoming } = &instr.op {
                for (_, pred) in incoming {
                    if !block.predecessors.contains(pred) {
                        problems.push(format!(
                            "{}: phi in '{}' references non-predecessor block {}",
                            func.name, block.label, pred.0
                        ));
                    }
                }
            }
        }
        for succ in &block.successors {
            if succ.0 >= func.blocks.len() {
                problems.push(format!(
                    "{}: block '{}' links to out-of-range block {}",
                    func.name, block.label, succ.0
                ));
            }
        }
    }

    // contiguity: in-range ids were each defined exactly once, so the count
    // settles whether any id was skipped
    let expected = (func.next_register_id - param_count) as usize;
    if defined.len() != expected {
        problems.push(format!(
            "{}: {} registers defined but the counter allocated {}",
            func.name,
            defined.len(),
            expected
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("test.php", 1, 1, 1)
    }

    fn sample_function() -> Function {
        let mut f = Function::new("f", Vec::new(), IrType::I64, loc());
        let entry = f.add_block("entry");
        let r0 = f.new_register(IrType::I64);
        f.block_mut(entry).instructions.push(Instruction {
            result: Some(r0.clone()),
            op: Op::ConstInt(30),
            location: loc(),
        });
        f.terminate(entry, Terminator::Ret(Some(r0)));
        f
    }

    #[test]
    fn test_register_identity_ignores_type_view() {
        let a = Register {
            id: 3,
            ty: IrType::I64,
        };
        let b = Register {
            id: 3,
            ty: IrType::PhpValue,
        };
        let c = Register {
            id: 4,
            ty: IrType::I64,
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_register_allocation_is_contiguous() {
        let mut f = Function::new(
            "f",
            vec![Param {
                name: "a".to_string(),
                ty: IrType::I64,
            }],
            IrType::Void,
            loc(),
        );
        assert_eq!(f.param_register(0).id, 0);
        assert_eq!(f.new_register(IrType::I64).id, 1);
        assert_eq!(f.new_register(IrType::F64).id, 2);
    }

    #[test]
    fn test_terminate_wires_edges() {
        let mut f = Function::new("f", Vec::new(), IrType::Void, loc());
        let entry = f.add_block("entry");
        let then_bb = f.add_block("then");
        let else_bb = f.add_block("else");
        let cond = f.new_register(IrType::Bool);
        f.block_mut(entry).instructions.push(Instruction {
            result: Some(cond.clone()),
            op: Op::ConstBool(true),
            location: loc(),
        });
        f.terminate(
            entry,
            Terminator::CondBr {
                cond,
                then_block: then_bb,
                else_block: else_bb,
            },
        );

        assert_eq!(f.block(entry).successors, vec![then_bb, else_bb]);
        assert_eq!(f.block(then_bb).predecessors, vec![entry]);
        assert_eq!(f.block(else_bb).predecessors, vec![entry]);
    }

    #[test]
    fn test_switch_targets() {
        let t = Terminator::Switch {
            value: Register {
                id: 0,
                ty: IrType::I64,
            },
            cases: vec![(1, BlockId(1)), (2, BlockId(2))],
            default: BlockId(3),
        };
        assert_eq!(t.targets(), vec![BlockId(1), BlockId(2), BlockId(3)]);
        assert_eq!(Terminator::Ret(None).targets(), Vec::new());
    }

    #[test]
    fn test_pop_unreferenced_block() {
        let mut f = Function::new("f", Vec::new(), IrType::Void, loc());
        let entry = f.add_block("entry");
        let merge = f.add_block("merge");
        assert!(f.pop_unreferenced_block(merge));
        assert_eq!(f.blocks.len(), 1);

        // a referenced block stays
        let merge2 = f.add_block("merge");
        f.terminate(entry, Terminator::Br(merge2));
        assert!(!f.pop_unreferenced_block(merge2));
    }

    #[test]
    fn test_verify_accepts_well_formed() {
        assert!(verify_function(&sample_function()).is_ok());
    }

    #[test]
    fn test_verify_rejects_missing_terminator() {
        let mut f = Function::new("f", Vec::new(), IrType::Void, loc());
        f.add_block("entry");
        let problems = verify_function(&f).unwrap_err();
        assert!(problems[0].contains("no terminator"));
    }

    #[test]
    fn test_verify_rejects_duplicate_definition() {
        let mut f = sample_function();
        // re-define %0 in the same block
        let dup = Register {
            id: 0,
            ty: IrType::I64,
        };
        f.block_mut(BlockId(0)).instructions.push(Instruction {
            result: Some(dup),
            op: Op::ConstInt(1),
            location: loc(),
        });
        let problems = verify_function(&f).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("defined more than once")));
    }

    #[test]
    fn test_verify_rejects_void_result_mismatch() {
        let mut f = sample_function();
        let r = Register {
            id: 1,
            ty: IrType::PhpValue,
        };
        f.block_mut(BlockId(0)).instructions.push(Instruction {
            result: Some(r.clone()),
            op: Op::Release { value: r },
            location: loc(),
        });
        let problems = verify_function(&f).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("void op")));
    }

    #[test]
    fn test_verify_rejects_phi_from_non_predecessor() {
        let mut f = Function::new("f", Vec::new(), IrType::I64, loc());
        let entry = f.add_block("entry");
        let merge = f.add_block("merge");
        let r0 = f.new_register(IrType::I64);
        f.block_mut(entry).instructions.push(Instruction {
            result: Some(r0.clone()),
            op: Op::ConstInt(1),
            location: loc(),
        });
        f.terminate(entry, Terminator::Br(merge));
        let r1 = f.new_register(IrType::I64);
        f.block_mut(merge).instructions.push(Instruction {
            result: Some(r1.clone()),
            op: Op::Phi {
                incoming: vec![(r0, BlockId(5))],
            },
            location: loc(),
        });
        f.terminate(merge, Terminator::Ret(Some(r1)));
        let problems = verify_function(&f).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("non-predecessor")));
    }

    #[test]
    fn test_call_result_follows_return_type() {
        let call_void = Op::Call {
            func_name: "php_echo".to_string(),
            args: Vec::new(),
            return_type: IrType::Void,
        };
        let call_val = Op::Call {
            func_name: "php_array_count".to_string(),
            args: Vec::new(),
            return_type: IrType::I64,
        };
        assert!(call_void.is_void());
        assert!(!call_val.is_void());
    }
}

//! Expression lowering
//!
//! Every expression lowers to a register holding its value. Constant-only
//! subexpressions are folded first (see `fold.rs`); everything else lowers
//! operands recursively and emits the matching op. Semantic problems
//! produce a diagnostic and a synthetic `const.null` so lowering continues.

use super::IrBuilder;
use crate::CompileError;
use crate::ast::{
    ArrayElement, BinaryOp, NodeId, NodeKind, PostfixOp, SourceLocation, StringId, UnaryOp,
};
use crate::ir::{Op, Register};
use crate::types::IrType;
use tracing::debug;

impl IrBuilder<'_> {
    pub(super) fn lower_expr(&mut self, node: NodeId) -> Result<Register, CompileError> {
        self.ensure_open();
        let n = self.node(node)?;
        let loc = n.location.clone();
        match &n.kind {
            NodeKind::LiteralInt(v) => Ok(self.emit(Op::ConstInt(*v), IrType::I64, loc)),
            NodeKind::LiteralFloat(v) => Ok(self.emit(Op::ConstFloat(*v), IrType::F64, loc)),
            NodeKind::LiteralBool(v) => Ok(self.emit(Op::ConstBool(*v), IrType::Bool, loc)),
            NodeKind::LiteralNull => Ok(self.emit(Op::ConstNull, IrType::PhpValue, loc)),
            NodeKind::LiteralString(sid) => {
                let s = self.str_of(*sid)?;
                let id = self.module.intern_string(s);
                Ok(self.emit(Op::ConstString(id), IrType::PhpString, loc))
            }

            NodeKind::Variable(sid) => {
                let name = self.str_of(*sid)?;
                match self.lookup_var(name) {
                    Some(reg) => Ok(reg),
                    None => Ok(self.undefined_variable(name, &loc)),
                }
            }

            NodeKind::Assign { target, value } => self.lower_assign(*target, *value, &loc),

            NodeKind::Binary { op, lhs, rhs } => self.lower_binary(node, *op, *lhs, *rhs, &loc),
            NodeKind::Unary { op, operand } => self.lower_unary(node, *op, *operand, &loc),
            NodeKind::Postfix { op, target } => self.lower_postfix(*op, *target, &loc),

            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond = self.lower_expr(*condition)?;
                let then_value = self.lower_expr(*then_expr)?;
                let else_value = self.lower_expr(*else_expr)?;
                let ty = self.infer_type(node).to_ir_type();
                Ok(self.emit(
                    Op::Select {
                        cond,
                        then_value,
                        else_value,
                    },
                    ty,
                    loc,
                ))
            }

            NodeKind::Call { name, args } => {
                let args = args.clone();
                match self.lower_call_common(node, *name, &args, &loc)? {
                    Some(reg) => Ok(reg),
                    None => {
                        // a void or never call used as a value
                        let inferred = self.infer_type(node);
                        self.warn_never_use(&inferred, &loc);
                        Ok(self.emit(Op::ConstNull, IrType::PhpValue, loc))
                    }
                }
            }

            NodeKind::MethodCall {
                object,
                method,
                args,
            } => {
                let args = args.clone();
                let name = self.str_of(*method)?.to_string();
                let obj = self.lower_expr(*object)?;
                let arg_regs = self.lower_args(&args)?;
                Ok(self.emit(
                    Op::MethodCall {
                        object: obj,
                        name,
                        args: arg_regs,
                    },
                    IrType::PhpValue,
                    loc,
                ))
            }

            NodeKind::StaticCall {
                class,
                method,
                args,
            } => {
                let args = args.clone();
                let func_name =
                    format!("{}::{}", self.str_of(*class)?, self.str_of(*method)?);
                let arg_regs = self.lower_args(&args)?;
                Ok(self.emit(
                    Op::Call {
                        func_name,
                        args: arg_regs,
                        return_type: IrType::PhpValue,
                    },
                    IrType::PhpValue,
                    loc,
                ))
            }

            NodeKind::PropertyAccess { object, property } => {
                let name = self.str_of(*property)?.to_string();
                let obj = self.lower_expr(*object)?;
                Ok(self.emit(
                    Op::PropertyGet { object: obj, name },
                    IrType::PhpValue,
                    loc,
                ))
            }

            NodeKind::ArrayAccess { array, index } => {
                let arr = self.lower_expr(*array)?;
                let key = self.lower_expr(*index)?;
                Ok(self.emit(Op::ArrayGet { array: arr, key }, IrType::PhpValue, loc))
            }

            NodeKind::ObjectInstantiation { class, args } => {
                let args = args.clone();
                let class = self.str_of(*class)?.to_string();
                let arg_regs = self.lower_args(&args)?;
                let ty = IrType::PhpObject(class.clone());
                Ok(self.emit(
                    Op::NewObject {
                        class,
                        args: arg_regs,
                    },
                    ty,
                    loc,
                ))
            }

            NodeKind::CloneWith { object } => {
                let obj = self.lower_expr(*object)?;
                Ok(self.emit(
                    Op::Clone { object: obj },
                    IrType::PhpObject(String::new()),
                    loc,
                ))
            }

            NodeKind::ArrayInit { elements } => {
                let elements: Vec<ArrayElement> = elements.clone();
                let arr = self.emit(
                    Op::ArrayNew {
                        capacity: elements.len() as u32,
                    },
                    IrType::PhpArray,
                    loc.clone(),
                );
                for element in &elements {
                    match element.key {
                        Some(key) => {
                            let key_reg = self.lower_expr(key)?;
                            let value = self.lower_expr(element.value)?;
                            self.emit_void(
                                Op::ArraySet {
                                    array: arr.clone(),
                                    key: key_reg,
                                    value,
                                },
                                loc.clone(),
                            );
                        }
                        None => {
                            let value = self.lower_expr(element.value)?;
                            self.emit_void(
                                Op::ArrayPush {
                                    array: arr.clone(),
                                    value,
                                },
                                loc.clone(),
                            );
                        }
                    }
                }
                Ok(arr)
            }

            NodeKind::StringInterpolation { parts } => {
                let parts = parts.clone();
                let mut part_regs = Vec::new();
                for part in parts {
                    part_regs.push(self.lower_expr(part)?);
                }
                Ok(self.emit(
                    Op::Interpolate { parts: part_regs },
                    IrType::PhpString,
                    loc,
                ))
            }

            NodeKind::Match { subject, arms } => {
                let arms = arms.clone();
                self.lower_match(node, *subject, &arms, &loc)
            }

            NodeKind::Closure | NodeKind::ArrowFunction => {
                self.diags.error(
                    loc.clone(),
                    "closures cannot be lowered in this context",
                );
                Ok(self.emit(Op::ConstNull, IrType::PhpValue, loc))
            }

            other => {
                let msg = format!("expected an expression, found {:?}", other);
                self.diags.error(loc, msg.clone());
                Err(CompileError::MalformedAst(msg))
            }
        }
    }

    /// Lower an expression whose value is discarded (an expression
    /// statement). Void calls skip the synthetic null a value context would
    /// need.
    pub(super) fn lower_expr_discard(&mut self, node: NodeId) -> Result<(), CompileError> {
        self.ensure_open();
        let n = self.node(node)?;
        if let NodeKind::Call { name, args } = &n.kind {
            let loc = n.location.clone();
            let args = args.clone();
            self.lower_call_common(node, *name, &args, &loc)?;
            return Ok(());
        }
        self.lower_expr(node)?;
        Ok(())
    }

    fn lower_args(&mut self, args: &[NodeId]) -> Result<Vec<Register>, CompileError> {
        let mut regs = Vec::new();
        for &arg in args {
            regs.push(self.lower_expr(arg)?);
        }
        Ok(regs)
    }

    /// Shared call lowering. Returns `None` when the call is void-typed and
    /// produced no register.
    fn lower_call_common(
        &mut self,
        node: NodeId,
        name: StringId,
        args: &[NodeId],
        loc: &SourceLocation,
    ) -> Result<Option<Register>, CompileError> {
        let func_name = self.str_of(name)?.to_string();
        let arg_regs = self.lower_args(args)?;
        let return_type = self.infer_type(node).to_ir_type();
        let op = Op::Call {
            func_name,
            args: arg_regs,
            return_type: return_type.clone(),
        };
        if return_type.is_void() {
            self.emit_void(op, loc.clone());
            Ok(None)
        } else {
            Ok(Some(self.emit(op, return_type, loc.clone())))
        }
    }

    fn lower_assign(
        &mut self,
        target: NodeId,
        value: NodeId,
        loc: &SourceLocation,
    ) -> Result<Register, CompileError> {
        let tn = self.node(target)?;
        match &tn.kind {
            NodeKind::Variable(sid) => {
                let name = self.str_of(*sid)?.to_string();
                if self.is_non_variable_symbol(&name) {
                    self.diags.error(
                        loc.clone(),
                        format!(
                            "cannot assign to '{}': the name is already a function, class or constant",
                            name
                        ),
                    );
                    return self.lower_expr(value);
                }
                let rhs = self.lower_expr(value)?;
                let ty = self.infer_type(value);
                self.bind_var(&name, rhs.clone());
                self.note_variable_type(&name, ty, loc);
                Ok(rhs)
            }
            NodeKind::ArrayAccess { array, index } => {
                let (array, index) = (*array, *index);
                let arr = self.lower_expr(array)?;
                let key = self.lower_expr(index)?;
                let rhs = self.lower_expr(value)?;
                self.emit_void(
                    Op::ArraySet {
                        array: arr,
                        key,
                        value: rhs.clone(),
                    },
                    loc.clone(),
                );
                Ok(rhs)
            }
            NodeKind::PropertyAccess { object, property } => {
                let (object, property) = (*object, *property);
                let name = self.str_of(property)?.to_string();
                let obj = self.lower_expr(object)?;
                let rhs = self.lower_expr(value)?;
                self.emit_void(
                    Op::PropertySet {
                        object: obj,
                        name,
                        value: rhs.clone(),
                    },
                    loc.clone(),
                );
                Ok(rhs)
            }
            _ => {
                self.diags
                    .error(loc.clone(), "cannot assign to this expression");
                self.lower_expr(value)
            }
        }
    }

    fn lower_binary(
        &mut self,
        node: NodeId,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        loc: &SourceLocation,
    ) -> Result<Register, CompileError> {
        if self.config.fold_constants
            && let Some(folded) = self.try_fold_expr(node)?
        {
            debug!(line = loc.line, "folded constant expression");
            return Ok(self.emit_folded(folded, loc));
        }

        if op == BinaryOp::Coalesce {
            // no dedicated op: test the left side against null and select
            let lhs_reg = self.lower_expr(lhs)?;
            let null = self.emit(Op::ConstNull, IrType::PhpValue, loc.clone());
            let cond = self.emit(
                Op::Identical {
                    lhs: lhs_reg.clone(),
                    rhs: null,
                },
                IrType::Bool,
                loc.clone(),
            );
            let rhs_reg = self.lower_expr(rhs)?;
            let ty = self.infer_type(node).to_ir_type();
            return Ok(self.emit(
                Op::Select {
                    cond,
                    then_value: rhs_reg,
                    else_value: lhs_reg,
                },
                ty,
                loc.clone(),
            ));
        }

        let lhs_reg = self.lower_expr(lhs)?;
        let rhs_reg = self.lower_expr(rhs)?;
        let ty = self.infer_type(node).to_ir_type();
        let op = Self::binary_op(op, lhs_reg, rhs_reg);
        Ok(self.emit(op, ty, loc.clone()))
    }

    fn binary_op(op: BinaryOp, lhs: Register, rhs: Register) -> Op {
        match op {
            BinaryOp::Add => Op::Add { lhs, rhs },
            BinaryOp::Sub => Op::Sub { lhs, rhs },
            BinaryOp::Mul => Op::Mul { lhs, rhs },
            BinaryOp::Div => Op::Div { lhs, rhs },
            BinaryOp::Mod => Op::Mod { lhs, rhs },
            BinaryOp::Pow => Op::Pow { lhs, rhs },
            BinaryOp::Concat => Op::Concat { lhs, rhs },
            BinaryOp::Eq => Op::Eq { lhs, rhs },
            BinaryOp::NotEq => Op::Ne { lhs, rhs },
            BinaryOp::Identical => Op::Identical { lhs, rhs },
            BinaryOp::NotIdentical => Op::NotIdentical { lhs, rhs },
            BinaryOp::Lt => Op::Lt { lhs, rhs },
            BinaryOp::Le => Op::Le { lhs, rhs },
            BinaryOp::Gt => Op::Gt { lhs, rhs },
            BinaryOp::Ge => Op::Ge { lhs, rhs },
            BinaryOp::Spaceship => Op::Spaceship { lhs, rhs },
            BinaryOp::LogicalAnd => Op::And { lhs, rhs },
            BinaryOp::LogicalOr => Op::Or { lhs, rhs },
            // exclusive-or over truthiness has no short-circuit form
            BinaryOp::LogicalXor => Op::BitXor { lhs, rhs },
            BinaryOp::BitAnd => Op::BitAnd { lhs, rhs },
            BinaryOp::BitOr => Op::BitOr { lhs, rhs },
            BinaryOp::BitXor => Op::BitXor { lhs, rhs },
            BinaryOp::Shl => Op::Shl { lhs, rhs },
            BinaryOp::Shr => Op::Shr { lhs, rhs },
            BinaryOp::Coalesce => unreachable!("coalesce lowers through select"),
        }
    }

    fn lower_unary(
        &mut self,
        node: NodeId,
        op: UnaryOp,
        operand: NodeId,
        loc: &SourceLocation,
    ) -> Result<Register, CompileError> {
        if self.config.fold_constants
            && let Some(folded) = self.try_fold_expr(node)?
        {
            debug!(line = loc.line, "folded constant expression");
            return Ok(self.emit_folded(folded, loc));
        }
        let value = self.lower_expr(operand)?;
        let ty = self.infer_type(node).to_ir_type();
        let op = match op {
            UnaryOp::Not => Op::Not { value },
            UnaryOp::BitNot => Op::BitNot { value },
            UnaryOp::Neg => Op::Neg { value },
        };
        Ok(self.emit(op, ty, loc.clone()))
    }

    fn lower_postfix(
        &mut self,
        op: PostfixOp,
        target: NodeId,
        loc: &SourceLocation,
    ) -> Result<Register, CompileError> {
        let tn = self.node(target)?;
        let NodeKind::Variable(sid) = &tn.kind else {
            self.diags.error(
                loc.clone(),
                "can only increment or decrement a variable",
            );
            return self.lower_expr(target);
        };
        let name = self.str_of(*sid)?.to_string();
        let original = match self.lookup_var(&name) {
            Some(reg) => reg,
            None => self.undefined_variable(&name, loc),
        };

        let (one, ty) = if original.ty == IrType::F64 {
            (
                self.emit(Op::ConstFloat(1.0), IrType::F64, loc.clone()),
                IrType::F64,
            )
        } else {
            (
                self.emit(Op::ConstInt(1), IrType::I64, loc.clone()),
                original.ty.clone(),
            )
        };
        let updated_op = match op {
            PostfixOp::Increment => Op::Add {
                lhs: original.clone(),
                rhs: one,
            },
            PostfixOp::Decrement => Op::Sub {
                lhs: original.clone(),
                rhs: one,
            },
        };
        let updated = self.emit(updated_op, ty, loc.clone());
        let inferred = self.infer_type(target);
        self.bind_var(&name, updated);
        self.note_variable_type(&name, inferred, loc);
        // postfix evaluates to the value before the update
        Ok(original)
    }
}

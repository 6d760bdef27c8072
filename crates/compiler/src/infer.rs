//! Static type inference over the AST
//!
//! One operation: [`TypeInferencer::infer`] maps an expression node to an
//! [`InferredType`]. The inferencer is read-only and total: every node gets
//! a type, with `dynamic` as the safe answer whenever static knowledge runs
//! out (missing variables, methods, properties, unknown calls).
//!
//! Variable and function types come from the symbol table the builder
//! maintains; built-in calls come from the closed table in [`crate::builtins`].

use crate::ast::{Ast, BinaryOp, NodeId, NodeKind, UnaryOp};
use crate::builtins::builtin_return_type;
use crate::symbols::{SymbolMetadata, SymbolTable};
use crate::types::{ConcreteType, InferredType};

pub struct TypeInferencer<'a> {
    ast: &'a Ast,
}

impl<'a> TypeInferencer<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        TypeInferencer { ast }
    }

    /// Infer the type of `node`. Never fails; unknown shapes and dangling
    /// indices come back as `dynamic`.
    pub fn infer(&self, node: NodeId, symbols: &SymbolTable) -> InferredType {
        let Some(n) = self.ast.node(node) else {
            return InferredType::Dynamic;
        };
        match &n.kind {
            NodeKind::LiteralInt(_) => InferredType::int(),
            NodeKind::LiteralFloat(_) => InferredType::float(),
            NodeKind::LiteralString(_) => InferredType::string(),
            NodeKind::LiteralBool(_) => InferredType::bool(),
            NodeKind::LiteralNull => InferredType::null(),
            NodeKind::ArrayInit { .. } => InferredType::Concrete(ConcreteType::Array),
            NodeKind::Closure | NodeKind::ArrowFunction => {
                InferredType::Concrete(ConcreteType::Callable)
            }
            NodeKind::ObjectInstantiation { .. } | NodeKind::CloneWith { .. } => {
                InferredType::Concrete(ConcreteType::Object)
            }

            NodeKind::Variable(name) => {
                let Some(name) = self.ast.str(*name) else {
                    return InferredType::Dynamic;
                };
                match symbols.lookup(name) {
                    Some(symbol) => symbol.inferred_type.clone(),
                    None => InferredType::Dynamic,
                }
            }

            // an assignment expression has the value of its right side
            NodeKind::Assign { value, .. } => self.infer(*value, symbols),

            NodeKind::Binary { op, lhs, rhs } => self.infer_binary(*op, *lhs, *rhs, symbols),

            NodeKind::Unary { op, operand } => match op {
                UnaryOp::Not => InferredType::bool(),
                UnaryOp::BitNot => InferredType::int(),
                UnaryOp::Neg => self.numeric_preserving(*operand, symbols),
            },

            NodeKind::Postfix { target, .. } => self.numeric_preserving(*target, symbols),

            NodeKind::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                let a = self.infer(*then_expr, symbols);
                let b = self.infer(*else_expr, symbols);
                let joined = a.join(&b);
                if joined.is_concrete() {
                    joined
                } else {
                    InferredType::Dynamic
                }
            }

            NodeKind::Call { name, .. } => {
                let Some(name) = self.ast.str(*name) else {
                    return InferredType::Dynamic;
                };
                if let Some(ty) = builtin_return_type(name) {
                    return ty;
                }
                match symbols.lookup_function(name) {
                    Some(symbol) => match &symbol.metadata {
                        SymbolMetadata::Function { return_type, .. } => return_type.clone(),
                        _ => symbol.inferred_type.clone(),
                    },
                    None => InferredType::Dynamic,
                }
            }

            // out of static reach
            NodeKind::MethodCall { .. }
            | NodeKind::StaticCall { .. }
            | NodeKind::PropertyAccess { .. }
            | NodeKind::ArrayAccess { .. } => InferredType::Dynamic,

            NodeKind::NamedType(name) => {
                let Some(name) = self.ast.str(*name) else {
                    return InferredType::Dynamic;
                };
                if name == "mixed" {
                    return InferredType::Dynamic;
                }
                match InferredType::from_type_name(name) {
                    Some(concrete) => InferredType::Concrete(concrete),
                    // unknown names are class names
                    None => InferredType::Concrete(ConcreteType::Object),
                }
            }

            NodeKind::NullableType { inner } => match self.infer(*inner, symbols) {
                InferredType::Concrete(c) => InferredType::union_of([ConcreteType::Null, c]),
                InferredType::Union(mut members) => {
                    members.push(ConcreteType::Null);
                    InferredType::union_of(members)
                }
                _ => InferredType::Dynamic,
            },

            NodeKind::UnionType { members } => {
                let mut resolved: Vec<ConcreteType> = Vec::new();
                for member in members {
                    match self.infer(*member, symbols) {
                        InferredType::Concrete(c) => resolved.push(c),
                        InferredType::Union(inner) => resolved.extend(inner),
                        _ => {}
                    }
                }
                match resolved.len() {
                    0 => InferredType::Dynamic,
                    _ => InferredType::union_of(resolved),
                }
            }

            NodeKind::Match { arms, .. } => {
                let mut result: Option<InferredType> = None;
                for arm in arms {
                    let arm_ty = self.infer(arm.body, symbols);
                    result = Some(match result {
                        None => arm_ty,
                        Some(prev) => prev.join(&arm_ty),
                    });
                }
                match result {
                    // the join has already widened disagreeing arms
                    Some(ty) if !ty.is_unknown() => ty,
                    _ => InferredType::Dynamic,
                }
            }

            NodeKind::StringInterpolation { .. } => InferredType::string(),

            // statements have no value
            _ => InferredType::Dynamic,
        }
    }

    fn infer_binary(
        &self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        symbols: &SymbolTable,
    ) -> InferredType {
        if op.is_comparison() && op != BinaryOp::Spaceship {
            return InferredType::bool();
        }
        match op {
            BinaryOp::Spaceship => InferredType::int(),
            _ if op.is_logical() => InferredType::bool(),
            BinaryOp::Concat => InferredType::string(),
            _ if op.is_arithmetic() => {
                let a = self.infer(lhs, symbols);
                let b = self.infer(rhs, symbols);
                a.arithmetic_join(&b)
            }
            _ if op.is_bitwise() => InferredType::int(),
            BinaryOp::Coalesce => {
                let a = self.infer(lhs, symbols);
                let b = self.infer(rhs, symbols);
                a.null_coalesce_join(&b)
            }
            _ => InferredType::Dynamic,
        }
    }

    /// Negation and `++`/`--` keep int and float, everything else widens.
    fn numeric_preserving(&self, operand: NodeId, symbols: &SymbolTable) -> InferredType {
        match self.infer(operand, symbols) {
            InferredType::Concrete(c) if c.is_numeric() => InferredType::Concrete(c),
            _ => InferredType::Dynamic,
        }
    }
}

//! Constant folding
//!
//! Folds constant-only expression trees into a single literal during
//! lowering. A fold happens only when the operator is pure and total on the
//! operand values at hand; anything else (division by a literal zero, shift
//! out of range, overflowing integer power, type juggling the runtime owns)
//! returns `None` so the runtime op is emitted instead.
//!
//! Integer arithmetic wraps with two's-complement semantics; float
//! arithmetic follows IEEE-754, so `1.0 / 0.0` folds to `inf` and `NaN`
//! comparisons fold to `false`.

use super::IrBuilder;
use crate::CompileError;
use crate::ast::{BinaryOp, NodeId, NodeKind, SourceLocation, UnaryOp};
use crate::ir::{Op, Register};
use crate::types::IrType;

/// A compile-time value.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Folded {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Folded {
    fn as_float(&self) -> Option<f64> {
        match self {
            Folded::Int(v) => Some(*v as f64),
            Folded::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Folded::Int(_) | Folded::Float(_))
    }
}

/// Whether a string would be re-interpreted numerically by the runtime's
/// loose comparison rules, in which case byte-wise folding would lie.
fn is_numeric_string(s: &str) -> bool {
    s.trim().parse::<f64>().is_ok()
}

impl IrBuilder<'_> {
    /// Evaluate a constant-only subtree, or `None` when anything in it is
    /// not a literal or the operator refuses the operands.
    pub(super) fn try_fold_expr(&mut self, node: NodeId) -> Result<Option<Folded>, CompileError> {
        let n = self.node(node)?;
        let loc = n.location.clone();
        match &n.kind {
            NodeKind::LiteralInt(v) => Ok(Some(Folded::Int(*v))),
            NodeKind::LiteralFloat(v) => Ok(Some(Folded::Float(*v))),
            NodeKind::LiteralBool(v) => Ok(Some(Folded::Bool(*v))),
            NodeKind::LiteralNull => Ok(Some(Folded::Null)),
            NodeKind::LiteralString(sid) => {
                Ok(Some(Folded::Str(self.str_of(*sid)?.to_string())))
            }
            NodeKind::Unary { op, operand } => {
                let Some(value) = self.try_fold_expr(*operand)? else {
                    return Ok(None);
                };
                Ok(Self::fold_unary(*op, value))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let Some(a) = self.try_fold_expr(*lhs)? else {
                    return Ok(None);
                };
                let Some(b) = self.try_fold_expr(*rhs)? else {
                    return Ok(None);
                };
                Ok(self.fold_binary(node, *op, a, b, &loc))
            }
            _ => Ok(None),
        }
    }

    /// Emit the single constant instruction a successful fold stands for.
    pub(super) fn emit_folded(&mut self, folded: Folded, loc: &SourceLocation) -> Register {
        match folded {
            Folded::Int(v) => self.emit(Op::ConstInt(v), IrType::I64, loc.clone()),
            Folded::Float(v) => self.emit(Op::ConstFloat(v), IrType::F64, loc.clone()),
            Folded::Bool(v) => self.emit(Op::ConstBool(v), IrType::Bool, loc.clone()),
            Folded::Str(s) => {
                let id = self.module.intern_string(&s);
                self.emit(Op::ConstString(id), IrType::PhpString, loc.clone())
            }
            Folded::Null => self.emit(Op::ConstNull, IrType::PhpValue, loc.clone()),
        }
    }

    fn fold_unary(op: UnaryOp, value: Folded) -> Option<Folded> {
        match (op, value) {
            (UnaryOp::Neg, Folded::Int(v)) => Some(Folded::Int(v.wrapping_neg())),
            (UnaryOp::Neg, Folded::Float(v)) => Some(Folded::Float(-v)),
            (UnaryOp::Not, Folded::Bool(v)) => Some(Folded::Bool(!v)),
            (UnaryOp::BitNot, Folded::Int(v)) => Some(Folded::Int(!v)),
            _ => None,
        }
    }

    fn fold_binary(
        &mut self,
        node: NodeId,
        op: BinaryOp,
        a: Folded,
        b: Folded,
        loc: &SourceLocation,
    ) -> Option<Folded> {
        use Folded::{Bool, Float, Int, Null, Str};
        match op {
            BinaryOp::Add => match (&a, &b) {
                (Int(x), Int(y)) => Some(Int(x.wrapping_add(*y))),
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x + y)),
            },
            BinaryOp::Sub => match (&a, &b) {
                (Int(x), Int(y)) => Some(Int(x.wrapping_sub(*y))),
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x - y)),
            },
            BinaryOp::Mul => match (&a, &b) {
                (Int(x), Int(y)) => Some(Int(x.wrapping_mul(*y))),
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x * y)),
            },
            BinaryOp::Div => match (&a, &b) {
                (Int(_), Int(0)) => {
                    self.fold_warning_once(node, loc, "integer division by zero");
                    None
                }
                (Int(x), Int(y)) => Some(Int(x.wrapping_div(*y))),
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x / y)),
            },
            BinaryOp::Mod => match (&a, &b) {
                (Int(_), Int(0)) => {
                    self.fold_warning_once(node, loc, "integer modulo by zero");
                    None
                }
                (Int(x), Int(y)) => Some(Int(x.wrapping_rem(*y))),
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x % y)),
            },
            BinaryOp::Pow => match (&a, &b) {
                (Int(x), Int(y)) => {
                    if *y < 0 {
                        return None;
                    }
                    let result = u32::try_from(*y).ok().and_then(|exp| x.checked_pow(exp));
                    match result {
                        Some(v) => Some(Int(v)),
                        None => {
                            self.fold_warning_once(
                                node,
                                loc,
                                "integer power overflows a 64-bit result",
                            );
                            None
                        }
                    }
                }
                _ => Self::float_pair(&a, &b).map(|(x, y)| Float(x.powf(y))),
            },

            BinaryOp::BitAnd => Self::int_pair(&a, &b).map(|(x, y)| Int(x & y)),
            BinaryOp::BitOr => Self::int_pair(&a, &b).map(|(x, y)| Int(x | y)),
            BinaryOp::BitXor => Self::int_pair(&a, &b).map(|(x, y)| Int(x ^ y)),
            BinaryOp::Shl | BinaryOp::Shr => {
                let (x, y) = Self::int_pair(&a, &b)?;
                if !(0..=63).contains(&y) {
                    self.fold_warning_once(
                        node,
                        loc,
                        &format!("shift amount {} is out of range", y),
                    );
                    return None;
                }
                Some(Int(if op == BinaryOp::Shl {
                    x.wrapping_shl(y as u32)
                } else {
                    x.wrapping_shr(y as u32)
                }))
            }

            BinaryOp::Concat => match (&a, &b) {
                (Str(x), Str(y)) => Some(Str(format!("{}{}", x, y))),
                _ => None,
            },

            BinaryOp::Eq => Self::value_eq(&a, &b).map(Bool),
            BinaryOp::NotEq => Self::value_eq(&a, &b).map(|v| Bool(!v)),
            BinaryOp::Identical => Some(Bool(Self::identical(&a, &b))),
            BinaryOp::NotIdentical => Some(Bool(!Self::identical(&a, &b))),

            BinaryOp::Lt => Self::numeric_cmp(&a, &b).map(|o| Bool(o.is_lt())),
            BinaryOp::Le => Self::numeric_cmp(&a, &b).map(|o| Bool(o.is_le())),
            BinaryOp::Gt => Self::numeric_cmp(&a, &b).map(|o| Bool(o.is_gt())),
            BinaryOp::Ge => Self::numeric_cmp(&a, &b).map(|o| Bool(o.is_ge())),
            BinaryOp::Spaceship => Self::spaceship(&a, &b).map(Int),

            // a constant left side decides the whole expression
            BinaryOp::Coalesce => match a {
                Null => Some(b),
                _ => Some(a),
            },

            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor => None,
        }
    }

    fn int_pair(a: &Folded, b: &Folded) -> Option<(i64, i64)> {
        match (a, b) {
            (Folded::Int(x), Folded::Int(y)) => Some((*x, *y)),
            _ => None,
        }
    }

    /// Largest integer magnitude an f64 represents exactly. Mixed int/float
    /// comparisons beyond it are compared precisely by the runtime, so they
    /// must not fold through a lossy widening.
    const MAX_EXACT_INT_IN_F64: u64 = 1 << 53;

    fn comparable_as_float(v: &Folded) -> Option<f64> {
        match v {
            Folded::Int(x) if x.unsigned_abs() <= Self::MAX_EXACT_INT_IN_F64 => Some(*x as f64),
            Folded::Int(_) => None,
            Folded::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Numeric pair widened to floats; `None` when either side is not
    /// numeric.
    fn float_pair(a: &Folded, b: &Folded) -> Option<(f64, f64)> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        Some((a.as_float()?, b.as_float()?))
    }

    /// Loose equality, restricted to the combinations whose result cannot
    /// differ from the runtime: same-type values and int/float pairs.
    /// String pairs fold only when byte equality already settles the
    /// answer; numeric strings are left to the runtime.
    fn value_eq(a: &Folded, b: &Folded) -> Option<bool> {
        use Folded::{Bool, Float, Int, Null, Str};
        match (a, b) {
            (Int(x), Int(y)) => Some(x == y),
            (Float(x), Float(y)) => Some(x == y),
            (Int(_), Float(_)) | (Float(_), Int(_)) => {
                let x = Self::comparable_as_float(a)?;
                let y = Self::comparable_as_float(b)?;
                Some(x == y)
            }
            (Bool(x), Bool(y)) => Some(x == y),
            (Null, Null) => Some(true),
            (Str(x), Str(y)) => {
                if x == y {
                    Some(true)
                } else if !is_numeric_string(x) && !is_numeric_string(y) {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Strict `===`: same type and same value. Total on every combination.
    fn identical(a: &Folded, b: &Folded) -> bool {
        use Folded::{Bool, Float, Int, Null, Str};
        match (a, b) {
            (Int(x), Int(y)) => x == y,
            (Float(x), Float(y)) => x == y,
            (Bool(x), Bool(y)) => x == y,
            (Str(x), Str(y)) => x == y,
            (Null, Null) => true,
            _ => false,
        }
    }

    fn numeric_cmp(a: &Folded, b: &Folded) -> Option<std::cmp::Ordering> {
        match (a, b) {
            (Folded::Int(x), Folded::Int(y)) => Some(x.cmp(y)),
            _ => {
                let x = Self::comparable_as_float(a)?;
                let y = Self::comparable_as_float(b)?;
                // NaN refuses an ordering, so no fold
                x.partial_cmp(&y)
            }
        }
    }

    fn spaceship(a: &Folded, b: &Folded) -> Option<i64> {
        use Folded::Str;
        if let (Str(x), Str(y)) = (a, b) {
            if x == y {
                return Some(0);
            }
            if !is_numeric_string(x) && !is_numeric_string(y) {
                return Some(match x.cmp(y) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                });
            }
            return None;
        }
        Self::numeric_cmp(a, b).map(|o| match o {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        })
    }

    fn fold_warning_once(&mut self, node: NodeId, loc: &SourceLocation, message: &str) {
        if self.fold_warned.insert(node) {
            self.diags.warning(loc.clone(), message.to_string());
        }
    }
}

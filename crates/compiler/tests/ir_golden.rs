//! End-to-end lowering scenarios and golden serializer output.
//!
//! Each test hand-builds a flat AST (the front end's job in production),
//! runs it through the builder and checks the produced IR, either
//! structurally or against exact serialized text.

use phpc::ast::{ArrayElement, BinaryOp, MatchArm, NodeId, NodeKind, ParamDecl};
use phpc::ir::{Module, Op, Terminator};
use phpc::{
    Ast, CompileError, CompilerConfig, DiagnosticEngine, IrBuilder, compile_to_ir,
    serialize_module,
};

/// Wrap statements into a program root.
fn finish(ast: &mut Ast, statements: Vec<NodeId>) {
    ast.root = ast.push_at(NodeKind::Program { statements }, 1);
}

/// Honor RUST_LOG for debugging a failing scenario.
fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Build through the public pipeline; panics on semantic failure.
fn compile(ast: &Ast) -> Module {
    init_logging();
    let mut diagnostics = DiagnosticEngine::new();
    match compile_to_ir(ast, &CompilerConfig::default(), &mut diagnostics) {
        Ok(module) => module,
        Err(err) => panic!("unexpected failure: {}\n{}", err, diagnostics.render()),
    }
}

/// Build through the builder directly, keeping the module even when
/// semantic diagnostics were recorded.
fn compile_lenient(ast: &Ast) -> (Module, DiagnosticEngine) {
    init_logging();
    let config = CompilerConfig::default();
    let mut diagnostics = DiagnosticEngine::new();
    let module = IrBuilder::new(ast, &config, &mut diagnostics)
        .build()
        .expect("AST is well-formed");
    (module, diagnostics)
}

// ----------------------------------------------------------------------
// Scenarios

#[test]
fn s1_integer_constant_fold() {
    let mut ast = Ast::new("script.php");
    let a = ast.push_at(NodeKind::LiteralInt(10), 1);
    let b = ast.push_at(NodeKind::LiteralInt(20), 1);
    let sum = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: b,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(sum) }, 1);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    assert_eq!(
        serialize_module(&module),
        "; Module: script\n\
         ; Source: script.php\n\
         \n\
         define export php_value @main() {\n\
         entry:\n\
         \x20 %0 = const.i64 30\n\
         \x20 ret %0\n\
         }\n"
    );
}

#[test]
fn s2_variable_round_trip() {
    let mut ast = Ast::new("script.php");
    let x = ast.intern("x");
    let var = ast.push_at(NodeKind::Variable(x), 1);
    let value = ast.push_at(NodeKind::LiteralInt(42), 1);
    let assign = ast.push_at(
        NodeKind::Assign {
            target: var,
            value,
        },
        1,
    );
    let var_read = ast.push_at(NodeKind::Variable(x), 2);
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(var_read),
        },
        2,
    );
    finish(&mut ast, vec![assign, ret]);

    let module = compile(&ast);
    let body = &module.functions[0].blocks[0];
    assert_eq!(body.instructions.len(), 1, "the read reuses the register");
    assert_eq!(body.instructions[0].op, Op::ConstInt(42));
    let reg = body.instructions[0].result.clone().unwrap();
    assert_eq!(body.terminator, Some(Terminator::Ret(Some(reg))));
}

#[test]
fn s3_if_else_with_divergent_returns() {
    let mut ast = Ast::new("script.php");
    let cond = ast.push_at(NodeKind::LiteralBool(true), 1);
    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let ret_one = ast.push_at(NodeKind::Return { value: Some(one) }, 1);
    let then_block = ast.push_at(
        NodeKind::Block {
            statements: vec![ret_one],
        },
        1,
    );
    let zero = ast.push_at(NodeKind::LiteralInt(0), 1);
    let ret_zero = ast.push_at(NodeKind::Return { value: Some(zero) }, 1);
    let else_block = ast.push_at(
        NodeKind::Block {
            statements: vec![ret_zero],
        },
        1,
    );
    let if_stmt = ast.push_at(
        NodeKind::If {
            condition: cond,
            then_branch: then_block,
            else_branch: Some(else_block),
        },
        1,
    );
    finish(&mut ast, vec![if_stmt]);

    let module = compile(&ast);
    assert_eq!(
        serialize_module(&module),
        "; Module: script\n\
         ; Source: script.php\n\
         \n\
         define export php_value @main() {\n\
         entry:\n\
         \x20 %0 = const.bool true\n\
         \x20 br %0, then, else\n\
         then:\n\
         \x20 %1 = const.i64 1\n\
         \x20 ret %1\n\
         else:\n\
         \x20 %2 = const.i64 0\n\
         \x20 ret %2\n\
         }\n"
    );
}

#[test]
fn s4_string_concat_fold() {
    let mut ast = Ast::new("script.php");
    let ab = ast.intern("ab");
    let cd = ast.intern("cd");
    let lhs = ast.push_at(NodeKind::LiteralString(ab), 1);
    let rhs = ast.push_at(NodeKind::LiteralString(cd), 1);
    let concat = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Concat,
            lhs,
            rhs,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(concat) }, 1);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    let body = &module.functions[0].blocks[0];
    assert_eq!(body.instructions.len(), 1);
    let Op::ConstString(id) = body.instructions[0].op else {
        panic!("expected a folded string constant");
    };
    assert_eq!(module.strings.get(id), Some("abcd"));
}

#[test]
fn s5_undefined_variable_recovers() {
    let mut ast = Ast::new("script.php");
    let y = ast.intern("y");
    let var = ast.push_at(NodeKind::Variable(y), 3);
    let ret = ast.push_at(NodeKind::Return { value: Some(var) }, 3);
    finish(&mut ast, vec![ret]);

    let (module, diagnostics) = compile_lenient(&ast);
    assert_eq!(diagnostics.error_count(), 1);
    let diag = &diagnostics.diagnostics()[0];
    assert_eq!(diag.location.line, 3);
    assert!(diag.message.contains("Undefined variable $y"));

    // IR is still produced, with a synthetic null
    let body = &module.functions[0].blocks[0];
    assert_eq!(body.instructions[0].op, Op::ConstNull);
    let reg = body.instructions[0].result.clone().unwrap();
    assert_eq!(body.terminator, Some(Terminator::Ret(Some(reg))));
}

#[test]
fn s6_array_construction() {
    let mut ast = Ast::new("script.php");
    let ten = ast.push_at(NodeKind::LiteralInt(10), 1);
    let twenty = ast.push_at(NodeKind::LiteralInt(20), 1);
    let array = ast.push_at(
        NodeKind::ArrayInit {
            elements: vec![
                ArrayElement {
                    key: None,
                    value: ten,
                },
                ArrayElement {
                    key: None,
                    value: twenty,
                },
            ],
        },
        1,
    );
    finish(&mut ast, vec![array]);

    let module = compile(&ast);
    let text = serialize_module(&module);
    assert!(text.contains("  %0 = array.new capacity=2\n"));
    assert!(text.contains("  %1 = const.i64 10\n"));
    assert!(text.contains("  array.push %0 <- %1\n"));
    assert!(text.contains("  %2 = const.i64 20\n"));
    assert!(text.contains("  array.push %0 <- %2\n"));
}

#[test]
fn s7_spaceship_fold() {
    let mut ast = Ast::new("script.php");
    let five = ast.push_at(NodeKind::LiteralInt(5), 1);
    let three = ast.push_at(NodeKind::LiteralInt(3), 1);
    let cmp = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Spaceship,
            lhs: five,
            rhs: three,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(cmp) }, 1);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    let body = &module.functions[0].blocks[0];
    assert_eq!(body.instructions.len(), 1);
    assert_eq!(body.instructions[0].op, Op::ConstInt(1));
}

// ----------------------------------------------------------------------
// Fold-eval equivalence

fn fold_int_binary(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    let mut ast = Ast::new("script.php");
    let lhs = ast.push_at(NodeKind::LiteralInt(a), 1);
    let rhs = ast.push_at(NodeKind::LiteralInt(b), 1);
    let expr = ast.push_at(NodeKind::Binary { op, lhs, rhs }, 1);
    let ret = ast.push_at(NodeKind::Return { value: Some(expr) }, 1);
    finish(&mut ast, vec![ret]);

    let (module, _) = compile_lenient(&ast);
    let body = &module.functions[0].blocks[0];
    // a successful fold leaves exactly one constant; a rejected fold lowers
    // both operands and the runtime op
    if body.instructions.len() != 1 {
        return None;
    }
    match body.instructions[0].op {
        Op::ConstInt(v) => Some(v),
        _ => None,
    }
}

#[test]
fn fold_matches_wrapping_evaluation() {
    let values = [0i64, 1, -1, 7, -13, i64::MAX, i64::MIN];
    for &a in &values {
        for &b in &values {
            assert_eq!(
                fold_int_binary(BinaryOp::Add, a, b),
                Some(a.wrapping_add(b)),
                "{} + {}",
                a,
                b
            );
            assert_eq!(
                fold_int_binary(BinaryOp::Sub, a, b),
                Some(a.wrapping_sub(b)),
                "{} - {}",
                a,
                b
            );
            assert_eq!(
                fold_int_binary(BinaryOp::Mul, a, b),
                Some(a.wrapping_mul(b)),
                "{} * {}",
                a,
                b
            );
            let div = fold_int_binary(BinaryOp::Div, a, b);
            if b == 0 {
                assert_eq!(div, None, "{} / 0 must not fold", a);
            } else {
                assert_eq!(div, Some(a.wrapping_div(b)));
            }
        }
    }
}

#[test]
fn fold_shifts_respect_range() {
    assert_eq!(fold_int_binary(BinaryOp::Shl, 1, 4), Some(16));
    assert_eq!(fold_int_binary(BinaryOp::Shr, -16, 2), Some(-4));
    assert_eq!(fold_int_binary(BinaryOp::Shl, 1, 64), None);
    assert_eq!(fold_int_binary(BinaryOp::Shl, 1, -1), None);
    assert_eq!(fold_int_binary(BinaryOp::Shl, 1, 63), Some(1i64.wrapping_shl(63)));
}

#[test]
fn fold_pow_rejects_overflow_and_negative_exponents() {
    assert_eq!(fold_int_binary(BinaryOp::Pow, 2, 10), Some(1024));
    assert_eq!(fold_int_binary(BinaryOp::Pow, 2, -1), None);
    assert_eq!(fold_int_binary(BinaryOp::Pow, 10, 40), None);
}

#[test]
fn fold_float_division_by_zero_is_ieee() {
    let mut ast = Ast::new("script.php");
    let lhs = ast.push_at(NodeKind::LiteralFloat(1.0), 1);
    let rhs = ast.push_at(NodeKind::LiteralFloat(0.0), 1);
    let expr = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Div,
            lhs,
            rhs,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(expr) }, 1);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    assert_eq!(
        module.functions[0].blocks[0].instructions[0].op,
        Op::ConstFloat(f64::INFINITY)
    );
}

#[test]
fn fold_nested_constant_tree() {
    // (2 + 3) * 4 folds all the way down
    let mut ast = Ast::new("script.php");
    let two = ast.push_at(NodeKind::LiteralInt(2), 1);
    let three = ast.push_at(NodeKind::LiteralInt(3), 1);
    let sum = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: two,
            rhs: three,
        },
        1,
    );
    let four = ast.push_at(NodeKind::LiteralInt(4), 1);
    let product = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Mul,
            lhs: sum,
            rhs: four,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(product) }, 1);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    let body = &module.functions[0].blocks[0];
    assert_eq!(body.instructions.len(), 1);
    assert_eq!(body.instructions[0].op, Op::ConstInt(20));
}

#[test]
fn div_by_literal_zero_warns_once_and_emits_runtime_op() {
    let mut ast = Ast::new("script.php");
    let ten = ast.push_at(NodeKind::LiteralInt(10), 2);
    let zero = ast.push_at(NodeKind::LiteralInt(0), 2);
    let div = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Div,
            lhs: ten,
            rhs: zero,
        },
        2,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(div) }, 2);
    finish(&mut ast, vec![ret]);

    let (module, diagnostics) = compile_lenient(&ast);
    assert_eq!(diagnostics.error_count(), 0);
    assert_eq!(diagnostics.warning_count(), 1);

    let text = serialize_module(&module);
    assert!(text.contains("  %2 = div %0, %1\n"), "runtime op emitted:\n{}", text);
}

#[test]
fn fold_disabled_by_config() {
    let mut ast = Ast::new("script.php");
    let a = ast.push_at(NodeKind::LiteralInt(10), 1);
    let b = ast.push_at(NodeKind::LiteralInt(20), 1);
    let sum = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: b,
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(sum) }, 1);
    finish(&mut ast, vec![ret]);

    let config = CompilerConfig::new().with_fold_constants(false);
    let mut diagnostics = DiagnosticEngine::new();
    let module = compile_to_ir(&ast, &config, &mut diagnostics).unwrap();
    let text = serialize_module(&module);
    assert!(text.contains("  %2 = add %0, %1\n"));
}

// ----------------------------------------------------------------------
// Control flow and SSA

#[test]
fn if_reassignment_materializes_phi() {
    // $x = 1; $c = rand(); if ($c > 0) { $x = 2; } return $x;
    let mut ast = Ast::new("script.php");
    let x = ast.intern("x");
    let c = ast.intern("c");
    let rand_name = ast.intern("rand");

    let x_var = ast.push_at(NodeKind::Variable(x), 1);
    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let assign_x = ast.push_at(
        NodeKind::Assign {
            target: x_var,
            value: one,
        },
        1,
    );

    let c_var = ast.push_at(NodeKind::Variable(c), 2);
    let rand_call = ast.push_at(
        NodeKind::Call {
            name: rand_name,
            args: vec![],
        },
        2,
    );
    let assign_c = ast.push_at(
        NodeKind::Assign {
            target: c_var,
            value: rand_call,
        },
        2,
    );

    let c_read = ast.push_at(NodeKind::Variable(c), 3);
    let zero = ast.push_at(NodeKind::LiteralInt(0), 3);
    let cond = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Gt,
            lhs: c_read,
            rhs: zero,
        },
        3,
    );
    let x_var2 = ast.push_at(NodeKind::Variable(x), 3);
    let two = ast.push_at(NodeKind::LiteralInt(2), 3);
    let assign_x2 = ast.push_at(
        NodeKind::Assign {
            target: x_var2,
            value: two,
        },
        3,
    );
    let then_block = ast.push_at(
        NodeKind::Block {
            statements: vec![assign_x2],
        },
        3,
    );
    let if_stmt = ast.push_at(
        NodeKind::If {
            condition: cond,
            then_branch: then_block,
            else_branch: None,
        },
        3,
    );

    let x_read = ast.push_at(NodeKind::Variable(x), 4);
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(x_read),
        },
        4,
    );
    finish(&mut ast, vec![assign_x, assign_c, if_stmt, ret]);

    let module = compile(&ast);
    let func = &module.functions[0];
    let labels: Vec<&str> = func.blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["entry", "then", "merge"]);

    let merge = &func.blocks[2];
    let phi = &merge.instructions[0];
    match &phi.op {
        Op::Phi { incoming } => {
            assert_eq!(incoming.len(), 2);
            // entry carries const 1, then carries const 2
        }
        other => panic!("expected a phi, found {:?}", other),
    }
    let phi_reg = phi.result.clone().unwrap();
    assert_eq!(merge.terminator, Some(Terminator::Ret(Some(phi_reg))));
}

#[test]
fn while_loop_carries_variable_through_header_phi() {
    // $i = 0; while ($i < 10) { $i = $i + 1; } return $i;
    let mut ast = Ast::new("script.php");
    let i = ast.intern("i");

    let i_var = ast.push_at(NodeKind::Variable(i), 1);
    let zero = ast.push_at(NodeKind::LiteralInt(0), 1);
    let init = ast.push_at(
        NodeKind::Assign {
            target: i_var,
            value: zero,
        },
        1,
    );

    let i_read = ast.push_at(NodeKind::Variable(i), 2);
    let ten = ast.push_at(NodeKind::LiteralInt(10), 2);
    let cond = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Lt,
            lhs: i_read,
            rhs: ten,
        },
        2,
    );

    let i_read2 = ast.push_at(NodeKind::Variable(i), 3);
    let one = ast.push_at(NodeKind::LiteralInt(1), 3);
    let next = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: i_read2,
            rhs: one,
        },
        3,
    );
    let i_var2 = ast.push_at(NodeKind::Variable(i), 3);
    let step = ast.push_at(
        NodeKind::Assign {
            target: i_var2,
            value: next,
        },
        3,
    );
    let body = ast.push_at(
        NodeKind::Block {
            statements: vec![step],
        },
        3,
    );
    let while_stmt = ast.push_at(
        NodeKind::While {
            condition: cond,
            body,
        },
        2,
    );

    let i_read3 = ast.push_at(NodeKind::Variable(i), 4);
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(i_read3),
        },
        4,
    );
    finish(&mut ast, vec![init, while_stmt, ret]);

    let module = compile(&ast);
    let func = &module.functions[0];
    let labels: Vec<&str> = func.blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["entry", "while_header", "while_body", "while_exit"]
    );

    let header = &func.blocks[1];
    let phi = &header.instructions[0];
    match &phi.op {
        Op::Phi { incoming } => {
            assert_eq!(incoming.len(), 2, "preheader and back edge");
        }
        other => panic!("expected a loop phi, found {:?}", other),
    }
    // the loop exit returns the phi value
    let phi_reg = phi.result.clone().unwrap();
    let exit = &func.blocks[3];
    assert_eq!(exit.terminator, Some(Terminator::Ret(Some(phi_reg))));
}

#[test]
fn match_lowers_to_switch_terminator_on_int_labels() {
    // return match (2) { 1 => 10, 2 => 20, default => 0 };
    let mut ast = Ast::new("script.php");
    let subject = ast.push_at(NodeKind::LiteralInt(2), 1);
    let l1 = ast.push_at(NodeKind::LiteralInt(1), 1);
    let l2 = ast.push_at(NodeKind::LiteralInt(2), 1);
    let v10 = ast.push_at(NodeKind::LiteralInt(10), 1);
    let v20 = ast.push_at(NodeKind::LiteralInt(20), 1);
    let v0 = ast.push_at(NodeKind::LiteralInt(0), 1);
    let match_expr = ast.push_at(
        NodeKind::Match {
            subject,
            arms: vec![
                MatchArm {
                    conditions: vec![l1],
                    body: v10,
                },
                MatchArm {
                    conditions: vec![l2],
                    body: v20,
                },
                MatchArm {
                    conditions: vec![],
                    body: v0,
                },
            ],
        },
        1,
    );
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(match_expr),
        },
        1,
    );
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    let func = &module.functions[0];
    let entry = &func.blocks[0];
    match &entry.terminator {
        Some(Terminator::Switch { cases, .. }) => {
            let labels: Vec<i64> = cases.iter().map(|(v, _)| *v).collect();
            assert_eq!(labels, vec![1, 2]);
        }
        other => panic!("expected a switch terminator, found {:?}", other),
    }
    // the merge block phi selects one value per arm
    let merge = func.blocks.last().unwrap();
    assert!(merge.label.starts_with("match_merge"));
    match &merge.instructions[0].op {
        Op::Phi { incoming } => assert_eq!(incoming.len(), 3),
        other => panic!("expected the result phi, found {:?}", other),
    }
}

#[test]
fn functions_lower_with_params_and_calls_resolve_types() {
    // function add(int $a, int $b): int { return $a + $b; }
    // return add(1, 2);
    let mut ast = Ast::new("script.php");
    let add_name = ast.intern("add");
    let a_name = ast.intern("a");
    let b_name = ast.intern("b");
    let int_name = ast.intern("int");

    let int_type_a = ast.push_at(NodeKind::NamedType(int_name), 1);
    let int_type_b = ast.push_at(NodeKind::NamedType(int_name), 1);
    let int_type_ret = ast.push_at(NodeKind::NamedType(int_name), 1);

    let a_var = ast.push_at(NodeKind::Variable(a_name), 2);
    let b_var = ast.push_at(NodeKind::Variable(b_name), 2);
    let sum = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: a_var,
            rhs: b_var,
        },
        2,
    );
    let ret_sum = ast.push_at(NodeKind::Return { value: Some(sum) }, 2);
    let body = ast.push_at(
        NodeKind::Block {
            statements: vec![ret_sum],
        },
        2,
    );
    let decl = ast.push_at(
        NodeKind::FunctionDecl {
            name: add_name,
            params: vec![
                ParamDecl {
                    name: a_name,
                    type_hint: Some(int_type_a),
                },
                ParamDecl {
                    name: b_name,
                    type_hint: Some(int_type_b),
                },
            ],
            return_type: Some(int_type_ret),
            body,
        },
        1,
    );

    let one = ast.push_at(NodeKind::LiteralInt(1), 4);
    let two = ast.push_at(NodeKind::LiteralInt(2), 4);
    let call = ast.push_at(
        NodeKind::Call {
            name: add_name,
            args: vec![one, two],
        },
        4,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(call) }, 4);
    finish(&mut ast, vec![decl, ret]);

    let module = compile(&ast);
    assert_eq!(module.functions.len(), 2);

    let text = serialize_module(&module);
    assert!(text.contains("define i64 @add(i64 %a, i64 %b) {\n"));
    // the call's return type comes from the declared signature
    assert!(text.contains("call @add(%0, %1) : i64"));
    // parameters occupy registers 0 and 1, the sum is register 2
    assert!(text.contains("  %2 = add %0, %1\n"));
    assert!(text.contains("  ret %2\n"));
}

#[test]
fn source_locations_survive_into_instructions() {
    let mut ast = Ast::new("script.php");
    let a = ast.push_at(NodeKind::LiteralInt(10), 7);
    let b = ast.push_at(NodeKind::LiteralInt(20), 7);
    let sum = ast.push_at(
        NodeKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: b,
        },
        7,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(sum) }, 7);
    finish(&mut ast, vec![ret]);

    let module = compile(&ast);
    for func in &module.functions {
        for block in &func.blocks {
            for instr in &block.instructions {
                assert_eq!(instr.location.line, 7);
            }
        }
    }
}

#[test]
fn builds_are_deterministic() {
    let build = || {
        let mut ast = Ast::new("script.php");
        let x = ast.intern("x");
        let var = ast.push_at(NodeKind::Variable(x), 1);
        let v = ast.push_at(NodeKind::LiteralInt(5), 1);
        let assign = ast.push_at(
            NodeKind::Assign {
                target: var,
                value: v,
            },
            1,
        );
        let read = ast.push_at(NodeKind::Variable(x), 2);
        let neg = ast.push_at(
            NodeKind::Unary {
                op: phpc::ast::UnaryOp::Neg,
                operand: read,
            },
            2,
        );
        let ret = ast.push_at(NodeKind::Return { value: Some(neg) }, 2);
        finish(&mut ast, vec![assign, ret]);
        serialize_module(&compile(&ast))
    };
    assert_eq!(build(), build());
}

// ----------------------------------------------------------------------
// Builder diagnostics

#[test]
fn php_prefixed_definition_is_rejected() {
    let mut ast = Ast::new("script.php");
    let bad = ast.intern("php_eval");
    let body = ast.push_at(NodeKind::Block { statements: vec![] }, 1);
    let decl = ast.push_at(
        NodeKind::FunctionDecl {
            name: bad,
            params: vec![],
            return_type: None,
            body,
        },
        1,
    );
    finish(&mut ast, vec![decl]);

    let (module, diagnostics) = compile_lenient(&ast);
    assert_eq!(diagnostics.error_count(), 1);
    assert!(diagnostics.render().contains("reserved for the runtime"));
    // the definition was skipped
    assert_eq!(module.functions.len(), 1);
}

#[test]
fn duplicate_function_is_rejected_and_first_wins() {
    let mut ast = Ast::new("script.php");
    let f = ast.intern("f");
    let body1 = ast.push_at(NodeKind::Block { statements: vec![] }, 1);
    let decl1 = ast.push_at(
        NodeKind::FunctionDecl {
            name: f,
            params: vec![],
            return_type: None,
            body: body1,
        },
        1,
    );
    let body2 = ast.push_at(NodeKind::Block { statements: vec![] }, 2);
    let decl2 = ast.push_at(
        NodeKind::FunctionDecl {
            name: f,
            params: vec![],
            return_type: None,
            body: body2,
        },
        2,
    );
    finish(&mut ast, vec![decl1, decl2]);

    let (module, diagnostics) = compile_lenient(&ast);
    assert_eq!(diagnostics.error_count(), 1);
    assert!(diagnostics.render().contains("duplicate definition"));
    assert_eq!(module.functions.len(), 2, "entry plus the first definition");
}

#[test]
fn assignment_to_function_name_is_rejected() {
    let mut ast = Ast::new("script.php");
    let f = ast.intern("f");
    let body = ast.push_at(NodeKind::Block { statements: vec![] }, 1);
    let decl = ast.push_at(
        NodeKind::FunctionDecl {
            name: f,
            params: vec![],
            return_type: None,
            body,
        },
        1,
    );
    let target = ast.push_at(NodeKind::Variable(f), 2);
    let value = ast.push_at(NodeKind::LiteralInt(1), 2);
    let assign = ast.push_at(NodeKind::Assign { target, value }, 2);
    finish(&mut ast, vec![decl, assign]);

    let (_, diagnostics) = compile_lenient(&ast);
    assert_eq!(diagnostics.error_count(), 1);
    assert!(diagnostics.render().contains("cannot assign to 'f'"));
}

#[test]
fn preregistered_function_signature_drives_call_types() {
    let mut ast = Ast::new("script.php");
    let helper = ast.intern("resolve_path");
    let call = ast.push_at(
        NodeKind::Call {
            name: helper,
            args: vec![],
        },
        1,
    );
    let ret = ast.push_at(NodeKind::Return { value: Some(call) }, 1);
    finish(&mut ast, vec![ret]);

    let config = CompilerConfig::default();
    let mut diagnostics = DiagnosticEngine::new();
    let mut builder = IrBuilder::new(&ast, &config, &mut diagnostics);
    builder.symbols_mut().define_function(
        "resolve_path",
        vec![],
        phpc::InferredType::string(),
        phpc::SourceLocation::none(),
    );
    let module = builder.build().unwrap();

    let text = serialize_module(&module);
    assert!(text.contains("call @resolve_path() : php_string"));
}

#[test]
fn try_catch_produces_exception_edge_and_catch_ops() {
    // try { $x = 1; } catch (Exception $e) { $x = 2; } return $x;
    let mut ast = Ast::new("script.php");
    let x = ast.intern("x");
    let e = ast.intern("e");
    let exception = ast.intern("Exception");

    let x_var = ast.push_at(NodeKind::Variable(x), 1);
    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let assign1 = ast.push_at(
        NodeKind::Assign {
            target: x_var,
            value: one,
        },
        1,
    );
    let try_body = ast.push_at(
        NodeKind::Block {
            statements: vec![assign1],
        },
        1,
    );

    let x_var2 = ast.push_at(NodeKind::Variable(x), 2);
    let two = ast.push_at(NodeKind::LiteralInt(2), 2);
    let assign2 = ast.push_at(
        NodeKind::Assign {
            target: x_var2,
            value: two,
        },
        2,
    );
    let catch_body = ast.push_at(
        NodeKind::Block {
            statements: vec![assign2],
        },
        2,
    );

    let try_stmt = ast.push_at(
        NodeKind::Try {
            body: try_body,
            catches: vec![phpc::ast::CatchClause {
                class_name: Some(exception),
                variable: e,
                body: catch_body,
            }],
            finally: None,
        },
        1,
    );
    let x_read = ast.push_at(NodeKind::Variable(x), 3);
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(x_read),
        },
        3,
    );
    finish(&mut ast, vec![try_stmt, ret]);

    let module = compile(&ast);
    let text = serialize_module(&module);
    assert!(text.contains("  try.begin\n"));
    assert!(text.contains("  try.end\n"));
    assert!(text.contains("  catch Exception\n"));
    assert!(text.contains("get_exception"));
    // x is phi-merged in the join block
    assert!(text.contains("phi ["));
}

#[test]
fn finally_runs_on_normal_completion() {
    // try { $x = 1; } finally { echo "done"; } return $x;
    let mut ast = Ast::new("script.php");
    let x = ast.intern("x");
    let done = ast.intern("done");

    let x_var = ast.push_at(NodeKind::Variable(x), 1);
    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let assign = ast.push_at(
        NodeKind::Assign {
            target: x_var,
            value: one,
        },
        1,
    );
    let try_body = ast.push_at(
        NodeKind::Block {
            statements: vec![assign],
        },
        1,
    );
    let done_lit = ast.push_at(NodeKind::LiteralString(done), 2);
    let echo = ast.push_at(
        NodeKind::Echo {
            args: vec![done_lit],
        },
        2,
    );
    let finally_body = ast.push_at(
        NodeKind::Block {
            statements: vec![echo],
        },
        2,
    );
    let try_stmt = ast.push_at(
        NodeKind::Try {
            body: try_body,
            catches: vec![],
            finally: Some(finally_body),
        },
        1,
    );
    let x_read = ast.push_at(NodeKind::Variable(x), 3);
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(x_read),
        },
        3,
    );
    finish(&mut ast, vec![try_stmt, ret]);

    let module = compile(&ast);
    let text = serialize_module(&module);
    assert!(text.contains("  try.begin\n"));
    assert!(text.contains("  try.end\n"));
    let end_at = text.find("try.end").unwrap();
    let echo_at = text.find("call @php_echo").unwrap();
    assert!(
        end_at < echo_at,
        "the finally body runs after try.end:\n{}",
        text
    );
    assert!(module.strings.iter().any(|s| s == "done"));
    assert!(text.contains("  ret %0\n"), "returns the try-assigned value:\n{}", text);
}

#[test]
fn finally_clones_onto_return_path() {
    // try { return 1; } finally { echo "done"; }
    let mut ast = Ast::new("script.php");
    let done = ast.intern("done");

    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let ret_one = ast.push_at(NodeKind::Return { value: Some(one) }, 1);
    let try_body = ast.push_at(
        NodeKind::Block {
            statements: vec![ret_one],
        },
        1,
    );
    let done_lit = ast.push_at(NodeKind::LiteralString(done), 2);
    let echo = ast.push_at(
        NodeKind::Echo {
            args: vec![done_lit],
        },
        2,
    );
    let finally_body = ast.push_at(
        NodeKind::Block {
            statements: vec![echo],
        },
        2,
    );
    let try_stmt = ast.push_at(
        NodeKind::Try {
            body: try_body,
            catches: vec![],
            finally: Some(finally_body),
        },
        1,
    );
    finish(&mut ast, vec![try_stmt]);

    let module = compile(&ast);
    // the return value is computed first, the finally clone runs, and the
    // ret still hands back the pre-finally register
    assert_eq!(
        serialize_module(&module),
        "; Module: script\n\
         ; Source: script.php\n\
         \n\
         define export php_value @main() {\n\
         entry:\n\
         \x20 try.begin\n\
         \x20 %0 = const.i64 1\n\
         \x20 %1 = const.string $0\n\
         \x20 call @php_echo(%1) : void\n\
         \x20 ret %0\n\
         }\n"
    );
    assert_eq!(module.strings.get(phpc::ast::StringId(0)), Some("done"));
}

#[test]
fn foreach_lowers_through_runtime_iterator_calls() {
    // foreach ([1] as $v) { echo $v; }
    let mut ast = Ast::new("script.php");
    let v = ast.intern("v");
    let one = ast.push_at(NodeKind::LiteralInt(1), 1);
    let array = ast.push_at(
        NodeKind::ArrayInit {
            elements: vec![ArrayElement {
                key: None,
                value: one,
            }],
        },
        1,
    );
    let v_read = ast.push_at(NodeKind::Variable(v), 2);
    let echo = ast.push_at(NodeKind::Echo { args: vec![v_read] }, 2);
    let body = ast.push_at(
        NodeKind::Block {
            statements: vec![echo],
        },
        2,
    );
    let foreach = ast.push_at(
        NodeKind::Foreach {
            iterable: array,
            key_var: None,
            value_var: v,
            body,
        },
        1,
    );
    finish(&mut ast, vec![foreach]);

    let module = compile(&ast);
    let text = serialize_module(&module);
    for name in [
        "php_iter_new",
        "php_iter_valid",
        "php_iter_current",
        "php_iter_next",
    ] {
        assert!(text.contains(name), "missing {} in:\n{}", name, text);
    }
    assert!(text.contains("call @php_echo"));
}

#[test]
fn malformed_ast_reports_and_aborts() {
    let mut ast = Ast::new("script.php");
    let ret = ast.push_at(
        NodeKind::Return {
            value: Some(NodeId(424242)),
        },
        1,
    );
    finish(&mut ast, vec![ret]);

    let config = CompilerConfig::default();
    let mut diagnostics = DiagnosticEngine::new();
    let result = IrBuilder::new(&ast, &config, &mut diagnostics).build();
    assert!(matches!(result, Err(CompileError::MalformedAst(_))));
    assert_eq!(diagnostics.error_count(), 1);
}

//! IR construction
//!
//! The builder walks the AST and emits SSA IR, keeping a cursor of the
//! current module, function and block. It is split into focused submodules:
//!
//! - this file: builder state, statement dispatch, variable versioning and
//!   phi insertion, function lowering
//! - `expressions`: expression lowering
//! - `control_flow`: block skeletons for if/while/for/foreach/switch/match/try
//! - `fold`: compile-time evaluation of constant-only expressions
//!
//! # Variable versioning
//!
//! Variables are function-scoped, as in the source language. The builder
//! keeps one map from variable name to its current defining register. Each
//! assignment produces a fresh register; when control flow merges, names
//! whose registers differ across the incoming edges are materialized as phi
//! nodes in the merge block.
//!
//! # Error strategy
//!
//! Semantic problems (undefined variables, bad assignment targets) are
//! reported to the diagnostics engine and recovered from with a synthetic
//! value, so one bad line does not hide the next. Only a malformed AST or a
//! broken SSA invariant aborts the module, via [`CompileError`].

mod control_flow;
mod expressions;
mod fold;

use crate::CompileError;
use crate::ast::{Ast, Node, NodeId, NodeKind, ParamDecl, SourceLocation, StringId};
use crate::config::CompilerConfig;
use crate::diagnostics::DiagnosticEngine;
use crate::infer::TypeInferencer;
use crate::ir::{
    BlockId, Function, Instruction, Module, Op, Param, Register, Terminator, verify_function,
};
use crate::symbols::{ParamInfo, ScopeKind, SymbolKind, SymbolTable};
use crate::types::{ConcreteType, InferredType, IrType};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Variable name to current defining register, for one function.
type VarEnv = HashMap<String, Register>;

pub struct IrBuilder<'a> {
    ast: &'a Ast,
    config: &'a CompilerConfig,
    diags: &'a mut DiagnosticEngine,
    symbols: SymbolTable,
    module: Module,
    current_fn: usize,
    current_block: BlockId,
    env: VarEnv,
    label_counts: HashMap<String, usize>,
    /// Declaration nodes already hoisted (or rejected) so statement lowering
    /// does not process them again.
    handled_decls: HashSet<NodeId>,
    /// Nodes that already produced a fold warning, so nested fold attempts
    /// do not repeat it.
    pub(super) fold_warned: HashSet<NodeId>,
    /// Finally bodies of the try statements currently being lowered,
    /// outermost first. Every exit path (fall-through, return, throw)
    /// clones the pending bodies before it leaves.
    finally_stack: Vec<NodeId>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(
        ast: &'a Ast,
        config: &'a CompilerConfig,
        diags: &'a mut DiagnosticEngine,
    ) -> Self {
        let module_name = config.module_name.clone().unwrap_or_else(|| {
            std::path::Path::new(&ast.file)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| ast.file.clone())
        });
        IrBuilder {
            ast,
            config,
            diags,
            symbols: SymbolTable::new(),
            module: Module::new(module_name, ast.file.clone()),
            current_fn: 0,
            current_block: BlockId(0),
            env: VarEnv::new(),
            label_counts: HashMap::new(),
            handled_decls: HashSet::new(),
            fold_warned: HashSet::new(),
            finally_stack: Vec::new(),
        }
    }

    /// The symbol table, for pre-registering functions, classes and
    /// constants discovered by a multi-file resolver. Pre-registration must
    /// happen before [`IrBuilder::build`] and against the global scope.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Lower the whole unit. Returns the module even when semantic
    /// diagnostics were recorded; callers gate on the diagnostic engine.
    pub fn build(mut self) -> Result<Module, CompileError> {
        let root = self.ast.root;
        let statements = match &self.node(root)?.kind {
            NodeKind::Program { statements } => statements.clone(),
            other => {
                let msg = format!("root node is not a program (found {:?})", other);
                self.diags.error(self.location_of(root), msg.clone());
                return Err(CompileError::MalformedAst(msg));
            }
        };

        // Hoist function declarations so calls can resolve regardless of
        // declaration order.
        let mut decls = Vec::new();
        for &stmt in &statements {
            if let NodeKind::FunctionDecl { .. } = self.node(stmt)?.kind
                && self.hoist_declaration(stmt)?
            {
                decls.push(stmt);
            }
        }

        // Top-level statements become the exported entry function.
        let entry_name = self.config.entry_function.clone();
        let mut entry = Function::new(
            entry_name,
            Vec::new(),
            IrType::PhpValue,
            SourceLocation::none(),
        );
        entry.is_exported = true;
        self.begin_function(entry);
        self.symbols.enter_scope(ScopeKind::Function, None);
        for &stmt in &statements {
            self.lower_statement(stmt)?;
        }
        self.finish_function();
        self.symbols.leave_scope();

        for decl in decls {
            self.lower_function_decl(decl)?;
        }

        for func in &self.module.functions {
            if let Err(problems) = verify_function(func) {
                return Err(CompileError::Invariant(problems.join("; ")));
            }
        }
        Ok(self.module)
    }

    // ------------------------------------------------------------------
    // Node access

    pub(super) fn node(&mut self, id: NodeId) -> Result<&'a Node, CompileError> {
        match self.ast.node(id) {
            Some(node) => Ok(node),
            None => {
                let msg = format!("node index {} is out of bounds", id.0);
                self.diags.error(SourceLocation::none(), msg.clone());
                Err(CompileError::MalformedAst(msg))
            }
        }
    }

    fn location_of(&self, id: NodeId) -> SourceLocation {
        self.ast
            .node(id)
            .map(|n| n.location.clone())
            .unwrap_or_else(SourceLocation::none)
    }

    pub(super) fn str_of(&mut self, id: StringId) -> Result<&'a str, CompileError> {
        match self.ast.str(id) {
            Some(s) => Ok(s),
            None => {
                let msg = format!("string index {} is out of bounds", id.0);
                self.diags.error(SourceLocation::none(), msg.clone());
                Err(CompileError::MalformedAst(msg))
            }
        }
    }

    pub(super) fn infer_type(&self, node: NodeId) -> InferredType {
        TypeInferencer::new(self.ast).infer(node, &self.symbols)
    }

    // ------------------------------------------------------------------
    // Cursor and emission

    pub(super) fn func(&mut self) -> &mut Function {
        &mut self.module.functions[self.current_fn]
    }

    pub(super) fn func_ref(&self) -> &Function {
        &self.module.functions[self.current_fn]
    }

    pub(super) fn position_at(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub(super) fn terminated(&self) -> bool {
        self.func_ref().block(self.current_block).is_terminated()
    }

    /// Reposition into a fresh block when the current one is already
    /// terminated, so statements after a `return` still lower (as dead
    /// code) instead of corrupting a finished block.
    pub(super) fn ensure_open(&mut self) {
        if self.terminated() {
            let label = self.fresh_label("dead");
            let block = self.func().add_block(label);
            self.position_at(block);
        }
    }

    /// Unique-per-function block label: the first use of a base name is the
    /// name itself, later uses get a numeric suffix.
    pub(super) fn fresh_label(&mut self, base: &str) -> String {
        let count = self.label_counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{}{}", base, *count - 1)
        }
    }

    /// Emit a value-producing instruction into the current block.
    pub(super) fn emit(&mut self, op: Op, ty: IrType, location: SourceLocation) -> Register {
        let block = self.current_block;
        let func = self.func();
        let result = func.new_register(ty);
        func.block_mut(block).instructions.push(Instruction {
            result: Some(result.clone()),
            op,
            location,
        });
        result
    }

    /// Emit a void instruction into the current block.
    pub(super) fn emit_void(&mut self, op: Op, location: SourceLocation) {
        let block = self.current_block;
        self.func().block_mut(block).instructions.push(Instruction {
            result: None,
            op,
            location,
        });
    }

    pub(super) fn terminate(&mut self, terminator: Terminator) {
        let block = self.current_block;
        self.func().terminate(block, terminator);
    }

    // ------------------------------------------------------------------
    // Variable versioning

    pub(super) fn lookup_var(&self, name: &str) -> Option<Register> {
        self.env.get(name).cloned()
    }

    pub(super) fn bind_var(&mut self, name: &str, reg: Register) {
        self.env.insert(name.to_string(), reg);
    }

    pub(super) fn snapshot_env(&self) -> VarEnv {
        self.env.clone()
    }

    pub(super) fn restore_env(&mut self, env: VarEnv) {
        self.env = env;
    }

    /// Insert phi nodes for a merge block. `preds` are the incoming edges
    /// with the variable environment each one ends with; the current block
    /// must be the (still empty) merge block. Rebinds the environment to
    /// the merged state.
    pub(super) fn insert_phis(&mut self, preds: &[(BlockId, VarEnv)], location: &SourceLocation) {
        debug_assert!(!preds.is_empty());
        let mut names: Vec<&String> = preds[0]
            .1
            .keys()
            .filter(|name| preds.iter().all(|(_, env)| env.contains_key(*name)))
            .collect();
        names.sort();

        let mut merged = VarEnv::new();
        for name in names {
            let first = &preds[0].1[name];
            if preds.iter().all(|(_, env)| env[name].id == first.id) {
                merged.insert(name.clone(), first.clone());
                continue;
            }
            let ty = if preds.iter().all(|(_, env)| env[name].ty == first.ty) {
                first.ty.clone()
            } else {
                IrType::PhpValue
            };
            let incoming = preds
                .iter()
                .map(|(block, env)| (env[name].clone(), *block))
                .collect();
            let phi = self.emit(Op::Phi { incoming }, ty, location.clone());
            merged.insert(name.clone(), phi);
        }
        self.env = merged;
    }

    /// Create loop-carried phis in a loop header for every variable the
    /// loop body may reassign. Returns handles used to patch in the
    /// back-edge incoming once the body is lowered.
    pub(super) fn begin_loop_phis(
        &mut self,
        assigned: &[String],
        preheader: BlockId,
        location: &SourceLocation,
    ) -> Vec<(String, usize, Register)> {
        let header = self.current_block;
        let mut phis = Vec::new();
        for name in assigned {
            let Some(current) = self.lookup_var(name) else {
                continue;
            };
            let ty = current.ty.clone();
            let phi = self.emit(
                Op::Phi {
                    incoming: vec![(current, preheader)],
                },
                ty,
                location.clone(),
            );
            let index = self.func_ref().block(header).instructions.len() - 1;
            self.bind_var(name, phi.clone());
            phis.push((name.clone(), index, phi));
        }
        phis
    }

    /// Patch the back-edge incoming of loop header phis with the register
    /// each variable holds at the end of the loop body.
    pub(super) fn close_loop_phis(
        &mut self,
        header: BlockId,
        back_edge: BlockId,
        phis: &[(String, usize, Register)],
        body_env: &VarEnv,
    ) {
        for (name, index, _) in phis {
            let Some(end_reg) = body_env.get(name).cloned() else {
                continue;
            };
            let func = self.func();
            if let Op::Phi { incoming } = &mut func.block_mut(header).instructions[*index].op {
                incoming.push((end_reg, back_edge));
            }
        }
    }

    /// Names a statement subtree may assign to. Used for loop-carried phi
    /// placement; over-approximation is harmless (an unchanged variable
    /// gets a phi whose incomings agree), missing a name is not.
    pub(super) fn collect_assigned_vars(&self, node: NodeId, out: &mut Vec<String>) {
        let Some(n) = self.ast.node(node) else {
            return;
        };
        match &n.kind {
            NodeKind::Assign { target, value } => {
                if let Some(Node {
                    kind: NodeKind::Variable(name),
                    ..
                }) = self.ast.node(*target)
                    && let Some(name) = self.ast.str(*name)
                {
                    out.push(name.to_string());
                }
                self.collect_assigned_vars(*target, out);
                self.collect_assigned_vars(*value, out);
            }
            NodeKind::Postfix { target, .. } => {
                if let Some(Node {
                    kind: NodeKind::Variable(name),
                    ..
                }) = self.ast.node(*target)
                    && let Some(name) = self.ast.str(*name)
                {
                    out.push(name.to_string());
                }
            }
            NodeKind::Foreach {
                iterable,
                key_var,
                value_var,
                body,
            } => {
                if let Some(name) = self.ast.str(*value_var) {
                    out.push(name.to_string());
                }
                if let Some(key) = key_var
                    && let Some(name) = self.ast.str(*key)
                {
                    out.push(name.to_string());
                }
                self.collect_assigned_vars(*iterable, out);
                self.collect_assigned_vars(*body, out);
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                self.collect_assigned_vars(*lhs, out);
                self.collect_assigned_vars(*rhs, out);
            }
            NodeKind::Unary { operand, .. } => self.collect_assigned_vars(*operand, out),
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.collect_assigned_vars(*condition, out);
                self.collect_assigned_vars(*then_expr, out);
                self.collect_assigned_vars(*else_expr, out);
            }
            NodeKind::Call { args, .. } | NodeKind::Echo { args } => {
                for arg in args {
                    self.collect_assigned_vars(*arg, out);
                }
            }
            NodeKind::MethodCall { object, args, .. } => {
                self.collect_assigned_vars(*object, out);
                for arg in args {
                    self.collect_assigned_vars(*arg, out);
                }
            }
            NodeKind::StaticCall { args, .. } => {
                for arg in args {
                    self.collect_assigned_vars(*arg, out);
                }
            }
            NodeKind::PropertyAccess { object, .. } => self.collect_assigned_vars(*object, out),
            NodeKind::ArrayAccess { array, index } => {
                self.collect_assigned_vars(*array, out);
                self.collect_assigned_vars(*index, out);
            }
            NodeKind::ArrayInit { elements } => {
                for element in elements {
                    if let Some(key) = element.key {
                        self.collect_assigned_vars(key, out);
                    }
                    self.collect_assigned_vars(element.value, out);
                }
            }
            NodeKind::StringInterpolation { parts } => {
                for part in parts {
                    self.collect_assigned_vars(*part, out);
                }
            }
            NodeKind::Match { subject, arms } => {
                self.collect_assigned_vars(*subject, out);
                for arm in arms {
                    for cond in &arm.conditions {
                        self.collect_assigned_vars(*cond, out);
                    }
                    self.collect_assigned_vars(arm.body, out);
                }
            }
            NodeKind::Program { statements } | NodeKind::Block { statements } => {
                for stmt in statements {
                    self.collect_assigned_vars(*stmt, out);
                }
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.collect_assigned_vars(*condition, out);
                self.collect_assigned_vars(*then_branch, out);
                if let Some(e) = else_branch {
                    self.collect_assigned_vars(*e, out);
                }
            }
            NodeKind::While { condition, body } => {
                self.collect_assigned_vars(*condition, out);
                self.collect_assigned_vars(*body, out);
            }
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                for part in [init, condition, step].into_iter().flatten() {
                    self.collect_assigned_vars(*part, out);
                }
                self.collect_assigned_vars(*body, out);
            }
            NodeKind::Return { value } => {
                if let Some(v) = value {
                    self.collect_assigned_vars(*v, out);
                }
            }
            NodeKind::Throw { value } => self.collect_assigned_vars(*value, out),
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                self.collect_assigned_vars(*body, out);
                for catch in catches {
                    if let Some(name) = self.ast.str(catch.variable) {
                        out.push(name.to_string());
                    }
                    self.collect_assigned_vars(catch.body, out);
                }
                if let Some(f) = finally {
                    self.collect_assigned_vars(*f, out);
                }
            }
            NodeKind::Switch { subject, cases } => {
                self.collect_assigned_vars(*subject, out);
                for case in cases {
                    if let Some(v) = case.value {
                        self.collect_assigned_vars(v, out);
                    }
                    for stmt in &case.body {
                        self.collect_assigned_vars(*stmt, out);
                    }
                }
            }
            // function bodies have their own environment
            NodeKind::FunctionDecl { .. } | NodeKind::Closure | NodeKind::ArrowFunction => {}
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Statements

    pub(super) fn lower_statement(&mut self, node: NodeId) -> Result<(), CompileError> {
        self.ensure_open();
        let n = self.node(node)?;
        let loc = n.location.clone();
        match &n.kind {
            NodeKind::Block { statements } | NodeKind::Program { statements } => {
                for &stmt in statements {
                    self.lower_statement(stmt)?;
                }
                Ok(())
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(*condition, *then_branch, *else_branch, &loc),
            NodeKind::While { condition, body } => self.lower_while(*condition, *body, &loc),
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => self.lower_for(*init, *condition, *step, *body, &loc),
            NodeKind::Foreach {
                iterable,
                key_var,
                value_var,
                body,
            } => self.lower_foreach(*iterable, *key_var, *value_var, *body, &loc),
            NodeKind::Switch { subject, cases } => {
                let cases = cases.clone();
                self.lower_switch(*subject, &cases, &loc)
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                let catches = catches.clone();
                self.lower_try(*body, &catches, *finally, &loc)
            }
            NodeKind::Return { value } => self.lower_return(*value, &loc),
            NodeKind::Echo { args } => {
                let args = args.clone();
                for arg in args {
                    let reg = self.lower_expr(arg)?;
                    self.emit_void(
                        Op::Call {
                            func_name: "php_echo".to_string(),
                            args: vec![reg],
                            return_type: IrType::Void,
                        },
                        loc.clone(),
                    );
                }
                Ok(())
            }
            NodeKind::Throw { value } => {
                let reg = self.lower_expr(*value)?;
                self.lower_pending_finallys()?;
                if !self.terminated() {
                    self.terminate(Terminator::Throw(reg));
                }
                Ok(())
            }
            NodeKind::FunctionDecl { .. } => {
                if !self.handled_decls.contains(&node) {
                    self.diags.warning(
                        loc,
                        "nested function declarations are not supported; declaration ignored",
                    );
                }
                Ok(())
            }
            _ => {
                // expression used as a statement
                self.lower_expr_discard(node)?;
                Ok(())
            }
        }
    }

    fn lower_return(
        &mut self,
        value: Option<NodeId>,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        match value {
            Some(expr) => {
                // the return value is computed before any finally body runs
                let reg = self.lower_expr(expr)?;
                self.lower_pending_finallys()?;
                if !self.terminated() {
                    self.terminate(Terminator::Ret(Some(reg)));
                }
            }
            None => {
                self.lower_pending_finallys()?;
                if self.terminated() {
                    return Ok(());
                }
                if self.func_ref().return_type.is_void() {
                    self.terminate(Terminator::Ret(None));
                } else {
                    let null = self.emit(Op::ConstNull, IrType::PhpValue, loc.clone());
                    self.terminate(Terminator::Ret(Some(null)));
                }
            }
        }
        Ok(())
    }

    /// Clone one finally body on a fall-through path. The body is popped
    /// off the pending stack while it lowers, so an exit inside it clones
    /// only the outer bodies.
    pub(super) fn lower_finally_clone(&mut self, body: NodeId) -> Result<(), CompileError> {
        let popped = self.finally_stack.pop();
        self.lower_statement(body)?;
        if let Some(f) = popped {
            self.finally_stack.push(f);
        }
        Ok(())
    }

    /// Clone every enclosing finally body, innermost first. Runs before a
    /// return or throw leaves the function; stops early when a finally
    /// body terminates on its own (its exit wins, as in the source
    /// language).
    fn lower_pending_finallys(&mut self) -> Result<(), CompileError> {
        let saved = self.finally_stack.clone();
        while let Some(f) = self.finally_stack.pop() {
            self.lower_statement(f)?;
            if self.terminated() {
                break;
            }
        }
        self.finally_stack = saved;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions

    /// Register a top-level function declaration in the symbol table.
    /// Returns whether the declaration should be lowered.
    fn hoist_declaration(&mut self, node: NodeId) -> Result<bool, CompileError> {
        let n = self.node(node)?;
        let loc = n.location.clone();
        let NodeKind::FunctionDecl {
            name,
            params,
            return_type,
            ..
        } = &n.kind
        else {
            return Ok(false);
        };
        let (params, return_type) = (params.clone(), *return_type);
        let name = self.str_of(*name)?.to_string();
        self.handled_decls.insert(node);

        if name.starts_with("php_") {
            self.diags
                .error(
                    loc,
                    format!(
                        "cannot define '{}': names prefixed 'php_' are reserved for the runtime",
                        name
                    ),
                )
                .with_hint("rename the function");
            return Ok(false);
        }
        if self.symbols.lookup_function(&name).is_some() {
            self.diags.error(
                loc,
                format!("duplicate definition of function '{}'", name),
            );
            return Ok(false);
        }

        let mut infos = Vec::new();
        for param in &params {
            let pname = self.str_of(param.name)?.to_string();
            let ty = self.hint_type(param.type_hint);
            infos.push(ParamInfo { name: pname, ty });
        }
        let ret = self.hint_type(return_type);
        self.symbols.define_function(&name, infos, ret, loc);
        Ok(true)
    }

    fn hint_type(&self, hint: Option<NodeId>) -> InferredType {
        match hint {
            Some(node) => self.infer_type(node),
            None => InferredType::Dynamic,
        }
    }

    fn lower_function_decl(&mut self, node: NodeId) -> Result<(), CompileError> {
        let n = self.node(node)?;
        let loc = n.location.clone();
        let NodeKind::FunctionDecl {
            name,
            params,
            return_type,
            body,
        } = &n.kind
        else {
            return Ok(());
        };
        let (params, return_type, body) = (params.clone(), *return_type, *body);
        let name = self.str_of(*name)?.to_string();

        let ir_params = self.lower_params(&params)?;
        let ret_ty = self.hint_type(return_type).to_ir_type();
        let func = Function::new(&name, ir_params, ret_ty, loc.clone());
        self.begin_function(func);

        self.symbols.enter_scope(ScopeKind::Function, Some(&name));
        for (index, param) in params.iter().enumerate() {
            let pname = self.str_of(param.name)?.to_string();
            let ty = self.hint_type(param.type_hint);
            self.symbols.define_variable(&pname, ty, loc.clone());
            let reg = self.func_ref().param_register(index);
            self.bind_var(&pname, reg);
        }
        self.lower_statement(body)?;
        self.finish_function();
        self.symbols.leave_scope();
        Ok(())
    }

    fn lower_params(&mut self, params: &[ParamDecl]) -> Result<Vec<Param>, CompileError> {
        let mut out = Vec::new();
        for param in params {
            let name = self.str_of(param.name)?.to_string();
            let ty = self.hint_type(param.type_hint).to_ir_type();
            out.push(Param { name, ty });
        }
        Ok(out)
    }

    /// Push a new function, reset per-function state and open its entry
    /// block.
    fn begin_function(&mut self, func: Function) {
        self.module.functions.push(func);
        self.current_fn = self.module.functions.len() - 1;
        self.env = VarEnv::new();
        self.label_counts = HashMap::new();
        self.finally_stack = Vec::new();
        let entry = self.func().add_block("entry");
        self.position_at(entry);
    }

    /// Terminate the epilogue and log what was built.
    fn finish_function(&mut self) {
        if !self.terminated() {
            if self.func_ref().return_type.is_void() {
                self.terminate(Terminator::Ret(None));
            } else {
                let null = self.emit(Op::ConstNull, IrType::PhpValue, SourceLocation::none());
                self.terminate(Terminator::Ret(Some(null)));
            }
        }
        let func = self.func_ref();
        let instructions: usize = func.blocks.iter().map(|b| b.instructions.len()).sum();
        debug!(
            function = %func.name,
            blocks = func.blocks.len(),
            instructions,
            "lowered function"
        );
    }

    // ------------------------------------------------------------------
    // Shared diagnostics helpers

    /// Report a read of a variable that has no definition yet and produce
    /// the synthetic null the lowering continues with.
    pub(super) fn undefined_variable(&mut self, name: &str, loc: &SourceLocation) -> Register {
        self.diags
            .error(loc.clone(), format!("Undefined variable ${}", name));
        self.emit(Op::ConstNull, IrType::PhpValue, loc.clone())
    }

    /// True when `name` is bound to something that is not a variable (a
    /// function, class or constant), which makes it an invalid assignment
    /// target.
    pub(super) fn is_non_variable_symbol(&self, name: &str) -> bool {
        match self.symbols.lookup(name) {
            Some(symbol) => !matches!(
                symbol.kind,
                SymbolKind::Variable | SymbolKind::Parameter
            ),
            None => false,
        }
    }

    /// Record the assignment in the symbol table so later inference sees
    /// the variable's current type.
    pub(super) fn note_variable_type(
        &mut self,
        name: &str,
        ty: InferredType,
        loc: &SourceLocation,
    ) {
        let defined = matches!(
            self.symbols.lookup(name),
            Some(symbol) if symbol.kind == SymbolKind::Variable
        );
        if defined {
            self.symbols.update_type(name, ty);
        } else {
            self.symbols.define_variable(name, ty, loc.clone());
        }
    }

    pub(super) fn warn_never_use(&mut self, ty: &InferredType, loc: &SourceLocation) {
        if *ty == InferredType::Concrete(ConcreteType::Never) {
            self.diags.warning(
                loc.clone(),
                "this expression has type never and produces no value",
            );
        }
    }
}

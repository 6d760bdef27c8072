//! Control-flow lowering
//!
//! Block skeletons for conditionals, loops, switch/match and try/catch.
//! Merge blocks are created only once a branch actually falls through, so
//! constructs whose arms all leave (return/throw) do not grow an empty
//! unreachable block. Terminators are set late where a target block cannot
//! exist yet; instruction emission order always follows block creation
//! order, which keeps register ids monotone.

use super::{IrBuilder, VarEnv};
use crate::CompileError;
use crate::ast::{CatchClause, MatchArm, NodeId, NodeKind, SourceLocation, StringId, SwitchCase};
use crate::ir::{BlockId, Op, Register, Terminator};
use crate::types::{InferredType, IrType};

impl IrBuilder<'_> {
    pub(super) fn lower_if(
        &mut self,
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let cond = self.lower_expr(condition)?;
        let cond_block = self.current_block;
        let pre_env = self.snapshot_env();

        match else_branch {
            Some(else_node) => {
                let then_label = self.fresh_label("then");
                let then_bb = self.func().add_block(then_label);
                let else_label = self.fresh_label("else");
                let else_bb = self.func().add_block(else_label);
                self.func().terminate(
                    cond_block,
                    Terminator::CondBr {
                        cond,
                        then_block: then_bb,
                        else_block: else_bb,
                    },
                );

                self.position_at(then_bb);
                self.restore_env(pre_env.clone());
                self.lower_statement(then_branch)?;
                let then_exit =
                    (!self.terminated()).then(|| (self.current_block, self.snapshot_env()));

                self.position_at(else_bb);
                self.restore_env(pre_env);
                self.lower_statement(else_node)?;
                let else_exit =
                    (!self.terminated()).then(|| (self.current_block, self.snapshot_env()));

                let exits: Vec<(BlockId, VarEnv)> =
                    [then_exit, else_exit].into_iter().flatten().collect();
                if exits.is_empty() {
                    // both arms left the function; anything after is dead
                    return Ok(());
                }
                let merge_label = self.fresh_label("merge");
                let merge = self.func().add_block(merge_label);
                for (block, _) in &exits {
                    self.func().terminate(*block, Terminator::Br(merge));
                }
                self.position_at(merge);
                self.insert_phis(&exits, loc);
            }
            None => {
                let then_label = self.fresh_label("then");
                let then_bb = self.func().add_block(then_label);
                self.position_at(then_bb);
                self.restore_env(pre_env.clone());
                self.lower_statement(then_branch)?;
                let then_exit =
                    (!self.terminated()).then(|| (self.current_block, self.snapshot_env()));

                let merge_label = self.fresh_label("merge");
                let merge = self.func().add_block(merge_label);
                self.func().terminate(
                    cond_block,
                    Terminator::CondBr {
                        cond,
                        then_block: then_bb,
                        else_block: merge,
                    },
                );
                let mut preds = vec![(cond_block, pre_env)];
                if let Some((block, env)) = then_exit {
                    self.func().terminate(block, Terminator::Br(merge));
                    preds.push((block, env));
                }
                self.position_at(merge);
                self.insert_phis(&preds, loc);
            }
        }
        Ok(())
    }

    pub(super) fn lower_while(
        &mut self,
        condition: NodeId,
        body: NodeId,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let mut assigned = Vec::new();
        self.collect_assigned_vars(body, &mut assigned);
        self.collect_assigned_vars(condition, &mut assigned);
        assigned.sort();
        assigned.dedup();

        let preheader = self.current_block;
        let header_label = self.fresh_label("while_header");
        let header = self.func().add_block(header_label);
        self.terminate(Terminator::Br(header));
        self.position_at(header);
        let phis = self.begin_loop_phis(&assigned, preheader, loc);

        let cond = self.lower_expr(condition)?;
        let body_label = self.fresh_label("while_body");
        let body_bb = self.func().add_block(body_label);
        let exit_label = self.fresh_label("while_exit");
        let exit_bb = self.func().add_block(exit_label);
        self.terminate(Terminator::CondBr {
            cond,
            then_block: body_bb,
            else_block: exit_bb,
        });
        let header_env = self.snapshot_env();

        self.position_at(body_bb);
        self.lower_statement(body)?;
        if !self.terminated() {
            let back_edge = self.current_block;
            self.terminate(Terminator::Br(header));
            let body_env = self.snapshot_env();
            self.close_loop_phis(header, back_edge, &phis, &body_env);
        }

        self.position_at(exit_bb);
        self.restore_env(header_env);
        Ok(())
    }

    pub(super) fn lower_for(
        &mut self,
        init: Option<NodeId>,
        condition: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        if let Some(init) = init {
            self.lower_expr_discard(init)?;
        }

        let mut assigned = Vec::new();
        self.collect_assigned_vars(body, &mut assigned);
        for part in [condition, step].into_iter().flatten() {
            self.collect_assigned_vars(part, &mut assigned);
        }
        assigned.sort();
        assigned.dedup();

        let preheader = self.current_block;
        let header_label = self.fresh_label("for_header");
        let header = self.func().add_block(header_label);
        self.terminate(Terminator::Br(header));
        self.position_at(header);
        let phis = self.begin_loop_phis(&assigned, preheader, loc);

        let cond = match condition {
            Some(c) => self.lower_expr(c)?,
            // for (;;) runs until something inside leaves
            None => self.emit(Op::ConstBool(true), IrType::Bool, loc.clone()),
        };
        let body_label = self.fresh_label("for_body");
        let body_bb = self.func().add_block(body_label);
        let exit_label = self.fresh_label("for_exit");
        let exit_bb = self.func().add_block(exit_label);
        self.terminate(Terminator::CondBr {
            cond,
            then_block: body_bb,
            else_block: exit_bb,
        });
        let header_env = self.snapshot_env();

        self.position_at(body_bb);
        self.lower_statement(body)?;
        if !self.terminated() {
            if let Some(step) = step {
                self.lower_expr_discard(step)?;
            }
            if !self.terminated() {
                let back_edge = self.current_block;
                self.terminate(Terminator::Br(header));
                let body_env = self.snapshot_env();
                self.close_loop_phis(header, back_edge, &phis, &body_env);
            }
        }

        self.position_at(exit_bb);
        self.restore_env(header_env);
        Ok(())
    }

    /// Foreach has no dedicated IR op; it lowers to opaque runtime iterator
    /// calls around the usual loop skeleton.
    pub(super) fn lower_foreach(
        &mut self,
        iterable: NodeId,
        key_var: Option<StringId>,
        value_var: StringId,
        body: NodeId,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let source = self.lower_expr(iterable)?;
        let iter = self.emit(
            Op::Call {
                func_name: "php_iter_new".to_string(),
                args: vec![source],
                return_type: IrType::PhpValue,
            },
            IrType::PhpValue,
            loc.clone(),
        );

        let mut assigned = Vec::new();
        self.collect_assigned_vars(body, &mut assigned);
        assigned.push(self.str_of(value_var)?.to_string());
        if let Some(key) = key_var {
            assigned.push(self.str_of(key)?.to_string());
        }
        assigned.sort();
        assigned.dedup();

        let preheader = self.current_block;
        let header_label = self.fresh_label("foreach_header");
        let header = self.func().add_block(header_label);
        self.terminate(Terminator::Br(header));
        self.position_at(header);
        let phis = self.begin_loop_phis(&assigned, preheader, loc);

        let valid = self.emit(
            Op::Call {
                func_name: "php_iter_valid".to_string(),
                args: vec![iter.clone()],
                return_type: IrType::Bool,
            },
            IrType::Bool,
            loc.clone(),
        );
        let body_label = self.fresh_label("foreach_body");
        let body_bb = self.func().add_block(body_label);
        let exit_label = self.fresh_label("foreach_exit");
        let exit_bb = self.func().add_block(exit_label);
        self.terminate(Terminator::CondBr {
            cond: valid,
            then_block: body_bb,
            else_block: exit_bb,
        });
        let header_env = self.snapshot_env();

        self.position_at(body_bb);
        let value = self.emit(
            Op::Call {
                func_name: "php_iter_current".to_string(),
                args: vec![iter.clone()],
                return_type: IrType::PhpValue,
            },
            IrType::PhpValue,
            loc.clone(),
        );
        let value_name = self.str_of(value_var)?.to_string();
        self.bind_var(&value_name, value);
        self.note_variable_type(&value_name, InferredType::Dynamic, loc);
        if let Some(key) = key_var {
            let key_reg = self.emit(
                Op::Call {
                    func_name: "php_iter_key".to_string(),
                    args: vec![iter.clone()],
                    return_type: IrType::PhpValue,
                },
                IrType::PhpValue,
                loc.clone(),
            );
            let key_name = self.str_of(key)?.to_string();
            self.bind_var(&key_name, key_reg);
            self.note_variable_type(&key_name, InferredType::Dynamic, loc);
        }
        self.lower_statement(body)?;
        if !self.terminated() {
            self.emit_void(
                Op::Call {
                    func_name: "php_iter_next".to_string(),
                    args: vec![iter],
                    return_type: IrType::Void,
                },
                loc.clone(),
            );
            let back_edge = self.current_block;
            self.terminate(Terminator::Br(header));
            let body_env = self.snapshot_env();
            self.close_loop_phis(header, back_edge, &phis, &body_env);
        }

        self.position_at(exit_bb);
        self.restore_env(header_env);
        Ok(())
    }

    pub(super) fn lower_switch(
        &mut self,
        subject: NodeId,
        cases: &[SwitchCase],
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let subj = self.lower_expr(subject)?;
        let pre_env = self.snapshot_env();

        let valued: Vec<&SwitchCase> = cases.iter().filter(|c| c.value.is_some()).collect();
        let default_case: Option<&SwitchCase> = cases.iter().find(|c| c.value.is_none());

        if valued.is_empty() {
            if let Some(case) = default_case {
                for &stmt in &case.body {
                    self.lower_statement(stmt)?;
                }
            }
            return Ok(());
        }

        // A switch terminator needs every label to be an integer literal.
        let int_labels: Option<Vec<i64>> = valued
            .iter()
            .map(|case| match case.value.and_then(|v| self.ast.node(v)) {
                Some(node) => match node.kind {
                    NodeKind::LiteralInt(v) => Some(v),
                    _ => None,
                },
                None => None,
            })
            .collect();

        if let Some(labels) = int_labels {
            self.lower_switch_jump_table(subj, &valued, default_case, &labels, &pre_env, loc)
        } else {
            self.lower_switch_chain(subj, &valued, default_case, &pre_env, loc)
        }
    }

    fn lower_switch_jump_table(
        &mut self,
        subj: Register,
        valued: &[&SwitchCase],
        default_case: Option<&SwitchCase>,
        labels: &[i64],
        pre_env: &VarEnv,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let subj_block = self.current_block;
        let mut table = Vec::new();
        let mut case_blocks = Vec::new();
        for &label_value in labels {
            let label = self.fresh_label("case");
            let bb = self.func().add_block(label);
            table.push((label_value, bb));
            case_blocks.push(bb);
        }
        let default_bb = match default_case {
            Some(_) => {
                let label = self.fresh_label("default");
                Some(self.func().add_block(label))
            }
            None => None,
        };

        let mut exits: Vec<(BlockId, VarEnv)> = Vec::new();
        for (case, bb) in valued.iter().zip(case_blocks) {
            self.position_at(bb);
            self.restore_env(pre_env.clone());
            for &stmt in &case.body {
                self.lower_statement(stmt)?;
            }
            if !self.terminated() {
                exits.push((self.current_block, self.snapshot_env()));
            }
        }
        if let (Some(case), Some(bb)) = (default_case, default_bb) {
            self.position_at(bb);
            self.restore_env(pre_env.clone());
            for &stmt in &case.body {
                self.lower_statement(stmt)?;
            }
            if !self.terminated() {
                exits.push((self.current_block, self.snapshot_env()));
            }
        }

        let need_merge = !exits.is_empty() || default_bb.is_none();
        let merge = if need_merge {
            let label = self.fresh_label("switch_exit");
            Some(self.func().add_block(label))
        } else {
            None
        };
        let default_target = match default_bb {
            Some(bb) => bb,
            None => merge.expect("merge exists when there is no default"),
        };
        self.func().terminate(
            subj_block,
            Terminator::Switch {
                value: subj,
                cases: table,
                default: default_target,
            },
        );
        if let Some(merge) = merge {
            let mut preds = exits;
            for (block, _) in &preds {
                self.func().terminate(*block, Terminator::Br(merge));
            }
            if default_bb.is_none() {
                preds.push((subj_block, pre_env.clone()));
            }
            self.position_at(merge);
            self.insert_phis(&preds, loc);
        }
        Ok(())
    }

    fn lower_switch_chain(
        &mut self,
        subj: Register,
        valued: &[&SwitchCase],
        default_case: Option<&SwitchCase>,
        pre_env: &VarEnv,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let mut exits: Vec<(BlockId, VarEnv)> = Vec::new();
        // last test falls through to the merge when there is no default
        let mut pending: Option<(BlockId, Register, BlockId)> = None;
        let mut default_bb: Option<BlockId> = None;

        for (index, case) in valued.iter().enumerate() {
            self.restore_env(pre_env.clone());
            let value = case.value.expect("valued case");
            let value_reg = self.lower_expr(value)?;
            let cmp = self.emit(
                Op::Eq {
                    lhs: subj.clone(),
                    rhs: value_reg,
                },
                IrType::Bool,
                loc.clone(),
            );
            let test_block = self.current_block;
            let case_label = self.fresh_label("case");
            let case_bb = self.func().add_block(case_label);

            let is_last = index == valued.len() - 1;
            let next = if !is_last {
                let label = self.fresh_label("case_test");
                Some(self.func().add_block(label))
            } else if default_case.is_some() {
                let label = self.fresh_label("default");
                let bb = self.func().add_block(label);
                default_bb = Some(bb);
                Some(bb)
            } else {
                pending = Some((test_block, cmp.clone(), case_bb));
                None
            };
            if let Some(next) = next {
                self.func().terminate(
                    test_block,
                    Terminator::CondBr {
                        cond: cmp,
                        then_block: case_bb,
                        else_block: next,
                    },
                );
            }

            self.position_at(case_bb);
            self.restore_env(pre_env.clone());
            for &stmt in &case.body {
                self.lower_statement(stmt)?;
            }
            if !self.terminated() {
                exits.push((self.current_block, self.snapshot_env()));
            }

            if let Some(next) = next {
                self.position_at(next);
            }
        }

        if let (Some(case), Some(_)) = (default_case, default_bb) {
            self.restore_env(pre_env.clone());
            for &stmt in &case.body {
                self.lower_statement(stmt)?;
            }
            if !self.terminated() {
                exits.push((self.current_block, self.snapshot_env()));
            }
        }

        if exits.is_empty() && pending.is_none() {
            return Ok(());
        }
        let merge_label = self.fresh_label("switch_exit");
        let merge = self.func().add_block(merge_label);
        let mut preds = exits;
        for (block, _) in &preds {
            self.func().terminate(*block, Terminator::Br(merge));
        }
        if let Some((test_block, cmp, case_bb)) = pending {
            self.func().terminate(
                test_block,
                Terminator::CondBr {
                    cond: cmp,
                    then_block: case_bb,
                    else_block: merge,
                },
            );
            preds.push((test_block, pre_env.clone()));
        }
        self.position_at(merge);
        self.insert_phis(&preds, loc);
        Ok(())
    }

    /// Match is an expression: every arm produces a value and the merge
    /// block selects it with a phi. Arms compare with identity semantics;
    /// an all-integer label set lowers to a switch terminator instead of a
    /// comparison chain.
    pub(super) fn lower_match(
        &mut self,
        node: NodeId,
        subject: NodeId,
        arms: &[MatchArm],
        loc: &SourceLocation,
    ) -> Result<Register, CompileError> {
        let subj = self.lower_expr(subject)?;
        let pre_env = self.snapshot_env();
        let result_ty = self.infer_type(node).to_ir_type();

        let default_arm: Option<&MatchArm> = arms.iter().find(|a| a.is_default());
        let cond_arms: Vec<&MatchArm> = arms.iter().filter(|a| !a.is_default()).collect();

        if cond_arms.is_empty() {
            return match default_arm {
                Some(arm) => self.lower_expr(arm.body),
                None => Ok(self.emit(Op::ConstNull, IrType::PhpValue, loc.clone())),
            };
        }

        let all_int = cond_arms.iter().all(|arm| {
            arm.conditions.iter().all(|&cond| {
                matches!(
                    self.ast.node(cond).map(|n| &n.kind),
                    Some(NodeKind::LiteralInt(_))
                )
            })
        });

        let mut exits: Vec<(BlockId, VarEnv, Register)> = Vec::new();

        if all_int {
            let subj_block = self.current_block;
            let mut table = Vec::new();
            let mut arm_blocks = Vec::new();
            for arm in &cond_arms {
                let label = self.fresh_label("match_arm");
                let bb = self.func().add_block(label);
                for &cond in &arm.conditions {
                    if let Some(NodeKind::LiteralInt(v)) = self.ast.node(cond).map(|n| &n.kind) {
                        table.push((*v, bb));
                    }
                }
                arm_blocks.push(bb);
            }
            let default_label = self.fresh_label("match_default");
            let default_bb = self.func().add_block(default_label);

            for (arm, bb) in cond_arms.iter().zip(arm_blocks) {
                self.position_at(bb);
                self.restore_env(pre_env.clone());
                let value = self.lower_expr(arm.body)?;
                if !self.terminated() {
                    exits.push((self.current_block, self.snapshot_env(), value));
                }
            }
            self.position_at(default_bb);
            self.restore_env(pre_env.clone());
            match default_arm {
                Some(arm) => {
                    let value = self.lower_expr(arm.body)?;
                    if !self.terminated() {
                        exits.push((self.current_block, self.snapshot_env(), value));
                    }
                }
                None => {
                    // unmatched subject: recover with null
                    let value = self.emit(Op::ConstNull, IrType::PhpValue, loc.clone());
                    exits.push((self.current_block, self.snapshot_env(), value));
                }
            }
            self.func().terminate(
                subj_block,
                Terminator::Switch {
                    value: subj,
                    cases: table,
                    default: default_bb,
                },
            );
        } else {
            for (index, arm) in cond_arms.iter().enumerate() {
                self.restore_env(pre_env.clone());
                let mut cmp: Option<Register> = None;
                for &cond in &arm.conditions {
                    let value = self.lower_expr(cond)?;
                    let test = self.emit(
                        Op::Identical {
                            lhs: subj.clone(),
                            rhs: value,
                        },
                        IrType::Bool,
                        loc.clone(),
                    );
                    cmp = Some(match cmp {
                        None => test,
                        Some(prev) => self.emit(
                            Op::Or {
                                lhs: prev,
                                rhs: test,
                            },
                            IrType::Bool,
                            loc.clone(),
                        ),
                    });
                }
                let cmp = cmp.expect("non-default arm has conditions");
                let test_block = self.current_block;
                let arm_label = self.fresh_label("match_arm");
                let arm_bb = self.func().add_block(arm_label);
                let next_label = if index == cond_arms.len() - 1 {
                    self.fresh_label("match_default")
                } else {
                    self.fresh_label("match_test")
                };
                let next = self.func().add_block(next_label);
                self.func().terminate(
                    test_block,
                    Terminator::CondBr {
                        cond: cmp,
                        then_block: arm_bb,
                        else_block: next,
                    },
                );

                self.position_at(arm_bb);
                self.restore_env(pre_env.clone());
                let value = self.lower_expr(arm.body)?;
                if !self.terminated() {
                    exits.push((self.current_block, self.snapshot_env(), value));
                }
                self.position_at(next);
            }

            // positioned at the default block
            self.restore_env(pre_env.clone());
            match default_arm {
                Some(arm) => {
                    let value = self.lower_expr(arm.body)?;
                    if !self.terminated() {
                        exits.push((self.current_block, self.snapshot_env(), value));
                    }
                }
                None => {
                    let value = self.emit(Op::ConstNull, IrType::PhpValue, loc.clone());
                    exits.push((self.current_block, self.snapshot_env(), value));
                }
            }
        }

        if exits.is_empty() {
            // every arm returned or threw; the value is unreachable
            self.ensure_open();
            return Ok(self.emit(Op::ConstNull, IrType::PhpValue, loc.clone()));
        }

        let merge_label = self.fresh_label("match_merge");
        let merge = self.func().add_block(merge_label);
        for (block, _, _) in &exits {
            self.func().terminate(*block, Terminator::Br(merge));
        }
        self.position_at(merge);
        let env_preds: Vec<(BlockId, VarEnv)> =
            exits.iter().map(|(b, e, _)| (*b, e.clone())).collect();
        self.insert_phis(&env_preds, loc);

        let first = exits[0].2.clone();
        if exits.iter().all(|(_, _, r)| r.id == first.id) {
            return Ok(first);
        }
        let incoming = exits.iter().map(|(b, _, r)| (r.clone(), *b)).collect();
        Ok(self.emit(Op::Phi { incoming }, result_ty, loc.clone()))
    }

    pub(super) fn lower_try(
        &mut self,
        body: NodeId,
        catches: &[CatchClause],
        finally: Option<NodeId>,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        self.emit_void(Op::TryBegin, loc.clone());
        let try_entry = self.current_block;
        let pre_env = self.snapshot_env();

        // while the body and the handlers lower, returns and throws inside
        // them clone this finally before leaving
        if let Some(f) = finally {
            self.finally_stack.push(f);
        }

        self.lower_statement(body)?;
        let mut exits: Vec<(BlockId, VarEnv)> = Vec::new();
        if !self.terminated() {
            self.emit_void(Op::TryEnd, loc.clone());
            if let Some(f) = finally {
                self.lower_finally_clone(f)?;
            }
            if !self.terminated() {
                exits.push((self.current_block, self.snapshot_env()));
            }
        }

        for catch in catches {
            let label = self.fresh_label("catch");
            let catch_bb = self.func().add_block(label);
            // the handler is reached through the exception edge
            self.func().link(try_entry, catch_bb);
            self.position_at(catch_bb);
            self.restore_env(pre_env.clone());

            let class = match catch.class_name {
                Some(sid) => Some(self.str_of(sid)?.to_string()),
                None => None,
            };
            self.emit_void(Op::Catch { class }, loc.clone());
            let exception = self.emit(Op::GetException, IrType::PhpValue, loc.clone());
            let var = self.str_of(catch.variable)?.to_string();
            self.bind_var(&var, exception);
            self.note_variable_type(&var, InferredType::Dynamic, loc);

            self.lower_statement(catch.body)?;
            if !self.terminated() {
                if let Some(f) = finally {
                    self.lower_finally_clone(f)?;
                }
                if !self.terminated() {
                    exits.push((self.current_block, self.snapshot_env()));
                }
            }
        }

        if finally.is_some() {
            self.finally_stack.pop();
        }

        if exits.is_empty() {
            return Ok(());
        }
        let merge_label = self.fresh_label("merge");
        let merge = self.func().add_block(merge_label);
        for (block, _) in &exits {
            self.func().terminate(*block, Terminator::Br(merge));
        }
        self.position_at(merge);
        self.insert_phis(&exits, loc);
        Ok(())
    }
}

//! Transfer functions: how each kind of instruction, block param and
//! terminator derives its state from the states of its operands.

use super::{Slot, Solver};
use crate::ir::*;
use crate::op_traits::Intrinsic;
use crate::pass::LatticeValue;
use crate::{MemoryArg, Operator};
use smallvec::SmallVec;

impl<'a> Solver<'a> {
    pub(super) fn visit_inst(&mut self, func: Func, inst: Value) {
        let body = self.body(func);
        let (op, args, ty) = match &body.values[inst] {
            ValueDef::Operator(op, args, ty) => (*op, &args[..], ty),
            _ => return,
        };
        match op {
            op if op.is_binary() || op.is_compare() => self.visit_binary(func, inst, op, args, ty),
            op if op.is_cast() => self.visit_cast(func, inst, op, args[0], ty),
            Operator::Select => self.visit_select(func, inst, args, ty),
            Operator::ExtractField { index } => {
                self.visit_extract_field(func, inst, index, args[0], ty)
            }
            Operator::InsertField { index } => {
                self.visit_insert_field(func, inst, index, args[0], args[1], ty)
            }
            Operator::FieldAddr { index } => self.visit_field_addr(func, inst, index, args[0]),
            Operator::Load { memory } => self.visit_load(func, inst, memory, args[0], ty),
            Operator::Store { .. } => self.visit_store(func, args[0], args[1]),
            Operator::Call { function_index } => {
                self.visit_call(func, inst, function_index, args, ty)
            }
            Operator::CallIndirect => self.call_overdefined(func, inst, None, &[], ty),
            Operator::Alloca | Operator::VaArg => {
                log::trace!("{}: {} = {} is never constant", func, inst, op);
                self.mark_anything_overdefined(func, inst);
            }
            op => {
                log::warn!("{}: no transfer function for {} = {}", func, inst, op);
                self.mark_anything_overdefined(func, inst);
            }
        }
    }

    /// Arithmetic, bitwise, shift and compare operators.
    fn visit_binary(&mut self, func: Func, inst: Value, op: Operator, args: &[Value], ty: &Type) {
        if self.state(func, inst).is_overdefined() {
            return;
        }
        let lhs = self.state(func, args[0]);
        let rhs = self.state(func, args[1]);

        if lhs.is_overdefined() || rhs.is_overdefined() {
            if matches!(op, Operator::And | Operator::Or) {
                let other = if lhs.is_overdefined() { &rhs } else { &lhs };
                let absorbed = match other {
                    // Undefined could be the absorbing element.
                    LatticeValue::Undefined => match op {
                        Operator::And => Some(Constant::null_value(ty)),
                        _ => Constant::all_ones(ty),
                    },
                    LatticeValue::Constant(c) | LatticeValue::ForcedConstant(c) => {
                        let absorbing = match op {
                            Operator::And => c.is_null_value(),
                            _ => c.is_all_ones(),
                        };
                        absorbing.then(|| c.clone())
                    }
                    LatticeValue::Overdefined => None,
                };
                if let Some(c) = absorbed {
                    self.mark_constant(func, inst, c);
                    return;
                }
            }
            if self.fold_over_joins(func, inst, op, args[0], args[1], ty) {
                return;
            }
            self.mark_overdefined(func, inst);
            return;
        }

        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            match fold_op(&op, &[a.clone(), b.clone()], ty) {
                Some(c) => self.mark_constant(func, inst, c),
                None => self.mark_overdefined(func, inst),
            };
        }
    }

    /// When both operands are params of the same block, evaluate the
    /// operator edge by edge. If every feasible edge yields the same
    /// constant, so does the instruction, as long as the params' inputs
    /// don't change; the instruction is recorded as depending on them.
    fn fold_over_joins(
        &mut self,
        func: Func,
        inst: Value,
        op: Operator,
        lhs: Value,
        rhs: Value,
        ty: &Type,
    ) -> bool {
        let body = self.body(func);
        let (lhs, rhs) = (body.resolve_alias(lhs), body.resolve_alias(rhs));
        let (block, lhs_index, rhs_index) = match (&body.values[lhs], &body.values[rhs]) {
            (ValueDef::BlockParam(b1, i1, _), ValueDef::BlockParam(b2, i2, _)) if b1 == b2 => {
                (*b1, *i1 as usize, *i2 as usize)
            }
            _ => return false,
        };

        let mut result: Option<Constant> = None;
        let mut agrees = true;
        let def = &body.blocks[block];
        for (i, &pred) in def.preds.iter().enumerate() {
            let succ_index = def.pos_in_pred_succ[i];
            if !self.is_edge_feasible(func, pred, succ_index) {
                continue;
            }
            let target = match body.blocks[pred].terminator.target(succ_index) {
                Some(target) => target,
                None => continue,
            };
            let a = self.state(func, target.args[lhs_index]);
            let b = self.state(func, target.args[rhs_index]);
            if a.is_overdefined() || b.is_overdefined() {
                agrees = false;
                break;
            }
            let (a, b) = match (a.as_constant(), b.as_constant()) {
                (Some(a), Some(b)) => (a.clone(), b.clone()),
                _ => continue,
            };
            let c = match fold_op(&op, &[a, b], ty) {
                Some(c) => c,
                None => {
                    agrees = false;
                    break;
                }
            };
            if result.is_none() {
                result = Some(c);
            } else if result.as_ref() != Some(&c) {
                agrees = false;
                break;
            }
        }

        match result {
            Some(c) if agrees => {
                self.mark_constant(func, inst, c);
                self.add_join_dep(func, lhs, inst);
                self.add_join_dep(func, rhs, inst);
                true
            }
            // No edge has constant inputs yet; wait for them.
            None if agrees => {
                self.add_join_dep(func, lhs, inst);
                self.add_join_dep(func, rhs, inst);
                true
            }
            _ => {
                self.remove_join_dep(func, lhs, inst);
                self.remove_join_dep(func, rhs, inst);
                false
            }
        }
    }

    fn add_join_dep(&mut self, func: Func, param: Value, inst: Value) {
        let deps = self.join_deps.entry((func, param)).or_default();
        if !deps.contains(&inst) {
            deps.push(inst);
        }
    }

    fn remove_join_dep(&mut self, func: Func, param: Value, inst: Value) {
        if let Some(deps) = self.join_deps.get_mut(&(func, param)) {
            deps.retain(|dep| *dep != inst);
            if deps.is_empty() {
                self.join_deps.remove(&(func, param));
            }
        }
    }

    fn visit_cast(&mut self, func: Func, inst: Value, op: Operator, arg: Value, ty: &Type) {
        let lv = self.state(func, arg);
        if lv.is_overdefined() {
            self.mark_overdefined(func, inst);
        } else if let Some(c) = lv.as_constant() {
            match fold_cast(&op, c, ty) {
                Some(c) => self.mark_constant(func, inst, c),
                None => self.mark_overdefined(func, inst),
            };
        }
    }

    fn visit_select(&mut self, func: Func, inst: Value, args: &[Value], ty: &Type) {
        if ty.is_struct() {
            self.mark_anything_overdefined(func, inst);
            return;
        }
        let cond = self.state(func, args[0]);
        if cond.is_undefined() {
            return;
        }
        if let Some(taken) = cond.as_constant().and_then(|c| c.as_bool()) {
            let chosen = self.state(func, args[if taken { 1 } else { 2 }]);
            self.merge_in(func, inst, chosen);
            return;
        }

        let if_true = self.state(func, args[1]);
        let if_false = self.state(func, args[2]);
        if let (Some(a), Some(b)) = (if_true.as_constant(), if_false.as_constant()) {
            if a == b {
                self.mark_constant(func, inst, b.clone());
                return;
            }
        }
        if if_true.is_undefined() {
            self.merge_in(func, inst, if_false);
        } else if if_false.is_undefined() {
            self.merge_in(func, inst, if_true);
        } else {
            self.mark_overdefined(func, inst);
        }
    }

    fn visit_extract_field(&mut self, func: Func, inst: Value, index: u32, agg: Value, ty: &Type) {
        if ty.is_struct() {
            self.mark_anything_overdefined(func, inst);
            return;
        }
        let agg_ty = self.body(func).value_ty(agg);
        match agg_ty.fields() {
            Some(fields) if (index as usize) < fields.len() => {
                let lv = self.field_state(func, agg, index);
                self.merge_in(func, inst, lv);
            }
            _ => {
                self.mark_overdefined(func, inst);
            }
        }
    }

    fn visit_insert_field(
        &mut self,
        func: Func,
        inst: Value,
        index: u32,
        agg: Value,
        value: Value,
        ty: &Type,
    ) {
        let fields = match ty.fields() {
            Some(fields) => fields.len() as u32,
            None => {
                self.mark_anything_overdefined(func, inst);
                return;
            }
        };
        let value_is_struct = self.body(func).value_ty(value).is_struct();
        for i in 0..fields {
            let slot = Slot::Field(inst, i);
            if i != index {
                let lv = self.field_state(func, agg, i);
                self.merge_in(func, slot, lv);
            } else if value_is_struct {
                self.mark_overdefined(func, slot);
            } else {
                let lv = self.state(func, value);
                self.merge_in(func, slot, lv);
            }
        }
    }

    fn visit_field_addr(&mut self, func: Func, inst: Value, index: u32, base: Value) {
        let lv = self.state(func, base);
        if lv.is_undefined() {
            return;
        }
        let folded = match lv.as_constant() {
            Some(&Constant::GlobalAddr(global)) => {
                let in_bounds = self
                    .module
                    .globals
                    .get(global)
                    .and_then(|data| data.ty.fields())
                    .map_or(false, |fields| (index as usize) < fields.len());
                in_bounds.then(|| Constant::FieldAddr(global, index))
            }
            _ => None,
        };
        match folded {
            Some(c) => self.mark_constant(func, inst, c),
            None => self.mark_overdefined(func, inst),
        };
    }

    fn visit_load(&mut self, func: Func, inst: Value, memory: MemoryArg, ptr: Value, ty: &Type) {
        if ty.is_struct() || memory.volatile {
            self.mark_anything_overdefined(func, inst);
            return;
        }
        let lv = self.state(func, ptr);
        if lv.is_undefined() || self.state(func, inst).is_overdefined() {
            return;
        }
        let ptr = match lv.as_constant() {
            Some(c) => c.clone(),
            _ => {
                self.mark_overdefined(func, inst);
                return;
            }
        };
        match &ptr {
            Constant::Null if memory.addr_space == 0 && (ty.is_int() || *ty == Type::Ptr) => {
                self.mark_constant(func, inst, Constant::null_value(ty));
            }
            Constant::GlobalAddr(global) if self.tracked_globals.contains_key(global) => {
                let tracked = self.tracked_globals[global].clone();
                self.merge_in(func, inst, tracked);
            }
            ptr => {
                match self.fold_load(ptr, ty) {
                    Some(c) => self.mark_constant(func, inst, c),
                    None => self.mark_overdefined(func, inst),
                };
            }
        }
    }

    /// The value behind a constant address, when it can never change:
    /// the initializer of an immutable global that cannot be replaced
    /// at link time.
    fn fold_load(&self, ptr: &Constant, ty: &Type) -> Option<Constant> {
        let (global, field) = match ptr {
            Constant::GlobalAddr(global) => (*global, None),
            Constant::FieldAddr(global, index) => (*global, Some(*index as usize)),
            _ => return None,
        };
        let data = self.module.globals.get(global)?;
        if data.mutable || data.linkage.may_be_overridden() {
            return None;
        }
        let init = data.init.as_ref()?;
        let value = match field {
            None => init.clone(),
            Some(index) => init.field(index)?,
        };
        if value.is_undef() || value.ty() != *ty {
            return None;
        }
        Some(value)
    }

    fn visit_store(&mut self, func: Func, ptr: Value, value: Value) {
        let global = match self.state(func, ptr).as_constant() {
            Some(&Constant::GlobalAddr(global)) if self.tracked_globals.contains_key(&global) => {
                global
            }
            _ => return,
        };
        if self.body(func).value_ty(value).is_struct() {
            return;
        }
        let stored = self.state(func, value);
        self.merge_in_global(global, &stored);
    }

    fn visit_call(&mut self, func: Func, inst: Value, callee: Func, args: &[Value], ty: &Type) {
        let module = self.module;
        let callee_body = match &module.funcs[callee] {
            FuncDecl::Import(_, name) => {
                self.call_overdefined(func, inst, Some(name.as_str()), args, ty);
                return;
            }
            FuncDecl::Body(_, _, _, body) => body,
        };

        if self.arg_tracked.contains(&callee) {
            self.mark_block_executable(callee, callee_body.entry);
            for (&arg, param) in args.iter().zip(callee_body.params()) {
                let param_ty = callee_body.value_ty(param);
                match param_ty.fields() {
                    Some(fields) => {
                        for i in 0..fields.len() as u32 {
                            let lv = self.field_state(func, arg, i);
                            self.merge_in(callee, Slot::Field(param, i), lv);
                        }
                    }
                    None => {
                        let lv = self.state(func, arg);
                        self.merge_in(callee, param, lv);
                    }
                }
            }
        }

        match ty.fields() {
            Some(fields) if self.struct_return_funcs.contains(&callee) => {
                for i in 0..fields.len() as u32 {
                    let lv = self
                        .tracked_struct_returns
                        .get(&(callee, i))
                        .cloned()
                        .unwrap_or_default();
                    self.merge_in(func, Slot::Field(inst, i), lv);
                }
            }
            None if self.tracked_returns.contains_key(&callee) => {
                let lv = self.tracked_returns[&callee].clone();
                self.merge_in(func, inst, lv);
            }
            _ => self.call_overdefined(func, inst, None, args, ty),
        }
    }

    /// A call whose result the solver cannot follow into a body. Known
    /// imports still fold when every argument is constant.
    fn call_overdefined(
        &mut self,
        func: Func,
        inst: Value,
        import: Option<&str>,
        args: &[Value],
        ty: &Type,
    ) {
        if ty.is_void() {
            return;
        }
        if let Some(intrinsic) = import.and_then(Intrinsic::from_name) {
            if !ty.is_struct() {
                let body = self.body(func);
                let mut operands = SmallVec::<[Constant; 4]>::new();
                for &arg in args {
                    if body.value_ty(arg).is_struct() {
                        self.mark_overdefined(func, inst);
                        return;
                    }
                    let lv = self.state(func, arg);
                    if lv.is_undefined() {
                        return;
                    }
                    match lv.as_constant() {
                        Some(c) => operands.push(c.clone()),
                        None => {
                            self.mark_overdefined(func, inst);
                            return;
                        }
                    }
                }
                if let Some(c) = intrinsic.fold(&operands) {
                    if c.ty() == *ty {
                        self.mark_constant(func, inst, c);
                        return;
                    }
                }
            }
        }
        self.mark_anything_overdefined(func, inst);
    }

    /// Join of a block param: the merge of its arguments over the
    /// feasible incoming edges.
    pub(super) fn visit_join(&mut self, func: Func, param: Value) {
        let body = self.body(func);
        let (block, index, ty) = match &body.values[param] {
            ValueDef::BlockParam(block, index, ty) => (*block, *index as usize, ty),
            _ => return,
        };
        if let Some(fields) = ty.fields() {
            self.visit_struct_join(func, param, block, index, fields.len() as u32);
            return;
        }

        if self.state(func, param).is_overdefined() {
            let deps = self
                .join_deps
                .get(&(func, param))
                .cloned()
                .unwrap_or_default();
            for inst in deps {
                if self.is_block_executable(func, body.value_blocks[inst]) {
                    self.visit_inst(func, inst);
                }
            }
            return;
        }

        let def = &body.blocks[block];
        if def.preds.len() > self.opts.max_join_fan_in {
            self.mark_overdefined(func, param);
            return;
        }

        let mut operand: Option<Constant> = None;
        for (i, &pred) in def.preds.iter().enumerate() {
            let succ_index = def.pos_in_pred_succ[i];
            if !self.is_edge_feasible(func, pred, succ_index) {
                continue;
            }
            let arg = match body.blocks[pred].terminator.target(succ_index) {
                Some(target) => target.args[index],
                None => continue,
            };
            match self.state(func, arg) {
                LatticeValue::Undefined => continue,
                LatticeValue::Overdefined => {
                    self.mark_overdefined(func, param);
                    return;
                }
                LatticeValue::Constant(c) | LatticeValue::ForcedConstant(c) => {
                    if operand.is_none() {
                        operand = Some(c);
                    } else if operand.as_ref() != Some(&c) {
                        self.mark_overdefined(func, param);
                        return;
                    }
                }
            }
        }
        if let Some(c) = operand {
            self.mark_constant(func, param, c);
        }
    }

    /// Struct-typed block params join field by field.
    fn visit_struct_join(&mut self, func: Func, param: Value, block: Block, index: usize, fields: u32) {
        let body = self.body(func);
        let def = &body.blocks[block];
        if def.preds.len() > self.opts.max_join_fan_in {
            self.mark_anything_overdefined(func, param);
            return;
        }
        let args: SmallVec<[Value; 4]> = def
            .preds
            .iter()
            .enumerate()
            .filter(|&(i, &pred)| self.is_edge_feasible(func, pred, def.pos_in_pred_succ[i]))
            .filter_map(|(i, &pred)| {
                body.blocks[pred]
                    .terminator
                    .target(def.pos_in_pred_succ[i])
                    .map(|target| target.args[index])
            })
            .collect();
        for field in 0..fields {
            for &arg in &args {
                let lv = self.field_state(func, arg, field);
                self.merge_in(func, Slot::Field(param, field), lv);
            }
        }
    }

    pub(super) fn visit_terminator(&mut self, func: Func, block: Block) {
        let body = self.body(func);
        let mut feasible = SmallVec::<[usize; 4]>::new();
        match &body.blocks[block].terminator {
            Terminator::Br { .. } => feasible.push(0),
            Terminator::CondBr { cond, .. } => {
                let lv = self.state(func, *cond);
                match lv.as_constant().and_then(|c| c.as_bool()) {
                    Some(true) => feasible.push(0),
                    Some(false) => feasible.push(1),
                    None if !lv.is_undefined() => feasible.extend([0, 1]),
                    None => {}
                }
            }
            Terminator::Select { value, targets, .. } => {
                let lv = self.state(func, *value);
                match lv.as_constant().and_then(|c| c.as_int()) {
                    Some(i) if i < targets.len() as u64 => feasible.push(i as usize + 1),
                    Some(_) => feasible.push(0),
                    None if !lv.is_undefined() => feasible.extend(0..=targets.len()),
                    None => {}
                }
            }
            Terminator::Return { value: Some(value) } => self.visit_return(func, *value),
            Terminator::Return { value: None } | Terminator::Unreachable | Terminator::None => {}
        }
        for index in feasible {
            self.mark_edge_feasible(func, block, index);
        }
    }

    fn visit_return(&mut self, func: Func, value: Value) {
        let ty = self.body(func).value_ty(value);
        match ty.fields() {
            Some(fields) => {
                if !self.struct_return_funcs.contains(&func) {
                    return;
                }
                for i in 0..fields.len() as u32 {
                    let lv = self.field_state(func, value, i);
                    self.merge_in_return(func, Some(i), &lv);
                }
            }
            None => {
                if !self.tracked_returns.contains_key(&func) {
                    return;
                }
                let lv = self.state(func, value);
                self.merge_in_return(func, None, &lv);
            }
        }
    }
}

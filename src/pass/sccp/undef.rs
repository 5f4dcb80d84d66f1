//! Forcing progress on values that stay undefined after the worklists
//! drain.
//!
//! The solver waits on undefined operands, hoping they become
//! constant. Some never do (they come from `undef` literals, or from
//! a cycle of values waiting on each other), and a branch on such a
//! value leaves its successors unreachable forever. Here we pick the
//! first instruction or terminator with a determinable answer, force
//! it, and let the caller solve again.

use super::{Slot, Solver};
use crate::ir::*;
use crate::pass::LatticeValue;
use crate::Operator;

impl<'a> Solver<'a> {
    /// Force one undefined value in the executable blocks of `func`,
    /// visiting blocks in reverse postorder. Returns `true` if anything
    /// changed, in which case the worklists need to be solved again.
    pub fn resolved_undefs_in(&mut self, func: Func) -> bool {
        let rpo: Vec<Block> = match self.funcs.get(&func) {
            Some(info) => info.cfg.rpo.values().copied().collect(),
            None => return false,
        };
        let body = self.body(func);
        for block in rpo {
            if !self.is_block_executable(func, block) {
                continue;
            }
            for &inst in &body.blocks[block].insts {
                let inst = body.resolve_alias(inst);
                if self.resolve_inst(func, inst) {
                    log::trace!("resolved_undefs_in: forced {} in {}", inst, func);
                    return true;
                }
            }
            if self.resolve_terminator(func, block) {
                log::trace!("resolved_undefs_in: forced terminator of {} in {}", block, func);
                return true;
            }
        }
        false
    }

    fn resolve_inst(&mut self, func: Func, inst: Value) -> bool {
        let body = self.body(func);
        let (op, args, ty) = match &body.values[inst] {
            ValueDef::Operator(op, args, ty) => (*op, &args[..], ty),
            _ => return false,
        };
        if ty.is_void() {
            return false;
        }
        if let Operator::Call { function_index } = op {
            // A tracked call takes its value from the callee's return,
            // which may only settle after the callee is forced.
            if self.tracked_returns.contains_key(&function_index)
                || self.struct_return_funcs.contains(&function_index)
            {
                return false;
            }
        }

        if let Some(fields) = ty.fields() {
            // Struct results only come out of calls and selects
            // undefined; give up on the fields still waiting.
            if !op.is_call() && op != Operator::Select {
                return false;
            }
            let mut changed = false;
            for i in 0..fields.len() as u32 {
                if self.field_state(func, inst, i).is_undefined() {
                    changed |= self.mark_overdefined(func, Slot::Field(inst, i));
                }
            }
            return changed;
        }

        if !self.state(func, inst).is_undefined() {
            return false;
        }
        if op.is_call() {
            return self.mark_overdefined(func, inst);
        }
        if args.is_empty() || body.value_ty(args[0]).is_struct() {
            return false;
        }

        let op0 = self.state(func, args[0]);
        let op1 = if args.len() == 2 {
            let op1 = self.state(func, args[1]);
            if op0.is_undefined() && op1.is_undefined() {
                // undef op undef stays undef.
                return false;
            }
            op1
        } else {
            LatticeValue::Undefined
        };

        match op {
            Operator::Zext | Operator::Mul | Operator::And => {
                self.mark_forced_constant(func, inst, Constant::null_value(ty))
            }
            Operator::Or => match Constant::all_ones(ty) {
                Some(c) => self.mark_forced_constant(func, inst, c),
                None => self.mark_overdefined(func, inst),
            },
            Operator::DivS | Operator::DivU | Operator::RemS | Operator::RemU => {
                // X / undef could trap; leave it.
                if op1.is_undefined() {
                    return false;
                }
                self.mark_forced_constant(func, inst, Constant::null_value(ty))
            }
            Operator::ShrS => {
                if op0.is_undefined() {
                    return false;
                }
                // X >>s undef: pick a shift of zero.
                match op0.as_constant() {
                    Some(c) => self.mark_forced_constant(func, inst, c.clone()),
                    None => self.mark_overdefined(func, inst),
                }
            }
            Operator::ShrU | Operator::Shl => {
                if op0.is_undefined() {
                    return false;
                }
                // X << undef: pick a shift that clears every bit.
                self.mark_forced_constant(func, inst, Constant::null_value(ty))
            }
            Operator::Select => {
                // Only the two-operand case reads op1 above, so the arm
                // state starts out undefined here.
                let mut arm = op1;
                if op0.is_undefined() {
                    // undef ? X : Y
                    if !arm.is_constant() {
                        arm = self.state(func, args[2]);
                    }
                } else if arm.is_undefined() {
                    // c ? undef : Y
                    arm = self.state(func, args[2]);
                    if arm.is_undefined() {
                        return false;
                    }
                }
                match arm.as_constant() {
                    Some(c) => self.mark_forced_constant(func, inst, c.clone()),
                    None => self.mark_overdefined(func, inst),
                }
            }
            _ => false,
        }
    }

    /// A branch on an undefined condition takes its first edge.
    fn resolve_terminator(&mut self, func: Func, block: Block) -> bool {
        let body = self.body(func);
        match &body.blocks[block].terminator {
            Terminator::CondBr { cond, .. } => {
                if !self.state(func, *cond).is_undefined() {
                    return false;
                }
                if body.const_of(*cond).map_or(false, |c| c.is_undef()) {
                    // A literal can't be forced; take the edge directly.
                    return self.mark_edge_feasible(func, block, 0);
                }
                self.mark_forced_constant(func, *cond, Constant::bool(true))
            }
            Terminator::Select { value, targets, .. } => {
                if targets.is_empty() || !self.state(func, *value).is_undefined() {
                    return false;
                }
                if body.const_of(*value).map_or(false, |c| c.is_undef()) {
                    return self.mark_edge_feasible(func, block, 1);
                }
                let ty = body.value_ty(*value);
                if !ty.is_int() {
                    return self.mark_overdefined(func, *value);
                }
                self.mark_forced_constant(func, *value, Constant::null_value(&ty))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::{Solver, SolverOptions};
    use crate::entity::EntityRef;
    use crate::ir::*;
    use crate::pass::LatticeValue;

    #[test]
    fn undef_condition_takes_first_edge() {
        let module = Module::from_text(
            "func @f0 \"f\" external () -> i32 {
b0():
  if undef i1, b1(), b2()
b1():
  return i32 1
b2():
  return i32 2
}
",
        )
        .unwrap();
        let func = Func::new(0);
        let body = module.funcs[func].body().unwrap();
        let mut solver = Solver::for_function(&module, func, SolverOptions::default());
        solver.solve();
        assert!(!solver.is_block_executable(func, Block::new(1)));
        assert!(!solver.is_block_executable(func, Block::new(2)));
        assert!(solver.resolved_undefs_in(func));
        assert!(!solver.resolved_undefs_in(func));
        solver.solve();
        assert!(solver.is_edge_feasible(func, body.entry, 0));
        assert!(solver.is_block_executable(func, Block::new(1)));
        assert!(!solver.is_block_executable(func, Block::new(2)));
    }

    #[test]
    fn forced_guess_yields_to_later_facts() {
        let module = Module::from_text(
            "func @f0 \"f\" external () -> i32 {
b0():
  x: i32 = or undef i32, i32 0
  y: i32 = add x, i32 1
  return y
}
",
        )
        .unwrap();
        let func = Func::new(0);
        let body = module.funcs[func].body().unwrap();
        let x = body.blocks[body.entry].insts[0];
        let y = body.blocks[body.entry].insts[1];
        let mut solver = Solver::for_function(&module, func, SolverOptions::default());
        solver.run_to_fixed_point(&[func]);
        assert_eq!(
            solver.lattice_value(func, x),
            &LatticeValue::ForcedConstant(Constant::int(Type::I32, u32::MAX as u64))
        );
        assert_eq!(
            solver.lattice_value(func, y),
            &LatticeValue::Constant(Constant::int(Type::I32, 0))
        );
    }

    #[test]
    fn undef_select_picks_a_defined_arm() {
        let module = Module::from_text(
            "func @f0 \"f\" external (i32) -> i32 {
b0(a: i32):
  s: i32 = select undef i1, undef i32, i32 9
  return s
}
",
        )
        .unwrap();
        let func = Func::new(0);
        let body = module.funcs[func].body().unwrap();
        let s = body.blocks[body.entry].insts[0];
        let mut solver = Solver::for_function(&module, func, SolverOptions::default());
        solver.run_to_fixed_point(&[func]);
        assert_eq!(
            solver.lattice_value(func, s),
            &LatticeValue::ForcedConstant(Constant::int(Type::I32, 9))
        );
    }
}

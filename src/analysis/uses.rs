//! Def-use index: for each value, everything that reads it.

use crate::entity::PerEntity;
use crate::ir::{Block, FunctionBody, Terminator, Value, ValueDef};
use smallvec::SmallVec;

/// Something that reads a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum User {
    /// An instruction, or a block param reading a branch argument.
    Value(Value),
    /// The terminator of a block, reading its condition, selector or
    /// returned value.
    Terminator(Block),
}

#[derive(Clone, Debug, Default)]
pub struct UseMap {
    users: PerEntity<Value, SmallVec<[User; 4]>>,
}

impl UseMap {
    pub fn compute(f: &FunctionBody) -> UseMap {
        let mut map = UseMap::default();
        for (block, def) in f.blocks.entries() {
            for &inst in &def.insts {
                let inst = f.resolve_alias(inst);
                if let ValueDef::Operator(_, args, _) = &f.values[inst] {
                    for &arg in args {
                        map.add(f.resolve_alias(arg), User::Value(inst));
                    }
                }
            }
            def.terminator.visit_targets(|target| {
                let params = &f.blocks[target.block].params;
                for (&arg, &(_, param)) in target.args.iter().zip(params.iter()) {
                    map.add(f.resolve_alias(arg), User::Value(param));
                }
            });
            let mut cond_uses = SmallVec::<[Value; 2]>::new();
            match &def.terminator {
                Terminator::CondBr { cond, .. } => cond_uses.push(*cond),
                Terminator::Select { value, .. } => cond_uses.push(*value),
                Terminator::Return { value: Some(value) } => cond_uses.push(*value),
                _ => {}
            }
            for value in cond_uses {
                map.add(f.resolve_alias(value), User::Terminator(block));
            }
        }
        map
    }

    fn add(&mut self, value: Value, user: User) {
        let users = &mut self.users[value];
        if !users.contains(&user) {
            users.push(user);
        }
    }

    pub fn users(&self, value: Value) -> &[User] {
        &self.users[value][..]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::{Func, Module};

    #[test]
    fn branch_arguments_feed_block_params() {
        let module = Module::from_text(
            "func @f0 \"f\" internal (i32) -> i32 {
b0(a: i32):
  x: i32 = add a, a
  c: i1 = eq x, i32 0
  if c, b1(x), b1(a)
b1(p: i32):
  return p
}
",
        )
        .unwrap();
        let body = module.funcs[Func::new(0)].body().unwrap();
        let uses = UseMap::compute(body);
        let a = body.params().next().unwrap();
        let b1 = body.blocks[body.entry].succs[0];
        let p = body.blocks[b1].params[0].1;
        let x = body.blocks[body.entry].insts[0];
        let c = body.blocks[body.entry].insts[1];

        assert_eq!(uses.users(a), &[User::Value(x), User::Value(p)]);
        assert_eq!(uses.users(x), &[User::Value(c), User::Value(p)]);
        assert_eq!(uses.users(c), &[User::Terminator(body.entry)]);
        assert_eq!(uses.users(p), &[User::Terminator(b1)]);
    }
}

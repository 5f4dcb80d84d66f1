//! Resolve all aliases.

use crate::FunctionBody;

pub fn run(body: &mut FunctionBody) {
    log::trace!(
        "resolve_aliases: running on:\n{}\n",
        body.display_verbose("| ")
    );
    for value in body.values.iter() {
        let mut value_def = std::mem::take(&mut body.values[value]);
        value_def.update_uses(|val| *val = body.resolve_and_update_alias(*val));
        body.values[value] = value_def;
    }
    let mut blocks = std::mem::take(&mut body.blocks);
    for block in blocks.values_mut() {
        block.terminator.update_uses(|val| *val = body.resolve_alias(*val));
    }
    body.blocks = blocks;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::{Constant, Func, Module, Terminator, Type, ValueDef};

    #[test]
    fn chains_collapse_to_their_end() {
        let mut module = Module::from_text(
            "func @f0 \"f\" external (i32) -> i32 {
b0(a: i32):
  x: i32 = add a, a
  y: i32 = mul x, x
  return y
}
",
        )
        .unwrap();
        let body = module.funcs[Func::new(0)].body_mut().unwrap();
        let x = body.blocks[body.entry].insts[0];
        let y = body.blocks[body.entry].insts[1];
        let five = body.add_const(Constant::int(Type::I32, 5));
        let stand_in = body.add_placeholder(Type::I32);
        body.set_alias(stand_in, five);
        body.set_alias(x, stand_in);
        body.set_alias(y, x);
        let entry = body.entry;
        body.blocks[entry].insts.clear();

        run(body);
        assert_eq!(body.values[y], ValueDef::Alias(five));
        assert_eq!(
            body.blocks[entry].terminator,
            Terminator::Return { value: Some(five) }
        );
    }
}

use super::{Block, Constant, Type, Value};
use crate::Operator;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ValueDef {
    /// Parameter `index` of a block. The entry block's params are the
    /// function's formal parameters.
    BlockParam(Block, u32, Type),
    Operator(Operator, Vec<Value>, Type),
    /// A literal operand.
    Const(Constant),
    Alias(Value),
    Placeholder(Type),
    #[default]
    None,
}

impl ValueDef {
    pub fn ty(&self) -> Option<Type> {
        match self {
            ValueDef::BlockParam(_, _, ty) => Some(ty.clone()),
            ValueDef::Operator(_, _, ty) => Some(ty.clone()),
            ValueDef::Const(c) => Some(c.ty()),
            ValueDef::Placeholder(ty) => Some(ty.clone()),
            ValueDef::Alias(_) | ValueDef::None => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            ValueDef::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn visit_uses<F: FnMut(Value)>(&self, mut f: F) {
        match self {
            &ValueDef::BlockParam { .. } => {}
            &ValueDef::Operator(_, ref args, _) => {
                for &arg in args {
                    f(arg);
                }
            }
            &ValueDef::Const(_) => {}
            &ValueDef::Alias(value) => f(value),
            &ValueDef::Placeholder(_) => {}
            &ValueDef::None => {}
        }
    }

    pub fn update_uses<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        match self {
            &mut ValueDef::BlockParam { .. } => {}
            &mut ValueDef::Operator(_, ref mut args, _) => {
                for arg in args {
                    f(arg);
                }
            }
            &mut ValueDef::Const(_) => {}
            &mut ValueDef::Alias(ref mut value) => f(value),
            &mut ValueDef::Placeholder(_) => {}
            &mut ValueDef::None => {}
        }
    }
}

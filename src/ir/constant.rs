//! Literal constants and constant folding.

use super::{Func, Global, Type};
use crate::Operator;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A literal constant.
///
/// Integer bits are always kept masked to the width of their type, so
/// structural equality is value equality.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constant {
    /// The "undefined" sentinel: any value of the type.
    Undef(Type),
    Int(Type, u64),
    /// Null pointer in the default address space.
    Null,
    GlobalAddr(Global),
    /// Address of field `index` of a struct-typed global.
    FieldAddr(Global, u32),
    FuncAddr(Func),
    Struct(Vec<Constant>),
    /// Zero fill of an aggregate type.
    Zero(Type),
}

impl Constant {
    pub fn int(ty: Type, bits: u64) -> Constant {
        assert!(ty.is_int(), "integer constant of non-integer type {}", ty);
        let bits = bits & ty.mask();
        Constant::Int(ty, bits)
    }

    pub fn bool(value: bool) -> Constant {
        Constant::Int(Type::I1, value as u64)
    }

    /// The all-zeroes value of a type.
    pub fn null_value(ty: &Type) -> Constant {
        match ty {
            Type::Ptr => Constant::Null,
            Type::Struct(..) => Constant::Zero(ty.clone()),
            ty if ty.is_int() => Constant::Int(ty.clone(), 0),
            ty => panic!("no null value for type {}", ty),
        }
    }

    /// The all-ones value of an integer type.
    pub fn all_ones(ty: &Type) -> Option<Constant> {
        if ty.is_int() {
            Some(Constant::Int(ty.clone(), ty.mask()))
        } else {
            None
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Constant::Undef(ty) | Constant::Int(ty, _) | Constant::Zero(ty) => ty.clone(),
            Constant::Null
            | Constant::GlobalAddr(..)
            | Constant::FieldAddr(..)
            | Constant::FuncAddr(..) => Type::Ptr,
            Constant::Struct(fields) => Type::Struct(fields.iter().map(|c| c.ty()).collect()),
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Constant::Undef(..))
    }

    pub fn is_null_value(&self) -> bool {
        match self {
            Constant::Int(_, bits) => *bits == 0,
            Constant::Null | Constant::Zero(..) => true,
            _ => false,
        }
    }

    pub fn is_all_ones(&self) -> bool {
        match self {
            Constant::Int(ty, bits) => *bits == ty.mask(),
            _ => false,
        }
    }

    /// Unsigned integer value.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Constant::Int(_, bits) => Some(*bits),
            _ => None,
        }
    }

    /// Sign-extended integer value.
    pub fn as_signed(&self) -> Option<i64> {
        match self {
            Constant::Int(ty, bits) => {
                let width = ty.bits()?;
                let shift = 64 - width;
                Some(((*bits << shift) as i64) >> shift)
            }
            _ => None,
        }
    }

    /// Truth value of an integer used as a condition.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_int().map(|bits| bits != 0)
    }

    /// Field `index` of an aggregate literal, if the literal can be
    /// decomposed statically.
    pub fn field(&self, index: usize) -> Option<Constant> {
        match self {
            Constant::Struct(fields) => fields.get(index).cloned(),
            Constant::Zero(Type::Struct(tys)) => tys.get(index).map(Constant::null_value),
            Constant::Undef(Type::Struct(tys)) => {
                tys.get(index).map(|ty| Constant::Undef(ty.clone()))
            }
            _ => None,
        }
    }

    /// All fields of an aggregate literal of type `ty`.
    pub fn fields(&self, ty: &Type) -> Option<Vec<Constant>> {
        let n = ty.fields()?.len();
        (0..n).map(|i| self.field(i)).collect()
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Constant::Undef(ty) => write!(f, "undef {}", ty),
            Constant::Int(ty, _) => write!(f, "{} {}", ty, self.as_signed().unwrap_or_default()),
            Constant::Null => write!(f, "null"),
            Constant::GlobalAddr(global) => write!(f, "@{}", global),
            Constant::FieldAddr(global, index) => write!(f, "@{}.{}", global, index),
            Constant::FuncAddr(func) => write!(f, "@{}", func),
            Constant::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|c| format!("{}", c))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", fields.join(", "))
            }
            Constant::Zero(ty) => write!(f, "zero {}", ty),
        }
    }
}

fn bool_int(value: bool) -> Option<Constant> {
    Some(Constant::bool(value))
}

/// Fold a two-operand arithmetic, bitwise or shift operator. Returns
/// `None` when the operation would trap or has no defined result.
pub fn fold_binary(op: &Operator, a: &Constant, b: &Constant) -> Option<Constant> {
    let (ty, x, y) = match (a, b) {
        (Constant::Int(ta, x), Constant::Int(tb, y)) if ta == tb => (ta, *x, *y),
        _ => return None,
    };
    let bits = ty.bits()?;
    let sx = a.as_signed()?;
    let sy = b.as_signed()?;
    let signed_min = 1u64 << (bits - 1);
    let result = match op {
        Operator::Add => x.wrapping_add(y),
        Operator::Sub => x.wrapping_sub(y),
        Operator::Mul => x.wrapping_mul(y),
        Operator::DivU => x.checked_div(y)?,
        Operator::RemU => x.checked_rem(y)?,
        Operator::DivS | Operator::RemS => {
            if y == 0 || (x == signed_min && y == ty.mask()) {
                return None;
            }
            if *op == Operator::DivS {
                (sx / sy) as u64
            } else {
                (sx % sy) as u64
            }
        }
        Operator::And => x & y,
        Operator::Or => x | y,
        Operator::Xor => x ^ y,
        Operator::Shl | Operator::ShrS | Operator::ShrU if y >= bits as u64 => return None,
        Operator::Shl => x << y,
        Operator::ShrU => x >> y,
        Operator::ShrS => (sx >> y) as u64,
        _ => return None,
    };
    Some(Constant::int(ty.clone(), result))
}

/// Whether two pointer constants are equal, where that is decidable.
fn addr_eq(a: &Constant, b: &Constant) -> Option<bool> {
    use Constant::*;
    match (a, b) {
        (Null | GlobalAddr(..) | FuncAddr(..), Null | GlobalAddr(..) | FuncAddr(..)) => {
            Some(a == b)
        }
        (FieldAddr(g1, i1), FieldAddr(g2, i2)) => {
            if g1 != g2 {
                Some(false)
            } else if i1 == i2 {
                Some(true)
            } else {
                None
            }
        }
        (FieldAddr(g, _), GlobalAddr(h)) | (GlobalAddr(h), FieldAddr(g, _)) => {
            if g != h {
                Some(false)
            } else {
                None
            }
        }
        (FieldAddr(..), Null | FuncAddr(..)) | (Null | FuncAddr(..), FieldAddr(..)) => {
            Some(false)
        }
        _ => None,
    }
}

/// Fold a comparison. The result is an `i1`.
pub fn fold_compare(op: &Operator, a: &Constant, b: &Constant) -> Option<Constant> {
    if a.ty() == Type::Ptr && b.ty() == Type::Ptr {
        return match op {
            Operator::Eq => addr_eq(a, b).map(Constant::bool),
            Operator::Ne => addr_eq(a, b).map(|eq| Constant::bool(!eq)),
            _ => None,
        };
    }
    let (x, y) = match (a, b) {
        (Constant::Int(ta, x), Constant::Int(tb, y)) if ta == tb => (*x, *y),
        _ => return None,
    };
    let sx = a.as_signed()?;
    let sy = b.as_signed()?;
    match op {
        Operator::Eq => bool_int(x == y),
        Operator::Ne => bool_int(x != y),
        Operator::LtS => bool_int(sx < sy),
        Operator::LtU => bool_int(x < y),
        Operator::LeS => bool_int(sx <= sy),
        Operator::LeU => bool_int(x <= y),
        Operator::GtS => bool_int(sx > sy),
        Operator::GtU => bool_int(x > y),
        Operator::GeS => bool_int(sx >= sy),
        Operator::GeU => bool_int(x >= y),
        _ => None,
    }
}

/// Fold an integer cast to type `to`.
pub fn fold_cast(op: &Operator, a: &Constant, to: &Type) -> Option<Constant> {
    if !to.is_int() {
        return None;
    }
    match op {
        Operator::Zext | Operator::Trunc => Some(Constant::int(to.clone(), a.as_int()?)),
        Operator::Sext => Some(Constant::int(to.clone(), a.as_signed()? as u64)),
        _ => None,
    }
}

/// Fold any pure operator over constant operands, producing a value
/// of type `ty`.
pub fn fold_op(op: &Operator, args: &[Constant], ty: &Type) -> Option<Constant> {
    match (op, args) {
        (op, [a, b]) if op.is_binary() => fold_binary(op, a, b),
        (op, [a, b]) if op.is_compare() => fold_compare(op, a, b),
        (op, [a]) if op.is_cast() => fold_cast(op, a, ty),
        (Operator::Select, [cond, t, f]) => {
            if cond.as_bool()? {
                Some(t.clone())
            } else {
                Some(f.clone())
            }
        }
        (Operator::ExtractField { index }, [agg]) => agg.field(*index as usize),
        (Operator::InsertField { index }, [agg, value]) => {
            let mut fields = agg.fields(ty)?;
            *fields.get_mut(*index as usize)? = value.clone();
            Some(Constant::Struct(fields))
        }
        (Operator::FieldAddr { index }, [Constant::GlobalAddr(global)]) => {
            Some(Constant::FieldAddr(*global, *index))
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;

    fn i32c(v: i64) -> Constant {
        Constant::int(Type::I32, v as u64)
    }

    #[test]
    fn arithmetic_wraps_at_type_width() {
        let a = Constant::int(Type::I8, 200);
        let b = Constant::int(Type::I8, 100);
        assert_eq!(
            fold_binary(&Operator::Add, &a, &b),
            Some(Constant::int(Type::I8, 44))
        );
        assert_eq!(fold_binary(&Operator::Add, &i32c(2), &i32c(3)), Some(i32c(5)));
        assert_eq!(fold_binary(&Operator::Sub, &i32c(2), &i32c(3)), Some(i32c(-1)));
    }

    #[test]
    fn trapping_operations_do_not_fold() {
        assert_eq!(fold_binary(&Operator::DivU, &i32c(1), &i32c(0)), None);
        assert_eq!(fold_binary(&Operator::RemS, &i32c(1), &i32c(0)), None);
        assert_eq!(
            fold_binary(&Operator::DivS, &i32c(i32::MIN as i64), &i32c(-1)),
            None
        );
        assert_eq!(fold_binary(&Operator::Shl, &i32c(1), &i32c(32)), None);
    }

    #[test]
    fn signed_operations_sign_extend() {
        assert_eq!(fold_binary(&Operator::DivS, &i32c(-7), &i32c(2)), Some(i32c(-3)));
        assert_eq!(fold_binary(&Operator::ShrS, &i32c(-8), &i32c(1)), Some(i32c(-4)));
        assert_eq!(
            fold_binary(&Operator::ShrU, &i32c(-8), &i32c(28)),
            Some(i32c(0xf))
        );
        assert_eq!(
            fold_compare(&Operator::LtS, &i32c(-1), &i32c(0)),
            Some(Constant::bool(true))
        );
        assert_eq!(
            fold_compare(&Operator::LtU, &i32c(-1), &i32c(0)),
            Some(Constant::bool(false))
        );
    }

    #[test]
    fn casts() {
        let byte = Constant::int(Type::I8, 0x80);
        assert_eq!(
            fold_cast(&Operator::Sext, &byte, &Type::I32),
            Some(i32c(-128))
        );
        assert_eq!(fold_cast(&Operator::Zext, &byte, &Type::I32), Some(i32c(128)));
        assert_eq!(
            fold_cast(&Operator::Trunc, &i32c(0x1ff), &Type::I8),
            Some(Constant::int(Type::I8, 0xff))
        );
    }

    #[test]
    fn pointer_equality() {
        let g0 = Global::new(0);
        let g1 = Global::new(1);
        let eq = |a: &Constant, b: &Constant| fold_compare(&Operator::Eq, a, b);
        assert_eq!(
            eq(&Constant::GlobalAddr(g0), &Constant::GlobalAddr(g1)),
            Some(Constant::bool(false))
        );
        assert_eq!(
            eq(&Constant::Null, &Constant::Null),
            Some(Constant::bool(true))
        );
        assert_eq!(eq(&Constant::FieldAddr(g0, 0), &Constant::GlobalAddr(g0)), None);
        assert_eq!(
            fold_compare(&Operator::LtU, &Constant::Null, &Constant::GlobalAddr(g0)),
            None
        );
    }

    #[test]
    fn aggregates_decompose() {
        let ty = Type::Struct(vec![Type::I32, Type::Ptr]);
        let zero = Constant::Zero(ty.clone());
        assert_eq!(zero.field(0), Some(i32c(0)));
        assert_eq!(zero.field(1), Some(Constant::Null));
        assert_eq!(zero.field(2), None);
        let inserted = fold_op(&Operator::InsertField { index: 0 }, &[zero, i32c(4)], &ty);
        assert_eq!(
            inserted,
            Some(Constant::Struct(vec![i32c(4), Constant::Null]))
        );
        assert_eq!(format!("{}", inserted.unwrap()), "{i32 4, null}");
    }
}

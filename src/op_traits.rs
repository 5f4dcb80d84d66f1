//! Metadata on operators.

use crate::ir::Constant;
use crate::Operator;

impl Operator {
    /// Two-operand integer arithmetic, bitwise and shift operators.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Sub
                | Operator::Mul
                | Operator::DivS
                | Operator::DivU
                | Operator::RemS
                | Operator::RemU
                | Operator::And
                | Operator::Or
                | Operator::Xor
                | Operator::Shl
                | Operator::ShrS
                | Operator::ShrU
        )
    }

    pub fn is_compare(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Ne
                | Operator::LtS
                | Operator::LtU
                | Operator::LeS
                | Operator::LeU
                | Operator::GtS
                | Operator::GtU
                | Operator::GeS
                | Operator::GeU
        )
    }

    pub fn is_cast(&self) -> bool {
        matches!(self, Operator::Zext | Operator::Sext | Operator::Trunc)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Operator::Call { .. } | Operator::CallIndirect)
    }

    /// Whether the operator does something beyond producing its
    /// result. Such instructions must stay in place even when their
    /// result is known.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Operator::Store { .. }
            | Operator::Call { .. }
            | Operator::CallIndirect
            | Operator::VaArg
            | Operator::Opaque { .. } => true,
            Operator::Load { memory } => memory.volatile,
            _ => false,
        }
    }

    /// Whether the result depends only on the operands.
    pub fn is_pure(&self) -> bool {
        !self.has_side_effects() && !matches!(self, Operator::Load { .. } | Operator::Alloca)
    }
}

/// Number of operands the operator takes, or `None` for calls, whose
/// arity comes from the callee.
pub fn op_arity(op: &Operator) -> Option<usize> {
    match op {
        _ if op.is_binary() || op.is_compare() => Some(2),
        _ if op.is_cast() => Some(1),
        Operator::Select => Some(3),
        Operator::ExtractField { .. } | Operator::FieldAddr { .. } | Operator::Load { .. } => {
            Some(1)
        }
        Operator::InsertField { .. } | Operator::Store { .. } => Some(2),
        Operator::Alloca => Some(0),
        Operator::VaArg => Some(1),
        Operator::Call { .. } | Operator::CallIndirect | Operator::Opaque { .. } => None,
        _ => unreachable!(),
    }
}

/// Imported functions with known, side-effect-free semantics. Calls
/// to these fold when every argument is constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Abs,
    SMin,
    SMax,
    UMin,
    UMax,
    Ctpop,
    Bswap,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        match name {
            "abs" => Some(Intrinsic::Abs),
            "smin" => Some(Intrinsic::SMin),
            "smax" => Some(Intrinsic::SMax),
            "umin" => Some(Intrinsic::UMin),
            "umax" => Some(Intrinsic::UMax),
            "ctpop" => Some(Intrinsic::Ctpop),
            "bswap" => Some(Intrinsic::Bswap),
            _ => None,
        }
    }

    pub fn fold(&self, args: &[Constant]) -> Option<Constant> {
        match (self, args) {
            (Intrinsic::Abs, [a]) => {
                let ty = a.ty();
                let v = a.as_signed()?;
                Some(Constant::int(ty, v.wrapping_abs() as u64))
            }
            (Intrinsic::SMin, [a, b]) => {
                let pick = if a.as_signed()? <= b.as_signed()? { a } else { b };
                Some(pick.clone())
            }
            (Intrinsic::SMax, [a, b]) => {
                let pick = if a.as_signed()? >= b.as_signed()? { a } else { b };
                Some(pick.clone())
            }
            (Intrinsic::UMin, [a, b]) => {
                let pick = if a.as_int()? <= b.as_int()? { a } else { b };
                Some(pick.clone())
            }
            (Intrinsic::UMax, [a, b]) => {
                let pick = if a.as_int()? >= b.as_int()? { a } else { b };
                Some(pick.clone())
            }
            (Intrinsic::Ctpop, [a]) => Some(Constant::int(a.ty(), a.as_int()?.count_ones() as u64)),
            (Intrinsic::Bswap, [a]) => {
                let ty = a.ty();
                let bits = ty.bits()?;
                if bits % 16 != 0 {
                    return None;
                }
                let swapped = a.as_int()?.swap_bytes() >> (64 - bits);
                Some(Constant::int(ty, swapped))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn intrinsics_fold_on_constants() {
        let c = |v: u64| Constant::int(Type::I32, v);
        assert_eq!(Intrinsic::Ctpop.fold(&[c(0xff)]), Some(c(8)));
        assert_eq!(Intrinsic::Abs.fold(&[c(-5i64 as u64)]), Some(c(5)));
        assert_eq!(Intrinsic::UMin.fold(&[c(3), c(9)]), Some(c(3)));
        assert_eq!(Intrinsic::SMin.fold(&[c(3), c(-9i64 as u64)]), Some(c(-9i64 as u64)));
        assert_eq!(Intrinsic::Bswap.fold(&[c(0x11223344)]), Some(c(0x44332211)));
        assert_eq!(
            Intrinsic::Bswap.fold(&[Constant::int(Type::I8, 1)]),
            None
        );
        assert_eq!(Intrinsic::from_name("printf"), None);
    }

    #[test]
    fn side_effect_classification() {
        assert!(Operator::Add.is_pure());
        assert!(!Operator::Load { memory: Default::default() }.has_side_effects());
        assert!(!Operator::Load { memory: Default::default() }.is_pure());
        assert!(Operator::Store { memory: Default::default() }.has_side_effects());
        assert!(Operator::CallIndirect.has_side_effects());
        assert_eq!(op_arity(&Operator::Select), Some(3));
        assert_eq!(op_arity(&Operator::CallIndirect), None);
    }
}

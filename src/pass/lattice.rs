//! Lattice trait definition and the constant-propagation lattice.

use crate::ir::Constant;
use std::fmt::Debug;

/// A lattice type used for an analysis.
///
/// The `meet` operator must compute the greatest lower bound for its
/// operands (that is, its result must be "less than or equal to" its
/// operands, according to the lattice's partial order, and must be
/// the greatest value that satisfies this condition). It must obey
/// the usual lattice laws:
///
/// * a `meet` a == a  (reflexivity)
/// * a `meet` b == b `meet` a (commutativity)
/// * a `meet` (b `meet` c) == (a `meet` b) `meet` c (associativity)
/// * a `meet` top == a
/// * a `meet` bottom == bottom
///
/// The lattice must also have finite chain length, so that an
/// analysis that only ever moves values downward terminates.
pub trait Lattice: Clone + Debug {
    /// Return the `top` lattice value.
    fn top() -> Self;
    /// Return the `bottom` lattice value.
    fn bottom() -> Self;
    /// Mutate self to `meet(self, other)`. Returns `true` if any
    /// changes occurred.
    fn meet_with(&mut self, other: &Self) -> bool;
}

/// What is known about one scalar value (or one field of a struct
/// value).
///
/// Values only move down: `Undefined` to one of the constant states,
/// and from there to `Overdefined`, which is final. `top` is
/// `Undefined` and `bottom` is `Overdefined`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum LatticeValue {
    /// Nothing is known yet: no definition has been seen executing.
    #[default]
    Undefined,
    /// Believed to always equal this literal.
    Constant(Constant),
    /// A guess made to break an undefined deadlock. Acts like
    /// `Constant`, but a conflicting constant later sends it to
    /// `Overdefined` instead of being a bug.
    ForcedConstant(Constant),
    /// May take more than one value at runtime.
    Overdefined,
}

enum Step {
    Stay,
    Constant(Constant),
    Overdefined,
}

impl LatticeValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, LatticeValue::Undefined)
    }

    /// True for both plain and forced constants.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            LatticeValue::Constant(_) | LatticeValue::ForcedConstant(_)
        )
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, LatticeValue::ForcedConstant(_))
    }

    pub fn is_overdefined(&self) -> bool {
        matches!(self, LatticeValue::Overdefined)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            LatticeValue::Constant(c) | LatticeValue::ForcedConstant(c) => Some(c),
            _ => None,
        }
    }

    /// The constant; panics unless `is_constant()`.
    pub fn constant(&self) -> &Constant {
        match self.as_constant() {
            Some(c) => c,
            None => panic!("lattice value {:?} is not a constant", self),
        }
    }

    /// Position in the lattice order: 0 for `Undefined`, 1 for the
    /// constant states, 2 for `Overdefined`.
    pub fn height(&self) -> u8 {
        match self {
            LatticeValue::Undefined => 0,
            LatticeValue::Constant(_) | LatticeValue::ForcedConstant(_) => 1,
            LatticeValue::Overdefined => 2,
        }
    }

    /// Move to `Constant(c)`. Returns whether the state changed.
    ///
    /// A plain constant may only be re-marked with the same value. A
    /// forced constant that disagrees with `c` becomes `Overdefined`.
    pub fn mark_constant(&mut self, c: Constant) -> bool {
        match self {
            LatticeValue::Undefined => {
                *self = LatticeValue::Constant(c);
                true
            }
            LatticeValue::Constant(old) => {
                assert!(
                    *old == c,
                    "marking constant {} with different value {}",
                    old,
                    c
                );
                false
            }
            LatticeValue::ForcedConstant(old) => {
                if *old == c {
                    false
                } else {
                    *self = LatticeValue::Overdefined;
                    true
                }
            }
            LatticeValue::Overdefined => false,
        }
    }

    /// Move to `ForcedConstant(c)`. Only legal from `Undefined`.
    pub fn mark_forced_constant(&mut self, c: Constant) -> bool {
        assert!(
            self.is_undefined(),
            "forcing {} on a value that is already {:?}",
            c,
            self
        );
        *self = LatticeValue::ForcedConstant(c);
        true
    }

    /// Returns `true` only the first time.
    pub fn mark_overdefined(&mut self) -> bool {
        if self.is_overdefined() {
            false
        } else {
            *self = LatticeValue::Overdefined;
            true
        }
    }
}

impl std::fmt::Display for LatticeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LatticeValue::Undefined => write!(f, "undefined"),
            LatticeValue::Constant(c) => write!(f, "const {}", c),
            LatticeValue::ForcedConstant(c) => write!(f, "forced {}", c),
            LatticeValue::Overdefined => write!(f, "overdefined"),
        }
    }
}

impl Lattice for LatticeValue {
    fn top() -> Self {
        LatticeValue::Undefined
    }

    fn bottom() -> Self {
        LatticeValue::Overdefined
    }

    fn meet_with(&mut self, other: &LatticeValue) -> bool {
        let step = match (&*self, other) {
            (LatticeValue::Overdefined, _) | (_, LatticeValue::Undefined) => Step::Stay,
            (_, LatticeValue::Overdefined) => Step::Overdefined,
            (LatticeValue::Undefined, incoming) => Step::Constant(incoming.constant().clone()),
            (current, incoming) => {
                if current.constant() == incoming.constant() {
                    Step::Stay
                } else {
                    Step::Overdefined
                }
            }
        };
        match step {
            Step::Stay => false,
            Step::Constant(c) => self.mark_constant(c),
            Step::Overdefined => self.mark_overdefined(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::Type;

    fn c(v: u64) -> Constant {
        Constant::int(Type::I32, v)
    }

    #[test]
    fn transitions_only_move_down() {
        let mut lv = LatticeValue::top();
        assert!(lv.mark_constant(c(1)));
        assert!(!lv.mark_constant(c(1)));
        assert!(lv.mark_overdefined());
        assert!(!lv.mark_overdefined());
        assert!(!lv.mark_constant(c(2)));
        assert_eq!(lv, LatticeValue::bottom());
    }

    #[test]
    fn forced_constant_yields_to_contradiction() {
        let mut lv = LatticeValue::Undefined;
        assert!(lv.mark_forced_constant(c(0)));
        assert!(!lv.mark_constant(c(0)));
        assert!(lv.is_forced());
        assert!(lv.mark_constant(c(3)));
        assert!(lv.is_overdefined());
    }

    #[test]
    #[should_panic]
    fn conflicting_plain_constant_is_a_bug() {
        let mut lv = LatticeValue::Constant(c(1));
        lv.mark_constant(c(2));
    }

    #[test]
    #[should_panic]
    fn forcing_requires_undefined() {
        let mut lv = LatticeValue::Constant(c(1));
        lv.mark_forced_constant(c(1));
    }

    #[test]
    fn meet_follows_merge_rule() {
        let mut lv = LatticeValue::Undefined;
        assert!(!lv.meet_with(&LatticeValue::Undefined));
        assert!(lv.meet_with(&LatticeValue::ForcedConstant(c(7))));
        assert_eq!(lv, LatticeValue::Constant(c(7)));
        assert!(!lv.meet_with(&LatticeValue::Constant(c(7))));
        assert!(!lv.meet_with(&LatticeValue::Undefined));
        assert!(lv.meet_with(&LatticeValue::Constant(c(8))));
        assert!(lv.is_overdefined());
        assert!(!lv.meet_with(&LatticeValue::Constant(c(8))));
    }
}

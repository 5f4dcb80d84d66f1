//! Value types.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// The type of an SSA value.
///
/// Integers carry no signedness; operators decide how to interpret
/// their bits. `Struct` is the only aggregate: its fields are tracked
/// individually by the solver and never collapse into one scalar.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    #[default]
    Void,
    Struct(Vec<Type>),
}

impl Type {
    /// Bit width of an integer type.
    pub fn bits(&self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I8 => Some(8),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            _ => None,
        }
    }

    /// Mask selecting the meaningful bits of an integer of this type.
    pub fn mask(&self) -> u64 {
        match self.bits() {
            Some(64) => u64::MAX,
            Some(bits) => (1u64 << bits) - 1,
            None => u64::MAX,
        }
    }

    pub fn is_int(&self) -> bool {
        self.bits().is_some()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(..))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn fields(&self) -> Option<&[Type]> {
        match self {
            Type::Struct(fields) => Some(&fields[..]),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Type::I1 => write!(f, "i1"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Ptr => write!(f, "ptr"),
            Type::Void => write!(f, "void"),
            Type::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|ty| format!("{}", ty))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", fields.join(", "))
            }
        }
    }
}

//! Error types.

/// An error that occurs when reading textual IR.
#[derive(Clone, Debug)]
pub enum FrontendError {
    /// The text does not follow the grammar.
    Syntax(String),
    /// A value is used but never defined.
    UndefinedValue(String),
    /// A block is branched to but never defined.
    UndefinedBlock(String),
    /// A name is defined twice in one function.
    Redefinition(String),
    /// A function or global index is out of range or out of order.
    BadIndex(String),
    /// A structural rule of the IR is violated.
    Invalid(String),
}

impl std::fmt::Display for FrontendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for FrontendError {}

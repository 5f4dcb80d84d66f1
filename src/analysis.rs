//! Indices derived from a function body.

mod uses;
pub use uses::*;

//! Sparse conditional constant propagation over an SSA IR with block
//! parameters.

pub mod analysis;
pub mod cfg;
pub mod entity;
mod errors;
mod frontend;
mod ir;
pub mod op_traits;
mod ops;
pub mod pass;
pub mod passes;

pub use errors::*;
pub use ir::*;
pub use ops::{MemoryArg, Operator};

mod interp;
pub use interp::*;

pub mod fuzzing;

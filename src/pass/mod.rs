//! Analyses over function bodies.
//!
//! Terminology note: a "pass" is a readonly analysis of the code. It
//! does not mutate anything; it traverses the code, possibly multiple
//! times (to converge), in order to compute some derived information.
//! Transformations that consume the results live in `crate::passes`.

pub mod lattice;
pub use lattice::*;
pub mod sccp;
pub use sccp::{AddressTaken, Solver, SolverOptions};

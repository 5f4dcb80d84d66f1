//! Intermediate representation: SSA values in basic blocks with
//! block parameters.

use crate::declare_entity;

declare_entity!(Func, "f");
declare_entity!(Block, "block");
declare_entity!(Value, "v");
declare_entity!(Global, "g");
declare_entity!(Signature, "sig");

mod constant;
pub use constant::*;
mod display;
pub use display::*;
mod func;
pub use func::*;
mod module;
pub use module::*;
mod types;
pub use types::*;
mod value;
pub use value::*;

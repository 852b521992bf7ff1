//! Symbolic stencil expressions.
//!
//! Equations are written with `Expr` trees over field accesses,
//! derivatives expand into weighted sums of shifted accesses,
//! and the operator builder lowers the result to kernel bytecode.

mod derivative;
mod equation;
mod expr;
mod symbol;

pub use derivative::*;
pub use equation::*;
pub use expr::*;
pub use symbol::*;

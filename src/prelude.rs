//! Convenient re-exports for embedding hosts and tests.
//!
//! ```
//! use pirc::prelude::*;
//!
//! let ty = PirType::from(RType::Integer).scalar();
//! assert!(ty.is_a(&PirType::val()));
//! ```

pub use crate::debug::{DebugFlags, DebugOptions, DebugStyle};
pub use crate::driver::{self, Check, CompileOptions};
pub use crate::error::{Error, Result};
pub use crate::pir::{
    Assumptions, BinOp, Closure, ClosureProperties, ClosureVersion, Constant, DispatchTable,
    Instruction, InstrKind, OptimizationContext, PirType, RType, Value, BB,
};
pub use crate::rir::{self, IdentityBackend, Pir2Rir, Rir2Pir};
pub use crate::symbols::Symbol;

// Version constant
pub use crate::VERSION;

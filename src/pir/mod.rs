//! The PIR SSA intermediate representation: type lattice, assumptions and
//! properties, the IR graph itself, and CFG utilities (spec §2 components
//! A–D).

pub mod assumptions;
pub mod cfg;
pub mod closure;
pub mod instr;
pub mod ty;
pub mod value;

pub use assumptions::{Assumptions, ClosureProperties, PropertyFlags};
pub use closure::{Closure, ClosureVersion, DispatchTable, OptimizationContext, Promise};
pub use instr::{BinOp, ClosureRef, Code, Instruction, InstrKind, BB};
pub use ty::{NativeType, PirType, RType};
pub use value::{Binding, Constant, EnvValue, InstrId, Logical, PromiseId, Value, BBId};

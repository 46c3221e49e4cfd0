//! pirc: the PIR optimizing-compiler core for a multi-tier bytecode VM.
//!
//! This crate is the hard core described in the covering specification: the
//! PIR type lattice, the SSA IR, the scope/abstract-environment analysis,
//! the optimization passes (constant folding, branch elimination, type
//! inference/unboxing), and the dispatch-table/closure-version model. The
//! RIR bytecode interpreter's opcode dispatch, the source-to-RIR front end,
//! and machine-code generation are external collaborators and out of scope
//! (see [`rir`] for the narrow stand-in this crate needs to drive
//! `compile`/`optimize` end to end).
//!
//! # Example
//!
//! ```
//! use pirc::{driver, pir::Closure, rir};
//! use rustc_hash::FxHashMap as HashMap;
//!
//! let rir_fn = rir::Function::new("f", 0)
//!     .with_constant(pirc::pir::Constant::Integer(Some(2)))
//!     .with_constant(pirc::pir::Constant::Integer(Some(3)));
//! let mut closure = Closure::new("f");
//! let program = HashMap::default();
//! driver::compile(&rir_fn, &mut closure, &rir::IdentityBackend, &program, &driver::CompileOptions::default())
//!     .expect("compiles");
//! assert_eq!(closure.table.versions().len(), 1);
//! ```

pub mod analysis;
pub mod debug;
pub mod disassemble;
pub mod driver;
pub mod error;
pub mod opt;
pub mod pir;
pub mod prelude;
pub mod rir;
pub mod symbols;

pub use error::{Error, Result};

/// Crate version, for the CLI's `--version` and `disassemble` banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

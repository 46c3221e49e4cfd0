//! Flow-sensitive static analysis over abstract environments (spec §2
//! components E–G): abstract values/environments, the forward fixpoint
//! framework, and the scope analysis built on top of it.

pub mod abstract_value;
pub mod framework;
pub mod scope;

pub use abstract_value::{AbstractEnvironment, AbstractEnvironmentHierarchy, AbstractValue};
pub use framework::{run_forward, AnalysisResult, AnalysisState, TransferFunction};
pub use scope::{ScopeAnalysis, ScopeAnalysisOutput, ScopeState, MAX_DEPTH};

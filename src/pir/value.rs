//! SSA values: what an instruction's argument slots point at (spec §3 "IR graph").

use crate::symbols::Symbol;
use std::fmt;

/// A compiler-held constant (the core's stand-in for a host `SEXP`
/// literal). NA markers are modeled explicitly since S3 (spec §8) depends
/// on distinguishing an `NA` logical from `TRUE`/`FALSE`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Logical(Logical),
    /// `None` is `NA_INTEGER`.
    Integer(Option<i32>),
    /// `NA_REAL` is represented as the IEEE-754 payload the host uses; we
    /// don't need to bit-match it here, only propagate it opaquely.
    Real(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    True,
    False,
    Na,
}

impl Constant {
    /// A length-1 non-`NA` logical, as required by constant-fold's branch rule (spec §4.H step 4).
    pub fn as_definite_logical(&self) -> Option<bool> {
        match self {
            Constant::Logical(Logical::True) => Some(true),
            Constant::Logical(Logical::False) => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "NULL"),
            Constant::Logical(Logical::True) => write!(f, "TRUE"),
            Constant::Logical(Logical::False) => write!(f, "FALSE"),
            Constant::Logical(Logical::Na) => write!(f, "NA"),
            Constant::Integer(Some(i)) => write!(f, "{i}L"),
            Constant::Integer(None) => write!(f, "NA_integer_"),
            Constant::Real(r) => write!(f, "{r}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Index of an instruction within a [`crate::pir::instr::Code`] arena. Every
/// instruction defines exactly one SSA value, identified by its own id
/// (spec §8 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Index of a basic block within a `Code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BBId(pub u32);

impl fmt::Display for BBId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB{}", self.0)
    }
}

/// Index of a promise within a `ClosureVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub u32);

/// A use of a value: every instruction argument slot is an SSA value.
/// The only producers in this core are instructions themselves (`LdConst`
/// included), so `Value` is just an `InstrId` newtype; kept distinct so
/// argument slots read as "a value", not "an instruction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub InstrId);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value of an environment-typed argument slot (`MkEnv`'s `parent`,
/// `AbstractEnvironment::parentEnv`): either a concrete SSA value, or one
/// of the two sentinels from spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvValue {
    Known(Value),
    /// Not yet set (§3 `AbstractEnvironment`).
    UninitializedParent,
    /// Statically unknowable (§3 `AbstractEnvironment`).
    UnknownParent,
}

impl EnvValue {
    pub fn known(&self) -> Option<Value> {
        match self {
            EnvValue::Known(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Known(v) => write!(f, "{v}"),
            EnvValue::UninitializedParent => write!(f, "<uninitialized>"),
            EnvValue::UnknownParent => write!(f, "<unknown>"),
        }
    }
}

/// A symbol together with the value stored under it, for `MkEnv`'s local
/// bindings and `StVar`/`StVarSuper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub name: Symbol,
    pub value: Value,
}

//! `ClosureVersion`, `Closure`, `DispatchTable`, `Promise`,
//! `OptimizationContext` (spec §3, §4.C). Grounded in
//! `compiler/pir/closure_version.h`/`.cpp` and `dispatch_table` usage
//! throughout the source compiler.

use crate::pir::assumptions::{Assumptions, ClosureProperties};
use crate::pir::instr::Code;
use crate::pir::value::PromiseId;

/// A lazy sub-code attached to a closure version; each carries its own SSA
/// body (spec GLOSSARY "Promise").
#[derive(Debug, Clone, Default)]
pub struct Promise {
    pub code: Code,
}

/// The key a `ClosureVersion` is filed under in its `Closure`'s dispatch
/// table: the caller-side assumptions it was compiled under, plus the
/// callee-side properties optimization proved about it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationContext {
    pub assumptions: Assumptions,
    pub properties: ClosureProperties,
}

/// One compiled specialization of a closure (spec GLOSSARY
/// "ClosureVersion"). Owns its entry `Code` and all `Promise`s; nothing
/// here is shared with any other version, so passes may mutate freely.
#[derive(Debug, Clone)]
pub struct ClosureVersion {
    pub name: String,
    pub nargs: usize,
    pub context: OptimizationContext,
    pub entry: Code,
    pub promises: Vec<Promise>,
    /// Closure versions this version was built by inlining (supplemented:
    /// see SPEC_FULL.md §3 "ClosureVersion::clone full semantics").
    pub inlinees: Vec<String>,
}

impl ClosureVersion {
    pub fn new(name: impl Into<String>, nargs: usize, context: OptimizationContext) -> Self {
        Self {
            name: name.into(),
            nargs,
            context,
            entry: Code::new(),
            promises: Vec::new(),
            inlinees: Vec::new(),
        }
    }

    pub fn add_promise(&mut self, promise: Promise) -> PromiseId {
        let id = PromiseId(self.promises.len() as u32);
        self.promises.push(promise);
        id
    }

    pub fn promise(&self, id: PromiseId) -> &Promise {
        &self.promises[id.0 as usize]
    }

    /// `ClosureVersion::clone(Assumptions+)` (spec §4.C): a full structural
    /// deep copy under a (possibly) extended assumption set. Entry/promise
    /// bodies are plain `Code`s with no shared state, so this is a
    /// straightforward field clone with the context's assumptions widened;
    /// `inlinees` carries over, matching the source's clone (SPEC_FULL.md §3).
    pub fn clone_with(&self, assumptions: Assumptions) -> ClosureVersion {
        let mut c = self.clone();
        c.context.assumptions |= assumptions;
        c
    }
}

/// Ordered list of compiled versions for one closure (spec GLOSSARY
/// "DispatchTable").
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    versions: Vec<ClosureVersion>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versions(&self) -> &[ClosureVersion] {
        &self.versions
    }

    /// `DispatchTable::insert(version)` (spec §4.C): append, unless an
    /// existing entry's assumptions are already a superset of the new
    /// version's (i.e. the new version is strictly weaker and therefore
    /// redundant).
    pub fn insert(&mut self, version: ClosureVersion) {
        let new_assumptions = version.context.assumptions;
        let redundant = self.versions.iter().any(|existing| {
            let existing_assumptions = existing.context.assumptions;
            existing_assumptions != new_assumptions
                && existing_assumptions.satisfies(new_assumptions)
        });
        if !redundant {
            self.versions.push(version);
        }
    }

    /// `DispatchTable::dispatch(Assumptions)` (spec §4.C, §8 invariant 8):
    /// the most specific version whose assumptions are a subset of
    /// `caller`'s, i.e. the matching entry requiring the most assumption
    /// bits. Ties favor the earliest-inserted match (`Iterator::max_by_key`
    /// keeps the *last* of equal maxima, so this folds manually instead).
    pub fn dispatch(&self, caller: Assumptions) -> Option<&ClosureVersion> {
        self.versions
            .iter()
            .filter(|v| caller.satisfies(v.context.assumptions))
            .fold(None, |best: Option<&ClosureVersion>, v| match best {
                Some(b) if b.context.assumptions.bits().count_ones() >= v.context.assumptions.bits().count_ones() => Some(b),
                _ => Some(v),
            })
    }
}

/// A source-language function value; owns a dispatch table (spec GLOSSARY
/// "Closure").
#[derive(Debug, Clone)]
pub struct Closure {
    pub name: String,
    pub table: DispatchTable,
}

impl Closure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: DispatchTable::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(assumptions: Assumptions) -> ClosureVersion {
        ClosureVersion::new(
            "f",
            0,
            OptimizationContext {
                assumptions,
                properties: ClosureProperties::new(),
            },
        )
    }

    #[test]
    fn dispatch_picks_most_specific() {
        let mut table = DispatchTable::new();
        table.insert(version(Assumptions::empty()));
        table.insert(version(Assumptions::NO_REFLECTION));
        table.insert(version(Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS));

        let caller = Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS;
        let picked = table.dispatch(caller).unwrap();
        assert_eq!(picked.context.assumptions, caller);

        let weaker_caller = Assumptions::NO_REFLECTION;
        let picked = table.dispatch(weaker_caller).unwrap();
        assert_eq!(picked.context.assumptions, Assumptions::NO_REFLECTION);
    }

    #[test]
    fn insert_skips_strictly_weaker_redundant_version() {
        let mut table = DispatchTable::new();
        table.insert(version(Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS));
        table.insert(version(Assumptions::NO_REFLECTION));
        assert_eq!(table.versions().len(), 1);
    }

    #[test]
    fn dispatch_monotonicity_under_caller_superset() {
        // spec §8 invariant 8
        let mut table = DispatchTable::new();
        let required = Assumptions::NO_REFLECTION;
        table.insert(version(required));

        let a1 = Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS | Assumptions::CORRECT_NUMBER_OF_ARGS;
        let a2 = Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS;
        assert!(table.dispatch(a1).is_some());
        assert!(table.dispatch(a2).is_some());
    }
}

//! Caller-side `Assumptions` and callee-side `ClosureProperties` (spec §3, §4.B).
//!
//! Grounded in `compiler/pir/closure_property.h`: the source's
//! `ClosureProperty` enum (`IsEager`, `NoReflection`) is the callee-side set
//! here; `Assumptions` is the caller-side mirror image named in spec.md's
//! §3 ("e.g., `NoReflection`, `EagerArgs`"), supplemented with the two
//! argument-shape bits `signature.h`'s `PirSignature::accepts` needs to be
//! checkable at a call site (`CorrectNumberOfArguments`,
//! `CorrectOrderOfArguments`) — see DESIGN.md.

use crate::pir::ty::PirType;
use bitflags::bitflags;

bitflags! {
    /// Caller-supplied claims that enable dispatch to a more specialized
    /// `ClosureVersion`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Assumptions: u16 {
        const NO_REFLECTION              = 1 << 0;
        const EAGER_ARGS                 = 1 << 1;
        const CORRECT_NUMBER_OF_ARGS     = 1 << 2;
        const CORRECT_ORDER_OF_ARGS      = 1 << 3;
    }
}

impl Assumptions {
    /// Dispatch condition from spec §2/§4.B: a version keyed by
    /// `version_assumptions` is dispatchable under `self` iff
    /// `self ⊇ version_assumptions`.
    pub fn satisfies(&self, version_assumptions: Assumptions) -> bool {
        self.contains(version_assumptions)
    }
}

bitflags! {
    /// Callee-side facts optimization has proven about a closure version.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyFlags: u8 {
        const IS_EAGER      = 1 << 0;
        const NO_REFLECTION = 1 << 1;
    }
}

/// `ClosureProperties`: `PropertyFlags` plus a proven argument-forcing
/// order and a declared return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureProperties {
    pub flags: PropertyFlags,
    /// Proven order in which arguments are forced, by argument index.
    pub argument_force_order: Vec<usize>,
    pub return_type: PirType,
}

impl Default for ClosureProperties {
    fn default() -> Self {
        Self {
            flags: PropertyFlags::empty(),
            argument_force_order: Vec::new(),
            return_type: PirType::any(),
        }
    }
}

impl ClosureProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join (`|`, spec §3/§4.B): unions bits, prefers the non-empty force
    /// order (the other side's, if present — ties favor `other` matching
    /// the source's `closure_property.cpp` implementation), narrows the
    /// return type to the pointwise-join of both (see DESIGN.md's
    /// "Open question — property merging of returnType").
    pub fn join(&self, other: &ClosureProperties) -> ClosureProperties {
        let argument_force_order = if !other.argument_force_order.is_empty() {
            other.argument_force_order.clone()
        } else {
            self.argument_force_order.clone()
        };
        ClosureProperties {
            flags: self.flags | other.flags,
            argument_force_order,
            return_type: self.return_type | other.return_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::ty::RType;

    #[test]
    fn dispatch_satisfies_subset() {
        let caller = Assumptions::NO_REFLECTION | Assumptions::EAGER_ARGS;
        let version = Assumptions::NO_REFLECTION;
        assert!(caller.satisfies(version));
        assert!(!version.satisfies(caller));
    }

    #[test]
    fn join_prefers_nonempty_force_order() {
        let a = ClosureProperties {
            flags: PropertyFlags::IS_EAGER,
            argument_force_order: vec![0, 1],
            return_type: PirType::from(RType::Integer),
        };
        let b = ClosureProperties::new();
        let joined = a.join(&b);
        assert_eq!(joined.argument_force_order, vec![0, 1]);
        assert!(joined.flags.contains(PropertyFlags::IS_EAGER));
    }

    #[test]
    fn join_unions_flags() {
        let a = ClosureProperties {
            flags: PropertyFlags::IS_EAGER,
            ..ClosureProperties::new()
        };
        let b = ClosureProperties {
            flags: PropertyFlags::NO_REFLECTION,
            ..ClosureProperties::new()
        };
        let joined = a.join(&b);
        assert!(joined.flags.contains(PropertyFlags::IS_EAGER));
        assert!(joined.flags.contains(PropertyFlags::NO_REFLECTION));
    }
}

//! The compiler driver (spec §2 component I, §4.I): RIR -> PIR, the pass
//! pipeline, PIR -> RIR, and dispatch-table insertion. Also the diagnostic
//! entry points `disassemble`/`check` and the `assumeProps`/debug-flag
//! helpers named in spec §6.
//!
//! Grounded in `compiler/pir/pir_impl.cpp`'s `pirCompile`/`optimizeClosure`
//! shape: reject non-closures, translate, run passes, lower, publish — with
//! a pass-level failure recovered by leaving the dispatch table untouched
//! (spec §7 `CompilationFailed` propagation policy), rather than the fatal
//! `InvariantViolation` path (spec §7).

use crate::debug::{DebugFlags, DebugOptions};
use crate::error::{Error, Result};
use crate::opt;
use crate::pir::assumptions::{Assumptions, ClosureProperties};
use crate::pir::closure::{Closure, ClosureVersion, OptimizationContext};
use crate::rir::{self, Pir2Rir, Rir2Pir};
use rustc_hash::FxHashMap as HashMap;
use tracing::warn;

/// Options threaded through `compile`/`optimize` (spec §9 "Global mutable
/// debug configuration" -> explicit `DebugOptions`, spec §4.I `DryRun`).
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub assumptions: Assumptions,
    pub properties: ClosureProperties,
    pub debug: DebugOptions,
    /// Performs translation + passes + lowering but skips dispatch-table
    /// insertion (spec §4.I "`DryRun` mode").
    pub dry_run: bool,
}

/// `compile(closure, assumptions, properties) -> optimized_version` (spec
/// §1), inserting a new specialized version into `closure`'s dispatch
/// table. `program` supplies sibling closure versions the interprocedural
/// scope analysis may recurse into (spec §4.G); pass an empty map if none
/// are statically known.
///
/// Procedure (spec §4.I):
/// 1. Reject a non-closure `rir` input with `NotAClosure`.
/// 2. Translate via `backend` into a fresh `ClosureVersion`.
/// 3. Run the pass pipeline.
/// 4. Lower back to RIR via `backend` (its result is otherwise unused here
///    — PIR -> RIR code generation is out of scope, spec §1).
/// 5. Insert the optimized version into the dispatch table, unless
///    `options.dry_run`.
/// 6. On pass-level failure, warn (if `ShowWarnings` is set) and leave the
///    dispatch table unchanged.
pub fn compile(
    rir: &rir::Function,
    closure: &mut Closure,
    backend: &(impl Rir2Pir + Pir2Rir),
    program: &HashMap<String, ClosureVersion>,
    options: &CompileOptions,
) -> Result<ClosureVersion> {
    if !rir.is_closure {
        return Err(Error::not_a_closure(format!("'{}' is not a closure", rir.name)));
    }

    let context = OptimizationContext { assumptions: options.assumptions, properties: options.properties.clone() };
    let mut version = backend.translate(rir, context);

    if options.debug.has(DebugFlags::PRINT_INTERMEDIATE) && options.debug.function_enabled(&version.name) {
        tracing::debug!(target: "pirc::driver", version = %version.name, "translated RIR -> PIR");
    }

    opt::run_pipeline(&mut version, program, &options.debug);

    if let Err(e) = version.entry.check_invariants() {
        let failure = Error::CompilationFailed(format!("{} failed post-pipeline invariant check: {e}", version.name));
        if options.debug.has(DebugFlags::SHOW_WARNINGS) {
            warn!(target: "pirc::driver", version = %version.name, error = %failure, "pass pipeline recovered");
        }
        return Err(failure);
    }

    if options.debug.has(DebugFlags::PRINT_FINAL_PIR) && options.debug.function_enabled(&version.name) {
        tracing::debug!(target: "pirc::driver", version = %version.name, "final PIR before lowering");
    }

    let _lowered = backend.lower(&version);

    if !options.dry_run {
        closure.table.insert(version.clone());
    }

    Ok(version)
}

/// `optimize(closure, assumptions, name, debugOptions, properties) ->
/// closure` (spec §6): a full PIR round-trip using the identity backend,
/// naming the version `name` instead of the `rir::Function`'s own name.
pub fn optimize(
    rir: &rir::Function,
    closure: &mut Closure,
    assumptions: Assumptions,
    name: impl Into<String>,
    debug: DebugOptions,
    properties: ClosureProperties,
) -> Result<()> {
    let mut named_rir = rir.clone();
    named_rir.name = name.into();
    let options = CompileOptions { assumptions, properties, debug, dry_run: false };
    let program = HashMap::default();
    compile(&named_rir, closure, &rir::IdentityBackend, &program, &options)?;
    Ok(())
}

/// `disassemble(closure, verbose) -> ()` (spec §6).
pub fn disassemble(closure: &Closure, debug: &DebugOptions, verbose: bool) -> String {
    crate::disassemble::render_closure(closure, debug.style, verbose)
}

/// One diagnostic check `check(closure, checks...)` can assert (spec §6,
/// §8's testable properties give the natural check vocabulary).
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// The named version's body has no remaining `Branch` terminator.
    NoBranch,
    /// Every version's body satisfies the SSA/use-list invariants (spec §8
    /// invariants 1-2).
    Ssa,
    /// The dispatch table has exactly `n` versions.
    VersionCount(usize),
    /// At least one version's entry BB resolves to a single constant
    /// return equal to `expected` (spec §8 S1/S2-style scenario checks).
    ReturnsConstant(crate::pir::value::Constant),
}

/// `check(closure, checks...) -> bool` (spec §6): does each named check
/// hold of the compiled closure.
pub fn check(closure: &Closure, checks: &[Check]) -> bool {
    checks.iter().all(|c| check_one(closure, c))
}

fn check_one(closure: &Closure, c: &Check) -> bool {
    match c {
        Check::VersionCount(n) => closure.table.versions().len() == *n,
        Check::Ssa => closure.table.versions().iter().all(|v| v.entry.check_invariants().is_ok()),
        Check::NoBranch => closure.table.versions().iter().all(|v| {
            v.entry.reachable_bbs().iter().all(|&bb| {
                !v.entry.bb(bb).instrs.iter().any(|id| matches!(v.entry.instr(*id).kind, crate::pir::instr::InstrKind::Branch(_)))
            })
        }),
        Check::ReturnsConstant(expected) => closure.table.versions().iter().any(|v| {
            v.entry.reachable_bbs().iter().any(|&bb| {
                v.entry.bb(bb).instrs.last().is_some_and(|&id| {
                    if let crate::pir::instr::InstrKind::Return(val) = v.entry.instr(id).kind {
                        matches!(&v.entry.instr(val.0).kind, crate::pir::instr::InstrKind::LdConst(c) if c == expected)
                    } else {
                        false
                    }
                })
            })
        }),
    }
}

/// `assumeProps(props..., forceOrder, returnType) -> serialized-props`
/// (spec §6): build an opaque blob representing a `ClosureProperties`. The
/// "serialization" is the value itself — opaque to callers outside this
/// crate, constructed only through this helper.
pub fn assume_props(
    flags: crate::pir::assumptions::PropertyFlags,
    force_order: Vec<usize>,
    return_type: crate::pir::ty::PirType,
) -> ClosureProperties {
    ClosureProperties { flags, argument_force_order: force_order, return_type }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::value::Constant;

    fn make_rir(name: &str, consts: &[Constant]) -> rir::Function {
        let mut f = rir::Function::new(name, 0);
        for c in consts {
            f = f.with_constant(c.clone());
        }
        f
    }

    #[test]
    fn not_a_closure_is_rejected() {
        let mut rir = make_rir("x", &[]);
        rir.is_closure = false;
        let mut closure = Closure::new("x");
        let program = HashMap::default();
        let result = compile(&rir, &mut closure, &rir::IdentityBackend, &program, &CompileOptions::default());
        assert!(matches!(result, Err(Error::NotAClosure(_))));
    }

    #[test]
    fn s1_compile_inserts_version_and_folds() {
        let rir = make_rir("f", &[Constant::Integer(Some(2)), Constant::Integer(Some(3))]);
        let mut closure = Closure::new("f");
        let program = HashMap::default();
        compile(&rir, &mut closure, &rir::IdentityBackend, &program, &CompileOptions::default()).unwrap();
        assert_eq!(closure.table.versions().len(), 1);
    }

    #[test]
    fn dry_run_skips_insertion() {
        let rir = make_rir("f", &[Constant::Integer(Some(1))]);
        let mut closure = Closure::new("f");
        let program = HashMap::default();
        let options = CompileOptions { dry_run: true, ..Default::default() };
        compile(&rir, &mut closure, &rir::IdentityBackend, &program, &options).unwrap();
        assert!(closure.table.versions().is_empty());
    }

    #[test]
    fn check_version_count_and_no_branch() {
        let rir = make_rir("f", &[Constant::Integer(Some(5))]);
        let mut closure = Closure::new("f");
        let program = HashMap::default();
        compile(&rir, &mut closure, &rir::IdentityBackend, &program, &CompileOptions::default()).unwrap();
        assert!(check(&closure, &[Check::VersionCount(1), Check::Ssa, Check::NoBranch]));
        assert!(check(&closure, &[Check::ReturnsConstant(Constant::Integer(Some(5)))]));
    }
}

//! Optimization passes and the pass-pipeline plumbing (spec §2 component H).
//!
//! Default pipeline order (spec §4.H): `Constantfold` -> `TypeInference`.
//! Passes are idempotent; the pipeline re-runs them to a fixpoint (bounded,
//! so a pass that oscillates can't hang the driver).

pub mod constantfold;
pub mod typeinference;

use crate::debug::{DebugFlags, DebugOptions};
use crate::pir::closure::ClosureVersion;
use rustc_hash::FxHashMap as HashMap;
use tracing::debug_span;

/// Cap on full constantfold+typeinference rounds, matching the belt-and-
/// braces cap the analyzer framework uses (spec §4.F).
const MAX_ROUNDS: usize = 64;

/// Run the default pipeline over `version` to a fixpoint (spec §4.H
/// "Passes are idempotent and may be re-run to fixed point").
/// `program` is the set of sibling closure versions the scope analysis may
/// recurse into for statically-known call targets (spec §4.G).
pub fn run_pipeline(version: &mut ClosureVersion, program: &HashMap<String, ClosureVersion>, debug: &DebugOptions) {
    for _ in 0..MAX_ROUNDS {
        let mut changed = false;

        if debug.pass_enabled("Constantfold") {
            let _span = debug_span!("pass", name = "Constantfold", version = %version.name).entered();
            changed |= constantfold::apply(version, debug);
        }

        if debug.pass_enabled("TypeInference") {
            let _span = debug_span!("pass", name = "TypeInference", version = %version.name).entered();
            changed |= typeinference::apply(version, program);
        }

        // Dead-branch cleanup (spec §4.H "after any transform that produces
        // unreachable BBs"): constantfold already deletes dominated dead
        // arms, but a reachability sweep catches anything else a future
        // pass might orphan.
        changed |= sweep_unreachable(version);

        if debug.has(DebugFlags::PRINT_OPTIMIZATION_PASSES) && debug.function_enabled(&version.name) {
            tracing::debug!(target: "pirc::opt", version = %version.name, "pipeline round changed={changed}");
        }

        if !changed {
            break;
        }
    }
}

fn sweep_unreachable(version: &mut ClosureVersion) -> bool {
    let mut changed = false;
    changed |= sweep_code(&mut version.entry);
    for p in &mut version.promises {
        changed |= sweep_code(&mut p.code);
    }
    changed
}

fn sweep_code(code: &mut crate::pir::instr::Code) -> bool {
    let reachable: std::collections::HashSet<_> = code.reachable_bbs().into_iter().collect();
    let dead: Vec<_> = code.bb_ids().filter(|bb| !reachable.contains(bb)).collect();
    if dead.is_empty() {
        return false;
    }
    crate::pir::cfg::remove_bbs(code, &dead);
    true
}

//! Type inference / unboxing (spec §4.H "TypeInference / unboxing").
//! Grounded in `compiler/opt/type_inference.cpp`'s per-instruction
//! signature table and its use of the scope analysis's load results to
//! tighten `LdVar` types.

use crate::analysis::scope::{ScopeAnalysis, ScopeAnalysisOutput};
use crate::pir::closure::ClosureVersion;
use crate::pir::instr::{BinOp, Code, Instruction, InstrKind};
use crate::pir::ty::{PirType, RType};
use crate::pir::value::Value;
use rustc_hash::FxHashMap as HashMap;

/// `TypeInference::apply` (spec §4.H). Returns whether any type changed, so
/// the pipeline can re-run passes to a fixpoint.
pub fn apply(version: &mut ClosureVersion, program: &HashMap<String, ClosureVersion>) -> bool {
    let mut changed = false;
    let (_result, scope_output) = ScopeAnalysis::new(program, version.name.clone()).run(&version.entry);
    changed |= tighten_loads(&mut version.entry, &scope_output);
    changed |= infer_and_unbox(&mut version.entry);
    for promise in &mut version.promises {
        changed |= infer_and_unbox(&mut promise.code);
    }
    changed
}

/// Step 1: tighten `LdVar` result types using the scope analysis's proof
/// that the loaded value is a scalar number, retaining `maybeMissing`/
/// `maybePromiseWrapped`.
fn tighten_loads(code: &mut Code, scope_output: &ScopeAnalysisOutput) -> bool {
    let mut changed = false;
    for &bb in &code.reachable_bbs() {
        for idx in 0..code.bb(bb).instrs.len() {
            let id = code.bb(bb).instrs[idx];
            if !matches!(code.instr(id).kind, InstrKind::LdVar(..)) {
                continue;
            }
            let Some(load) = scope_output.loads.get(&id) else { continue };
            if load.unknown {
                continue;
            }
            let old = code.instr(id).ty;
            let mut tightened = load.ty;
            if old.maybe_lazy() {
                tightened = tightened.or_lazy();
            }
            if old.maybe_missing() {
                tightened = tightened.or_missing();
            }
            if tightened != old {
                code.instr_mut(id).ty = tightened;
                changed = true;
            }
        }
    }
    changed
}

/// Steps 2–4: arithmetic/comparison result-type signatures, `Unbox`
/// insertion, and reverse-post-order propagation to a fixpoint.
fn infer_and_unbox(code: &mut Code) -> bool {
    let mut changed = false;
    loop {
        let mut round_changed = false;
        let rpo = crate::pir::cfg::reverse_post_order(code);
        for &bb in &rpo {
            let mut idx = 0;
            while idx < code.bb(bb).instrs.len() {
                let id = code.bb(bb).instrs[idx];
                if let InstrKind::Binary(op, lhs, rhs) = code.instr(id).kind {
                    round_changed |= unbox_and_retype(code, bb, &mut idx, op, lhs, rhs);
                }
                idx += 1;
            }
        }
        changed |= round_changed;
        if !round_changed {
            break;
        }
    }
    changed
}

/// For one `Binary` instruction: insert `Unbox` casts ahead of it when an
/// argument is a statically-scalar boxed numeric, then set the
/// instruction's own result type per the signature table (step 2/3).
fn unbox_and_retype(code: &mut Code, bb: crate::pir::value::BBId, idx: &mut usize, op: BinOp, lhs: Value, rhs: Value) -> bool {
    let mut changed = false;
    let mut lhs = lhs;
    let mut rhs = rhs;

    if should_unbox(code, lhs) {
        let ty = code.instr(lhs.0).ty.unboxed();
        let new_id = code.insert(bb, *idx, Instruction { kind: InstrKind::Unbox(lhs), ty });
        lhs = Value(new_id);
        *idx += 1;
        changed = true;
    }
    if should_unbox(code, rhs) {
        let ty = code.instr(rhs.0).ty.unboxed();
        let new_id = code.insert(bb, *idx, Instruction { kind: InstrKind::Unbox(rhs), ty });
        rhs = Value(new_id);
        *idx += 1;
        changed = true;
    }

    let instr_id = code.bb(bb).instrs[*idx];
    if let InstrKind::Binary(_, old_l, old_r) = &mut code.instr_mut(instr_id).kind {
        if *old_l != lhs || *old_r != rhs {
            *old_l = lhs;
            *old_r = rhs;
            changed = true;
        }
    }

    let lhs_ty = code.instr(lhs.0).ty;
    let rhs_ty = code.instr(rhs.0).ty;
    let result_ty = signature(op, lhs_ty, rhs_ty);
    if code.instr(instr_id).ty != result_ty {
        code.instr_mut(instr_id).ty = result_ty;
        changed = true;
    }
    changed
}

/// A value is eligible for unboxing when it's a statically scalar numeric
/// type that isn't already unboxed (spec §4.H step 2: "if an argument
/// value is of a boxed numeric type and a scalar is statically known").
fn should_unbox(code: &Code, v: Value) -> bool {
    if matches!(code.instr(v.0).kind, InstrKind::Unbox(_)) {
        return false;
    }
    let ty = code.instr(v.0).ty;
    ty.is_r_type() && ty.is_scalar() && !ty.is_unboxed() && is_numeric(ty)
}

fn is_numeric(ty: PirType) -> bool {
    ty.maybe(RType::Integer) || ty.maybe(RType::Real) || ty.maybe(RType::Logical)
}

/// The result-type signature table (spec §4.H step 2/3): `Add: int,int ->
/// int; {int,real} -> real; lgl op lgl -> lgl per op` for arithmetic, and
/// `scalar logical unboxed` for comparisons when both arguments are scalar
/// unboxed numerics.
fn signature(op: BinOp, lhs: PirType, rhs: PirType) -> PirType {
    if op.is_comparison() {
        if is_numeric(lhs) && is_numeric(rhs) && lhs.is_scalar() && rhs.is_scalar() && lhs.is_unboxed() && rhs.is_unboxed() {
            return PirType::from(RType::Logical).scalar().unboxed();
        }
        return PirType::from(RType::Logical);
    }

    let both_unboxed_scalar = lhs.is_scalar() && rhs.is_scalar() && lhs.is_unboxed() && rhs.is_unboxed();
    let result_tag = if lhs.maybe(RType::Real) || rhs.maybe(RType::Real) {
        RType::Real
    } else if lhs.maybe(RType::Integer) && rhs.maybe(RType::Integer) {
        RType::Integer
    } else if lhs.maybe(RType::Logical) && rhs.maybe(RType::Logical) {
        RType::Logical
    } else {
        return PirType::num();
    };

    let mut ty = PirType::from(result_tag);
    if both_unboxed_scalar {
        ty = ty.scalar().unboxed();
    }
    ty
}

//! Constant folding, dead `Assume` removal, and dead-branch deletion
//! (spec §4.H "Constantfold"). Grounded in `compiler/opt/constantfold.cpp`:
//! the three-phase shape (fold values in one forward pass, collect branch
//! removals, apply them after the fold pass so BB deletion never
//! invalidates an in-progress iterator) mirrors that file's `apply`.

use crate::debug::{DebugFlags, DebugOptions};
use crate::pir::cfg::DominatorTree;
use crate::pir::closure::ClosureVersion;
use crate::pir::instr::{BinOp, Code, Instruction, InstrKind};
use crate::pir::ty::PirType;
use crate::pir::value::{BBId, Constant, Logical, Value};
use tracing::{debug, trace};

/// Resolve `v` to its constant, if any — looking through `Unbox` the way
/// the source's fold step looks through cast/force wrappers (spec §4.H
/// step 2, "possibly through cast/force bypass").
fn resolve_const(code: &Code, v: Value) -> Option<Constant> {
    match &code.instr(v.0).kind {
        InstrKind::LdConst(c) => Some(c.clone()),
        InstrKind::Unbox(inner) => resolve_const(code, *inner),
        _ => None,
    }
}

fn as_f64(c: &Constant) -> Option<f64> {
    match c {
        Constant::Integer(Some(i)) => Some(*i as f64),
        Constant::Real(r) => Some(*r),
        Constant::Logical(Logical::True) => Some(1.0),
        Constant::Logical(Logical::False) => Some(0.0),
        _ => None,
    }
}

fn is_na(c: &Constant) -> bool {
    matches!(c, Constant::Integer(None) | Constant::Logical(Logical::Na)) || matches!(c, Constant::Real(r) if r.is_nan())
}

fn is_real(c: &Constant) -> bool {
    matches!(c, Constant::Real(_))
}

/// Evaluate a binary arithmetic/comparison op over two constants using
/// the host's numeric semantics (spec §4.H step 2, §8 invariant 5: the
/// source compiler treats this as opaque-but-correct; here it is the one
/// piece of "builtin semantics" this core must get right, since folding
/// claims to preserve it).
fn eval_binop(op: BinOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    if is_na(lhs) || is_na(rhs) {
        return Some(if op.is_comparison() {
            Constant::Logical(Logical::Na)
        } else if is_real(lhs) || is_real(rhs) {
            Constant::Real(f64::NAN)
        } else {
            Constant::Integer(None)
        });
    }
    let (a, b) = (as_f64(lhs)?, as_f64(rhs)?);
    let stays_real = is_real(lhs) || is_real(rhs) || matches!(op, BinOp::Div | BinOp::Pow);

    Some(match op {
        BinOp::Add => numeric(a + b, stays_real),
        BinOp::Sub => numeric(a - b, stays_real),
        BinOp::Mul => numeric(a * b, stays_real),
        BinOp::Div => Constant::Real(a / b),
        BinOp::IDiv => numeric((a / b).floor(), stays_real),
        BinOp::Mod => numeric(a - (a / b).floor() * b, stays_real),
        BinOp::Pow => Constant::Real(a.powf(b)),
        BinOp::Lt => Constant::Logical(log(a < b)),
        BinOp::Gt => Constant::Logical(log(a > b)),
        BinOp::Lte => Constant::Logical(log(a <= b)),
        BinOp::Gte => Constant::Logical(log(a >= b)),
        BinOp::Eq => Constant::Logical(log(a == b)),
        BinOp::Neq => Constant::Logical(log(a != b)),
    })
}

fn numeric(v: f64, as_real: bool) -> Constant {
    if as_real {
        Constant::Real(v)
    } else {
        Constant::Integer(Some(v as i32))
    }
}

fn log(b: bool) -> Logical {
    if b {
        Logical::True
    } else {
        Logical::False
    }
}

fn constants_identical(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Integer(x), Constant::Integer(y)) => x == y,
        (Constant::Real(x), Constant::Real(y)) => x.to_bits() == y.to_bits(),
        (Constant::Logical(x), Constant::Logical(y)) => x == y,
        (Constant::Str(x), Constant::Str(y)) => x == y,
        (Constant::Null, Constant::Null) => true,
        _ => false,
    }
}

/// Which arm of a `Branch` survives.
#[derive(Debug, Clone, Copy)]
struct BranchRemoval {
    bb: BBId,
    take_next0: bool,
}

/// `Constantfold::apply` (spec §4.H). Returns whether anything changed, so
/// callers can re-run the pass to a fixpoint (passes are idempotent).
pub fn apply(version: &mut ClosureVersion, debug: &DebugOptions) -> bool {
    let mut changed = false;
    changed |= fold_code(&mut version.entry, &version.name, debug);
    for promise in &mut version.promises {
        changed |= fold_code(&mut promise.code, &version.name, debug);
    }
    changed
}

fn fold_code(code: &mut Code, pass_context: &str, debug: &DebugOptions) -> bool {
    let mut changed = false;
    let reachable = code.reachable_bbs();

    // Phase 1: fold values in a single forward pass per BB.
    for &bb in &reachable {
        let mut idx = 0;
        while idx < code.bb(bb).instrs.len() {
            let instr_id = code.bb(bb).instrs[idx];
            let instr = code.instr(instr_id).clone();
            if let InstrKind::Binary(op, lhs, rhs) = instr.kind {
                if let (Some(l), Some(r)) = (resolve_const(code, lhs), resolve_const(code, rhs)) {
                    if let Some(folded) = eval_binop(op, &l, &r) {
                        let ty = const_type(&folded);
                        code.replace(bb, idx, Instruction { kind: InstrKind::LdConst(folded), ty });
                        changed = true;
                        if debug.has(DebugFlags::PRINT_OPTIMIZATION_PASSES) && debug.pass_enabled("Constantfold") {
                            trace!(target: "pirc::opt", pass_context, instr = %instr_id, "folded binary op");
                        }
                    }
                }
            }
            idx += 1;
        }
    }

    // Assume(cond) deletion (step 3): operate over a fresh snapshot of
    // positions since folds above may have replaced operands.
    for &bb in &reachable {
        let mut idx = 0;
        while idx < code.bb(bb).instrs.len() {
            let instr_id = code.bb(bb).instrs[idx];
            let should_delete = match &code.instr(instr_id).kind {
                InstrKind::Assume(cond) => should_delete_assume(code, *cond),
                _ => false,
            };
            if should_delete {
                code.remove(bb, idx);
                changed = true;
            } else {
                idx += 1;
            }
        }
    }

    // Phase 2 (step 4): collect branch removals without mutating the graph.
    let mut removals = Vec::new();
    for &bb in &reachable {
        let Some(&last) = code.bb(bb).instrs.last() else { continue };
        if let InstrKind::Branch(cond) = code.instr(last).kind {
            if let Some(take_true) = branch_direction(code, cond) {
                removals.push(BranchRemoval { bb, take_next0: take_true });
            }
        }
    }

    if removals.is_empty() {
        return changed;
    }

    // Phase 3 (step 5): apply removals — compute dominators once on the
    // pre-deletion graph, delete every marked arm's dominated set, then
    // rewrite each branch to an unconditional edge.
    let dom = DominatorTree::compute(code);
    let mut dead_set = std::collections::HashSet::new();
    for r in &removals {
        let bb_ref = code.bb(r.bb);
        let dead_arm = if r.take_next0 { bb_ref.next1 } else { bb_ref.next0 };
        if let Some(dead) = dead_arm {
            for d in dom.collect_dominated(dead) {
                dead_set.insert(d);
            }
        }
    }
    let dead: Vec<BBId> = dead_set.into_iter().collect();
    if !dead.is_empty() {
        crate::pir::cfg::remove_bbs(code, &dead);
        changed = true;
    }

    for r in &removals {
        let survivor = if r.take_next0 { code.bb(r.bb).next0 } else { code.bb(r.bb).next1 };
        let bb_ref = code.bb_mut(r.bb);
        bb_ref.next0 = survivor;
        bb_ref.next1 = None;
        if let Some(&last) = bb_ref.instrs.last() {
            if matches!(code.instr(last).kind, InstrKind::Branch(_)) {
                let at = code.bb(r.bb).instrs.len() - 1;
                code.remove(r.bb, at);
            }
        }
        debug!(target: "pirc::opt", bb = %r.bb, "branch removed, unconditional edge kept");
    }

    changed
}

fn const_type(c: &Constant) -> PirType {
    use crate::pir::ty::RType;
    match c {
        Constant::Null => PirType::from(RType::Nil),
        Constant::Logical(_) => PirType::from(RType::Logical).scalar(),
        Constant::Integer(_) => PirType::from(RType::Integer).scalar(),
        Constant::Real(_) => PirType::from(RType::Real).scalar(),
        Constant::Str(_) => PirType::from(RType::Str),
    }
}

fn should_delete_assume(code: &Code, cond: Value) -> bool {
    match &code.instr(cond.0).kind {
        InstrKind::IsObject(x) => !code.instr(x.0).ty.maybe_obj(),
        InstrKind::Identical(a, b) => resolve_const(code, *a).is_some() && resolve_const(code, *b).is_some(),
        _ => false,
    }
}

/// Returns `Some(true)` / `Some(false)` (the taken direction) if `cond` is
/// statically decidable per spec §4.H step 4; `None` if not foldable (e.g.
/// an `NA` logical, which disables removal).
fn branch_direction(code: &Code, cond: Value) -> Option<bool> {
    match &code.instr(cond.0).kind {
        InstrKind::AsTest(x) => {
            let c = resolve_through_as_logical(code, *x)?;
            c.as_definite_logical()
        }
        InstrKind::IsObject(x) => {
            if !code.instr(x.0).ty.maybe_obj() {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn resolve_through_as_logical(code: &Code, v: Value) -> Option<Constant> {
    match &code.instr(v.0).kind {
        InstrKind::AsLogical(inner) => resolve_const(code, *inner),
        InstrKind::Identical(a, b) => {
            let (ca, cb) = (resolve_const(code, *a)?, resolve_const(code, *b)?);
            Some(Constant::Logical(log(constants_identical(&ca, &cb))))
        }
        _ => resolve_const(code, v),
    }
}

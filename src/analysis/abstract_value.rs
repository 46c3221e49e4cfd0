//! `AbstractValue`, `AbstractEnvironment`, and the environment hierarchy
//! (spec §3, §4.E). Grounded in `compiler/analysis/abstract_value.h`.

use crate::pir::ty::PirType;
use crate::pir::value::{EnvValue, InstrId, Value};
use crate::symbols::Symbol;
use rustc_hash::FxHashMap as HashMap;

/// `{ unknown, vals: set of (Value, OriginInstruction), type }` (spec §3).
/// `tainted()` is the top element of this lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractValue {
    pub unknown: bool,
    pub vals: Vec<(Value, InstrId)>,
    pub ty: PirType,
}

impl AbstractValue {
    /// The top element: `unknown=true, type=any, vals=∅`.
    pub fn tainted() -> Self {
        Self {
            unknown: true,
            vals: Vec::new(),
            ty: PirType::any(),
        }
    }

    /// A single known origin.
    pub fn known(value: Value, origin: InstrId, ty: PirType) -> Self {
        Self {
            unknown: false,
            vals: vec![(value, origin)],
            ty,
        }
    }

    /// Merge (`⊔`, spec §3): unknown dominates; otherwise union the `vals`
    /// sets and join the types. Returns whether `self` changed.
    pub fn merge(&mut self, other: &AbstractValue) -> bool {
        if self.unknown {
            return false;
        }
        if other.unknown {
            *self = AbstractValue::tainted();
            return true;
        }
        let mut changed = false;
        for entry in &other.vals {
            if !self.vals.contains(entry) {
                self.vals.push(*entry);
                changed = true;
            }
        }
        let joined = self.ty | other.ty;
        if joined != self.ty {
            self.ty = joined;
            changed = true;
        }
        changed
    }
}

/// `{ entries, functionPointers, parentEnv, leaked, tainted, mkClosures }`
/// (spec §3, §4.E).
#[derive(Debug, Clone)]
pub struct AbstractEnvironment {
    entries: HashMap<Symbol, AbstractValue>,
    /// `MkFunCls`-producing instruction a given value resolves to, if known
    /// (`None` recorded on conflict — the source's `functionPointers`).
    function_pointers: HashMap<Value, Option<InstrId>>,
    pub parent_env: EnvValue,
    pub leaked: bool,
    pub tainted: bool,
    /// Instructions that produced a closure while this environment was the
    /// lexical environment in scope (spec §4.G "Track closures").
    pub mk_closures: HashMap<InstrId, InstrId>,
}

impl Default for AbstractEnvironment {
    fn default() -> Self {
        Self {
            entries: HashMap::default(),
            function_pointers: HashMap::default(),
            parent_env: EnvValue::UninitializedParent,
            leaked: false,
            tainted: false,
            mk_closures: HashMap::default(),
        }
    }
}

impl AbstractEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A strong binding, clobbering any prior entry (spec §4.E).
    pub fn set(&mut self, name: Symbol, value: Value, origin: InstrId, ty: PirType) {
        self.entries.insert(name, AbstractValue::known(value, origin, ty));
    }

    /// `get(name)`: a tainted value if no binding exists, or if the whole
    /// environment is tainted.
    pub fn get(&self, name: Symbol) -> AbstractValue {
        if self.tainted {
            return AbstractValue::tainted();
        }
        self.entries.get(&name).cloned().unwrap_or_else(AbstractValue::tainted)
    }

    pub fn mark_leaked(&mut self) {
        self.leaked = true;
    }

    /// Taint the whole environment: all entries become unknown (spec §4.E).
    pub fn taint(&mut self) {
        self.tainted = true;
        for v in self.entries.values_mut() {
            *v = AbstractValue::tainted();
        }
    }

    pub fn record_function_pointer(&mut self, value: Value, producer: Option<InstrId>) {
        match self.function_pointers.get(&value) {
            None => {
                self.function_pointers.insert(value, producer);
            }
            Some(existing) if *existing != producer => {
                self.function_pointers.insert(value, None);
            }
            _ => {}
        }
    }

    pub fn function_pointer(&self, value: Value) -> Option<InstrId> {
        self.function_pointers.get(&value).copied().flatten()
    }

    pub fn record_mk_closure(&mut self, instr: InstrId, producer: InstrId) {
        self.mk_closures.insert(instr, producer);
    }

    /// Merge (spec §3): key sets are unioned; a key present on only one
    /// side becomes tainted on the output (conservative); `parentEnv`
    /// upgrades from uninitialized, or becomes `UnknownParent` on
    /// disagreement; `functionPointers` becomes unknown on conflict.
    /// Returns whether `self` changed.
    pub fn merge(&mut self, other: &AbstractEnvironment) -> bool {
        let mut changed = false;

        if !self.tainted && other.tainted {
            self.taint();
            changed = true;
        }
        if !self.leaked && other.leaked {
            self.leaked = true;
            changed = true;
        }

        let mut keys: Vec<Symbol> = self.entries.keys().copied().collect();
        for k in other.entries.keys() {
            if !keys.contains(k) {
                keys.push(*k);
            }
        }
        for key in keys {
            match (self.entries.get(&key).cloned(), other.entries.get(&key)) {
                (Some(mut mine), Some(theirs)) => {
                    if mine.merge(theirs) {
                        changed = true;
                    }
                    self.entries.insert(key, mine);
                }
                (Some(_), None) => {
                    // present only on self's side: becomes tainted
                    if self.entries.get(&key) != Some(&AbstractValue::tainted()) {
                        self.entries.insert(key, AbstractValue::tainted());
                        changed = true;
                    }
                }
                (None, Some(_)) => {
                    self.entries.insert(key, AbstractValue::tainted());
                    changed = true;
                }
                (None, None) => {}
            }
        }

        self.parent_env = match (self.parent_env, other.parent_env) {
            (EnvValue::UninitializedParent, p) if p != EnvValue::UninitializedParent => {
                changed = true;
                p
            }
            (p, EnvValue::UninitializedParent) => p,
            (a, b) if a == b => a,
            _ => {
                if self.parent_env != EnvValue::UnknownParent {
                    changed = true;
                }
                EnvValue::UnknownParent
            }
        };

        let mut fp_keys: Vec<Value> = self.function_pointers.keys().copied().collect();
        for k in other.function_pointers.keys() {
            if !fp_keys.contains(k) {
                fp_keys.push(*k);
            }
        }
        for key in fp_keys {
            let mine = self.function_pointers.get(&key).copied();
            let theirs = other.function_pointers.get(&key).copied();
            let merged = match (mine, theirs) {
                (Some(a), Some(b)) if a == b => a,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                _ => None,
            };
            if self.function_pointers.get(&key).copied() != Some(merged) {
                self.function_pointers.insert(key, merged);
                changed = true;
            }
        }

        for (instr, producer) in &other.mk_closures {
            if self.mk_closures.insert(*instr, *producer).is_none() {
                changed = true;
            }
        }

        changed
    }
}

/// `AbstractEnvironmentHierarchy` (spec §3): maps the environment-producing
/// `Value` to its `AbstractEnvironment`, and resolves loads by walking the
/// parent chain.
#[derive(Debug, Clone, Default)]
pub struct AbstractEnvironmentHierarchy {
    envs: HashMap<Value, AbstractEnvironment>,
}

impl AbstractEnvironmentHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, env: Value) -> Option<&AbstractEnvironment> {
        self.envs.get(&env)
    }

    pub fn get_or_insert(&mut self, env: Value) -> &mut AbstractEnvironment {
        self.envs.entry(env).or_default()
    }

    /// Walk the parent chain from `env` until a non-tainted binding for
    /// `name` is found or `UnknownParent` is reached; returns the
    /// resolving environment's value and the lookup result.
    pub fn lookup(&self, env: Value, name: Symbol) -> (Option<Value>, AbstractValue) {
        let mut cur = env;
        loop {
            let Some(e) = self.envs.get(&cur) else {
                return (None, AbstractValue::tainted());
            };
            let v = e.get(name);
            if !v.unknown {
                return (Some(cur), v);
            }
            match e.parent_env {
                EnvValue::Known(parent) => cur = parent,
                EnvValue::UnknownParent | EnvValue::UninitializedParent => {
                    return (None, AbstractValue::tainted());
                }
            }
        }
    }

    /// Merge every environment from `other` into `self`; returns whether
    /// anything changed (used by the fixpoint driver).
    pub fn merge(&mut self, other: &AbstractEnvironmentHierarchy) -> bool {
        let mut changed = false;
        for (env, their_state) in &other.envs {
            let mine = self.envs.entry(*env).or_default();
            if mine.merge(their_state) {
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::ty::RType;

    fn v(n: u32) -> Value {
        Value(InstrId(n))
    }

    #[test]
    fn merge_taints_key_present_only_on_one_side() {
        let mut a = AbstractEnvironment::new();
        a.set(Symbol::Add, v(1), InstrId(1), PirType::from(RType::Integer));
        let b = AbstractEnvironment::new();

        assert!(a.merge(&b));
        assert!(a.get(Symbol::Add).unknown);
    }

    #[test]
    fn merge_upgrades_uninitialized_parent() {
        let mut a = AbstractEnvironment::new();
        let mut b = AbstractEnvironment::new();
        b.parent_env = EnvValue::Known(v(9));

        assert!(a.merge(&b));
        assert_eq!(a.parent_env, EnvValue::Known(v(9)));
    }

    #[test]
    fn merge_disagreeing_parents_becomes_unknown() {
        let mut a = AbstractEnvironment::new();
        a.parent_env = EnvValue::Known(v(1));
        let mut b = AbstractEnvironment::new();
        b.parent_env = EnvValue::Known(v(2));

        assert!(a.merge(&b));
        assert_eq!(a.parent_env, EnvValue::UnknownParent);
    }

    #[test]
    fn taint_propagates_to_all_entries() {
        let mut a = AbstractEnvironment::new();
        a.set(Symbol::Add, v(1), InstrId(1), PirType::from(RType::Integer));
        a.taint();
        assert!(a.get(Symbol::Add).unknown);
    }
}

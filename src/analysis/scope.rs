//! Scope / abstract-environment analysis (spec §4.G). Grounded in
//! `compiler/analysis/scope.cpp`'s `TheScopeAnalysis` transfer function;
//! the interprocedural recursion is modeled as the source's DESIGN NOTES
//! (spec §9) recommend for Rust — a depth-bounded recursive call rather
//! than nested analyzer objects, since each level here is itself already
//! a plain function call with no shared mutable analyzer state.

use crate::analysis::abstract_value::{AbstractEnvironmentHierarchy, AbstractValue};
use crate::analysis::framework::{run_forward, AnalysisResult, AnalysisState, TransferFunction};
use crate::pir::closure::ClosureVersion;
use crate::pir::instr::{Code, InstrKind};
use crate::pir::ty::PirType;
use crate::pir::value::{BBId, EnvValue, InstrId, Value};
use rustc_hash::FxHashMap as HashMap;

/// Interprocedural recursion bound (spec §4.G, §5): deeper calls are
/// treated as opaque.
pub const MAX_DEPTH: usize = 5;

/// The fixpoint state: just the environment hierarchy (spec §3's merge
/// rules for `AbstractEnvironment` already capture the lattice; `fun_types`/
/// `loads`/etc. are recorded as side outputs on the analysis itself, not
/// part of the merged lattice, since they accumulate rather than merge).
#[derive(Debug, Clone, Default)]
pub struct ScopeState {
    pub hierarchy: AbstractEnvironmentHierarchy,
}

impl AnalysisState for ScopeState {
    fn merge(&mut self, other: &Self) -> bool {
        self.hierarchy.merge(&other.hierarchy)
    }
}

/// Outputs beyond the per-BB states (spec §4.G).
#[derive(Debug, Clone, Default)]
pub struct ScopeAnalysisOutput {
    pub loads: HashMap<InstrId, AbstractValue>,
    pub observed_stores: Vec<InstrId>,
    pub all_stores_observed: Vec<Value>,
    pub fun_types: HashMap<String, PirType>,
}

/// `TheScopeAnalysis`'s transfer function, scoped to one `ClosureVersion`
/// plus a lookup for statically-known call targets (the "program" this
/// closure is compiled within).
pub struct ScopeAnalysis<'p> {
    program: &'p HashMap<String, ClosureVersion>,
    closure_name: String,
    depth: usize,
    static_closure_env: Option<Value>,
    pub output: ScopeAnalysisOutput,
}

impl<'p> ScopeAnalysis<'p> {
    pub fn new(program: &'p HashMap<String, ClosureVersion>, closure_name: impl Into<String>) -> Self {
        Self {
            program,
            closure_name: closure_name.into(),
            depth: 0,
            static_closure_env: None,
            output: ScopeAnalysisOutput::default(),
        }
    }

    fn with_depth(
        program: &'p HashMap<String, ClosureVersion>,
        closure_name: String,
        depth: usize,
        static_closure_env: Option<Value>,
    ) -> Self {
        Self {
            program,
            closure_name,
            depth,
            static_closure_env,
            output: ScopeAnalysisOutput::default(),
        }
    }

    /// Run this analysis over `code` to a fixpoint (spec §4.F/§4.G), `code`
    /// being the owning `ClosureVersion`'s entry body.
    pub fn run(mut self, code: &Code) -> (AnalysisResult<ScopeState>, ScopeAnalysisOutput) {
        let result = run_forward(code, &mut self as &mut Self, code.bb_count() * code.instr_count().max(1) + 16);
        (result, self.output)
    }

    fn record_load(&mut self, instr: InstrId, hierarchy: &AbstractEnvironmentHierarchy, env: Value, name: crate::symbols::Symbol) {
        let (origin, value) = hierarchy.lookup(env, name);
        if let Some(origin_env) = origin {
            if origin_env != env {
                self.output.observed_stores.extend(value.vals.iter().map(|(_, i)| *i));
            }
        } else {
            self.output.all_stores_observed.push(env);
        }
        self.output.loads.insert(instr, value);
    }

    /// If `instr_id`'s just-recorded load resolves to a single value that is
    /// itself a `MkFunCls`, track it the same as a direct `MkFunCls` (spec
    /// §4.G "Track closures": "either `MkFunCls` directly or a load
    /// resolving to a single `MkFunCls`").
    fn record_resolved_closure(&mut self, code: &Code, state: &mut ScopeState, instr_id: InstrId) {
        let Some(loaded) = self.output.loads.get(&instr_id) else { return };
        let Some(producer) = single_mkfuncls_value(code, loaded) else { return };
        if let InstrKind::MkFunCls { lexical_env, .. } = &code.instr(producer).kind {
            state.hierarchy.get_or_insert(*lexical_env).record_mk_closure(instr_id, producer);
        }
    }

    /// Resolve `callee` to the `MkFunCls` instruction that produced it,
    /// either directly or through a load resolving to a single known value
    /// (the source's `findClosure`); caches the result via
    /// `function_pointers` so a repeated call on the same value in the same
    /// environment doesn't need to re-derive it.
    fn resolve_call_target(&mut self, code: &Code, state: &mut ScopeState, callee: Value) -> Option<InstrId> {
        match &code.instr(callee.0).kind {
            InstrKind::MkFunCls { lexical_env, .. } => {
                state.hierarchy.get_or_insert(*lexical_env).record_function_pointer(callee, Some(callee.0));
                Some(callee.0)
            }
            InstrKind::LdVar(name, env) | InstrKind::LdVarSuper(name, env) | InstrKind::LdFun(name, env) => {
                let (name, env) = (*name, *env);
                if let Some(cached) = state.hierarchy.get(env).and_then(|e| e.function_pointer(callee)) {
                    return Some(cached);
                }
                let (_, av) = state.hierarchy.lookup(env, name);
                let producer = single_mkfuncls_value(code, &av);
                state.hierarchy.get_or_insert(env).record_function_pointer(callee, producer);
                producer
            }
            _ => None,
        }
    }

    /// On a `Call`/`NamedCall` whose callee resolves to a statically-known
    /// target at `depth < MAX_DEPTH` with a matching argument count: spawn a
    /// nested analysis and merge its final state back in (spec §4.G, mirrors
    /// the `StaticCall` arm below). Returns whether the call was resolved.
    fn try_static_call(&mut self, code: &Code, state: &mut ScopeState, callee: Value, args: &[Value]) -> bool {
        if self.depth >= MAX_DEPTH {
            return false;
        }
        let Some(producer) = self.resolve_call_target(code, state, callee) else { return false };
        let InstrKind::MkFunCls { source, .. } = &code.instr(producer).kind else { return false };
        let Some(callee_version) = self.program.get(&source.0) else { return false };
        if args.len() != callee_version.nargs {
            return false;
        }

        let lexical_env = self.static_closure_env;
        let nested = ScopeAnalysis::with_depth(self.program, callee_version.name.clone(), self.depth + 1, lexical_env);
        let (result, nested_output) = nested.run(&callee_version.entry);
        if let Some(out) = result.bb_out(callee_version.entry.entry()) {
            state.hierarchy.merge(&out.hierarchy);
        }
        self.output.loads.extend(nested_output.loads);
        self.output.observed_stores.extend(nested_output.observed_stores);
        self.output.all_stores_observed.extend(nested_output.all_stores_observed);
        self.output.fun_types.extend(nested_output.fun_types);
        true
    }
}

/// Whether `av` is a single known value produced by `MkFunCls`; if so, the
/// producing instruction's id.
fn single_mkfuncls_value(code: &Code, av: &AbstractValue) -> Option<InstrId> {
    if av.unknown || av.vals.len() != 1 {
        return None;
    }
    let (val, _origin) = av.vals[0];
    match code.instr(val.0).kind {
        InstrKind::MkFunCls { .. } => Some(val.0),
        _ => None,
    }
}

impl<'p> TransferFunction for &mut ScopeAnalysis<'p> {
    type State = ScopeState;

    fn initial_state(&self) -> Self::State {
        ScopeState::default()
    }

    fn apply(&mut self, state: &mut Self::State, code: &Code, _bb: BBId, _idx: usize, instr_id: InstrId) {
        let instr = code.instr(instr_id).clone();
        let this_value = Value(instr_id);

        match &instr.kind {
            InstrKind::MkEnv { parent, locals } => {
                let lexical = parent.known().map(EnvValue::Known).unwrap_or_else(|| {
                    self.static_closure_env
                        .map(EnvValue::Known)
                        .unwrap_or(EnvValue::UnknownParent)
                });
                let env = state.hierarchy.get_or_insert(this_value);
                env.parent_env = lexical;
                for binding in locals {
                    env.set(binding.name, binding.value, instr_id, PirType::any());
                }
            }
            InstrKind::StVar { name, val, env } => {
                state.hierarchy.get_or_insert(*env).set(*name, *val, instr_id, instr.ty);
            }
            InstrKind::StVarSuper { name, val, env } => {
                let parent = state.hierarchy.get(*env).map(|e| e.parent_env);
                match parent {
                    Some(EnvValue::Known(p)) => {
                        state.hierarchy.get_or_insert(p).set(*name, *val, instr_id, instr.ty);
                    }
                    _ => {
                        // S5: parent unknown — taint every reachable entry
                        // in this environment, leave `leaked` unchanged.
                        state.hierarchy.get_or_insert(*env).taint();
                    }
                }
                let hierarchy = state.hierarchy.clone();
                self.record_load(instr_id, &hierarchy, *env, *name);
                self.record_resolved_closure(code, state, instr_id);
            }
            InstrKind::Return(r) => {
                let ty = code.instr(r.0).ty;
                let entry = self.output.fun_types.entry(self.closure_name.clone()).or_insert(PirType::bottom());
                *entry = *entry | ty;
            }
            InstrKind::LdVar(name, env) | InstrKind::LdVarSuper(name, env) | InstrKind::LdFun(name, env) => {
                let hierarchy = state.hierarchy.clone();
                self.record_load(instr_id, &hierarchy, *env, *name);
                self.record_resolved_closure(code, state, instr_id);
            }
            InstrKind::Call { callee, args } => {
                self.try_static_call(code, state, *callee, args);
            }
            InstrKind::NamedCall { callee, args, .. } => {
                self.try_static_call(code, state, *callee, args);
            }
            InstrKind::StaticCall { target, args } if self.depth < MAX_DEPTH => {
                if let Some(callee) = self.program.get(&target.0) {
                    if args.len() == callee.nargs {
                        let lexical_env = self.static_closure_env;
                        let nested = ScopeAnalysis::with_depth(
                            self.program,
                            callee.name.clone(),
                            self.depth + 1,
                            lexical_env,
                        );
                        let (result, nested_output) = nested.run(&callee.entry);
                        if let Some(out) = result.bb_out(callee.entry.entry()) {
                            state.hierarchy.merge(&out.hierarchy);
                        }
                        self.output.loads.extend(nested_output.loads);
                        self.output.observed_stores.extend(nested_output.observed_stores);
                        self.output.all_stores_observed.extend(nested_output.all_stores_observed);
                        self.output.fun_types.extend(nested_output.fun_types);
                    }
                }
            }
            InstrKind::MkFunCls { lexical_env, .. } => {
                state.hierarchy.get_or_insert(*lexical_env).record_mk_closure(instr_id, instr_id);
            }
            _ => {}
        }

        if instr.kind.leaks_env() {
            if let Some(env) = instr.kind.env() {
                state.hierarchy.get_or_insert(env).mark_leaked();
            }
        }
        if instr.kind.changes_env() {
            if let Some(env) = instr.kind.env() {
                state.hierarchy.get_or_insert(env).taint();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::instr::{Instruction};
    use crate::pir::ty::RType;
    use crate::pir::value::{Binding, Constant};
    use crate::symbols::Symbol;

    #[test]
    fn store_then_load_resolves_without_taint() {
        let mut code = Code::new();
        let entry = code.add_bb();
        let env_instr = code.append(entry, Instruction {
            kind: InstrKind::MkEnv { parent: EnvValue::UnknownParent, locals: vec![] },
            ty: PirType::from(RType::Env),
        });
        let env = Value(env_instr);
        let c = code.append(entry, Instruction {
            kind: InstrKind::LdConst(Constant::Integer(Some(42))),
            ty: PirType::from(RType::Integer).scalar(),
        });
        let _store = code.append(entry, Instruction {
            kind: InstrKind::StVar { name: Symbol::Add, val: Value(c), env },
            ty: PirType::voyd(),
        });
        let load = code.append(entry, Instruction {
            kind: InstrKind::LdVar(Symbol::Add, env),
            ty: PirType::any(),
        });
        code.append(entry, Instruction { kind: InstrKind::Return(Value(load)), ty: PirType::any() });

        let program = HashMap::default();
        let analysis = ScopeAnalysis::new(&program, "f");
        let (_result, output) = analysis.run(&code);

        let loaded = output.loads.get(&load).unwrap();
        assert!(!loaded.unknown);
        assert_eq!(loaded.vals[0].0, Value(c));
    }

    #[test]
    fn call_through_resolved_closure_recurses_interprocedurally() {
        use crate::pir::closure::{ClosureVersion, OptimizationContext};
        use crate::pir::instr::ClosureRef;

        let mut callee = ClosureVersion::new("g", 0, OptimizationContext::default());
        let callee_entry = callee.entry.add_bb();
        let seven = callee.entry.append(callee_entry, Instruction {
            kind: InstrKind::LdConst(Constant::Integer(Some(7))),
            ty: PirType::from(RType::Integer).scalar(),
        });
        callee.entry.append(callee_entry, Instruction {
            kind: InstrKind::Return(Value(seven)),
            ty: PirType::from(RType::Integer).scalar(),
        });
        let mut program = HashMap::default();
        program.insert("g".to_string(), callee);

        let mut code = Code::new();
        let entry = code.add_bb();
        let env_instr = code.append(entry, Instruction {
            kind: InstrKind::MkEnv { parent: EnvValue::UnknownParent, locals: vec![] },
            ty: PirType::from(RType::Env),
        });
        let env = Value(env_instr);
        let mkfuncls = code.append(entry, Instruction {
            kind: InstrKind::MkFunCls { source: ClosureRef("g".to_string()), lexical_env: env },
            ty: PirType::closure(),
        });
        code.append(entry, Instruction {
            kind: InstrKind::StVar { name: Symbol::Mul, val: Value(mkfuncls), env },
            ty: PirType::voyd(),
        });
        let load = code.append(entry, Instruction {
            kind: InstrKind::LdVar(Symbol::Mul, env),
            ty: PirType::closure(),
        });
        let call = code.append(entry, Instruction {
            kind: InstrKind::Call { callee: Value(load), args: vec![] },
            ty: PirType::any(),
        });
        code.append(entry, Instruction { kind: InstrKind::Return(Value(call)), ty: PirType::any() });

        let analysis = ScopeAnalysis::new(&program, "f");
        let (_result, output) = analysis.run(&code);

        // The nested analysis of "g" ran and its Return's type was folded
        // into fun_types, which only happens if the Call resolved its
        // target through the LdVar -> MkFunCls chain (not StaticCall).
        assert_eq!(output.fun_types.get("g"), Some(&PirType::from(RType::Integer)));
    }

    #[test]
    fn super_store_through_unknown_parent_taints() {
        let mut code = Code::new();
        let entry = code.add_bb();
        let env_instr = code.append(entry, Instruction {
            kind: InstrKind::MkEnv { parent: EnvValue::UnknownParent, locals: vec![Binding { name: Symbol::Sub, value: Value(InstrId(0)) }] },
            ty: PirType::from(RType::Env),
        });
        let env = Value(env_instr);
        let c = code.append(entry, Instruction {
            kind: InstrKind::LdConst(Constant::Integer(Some(1))),
            ty: PirType::from(RType::Integer),
        });
        code.append(entry, Instruction {
            kind: InstrKind::StVarSuper { name: Symbol::Add, val: Value(c), env },
            ty: PirType::voyd(),
        });
        code.append(entry, Instruction { kind: InstrKind::Return(Value(c)), ty: PirType::from(RType::Integer) });

        let program = HashMap::default();
        let analysis = ScopeAnalysis::new(&program, "f");
        let (result, _output) = analysis.run(&code);
        let out = result.bb_out(entry).unwrap();
        let e = out.hierarchy.get(env).unwrap();
        assert!(e.tainted);
        assert!(!e.leaked);
    }
}

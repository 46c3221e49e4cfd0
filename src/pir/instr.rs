//! Instructions, basic blocks, and the arena (`Code`) that owns both
//! (spec §3 "IR graph", §4.C, §9 "Cyclic ownership").
//!
//! Grounded in the source's `pir_impl.h`/`bb.h`/`instruction.h` shape, but
//! laid out as the source's own DESIGN NOTES recommend for Rust: the
//! `Code` arena owns every `Instruction` and `BB` in contiguous storage,
//! and all edges — argument slots, BB successors, use-lists — are plain
//! indices rather than reference-counted pointers.

use crate::error::{Error, Result};
use crate::pir::ty::{NativeType, PirType, RType};
use crate::pir::value::{Binding, BBId, Constant, EnvValue, InstrId, Value};
use crate::symbols::Symbol;
use rustc_hash::FxHashMap as HashMap;

/// One argument slot: the edge's source `Value` plus the `PirType` it's
/// expected to conform to (spec §3: "each slot records both the source
/// `Value*` and the expected `PirType`").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgSlot {
    pub value: Value,
    pub expected: PirType,
}

impl ArgSlot {
    fn new(value: Value, expected: PirType) -> Self {
        Self { value, expected }
    }
}

/// The binary arithmetic/comparison family (spec §3's instruction list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod | BinOp::Pow
        )
    }

    pub fn is_comparison(self) -> bool {
        !self.is_arithmetic()
    }
}

/// A reference to a top-level closure, e.g. `MkFunCls`'s `source`. The
/// front end that produces closure bodies is out of scope (spec §1), so
/// this core only needs a stable opaque handle to thread through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClosureRef(pub String);

/// One SSA instruction variant (spec §3's minimum instruction set).
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    // --- value producers ---
    LdConst(Constant),
    LdVar(Symbol, Value),
    LdVarSuper(Symbol, Value),
    LdFun(Symbol, Value),
    LdArg(usize),
    MkEnv {
        parent: EnvValue,
        locals: Vec<Binding>,
    },
    MkFunCls {
        source: ClosureRef,
        lexical_env: Value,
    },
    Binary(BinOp, Value, Value),
    Identical(Value, Value),
    AsTest(Value),
    AsLogical(Value),
    IsObject(Value),
    Unbox(Value),
    Return(Value),

    // --- state mutators ---
    StVar {
        name: Symbol,
        val: Value,
        env: Value,
    },
    StVarSuper {
        name: Symbol,
        val: Value,
        env: Value,
    },
    Call {
        callee: Value,
        args: Vec<Value>,
    },
    StaticCall {
        target: ClosureRef,
        args: Vec<Value>,
    },
    CallBuiltin {
        sym: Symbol,
        args: Vec<Value>,
    },
    CallSafeBuiltin {
        sym: Symbol,
        args: Vec<Value>,
    },
    NamedCall {
        callee: Value,
        args: Vec<Value>,
        names: Vec<Option<Symbol>>,
    },
    Assume(Value),

    // --- terminator ---
    /// `cond`; the two successor BBs live on the owning `BB`, not here.
    Branch(Value),
}

impl InstrKind {
    /// Whether this instruction can expose its environment argument to
    /// code the analyzer cannot see (spec §3, §4.E).
    pub fn leaks_env(&self) -> bool {
        matches!(
            self,
            InstrKind::MkFunCls { .. }
                | InstrKind::Call { .. }
                | InstrKind::NamedCall { .. }
                | InstrKind::CallBuiltin { .. }
        )
    }

    /// Whether this instruction may mutate its environment argument in a
    /// way not otherwise modeled (spec §3, §4.E). `StVar`/`StVarSuper` are
    /// handled precisely by the scope analysis, so they don't count here.
    pub fn changes_env(&self) -> bool {
        matches!(
            self,
            InstrKind::Call { .. } | InstrKind::NamedCall { .. } | InstrKind::CallBuiltin { .. }
        )
    }

    /// The environment argument, if this instruction has exactly one
    /// (spec §3's `env()` predicate).
    pub fn env(&self) -> Option<Value> {
        match self {
            InstrKind::LdVar(_, e)
            | InstrKind::LdVarSuper(_, e)
            | InstrKind::LdFun(_, e)
            | InstrKind::StVar { env: e, .. }
            | InstrKind::StVarSuper { env: e, .. }
            | InstrKind::MkFunCls { lexical_env: e, .. } => Some(*e),
            _ => None,
        }
    }

    /// Iterate argument value slots (excludes the environment-typed `EnvValue`s).
    pub fn each_arg_value(&self, mut f: impl FnMut(Value)) {
        match self {
            InstrKind::LdConst(_) | InstrKind::LdArg(_) => {}
            InstrKind::LdVar(_, e) | InstrKind::LdVarSuper(_, e) | InstrKind::LdFun(_, e) => f(*e),
            InstrKind::MkEnv { parent, locals } => {
                if let Some(v) = parent.known() {
                    f(v);
                }
                for b in locals {
                    f(b.value);
                }
            }
            InstrKind::MkFunCls { lexical_env, .. } => f(*lexical_env),
            InstrKind::Binary(_, a, b) | InstrKind::Identical(a, b) => {
                f(*a);
                f(*b);
            }
            InstrKind::AsTest(v)
            | InstrKind::AsLogical(v)
            | InstrKind::IsObject(v)
            | InstrKind::Unbox(v)
            | InstrKind::Return(v)
            | InstrKind::Assume(v)
            | InstrKind::Branch(v) => f(*v),
            InstrKind::StVar { val, env, .. } | InstrKind::StVarSuper { val, env, .. } => {
                f(*val);
                f(*env);
            }
            InstrKind::Call { callee, args } => {
                f(*callee);
                args.iter().copied().for_each(f);
            }
            InstrKind::NamedCall { callee, args, .. } => {
                f(*callee);
                args.iter().copied().for_each(f);
            }
            InstrKind::StaticCall { args, .. }
            | InstrKind::CallBuiltin { args, .. }
            | InstrKind::CallSafeBuiltin { args, .. } => {
                args.iter().copied().for_each(f);
            }
        }
    }

    /// `Instruction::eachArg(fn)` (spec §3, §4.C): like [`each_arg_value`],
    /// but pairs each slot with the expected `PirType` it's required to
    /// conform to, rather than the bare `Value`. Distinct from
    /// `each_arg_value` so passes that only need to rewrite edges (use-list
    /// maintenance) aren't forced to reckon with per-slot types, while
    /// passes that check argument types (e.g. builtin specialization) get
    /// both pieces together.
    ///
    /// [`each_arg_value`]: InstrKind::each_arg_value
    pub fn each_arg(&self, mut f: impl FnMut(ArgSlot)) {
        let env_ty = PirType::from(RType::Env);
        let any = PirType::any();
        let val = PirType::val();
        let test = PirType::from(NativeType::Test);
        match self {
            InstrKind::LdConst(_) | InstrKind::LdArg(_) => {}
            InstrKind::LdVar(_, e) | InstrKind::LdVarSuper(_, e) | InstrKind::LdFun(_, e) => {
                f(ArgSlot::new(*e, env_ty));
            }
            InstrKind::MkEnv { parent, locals } => {
                if let Some(v) = parent.known() {
                    f(ArgSlot::new(v, env_ty));
                }
                for b in locals {
                    f(ArgSlot::new(b.value, any));
                }
            }
            InstrKind::MkFunCls { lexical_env, .. } => f(ArgSlot::new(*lexical_env, env_ty)),
            InstrKind::Binary(_, a, b) | InstrKind::Identical(a, b) => {
                f(ArgSlot::new(*a, val));
                f(ArgSlot::new(*b, val));
            }
            InstrKind::AsTest(v) | InstrKind::AsLogical(v) | InstrKind::IsObject(v) | InstrKind::Unbox(v) => {
                f(ArgSlot::new(*v, val));
            }
            InstrKind::Return(v) => f(ArgSlot::new(*v, any)),
            InstrKind::Assume(v) | InstrKind::Branch(v) => f(ArgSlot::new(*v, test)),
            InstrKind::StVar { val: value, env, .. } | InstrKind::StVarSuper { val: value, env, .. } => {
                f(ArgSlot::new(*value, any));
                f(ArgSlot::new(*env, env_ty));
            }
            InstrKind::Call { callee, args } => {
                f(ArgSlot::new(*callee, PirType::closure()));
                for a in args {
                    f(ArgSlot::new(*a, any));
                }
            }
            InstrKind::NamedCall { callee, args, .. } => {
                f(ArgSlot::new(*callee, PirType::closure()));
                for a in args {
                    f(ArgSlot::new(*a, any));
                }
            }
            InstrKind::StaticCall { args, .. }
            | InstrKind::CallBuiltin { args, .. }
            | InstrKind::CallSafeBuiltin { args, .. } => {
                for a in args {
                    f(ArgSlot::new(*a, any));
                }
            }
        }
    }

    /// Mutably rewrite every argument value slot in place.
    pub fn each_arg_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            InstrKind::LdConst(_) | InstrKind::LdArg(_) => {}
            InstrKind::LdVar(_, e) | InstrKind::LdVarSuper(_, e) | InstrKind::LdFun(_, e) => f(e),
            InstrKind::MkEnv { parent, locals } => {
                if let EnvValue::Known(v) = parent {
                    f(v);
                }
                for b in locals {
                    f(&mut b.value);
                }
            }
            InstrKind::MkFunCls { lexical_env, .. } => f(lexical_env),
            InstrKind::Binary(_, a, b) | InstrKind::Identical(a, b) => {
                f(a);
                f(b);
            }
            InstrKind::AsTest(v)
            | InstrKind::AsLogical(v)
            | InstrKind::IsObject(v)
            | InstrKind::Unbox(v)
            | InstrKind::Return(v)
            | InstrKind::Assume(v)
            | InstrKind::Branch(v) => f(v),
            InstrKind::StVar { val, env, .. } | InstrKind::StVarSuper { val, env, .. } => {
                f(val);
                f(env);
            }
            InstrKind::Call { callee, args } => {
                f(callee);
                args.iter_mut().for_each(f);
            }
            InstrKind::NamedCall { callee, args, .. } => {
                f(callee);
                args.iter_mut().for_each(f);
            }
            InstrKind::StaticCall { args, .. }
            | InstrKind::CallBuiltin { args, .. }
            | InstrKind::CallSafeBuiltin { args, .. } => {
                args.iter_mut().for_each(f);
            }
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, InstrKind::Return(_) | InstrKind::Branch(_))
    }
}

/// An instruction plus its inferred/declared [`PirType`] (spec §3: "every
/// instruction carries a PirType").
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub ty: PirType,
}

/// A basic block: an ordered instruction list plus up to two successors.
/// `Branch` terminators use both; other terminators use only `next0` (or
/// neither, for `Return`).
#[derive(Debug, Clone, Default)]
pub struct BB {
    pub instrs: Vec<InstrId>,
    pub next0: Option<BBId>,
    pub next1: Option<BBId>,
}

impl BB {
    pub fn successors(&self) -> impl Iterator<Item = BBId> + '_ {
        self.next0.into_iter().chain(self.next1)
    }
}

/// One SSA body: a `ClosureVersion`'s entry code, or a `Promise`'s body.
/// Owns every instruction and BB in the body; use-lists are auxiliary
/// indexes keyed by `InstrId`, as recommended by the source's own DESIGN
/// NOTES.
#[derive(Debug, Clone, Default)]
pub struct Code {
    instrs: Vec<Instruction>,
    bbs: Vec<BB>,
    entry: Option<BBId>,
    uses: HashMap<InstrId, Vec<(InstrId, usize)>>,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self) -> BBId {
        self.entry.expect("Code::entry read before any BB was appended")
    }

    pub fn bb(&self, id: BBId) -> &BB {
        &self.bbs[id.0 as usize]
    }

    pub fn bb_mut(&mut self, id: BBId) -> &mut BB {
        &mut self.bbs[id.0 as usize]
    }

    pub fn bb_count(&self) -> usize {
        self.bbs.len()
    }

    pub fn bb_ids(&self) -> impl Iterator<Item = BBId> {
        (0..self.bbs.len() as u32).map(BBId)
    }

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.0 as usize]
    }

    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    /// Create a new (initially unreferenced) BB, returning its id.
    pub fn add_bb(&mut self) -> BBId {
        let id = BBId(self.bbs.len() as u32);
        self.bbs.push(BB::default());
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    /// Register a new instruction in the arena without placing it in any
    /// BB yet; wires up its use-list entries against whatever it already
    /// references. Returns the id (== the `Value` it defines).
    fn alloc(&mut self, instr: Instruction) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        instr.kind.each_arg_value(|v| {
            self.uses.entry(v.0).or_default().push((id, 0));
        });
        self.instrs.push(instr);
        id
    }

    /// `BB::append(i)`: allocate `instr` and append it to `bb`.
    pub fn append(&mut self, bb: BBId, instr: Instruction) -> InstrId {
        let id = self.alloc(instr);
        self.bb_mut(bb).instrs.push(id);
        id
    }

    /// `BB::insert(it, i)`: allocate `instr` and insert before position `at`.
    pub fn insert(&mut self, bb: BBId, at: usize, instr: Instruction) -> InstrId {
        let id = self.alloc(instr);
        self.bb_mut(bb).instrs.insert(at, id);
        id
    }

    /// `BB::replace(it, i)`: replace the instruction at position `at` with
    /// a fresh one, rewiring every existing use of the old value onto the
    /// new one. Returns the new instruction's id.
    pub fn replace(&mut self, bb: BBId, at: usize, instr: Instruction) -> InstrId {
        let old = self.bb(bb).instrs[at];
        let new = self.alloc(instr);
        self.bb_mut(bb).instrs[at] = new;
        self.replace_uses_with(old, Value(new));
        new
    }

    /// `BB::remove(it)`: drop the instruction at position `at` from the BB.
    /// The instruction's arena slot is retained (arenas never shrink) but
    /// it no longer appears in any BB's instruction list.
    pub fn remove(&mut self, bb: BBId, at: usize) {
        self.bb_mut(bb).instrs.remove(at);
    }

    /// `Instruction::replaceUsesWith(v)`: rewrite every use of `old`'s
    /// value to `new`, atomically. Afterwards `old` has zero uses (spec
    /// §4.C).
    pub fn replace_uses_with(&mut self, old: InstrId, new: Value) {
        let uses = self.uses.remove(&old).unwrap_or_default();
        for (user, _slot) in &uses {
            let user_id = *user;
            let mut kind = self.instrs[user_id.0 as usize].kind.clone();
            kind.each_arg_value_mut(|v| {
                if v.0 == old {
                    *v = new;
                }
            });
            self.instrs[user_id.0 as usize].kind = kind;
            self.uses.entry(new.0).or_default().push((user_id, 0));
        }
    }

    /// The use-list of `id`: every `(user, slot)` pair referencing it.
    pub fn uses_of(&self, id: InstrId) -> &[(InstrId, usize)] {
        self.uses.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_uses(&self, id: InstrId) -> bool {
        !self.uses_of(id).is_empty()
    }

    /// Deterministic reachable-BB traversal in forward (successor-following)
    /// order starting at `entry`, without revisiting a BB (spec §4.D Visitor).
    pub fn reachable_bbs(&self) -> Vec<BBId> {
        let mut seen = vec![false; self.bbs.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.entry()];
        while let Some(bb) = stack.pop() {
            if seen[bb.0 as usize] {
                continue;
            }
            seen[bb.0 as usize] = true;
            order.push(bb);
            for succ in self.bb(bb).successors() {
                if !seen[succ.0 as usize] {
                    stack.push(succ);
                }
            }
        }
        order
    }

    /// Validate SSA/use-list invariants (spec §8 invariants 1–2). Used by
    /// passes in debug builds and by tests.
    pub fn check_invariants(&self) -> Result<()> {
        for (defined, uses) in &self.uses {
            for (user, _slot) in uses {
                let kind = &self.instrs[user.0 as usize].kind;
                let mut found = false;
                kind.each_arg_value(|v| {
                    if v.0 == *defined {
                        found = true;
                    }
                });
                if !found {
                    return Err(Error::invariant(format!(
                        "use-list entry ({user}, _) of {} is not among its actual argument values",
                        Value(*defined)
                    )));
                }
            }
        }
        Ok(())
    }
}

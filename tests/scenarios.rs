//! End-to-end scenarios S1-S6 (spec.md §8), run against the public
//! `compile`/`optimize`/`check` entry points and the pass pipeline.

use pirc::analysis::scope::ScopeAnalysis;
use pirc::debug::DebugOptions;
use pirc::driver::{self, Check, CompileOptions};
use pirc::pir::closure::{ClosureVersion, OptimizationContext};
use pirc::pir::instr::{BinOp, Instruction, InstrKind};
use pirc::pir::ty::{PirType, RType};
use pirc::pir::value::{Constant, EnvValue, Logical, Value};
use pirc::pir::{Assumptions, Closure, ClosureProperties};
use pirc::rir;
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap as HashMap;

fn ctx() -> OptimizationContext {
    OptimizationContext { assumptions: Assumptions::empty(), properties: ClosureProperties::new() }
}

/// A test-only front end that actually emits the `Add(LdConst, LdConst)`
/// shape S1 describes; `rir::IdentityBackend` only ever loads constants in
/// pool order and returns the last one, so it can't exercise this scenario
/// on its own (it never synthesizes a `Binary` instruction).
struct AddBackend;

impl rir::Rir2Pir for AddBackend {
    fn translate(&self, rir: &rir::Function, context: OptimizationContext) -> ClosureVersion {
        let mut version = ClosureVersion::new(rir.name.clone(), rir.nargs, context);
        let entry = version.entry.add_bb();
        let lhs = version.entry.append(entry, Instruction { kind: InstrKind::LdConst(rir.constant_pool[0].clone()), ty: PirType::from(RType::Integer) });
        let rhs = version.entry.append(entry, Instruction { kind: InstrKind::LdConst(rir.constant_pool[1].clone()), ty: PirType::from(RType::Integer) });
        let add = version.entry.append(entry, Instruction { kind: InstrKind::Binary(BinOp::Add, Value(lhs), Value(rhs)), ty: PirType::from(RType::Integer) });
        version.entry.append(entry, Instruction { kind: InstrKind::Return(Value(add)), ty: PirType::from(RType::Integer) });
        version
    }
}

impl rir::Pir2Rir for AddBackend {
    fn lower(&self, version: &ClosureVersion) -> rir::Function {
        rir::Function::new(version.name.clone(), version.nargs)
    }
}

/// S1: `Add(LdConst 2, LdConst 3)` then `Return` folds to `LdConst 5`; no
/// `Add` remains; the dispatch table ends up with baseline + optimized
/// version.
#[test]
fn s1_fold_add_of_constants_through_compile() {
    let rir = rir::Function::new("f", 0)
        .with_constant(Constant::Integer(Some(2)))
        .with_constant(Constant::Integer(Some(3)));
    let mut closure = Closure::new("f");
    // Seed a "baseline" version directly, as if an earlier compile already ran.
    let mut baseline = ClosureVersion::new("f", 0, ctx());
    let baseline_entry = baseline.entry.add_bb();
    let nil = baseline.entry.append(baseline_entry, Instruction { kind: InstrKind::LdConst(Constant::Null), ty: PirType::from(RType::Nil) });
    baseline.entry.append(baseline_entry, Instruction { kind: InstrKind::Return(Value(nil)), ty: PirType::from(RType::Nil) });
    closure.table.insert(baseline);

    let program = HashMap::default();
    let optimized = driver::compile(&rir, &mut closure, &AddBackend, &program, &CompileOptions::default()).unwrap();

    assert_eq!(closure.table.versions().len(), 2);
    let entry = optimized.entry.entry();
    let kinds: Vec<_> = optimized.entry.bb(entry).instrs.iter().map(|&id| optimized.entry.instr(id).kind.clone()).collect();
    assert!(!kinds.iter().any(|k| matches!(k, InstrKind::Binary(..))), "no Add should remain");
    assert!(kinds.iter().any(|k| matches!(k, InstrKind::LdConst(Constant::Integer(Some(5))))));
    assert!(driver::check(&closure, &[Check::ReturnsConstant(Constant::Integer(Some(5)))]));
}

/// S2: a `Branch(AsTest(TRUE))` with two constant-returning arms loses its
/// `false` arm entirely; the surviving value is `1`.
#[test]
fn s2_branch_kill_on_true_constant() {
    let mut version = ClosureVersion::new("f", 0, ctx());
    let entry = version.entry.add_bb();
    let t_bb = version.entry.add_bb();
    let f_bb = version.entry.add_bb();

    let cond = version.entry.append(entry, Instruction {
        kind: InstrKind::LdConst(Constant::Logical(Logical::True)),
        ty: PirType::from(RType::Logical).scalar(),
    });
    let test = version.entry.append(entry, Instruction { kind: InstrKind::AsTest(Value(cond)), ty: PirType::from(RType::Logical).scalar() });
    version.entry.append(entry, Instruction { kind: InstrKind::Branch(Value(test)), ty: PirType::voyd() });
    version.entry.bb_mut(entry).next0 = Some(t_bb);
    version.entry.bb_mut(entry).next1 = Some(f_bb);

    let one = version.entry.append(t_bb, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(1))), ty: PirType::from(RType::Integer) });
    version.entry.append(t_bb, Instruction { kind: InstrKind::Return(Value(one)), ty: PirType::from(RType::Integer) });

    let two = version.entry.append(f_bb, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(2))), ty: PirType::from(RType::Integer) });
    version.entry.append(f_bb, Instruction { kind: InstrKind::Return(Value(two)), ty: PirType::from(RType::Integer) });

    let program = HashMap::default();
    pirc::opt::run_pipeline(&mut version, &program, &DebugOptions::default());

    assert_eq!(version.entry.bb_count(), 3, "dead BB stays allocated in the arena, just unreachable");
    let reachable = version.entry.reachable_bbs();
    assert_eq!(reachable.len(), 2, "entry and the surviving t_bb arm; f_bb is no longer reachable");
    assert!(!reachable.contains(&f_bb), "f_bb must no longer be reachable");

    let returning_bb = reachable
        .iter()
        .find(|&&bb| matches!(version.entry.bb(bb).instrs.last().map(|&id| version.entry.instr(id).kind.clone()), Some(InstrKind::Return(_))))
        .expect("a surviving BB must end in Return");
    let last = *version.entry.bb(*returning_bb).instrs.last().unwrap();
    match version.entry.instr(last).kind {
        InstrKind::Return(v) => {
            assert!(matches!(version.entry.instr(v.0).kind, InstrKind::LdConst(Constant::Integer(Some(1)))));
        }
        _ => panic!("expected a Return terminator"),
    }
}

/// S3: the same branch shape, but on `NA` - no branch removal happens,
/// both arms stay reachable.
#[test]
fn s3_na_guard_disables_branch_removal() {
    let mut version = ClosureVersion::new("f", 0, ctx());
    let entry = version.entry.add_bb();
    let t_bb = version.entry.add_bb();
    let f_bb = version.entry.add_bb();

    let cond = version.entry.append(entry, Instruction {
        kind: InstrKind::LdConst(Constant::Logical(Logical::Na)),
        ty: PirType::from(RType::Logical).scalar(),
    });
    let test = version.entry.append(entry, Instruction { kind: InstrKind::AsTest(Value(cond)), ty: PirType::from(RType::Logical).scalar() });
    version.entry.append(entry, Instruction { kind: InstrKind::Branch(Value(test)), ty: PirType::voyd() });
    version.entry.bb_mut(entry).next0 = Some(t_bb);
    version.entry.bb_mut(entry).next1 = Some(f_bb);

    let one = version.entry.append(t_bb, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(1))), ty: PirType::from(RType::Integer) });
    version.entry.append(t_bb, Instruction { kind: InstrKind::Return(Value(one)), ty: PirType::from(RType::Integer) });
    let two = version.entry.append(f_bb, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(2))), ty: PirType::from(RType::Integer) });
    version.entry.append(f_bb, Instruction { kind: InstrKind::Return(Value(two)), ty: PirType::from(RType::Integer) });

    let program = HashMap::default();
    pirc::opt::run_pipeline(&mut version, &program, &DebugOptions::default());

    assert_eq!(version.entry.reachable_bbs().len(), 3, "an NA condition must not kill either arm");
}

/// S4: `Add(x, y)` with both operands `scalar real boxed` gets two `Unbox`
/// casts inserted ahead of it, and the Add's result type becomes
/// `scalar real unboxed`.
#[test]
fn s4_type_inference_unboxes_scalar_real_args() {
    let mut version = ClosureVersion::new("f", 2, ctx());
    let entry = version.entry.add_bb();
    let boxed_real = PirType::from(RType::Real).scalar().boxed();
    let x = version.entry.append(entry, Instruction { kind: InstrKind::LdArg(0), ty: boxed_real });
    let y = version.entry.append(entry, Instruction { kind: InstrKind::LdArg(1), ty: boxed_real });
    let add = version.entry.append(entry, Instruction { kind: InstrKind::Binary(BinOp::Add, Value(x), Value(y)), ty: boxed_real });
    version.entry.append(entry, Instruction { kind: InstrKind::Return(Value(add)), ty: boxed_real });

    let program = HashMap::default();
    pirc::opt::run_pipeline(&mut version, &program, &DebugOptions::default());

    let unbox_count = version
        .entry
        .reachable_bbs()
        .iter()
        .flat_map(|&bb| version.entry.bb(bb).instrs.iter())
        .filter(|&&id| matches!(version.entry.instr(id).kind, InstrKind::Unbox(_)))
        .count();
    assert_eq!(unbox_count, 2, "both Add operands should get an Unbox cast");

    let add_now = version
        .entry
        .reachable_bbs()
        .iter()
        .flat_map(|&bb| version.entry.bb(bb).instrs.iter())
        .find(|&&id| matches!(version.entry.instr(id).kind, InstrKind::Binary(BinOp::Add, _, _)))
        .copied()
        .expect("Add survives folding (operands aren't constants)");
    let add_ty = version.entry.instr(add_now).ty;
    assert!(add_ty.is_scalar());
    assert!(add_ty.is_unboxed());
    assert!(add_ty.is_a(&PirType::from(RType::Real)));
}

/// S5: a `StVarSuper` whose environment's parent chain ends in
/// `UnknownParent` taints every reachable entry, leaving `leaked` unchanged.
#[test]
fn s5_super_assign_through_unknown_parent_taints_env() {
    let mut version = ClosureVersion::new("f", 0, ctx());
    let entry = version.entry.add_bb();
    let env_instr = version.entry.append(entry, Instruction {
        kind: InstrKind::MkEnv { parent: EnvValue::UnknownParent, locals: vec![] },
        ty: PirType::from(RType::Env),
    });
    let env = Value(env_instr);
    let c = version.entry.append(entry, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(7))), ty: PirType::from(RType::Integer) });
    version.entry.append(entry, Instruction {
        kind: InstrKind::StVarSuper { name: pirc::symbols::Symbol::Add, val: Value(c), env },
        ty: PirType::voyd(),
    });
    version.entry.append(entry, Instruction { kind: InstrKind::Return(Value(c)), ty: PirType::from(RType::Integer) });

    let program = HashMap::default();
    let analysis = ScopeAnalysis::new(&program, "f");
    let (result, _output) = analysis.run(&version.entry);
    let out = result.bb_out(entry).unwrap();
    let e = out.hierarchy.get(env).unwrap();
    assert!(e.tainted);
    assert!(!e.leaked);
}

/// S6: a closure that calls itself recursively is only inlined 5 levels
/// deep by the scope analysis; the analysis still terminates.
#[test]
fn s6_interprocedural_depth_cap_terminates() {
    let mut version = ClosureVersion::new("f", 0, ctx());
    let entry = version.entry.add_bb();
    let call = version.entry.append(entry, Instruction {
        kind: InstrKind::StaticCall { target: pirc::pir::ClosureRef("f".to_string()), args: vec![] },
        ty: PirType::any(),
    });
    version.entry.append(entry, Instruction { kind: InstrKind::Return(Value(call)), ty: PirType::any() });

    let mut program: HashMap<String, ClosureVersion> = HashMap::default();
    program.insert("f".to_string(), version.clone());

    let analysis = ScopeAnalysis::new(&program, "f");
    // Must terminate despite `f` calling itself (bounded by MAX_DEPTH).
    let (_result, output) = analysis.run(&version.entry);
    assert!(output.fun_types.contains_key("f"));
}

/// `check` combinators compose: a freshly compiled closure from two
/// constants is SSA-valid, has no remaining Branch, and exactly one version.
#[test]
fn check_combinators_hold_after_compile() {
    let rir = rir::Function::new("g", 0).with_constant(Constant::Integer(Some(9)));
    let mut closure = Closure::new("g");
    let program = HashMap::default();
    driver::compile(&rir, &mut closure, &rir::IdentityBackend, &program, &CompileOptions::default()).unwrap();

    assert!(driver::check(&closure, &[Check::VersionCount(1), Check::Ssa, Check::NoBranch]));
}

/// `optimize` names the installed version independently of the RIR
/// function's own name.
#[test]
fn optimize_names_version_independently() {
    let rir = rir::Function::new("unnamed", 0).with_constant(Constant::Integer(Some(1)));
    let mut closure = Closure::new("g2");
    driver::optimize(&rir, &mut closure, Assumptions::empty(), "g2@v1", DebugOptions::default(), ClosureProperties::new()).unwrap();

    assert_eq!(closure.table.versions()[0].name, "g2@v1");
}

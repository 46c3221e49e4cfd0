//! The RIR bytecode representation, as the compiler core consumes it
//! (spec §1, §6 "On-disk/in-memory formats").
//!
//! The RIR interpreter's opcode dispatch and the source-to-RIR front end
//! are explicitly out of scope (spec §1). This module gives the core just
//! enough of a `Function` to run `compile`/`optimize` end to end in tests
//! and the CLI: a plain data holder for "bytecode + constant pool + source
//! pool" (spec §1), consumed as an opaque blob with a known header. Real
//! front ends hand the driver a `Function` of their own construction;
//! nothing here prescribes their bytecode format beyond this shape.

use crate::pir::value::Constant;

/// A parsed RIR function: bytecode plus its constant and source pools
/// (spec §1 "a parsed RIR function (bytecode + constant pool + source
/// pool)"). The `code` field is an opaque instruction stream — this core
/// never interprets it, only counts it for `code_size`.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub nargs: usize,
    /// Whether the host's value this was parsed from is actually a closure
    /// (spec §4.I step 1 "Reject non-closure inputs"). Front ends that hand
    /// the driver a promise or primitive set this to `false`.
    pub is_closure: bool,
    /// Opaque instruction stream; only its length is observed here.
    pub code: Vec<u8>,
    pub constant_pool: Vec<Constant>,
    pub source_pool: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>, nargs: usize) -> Self {
        Self {
            name: name.into(),
            nargs,
            is_closure: true,
            code: Vec::new(),
            constant_pool: Vec::new(),
            source_pool: Vec::new(),
        }
    }

    pub fn with_constant(mut self, c: Constant) -> Self {
        self.constant_pool.push(c);
        self.code.push(0); // one opaque "push constant" byte per pool entry
        self
    }

    pub fn code_size(&self) -> usize {
        self.code.len()
    }
}

/// Translates a parsed RIR `Function` into a fresh PIR `ClosureVersion`
/// (spec §4.I step 2, out of scope beyond its post-condition: "a
/// well-formed SSA graph satisfying §3 invariants, whose promises are
/// themselves PIR `Code`s"). The default implementation is a single-block
/// identity translation — load the function's constants in pool order and
/// return the last one (or `NULL` for an empty pool) — not a real
/// bytecode-to-SSA compiler (SPEC_FULL.md §4).
pub trait Rir2Pir {
    fn translate(
        &self,
        rir: &Function,
        context: crate::pir::closure::OptimizationContext,
    ) -> crate::pir::closure::ClosureVersion;
}

/// Lowers an optimized `ClosureVersion` back to a RIR `Function` (spec
/// §4.I step 4, out of scope beyond its post-condition). The default
/// implementation only records the version's shape (name, arity,
/// instruction count) — not a real SSA-to-bytecode code generator
/// (SPEC_FULL.md §4).
pub trait Pir2Rir {
    fn lower(&self, version: &crate::pir::closure::ClosureVersion) -> Function;
}

/// The identity translators used when the embedding layer doesn't supply
/// its own (tests, the CLI, `DryRun`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBackend;

impl Rir2Pir for IdentityBackend {
    fn translate(
        &self,
        rir: &Function,
        context: crate::pir::closure::OptimizationContext,
    ) -> crate::pir::closure::ClosureVersion {
        use crate::pir::instr::{Instruction, InstrKind};
        use crate::pir::ty::PirType;
        use crate::pir::value::Value;

        let mut version = crate::pir::closure::ClosureVersion::new(rir.name.clone(), rir.nargs, context);
        let entry = version.entry.add_bb();

        let mut last = None;
        for c in &rir.constant_pool {
            let ty = const_type(c);
            let id = version.entry.append(entry, Instruction { kind: InstrKind::LdConst(c.clone()), ty });
            last = Some(Value(id));
        }
        let ret_value = match last {
            Some(v) => v,
            None => {
                let id = version.entry.append(
                    entry,
                    Instruction { kind: InstrKind::LdConst(Constant::Null), ty: PirType::from(crate::pir::ty::RType::Nil) },
                );
                Value(id)
            }
        };
        let ret_ty = version.entry.instr(ret_value.0).ty;
        version.entry.append(entry, Instruction { kind: InstrKind::Return(ret_value), ty: ret_ty });
        version
    }
}

impl Pir2Rir for IdentityBackend {
    fn lower(&self, version: &crate::pir::closure::ClosureVersion) -> Function {
        Function {
            name: version.name.clone(),
            nargs: version.nargs,
            is_closure: true,
            code: vec![0; version.entry.instr_count()],
            constant_pool: Vec::new(),
            source_pool: Vec::new(),
        }
    }
}

fn const_type(c: &Constant) -> crate::pir::ty::PirType {
    use crate::pir::ty::RType;
    match c {
        Constant::Null => crate::pir::ty::PirType::from(RType::Nil),
        Constant::Logical(_) => crate::pir::ty::PirType::from(RType::Logical).scalar(),
        Constant::Integer(_) => crate::pir::ty::PirType::from(RType::Integer).scalar(),
        Constant::Real(_) => crate::pir::ty::PirType::from(RType::Real).scalar(),
        Constant::Str(_) => crate::pir::ty::PirType::from(RType::Str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::assumptions::{Assumptions, ClosureProperties};
    use crate::pir::closure::OptimizationContext;
    use crate::pir::instr::InstrKind;

    #[test]
    fn identity_translate_loads_constants_and_returns_last() {
        let rir = Function::new("f", 0)
            .with_constant(Constant::Integer(Some(2)))
            .with_constant(Constant::Integer(Some(3)));
        let ctx = OptimizationContext { assumptions: Assumptions::empty(), properties: ClosureProperties::new() };
        let version = IdentityBackend.translate(&rir, ctx);

        let entry = version.entry.entry();
        let last = *version.entry.bb(entry).instrs.last().unwrap();
        assert!(matches!(version.entry.instr(last).kind, InstrKind::Return(_)));
    }

    #[test]
    fn identity_lower_reports_instruction_count() {
        let rir = Function::new("f", 0).with_constant(Constant::Integer(Some(1)));
        let ctx = OptimizationContext { assumptions: Assumptions::empty(), properties: ClosureProperties::new() };
        let version = IdentityBackend.translate(&rir, ctx);
        let lowered = IdentityBackend.lower(&version);
        assert_eq!(lowered.code_size(), version.entry.instr_count());
    }
}

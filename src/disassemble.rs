//! Pretty-printing the PIR graph (spec §6 `disassemble`, `DEBUG_STYLE`).
//!
//! Grounded in the source's `PrintVisitor`/`StreamWriter` split: one
//! traversal, three renderers selected by [`DebugStyle`](crate::debug::DebugStyle).

use crate::debug::DebugStyle;
use crate::pir::closure::{Closure, ClosureVersion, DispatchTable};
use crate::pir::instr::{Code, InstrKind};
use crate::pir::value::{BBId, InstrId, Value};
use std::fmt::Write as _;

fn instr_text(id: InstrId, code: &Code) -> String {
    let kind = &code.instr(id).kind;
    let ty = code.instr(id).ty;
    let args = |vs: &[Value]| vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
    let body = match kind {
        InstrKind::LdConst(c) => format!("LdConst {c}"),
        InstrKind::LdVar(s, e) => format!("LdVar {s} {e}"),
        InstrKind::LdVarSuper(s, e) => format!("LdVarSuper {s} {e}"),
        InstrKind::LdFun(s, e) => format!("LdFun {s} {e}"),
        InstrKind::LdArg(i) => format!("LdArg {i}"),
        InstrKind::MkEnv { parent, locals } => {
            format!("MkEnv parent={parent} locals=[{}]", locals.iter().map(|b| format!("{}={}", b.name, b.value)).collect::<Vec<_>>().join(", "))
        }
        InstrKind::MkFunCls { source, lexical_env } => format!("MkFunCls {} {lexical_env}", source.0),
        InstrKind::Binary(op, a, b) => format!("{op:?} {a}, {b}"),
        InstrKind::Identical(a, b) => format!("Identical {a}, {b}"),
        InstrKind::AsTest(v) => format!("AsTest {v}"),
        InstrKind::AsLogical(v) => format!("AsLogical {v}"),
        InstrKind::IsObject(v) => format!("IsObject {v}"),
        InstrKind::Unbox(v) => format!("Unbox {v}"),
        InstrKind::Return(v) => format!("Return {v}"),
        InstrKind::StVar { name, val, env } => format!("StVar {name} {val} {env}"),
        InstrKind::StVarSuper { name, val, env } => format!("StVarSuper {name} {val} {env}"),
        InstrKind::Call { callee, args: a } => format!("Call {callee}({})", args(a)),
        InstrKind::StaticCall { target, args: a } => format!("StaticCall {}({})", target.0, args(a)),
        InstrKind::CallBuiltin { sym, args: a } => format!("CallBuiltin {sym}({})", args(a)),
        InstrKind::CallSafeBuiltin { sym, args: a } => format!("CallSafeBuiltin {sym}({})", args(a)),
        InstrKind::NamedCall { callee, args: a, .. } => format!("NamedCall {callee}({})", args(a)),
        InstrKind::Assume(v) => format!("Assume {v}"),
        InstrKind::Branch(v) => format!("Branch {v}"),
    };
    format!("{id} = {body} : {ty}")
}

fn render_standard(code: &Code, out: &mut String) {
    for bb in code.bb_ids() {
        let _ = writeln!(out, "{bb}:");
        for &id in &code.bb(bb).instrs {
            let _ = writeln!(out, "  {}", instr_text(id, code));
        }
        let b = code.bb(bb);
        match (b.next0, b.next1) {
            (Some(a), Some(c)) => {
                let _ = writeln!(out, "  -> {a} (true), {c} (false)");
            }
            (Some(a), None) => {
                let _ = writeln!(out, "  -> {a}");
            }
            (None, None) => {}
            (None, Some(_)) => unreachable!("next1 set without next0"),
        }
    }
}

fn bb_node_id(bb: BBId) -> String {
    format!("bb{}", bb.0)
}

fn render_graphviz(code: &Code, out: &mut String, per_bb: bool) {
    out.push_str("digraph PIR {\n");
    for bb in code.bb_ids() {
        if per_bb {
            let mut label = String::new();
            for &id in &code.bb(bb).instrs {
                let _ = writeln!(label, "{}\\l", instr_text(id, code));
            }
            let _ = writeln!(out, "  {} [shape=box label=\"{}: {}\"];", bb_node_id(bb), bb, label);
        } else {
            let _ = writeln!(out, "  {} [label=\"{}\"];", bb_node_id(bb), bb);
        }
        let b = code.bb(bb);
        for succ in b.successors() {
            let _ = writeln!(out, "  {} -> {};", bb_node_id(bb), bb_node_id(succ));
        }
    }
    out.push_str("}\n");
}

/// Render one `Code` body per spec's `DEBUG_STYLE`.
pub fn render_code(code: &Code, style: DebugStyle) -> String {
    let mut out = String::new();
    match style {
        DebugStyle::Standard => render_standard(code, &mut out),
        DebugStyle::GraphViz => render_graphviz(code, &mut out, false),
        DebugStyle::GraphVizBB => render_graphviz(code, &mut out, true),
    }
    out
}

/// Render one `ClosureVersion`: entry body plus every promise.
pub fn render_version(version: &ClosureVersion, style: DebugStyle, verbose: bool) -> String {
    let mut out = format!(
        "version {} (nargs={}, assumptions={:?})\n",
        version.name, version.nargs, version.context.assumptions
    );
    out.push_str(&render_code(&version.entry, style));
    if verbose {
        for (i, p) in version.promises.iter().enumerate() {
            let _ = writeln!(out, "-- promise {i} --");
            out.push_str(&render_code(&p.code, style));
        }
    }
    out
}

/// `disassemble(closure, verbose)` (spec §6): pretty-print the dispatch
/// table and each version.
pub fn render_table(table: &DispatchTable, style: DebugStyle, verbose: bool) -> String {
    let mut out = String::new();
    for (i, v) in table.versions().iter().enumerate() {
        let _ = writeln!(out, "== version {i} ==");
        out.push_str(&render_version(v, style, verbose));
    }
    out
}

pub fn render_closure(closure: &Closure, style: DebugStyle, verbose: bool) -> String {
    format!("closure {}\n{}", closure.name, render_table(&closure.table, style, verbose))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pir::instr::Instruction;
    use crate::pir::ty::{PirType, RType};
    use crate::pir::value::Constant;

    #[test]
    fn standard_render_includes_return() {
        let mut code = Code::new();
        let entry = code.add_bb();
        let c = code.append(entry, Instruction { kind: InstrKind::LdConst(Constant::Integer(Some(1))), ty: PirType::from(RType::Integer) });
        code.append(entry, Instruction { kind: InstrKind::Return(Value(c)), ty: PirType::from(RType::Integer) });
        let text = render_code(&code, DebugStyle::Standard);
        assert!(text.contains("Return"));
        assert!(text.contains("LdConst 1L"));
    }

    #[test]
    fn graphviz_render_wraps_digraph() {
        let mut code = Code::new();
        code.add_bb();
        let text = render_code(&code, DebugStyle::GraphViz);
        assert!(text.starts_with("digraph PIR {"));
    }
}

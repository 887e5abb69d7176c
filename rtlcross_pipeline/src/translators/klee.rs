//! KLEE symbolic execution over a compiled C++ model.
//!
//! KLEE runs the model's bitcode with the combinational inputs made
//! symbolic and two state snapshots taken around one clock edge. Every
//! explored path yields an SMT-LIBv2 query; each query becomes a path
//! function over two abstract states, with the snapshot arrays bridged to
//! per-item accessor functions through the KLEE byte layout. The resulting
//! circuit is partial: unexplored paths are simply missing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use rtlcross_circuit::{
    Circuit, CircuitKind, CppCircuit, CppFlavor, SmtCircuit, SmtFlavor, TransitionKind,
};
use rtlcross_common::{Workspace, tool};
use rtlcross_ir::crossbar::{
    AtomVariable, CxxImplItem, KleeSmtCrossbar, VerilatorCppCrossbar, VerilatorNaming,
    YosysCxxCrossbar, klee,
};
use rtlcross_ir::{Layout, ModelTreeView, ViewKind};
use rtlcross_smt::{FunctionTable, SymbolRenamer, Term};

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translator::{Policy, Translator};
use crate::translators::{expect_cpp, fresh_tag};

/// Names of the two state-snapshot arrays the instrumented run records.
const SNAPSHOT_PRE: &str = "snapshot0";
const SNAPSHOT_POST: &str = "snapshot1";

fn array_decl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\(declare-fun (?P<name>\w+) \(\) \(Array \(_ BitVec 32\) \(_ BitVec 8\)\s*\)\s*\)")
            .expect("static regex")
    })
}

fn posedge_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"bool posedge_p_(?P<clk_name>[\w$]+)\(\) const \{").expect("static regex")
    })
}

fn debug_eval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"void debug_eval\(\);").expect("static regex"))
}

/// Bytes backing one element of the given bit width in the generated state
/// struct.
fn bytes_for_width(width: u32) -> usize {
    match width {
        0..=8 => 1,
        9..=16 => 2,
        17..=32 => 4,
        33..=64 => 8,
        _ => 4 * (width as usize).div_ceil(32),
    }
}

/// KLEE: compiled C++ model in, partial SMT transition relation out.
#[derive(Debug)]
pub struct KleeSymbolicExecution;

impl Translator for KleeSymbolicExecution {
    fn name(&self) -> &'static str {
        "KleeSymbolicExecution"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![
            (CircuitKind::VerilatorCpp, CircuitKind::KleeSmt),
            (CircuitKind::CxxrtlCpp, CircuitKind::KleeSmt),
        ]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            CmdlineOption::values(
                "--search={}",
                ["dfs", "bfs", "random-state", "random-path"],
            ),
            // Run the bitcode through KLEE's optimizer first
            CmdlineOption::flag("--optimize"),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let cpp = expect_cpp(self.name(), circuit)?;
        let (bitcode, model) = match cpp.flavor {
            CppFlavor::Verilator => prepare_verilator(cpp),
            CppFlavor::Cxxrtl => prepare_cxxrtl(cpp)?,
        };

        let output_dir = ws.temp_dir_path("klee-out", true);
        tool::symbolic_execution(
            Path::new(&bitcode),
            &output_dir,
            &cpp.obj_dir,
            &policy.extra_args,
        )?;

        let tag = fresh_tag("k");
        let escaped_top = VerilatorNaming::escape(model.top_module());
        let symbol_prefix = format!("{tag}_{escaped_top}");
        let state_sort = format!("{tag}_state");

        // The byte layout of every instantiated item.
        let atom_paths: Vec<_> = model
            .view(ViewKind::AllItems)
            .into_iter()
            .filter(|(_, item)| item.layout().is_some())
            .map(|(path, _)| path)
            .collect();
        let atoms = KleeSmtCrossbar::from_model(atom_paths).to_data_split(&model)?;

        let mut preamble = String::new();
        let _ = writeln!(preamble, "(declare-sort {state_sort} 0)");
        for atom in &atoms {
            let _ = writeln!(
                preamble,
                "(declare-fun {} ({state_sort}) (_ BitVec {}))",
                klee::accessor_name(&symbol_prefix, &atom.name),
                atom.bytes * 8,
            );
        }

        let mut path_functions = Vec::new();
        for (index, query) in read_path_queries(&output_dir)?.iter().enumerate() {
            match path_function(query, &tag, index, &state_sort, &symbol_prefix, &atoms) {
                Some(function) => {
                    preamble.push_str(&function.text);
                    path_functions.push(function.name);
                }
                None => warn!(path = index, "klee path without snapshots skipped"),
            }
        }
        if path_functions.is_empty() {
            return Err(PipelineError::MissingArtifact(
                "klee produced no usable path conditions".to_owned(),
            ));
        }
        debug!(paths = path_functions.len(), "klee circuit assembled");

        let functions = FunctionTable::parse(&preamble);
        let top = model.top_module().to_owned();

        Ok(Circuit::Smt(SmtCircuit {
            flavor: SmtFlavor::Klee,
            model,
            preamble,
            state_sort: Term::symbol(state_sort),
            top,
            renamer: SymbolRenamer::new(&tag, &[]),
            functions,
            transition_kind: TransitionKind::Paths(path_functions),
            symbol_prefix,
            is_partial: true,
        }))
    }
}

/// The Verilator flow already compiled a `-sym-exec-main` harness and
/// attached the byte layout; only the bitcode name is needed.
fn prepare_verilator(cpp: &CppCircuit) -> (String, ModelTreeView) {
    let escaped_top = VerilatorNaming::escape(cpp.model.top_module());
    (format!("V{escaped_top}.bc"), cpp.model.clone())
}

/// The CXXRTL flow generates its own harness: a packed state struct over the
/// implementation items, symbolic inputs, and two snapshots around a posedge.
fn prepare_cxxrtl(cpp: &CppCircuit) -> Result<(String, ModelTreeView), PipelineError> {
    let mut model = cpp.model.clone();
    let mangled_top = YosysCxxCrossbar::mangle_name(model.top_module());

    // Assign packed offsets in implementation-item order and attach them to
    // the model.
    let mut offset = 0usize;
    for item in &cpp.impl_items {
        let element_bytes = bytes_for_width(item.bit_width);
        let total = element_bytes * item.array_size.max(1);
        let crossbar = VerilatorCppCrossbar::from_data(&item.cxx_name, &model);
        for path in crossbar.to_model().to_vec() {
            model.instantiate_item(&path, Some(Layout { offset, bytes: total }))?;
        }
        offset += total;
    }

    let cxx_source =
        std::fs::read_to_string(cpp.obj_dir.join(format!("{mangled_top}.cpp")))?;
    let harness = render_harness(&mangled_top, &cxx_source, &cpp.impl_items);
    std::fs::write(cpp.obj_dir.join("main.cpp"), harness)?;

    tool::cxxrtl_compile(&mangled_top, &cpp.obj_dir)?;
    Ok((format!("{mangled_top}.bc"), model))
}

fn c_field(item: &CxxImplItem) -> String {
    let element_bytes = bytes_for_width(item.bit_width);
    let scalar = match element_bytes {
        1 => "uint8_t",
        2 => "uint16_t",
        4 => "uint32_t",
        8 => "uint64_t",
        _ => "uint32_t",
    };
    let words = if element_bytes > 8 { element_bytes / 4 } else { 1 };
    let elements = item.array_size.max(1) * words;
    if elements > 1 {
        format!("{scalar} {}[{elements}];", item.cxx_name)
    } else {
        format!("{scalar} {};", item.cxx_name)
    }
}

/// Renders the KLEE harness (`main.cpp`) for a CXXRTL model.
fn render_harness(mangled_top: &str, cxx_source: &str, impl_items: &[CxxImplItem]) -> String {
    let struct_definition: String = impl_items
        .iter()
        .map(|item| format!("    {}\n", c_field(item)))
        .collect();

    let snapshot_body: String = impl_items
        .iter()
        .map(|item| {
            format!(
                "    std::memcpy(&s.{}, items.table.at(\"{}\")[0].curr, sizeof s.{});\n",
                item.cxx_name, item.origin_name, item.cxx_name,
            )
        })
        .collect();

    let initialization: String = impl_items
        .iter()
        .filter(|item| item.is_symbolic)
        .map(|item| {
            format!(
                "    klee_make_symbolic(&s.{name}, sizeof s.{name}, \"{name}\");\n    \
                 std::memcpy(items.table.at(\"{origin}\")[0].curr, &s.{name}, sizeof s.{name});\n",
                name = item.cxx_name,
                origin = item.origin_name,
            )
        })
        .collect();

    let set_posedge = posedge_pattern()
        .captures(cxx_source)
        .map(|c| {
            let clk = c["clk_name"].replace("_24_", "$").replace("__", "_");
            format!(
                "    {{ uint8_t one = 1; std::memcpy(items.table.at(\"{clk}\")[0].next, &one, 1); }}\n"
            )
        })
        .unwrap_or_default();

    let debug_eval = if debug_eval_pattern().is_match(cxx_source) {
        "    top.debug_eval();\n"
    } else {
        ""
    };

    format!(
        r#"#include "{mangled_top}.cpp"
#include <klee/klee.h>
#include <cstring>

typedef struct state
{{
{struct_definition}}} state;

state s;

void snapshot(cxxrtl::debug_items &items)
{{
{snapshot_body}}}

int main()
{{
    cxxrtl_design::p_{mangled_top} top;
    cxxrtl::debug_items items;
    top.debug_info(&items, nullptr, "");

    // Set up the symbolic variables
{initialization}
    top.commit();

    // Save the state before posedge
{debug_eval}    snapshot(items);
    klee_save_snapshot(&s);

{set_posedge}    top.step();

    // Save the state after posedge
{debug_eval}    snapshot(items);
    klee_save_snapshot(&s);

    return 0;
}}
"#
    )
}

/// Reads the per-path SMT-LIBv2 queries KLEE wrote, in path order.
fn read_path_queries(output_dir: &Path) -> Result<Vec<String>, PipelineError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("smt2")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("test"))
        })
        .collect();
    files.sort();
    files
        .into_iter()
        .map(|p| Ok(std::fs::read_to_string(p)?))
        .collect()
}

struct PathFunction {
    name: String,
    text: String,
}

/// Extracts every top-level `(assert ...)` body from a query.
fn extract_asserts(query: &str) -> Vec<String> {
    let mut asserts = Vec::new();
    let mut rest = query;
    while let Some(pos) = rest.find("(assert") {
        let tail = &rest[pos..];
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in tail.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(end) => {
                let inner = tail["(assert".len()..end].trim().to_owned();
                asserts.push(inner);
                rest = &tail[end..];
            }
            None => break,
        }
    }
    asserts
}

/// Turns one KLEE query into a path function over two abstract states.
///
/// The query's arrays get a per-path prefix (input arrays stay free; the SAT
/// semantics of the engine's partial branch makes them existential), and the
/// two snapshot arrays are bridged byte-by-byte to the state accessors.
fn path_function(
    query: &str,
    tag: &str,
    index: usize,
    state_sort: &str,
    symbol_prefix: &str,
    atoms: &[AtomVariable],
) -> Option<PathFunction> {
    let array_names: Vec<String> = array_decl_pattern()
        .captures_iter(query)
        .map(|c| c["name"].to_owned())
        .collect();
    if !array_names.iter().any(|n| n == SNAPSHOT_PRE)
        || !array_names.iter().any(|n| n == SNAPSHOT_POST)
    {
        return None;
    }

    let array_prefix = format!("{tag}_p{index}_");
    let mut renamed = query.to_owned();
    for name in &array_names {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name))).expect("escaped name");
        renamed = pattern
            .replace_all(&renamed, format!("{array_prefix}{name}"))
            .into_owned();
    }

    let mut text = String::new();
    for name in &array_names {
        let _ = writeln!(
            text,
            "(declare-fun {array_prefix}{name} () (Array (_ BitVec 32) (_ BitVec 8)))"
        );
    }

    let mut conjuncts = extract_asserts(&renamed);
    for (state_var, snapshot) in [("s", SNAPSHOT_PRE), ("t", SNAPSHOT_POST)] {
        let array = format!("{array_prefix}{snapshot}");
        for atom in atoms {
            let selects: Vec<String> = (0..atom.bytes)
                .rev()
                .map(|byte| format!("(select {array} (_ bv{} 32))", atom.offset + byte))
                .collect();
            let bytes_value = if selects.len() == 1 {
                selects.into_iter().next().expect("one select")
            } else {
                format!("(concat {})", selects.join(" "))
            };
            conjuncts.push(format!(
                "(= ({} {state_var}) {bytes_value})",
                klee::accessor_name(symbol_prefix, &atom.name),
            ));
        }
    }

    let name = format!("{tag}_path{index}");
    let _ = writeln!(
        text,
        "(define-fun {name} ((s {state_sort}) (t {state_sort})) Bool (and {}))",
        conjuncts.join(" "),
    );
    Some(PathFunction { name, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_map_to_packed_bytes() {
        assert_eq!(bytes_for_width(1), 1);
        assert_eq!(bytes_for_width(16), 2);
        assert_eq!(bytes_for_width(33), 8);
        assert_eq!(bytes_for_width(96), 12);
    }

    #[test]
    fn asserts_are_extracted_balanced() {
        let query = "(set-logic QF_ABV)\n(assert (= a b))\n(assert (and (= c d) x))\n(check-sat)\n";
        assert_eq!(extract_asserts(query), vec!["(= a b)", "(and (= c d) x)"]);
    }

    #[test]
    fn path_functions_bridge_snapshots() {
        let query = "\
            (declare-fun snapshot0 () (Array (_ BitVec 32) (_ BitVec 8) ) )\n\
            (declare-fun snapshot1 () (Array (_ BitVec 32) (_ BitVec 8) ) )\n\
            (assert (= (select snapshot0 (_ bv0 32)) (_ bv1 8)))\n";
        let atoms = vec![AtomVariable {
            name: "clk".to_owned(),
            offset: 0,
            bytes: 1,
        }];
        let function = path_function(query, "k0", 0, "k0_state", "k0_top", &atoms).unwrap();

        assert_eq!(function.name, "k0_path0");
        assert!(function.text.contains("(declare-fun k0_p0_snapshot0 ()"));
        assert!(function.text.contains("(= (k0_top__clk s) (select k0_p0_snapshot0 (_ bv0 32)))"));
        assert!(function.text.contains("(= (k0_top__clk t) (select k0_p0_snapshot1 (_ bv0 32)))"));
    }

    #[test]
    fn paths_without_snapshots_are_skipped() {
        let query = "(declare-fun input () (Array (_ BitVec 32) (_ BitVec 8) ) )\n(assert true)\n";
        assert!(path_function(query, "k0", 0, "s", "p", &[]).is_none());
    }
}

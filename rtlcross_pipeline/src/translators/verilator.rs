//! Verilog to C++ through Verilator, with byte layout recovered from LLVM
//! debug info.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use rtlcross_circuit::{Circuit, CircuitKind, CppCircuit, CppFlavor};
use rtlcross_common::{Workspace, tool, verilog};
use rtlcross_ir::crossbar::{VerilatorCppCrossbar, VerilatorNaming};
use rtlcross_ir::{Layout, ModelTreeView};

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translator::{Policy, Translator};
use crate::translators::expect_verilog;

/// The metacomment keeping registers visible in the generated C++.
const PUBLIC_FLAT: &[u8] = b"/*verilator public_flat*/";

fn var_def_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"^\s*// - "(?P<name>\w+)"$"#).expect("static regex"))
}

fn ll_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"!\d+ = !DIFile\(filename: "\./V(?P<top_module>\w+)___024root\.h", directory: "[\w/]+"\)"#)
            .expect("static regex")
    })
}

fn ll_debug_info_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"!\d+ = !DIDerivedType\(tag: DW_TAG_member, name: "(?P<name>\w+)", scope: !\d+, file: !\d+, line: \d+, baseType: !\d+, size: (?P<size>\d+)(, align: (?P<align>\d+))?(, offset: (?P<offset>\d+))?(, flags: DIFlagPublic)?\)"#,
        )
        .expect("static regex")
    })
}

/// Inserts `/*verilator public_flat*/` after every syntactic `reg`
/// declaration so the registers survive into the generated model.
pub(crate) fn annotate_registers(source: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let points = verilog::reg_annotation_points(source)?;
    let mut annotated = Vec::with_capacity(source.len() + points.len() * PUBLIC_FLAT.len());
    let mut cursor = 0;
    for point in points {
        annotated.extend_from_slice(&source[cursor..point]);
        annotated.extend_from_slice(PUBLIC_FLAT);
        cursor = point;
    }
    annotated.extend_from_slice(&source[cursor..]);
    Ok(annotated)
}

/// Verilator: Verilog in, compiled C++ model out.
#[derive(Debug)]
pub struct VerilatorTransformer;

impl Translator for VerilatorTransformer {
    fn name(&self) -> &'static str {
        "VerilatorTransformer"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::Verilog, CircuitKind::VerilatorCpp)]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            // Enable all assertions
            CmdlineOption::flag("--assert"),
            // Flush the output stream after every $display
            CmdlineOption::flag("--autoflush"),
            // Enables workarounds for the specified C++ compiler
            CmdlineOption::values("--compiler {}", ["clang", "gcc", "msvc"]),
            // Iteration before raising converge error (default=100)
            CmdlineOption::int_range("--converge-limit {}", 10, 100, 10),
            // Enables basic block line coverage analysis
            CmdlineOption::flag("--coverage-line"),
            // Enable coverage of signals that start with an underscore
            CmdlineOption::flag("--coverage-underscore"),
            // Enables adding user-inserted functional coverage
            CmdlineOption::flag("--coverage-user"),
            // Enable internal debugging assertion checks
            CmdlineOption::flag("--debug-check"),
            // Free AstNode instances
            CmdlineOption::flag("--no-debug-leak"),
            // Set the internal debugging level globally (1-10)
            CmdlineOption::int_range("--debugi {}", 1, 11, 1),
            // Minimize comments, white space, symbol names, and other decorative items
            CmdlineOption::flag("--no-decoration"),
            // Print a list of all defines (with -E)
            CmdlineOption::flag("--dump-defines"),
            // Enable dumping DfgGraph .dot debug files with dumping level 3
            CmdlineOption::flag("--dump-dfg"),
            // Enable dumping V3Graph .dot debug files with dumping level 3
            CmdlineOption::flag("--dump-graph"),
            // Enable dumping Ast .tree debug files with dumping level 3
            CmdlineOption::flag("--dump-tree"),
            // Enable dumping Ast .tree.dot debug files in Graphviz Dot format
            CmdlineOption::flag("--dump-tree-dot"),
            // Replace AST node addresses with short identifiers in tree dumps
            CmdlineOption::flag("--dump-tree-addrids"),
            // Set the internal DfgGraph dumping level globally
            CmdlineOption::int_range("--dumpi-dfg {}", 1, 11, 1),
            // Set internal V3Graph dumping level globally
            CmdlineOption::int_range("--dumpi-graph {}", 1, 11, 1),
            // Set internal Ast dumping level globally
            CmdlineOption::int_range("--dumpi-tree {}", 1, 11, 1),
            // Exit after this number of errors (default=50)
            CmdlineOption::int_range("--error-limit {}", 10, 50, 10),
            // Flatten the design's hierarchy
            CmdlineOption::flag("--flatten"),
            CmdlineOption::flag("-fno-acyc-simp"),
            CmdlineOption::flag("-fno-assemble"),
            CmdlineOption::flag("-fno-case"),
            CmdlineOption::flag("-fno-combine"),
            CmdlineOption::flag("-fno-const"),
            CmdlineOption::flag("-fno-const-bit-op-tree"),
            CmdlineOption::flag("-fno-dedup"),
            CmdlineOption::flag("-fno-dfg"),
            CmdlineOption::flag("-fno-dfg-peephole"),
            CmdlineOption::flag("-fno-dfg-pre-inline"),
            CmdlineOption::flag("-fno-dfg-post-inline"),
            CmdlineOption::flag("-fno-expand"),
            CmdlineOption::flag("-fno-gate"),
            CmdlineOption::flag("-fno-life"),
            CmdlineOption::flag("-fno-life-post"),
            CmdlineOption::flag("-fno-localize"),
            CmdlineOption::flag("-fno-merge-cond"),
            CmdlineOption::flag("-fno-merge-cond-motion"),
            CmdlineOption::flag("-fno-merge-const-pool"),
            CmdlineOption::flag("-fno-reloop"),
            CmdlineOption::flag("-fno-reorder"),
            CmdlineOption::flag("-fno-split"),
            CmdlineOption::flag("-fno-subst"),
            CmdlineOption::flag("-fno-subst-const"),
            CmdlineOption::flag("-fno-table"),
            // Set the maximum number of statements present in an equation to be inlined
            CmdlineOption::int_range("--gate-stmts {}", 10, 50, 10),
            // Enable hierarchical Verilation
            CmdlineOption::flag("--hierarchical"),
            // Set the depth for the IFDEPTH warning (default=0)
            CmdlineOption::int_range("--if-depth {}", 10, 50, 10),
            // Tune the inlining of modules (default=2000)
            CmdlineOption::int_range("--inline-mult {}", 100, 2000, 100),
            // Tune the assumed dynamic instruction count of the average DPI import (default=200)
            CmdlineOption::int_range("--instr-count-dpi {}", 10, 200, 10),
            // Specify the level of parallelism (--build-jobs and --verilate-jobs)
            CmdlineOption::int_range("-j {}", 1, 9, 1),
            // Enable the creation of .d dependency files
            CmdlineOption::flag("--MMD"),
            // Disable the creation of .d dependency files
            CmdlineOption::flag("--no-MMD"),
            // When creating .d dependency files with --MMD option, make phony targets
            CmdlineOption::flag("--MP"),
            // Enables slow optimizations for the code Verilator itself generates
            CmdlineOption::flag("-O3"),
            // Enables splitting the .cpp files (default=20000)
            CmdlineOption::int_range("--output-split {}", 1000, 20000, 1000),
            // Disable generation of `line markers and blank lines (with -E)
            CmdlineOption::flag("-P"),
            // Show comments in preprocessor output (with -E)
            CmdlineOption::flag("--pp-comments"),
            // Enable the compiler's profiling flag
            CmdlineOption::flag("--prof-c"),
            // Modify the created C++ functions to support profiling
            CmdlineOption::flag("--prof-cfuncs"),
            // Enable collection of execution trace
            CmdlineOption::flag("--prof-exec"),
            // The minimum number of iterations the resulting loop needs to have (default=40)
            CmdlineOption::int_range("--reloop-limit {}", 10, 200, 10),
            // Enable including save and restore functions in the generated model
            CmdlineOption::flag("--savable"),
            // Skip execution of Verilator if all source files are not updated
            CmdlineOption::flag("--skip-identical"),
            // Disables skipping execution of Verilator
            CmdlineOption::flag("--no-skip-identical"),
            // Creates a dump file with statistics on the design
            CmdlineOption::flag("--stats"),
            // Creates more detailed statistics
            CmdlineOption::flag("--stats-vars"),
            // Adds waveform tracing code to the model using VCD format
            CmdlineOption::flag("--trace"),
            // Enable tracing to include a signal for every coverage point
            CmdlineOption::flag("--trace-coverage"),
            // Specify the number of levels deep to enable tracing
            CmdlineOption::int_range("--trace-depth {}", 1, 11, 1),
            // The maximum array depth of a signal (default=32)
            CmdlineOption::int_range("--trace-max-array {}", 8, 32, 8),
            // The maximum bit width of a signal (default=256)
            CmdlineOption::int_range("--trace-max-width {}", 16, 256, 16),
            // Disable tracing of parameters
            CmdlineOption::flag("--no-trace-params"),
            // Enable tracing to show the name of packed structure, union, and packed array fields
            CmdlineOption::flag("--trace-structs"),
            // Enable tracing of signals or modules that start with an underscore
            CmdlineOption::flag("--trace-underscore"),
            // The maximum number of loop iterations that may be unrolled
            CmdlineOption::int_range("--unroll-count {}", 1, 50, 1),
            // The maximum number of statements in a loop to be unrolled
            CmdlineOption::int_range("--unroll-stmts {}", 1, 50, 1),
            // Enable the use of VPI
            CmdlineOption::flag("--vpi"),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_verilog(self.name(), circuit)?;
        let mut model = ModelTreeView::from_design(Arc::clone(&source.design));
        let top_module = model.top_module().to_owned();

        let obj_dir = ws.temp_dir_path("verilator", true);

        let annotated = annotate_registers(source.source.as_bytes())?;
        let verilog_file = ws.save_to_file(annotated, "commented-verilator_input.v")?;
        tool::verilator_elaborate(&top_module, &verilog_file, &obj_dir, &policy.extra_args)?;

        let escaped_top = VerilatorNaming::escape(&top_module);
        tool::verilator_compile(&escaped_top, &obj_dir)?;

        fulfill_model(&escaped_top, &mut model, &obj_dir)?;

        Ok(Circuit::Cpp(CppCircuit {
            flavor: CppFlavor::Verilator,
            obj_dir,
            model,
            impl_items: Vec::new(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct VariableInfo {
    bytes: usize,
    offset: usize,
}

/// Finds the symbolic variables listed in the generated `main()`.
fn parse_cpp_main(main_text: &str) -> Vec<String> {
    main_text
        .lines()
        .filter_map(|line| var_def_pattern().captures(line))
        .map(|c| c["name"].to_owned())
        .collect()
}

/// Finds offset and size of the given variables in the LLVM assembly.
fn parse_ll(
    ll_text: &str,
    escaped_top: &str,
    variables: &[String],
) -> Result<HashMap<String, VariableInfo>, PipelineError> {
    let mut base_offset: Option<usize> = None;
    let mut members: HashMap<String, VariableInfo> = HashMap::new();
    let mut collecting = false;

    for line in ll_text.lines() {
        if let Some(m) = ll_filename_pattern().captures(line) {
            // The filename distinguishes this model's variables from
            // same-named members of other compilation units.
            if &m["top_module"] == escaped_top {
                collecting = true;
            }
        } else if let Some(m) = ll_debug_info_pattern().captures(line) {
            let name = &m["name"];
            let size = m["size"].parse::<usize>().unwrap_or(0) >> 3;
            let offset = m
                .name("offset")
                .and_then(|o| o.as_str().parse::<usize>().ok())
                .unwrap_or(0)
                >> 3;

            if m.name("align").is_some() && name == "TOP" {
                base_offset = Some(offset);
            }

            // Aggregates like VlWide have a single debug entry; first wins.
            if collecting && variables.iter().any(|v| v == name) && !members.contains_key(name) {
                members.insert(name.to_owned(), VariableInfo { bytes: size, offset });
            }
        }
    }

    let base = base_offset
        .ok_or_else(|| PipelineError::MissingArtifact("offset of TOP not found".to_owned()))?;
    Ok(members
        .into_iter()
        .map(|(name, info)| {
            (
                name,
                VariableInfo {
                    bytes: info.bytes,
                    offset: info.offset + base,
                },
            )
        })
        .collect())
}

/// Attaches `{offset, bytes}` to every model item Verilator kept symbolic.
fn fulfill_model(
    escaped_top: &str,
    model: &mut ModelTreeView,
    obj_dir: &Path,
) -> Result<(), PipelineError> {
    let main_file = obj_dir.join(format!("V{escaped_top}__main.cpp"));
    let ll_file = obj_dir.join(format!("V{escaped_top}.ll"));

    let symbolic_vars = parse_cpp_main(&std::fs::read_to_string(&main_file)?);
    let members = parse_ll(&std::fs::read_to_string(&ll_file)?, escaped_top, &symbolic_vars)?;

    for (name, info) in members {
        let crossbar = VerilatorCppCrossbar::from_data(&name, model);
        for path in crossbar.to_model().to_vec() {
            model.instantiate_item(
                &path,
                Some(Layout {
                    offset: info.offset,
                    bytes: info.bytes,
                }),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_annotation_follows_declarations() {
        let src = b"module m(input clk);\n  reg [3:0] q;\n  wire w;\nendmodule\n";
        let annotated = annotate_registers(src).unwrap();
        let text = String::from_utf8(annotated).unwrap();

        assert!(text.contains("reg [3:0] q/*verilator public_flat*/;"));
        assert!(!text.contains("wire w/*"));
    }

    #[test]
    fn main_parser_collects_quoted_names() {
        let main = "int main() {\n    // - \"clk\"\n    // - \"top__DOT__count\"\n}\n";
        assert_eq!(parse_cpp_main(main), vec!["clk", "top__DOT__count"]);
    }

    #[test]
    fn ll_parser_adds_the_top_base_offset() {
        let ll = concat!(
            "!1 = !DIFile(filename: \"./Vtop___024root.h\", directory: \"/tmp/x\")\n",
            "!2 = !DIDerivedType(tag: DW_TAG_member, name: \"TOP\", scope: !3, file: !4, line: 1, baseType: !5, size: 64, align: 64, offset: 128)\n",
            "!6 = !DIDerivedType(tag: DW_TAG_member, name: \"clk\", scope: !3, file: !4, line: 2, baseType: !5, size: 8)\n",
        );
        let members = parse_ll(ll, "top", &["clk".to_owned()]).unwrap();

        assert_eq!(members["clk"].bytes, 1);
        assert_eq!(members["clk"].offset, 16);
    }
}

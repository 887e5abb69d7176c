//! The yosys-backed translators: SMT export, synthesis, and CXXRTL.

use std::sync::Arc;

use rtlcross_circuit::{
    Circuit, CircuitKind, CppCircuit, CppFlavor, SmtCircuit, SmtFlavor, TransitionKind,
    VerilogNetlistCircuit,
};
use rtlcross_common::{Workspace, tool};
use rtlcross_ir::ModelTreeView;
use rtlcross_ir::crossbar::{DebugItem, YosysCxxCrossbar};
use rtlcross_smt::{FunctionTable, SymbolRenamer, Term};

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translator::{Policy, Translator};
use crate::translators::{expect_verilog, fresh_tag};

/// `yosys write_smt2`: Verilog in, SMT transition relation out.
#[derive(Debug)]
pub struct YosysWriteSmt2;

impl Translator for YosysWriteSmt2 {
    fn name(&self) -> &'static str {
        "YosysWriteSmt2"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::Verilog, CircuitKind::YosysSmt)]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        _policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_verilog(self.name(), circuit)?;
        let mut model = ModelTreeView::from_design(Arc::clone(&source.design));
        model.instantiate_all();
        let top = model.top_module().to_owned();

        let verilog_file = ws.save_to_file(&source.source, "smt2_input.v")?;
        let smt2 = tool::yosys_write_smt2(&verilog_file, &top)?;

        let renamer = SymbolRenamer::new(&fresh_tag("y"), &source.design.module_names());
        let preamble = renamer.rename(&smt2);
        let functions = FunctionTable::parse(&preamble);
        let state_sort = Term::symbol(renamer.rename(&format!("{top}_s")));

        Ok(Circuit::Smt(SmtCircuit {
            flavor: SmtFlavor::Yosys,
            model,
            preamble,
            state_sort,
            top,
            renamer,
            functions,
            transition_kind: TransitionKind::Function,
            symbol_prefix: String::new(),
            is_partial: false,
        }))
    }
}

/// `yosys synth`: Verilog in, synthesized netlist out.
#[derive(Debug)]
pub struct YosysSynthesis;

impl Translator for YosysSynthesis {
    fn name(&self) -> &'static str {
        "YosysSynthesis"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::Verilog, CircuitKind::VerilogNetlist)]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            // Flatten the netlist before optimizing
            CmdlineOption::flag("-flatten"),
            // Skip the ABC mapping pass
            CmdlineOption::flag("-noabc"),
            // Skip FSM extraction
            CmdlineOption::flag("-nofsm"),
            // Skip resource sharing
            CmdlineOption::flag("-noshare"),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_verilog(self.name(), circuit)?;
        let verilog_file = ws.save_to_file(&source.source, "synth_input.v")?;
        let netlist = tool::yosys_synthesis(&verilog_file, &policy.extra_args)?;
        Ok(Circuit::VerilogNetlist(VerilogNetlistCircuit {
            source: netlist,
        }))
    }
}

/// The `debug.cpp` harness dumping CXXRTL's debug items as CSV.
const DEBUG_CPP_TEMPLATE: &str = r#"
#include "{top_module}.cpp"
#include <fstream>

const char SEP = ',';

int main()
{
    cxxrtl_design::p_{top_module} top;
    cxxrtl::debug_items items;
    top.debug_info(&items, nullptr, "");

    std::ofstream f("debug_info.csv");
    if (f.is_open())
    {
        f << "name,width,next,flags\n";
        for (auto &it : items.table)
            for (auto &part : it.second)
                f << it.first << SEP << part.width << SEP << (part.next != nullptr) << SEP << part.flags << '\n';
        f.close();
    }
    else
        return -1;
    return 0;
}
"#;

/// OUTPUT bit of CXXRTL's debug item flags.
const CXXRTL_FLAG_OUTPUT: u32 = 1 << 1;

fn parse_debug_csv(csv: &str) -> Result<Vec<DebugItem>, PipelineError> {
    let mut items = Vec::new();
    for line in csv.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        // Rightmost fields are numeric; the name itself may contain spaces
        // but never commas.
        let fields: Vec<&str> = line.rsplitn(4, ',').collect();
        let [flags, next, width, name] = fields.as_slice() else {
            return Err(PipelineError::MissingArtifact(format!(
                "malformed debug_info.csv row: {line}"
            )));
        };
        let flags: u32 = flags.trim().parse().map_err(|_| {
            PipelineError::MissingArtifact(format!("malformed flags in debug_info.csv: {line}"))
        })?;
        let next = next.trim() != "0";
        let width: u32 = width.trim().parse().map_err(|_| {
            PipelineError::MissingArtifact(format!("malformed width in debug_info.csv: {line}"))
        })?;
        items.push(DebugItem {
            name: (*name).to_owned(),
            width,
            writable_and_non_output: next && (flags & CXXRTL_FLAG_OUTPUT) == 0,
        });
    }
    Ok(items)
}

/// `yosys write_cxxrtl`: Verilog in, compiled C++ model out.
#[derive(Debug)]
pub struct YosysWriteCxx;

impl Translator for YosysWriteCxx {
    fn name(&self) -> &'static str {
        "YosysWriteCxx"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::Verilog, CircuitKind::CxxrtlCpp)]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            // Don't emit debug information for optimized-out nets
            CmdlineOption::flag("-nodebug"),
            // Disable tri-state lowering
            CmdlineOption::flag("-noproc"),
            // Maximum localized wire depth
            CmdlineOption::int_range("-O {}", 0, 7, 1),
            // Put the design into a namespace
            CmdlineOption::flag("-noflatten"),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_verilog(self.name(), circuit)?;
        let model = ModelTreeView::from_design(Arc::clone(&source.design));
        let top = model.top_module().to_owned();
        let mangled_top = YosysCxxCrossbar::mangle_name(&top);

        let obj_dir = ws.temp_dir_path("cxxrtl", true);
        std::fs::create_dir_all(&obj_dir)?;

        let verilog_file = ws.save_to_file(&source.source, "cxxrtl_input.v")?;
        tool::yosys_write_cxxrtl(
            &verilog_file,
            &top,
            &obj_dir.join(format!("{mangled_top}.cpp")),
            &policy.extra_args,
        )?;

        std::fs::write(
            obj_dir.join("debug.cpp"),
            DEBUG_CPP_TEMPLATE.replace("{top_module}", &mangled_top),
        )?;
        let csv = tool::cxxrtl_debug_dump(&obj_dir)?;
        let debug_items = parse_debug_csv(&csv)?;
        let impl_items = YosysCxxCrossbar::preprocess(&debug_items, &model)?;

        Ok(Circuit::Cpp(CppCircuit {
            flavor: CppFlavor::Cxxrtl,
            obj_dir,
            model,
            impl_items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_csv_rows_decode_flags() {
        let csv = "name,width,next,flags\n\
                   clk,1,1,1\n\
                   q,4,1,2\n\
                   u0 r,1,0,16\n";
        let items = parse_debug_csv(csv).unwrap();

        assert_eq!(items.len(), 3);
        assert!(items[0].writable_and_non_output);
        // Outputs are never symbolic inputs.
        assert!(!items[1].writable_and_non_output);
        // Items without a next pointer are not writable.
        assert!(!items[2].writable_and_non_output);
        assert_eq!(items[2].name, "u0 r");
    }

    #[test]
    fn circuit_tags_never_repeat() {
        assert_ne!(fresh_tag("y"), fresh_tag("y"));
    }
}

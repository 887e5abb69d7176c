//! SystemVerilog lowering through the Surelog-backed yosys plugin.

use rtlcross_circuit::{Circuit, CircuitKind, VerilogCircuit};
use rtlcross_common::{Workspace, tool};

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translator::{Policy, Translator};
use crate::translators::expect_systemverilog;

/// The yosys systemverilog plugin (Surelog front end).
#[derive(Debug)]
pub struct SurelogPlugin;

impl Translator for SurelogPlugin {
    fn name(&self) -> &'static str {
        "SurelogPlugin"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::SystemVerilog, CircuitKind::Verilog)]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            // Forces all files to be parsed as SystemVerilog files
            CmdlineOption::flag("-sverilog"),
            // Compiles each Verilog file as an independent compilation unit
            CmdlineOption::flag("-fileunit"),
            // Compiles both all files as a whole unit and separate compilation units
            CmdlineOption::flag("-diffcompunit"),
            // Parse/Compile/Elaborate/Produces UHDM
            CmdlineOption::flag("-parse"),
            // Turns off Parsing & Compilation & Elaboration
            CmdlineOption::flag("-noparse"),
            // Turns off Compilation & Elaboration
            CmdlineOption::flag("-nocomp"),
            // Turns off Elaboration
            CmdlineOption::flag("-noelab"),
            // Forces UHDM/VPI Full Elaboration/Uniquification
            CmdlineOption::flag("-elabuhdm"),
            // Enables the Parser Python Listener
            CmdlineOption::flag("-pythonlistener"),
            // Turns off all Python features
            CmdlineOption::flag("-nopython"),
            // Turns on all Python features
            CmdlineOption::flag("-withpython"),
            // Turns on strict Python checks
            CmdlineOption::flag("-strictpythoncheck"),
            // 0 up to 512 max threads
            CmdlineOption::int_range("-mt {}", 0, 9, 1),
            // 0 up to 512 max processes
            CmdlineOption::int_range("-mp {}", 0, 9, 1),
            // Split files/modules larger than specified line number
            CmdlineOption::int_range("-split {}", 10, 500, 50),
            CmdlineOption::values(
                "--enable-feature={}",
                ["parametersubstitution", "letexprsubstitution"],
            ),
            CmdlineOption::values(
                "--disable-feature={}",
                ["parametersubstitution", "letexprsubstitution"],
            ),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_systemverilog(self.name(), circuit)?;
        let sv_file = ws.save_to_file(&source.source, "surelog_input.sv")?;
        let verilog = tool::yosys_systemverilog_plugin(&sv_file, &policy.extra_args)?;
        let verilog_file = ws.save_to_file(verilog, "surelog_output.v")?;
        Ok(Circuit::Verilog(VerilogCircuit::from_file(&verilog_file)?))
    }
}

//! SystemVerilog lowering through zachjs/sv2v.

use rtlcross_circuit::{Circuit, CircuitKind, VerilogCircuit};
use rtlcross_common::{Workspace, tool};

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translator::{Policy, Translator};
use crate::translators::expect_systemverilog;

/// `sv2v`: SystemVerilog in, Verilog out.
#[derive(Debug)]
pub struct Sv2v;

impl Translator for Sv2v {
    fn name(&self) -> &'static str {
        "Sv2v"
    }

    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)> {
        vec![(CircuitKind::SystemVerilog, CircuitKind::Verilog)]
    }

    fn options(&self) -> Vec<CmdlineOption> {
        vec![
            // Lex input files separately
            CmdlineOption::flag("--siloed"),
            // Retain certain conversion artifacts
            CmdlineOption::flag("--verbose"),
        ]
    }

    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError> {
        let source = expect_systemverilog(self.name(), circuit)?;
        let sv_file = ws.save_to_file(&source.source, "sv2v_input.sv")?;
        let verilog = tool::sv2v(&sv_file, &policy.extra_args)?;
        let verilog_file = ws.save_to_file(verilog, "sv2v_output.v")?;
        Ok(Circuit::Verilog(VerilogCircuit::from_file(&verilog_file)?))
    }
}

//! Shared infrastructure for the rtlcross differential tester.
//!
//! This crate owns the pieces every other crate leans on:
//! - [`tool`]: adapters that invoke external EDA tools under a timeout
//! - [`workspace`]: scoped temporary directories and the evidence sink
//! - [`verilog`]: the shared tree-sitter Verilog parsing layer
//! - [`consts`]: harness-wide timeouts and stable file names

pub mod consts;
pub mod tool;
pub mod verilog;
pub mod workspace;

pub use tool::{ToolCommand, ToolError, ToolOutput};
pub use workspace::Workspace;

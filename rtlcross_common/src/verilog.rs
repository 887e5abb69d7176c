//! Shared tree-sitter layer for Verilog and SystemVerilog sources.
//!
//! The harness never trusts name heuristics to tell registers from wires:
//! the register set is computed here by a syntactic scan of the source, and
//! both the IR loader and the Verilator preprocessing lean on it.

use ahash::AHashMap;
use std::collections::HashSet;
use thiserror::Error;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

/// Failures of the shared parsing layer.
#[derive(Debug, Error)]
pub enum VerilogError {
    /// The grammar was rejected by the tree-sitter runtime.
    #[error("verilog grammar rejected: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    /// The parser returned no tree (cancelled or invalid input).
    #[error("verilog source could not be parsed")]
    Unparsable,
}

/// The tree-sitter Verilog grammar.
#[must_use]
pub fn language() -> Language {
    tree_sitter_verilog::LANGUAGE.into()
}

/// A parser configured for the Verilog grammar.
pub fn new_parser() -> Result<Parser, VerilogError> {
    let mut parser = Parser::new();
    parser.set_language(&language())?;
    Ok(parser)
}

/// Parses `src` into a syntax tree.
pub fn parse(src: &[u8]) -> Result<Tree, VerilogError> {
    new_parser()?.parse(src, None).ok_or(VerilogError::Unparsable)
}

/// Matches `reg` variable declarations: the declared identifier, its
/// enclosing declaration assignment, and the vector type keyword.
const REG_DECLARATION_QUERY: &str = r"
(data_declaration
    (data_type_or_implicit1
        (data_type
            (integer_vector_type) @vt))
    (list_of_variable_decl_assignments
        (variable_decl_assignment
            (simple_identifier) @id) @decl))
";

fn capture_index(query: &Query, name: &str) -> u32 {
    query
        .capture_names()
        .iter()
        .position(|n| *n == name)
        .map(|i| i as u32)
        .expect("query declares the capture")
}

/// Walks up from `node` to the enclosing `module_declaration` and returns the
/// module's name.
fn enclosing_module_name<'a>(node: Node<'a>, src: &'a [u8]) -> Option<&'a str> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if parent.kind() == "module_declaration" {
            let mut cursor = parent.walk();
            for child in parent.children(&mut cursor) {
                if child.kind() == "module_header" {
                    let mut header_cursor = child.walk();
                    for header_child in child.children(&mut header_cursor) {
                        if header_child.kind() == "simple_identifier" {
                            return header_child.utf8_text(src).ok();
                        }
                    }
                }
            }
            return None;
        }
        current = parent;
    }
    None
}

/// The set of syntactically declared `reg` names, grouped per module.
pub fn registers_by_module(src: &[u8]) -> Result<AHashMap<String, HashSet<String>>, VerilogError> {
    let tree = parse(src)?;
    let query = Query::new(&language(), REG_DECLARATION_QUERY).expect("static query compiles");
    let vt_index = capture_index(&query, "vt");
    let id_index = capture_index(&query, "id");

    let mut result: AHashMap<String, HashSet<String>> = AHashMap::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), src);
    while let Some(m) = matches.next() {
        let vt = m.captures.iter().find(|c| c.index == vt_index);
        let id = m.captures.iter().find(|c| c.index == id_index);
        let (Some(vt), Some(id)) = (vt, id) else {
            continue;
        };
        if vt.node.utf8_text(src) != Ok("reg") {
            continue;
        }
        let Some(module) = enclosing_module_name(id.node, src) else {
            continue;
        };
        if let Ok(name) = id.node.utf8_text(src) {
            result
                .entry(module.to_owned())
                .or_default()
                .insert(name.to_owned());
        }
    }
    Ok(result)
}

/// Byte offsets right after each `reg` declaration where a Verilator
/// metacomment can be inserted.
///
/// The offset sits after the declared identifier, or after the whole
/// declaration assignment when unpacked dimensions follow the identifier.
pub fn reg_annotation_points(src: &[u8]) -> Result<Vec<usize>, VerilogError> {
    let tree = parse(src)?;
    let query = Query::new(&language(), REG_DECLARATION_QUERY).expect("static query compiles");
    let vt_index = capture_index(&query, "vt");
    let id_index = capture_index(&query, "id");
    let decl_index = capture_index(&query, "decl");

    let mut points = HashSet::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), src);
    while let Some(m) = matches.next() {
        let vt = m.captures.iter().find(|c| c.index == vt_index);
        let id = m.captures.iter().find(|c| c.index == id_index);
        let decl = m.captures.iter().find(|c| c.index == decl_index);
        let (Some(vt), Some(id), Some(decl)) = (vt, id, decl) else {
            continue;
        };
        if vt.node.utf8_text(src) != Ok("reg") {
            continue;
        }
        let mut decl_cursor = decl.node.walk();
        let has_dimensions = decl
            .node
            .children(&mut decl_cursor)
            .any(|c| c.kind() == "unpacked_dimension");
        points.insert(if has_dimensions {
            decl.node.end_byte()
        } else {
            id.node.end_byte()
        });
    }
    let mut sorted: Vec<usize> = points.into_iter().collect();
    sorted.sort_unstable();
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: &str = "
module counter(input clk, input rst, output [3:0] q);
  reg [3:0] count;
  wire next;
  assign q = count;
  always @(posedge clk)
    if (rst) count <= 0;
    else count <= count + 1;
endmodule

module other(input clk);
  reg flag;
  reg mem [1:0];
endmodule
";

    #[test]
    fn registers_are_grouped_per_module() {
        let regs = registers_by_module(COUNTER.as_bytes()).unwrap();

        assert_eq!(regs["counter"], HashSet::from(["count".to_owned()]));
        assert_eq!(
            regs["other"],
            HashSet::from(["flag".to_owned(), "mem".to_owned()])
        );
    }

    #[test]
    fn wires_are_not_registers() {
        let regs = registers_by_module(COUNTER.as_bytes()).unwrap();
        assert!(!regs["counter"].contains("next"));
    }

    #[test]
    fn annotation_points_follow_identifiers() {
        let src = b"module m(input clk);\n  reg [1:0] a;\n  reg b [3:0];\nendmodule\n";
        let points = reg_annotation_points(src).unwrap();

        assert_eq!(points.len(), 2);
        // `a` ends before its semicolon; `b [3:0]` extends past the dims.
        let text = std::str::from_utf8(src).unwrap();
        assert_eq!(&text[points[0] - 1..points[0]], "a");
        assert_eq!(&text[points[1] - 1..points[1]], "]");
    }
}

//! Tree-sitter query sources and the match helper.
//!
//! Queries stay predicate-free; identifier filtering happens in Rust where
//! the sub-mutators can see it.

use std::collections::HashMap;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use crate::mutator::MutationError;

pub(crate) const ALL_DECLARED_IDENTIFIERS: &str = r"
(list_of_port_declarations
    (ansi_port_declaration
        (port_identifier
            (simple_identifier) @identifier))) @declaration

(output_declaration
    (list_of_port_identifiers
        (port_identifier
            (simple_identifier) @identifier))) @declaration

(input_declaration
    (list_of_port_identifiers
        (port_identifier
            (simple_identifier) @identifier))) @declaration

(parameter_declaration
    (list_of_param_assignments
        (param_assignment
            (parameter_identifier
                (simple_identifier) @identifier)))) @declaration

(tf_item_declaration
    (tf_port_declaration
        (list_of_tf_variable_identifiers
            (port_identifier
                (simple_identifier) @identifier)))) @declaration

(net_declaration
    (list_of_net_decl_assignments
        (net_decl_assignment
            (simple_identifier) @identifier))) @declaration

(module_or_generate_item
    (package_or_generate_item_declaration
        (data_declaration
            (list_of_variable_decl_assignments
                (variable_decl_assignment
                    (simple_identifier) @identifier))) @declaration))
";

pub(crate) const ALL_NON_ARRAY_ITEM_DECLARATIONS: &str = r"
(module_declaration
    (module_or_generate_item
        (package_or_generate_item_declaration
            [(net_declaration
                (list_of_net_decl_assignments
                    (net_decl_assignment
                        (simple_identifier) @identifier) @decl_assignment))
            (data_declaration
                (list_of_variable_decl_assignments
                    (variable_decl_assignment
                        (simple_identifier) @identifier) @decl_assignment))])))
";

pub(crate) const ALL_REFERENCES: &str = r"
(expression
    (primary
        (simple_identifier) @id_in_expr))
(variable_lvalue
    (simple_identifier) @id_lhs)
(net_lvalue
    (simple_identifier) @id_lhs)
";

pub(crate) const ALL_IDENTIFIERS_IN_EXPR: &str = r"
(expression
    (primary
        (simple_identifier) @identifier))
";

pub(crate) const ALL_IDENTIFIERS_WITHOUT_SELECT: &str = r"
(variable_lvalue
    (simple_identifier) @identifier .)
(net_lvalue
    (simple_identifier) @identifier .)
(expression
    (primary
        (simple_identifier) @identifier .))
";

pub(crate) const ALL_EXPRESSIONS: &str = r"
(expression) @expr
";

pub(crate) const RHS_EXPRESSIONS: &str = r"
(continuous_assign
    (list_of_net_assignments
        (net_assignment
            (expression) @expr)))
(nonblocking_assignment
    (expression) @expr)
";

pub(crate) const CA_NO_SELECT_IN_LHS: &str = r"
(module_or_generate_item
    (continuous_assign
        (list_of_net_assignments .
            (net_assignment
                (net_lvalue
                    (simple_identifier) .) @lvalue
                (expression) @rvalue) .))) @assignment
";

pub(crate) const NBA_NO_SELECT_IN_LHS: &str = r"
(statement_item
    (nonblocking_assignment
        (variable_lvalue
            (simple_identifier) .) @lvalue
        (expression) @rvalue)) @assignment
";

pub(crate) const ALL_STATEMENT_OR_NULL: &str = r"
(statement_or_null) @stmt
(function_statement_or_null) @stmt
";

pub(crate) const ALL_MODULE_DECLARATIONS: &str = r"
(module_declaration
    (module_header
        (simple_identifier) @module_name)) @module
";

pub(crate) const ALL_MODULE_INSTANTIATIONS: &str = r"
(module_instantiation
    (simple_identifier) @module_name)
";

pub(crate) const NONBLOCKING_ASSIGNMENTS: &str = r"
(statement_item
    (nonblocking_assignment)) @nba
";

pub(crate) const MODULE_OR_GENERATE_ITEMS: &str = r"
(module_or_generate_item
    [
        (continuous_assign)
        (always_construct)
    ]) @item
";

pub(crate) const COND_STATEMENT_1: &str = r#"
(conditional_statement
    (cond_predicate) @cond .
    (statement_or_null) @stmt . ) @if
"#;

pub(crate) const COND_STATEMENT_2: &str = r#"
(conditional_statement
    (cond_predicate) @cond
    (statement_or_null) @stmt
    "else"
    (statement_or_null) @stmt ) @if
"#;

pub(crate) const UNARY_EXPRESSIONS: &str = r"
(expression
    . (unary_operator) @uop) @expr
(constant_expression
    . (unary_operator) @uop) @expr
";

pub(crate) const BINARY_EXPRESSIONS: &str = r#"
(expression
    [
        "**"
        "*" "/" "%"
        "+" "-"
        "<<" ">>" "<<<" ">>>"
        "<" "<=" ">" ">="
        "==" "!=" "===" "!=="
        "&"
        "^" "^~" "~^"
        "|"
        "&&"
        "||"
    ] @bop)
"#;

/// One query match with its captures grouped by capture name.
pub(crate) type CaptureMap<'t> = HashMap<String, Vec<Node<'t>>>;

/// Runs a query over `node`, returning every match's captures by name.
pub(crate) fn pattern_match<'t>(
    pattern: &str,
    node: Node<'t>,
    src: &[u8],
) -> Result<Vec<CaptureMap<'t>>, MutationError> {
    let query = Query::new(&rtlcross_common::verilog::language(), pattern)
        .map_err(|e| MutationError::Generator(format!("query rejected: {e}")))?;
    let capture_names = query.capture_names().to_vec();

    let mut cursor = QueryCursor::new();
    let mut results = Vec::new();
    let mut matches = cursor.matches(&query, node, src);
    while let Some(m) = matches.next() {
        let mut grouped: CaptureMap<'t> = HashMap::new();
        for capture in m.captures {
            let name = capture_names[capture.index as usize].to_owned();
            grouped.entry(name).or_default().push(capture.node);
        }
        if !grouped.is_empty() {
            results.push(grouped);
        }
    }
    Ok(results)
}

/// The single node of a capture expected to appear exactly once.
pub(crate) fn single<'t>(m: &CaptureMap<'t>, name: &str) -> Result<Node<'t>, MutationError> {
    match m.get(name).map(Vec::as_slice) {
        Some([node]) => Ok(*node),
        _ => Err(MutationError::Generator(format!(
            "capture '{name}' missing or repeated"
        ))),
    }
}

/// Text of a node.
pub(crate) fn text<'s>(node: Node<'_>, src: &'s [u8]) -> &'s [u8] {
    &src[node.start_byte()..node.end_byte()]
}

/// Whether a node's text mentions a clock; clock nets stay untouched.
pub(crate) fn mentions_clock(node: Node<'_>, src: &[u8]) -> bool {
    let t = text(node, src);
    contains(t, b"clk") || contains(t, b"clock")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

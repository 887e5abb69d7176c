//! Structural helpers shared by the sub-mutators.

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use tree_sitter::{Node, Tree};

use crate::mutator::{MutationError, SkipOrError};
use crate::queries::{self, pattern_match, text};

/// Finds the top-level module/task/function declaration enclosing `node`.
pub(crate) fn parent_of<'t>(node: Node<'_>, tree: &'t Tree) -> Result<Node<'t>, MutationError> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if matches!(
            child.kind(),
            "module_declaration" | "package_or_generate_item_declaration"
        ) && child.start_byte() <= node.start_byte()
            && node.end_byte() <= child.end_byte()
        {
            return Ok(child);
        }
    }
    Err(MutationError::Generator(format!(
        "cannot find the module where byte range {}..{} is declared",
        node.start_byte(),
        node.end_byte(),
    )))
}

fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

fn find_descendant<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(|c| find_descendant(c, kind))
}

/// Finds the byte offset where a new declaration can be inserted inside the
/// given module, task, or function.
pub(crate) fn decl_insert_location(parent: Node<'_>) -> Result<usize, MutationError> {
    if parent.kind() == "module_declaration" {
        return find_child(parent, "module_or_generate_item")
            .map(|n| n.start_byte())
            .ok_or_else(|| {
                MutationError::Generator("module_or_generate_item not found".to_owned())
            });
    }
    if parent.kind() == "package_or_generate_item_declaration" {
        if let Some(subroutine) = find_child(parent, "task_declaration")
            .or_else(|| find_child(parent, "function_declaration"))
        {
            // New declarations go right before the subroutine's first
            // item declaration, inside the body.
            let last = subroutine.child(subroutine.child_count().saturating_sub(1));
            if let Some(body) = last {
                if let Some(item) = find_child(body, "tf_item_declaration") {
                    return Ok(item.start_byte());
                }
            }
        }
    }
    Err(MutationError::Generator(
        "failed to find an insertion point".to_owned(),
    ))
}

/// Extracts the declared type fragment (`data_type_or_implicit1` or the
/// implicit empty string) of the identifier inside the module.
pub(crate) fn type_of(
    identifier: &[u8],
    module_node: Node<'_>,
    src: &[u8],
) -> Result<String, MutationError> {
    let declarations: Vec<Node<'_>> = pattern_match(queries::ALL_DECLARED_IDENTIFIERS, module_node, src)?
        .into_iter()
        .filter_map(|m| {
            let id = m.get("identifier")?.first().copied()?;
            let decl = m.get("declaration")?.first().copied()?;
            (text(id, src) == identifier).then_some(decl)
        })
        .collect();
    let [declaration] = declarations.as_slice() else {
        return Err(MutationError::Generator(format!(
            "multiple (or zero) declarations of '{}' found ({})",
            String::from_utf8_lossy(identifier),
            declarations.len(),
        )));
    };

    let fragment = match declaration.kind() {
        "list_of_port_declarations" => {
            let mut cursor = declaration.walk();
            let port = declaration
                .children(&mut cursor)
                .filter(|c| c.kind() == "ansi_port_declaration")
                .find(|port| {
                    find_descendant(*port, "port_identifier")
                        .and_then(|p| find_descendant(p, "simple_identifier"))
                        .is_some_and(|id| text(id, src) == identifier)
                });
            port.and_then(|p| find_descendant(p, "data_type_or_implicit1"))
                .map(|n| String::from_utf8_lossy(text(n, src)).into_owned())
                .unwrap_or_default()
        }
        "output_declaration" | "input_declaration" | "tf_item_declaration" | "net_declaration" => {
            find_descendant(*declaration, "data_type_or_implicit1")
                .map(|n| String::from_utf8_lossy(text(n, src)).into_owned())
                .unwrap_or_default()
        }
        "parameter_declaration" => find_child(*declaration, "implicit_data_type1")
            .map(|n| String::from_utf8_lossy(text(n, src)).into_owned())
            .unwrap_or_default(),
        // data_declaration: "reg [3:0]" keeps the vector part, "reg" alone
        // is implicit.
        _ => {
            let data_type = find_descendant(*declaration, "data_type");
            match data_type {
                Some(dt) if dt.child_count() > 1 => {
                    let mut cursor = dt.walk();
                    dt.children(&mut cursor)
                        .skip(1)
                        .map(|c| String::from_utf8_lossy(text(c, src)).into_owned())
                        .collect::<Vec<_>>()
                        .join(" ")
                }
                _ => String::new(),
            }
        }
    };
    Ok(fragment)
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[(?P<msb>[^\[\]:]*):(?P<lsb>[^\[\]:]*)\]").expect("static regex")
    })
}

/// The `(msb, lsb)` expressions of the identifier's single packed range.
/// Scalars and multi-dimensional declarations are quietly skipped.
pub(crate) fn range_of(
    identifier: &[u8],
    module_node: Node<'_>,
    src: &[u8],
) -> Result<(String, String), SkipOrError> {
    let fragment = type_of(identifier, module_node, src)?;
    let ranges: Vec<(String, String)> = range_pattern()
        .captures_iter(&fragment)
        .map(|c| (c["msb"].to_owned(), c["lsb"].to_owned()))
        .collect();
    match ranges.as_slice() {
        [(msb, lsb)] => Ok((msb.clone(), lsb.clone())),
        _ => Err(SkipOrError::Skip),
    }
}

/// Numeric literal parsing across the Verilog bases.
pub(crate) fn parse_number(input: &str) -> Option<i64> {
    static UNSIGNED: OnceLock<Regex> = OnceLock::new();
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    static BINARY: OnceLock<Regex> = OnceLock::new();
    static OCTAL: OnceLock<Regex> = OnceLock::new();
    static HEX: OnceLock<Regex> = OnceLock::new();

    let mut s = input.trim();
    while s.starts_with('(') && s.ends_with(')') {
        s = s[1..s.len() - 1].trim();
    }

    let digits = |captures: regex::Captures<'_>, name: &str, radix: u32| {
        i64::from_str_radix(&captures[name].replace('_', ""), radix).ok()
    };

    let unsigned = UNSIGNED.get_or_init(|| Regex::new(r"^(?P<decimal>\d[_\d]*)$").expect("static regex"));
    let decimal = DECIMAL.get_or_init(|| {
        Regex::new(r"^([1-9][_\d]*)?'[sS]?[dD](?P<decimal>\d[_\d]*)$").expect("static regex")
    });
    let binary = BINARY.get_or_init(|| {
        Regex::new(r"^([1-9][_\d]*)?'[sS]?[bB](?P<binary>[0-1][_0-1]*)$").expect("static regex")
    });
    let octal = OCTAL.get_or_init(|| {
        Regex::new(r"^([1-9][_\d]*)?'[sS]?[oO](?P<octal>[0-7][_0-7]*)$").expect("static regex")
    });
    let hex = HEX.get_or_init(|| {
        Regex::new(r"^([1-9][_\d]*)?'[sS]?[hH](?P<hex>[0-9a-fA-F][_0-9a-fA-F]*)$")
            .expect("static regex")
    });

    if let Some(c) = unsigned.captures(s) {
        digits(c, "decimal", 10)
    } else if let Some(c) = decimal.captures(s) {
        digits(c, "decimal", 10)
    } else if let Some(c) = binary.captures(s) {
        digits(c, "binary", 2)
    } else if let Some(c) = octal.captures(s) {
        digits(c, "octal", 8)
    } else if let Some(c) = hex.captures(s) {
        digits(c, "hex", 16)
    } else {
        None
    }
}

/// The `(msb, lsb)` pair as constants; non-constant ranges are skipped.
pub(crate) fn shape_of(
    identifier: &[u8],
    module_node: Node<'_>,
    src: &[u8],
) -> Result<(i64, i64), SkipOrError> {
    let (msb, lsb) = range_of(identifier, module_node, src)?;
    match (parse_number(&msb), parse_number(&lsb)) {
        (Some(msb), Some(lsb)) => Ok((msb, lsb)),
        _ => Err(SkipOrError::Skip),
    }
}

/// A random identifier for variables created during mutation.
pub(crate) fn random_id(rng: &mut impl Rng, length: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut id = String::from("_");
    for _ in 0..length {
        id.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parse_in_every_base() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("1_000"), Some(1000));
        assert_eq!(parse_number("8'd17"), Some(17));
        assert_eq!(parse_number("4'b1010"), Some(10));
        assert_eq!(parse_number("6'o17"), Some(15));
        assert_eq!(parse_number("12'hfF"), Some(255));
        assert_eq!(parse_number("((3))"), Some(3));
        assert_eq!(parse_number("WIDTH-1"), None);
    }

    #[test]
    fn random_ids_are_well_formed() {
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(1);
        let id = random_id(&mut rng, 5);
        assert_eq!(id.len(), 6);
        assert!(id.starts_with('_'));
    }
}

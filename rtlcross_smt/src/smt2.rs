//! Scraping and namespacing of yosys `write_smt2` output.
//!
//! Each circuit's preamble is replayed into one shared solver session, so the
//! module-derived symbols of different circuits must not collide (two
//! pipelines over the same input produce identical top names). A
//! [`SymbolRenamer`] rewrites every module-rooted symbol with a per-circuit
//! tag, applied identically to the preamble text and to every accessor name
//! the crossbars construct later.

use ahash::AHashMap;
use regex::Regex;

/// Return sort of a backend-defined accessor function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtSort {
    /// A boolean (1-bit wires in the yosys backend).
    Bool,
    /// A bit vector of the given width.
    BitVec(u32),
}

impl SmtSort {
    /// The bit width this sort carries once normalized to a bit-vector.
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            SmtSort::Bool => 1,
            SmtSort::BitVec(w) => w,
        }
    }
}

/// The functions a backend's SMT-LIBv2 text defines, keyed by symbol name
/// (without `|` quoting).
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: AHashMap<String, SmtSort>,
}

impl FunctionTable {
    /// Scans `define-fun` and `declare-fun` forms out of SMT-LIBv2 text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut functions = AHashMap::new();
        for keyword in ["(define-fun ", "(declare-fun "] {
            let mut rest = text;
            while let Some(pos) = rest.find(keyword) {
                let after = &rest[pos + keyword.len()..];
                if let Some((name, sort)) = scan_signature(after) {
                    functions.insert(name, sort);
                }
                rest = after;
            }
        }
        Self { functions }
    }

    /// Looks up the return sort of a function.
    #[must_use]
    pub fn sort_of(&self, name: &str) -> Option<SmtSort> {
        self.functions.get(name).copied()
    }

    /// Whether the table defines the given function.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of known functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Parses `<name> <args> <sort>` right after a define-fun/declare-fun
/// keyword. Returns the unquoted name and the return sort.
fn scan_signature(input: &str) -> Option<(String, SmtSort)> {
    let input = input.trim_start();
    let (name, rest) = if let Some(stripped) = input.strip_prefix('|') {
        let end = stripped.find('|')?;
        (stripped[..end].to_owned(), &stripped[end + 1..])
    } else {
        let end = input.find([' ', '\t', '\n', '('])?;
        (input[..end].to_owned(), &input[end..])
    };

    let rest = rest.trim_start();
    let after_args = skip_balanced(rest)?;
    let after_args = after_args.trim_start();

    if after_args.starts_with("Bool") {
        Some((name, SmtSort::Bool))
    } else if let Some(group) = after_args.strip_prefix("(_ BitVec ") {
        let end = group.find(')')?;
        let width = group[..end].trim().parse().ok()?;
        Some((name, SmtSort::BitVec(width)))
    } else {
        None
    }
}

/// Skips one balanced parenthesized group and returns the remainder.
fn skip_balanced(input: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in input.char_indices() {
        match c {
            '|' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&input[i + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrites module-rooted symbols (`<mod>_...`, `<mod>#...`) with a circuit
/// tag so several backends' definitions can share one solver context.
#[derive(Debug, Clone)]
pub struct SymbolRenamer {
    tag: String,
    pattern: Option<Regex>,
}

impl SymbolRenamer {
    /// A renamer for the given module names. `modules` may be empty, in which
    /// case renaming is the identity.
    #[must_use]
    pub fn new(tag: &str, modules: &[String]) -> Self {
        let pattern = if modules.is_empty() {
            None
        } else {
            let alternatives = modules
                .iter()
                .map(|m| regex::escape(m))
                .collect::<Vec<_>>()
                .join("|");
            // The trailing separator is consumed and re-emitted; the regex
            // engine has no lookahead.
            Some(
                Regex::new(&format!(r"\b({alternatives})([_#])"))
                    .expect("escaped module names form a valid pattern"),
            )
        };
        Self {
            tag: tag.to_owned(),
            pattern,
        }
    }

    /// The circuit tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Applies the rewrite to a symbol or to whole SMT-LIBv2 text. Lookup
    /// names and definitions go through this same function, so incidental
    /// rewrites inside wire names stay consistent.
    #[must_use]
    pub fn rename(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern
                .replace_all(text, format!("{}_${{1}}${{2}}", self.tag))
                .into_owned(),
            None => text.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
; SMT-LIBv2 description generated by Yosys
(declare-sort |counter_s| 0)
(define-fun |counter_is| ((state |counter_s|)) Bool true)
(define-fun |counter_n clk| ((state |counter_s|)) Bool (|counter#0| state))
(define-fun |counter_n count| ((state |counter_s|)) (_ BitVec 4) (|counter#1| state))
(define-fun |counter_t| ((state |counter_s|) (next_state |counter_s|)) Bool
  (= (|counter_n count| next_state) (bvadd (|counter_n count| state) #x1)))
"#;

    #[test]
    fn scrapes_sorts_from_definitions() {
        let table = FunctionTable::parse(SAMPLE);

        assert_eq!(table.sort_of("counter_n clk"), Some(SmtSort::Bool));
        assert_eq!(table.sort_of("counter_n count"), Some(SmtSort::BitVec(4)));
        assert_eq!(table.sort_of("counter_t"), Some(SmtSort::Bool));
        assert!(!table.contains("counter_s"));
    }

    #[test]
    fn renamer_prefixes_module_symbols() {
        let renamer = SymbolRenamer::new("c0", &["counter".to_owned()]);

        assert_eq!(renamer.rename("counter_t"), "c0_counter_t");
        assert_eq!(renamer.rename("counter_n clk"), "c0_counter_n clk");
        assert_eq!(renamer.rename("|counter#12|"), "|c0_counter#12|");
        assert_eq!(renamer.rename("recounter_t"), "recounter_t");
    }

    #[test]
    fn renamed_preamble_and_lookups_agree() {
        let renamer = SymbolRenamer::new("c1", &["counter".to_owned()]);
        let table = FunctionTable::parse(&renamer.rename(SAMPLE));

        let lookup = renamer.rename("counter_n count");
        assert_eq!(table.sort_of(&lookup), Some(SmtSort::BitVec(4)));
    }
}

//! Crossbar for the yosys CXXRTL backend.
//!
//! CXXRTL's `debug_info()` exposes one entry per net, with array elements as
//! separate objects and with its own class name mangling. This crossbar
//! turns those debug items into implementation items named in Verilator
//! style, which is what the downstream KLEE layout works with.

use std::collections::HashSet;

use crate::crossbar::verilator::VerilatorNaming;
use crate::error::IrError;
use crate::item::{self, ModuleItem};
use crate::view::ModelTreeView;

/// One row of the CXXRTL debug-info dump.
#[derive(Debug, Clone)]
pub struct DebugItem {
    /// Space-separated hierarchical name, as CXXRTL reports it.
    pub name: String,
    /// Width in bits.
    pub width: u32,
    /// Whether the object is writable and not an output (CXXRTL flags).
    pub writable_and_non_output: bool,
}

/// One implementation item of the generated C++ model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxImplItem {
    /// The CXXRTL-side name (array indices stripped).
    pub origin_name: String,
    /// The same item in Verilator naming style.
    pub cxx_name: String,
    /// Element count; 1 for primitives.
    pub array_size: usize,
    /// Width of one element in bits.
    pub bit_width: u32,
    /// Whether the item participates in the symbolic state.
    pub is_symbolic: bool,
}

/// Crossbar from CXXRTL debug items to implementation items.
pub struct YosysCxxCrossbar;

impl YosysCxxCrossbar {
    /// Mangles an identifier the way CXXRTL's backend does for class names.
    /// Only simple identifiers are handled.
    #[must_use]
    pub fn mangle_name(name: &str) -> String {
        name.replace('_', "__").replace('$', "_24_")
    }

    /// Converts debug items into implementation items.
    ///
    /// Elements of one array collapse onto a single entry; the flags of the
    /// first element seen stand for the whole array.
    pub fn preprocess(
        debug_items: &[DebugItem],
        model: &ModelTreeView,
    ) -> Result<Vec<CxxImplItem>, IrError> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();

        for debug_item in debug_items {
            let mut tokens: Vec<String> = debug_item.name.split(' ').map(ToOwned::to_owned).collect();
            let raw_item = tokens.pop().unwrap_or_default();
            let item_name = match item::array_element(&raw_item) {
                Some((base, _)) => base.to_owned(),
                None => raw_item,
            };

            let mut origin_tokens = tokens.clone();
            origin_tokens.push(item_name.clone());
            let origin_name = origin_tokens.join(" ");
            if !seen.insert(origin_name.clone()) {
                continue;
            }

            // CXXRTL names carry no top-module prefix; Verilator names do,
            // except for the top module's ports.
            let mut full_tokens = vec![model.top_module().to_owned()];
            full_tokens.extend(tokens);
            full_tokens.push(item_name);

            let paths = model.match_path(&full_tokens);
            let [path] = paths.as_slice() else {
                return Err(IrError::AmbiguousPath {
                    name: format!("{} {}", model.top_module(), origin_name),
                    count: paths.len(),
                });
            };

            let nodes = model.nodes_on_path(path)?;
            let tags: Vec<String> = nodes.iter().map(|n| n.tag.clone()).collect();
            let leaf = *nodes.last().expect("path has at least the leaf");
            let decl = model
                .find_decl(leaf, &path.item)
                .ok_or_else(|| IrError::UnknownItem {
                    module: model.module_type(leaf).to_owned(),
                    item: path.item.clone(),
                })?;

            result.push(CxxImplItem {
                origin_name,
                cxx_name: VerilatorNaming::merge(&tags, decl.name(), decl.is_port()),
                array_size: match &decl {
                    ModuleItem::Compound(c) => c.capacity(),
                    ModuleItem::Primitive(_) => 1,
                },
                bit_width: debug_item.width,
                is_symbolic: debug_item.writable_and_non_output
                    && (decl.is_register() || decl.is_port()),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangling_doubles_underscores() {
        assert_eq!(YosysCxxCrossbar::mangle_name("my_top"), "my__top");
        assert_eq!(YosysCxxCrossbar::mangle_name("a$b"), "a_24_b");
    }
}

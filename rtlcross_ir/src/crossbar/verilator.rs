//! Verilator's C++ name mangling and the crossbar built on it.

use crate::error::IrError;
use crate::item::ModuleItem;
use crate::view::{HierarchicalPath, ModelTreeView};

/// The escape sequences Verilator applies to hierarchical names.
pub struct VerilatorNaming;

impl VerilatorNaming {
    /// Hierarchy separator.
    pub const DOT: &'static str = "__DOT__";
    /// `[` of an arrayed instance.
    pub const LBRACKET: &'static str = "__BRA__";
    /// `]` of an arrayed instance.
    pub const RBRACKET: &'static str = "__KET__";
    /// `$` inside an identifier.
    pub const DOLLAR: &'static str = "__024";

    /// Escapes `$` the way Verilator does.
    #[must_use]
    pub fn escape(name: &str) -> String {
        name.replace('$', Self::DOLLAR)
    }

    /// Splits a mangled C++ name back into hierarchy tokens. A name without
    /// a separator is a port of the top module.
    #[must_use]
    pub fn split(full_name: &str) -> Vec<String> {
        let unescaped = full_name.replace(Self::DOLLAR, "$");
        if !unescaped.contains(Self::DOT) {
            return vec![unescaped];
        }
        unescaped
            .replace(Self::LBRACKET, "[")
            .replace(Self::RBRACKET, "]")
            .split(Self::DOT)
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Merges instance tags and an item name into the mangled C++ name.
    /// Ports of the top module carry no module prefix.
    #[must_use]
    pub fn merge(submodules: &[String], item: &str, is_port: bool) -> String {
        if submodules.len() == 1 && is_port {
            return Self::escape(item);
        }
        let mut tokens: Vec<&str> = submodules.iter().map(String::as_str).collect();
        tokens.push(item);
        let joined = tokens.join(Self::DOT);
        Self::escape(&joined.replace('[', Self::LBRACKET).replace(']', Self::RBRACKET))
    }

    /// Resolves a path to its mangled name and the item instance.
    pub fn find<'a>(
        path: &HierarchicalPath,
        model: &'a ModelTreeView,
    ) -> Result<(String, &'a ModuleItem), IrError> {
        let nodes = model.nodes_on_path(path)?;
        let tags: Vec<String> = nodes.iter().map(|n| n.tag.clone()).collect();
        let leaf = *nodes.last().expect("path has at least the leaf");
        let instance = model.find_instance(leaf, &path.item)?;
        Ok((
            Self::merge(&tags, instance.name(), instance.is_port()),
            instance,
        ))
    }
}

/// Maps mangled Verilator variable names onto model paths.
///
/// Verilator represents an array as one object whose name directly matches
/// the compound item, so no element collapsing is needed here.
#[derive(Debug, Clone)]
pub struct VerilatorCppCrossbar {
    paths: Vec<HierarchicalPath>,
}

impl VerilatorCppCrossbar {
    /// A crossbar over the given model paths.
    #[must_use]
    pub fn from_model(paths: Vec<HierarchicalPath>) -> Self {
        Self { paths }
    }

    /// Parses a mangled C++ name into the matching model paths.
    #[must_use]
    pub fn from_data(name: &str, model: &ModelTreeView) -> Self {
        let mut tokens = VerilatorNaming::split(name);
        if tokens.len() == 1 {
            // Port of the top module.
            tokens.insert(0, model.top_module().to_owned());
        }
        Self {
            paths: model.match_path(&tokens),
        }
    }

    /// The underlying paths.
    #[must_use]
    pub fn to_model(&self) -> &[HierarchicalPath] {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_ports_are_unprefixed() {
        let name = VerilatorNaming::merge(&["top".to_owned()], "clk", true);
        assert_eq!(name, "clk");
        assert_eq!(VerilatorNaming::split(&name), vec!["clk"]);
    }

    #[test]
    fn hierarchy_round_trips() {
        let tags = vec!["top".to_owned(), "u0".to_owned(), "inner[2]".to_owned()];
        let merged = VerilatorNaming::merge(&tags, "state$x", false);
        assert_eq!(
            merged,
            "top__DOT__u0__DOT__inner__BRA__2__KET____DOT__state__024x"
        );
        assert_eq!(
            VerilatorNaming::split(&merged),
            vec!["top", "u0", "inner[2]", "state$x"]
        );
    }

    #[test]
    fn split_inverts_merge() {
        let tags = vec!["top".to_owned(), "u0".to_owned()];
        let merged = VerilatorNaming::merge(&tags, "q", false);
        assert_eq!(VerilatorNaming::split(&merged), vec!["top", "u0", "q"]);
    }
}

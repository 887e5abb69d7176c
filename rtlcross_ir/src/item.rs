//! Items declared by a module: scalars/vectors and arrays.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Direction of a port in a module declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// `input`
    Input,
    /// `output`
    Output,
    /// `inout`
    Inout,
}

impl PortDirection {
    /// Parses the direction string used by the yosys JSON format.
    #[must_use]
    pub fn parse(direction: &str) -> Option<Self> {
        match direction {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            "inout" => Some(Self::Inout),
            _ => None,
        }
    }
}

/// Byte layout a backend attaches to an instantiated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Byte offset inside the backend's state block.
    pub offset: usize,
    /// Size in bytes.
    pub bytes: usize,
}

/// A scalar or vector item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveItem {
    /// Declared name.
    pub name: String,
    /// Width in bits.
    pub width: u32,
    /// Whether the item was declared `reg`.
    pub is_reg: bool,
    /// Port direction, or `None` for internal items.
    pub direction: Option<PortDirection>,
    /// Backend byte layout; present only on instantiated items.
    pub layout: Option<Layout>,
}

impl PrimitiveItem {
    /// A fresh declaration (no layout attached).
    pub fn new(name: impl Into<String>, width: u32, is_reg: bool, direction: Option<PortDirection>) -> Self {
        Self {
            name: name.into(),
            width,
            is_reg,
            direction,
            layout: None,
        }
    }

    /// Items wider than a machine word need word-splitting in byte-addressed
    /// backends.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        self.width > 64
    }
}

/// An array item. All elements share storage kind and width, and each element
/// carries a unique index. Arrays are never ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundItem {
    /// Declared name (without the element index).
    pub name: String,
    /// Whether the elements were declared `reg`.
    pub is_reg: bool,
    /// Width of one element in bits.
    pub element_width: u32,
    /// The registered element indices.
    pub element_indices: BTreeSet<u32>,
    /// Backend byte layout of the whole array; present only on instances.
    pub layout: Option<Layout>,
}

impl CompoundItem {
    /// A fresh array declaration with no elements yet.
    pub fn new(name: impl Into<String>, is_reg: bool, element_width: u32) -> Self {
        Self {
            name: name.into(),
            is_reg,
            element_width,
            element_indices: BTreeSet::new(),
            layout: None,
        }
    }

    /// Number of registered elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.element_indices.len()
    }
}

/// Any item a module declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleItem {
    /// Scalar or vector.
    Primitive(PrimitiveItem),
    /// Array.
    Compound(CompoundItem),
}

impl ModuleItem {
    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Primitive(p) => &p.name,
            Self::Compound(c) => &c.name,
        }
    }

    /// Whether the item holds state.
    #[must_use]
    pub const fn is_register(&self) -> bool {
        match self {
            Self::Primitive(p) => p.is_reg,
            Self::Compound(c) => c.is_reg,
        }
    }

    /// Whether the item is a port. Arrays never are.
    #[must_use]
    pub const fn is_port(&self) -> bool {
        match self {
            Self::Primitive(p) => p.direction.is_some(),
            Self::Compound(_) => false,
        }
    }

    /// Whether the item is an input port.
    #[must_use]
    pub fn is_input_port(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.direction == Some(PortDirection::Input))
    }

    /// Whether the item is an output port.
    #[must_use]
    pub fn is_output_port(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.direction == Some(PortDirection::Output))
    }

    /// Backend layout, when attached.
    #[must_use]
    pub const fn layout(&self) -> Option<Layout> {
        match self {
            Self::Primitive(p) => p.layout,
            Self::Compound(c) => c.layout,
        }
    }

    /// Declarations become instances by attaching (possibly empty) backend
    /// attributes.
    #[must_use]
    pub fn instantiate(&self, layout: Option<Layout>) -> Self {
        match self {
            Self::Primitive(p) => Self::Primitive(PrimitiveItem {
                layout,
                ..p.clone()
            }),
            Self::Compound(c) => Self::Compound(CompoundItem {
                layout,
                ..c.clone()
            }),
        }
    }
}

/// Splits a yosys net name of the shape `NAME[INDEX]` into its parts.
///
/// Yosys flattens both true arrays and escaped identifiers that merely look
/// like element selects into this shape; the model treats all of them as
/// array elements.
#[must_use]
pub fn array_element(name: &str) -> Option<(&str, u32)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^(?P<name>[!-~]+)\[(?P<index>\d+)\]$").expect("static regex"));
    let captures = pattern.captures(name)?;
    let base = captures.name("name").expect("named group").as_str();
    let index = captures.name("index").expect("named group").as_str().parse().ok()?;
    Some((base, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_elements_are_recognized() {
        assert_eq!(array_element("mem[3]"), Some(("mem", 3)));
        assert_eq!(array_element("a.b[0]"), Some(("a.b", 0)));
        assert_eq!(array_element("plain"), None);
        assert_eq!(array_element("half[x]"), None);
    }

    #[test]
    fn ports_are_primitive_only() {
        let port = ModuleItem::Primitive(PrimitiveItem::new("clk", 1, false, Some(PortDirection::Input)));
        assert!(port.is_port());
        assert!(port.is_input_port());

        let array = ModuleItem::Compound(CompoundItem::new("mem", true, 8));
        assert!(!array.is_port());
        assert!(array.is_register());
    }

    #[test]
    fn instantiation_attaches_layout() {
        let decl = ModuleItem::Primitive(PrimitiveItem::new("q", 4, true, None));
        assert!(decl.layout().is_none());

        let inst = decl.instantiate(Some(Layout { offset: 8, bytes: 1 }));
        assert_eq!(inst.layout(), Some(Layout { offset: 8, bytes: 1 }));
    }
}

//! Error kinds of the IR layer.

use thiserror::Error;

use crate::item::ModuleItem;

/// Errors raised while loading, instantiating, or translating models.
#[derive(Debug, Error)]
pub enum IrError {
    /// An external tool invocation failed.
    #[error(transparent)]
    Tool(#[from] rtlcross_common::ToolError),
    /// The tree-sitter layer rejected the source.
    #[error(transparent)]
    Verilog(#[from] rtlcross_common::verilog::VerilogError),
    /// The yosys JSON output did not deserialize.
    #[error("malformed yosys json: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The compilation unit uses yosys memories, which the model cannot
    /// represent.
    #[error("\"memories\" is not supported (module {module})")]
    MemoriesUnsupported {
        /// Module carrying the memories.
        module: String,
    },
    /// Zero or several top-level modules were found.
    #[error("multiple (or zero) top-level modules found ({})", tops.join(", "))]
    MultipleTops {
        /// The candidate tops.
        tops: Vec<String>,
    },
    /// Array elements with mismatched storage kinds.
    #[error("incompatible types of elements in {module}.{item}")]
    IncompatibleElementKind {
        /// Enclosing module.
        module: String,
        /// The compound item.
        item: String,
    },
    /// Array elements with mismatched widths.
    #[error("incompatible widths of elements in {module}.{item}")]
    IncompatibleElementWidth {
        /// Enclosing module.
        module: String,
        /// The compound item.
        item: String,
    },
    /// The same array index registered twice.
    #[error("duplicate index {index} in {module}.{item}")]
    DuplicateElementIndex {
        /// Enclosing module.
        module: String,
        /// The compound item.
        item: String,
        /// The repeated index.
        index: u32,
    },
    /// A name was instantiated that the module does not declare.
    #[error("'{item}' not found in module '{module}'")]
    UnknownItem {
        /// The module searched.
        module: String,
        /// The missing name.
        item: String,
    },
    /// A primitive item was instantiated twice.
    #[error("duplicate instantiation of {item}")]
    DuplicateInstantiation {
        /// The item name.
        item: String,
    },
    /// Lookup of an instantiated item failed. The declaration, when one
    /// exists, rides along so callers can tolerate optimized-out wires.
    #[error("item '{item}' is not instantiated")]
    ItemNotFound {
        /// The missing item name.
        item: String,
        /// Its declaration, if the module declares the name at all.
        decl: Option<Box<ModuleItem>>,
    },
    /// A path referenced a node that is not part of the tree.
    #[error("'{item}' is not addressed by a known tree node")]
    NodeNotFound {
        /// The item whose path failed to resolve.
        item: String,
    },
    /// A backend name matched an unexpected number of tree paths.
    #[error("\"{name}\" matches {count} paths (expected 1)")]
    AmbiguousPath {
        /// The backend name.
        name: String,
        /// How many paths matched.
        count: usize,
    },
    /// The item has no byte layout attached yet.
    #[error("item '{item}' carries no byte layout")]
    MissingLayout {
        /// The item name.
        item: String,
    },
}

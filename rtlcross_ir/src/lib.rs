//! Intermediate representation of loaded circuits.
//!
//! A compilation unit becomes a [`module::ModelDesign`] (the flat arena of
//! module declarations), instantiated into a [`view::ModelTreeView`] whose
//! nodes are module instances. [`crossbar`] translates between logical item
//! paths in that tree and the symbol layouts of the individual backends.

pub mod crossbar;
pub mod error;
pub mod item;
pub mod module;
pub mod view;

pub use error::IrError;
pub use item::{CompoundItem, Layout, ModuleItem, PortDirection, PrimitiveItem};
pub use module::{ModelDesign, ModuleDeclaration, ModuleId};
pub use view::{HierarchicalPath, ModelTreeView, NodeId, ViewKind};

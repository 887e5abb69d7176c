//! Module declarations and the flat design arena.
//!
//! Loading goes through yosys: the JSON dump provides ports, nets, and cell
//! instantiations, while the register set comes from the shared tree-sitter
//! scan of the source (names alone cannot tell a `reg` from a `wire`).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use serde::Deserialize;
use tracing::debug;

use rtlcross_common::verilog;

use crate::error::IrError;
use crate::item::{self, CompoundItem, ModuleItem, PortDirection, PrimitiveItem};

/// Index of a declaration inside its [`ModelDesign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

/// A module declared in the compilation unit.
#[derive(Debug, Clone)]
pub struct ModuleDeclaration {
    name: String,
    ports: AHashMap<String, PrimitiveItem>,
    internals: AHashMap<String, ModuleItem>,
    submodules: Vec<(String, String)>,
}

impl ModuleDeclaration {
    /// The module's own name (not an instance name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port declarations by name.
    #[must_use]
    pub fn ports(&self) -> &AHashMap<String, PrimitiveItem> {
        &self.ports
    }

    /// Internal item declarations by name (ports excluded).
    #[must_use]
    pub fn internals(&self) -> &AHashMap<String, ModuleItem> {
        &self.internals
    }

    /// `(instance name, module type name)` pairs of the submodules.
    #[must_use]
    pub fn submodules(&self) -> &[(String, String)] {
        &self.submodules
    }

    /// Finds the declaration of `name` among internals, then ports.
    #[must_use]
    pub fn find_decl(&self, name: &str) -> Option<ModuleItem> {
        self.internals.get(name).cloned().or_else(|| {
            self.ports
                .get(name)
                .map(|p| ModuleItem::Primitive(p.clone()))
        })
    }
}

/// The flat arena of all module declarations in one compilation unit.
#[derive(Debug)]
pub struct ModelDesign {
    modules: Vec<ModuleDeclaration>,
    index: AHashMap<String, ModuleId>,
    top: ModuleId,
}

/// Subset of the yosys JSON netlist format the model needs.
#[derive(Debug, Deserialize)]
struct YosysJson {
    #[serde(default)]
    modules: BTreeMap<String, YosysJsonModule>,
}

#[derive(Debug, Deserialize)]
struct YosysJsonModule {
    #[serde(default)]
    ports: BTreeMap<String, YosysJsonPort>,
    #[serde(default)]
    netnames: BTreeMap<String, YosysJsonNet>,
    #[serde(default)]
    cells: BTreeMap<String, YosysJsonCell>,
    #[serde(default)]
    memories: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YosysJsonPort {
    direction: String,
    bits: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YosysJsonNet {
    #[serde(default)]
    hide_name: u8,
    bits: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YosysJsonCell {
    #[serde(default)]
    hide_name: u8,
    #[serde(rename = "type")]
    kind: String,
}

impl ModelDesign {
    /// Loads a Verilog file: yosys provides the JSON netlist, tree-sitter the
    /// per-module register sets.
    pub fn from_verilog(path: &Path) -> Result<Arc<Self>, IrError> {
        let source = std::fs::read(path)?;
        let registers = verilog::registers_by_module(&source)?;
        let json = rtlcross_common::tool::verilog_to_json(path)?;
        let design = Self::from_json(&json, &registers)?;
        debug!(
            top = design.get(design.top()).name(),
            modules = design.modules.len(),
            "design loaded"
        );
        Ok(Arc::new(design))
    }

    /// Builds the design from a yosys JSON dump plus the register scan.
    pub fn from_json(
        json: &str,
        registers_by_module: &AHashMap<String, HashSet<String>>,
    ) -> Result<Self, IrError> {
        let parsed: YosysJson = serde_json::from_str(json)?;

        let mut modules = Vec::new();
        let mut index = AHashMap::new();
        // Top-level modules are exactly the modules that never appear in a
        // module instantiation, so reference counting the cell types is
        // enough to find them.
        let mut non_top: HashSet<String> = HashSet::new();

        for (module_name, details) in &parsed.modules {
            if details.memories.is_some() {
                return Err(IrError::MemoriesUnsupported {
                    module: module_name.clone(),
                });
            }

            let empty = HashSet::new();
            let register_names = registers_by_module.get(module_name).unwrap_or(&empty);

            let mut ports = AHashMap::new();
            for (port_name, port) in &details.ports {
                ports.insert(
                    port_name.clone(),
                    PrimitiveItem::new(
                        port_name.clone(),
                        port.bits.len() as u32,
                        false,
                        PortDirection::parse(&port.direction),
                    ),
                );
            }

            let mut internals: AHashMap<String, ModuleItem> = AHashMap::new();
            for (net_name, net) in &details.netnames {
                // hide_name marks nets yosys invented; they are noise here.
                if net.hide_name != 0 || details.ports.contains_key(net_name) {
                    continue;
                }
                let width = net.bits.len() as u32;
                match item::array_element(net_name) {
                    Some((array_name, element_index)) => {
                        register_array_element(
                            &mut internals,
                            module_name,
                            array_name,
                            register_names.contains(array_name),
                            element_index,
                            width,
                        )?;
                    }
                    None => {
                        internals.insert(
                            net_name.clone(),
                            ModuleItem::Primitive(PrimitiveItem::new(
                                net_name.clone(),
                                width,
                                register_names.contains(net_name),
                                None,
                            )),
                        );
                    }
                }
            }

            let mut submodules = Vec::new();
            for (cell_name, cell) in &details.cells {
                if cell.hide_name != 0 {
                    continue;
                }
                submodules.push((cell_name.clone(), cell.kind.clone()));
                non_top.insert(cell.kind.clone());
            }

            let id = ModuleId(modules.len());
            index.insert(module_name.clone(), id);
            modules.push(ModuleDeclaration {
                name: module_name.clone(),
                ports,
                internals,
                submodules,
            });
        }

        let tops: Vec<String> = modules
            .iter()
            .map(|m| m.name.clone())
            .filter(|name| !non_top.contains(name))
            .collect();
        if tops.len() != 1 {
            return Err(IrError::MultipleTops { tops });
        }
        let top = index[&tops[0]];

        Ok(Self {
            modules,
            index,
            top,
        })
    }

    /// The single top-level module.
    #[must_use]
    pub const fn top(&self) -> ModuleId {
        self.top
    }

    /// Resolves a declaration by arena id.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> &ModuleDeclaration {
        &self.modules[id.0]
    }

    /// Resolves a declaration by module name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ModuleId> {
        self.index.get(name).copied()
    }

    /// All module names of the unit.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }
}

/// Registers one `NAME[INDEX]` element into the module's compound item,
/// validating that every element agrees on storage kind and width.
fn register_array_element(
    internals: &mut AHashMap<String, ModuleItem>,
    module_name: &str,
    array_name: &str,
    is_reg: bool,
    element_index: u32,
    element_width: u32,
) -> Result<(), IrError> {
    let entry = internals
        .entry(array_name.to_owned())
        .or_insert_with(|| ModuleItem::Compound(CompoundItem::new(array_name, is_reg, element_width)));
    let ModuleItem::Compound(array) = entry else {
        return Err(IrError::IncompatibleElementKind {
            module: module_name.to_owned(),
            item: array_name.to_owned(),
        });
    };

    if is_reg != array.is_reg {
        return Err(IrError::IncompatibleElementKind {
            module: module_name.to_owned(),
            item: array_name.to_owned(),
        });
    }
    if element_width != array.element_width {
        return Err(IrError::IncompatibleElementWidth {
            module: module_name.to_owned(),
            item: array_name.to_owned(),
        });
    }
    if !array.element_indices.insert(element_index) {
        return Err(IrError::DuplicateElementIndex {
            module: module_name.to_owned(),
            item: array_name.to_owned(),
            index: element_index,
        });
    }
    Ok(())
}

//! Crossbar for the yosys `write_smt2` backend.
//!
//! An item is reached by composing hierarchy accessors
//! `|<type>_h <child instance>|` down the module path, then applying the item
//! accessor `|<type>_n <wirename>|`. Boolean-sorted accessors (1-bit wires)
//! are normalized to bit-vectors.

use rtlcross_smt::{FunctionTable, SmtSort, SymbolRenamer, Term, TypedTerm};

use crate::error::IrError;
use crate::item::{self, ModuleItem};
use crate::view::{HierarchicalPath, ModelTreeView};

/// A composed accessor: hierarchy steps, then the item function.
#[derive(Debug, Clone)]
pub struct SmtAccessor {
    hierarchy: Vec<String>,
    item_function: String,
    sort: SmtSort,
}

impl SmtAccessor {
    /// Applies the accessor chain to a state term.
    #[must_use]
    pub fn at_state(&self, state: &Term) -> TypedTerm {
        let mut current = state.clone();
        for step in &self.hierarchy {
            current = Term::app(step.clone(), vec![current]);
        }
        let value = Term::app(self.item_function.clone(), vec![current]);
        match self.sort {
            SmtSort::Bool => TypedTerm::new(
                Term::ite(value, Term::atom("#b1"), Term::atom("#b0")),
                1,
            ),
            SmtSort::BitVec(width) => TypedTerm::new(value, width),
        }
    }
}

/// Maps item paths onto the yosys SMT accessor functions.
#[derive(Debug, Clone)]
pub struct YosysSmtCrossbar {
    paths: Vec<HierarchicalPath>,
}

impl YosysSmtCrossbar {
    /// A crossbar over the given model paths.
    #[must_use]
    pub fn from_model(paths: Vec<HierarchicalPath>) -> Self {
        Self { paths }
    }

    /// Finds every path matching a backend name, which for this backend is
    /// the pair `(module type, item name)`. Array elements collapse onto
    /// their compound item.
    #[must_use]
    pub fn from_data(module_type: &str, item_name: &str, model: &ModelTreeView) -> Self {
        let item_name = match item::array_element(item_name) {
            Some((base, _)) => base,
            None => item_name,
        };
        let paths = model
            .filter_nodes(|node| model.module_type(node) == module_type)
            .into_iter()
            .filter(|node| model.find_decl(node, item_name).is_some())
            .map(|node| HierarchicalPath::new(node.id, item_name))
            .collect();
        Self { paths }
    }

    /// The underlying paths.
    #[must_use]
    pub fn to_model(&self) -> &[HierarchicalPath] {
        &self.paths
    }

    /// Builds the accessor chains for every path.
    ///
    /// Items the backend never defined a function for are tolerated when
    /// they are not registers: yosys optimized them out, and they read as
    /// constant zeros.
    pub fn to_data(
        &self,
        model: &ModelTreeView,
        functions: &FunctionTable,
        renamer: &SymbolRenamer,
    ) -> Result<Vec<Option<Vec<SmtAccessor>>>, IrError> {
        let mut result = Vec::new();
        for path in &self.paths {
            let nodes = model.nodes_on_path(path)?;
            let leaf = *nodes.last().expect("path has at least the leaf");

            let hierarchy: Vec<String> = nodes
                .windows(2)
                .map(|pair| {
                    renamer.rename(&format!(
                        "{}_h {}",
                        model.module_type(pair[0]),
                        pair[1].tag
                    ))
                })
                .collect();

            let instance = model.find_instance(leaf, &path.item)?;
            let element_names: Vec<String> = match instance {
                ModuleItem::Compound(c) => (0..c.capacity())
                    .map(|i| format!("{}[{i}]", c.name))
                    .collect(),
                ModuleItem::Primitive(p) => vec![p.name.clone()],
            };

            let module_type = model.module_type(leaf);
            let mut accessors = Vec::new();
            let mut missing = false;
            for element in &element_names {
                let function = renamer.rename(&format!("{module_type}_n {element}"));
                match functions.sort_of(&function) {
                    Some(sort) => accessors.push(SmtAccessor {
                        hierarchy: hierarchy.clone(),
                        item_function: function,
                        sort,
                    }),
                    None => {
                        missing = true;
                        break;
                    }
                }
            }

            if missing {
                if instance.is_register() {
                    return Err(IrError::ItemNotFound {
                        item: path.item.clone(),
                        decl: Some(Box::new(instance.clone())),
                    });
                }
                result.push(None);
            } else {
                result.push(Some(accessors));
            }
        }
        Ok(result)
    }
}

//! The instance tree of a loaded design.
//!
//! The root is the top-level module instance; children follow submodule
//! instantiation. Node identifiers derive from `(module, instance, parent)`,
//! so repeated instantiations of one module stay distinct.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::IrError;
use crate::item::{Layout, ModuleItem};
use crate::module::{ModelDesign, ModuleId};

/// Identifier of one node in a [`ModelTreeView`].
pub type NodeId = u64;

/// The unique address of an item inside a model: the leaf module instance
/// plus the item's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchicalPath {
    /// The leaf module instance.
    pub node: NodeId,
    /// The item name inside that instance.
    pub item: String,
}

impl HierarchicalPath {
    /// Addresses `item` inside `node`.
    pub fn new(node: NodeId, item: impl Into<String>) -> Self {
        Self {
            node,
            item: item.into(),
        }
    }
}

/// One module instance in the tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// The node's identifier.
    pub id: NodeId,
    /// Instance name; the root carries the module name itself.
    pub tag: String,
    /// The instantiated module.
    pub module: ModuleId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    port_instances: AHashMap<String, ModuleItem>,
    internal_instances: AHashMap<String, ModuleItem>,
}

/// Named views over the items of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Every instantiated item.
    AllItems,
    /// Internal items holding state.
    InternalRegisters,
    /// Internal items without state.
    InternalWires,
    /// Input ports of the top module.
    InputPorts,
    /// Output ports of the top module.
    OutputPorts,
    /// Inputs of the combinational core: input ports plus registers.
    CombinationInputs,
    /// Outputs of the combinational core: output ports plus registers.
    CombinationOutputs,
}

/// The instance tree, with per-node instantiated items.
#[derive(Debug, Clone)]
pub struct ModelTreeView {
    design: Arc<ModelDesign>,
    nodes: AHashMap<NodeId, TreeNode>,
    /// Breadth-first creation order, for deterministic iteration.
    order: Vec<NodeId>,
    root: NodeId,
}

fn node_id(module_name: &str, instance_name: &str, parent: Option<NodeId>) -> NodeId {
    let mut hasher = DefaultHasher::new();
    (module_name, instance_name, parent).hash(&mut hasher);
    hasher.finish()
}

impl ModelTreeView {
    /// Expands the design's top module into the full instance tree.
    #[must_use]
    pub fn from_design(design: Arc<ModelDesign>) -> Self {
        let top = design.top();
        let top_name = design.get(top).name().to_owned();
        let root_id = node_id(&top_name, &top_name, None);

        let mut nodes = AHashMap::new();
        let mut order = Vec::new();
        nodes.insert(
            root_id,
            TreeNode {
                id: root_id,
                tag: top_name,
                module: top,
                parent: None,
                children: Vec::new(),
                port_instances: AHashMap::new(),
                internal_instances: AHashMap::new(),
            },
        );
        order.push(root_id);

        let mut unvisited = vec![root_id];
        while let Some(parent_id) = unvisited.pop() {
            let module = nodes[&parent_id].module;
            for (instance_name, module_name) in design.get(module).submodules().to_vec() {
                let Some(child_module) = design.lookup(&module_name) else {
                    // Cells without a declaration in this unit (yosys
                    // primitives) contribute no tree nodes.
                    continue;
                };
                let child_id = node_id(&module_name, &instance_name, Some(parent_id));
                nodes.insert(
                    child_id,
                    TreeNode {
                        id: child_id,
                        tag: instance_name,
                        module: child_module,
                        parent: Some(parent_id),
                        children: Vec::new(),
                        port_instances: AHashMap::new(),
                        internal_instances: AHashMap::new(),
                    },
                );
                if let Some(parent) = nodes.get_mut(&parent_id) {
                    parent.children.push(child_id);
                }
                order.push(child_id);
                unvisited.push(child_id);
            }
        }

        Self {
            design,
            nodes,
            order,
            root: root_id,
        }
    }

    /// The backing design arena.
    #[must_use]
    pub fn design(&self) -> &Arc<ModelDesign> {
        &self.design
    }

    /// Name of the top-level module.
    #[must_use]
    pub fn top_module(&self) -> &str {
        &self.nodes[&self.root].tag
    }

    /// The root node's identifier.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// All nodes whose data satisfies the predicate, in creation order.
    pub fn filter_nodes(&self, mut predicate: impl FnMut(&TreeNode) -> bool) -> Vec<&TreeNode> {
        self.order
            .iter()
            .map(|id| &self.nodes[id])
            .filter(|node| predicate(node))
            .collect()
    }

    /// The module type name of a node.
    #[must_use]
    pub fn module_type(&self, node: &TreeNode) -> &str {
        self.design.get(node.module).name()
    }

    /// All nodes on the root-to-leaf path addressed by `path`.
    pub fn nodes_on_path(&self, path: &HierarchicalPath) -> Result<Vec<&TreeNode>, IrError> {
        let mut chain = Vec::new();
        let mut current = Some(path.node);
        while let Some(id) = current {
            let node = self.nodes.get(&id).ok_or_else(|| IrError::NodeNotFound {
                item: path.item.clone(),
            })?;
            chain.push(node);
            current = node.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Finds the declaration of `name` inside the node's module.
    #[must_use]
    pub fn find_decl(&self, node: &TreeNode, name: &str) -> Option<ModuleItem> {
        self.design.get(node.module).find_decl(name)
    }

    /// Finds the instantiated item `name` inside the node. A missing
    /// instance reports the declaration (when one exists) so callers can
    /// tolerate optimized-out non-registers.
    pub fn find_instance<'a>(&'a self, node: &'a TreeNode, name: &str) -> Result<&'a ModuleItem, IrError> {
        node.internal_instances
            .get(name)
            .or_else(|| node.port_instances.get(name))
            .ok_or_else(|| IrError::ItemNotFound {
                item: name.to_owned(),
                decl: self.find_decl(node, name).map(Box::new),
            })
    }

    /// Instantiates the item addressed by `path`, attaching the layout.
    ///
    /// Arrays may be instantiated once as a whole or once per element; the
    /// layouts must agree in the latter case.
    pub fn instantiate_item(&mut self, path: &HierarchicalPath, layout: Option<Layout>) -> Result<(), IrError> {
        let node_module = {
            let node = self.nodes.get(&path.node).ok_or_else(|| IrError::NodeNotFound {
                item: path.item.clone(),
            })?;
            node.module
        };
        let decl = self.design.get(node_module).find_decl(&path.item).ok_or_else(|| {
            IrError::UnknownItem {
                module: self.design.get(node_module).name().to_owned(),
                item: path.item.clone(),
            }
        })?;

        let node = self.nodes.get_mut(&path.node).expect("checked above");
        if decl.is_port() {
            node.port_instances
                .insert(path.item.clone(), decl.instantiate(layout));
        } else if let Some(existing) = node.internal_instances.get(&path.item) {
            match existing {
                ModuleItem::Compound(c) if c.layout == layout => {}
                _ => {
                    return Err(IrError::DuplicateInstantiation {
                        item: path.item.clone(),
                    });
                }
            }
        } else {
            node.internal_instances
                .insert(path.item.clone(), decl.instantiate(layout));
        }
        Ok(())
    }

    /// Instantiates every declared item of every node without attributes.
    /// Backends whose symbols need no byte layout use this to expose the
    /// whole model through the views.
    pub fn instantiate_all(&mut self) {
        for id in self.order.clone() {
            let module = self.nodes[&id].module;
            let decl = self.design.get(module);
            let ports: Vec<_> = decl.ports().keys().cloned().collect();
            let internals: Vec<_> = decl.internals().keys().cloned().collect();
            for name in ports {
                let _ = self.instantiate_item(&HierarchicalPath::new(id, name), None);
            }
            for name in internals {
                let _ = self.instantiate_item(&HierarchicalPath::new(id, name), None);
            }
        }
    }

    fn root_ports(&self, want_input: bool) -> Vec<(HierarchicalPath, &ModuleItem)> {
        let root = &self.nodes[&self.root];
        let mut items: Vec<_> = root
            .port_instances
            .iter()
            .filter(|(_, item)| {
                if want_input {
                    item.is_input_port()
                } else {
                    item.is_output_port()
                }
            })
            .map(|(name, item)| (HierarchicalPath::new(self.root, name.clone()), item))
            .collect();
        items.sort_by(|(a, _), (b, _)| a.item.cmp(&b.item));
        items
    }

    fn internals(&self) -> Vec<(HierarchicalPath, &ModuleItem)> {
        let mut items = Vec::new();
        for id in &self.order {
            let node = &self.nodes[id];
            let mut names: Vec<_> = node.internal_instances.keys().collect();
            names.sort();
            for name in names {
                items.push((
                    HierarchicalPath::new(*id, name.clone()),
                    &node.internal_instances[name],
                ));
            }
        }
        items
    }

    /// The items of one named view, in deterministic order.
    #[must_use]
    pub fn view(&self, kind: ViewKind) -> Vec<(HierarchicalPath, &ModuleItem)> {
        match kind {
            ViewKind::InputPorts => self.root_ports(true),
            ViewKind::OutputPorts => self.root_ports(false),
            ViewKind::InternalRegisters => self
                .internals()
                .into_iter()
                .filter(|(_, item)| item.is_register())
                .collect(),
            ViewKind::InternalWires => self
                .internals()
                .into_iter()
                .filter(|(_, item)| !item.is_register())
                .collect(),
            ViewKind::AllItems => {
                let mut items = self.root_ports(true);
                items.extend(self.root_ports(false));
                items.extend(self.internals());
                items
            }
            ViewKind::CombinationInputs => {
                let mut items = self.root_ports(true);
                items.extend(self.view(ViewKind::InternalRegisters));
                items
            }
            ViewKind::CombinationOutputs => {
                let mut items = self.root_ports(false);
                items.extend(self.view(ViewKind::InternalRegisters));
                items
            }
        }
    }

    /// Finds all item paths matching a token chain
    /// `[instance tags..., leaf tag, item name]` rooted anywhere in the tree.
    #[must_use]
    pub fn match_path(&self, tokens: &[String]) -> Vec<HierarchicalPath> {
        let Some((item_name, rest)) = tokens.split_last() else {
            return Vec::new();
        };
        let Some((leaf_tag, heads)) = rest.split_last() else {
            return Vec::new();
        };

        let mut candidates: Vec<&TreeNode> = self.order.iter().map(|id| &self.nodes[id]).collect();
        for head in heads {
            candidates = candidates
                .into_iter()
                .filter(|n| &n.tag == head)
                .flat_map(|n| n.children.iter().map(|id| &self.nodes[id]))
                .collect();
        }

        candidates
            .into_iter()
            .filter(|n| &n.tag == leaf_tag && self.find_decl(n, item_name).is_some())
            .map(|n| HierarchicalPath::new(n.id, item_name.clone()))
            .collect()
    }
}

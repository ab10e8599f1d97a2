//! Arena-backed scene graph.
//!
//! Nodes live in a [`slotmap`] arena owned by the [`Scene`]; parent/child
//! links are plain keys, so attaching and detaching is symmetric by
//! construction and there are no ownership cycles to manage. Traversal is
//! pre-order depth-first and world-matrix propagation visits parents before
//! children, forcing recomputation downward from the first dirty ancestor.
//!
//! A node optionally carries a [`Mesh`]: the drawable payload pairing a
//! shared [`Geometry`] with a shared [`Program`].

use std::cell::RefCell;
use std::rc::Rc;

use cgmath::Matrix4;
use log::warn;
use slotmap::{SlotMap, new_key_type};

use crate::device::DrawMode;
use crate::geometry::Geometry;
use crate::program::Program;
use crate::transform::Transform;

new_key_type! {
    /// Key of a node within a [`Scene`].
    pub struct NodeId;
}

/// Drawable payload of a scene node.
pub struct Mesh {
    pub geometry: Rc<RefCell<Geometry>>,
    pub program: Rc<RefCell<Program>>,
    pub mode: DrawMode,
    /// Manual position in the transparent draw queue. Nodes carrying this
    /// are spliced in at exactly this index instead of being depth-sorted.
    pub render_order: Option<usize>,
    pub frustum_culled: bool,
}

impl Mesh {
    pub fn new(geometry: Rc<RefCell<Geometry>>, program: Rc<RefCell<Program>>) -> Self {
        Self {
            geometry,
            program,
            mode: DrawMode::Triangles,
            render_order: None,
            frustum_culled: true,
        }
    }
}

/// One scene node: a transform, a visibility flag and an optional mesh.
pub struct Node {
    pub transform: Transform,
    pub visible: bool,
    pub mesh: Option<Mesh>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(mesh: Option<Mesh>) -> Self {
        Self {
            transform: Transform::new(),
            visible: true,
            mesh,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Owner of all nodes of one scene graph.
#[derive(Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, Node>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty (non-drawable) node. It stays a root until parented.
    pub fn create_node(&mut self) -> NodeId {
        self.nodes.insert(Node::new(None))
    }

    /// Create a node carrying a mesh. It stays a root until parented.
    pub fn create_mesh(&mut self, mesh: Mesh) -> NodeId {
        self.nodes.insert(Node::new(Some(mesh)))
    }

    /// Remove a node and its whole subtree from the arena.
    pub fn remove_node(&mut self, id: NodeId) {
        if !self.nodes.contains_key(id) {
            return;
        }
        self.set_parent(id, None);
        for descendant in self.descendants(id) {
            self.nodes.remove(descendant);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// All nodes that currently have no parent.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Reassign a node's parent, keeping both sides of the graph consistent:
    /// the child leaves its old parent's list, joins the new one exactly
    /// once, and `None` detaches it into a root. Parenting a node under its
    /// own descendant would form a cycle and is rejected with a warning.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        if !self.nodes.contains_key(child) {
            warn!("set_parent called with a removed child node");
            return;
        }
        if let Some(p) = parent {
            if !self.nodes.contains_key(p) {
                warn!("set_parent called with a removed parent node");
                return;
            }
            if p == child || self.is_ancestor(child, p) {
                warn!("set_parent would create a cycle, ignoring");
                return;
            }
        }

        let old_parent = self.nodes[child].parent;
        if old_parent == parent {
            return;
        }
        if let Some(old) = old_parent
            && let Some(node) = self.nodes.get_mut(old)
        {
            node.children.retain(|&c| c != child);
        }
        if let Some(new) = parent {
            let node = &mut self.nodes[new];
            debug_assert!(!node.children.contains(&child));
            node.children.push(child);
        }
        self.nodes[child].parent = parent;
        self.nodes[child].transform.world_dirty = true;
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.set_parent(child, Some(parent));
    }

    /// Detach `child` from `parent`. No-op (with a warning) when the pair is
    /// not actually linked; never leaves a dangling child entry behind.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        match self.nodes.get(child) {
            Some(node) if node.parent == Some(parent) => self.set_parent(child, None),
            _ => warn!("remove_child called for a node that is not a child of the given parent"),
        }
    }

    /// Whether `ancestor` appears on `node`'s parent chain.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Pre-order depth-first visit of `root` and all descendants. Returning
    /// `false` from the callback prunes that subtree.
    pub fn traverse<F>(&self, root: NodeId, f: &mut F)
    where
        F: FnMut(NodeId, &Node) -> bool,
    {
        let Some(node) = self.nodes.get(root) else {
            return;
        };
        if !f(root, node) {
            return;
        }
        for i in 0..node.children.len() {
            // Children re-fetched per step: the arena may not be mutated
            // through &self, but the callback may have captured state that
            // changes what it does per node.
            let child = self.nodes[root].children[i];
            self.traverse(child, f);
        }
    }

    /// Pre-order visit allowing node mutation. Structural mutation (adding
    /// or removing nodes) must go through [`Scene::descendants`] instead.
    pub fn traverse_mut<F>(&mut self, root: NodeId, f: &mut F)
    where
        F: FnMut(NodeId, &mut Node) -> bool,
    {
        let Some(node) = self.nodes.get_mut(root) else {
            return;
        };
        if !f(root, node) {
            return;
        }
        let children = self.nodes[root].children.clone();
        for child in children {
            self.traverse_mut(child, f);
        }
    }

    /// Id snapshot of `root` and all its descendants, pre-order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.traverse(root, &mut |id, _| {
            out.push(id);
            true
        });
        out
    }

    /// Recompute world matrices for the whole graph. Per node: recompose the
    /// local matrix when `matrix_auto_update` is set, then, if the node is
    /// dirty or any ancestor was, world = parent.world * local and every
    /// descendant is forced regardless of its own dirty state.
    pub fn update_matrix_world(&mut self) {
        for root in self.roots() {
            self.update_node_matrix_world(root, false);
        }
    }

    /// Propagation for one subtree; `force` recomputes even clean nodes.
    pub fn update_node_matrix_world(&mut self, id: NodeId, force: bool) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let parent_world = node
            .parent
            .and_then(|p| self.nodes.get(p))
            .map(|p| p.transform.world_matrix());

        let node = &mut self.nodes[id];
        if node.transform.matrix_auto_update {
            node.transform.compose();
        }
        let mut child_force = force;
        if node.transform.world_dirty || force {
            let world = match parent_world {
                Some(parent) => parent * node.transform.matrix(),
                None => node.transform.matrix(),
            };
            node.transform.set_world_matrix(world);
            node.transform.world_dirty = false;
            child_force = true;
        }
        let children = node.children.clone();
        for child in children {
            self.update_node_matrix_world(child, child_force);
        }
    }

    /// World matrix of a node as of the last propagation pass.
    pub fn world_matrix(&self, id: NodeId) -> Option<Matrix4<f32>> {
        self.nodes.get(id).map(|n| n.transform.world_matrix())
    }
}

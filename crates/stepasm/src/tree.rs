//! Product tree: products joined by placement links.
//!
//! Nodes live in a [`SlotMap`] arena and links refer to children by key, so
//! a deduplicated sub-assembly is one node reachable from several links.
//! Traversal state (visited sets) is always scoped to the traversal and
//! never stored on the nodes.

use crate::error::{AssemblyError, Result};
use crate::matrix::Matrix;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashSet;
use std::ops::{Index, IndexMut};

new_key_type! {
    /// Key for a product node in a [`ProductTree`].
    pub struct ProductKey;
}

/// One placement of a child inside its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    /// Occurrence (instance) name.
    pub name: String,
    /// Child-to-parent transform.
    pub transform: Matrix,
}

/// Edge from a parent to one child, carrying every placement of that child.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// The child node.
    pub child: ProductKey,
    /// Placements, in order.
    pub occurrences: Vec<Occurrence>,
}

impl Link {
    /// Number of placements.
    pub fn quantity(&self) -> usize {
        self.occurrences.len()
    }
}

/// A product node.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// Product name; may be filled from the first occurrence name.
    pub name: String,
    /// Document that owns this product.
    pub doc_id: u64,
    /// STEP file holding this product.
    pub doc_path: String,
    /// External per-node identifier (from `.arb` trees).
    pub id: u64,
    /// Where this product lives in a parsed or merged instance table.
    pub label_reference: Option<u64>,
    /// Mesh slot index; present only on leaves.
    pub geometry: Option<u32>,
    /// Distance from the tree root.
    pub depth: u32,
    /// Outgoing links.
    pub links: Vec<Link>,
}

impl Product {
    /// A product with no links, geometry or label.
    pub fn new(name: impl Into<String>, doc_id: u64, doc_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc_id,
            doc_path: doc_path.into(),
            id: 0,
            label_reference: None,
            geometry: None,
            depth: 0,
            links: Vec::new(),
        }
    }

    /// Set the external node id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Set the geometry slot.
    pub fn with_geometry(mut self, geometry: u32) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Set the label reference.
    pub fn with_label(mut self, label: u64) -> Self {
        self.label_reference = Some(label);
        self
    }

    /// Whether this product has at least one link.
    pub fn is_assembly(&self) -> bool {
        !self.links.is_empty()
    }
}

/// Handle to a mesh in a caller-owned store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Geometry store consulted to validate leaf geometry indices.
pub trait GeometrySource {
    /// Mesh for `index` in document `doc_id`, if it exists.
    fn mesh_slot(&self, doc_id: u64, index: u32) -> Option<MeshHandle>;
}

/// Arena of products with a designated root.
#[derive(Debug, Clone)]
pub struct ProductTree {
    nodes: SlotMap<ProductKey, Product>,
    root: ProductKey,
}

impl ProductTree {
    /// Create a tree holding only `root`.
    pub fn new(mut root: Product) -> Self {
        root.depth = 0;
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        Self { nodes, root }
    }

    /// The root node.
    pub fn root(&self) -> ProductKey {
        self.root
    }

    /// Number of distinct nodes (shared nodes count once).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node.
    pub fn get(&self, key: ProductKey) -> Option<&Product> {
        self.nodes.get(key)
    }

    /// Get a node mutably.
    pub fn get_mut(&mut self, key: ProductKey) -> Option<&mut Product> {
        self.nodes.get_mut(key)
    }

    /// Add a node that is not linked yet.
    pub fn insert(&mut self, product: Product) -> ProductKey {
        self.nodes.insert(product)
    }

    /// Link `child` under `parent` with no occurrences; returns the link
    /// index. The child's depth becomes the parent's plus one.
    pub fn add_link(&mut self, parent: ProductKey, child: ProductKey) -> usize {
        let depth = self.nodes[parent].depth + 1;
        self.nodes[child].depth = depth;
        let links = &mut self.nodes[parent].links;
        links.push(Link {
            child,
            occurrences: Vec::new(),
        });
        links.len() - 1
    }

    /// Append an occurrence to `parent.links[link]`.
    ///
    /// A blank occurrence name takes the child's name; a blank child name
    /// takes the occurrence's.
    pub fn add_occurrence(
        &mut self,
        parent: ProductKey,
        link: usize,
        name: &str,
        transform: Matrix,
    ) {
        let child = self.nodes[parent].links[link].child;
        let child_name = &mut self.nodes[child].name;
        let name = if name.trim().is_empty() {
            child_name.clone()
        } else {
            name.to_string()
        };
        if child_name.is_empty() {
            *child_name = name.clone();
        }
        self.nodes[parent].links[link]
            .occurrences
            .push(Occurrence { name, transform });
    }

    /// Link `child` under `parent` (reusing an existing link to the same
    /// child) and record one occurrence.
    pub fn place(&mut self, parent: ProductKey, child: ProductKey, name: &str, transform: Matrix) {
        let existing = self.nodes[parent]
            .links
            .iter()
            .position(|l| l.child == child);
        let link = match existing {
            Some(i) => i,
            None => self.add_link(parent, child),
        };
        self.add_occurrence(parent, link, name, transform);
    }

    /// Keys of the direct children, in link order.
    pub fn children(&self, key: ProductKey) -> impl Iterator<Item = ProductKey> + '_ {
        self.nodes[key].links.iter().map(|l| l.child)
    }

    /// Whether `key` has at least one link.
    pub fn is_assembly(&self, key: ProductKey) -> bool {
        self.nodes[key].is_assembly()
    }

    /// Whether any child lives in another document.
    pub fn is_decomposed(&self, key: ProductKey) -> bool {
        let doc = self.nodes[key].doc_id;
        self.children(key).any(|c| self.nodes[c].doc_id != doc)
    }

    /// Whether any child still lives inline in this node's document.
    pub fn is_decomposable(&self, key: ProductKey) -> bool {
        let doc = self.nodes[key].doc_id;
        self.children(key).any(|c| self.nodes[c].doc_id == doc)
    }

    /// Every distinct node reachable from the root, depth-first preorder.
    pub fn walk(&self) -> Vec<ProductKey> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            if !seen.insert(key) {
                continue;
            }
            order.push(key);
            // Reverse so the first link is visited first.
            stack.extend(self.children(key).collect::<Vec<_>>().into_iter().rev());
        }
        order
    }

    /// Move `key` into another document.
    ///
    /// Children that shared the node's old document move along with it
    /// (recursively); with `for_children`, every descendant moves.
    pub fn set_new_root(
        &mut self,
        key: ProductKey,
        doc_id: u64,
        doc_path: &str,
        for_children: bool,
    ) {
        let mut seen = HashSet::new();
        self.rehome(key, doc_id, doc_path, for_children, &mut seen);
    }

    fn rehome(
        &mut self,
        key: ProductKey,
        doc_id: u64,
        doc_path: &str,
        for_children: bool,
        seen: &mut HashSet<ProductKey>,
    ) {
        if !seen.insert(key) {
            return;
        }
        let old_doc = self.nodes[key].doc_id;
        let node = &mut self.nodes[key];
        node.doc_id = doc_id;
        node.doc_path = doc_path.to_string();
        node.label_reference = None;

        let children: Vec<ProductKey> = self.children(key).collect();
        for child in children {
            if for_children || self.nodes[child].doc_id == old_doc {
                self.rehome(child, doc_id, doc_path, for_children, seen);
            }
        }
    }

    /// Check that exactly the leaves carry geometry and that each index
    /// resolves in `source`.
    pub fn check_geometry(&self, source: &dyn GeometrySource) -> Result<()> {
        for key in self.walk() {
            let node = &self.nodes[key];
            match (node.is_assembly(), node.geometry) {
                (true, Some(_)) => {
                    return Err(AssemblyError::Geometry {
                        name: node.name.clone(),
                        message: "assembly carries a geometry index".into(),
                    });
                }
                (false, None) => {
                    return Err(AssemblyError::Geometry {
                        name: node.name.clone(),
                        message: "leaf has no geometry index".into(),
                    });
                }
                (false, Some(index)) if source.mesh_slot(node.doc_id, index).is_none() => {
                    return Err(AssemblyError::Geometry {
                        name: node.name.clone(),
                        message: format!("no mesh in slot {index} of document {}", node.doc_id),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether `other` has the same names, nesting and occurrence
    /// transforms (within `epsilon`), starting from both roots. Document
    /// ids, paths and labels are ignored.
    pub fn same_structure(&self, other: &ProductTree, epsilon: f64) -> bool {
        self.same_node(self.root, other, other.root, epsilon)
    }

    fn same_node(&self, a: ProductKey, other: &ProductTree, b: ProductKey, epsilon: f64) -> bool {
        let (na, nb) = (&self.nodes[a], &other.nodes[b]);
        if na.name != nb.name || na.links.len() != nb.links.len() {
            return false;
        }
        na.links.iter().zip(&nb.links).all(|(la, lb)| {
            la.quantity() == lb.quantity()
                && la.occurrences.iter().zip(&lb.occurrences).all(|(oa, ob)| {
                    oa.name == ob.name && oa.transform.approx_eq(&ob.transform, epsilon)
                })
                && self.same_node(la.child, other, lb.child, epsilon)
        })
    }
}

impl Index<ProductKey> for ProductTree {
    type Output = Product;

    fn index(&self, key: ProductKey) -> &Product {
        &self.nodes[key]
    }
}

impl IndexMut<ProductKey> for ProductTree {
    fn index_mut(&mut self, key: ProductKey) -> &mut Product {
        &mut self.nodes[key]
    }
}

//! Shared sub-assembly lookup.

use crate::tree::{Product, ProductKey, ProductTree};
use std::collections::HashSet;

/// Whether `existing` stands for the same product as `candidate`.
///
/// Labelled candidates match on label only; unlabelled candidates match on
/// the `(id, doc_id)` pair of an unlabelled node.
pub fn is_equivalent(existing: &Product, candidate: &Product) -> bool {
    match (existing.label_reference, candidate.label_reference) {
        (Some(a), Some(b)) => a == b,
        (None, None) => existing.id == candidate.id && existing.doc_id == candidate.doc_id,
        _ => false,
    }
}

/// Depth-first search below `root` (its links, not `root` itself) for a node
/// equivalent to `candidate`. The first hit wins.
pub fn find_equivalent(
    tree: &ProductTree,
    candidate: &Product,
    root: ProductKey,
) -> Option<ProductKey> {
    let mut seen = HashSet::new();
    search(tree, candidate, root, &mut seen)
}

fn search(
    tree: &ProductTree,
    candidate: &Product,
    node: ProductKey,
    seen: &mut HashSet<ProductKey>,
) -> Option<ProductKey> {
    for child in tree.children(node) {
        if !seen.insert(child) {
            continue;
        }
        if is_equivalent(&tree[child], candidate) {
            return Some(child);
        }
        if let Some(hit) = search(tree, candidate, child, seen) {
            return Some(hit);
        }
    }
    None
}

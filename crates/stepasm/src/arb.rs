//! `.arb` tree files: a product tree as nested JSON lists.
//!
//! ```text
//! [ [name, doc_id, geometry_or_false, doc_path, node_id],
//!   [ [[occ_name, [12 floats]], ...], <child subtree> ],
//!   ... one entry per link ...
//! ]
//! ```
//!
//! Labels are not persisted. Shared nodes are written once per link and
//! merged again on load through the matcher.

use crate::error::{AssemblyError, Result};
use crate::matcher::find_equivalent;
use crate::matrix::Matrix;
use crate::tree::{Product, ProductKey, ProductTree};
use serde_json::{json, Value};
use std::path::Path;

/// Serialize the whole tree.
pub fn to_list(tree: &ProductTree) -> Value {
    node_to_list(tree, tree.root())
}

/// Serialize the subtree below `key`.
pub fn node_to_list(tree: &ProductTree, key: ProductKey) -> Value {
    let product = &tree[key];
    let geometry = product.geometry.map_or(Value::Bool(false), |g| json!(g));
    let mut out = vec![json!([
        product.name,
        product.doc_id,
        geometry,
        product.doc_path,
        product.id
    ])];
    for link in &product.links {
        let occurrences: Vec<Value> = link
            .occurrences
            .iter()
            .map(|o| json!([o.name, o.transform.to_array()]))
            .collect();
        out.push(json!([occurrences, node_to_list(tree, link.child)]));
    }
    Value::Array(out)
}

/// Build a tree from its list form. Nodes with an equal `(id, doc_id)`
/// already present below the root are shared instead of duplicated.
pub fn from_list(value: &Value) -> Result<ProductTree> {
    let root = parse_node(value, 0)?;
    let mut tree = ProductTree::new(root);
    let key = tree.root();
    let mut path = vec![key];
    build_links(&mut tree, key, value, &mut path)?;
    Ok(tree)
}

/// Attach a separately stored subtree below `parent`.
///
/// The new link has no occurrences; the caller adds them with
/// [`ProductTree::add_occurrence`]. If an equivalent node already exists in
/// the tree it is linked instead and the subtree is not rebuilt. Returns the
/// linked node and whether it was newly created.
pub fn graft_list(
    tree: &mut ProductTree,
    parent: ProductKey,
    value: &Value,
) -> Result<(ProductKey, bool)> {
    let depth = tree[parent].depth + 1;
    let candidate = parse_node(value, depth)?;
    if let Some(existing) = find_equivalent(tree, &candidate, tree.root()) {
        tree.add_link(parent, existing);
        return Ok((existing, false));
    }
    let key = tree.insert(candidate);
    tree.add_link(parent, key);
    let mut path = vec![key];
    build_links(tree, key, value, &mut path)?;
    Ok((key, true))
}

/// Serialize to a JSON string.
pub fn to_string(tree: &ProductTree) -> String {
    to_list(tree).to_string()
}

/// Parse a JSON string.
pub fn from_str(text: &str) -> Result<ProductTree> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| AssemblyError::Arb(format!("invalid JSON: {e}")))?;
    from_list(&value)
}

/// Read a `.arb` file.
pub fn read_arb(path: impl AsRef<Path>) -> Result<ProductTree> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| AssemblyError::io(path, e))?;
    from_str(&text)
}

/// Write a `.arb` file.
pub fn write_arb(tree: &ProductTree, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_string(tree)).map_err(|e| AssemblyError::io(path, e))
}

fn build_links(
    tree: &mut ProductTree,
    node: ProductKey,
    value: &Value,
    path: &mut Vec<ProductKey>,
) -> Result<()> {
    let entries = as_array(value, "node")?;
    for entry in &entries[1..] {
        let link = as_array(entry, "link")?;
        let [occurrences, subtree] = link else {
            return Err(AssemblyError::Arb(format!(
                "link must have 2 elements, got {}",
                link.len()
            )));
        };

        let depth = tree[node].depth + 1;
        let candidate = parse_node(subtree, depth)?;
        let existing = find_equivalent(tree, &candidate, tree.root());
        if let Some(found) = existing {
            if path.contains(&found) {
                return Err(AssemblyError::Arb(format!(
                    "'{}' contains itself",
                    candidate.name
                )));
            }
        }
        let child = existing.unwrap_or_else(|| tree.insert(candidate));

        let index = tree.add_link(node, child);
        for occurrence in as_array(occurrences, "occurrence list")? {
            let (name, transform) = parse_occurrence(occurrence)?;
            tree.add_occurrence(node, index, &name, transform);
        }

        if existing.is_none() {
            path.push(child);
            build_links(tree, child, subtree, path)?;
            path.pop();
        }
    }
    Ok(())
}

fn parse_node(value: &Value, depth: u32) -> Result<Product> {
    let entries = as_array(value, "node")?;
    let head = entries
        .first()
        .ok_or_else(|| AssemblyError::Arb("empty node".into()))?;
    let fields = as_array(head, "node header")?;
    if fields.len() != 5 {
        return Err(AssemblyError::Arb(format!(
            "node header must have 5 fields, got {}",
            fields.len()
        )));
    }

    let name = optional_str(&fields[0], "name")?;
    let doc_id = as_u64(&fields[1], "doc_id")?;
    let geometry = match &fields[2] {
        Value::Bool(false) | Value::Null => None,
        other => {
            let index = as_u64(other, "geometry")?;
            Some(u32::try_from(index).map_err(|_| {
                AssemblyError::Arb(format!("geometry index {index} out of range"))
            })?)
        }
    };
    let doc_path = optional_str(&fields[3], "doc_path")?;
    let id = match &fields[4] {
        Value::Null => 0,
        other => as_u64(other, "node id")?,
    };

    let mut product = Product::new(name, doc_id, doc_path).with_id(id);
    product.geometry = geometry;
    product.depth = depth;
    Ok(product)
}

fn parse_occurrence(value: &Value) -> Result<(String, Matrix)> {
    let pair = as_array(value, "occurrence")?;
    let [name, values] = pair else {
        return Err(AssemblyError::Arb(format!(
            "occurrence must have 2 elements, got {}",
            pair.len()
        )));
    };
    let name = optional_str(name, "occurrence name")?;
    let floats = as_array(values, "transform")?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| AssemblyError::Arb(format!("non-numeric transform value {v}")))
        })
        .collect::<Result<Vec<f64>>>()?;
    let transform = Matrix::from_slice(&floats).ok_or_else(|| {
        AssemblyError::Arb(format!("transform must have 12 values, got {}", floats.len()))
    })?;
    Ok((name, transform))
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| AssemblyError::Arb(format!("{what} must be a list, got {value}")))
}

fn as_u64(value: &Value, what: &str) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| AssemblyError::Arb(format!("{what} must be a non-negative integer, got {value}")))
}

fn optional_str(value: &Value, what: &str) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        other => Err(AssemblyError::Arb(format!("{what} must be a string, got {other}"))),
    }
}

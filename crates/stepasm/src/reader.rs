//! Assembly structure of a parsed STEP file.
//!
//! Finds the root product definition, follows
//! `NEXT_ASSEMBLY_USAGE_OCCURRENCE` records to build a [`ProductTree`], and
//! recovers each usage's placement from its
//! `CONTEXT_DEPENDENT_SHAPE_REPRESENTATION` → `ITEM_DEFINED_TRANSFORMATION`
//! chain.

use crate::error::{AssemblyError, Result};
use crate::matcher::find_equivalent;
use crate::matrix::{Matrix, Placement};
use crate::tree::{Product, ProductKey, ProductTree};
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use stepasm_part21::{InstanceTable, ParamsExt, StepError};

pub(crate) const NAUO: &str = "NEXT_ASSEMBLY_USAGE_OCCURRENCE";
pub(crate) const PRODUCT_DEFINITION: &str = "PRODUCT_DEFINITION";
pub(crate) const PRODUCT_DEFINITION_SHAPE: &str = "PRODUCT_DEFINITION_SHAPE";
pub(crate) const SHAPE_DEFINITION_REPRESENTATION: &str = "SHAPE_DEFINITION_REPRESENTATION";
pub(crate) const CDSR: &str = "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION";
pub(crate) const RRWT: &str = "REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION";
pub(crate) const IDT: &str = "ITEM_DEFINED_TRANSFORMATION";
const AXIS2_PLACEMENT_3D: &str = "AXIS2_PLACEMENT_3D";

const PRODUCT_DEFINITION_KINDS: &[&str] = &[
    PRODUCT_DEFINITION,
    "PRODUCT_DEFINITION_WITH_ASSOCIATED_DOCUMENTS",
];
const FORMATION_KINDS: &[&str] = &[
    "PRODUCT_DEFINITION_FORMATION",
    "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE",
];

/// One `NEXT_ASSEMBLY_USAGE_OCCURRENCE` and the instances that place it.
#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    /// The usage occurrence instance.
    pub id: u64,
    /// Relating (parent) product definition.
    pub parent: u64,
    /// Related (child) product definition.
    pub child: u64,
    /// Occurrence name.
    pub name: String,
    /// Child-to-parent placement; identity when no placement is recorded.
    pub transform: Matrix,
    /// The usage plus its placement shape, shape-representation link,
    /// transformation relationship and item transformation, when present.
    pub structure: Vec<u64>,
}

/// Product tree of one file plus the usage records it was built from.
#[derive(Debug, Clone)]
pub struct AssemblyStructure {
    /// Tree whose labels are product definition ids.
    pub tree: ProductTree,
    /// Every usage occurrence, in file order.
    pub usages: Vec<Usage>,
}

impl AssemblyStructure {
    /// Usages whose parent is `pd`, in file order.
    pub fn usages_of(&self, pd: u64) -> impl Iterator<Item = &Usage> + '_ {
        self.usages.iter().filter(move |u| u.parent == pd)
    }
}

/// Root product definition of `table`.
///
/// With usage occurrences, the root is the single parent that is never a
/// child; otherwise it is the first `PRODUCT_DEFINITION`.
pub fn find_root(table: &InstanceTable, path: &Path) -> Result<u64> {
    let usages = table.typeinst(NAUO);
    if usages.is_empty() {
        return table
            .first_of_type(PRODUCT_DEFINITION)
            .ok_or_else(|| AssemblyError::NoRoot {
                path: path.to_path_buf(),
            });
    }

    let mut parents = Vec::new();
    let mut children = HashSet::new();
    for &id in usages {
        let args = table
            .decode_record(id, NAUO)
            .map_err(|e| AssemblyError::step(path, e))?;
        let at = |e: StepError| AssemblyError::step(path, e.at_entity(id));
        let parent = args.entity_ref(3).map_err(at)?;
        let child = args.entity_ref(4).map_err(at)?;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        children.insert(child);
    }

    let roots: Vec<u64> = parents.into_iter().filter(|p| !children.contains(p)).collect();
    match roots.as_slice() {
        [root] => Ok(*root),
        [] => Err(AssemblyError::NoRoot {
            path: path.to_path_buf(),
        }),
        _ => Err(AssemblyError::MultiRoot {
            path: path.to_path_buf(),
            roots,
        }),
    }
}

/// Name of the `PRODUCT` behind a product definition.
pub fn product_name(table: &InstanceTable, pd: u64) -> std::result::Result<String, StepError> {
    let (_, args) = table.decode_any(pd, PRODUCT_DEFINITION_KINDS)?;
    let formation = args.entity_ref(2).map_err(|e| e.at_entity(pd))?;
    let (_, args) = table.decode_any(formation, FORMATION_KINDS)?;
    let product = args.entity_ref(2).map_err(|e| e.at_entity(formation))?;
    let args = table.decode_record(product, "PRODUCT")?;
    let name = args.string(1).map_err(|e| e.at_entity(product))?;
    if name.is_empty() {
        Ok(args.string(0).map_err(|e| e.at_entity(product))?.to_string())
    } else {
        Ok(name.to_string())
    }
}

/// Every product definition, in file order.
pub fn product_definitions(table: &InstanceTable) -> Vec<u64> {
    table
        .iter()
        .filter(|i| PRODUCT_DEFINITION_KINDS.iter().any(|kw| i.has_keyword(kw)))
        .map(|i| i.id)
        .collect()
}

/// Distinct product definitions used by `pd`, in first-seen usage order.
pub fn child_definitions(table: &InstanceTable, pd: u64) -> Vec<u64> {
    let mut children = Vec::new();
    for &id in table.typeinst(NAUO) {
        let Ok(args) = table.decode_record(id, NAUO) else {
            continue;
        };
        if args.entity_ref(3).ok() != Some(pd) {
            continue;
        }
        if let Ok(child) = args.entity_ref(4) {
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }
    children
}

/// Shape representation used by `pd`, reached through
/// `PRODUCT_DEFINITION_SHAPE` → `SHAPE_DEFINITION_REPRESENTATION`.
pub fn shape_representation_of(table: &InstanceTable, pd: u64) -> Option<u64> {
    let shapes: Vec<u64> = table
        .typeinst(PRODUCT_DEFINITION_SHAPE)
        .iter()
        .copied()
        .filter(|&pds| {
            table
                .decode_record(pds, PRODUCT_DEFINITION_SHAPE)
                .ok()
                .and_then(|a| a.entity_ref(2).ok())
                == Some(pd)
        })
        .collect();
    table
        .typeinst(SHAPE_DEFINITION_REPRESENTATION)
        .iter()
        .find_map(|&sdr| {
            let args = table.decode_record(sdr, SHAPE_DEFINITION_REPRESENTATION).ok()?;
            let definition = args.entity_ref(0).ok()?;
            if shapes.contains(&definition) {
                args.entity_ref(1).ok()
            } else {
                None
            }
        })
}

/// Build the product tree of `table`.
///
/// Every node is labelled with its product definition id and carries
/// `doc_id` / `doc_path`. Leaves get geometry slots numbered from 1 in
/// depth-first order.
pub fn read_assembly(
    table: &InstanceTable,
    doc_id: u64,
    doc_path: impl AsRef<Path>,
) -> Result<AssemblyStructure> {
    let path = doc_path.as_ref();
    let path_str = path.to_string_lossy().into_owned();
    let root_pd = find_root(table, path)?;
    let usages = collect_usages(table).map_err(|e| AssemblyError::step(path, e))?;

    let name = product_name(table, root_pd).map_err(|e| AssemblyError::step(path, e))?;
    let mut tree = ProductTree::new(
        Product::new(name, doc_id, path_str.clone())
            .with_id(root_pd)
            .with_label(root_pd),
    );

    let mut builder = Builder {
        table,
        path,
        path_str: &path_str,
        doc_id,
        usages: &usages,
        stack: vec![root_pd],
    };
    let root = tree.root();
    builder.expand(&mut tree, root, root_pd)?;

    let mut slot = 0u32;
    for key in tree.walk() {
        if !tree.is_assembly(key) {
            slot += 1;
            tree[key].geometry = Some(slot);
        }
    }

    Ok(AssemblyStructure { tree, usages })
}

/// Parse `path` and build its product tree.
pub fn read_assembly_file(path: impl AsRef<Path>, doc_id: u64) -> Result<AssemblyStructure> {
    let path = path.as_ref();
    let table = stepasm_part21::parse_file(path).map_err(|e| AssemblyError::step(path, e))?;
    read_assembly(&table, doc_id, path)
}

struct Builder<'a> {
    table: &'a InstanceTable,
    path: &'a Path,
    path_str: &'a str,
    doc_id: u64,
    usages: &'a [Usage],
    stack: Vec<u64>,
}

impl Builder<'_> {
    fn expand(&mut self, tree: &mut ProductTree, key: ProductKey, pd: u64) -> Result<()> {
        let usages = self.usages;
        for usage in usages.iter().filter(|u| u.parent == pd) {
            if self.stack.contains(&usage.child) {
                return Err(AssemblyError::step(
                    self.path,
                    StepError::parser(Some(usage.id), "assembly usage cycle"),
                ));
            }

            let name = product_name(self.table, usage.child)
                .map_err(|e| AssemblyError::step(self.path, e))?;
            let candidate = Product::new(name, self.doc_id, self.path_str)
                .with_id(usage.child)
                .with_label(usage.child);
            let existing = find_equivalent(tree, &candidate, tree.root());
            let child = existing.unwrap_or_else(|| tree.insert(candidate));
            tree.place(key, child, &usage.name, usage.transform);

            if existing.is_none() {
                self.stack.push(usage.child);
                self.expand(tree, child, usage.child)?;
                self.stack.pop();
            }
        }
        Ok(())
    }
}

fn collect_usages(table: &InstanceTable) -> std::result::Result<Vec<Usage>, StepError> {
    // Placement chain indices: PDS by its definition, CDSR by its PDS.
    let mut shape_of: HashMap<u64, u64> = HashMap::new();
    for &pds in table.typeinst(PRODUCT_DEFINITION_SHAPE) {
        let args = table.decode_record(pds, PRODUCT_DEFINITION_SHAPE)?;
        if let Ok(definition) = args.entity_ref(2) {
            shape_of.entry(definition).or_insert(pds);
        }
    }
    let mut cdsr_of: HashMap<u64, u64> = HashMap::new();
    for &cdsr in table.typeinst(CDSR) {
        let args = table.decode_record(cdsr, CDSR)?;
        let shape = args.entity_ref(1).map_err(|e| e.at_entity(cdsr))?;
        cdsr_of.entry(shape).or_insert(cdsr);
    }

    let mut usages = Vec::new();
    for &id in table.typeinst(NAUO) {
        let args = table.decode_record(id, NAUO)?;
        let parent = args.entity_ref(3).map_err(|e| e.at_entity(id))?;
        let child = args.entity_ref(4).map_err(|e| e.at_entity(id))?;
        let name = args.string(1).map_err(|e| e.at_entity(id))?.to_string();

        let mut structure = vec![id];
        let mut transform = Matrix::IDENTITY;
        if let Some(&pds) = shape_of.get(&id) {
            structure.push(pds);
            if let Some(&cdsr) = cdsr_of.get(&pds) {
                structure.push(cdsr);
                let rel = table
                    .decode_record(cdsr, CDSR)?
                    .entity_ref(0)
                    .map_err(|e| e.at_entity(cdsr))?;
                structure.push(rel);
                if let Some(t) = usage_transform(table, rel, &mut structure)? {
                    transform = t;
                }
            }
        }
        if structure.len() == 1 {
            tracing::debug!("usage #{id} has no placement, using identity");
        }

        usages.push(Usage {
            id,
            parent,
            child,
            name,
            transform,
            structure,
        });
    }
    Ok(usages)
}

/// Transform carried by a `REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION`
/// record: `T(item_2) * T(item_1)^-1`.
fn usage_transform(
    table: &InstanceTable,
    relationship: u64,
    structure: &mut Vec<u64>,
) -> std::result::Result<Option<Matrix>, StepError> {
    let Some(params) = table.require(relationship)?.params_of(RRWT) else {
        return Ok(None);
    };
    let args = stepasm_part21::parse_params(params).map_err(|e| e.at_entity(relationship))?;
    let idt = args.entity_ref(0).map_err(|e| e.at_entity(relationship))?;
    if table.insttype(idt) != Some(IDT) {
        tracing::warn!("#{relationship}: transformation #{idt} is not an {IDT}, ignoring");
        return Ok(None);
    }
    structure.push(idt);

    let args = table.decode(idt, IDT)?;
    let item_1 = args.entity_ref(2).map_err(|e| e.at_entity(idt))?;
    let item_2 = args.entity_ref(3).map_err(|e| e.at_entity(idt))?;
    let (Some(from), Some(to)) = (placement(table, item_1)?, placement(table, item_2)?) else {
        tracing::warn!("#{idt}: unsupported placement items, using identity");
        return Ok(None);
    };
    let from = Matrix::from_placement(&from);
    let to = Matrix::from_placement(&to);
    // Placements are rigid, so the inverse always exists.
    Ok(from.inverse().map(|inv| to * inv))
}

/// Decode an `AXIS2_PLACEMENT_3D`; `None` for other placement kinds.
pub(crate) fn placement(
    table: &InstanceTable,
    id: u64,
) -> std::result::Result<Option<Placement>, StepError> {
    if table.insttype(id) != Some(AXIS2_PLACEMENT_3D) {
        return Ok(None);
    }
    let args = table.decode(id, AXIS2_PLACEMENT_3D)?;
    let origin = args.entity_ref(1).map_err(|e| e.at_entity(id))?;
    let location = vector(table, origin, "CARTESIAN_POINT")?;
    let optional_direction =
        |index: usize, fallback: Vector3<f64>| -> std::result::Result<Vector3<f64>, StepError> {
            match args.arg(index) {
                Ok(v) if v.is_null() => Ok(fallback),
                Ok(_) => {
                    let dir = args.entity_ref(index).map_err(|e| e.at_entity(id))?;
                    vector(table, dir, "DIRECTION")
                }
                // Two-argument placements omit both directions.
                Err(_) => Ok(fallback),
            }
        };
    let axis = optional_direction(2, Vector3::z())?;
    let ref_direction = optional_direction(3, Vector3::x())?;
    Ok(Some(Placement {
        location,
        axis,
        ref_direction,
    }))
}

fn vector(
    table: &InstanceTable,
    id: u64,
    keyword: &str,
) -> std::result::Result<Vector3<f64>, StepError> {
    let args = table.decode(id, keyword)?;
    let values = args.reals(1).map_err(|e| e.at_entity(id))?;
    let get = |i: usize| values.get(i).copied().unwrap_or(0.0);
    Ok(Vector3::new(get(0), get(1), get(2)))
}

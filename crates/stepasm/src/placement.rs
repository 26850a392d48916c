//! Synthesized placement records for cross-document occurrences.
//!
//! Each occurrence becomes a block of [`BLOCK_LEN`] consecutive instances:
//!
//! | offset | instance |
//! |---|---|
//! | 0 | `CONTEXT_DEPENDENT_SHAPE_REPRESENTATION` |
//! | 1 | representation relationship with transformation (complex) |
//! | 2 | `ITEM_DEFINED_TRANSFORMATION` (identity frame → placed frame) |
//! | 3 | `PRODUCT_DEFINITION_SHAPE` of the usage |
//! | 4 | `NEXT_ASSEMBLY_USAGE_OCCURRENCE` |
//! | 5..8 | placed `AXIS2_PLACEMENT_3D` with its point and directions |
//! | 9..12 | identity `AXIS2_PLACEMENT_3D` with its point and directions |

use crate::matrix::{Matrix, Placement};
use nalgebra::Vector3;
use stepasm_part21::{format_real_list, format_string, Instance, InstanceKind, Record};

/// Instances per synthesized occurrence.
pub const BLOCK_LEN: u64 = 13;

/// One cross-document occurrence ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementBlock {
    /// First id of the block.
    pub first_id: u64,
    /// Sequence number written as the usage id.
    pub sequence: usize,
    /// Occurrence name.
    pub name: String,
    /// Merged id of the parent product definition.
    pub parent: u64,
    /// Merged id of the child product definition.
    pub child: u64,
    /// Parent shape representation, if one was found.
    pub parent_rep: Option<u64>,
    /// Child shape representation, if one was found.
    pub child_rep: Option<u64>,
    /// Child-to-parent transform.
    pub transform: Matrix,
}

impl PlacementBlock {
    /// Id of the usage occurrence inside the block.
    pub fn usage_id(&self) -> u64 {
        self.first_id + 4
    }

    /// The instances of this block, in id order.
    pub fn instances(&self) -> Vec<Instance> {
        let e = |n: u64| self.first_id + n - 1;
        let rep = |r: Option<u64>| r.map_or_else(|| "$".to_string(), |id| format!("#{id}"));

        let mut out = vec![
            simple(
                e(1),
                "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION",
                format!("#{},#{}", e(2), e(4)),
            ),
            Instance {
                id: e(2),
                kind: InstanceKind::Complex(vec![
                    Record::new(
                        "REPRESENTATION_RELATIONSHIP",
                        format!("'','',{},{}", rep(self.child_rep), rep(self.parent_rep)),
                    ),
                    Record::new(
                        "REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION",
                        format!("#{}", e(3)),
                    ),
                    Record::new("SHAPE_REPRESENTATION_RELATIONSHIP", ""),
                ]),
            },
            simple(
                e(3),
                "ITEM_DEFINED_TRANSFORMATION",
                format!("'','',#{},#{}", e(10), e(6)),
            ),
            simple(
                e(4),
                "PRODUCT_DEFINITION_SHAPE",
                format!("'Placement','Placement of an item',#{}", e(5)),
            ),
            simple(
                e(5),
                "NEXT_ASSEMBLY_USAGE_OCCURRENCE",
                format!(
                    "{},{},'',#{},#{},$",
                    format_string(&self.sequence.to_string()),
                    format_string(&self.name),
                    self.parent,
                    self.child
                ),
            ),
        ];
        out.extend(axis_placement(e(6), &self.transform.to_placement()));
        out.extend(axis_placement(e(10), &Placement::default()));
        out
    }
}

fn simple(id: u64, keyword: &str, params: String) -> Instance {
    Instance {
        id,
        kind: InstanceKind::Simple(Record::new(keyword, params)),
    }
}

/// `AXIS2_PLACEMENT_3D` at `id` followed by its point and two directions.
fn axis_placement(id: u64, placement: &Placement) -> [Instance; 4] {
    let (x, _, z) = placement.frame();
    let coords = |v: &Vector3<f64>| format_real_list(&[v.x, v.y, v.z]);
    [
        simple(
            id,
            "AXIS2_PLACEMENT_3D",
            format!("'',#{},#{},#{}", id + 1, id + 2, id + 3),
        ),
        simple(
            id + 1,
            "CARTESIAN_POINT",
            format!("'',{}", coords(&placement.location)),
        ),
        simple(id + 2, "DIRECTION", format!("'',{}", coords(&z))),
        simple(id + 3, "DIRECTION", format!("'',{}", coords(&x))),
    ]
}

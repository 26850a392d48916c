//! Merge the STEP files of a product tree into one assembly file.
//!
//! Every distinct `doc_path` is parsed once and re-emitted with its ids
//! shifted past everything already written. Cross-document links then get a
//! synthesized placement block per occurrence (see [`crate::placement`]).

use crate::config::ComposeConfig;
use crate::error::{AssemblyError, Result};
use crate::placement::{PlacementBlock, BLOCK_LEN};
use crate::reader::{
    child_definitions, find_root, product_definitions, product_name, shape_representation_of,
};
use crate::tree::{ProductKey, ProductTree};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use stepasm_part21::{InstanceKind, InstanceTable, StepError, StepWriter};

/// What a compose pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeSummary {
    /// Source files merged.
    pub files: usize,
    /// Instances written, synthesized ones included.
    pub instances: usize,
    /// Cross-document occurrences written.
    pub occurrences: usize,
    /// First id not used by the output.
    pub next_id: u64,
    /// Products written without a shape representation; their placement
    /// relationships carry `$`.
    pub missing_shapes: usize,
}

/// Merge `tree` into `sink`.
///
/// On success every node carries `label_reference` = its product
/// definition id in the merged output.
pub fn compose<W: Write>(
    tree: &mut ProductTree,
    sink: W,
    config: &ComposeConfig,
) -> Result<ComposeSummary> {
    let name = format!("{}.stp", tree[tree.root()].name);
    Composer::new(tree, config, Path::new(&name)).run(sink)
}

/// Merge `tree` into a new file at `output`.
pub fn compose_file(
    tree: &mut ProductTree,
    output: impl AsRef<Path>,
    config: &ComposeConfig,
) -> Result<ComposeSummary> {
    let output = output.as_ref();
    let file = File::create(output).map_err(|e| AssemblyError::io(output, e))?;
    Composer::new(tree, config, output).run(BufWriter::new(file))
}

struct Composer<'a> {
    tree: &'a mut ProductTree,
    config: &'a ComposeConfig,
    output: &'a Path,
    offset: u64,
    merged: HashSet<String>,
    /// `APPLICATION*` keyword → id of the instance every file shares.
    application: HashMap<String, u64>,
    /// Merged shape representation per labelled node.
    shape_reps: HashMap<ProductKey, Option<u64>>,
    missing_shapes: usize,
}

impl<'a> Composer<'a> {
    fn new(tree: &'a mut ProductTree, config: &'a ComposeConfig, output: &'a Path) -> Self {
        Self {
            tree,
            config,
            output,
            offset: 0,
            merged: HashSet::new(),
            application: HashMap::new(),
            shape_reps: HashMap::new(),
            missing_shapes: 0,
        }
    }

    fn run<W: Write>(mut self, sink: W) -> Result<ComposeSummary> {
        let order = self.tree.walk();
        let mut writer = StepWriter::new(sink);

        for (i, &key) in order.iter().enumerate() {
            let path = self.tree[key].doc_path.clone();
            if self.merged.contains(&path) {
                continue;
            }
            let table = stepasm_part21::parse_file(&path)
                .map_err(|e| AssemblyError::step(&path, e))?;
            if i == 0 {
                let header = match &self.config.header {
                    Some(h) => h.render(&file_name(self.output)),
                    None => table.header().to_string(),
                };
                writer.begin(&header).map_err(|e| self.sink_error(e))?;
            }
            self.merge(&mut writer, key, &order, &table)?;
            self.merged.insert(path);
        }

        let blocks = self.occurrences(&order)?;
        for block in &blocks {
            tracing::debug!(
                "occurrence '{}' #{} -> #{} written as usage #{}",
                block.name,
                block.parent,
                block.child,
                block.usage_id()
            );
            for instance in block.instances() {
                writer
                    .write_instance(&instance)
                    .map_err(|e| self.sink_error(e))?;
            }
        }

        let summary = ComposeSummary {
            files: self.merged.len(),
            instances: writer.written(),
            occurrences: blocks.len(),
            next_id: self.offset + blocks.len() as u64 * BLOCK_LEN + 1,
            missing_shapes: self.missing_shapes,
        };
        writer.finish().map_err(|e| self.sink_error(e))?;
        tracing::info!(
            "composed {} files into {} ({} instances, {} occurrences)",
            summary.files,
            self.output.display(),
            summary.instances,
            summary.occurrences
        );
        Ok(summary)
    }

    /// Emit one table and label every node stored in it.
    fn merge<W: Write>(
        &mut self,
        writer: &mut StepWriter<W>,
        doc_root: ProductKey,
        order: &[ProductKey],
        table: &InstanceTable,
    ) -> Result<()> {
        let path = PathBuf::from(&self.tree[doc_root].doc_path);
        let offset = self.offset;
        let first_file = self.merged.is_empty();

        // Resolve shared application instances before anything is written,
        // since references may point forward.
        let mut alias: HashMap<u64, u64> = HashMap::new();
        for instance in table.iter() {
            let InstanceKind::Simple(record) = &instance.kind else {
                continue;
            };
            if !record.keyword.starts_with("APPLICATION") {
                continue;
            }
            match self.application.get(&record.keyword) {
                Some(&shared) if !first_file && self.config.dedup_application => {
                    alias.insert(instance.id, shared);
                }
                Some(_) => {}
                None => {
                    self.application
                        .insert(record.keyword.clone(), instance.id + offset);
                }
            }
        }
        let remap = |id: u64| alias.get(&id).copied().unwrap_or(id + offset);

        let before = writer.written();
        for instance in table.iter() {
            if alias.contains_key(&instance.id) {
                continue;
            }
            writer
                .write_renumbered(instance, instance.id + offset, remap)
                .map_err(|e| self.sink_error(e))?;
        }

        let root_pd = find_root(table, &path)?;
        let mut resolved: Vec<(ProductKey, u64)> = Vec::new();
        for &key in order {
            if self.tree[key].doc_path != self.tree[doc_root].doc_path {
                continue;
            }
            let pd = if key == doc_root {
                root_pd
            } else {
                self.locate(table, key, order, &resolved, &path)?
            };
            resolved.push((key, pd));

            let rep = shape_representation_of(table, pd).map(remap);
            if rep.is_none() {
                tracing::warn!(
                    "'{}' has no shape representation; placement relationships written with $",
                    self.tree[key].name
                );
                self.missing_shapes += 1;
            }
            self.tree[key].label_reference = Some(remap(pd));
            self.shape_reps.insert(key, rep);
        }

        tracing::info!(
            "merged {} ({} instances, offset {offset})",
            path.display(),
            writer.written() - before
        );
        self.offset += table.max_id();
        Ok(())
    }

    /// Product definition of a non-root node stored in `table`.
    ///
    /// Candidates are the usage children of the first already-resolved
    /// parent in the same file, or every product definition when there is
    /// none. The node's own id wins when it is a candidate whose name fits
    /// (trees built by the reader carry it); otherwise the product name
    /// decides, preferring definitions not claimed by another node.
    fn locate(
        &self,
        table: &InstanceTable,
        key: ProductKey,
        order: &[ProductKey],
        resolved: &[(ProductKey, u64)],
        path: &Path,
    ) -> Result<u64> {
        let node = &self.tree[key];
        let parent = order.iter().find_map(|&p| {
            let (_, pd) = resolved.iter().find(|(k, _)| *k == p)?;
            self.tree.children(p).any(|c| c == key).then_some(*pd)
        });
        let candidates = match parent {
            Some(pd) => child_definitions(table, pd),
            None => product_definitions(table),
        };
        // An unnamed product took its name from an occurrence.
        let name_fits = |pd: u64| {
            product_name(table, pd).is_ok_and(|n| n.is_empty() || n == node.name)
        };
        if candidates.contains(&node.id) && name_fits(node.id) {
            return Ok(node.id);
        }

        let named: Vec<u64> = candidates
            .into_iter()
            .filter(|&pd| product_name(table, pd).is_ok_and(|n| n == node.name))
            .collect();
        named
            .iter()
            .find(|pd| !resolved.iter().any(|(_, taken)| taken == *pd))
            .or(named.first())
            .copied()
            .ok_or_else(|| AssemblyError::Unresolved {
                name: node.name.clone(),
                path: path.to_path_buf(),
            })
    }

    /// One placement block per occurrence of every cross-document link.
    fn occurrences(&self, order: &[ProductKey]) -> Result<Vec<PlacementBlock>> {
        let mut blocks = Vec::new();
        for &key in order {
            let parent = &self.tree[key];
            for link in &parent.links {
                let child = &self.tree[link.child];
                if child.doc_id == parent.doc_id {
                    continue;
                }
                let parent_label = self.label(key)?;
                let child_label = self.label(link.child)?;
                let parent_rep = self.shape_rep(key);
                let child_rep = self.shape_rep(link.child);

                for occurrence in &link.occurrences {
                    if !occurrence.transform.is_rigid(1e-6) {
                        tracing::warn!(
                            "occurrence '{}' is not a rigid motion; scale and shear are dropped",
                            occurrence.name
                        );
                    }
                    blocks.push(PlacementBlock {
                        first_id: self.offset + blocks.len() as u64 * BLOCK_LEN + 1,
                        sequence: blocks.len() + 1,
                        name: occurrence.name.clone(),
                        parent: parent_label,
                        child: child_label,
                        parent_rep,
                        child_rep,
                        transform: occurrence.transform,
                    });
                }
            }
        }
        Ok(blocks)
    }

    fn label(&self, key: ProductKey) -> Result<u64> {
        let node = &self.tree[key];
        node.label_reference
            .ok_or_else(|| AssemblyError::Unresolved {
                name: node.name.clone(),
                path: PathBuf::from(&node.doc_path),
            })
    }

    fn shape_rep(&self, key: ProductKey) -> Option<u64> {
        self.shape_reps.get(&key).copied().flatten()
    }

    fn sink_error(&self, e: StepError) -> AssemblyError {
        AssemblyError::step(self.output, e)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

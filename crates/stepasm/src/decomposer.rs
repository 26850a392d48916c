//! Split a merged assembly file into per-document STEP files.
//!
//! The target tree mirrors the merged file's product structure and says
//! where each product should live. Every distinct `doc_path` receives the
//! products stored there: their definitions, shape chains and descriptive
//! instances, plus the usage structure of children that stay in the same
//! file. Usages of children stored elsewhere are cut out; composing the
//! target tree again restores them.

use crate::config::DecomposeConfig;
use crate::error::{AssemblyError, Result};
use crate::reader::{
    read_assembly, AssemblyStructure, PRODUCT_DEFINITION_SHAPE, SHAPE_DEFINITION_REPRESENTATION,
};
use crate::tree::{Link, ProductKey, ProductTree};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use stepasm_part21::{InstanceKind, InstanceTable, ParamsExt, StepWriter};

const SHAPE_REPRESENTATION_RELATIONSHIP: &str = "SHAPE_REPRESENTATION_RELATIONSHIP";

/// What a decompose pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecomposeSummary {
    /// Files written, children before parents.
    pub files: Vec<PathBuf>,
    /// Instances written across all files.
    pub instances: usize,
}

/// Parse `path` and split it according to `target`.
pub fn decompose_file(
    path: impl AsRef<Path>,
    target: &ProductTree,
    config: &DecomposeConfig,
) -> Result<DecomposeSummary> {
    let path = path.as_ref();
    let merged = stepasm_part21::parse_file(path).map_err(|e| AssemblyError::step(path, e))?;
    decompose(&merged, path, target, config)
}

/// Split `merged` (read from `merged_path`) according to `target`.
///
/// Fails with [`AssemblyError::StructuralMismatch`] before writing anything
/// when the two trees differ in link or occurrence counts, when a target
/// child has no counterpart in the merged file, or when a node is stored in
/// a file whose topmost node does not contain it.
pub fn decompose(
    merged: &InstanceTable,
    merged_path: &Path,
    target: &ProductTree,
    config: &DecomposeConfig,
) -> Result<DecomposeSummary> {
    let structure = read_assembly(merged, 0, merged_path)?;
    let mut pairing = HashMap::new();
    pair(&structure.tree, structure.tree.root(), target, target.root(), &mut pairing)?;

    let splitter = Splitter::new(merged, &structure, target, pairing);
    splitter.check_placement()?;
    let mut summary = DecomposeSummary::default();
    let mut done = HashSet::new();
    splitter.visit(target.root(), config, &mut done, &mut summary)?;
    Ok(summary)
}

/// Walk both trees, recording which merged node each target node stands for.
///
/// Links are matched by content rather than position: the child's merged
/// label when the target carries one, then the occurrence names, then the
/// child product name.
fn pair(
    merged: &ProductTree,
    m: ProductKey,
    target: &ProductTree,
    t: ProductKey,
    pairing: &mut HashMap<ProductKey, ProductKey>,
) -> Result<()> {
    match pairing.get(&t) {
        Some(&seen) if seen == m => return Ok(()),
        Some(_) => {
            return Err(AssemblyError::mismatch(
                &target[t].name,
                "shared node maps to different merged products",
            ))
        }
        None => {
            pairing.insert(t, m);
        }
    }

    let (ml, tl) = (&merged[m].links, &target[t].links);
    if ml.len() != tl.len() {
        return Err(AssemblyError::mismatch(
            &target[t].name,
            format!("{} links in the merged file, {} in the target", ml.len(), tl.len()),
        ));
    }
    let mut used = vec![false; ml.len()];
    for b in tl {
        let Some(i) = match_link(merged, ml, &used, target, b) else {
            return Err(AssemblyError::mismatch(
                &target[b.child].name,
                "no matching child in the merged file",
            ));
        };
        used[i] = true;
        let a = &ml[i];
        if a.quantity() != b.quantity() {
            return Err(AssemblyError::mismatch(
                &target[b.child].name,
                format!(
                    "{} occurrences in the merged file, {} in the target",
                    a.quantity(),
                    b.quantity()
                ),
            ));
        }
        pair(merged, a.child, target, b.child, pairing)?;
    }
    Ok(())
}

fn match_link(
    merged: &ProductTree,
    links: &[Link],
    used: &[bool],
    target: &ProductTree,
    wanted: &Link,
) -> Option<usize> {
    let free = || (0..links.len()).filter(move |&i| !used[i]);
    let child = &target[wanted.child];
    if let Some(label) = child.label_reference {
        let hit = free().find(|&i| merged[links[i].child].label_reference == Some(label));
        if hit.is_some() {
            return hit;
        }
    }
    let names = occurrence_names(wanted);
    free()
        .find(|&i| occurrence_names(&links[i]) == names)
        .or_else(|| free().find(|&i| merged[links[i].child].name == child.name))
}

fn occurrence_names(link: &Link) -> Vec<&str> {
    link.occurrences.iter().map(|o| o.name.as_str()).collect()
}

struct Splitter<'a> {
    merged: &'a InstanceTable,
    structure: &'a AssemblyStructure,
    target: &'a ProductTree,
    pairing: HashMap<ProductKey, ProductKey>,
    /// Topmost target node of each output path.
    file_roots: HashMap<&'a str, ProductKey>,
    /// Product definition → its definition and shape chain closure.
    cores: HashMap<u64, HashSet<u64>>,
    /// Ids of every usage structure.
    structural: HashSet<u64>,
    users: HashMap<u64, Vec<u64>>,
}

impl<'a> Splitter<'a> {
    fn new(
        merged: &'a InstanceTable,
        structure: &'a AssemblyStructure,
        target: &'a ProductTree,
        pairing: HashMap<ProductKey, ProductKey>,
    ) -> Self {
        let mut file_roots = HashMap::new();
        for key in target.walk() {
            file_roots.entry(target[key].doc_path.as_str()).or_insert(key);
        }
        let mut splitter = Self {
            merged,
            structure,
            target,
            pairing,
            file_roots,
            cores: HashMap::new(),
            structural: structure
                .usages
                .iter()
                .flat_map(|u| u.structure.iter().copied())
                .collect(),
            users: merged.reverse_references(),
        };
        let pds: Vec<u64> = structure
            .tree
            .walk()
            .into_iter()
            .filter_map(|k| structure.tree[k].label_reference)
            .collect();
        for pd in pds {
            let core = splitter.core(pd);
            splitter.cores.insert(pd, core);
        }
        splitter
    }

    /// Post-order: files of children are written before their parents'.
    fn visit(
        &self,
        t: ProductKey,
        config: &DecomposeConfig,
        done: &mut HashSet<ProductKey>,
        summary: &mut DecomposeSummary,
    ) -> Result<()> {
        if !done.insert(t) {
            return Ok(());
        }
        for child in self.target.children(t) {
            self.visit(child, config, done, summary)?;
        }
        let path = self.target[t].doc_path.as_str();
        if self.file_roots.get(path) == Some(&t) {
            let written = self.write_file(t, config)?;
            summary.instances += written;
            summary.files.push(PathBuf::from(path));
        }
        Ok(())
    }

    /// `root` and every node reached from it through children stored in
    /// the same file.
    fn members(&self, root: ProductKey) -> Vec<ProductKey> {
        let path = self.target[root].doc_path.as_str();
        let mut members = vec![root];
        let mut next = 0;
        while next < members.len() {
            let node = members[next];
            next += 1;
            for child in self.target.children(node) {
                if self.target[child].doc_path == path && !members.contains(&child) {
                    members.push(child);
                }
            }
        }
        members
    }

    /// Every node must be reachable from its file's topmost node without
    /// leaving that file; otherwise it would be dropped from the output.
    fn check_placement(&self) -> Result<()> {
        let covered: HashSet<ProductKey> = self
            .file_roots
            .values()
            .flat_map(|&root| self.members(root))
            .collect();
        for key in self.target.walk() {
            if covered.contains(&key) {
                continue;
            }
            let node = &self.target[key];
            let owner = self
                .file_roots
                .get(node.doc_path.as_str())
                .map_or("?", |&root| self.target[root].name.as_str());
            return Err(AssemblyError::mismatch(
                &node.name,
                format!(
                    "stored in {} but not below '{owner}' in that file",
                    node.doc_path
                ),
            ));
        }
        Ok(())
    }

    fn pd(&self, t: ProductKey) -> Option<u64> {
        let m = *self.pairing.get(&t)?;
        self.structure.tree[m].label_reference
    }

    /// Instances that belong in the file rooted at target node `t`.
    fn subset(&self, t: ProductKey) -> HashSet<u64> {
        let path = self.target[t].doc_path.as_str();
        let mut keep = HashSet::new();
        let mut excluded = HashSet::new();

        for node in self.members(t) {
            let Some(pd) = self.pd(node) else { continue };
            if let Some(core) = self.cores.get(&pd) {
                keep.extend(core.iter().copied());
            }
            for child in self.target.children(node) {
                let Some(child_pd) = self.pd(child) else { continue };
                let inline = self.target[child].doc_path == path;
                for usage in self
                    .structure
                    .usages_of(pd)
                    .filter(|u| u.child == child_pd)
                {
                    if inline {
                        for &id in &usage.structure {
                            keep.extend(self.closure(id));
                        }
                    } else {
                        excluded.extend(usage.structure.iter().copied());
                    }
                }
            }
        }

        // Products stored in other files.
        let foreign: HashSet<u64> = self
            .cores
            .values()
            .flatten()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();

        // Unreferenced descriptors (protocol definitions, styling, layers)
        // that touch this file's products and nothing stored elsewhere.
        for instance in self.merged.iter() {
            let id = instance.id;
            if keep.contains(&id) || self.structural.contains(&id) || self.users.contains_key(&id)
            {
                continue;
            }
            let closure = self.closure(id);
            if closure.iter().any(|c| keep.contains(c))
                && !closure.iter().any(|c| foreign.contains(c) || excluded.contains(c))
            {
                keep.extend(closure);
            }
        }
        keep
    }

    /// Definition closure of `pd` plus its shape representation chain.
    fn core(&self, pd: u64) -> HashSet<u64> {
        let mut keep = self.closure(pd);

        let shapes: Vec<u64> = self
            .merged
            .typeinst(PRODUCT_DEFINITION_SHAPE)
            .iter()
            .copied()
            .filter(|&pds| self.simple_ref(pds, PRODUCT_DEFINITION_SHAPE, 2) == Some(pd))
            .collect();
        for &pds in &shapes {
            keep.extend(self.closure(pds));
        }
        for &sdr in self.merged.typeinst(SHAPE_DEFINITION_REPRESENTATION) {
            if self
                .simple_ref(sdr, SHAPE_DEFINITION_REPRESENTATION, 0)
                .is_some_and(|d| shapes.contains(&d))
            {
                keep.extend(self.closure(sdr));
            }
        }

        // Simple relationships chain further representations (e.g. the
        // B-rep behind a shape representation); follow them to a fixpoint.
        loop {
            let before = keep.len();
            for &srr in self.merged.typeinst(SHAPE_REPRESENTATION_RELATIONSHIP) {
                let Some(instance) = self.merged.get(srr) else { continue };
                if !matches!(instance.kind, InstanceKind::Simple(_)) || keep.contains(&srr) {
                    continue;
                }
                let reps = [
                    self.simple_ref(srr, SHAPE_REPRESENTATION_RELATIONSHIP, 2),
                    self.simple_ref(srr, SHAPE_REPRESENTATION_RELATIONSHIP, 3),
                ];
                if reps.iter().flatten().any(|r| keep.contains(r)) {
                    keep.extend(self.closure(srr));
                }
            }
            if keep.len() == before {
                break;
            }
        }
        keep
    }

    fn simple_ref(&self, id: u64, keyword: &str, index: usize) -> Option<u64> {
        let args = self.merged.decode(id, keyword).ok()?;
        args.entity_ref(index).ok()
    }

    /// Every id reachable from `start` through references.
    fn closure(&self, start: u64) -> HashSet<u64> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(instance) = self.merged.get(id) {
                stack.extend(instance.references());
            }
        }
        seen
    }

    fn write_file(&self, t: ProductKey, config: &DecomposeConfig) -> Result<usize> {
        let node = &self.target[t];
        let path = Path::new(&node.doc_path);
        let keep = self.subset(t);

        // Compact ids to 1..n in file order.
        let mut renumber = HashMap::new();
        for instance in self.merged.iter().filter(|i| keep.contains(&i.id)) {
            let next = renumber.len() as u64 + 1;
            renumber.insert(instance.id, next);
        }

        if config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| AssemblyError::io(parent, e))?;
            }
        }
        let file = File::create(path).map_err(|e| AssemblyError::io(path, e))?;
        let mut writer = StepWriter::new(BufWriter::new(file));

        let header = match &config.header {
            Some(h) => h.render(&file_name(path)),
            None => self.merged.header().to_string(),
        };
        writer
            .begin(&header)
            .map_err(|e| AssemblyError::step(path, e))?;
        for instance in self.merged.iter() {
            let Some(&new_id) = renumber.get(&instance.id) else {
                continue;
            };
            // The kept set is closed under references.
            writer
                .write_renumbered(instance, new_id, |r| renumber.get(&r).copied().unwrap_or(r))
                .map_err(|e| AssemblyError::step(path, e))?;
        }
        let written = writer.written();
        writer.finish().map_err(|e| AssemblyError::step(path, e))?;

        tracing::info!("wrote '{}' to {} ({written} instances)", node.name, path.display());
        Ok(written)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

mod common;

use common::{part_step, wrap, write, TOP_WITH_FRAME};
use std::path::Path;
use stepasm::{
    arb, compose_file, decompose_file, read_assembly_file, ComposeConfig, DecomposeConfig,
    ErrorKind, Matrix, Product, ProductKey, ProductTree,
};
use stepasm_part21::parse_file;

/// Same tree with every product moved from `from` to `to`.
fn relocate(tree: &ProductTree, from: &Path, to: &Path) -> ProductTree {
    let mut moved = tree.clone();
    for key in moved.walk() {
        let file = Path::new(&moved[key].doc_path)
            .strip_prefix(from)
            .unwrap()
            .to_path_buf();
        moved[key].doc_path = to.join(file).to_string_lossy().into_owned();
    }
    moved
}

fn sources(dir: &Path) -> ProductTree {
    let top = write(dir, "top.stp", &wrap("top", TOP_WITH_FRAME));
    let bolt = write(dir, "bolt.stp", &part_step("bolt", 4, 15));
    let washer = write(dir, "washer.stp", &part_step("washer", 2, 18));
    let top = top.to_string_lossy();
    let mut tree = ProductTree::new(Product::new("top", 1, top.clone()).with_id(1));
    let root = tree.root();
    let frame = tree.insert(Product::new("frame", 1, top).with_id(2));
    let bolt = tree.insert(
        Product::new("bolt", 2, bolt.to_string_lossy())
            .with_id(3)
            .with_geometry(1),
    );
    let washer = tree.insert(
        Product::new("washer", 3, washer.to_string_lossy())
            .with_id(4)
            .with_geometry(1),
    );
    tree.place(root, frame, "frame.1", Matrix::translation(0.0, 0.0, 10.0));
    tree.place(frame, bolt, "bolt.1", Matrix::translation(1.0, 0.0, 0.0));
    tree.place(frame, bolt, "bolt.2", Matrix::translation(-1.0, 0.0, 0.0));
    tree.place(root, washer, "washer.1", Matrix::IDENTITY);
    tree
}

#[test]
fn compose_then_decompose_is_structural_inverse() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut tree = sources(src.path());
    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    let target = relocate(&tree, src.path(), &out.path().join("parts"));
    let summary = decompose_file(&merged_path, &target, &DecomposeConfig::default()).unwrap();

    // One file per distinct path, leaves first.
    let names: Vec<String> = summary
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["bolt.stp", "washer.stp", "top.stp"]);

    // Each decomposed file holds exactly its own products.
    let bolt = parse_file(out.path().join("parts/bolt.stp")).unwrap();
    assert_eq!(bolt.typeinst("PRODUCT").len(), 1);
    assert!(bolt.typeinst("NEXT_ASSEMBLY_USAGE_OCCURRENCE").is_empty());
    let top = parse_file(out.path().join("parts/top.stp")).unwrap();
    assert_eq!(top.typeinst("PRODUCT").len(), 2);
    assert_eq!(top.typeinst("NEXT_ASSEMBLY_USAGE_OCCURRENCE").len(), 1);
    for table in [&bolt, &top] {
        assert_eq!(table.max_id() as usize, table.len());
        for instance in table.iter() {
            assert!(instance.references().iter().all(|r| table.get(*r).is_some()));
        }
    }

    // Composing the pieces again yields the same assembly.
    let mut again = target.clone();
    let remerged = out.path().join("remerged.stp");
    compose_file(&mut again, &remerged, &ComposeConfig::default()).unwrap();
    let first = read_assembly_file(&merged_path, 1).unwrap();
    let second = read_assembly_file(&remerged, 1).unwrap();
    assert!(first.tree.same_structure(&second.tree, 1e-12));
    assert!(tree.same_structure(&second.tree, 1e-12));
}

#[test]
fn decomposed_tree_survives_arb_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let mut tree = sources(src.path());
    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    let out = src.path().join("out");
    let target = relocate(&tree, src.path(), &out);
    let arb_path = src.path().join("target.arb");
    arb::write_arb(&target, &arb_path).unwrap();
    let loaded = arb::read_arb(&arb_path).unwrap();
    assert!(loaded.walk().iter().all(|&k| loaded[k].label_reference.is_none()));

    decompose_file(&merged_path, &loaded, &DecomposeConfig::default()).unwrap();
    let washer = read_assembly_file(out.join("washer.stp"), 3).unwrap();
    assert_eq!(washer.tree[washer.tree.root()].name, "washer");
    assert_eq!(washer.tree[washer.tree.root()].geometry, Some(1));
}

/// `top` placing `washer` before its inline `frame`, so the merged file
/// lists the two children in the opposite order.
fn washer_before_frame(dir: &Path) -> ProductTree {
    let top = write(dir, "top.stp", &wrap("top", TOP_WITH_FRAME));
    let washer = write(dir, "washer.stp", &part_step("washer", 2, 18));
    let top = top.to_string_lossy();
    let mut tree = ProductTree::new(Product::new("top", 1, top.clone()).with_id(1));
    let root = tree.root();
    let washer = tree.insert(
        Product::new("washer", 2, washer.to_string_lossy())
            .with_id(3)
            .with_geometry(1),
    );
    let frame = tree.insert(Product::new("frame", 1, top).with_id(2));
    tree.place(root, washer, "washer.1", Matrix::IDENTITY);
    tree.place(root, frame, "frame.1", Matrix::translation(0.0, 0.0, 10.0));
    tree
}

fn assert_split(out: &Path) {
    let washer = read_assembly_file(out.join("washer.stp"), 2).unwrap();
    assert_eq!(washer.tree[washer.tree.root()].name, "washer");

    let top = read_assembly_file(out.join("top.stp"), 1).unwrap();
    let root = top.tree.root();
    assert_eq!(top.tree[root].name, "top");
    let children: Vec<&str> = top
        .tree
        .children(root)
        .map(|k| top.tree[k].name.as_str())
        .collect();
    assert_eq!(children, vec!["frame"]);
}

#[test]
fn cross_document_link_before_inline_link() {
    let src = tempfile::tempdir().unwrap();
    let mut tree = washer_before_frame(src.path());
    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    let out = src.path().join("out");
    let target = relocate(&tree, src.path(), &out);
    decompose_file(&merged_path, &target, &DecomposeConfig::default()).unwrap();
    assert_split(&out);

    // Without labels the links pair up by occurrence name.
    let out = src.path().join("from_arb");
    let arb_path = src.path().join("target.arb");
    arb::write_arb(&relocate(&tree, src.path(), &out), &arb_path).unwrap();
    let loaded = arb::read_arb(&arb_path).unwrap();
    decompose_file(&merged_path, &loaded, &DecomposeConfig::default()).unwrap();
    assert_split(&out);
}

#[test]
fn nodes_sharing_a_file_must_nest() {
    let src = tempfile::tempdir().unwrap();
    let data = TOP_WITH_FRAME.split("#30").next().unwrap();
    let top = write(src.path(), "top.stp", &wrap("top", data));
    let bolt = write(src.path(), "bolt.stp", &part_step("bolt", 4, 15));
    let top = top.to_string_lossy();
    let mut tree = ProductTree::new(Product::new("top", 1, top.clone()).with_id(1));
    let root = tree.root();
    let bolt = tree.insert(Product::new("bolt", 2, bolt.to_string_lossy()).with_id(2));
    let frame = tree.insert(Product::new("frame", 1, top).with_id(3));
    tree.place(root, bolt, "bolt.1", Matrix::IDENTITY);
    tree.place(bolt, frame, "frame.1", Matrix::translation(0.0, 0.0, 2.0));

    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    // `frame` lives in top.stp but only hangs below bolt.stp's product.
    let out = src.path().join("out");
    let target = relocate(&tree, src.path(), &out);
    let err = decompose_file(&merged_path, &target, &DecomposeConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralMismatch);
    assert!(err.to_string().contains("frame"));
    assert!(!out.exists());
}

#[test]
fn mismatched_target_is_rejected() {
    let src = tempfile::tempdir().unwrap();
    let mut tree = sources(src.path());
    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    let out = src.path().join("out");
    let mut target = relocate(&tree, src.path(), &out);
    let root = target.root();
    let washer: ProductKey = target.children(root).nth(1).unwrap();
    target.place(root, washer, "washer.2", Matrix::translation(0.0, 3.0, 0.0));

    let err = decompose_file(&merged_path, &target, &DecomposeConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralMismatch);
    assert!(err.to_string().contains("washer"));
    assert!(!out.exists());
}

#[test]
fn header_override_on_split() {
    let src = tempfile::tempdir().unwrap();
    let mut tree = sources(src.path());
    let merged_path = src.path().join("merged.stp");
    compose_file(&mut tree, &merged_path, &ComposeConfig::default()).unwrap();

    let out = src.path().join("out");
    let target = relocate(&tree, src.path(), &out);
    let config = DecomposeConfig {
        header: Some(stepasm::HeaderConfig {
            description: "split".into(),
            ..stepasm::HeaderConfig::default()
        }),
        ..DecomposeConfig::default()
    };
    decompose_file(&merged_path, &target, &config).unwrap();
    let bolt = parse_file(out.join("bolt.stp")).unwrap();
    let records = bolt.header_records();
    assert_eq!(records[0].params, "('split'),'2;1'");
    assert!(records[1].params.starts_with("'bolt.stp'"));
}

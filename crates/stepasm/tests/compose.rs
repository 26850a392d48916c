mod common;

use common::{part_step, wrap, write, TOP_WITH_FRAME};
use std::path::Path;
use stepasm::{
    arb, compose, compose_file, read_assembly, read_assembly_file, AssemblyError, ComposeConfig, ErrorKind, Matrix,
    Product, ProductTree,
};
use stepasm_part21::{format_instance, parse, parse_file, InstanceTable};

/// `base` (ids 1..50, definition #12) holding `bracket` (ids 1..20, root #3)
/// moved 5 along x.
fn base_and_bracket(dir: &Path) -> ProductTree {
    let base = write(dir, "base.stp", &part_step("base", 12, 50));
    let bracket = write(dir, "bracket.stp", &part_step("bracket", 3, 20));
    let mut tree = ProductTree::new(Product::new("base", 1, base.to_string_lossy()));
    let root = tree.root();
    let child = tree.insert(Product::new("bracket", 2, bracket.to_string_lossy()).with_geometry(1));
    tree.place(root, child, "bracket.1", Matrix::translation(5.0, 0.0, 0.0));
    tree
}

fn compose_table(tree: &mut ProductTree, config: &ComposeConfig) -> InstanceTable {
    let mut out = Vec::new();
    compose(tree, &mut out, config).unwrap();
    parse(&String::from_utf8(out).unwrap()).unwrap()
}

#[test]
fn base_and_bracket_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = base_and_bracket(dir.path());
    let mut out = Vec::new();
    let summary = compose(&mut tree, &mut out, &ComposeConfig::default()).unwrap();
    let merged = parse(&String::from_utf8(out).unwrap()).unwrap();

    // Base is copied unchanged.
    let base = parse_file(dir.path().join("base.stp")).unwrap();
    for instance in base.iter() {
        assert_eq!(merged.get(instance.id), Some(instance));
    }

    // Bracket sits at offset 50; its application instances are shared.
    assert!(merged.get(51).is_none());
    assert!(merged.get(52).is_none());
    assert!((53..=70).all(|id| merged.get(id).is_some()));
    assert_eq!(merged.contents(53), Some("'design','',#56,#57"));
    assert_eq!(merged.contents(54), Some("'',#1,'mechanical'"));

    let root = tree.root();
    let bracket = tree.children(root).next().unwrap();
    assert_eq!(tree[root].label_reference, Some(12));
    assert_eq!(tree[bracket].label_reference, Some(53));

    // The placement record starts right after the merged files.
    assert_eq!(
        format_instance(merged.get(71).unwrap()),
        "#71 = CONTEXT_DEPENDENT_SHAPE_REPRESENTATION(#72,#74);"
    );
    assert_eq!(
        merged.get(72).unwrap().params_of("REPRESENTATION_RELATIONSHIP"),
        Some("'','',#60,#9")
    );
    assert_eq!(merged.contents(73), Some("'','',#80,#76"));
    assert_eq!(
        merged.contents(74),
        Some("'Placement','Placement of an item',#75")
    );
    assert_eq!(merged.contents(75), Some("'1','bracket.1','',#12,#53,$"));
    assert_eq!(merged.insttype(76), Some("AXIS2_PLACEMENT_3D"));
    assert_eq!(merged.contents(77), Some("'',(5.,0.,0.)"));
    assert_eq!(merged.max_id(), 83);

    assert_eq!(summary.files, 2);
    assert_eq!(summary.occurrences, 1);
    assert_eq!(summary.next_id, 84);
}

#[test]
fn bracket_keeps_all_ids_without_application_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = base_and_bracket(dir.path());
    let config = ComposeConfig {
        dedup_application: false,
        ..ComposeConfig::default()
    };
    let merged = compose_table(&mut tree, &config);
    assert!((1..=83).all(|id| merged.get(id).is_some()));
    assert_eq!(merged.typeinst("APPLICATION_CONTEXT"), &[1, 51]);
    assert_eq!(merged.contents(54), Some("'',#51,'mechanical'"));
}

#[test]
fn ids_are_disjoint_and_references_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = base_and_bracket(dir.path());
    let root = tree.root();
    let nut = write(dir.path(), "nut.stp", &part_step("nut", 7, 30));
    let nut = tree.insert(Product::new("nut", 3, nut.to_string_lossy()));
    tree.place(root, nut, "nut.1", Matrix::translation(0.0, 1.0, 0.0));
    tree.place(root, nut, "nut.2", Matrix::translation(0.0, 2.0, 0.0));

    let merged = compose_table(&mut tree, &ComposeConfig::default());
    // 50 + 20 + 30 merged ids, then three blocks of 13.
    assert_eq!(merged.max_id(), 100 + 3 * 13);
    assert_eq!(merged.typeinst("APPLICATION_CONTEXT"), &[1]);
    for instance in merged.iter() {
        for target in instance.references() {
            assert!(
                merged.get(target).is_some(),
                "#{} references missing #{target}",
                instance.id
            );
        }
    }
    assert_eq!(tree[nut].label_reference, Some(77));
    assert_eq!(merged.typeinst("NEXT_ASSEMBLY_USAGE_OCCURRENCE").len(), 3);
}

#[test]
fn placements_survive_the_merge() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = base_and_bracket(dir.path());
    let root = tree.root();
    let bracket = tree.children(root).next().unwrap();
    let turned = Matrix::new([
        0.0, -1.0, 0.0, 3.0, //
        1.0, 0.0, 0.0, -2.0, //
        0.0, 0.0, 1.0, 0.5,
    ]);
    tree.place(root, bracket, "bracket.2", turned);

    let merged = compose_table(&mut tree, &ComposeConfig::default());
    let structure = read_assembly(&merged, 1, "merged.stp").unwrap();
    let read = &structure.tree;
    assert_eq!(read[read.root()].name, "base");
    let link = &read[read.root()].links[0];
    assert_eq!(read[link.child].name, "bracket");
    assert_eq!(link.quantity(), 2);
    assert_eq!(link.occurrences[1].name, "bracket.2");
    assert!(link.occurrences[0]
        .transform
        .approx_eq(&Matrix::translation(5.0, 0.0, 0.0), 1e-12));
    assert!(link.occurrences[1].transform.approx_eq(&turned, 1e-12));
    assert!(tree.same_structure(read, 1e-12));
}

#[test]
fn shared_part_is_merged_once() {
    let dir = tempfile::tempdir().unwrap();
    let top = write(dir.path(), "top.stp", &part_step("top", 1, 15));
    let left = write(dir.path(), "left.stp", &part_step("left", 1, 15));
    let right = write(dir.path(), "right.stp", &part_step("right", 1, 15));
    let bolt = write(dir.path(), "bolt.stp", &part_step("bolt", 1, 15));
    let ident = Matrix::IDENTITY.to_array();
    let bolt_node = serde_json::json!([["bolt", 4, 1, bolt.to_string_lossy(), 40]]);
    let text = serde_json::json!([
        ["top", 1, false, top.to_string_lossy(), 10],
        [[["left.1", ident]], [["left", 2, false, left.to_string_lossy(), 20], [[["bolt.1", ident]], bolt_node]]],
        [[["right.1", ident]], [["right", 3, false, right.to_string_lossy(), 30], [[["bolt.2", ident]], bolt_node]]]
    ])
    .to_string();
    let mut tree = arb::from_str(&text).unwrap();
    assert_eq!(tree.len(), 4);

    let mut out = Vec::new();
    let summary = compose(&mut tree, &mut out, &ComposeConfig::default()).unwrap();
    let merged = parse(&String::from_utf8(out).unwrap()).unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.occurrences, 4);
    assert_eq!(merged.typeinst("PRODUCT").len(), 4);

    let structure = read_assembly(&merged, 1, "merged.stp").unwrap();
    assert_eq!(structure.tree.len(), 4);
    assert!(tree.same_structure(&structure.tree, 1e-12));
}

#[test]
fn inline_subassembly_is_labelled_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let top = write(dir.path(), "top.stp", &wrap("top", TOP_WITH_FRAME));
    let bolt = write(dir.path(), "bolt.stp", &part_step("bolt", 4, 15));
    let top = top.to_string_lossy();
    let mut tree = ProductTree::new(Product::new("top", 1, top.clone()));
    let root = tree.root();
    let frame = tree.insert(Product::new("frame", 1, top));
    let bolt = tree.insert(Product::new("bolt", 2, bolt.to_string_lossy()));
    tree.place(root, frame, "frame.1", Matrix::translation(0.0, 0.0, 10.0));
    tree.place(frame, bolt, "bolt.1", Matrix::translation(1.0, 0.0, 0.0));

    let merged = compose_table(&mut tree, &ComposeConfig::default());
    assert_eq!(tree[frame].label_reference, Some(22));
    assert_eq!(tree[bolt].label_reference, Some(40));
    // Only the cross-document link gets a synthesized usage.
    assert_eq!(merged.typeinst("NEXT_ASSEMBLY_USAGE_OCCURRENCE"), &[30, 56]);
    assert_eq!(merged.contents(56), Some("'1','bolt.1','',#22,#40,$"));

    let structure = read_assembly(&merged, 1, "merged.stp").unwrap();
    assert!(tree.same_structure(&structure.tree, 1e-12));
}

#[test]
fn tree_read_from_a_file_composes_again() {
    let dir = tempfile::tempdir().unwrap();
    let unnamed = TOP_WITH_FRAME.replace(
        "PRODUCT('frame','frame','',(#3))",
        "PRODUCT('','','',(#3))",
    );
    let top = write(dir.path(), "top.stp", &wrap("top", &unnamed));
    let bolt = write(dir.path(), "bolt.stp", &part_step("bolt", 4, 15));

    let mut tree = read_assembly_file(&top, 1).unwrap().tree;
    let root = tree.root();
    let frame = tree.children(root).next().unwrap();
    assert_eq!(tree[frame].name, "frame.1");
    assert_eq!(tree[frame].id, 22);
    let bolt = tree.insert(Product::new("bolt", 2, bolt.to_string_lossy()));
    tree.place(frame, bolt, "bolt.1", Matrix::translation(1.0, 0.0, 0.0));

    let merged = compose_table(&mut tree, &ComposeConfig::default());
    assert_eq!(tree[frame].label_reference, Some(22));
    assert_eq!(merged.contents(56), Some("'1','bolt.1','',#22,#40,$"));

    let structure = read_assembly(&merged, 1, "merged.stp").unwrap();
    assert!(tree.same_structure(&structure.tree, 1e-12));
}

#[test]
fn header_override() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = base_and_bracket(dir.path());
    let config = ComposeConfig {
        header: Some(stepasm::HeaderConfig {
            author: "QA".into(),
            ..stepasm::HeaderConfig::default()
        }),
        ..ComposeConfig::default()
    };
    let output = dir.path().join("merged.stp");
    compose_file(&mut tree, &output, &config).unwrap();
    let merged = parse_file(&output).unwrap();
    let name = &merged.header_records()[1];
    assert_eq!(name.keyword, "FILE_NAME");
    assert!(name.params.starts_with("'merged.stp'"));
    assert!(name.params.contains("('QA')"));
}

#[test]
fn multi_root_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let data = "\
#5 = PRODUCT_DEFINITION('design','',$,$);
#6 = PRODUCT_DEFINITION('design','',$,$);
#7 = PRODUCT_DEFINITION('design','',$,$);
#9 = PRODUCT_DEFINITION('design','',$,$);
#10 = NEXT_ASSEMBLY_USAGE_OCCURRENCE('1','a','',#5,#6,$);
#11 = NEXT_ASSEMBLY_USAGE_OCCURRENCE('2','b','',#9,#7,$);
";
    let path = write(dir.path(), "two.stp", &wrap("two", data));
    let mut tree = ProductTree::new(Product::new("two", 1, path.to_string_lossy()));
    let err = compose(&mut tree, Vec::new(), &ComposeConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MultiRoot);
    match err {
        AssemblyError::MultiRoot { roots, path: p } => {
            assert_eq!(roots, vec![5, 9]);
            assert_eq!(p, path);
        }
        other => panic!("expected MultiRoot, got {other}"),
    }
}

#[test]
fn malformed_source_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "bad.stp", "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1 = ;\n");
    let mut tree = ProductTree::new(Product::new("bad", 1, path.to_string_lossy()));
    let err = compose(&mut tree, Vec::new(), &ComposeConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("bad.stp"));
}

//! Fixture STEP files for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Minimal single-part file named `name` whose product definition is `#pd`
/// and whose largest id is `#max_id`. Ids not needed by the part are
/// filled with unreferenced points.
pub fn part_step(name: &str, pd: u64, max_id: u64) -> String {
    let ids: Vec<u64> = (1..=max_id).filter(|&i| i != pd).take(14).collect();
    assert_eq!(ids.len(), 14, "max_id too small for a part");
    let [ac, apd, pc, product, pdf, pdc, pds, sdr, sr, ctx, axis, origin, z, x] = ids[..] else {
        unreachable!()
    };

    let mut lines = vec![
        (ac, "APPLICATION_CONTEXT('core data for automotive mechanical design processes')".to_string()),
        (apd, format!("APPLICATION_PROTOCOL_DEFINITION('international standard','automotive_design',2000,#{ac})")),
        (pc, format!("PRODUCT_CONTEXT('',#{ac},'mechanical')")),
        (product, format!("PRODUCT('{name}','{name}','',(#{pc}))")),
        (pdf, format!("PRODUCT_DEFINITION_FORMATION('','',#{product})")),
        (pdc, format!("PRODUCT_DEFINITION_CONTEXT('part definition',#{ac},'design')")),
        (pd, format!("PRODUCT_DEFINITION('design','',#{pdf},#{pdc})")),
        (pds, format!("PRODUCT_DEFINITION_SHAPE('','',#{pd})")),
        (sdr, format!("SHAPE_DEFINITION_REPRESENTATION(#{pds},#{sr})")),
        (sr, format!("SHAPE_REPRESENTATION('',(#{axis}),#{ctx})")),
        (ctx, "GEOMETRIC_REPRESENTATION_CONTEXT(3)".to_string()),
        (axis, format!("AXIS2_PLACEMENT_3D('',#{origin},#{z},#{x})")),
        (origin, "CARTESIAN_POINT('',(0.,0.,0.))".to_string()),
        (z, "DIRECTION('',(0.,0.,1.))".to_string()),
        (x, "DIRECTION('',(1.,0.,0.))".to_string()),
    ];
    let used: Vec<u64> = lines.iter().map(|(id, _)| *id).collect();
    for id in (1..=max_id).filter(|i| !used.contains(i)) {
        lines.push((id, format!("CARTESIAN_POINT('pad',({id}.,0.,0.))")));
    }
    lines.sort_by_key(|(id, _)| *id);

    let body: String = lines
        .iter()
        .map(|(id, text)| format!("#{id} = {text};\n"))
        .collect();
    wrap(name, &body)
}

/// Wrap DATA lines in a complete exchange file.
pub fn wrap(name: &str, data: &str) -> String {
    format!(
        "ISO-10303-21;\nHEADER;\n\
         FILE_DESCRIPTION(('{name}'),'2;1');\n\
         FILE_NAME('{name}.stp','2024-01-01T00:00:00',(''),(''),'','','');\n\
         FILE_SCHEMA(('AUTOMOTIVE_DESIGN {{ 1 0 10303 214 1 1 1 1 }}'));\n\
         ENDSEC;\nDATA;\n{data}ENDSEC;\nEND-ISO-10303-21;\n"
    )
}

/// Write `text` to `dir/file` and return the path.
pub fn write(dir: &Path, file: &str, text: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, text).unwrap();
    path
}

/// `top` containing an inline sub-assembly `frame`, both in one file.
pub const TOP_WITH_FRAME: &str = "\
#1 = APPLICATION_CONTEXT('core data for automotive mechanical design processes');
#2 = APPLICATION_PROTOCOL_DEFINITION('international standard','automotive_design',2000,#1);
#3 = PRODUCT_CONTEXT('',#1,'mechanical');
#4 = PRODUCT_DEFINITION_CONTEXT('part definition',#1,'design');
#5 = GEOMETRIC_REPRESENTATION_CONTEXT(3);
#6 = CARTESIAN_POINT('',(0.,0.,0.));
#7 = AXIS2_PLACEMENT_3D('',#6,$,$);
#10 = PRODUCT('top','top','',(#3));
#11 = PRODUCT_DEFINITION_FORMATION('','',#10);
#12 = PRODUCT_DEFINITION('design','',#11,#4);
#13 = PRODUCT_DEFINITION_SHAPE('','',#12);
#14 = SHAPE_DEFINITION_REPRESENTATION(#13,#15);
#15 = SHAPE_REPRESENTATION('',(#7),#5);
#20 = PRODUCT('frame','frame','',(#3));
#21 = PRODUCT_DEFINITION_FORMATION('','',#20);
#22 = PRODUCT_DEFINITION('design','',#21,#4);
#23 = PRODUCT_DEFINITION_SHAPE('','',#22);
#24 = SHAPE_DEFINITION_REPRESENTATION(#23,#25);
#25 = SHAPE_REPRESENTATION('',(#7),#5);
#30 = NEXT_ASSEMBLY_USAGE_OCCURRENCE('1','frame.1','',#12,#22,$);
#31 = PRODUCT_DEFINITION_SHAPE('Placement','Placement of an item',#30);
#32 = CONTEXT_DEPENDENT_SHAPE_REPRESENTATION(#33,#31);
#33 = ( REPRESENTATION_RELATIONSHIP('','',#25,#15)
REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION(#34)
SHAPE_REPRESENTATION_RELATIONSHIP() );
#34 = ITEM_DEFINED_TRANSFORMATION('','',#7,#35);
#35 = AXIS2_PLACEMENT_3D('',#36,$,$);
#36 = CARTESIAN_POINT('',(0.,0.,10.));
";

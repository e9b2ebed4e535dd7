use std::path::PathBuf;
use vcfcols::options::FieldOptions;
use vcfcols::types::{Category, ValueKind};
use vcfcols::{CalldataTable, DecodeError, DecodeOptions, Diagnostic, calldata, decode};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixture")
        .join(name)
}

fn genotype(table: &CalldataTable, row: usize, sample: &str) -> (i64, i64) {
    let s = table.sample_index(sample).expect("known sample");
    let gt = table.integers("genotype").expect("genotype");
    (gt[[row, s, 0]], gt[[row, s, 1]])
}

fn gt_text(table: &CalldataTable, row: usize, sample: &str) -> String {
    let s = table.sample_index(sample).expect("known sample");
    table.strings("GT").expect("GT")[[row, s]].clone()
}

#[test]
fn sample_vcf_calls_are_decoded_per_sample() -> Result<(), DecodeError> {
    let c = calldata(&fixture("sample.vcf"), &DecodeOptions::default())?;
    assert_eq!(c.len(), 9);
    assert_eq!(c.samples(), &["NA00001", "NA00002", "NA00003"]);

    let na1 = c.sample_index("NA00001").expect("NA00001");
    assert_eq!(gt_text(&c, 0, "NA00001"), "0|0");
    assert!(c.flags("is_called").expect("is_called")[[0, na1]]);
    assert!(c.flags("is_phased").expect("is_phased")[[0, na1]]);
    assert_eq!(genotype(&c, 0, "NA00001"), (0, 0));
    assert_eq!(genotype(&c, 6, "NA00003"), (-1, -1));
    assert_eq!(genotype(&c, 7, "NA00003"), (-1, -1));
    assert_eq!(genotype(&c, 4, "NA00001"), (1, 2));
    assert_eq!(genotype(&c, 8, "NA00001"), (0, -1));

    let hq = c.integers("HQ").expect("HQ");
    assert_eq!(hq.shape(), &[9, 3, 2]);
    assert_eq!((hq[[0, na1, 0]], hq[[0, na1, 1]]), (10, 10));
    assert_eq!((hq[[6, na1, 0]], hq[[6, na1, 1]]), (-1, -1));

    let gq = c.integers("GQ").expect("GQ");
    assert_eq!(gq[[2, na1]], 48);
    assert_eq!(gq[[6, na1]], -1);
    Ok(())
}

#[test]
fn phase_and_call_flags_follow_the_separator() -> Result<(), DecodeError> {
    let c = calldata(&fixture("sample.vcf"), &DecodeOptions::default())?;
    let na3 = c.sample_index("NA00003").expect("NA00003");
    let called = c.flags("is_called").expect("is_called");
    let phased = c.flags("is_phased").expect("is_phased");
    assert!(!phased[[0, na3]]);
    assert!(called[[0, na3]]);
    assert!(!called[[6, na3]]);
    assert!(phased[[8, na3]]);
    Ok(())
}

#[test]
fn calldata_columns_put_format_fields_before_genotype_summaries() -> Result<(), DecodeError> {
    let c = calldata(&fixture("sample.vcf"), &DecodeOptions::default())?;
    let names: Vec<&str> = c.names().collect();
    assert_eq!(
        names,
        vec!["GT", "GQ", "DP", "HQ", "is_called", "is_phased", "genotype"]
    );
    Ok(())
}

#[test]
fn fixed_arity_format_fields_are_kept_whatever_the_genotype() -> Result<(), DecodeError> {
    let c = calldata(&fixture("test1.vcf"), &DecodeOptions::default())?;
    let test2 = c.sample_index("test2").expect("test2");
    let ad = c.integers("AD").expect("AD");
    for row in 0..3 {
        assert_eq!((ad[[row, test2, 0]], ad[[row, test2, 1]]), (1, 0));
    }
    assert_eq!(gt_text(&c, 0, "test2"), ".");
    assert_eq!(gt_text(&c, 1, "test2"), "0");
    assert_eq!(gt_text(&c, 2, "test2"), "1");
    Ok(())
}

#[test]
fn missing_genotypes_decode_to_negative_alleles() -> Result<(), DecodeError> {
    let c = calldata(&fixture("test1.vcf"), &DecodeOptions::default())?;
    assert_eq!(gt_text(&c, 2, "test3"), ".");
    assert_eq!(genotype(&c, 2, "test3"), (-1, -1));
    assert_eq!(gt_text(&c, 2, "test4"), "./.");
    assert_eq!(genotype(&c, 2, "test4"), (-1, -1));
    let test4 = c.sample_index("test4").expect("test4");
    let ad = c.integers("AD").expect("AD");
    assert_eq!((ad[[2, test4, 0]], ad[[2, test4, 1]]), (-1, -1));
    Ok(())
}

#[test]
fn sample_subset_keeps_header_order() -> Result<(), DecodeError> {
    let options = DecodeOptions {
        samples: Some(vec!["NA00003".to_string(), "NA00001".to_string()]),
        ..DecodeOptions::default()
    };
    let c = calldata(&fixture("sample.vcf"), &options)?;
    assert_eq!(c.samples(), &["NA00001", "NA00003"]);
    assert_eq!(c.integers("genotype").expect("genotype").shape(), &[9, 2, 2]);
    assert_eq!(genotype(&c, 2, "NA00003"), (1, 1));
    Ok(())
}

#[test]
fn unknown_samples_are_rejected() {
    let options = DecodeOptions {
        samples: Some(vec!["NA99999".to_string()]),
        ..DecodeOptions::default()
    };
    assert!(matches!(
        calldata(&fixture("sample.vcf"), &options),
        Err(DecodeError::Config(_))
    ));
}

#[test]
fn ploidy_sets_the_genotype_width() -> Result<(), DecodeError> {
    let options = DecodeOptions {
        ploidy: 3,
        ..DecodeOptions::default()
    };
    let c = calldata(&fixture("sample.vcf"), &options)?;
    let gt = c.integers("genotype").expect("genotype");
    assert_eq!(gt.shape(), &[9, 3, 3]);
    assert_eq!((gt[[4, 0, 0]], gt[[4, 0, 1]], gt[[4, 0, 2]]), (1, 2, -1));
    Ok(())
}

#[test]
fn undeclared_format_fields_accept_a_type_override() -> Result<(), DecodeError> {
    let options = DecodeOptions {
        calldata: FieldOptions::default()
            .fields(["DP"])
            .kind("DP", ValueKind::Integer),
        ..DecodeOptions::default()
    };
    let output = decode(&fixture("test14.vcf"), &options)?;
    let c = output.calldata.expect("calldata");
    let na1 = c.sample_index("NA00001").expect("NA00001");
    assert_eq!(c.integers("DP").expect("DP")[[2, na1]], 1);
    assert!(output.diagnostics.contains(&Diagnostic::UndeclaredField {
        category: Category::Format,
        id: "DP".to_string(),
    }));
    assert!(c.contains("genotype"));
    assert!(!c.contains("GT"));
    Ok(())
}

#[test]
fn genotype_columns_can_be_excluded() -> Result<(), DecodeError> {
    let options = DecodeOptions {
        calldata: FieldOptions::default().exclude(["is_called", "is_phased", "genotype"]),
        ..DecodeOptions::default()
    };
    let c = calldata(&fixture("sample.vcf"), &options)?;
    assert_eq!(c.names().collect::<Vec<_>>(), vec!["GT", "GQ", "DP", "HQ"]);
    Ok(())
}

use std::path::PathBuf;
use vcfcols::{DecodeError, DecodeOptions, calldata, decode, decode_by_contig, variants};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixture")
        .join(name)
}

fn with_region(region: &str) -> DecodeOptions {
    DecodeOptions {
        region: Some(region.to_string()),
        ..DecodeOptions::default()
    }
}

#[test]
fn compressed_input_decodes_without_a_region() -> Result<(), DecodeError> {
    let v = variants(&fixture("sample.vcf.gz"), &DecodeOptions::default())?;
    assert_eq!(v.len(), 9);
    assert_eq!(v.strings("ID").expect("ID")[[2]], "rs6054257");
    Ok(())
}

#[test]
fn contig_region_keeps_only_that_contig() -> Result<(), DecodeError> {
    let v = variants(&fixture("sample.vcf.gz"), &with_region("20"))?;
    assert_eq!(v.len(), 6);
    let chrom = v.strings("CHROM").expect("CHROM");
    assert!(chrom.iter().all(|c| c == "20"));

    let c = calldata(&fixture("sample.vcf.gz"), &with_region("20"))?;
    assert_eq!(c.len(), 6);
    Ok(())
}

#[test]
fn interval_region_is_inclusive() -> Result<(), DecodeError> {
    let v = variants(&fixture("sample.vcf.gz"), &with_region("20:14370-1110696"))?;
    let pos = v.integers("POS").expect("POS");
    assert_eq!(pos.iter().copied().collect::<Vec<_>>(), vec![14370, 17330, 1110696]);
    Ok(())
}

#[test]
fn empty_regions_yield_empty_tables_with_the_full_layout() -> Result<(), DecodeError> {
    for region in ["18", "19:113-200"] {
        let output = decode(&fixture("sample.vcf.gz"), &with_region(region))?;
        let v = output.variants.expect("variants");
        let c = output.calldata.expect("calldata");
        assert_eq!(v.len(), 0, "{region}");
        assert_eq!(c.len(), 0, "{region}");
        assert!(v.contains("FILTER.PASS"));
        assert_eq!(c.integers("genotype").expect("genotype").shape(), &[0, 3, 2]);
    }
    Ok(())
}

#[test]
fn region_on_an_unindexed_file_is_a_config_error() {
    assert!(matches!(
        variants(&fixture("sample.vcf"), &with_region("20")),
        Err(DecodeError::Config(_))
    ));
}

#[test]
fn explicit_index_path_is_honored() -> Result<(), DecodeError> {
    let options = DecodeOptions {
        index: Some(fixture("sample.vcf.gz.tbi")),
        ..with_region("X")
    };
    let v = variants(&fixture("sample.vcf.gz"), &options)?;
    assert_eq!(v.len(), 1);
    assert_eq!(v.strings("ID").expect("ID")[[0]], "rsTest");
    Ok(())
}

#[test]
fn partitioned_decoding_concatenates_in_contig_order() -> Result<(), DecodeError> {
    let contigs = ["20", "18", "19", "X"].map(String::from);
    let output = decode_by_contig(&fixture("sample.vcf.gz"), &contigs, &DecodeOptions::default())?;
    let v = output.variants.expect("variants");
    let c = output.calldata.expect("calldata");
    assert_eq!(v.len(), 9);
    assert_eq!(c.len(), 9);

    let chrom: Vec<String> = v.strings("CHROM").expect("CHROM").iter().cloned().collect();
    assert_eq!(chrom[0], "20");
    assert_eq!(chrom[5], "20");
    assert_eq!(chrom[6], "19");
    assert_eq!(chrom[8], "X");

    let gt = c.integers("genotype").expect("genotype");
    assert_eq!(gt.shape(), &[9, 3, 2]);
    assert_eq!((gt[[8, 2, 0]], gt[[8, 2, 1]]), (0, 2));
    Ok(())
}

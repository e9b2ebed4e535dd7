// ========================================================================================
//
//                        THE COMMAND-LINE FRONT END: VCFCOLS
//
// ========================================================================================
//
// A thin driver over the library. It merges an optional TOML options file with the
// flags given on the command line, runs one decode and reports what was built: every
// column with its element type and shape, followed by any schema diagnostics.
//
// Command-line flags always win over values loaded from the options file.

use clap::Parser;
use itertools::Itertools;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use vcfcols::{DecodeError, DecodeOptions, DecodeOutput, Table, decode, decode_by_contig};

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser, Debug)]
#[clap(
    name = "vcfcols",
    version,
    about = "Decodes a VCF into typed variants and calldata tables."
)]
struct Args {
    /// Path to the VCF file (plain, gzip or BGZF).
    input: PathBuf,

    /// TOML file with decode options.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Restrict decoding to `contig[:start[-end]]`. Requires a tabix index.
    #[clap(long)]
    region: Option<String>,

    /// Tabix index path, if it is not `<input>.tbi`.
    #[clap(long)]
    index: Option<PathBuf>,

    /// Decode each listed contig in parallel and stack the results.
    #[clap(long, value_delimiter = ',')]
    by_contig: Vec<String>,

    /// Variants columns to decode, in order.
    #[clap(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Calldata columns to decode, in order.
    #[clap(long, value_delimiter = ',')]
    calldata_fields: Vec<String>,

    /// Variants columns to drop.
    #[clap(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Calldata columns to drop.
    #[clap(long, value_delimiter = ',')]
    exclude_calldata: Vec<String>,

    /// Decode at most this many records.
    #[clap(long)]
    count: Option<usize>,

    /// Name FILTER columns `FILTER_<id>` instead of `FILTER.<id>`.
    #[clap(long)]
    flatten_filter: bool,

    /// Samples to decode; all samples when omitted.
    #[clap(long, value_delimiter = ',')]
    samples: Vec<String>,

    /// Alleles per genotype call.
    #[clap(long)]
    ploidy: Option<usize>,

    /// Add the `svlen` column.
    #[clap(long)]
    svlen: bool,

    /// Show a progress spinner on stderr.
    #[clap(long)]
    progress: bool,

    /// Print the effective options as TOML and exit.
    #[clap(long)]
    dump_config: bool,
}

// ========================================================================================
//                                 THE MAIN ORCHESTRATOR
// ========================================================================================

fn main() {
    env_logger::init();
    let start_time = Instant::now();
    let args = Args::parse();

    let options = match build_options(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error preparing options: {e}");
            process::exit(1);
        }
    };

    if args.dump_config {
        match options.to_toml_string() {
            Ok(text) => {
                print!("{text}");
                return;
            }
            Err(e) => {
                eprintln!("Error serializing options: {e}");
                process::exit(1);
            }
        }
    }

    eprintln!("> Decoding {}", args.input.display());
    let result = if args.by_contig.is_empty() {
        decode(&args.input, &options)
    } else {
        decode_by_contig(&args.input, &args.by_contig, &options)
    };
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Fatal error during decoding: {e}");
            process::exit(1);
        }
    };

    print_report(&output);
    eprintln!("> Done in {:.2?}", start_time.elapsed());
}

/// Loads the options file, if any, then lays the command-line flags over it.
fn build_options(args: &Args) -> Result<DecodeOptions, DecodeError> {
    let mut options = match &args.config {
        Some(path) => DecodeOptions::load(path)?,
        None => DecodeOptions::default(),
    };

    if args.region.is_some() {
        options.region = args.region.clone();
    }
    if args.index.is_some() {
        options.index = args.index.clone();
    }
    if args.count.is_some() {
        options.count = args.count;
    }
    if let Some(ploidy) = args.ploidy {
        options.ploidy = ploidy;
    }
    if !args.samples.is_empty() {
        options.samples = Some(args.samples.clone());
    }
    if !args.fields.is_empty() {
        options.variants.fields = Some(args.fields.clone());
    }
    if !args.calldata_fields.is_empty() {
        options.calldata.fields = Some(args.calldata_fields.clone());
    }
    options.variants.exclude_fields.extend(args.exclude.iter().cloned());
    options
        .calldata
        .exclude_fields
        .extend(args.exclude_calldata.iter().cloned());
    options.flatten_filter |= args.flatten_filter;
    options.svlen |= args.svlen;
    options.progress |= args.progress;

    options.validate()?;
    Ok(options)
}

fn print_report(output: &DecodeOutput) {
    for (title, table) in [
        ("variants", output.variants.as_ref()),
        ("calldata", output.calldata.as_ref()),
    ] {
        let Some(table) = table else {
            continue;
        };
        println!("{title}: {} rows", table.len());
        print_columns(table);
    }

    if !output.diagnostics.is_empty() {
        println!("diagnostics:");
        for diagnostic in &output.diagnostics {
            println!("  {diagnostic}");
        }
    }
}

fn print_columns(table: &Table) {
    let width = table.names().map(str::len).max().unwrap_or(0);
    for (spec, array) in table.columns() {
        println!(
            "  {:<width$}  {:<4}  ({})",
            spec.name,
            array.type_label(),
            array.shape().iter().join(", ")
        );
    }
}

// ========================================================================================
//
//                                    DECODE SESSION
//
// ========================================================================================
//
// One session is one pass: read the header, resolve both layouts, then stream record
// lines (optionally through the tabix index) into the table builders. Nothing here is
// shared between sessions, so partitioned decoding simply runs several of them.

use crate::error::{DecodeError, Diagnostic, Diagnostics};
use crate::header::{HeaderParser, HeaderSchema};
use crate::layout::{ResolvedLayouts, resolve};
use crate::options::DecodeOptions;
use crate::record::RecordDecoder;
use crate::region::{IndexedSource, Region, TabixSource, locate_index};
use crate::shared::files::{PROGRESS_UPDATE_BATCH_SIZE, TextSource, open_text_source};
use crate::table::{CalldataTable, RowSelection, RowVerdict, Table, TableBuilder, VariantsTable};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Instant;

/// Which tables a pass should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tables {
    Variants,
    Calldata,
    Both,
}

impl Tables {
    fn variants(self) -> bool {
        matches!(self, Tables::Variants | Tables::Both)
    }

    fn calldata(self) -> bool {
        matches!(self, Tables::Calldata | Tables::Both)
    }
}

/// Everything one decode produced.
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub variants: Option<VariantsTable>,
    pub calldata: Option<CalldataTable>,
    pub schema: HeaderSchema,
    /// Header, layout and body diagnostics, in the order they were first seen.
    pub diagnostics: Vec<Diagnostic>,
}

enum Input {
    Stream {
        source: Box<dyn TextSource>,
        /// The first record line, consumed while looking for the end of the header.
        pending: Option<String>,
        line_number: usize,
    },
    Indexed {
        source: TabixSource,
        region: Region,
    },
}

pub struct Session {
    schema: HeaderSchema,
    layouts: ResolvedLayouts,
    input: Input,
    options: DecodeOptions,
}

impl Session {
    /// Opens a VCF on disk. Region queries go through the tabix index.
    pub fn open(path: &Path, options: &DecodeOptions) -> Result<Self, DecodeError> {
        options.validate()?;
        let region = parse_region(options)?;
        let index_path = match &region {
            Some(_) => Some(locate_index(path, options.index.as_deref()).ok_or_else(|| {
                DecodeError::Config(format!(
                    "a region was requested but no tabix index was found for {}",
                    path.display()
                ))
            })?),
            None => None,
        };

        let mut source = open_text_source(path)?;
        let (schema, pending, line_number) = read_header(source.as_mut())?;
        let layouts = resolve(&schema, options)?;

        let input = match (region, index_path) {
            (Some(region), Some(index_path)) => {
                debug!("Querying {region} through {}", index_path.display());
                Input::Indexed {
                    source: TabixSource::open(path, &index_path)?,
                    region,
                }
            }
            _ => Input::Stream {
                source,
                pending,
                line_number,
            },
        };

        Ok(Self {
            schema,
            layouts,
            input,
            options: options.clone(),
        })
    }

    /// Opens an already-open line source, e.g. in-memory text. Region queries are
    /// not available here since there is no index.
    pub fn from_source(
        mut source: Box<dyn TextSource>,
        options: &DecodeOptions,
    ) -> Result<Self, DecodeError> {
        options.validate()?;
        if options.region.is_some() {
            return Err(DecodeError::Config(format!(
                "a region was requested but {} has no tabix index",
                source.display_name()
            )));
        }
        let (schema, pending, line_number) = read_header(source.as_mut())?;
        let layouts = resolve(&schema, options)?;
        Ok(Self {
            schema,
            layouts,
            input: Input::Stream {
                source,
                pending,
                line_number,
            },
            options: options.clone(),
        })
    }

    pub fn schema(&self) -> &HeaderSchema {
        &self.schema
    }

    pub fn layouts(&self) -> &ResolvedLayouts {
        &self.layouts
    }

    /// Decodes every selected record and freezes the requested tables.
    pub fn run(self, tables: Tables) -> Result<DecodeOutput, DecodeError> {
        let Session {
            schema,
            layouts,
            input,
            options,
        } = self;
        let start_time = Instant::now();

        let mut variants = tables
            .variants()
            .then(|| TableBuilder::new(&layouts.variants, None));
        let mut calldata = tables
            .calldata()
            .then(|| TableBuilder::new(&layouts.calldata, Some(layouts.sample_names.len())));
        let mut decoder = RecordDecoder::new(&schema, &layouts);
        let mut selection = RowSelection::new(options.slice.clone(), options.count);
        let progress = options.progress.then(create_progress_spinner);

        let mut record_index = 0usize;
        let mut since_update = 0u64;
        let mut visit = |line: &str| -> Result<bool, DecodeError> {
            if line.is_empty() || line.starts_with('#') {
                return Ok(true);
            }
            let row = record_index;
            record_index += 1;
            match selection.check(row) {
                RowVerdict::Stop => return Ok(false),
                RowVerdict::Skip => return Ok(true),
                RowVerdict::Keep => {}
            }
            decoder.decode_line(line, row, variants.as_mut(), calldata.as_mut())?;

            since_update += 1;
            if since_update == PROGRESS_UPDATE_BATCH_SIZE {
                if let Some(pb) = &progress {
                    pb.inc(since_update);
                }
                since_update = 0;
            }
            Ok(true)
        };

        match input {
            Input::Stream {
                mut source,
                pending,
                mut line_number,
            } => {
                let name = source.display_name().to_string();
                let mut more = match pending {
                    Some(line) => visit(&line)?,
                    None => true,
                };
                while more {
                    let Some(bytes) = source.next_line()? else {
                        break;
                    };
                    line_number += 1;
                    let line = std::str::from_utf8(bytes).map_err(|source| DecodeError::Utf8 {
                        path: name.clone(),
                        line: line_number,
                        source,
                    })?;
                    more = visit(line)?;
                }
            }
            Input::Indexed { mut source, region } => {
                source.for_each_line(&region, &mut visit)?;
            }
        }

        if let Some(pb) = &progress {
            pb.inc(since_update);
            pb.finish_and_clear();
        }

        let mut diagnostics = schema.diagnostics.clone();
        diagnostics.extend(layouts.diagnostics.as_slice().iter().cloned());
        diagnostics.extend(decoder.into_diagnostics().into_vec());

        let mask = options.condition.as_deref();
        let variants = variants.map(|builder| builder.finish(mask, Vec::new())).transpose()?;
        let calldata = calldata
            .map(|builder| builder.finish(mask, layouts.sample_names.clone()))
            .transpose()?;

        info!(
            "Decoded {} records ({} rows kept) in {:.2?}",
            record_index,
            variants
                .as_ref()
                .or(calldata.as_ref())
                .map_or(0, Table::len),
            start_time.elapsed()
        );

        Ok(DecodeOutput {
            variants,
            calldata,
            schema,
            diagnostics: diagnostics.into_vec(),
        })
    }
}

fn parse_region(options: &DecodeOptions) -> Result<Option<Region>, DecodeError> {
    options
        .region
        .as_deref()
        .map(str::parse::<Region>)
        .transpose()
}

/// Reads header lines up to and including `#CHROM`. Returns the schema, the first
/// record line if it was already consumed, and the number of lines read.
fn read_header(
    source: &mut dyn TextSource,
) -> Result<(HeaderSchema, Option<String>, usize), DecodeError> {
    let name = source.display_name().to_string();
    let mut parser = HeaderParser::default();
    let mut line_number = 0usize;
    let mut pending = None;
    while let Some(bytes) = source.next_line()? {
        line_number += 1;
        let line = std::str::from_utf8(bytes).map_err(|source| DecodeError::Utf8 {
            path: name.clone(),
            line: line_number,
            source,
        })?;
        if line.is_empty() {
            continue;
        }
        if !parser.push(line) {
            pending = Some(line.to_string());
            break;
        }
        if parser.is_complete() {
            break;
        }
    }
    Ok((parser.finish(), pending, line_number))
}

fn create_progress_spinner() -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(None, draw_target);
    if let Ok(style) =
        ProgressStyle::with_template("\n> [{elapsed_precise}] {spinner:.cyan} {pos} records {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message("decoding");
    pb
}

// ========================================================================================
//                                     Public API
// ========================================================================================

/// Decodes both tables in one pass.
pub fn decode(path: &Path, options: &DecodeOptions) -> Result<DecodeOutput, DecodeError> {
    Session::open(path, options)?.run(Tables::Both)
}

/// Decodes both tables from an already-open line source.
pub fn decode_source(
    source: Box<dyn TextSource>,
    options: &DecodeOptions,
) -> Result<DecodeOutput, DecodeError> {
    Session::from_source(source, options)?.run(Tables::Both)
}

pub fn variants(path: &Path, options: &DecodeOptions) -> Result<VariantsTable, DecodeError> {
    let output = Session::open(path, options)?.run(Tables::Variants)?;
    output
        .variants
        .ok_or_else(|| DecodeError::Config("variants table was not built".to_string()))
}

pub fn calldata(path: &Path, options: &DecodeOptions) -> Result<CalldataTable, DecodeError> {
    let output = Session::open(path, options)?.run(Tables::Calldata)?;
    output
        .calldata
        .ok_or_else(|| DecodeError::Config("calldata table was not built".to_string()))
}

/// Decodes each contig in its own indexed pass on the rayon pool and stacks the
/// results in the order the contigs were given.
pub fn decode_by_contig(
    path: &Path,
    contigs: &[String],
    options: &DecodeOptions,
) -> Result<DecodeOutput, DecodeError> {
    if contigs.is_empty() {
        return Err(DecodeError::Config(
            "partitioned decoding needs at least one contig".to_string(),
        ));
    }
    if options.count.is_some() || options.slice.is_some() || options.condition.is_some() {
        return Err(DecodeError::Config(
            "count, slice and condition cannot be combined with partitioned decoding".to_string(),
        ));
    }
    if options.region.is_some() {
        return Err(DecodeError::Config(
            "partitioned decoding sets its own regions; remove the region option".to_string(),
        ));
    }

    let parts = contigs
        .par_iter()
        .map(|contig| {
            let mut part_options = options.clone();
            part_options.region = Some(contig.clone());
            part_options.progress = false;
            decode(path, &part_options)
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Decoded {} contig partitions of {}", parts.len(), path.display());

    let mut diagnostics = Diagnostics::default();
    let mut variant_parts = Vec::with_capacity(parts.len());
    let mut calldata_parts = Vec::with_capacity(parts.len());
    let mut schema = None;
    for part in parts {
        diagnostics.extend(part.diagnostics);
        variant_parts.extend(part.variants);
        calldata_parts.extend(part.calldata);
        schema.get_or_insert(part.schema);
    }
    let schema = schema.ok_or_else(|| DecodeError::Config("no partitions were decoded".to_string()))?;

    Ok(DecodeOutput {
        variants: Some(Table::concat(variant_parts)?),
        calldata: Some(Table::concat(calldata_parts)?),
        schema,
        diagnostics: diagnostics.into_vec(),
    })
}

// ========================================================================================
//                                    Record decoder
// ========================================================================================
//
// Turns one tab-delimited record line into one row of the variants table and/or one
// row of the calldata table. All decisions about shape were made by the layout
// resolver; this module only routes tokens to columns.

use crate::coerce::{coerce_into, decode_filter, push_element};
use crate::error::{DecodeError, Diagnostic, Diagnostics};
use crate::genotype::{MISSING_ALLELE, decode_gt_into};
use crate::header::HeaderSchema;
use crate::layout::{ResolvedLayouts, Source};
use crate::table::TableBuilder;
use crate::transform::Transformer;
use crate::types::{
    Category, FILTER_COLUMN_INDEX, FIXED_COLUMN_COUNT, FORMAT_COLUMN_INDEX, FixedColumn,
    INFO_COLUMN_INDEX, MISSING, Synthetic, ValueKind,
};
use ahash::{AHashMap, AHashSet};
use std::borrow::Cow;

type Span = (usize, usize);

#[derive(Debug, Clone)]
enum VariantCell {
    Fixed(FixedColumn),
    Filter(usize),
    Info(usize),
    Transformed {
        slot: usize,
        sub: usize,
        transformer: Transformer,
    },
    Synthetic(Synthetic),
}

#[derive(Debug, Clone, Copy)]
enum CallCell {
    Format(usize),
    IsCalled,
    IsPhased,
    Genotype,
}

pub struct RecordDecoder<'a> {
    schema: &'a HeaderSchema,
    layouts: &'a ResolvedLayouts,
    variant_plan: Vec<VariantCell>,
    info_lookup: AHashMap<String, usize>,
    call_plan: Vec<CallCell>,
    format_lookup: AHashMap<String, usize>,
    gt_slot: Option<usize>,
    decode_genotypes: bool,

    columns: Vec<Span>,
    info_values: Vec<Option<Span>>,
    filter_flags: Vec<bool>,
    format_positions: Vec<Option<usize>>,
    sample_parts: Vec<Span>,
    cells: Vec<Option<Span>>,
    calls: Vec<(bool, bool)>,
    alleles: Vec<i64>,

    reported: AHashSet<(Category, String)>,
    diagnostics: Diagnostics,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(schema: &'a HeaderSchema, layouts: &'a ResolvedLayouts) -> Self {
        let mut info_lookup = AHashMap::new();
        let mut variant_plan = Vec::with_capacity(layouts.variants.len());
        for spec in layouts.variants.columns() {
            let cell = match &spec.source {
                Source::Fixed(fixed) => VariantCell::Fixed(*fixed),
                Source::Filter(id) => {
                    let index = layouts
                        .filter_ids
                        .iter()
                        .position(|known| known == id)
                        .unwrap_or_default();
                    VariantCell::Filter(index)
                }
                Source::Info(field) | Source::Format(field) => {
                    VariantCell::Info(slot_for(&mut info_lookup, field))
                }
                Source::Transformed { field, sub } => {
                    let slot = slot_for(&mut info_lookup, field);
                    match layouts.transformers.get(field) {
                        Some(transformer) => VariantCell::Transformed {
                            slot,
                            sub: *sub,
                            transformer: *transformer,
                        },
                        None => VariantCell::Info(slot),
                    }
                }
                Source::Synthetic(column) => VariantCell::Synthetic(*column),
            };
            variant_plan.push(cell);
        }

        let mut format_lookup = AHashMap::new();
        let mut call_plan = Vec::with_capacity(layouts.calldata.len());
        let mut decode_genotypes = false;
        for spec in layouts.calldata.columns() {
            let cell = match &spec.source {
                Source::Synthetic(Synthetic::IsCalled) => CallCell::IsCalled,
                Source::Synthetic(Synthetic::IsPhased) => CallCell::IsPhased,
                Source::Synthetic(_) => CallCell::Genotype,
                Source::Format(field) | Source::Info(field) => {
                    CallCell::Format(slot_for(&mut format_lookup, field))
                }
                Source::Fixed(fixed) => CallCell::Format(slot_for(&mut format_lookup, fixed.name())),
                Source::Filter(id) | Source::Transformed { field: id, .. } => {
                    CallCell::Format(slot_for(&mut format_lookup, id))
                }
            };
            decode_genotypes |= !matches!(cell, CallCell::Format(_));
            call_plan.push(cell);
        }
        let gt_slot = decode_genotypes.then(|| slot_for(&mut format_lookup, "GT"));

        let sample_count = layouts.sample_indices.len();
        Self {
            schema,
            layouts,
            info_values: vec![None; info_lookup.len()],
            format_positions: vec![None; format_lookup.len()],
            cells: vec![None; format_lookup.len() * sample_count],
            calls: vec![(false, false); sample_count],
            alleles: vec![MISSING_ALLELE; layouts.ploidy * sample_count],
            variant_plan,
            info_lookup,
            call_plan,
            format_lookup,
            gt_slot,
            decode_genotypes,
            columns: Vec::with_capacity(FIXED_COLUMN_COUNT + 1 + sample_count),
            filter_flags: Vec::with_capacity(layouts.filter_ids.len()),
            sample_parts: Vec::new(),
            reported: AHashSet::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Decodes one record. `row` is the record's index in decode order and is
    /// only used to report errors.
    pub fn decode_line(
        &mut self,
        line: &str,
        row: usize,
        variants: Option<&mut TableBuilder>,
        calldata: Option<&mut TableBuilder>,
    ) -> Result<(), DecodeError> {
        split_spans(line, b'\t', 0, &mut self.columns);
        if let Some(builder) = variants {
            self.decode_variant(line, row, builder)?;
            builder.commit_row();
        }
        if let Some(builder) = calldata {
            self.decode_calls(line, row, builder)?;
            builder.commit_row();
        }
        Ok(())
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    fn column<'l>(&self, line: &'l str, index: usize) -> Option<&'l str> {
        self.columns.get(index).map(|&(start, end)| &line[start..end])
    }

    fn report_undeclared(&mut self, category: Category, key: &str) {
        let declared = match category {
            Category::Info => self.schema.info(key).is_some(),
            _ => self.schema.format(key).is_some(),
        };
        if declared || self.reported.contains(&(category, key.to_string())) {
            return;
        }
        self.reported.insert((category, key.to_string()));
        self.diagnostics.push(Diagnostic::UndeclaredField {
            category,
            id: key.to_string(),
        });
    }

    fn decode_variant(
        &mut self,
        line: &str,
        row: usize,
        builder: &mut TableBuilder,
    ) -> Result<(), DecodeError> {
        let layouts = self.layouts;
        self.route_info(line);

        let mut unknown = Vec::new();
        let filter = self.column(line, FILTER_COLUMN_INDEX);
        decode_filter(filter, &layouts.filter_ids, &mut self.filter_flags, |id| {
            unknown.push(id)
        });
        for id in unknown {
            if !self.reported.contains(&(Category::Filter, id.to_string())) {
                self.reported.insert((Category::Filter, id.to_string()));
                self.diagnostics
                    .push(Diagnostic::UnknownFilter { id: id.to_string() });
            }
        }

        let reference = self.column(line, FixedColumn::Ref.index());
        let alternates = self.column(line, FixedColumn::Alt.index());
        let mut transformed: Option<(usize, Vec<Vec<Option<Cow<'_, str>>>>)> = None;
        let columns = layouts.variants.columns();

        for (i, (cell, spec)) in self.variant_plan.iter().zip(columns).enumerate() {
            let out = builder.buffer(i);
            match cell {
                VariantCell::Fixed(fixed) => {
                    coerce_into(self.column(line, fixed.index()), spec, row, out)?;
                }
                VariantCell::Filter(index) => {
                    out.push_flag(self.filter_flags.get(*index).copied().unwrap_or(false));
                }
                VariantCell::Info(slot) => {
                    let raw = self.info_values[*slot].map(|(start, end)| &line[start..end]);
                    coerce_into(raw, spec, row, out)?;
                }
                VariantCell::Transformed {
                    slot,
                    sub,
                    transformer,
                } => {
                    if transformed.as_ref().map(|(cached, _)| *cached) != Some(*slot) {
                        let raw = self.info_values[*slot].map(|(start, end)| &line[start..end]);
                        transformed = Some((*slot, split_occurrences(transformer, raw, spec.width())));
                    }
                    if let Some((_, occurrences)) = &transformed {
                        for parts in occurrences {
                            let token = parts.get(*sub).and_then(|part| part.as_deref());
                            push_element(token, spec, row, out)?;
                        }
                    }
                }
                VariantCell::Synthetic(Synthetic::NumAlleles) => {
                    out.push_integer(1 + alt_alleles(alternates).count() as i64);
                }
                VariantCell::Synthetic(Synthetic::IsSnp) => {
                    out.push_flag(is_snp(reference, alternates));
                }
                VariantCell::Synthetic(Synthetic::Svlen) => {
                    let ref_len = reference
                        .filter(|r| !r.is_empty() && *r != MISSING)
                        .map(|r| r.len() as i64);
                    let mut lengths = alternates
                        .filter(|a| *a != MISSING)
                        .into_iter()
                        .flat_map(|a| a.split(','));
                    for _ in 0..spec.width() {
                        match (ref_len, lengths.next()) {
                            (Some(ref_len), Some(alt)) if !is_symbolic(alt) => {
                                out.push_integer(alt.len() as i64 - ref_len)
                            }
                            _ => out.push_scalar(&spec.missing),
                        }
                    }
                }
                VariantCell::Synthetic(_) => out.push_scalar(&spec.missing),
            }
        }
        Ok(())
    }

    /// Records where each INFO key's value sits in `line`. Bare keys get an
    /// empty span so flags see them as present.
    fn route_info(&mut self, line: &str) {
        self.info_values.fill(None);
        let Some(&(start, end)) = self.columns.get(INFO_COLUMN_INDEX) else {
            return;
        };
        let info = &line[start..end];
        if info.is_empty() || info == MISSING {
            return;
        }

        let mut offset = start;
        for token in info.split(';') {
            let token_start = offset;
            offset += token.len() + 1;
            if token.is_empty() {
                continue;
            }
            let (key, value_span) = match token.split_once('=') {
                Some((key, value)) => {
                    let value_start = token_start + key.len() + 1;
                    (key, (value_start, value_start + value.len()))
                }
                None => (token, (token_start + token.len(), token_start + token.len())),
            };
            match self.info_lookup.get(key) {
                Some(&slot) => {
                    if self.info_values[slot].is_none() {
                        self.info_values[slot] = Some(value_span);
                    }
                }
                None => self.report_undeclared(Category::Info, key),
            }
        }
    }

    fn decode_calls(
        &mut self,
        line: &str,
        row: usize,
        builder: &mut TableBuilder,
    ) -> Result<(), DecodeError> {
        let layouts = self.layouts;
        self.route_format(line);

        let samples = layouts.sample_indices.len();
        let ploidy = layouts.ploidy;
        let slots = self.format_lookup.len();

        if self.decode_genotypes {
            for sample in 0..samples {
                let raw = self
                    .gt_slot
                    .and_then(|slot| self.cells[sample * slots + slot])
                    .map(|(start, end)| &line[start..end]);
                let alleles = &mut self.alleles[sample * ploidy..(sample + 1) * ploidy];
                self.calls[sample] =
                    decode_gt_into(raw, alleles).map_err(|allele| DecodeError::ValueParse {
                        field: "GT".to_string(),
                        row,
                        raw: allele,
                        kind: ValueKind::Integer,
                    })?;
            }
        }

        let columns = layouts.calldata.columns();
        for (i, (cell, spec)) in self.call_plan.iter().zip(columns).enumerate() {
            let out = builder.buffer(i);
            match cell {
                CallCell::Format(slot) => {
                    for sample in 0..samples {
                        let raw = self.cells[sample * slots + slot].map(|(start, end)| &line[start..end]);
                        coerce_into(raw, spec, row, out)?;
                    }
                }
                CallCell::IsCalled => {
                    for &(called, _) in &self.calls {
                        out.push_flag(called);
                    }
                }
                CallCell::IsPhased => {
                    for &(_, phased) in &self.calls {
                        out.push_flag(phased);
                    }
                }
                CallCell::Genotype => {
                    for sample in 0..samples {
                        let alleles = &self.alleles[sample * ploidy..(sample + 1) * ploidy];
                        for slot in 0..spec.width() {
                            out.push_integer(alleles.get(slot).copied().unwrap_or(MISSING_ALLELE));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fills `cells` with the span of every (sample, FORMAT field) pair. Trailing
    /// values a sample omits stay missing.
    fn route_format(&mut self, line: &str) {
        self.format_positions.fill(None);
        self.cells.fill(None);

        let format = self
            .columns
            .get(FORMAT_COLUMN_INDEX)
            .map(|&(start, end)| &line[start..end])
            .filter(|format| !format.is_empty() && *format != MISSING);
        let Some(format) = format else {
            return;
        };
        for (position, key) in format.split(':').enumerate() {
            match self.format_lookup.get(key) {
                Some(&slot) => {
                    if self.format_positions[slot].is_none() {
                        self.format_positions[slot] = Some(position);
                    }
                }
                None => self.report_undeclared(Category::Format, key),
            }
        }

        let slots = self.format_lookup.len();
        let layouts = self.layouts;
        for (sample, &header_index) in layouts.sample_indices.iter().enumerate() {
            let Some(&(start, end)) = self.columns.get(FORMAT_COLUMN_INDEX + 1 + header_index)
            else {
                continue;
            };
            let text = &line[start..end];
            if text.is_empty() || text == MISSING {
                continue;
            }
            split_spans(text, b':', start, &mut self.sample_parts);
            for (slot, position) in self.format_positions.iter().enumerate() {
                self.cells[sample * slots + slot] =
                    position.and_then(|p| self.sample_parts.get(p).copied());
            }
        }
    }
}

fn slot_for(lookup: &mut AHashMap<String, usize>, field: &str) -> usize {
    let next = lookup.len();
    *lookup.entry(field.to_string()).or_insert(next)
}

/// Splits `text` on `separator`, recording spans offset by `base`.
fn split_spans(text: &str, separator: u8, base: usize, out: &mut Vec<Span>) {
    out.clear();
    let mut start = 0;
    for position in memchr::memchr_iter(separator, text.as_bytes()) {
        out.push((base + start, base + position));
        start = position + 1;
    }
    out.push((base + start, base + text.len()));
}

fn split_occurrences<'l>(
    transformer: &Transformer,
    raw: Option<&'l str>,
    width: usize,
) -> Vec<Vec<Option<Cow<'l, str>>>> {
    let mut occurrences: Vec<_> = raw
        .filter(|text| *text != MISSING)
        .into_iter()
        .flat_map(|text| text.split(','))
        .take(width)
        .map(|occurrence| transformer.apply(Some(occurrence)))
        .collect();
    while occurrences.len() < width {
        occurrences.push(transformer.apply(None));
    }
    occurrences
}

fn alt_alleles(alternates: Option<&str>) -> impl Iterator<Item = &str> {
    alternates
        .filter(|alt| *alt != MISSING)
        .into_iter()
        .flat_map(|alt| alt.split(','))
        .filter(|allele| !allele.is_empty() && *allele != MISSING)
}

fn is_symbolic(allele: &str) -> bool {
    allele.is_empty()
        || allele == MISSING
        || allele == "*"
        || allele.starts_with('<')
        || allele.contains(['[', ']'])
}

fn is_base(allele: &str) -> bool {
    matches!(allele.as_bytes(), [b'A' | b'C' | b'G' | b'T' | b'N' | b'a' | b'c' | b'g' | b't' | b'n'])
}

/// REF and every ALT allele are single bases, with at least one ALT allele.
fn is_snp(reference: Option<&str>, alternates: Option<&str>) -> bool {
    if !reference.is_some_and(is_base) {
        return false;
    }
    let mut any = false;
    for allele in alt_alleles(alternates) {
        if !is_base(allele) {
            return false;
        }
        any = true;
    }
    any
}

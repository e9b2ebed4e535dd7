// ========================================================================================
//                                    Layout resolver
// ========================================================================================
//
// The layout is a pure function of the header and the options. It is computed once,
// before the first record is decoded, and never changes afterwards.

use crate::coerce::Scalar;
use crate::error::{DecodeError, Diagnostic, Diagnostics};
use crate::header::HeaderSchema;
use crate::options::{DecodeOptions, FieldOptions, FillValue};
use crate::transform::TransformerTable;
use crate::types::{Category, FieldDef, FixedColumn, Number, Synthetic, ValueKind};
use ahash::{AHashMap, AHashSet};
use log::debug;

const FILTER: &str = "FILTER";

/// Where a column's values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Fixed(FixedColumn),
    Filter(String),
    Info(String),
    Format(String),
    /// Sub-column `sub` of a transformed INFO field.
    Transformed { field: String, sub: usize },
    Synthetic(Synthetic),
}

/// One resolved output column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ValueKind,
    /// 0 for flags, 1 for scalars, the element count otherwise.
    pub arity: usize,
    pub source: Source,
    /// The value written for absent or `.` input.
    pub missing: Scalar,
}

impl ColumnSpec {
    pub fn new(name: &str, kind: ValueKind, arity: usize, source: Source) -> Self {
        Self {
            name: name.to_string(),
            kind,
            arity,
            source,
            missing: Scalar::sentinel(kind),
        }
    }

    /// Values written per row (per sample, for calldata).
    pub fn width(&self) -> usize {
        self.arity.max(1)
    }
}

/// An ordered, immutable sequence of columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    columns: Vec<ColumnSpec>,
}

impl Layout {
    pub fn from_columns(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Both layouts plus the per-session decode context derived with them.
#[derive(Debug, Clone)]
pub struct ResolvedLayouts {
    pub variants: Layout,
    pub calldata: Layout,
    /// Header indices of the decoded samples, ascending.
    pub sample_indices: Vec<usize>,
    pub sample_names: Vec<String>,
    pub ploidy: usize,
    /// FILTER ids in column order, `PASS` first. Empty when FILTER is excluded.
    pub filter_ids: Vec<String>,
    pub transformers: TransformerTable,
    pub diagnostics: Diagnostics,
}

pub fn resolve(schema: &HeaderSchema, options: &DecodeOptions) -> Result<ResolvedLayouts, DecodeError> {
    options.validate()?;
    let transformers =
        TransformerTable::from_options(&options.transformers, &options.custom_transformers)?;
    let mut diagnostics = Diagnostics::default();

    let mut resolver = Resolver {
        schema,
        transformers: &transformers,
        diagnostics: &mut diagnostics,
    };
    let (variants, filter_ids) = resolver.variants(options)?;
    let calldata = resolver.calldata(options)?;
    let (sample_indices, sample_names) = select_samples(schema, options.samples.as_deref())?;

    debug!(
        "Resolved layouts: {} variant columns, {} calldata columns, {} samples",
        variants.len(),
        calldata.len(),
        sample_names.len()
    );

    Ok(ResolvedLayouts {
        variants,
        calldata,
        sample_indices,
        sample_names,
        ploidy: options.ploidy,
        filter_ids,
        transformers,
        diagnostics,
    })
}

struct Resolver<'a> {
    schema: &'a HeaderSchema,
    transformers: &'a TransformerTable,
    diagnostics: &'a mut Diagnostics,
}

impl Resolver<'_> {
    fn variants(&mut self, options: &DecodeOptions) -> Result<(Layout, Vec<String>), DecodeError> {
        let fields = &options.variants;
        let mut columns = Vec::new();

        for fixed in FixedColumn::ALL {
            if fields.is_excluded(fixed.name()) {
                continue;
            }
            let arity = match fixed {
                FixedColumn::Alt => fields.arities.get(fixed.name()).copied().unwrap_or(1).max(1),
                _ => 1,
            };
            let mut spec = ColumnSpec::new(fixed.name(), fixed.kind(), arity, Source::Fixed(fixed));
            apply_fill(&mut spec, fields)?;
            columns.push(spec);
        }

        let mut filter_ids = Vec::new();
        if !fields.is_excluded(FILTER) {
            for id in self.schema.filter_ids() {
                let name = if options.flatten_filter {
                    format!("FILTER_{id}")
                } else {
                    format!("FILTER.{id}")
                };
                columns.push(ColumnSpec::new(
                    &name,
                    ValueKind::Flag,
                    0,
                    Source::Filter(id.to_string()),
                ));
                filter_ids.push(id.to_string());
            }
        }

        let declared: Vec<&str> = self.schema.info.iter().map(|d| d.id.as_str()).collect();
        for id in candidates(&declared, fields) {
            let def = self.schema.info(&id);
            if def.is_none() {
                self.diagnostics.push(Diagnostic::UndeclaredField {
                    category: Category::Info,
                    id: id.clone(),
                });
            }
            let (kind, arity) = self.kind_and_arity(&id, def, fields)?;

            if let Some(transformer) = self.transformers.get(&id) {
                for (sub, (sub_name, sub_kind)) in transformer.sub_fields.iter().enumerate() {
                    let name = format!("{id}.{sub_name}");
                    let source = Source::Transformed {
                        field: id.clone(),
                        sub,
                    };
                    columns.push(ColumnSpec::new(&name, *sub_kind, arity.max(1), source));
                }
                continue;
            }

            let mut spec = ColumnSpec::new(&id, kind, arity, Source::Info(id.clone()));
            apply_fill(&mut spec, fields)?;
            columns.push(spec);
        }

        let synthetic = [
            (Synthetic::NumAlleles, options.num_alleles, ValueKind::Integer),
            (Synthetic::IsSnp, options.is_snp, ValueKind::Flag),
            (Synthetic::Svlen, options.svlen, ValueKind::Integer),
        ];
        for (column, enabled, kind) in synthetic {
            let name = column.name();
            if fields.is_excluded(name) || !(enabled || fields.is_requested(name)) {
                continue;
            }
            let arity = match (column, kind) {
                (_, ValueKind::Flag) => 0,
                (Synthetic::Svlen, _) => fields.arities.get(name).copied().unwrap_or(1).max(1),
                _ => 1,
            };
            columns.push(ColumnSpec::new(name, kind, arity, Source::Synthetic(column)));
        }

        ensure_unique(&columns, "variants")?;
        Ok((Layout::from_columns(columns), filter_ids))
    }

    fn calldata(&mut self, options: &DecodeOptions) -> Result<Layout, DecodeError> {
        let fields = &options.calldata;
        let mut columns = Vec::new();

        let declared: Vec<&str> = self.schema.format.iter().map(|d| d.id.as_str()).collect();
        for id in candidates(&declared, fields) {
            let def = self.schema.format(&id);
            if def.is_none() {
                self.diagnostics.push(Diagnostic::UndeclaredField {
                    category: Category::Format,
                    id: id.clone(),
                });
            }
            let (kind, arity) = self.kind_and_arity(&id, def, fields)?;
            let mut spec = ColumnSpec::new(&id, kind, arity, Source::Format(id.clone()));
            apply_fill(&mut spec, fields)?;
            columns.push(spec);
        }

        let genotype = [
            (Synthetic::IsCalled, ValueKind::Flag, 0),
            (Synthetic::IsPhased, ValueKind::Flag, 0),
            (Synthetic::Genotype, ValueKind::Integer, options.ploidy),
        ];
        for (column, kind, arity) in genotype {
            if fields.is_excluded(column.name()) {
                continue;
            }
            columns.push(ColumnSpec::new(column.name(), kind, arity, Source::Synthetic(column)));
        }

        ensure_unique(&columns, "calldata")?;
        Ok(Layout::from_columns(columns))
    }

    /// Overrides win. Symbolic numbers without an override fall back to one value.
    fn kind_and_arity(
        &mut self,
        id: &str,
        def: Option<&FieldDef>,
        fields: &FieldOptions,
    ) -> Result<(ValueKind, usize), DecodeError> {
        let kind = fields
            .types
            .get(id)
            .copied()
            .or(def.map(|d| d.kind))
            .unwrap_or(ValueKind::String);
        let override_arity = fields.arities.get(id).copied();

        if kind == ValueKind::Flag {
            return match override_arity {
                Some(n) if n > 1 => Err(DecodeError::Config(format!(
                    "field '{id}' is a Flag and cannot have arity {n}"
                ))),
                _ => Ok((kind, 0)),
            };
        }

        let arity = match (override_arity, def.map(|d| d.number)) {
            (Some(0), _) => {
                return Err(DecodeError::Config(format!(
                    "field '{id}' is {kind} and needs an arity of at least 1"
                )));
            }
            (Some(n), _) => n,
            (None, Some(Number::Fixed(n))) => n.max(1),
            (None, Some(number)) => {
                self.diagnostics.push(Diagnostic::AmbiguousArity {
                    field: id.to_string(),
                    number: number.to_string(),
                });
                1
            }
            (None, None) => 1,
        };
        Ok((kind, arity))
    }
}

/// Non-fixed field ids to decode, in output order.
fn candidates(declared: &[&str], fields: &FieldOptions) -> Vec<String> {
    let is_reserved = |name: &str| {
        name == FILTER
            || FixedColumn::ALL.iter().any(|f| f.name() == name)
            || Synthetic::from_name(name).is_some()
    };

    let mut seen = AHashSet::new();
    let ordered: Vec<&str> = match &fields.fields {
        Some(requested) => requested.iter().map(String::as_str).collect(),
        None => declared.to_vec(),
    };
    ordered
        .into_iter()
        .filter(|name| !is_reserved(name) && !fields.is_excluded(name))
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

fn apply_fill(spec: &mut ColumnSpec, fields: &FieldOptions) -> Result<(), DecodeError> {
    let Some(fill) = fields.fills.get(&spec.name) else {
        return Ok(());
    };
    let missing = match (spec.kind, fill) {
        (ValueKind::Integer, FillValue::Integer(v)) => Scalar::Integer(*v),
        (ValueKind::Float, FillValue::Float(v)) => Scalar::Float(*v),
        (ValueKind::Float, FillValue::Integer(v)) => Scalar::Float(*v as f64),
        (ValueKind::String | ValueKind::Character, FillValue::Text(v)) => Scalar::Text(v.clone()),
        (kind, other) => {
            return Err(DecodeError::Config(format!(
                "fill value {other:?} does not suit {kind} field '{}'",
                spec.name
            )));
        }
    };
    spec.missing = missing;
    Ok(())
}

fn ensure_unique(columns: &[ColumnSpec], table: &str) -> Result<(), DecodeError> {
    let mut seen = AHashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(DecodeError::Config(format!(
                "{table} column '{}' would appear twice",
                column.name
            )));
        }
    }
    Ok(())
}

fn select_samples(
    schema: &HeaderSchema,
    requested: Option<&[String]>,
) -> Result<(Vec<usize>, Vec<String>), DecodeError> {
    let Some(requested) = requested else {
        return Ok(((0..schema.samples.len()).collect(), schema.samples.clone()));
    };
    let positions: AHashMap<&str, usize> = schema
        .samples
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut indices = requested
        .iter()
        .map(|name| {
            positions
                .get(name.as_str())
                .copied()
                .ok_or_else(|| DecodeError::Config(format!("unknown sample '{name}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indices.sort_unstable();
    indices.dedup();
    let names = indices.iter().map(|&i| schema.samples[i].clone()).collect();
    Ok((indices, names))
}

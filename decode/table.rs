// ========================================================================================
//                                     Table builder
// ========================================================================================

use crate::coerce::Scalar;
use crate::error::DecodeError;
use crate::layout::{ColumnSpec, Layout};
use crate::options::RowSlice;
use crate::types::ValueKind;
use ahash::AHashMap;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

/// A growable, typed column buffer. Values of one row are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Flag(Vec<bool>),
}

impl ColumnData {
    pub fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integer => ColumnData::Integer(Vec::new()),
            ValueKind::Float => ColumnData::Float(Vec::new()),
            ValueKind::String | ValueKind::Character => ColumnData::Text(Vec::new()),
            ValueKind::Flag => ColumnData::Flag(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Flag(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_integer(&mut self, value: i64) {
        match self {
            ColumnData::Integer(v) => v.push(value),
            ColumnData::Float(v) => v.push(value as f64),
            ColumnData::Text(v) => v.push(value.to_string()),
            ColumnData::Flag(v) => v.push(value != 0),
        }
    }

    pub fn push_float(&mut self, value: f64) {
        match self {
            ColumnData::Float(v) => v.push(value),
            ColumnData::Integer(v) => v.push(value as i64),
            ColumnData::Text(v) => v.push(value.to_string()),
            ColumnData::Flag(v) => v.push(value != 0.0),
        }
    }

    pub fn push_text(&mut self, value: String) {
        match self {
            ColumnData::Text(v) => v.push(value),
            ColumnData::Integer(v) => v.push(-1),
            ColumnData::Float(v) => v.push(f64::NAN),
            ColumnData::Flag(v) => v.push(!value.is_empty()),
        }
    }

    pub fn push_flag(&mut self, value: bool) {
        match self {
            ColumnData::Flag(v) => v.push(value),
            ColumnData::Integer(v) => v.push(i64::from(value)),
            ColumnData::Float(v) => v.push(if value { 1.0 } else { 0.0 }),
            ColumnData::Text(v) => v.push(value.to_string()),
        }
    }

    pub fn push_scalar(&mut self, value: &Scalar) {
        match value {
            Scalar::Integer(v) => self.push_integer(*v),
            Scalar::Float(v) => self.push_float(*v),
            Scalar::Text(v) => self.push_text(v.clone()),
            Scalar::Flag(v) => self.push_flag(*v),
        }
    }

    pub fn into_scalars(self) -> Vec<Scalar> {
        match self {
            ColumnData::Integer(v) => v.into_iter().map(Scalar::Integer).collect(),
            ColumnData::Float(v) => v.into_iter().map(Scalar::Float).collect(),
            ColumnData::Text(v) => v.into_iter().map(Scalar::Text).collect(),
            ColumnData::Flag(v) => v.into_iter().map(Scalar::Flag).collect(),
        }
    }

    /// Keeps the rows whose mask entry is true. Each row spans `row_width` values.
    fn retain_rows(self, row_width: usize, mask: &[bool]) -> Self {
        fn keep<T>(values: Vec<T>, row_width: usize, mask: &[bool]) -> Vec<T> {
            values
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask.get(i / row_width.max(1)).copied().unwrap_or(false))
                .map(|(_, value)| value)
                .collect()
        }
        match self {
            ColumnData::Integer(v) => ColumnData::Integer(keep(v, row_width, mask)),
            ColumnData::Float(v) => ColumnData::Float(keep(v, row_width, mask)),
            ColumnData::Text(v) => ColumnData::Text(keep(v, row_width, mask)),
            ColumnData::Flag(v) => ColumnData::Flag(keep(v, row_width, mask)),
        }
    }

    fn into_array(self, shape: &[usize]) -> Result<ColumnArray, ndarray::ShapeError> {
        let shape = IxDyn(shape);
        Ok(match self {
            ColumnData::Integer(v) => ColumnArray::Integer(ArrayD::from_shape_vec(shape, v)?),
            ColumnData::Float(v) => ColumnArray::Float(ArrayD::from_shape_vec(shape, v)?),
            ColumnData::Text(v) => ColumnArray::Text(ArrayD::from_shape_vec(shape, v)?),
            ColumnData::Flag(v) => ColumnArray::Flag(ArrayD::from_shape_vec(shape, v)?),
        })
    }
}

/// A finalized column. The first axis is rows; calldata columns have a sample
/// axis next; columns with arity above one end with an element axis.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnArray {
    Integer(ArrayD<i64>),
    Float(ArrayD<f64>),
    Text(ArrayD<String>),
    Flag(ArrayD<bool>),
}

impl ColumnArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            ColumnArray::Integer(a) => a.shape(),
            ColumnArray::Float(a) => a.shape(),
            ColumnArray::Text(a) => a.shape(),
            ColumnArray::Flag(a) => a.shape(),
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            ColumnArray::Integer(_) => "i64",
            ColumnArray::Float(_) => "f64",
            ColumnArray::Text(_) => "str",
            ColumnArray::Flag(_) => "bool",
        }
    }

    fn concatenate(parts: &[&ColumnArray]) -> Result<ColumnArray, ndarray::ShapeError> {
        macro_rules! join {
            ($variant:ident) => {{
                let views: Vec<_> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ColumnArray::$variant(a) => Some(a.view()),
                        _ => None,
                    })
                    .collect();
                if views.len() != parts.len() {
                    return Err(ndarray::ShapeError::from_kind(
                        ndarray::ErrorKind::IncompatibleLayout,
                    ));
                }
                ColumnArray::$variant(ndarray::concatenate(Axis(0), &views)?)
            }};
        }
        let Some(first) = parts.first() else {
            return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape));
        };
        Ok(match first {
            ColumnArray::Integer(_) => join!(Integer),
            ColumnArray::Float(_) => join!(Float),
            ColumnArray::Text(_) => join!(Text),
            ColumnArray::Flag(_) => join!(Flag),
        })
    }
}

/// An immutable decoded table. Variants tables have no samples.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<(ColumnSpec, ColumnArray)>,
    index: AHashMap<String, usize>,
    samples: Vec<String>,
    rows: usize,
}

pub type VariantsTable = Table;
pub type CalldataTable = Table;

impl Table {
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(spec, _)| spec.name.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&ColumnSpec, &ColumnArray)> {
        self.columns.iter().map(|(spec, array)| (spec, array))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnArray> {
        self.index.get(name).map(|&i| &self.columns[i].1)
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.index.get(name).map(|&i| &self.columns[i].0)
    }

    pub fn integers(&self, name: &str) -> Option<ArrayViewD<'_, i64>> {
        match self.column(name)? {
            ColumnArray::Integer(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Option<ArrayViewD<'_, f64>> {
        match self.column(name)? {
            ColumnArray::Float(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn strings(&self, name: &str) -> Option<ArrayViewD<'_, String>> {
        match self.column(name)? {
            ColumnArray::Text(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn flags(&self, name: &str) -> Option<ArrayViewD<'_, bool>> {
        match self.column(name)? {
            ColumnArray::Flag(a) => Some(a.view()),
            _ => None,
        }
    }

    /// A one-dimensional flag column as a row mask, e.g. `FILTER.PASS`.
    pub fn mask(&self, name: &str) -> Option<Vec<bool>> {
        let flags = self.flags(name)?;
        (flags.ndim() == 1).then(|| flags.iter().copied().collect())
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == name)
    }

    /// Stacks tables with identical layouts along the row axis, in the given order.
    pub fn concat(parts: Vec<Table>) -> Result<Table, DecodeError> {
        let Some(first) = parts.first() else {
            return Err(DecodeError::Config("no tables to concatenate".to_string()));
        };
        let mut columns = Vec::with_capacity(first.columns.len());
        for (i, (spec, _)) in first.columns.iter().enumerate() {
            let arrays: Vec<&ColumnArray> = parts
                .iter()
                .map(|part| {
                    part.columns
                        .get(i)
                        .filter(|(other, _)| other.name == spec.name)
                        .map(|(_, array)| array)
                        .ok_or_else(|| {
                            DecodeError::Config(format!(
                                "cannot concatenate tables: column {} differs",
                                spec.name
                            ))
                        })
                })
                .collect::<Result<_, _>>()?;
            let joined = ColumnArray::concatenate(&arrays).map_err(|source| DecodeError::Shape {
                column: spec.name.clone(),
                source,
            })?;
            columns.push((spec.clone(), joined));
        }
        Ok(Table {
            columns,
            index: first.index.clone(),
            samples: first.samples.clone(),
            rows: parts.iter().map(|part| part.rows).sum(),
        })
    }
}

/// Accumulates rows for one layout and freezes them into a [`Table`].
#[derive(Debug)]
pub struct TableBuilder {
    specs: Vec<ColumnSpec>,
    buffers: Vec<ColumnData>,
    samples: Option<usize>,
    rows: usize,
}

impl TableBuilder {
    /// `samples` is `None` for the variants table and the number of decoded
    /// samples for calldata.
    pub fn new(layout: &Layout, samples: Option<usize>) -> Self {
        let specs: Vec<ColumnSpec> = layout.columns().to_vec();
        let buffers = specs.iter().map(|spec| ColumnData::for_kind(spec.kind)).collect();
        Self {
            specs,
            buffers,
            samples,
            rows: 0,
        }
    }

    pub fn buffer(&mut self, column: usize) -> &mut ColumnData {
        &mut self.buffers[column]
    }

    pub fn commit_row(&mut self) {
        self.rows += 1;
    }

    /// Applies the row mask, if any, and freezes every buffer.
    pub fn finish(self, mask: Option<&[bool]>, samples: Vec<String>) -> Result<Table, DecodeError> {
        let TableBuilder {
            specs,
            buffers,
            samples: sample_count,
            rows: decoded,
        } = self;
        if let Some(mask) = mask {
            if mask.len() != decoded {
                return Err(DecodeError::Config(format!(
                    "row mask has {} entries but {decoded} rows were decoded",
                    mask.len()
                )));
            }
        }
        let rows = mask.map_or(decoded, |m| m.iter().filter(|&&keep| keep).count());

        let mut columns = Vec::with_capacity(specs.len());
        let mut index = AHashMap::with_capacity(specs.len());
        for (spec, data) in specs.into_iter().zip(buffers) {
            let data = match mask {
                Some(mask) => data.retain_rows(sample_count.unwrap_or(1) * spec.width(), mask),
                None => data,
            };
            let mut shape = vec![rows];
            shape.extend(sample_count);
            if spec.arity > 1 {
                shape.push(spec.arity);
            }
            let array = data.into_array(&shape).map_err(|source| DecodeError::Shape {
                column: spec.name.clone(),
                source,
            })?;
            index.insert(spec.name.clone(), columns.len());
            columns.push((spec, array));
        }

        Ok(Table {
            columns,
            index,
            samples,
            rows,
        })
    }
}

// ========================================================================================
//                                     Row selection
// ========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowVerdict {
    Keep,
    Skip,
    /// No later row can be kept.
    Stop,
}

/// Applies a slice and then a count cap over records in decode order.
#[derive(Debug, Clone)]
pub struct RowSelection {
    slice: Option<RowSlice>,
    count: Option<usize>,
    kept: usize,
}

impl RowSelection {
    pub fn new(slice: Option<RowSlice>, count: Option<usize>) -> Self {
        Self {
            slice,
            count,
            kept: 0,
        }
    }

    pub fn check(&mut self, index: usize) -> RowVerdict {
        if self.count.is_some_and(|count| self.kept >= count) {
            return RowVerdict::Stop;
        }
        if let Some(slice) = &self.slice {
            if slice.stop.is_some_and(|stop| index >= stop) {
                return RowVerdict::Stop;
            }
            if index < slice.start || (index - slice.start) % slice.step.max(1) != 0 {
                return RowVerdict::Skip;
            }
        }
        self.kept += 1;
        RowVerdict::Keep
    }
}

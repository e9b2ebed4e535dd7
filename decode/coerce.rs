// ========================================================================================
//                                 Value coercion engine
// ========================================================================================

use crate::error::DecodeError;
use crate::layout::ColumnSpec;
use crate::table::ColumnData;
use crate::types::{MISSING, PASS, ValueKind};

/// A single typed value. Also used as the per-column missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl Scalar {
    /// The fixed missing sentinel of a value type.
    pub fn sentinel(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integer => Scalar::Integer(-1),
            ValueKind::Float => Scalar::Float(f64::NAN),
            ValueKind::String | ValueKind::Character => Scalar::Text(MISSING.to_string()),
            ValueKind::Flag => Scalar::Flag(false),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A decoded cell: a scalar for arity 0 or 1, a fixed-length vector otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
}

/// Coerces one raw token (or its absence) according to a resolved column.
pub fn coerce(raw: Option<&str>, spec: &ColumnSpec, row: usize) -> Result<Value, DecodeError> {
    let mut data = ColumnData::for_kind(spec.kind);
    coerce_into(raw, spec, row, &mut data)?;
    let mut values = data.into_scalars();
    if spec.arity > 1 {
        Ok(Value::Vector(values))
    } else {
        let value = values.pop().unwrap_or_else(|| spec.missing.clone());
        Ok(Value::Scalar(value))
    }
}

/// Appends exactly `spec.width()` values to `out`.
pub fn coerce_into(
    raw: Option<&str>,
    spec: &ColumnSpec,
    row: usize,
    out: &mut ColumnData,
) -> Result<(), DecodeError> {
    if spec.kind == ValueKind::Flag {
        out.push_flag(raw.is_some());
        return Ok(());
    }

    let width = spec.width();
    let mut written = 0;
    if let Some(text) = raw.filter(|text| *text != MISSING) {
        for token in text.split(',').take(width) {
            push_element(Some(token), spec, row, out)?;
            written += 1;
        }
    }
    for _ in written..width {
        out.push_scalar(&spec.missing);
    }
    Ok(())
}

/// Appends one element. Empty and `.` tokens take the column's missing value.
pub fn push_element(
    token: Option<&str>,
    spec: &ColumnSpec,
    row: usize,
    out: &mut ColumnData,
) -> Result<(), DecodeError> {
    let token = match token {
        Some(token) if !token.is_empty() && token != MISSING => token,
        _ => {
            out.push_scalar(&spec.missing);
            return Ok(());
        }
    };

    match spec.kind {
        ValueKind::Integer => {
            let value = parse_integer(token).ok_or_else(|| parse_error(token, spec, row))?;
            out.push_integer(value);
        }
        ValueKind::Float => {
            let value = parse_float(token).ok_or_else(|| parse_error(token, spec, row))?;
            out.push_float(value);
        }
        ValueKind::String => out.push_text(token.to_string()),
        ValueKind::Character => {
            let first = token.chars().next().map(String::from).unwrap_or_default();
            out.push_text(first);
        }
        ValueKind::Flag => out.push_flag(true),
    }
    Ok(())
}

pub fn parse_integer(token: &str) -> Option<i64> {
    lexical_core::parse::<i64>(token.trim().as_bytes()).ok()
}

pub fn parse_float(token: &str) -> Option<f64> {
    lexical_core::parse::<f64>(token.trim().as_bytes()).ok()
}

fn parse_error(token: &str, spec: &ColumnSpec, row: usize) -> DecodeError {
    DecodeError::ValueParse {
        field: spec.name.clone(),
        row,
        raw: token.to_string(),
        kind: spec.kind,
    }
}

// ========================================================================================
//                                    FILTER decoding
// ========================================================================================

/// Decodes a FILTER token against the ordered filter ids (`PASS` first).
///
/// `.` and an absent column set every flag to false. `PASS` is exclusive: when
/// it appears, only the PASS flag is set. Ids may be separated by `;` or `,`.
/// Ids that match none of `filter_ids` are handed to `unknown`.
pub fn decode_filter<'a>(
    raw: Option<&'a str>,
    filter_ids: &[String],
    flags: &mut Vec<bool>,
    mut unknown: impl FnMut(&'a str),
) {
    flags.clear();
    flags.resize(filter_ids.len(), false);

    let Some(text) = raw.filter(|text| *text != MISSING) else {
        return;
    };
    let mut passed = false;
    for id in text.split([';', ',']).filter(|id| !id.is_empty() && *id != MISSING) {
        passed |= id == PASS;
        match filter_ids.iter().position(|known| known == id) {
            Some(i) => flags[i] = true,
            None => unknown(id),
        }
    }
    if passed {
        for (flag, id) in flags.iter_mut().zip(filter_ids) {
            *flag = id == PASS;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnSpec, Source};

    fn column(name: &str, kind: ValueKind, arity: usize) -> ColumnSpec {
        ColumnSpec::new(name, kind, arity, Source::Info(name.to_string()))
    }

    #[test]
    fn missing_numeric_tokens_become_sentinels() -> Result<(), DecodeError> {
        let dp = column("DP", ValueKind::Integer, 1);
        let af = column("AF", ValueKind::Float, 1);
        for raw in [None, Some(".")] {
            assert_eq!(coerce(raw, &dp, 0)?, Value::Scalar(Scalar::Integer(-1)));
            match coerce(raw, &af, 0)? {
                Value::Scalar(Scalar::Float(v)) => assert!(v.is_nan()),
                other => panic!("expected a float, got {other:?}"),
            }
        }
        Ok(())
    }

    #[test]
    fn missing_text_is_a_dot() -> Result<(), DecodeError> {
        let aa = column("AA", ValueKind::String, 1);
        assert_eq!(coerce(None, &aa, 0)?, Value::Scalar(Scalar::Text(".".into())));
        assert_eq!(coerce(Some("T"), &aa, 0)?, Value::Scalar(Scalar::Text("T".into())));
        Ok(())
    }

    #[test]
    fn flags_follow_key_presence() -> Result<(), DecodeError> {
        let db = column("DB", ValueKind::Flag, 0);
        assert_eq!(coerce(Some(""), &db, 0)?, Value::Scalar(Scalar::Flag(true)));
        assert_eq!(coerce(None, &db, 0)?, Value::Scalar(Scalar::Flag(false)));
        Ok(())
    }

    #[test]
    fn vectors_are_padded_and_truncated_to_arity() -> Result<(), DecodeError> {
        let ac = column("AC", ValueKind::Integer, 3);
        assert_eq!(
            coerce(Some("3,1"), &ac, 0)?,
            Value::Vector(vec![Scalar::Integer(3), Scalar::Integer(1), Scalar::Integer(-1)])
        );
        assert_eq!(
            coerce(Some("1,2,3,4,5"), &ac, 0)?,
            Value::Vector(vec![Scalar::Integer(1), Scalar::Integer(2), Scalar::Integer(3)])
        );
        assert_eq!(
            coerce(None, &ac, 0)?,
            Value::Vector(vec![Scalar::Integer(-1); 3])
        );
        assert_eq!(
            coerce(Some("4,.,6"), &ac, 0)?,
            Value::Vector(vec![Scalar::Integer(4), Scalar::Integer(-1), Scalar::Integer(6)])
        );
        Ok(())
    }

    #[test]
    fn scalar_keeps_the_first_of_several_values() -> Result<(), DecodeError> {
        let af = column("AF", ValueKind::Float, 1);
        assert_eq!(coerce(Some("0.333,0.667"), &af, 0)?, Value::Scalar(Scalar::Float(0.333)));
        Ok(())
    }

    #[test]
    fn unparsable_numbers_name_field_row_and_token() {
        let mq = column("MQ0Fraction", ValueKind::Integer, 1);
        match coerce(Some("0.03"), &mq, 2) {
            Err(DecodeError::ValueParse { field, row, raw, kind }) => {
                assert_eq!(field, "MQ0Fraction");
                assert_eq!(row, 2);
                assert_eq!(raw, "0.03");
                assert_eq!(kind, ValueKind::Integer);
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn fill_replaces_the_sentinel() -> Result<(), DecodeError> {
        let mut dp = column("DP", ValueKind::Integer, 2);
        dp.missing = Scalar::Integer(0);
        assert_eq!(
            coerce(Some("7"), &dp, 0)?,
            Value::Vector(vec![Scalar::Integer(7), Scalar::Integer(0)])
        );
        Ok(())
    }

    #[test]
    fn character_columns_keep_one_character() -> Result<(), DecodeError> {
        let c = column("C", ValueKind::Character, 1);
        assert_eq!(coerce(Some("AT"), &c, 0)?, Value::Scalar(Scalar::Text("A".into())));
        Ok(())
    }

    #[test]
    fn filter_flags_follow_the_token() {
        let ids: Vec<String> = ["PASS", "q10", "s50"].iter().map(|s| s.to_string()).collect();
        let mut flags = Vec::new();
        let mut unknown = Vec::new();

        decode_filter(Some("PASS"), &ids, &mut flags, |id| unknown.push(id));
        assert_eq!(flags, vec![true, false, false]);

        decode_filter(Some("q10"), &ids, &mut flags, |id| unknown.push(id));
        assert_eq!(flags, vec![false, true, false]);

        decode_filter(Some("."), &ids, &mut flags, |id| unknown.push(id));
        assert_eq!(flags, vec![false, false, false]);

        decode_filter(None, &ids, &mut flags, |id| unknown.push(id));
        assert_eq!(flags, vec![false, false, false]);

        decode_filter(Some("q10;s50,lowDP"), &ids, &mut flags, |id| unknown.push(id));
        assert_eq!(flags, vec![false, true, true]);
        assert_eq!(unknown, vec!["lowDP"]);
    }

    #[test]
    fn pass_clears_every_other_filter() {
        let ids: Vec<String> = ["PASS", "q10", "s50"].iter().map(|s| s.to_string()).collect();
        let mut flags = Vec::new();
        decode_filter(Some("PASS;q10"), &ids, &mut flags, |_| {});
        assert_eq!(flags, vec![true, false, false]);
        decode_filter(Some("s50,PASS"), &ids, &mut flags, |_| {});
        assert_eq!(flags, vec![true, false, false]);
    }
}

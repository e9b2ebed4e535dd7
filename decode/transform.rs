// ========================================================================================
//                               Sub-field transformers
// ========================================================================================
//
// A transformer replaces plain coercion for one INFO field. It splits each raw
// occurrence into a fixed set of named sub-values, which are then coerced with
// the sub-column's own type. Returning `None` marks the occurrence as malformed,
// and every sub-column receives its missing value.

use crate::coerce::parse_integer;
use crate::error::DecodeError;
use crate::types::ValueKind;
use ahash::AHashMap;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

pub type SplitFn = for<'a> fn(&'a str) -> Option<Vec<Option<Cow<'a, str>>>>;

#[derive(Clone, Copy)]
pub struct Transformer {
    pub name: &'static str,
    pub sub_fields: &'static [(&'static str, ValueKind)],
    pub split: SplitFn,
}

impl Transformer {
    /// Splits one occurrence, always returning exactly one entry per sub-field.
    pub fn apply<'a>(&self, raw: Option<&'a str>) -> Vec<Option<Cow<'a, str>>> {
        let width = self.sub_fields.len();
        let mut parts = raw
            .filter(|text| !text.is_empty() && *text != ".")
            .and_then(|text| (self.split)(text))
            .unwrap_or_default();
        parts.resize(width, None);
        parts
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .field("sub_fields", &self.sub_fields)
            .finish()
    }
}

impl PartialEq for Transformer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.sub_fields == other.sub_fields
    }
}

/// Looks up a transformer shipped with the crate by name.
pub fn builtin(name: &str) -> Option<Transformer> {
    match name {
        "eff" | "EFF" => Some(EFF),
        _ => None,
    }
}

/// Transformers in effect for one session, keyed by field id.
#[derive(Debug, Clone, Default)]
pub struct TransformerTable {
    by_field: AHashMap<String, Transformer>,
}

impl TransformerTable {
    pub fn from_options(
        named: &BTreeMap<String, String>,
        custom: &[(String, Transformer)],
    ) -> Result<Self, DecodeError> {
        let mut table = Self::default();
        for (field, name) in named {
            let transformer = builtin(name).ok_or_else(|| {
                DecodeError::Config(format!("unknown transformer '{name}' for field '{field}'"))
            })?;
            table.register(field, transformer);
        }
        for (field, transformer) in custom {
            table.register(field, *transformer);
        }
        Ok(table)
    }

    pub fn register(&mut self, field: &str, transformer: Transformer) {
        self.by_field.insert(field.to_string(), transformer);
    }

    pub fn get(&self, field: &str) -> Option<&Transformer> {
        self.by_field.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

// ========================================================================================
//                                  SnpEff annotations
// ========================================================================================

pub const EFF_FIELDS: [(&str, ValueKind); 11] = [
    ("Effect", ValueKind::String),
    ("Effect_Impact", ValueKind::String),
    ("Functional_Class", ValueKind::String),
    ("Codon_Change", ValueKind::String),
    ("Amino_Acid_Change", ValueKind::String),
    ("Amino_Acid_Length", ValueKind::Integer),
    ("Gene_Name", ValueKind::String),
    ("Transcript_BioType", ValueKind::String),
    ("Gene_Coding", ValueKind::Integer),
    ("Transcript_ID", ValueKind::String),
    ("Exon", ValueKind::Integer),
];

pub const EFF: Transformer = Transformer {
    name: "eff",
    sub_fields: &EFF_FIELDS,
    split: split_eff,
};

const EFF_GENE_CODING: usize = 7;

/// `Effect(Impact|Class|Codon|AminoAcid|Length|Gene|BioType|Coding|Transcript|Exon[|...])`
fn split_eff(raw: &str) -> Option<Vec<Option<Cow<'_, str>>>> {
    let (effect, inner) = raw.strip_suffix(')')?.split_once('(')?;
    if effect.is_empty() {
        return None;
    }

    let details: Vec<&str> = inner.split('|').collect();
    if details.len() < EFF_FIELDS.len() - 1 {
        return None;
    }

    let mut parts = Vec::with_capacity(EFF_FIELDS.len());
    parts.push(Some(Cow::Borrowed(effect)));
    for (i, detail) in details.iter().take(EFF_FIELDS.len() - 1).enumerate() {
        let value = match (i, *detail) {
            (_, "") => None,
            (EFF_GENE_CODING, "CODING") => Some(Cow::Borrowed("1")),
            (EFF_GENE_CODING, "NON_CODING") => Some(Cow::Borrowed("0")),
            (EFF_GENE_CODING, _) => None,
            (_, text)
                if EFF_FIELDS[i + 1].1 == ValueKind::Integer && parse_integer(text).is_none() =>
            {
                None
            }
            (_, text) => Some(Cow::Borrowed(text)),
        };
        parts.push(value);
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(parts: Vec<Option<Cow<'_, str>>>) -> Vec<Option<String>> {
        parts
            .into_iter()
            .map(|p| p.map(|c| c.into_owned()))
            .collect()
    }

    #[test]
    fn eff_splits_a_coding_annotation() {
        let parts = owned(EFF.apply(Some(
            "STOP_GAINED(HIGH|NONSENSE|Cag/Tag|Q236*|749|NOC2L||CODING|NM_015658|)",
        )));
        assert_eq!(parts[0].as_deref(), Some("STOP_GAINED"));
        assert_eq!(parts[1].as_deref(), Some("HIGH"));
        assert_eq!(parts[3].as_deref(), Some("Cag/Tag"));
        assert_eq!(parts[4].as_deref(), Some("Q236*"));
        assert_eq!(parts[5].as_deref(), Some("749"));
        assert_eq!(parts[7], None);
        assert_eq!(parts[8].as_deref(), Some("1"));
        assert_eq!(parts[9].as_deref(), Some("NM_015658"));
        assert_eq!(parts[10], None);
    }

    #[test]
    fn eff_ignores_trailing_error_columns() {
        let parts = owned(EFF.apply(Some(
            "INTRON(MODIFIER|||||GENE1||NON_CODING|TX1|2|WARNING_TRANSCRIPT_INCOMPLETE)",
        )));
        assert_eq!(parts.len(), EFF_FIELDS.len());
        assert_eq!(parts[8].as_deref(), Some("0"));
        assert_eq!(parts[10].as_deref(), Some("2"));
    }

    #[test]
    fn unparseable_integer_sub_fields_are_missing() {
        let parts = owned(EFF.apply(Some(
            "STOP_GAINED(HIGH|NONSENSE|Cag/Tag|Q236*|abc|NOC2L||CODING|NM_015658|x2)",
        )));
        assert_eq!(parts[5], None);
        assert_eq!(parts[6].as_deref(), Some("NOC2L"));
        assert_eq!(parts[10], None);
    }

    #[test]
    fn malformed_or_absent_input_is_all_missing() {
        for raw in [None, Some("."), Some(""), Some("STOP_GAINED"), Some("(HIGH|A)"), Some("X(A|B)")] {
            let parts = EFF.apply(raw);
            assert_eq!(parts.len(), EFF_FIELDS.len());
            assert!(parts.iter().all(Option::is_none), "{raw:?}");
        }
    }

    #[test]
    fn table_resolves_builtin_names_and_rejects_unknown_ones() {
        let mut named = BTreeMap::new();
        named.insert("EFF".to_string(), "eff".to_string());
        let table = TransformerTable::from_options(&named, &[]).expect("eff is built in");
        assert_eq!(table.get("EFF"), Some(&EFF));
        assert!(table.get("ANN").is_none());

        named.insert("ANN".to_string(), "ann".to_string());
        assert!(matches!(
            TransformerTable::from_options(&named, &[]),
            Err(DecodeError::Config(_))
        ));
    }
}

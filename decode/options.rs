// ========================================================================================
//                               Caller-facing configuration
// ========================================================================================

use crate::error::DecodeError;
use crate::transform::Transformer;
use crate::types::ValueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A constant used in place of a column's default missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Field selection and overrides for one of the two tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldOptions {
    /// When set, only these fields (plus the fixed columns) are decoded, in this order.
    pub fields: Option<Vec<String>>,
    pub exclude_fields: Vec<String>,
    pub types: BTreeMap<String, ValueKind>,
    pub arities: BTreeMap<String, usize>,
    pub fills: BTreeMap<String, FillValue>,
}

impl FieldOptions {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn kind(mut self, field: &str, kind: ValueKind) -> Self {
        self.types.insert(field.to_string(), kind);
        self
    }

    pub fn arity(mut self, field: &str, arity: usize) -> Self {
        self.arities.insert(field.to_string(), arity);
        self
    }

    pub fn fill(mut self, field: &str, value: FillValue) -> Self {
        self.fills.insert(field.to_string(), value);
        self
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_fields.iter().any(|f| f == name)
    }

    pub fn is_requested(&self, name: &str) -> bool {
        self.fields
            .as_ref()
            .is_some_and(|fields| fields.iter().any(|f| f == name))
    }
}

/// Python-style `(start, stop, step)` row slice over decode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSlice {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub stop: Option<usize>,
    #[serde(default = "default_step")]
    pub step: usize,
}

fn default_step() -> usize {
    1
}

impl RowSlice {
    pub fn new(start: usize, stop: Option<usize>, step: usize) -> Self {
        Self { start, stop, step }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeOptions {
    /// `contig[:start[-end]]`, 1-based and inclusive.
    pub region: Option<String>,
    /// Tabix index path. Defaults to `<input>.tbi`.
    pub index: Option<PathBuf>,
    pub count: Option<usize>,
    pub flatten_filter: bool,
    /// Subset of samples to decode. Header order is kept regardless of the order given.
    pub samples: Option<Vec<String>>,
    pub ploidy: usize,
    pub num_alleles: bool,
    pub is_snp: bool,
    pub svlen: bool,
    pub progress: bool,
    pub slice: Option<RowSlice>,
    /// Field id to built-in transformer name.
    pub transformers: BTreeMap<String, String>,
    pub variants: FieldOptions,
    pub calldata: FieldOptions,
    /// Row mask aligned with the rows kept after slice and count.
    #[serde(skip)]
    pub condition: Option<Vec<bool>>,
    #[serde(skip)]
    pub custom_transformers: Vec<(String, Transformer)>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            region: None,
            index: None,
            count: None,
            flatten_filter: false,
            samples: None,
            ploidy: 2,
            num_alleles: true,
            is_snp: true,
            svlen: false,
            progress: false,
            slice: None,
            transformers: BTreeMap::new(),
            variants: FieldOptions::default(),
            calldata: FieldOptions::default(),
            condition: None,
            custom_transformers: Vec::new(),
        }
    }
}

impl DecodeOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, DecodeError> {
        let options: DecodeOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self, DecodeError> {
        let text = fs::read_to_string(path)
            .map_err(|e| DecodeError::Io(format!("Reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, DecodeError> {
        toml::to_string_pretty(self)
            .map_err(|e| DecodeError::Config(format!("cannot serialize options: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), DecodeError> {
        let text = self.to_toml_string()?;
        let file = fs::File::create(path)
            .map_err(|e| DecodeError::Io(format!("Creating {}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Registers a caller-provided transformer for an INFO field.
    pub fn with_transformer(mut self, field: &str, transformer: Transformer) -> Self {
        self.custom_transformers
            .push((field.to_string(), transformer));
        self
    }

    /// Checks the settings that do not depend on the input header.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.ploidy == 0 {
            return Err(DecodeError::Config("ploidy must be at least 1".to_string()));
        }
        if let Some(slice) = &self.slice {
            if slice.step == 0 {
                return Err(DecodeError::Config("slice step must be at least 1".to_string()));
            }
        }
        for (table, fields) in [("variants", &self.variants), ("calldata", &self.calldata)] {
            if let Some(requested) = &fields.fields {
                if let Some(both) = requested.iter().find(|f| fields.is_excluded(f)) {
                    return Err(DecodeError::Config(format!(
                        "{table} field '{both}' is both requested and excluded"
                    )));
                }
            }
            for (field, arity) in &fields.arities {
                let kind = fields.types.get(field);
                if kind == Some(&ValueKind::Flag) && *arity > 1 {
                    return Err(DecodeError::Config(format!(
                        "{table} field '{field}' is a Flag and cannot have arity {arity}"
                    )));
                }
                if *arity == 0 && kind.is_some_and(|k| *k != ValueKind::Flag) {
                    return Err(DecodeError::Config(format!(
                        "{table} field '{field}' needs an arity of at least 1"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_enable_allele_summaries_and_diploid_calls() {
        let options = DecodeOptions::default();
        assert_eq!(options.ploidy, 2);
        assert!(options.num_alleles);
        assert!(options.is_snp);
        assert!(!options.svlen);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn toml_overrides_are_parsed() -> Result<(), DecodeError> {
        let options = DecodeOptions::from_toml_str(
            r#"
            region = "20:1-20000"
            flatten_filter = true
            slice = { start = 0, step = 2 }

            [transformers]
            EFF = "eff"

            [variants]
            fields = ["DP", "AC"]
            types = { DP = "Integer" }
            arities = { AC = 2 }
            fills = { DP = 0, AF = 0.5, AA = "N" }

            [calldata]
            exclude_fields = ["HQ"]
            "#,
        )?;
        assert_eq!(options.region.as_deref(), Some("20:1-20000"));
        assert!(options.flatten_filter);
        assert_eq!(options.slice, Some(RowSlice::new(0, None, 2)));
        assert_eq!(options.transformers.get("EFF").map(String::as_str), Some("eff"));
        assert_eq!(options.variants.types.get("DP"), Some(&ValueKind::Integer));
        assert_eq!(options.variants.arities.get("AC"), Some(&2));
        assert_eq!(options.variants.fills.get("DP"), Some(&FillValue::Integer(0)));
        assert_eq!(options.variants.fills.get("AF"), Some(&FillValue::Float(0.5)));
        assert_eq!(
            options.variants.fills.get("AA"),
            Some(&FillValue::Text("N".to_string()))
        );
        assert!(options.calldata.is_excluded("HQ"));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DecodeOptions::from_toml_str("regoin = \"20\"").unwrap_err();
        assert!(matches!(err, DecodeError::Options(_)));
    }

    #[test]
    fn conflicting_overrides_fail_validation() {
        let options = DecodeOptions {
            variants: FieldOptions::default().fields(["DP"]).exclude(["DP"]),
            ..DecodeOptions::default()
        };
        assert!(matches!(options.validate(), Err(DecodeError::Config(_))));

        let options = DecodeOptions {
            variants: FieldOptions::default()
                .kind("DB", ValueKind::Flag)
                .arity("DB", 2),
            ..DecodeOptions::default()
        };
        assert!(matches!(options.validate(), Err(DecodeError::Config(_))));

        let options = DecodeOptions {
            slice: Some(RowSlice::new(0, None, 0)),
            ..DecodeOptions::default()
        };
        assert!(matches!(options.validate(), Err(DecodeError::Config(_))));

        let options = DecodeOptions {
            ploidy: 0,
            ..DecodeOptions::default()
        };
        assert!(matches!(options.validate(), Err(DecodeError::Config(_))));
    }

    #[test]
    fn options_survive_a_save_and_load() -> Result<(), DecodeError> {
        let dir = tempdir()?;
        let path = dir.path().join("options.toml");
        let options = DecodeOptions {
            count: Some(3),
            samples: Some(vec!["NA00001".to_string()]),
            variants: FieldOptions::default().arity("ALT", 2),
            ..DecodeOptions::default()
        };
        options.save(&path)?;
        let loaded = DecodeOptions::load(&path)?;
        assert_eq!(loaded.count, Some(3));
        assert_eq!(loaded.samples, options.samples);
        assert_eq!(loaded.variants, options.variants);
        Ok(())
    }
}

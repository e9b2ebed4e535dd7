// ========================================================================================
//                               Field schema registry
// ========================================================================================

use crate::error::{Diagnostic, Diagnostics};
use crate::types::{Category, FieldDef, Number, PASS, ValueKind};
use ahash::AHashMap;
use log::debug;

/// Everything the decoder needs to know about an input, taken from its header.
#[derive(Debug, Clone, Default)]
pub struct HeaderSchema {
    pub file_format: Option<String>,
    pub info: Vec<FieldDef>,
    pub format: Vec<FieldDef>,
    /// FILTER ids with their descriptions. `PASS` is always present and first.
    pub filters: Vec<(String, String)>,
    pub samples: Vec<String>,
    pub diagnostics: Diagnostics,
    info_index: AHashMap<String, usize>,
    format_index: AHashMap<String, usize>,
}

impl HeaderSchema {
    fn new() -> Self {
        Self {
            filters: vec![(PASS.to_string(), "All filters passed".to_string())],
            ..Self::default()
        }
    }

    pub fn info(&self, id: &str) -> Option<&FieldDef> {
        self.info_index.get(id).map(|&i| &self.info[i])
    }

    pub fn format(&self, id: &str) -> Option<&FieldDef> {
        self.format_index.get(id).map(|&i| &self.format[i])
    }

    pub fn filter_ids(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(id, _)| id.as_str())
    }

    pub fn has_filter(&self, id: &str) -> bool {
        self.filters.iter().any(|(known, _)| known == id)
    }

    fn declare(&mut self, def: FieldDef) {
        let (fields, index) = match def.category {
            Category::Info => (&mut self.info, &mut self.info_index),
            Category::Format => (&mut self.format, &mut self.format_index),
            Category::Filter => {
                self.declare_filter(def.id, def.description);
                return;
            }
        };
        if index.contains_key(&def.id) {
            self.diagnostics.push(Diagnostic::DuplicateDeclaration {
                category: def.category,
                id: def.id,
            });
            return;
        }
        index.insert(def.id.clone(), fields.len());
        fields.push(def);
    }

    fn declare_filter(&mut self, id: String, description: String) {
        if id == PASS {
            // The implicit PASS entry only picks up the declared description.
            if let Some(entry) = self.filters.first_mut() {
                entry.1 = description;
            }
            return;
        }
        if self.has_filter(&id) {
            self.diagnostics.push(Diagnostic::DuplicateDeclaration {
                category: Category::Filter,
                id,
            });
            return;
        }
        self.filters.push((id, description));
    }
}

/// Incremental header parser, fed one line at a time.
#[derive(Debug)]
pub struct HeaderParser {
    schema: HeaderSchema,
    complete: bool,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self {
            schema: HeaderSchema::new(),
            complete: false,
        }
    }
}

impl HeaderParser {
    /// Feeds one line. Returns `false` once the line is not part of the header,
    /// in which case it is left for the record decoder.
    pub fn push(&mut self, line: &str) -> bool {
        if self.complete || !line.starts_with('#') {
            return false;
        }

        if let Some(meta) = line.strip_prefix("##") {
            self.push_meta(line, meta);
        } else if line.starts_with("#CHROM") {
            self.push_column_header(line);
            self.complete = true;
        } else {
            self.schema.diagnostics.push(Diagnostic::MalformedDeclaration {
                line: line.to_string(),
                reason: "unexpected single '#' line".to_string(),
            });
        }
        true
    }

    /// True once the `#CHROM` line has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn finish(self) -> HeaderSchema {
        debug!(
            "Parsed header: {} INFO, {} FORMAT, {} FILTER, {} samples",
            self.schema.info.len(),
            self.schema.format.len(),
            self.schema.filters.len(),
            self.schema.samples.len()
        );
        self.schema
    }

    fn push_meta(&mut self, line: &str, meta: &str) {
        let Some((key, value)) = meta.split_once('=') else {
            return;
        };
        let category = match key {
            "INFO" => Category::Info,
            "FORMAT" => Category::Format,
            "FILTER" => Category::Filter,
            "fileformat" => {
                self.schema.file_format = Some(value.trim().to_string());
                return;
            }
            _ => return,
        };

        match parse_declaration(category, value) {
            Ok(def) => self.schema.declare(def),
            Err(reason) => self
                .schema
                .diagnostics
                .push(Diagnostic::MalformedDeclaration {
                    line: line.to_string(),
                    reason,
                }),
        }
    }

    fn push_column_header(&mut self, line: &str) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 8 {
            self.schema.diagnostics.push(Diagnostic::MalformedDeclaration {
                line: line.to_string(),
                reason: format!("expected at least 8 columns, found {}", columns.len()),
            });
        }
        self.schema.samples = columns
            .iter()
            .skip(9)
            .map(|name| name.to_string())
            .collect();
    }
}

/// Parses header lines until the first record line.
pub fn parse_header<I, S>(lines: I) -> HeaderSchema
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = HeaderParser::default();
    for line in lines {
        if !parser.push(line.as_ref()) {
            break;
        }
    }
    parser.finish()
}

fn parse_declaration(category: Category, value: &str) -> Result<FieldDef, String> {
    let body = value
        .trim()
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| "declaration is not enclosed in '<...>'".to_string())?;
    let attributes = parse_attributes(body)?;
    let lookup = |name: &str| {
        attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    let id = lookup("ID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "missing ID".to_string())?
        .to_string();
    let description = lookup("Description").unwrap_or_default().to_string();

    if category == Category::Filter {
        return Ok(FieldDef {
            id,
            category,
            number: Number::Fixed(0),
            kind: ValueKind::Flag,
            description,
        });
    }

    let number = lookup("Number")
        .ok_or_else(|| format!("{id}: missing Number"))?
        .parse::<Number>()
        .map_err(|e| format!("{id}: {e}"))?;
    let kind = lookup("Type")
        .ok_or_else(|| format!("{id}: missing Type"))?
        .parse::<ValueKind>()
        .map_err(|e| format!("{id}: {e}"))?;

    Ok(FieldDef {
        id,
        category,
        number,
        kind,
        description,
    })
}

/// Splits `key=value,key="quoted, value"` into pairs. Quoted values may contain
/// commas and backslash-escaped quotes.
fn parse_attributes(body: &str) -> Result<Vec<(String, String)>, String> {
    let mut attributes = Vec::new();
    let mut chars = body.chars().peekable();

    loop {
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err("empty attribute name".to_string());
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(format!("unterminated quoted value for {key}"));
            }
            match chars.next() {
                None | Some(',') => {}
                Some(other) => {
                    return Err(format!("unexpected '{other}' after quoted value for {key}"));
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ',' {
                    break;
                }
                value.push(c);
            }
        }

        attributes.push((key, value));
        if chars.peek().is_none() {
            return Ok(attributes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "##fileformat=VCFv4.0
##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">
##INFO=<ID=AF,Number=.,Type=Float,Description=\"Allele Frequency, per ALT\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">
##FILTER=<ID=q10,Description=\"Quality below 10\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002";

    #[test]
    fn parses_declarations_and_sample_names() {
        let schema = parse_header(HEADER.lines());
        assert_eq!(schema.file_format.as_deref(), Some("VCFv4.0"));
        assert_eq!(schema.info.len(), 3);
        assert_eq!(schema.format.len(), 2);
        assert_eq!(schema.samples, vec!["NA00001", "NA00002"]);
        assert!(schema.diagnostics.is_empty());

        let af = schema.info("AF").expect("AF declared");
        assert_eq!(af.number, Number::Unbounded);
        assert_eq!(af.kind, ValueKind::Float);
        assert_eq!(af.description, "Allele Frequency, per ALT");

        let hq = schema.format("HQ").expect("HQ declared");
        assert_eq!(hq.number, Number::Fixed(2));
        assert_eq!(hq.category, Category::Format);
    }

    #[test]
    fn pass_is_implicit_and_first() {
        let schema = parse_header(HEADER.lines());
        let ids: Vec<&str> = schema.filter_ids().collect();
        assert_eq!(ids, vec!["PASS", "q10"]);
    }

    #[test]
    fn explicit_pass_declaration_is_not_a_duplicate() {
        let schema = parse_header([
            "##FILTER=<ID=PASS,Description=\"All filters passed\">",
            "##FILTER=<ID=LowQual,Description=\"Low quality\">",
        ]);
        let ids: Vec<&str> = schema.filter_ids().collect();
        assert_eq!(ids, vec!["PASS", "LowQual"]);
        assert!(schema.diagnostics.is_empty());
    }

    #[test]
    fn duplicate_declaration_keeps_first_and_warns() {
        let schema = parse_header([
            "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">",
            "##INFO=<ID=DP,Number=1,Type=String,Description=\"Depth again\">",
        ]);
        assert_eq!(schema.info.len(), 1);
        assert_eq!(schema.info("DP").map(|d| d.kind), Some(ValueKind::Integer));
        assert_eq!(
            schema.diagnostics.as_slice(),
            &[Diagnostic::DuplicateDeclaration {
                category: Category::Info,
                id: "DP".into()
            }]
        );
    }

    #[test]
    fn malformed_declarations_are_skipped() {
        let schema = parse_header([
            "##INFO=<ID=X,Number=1,Description=\"no type\">",
            "##INFO=<ID=Y,Number=Q,Type=Integer>",
            "##INFO=ID=Z,Number=1,Type=Integer",
            "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"unterminated>",
            "##INFO=<ID=OK,Number=1,Type=Integer>",
        ]);
        assert_eq!(schema.info.len(), 1);
        assert!(schema.info("OK").is_some());
        assert!(schema.format.is_empty());
        assert_eq!(schema.diagnostics.as_slice().len(), 4);
    }

    #[test]
    fn escaped_quotes_survive_in_descriptions() {
        let schema =
            parse_header(["##INFO=<ID=Q,Number=1,Type=String,Description=\"say \\\"hi\\\", ok\">"]);
        assert_eq!(
            schema.info("Q").map(|d| d.description.as_str()),
            Some("say \"hi\", ok")
        );
    }

    #[test]
    fn parser_stops_at_first_record_line() {
        let mut parser = HeaderParser::default();
        assert!(parser.push("##fileformat=VCFv4.2"));
        assert!(!parser.push("20\t1\t.\tA\tC\t.\t.\t."));
        assert!(!parser.is_complete());
        let schema = parser.finish();
        assert!(schema.samples.is_empty());
    }
}

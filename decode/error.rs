use crate::types::{Category, ValueKind};
use ahash::AHashSet;
use log::warn;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error during decoding: {0}")]
    Io(String),
    #[error("cannot parse {raw:?} as {kind} for field {field} at record {row}")]
    ValueParse {
        field: String,
        row: usize,
        raw: String,
        kind: ValueKind,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("line {line} of {path} is not valid UTF-8: {source}")]
    Utf8 {
        path: String,
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("column {column} does not match its declared shape: {source}")]
    Shape {
        column: String,
        #[source]
        source: ndarray::ShapeError,
    },
    #[error("options file is not valid TOML: {0}")]
    Options(#[from] toml::de::Error),
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e.to_string())
    }
}

/// A non-fatal schema observation. Decoding continues with the stated fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    DuplicateDeclaration { category: Category, id: String },
    MalformedDeclaration { line: String, reason: String },
    UndeclaredField { category: Category, id: String },
    AmbiguousArity { field: String, number: String },
    UnknownFilter { id: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateDeclaration { category, id } => write!(
                f,
                "{category} field '{id}' is declared more than once; keeping the first definition"
            ),
            Diagnostic::MalformedDeclaration { line, reason } => {
                write!(f, "skipping malformed header line ({reason}): {line}")
            }
            Diagnostic::UndeclaredField { category, id } => write!(
                f,
                "{category} field '{id}' is not declared in the header; decoding as String"
            ),
            Diagnostic::AmbiguousArity { field, number } => write!(
                f,
                "field '{field}' has Number={number} and no arity override; using 1"
            ),
            Diagnostic::UnknownFilter { id } => {
                write!(f, "FILTER id '{id}' is not declared in the header")
            }
        }
    }
}

/// Accumulates diagnostics for one session. Each distinct diagnostic is
/// logged and kept once.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: AHashSet<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.clone()) {
            warn!("{diagnostic}");
            self.items.push(diagnostic);
        }
    }

    /// Merges diagnostics that were already logged when first pushed.
    pub fn extend<I>(&mut self, other: I)
    where
        I: IntoIterator<Item = Diagnostic>,
    {
        for diagnostic in other {
            if self.seen.insert(diagnostic.clone()) {
                self.items.push(diagnostic);
            }
        }
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

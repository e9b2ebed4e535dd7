// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types shared between the registry, the layout resolver and the decoders.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The declared value type of an INFO or FORMAT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Integer,
    Float,
    String,
    Character,
    Flag,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::Integer => "Integer",
            ValueKind::Float => "Float",
            ValueKind::String => "String",
            ValueKind::Character => "Character",
            ValueKind::Flag => "Flag",
        };
        f.write_str(label)
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Integer" => Ok(ValueKind::Integer),
            "Float" => Ok(ValueKind::Float),
            "String" => Ok(ValueKind::String),
            "Character" => Ok(ValueKind::Character),
            "Flag" => Ok(ValueKind::Flag),
            other => Err(format!("Unknown value type '{other}'")),
        }
    }
}

/// The `Number=` attribute of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Number {
    Fixed(usize),
    /// `A`: one value per ALT allele.
    PerAltAllele,
    /// `R`: one value per allele, REF included.
    PerAllele,
    /// `G`: one value per possible genotype.
    PerGenotype,
    /// `.`: unknown or unbounded.
    Unbounded,
}

impl Number {
    pub fn is_symbolic(self) -> bool {
        !matches!(self, Number::Fixed(_))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Fixed(n) => write!(f, "{n}"),
            Number::PerAltAllele => f.write_str("A"),
            Number::PerAllele => f.write_str("R"),
            Number::PerGenotype => f.write_str("G"),
            Number::Unbounded => f.write_str("."),
        }
    }
}

impl FromStr for Number {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Number::PerAltAllele),
            "R" => Ok(Number::PerAllele),
            "G" => Ok(Number::PerGenotype),
            "." => Ok(Number::Unbounded),
            digits => digits
                .parse::<usize>()
                .map(Number::Fixed)
                .map_err(|_| format!("Invalid Number '{digits}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Info,
    Format,
    Filter,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Info => "INFO",
            Category::Format => "FORMAT",
            Category::Filter => "FILTER",
        };
        f.write_str(label)
    }
}

/// One header declaration. Immutable once the header has been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub id: String,
    pub category: Category,
    pub number: Number,
    pub kind: ValueKind,
    pub description: String,
}

/// The leading fixed columns of every record, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedColumn {
    Chrom,
    Pos,
    Id,
    Ref,
    Alt,
    Qual,
}

impl FixedColumn {
    pub const ALL: [FixedColumn; 6] = [
        FixedColumn::Chrom,
        FixedColumn::Pos,
        FixedColumn::Id,
        FixedColumn::Ref,
        FixedColumn::Alt,
        FixedColumn::Qual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FixedColumn::Chrom => "CHROM",
            FixedColumn::Pos => "POS",
            FixedColumn::Id => "ID",
            FixedColumn::Ref => "REF",
            FixedColumn::Alt => "ALT",
            FixedColumn::Qual => "QUAL",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            FixedColumn::Pos => ValueKind::Integer,
            FixedColumn::Qual => ValueKind::Float,
            _ => ValueKind::String,
        }
    }

    /// Zero-based position of the column in a tab-split record.
    pub fn index(self) -> usize {
        match self {
            FixedColumn::Chrom => 0,
            FixedColumn::Pos => 1,
            FixedColumn::Id => 2,
            FixedColumn::Ref => 3,
            FixedColumn::Alt => 4,
            FixedColumn::Qual => 5,
        }
    }
}

/// Columns derived from other columns rather than read from a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Synthetic {
    NumAlleles,
    IsSnp,
    Svlen,
    IsCalled,
    IsPhased,
    Genotype,
}

impl Synthetic {
    pub fn name(self) -> &'static str {
        match self {
            Synthetic::NumAlleles => "num_alleles",
            Synthetic::IsSnp => "is_snp",
            Synthetic::Svlen => "svlen",
            Synthetic::IsCalled => "is_called",
            Synthetic::IsPhased => "is_phased",
            Synthetic::Genotype => "genotype",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "num_alleles" => Some(Synthetic::NumAlleles),
            "is_snp" => Some(Synthetic::IsSnp),
            "svlen" => Some(Synthetic::Svlen),
            "is_called" => Some(Synthetic::IsCalled),
            "is_phased" => Some(Synthetic::IsPhased),
            "genotype" => Some(Synthetic::Genotype),
            _ => None,
        }
    }
}

pub const FIXED_COLUMN_COUNT: usize = 8;
pub const FORMAT_COLUMN_INDEX: usize = 8;
pub const FILTER_COLUMN_INDEX: usize = 6;
pub const INFO_COLUMN_INDEX: usize = 7;
pub const PASS: &str = "PASS";
pub const MISSING: &str = ".";

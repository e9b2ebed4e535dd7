// ========================================================================================
//                                     Region filter
// ========================================================================================

use crate::error::DecodeError;
use log::debug;
use noodles::csi::binning_index::BinningIndex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A genomic interval, 1-based and inclusive. Missing bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub contig: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn contig(name: &str) -> Self {
        Self {
            contig: name.to_string(),
            start: None,
            end: None,
        }
    }

    #[inline]
    pub fn contains(&self, contig: &str, position: u64) -> bool {
        contig == self.contig
            && self.start.is_none_or(|start| position >= start)
            && self.end.is_none_or(|end| position <= end)
    }

    fn to_noodles(&self) -> Result<noodles::core::Region, DecodeError> {
        self.to_string()
            .parse::<noodles::core::Region>()
            .map_err(|e| DecodeError::Config(format!("invalid region '{self}': {e}")))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => write!(f, "{}", self.contig),
            (Some(start), None) => write!(f, "{}:{start}", self.contig),
            (None, Some(end)) => write!(f, "{}:1-{end}", self.contig),
            (Some(start), Some(end)) => write!(f, "{}:{start}-{end}", self.contig),
        }
    }
}

impl FromStr for Region {
    type Err = DecodeError;

    /// Parses `contig`, `contig:start` or `contig:start-end`. Thousands
    /// separators in positions are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DecodeError::Config(format!("invalid region '{s}': {reason}"));
        let text = s.trim();
        let (contig, interval) = match text.rsplit_once(':') {
            Some((contig, interval)) => (contig, Some(interval)),
            None => (text, None),
        };
        if contig.is_empty() {
            return Err(invalid("missing contig"));
        }

        let parse_position = |raw: &str| -> Result<u64, DecodeError> {
            let digits: String = raw.chars().filter(|c| *c != ',').collect();
            let position = digits
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid("positions must be positive integers"))?;
            if position == 0 {
                return Err(invalid("positions are 1-based"));
            }
            Ok(position)
        };

        let (start, end) = match interval {
            None => (None, None),
            Some(interval) => match interval.split_once('-') {
                Some((start, "")) => (Some(parse_position(start)?), None),
                Some((start, end)) => (Some(parse_position(start)?), Some(parse_position(end)?)),
                None => (Some(parse_position(interval)?), None),
            },
        };
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(invalid("start is after end"));
            }
        }

        Ok(Region {
            contig: contig.to_string(),
            start,
            end,
        })
    }
}

/// CHROM and POS of a record line, without decoding the rest of it.
pub fn record_position(line: &str) -> Option<(&str, u64)> {
    let mut columns = line.splitn(3, '\t');
    let contig = columns.next()?;
    let position = columns.next()?.parse::<u64>().ok()?;
    Some((contig, position))
}

/// Finds the tabix index for `input`, preferring an explicit path.
pub fn locate_index(input: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let mut candidate = input.as_os_str().to_owned();
    candidate.push(".tbi");
    let candidate = PathBuf::from(candidate);
    candidate.exists().then_some(candidate)
}

/// An index-backed "seek to interval, yield matching lines" capability.
pub trait IndexedSource {
    /// Contig names known to the index, in index order.
    fn contigs(&self) -> &[String];

    /// Calls `visit` with every line whose POS lies inside `region`, in file order.
    fn for_each_line(
        &mut self,
        region: &Region,
        visit: &mut dyn FnMut(&str) -> Result<bool, DecodeError>,
    ) -> Result<(), DecodeError>;
}

/// A BGZF-compressed text file with a tabix index, queried through noodles.
pub struct TabixSource {
    input: PathBuf,
    index: Option<noodles::tabix::Index>,
    contigs: Vec<String>,
}

impl TabixSource {
    pub fn open(input: &Path, index_path: &Path) -> Result<Self, DecodeError> {
        let index = noodles::tabix::fs::read(index_path)
            .map_err(|e| DecodeError::Io(format!("Reading index {}: {e}", index_path.display())))?;
        let contigs: Vec<String> = index
            .header()
            .map(|header| {
                header
                    .reference_sequence_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect()
            })
            .unwrap_or_default();
        debug!(
            "Opened tabix index {} with {} contigs",
            index_path.display(),
            contigs.len()
        );
        Ok(Self {
            input: input.to_path_buf(),
            index: Some(index),
            contigs,
        })
    }
}

impl IndexedSource for TabixSource {
    fn contigs(&self) -> &[String] {
        &self.contigs
    }

    fn for_each_line(
        &mut self,
        region: &Region,
        visit: &mut dyn FnMut(&str) -> Result<bool, DecodeError>,
    ) -> Result<(), DecodeError> {
        if !self.contigs().iter().any(|name| *name == region.contig) {
            debug!("Contig {} is not in the index; nothing to decode", region.contig);
            return Ok(());
        }
        let Some(index) = self.index.take() else {
            return Err(DecodeError::Io("tabix index was already consumed".to_string()));
        };

        let query = region.to_noodles()?;
        let mut reader = noodles::tabix::io::indexed_reader::Builder::default()
            .set_index(index)
            .build_from_path(&self.input)
            .map_err(|e| DecodeError::Io(format!("Opening {}: {e}", self.input.display())))?;
        let records = reader
            .query(&query)
            .map_err(|e| DecodeError::Io(format!("Querying {region}: {e}")))?;

        for result in records {
            let record = result.map_err(|e| DecodeError::Io(format!("Reading {region}: {e}")))?;
            let line: &str = record.as_ref();
            let inside = record_position(line)
                .is_none_or(|(contig, position)| region.contains(contig, position));
            if inside && !visit(line)? {
                break;
            }
        }
        Ok(())
    }
}

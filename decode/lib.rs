#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod coerce;
pub mod error;
pub mod genotype;
pub mod header;
pub mod layout;
pub mod options;
pub mod record;
pub mod region;
pub mod session;
pub mod table;
pub mod transform;
pub mod types;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod shared {
    pub use super::shared_files as files;
}

pub use error::{DecodeError, Diagnostic};
pub use options::DecodeOptions;
pub use session::{
    DecodeOutput, Session, Tables, calldata, decode, decode_by_contig, decode_source, variants,
};
pub use table::{CalldataTable, ColumnArray, Table, VariantsTable};

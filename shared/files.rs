use crate::error::DecodeError;
use flate2::read::MultiGzDecoder;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// The number of records to decode locally before updating the progress bar.
/// A power of 2 is often efficient
pub const PROGRESS_UPDATE_BATCH_SIZE: u64 = 1024;

const LINE_CAPACITY: usize = 1024;

/// A trait that abstracts sequential, line-oriented access to VCF text,
/// regardless of compression or where the bytes live.
pub trait TextSource: Send {
    fn len(&self) -> Option<u64> {
        None
    }

    /// A human-readable name for error messages.
    fn display_name(&self) -> &str;

    /// Returns the next line without its terminator, or `None` at end of input.
    fn next_line<'a>(&'a mut self) -> Result<Option<&'a [u8]>, DecodeError>;
}

/// Line reader over any buffered stream: plain files, gzip/BGZF files and memory.
pub struct LocalTextSource {
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    line_active: bool,
    len: Option<u64>,
    path_display: String,
}

impl LocalTextSource {
    fn new(path_display: String, reader: Box<dyn BufRead + Send>, len: Option<u64>) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(LINE_CAPACITY),
            line_active: false,
            len,
            path_display,
        }
    }

    /// Wraps in-memory text. Gzip-compressed bytes are inflated transparently.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        let len = Some(bytes.len() as u64);
        let reader: Box<dyn BufRead + Send> = if bytes.len() >= 2 && is_gzip_magic(&[bytes[0], bytes[1]]) {
            Box::new(BufReader::new(MultiGzDecoder::new(Cursor::new(bytes))))
        } else {
            Box::new(Cursor::new(bytes))
        };
        Self::new(name.to_string(), reader, len)
    }
}

impl TextSource for LocalTextSource {
    fn len(&self) -> Option<u64> {
        self.len
    }

    fn display_name(&self) -> &str {
        &self.path_display
    }

    fn next_line<'a>(&'a mut self) -> Result<Option<&'a [u8]>, DecodeError> {
        if self.line_active {
            self.line.clear();
            self.line_active = false;
        }

        let bytes_read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| DecodeError::Io(format!("Error reading {}: {e}", self.path_display)))?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }

        self.line_active = true;
        Ok(Some(&self.line))
    }
}

/// Opens a local VCF, detecting gzip (including BGZF) compression from the magic bytes.
pub fn open_text_source(path: &Path) -> Result<Box<dyn TextSource>, DecodeError> {
    let mut file = File::open(path)
        .map_err(|e| DecodeError::Io(format!("Opening {}: {e}", path.display())))?;
    let len = file
        .metadata()
        .map_err(|e| DecodeError::Io(format!("Metadata for {}: {e}", path.display())))?
        .len();

    let mut magic = [0u8; 2];
    let bytes_read = file
        .read(&mut magic)
        .map_err(|e| DecodeError::Io(format!("Reading {}: {e}", path.display())))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| DecodeError::Io(format!("Seeking {}: {e}", path.display())))?;

    let compressed = bytes_read == 2 && is_gzip_magic(&magic);
    debug!(
        "Opening {} ({} bytes, {})",
        path.display(),
        len,
        if compressed { "gzip" } else { "plain" }
    );
    let reader: Box<dyn BufRead + Send> = if compressed {
        Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(Box::new(LocalTextSource::new(
        path.display().to_string(),
        reader,
        Some(len),
    )))
}

fn is_gzip_magic(magic: &[u8; 2]) -> bool {
    magic[0] == 0x1F && magic[1] == 0x8B
}

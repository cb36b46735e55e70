//! Append-only manifest of processed files.
//!
//! The manifest is a header-first delimited text file. It is the durable
//! source of truth for a scan: the in-memory [`HashIndex`](crate::index::HashIndex)
//! is rebuilt from it on every start, and each processed file is appended as
//! exactly one row that is flushed and synced before the next file is looked at.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{Position, QuoteStyle, ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};

use crate::config::{encoding_for_label, Dialect, ManifestConfig};
use crate::error::{Error, Result};
use crate::types::{ManifestRecord, MANIFEST_COLUMNS};

const COL_ORIGINAL_PATH: usize = 0;
const COL_FILE_NAME: usize = 1;
const COL_SIZE: usize = 2;
const COL_MODIFIED: usize = 3;
const COL_HASH: usize = 4;
const COL_BARCODE: usize = 5;
const COL_DESTINATION: usize = 6;
const COL_DUPLICATE_OF: usize = 7;

/// Resolved on-disk layout of the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestFormat {
    pub delimiter: u8,
    pub dialect: Dialect,
    pub header_present: bool,
    pub encoding: &'static Encoding,
}

impl Default for ManifestFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            dialect: Dialect::Excel,
            header_present: true,
            encoding: UTF_8,
        }
    }
}

impl ManifestFormat {
    /// Build the format from validated manifest settings
    pub fn from_config(config: &ManifestConfig) -> Result<Self> {
        let delimiter = match config.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ => {
                return Err(Error::Configuration(format!(
                    "Delimiter must be a single ASCII character, got '{}'",
                    config.delimiter
                )))
            }
        };

        Ok(Self {
            delimiter,
            dialect: Dialect::from_name(&config.format)?,
            header_present: config.header_present,
            encoding: encoding_for_label(&config.charset)?,
        })
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true);

        match self.dialect {
            Dialect::Default | Dialect::Excel | Dialect::Rfc4180 => {}
            Dialect::Tdf => {
                builder.trim(Trim::Fields);
            }
            Dialect::Mysql => {
                // Fields are unescaped after splitting
                builder.quoting(false);
            }
        }
        builder
    }

    fn writer_builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder.delimiter(self.delimiter).has_headers(false);

        match self.dialect {
            Dialect::Default | Dialect::Excel | Dialect::Rfc4180 | Dialect::Tdf => {
                builder.terminator(Terminator::CRLF);
            }
            Dialect::Mysql => {
                builder
                    .terminator(Terminator::Any(b'\n'))
                    .quote_style(QuoteStyle::Never);
            }
        }
        builder
    }

    /// Render one row as bytes in the manifest's dialect and encoding
    fn encode_row<I, S>(&self, fields: I) -> std::result::Result<Vec<u8>, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .map(|field| match self.dialect {
                Dialect::Mysql => escape_mysql(field.as_ref(), self.delimiter),
                _ => Ok(field.as_ref().to_string()),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut writer = self.writer_builder().from_writer(Vec::new());
        writer.write_record(&fields).map_err(|e| e.to_string())?;
        let bytes = writer.into_inner().map_err(|e| e.error().to_string())?;

        if self.encoding == UTF_8 {
            return Ok(bytes);
        }
        let text = String::from_utf8_lossy(&bytes);
        let (encoded, _, unmappable) = self.encoding.encode(&text);
        if unmappable {
            return Err(format!(
                "row contains characters that {} cannot represent",
                self.encoding.name()
            ));
        }
        Ok(encoded.into_owned())
    }

    /// Decode raw manifest bytes, dropping a leading byte order mark
    fn decode<'b>(&self, bytes: &'b [u8]) -> std::result::Result<Cow<'b, str>, (u64, String)> {
        let bytes = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == self.encoding => &bytes[bom_len..],
            _ => bytes,
        };

        if let Some(text) = self
            .encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
        {
            return Ok(text);
        }

        let line = bytes
            .split(|&b| b == b'\n')
            .position(|line| {
                self.encoding
                    .decode_without_bom_handling_and_without_replacement(line)
                    .is_none()
            })
            .map_or(0, |index| index as u64 + 1);
        Err((line, format!("not valid {}", self.encoding.name())))
    }
}

/// Backslash-escape a field so it never contains a raw terminator or delimiter
fn escape_mysql(field: &str, delimiter: u8) -> std::result::Result<String, String> {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            c if c.is_ascii() && c as u8 == delimiter => {
                return Err(format!(
                    "field '{}' contains the delimiter '{}'",
                    field, delimiter as char
                ))
            }
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}

fn unescape_mysql(field: &str) -> Cow<'_, str> {
    if !field.contains('\\') {
        return Cow::Borrowed(field);
    }
    if field == "\\N" {
        return Cow::Borrowed("");
    }

    let mut unescaped = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some('0') => unescaped.push('\0'),
            Some('b') => unescaped.push('\u{8}'),
            Some('f') => unescaped.push('\u{c}'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    Cow::Owned(unescaped)
}

/// Physical line on which the record at `position` starts.
///
/// The reader leaves a record's offset on the tail of the previous line
/// terminator when lines end in CRLF, so line breaks at the offset are skipped
/// before counting.
fn line_of(text: &str, position: Option<&Position>) -> u64 {
    let Some(position) = position else {
        return 0;
    };
    let bytes = text.as_bytes();
    let mut start = (position.byte() as usize).min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\r' | b'\n') {
        start += 1;
    }
    1 + bytes[..start].iter().filter(|&&b| b == b'\n').count() as u64
}

/// Where each manifest column lives in a row
struct ColumnMap {
    indices: [Option<usize>; 8],
    width: usize,
}

impl ColumnMap {
    fn positional() -> Self {
        Self {
            indices: [0, 1, 2, 3, 4, 5, 6, 7].map(Some),
            width: MANIFEST_COLUMNS.len(),
        }
    }

    fn from_header(header: &StringRecord) -> std::result::Result<Self, String> {
        let mut indices = [None; 8];
        for (position, name) in header.iter().enumerate() {
            let name = name.trim_start_matches('\u{feff}').trim();
            if let Some(column) = MANIFEST_COLUMNS.iter().position(|c| c.eq_ignore_ascii_case(name)) {
                if indices[column].is_some() {
                    return Err(format!("column '{}' appears twice in the header", name));
                }
                indices[column] = Some(position);
            }
        }

        for required in [COL_ORIGINAL_PATH, COL_HASH] {
            if indices[required].is_none() {
                return Err(format!(
                    "header is missing the '{}' column",
                    MANIFEST_COLUMNS[required]
                ));
            }
        }

        Ok(Self {
            indices,
            width: header.len(),
        })
    }

    fn field<'r>(&self, row: &'r StringRecord, column: usize) -> &'r str {
        self.indices[column]
            .and_then(|i| row.get(i))
            .unwrap_or_default()
    }

    fn parse(&self, row: &StringRecord) -> std::result::Result<ManifestRecord, String> {
        if row.len() != self.width {
            return Err(format!(
                "expected {} fields but found {}",
                self.width,
                row.len()
            ));
        }

        let original_path = self.field(row, COL_ORIGINAL_PATH);
        if original_path.is_empty() {
            return Err("empty original-path".to_string());
        }
        let content_hash = self.field(row, COL_HASH);
        if content_hash.is_empty() {
            return Err("empty hash".to_string());
        }

        let size = self.field(row, COL_SIZE);
        let size_bytes = if size.is_empty() {
            0
        } else {
            size.parse::<u64>()
                .map_err(|e| format!("invalid size '{}': {}", size, e))?
        };

        let modified = self.field(row, COL_MODIFIED);
        let last_modified = if modified.is_empty() {
            0
        } else {
            modified
                .parse::<i64>()
                .map_err(|e| format!("invalid modified '{}': {}", modified, e))?
        };

        Ok(ManifestRecord {
            original_path: original_path.to_string(),
            file_name: self.field(row, COL_FILE_NAME).to_string(),
            size_bytes,
            last_modified,
            content_hash: content_hash.to_string(),
            decoded_text: self.field(row, COL_BARCODE).to_string(),
            destination_path: self.field(row, COL_DESTINATION).to_string(),
            duplicate_of: self.field(row, COL_DUPLICATE_OF).to_string(),
        })
    }
}

fn is_missing_or_empty(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len() == 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Read every record of the manifest at `path`.
///
/// A missing or zero-length manifest yields no records. Any row that cannot
/// be parsed fails the whole replay.
pub fn replay_all(path: &Path, format: &ManifestFormat) -> Result<Vec<ManifestRecord>> {
    if is_missing_or_empty(path)? {
        debug!("No existing manifest at {}", path.display());
        return Ok(Vec::new());
    }

    let corruption = |line: u64, reason: String| Error::ManifestCorruption {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let bytes = fs::read(path)?;
    let text = format
        .decode(&bytes)
        .map_err(|(line, reason)| corruption(line, reason))?;

    let mut reader = format.reader_builder().from_reader(text.as_bytes());
    let mut rows = reader.records().map(|row| -> Result<(u64, StringRecord)> {
        let row = row.map_err(|e| corruption(line_of(&text, e.position()), e.to_string()))?;
        let line = line_of(&text, row.position());
        let row = match format.dialect {
            Dialect::Mysql => row.iter().map(unescape_mysql).collect(),
            _ => row,
        };
        Ok((line, row))
    });

    let columns = if format.header_present {
        match rows.next() {
            Some(header) => {
                let (line, header) = header?;
                ColumnMap::from_header(&header).map_err(|reason| corruption(line, reason))?
            }
            None => return Ok(Vec::new()),
        }
    } else {
        ColumnMap::positional()
    };

    let mut records = Vec::new();
    for row in rows {
        let (line, row) = row?;
        let record = columns.parse(&row).map_err(|reason| corruption(line, reason))?;
        records.push(record);
    }

    info!(
        "Replayed {} records from manifest {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Write the column header if the manifest is absent or empty.
///
/// Returns whether a header was written. Nothing is written when the format
/// has no header row.
pub fn ensure_header(path: &Path, format: &ManifestFormat) -> Result<bool> {
    if !format.header_present || !is_missing_or_empty(path)? {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let header = format
        .encode_row(MANIFEST_COLUMNS)
        .map_err(|reason| Error::ManifestEncoding {
            path: path.to_path_buf(),
            reason,
        })?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&header)?;
    file.sync_data()?;

    info!("Created manifest header in {}", path.display());
    Ok(true)
}

/// Appends records to an existing manifest, one durable row at a time
pub struct ManifestWriter {
    path: PathBuf,
    file: File,
    format: ManifestFormat,
}

impl ManifestWriter {
    /// Open the manifest at `path` for appending, creating it if needed
    pub fn open(path: &Path, format: &ManifestFormat) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            format: *format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record and make it durable before returning.
    ///
    /// A record the format cannot represent is rejected with
    /// [`Error::ManifestEncoding`] before any byte reaches the file.
    pub fn append(&mut self, record: &ManifestRecord) -> Result<()> {
        let row = self.format.encode_row(record.to_row()).map_err(|reason| {
            warn!("Rejected manifest row for {}: {}", record.original_path, reason);
            Error::ManifestEncoding {
                path: self.path.clone(),
                reason,
            }
        })?;

        self.write_synced(&row).map_err(|source| Error::ManifestWrite {
            path: self.path.clone(),
            source: Box::new(source),
        })
    }

    fn write_synced(&mut self, row: &[u8]) -> Result<()> {
        self.file.write_all(row)?;
        self.file.sync_data()?;
        Ok(())
    }
}

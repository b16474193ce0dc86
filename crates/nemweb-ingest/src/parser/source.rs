//! Input sources for the MMS reader
//!
//! NEMWEB serves plain CSV, zipped CSV and, in archive folders, zips of
//! zips. Archives are expanded in entry order. Archives read from disk are
//! never fully buffered: entries stream straight into the reader, and nested
//! archives are spooled to an anonymous temp file.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use super::reader::MmsReader;
use super::table::TableSet;
use super::ParseError;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Nested archives deeper than this are refused
pub const MAX_ARCHIVE_DEPTH: usize = 4;

/// Upper bound on the buffer reserved up front for a nested archive
const MAX_PREALLOC_BYTES: u64 = 1 << 20;

/// Where nested archives are unpacked to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spool {
    Memory,
    Disk,
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

fn is_zip_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

/// Initial buffer capacity for an entry; the header size is untrusted
fn prealloc_hint(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOC_BYTES) as usize
}

fn is_csv_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".csv")
}

impl MmsReader<'_> {
    /// Parse text content
    pub fn read_str(&mut self, content: &str, tables: &mut TableSet) -> Result<(), ParseError> {
        self.read(content.as_bytes(), tables)
    }

    /// Parse an in-memory file, expanding it if it is a zip archive
    pub fn read_bytes(
        &mut self,
        bytes: &[u8],
        name: &str,
        tables: &mut TableSet,
    ) -> Result<(), ParseError> {
        if is_zip(bytes) {
            self.read_archive(Cursor::new(bytes), name, tables, Spool::Memory, 0)
        } else {
            self.set_source(name);
            self.read(bytes, tables)
        }
    }

    /// Parse a buffered stream of plain text
    pub fn read_buffered<R: BufRead>(
        &mut self,
        input: R,
        tables: &mut TableSet,
    ) -> Result<(), ParseError> {
        self.read(input, tables)
    }

    /// Parse a file on disk, expanding it if it is a zip archive
    pub fn read_path(&mut self, path: &Path, tables: &mut TableSet) -> Result<(), ParseError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut file = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 4];
        let sniffed = read_prefix(&mut file, &mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        if is_zip(&magic[..sniffed]) {
            self.read_archive(file, &name, tables, Spool::Disk, 0)
        } else {
            self.set_source(&name);
            self.read(file, tables)
        }
    }

    fn read_archive<R: Read + Seek>(
        &mut self,
        input: R,
        name: &str,
        tables: &mut TableSet,
        spool: Spool,
        depth: usize,
    ) -> Result<(), ParseError> {
        if depth >= MAX_ARCHIVE_DEPTH {
            return Err(ParseError::ArchiveDepth(name.to_string()));
        }

        let mut archive = zip::ZipArchive::new(input)?;
        debug!(archive = %name, entries = archive.len(), depth, "Expanding archive");

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();

            if is_zip_name(&entry_name) {
                match spool {
                    Spool::Memory => {
                        let mut buffer = Vec::with_capacity(prealloc_hint(entry.size()));
                        entry.read_to_end(&mut buffer)?;
                        drop(entry);
                        self.read_archive(
                            Cursor::new(buffer),
                            &entry_name,
                            tables,
                            spool,
                            depth + 1,
                        )?;
                    },
                    Spool::Disk => {
                        let mut spooled = tempfile::tempfile()?;
                        std::io::copy(&mut entry, &mut spooled)?;
                        drop(entry);
                        spooled.seek(SeekFrom::Start(0))?;
                        self.read_archive(
                            BufReader::new(spooled),
                            &entry_name,
                            tables,
                            spool,
                            depth + 1,
                        )?;
                    },
                }
            } else if is_csv_name(&entry_name) {
                self.set_source(&entry_name);
                self.read(&mut entry, tables)?;
            } else {
                warn!(archive = %name, entry = %entry_name, "Skipping non-CSV archive entry");
            }
        }

        Ok(())
    }
}

/// Fill as much of `buf` as the input allows
fn read_prefix<R: Read>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

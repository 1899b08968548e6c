//! Newline-delimited JSON persistence
//!
//! Loading is lenient per line: blank lines, lines that are not valid UTF-8
//! and lines that fail to parse are skipped, the rest still load. A file that
//! cannot be read at all is reported to the caller so that a later rewrite
//! does not replace records it never saw.
//! Rewrites go through a temporary file in the same directory followed by a
//! rename, so a crash never leaves a truncated store behind.

use crate::errors::{AssistError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

/// Split raw file content into non-blank lines, dropping undecodable ones
fn decode_lines(path: &Path, bytes: &[u8]) -> Vec<String> {
    let mut skipped = 0usize;
    let lines: Vec<String> = bytes
        .split(|b| *b == b'\n')
        .filter_map(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            match String::from_utf8(raw.to_vec()) {
                Ok(line) => Some(line),
                Err(_) => {
                    skipped += 1;
                    None
                }
            }
        })
        .filter(|line| !line.trim().is_empty())
        .collect();

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped store lines that are not valid UTF-8");
    }
    lines
}

/// Read all non-blank lines of `path`.
///
/// A missing file is an empty store; any other read failure is returned.
pub fn load_lines(path: &Path) -> io::Result<Vec<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(decode_lines(path, &bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Like [`load_lines`], treating an unreadable file as empty
pub fn read_lines(path: &Path) -> Vec<String> {
    load_lines(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "store unreadable, treating as empty");
        Vec::new()
    })
}

/// Parse one record per line, skipping lines that fail to parse
pub fn parse_records<T: DeserializeOwned>(lines: &[String]) -> Vec<T> {
    lines
        .iter()
        .filter_map(|line| serde_json::from_str::<T>(line).ok())
        .collect()
}

/// Records of `path`; an unreadable file yields none
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    parse_records(&read_lines(path))
}

/// Serialize a record as a single JSON line (no trailing newline)
pub fn to_line<T: Serialize>(record: &T) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Replace the content of `path` with `lines`, atomically.
pub fn write_lines_atomic<I, S>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| AssistError::store_write(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AssistError::store_write(path, e))?;
    for line in lines {
        writeln!(tmp, "{}", line.as_ref()).map_err(|e| AssistError::store_write(path, e))?;
    }
    tmp.flush().map_err(|e| AssistError::store_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| AssistError::store_write(path, e.error))?;

    Ok(())
}

/// Serialize `records` and atomically replace `path` with them
pub fn write_records_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let lines = records
        .iter()
        .map(to_line)
        .collect::<Result<Vec<_>>>()?;
    write_lines_atomic(path, lines)
}

/// Append one line to `path`, creating the file if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AssistError::store_write(path, e))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AssistError::store_write(path, e))?;
    writeln!(file, "{}", line).map_err(|e| AssistError::store_write(path, e))?;

    Ok(())
}

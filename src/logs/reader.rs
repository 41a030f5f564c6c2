//! Newline-delimited tick log reading.
//!
//! The writer appends one JSON object per line and may be observed mid-write, so
//! reads only ever consume bytes up to and including the last `\n`. A trailing
//! partial record is left for the next read. Malformed records are skipped but
//! still consumed, so a corrupt line can never stall the stream.

use crate::models::Tick;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

/// Result of one incremental read: the complete records found and the byte
/// offset just past the last one consumed.
#[derive(Debug, Default)]
pub struct IncrementalRead {
    pub ticks: Vec<Tick>,
    pub offset: u64,
    pub skipped: usize,
}

/// Read complete records written after `from_offset`.
///
/// A missing file yields no records and leaves the offset unchanged. The returned
/// offset never moves backwards.
pub fn read_incremental(path: &Path, from_offset: u64) -> Result<IncrementalRead> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(IncrementalRead {
                offset: from_offset,
                ..Default::default()
            });
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open log file: {}", path.display()))
        }
    };

    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat log file: {}", path.display()))?
        .len();
    if len < from_offset {
        warn!(
            path = %path.display(),
            len,
            offset = from_offset,
            "log file shorter than recorded offset; waiting for it to grow"
        );
        return Ok(IncrementalRead {
            offset: from_offset,
            ..Default::default()
        });
    }

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(from_offset))
        .with_context(|| format!("Failed to seek to {} in {}", from_offset, path.display()))?;

    let mut out = IncrementalRead {
        offset: from_offset,
        ..Default::default()
    };
    let mut line = Vec::with_capacity(512);

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Error reading log file: {}", path.display()))?;
        if n == 0 || line.last() != Some(&b'\n') {
            // EOF, possibly with a partial record that is not consumed.
            break;
        }
        out.offset += n as u64;

        let record = &line[..n - 1];
        if record.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice::<Tick>(record) {
            Ok(tick) => out.ticks.push(tick),
            Err(e) => {
                out.skipped += 1;
                debug!(path = %path.display(), error = %e, "skipping malformed log record");
            }
        }
    }

    Ok(out)
}

/// Every complete record in the file; a missing file is empty.
pub fn read_log_file(path: &Path) -> Result<Vec<Tick>> {
    Ok(read_incremental(path, 0)?.ticks)
}

/// Ticks from an export file: either a JSON array or newline-delimited records.
pub fn read_tick_export(path: &Path) -> Result<Vec<Tick>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    let first = data.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'[') {
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse JSON array: {}", path.display()))
    } else {
        read_log_file(path)
    }
}

//! Binary-search lookup of a single path's digest in a manifest that has
//! already been sorted by path, without loading the whole file into
//! memory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, SnapvaultError};

use super::entry::ManifestEntry;

/// Holds an open handle to a sorted manifest file and its length, so
/// repeated lookups don't re-stat or re-open it.
pub struct ManifestLookup {
    file: File,
    len: u64,
}

impl ManifestLookup {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(SnapvaultError::io_in)?;
        let len = file.metadata().map_err(SnapvaultError::io_in)?.len();
        Ok(Self { file, len })
    }

    /// Binary search for `target_path`, returning its digest if present.
    /// Assumes the manifest is sorted ascending by path and well-formed
    /// (one `<path>\0<hex>\n` record per line, no embedded newlines).
    pub fn lookup(&mut self, target_path: &str) -> Result<Option<String>> {
        if self.len == 0 {
            return Ok(None);
        }
        let mut lo: u64 = 0;
        let mut hi: u64 = self.len;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record_start = self.scan_back_to_record_start(mid)?;
            let entry = self.read_record_at(record_start)?;

            match entry.path.as_str().cmp(target_path) {
                std::cmp::Ordering::Equal => return Ok(Some(entry.digest_hex)),
                std::cmp::Ordering::Less => {
                    let next_record = record_start + entry.to_line().len() as u64;
                    if next_record <= lo {
                        break;
                    }
                    lo = next_record;
                }
                std::cmp::Ordering::Greater => {
                    if record_start == hi {
                        break;
                    }
                    hi = record_start;
                }
            }
        }
        Ok(None)
    }

    /// Walk backwards from `pos` to the start of the record containing it
    /// (i.e. just past the previous `\n`, or the start of the file).
    fn scan_back_to_record_start(&mut self, pos: u64) -> Result<u64> {
        if pos == 0 {
            return Ok(0);
        }
        let mut cursor = pos;
        let mut byte = [0u8; 1];
        loop {
            if cursor == 0 {
                return Ok(0);
            }
            cursor -= 1;
            self.file.seek(SeekFrom::Start(cursor)).map_err(SnapvaultError::io_in)?;
            self.file.read_exact(&mut byte).map_err(SnapvaultError::io_in)?;
            if byte[0] == b'\n' {
                return Ok(cursor + 1);
            }
        }
    }

    fn read_record_at(&mut self, start: u64) -> Result<ManifestEntry> {
        self.file.seek(SeekFrom::Start(start)).map_err(SnapvaultError::io_in)?;
        let remaining = self.len - start;
        let mut chunk = vec![0u8; remaining.min(4096) as usize];
        let mut line = Vec::new();
        loop {
            let n = self.file.read(&mut chunk).map_err(SnapvaultError::io_in)?;
            if n == 0 {
                break;
            }
            match chunk[..n].iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&chunk[..=pos]);
                    break;
                }
                None => line.extend_from_slice(&chunk[..n]),
            }
        }
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        let text = String::from_utf8(line)
            .map_err(|_| SnapvaultError::InvalidFormat("manifest record is not valid UTF-8".to_string()))?;
        ManifestEntry::parse_line(&text)
    }
}

use std::io::{BufRead, BufReader, Write};

use crate::error::{Result, SnapvaultError};

use super::entry::ManifestEntry;

/// Appends `ManifestEntry` records to a writer in on-disk format, one per
/// call, in whatever order the caller presents them (the driver is
/// responsible for append order matching enumeration order - this type
/// just streams what it's given).
pub struct ManifestWriter<W: Write> {
    inner: W,
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_entry(&mut self, entry: &ManifestEntry) -> Result<()> {
        self.inner
            .write_all(entry.to_line().as_bytes())
            .map_err(SnapvaultError::io_out)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(SnapvaultError::io_out)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads `ManifestEntry` records back out in file order. Tolerates a
/// missing trailing newline on the last record (a manifest truncated by a
/// crash mid-write still yields every complete record before the cut).
pub struct ManifestReader<R: BufRead> {
    inner: R,
}

impl<R: BufRead> ManifestReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next entry, or `None` at EOF.
    pub fn read_entry(&mut self) -> Result<Option<ManifestEntry>> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).map_err(SnapvaultError::io_in)?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        ManifestEntry::parse_line(&line).map(Some)
    }
}

impl ManifestReader<BufReader<std::fs::File>> {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(SnapvaultError::io_in)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

/// Read every entry into memory. Only safe for manifests known to fit in
/// RAM (tests, or post-sort-run small files); the driver's hot path uses
/// `ExternalSort` / `ManifestLookup` instead for the full manifest.
pub fn read_all<R: BufRead>(reader: R) -> Result<Vec<ManifestEntry>> {
    let mut reader = ManifestReader::new(reader);
    let mut out = Vec::new();
    while let Some(entry) = reader.read_entry()? {
        out.push(entry);
    }
    Ok(out)
}

pub fn write_all<W: Write>(writer: W, entries: &[ManifestEntry]) -> Result<()> {
    let mut writer = ManifestWriter::new(writer);
    for entry in entries {
        writer.write_entry(entry)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn writes_then_reads_in_order() {
        let entries = vec![
            ManifestEntry::new("/a", "1111").unwrap(),
            ManifestEntry::new("/b", "2222").unwrap(),
            ManifestEntry::new("/c", "3333").unwrap(),
        ];
        let mut buf = Vec::new();
        write_all(&mut buf, &entries).unwrap();
        let read_back = read_all(Cursor::new(buf)).unwrap();
        assert_eq!(read_back, entries);
    }

    #[test]
    fn tolerates_missing_trailing_newline() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"/a\0aaaa\n");
        buf.extend_from_slice(b"/b\0bbbb"); // no trailing \n
        let entries = read_all(Cursor::new(buf)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "/b");
    }

    #[test]
    fn empty_manifest_yields_no_entries() {
        let entries = read_all(Cursor::new(Vec::new())).unwrap();
        assert!(entries.is_empty());
    }
}

//! Tar-backed archive writer/reader. The spec externalizes "the archive
//! format" as a collaborator behind a narrow interface; `tar` is this
//! interface's concrete default, matching the layout the driver expects:
//! changed file contents under `/files<original-path>`, then a single
//! `/checksums` member holding the sorted manifest, then a single
//! `/removed` member listing deleted paths.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, SnapvaultError};

pub const FILES_PREFIX: &str = "files";
pub const CHECKSUMS_MEMBER: &str = "checksums";
pub const REMOVED_MEMBER: &str = "removed";

/// Appends members to a tar stream in the order the driver calls these
/// methods. The underlying `tar::Builder` already enforces append-only,
/// single-pass semantics, which is exactly what the single-threaded
/// driver needs.
pub struct TarArchiveWriter<W: Write> {
    builder: tar::Builder<W>,
}

impl<W: Write> TarArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            builder: tar::Builder::new(inner),
        }
    }

    /// Append one changed file's contents under `/files<original_path>`,
    /// preserving the permission bits (masked to `0o1777` as the original
    /// tool does, dropping setuid/setgid from the stored metadata). The
    /// size must be known up front so `tar` can write a correct header
    /// without buffering the content twice.
    pub fn append_file_sized(
        &mut self,
        original_path: &str,
        contents: &mut impl Read,
        mode: u32,
        size: u64,
    ) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_mode(mode & 0o1777);
        header.set_size(size);
        header.set_cksum();
        let member_path = format!("{FILES_PREFIX}{original_path}");
        self.builder
            .append_data(&mut header, &member_path, contents)
            .map_err(SnapvaultError::io_out)
    }

    pub fn append_checksums(&mut self, contents: &mut impl Read, size: u64) -> Result<()> {
        self.append_simple_member(CHECKSUMS_MEMBER, contents, size)
    }

    pub fn append_removed(&mut self, contents: &mut impl Read, size: u64) -> Result<()> {
        self.append_simple_member(REMOVED_MEMBER, contents, size)
    }

    fn append_simple_member(&mut self, name: &str, contents: &mut impl Read, size: u64) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o600);
        header.set_size(size);
        header.set_cksum();
        self.builder
            .append_data(&mut header, name, contents)
            .map_err(SnapvaultError::io_out)
    }

    pub fn finish(mut self) -> Result<W> {
        self.builder.finish().map_err(SnapvaultError::io_out)?;
        self.builder.into_inner().map_err(SnapvaultError::io_out)
    }
}

/// Extracts a single named member from a tar stream into memory. Used by
/// the driver to pull the previous run's `/checksums` member back out of
/// an (possibly decrypted, possibly decompressed) prior archive.
pub fn extract_member<R: Read>(archive: R, member_name: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries().map_err(SnapvaultError::io_in)? {
        let mut entry = entry.map_err(SnapvaultError::io_in)?;
        let path = entry.path().map_err(SnapvaultError::io_in)?;
        if path.as_os_str() == member_name {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).map_err(SnapvaultError::io_in)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

/// Extracts every `/files<path>` member back onto disk, for restores.
/// Not exercised by the backup path itself but part of the same
/// collaborator interface.
pub fn extract_files<R: Read>(archive: R, dest_root: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries().map_err(SnapvaultError::io_in)? {
        let mut entry = entry.map_err(SnapvaultError::io_in)?;
        let path = entry.path().map_err(SnapvaultError::io_in)?.to_path_buf();
        let Ok(relative) = path.strip_prefix(FILES_PREFIX) else {
            continue;
        };
        let target = dest_root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(SnapvaultError::io_out)?;
        }
        entry.unpack(&target).map_err(SnapvaultError::io_out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn writes_and_extracts_checksums_member() {
        let mut buf = Vec::new();
        {
            let mut writer = TarArchiveWriter::new(&mut buf);
            let checksums = b"/a\0aaaa\n/b\0bbbb\n".to_vec();
            writer
                .append_checksums(&mut Cursor::new(checksums.clone()), checksums.len() as u64)
                .unwrap();
            writer.finish().unwrap();
        }
        let extracted = extract_member(Cursor::new(buf), CHECKSUMS_MEMBER).unwrap();
        assert_eq!(extracted, Some(b"/a\0aaaa\n/b\0bbbb\n".to_vec()));
    }

    #[test]
    fn missing_member_returns_none() {
        let mut buf = Vec::new();
        {
            let writer = TarArchiveWriter::new(&mut buf);
            writer.finish().unwrap();
        }
        assert_eq!(extract_member(Cursor::new(buf), "removed").unwrap(), None);
    }

    #[test]
    fn append_order_is_files_then_checksums_then_removed() {
        let mut buf = Vec::new();
        {
            let mut writer = TarArchiveWriter::new(&mut buf);
            let content = b"hello".to_vec();
            writer
                .append_file_sized("/etc/hosts", &mut Cursor::new(content.clone()), 0o644, content.len() as u64)
                .unwrap();
            let checksums = b"/etc/hosts\0deadbeef\n".to_vec();
            writer
                .append_checksums(&mut Cursor::new(checksums.clone()), checksums.len() as u64)
                .unwrap();
            let removed = b"/etc/old\n".to_vec();
            writer
                .append_removed(&mut Cursor::new(removed.clone()), removed.len() as u64)
                .unwrap();
            writer.finish().unwrap();
        }
        let mut archive = tar::Archive::new(Cursor::new(buf));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["files/etc/hosts", "checksums", "removed"]);
    }
}

//! Concrete default compressors. The spec treats compression as an
//! external collaborator behind a narrow interface; these are that
//! interface's default implementations, chosen to cover the formats the
//! config file's `C_TYPE` field can name.

use std::io::{self, Read, Write};

use crate::error::{Result, SnapvaultError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorKind {
    None,
    Gzip,
    Bzip2,
    Xz,
    Lz4,
}

impl CompressorKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(CompressorKind::None),
            "gzip" | "gz" => Ok(CompressorKind::Gzip),
            "bzip2" | "bz2" => Ok(CompressorKind::Bzip2),
            "xz" => Ok(CompressorKind::Xz),
            "lz4" => Ok(CompressorKind::Lz4),
            other => Err(SnapvaultError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// Suffix appended to backup output filenames for this format (spec §6
    /// naming pattern), empty for `None`.
    pub fn extension(self) -> &'static str {
        match self {
            CompressorKind::None => "",
            CompressorKind::Gzip => ".gz",
            CompressorKind::Bzip2 => ".bz2",
            CompressorKind::Xz => ".xz",
            CompressorKind::Lz4 => ".lz4",
        }
    }
}

/// A compressing writer for one of the supported formats. Implements
/// `Write` by delegation; `finish()` must be called to flush the
/// format's trailer (block checksums, end markers) and recover the
/// underlying writer - relying on `Drop` alone would either silently
/// swallow a finalization error or, for formats that don't self-finalize
/// on drop, leave a truncated stream.
pub enum CompressorWriter<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> CompressorWriter<W> {
    pub fn new(kind: CompressorKind, inner: W, level: u32) -> Self {
        match kind {
            CompressorKind::None => CompressorWriter::None(inner),
            CompressorKind::Gzip => {
                CompressorWriter::Gzip(flate2::write::GzEncoder::new(inner, flate2::Compression::new(level)))
            }
            CompressorKind::Bzip2 => {
                CompressorWriter::Bzip2(bzip2::write::BzEncoder::new(inner, bzip2::Compression::new(level)))
            }
            CompressorKind::Xz => CompressorWriter::Xz(xz2::write::XzEncoder::new(inner, level)),
            CompressorKind::Lz4 => CompressorWriter::Lz4(lz4_flex::frame::FrameEncoder::new(inner)),
        }
    }

    pub fn finish(self) -> Result<W> {
        match self {
            CompressorWriter::None(w) => Ok(w),
            CompressorWriter::Gzip(enc) => enc.finish().map_err(SnapvaultError::io_out),
            CompressorWriter::Bzip2(enc) => enc.finish().map_err(SnapvaultError::io_out),
            CompressorWriter::Xz(enc) => enc.finish().map_err(SnapvaultError::io_out),
            CompressorWriter::Lz4(enc) => enc
                .finish()
                .map_err(|e| SnapvaultError::InvalidFormat(e.to_string())),
        }
    }
}

impl<W: Write> Write for CompressorWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressorWriter::None(w) => w.write(buf),
            CompressorWriter::Gzip(enc) => enc.write(buf),
            CompressorWriter::Bzip2(enc) => enc.write(buf),
            CompressorWriter::Xz(enc) => enc.write(buf),
            CompressorWriter::Lz4(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressorWriter::None(w) => w.flush(),
            CompressorWriter::Gzip(enc) => enc.flush(),
            CompressorWriter::Bzip2(enc) => enc.flush(),
            CompressorWriter::Xz(enc) => enc.flush(),
            CompressorWriter::Lz4(enc) => enc.flush(),
        }
    }
}

/// A decompressing reader mirroring `CompressorWriter`.
pub enum CompressorReader<R: Read> {
    None(R),
    Gzip(flate2::read::GzDecoder<R>),
    Bzip2(bzip2::read::BzDecoder<R>),
    Xz(xz2::read::XzDecoder<R>),
    Lz4(lz4_flex::frame::FrameDecoder<R>),
}

impl<R: Read> CompressorReader<R> {
    pub fn new(kind: CompressorKind, inner: R) -> Self {
        match kind {
            CompressorKind::None => CompressorReader::None(inner),
            CompressorKind::Gzip => CompressorReader::Gzip(flate2::read::GzDecoder::new(inner)),
            CompressorKind::Bzip2 => CompressorReader::Bzip2(bzip2::read::BzDecoder::new(inner)),
            CompressorKind::Xz => CompressorReader::Xz(xz2::read::XzDecoder::new(inner)),
            CompressorKind::Lz4 => CompressorReader::Lz4(lz4_flex::frame::FrameDecoder::new(inner)),
        }
    }
}

impl<R: Read> Read for CompressorReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CompressorReader::None(r) => r.read(buf),
            CompressorReader::Gzip(dec) => dec.read(buf),
            CompressorReader::Bzip2(dec) => dec.read(buf),
            CompressorReader::Xz(dec) => dec.read(buf),
            CompressorReader::Lz4(dec) => dec.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(kind: CompressorKind) {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let mut compressed = Vec::new();
        {
            let mut writer = CompressorWriter::new(kind, &mut compressed, 6);
            writer.write_all(&payload).unwrap();
            writer.finish().unwrap();
        }
        let mut reader = CompressorReader::new(kind, Cursor::new(compressed));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn none_passes_through() {
        roundtrip(CompressorKind::None);
    }

    #[test]
    fn gzip_roundtrip() {
        roundtrip(CompressorKind::Gzip);
    }

    #[test]
    fn bzip2_roundtrip() {
        roundtrip(CompressorKind::Bzip2);
    }

    #[test]
    fn xz_roundtrip() {
        roundtrip(CompressorKind::Xz);
    }

    #[test]
    fn lz4_roundtrip() {
        roundtrip(CompressorKind::Lz4);
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert!(CompressorKind::parse("zstd").is_err());
    }
}

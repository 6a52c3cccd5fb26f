//! Persistence of backup configuration in the legacy KV file format (spec
//! §6): one `KEY=value` pair per line, multi-valued fields (directories,
//! excludes) packed NUL-separated within a single value rather than
//! repeated across lines. Hand-rolled rather than `serde`-backed, since
//! this format predates and isn't expressible as a serde data model
//! (multi-value-per-line, no nesting, no quoting rules).

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use crate::compress::CompressorKind;
use crate::digest::DigestAlgorithm;
use crate::error::{Result, SnapvaultError};

#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    pub directories: Vec<PathBuf>,
    pub exclude: Vec<PathBuf>,
    pub hash_algorithm: Option<DigestAlgorithm>,
    pub enc_algorithm: Option<String>,
    pub compressor: Option<CompressorKind>,
    pub compression_level: Option<u32>,
    pub output_directory: Option<PathBuf>,
}

/// Persistence seam for `BackupConfig`. A trait (rather than free
/// functions) so the driver can be pointed at an in-memory store in
/// tests without touching disk.
pub trait ConfigStore {
    fn load(&self) -> Result<BackupConfig>;
    fn save(&self, config: &BackupConfig) -> Result<()>;
}

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<BackupConfig> {
        if !self.path.exists() {
            return Ok(BackupConfig::default());
        }
        let file = std::fs::File::open(&self.path).map_err(SnapvaultError::io_in)?;
        parse_config(BufReader::new(file))
    }

    fn save(&self, config: &BackupConfig) -> Result<()> {
        let mut file = std::fs::File::create(&self.path).map_err(SnapvaultError::io_out)?;
        write_config(&mut file, config)
    }
}

fn parse_config<R: BufRead>(reader: R) -> Result<BackupConfig> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    for line in reader.lines() {
        let line = line.map_err(SnapvaultError::io_in)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(SnapvaultError::InvalidFormat(format!(
                "config line missing '=': {line}"
            )));
        };
        fields.insert(key.trim().to_string(), value.to_string());
    }

    let mut config = BackupConfig::default();
    if let Some(raw) = fields.get("DIRECTORIES") {
        config.directories = split_nul_list(raw);
    }
    if let Some(raw) = fields.get("EXCLUDE") {
        config.exclude = split_nul_list(raw);
    }
    if let Some(raw) = fields.get("HASH_ALGORITHM") {
        config.hash_algorithm = Some(DigestAlgorithm::parse(raw)?);
    }
    if let Some(raw) = fields.get("ENC_ALGORITHM") {
        if !raw.is_empty() {
            config.enc_algorithm = Some(raw.clone());
        }
    }
    if let Some(raw) = fields.get("C_TYPE") {
        config.compressor = Some(CompressorKind::parse(raw)?);
    }
    if let Some(raw) = fields.get("C_LEVEL") {
        config.compression_level = Some(
            raw.parse()
                .map_err(|_| SnapvaultError::InvalidFormat(format!("invalid C_LEVEL: {raw}")))?,
        );
    }
    if let Some(raw) = fields.get("OUTPUT_DIRECTORY") {
        config.output_directory = Some(PathBuf::from(raw));
    }
    Ok(config)
}

fn write_config<W: Write>(writer: &mut W, config: &BackupConfig) -> Result<()> {
    writeln!(writer, "DIRECTORIES={}", join_nul_list(&config.directories)).map_err(SnapvaultError::io_out)?;
    writeln!(writer, "EXCLUDE={}", join_nul_list(&config.exclude)).map_err(SnapvaultError::io_out)?;
    if let Some(alg) = config.hash_algorithm {
        writeln!(writer, "HASH_ALGORITHM={}", alg.name()).map_err(SnapvaultError::io_out)?;
    }
    if let Some(alg) = &config.enc_algorithm {
        writeln!(writer, "ENC_ALGORITHM={alg}").map_err(SnapvaultError::io_out)?;
    }
    if let Some(kind) = config.compressor {
        let name = match kind {
            CompressorKind::None => "none",
            CompressorKind::Gzip => "gzip",
            CompressorKind::Bzip2 => "bzip2",
            CompressorKind::Xz => "xz",
            CompressorKind::Lz4 => "lz4",
        };
        writeln!(writer, "C_TYPE={name}").map_err(SnapvaultError::io_out)?;
    }
    if let Some(level) = config.compression_level {
        writeln!(writer, "C_LEVEL={level}").map_err(SnapvaultError::io_out)?;
    }
    if let Some(output) = &config.output_directory {
        writeln!(writer, "OUTPUT_DIRECTORY={}", output.display()).map_err(SnapvaultError::io_out)?;
    }
    Ok(())
}

fn split_nul_list(raw: &str) -> Vec<PathBuf> {
    raw.split('\0').filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

fn join_nul_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_kv_format() {
        let config = BackupConfig {
            directories: vec![PathBuf::from("/home/user"), PathBuf::from("/etc")],
            exclude: vec![PathBuf::from("/home/user/.cache")],
            hash_algorithm: Some(DigestAlgorithm::Sha256),
            enc_algorithm: Some("aes-256-cbc".to_string()),
            compressor: Some(CompressorKind::Gzip),
            compression_level: Some(6),
            output_directory: Some(PathBuf::from("/backups")),
        };
        let mut buf = Vec::new();
        write_config(&mut buf, &config).unwrap();
        let parsed = parse_config(buf.as_slice()).unwrap();
        assert_eq!(parsed.directories, config.directories);
        assert_eq!(parsed.exclude, config.exclude);
        assert_eq!(parsed.hash_algorithm, config.hash_algorithm);
        assert_eq!(parsed.compressor, config.compressor);
        assert_eq!(parsed.compression_level, config.compression_level);
    }

    #[test]
    fn missing_file_yields_default_config() {
        let store = FileConfigStore::new("/nonexistent/path/should/not/exist.conf");
        let config = store.load().unwrap();
        assert!(config.directories.is_empty());
    }

    #[test]
    fn rejects_malformed_line() {
        let bad = "not_a_kv_line\n";
        assert!(parse_config(bad.as_bytes()).is_err());
    }
}

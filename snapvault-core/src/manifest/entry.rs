use std::fmt;

use crate::error::{Result, SnapvaultError};

/// One line of a manifest: a path paired with its content digest, hex
/// encoded. Digests may be empty when the run used `DigestAlgorithm::None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub digest_hex: String,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, digest_hex: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.contains('\n') {
            return Err(SnapvaultError::InvalidFormat(
                "manifest path may not contain a newline".to_string(),
            ));
        }
        if path.contains('\0') {
            return Err(SnapvaultError::InvalidFormat(
                "manifest path may not contain a NUL".to_string(),
            ));
        }
        Ok(Self {
            path,
            digest_hex: digest_hex.into(),
        })
    }

    /// Serialize as `<path>\0<hex-digest>\n`.
    pub fn to_line(&self) -> String {
        format!("{}\0{}\n", self.path, self.digest_hex)
    }

    /// Parse a single line (without its trailing `\n`, which callers strip
    /// during reading).
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.splitn(2, '\0');
        let path = parts
            .next()
            .ok_or_else(|| SnapvaultError::InvalidFormat("manifest line missing NUL separator".to_string()))?;
        let digest_hex = parts
            .next()
            .ok_or_else(|| SnapvaultError::InvalidFormat("manifest line missing digest field".to_string()))?;
        Ok(Self {
            path: path.to_string(),
            digest_hex: digest_hex.to_string(),
        })
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\0{}", self.path, self.digest_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_line_format() {
        let entry = ManifestEntry::new("/home/user/file.txt", "deadbeef").unwrap();
        let line = entry.to_line();
        assert_eq!(line, "/home/user/file.txt\0deadbeef\n");
        let parsed = ManifestEntry::parse_line(line.trim_end_matches('\n')).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn rejects_embedded_newline() {
        assert!(ManifestEntry::new("bad\npath", "abcd").is_err());
    }

    #[test]
    fn rejects_embedded_nul() {
        assert!(ManifestEntry::new("bad\0path", "abcd").is_err());
    }
}

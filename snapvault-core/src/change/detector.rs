//! Classifies each enumerated file against the previous run's manifest by
//! comparing content digests, so only changed files get re-archived.

use crate::error::Result;
use crate::manifest::ManifestLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Added,
    Unchanged,
    Changed,
}

/// Wraps an optional previous-run manifest lookup. With no previous
/// manifest (first run, or a run whose digest algorithm doesn't match the
/// previous one - see driver step 1) every file classifies as `Added`.
pub struct ChangeDetector {
    previous: Option<ManifestLookup>,
}

impl ChangeDetector {
    pub fn new(previous: Option<ManifestLookup>) -> Self {
        Self { previous }
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Classify `path` given its freshly computed `digest_hex`. Always
    /// consults the previous manifest, never the other way around - the
    /// current manifest is being built as we go and isn't queryable yet.
    pub fn classify(&mut self, path: &str, digest_hex: &str) -> Result<Classification> {
        let Some(previous) = self.previous.as_mut() else {
            return Ok(Classification::Added);
        };
        match previous.lookup(path)? {
            None => Ok(Classification::Added),
            Some(prev_digest) if prev_digest == digest_hex => Ok(Classification::Unchanged),
            Some(_) => Ok(Classification::Changed),
        }
    }
}

/// True if `dir_name` should never be descended into regardless of user
/// exclusion config - mirrors the original's hardcoded `lost+found`
/// skip, since that directory is filesystem-recovery debris, not user
/// data.
pub fn is_always_excluded_dir(dir_name: &str) -> bool {
    dir_name == "lost+found"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestEntry, ManifestLookup};
    use std::io::Write as _;

    fn lookup_with(entries: &[(&str, &str)]) -> ManifestLookup {
        let manifest_entries: Vec<ManifestEntry> = entries
            .iter()
            .map(|(p, d)| ManifestEntry::new(*p, *d).unwrap())
            .collect();
        let mut buf = Vec::new();
        crate::manifest::io::write_all(&mut buf, &manifest_entries).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&buf).unwrap();
        file.flush().unwrap();
        ManifestLookup::open(file.path()).unwrap()
    }

    #[test]
    fn no_previous_manifest_means_everything_added() {
        let mut detector = ChangeDetector::new(None);
        assert_eq!(detector.classify("/a", "1111").unwrap(), Classification::Added);
    }

    #[test]
    fn matching_digest_is_unchanged() {
        let lookup = lookup_with(&[("/a", "1111")]);
        let mut detector = ChangeDetector::new(Some(lookup));
        assert_eq!(detector.classify("/a", "1111").unwrap(), Classification::Unchanged);
    }

    #[test]
    fn differing_digest_is_changed() {
        let lookup = lookup_with(&[("/a", "1111")]);
        let mut detector = ChangeDetector::new(Some(lookup));
        assert_eq!(detector.classify("/a", "2222").unwrap(), Classification::Changed);
    }

    #[test]
    fn absent_path_is_added() {
        let lookup = lookup_with(&[("/a", "1111")]);
        let mut detector = ChangeDetector::new(Some(lookup));
        assert_eq!(detector.classify("/b", "3333").unwrap(), Classification::Added);
    }

    #[test]
    fn lost_and_found_is_always_excluded() {
        assert!(is_always_excluded_dir("lost+found"));
        assert!(!is_always_excluded_dir("lost+found2"));
    }
}

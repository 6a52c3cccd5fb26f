//! Orchestrates one backup run: load the previous manifest, walk and
//! digest the configured directories, append changed files to a tar
//! stream, sort and store the new manifest, diff out removed paths, then
//! optionally compress and encrypt the result before it lands at its
//! final path.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::archive::{extract_member, TarArchiveWriter, CHECKSUMS_MEMBER};
use crate::change::{removed_paths, ChangeDetector, Classification};
use crate::compress::{CompressorKind, CompressorReader, CompressorWriter};
use crate::crypto::CipherStream;
use crate::digest::{DigestAlgorithm, DigestComputer};
use crate::error::{Result, SnapvaultError};
use crate::manifest::{ExternalSort, ManifestEntry, ManifestLookup, ManifestReader, ManifestWriter};
use crate::progress::ProgressReporter;
use crate::rlimit::RlimitCoreGuard;
use crate::secure::SecureBuffer;
use crate::walk::{Enumerator, WalkEntry, WalkdirEnumerator};

pub struct EncryptionOptions {
    pub cipher_name: String,
    pub password: SecureBuffer,
}

pub struct BackupOptions {
    pub directories: Vec<PathBuf>,
    pub exclude: Vec<PathBuf>,
    pub output_directory: PathBuf,
    pub digest_algorithm: DigestAlgorithm,
    pub compressor: CompressorKind,
    pub compression_level: u32,
    pub encryption: Option<EncryptionOptions>,
    /// The most recent previous backup's final output path (possibly
    /// compressed and/or encrypted), used both for change detection and
    /// for the removed-file diff. `None` means this is a first run.
    pub previous_archive: Option<PathBuf>,
    /// The digest algorithm the previous archive's manifest was built
    /// with. A mismatch against `digest_algorithm` means the previous
    /// manifest can't be compared against and every file is treated as
    /// added, per spec driver step 1.
    pub previous_digest_algorithm: Option<DigestAlgorithm>,
    pub max_run_bytes: u64,
}

impl BackupOptions {
    pub fn new(directories: Vec<PathBuf>, output_directory: PathBuf) -> Self {
        Self {
            directories,
            exclude: Vec::new(),
            output_directory,
            digest_algorithm: DigestAlgorithm::Sha256,
            compressor: CompressorKind::None,
            compression_level: 6,
            encryption: None,
            previous_archive: None,
            previous_digest_algorithm: None,
            max_run_bytes: crate::manifest::sort::DEFAULT_MAX_RUN_BYTES,
        }
    }
}

#[derive(Debug, Default)]
pub struct BackupRun {
    pub output_path: PathBuf,
    pub added: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub removed: u64,
    /// Set when the manifest sort fell back to an unsorted write because
    /// the external sort couldn't allocate a temp file. The archive is
    /// still complete and valid; only this run's change detection against
    /// a *future* run is weakened, since `ManifestLookup` requires sorted
    /// input.
    pub manifest_unsorted: bool,
}

pub struct BackupDriver;

impl BackupDriver {
    pub fn run(options: &BackupOptions, progress: &dyn ProgressReporter) -> Result<BackupRun> {
        let _rlimit_guard = RlimitCoreGuard::disable();

        // Spec §4.10 step 2 / §7: a failure here is never fatal to the
        // run - a corrupt, wrong-password, or missing previous archive
        // just means every file is treated as added.
        let previous_manifest = match load_previous_manifest(options) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "could not load previous manifest, treating every file as added");
                None
            }
        };
        let mut detector = ChangeDetector::new(
            previous_manifest
                .as_ref()
                .map(|t| ManifestLookup::open(t.path()))
                .transpose()?,
        );

        let output_name = default_backup_name(options);
        let output_path = options.output_directory.join(&output_name);

        let tar_temp = NamedTempFile::new_in(&options.output_directory).map_err(SnapvaultError::io_out)?;
        let mut run = BackupRun {
            output_path: output_path.clone(),
            ..BackupRun::default()
        };

        let current_manifest_temp = NamedTempFile::new_in(&options.output_directory).map_err(SnapvaultError::io_out)?;

        // A single tar builder spans the whole run: `/files/*` entries
        // are appended while walking, then `/checksums` and `/removed`
        // are appended once the manifest is sorted and the removed-file
        // diff is known, and only then is `finish()` called. Splitting
        // this across two `TarArchiveWriter`s would let the first one's
        // `Drop` write the end-of-archive trailer before the rest gets a
        // chance to append anything, silently truncating the archive.
        let tar_file = tar_temp.reopen().map_err(SnapvaultError::io_out)?;
        let mut archive = TarArchiveWriter::new(tar_file);

        {
            let manifest_file = current_manifest_temp.reopen().map_err(SnapvaultError::io_out)?;
            let mut manifest_writer = ManifestWriter::new(manifest_file);

            let progress_handle_total = estimate_total(&options.directories);
            let mut progress_handle = progress.start(progress_handle_total);

            let enumerator = WalkdirEnumerator;
            for dir in &options.directories {
                enumerator.enumerate(
                    dir,
                    &options.exclude,
                    &mut |entry: &WalkEntry| {
                        handle_entry(entry, options, &mut detector, &mut archive, &mut manifest_writer, &mut run)
                    },
                    &mut |path, err| {
                        warn!(path = %path.display(), error = %err, "skipping file after error");
                    },
                )?;
                progress_handle.inc(1);
            }
            progress_handle.finish();
            manifest_writer.flush()?;
        }

        // Held so the sorted manifest's temp file survives to the point we
        // read it back below; `None` in the sort-fallback case, where we
        // read the unsorted manifest temp file instead.
        let mut sorted_temp_holder: Option<NamedTempFile> = None;
        let (sorted_manifest_path, manifest_unsorted): (PathBuf, bool) =
            match try_sort_manifest(options, current_manifest_temp.path()) {
                Ok((sorted_temp, path)) => {
                    sorted_temp_holder = Some(sorted_temp);
                    (path, false)
                }
                Err(e) => {
                    // Spec §4.10 step 8 / §7: a sort failure (whether from
                    // not being able to allocate run temp files or from the
                    // sort itself) is non-fatal - fall back to the
                    // unsorted manifest and record that fact so callers
                    // know not to trust `ManifestLookup` against it later.
                    warn!(error = %e, "manifest sort failed, writing manifest unsorted");
                    (current_manifest_temp.path().to_path_buf(), true)
                }
            };
        run.manifest_unsorted = manifest_unsorted;

        let removed = match (&previous_manifest, manifest_unsorted) {
            (Some(prev_temp), false) => {
                let prev_reader = ManifestReader::new(std::io::BufReader::new(
                    std::fs::File::open(prev_temp.path()).map_err(SnapvaultError::io_in)?,
                ));
                let cur_reader = ManifestReader::new(std::io::BufReader::new(
                    std::fs::File::open(&sorted_manifest_path).map_err(SnapvaultError::io_in)?,
                ));
                removed_paths(prev_reader, cur_reader)?
            }
            _ => Vec::new(),
        };
        run.removed = removed.len() as u64;

        let manifest_bytes = std::fs::read(&sorted_manifest_path).map_err(SnapvaultError::io_in)?;
        archive.append_checksums(&mut &manifest_bytes[..], manifest_bytes.len() as u64)?;

        let removed_bytes = removed.iter().fold(String::new(), |mut acc, p| {
            acc.push_str(p);
            acc.push('\n');
            acc
        });
        archive.append_removed(&mut removed_bytes.as_bytes(), removed_bytes.len() as u64)?;
        archive.finish()?;

        finalize_output(options, &tar_temp, &output_path)?;

        info!(
            added = run.added,
            changed = run.changed,
            unchanged = run.unchanged,
            removed = run.removed,
            output = %output_path.display(),
            "backup run complete"
        );

        Ok(run)
    }
}

fn handle_entry(
    entry: &WalkEntry,
    options: &BackupOptions,
    detector: &mut ChangeDetector,
    archive: &mut TarArchiveWriter<std::fs::File>,
    manifest_writer: &mut ManifestWriter<std::fs::File>,
    run: &mut BackupRun,
) -> Result<()> {
    let path_str = entry.path.to_string_lossy().into_owned();
    let metadata = std::fs::metadata(&entry.path).map_err(SnapvaultError::io_in)?;

    let mut file = std::fs::File::open(&entry.path).map_err(SnapvaultError::io_in)?;
    let digest_hex = DigestComputer::digest_reader(options.digest_algorithm, &mut file)?;

    let classification = if options.previous_digest_algorithm == Some(options.digest_algorithm) {
        detector.classify(&path_str, &digest_hex)?
    } else {
        Classification::Added
    };

    manifest_writer.write_entry(&ManifestEntry::new(path_str.clone(), digest_hex)?)?;

    match classification {
        Classification::Added => run.added += 1,
        Classification::Changed => run.changed += 1,
        Classification::Unchanged => {
            run.unchanged += 1;
            return Ok(());
        }
    }

    file.seek(SeekFrom::Start(0)).map_err(SnapvaultError::io_in)?;
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode()
    };
    #[cfg(not(unix))]
    let mode = 0o644;
    archive.append_file_sized(&path_str, &mut file, mode, metadata.len())?;
    Ok(())
}

fn load_previous_manifest(options: &BackupOptions) -> Result<Option<NamedTempFile>> {
    let Some(prev_path) = &options.previous_archive else {
        return Ok(None);
    };
    if options.previous_digest_algorithm != Some(options.digest_algorithm) {
        return Ok(None);
    }

    let raw = decode_archive_to_tar_bytes(options, prev_path)?;
    let Some(checksums) = extract_member(std::io::Cursor::new(raw), CHECKSUMS_MEMBER)? else {
        return Ok(None);
    };

    let mut temp = NamedTempFile::new().map_err(SnapvaultError::io_out)?;
    temp.write_all(&checksums).map_err(SnapvaultError::io_out)?;
    temp.flush().map_err(SnapvaultError::io_out)?;
    Ok(Some(temp))
}

/// Undo encryption then decompression on a previous archive, returning
/// the raw tar bytes it contains. Mirrors `extract_prev_checksums` in the
/// original tool, minus the requirement to shred the temp file - that
/// file lives only in our own temp dir and is cleaned up by `tempfile`'s
/// drop.
fn decode_archive_to_tar_bytes(options: &BackupOptions, archive_path: &Path) -> Result<Vec<u8>> {
    let file = std::fs::File::open(archive_path).map_err(SnapvaultError::io_in)?;

    let compressed: Box<dyn Read> = if let Some(enc) = &options.encryption {
        let password = SecureBuffer::from_vec(enc.password.as_slice().to_vec());
        let (stream, reader) = CipherStream::new()
            .set_cipher(&enc.cipher_name, password)?
            .extract_salt(file)?;
        let keyed = stream.derive_keys()?;
        let mut plaintext = Vec::new();
        keyed.decrypt(reader, &mut plaintext)?;
        Box::new(std::io::Cursor::new(plaintext))
    } else {
        Box::new(file)
    };

    let mut tar_bytes = Vec::new();
    CompressorReader::new(options.compressor, compressed)
        .read_to_end(&mut tar_bytes)
        .map_err(SnapvaultError::io_in)?;
    Ok(tar_bytes)
}

fn finalize_output(options: &BackupOptions, tar_temp: &NamedTempFile, output_path: &Path) -> Result<()> {
    let needs_compression = options.compressor != CompressorKind::None;
    let needs_encryption = options.encryption.is_some();

    if !needs_compression && !needs_encryption {
        rename_or_copy(tar_temp.path(), output_path)?;
        return Ok(());
    }

    let staged = if needs_compression {
        let compressed_temp =
            NamedTempFile::new_in(output_path.parent().unwrap_or(Path::new("."))).map_err(SnapvaultError::io_out)?;
        {
            let input = std::fs::File::open(tar_temp.path()).map_err(SnapvaultError::io_in)?;
            let output = compressed_temp.reopen().map_err(SnapvaultError::io_out)?;
            let mut writer = CompressorWriter::new(options.compressor, output, options.compression_level);
            let mut input = input;
            std::io::copy(&mut input, &mut writer).map_err(SnapvaultError::io_out)?;
            writer.finish()?;
        }
        compressed_temp
    } else {
        // No owned copy needed; reopen the same tar temp for the next stage.
        NamedTempFile::new_in(output_path.parent().unwrap_or(Path::new(".")))
            .map_err(SnapvaultError::io_out)
            .and_then(|t| {
                std::fs::copy(tar_temp.path(), t.path()).map_err(SnapvaultError::io_out)?;
                Ok(t)
            })?
    };

    if needs_encryption {
        let enc = options.encryption.as_ref().unwrap();
        let password = SecureBuffer::from_vec(enc.password.as_slice().to_vec());
        let input = std::fs::File::open(staged.path()).map_err(SnapvaultError::io_in)?;
        let output = std::fs::File::create(output_path).map_err(SnapvaultError::io_out)?;
        CipherStream::new()
            .set_cipher(&enc.cipher_name, password)?
            .generate_salt()?
            .derive_keys()?
            .encrypt(input, output)?;
    } else {
        rename_or_copy(staged.path(), output_path)?;
    }
    Ok(())
}

/// Renames `from` to `to`, falling back to copy-then-delete when the two
/// paths are on different filesystems (`EXDEV`). The copy is fsynced
/// before the source is unlinked so a crash between the copy and the
/// unlink can never leave neither file durably present.
fn rename_or_copy(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            std::fs::copy(from, to).map_err(SnapvaultError::io_out)?;
            let dst = std::fs::File::open(to).map_err(SnapvaultError::io_out)?;
            dst.sync_all().map_err(SnapvaultError::io_out)?;
            std::fs::remove_file(from).map_err(SnapvaultError::io_out)?;
            Ok(())
        }
        Err(e) => Err(SnapvaultError::io_out(e)),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    libc::EXDEV
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    i32::MIN
}

fn default_backup_name(options: &BackupOptions) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut name = format!("backup-{timestamp}.tar");
    name.push_str(options.compressor.extension());
    if let Some(enc) = &options.encryption {
        name.push('.');
        name.push_str(&enc.cipher_name);
    }
    name
}

/// Sorts the freshly-written manifest into a new temp file, returning that
/// temp file (kept alive by the caller) and its path. Any failure here -
/// allocating the temp file or the sort itself - is reported to the caller
/// so it can fall back to an unsorted manifest rather than aborting the run.
fn try_sort_manifest(options: &BackupOptions, current_manifest_path: &Path) -> Result<(NamedTempFile, PathBuf)> {
    let sorted_temp = NamedTempFile::new_in(&options.output_directory).map_err(SnapvaultError::io_out)?;
    let input = std::fs::File::open(current_manifest_path).map_err(SnapvaultError::io_in)?;
    let output = sorted_temp.reopen().map_err(SnapvaultError::io_out)?;
    ExternalSort::new(options.max_run_bytes).sort(std::io::BufReader::new(input), output)?;
    let path = sorted_temp.path().to_path_buf();
    Ok((sorted_temp, path))
}

fn estimate_total(directories: &[PathBuf]) -> u64 {
    directories.len() as u64
}

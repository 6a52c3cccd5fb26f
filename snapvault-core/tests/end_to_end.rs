use std::fs;

use snapvault_core::compress::CompressorKind;
use snapvault_core::driver::{BackupDriver, BackupOptions, EncryptionOptions};
use snapvault_core::progress::NullProgress;
use snapvault_core::secure::SecureBuffer;

/// Scenario 1: first run with no prior manifest and no encryption treats
/// every file as added and produces a readable archive.
#[test]
fn first_backup_run_archives_everything() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("one.txt"), b"first").unwrap();
    fs::write(src.path().join("two.txt"), b"second").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let options = BackupOptions::new(vec![src.path().to_path_buf()], out_dir.path().to_path_buf());

    let run = BackupDriver::run(&options, &NullProgress).unwrap();
    assert_eq!(run.added, 2);
    assert_eq!(run.removed, 0);
    assert!(!run.manifest_unsorted);
    assert!(run.output_path.exists());
}

/// Scenario 2: a second run against the same directories correctly
/// separates unchanged, changed, added, and removed files.
#[test]
fn second_run_classifies_every_kind_of_change() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("steady.txt"), b"no change").unwrap();
    fs::write(src.path().join("edited.txt"), b"v1").unwrap();
    fs::write(src.path().join("doomed.txt"), b"will vanish").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let mut options = BackupOptions::new(vec![src.path().to_path_buf()], out_dir.path().to_path_buf());
    let first = BackupDriver::run(&options, &NullProgress).unwrap();

    fs::write(src.path().join("edited.txt"), b"v2").unwrap();
    fs::remove_file(src.path().join("doomed.txt")).unwrap();
    fs::write(src.path().join("newcomer.txt"), b"brand new").unwrap();

    options.previous_archive = Some(first.output_path);
    options.previous_digest_algorithm = Some(options.digest_algorithm);
    let second = BackupDriver::run(&options, &NullProgress).unwrap();

    assert_eq!(second.unchanged, 1, "steady.txt should be unchanged");
    assert_eq!(second.changed, 1, "edited.txt should be changed");
    assert_eq!(second.added, 1, "newcomer.txt should be added");
    assert_eq!(second.removed, 1, "doomed.txt should be reported removed");
}

/// Scenario 3: an encrypted archive is byte-compatible with the real
/// `openssl enc` command line tool. Requires `openssl` on PATH, so this
/// is skipped in environments without it (most CI sandboxes).
#[test]
#[ignore = "requires the openssl(1) CLI on PATH to validate cross-implementation compatibility"]
fn encrypted_archive_is_readable_by_openssl_cli() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("secret.txt"), b"for your eyes only").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let mut options = BackupOptions::new(vec![src.path().to_path_buf()], out_dir.path().to_path_buf());
    options.encryption = Some(EncryptionOptions {
        cipher_name: "aes-256-cbc".to_string(),
        password: SecureBuffer::from_vec(b"hunter2".to_vec()),
    });

    let run = BackupDriver::run(&options, &NullProgress).unwrap();

    let decrypted = out_dir.path().join("decrypted.tar");
    let status = std::process::Command::new("openssl")
        .args([
            "enc",
            "-d",
            "-aes-256-cbc",
            "-pbkdf2",
            "0", // disable pbkdf2, match EVP_BytesToKey legacy mode
            "-pass",
            "pass:hunter2",
            "-in",
        ])
        .arg(&run.output_path)
        .arg("-out")
        .arg(&decrypted)
        .status()
        .unwrap();
    assert!(status.success());
}

/// Scenario 4: external sort correctness at a scale that forces multiple
/// runs and a k-way merge, exercised through the manifest sort module
/// directly rather than the full driver for practicality.
#[test]
fn manifest_external_sort_handles_many_runs() {
    use snapvault_core::manifest::{io, ExternalSort, ManifestEntry};

    let entries: Vec<ManifestEntry> = (0..5000)
        .map(|i| ManifestEntry::new(format!("/p/{:06}", (i * 104729) % 5000), format!("{:06x}", i)).unwrap())
        .collect();
    let mut input = Vec::new();
    io::write_all(&mut input, &entries).unwrap();

    let mut output = Vec::new();
    ExternalSort::new(4096)
        .sort(std::io::Cursor::new(input), &mut output)
        .unwrap();

    let sorted = io::read_all(std::io::Cursor::new(output)).unwrap();
    assert_eq!(sorted.len(), 5000);
    for window in sorted.windows(2) {
        assert!(window[0].path <= window[1].path);
    }
}

/// Scenario 6: directories named `lost+found` are always excluded from
/// the walk regardless of user-configured excludes.
#[test]
fn exclusion_policy_skips_lost_and_found_and_configured_paths() {
    let src = tempfile::tempdir().unwrap();
    fs::create_dir(src.path().join("lost+found")).unwrap();
    fs::write(src.path().join("lost+found/orphan"), b"debris").unwrap();
    fs::create_dir(src.path().join("skip_me")).unwrap();
    fs::write(src.path().join("skip_me/file"), b"excluded").unwrap();
    fs::write(src.path().join("keep.txt"), b"kept").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let mut options = BackupOptions::new(vec![src.path().to_path_buf()], out_dir.path().to_path_buf());
    options.exclude = vec![src.path().join("skip_me")];
    options.compressor = CompressorKind::None;

    let run = BackupDriver::run(&options, &NullProgress).unwrap();
    assert_eq!(run.added, 1, "only keep.txt should have been archived");
}

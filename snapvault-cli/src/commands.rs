use std::io::Read;

use snapvault_core::archive::extract_files;
use snapvault_core::compress::{CompressorKind, CompressorReader};
use snapvault_core::config::{BackupConfig, ConfigStore, FileConfigStore};
use snapvault_core::crypto::CipherStream;
use snapvault_core::digest::DigestAlgorithm;
use snapvault_core::driver::{BackupDriver, BackupOptions, EncryptionOptions};
use snapvault_core::error::{Result, SnapvaultError};
use snapvault_core::progress::TracingProgress;
use snapvault_core::secure::SecureBuffer;

use crate::cli::{BackupArgs, RestoreArgs};

pub fn run_backup(args: BackupArgs) -> Result<()> {
    let config_store = args.config.as_ref().map(|path| FileConfigStore::new(path.clone()));
    let previous_config = match &config_store {
        Some(store) => store.load()?,
        None => BackupConfig::default(),
    };

    let directories = if args.directories.is_empty() {
        previous_config.directories.clone()
    } else {
        args.directories.clone()
    };
    if directories.is_empty() {
        return Err(SnapvaultError::ArgInvalid(
            "no directories given on the command line or in the config file".to_string(),
        ));
    }

    let mut exclude = previous_config.exclude.clone();
    exclude.extend(args.exclude.iter().cloned());

    let mut options = BackupOptions::new(directories.clone(), args.output_directory.clone());
    options.exclude = exclude;
    options.digest_algorithm = DigestAlgorithm::parse(&args.hash_algorithm)?;
    options.compressor = CompressorKind::parse(&args.compression)?;
    options.compression_level = args.compression_level;
    options.previous_archive = args.previous_archive.clone();
    options.previous_digest_algorithm = previous_config.hash_algorithm;

    if let Some(cipher_name) = &args.encrypt {
        let password = resolve_password(args.password.as_deref())?;
        options.encryption = Some(EncryptionOptions {
            cipher_name: cipher_name.clone(),
            password,
        });
    }

    let run = BackupDriver::run(&options, &TracingProgress)?;

    if let Some(store) = &config_store {
        let new_config = BackupConfig {
            directories,
            exclude: options.exclude.clone(),
            hash_algorithm: Some(options.digest_algorithm),
            enc_algorithm: args.encrypt.clone(),
            compressor: Some(options.compressor),
            compression_level: Some(options.compression_level),
            output_directory: Some(args.output_directory.clone()),
        };
        store.save(&new_config)?;
    }

    println!(
        "backup complete: {} (added {}, changed {}, unchanged {}, removed {}){}",
        run.output_path.display(),
        run.added,
        run.changed,
        run.unchanged,
        run.removed,
        if run.manifest_unsorted {
            " [warning: manifest written unsorted, next run's change detection will be degraded]"
        } else {
            ""
        }
    );
    Ok(())
}

pub fn run_restore(args: RestoreArgs) -> Result<()> {
    let compressor = CompressorKind::parse(&args.compression)?;
    let file = std::fs::File::open(&args.archive).map_err(SnapvaultError::io_in)?;

    let decrypted: Box<dyn Read> = if let Some(cipher_name) = &args.encrypt {
        let password = resolve_password(args.password.as_deref())?;
        let (stream, reader) = CipherStream::new().set_cipher(cipher_name, password)?.extract_salt(file)?;
        let mut plaintext = Vec::new();
        stream.derive_keys()?.decrypt(reader, &mut plaintext)?;
        Box::new(std::io::Cursor::new(plaintext))
    } else {
        Box::new(file)
    };

    let decompressed = CompressorReader::new(compressor, decrypted);
    extract_files(decompressed, &args.destination)?;
    println!("restored into {}", args.destination.display());
    Ok(())
}

fn resolve_password(provided: Option<&str>) -> Result<SecureBuffer> {
    match provided {
        Some(p) => Ok(SecureBuffer::from_vec(p.as_bytes().to_vec())),
        None => {
            let prompt_result = rpassword::prompt_password("password: ")
                .map_err(|e| SnapvaultError::ArgInvalid(format!("could not read password: {e}")))?;
            Ok(SecureBuffer::from_vec(prompt_result.into_bytes()))
        }
    }
}


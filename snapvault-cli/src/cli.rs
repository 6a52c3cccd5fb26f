use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "snapvault", version, about = "Incremental backup engine")]
pub struct Cli {
    /// Increase log verbosity; repeat for more detail (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backup of the configured (or given) directories.
    Backup(BackupArgs),
    /// Restore files out of a previously created archive.
    Restore(RestoreArgs),
}

#[derive(clap::Args)]
pub struct BackupArgs {
    /// Directories to back up. Falls back to the config file's
    /// `DIRECTORIES` entry when omitted.
    #[arg(required = false)]
    pub directories: Vec<PathBuf>,

    /// Where the archive (and config file) are written.
    #[arg(short, long)]
    pub output_directory: PathBuf,

    /// Path to a legacy KV config file to load defaults from and persist
    /// this run's settings back to.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// One of: sha1, sha256, sha512, md5, none.
    #[arg(long, default_value = "sha256")]
    pub hash_algorithm: String,

    /// One of: none, gzip, bzip2, xz, lz4.
    #[arg(long, default_value = "none")]
    pub compression: String,

    #[arg(long, default_value_t = 6)]
    pub compression_level: u32,

    /// OpenSSL cipher name (e.g. aes-256-cbc). Omit to skip encryption.
    #[arg(long)]
    pub encrypt: Option<String>,

    /// Password for encryption. Prompted interactively if `--encrypt` is
    /// set and this is omitted.
    #[arg(long)]
    pub password: Option<String>,

    /// Path to the previous run's archive, for incremental change
    /// detection. Defaults to the config file's record of the last run
    /// when present.
    #[arg(long)]
    pub previous_archive: Option<PathBuf>,

    /// Additional paths to exclude from the walk.
    #[arg(long)]
    pub exclude: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub struct RestoreArgs {
    /// The archive to restore from.
    pub archive: PathBuf,

    /// Directory to restore files into.
    #[arg(short, long)]
    pub destination: PathBuf,

    #[arg(long, default_value = "none")]
    pub compression: String,

    #[arg(long)]
    pub encrypt: Option<String>,

    #[arg(long)]
    pub password: Option<String>,
}

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Backup(args) => commands::run_backup(args),
        Commands::Restore(args) => commands::run_restore(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(exit_code_for(&err));
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn exit_code_for(err: &snapvault_core::error::SnapvaultError) -> i32 {
    use snapvault_core::error::SnapvaultError as E;
    match err {
        E::ArgInvalid(_) => 2,
        E::NotFound(_) => 3,
        E::PermissionDenied(_) => 4,
        E::UnknownAlgorithm(_) => 5,
        E::InvalidFormat(_) => 6,
        E::CipherInit(_) | E::CipherUpdate(_) | E::CipherFinal(_) => 7,
        E::OutOfMemory => 8,
        E::UsageOrder(_) => 9,
        E::IoIn(_) | E::IoOut(_) | E::Io(_) => 1,
    }
}

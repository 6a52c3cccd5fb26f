use thiserror::Error;

/// One variant per error kind named in the spec's error-handling design.
/// `Io` is reserved for errors that don't need to distinguish in/out
/// direction at the point they're raised; call sites that know whether the
/// failing stream was a source or destination use `IoIn`/`IoOut` instead.
#[derive(Error, Debug)]
pub enum SnapvaultError {
    #[error("invalid argument: {0}")]
    ArgInvalid(String),

    #[error("input I/O error: {0}")]
    IoIn(#[source] std::io::Error),

    #[error("output I/O error: {0}")]
    IoOut(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation called out of order: {0}")]
    UsageOrder(&'static str),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("cipher initialization failed: {0}")]
    CipherInit(String),

    #[error("cipher update failed: {0}")]
    CipherUpdate(String),

    #[error("cipher finalization failed: {0}")]
    CipherFinal(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl SnapvaultError {
    pub fn io_in(e: std::io::Error) -> Self {
        SnapvaultError::IoIn(e)
    }

    pub fn io_out(e: std::io::Error) -> Self {
        SnapvaultError::IoOut(e)
    }
}

pub type Result<T> = std::result::Result<T, SnapvaultError>;

use std::path::PathBuf;

/// The main error enum for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse object file: {0}")]
    ObjectRead(#[from] object::read::Error),
    #[error("failed to rebuild ELF file: {0}")]
    ObjectBuild(#[from] object::build::Error),
    #[error("failed to read DWARF: {0}")]
    Dwarf(#[from] gimli::Error),
    #[error("store returned an error: {0}")]
    Status(#[from] tonic::Status),
    #[error("failed to connect to store: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to configure TLS: {0}")]
    Tls(#[from] rustls::Error),
    #[error("unsupported object format: {0:?}")]
    UnsupportedFormat(object::BinaryFormat),
    #[error("invalid store address '{address}'")]
    InvalidAddress { address: String },
    #[error("a bearer token requires transport security, but the connection is plaintext")]
    InsecureBearerToken,
    #[error("bearer token is not a valid header value")]
    InvalidBearerToken,
    #[error("failed to find actionable files")]
    NoActionableInputs,
    #[error("{} is empty, but must not be empty", path.display())]
    EmptyArtifact { path: PathBuf },
    #[error("no build ID found in {}", path.display())]
    MissingBuildId { path: PathBuf },
    #[error("a build ID must be given for artifacts of type '{kind}'")]
    BuildIdRequired { kind: crate::DebuginfoKind },
    #[error("no upload strategy specified")]
    UnspecifiedStrategy,
    #[error("unknown upload strategy: {0}")]
    UnrecognizedStrategy(i32),
    #[error("store acknowledged {acknowledged} bytes, but {sent} were sent")]
    SizeMismatch { sent: u64, acknowledged: u64 },
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("operation cancelled")]
    Cancelled,
    #[error("received signal {0}")]
    Interrupted(&'static str),
    #[error(transparent)]
    Extract(#[from] crate::extract::ExtractError),
    #[error(transparent)]
    Upload(#[from] crate::upload::UploadError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::path::PathBuf;
use std::process::ExitCode;

/// Categories of application errors that can be matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Argument validation errors
    ArgValidation,
    /// General IO errors
    IO,
    /// The bearer token file could not be read
    TokenRead,
    /// The store could not be reached
    Connect,
    /// A command failed while doing its work
    Command,
    /// The process was asked to stop by a signal
    Interrupted,
}

/// Internal error type that contains all application error variants.
#[derive(Debug, thiserror::Error)]
pub enum AppErrorInner {
    #[error("Argument error: {0}")]
    ArgValidation(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("failed to read bearer token from {}", path.display())]
    TokenRead {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to connect to debug-info store at '{address}'")]
    Connect {
        address: String,
        #[source]
        err: debuginfo_sync::Error,
    },
    #[error("failed to {action}")]
    Command {
        action: &'static str,
        #[source]
        err: debuginfo_sync::Error,
    },
    #[error("interrupted by {0}")]
    Interrupted(&'static str),
}

/// The main application-level error type. Keeps the concrete failure for reporting and a kind for
/// the exit code.
///
/// This type uses the newtype pattern to wrap a boxed inner error, reducing stack size.
#[derive(Debug)]
pub struct AppError(Box<AppErrorInner>, AppErrorKind);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl AppError {
    /// Create a new AppError with the given inner error and kind
    pub fn new(inner: AppErrorInner, kind: AppErrorKind) -> Self {
        Self(Box::new(inner), kind)
    }

    /// Get the error kind for pattern matching
    pub fn error_kind(&self) -> &AppErrorKind {
        &self.1
    }

    /// Create an argument validation error
    pub fn arg_validation(msg: String) -> Self {
        Self::new(AppErrorInner::ArgValidation(msg), AppErrorKind::ArgValidation)
    }

    pub fn token_read(path: PathBuf, err: std::io::Error) -> Self {
        Self::new(AppErrorInner::TokenRead { path, err }, AppErrorKind::TokenRead)
    }

    pub fn connect(address: String, err: debuginfo_sync::Error) -> Self {
        match err {
            debuginfo_sync::Error::Interrupted(signal) => Self::interrupted(signal),
            err => Self::new(AppErrorInner::Connect { address, err }, AppErrorKind::Connect),
        }
    }

    /// A command failed. A signal that stopped the command is reported as such.
    pub fn command(action: &'static str, err: debuginfo_sync::Error) -> Self {
        match err {
            debuginfo_sync::Error::Interrupted(signal) => Self::interrupted(signal),
            err => Self::new(AppErrorInner::Command { action, err }, AppErrorKind::Command),
        }
    }

    pub fn interrupted(signal: &'static str) -> Self {
        Self::new(AppErrorInner::Interrupted(signal), AppErrorKind::Interrupted)
    }

    /// Print the error and its chain of causes to stderr.
    pub fn report(&self) {
        eprintln!("error: {self}");
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(AppErrorInner::IO(err), AppErrorKind::IO)
    }
}

impl From<debuginfo_sync::Error> for AppError {
    fn from(err: debuginfo_sync::Error) -> Self {
        Self::command("complete the command", err)
    }
}

impl From<AppError> for ExitCode {
    fn from(error: AppError) -> Self {
        ExitCode::from(match error.error_kind() {
            AppErrorKind::ArgValidation => 2,
            AppErrorKind::Interrupted => 130,
            _ => 1,
        })
    }
}

#[cfg(test)]
mod test_app_error {
    use super::*;

    #[test]
    fn signals_map_to_interrupted() {
        let err = AppError::command("upload", debuginfo_sync::Error::Interrupted("SIGINT"));
        assert_eq!(err.error_kind(), &AppErrorKind::Interrupted);
        assert_eq!(err.to_string(), "interrupted by SIGINT");
    }

    #[test]
    fn command_failures_keep_their_cause() {
        let err = AppError::command("extract debug information", debuginfo_sync::Error::NoActionableInputs);
        assert_eq!(err.error_kind(), &AppErrorKind::Command);
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "failed to find actionable files");
    }
}

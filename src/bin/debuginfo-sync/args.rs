use std::path::{Path, PathBuf};

use clap::Parser;

use debuginfo_sync::sources::DEFAULT_ARCHIVE_PATH;
use debuginfo_sync::store::StoreConfig;
use debuginfo_sync::upload::UploadOptions;
use debuginfo_sync::{CollectOptions, DebuginfoKind, ExtractMode};

use crate::error::AppError;

// Shamelessly borrowed from https://github.com/crate-ci/clap-cargo/blob/0378657ffdf2b67bcd6f1ab56e04a1322b92dd0e/src/style.rs
// thanks to https://stackoverflow.com/a/79614957
use anstyle::AnsiColor::*;
use anstyle::Effects;
use anstyle::Style;

const HEADER: Style = Green.on_default().effects(Effects::BOLD);
const USAGE: Style = Green.on_default().effects(Effects::BOLD);
const LITERAL: Style = Cyan.on_default().effects(Effects::BOLD);
const PLACEHOLDER: Style = Cyan.on_default();
const ERROR: Style = Red.on_default().effects(Effects::BOLD);
const VALID: Style = Cyan.on_default().effects(Effects::BOLD);
const INVALID: Style = Yellow.on_default().effects(Effects::BOLD);

const APP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

/// Environment variable consulted for the bearer token.
pub const BEARER_TOKEN_ENV: &str = "DEBUGINFO_BEARER_TOKEN";

#[derive(Debug, Parser)]
#[command(name = "debuginfo-sync")]
#[command(about = "Extract, upload and archive debug information of compiled binaries")]
#[command(version)]
#[command(long_about = None)]
#[command(styles = APP_STYLING)]
#[command(term_width = 80)]
struct Args {
    /// Log level. `RUST_LOG` takes precedence when set.
    #[arg(long, value_enum, value_name = "LEVEL", default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct ExtractArgs {
    /// What to keep of each binary
    #[arg(long, value_enum, default_value_t = Mode::KeepOnlyDebug)]
    mode: Mode,

    /// Zlib-compress the DWARF sections of extracted files
    #[arg(long)]
    compress_dwarf_sections: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Upload debug information of the given binaries to a debug-info store
    Upload {
        /// Address of the store
        #[arg(long, value_name = "HOST:PORT")]
        store_address: String,

        /// Bearer token to authenticate with
        #[arg(long, env = BEARER_TOKEN_ENV, hide_env_values = true, value_name = "TOKEN")]
        bearer_token: Option<String>,

        /// File to read the bearer token from. Takes precedence over --bearer-token.
        #[arg(long, value_name = "PATH")]
        bearer_token_file: Option<PathBuf>,

        /// Connect without transport security
        #[arg(long)]
        insecure: bool,

        /// Use transport security but do not verify the store's certificate. `--insecure` takes
        /// precedence
        #[arg(long)]
        insecure_skip_verify: bool,

        /// Upload the binaries as they are instead of extracting their debug information
        #[arg(long)]
        no_extract: bool,

        /// Only ask the store whether it wants each artifact; do not upload anything
        #[arg(long)]
        no_initiate: bool,

        /// Upload even if the store already has the artifact
        #[arg(long)]
        force: bool,

        /// Type of the uploaded artifacts
        #[arg(long = "type", value_enum, value_name = "TYPE", default_value_t = Kind::Debuginfo)]
        kind: Kind,

        /// Build ID to upload under instead of the one read from each binary
        #[arg(long, value_name = "ID")]
        build_id: Option<String>,

        #[command(flatten)]
        extract: ExtractArgs,

        /// Binaries (or files, with --no-extract) to upload
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Extract debug information of the given binaries into a directory
    Extract {
        /// Directory to write `<build-id>.debuginfo` files to. It is emptied first.
        #[arg(long, short = 'o', value_name = "PATH", default_value = "out")]
        output_dir: PathBuf,

        #[command(flatten)]
        extract: ExtractArgs,

        /// Binaries to extract from
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the build ID of a binary
    #[command(name = "buildid")]
    BuildId {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Archive the source files referenced by a binary's debug information
    Source {
        #[arg(value_name = "DEBUGINFO-PATH")]
        debuginfo_path: PathBuf,

        #[arg(value_name = "OUT-PATH", default_value = DEFAULT_ARCHIVE_PATH)]
        out_path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Kind {
    Debuginfo,
    Executable,
    Sources,
}

impl From<Kind> for DebuginfoKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Debuginfo => DebuginfoKind::Debuginfo,
            Kind::Executable => DebuginfoKind::Executable,
            Kind::Sources => DebuginfoKind::Sources,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    /// Keep only the debug sections
    KeepOnlyDebug,
    /// Drop the debug sections
    StripDebug,
}

impl From<Mode> for ExtractMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::KeepOnlyDebug => ExtractMode::KeepOnlyDebug,
            Mode::StripDebug => ExtractMode::StripDebug,
        }
    }
}

#[derive(Debug)]
pub struct ValidatedArgs {
    pub log_level: LogLevel,
    pub command: ValidatedCommand,
}

#[derive(Debug)]
pub enum ValidatedCommand {
    Upload {
        store: StoreConfig,
        collect: CollectOptions,
        options: UploadOptions,
        compress_dwarf_sections: bool,
        paths: Vec<PathBuf>,
    },
    Extract {
        output_dir: PathBuf,
        mode: ExtractMode,
        compress_dwarf_sections: bool,
        paths: Vec<PathBuf>,
    },
    BuildId {
        path: PathBuf,
    },
    Source {
        debuginfo_path: PathBuf,
        out_path: PathBuf,
    },
}

impl ValidatedArgs {
    fn require_files(paths: &[PathBuf]) -> Result<(), AppError> {
        match paths.iter().find(|path| !path.is_file()) {
            Some(path) => Err(AppError::arg_validation(format!(
                "input file does not exist: {}",
                path.display()
            ))),
            None => Ok(()),
        }
    }

    /// The token from `--bearer-token-file` if given, else from `--bearer-token` or the
    /// environment. Surrounding whitespace is not part of the token.
    fn detect_bearer_token(
        arg: Option<String>,
        file: Option<&Path>,
    ) -> Result<Option<String>, AppError> {
        let token = match file {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|err| AppError::token_read(path.to_path_buf(), err))?,
            None => match arg {
                Some(token) => token,
                None => return Ok(None),
            },
        };
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::arg_validation("bearer token is empty".to_string()));
        }
        Ok(Some(token.to_string()))
    }
}

impl TryFrom<Command> for ValidatedCommand {
    type Error = AppError;

    fn try_from(command: Command) -> Result<Self, Self::Error> {
        match command {
            Command::Upload {
                store_address,
                bearer_token,
                bearer_token_file,
                insecure,
                insecure_skip_verify,
                no_extract,
                no_initiate,
                force,
                kind,
                build_id,
                extract,
                paths,
            } => {
                ValidatedArgs::require_files(&paths)?;
                if store_address.trim().is_empty() {
                    return Err(AppError::arg_validation(
                        "store address must not be empty".to_string(),
                    ));
                }
                let build_id = build_id.filter(|id| !id.is_empty());
                let kind = DebuginfoKind::from(kind);
                if kind == DebuginfoKind::Sources && build_id.is_none() {
                    return Err(AppError::arg_validation(
                        "--build-id is required when uploading sources".to_string(),
                    ));
                }
                let bearer_token = ValidatedArgs::detect_bearer_token(
                    bearer_token,
                    bearer_token_file.as_deref(),
                )?;

                Ok(ValidatedCommand::Upload {
                    store: StoreConfig {
                        address: store_address,
                        bearer_token,
                        insecure,
                        insecure_skip_verify,
                    },
                    collect: CollectOptions {
                        kind,
                        no_extract,
                        build_id,
                        mode: extract.mode.into(),
                    },
                    options: UploadOptions {
                        force,
                        dry_run: no_initiate,
                    },
                    compress_dwarf_sections: extract.compress_dwarf_sections,
                    paths,
                })
            }
            Command::Extract {
                output_dir,
                extract,
                paths,
            } => {
                ValidatedArgs::require_files(&paths)?;
                Ok(ValidatedCommand::Extract {
                    output_dir,
                    mode: extract.mode.into(),
                    compress_dwarf_sections: extract.compress_dwarf_sections,
                    paths,
                })
            }
            Command::BuildId { path } => {
                ValidatedArgs::require_files(std::slice::from_ref(&path))?;
                Ok(ValidatedCommand::BuildId { path })
            }
            Command::Source {
                debuginfo_path,
                out_path,
            } => {
                ValidatedArgs::require_files(std::slice::from_ref(&debuginfo_path))?;
                Ok(ValidatedCommand::Source {
                    debuginfo_path,
                    out_path,
                })
            }
        }
    }
}

pub fn parse() -> Result<ValidatedArgs, AppError> {
    let args = Args::parse();
    Ok(ValidatedArgs {
        log_level: args.log_level,
        command: ValidatedCommand::try_from(args.command)?,
    })
}

#[cfg(test)]
mod test_validation {
    use super::*;

    fn validate(argv: &[&str]) -> Result<ValidatedCommand, AppError> {
        let args = Args::try_parse_from(std::iter::once("debuginfo-sync").chain(argv.iter().copied()))
            .unwrap();
        ValidatedCommand::try_from(args.command)
    }

    #[test]
    fn token_file_is_trimmed_and_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let token = dir.path().join("token");
        std::fs::write(&bin, b"x").unwrap();
        std::fs::write(&token, "  from-file\n").unwrap();

        let command = validate(&[
            "upload",
            "--store-address",
            "store:7070",
            "--bearer-token",
            "from-flag",
            "--bearer-token-file",
            token.to_str().unwrap(),
            bin.to_str().unwrap(),
        ])
        .unwrap();

        let ValidatedCommand::Upload { store, .. } = command else {
            panic!("expected upload");
        };
        assert_eq!(store.bearer_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn insecure_and_skip_verify_are_accepted_together() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::write(&bin, b"x").unwrap();

        let command = validate(&[
            "upload",
            "--store-address",
            "store:7070",
            "--insecure",
            "--insecure-skip-verify",
            bin.to_str().unwrap(),
        ])
        .unwrap();

        let ValidatedCommand::Upload { store, .. } = command else {
            panic!("expected upload");
        };
        assert!(store.insecure);
        assert!(store.insecure_skip_verify);
    }

    #[test]
    fn sources_need_a_build_id() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("source.tar.zstd");
        std::fs::write(&archive, b"x").unwrap();

        let result = validate(&[
            "upload",
            "--store-address",
            "store:7070",
            "--type",
            "sources",
            archive.to_str().unwrap(),
        ]);
        let err = result.unwrap_err();
        assert_eq!(err.error_kind(), &crate::error::AppErrorKind::ArgValidation);
    }

    #[test]
    fn no_initiate_is_a_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::write(&bin, b"x").unwrap();

        let command = validate(&[
            "upload",
            "--store-address",
            "store:7070",
            "--no-initiate",
            "--mode",
            "strip-debug",
            bin.to_str().unwrap(),
        ])
        .unwrap();
        let ValidatedCommand::Upload { options, collect, .. } = command else {
            panic!("expected upload");
        };
        assert!(options.dry_run);
        assert!(!options.force);
        assert_eq!(collect.mode, ExtractMode::StripDebug);
    }

    #[test]
    fn insecure_flags_conflict() {
        let result = Args::try_parse_from([
            "debuginfo-sync",
            "upload",
            "--store-address",
            "store:7070",
            "--insecure",
            "--insecure-skip-verify",
            "bin",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn extract_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::write(&bin, b"x").unwrap();

        let command = validate(&["extract", bin.to_str().unwrap()]).unwrap();
        let ValidatedCommand::Extract {
            output_dir,
            mode,
            compress_dwarf_sections,
            ..
        } = command
        else {
            panic!("expected extract");
        };
        assert_eq!(output_dir, PathBuf::from("out"));
        assert_eq!(mode, ExtractMode::KeepOnlyDebug);
        assert!(!compress_dwarf_sections);
    }

    #[test]
    fn source_output_defaults() {
        let command = validate(&["source", file!()]);
        // `file!()` is relative to the package root, which is where tests run.
        let ValidatedCommand::Source { out_path, .. } = command.unwrap() else {
            panic!("expected source");
        };
        assert_eq!(out_path, PathBuf::from("source.tar.zstd"));
    }
}

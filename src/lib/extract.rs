//! Batch extraction of debug information. Unlike uploading, a failure on one input is recorded and
//! the remaining inputs are still processed.

use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::buildid::BuildIdResolver;
use crate::error::{Error, Result};
use crate::reducer::{ExtractMode, Reducer};

/// Suffix of files written by [`extract_to_dir`].
pub const DEBUGINFO_SUFFIX: &str = ".debuginfo";

/// Pairs one input binary with the sink its reduced form is written to.
#[derive(Debug)]
pub struct ExtractionJob<W> {
    pub source: PathBuf,
    pub destination: W,
}

impl<W: Write + Seek> ExtractionJob<W> {
    pub fn new(source: PathBuf, destination: W) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// One input that could not be extracted.
#[derive(Debug, thiserror::Error)]
#[error("{}: {error}", path.display())]
pub struct ExtractFailure {
    pub path: PathBuf,
    #[source]
    pub error: Error,
}

/// Every failure of an extraction batch.
#[derive(Debug, thiserror::Error)]
#[error(
    "failed to extract debug information from {} of {attempted} file(s):\n{}",
    failures.len(),
    failures.iter().map(|failure| format!("  {failure}")).collect::<Vec<_>>().join("\n")
)]
pub struct ExtractError {
    pub attempted: usize,
    pub failures: Vec<ExtractFailure>,
}

fn extract_one<R, W>(reducer: &R, mode: ExtractMode, job: &mut ExtractionJob<W>) -> Result<()>
where
    R: Reducer + ?Sized,
    W: Write + Seek,
{
    let data = std::fs::read(&job.source)?;
    reducer.reduce(mode, &mut job.destination, &data)
}

/// Run the reducer over every job. Returns `Err` iff at least one job failed; the error lists all
/// of them. An empty batch is an error in itself.
pub fn extract_all<R, W>(
    reducer: &R,
    mode: ExtractMode,
    jobs: &mut [ExtractionJob<W>],
) -> Result<()>
where
    R: Reducer + ?Sized,
    W: Write + Seek,
{
    if jobs.is_empty() {
        return Err(Error::NoActionableInputs);
    }

    let attempted = jobs.len();
    let failures = jobs
        .iter_mut()
        .filter_map(|job| match extract_one(reducer, mode, job) {
            Ok(()) => None,
            Err(err) => {
                error!(path = %job.source.display(), %mode, "failed to extract debug information: {err}");
                Some(ExtractFailure {
                    path: job.source.clone(),
                    error: err,
                })
            }
        })
        .collect::<Vec<_>>();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ExtractError {
            attempted,
            failures,
        }
        .into())
    }
}

/// Extract each input to `<output_dir>/<build-id>.debuginfo`. The output directory is removed and
/// recreated first. Returns the paths that were written successfully.
pub fn extract_to_dir<B, R>(
    resolver: &B,
    reducer: &R,
    mode: ExtractMode,
    paths: &[PathBuf],
    output_dir: &Path,
) -> Result<Vec<PathBuf>>
where
    B: BuildIdResolver + ?Sized,
    R: Reducer + ?Sized,
{
    if paths.is_empty() {
        return Err(Error::NoActionableInputs);
    }

    if output_dir.exists() {
        std::fs::remove_dir_all(output_dir)?;
    }
    std::fs::create_dir_all(output_dir)?;

    let mut jobs = Vec::with_capacity(paths.len());
    let mut outputs = Vec::with_capacity(paths.len());
    for path in paths {
        let build_id = resolver.build_id(path)?;
        let output = output_dir.join(format!("{build_id}{DEBUGINFO_SUFFIX}"));
        let file = std::fs::File::create(&output)?;
        jobs.push(ExtractionJob::new(path.clone(), file));
        outputs.push(output);
    }

    extract_all(reducer, mode, &mut jobs)?;
    info!(count = outputs.len(), dir = %output_dir.display(), "extracted debug information");
    Ok(outputs)
}

#[cfg(test)]
mod test_extract_all {
    use super::*;
    use crate::reducer::WriteSeek;
    use crate::scratch::ScratchBuffer;

    /// Uppercases the input; rejects inputs starting with `bad`.
    struct Upper;

    impl Reducer for Upper {
        fn only_keep_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
            if src.starts_with(b"bad") {
                return Err(Error::MissingBuildId {
                    path: PathBuf::from("malformed"),
                });
            }
            dst.write_all(&src.to_ascii_uppercase())?;
            Ok(())
        }

        fn strip_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
            dst.write_all(&src.to_ascii_lowercase())?;
            Ok(())
        }
    }

    struct NameId;

    impl BuildIdResolver for NameId {
        fn build_id(&self, path: &Path) -> Result<String> {
            Ok(path.file_name().unwrap().to_string_lossy().into_owned())
        }
    }

    fn inputs(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, contents)| {
                let path = dir.join(name);
                std::fs::write(&path, contents).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn one_malformed_input_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let paths = inputs(
            dir.path(),
            &[("a", "first"), ("b", "bad input"), ("c", "third")],
        );
        let mut jobs = paths
            .iter()
            .map(|p| ExtractionJob::new(p.clone(), ScratchBuffer::new()))
            .collect::<Vec<_>>();

        let result = extract_all(&Upper, ExtractMode::KeepOnlyDebug, &mut jobs);

        let Err(Error::Extract(err)) = result else {
            panic!("expected an aggregated extraction error, got {result:?}");
        };
        assert_eq!(err.attempted, 3);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].path, paths[1]);
        assert_eq!(jobs[0].destination.as_slice(), b"FIRST");
        assert!(jobs[1].destination.is_empty());
        assert_eq!(jobs[2].destination.as_slice(), b"THIRD");
    }

    #[test]
    fn missing_input_is_recorded_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut jobs = vec![
            ExtractionJob::new(dir.path().join("absent"), ScratchBuffer::new()),
        ];
        let result = extract_all(&Upper, ExtractMode::KeepOnlyDebug, &mut jobs);
        assert!(matches!(result, Err(Error::Extract(e)) if e.failures.len() == 1));
    }

    #[test]
    fn mode_selects_reducer_operation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = inputs(dir.path(), &[("a", "MiXeD")]);
        let mut jobs = vec![ExtractionJob::new(paths[0].clone(), ScratchBuffer::new())];
        extract_all(&Upper, ExtractMode::StripDebug, &mut jobs).unwrap();
        assert_eq!(jobs[0].destination.as_slice(), b"mixed");
    }

    #[test]
    fn empty_batch_is_an_error() {
        let mut jobs: Vec<ExtractionJob<ScratchBuffer>> = Vec::new();
        assert!(matches!(
            extract_all(&Upper, ExtractMode::KeepOnlyDebug, &mut jobs),
            Err(Error::NoActionableInputs)
        ));
    }

    #[test]
    fn extract_to_dir_recreates_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = inputs(dir.path(), &[("bin1", "one"), ("bin2", "two")]);
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("stale"), "old").unwrap();

        let written =
            extract_to_dir(&NameId, &Upper, ExtractMode::KeepOnlyDebug, &paths, &out).unwrap();

        assert_eq!(written.len(), 2);
        assert!(!out.join("stale").exists());
        assert_eq!(std::fs::read(out.join("bin1.debuginfo")).unwrap(), b"ONE");
        assert_eq!(std::fs::read(out.join("bin2.debuginfo")).unwrap(), b"TWO");
    }
}

//! Units of work for the uploader and how they are collected from the command line inputs.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::buildid::BuildIdResolver;
use crate::error::{Error, Result};
use crate::extract::{ExtractionJob, extract_all};
use crate::reducer::{ExtractMode, Reducer};
use crate::scratch::ScratchBuffer;

/// The type of debug content an artifact holds. The store keys uploads by `(build ID, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebuginfoKind {
    #[default]
    Debuginfo,
    Executable,
    Sources,
}

impl DebuginfoKind {
    /// The value used on the wire.
    pub fn as_wire(self) -> i32 {
        match self {
            Self::Debuginfo => 0,
            Self::Executable => 1,
            Self::Sources => 2,
        }
    }

    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Debuginfo),
            1 => Some(Self::Executable),
            2 => Some(Self::Sources),
            _ => None,
        }
    }
}

impl std::fmt::Display for DebuginfoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debuginfo => write!(f, "debuginfo"),
            Self::Executable => write!(f, "executable"),
            Self::Sources => write!(f, "sources"),
        }
    }
}

/// Where an artifact's bytes live. The set of backings is closed, so getting at the scratch buffer
/// is a match rather than a downcast.
#[derive(Debug)]
pub enum Content {
    Scratch(ScratchBuffer),
    File(File),
}

impl Content {
    /// Seek back to the first byte.
    pub fn rewind_to_start(&mut self) -> io::Result<()> {
        match self {
            Content::Scratch(buf) => {
                buf.rewind_to_start();
                Ok(())
            }
            Content::File(file) => file.seek(SeekFrom::Start(0)).map(|_| ()),
        }
    }
}

impl Read for Content {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Content::Scratch(scratch) => scratch.read(buf),
            Content::File(file) => file.read(buf),
        }
    }
}

impl Seek for Content {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Content::Scratch(scratch) => scratch.seek(pos),
            Content::File(file) => file.seek(pos),
        }
    }
}

/// One candidate for upload.
#[derive(Debug)]
pub struct Artifact {
    pub identifier: String,
    pub source_path: PathBuf,
    pub content: Content,
    pub size: u64,
    pub kind: DebuginfoKind,
}

impl Artifact {
    /// Wrap an in-memory payload, e.g. one produced by the reducer.
    pub fn from_scratch(
        identifier: String,
        source_path: PathBuf,
        mut buffer: ScratchBuffer,
        kind: DebuginfoKind,
    ) -> Result<Self> {
        buffer.rewind_to_start();
        let size = buffer.len();
        if size == 0 {
            return Err(Error::EmptyArtifact { path: source_path });
        }
        Ok(Self {
            identifier,
            source_path,
            content: Content::Scratch(buffer),
            size,
            kind,
        })
    }

    /// Open a file from disk as-is.
    pub fn from_file(identifier: String, path: &Path, kind: DebuginfoKind) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(Error::EmptyArtifact {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            identifier,
            source_path: path.to_path_buf(),
            content: Content::File(file),
            size,
            kind,
        })
    }
}

/// How to turn input paths into artifacts.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub kind: DebuginfoKind,
    /// Upload binaries as they are instead of extracting their debug information first.
    pub no_extract: bool,
    /// Use this build ID rather than resolving one from each input.
    pub build_id: Option<String>,
    pub mode: ExtractMode,
}

/// Build the artifact list for an upload run. Nothing here talks to the store, so any failure
/// (including an empty artifact) aborts before server-side state exists.
pub fn collect_artifacts<B, R>(
    paths: &[PathBuf],
    options: &CollectOptions,
    resolver: &B,
    reducer: &R,
) -> Result<Vec<Artifact>>
where
    B: BuildIdResolver + ?Sized,
    R: Reducer + ?Sized,
{
    if paths.is_empty() {
        return Err(Error::NoActionableInputs);
    }

    if !options.no_extract && options.kind == DebuginfoKind::Debuginfo {
        let mut identifiers = Vec::with_capacity(paths.len());
        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            identifiers.push(resolver.build_id(path)?);
            jobs.push(ExtractionJob::new(path.clone(), ScratchBuffer::new()));
        }

        extract_all(reducer, options.mode, &mut jobs)?;

        return std::iter::zip(identifiers, jobs)
            .map(|(identifier, job)| {
                Artifact::from_scratch(identifier, job.source, job.destination, options.kind)
            })
            .collect();
    }

    paths
        .iter()
        .map(|path| {
            let identifier = match (&options.build_id, options.kind) {
                (Some(id), _) if !id.is_empty() => id.clone(),
                (_, DebuginfoKind::Debuginfo | DebuginfoKind::Executable) => {
                    resolver.build_id(path)?
                }
                (_, kind) => return Err(Error::BuildIdRequired { kind }),
            };
            Artifact::from_file(identifier, path, options.kind)
        })
        .collect()
}

#[cfg(test)]
mod test_collect_artifacts {
    use super::*;
    use crate::reducer::WriteSeek;
    use std::io::Write;

    struct FixedId;

    impl BuildIdResolver for FixedId {
        fn build_id(&self, path: &Path) -> Result<String> {
            Ok(format!(
                "id-{}",
                path.file_name().unwrap().to_string_lossy()
            ))
        }
    }

    /// Copies the input, or writes nothing when the input starts with `empty`.
    struct CopyReducer;

    impl Reducer for CopyReducer {
        fn only_keep_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
            if !src.starts_with(b"empty") {
                dst.write_all(src)?;
            }
            Ok(())
        }

        fn strip_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
            self.only_keep_debug(dst, src)
        }
    }

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        path
    }

    #[test]
    fn extracted_artifacts_are_rewound_scratch_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bin", b"debug bytes");
        let artifacts = collect_artifacts(
            &[path.clone()],
            &CollectOptions::default(),
            &FixedId,
            &CopyReducer,
        )
        .unwrap();
        assert_eq!(artifacts.len(), 1);
        let mut artifact = artifacts.into_iter().next().unwrap();
        assert_eq!(artifact.identifier, "id-bin");
        assert_eq!(artifact.size, 11);
        assert!(matches!(artifact.content, Content::Scratch(_)));
        let mut read = Vec::new();
        artifact.content.read_to_end(&mut read).unwrap();
        assert_eq!(read, b"debug bytes");
    }

    #[test]
    fn empty_extraction_is_an_error_for_that_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "good", b"debug bytes");
        let empty = write_file(dir.path(), "empty", b"empty output");
        let result = collect_artifacts(
            &[good, empty.clone()],
            &CollectOptions::default(),
            &FixedId,
            &CopyReducer,
        );
        assert!(matches!(result, Err(Error::EmptyArtifact { path }) if path == empty));
    }

    #[test]
    fn zero_size_file_is_rejected_without_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "zero", b"");
        let options = CollectOptions {
            no_extract: true,
            ..Default::default()
        };
        let result = collect_artifacts(&[path.clone()], &options, &FixedId, &CopyReducer);
        assert!(matches!(result, Err(Error::EmptyArtifact { path: p }) if p == path));
    }

    #[test]
    fn explicit_build_id_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "src.tar.zstd", b"archive");
        let options = CollectOptions {
            kind: DebuginfoKind::Sources,
            build_id: Some("abc123".to_string()),
            ..Default::default()
        };
        let artifacts = collect_artifacts(&[path], &options, &FixedId, &CopyReducer).unwrap();
        assert_eq!(artifacts[0].identifier, "abc123");
        assert_eq!(artifacts[0].kind, DebuginfoKind::Sources);
        assert!(matches!(artifacts[0].content, Content::File(_)));
    }

    #[test]
    fn sources_without_build_id_is_an_identity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "src.tar.zstd", b"archive");
        let options = CollectOptions {
            kind: DebuginfoKind::Sources,
            ..Default::default()
        };
        let result = collect_artifacts(&[path], &options, &FixedId, &CopyReducer);
        assert!(matches!(
            result,
            Err(Error::BuildIdRequired {
                kind: DebuginfoKind::Sources
            })
        ));
    }

    #[test]
    fn no_inputs_is_an_error() {
        let result = collect_artifacts(&[], &CollectOptions::default(), &FixedId, &CopyReducer);
        assert!(matches!(result, Err(Error::NoActionableInputs)));
    }
}

//! The upload orchestrator. Artifacts are processed strictly one after another; the first failure
//! aborts the rest of the queue.

use std::future::Future;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::hash::hash_reader;
use crate::store::{
    DebuginfoStore, InitiateUpload, MarkUploadFinished, ShouldInitiateUpload, SignedUrlUploader,
    UploadStrategy,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Ask the store to accept the upload even if it already holds this artifact.
    pub force: bool,
    /// Stop once the store has said it would accept the upload.
    pub dry_run: bool,
}

/// The protocol step an upload failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    ShouldInitiate,
    Hash,
    Initiate,
    Transmit,
    MarkFinished,
}

impl std::fmt::Display for UploadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShouldInitiate => write!(f, "upload check"),
            Self::Hash => write!(f, "hashing"),
            Self::Initiate => write!(f, "upload initiation"),
            Self::Transmit => write!(f, "transmission"),
            Self::MarkFinished => write!(f, "upload completion"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to upload {} (build ID {identifier}) during {step}", path.display())]
pub struct UploadError {
    pub path: PathBuf,
    pub identifier: String,
    pub step: UploadStep,
    #[source]
    pub source: Box<Error>,
}

impl UploadError {
    /// The underlying failure.
    pub fn cause(&self) -> &Error {
        &self.source
    }
}

/// What happened to one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The store already has it.
    Skipped {
        identifier: String,
        path: PathBuf,
        reason: String,
    },
    /// The store would have accepted it.
    DryRun {
        identifier: String,
        path: PathBuf,
        reason: String,
    },
    Uploaded {
        identifier: String,
        path: PathBuf,
        upload_id: String,
        size: u64,
        strategy: UploadStrategy,
    },
}

impl UploadOutcome {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Skipped { identifier, .. }
            | Self::DryRun { identifier, .. }
            | Self::Uploaded { identifier, .. } => identifier,
        }
    }
}

fn failed(artifact: &Artifact, step: UploadStep) -> impl FnOnce(Error) -> UploadError + '_ {
    move |source| UploadError {
        path: artifact.source_path.clone(),
        identifier: artifact.identifier.clone(),
        step,
        source: Box::new(source),
    }
}

/// Drives artifacts through the store protocol.
pub struct Uploader<S, U> {
    store: S,
    signed_url: U,
    options: UploadOptions,
    cancel: CancellationToken,
}

impl<S, U> Uploader<S, U>
where
    S: DebuginfoStore,
    U: SignedUrlUploader,
{
    pub fn new(store: S, signed_url: U, options: UploadOptions, cancel: CancellationToken) -> Self {
        Self {
            store,
            signed_url,
            options,
            cancel,
        }
    }

    /// Race `operation` against cancellation.
    async fn guarded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        self.cancel
            .run_until_cancelled(operation)
            .await
            .unwrap_or(Err(Error::Cancelled))
    }

    /// Upload every artifact in order. `on_outcome` is told about each artifact as soon as it is
    /// done with.
    #[instrument(skip_all, fields(count = artifacts.len(), force = self.options.force, dry_run = self.options.dry_run))]
    pub async fn upload_all(
        &self,
        artifacts: &mut [Artifact],
        mut on_outcome: impl FnMut(&UploadOutcome),
    ) -> Result<Vec<UploadOutcome>, UploadError> {
        let mut outcomes = Vec::with_capacity(artifacts.len());
        for artifact in artifacts.iter_mut() {
            let outcome = self.upload_one(artifact).await?;
            on_outcome(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    #[instrument(skip_all, fields(build_id = %artifact.identifier, kind = %artifact.kind))]
    pub async fn upload_one(&self, artifact: &mut Artifact) -> Result<UploadOutcome, UploadError> {
        if self.cancel.is_cancelled() {
            return Err(failed(artifact, UploadStep::ShouldInitiate)(Error::Cancelled));
        }

        let decision = self
            .guarded(self.store.should_initiate_upload(ShouldInitiateUpload {
                build_id: artifact.identifier.clone(),
                force: self.options.force,
                kind: artifact.kind,
            }))
            .await
            .map_err(failed(artifact, UploadStep::ShouldInitiate))?;

        if !decision.should_upload {
            info!(reason = %decision.reason, "skipping upload");
            return Ok(UploadOutcome::Skipped {
                identifier: artifact.identifier.clone(),
                path: artifact.source_path.clone(),
                reason: decision.reason,
            });
        }
        if self.options.dry_run {
            return Ok(UploadOutcome::DryRun {
                identifier: artifact.identifier.clone(),
                path: artifact.source_path.clone(),
                reason: decision.reason,
            });
        }

        let hash = hash_reader(&mut artifact.content)
            .and_then(|hash| artifact.content.rewind_to_start().map(|()| hash))
            .map_err(|err| failed(artifact, UploadStep::Hash)(err.into()))?;

        let instructions = self
            .guarded(self.store.initiate_upload(InitiateUpload {
                build_id: artifact.identifier.clone(),
                hash,
                size: artifact.size,
                force: self.options.force,
                kind: artifact.kind,
            }))
            .await
            .map_err(failed(artifact, UploadStep::Initiate))?;
        debug!(
            upload_id = %instructions.upload_id,
            strategy = %instructions.strategy,
            instructed_build_id = %instructions.build_id,
            "received upload instructions"
        );

        let size = match &instructions.strategy {
            UploadStrategy::Grpc => {
                self.guarded(self.store.upload(&instructions, &mut artifact.content))
                    .await
            }
            UploadStrategy::SignedUrl(url) => self
                .guarded(self.signed_url.put(url, &mut artifact.content, artifact.size))
                .await
                .map(|()| artifact.size),
            UploadStrategy::Unspecified => Err(Error::UnspecifiedStrategy),
            UploadStrategy::Unrecognized(value) => Err(Error::UnrecognizedStrategy(*value)),
        }
        .map_err(failed(artifact, UploadStep::Transmit))?;

        self.guarded(self.store.mark_upload_finished(MarkUploadFinished {
            build_id: artifact.identifier.clone(),
            upload_id: instructions.upload_id.clone(),
            kind: artifact.kind,
        }))
        .await
        .map_err(failed(artifact, UploadStep::MarkFinished))?;

        info!(upload_id = %instructions.upload_id, size, "upload finished");
        Ok(UploadOutcome::Uploaded {
            identifier: artifact.identifier.clone(),
            path: artifact.source_path.clone(),
            upload_id: instructions.upload_id,
            size,
            strategy: instructions.strategy,
        })
    }
}

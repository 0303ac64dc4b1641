//! The debug-info store protocol: deduplication check, upload initiation, transmission and
//! completion. [`DebuginfoStore`] and [`SignedUrlUploader`] are the seams the uploader talks to;
//! [`GrpcStore`] and [`HttpSignedUrlUploader`] are the network implementations.

mod grpc;
pub mod proto;
mod signed_url;

use async_trait::async_trait;

use crate::artifact::{Content, DebuginfoKind};
use crate::error::Result;

pub use grpc::{BearerAuth, CHUNK_SIZE, GrpcStore, StoreConfig};
pub use signed_url::HttpSignedUrlUploader;

/// The store's verdict on whether an artifact should be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDecision {
    pub should_upload: bool,
    pub reason: String,
}

/// How the store wants the artifact's bytes delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Stream the content through the store's `Upload` RPC.
    Grpc,
    /// `PUT` the content to a one-time URL.
    SignedUrl(String),
    Unspecified,
    /// A strategy this client does not know about.
    Unrecognized(i32),
}

impl std::fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grpc => write!(f, "grpc"),
            Self::SignedUrl(_) => write!(f, "signed-url"),
            Self::Unspecified => write!(f, "unspecified"),
            Self::Unrecognized(value) => write!(f, "unrecognized({value})"),
        }
    }
}

/// Transport directive for a single upload. Never reused across artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInstructions {
    pub build_id: String,
    pub upload_id: String,
    pub strategy: UploadStrategy,
    pub kind: DebuginfoKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShouldInitiateUpload {
    pub build_id: String,
    pub force: bool,
    pub kind: DebuginfoKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateUpload {
    pub build_id: String,
    pub hash: String,
    pub size: u64,
    pub force: bool,
    pub kind: DebuginfoKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkUploadFinished {
    pub build_id: String,
    pub upload_id: String,
    pub kind: DebuginfoKind,
}

/// The remote debug-info store.
#[async_trait]
pub trait DebuginfoStore: Send + Sync {
    async fn should_initiate_upload(&self, request: ShouldInitiateUpload) -> Result<UploadDecision>;

    async fn initiate_upload(&self, request: InitiateUpload) -> Result<UploadInstructions>;

    /// Stream `content` from its current position to the store. Returns the number of bytes the
    /// store acknowledged.
    async fn upload(&self, instructions: &UploadInstructions, content: &mut Content) -> Result<u64>;

    async fn mark_upload_finished(&self, request: MarkUploadFinished) -> Result<()>;
}

/// Delivers content to a signed URL.
#[async_trait]
pub trait SignedUrlUploader: Send + Sync {
    /// `PUT` exactly `size` bytes of `content`, starting at its current position.
    async fn put(&self, url: &str, content: &mut Content, size: u64) -> Result<()>;
}

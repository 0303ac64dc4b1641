//! Extract debug information from compiled binaries and sync it to a remote debug-info store.
//!
//! The store keys everything it holds by `(build ID, kind)`. This crate provides the client side:
//!
//! - resolving a binary's build ID ([`buildid`]),
//! - reducing binaries to their debug sections, or stripping those sections ([`reducer`],
//!   [`extract`]),
//! - negotiating and performing uploads with the store, deduplicated by build ID ([`upload`],
//!   [`store`]),
//! - archiving the source files a binary's line tables refer to ([`sources`]).
//!
//! # Upload protocol
//!
//! For each artifact, in order:
//!
//! 1. Ask the store whether it wants the artifact. If not, skip it.
//! 2. Hash the content, then initiate the upload with hash and size. The store answers with
//!    instructions naming a transport: its own streaming `Upload` RPC, or a signed URL.
//! 3. Transmit the content.
//! 4. Tell the store the upload is finished.
//!
//! The first failure aborts the whole run.
//!
//! # Usage
//!
//! Extract the debug information of some binaries into a directory:
//!
//! ```no_run
//! use debuginfo_sync::{ElfBuildId, ElfReducer, ExtractMode, extract::extract_to_dir};
//! use std::path::{Path, PathBuf};
//!
//! let inputs = vec![PathBuf::from("target/release/app")];
//! let written = extract_to_dir(
//!     &ElfBuildId,
//!     &ElfReducer::default(),
//!     ExtractMode::KeepOnlyDebug,
//!     &inputs,
//!     Path::new("out"),
//! )?;
//! for path in written {
//!     println!("{}", path.display());
//! }
//! # Ok::<(), debuginfo_sync::Error>(())
//! ```
//!
//! Upload them:
//!
//! ```no_run
//! use debuginfo_sync::store::{GrpcStore, HttpSignedUrlUploader, StoreConfig};
//! use debuginfo_sync::upload::{UploadOptions, Uploader};
//! use debuginfo_sync::{CollectOptions, ElfBuildId, ElfReducer, collect_artifacts};
//! use tokio_util::sync::CancellationToken;
//! use std::path::PathBuf;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig {
//!     address: "debuginfo.example.com:443".to_string(),
//!     ..Default::default()
//! };
//! let store = GrpcStore::connect(&config).await?;
//! let mut artifacts = collect_artifacts(
//!     &[PathBuf::from("target/release/app")],
//!     &CollectOptions::default(),
//!     &ElfBuildId,
//!     &ElfReducer::default(),
//! )?;
//! let uploader = Uploader::new(
//!     store,
//!     HttpSignedUrlUploader::default(),
//!     UploadOptions::default(),
//!     CancellationToken::new(),
//! );
//! uploader.upload_all(&mut artifacts, |outcome| println!("{outcome:?}")).await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod buildid;
mod error;
pub mod extract;
pub mod hash;
pub mod reducer;
pub mod scratch;
pub mod sources;
pub mod store;
pub mod task;
pub mod upload;

pub use artifact::{Artifact, CollectOptions, Content, DebuginfoKind, collect_artifacts};
pub use buildid::{BuildIdResolver, ElfBuildId};
pub use error::{Error, Result};
pub use reducer::{ElfReducer, ExtractMode, Reducer};
pub use scratch::ScratchBuffer;

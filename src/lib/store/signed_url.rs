use std::io::Read;

use async_trait::async_trait;
use tracing::debug;

use super::SignedUrlUploader;
use crate::artifact::Content;
use crate::error::{Error, Result};

/// Uploads to signed URLs with a plain HTTP `PUT`.
#[derive(Debug, Clone, Default)]
pub struct HttpSignedUrlUploader {
    client: reqwest::Client,
}

impl HttpSignedUrlUploader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SignedUrlUploader for HttpSignedUrlUploader {
    async fn put(&self, url: &str, content: &mut Content, size: u64) -> Result<()> {
        let mut body = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        content.by_ref().take(size).read_to_end(&mut body)?;

        let response = self.client.put(url).body(body).send().await?;
        let status = response.status();
        debug!(%status, "signed URL upload finished");
        if !status.is_success() {
            return Err(Error::UnexpectedStatus(status));
        }
        Ok(())
    }
}

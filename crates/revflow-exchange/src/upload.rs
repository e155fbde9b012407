//! Pre-signed upload streaming
//!
//! The local file is hashed in fixed-size chunks, rewound, and streamed to the
//! pre-signed URL returned by the job. The file handle and the response body
//! live only as long as one [`UploadStreamer::import_file`] call, so a loop
//! over asset specs never holds more than one of each.

use crate::error::{ExchangeError, Result, UploadError};
use crate::submit::{start_job, submit_job};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use reqwest::header::CONTENT_LENGTH;
use revflow_cloud::{CreatedJob, ExchangeApi, JobDetails, RevisionId};
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const HASH_CHUNK_SIZE: usize = 64 * 1024;
const CONTENT_MD5: &str = "Content-MD5";

/// Content digest computed before upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Base64-encoded MD5, as sent in `Content-MD5`
    pub md5_base64: String,

    /// Number of bytes hashed
    pub len: u64,
}

/// Hash the whole file without buffering it, then seek back to offset 0
pub async fn digest_file(
    file: &mut File,
    path: &Path,
) -> std::result::Result<FileDigest, UploadError> {
    let io_error = |source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    let mut len = 0u64;
    loop {
        let read = file.read(&mut buffer).await.map_err(io_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        len += read as u64;
    }

    file.seek(SeekFrom::Start(0)).await.map_err(io_error)?;

    Ok(FileDigest {
        md5_base64: STANDARD.encode(hasher.finalize()),
        len,
    })
}

/// HTTP client for pre-signed uploads with a fixed deadline
#[derive(Debug, Clone)]
pub struct UploadStreamer {
    client: reqwest::Client,
    timeout: Duration,
}

impl UploadStreamer {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// PUT the (rewound) file to `url`, then drain and discard the response body
    pub async fn put(
        &self,
        url: &str,
        file: File,
        digest: &FileDigest,
    ) -> std::result::Result<(), UploadError> {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let mut response = self
            .client
            .put(url)
            .timeout(self.timeout)
            .header(CONTENT_LENGTH, digest.len.to_string())
            .header(CONTENT_MD5, digest.md5_base64.as_str())
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
            });
        }

        while response.chunk().await.map_err(|e| self.classify(e))?.is_some() {}

        tracing::debug!(bytes = digest.len, "Uploaded file to pre-signed URL");
        Ok(())
    }

    fn classify(&self, error: reqwest::Error) -> UploadError {
        if error.is_timeout() {
            UploadError::Timeout(self.timeout)
        } else {
            UploadError::Transport(error)
        }
    }

    /// Hash, submit, upload and start one signed-URL import
    ///
    /// Returns the started job. On any failure the file handle is closed
    /// before returning.
    pub async fn import_file<A>(
        &self,
        api: &A,
        revision: &RevisionId,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<CreatedJob>
    where
        A: ExchangeApi + ?Sized,
    {
        let mut file = File::open(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = digest_file(&mut file, path).await?;

        let asset_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::debug!(
            file = %path.display(),
            bytes = digest.len,
            md5 = %digest.md5_base64,
            "Hashed upload source"
        );

        let job = submit_job(
            api,
            revision,
            JobDetails::ImportAssetFromSignedUrl {
                asset_name,
                md5_hash: digest.md5_base64.clone(),
            },
        )
        .await?;

        let url = job
            .signed_upload
            .as_ref()
            .map(|u| u.url.clone())
            .ok_or_else(|| UploadError::MissingSignedUrl(job.id.clone()))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ExchangeError::Cancelled { operation: "upload" });
            }
            result = self.put(&url, file, &digest) => result?,
        }

        start_job(api, &job).await?;
        Ok(job)
    }
}

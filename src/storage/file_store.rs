//! Model file store
//!
//! Downloads model files into a local directory with resume support and SHA-256
//! verification.

use std::path::{Path, PathBuf};

use reqwest::header::{RANGE, USER_AGENT};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::storage::huggingface::{format_size, sanitize_local_filename};
use crate::storage::{models_dir, StorageError};

/// Bytes buffered between writes and progress reports
const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Checksum values that mean "not filled in yet"
const CHECKSUM_PLACEHOLDER: &str = "PUT_THE_EXACT_SHA256";

/// Downloads and verifies files under a single directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    client: reqwest::Client,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, timeouts)
    pub fn with_client(dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            dir: dir.into(),
            client,
        }
    }

    /// Store rooted at the application's models directory
    pub fn in_data_dir() -> Result<Self, StorageError> {
        Ok(Self::new(models_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path a file with this remote name is stored at
    pub fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join(sanitize_local_filename(filename)?))
    }

    /// Make sure `filename` exists locally and matches `expected_sha256`.
    ///
    /// An existing file that fails verification is deleted and fetched again. Downloads
    /// go to a `.part` file which, with `allow_resume`, is continued from where a
    /// previous attempt stopped. `progress` receives the completed fraction.
    pub async fn ensure_file(
        &self,
        remote_url: &str,
        filename: &str,
        expected_sha256: &str,
        allow_resume: bool,
        progress: impl Fn(f64) + Send + Sync,
    ) -> Result<PathBuf, StorageError> {
        let dst = self.path_for(filename)?;
        let skip_checksum = should_skip_checksum(expected_sha256);

        if fs::try_exists(&dst).await? {
            if skip_checksum {
                return Ok(dst);
            }
            let actual = sha256_file(&dst).await?;
            if checksum_matches(&actual, expected_sha256) {
                return Ok(dst);
            }
            tracing::warn!("Checksum mismatch for existing {:?}. Redownloading.", dst);
            fs::remove_file(&dst).await?;
        }

        self.download(remote_url, &dst, allow_resume, &progress)
            .await?;

        if skip_checksum {
            tracing::warn!("Checksum skipped for {:?}. Set model_sha256 to verify downloads.", dst);
        } else {
            let actual = sha256_file(&dst).await?;
            if !checksum_matches(&actual, expected_sha256) {
                fs::remove_file(&dst).await?;
                return Err(StorageError::ChecksumMismatch {
                    expected: expected_sha256.trim().to_lowercase(),
                    actual,
                });
            }
        }

        Ok(dst)
    }

    async fn download(
        &self,
        remote_url: &str,
        dst: &Path,
        allow_resume: bool,
        progress: &(impl Fn(f64) + Send + Sync),
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let part = part_path(dst);

        let mut start_from = 0u64;
        if allow_resume {
            if let Ok(meta) = fs::metadata(&part).await {
                start_from = meta.len();
            }
        }

        let mut request = self
            .client
            .get(remote_url)
            .header(USER_AGENT, concat!("uniterra-runtime/", env!("CARGO_PKG_VERSION")));
        if start_from > 0 {
            request = request.header(RANGE, format!("bytes={start_from}-"));
        }

        tracing::info!("Downloading from: {}", remote_url);
        let mut response = request
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if start_from > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            // The part file already holds the whole file; checksum verification follows
            tracing::info!("Part file already complete ({})", format_size(start_from));
            progress(1.0);
            return finalize(&part, dst).await;
        }
        if !(200..=206).contains(&status.as_u16()) {
            return Err(StorageError::HttpStatus(status.as_u16()));
        }
        if start_from > 0 && status != StatusCode::PARTIAL_CONTENT {
            tracing::warn!("Server ignored range request, restarting download");
            start_from = 0;
        }

        let total = response.content_length().map(|len| start_from + len);
        if let Some(total) = total {
            tracing::info!("File size: {} ({} already on disk)", format_size(total), format_size(start_from));
        }

        let mut file = if start_from > 0 {
            OpenOptions::new().append(true).open(&part).await?
        } else {
            File::create(&part).await?
        };

        let report = |written: u64| {
            if let Some(total) = total.filter(|t| *t > 0) {
                progress(written as f64 / total as f64);
            }
        };

        let mut written = start_from;
        let mut buffer: Vec<u8> = Vec::with_capacity(FLUSH_THRESHOLD);
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    // Keep what arrived so the next attempt can resume from it
                    file.write_all(&buffer).await?;
                    file.flush().await?;
                    return Err(StorageError::Network(e.to_string()));
                }
            };
            buffer.extend_from_slice(&chunk);
            if buffer.len() >= FLUSH_THRESHOLD {
                file.write_all(&buffer).await?;
                written += buffer.len() as u64;
                buffer.clear();
                report(written);
            }
        }
        if !buffer.is_empty() {
            file.write_all(&buffer).await?;
            written += buffer.len() as u64;
            report(written);
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = total {
            if written != expected {
                // The part file is kept so the next attempt can resume
                return Err(StorageError::Incomplete {
                    got: written,
                    expected,
                });
            }
        }

        finalize(&part, dst).await
    }
}

/// Move a finished part file into place
async fn finalize(part: &Path, dst: &Path) -> Result<(), StorageError> {
    if fs::try_exists(dst).await? {
        fs::remove_file(dst).await?;
    }
    fs::rename(part, dst).await?;

    tracing::info!("Download complete: {:?}", dst);
    Ok(())
}

fn part_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Empty or placeholder checksums disable verification
pub fn should_skip_checksum(sha: &str) -> bool {
    let trimmed = sha.trim();
    trimmed.is_empty() || trimmed.to_uppercase().contains(CHECKSUM_PLACEHOLDER)
}

fn checksum_matches(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}

/// Lowercase hex SHA-256 of a file, read in chunks
pub async fn sha256_file(path: &Path) -> Result<String, StorageError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; FLUSH_THRESHOLD];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

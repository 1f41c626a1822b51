//! Image resolution
//!
//! Makes the requested image available in local storage before a container
//! is created. First match wins:
//!
//! 1. already present locally - nothing to do
//! 2. `_image_path` input - download the archive, then load it
//! 3. otherwise - registry pull, status lines surfaced as they arrive

use crate::engine::ContainerEngine;
use crate::error::{EngineError, ResolveError};
use crate::sink::OutputSink;
use crate::task::Task;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Archive downloads are written in chunks of this size
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// How the image ended up in local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Already present, nothing fetched
    Cached,
    /// Downloaded from this URL and loaded
    Archive(String),
    /// Pulled from the registry
    Registry,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Cached => write!(f, "cached"),
            ImageSource::Archive(url) => write!(f, "archive {}", url),
            ImageSource::Registry => write!(f, "registry"),
        }
    }
}

/// Image resolver
#[derive(Debug, Clone)]
pub struct ImageResolver {
    /// Where archives are downloaded to before loading
    scratch_dir: PathBuf,

    http: reqwest::Client,
}

impl ImageResolver {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Ensure the task's image is present locally
    ///
    /// Pull status lines are written to `progress` as they arrive.
    pub async fn resolve(
        &self,
        engine: &dyn ContainerEngine,
        task: &Task,
        progress: &mut dyn OutputSink,
    ) -> Result<ImageSource, ResolveError> {
        let image = task.image.as_str();
        if self.image_present(engine, image).await? {
            debug!("Image {} found locally", image);
            return Ok(ImageSource::Cached);
        }

        if let Some(url) = task.image_archive_url() {
            let archive = self.download_archive(url).await?;
            let loaded = engine.load_image(&archive).await;
            self.discard(&archive).await;
            loaded.map_err(|source| ResolveError::ImageLoad {
                path: archive.clone(),
                source,
            })?;

            // the archive may carry other tags than the one requested
            if !self.image_present(engine, image).await? {
                return Err(ResolveError::ImageLoad {
                    path: archive,
                    source: EngineError::NotFound(format!(
                        "image {} is not in the archive",
                        image
                    )),
                });
            }
            info!("Loaded image {} from {}", image, url);
            return Ok(ImageSource::Archive(url.to_string()));
        }

        let mut status = engine.pull_image(image);
        while let Some(line) = status.next().await {
            let line = line.map_err(|source| ResolveError::Pull {
                image: image.to_string(),
                source,
            })?;
            info!("{}", line);
            progress.write(format!("{}\n", line).as_bytes());
        }

        Ok(ImageSource::Registry)
    }

    async fn image_present(
        &self,
        engine: &dyn ContainerEngine,
        image: &str,
    ) -> Result<bool, ResolveError> {
        engine
            .image_exists(image)
            .await
            .map_err(|source| ResolveError::Lookup {
                image: image.to_string(),
                source,
            })
    }

    /// Download an image archive into the scratch directory
    pub async fn download_archive(&self, url: &str) -> Result<PathBuf, ResolveError> {
        let path = self
            .scratch_dir
            .join(format!("image-{}.tar", Uuid::new_v4()));
        info!("Downloading image archive {} to {}", url, path.display());

        let result = self.fetch_to(url, &path).await;
        if result.is_err() {
            self.discard(&path).await;
        }
        result.map(|bytes| {
            debug!("Downloaded {} bytes", bytes);
            path
        })
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<u64, ResolveError> {
        let download = |source| ResolveError::Download {
            url: url.to_string(),
            source,
        };
        let scratch = |source| ResolveError::Scratch {
            path: path.to_path_buf(),
            source,
        };

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download)?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(scratch)?;
        let file = tokio::fs::File::create(path).await.map_err(scratch)?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download)? {
            for piece in chunk.chunks(DOWNLOAD_CHUNK_SIZE) {
                writer.write_all(piece).await.map_err(scratch)?;
                written += piece.len() as u64;
            }
        }
        writer.flush().await.map_err(scratch)?;

        Ok(written)
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

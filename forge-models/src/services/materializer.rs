//! Local materialization of provider results
//!
//! Provider result URLs expire, so a ready task's model and thumbnail are
//! copied under the storage directory and the record is pointed at
//! `/storage/...` instead. Each field is handled on its own: a field already
//! under the local prefix is never fetched again, and a failed fetch or write
//! only logs a warning and leaves the remote URL in place.
//!
//! Two polls racing on the same task can both download and write the same
//! file; the second write replaces the first with identical content.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fetcher::RemoteFetcher;
use crate::db::{is_local_path, LOCAL_PREFIX};

const MODELS_DIR: &str = "models";
const THUMBNAILS_DIR: &str = "thumbnails";
const DEFAULT_THUMBNAIL_EXT: &str = "png";

/// Paths to store on the record after materialization
///
/// `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializedPaths {
    pub file_path: Option<String>,
    pub thumbnail_path: Option<String>,
}

/// Reduce a provider task id to a safe file stem
///
/// Ids that change under sanitizing get a short digest of the raw id appended,
/// so `a.b` and `a_b` never share a file.
pub fn sanitize_task_id(task_id: &str) -> String {
    let stem: String = task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !stem.is_empty() && stem == task_id {
        return stem;
    }

    let digest = Sha256::digest(task_id.as_bytes());
    let short: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    if stem.is_empty() {
        format!("task-{}", short)
    } else {
        format!("{}-{}", stem, short)
    }
}

/// Thumbnail extension from the URL path, then the content type, then `png`
pub fn thumbnail_extension(url: &str, content_type: Option<&str>) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext;
        }
    }

    let from_mime = content_type.and_then(|mime| {
        match mime.split(';').next().unwrap_or(mime).trim() {
            "image/png" => Some("png"),
            "image/jpeg" => Some("jpg"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            "video/mp4" => Some("mp4"),
            "video/webm" => Some("webm"),
            _ => None,
        }
    });
    from_mime.unwrap_or(DEFAULT_THUMBNAIL_EXT).to_string()
}

/// Resolve a `/storage/...` record path to a file under `storage_dir`
///
/// Returns `None` for remote URLs and for paths that would escape the
/// storage directory.
pub fn local_file(storage_dir: &Path, stored_path: &str) -> Option<PathBuf> {
    let relative = Path::new(stored_path.strip_prefix(LOCAL_PREFIX)?);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(storage_dir.join(relative))
}

/// Copies remote results into the storage directory
pub struct Materializer {
    storage_dir: PathBuf,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl Materializer {
    pub fn new(storage_dir: impl Into<PathBuf>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            fetcher,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Materialize the model and thumbnail for `task_id`
    ///
    /// `current_*` are the values stored on the record. A field that is
    /// already local, or has no remote URL, comes back as `None`.
    pub async fn materialize(
        &self,
        task_id: &str,
        current_file_path: &str,
        current_thumbnail_path: &str,
        model_url: Option<&str>,
        thumbnail_url: Option<&str>,
    ) -> MaterializedPaths {
        let stem = sanitize_task_id(task_id);

        let file_path = match model_url {
            _ if is_local_path(current_file_path) => None,
            Some(url) => Some(
                self.store(task_id, url, MODELS_DIR, |_| format!("{}.glb", stem))
                    .await,
            ),
            None => None,
        };

        let thumbnail_path = match thumbnail_url {
            _ if is_local_path(current_thumbnail_path) => None,
            Some(url) => Some(
                self.store(task_id, url, THUMBNAILS_DIR, |content_type| {
                    format!("{}.{}", stem, thumbnail_extension(url, content_type))
                })
                .await,
            ),
            None => None,
        };

        MaterializedPaths {
            file_path,
            thumbnail_path,
        }
    }

    /// Fetch `url` into `<storage>/<dir>/<name>`, returning the local path or,
    /// on failure, the original URL
    async fn store<F>(&self, task_id: &str, url: &str, dir: &str, file_name: F) -> String
    where
        F: FnOnce(Option<&str>) -> String,
    {
        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(task_id = %task_id, url = %url, error = %e, "Failed to download result, keeping remote url");
                return url.to_string();
            }
        };

        let name = file_name(fetched.content_type.as_deref());
        let target_dir = self.storage_dir.join(dir);
        let target = target_dir.join(&name);

        if let Err(e) = write_file(&target_dir, &target, &fetched.bytes).await {
            warn!(
                task_id = %task_id,
                path = %target.display(),
                error = %e,
                "Failed to save result, keeping remote url"
            );
            return url.to_string();
        }

        info!(
            task_id = %task_id,
            path = %target.display(),
            bytes = fetched.bytes.len(),
            "Result saved to local storage"
        );
        format!("{}{}/{}", LOCAL_PREFIX, dir, name)
    }
}

/// Write through a `.part` file, then rename into place
async fn write_file(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let partial = target.with_extension("part");
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, target).await?;
    debug!(path = %target.display(), "Result file written");
    Ok(())
}

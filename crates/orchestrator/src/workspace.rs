use std::path::{Path, PathBuf};

use github::SiteFile;
use sitesmith_core::Attachment;
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Per-task scratch directory holding everything that will be deployed.
///
/// The directory and its contents are removed when the value is dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create `task-<id>-*` under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>, task_id: Uuid) -> Result<Self> {
        let prefix = format!("task-{}-", task_id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!(task_id = %task_id, path = %dir.path().display(), "Workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        if !is_safe_relative_path(relative) {
            return Err(OrchestratorError::workspace(format!(
                "refusing to write outside the workspace: {}",
                relative
            )));
        }
        Ok(self.path().join(relative))
    }

    pub async fn write_file(&self, relative: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    pub async fn read_file(&self, relative: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write attachments next to `index.html`, returning the names used.
    ///
    /// Inline `data:` URIs are decoded; other URLs are downloaded with `http`.
    pub async fn save_attachments(
        &self,
        attachments: &[Attachment],
        http: &reqwest::Client,
    ) -> Result<Vec<String>> {
        let mut saved = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            let content = if attachment.is_inline() {
                attachment.decode()?
            } else {
                download(http, attachment).await?
            };
            let name = attachment.file_name();
            self.write_file(&name, &content).await?;
            debug!(name = %name, bytes = content.len(), "Attachment saved");
            saved.push(name);
        }

        if !saved.is_empty() {
            info!(count = saved.len(), "Attachments written to workspace");
        }
        Ok(saved)
    }

    /// Every regular file in the workspace, paths relative and sorted.
    pub async fn collect_files(&self) -> Result<Vec<SiteFile>> {
        let mut files = Vec::new();
        let mut pending = vec![self.path().to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let relative = path
                        .strip_prefix(self.path())
                        .map_err(|e| OrchestratorError::workspace(e.to_string()))?
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push(SiteFile::new(relative, tokio::fs::read(&path).await?));
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

async fn download(http: &reqwest::Client, attachment: &Attachment) -> Result<Vec<u8>> {
    let failed = |e: reqwest::Error| {
        OrchestratorError::workspace(format!("attachment {}: {}", attachment.name, e))
    };
    let response = http
        .get(&attachment.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(failed)?;
    Ok(response.bytes().await.map_err(failed)?.to_vec())
}

/// Relative path made of plain segments: no root, no `..`, no empty parts.
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains(':'))
}

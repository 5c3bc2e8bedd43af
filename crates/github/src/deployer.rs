use async_trait::async_trait;
use tracing::{info, warn};

use crate::client::GitHubClient;
use crate::error::Result;
use crate::types::{Deployment, RepoTarget, SiteFile};

/// Publishes generated sites to a Git host with static page hosting.
#[async_trait]
pub trait PagesDeployer: Send + Sync {
    /// Repository a fresh project named `repo_name` will be deployed to.
    async fn resolve_target(&self, repo_name: &str) -> Result<RepoTarget>;

    /// Create the repository if absent, upload `files`, enable Pages.
    ///
    /// Single pass: the first failing step aborts the deployment.
    async fn deploy(
        &self,
        target: &RepoTarget,
        files: &[SiteFile],
        message: &str,
    ) -> Result<Deployment>;

    /// Files of an earlier deployment; paths that do not exist are skipped.
    async fn fetch_files(&self, target: &RepoTarget, paths: &[&str]) -> Result<Vec<SiteFile>>;
}

#[async_trait]
impl PagesDeployer for GitHubClient {
    async fn resolve_target(&self, repo_name: &str) -> Result<RepoTarget> {
        Ok(RepoTarget::new(self.owner().await?, repo_name))
    }

    async fn deploy(
        &self,
        target: &RepoTarget,
        files: &[SiteFile],
        message: &str,
    ) -> Result<Deployment> {
        if !self.repo_exists(target).await? {
            self.create_repository(target, message).await?;
        }

        let mut last_commit = None;
        for file in files {
            last_commit = Some(self.put_file(target, file, message).await?);
        }

        self.enable_pages(target).await?;

        let commit_sha = match last_commit {
            Some(sha) => sha,
            None => self.head_sha(target).await?,
        };

        info!(
            repo = %target.full_name(),
            files = files.len(),
            commit_sha = %commit_sha,
            "Deployment complete"
        );

        Ok(Deployment {
            repo_url: target.repo_url(),
            pages_url: target.pages_url(),
            commit_sha,
        })
    }

    async fn fetch_files(&self, target: &RepoTarget, paths: &[&str]) -> Result<Vec<SiteFile>> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match self.get_file(target, path).await? {
                Some(file) => files.push(file),
                None => warn!(repo = %target.full_name(), path, "File missing from previous deployment"),
            }
        }
        Ok(files)
    }
}

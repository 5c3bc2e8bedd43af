use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use octocrab::Octocrab;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{GitHubError, Result};
use crate::types::{
    CommitRef, ContentEntry, CreateRepoBody, EnablePagesBody, PagesSource, PutContentBody,
    PutContentResponse, RepoTarget, SiteFile, UserLogin, DEFAULT_BRANCH,
};

/// REST client for repository, contents and Pages operations.
pub struct GitHubClient {
    octocrab: Octocrab,
    /// Organisation to create repositories under instead of the token's user
    owner: Option<String>,
    login: OnceCell<String>,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        Ok(Self::from_octocrab(octocrab))
    }

    /// Client against a different API root, e.g. GitHub Enterprise or a test server.
    pub fn with_base_uri(token: &str, base_uri: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .base_uri(base_uri.to_string())
            .map_err(|e| GitHubError::Config(e.to_string()))?
            .personal_token(token.to_string())
            .build()
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        Ok(Self::from_octocrab(octocrab))
    }

    fn from_octocrab(octocrab: Octocrab) -> Self {
        Self {
            octocrab,
            owner: None,
            login: OnceCell::new(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Login of the token's user, fetched once.
    pub async fn login(&self) -> Result<&str> {
        let login = self
            .login
            .get_or_try_init(|| async {
                let user: UserLogin = self.octocrab.get("/user", None::<&()>).await?;
                debug!(login = %user.login, "Resolved GitHub user");
                Ok::<_, GitHubError>(user.login)
            })
            .await?;
        Ok(login.as_str())
    }

    /// Account that owns newly created repositories.
    pub async fn owner(&self) -> Result<String> {
        match &self.owner {
            Some(owner) => Ok(owner.clone()),
            None => Ok(self.login().await?.to_string()),
        }
    }

    pub async fn repo_exists(&self, target: &RepoTarget) -> Result<bool> {
        let route = format!("/repos/{}/{}", target.owner, target.repo);
        match self
            .octocrab
            .get::<serde_json::Value, _, ()>(route, None)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = GitHubError::from(err);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn create_repository(&self, target: &RepoTarget, description: &str) -> Result<()> {
        info!(repo = %target.full_name(), "Creating repository");

        let body = CreateRepoBody {
            name: &target.repo,
            description,
            private: false,
            auto_init: false,
        };
        let route = if self.owner.is_some() && self.owner.as_deref() != Some(self.login().await?)
        {
            format!("/orgs/{}/repos", target.owner)
        } else {
            "/user/repos".to_string()
        };

        match self
            .octocrab
            .post::<_, serde_json::Value>(route, Some(&body))
            .await
        {
            Ok(_) => Ok(()),
            // Name already taken by a repository we own: created concurrently.
            Err(err) => match GitHubError::from(err) {
                GitHubError::Api { status: 422, .. } => {
                    debug!(repo = %target.full_name(), "Repository already exists");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn content_entry(&self, target: &RepoTarget, path: &str) -> Result<Option<ContentEntry>> {
        let route = format!(
            "/repos/{}/{}/contents/{}?ref={}",
            target.owner, target.repo, path, DEFAULT_BRANCH
        );
        match self.octocrab.get::<ContentEntry, _, ()>(route, None).await {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                let err = GitHubError::from(err);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Create or update one file on the default branch, returning the commit sha.
    pub async fn put_file(&self, target: &RepoTarget, file: &SiteFile, message: &str) -> Result<String> {
        let existing_sha = self.content_entry(target, &file.path).await?.map(|e| e.sha);
        debug!(
            repo = %target.full_name(),
            path = %file.path,
            update = existing_sha.is_some(),
            "Uploading file"
        );

        let body = PutContentBody {
            message,
            content: STANDARD.encode(&file.content),
            branch: DEFAULT_BRANCH,
            sha: existing_sha,
        };
        let route = format!(
            "/repos/{}/{}/contents/{}",
            target.owner, target.repo, file.path
        );
        let response: PutContentResponse = self.octocrab.put(route, Some(&body)).await?;

        Ok(response.commit.sha)
    }

    /// Fetch one file from the default branch; `None` when it does not exist.
    pub async fn get_file(&self, target: &RepoTarget, path: &str) -> Result<Option<SiteFile>> {
        let Some(entry) = self.content_entry(target, path).await? else {
            return Ok(None);
        };

        let encoded = entry.content.unwrap_or_default();
        let content = match entry.encoding.as_deref() {
            Some("base64") => {
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map_err(|e| GitHubError::Decode(format!("{}: {}", path, e)))?
            }
            _ => encoded.into_bytes(),
        };

        Ok(Some(SiteFile::new(path, content)))
    }

    /// Turn on Pages for the default branch root. Already enabled counts as success.
    pub async fn enable_pages(&self, target: &RepoTarget) -> Result<()> {
        let body = EnablePagesBody {
            source: PagesSource {
                branch: DEFAULT_BRANCH,
                path: "/",
            },
        };
        let route = format!("/repos/{}/{}/pages", target.owner, target.repo);

        match self
            .octocrab
            .post::<_, serde_json::Value>(route, Some(&body))
            .await
        {
            Ok(_) => {
                info!(repo = %target.full_name(), "Pages enabled");
                Ok(())
            }
            Err(err) => match GitHubError::from(err) {
                GitHubError::Api { status: 409, .. } => {
                    debug!(repo = %target.full_name(), "Pages already enabled");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    pub async fn head_sha(&self, target: &RepoTarget) -> Result<String> {
        let route = format!(
            "/repos/{}/{}/commits/{}",
            target.owner, target.repo, DEFAULT_BRANCH
        );
        let commit: CommitRef = self.octocrab.get(route, None::<&()>).await?;
        Ok(commit.sha)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("owner", &self.owner)
            .field("login", &self.login.get())
            .finish()
    }
}

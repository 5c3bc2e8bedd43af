use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_BRANCH: &str = "main";

/// A repository to deploy into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
}

impl RepoTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse `https://github.com/<owner>/<repo>` with an optional trailing `/` or `.git`.
    pub fn parse_url(url: &str) -> Option<Self> {
        let rest = url
            .trim()
            .strip_prefix("https://github.com/")
            .or_else(|| url.trim().strip_prefix("http://github.com/"))?;
        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);

        let (owner, repo) = rest.split_once('/')?;
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if valid(owner) && valid(repo) {
            Some(Self::new(owner, repo))
        } else {
            None
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }

    pub fn pages_url(&self) -> String {
        format!(
            "https://{}.github.io/{}/",
            self.owner.to_lowercase(),
            self.repo
        )
    }
}

/// Repository name derived from a task identifier.
///
/// Lowercased, `_` becomes `-`, anything outside `[a-z0-9.-]` collapses to `-`.
pub fn repo_name_for(task: &str) -> String {
    let mut name = String::with_capacity(task.len());
    for c in task.trim().chars() {
        let c = c.to_ascii_lowercase();
        let mapped = if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' };
        if mapped == '-' && name.ends_with('-') {
            continue;
        }
        name.push(mapped);
    }
    let name = name.trim_matches('-').to_string();
    if name.is_empty() {
        "site".to_string()
    } else {
        name
    }
}

/// A file to upload, path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl SiteFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Deployment {
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: String,
}

// Contents API payloads

#[derive(Debug, Serialize)]
pub(crate) struct CreateRepoBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub private: bool,
    pub auto_init: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentBody<'a> {
    pub message: &'a str,
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentEntry {
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentResponse {
    pub commit: CommitRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserLogin {
    pub login: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PagesSource<'a> {
    pub branch: &'a str,
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnablePagesBody<'a> {
    pub source: PagesSource<'a>,
}

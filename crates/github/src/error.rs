use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Repository not found: {owner}/{repo}")]
    RepoNotFound { owner: String, repo: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),
}

impl GitHubError {
    /// HTTP status reported by GitHub, when the error came from the API.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            GitHubError::RepoNotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<octocrab::Error> for GitHubError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                if status == 401 {
                    GitHubError::Authentication(source.message.clone())
                } else if source.message.to_lowercase().contains("rate limit") {
                    GitHubError::RateLimitExceeded
                } else {
                    GitHubError::Api {
                        status,
                        message: source.message.clone(),
                    }
                }
            }
            _ => GitHubError::Api {
                status: 0,
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

pub mod client;
pub mod deployer;
pub mod error;
pub mod types;

pub use client::GitHubClient;
pub use deployer::PagesDeployer;
pub use error::{GitHubError, Result};
pub use types::{repo_name_for, Deployment, RepoTarget, SiteFile, DEFAULT_BRANCH};

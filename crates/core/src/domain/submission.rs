use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{CoreError, Result};

/// A file supplied alongside a brief, usually inlined as a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }

    /// Media type declared by the data URI, if any.
    pub fn media_type(&self) -> Option<&str> {
        let header = self.url.strip_prefix("data:")?.split_once(',')?.0;
        let media_type = header.split(';').next().unwrap_or_default();
        (!media_type.is_empty()).then_some(media_type)
    }

    /// Single safe path segment derived from the name: directories are
    /// stripped, `:` and control characters become `-`, and names made only
    /// of dots fall back to `attachment`.
    pub fn file_name(&self) -> String {
        let base = self
            .name
            .rsplit(['/', '\\'])
            .find(|part| !part.trim_matches('.').is_empty())
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| if c == ':' || c.is_control() { '-' } else { c })
            .collect();
        if cleaned.trim().is_empty() {
            "attachment".to_string()
        } else {
            cleaned
        }
    }

    /// Decode the bytes of an inline `data:` URI.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let invalid = |reason: &str| CoreError::InvalidAttachment {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        let rest = self
            .url
            .strip_prefix("data:")
            .ok_or_else(|| invalid("not an inline data URI"))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| invalid("missing ',' separator"))?;

        if header.split(';').any(|param| param == "base64") {
            STANDARD
                .decode(data.trim())
                .map_err(|e| invalid(&e.to_string()))
        } else {
            Ok(data.as_bytes().to_vec())
        }
    }
}

/// Intake payload for a new generation request.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskSubmission {
    pub email: String,
    pub secret: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub evaluation_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TaskSubmission {
    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(CoreError::Validation("task must not be empty".to_string()));
        }
        if self.nonce.trim().is_empty() {
            return Err(CoreError::Validation("nonce must not be empty".to_string()));
        }
        if self.brief.trim().is_empty() {
            return Err(CoreError::Validation("brief must not be empty".to_string()));
        }
        if self.round == 0 {
            return Err(CoreError::Validation("round must be at least 1".to_string()));
        }
        if let Some(url) = &self.evaluation_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CoreError::Validation(format!(
                    "evaluation_url must be an http(s) URL, got {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSubmission")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("task", &self.task)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("checks", &self.checks.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

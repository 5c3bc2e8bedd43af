use serde::{Deserialize, Serialize};

/// What a generation is for; selects default sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Requirements analysis as JSON
    Analysis,
    /// Ordered build steps as JSON
    Plan,
    /// Site source files in fenced code blocks
    Site,
    /// Free-form markdown
    Readme,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Plan => "plan",
            Self::Site => "site",
            Self::Readme => "readme",
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            Self::Analysis | Self::Plan => 0.3,
            Self::Site => 0.2,
            Self::Readme => 0.5,
        }
    }

    pub fn default_max_tokens(&self) -> u32 {
        match self {
            Self::Analysis => 800,
            Self::Plan => 1500,
            Self::Site => 4000,
            Self::Readme => 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: OutputKind,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(kind: OutputKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: None,
            prompt: prompt.into(),
            temperature: kind.default_temperature(),
            max_tokens: kind.default_max_tokens(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    /// Name of the provider that produced `text`
    pub provider: String,
    pub kind: OutputKind,
}

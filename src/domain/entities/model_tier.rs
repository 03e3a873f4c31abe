use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

/// Credit pricing tier of a chat model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelTier {
    #[default]
    Basic,
    Standard,
    Premium,
    Enterprise,
}

const BASIC_MODELS: &[&str] = &[
    "llama3-8b-8192",
    "llama-3.1-8b-instant",
    "gemma2-9b-it",
    "meta-llama/llama-4-scout-17b-16e-instruct",
    "llama-3.2-1b-preview",
    "llama-3.2-3b-preview",
    "llama-3.2-11b-text-preview",
    "llama-3.2-11b-vision-preview",
    "llama3-groq-8b-8192-tool-use-preview",
];

const STANDARD_MODELS: &[&str] = &[
    "gpt-4.1-nano",
    "gpt-4o-mini",
    "o1-mini",
    "o3-mini",
    "qwen-qwq-32b",
    "meta-llama/llama-4-maverick-17b-128e-instruct",
];

const PREMIUM_MODELS: &[&str] = &[
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.5-preview",
    "gpt-4o",
    "o1",
    "o1-pro",
    "o3",
    "gpt-3.5-turbo",
    "claude-3-opus-latest",
    "claude-3-7-sonnet-latest",
    "claude-3-5-sonnet-latest",
    "claude-3-5-haiku-latest",
    "claude-sonnet-4-20250514",
    "deepseek-r1-distill-llama-70b",
    "llama-3.3-70b-versatile",
    "llama3-70b-8192",
    "mistral-saba-24b",
    "deepseek-r1-distill-qwen-32b",
    "llama-3.2-90b-text-preview",
    "llama-3.2-90b-vision-preview",
    "llama-3.3-70b-specdec",
    "llama2-70b-4096",
    "llama-3.1-70b-versatile",
    "llama-3.1-405b-reasoning",
    "llama3-groq-70b-8192-tool-use-preview",
    "gemini-2.5-pro-preview-03-25",
];

const ENTERPRISE_MODELS: &[&str] = &["claude-opus-4-20250514"];

impl ModelTier {
    /// Tier of a model id. Unknown models are billed as basic.
    pub fn for_model(model: &str) -> Self {
        let model = model.trim();
        if ENTERPRISE_MODELS.contains(&model) {
            ModelTier::Enterprise
        } else if PREMIUM_MODELS.contains(&model) {
            ModelTier::Premium
        } else if STANDARD_MODELS.contains(&model) {
            ModelTier::Standard
        } else {
            if !BASIC_MODELS.contains(&model) {
                tracing::debug!(model, "Unknown model, billing as basic tier");
            }
            ModelTier::Basic
        }
    }

    /// Credits charged per request.
    pub fn credits(&self) -> i64 {
        match self {
            ModelTier::Basic => 1,
            ModelTier::Standard => 3,
            ModelTier::Premium => 5,
            ModelTier::Enterprise => 10,
        }
    }
}

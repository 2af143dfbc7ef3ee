//! Process configuration.
//!
//! All settings come from environment variables at startup. The GitHub
//! and OpenAI clients are constructed once from this config and passed
//! into handlers through shared state, never held as globals.

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub personal access token.
    pub github_token: String,
    /// Repository owner (user or org).
    pub github_owner: String,
    /// Repository name holding the project files.
    pub github_repo: String,
    /// Branch all reads and writes target.
    pub github_branch: String,
    /// OpenAI API key for the metadata describer and summaries.
    pub openai_api_key: String,
    /// Chat model used for describer and summary calls.
    pub openai_model: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Path to the static OpenAPI document served as-is.
    pub openapi_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `GITHUB_TOKEN`, `GITHUB_OWNER`, and `GITHUB_REPO` are required;
    /// everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let github_token = require_env("GITHUB_TOKEN")?;
        let github_owner = require_env("GITHUB_OWNER")?;
        let github_repo = require_env("GITHUB_REPO")?;

        Ok(Self {
            github_token,
            github_owner,
            github_repo,
            github_branch: env_or("GITHUB_BRANCH", "main"),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8000").parse()?,
            openapi_path: env_or("OPENAPI_PATH", "openapi.json"),
        })
    }

    /// Base URL for raw file links recorded in the memory index.
    pub fn raw_content_base(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}",
            self.github_owner, self.github_repo, self.github_branch
        )
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{} must be set", key))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

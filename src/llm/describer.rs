//! Best-effort file metadata generation.
//!
//! The describer asks the chat model to summarize a file for the memory
//! index. It never fails: any error (network, malformed reply) yields a
//! fixed placeholder so memory enrichment can't break a write.

use serde::Deserialize;

use super::ChatClient;

/// How much file content the describer prompt includes.
const CONTENT_PREVIEW_LIMIT: usize = 3000;

/// Auto-generated metadata for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub description: String,
    pub tags: Vec<String>,
    pub pod_owner: String,
}

impl FileMetadata {
    /// Placeholder returned when the model call or parse fails.
    pub fn fallback(path: &str) -> Self {
        Self {
            description: format!("Fallback summary for {}", path),
            tags: vec!["auto".to_string()],
            pod_owner: String::new(),
        }
    }
}

/// Model reply shape; all fields optional so a partial YAML answer
/// still contributes what it has.
#[derive(Debug, Deserialize)]
struct DescriberReply {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    pod_owner: Option<String>,
}

/// Describe a file's content for the memory index.
pub async fn describe_file(llm: &dyn ChatClient, path: &str, content: &str) -> FileMetadata {
    let preview: String = content.chars().take(CONTENT_PREVIEW_LIMIT).collect();
    let prompt = format!(
        "You are helping index files in an AI-native delivery repository.\n\
         Given the following file content from `{path}`, generate:\n\
         1. A short description of what this file contains\n\
         2. A list of 2-4 relevant tags (e.g. 'prompt', 'flow', 'model', 'config')\n\
         3. The pod likely to own or use this file (choose between DevPod, QAPod, \
         ResearchPod, DeliveryPod, or leave blank)\n\n\
         File content:\n---\n{preview}\n---\n\n\
         Respond with a YAML object with fields: description, tags (list), and pod_owner."
    );

    let reply = match llm.complete(&prompt, 0.3).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Describer call failed for {}: {}", path, e);
            return FileMetadata::fallback(path);
        }
    };

    match serde_yaml::from_str::<DescriberReply>(&reply) {
        Ok(parsed) => FileMetadata {
            description: parsed
                .description
                .unwrap_or_else(|| format!("Generated summary for {}", path)),
            tags: parsed.tags.unwrap_or_else(|| vec!["auto".to_string()]),
            pod_owner: parsed.pod_owner.unwrap_or_default(),
        },
        Err(e) => {
            tracing::warn!("Describer reply for {} was not YAML: {}", path, e);
            FileMetadata::fallback(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedLlm(Result<String, String>);

    #[async_trait]
    impl ChatClient for CannedLlm {
        async fn complete(&self, _prompt: &str, _temperature: f64) -> anyhow::Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    #[tokio::test]
    async fn parses_well_formed_reply() {
        let llm = CannedLlm(Ok(
            "description: NHL prediction prompt\ntags:\n  - prompt\n  - model\npod_owner: DevPod"
                .to_string(),
        ));
        let meta = describe_file(&llm, "prompts/predict.txt", "predict the playoffs").await;
        assert_eq!(meta.description, "NHL prediction prompt");
        assert_eq!(meta.tags, vec!["prompt", "model"]);
        assert_eq!(meta.pod_owner, "DevPod");
    }

    #[tokio::test]
    async fn model_failure_returns_fallback_shape() {
        let llm = CannedLlm(Err("timeout".to_string()));
        let meta = describe_file(&llm, "docs/notes.md", "hello").await;
        assert_eq!(meta.description, "Fallback summary for docs/notes.md");
        assert_eq!(meta.tags, vec!["auto"]);
        assert_eq!(meta.pod_owner, "");
    }

    #[tokio::test]
    async fn unparseable_reply_returns_fallback_shape() {
        let llm = CannedLlm(Ok(":: not yaml ::\n\t- {".to_string()));
        let meta = describe_file(&llm, "a.md", "x").await;
        assert_eq!(meta, FileMetadata::fallback("a.md"));
    }

    #[tokio::test]
    async fn partial_reply_fills_defaults() {
        let llm = CannedLlm(Ok("description: Just a description".to_string()));
        let meta = describe_file(&llm, "a.md", "x").await;
        assert_eq!(meta.description, "Just a description");
        assert_eq!(meta.tags, vec!["auto"]);
        assert_eq!(meta.pod_owner, "");
    }
}

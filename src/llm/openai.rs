use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::provider::LanguageModel;
use super::types::{ChatMessage, CompletionRequest};
use crate::core::config::settings::LlmSettings;
use crate::core::errors::ApiError;
use crate::retrieval::prompt::user_prompt;

/// Chat-completions client for OpenAI, Ollama, LM Studio and other
/// compatible servers.
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl OpenAiCompatibleModel {
    pub fn new(settings: &LlmSettings, api_key: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    /// `None` when no API key is configured; callers then answer with the stub.
    pub fn from_settings(settings: &LlmSettings) -> Result<Option<Self>, ApiError> {
        match settings.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Self::new(settings, key.to_string()).map(Some),
            _ => Ok(None),
        }
    }

    fn request(&self, system: &str, context: &str, question: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system),
                ChatMessage::user(user_prompt(context, question)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request(system, context, question);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        Ok(completion_text(&payload))
    }
}

fn completion_text(payload: &Value) -> String {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(base_url: &str, api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 2,
            ..LlmSettings::default()
        }
    }

    #[test]
    fn missing_or_blank_key_disables_the_model() {
        assert!(OpenAiCompatibleModel::from_settings(&settings("http://x", None))
            .unwrap()
            .is_none());
        assert!(
            OpenAiCompatibleModel::from_settings(&settings("http://x", Some("  ")))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn request_carries_prompt_and_sampling_defaults() {
        let model = OpenAiCompatibleModel::from_settings(&settings("http://x/v1/", Some("k")))
            .unwrap()
            .unwrap();
        let body = serde_json::to_value(model.request("sys", "ctx", "q?")).unwrap();

        assert_eq!(model.base_url, "http://x/v1");
        assert_eq!(body["model"], json!("llama3.1:8b-instruct-q4_K_M"));
        assert_eq!(body["temperature"], json!(0.1));
        assert_eq!(body["max_tokens"], json!(500));
        assert_eq!(body["messages"][0]["role"], json!("system"));
        assert_eq!(
            body["messages"][1]["content"],
            json!("Context:\nctx\n\nQuestion: q?\n\nAnswer strictly from the context.")
        );
    }

    #[test]
    fn completion_text_tolerates_missing_content() {
        assert_eq!(
            completion_text(&json!({ "choices": [{ "message": { "content": " 20 days \n" } }] })),
            "20 days"
        );
        assert_eq!(completion_text(&json!({ "choices": [] })), "");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_upstream_error() {
        let model = OpenAiCompatibleModel::from_settings(&settings("http://127.0.0.1:9", Some("k")))
            .unwrap()
            .unwrap();
        assert!(matches!(
            model.complete("sys", "ctx", "q").await,
            Err(ApiError::Upstream(_))
        ));
    }
}

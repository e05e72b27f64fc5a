// AIによるコードレビュー提案
//
// 選択中のファイルだけを対象にし、結果はその選択に紐づく。

use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ReviewError;
use crate::fetcher::RepoId;
use crate::llm::prompts::{self, CODE_REVIEW_SYSTEM, CODE_REVIEW_USER};
use crate::llm::schemas::openai_response::{ChatMessage, OpenAIResponse, SuggestionPayload};

/// レビュー指摘1件
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// 1始まりの行番号。特定の行に紐づかなければ None
    pub line: Option<u32>,
    pub message: String,
}

impl From<SuggestionPayload> for Suggestion {
    fn from(payload: SuggestionPayload) -> Self {
        Suggestion {
            line: payload.line,
            message: payload.message,
        }
    }
}

#[async_trait]
pub trait CodeReviewer: Send + Sync {
    async fn review(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
    ) -> Result<Vec<Suggestion>, ReviewError>;
}

// Azure OpenAI のエンドポイント設定
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub key: String,
    pub endpoint: String,
}

// Azure OpenAI クライアント
pub struct AzureOpenAIReviewer {
    client: reqwest::Client,
    endpoint: Endpoint,
    deployment: String,
    api_version: String,
    template_dir: Option<PathBuf>,
    max_tokens: usize,
    temperature: f32,
    max_suggestions: usize,
    max_content_chars: usize,
}

impl AzureOpenAIReviewer {
    pub fn new(endpoint: Endpoint, deployment: impl Into<String>) -> Self {
        AzureOpenAIReviewer {
            client: reqwest::Client::new(),
            endpoint,
            deployment: deployment.into(),
            api_version: "2023-05-15".to_string(),
            template_dir: None,
            max_tokens: 1500,
            temperature: 0.2,
            max_suggestions: 10,
            max_content_chars: 10000,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_template_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.template_dir = dir;
        self
    }

    fn build_messages(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
    ) -> Result<Vec<ChatMessage>, ReviewError> {
        let dir = self.template_dir.as_deref();
        let system = prompts::get_template(dir, CODE_REVIEW_SYSTEM)
            .map_err(|e| ReviewError::Template(e.to_string()))?;
        let user = prompts::get_template(dir, CODE_REVIEW_USER)
            .map_err(|e| ReviewError::Template(e.to_string()))?;

        let variables = vec![
            ("repo".to_string(), repo.to_string()),
            ("path".to_string(), path.to_string()),
            ("content".to_string(), truncate(content, self.max_content_chars)),
            ("max_suggestions".to_string(), self.max_suggestions.to_string()),
        ];

        Ok(vec![
            ChatMessage::system(prompts::render_template(&system, &variables)),
            ChatMessage::user(prompts::render_template(&user, &variables)),
        ])
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
    ) -> Result<(String, usize), ReviewError> {
        let url = self.completions_url();

        let request_body = json!({
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.endpoint.key)
            .json(&request_body)
            .send()
            .await?;

        if response.status().is_success() {
            let openai_response: OpenAIResponse = response.json().await?;
            let tokens = openai_response.usage.map(|u| u.total_tokens).unwrap_or(0);
            let content = openai_response
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or(ReviewError::EmptyResponse)?;
            Ok((content, tokens))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ReviewError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl CodeReviewer for AzureOpenAIReviewer {
    async fn review(
        &self,
        repo: &RepoId,
        path: &str,
        content: &str,
    ) -> Result<Vec<Suggestion>, ReviewError> {
        info!("[{}] 🤖 レビュー依頼: {}:{}", self.endpoint.name, repo, path);
        let messages = self.build_messages(repo, path, content)?;
        let (reply, tokens_used) = self.chat_completion(&messages).await?;
        debug!("[{}] 使用トークン: {}", self.endpoint.name, tokens_used);
        Ok(parse_suggestions(&reply))
    }
}

// 大きなファイルは先頭部分のみ
fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...\n(内容省略)...", &content[..index]),
        None => content.to_string(),
    }
}

/// モデルの返答を指摘の一覧にする
///
/// JSON配列として読めなければ、返答全体を1件の指摘として扱う。
pub fn parse_suggestions(reply: &str) -> Vec<Suggestion> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<Vec<SuggestionPayload>>(body) {
        Ok(items) => items.into_iter().map(Suggestion::from).collect(),
        Err(_) if body.is_empty() => Vec::new(),
        Err(_) => vec![Suggestion {
            line: None,
            message: body.to_string(),
        }],
    }
}

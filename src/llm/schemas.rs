// 外部APIのスキーマ定義

// GitHub Contents API 応答に関するスキーマ
pub mod github_response {
    use serde::{Deserialize, Serialize};

    /// Contents API のアイテム（一覧の要素、または単一ファイル）
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct GitHubContentItem {
        pub name: String,
        pub path: String,
        pub sha: Option<String>,
        pub size: Option<u64>,
        pub url: Option<String>,
        pub html_url: Option<String>,
        pub download_url: Option<String>,
        /// "file", "dir", "symlink", "submodule"
        #[serde(rename = "type")]
        pub item_type: String,
        /// ファイル取得時のみ（通常はBase64）
        pub content: Option<String>,
        pub encoding: Option<String>,
    }

    /// ディレクトリなら配列、ファイルならオブジェクトが返る
    #[derive(Clone, Debug, Deserialize)]
    #[serde(untagged)]
    pub enum GitHubContents {
        Listing(Vec<GitHubContentItem>),
        Single(Box<GitHubContentItem>),
    }
}

// OpenAI API 応答に関するスキーマ
pub mod openai_response {
    use serde::{Deserialize, Serialize};

    // チャットメッセージ
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct ChatMessage {
        pub role: String,
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            ChatMessage {
                role: "system".to_string(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            ChatMessage {
                role: "user".to_string(),
                content: content.into(),
            }
        }
    }

    // OpenAI APIレスポンス
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct OpenAIResponse {
        pub id: String,
        pub choices: Vec<OpenAIChoice>,
        pub usage: Option<OpenAIUsage>,
    }

    // OpenAI API選択肢
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct OpenAIChoice {
        pub message: ChatMessage,
    }

    // OpenAI APIトークン使用量
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct OpenAIUsage {
        pub total_tokens: usize,
    }

    /// モデルに返させるレビュー指摘1件
    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
    pub struct SuggestionPayload {
        pub line: Option<u32>,
        pub message: String,
    }
}

#[cfg(test)]
mod tests {
    use super::github_response::GitHubContents;

    #[test]
    fn directory_listing_deserializes_as_array() {
        let body = r#"[
            {"name":"src","path":"src","type":"dir","download_url":null},
            {"name":"README.md","path":"README.md","type":"file",
             "download_url":"https://raw.githubusercontent.com/o/r/main/README.md"}
        ]"#;
        match serde_json::from_str::<GitHubContents>(body).unwrap() {
            GitHubContents::Listing(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].item_type, "dir");
                assert!(items[1].download_url.is_some());
            }
            GitHubContents::Single(_) => panic!("expected a listing"),
        }
    }

    #[test]
    fn file_deserializes_as_single() {
        let body = r#"{"name":"a.rs","path":"src/a.rs","type":"file",
            "content":"Zm4gbWFpbigpIHt9\n","encoding":"base64"}"#;
        match serde_json::from_str::<GitHubContents>(body).unwrap() {
            GitHubContents::Single(item) => {
                assert_eq!(item.encoding.as_deref(), Some("base64"));
            }
            GitHubContents::Listing(_) => panic!("expected a single item"),
        }
    }
}

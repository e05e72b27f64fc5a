// ツリーとは別に持つ表示状態

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NavigatorError;
use crate::review::Suggestion;

/// 選択中のファイルに紐づくAIレビュー結果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewSuggestions {
    pub path: String,
    pub items: Vec<Suggestion>,
    pub generated_at: DateTime<Utc>,
}

/// 表示層から読むための状態
///
/// 読み込み中フラグは進行中のリクエスト数から導出されるので、
/// 重なったリクエストの片方が終わっても早すぎる解除は起きない。
#[derive(Clone, Debug, Default)]
pub struct ViewState {
    pub selected_path: Option<String>,
    pub file_content: Option<String>,
    pub is_loading_directory: bool,
    pub is_loading_file: bool,
    pub is_loading_review: bool,
    pub suggestions: Option<ReviewSuggestions>,
    /// 直近の失敗。次に成功した操作で消える
    pub last_error: Option<NavigatorError>,
}

impl ViewState {
    pub fn is_selected(&self, path: &str) -> bool {
        self.selected_path.as_deref() == Some(path)
    }
}

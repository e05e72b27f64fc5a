// エラー型の定義

use thiserror::Error;

/// ContentFetcher が返すエラー
///
/// ナビゲーターはサブタイプを区別せず、メッセージだけを
/// `NavigatorError` に畳み込む。
#[derive(Debug, Error)]
pub enum FetchError {
    /// ネットワーク障害
    #[error("ネットワークエラー: {0}")]
    Network(#[from] reqwest::Error),

    /// 成功以外のステータス
    #[error("ステータス {status}, レスポンス: {body}")]
    Status { status: u16, body: String },

    /// ペイロードの形式が想定外
    #[error("不正なペイロード: {0}")]
    Malformed(String),

    /// ローカルファイルシステムのエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

/// ナビゲーター操作の失敗
///
/// 外部に見える失敗は2種類だけ。どちらもユーザーの再クリックで再試行できる。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigatorError {
    /// ディレクトリの一覧を取得できなかった
    #[error("ディレクトリ読み込み失敗: {path} - {message}")]
    ListFailure { path: String, message: String },

    /// ファイル内容を取得できなかった
    #[error("ファイル読み込み失敗: {path} - {message}")]
    ReadFailure { path: String, message: String },
}

impl NavigatorError {
    pub fn list(path: &str, err: impl std::fmt::Display) -> Self {
        NavigatorError::ListFailure {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn read(path: &str, err: impl std::fmt::Display) -> Self {
        NavigatorError::ReadFailure {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            NavigatorError::ListFailure { path, .. } | NavigatorError::ReadFailure { path, .. } => {
                path
            }
        }
    }
}

/// AIレビューのエラー
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("OpenAI API リクエストエラー: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OpenAI API エラー: ステータス {status}, レスポンス: {body}")]
    Status { status: u16, body: String },

    #[error("OpenAI API の応答が空です")]
    EmptyResponse,

    #[error("プロンプトテンプレートエラー: {0}")]
    Template(String),

    /// レビュー対象のファイルが選択されていない
    #[error("ファイルが選択されていません")]
    NothingSelected,
}

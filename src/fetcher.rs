// リポジトリの内容を取得するコラボレーター
//
// ナビゲーターはこのトレイト越しにしかリモートを知らない。

pub mod github;
pub mod local;

use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub use github::GitHubFetcher;
pub use local::LocalFetcher;

/// リポジトリ識別子（"owner/repo"）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// "owner/repo" または GitHub の URL を解析する
    pub fn parse(input: &str) -> Option<Self> {
        let re = Regex::new(
            r"^(?:https?://(?:www\.)?github\.com/)?([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$",
        )
        .ok()?;
        let caps = re.captures(input.trim())?;
        Some(RepoId::new(&caps[1], &caps[2]))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// エントリの種類
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        self == EntryKind::Directory
    }
}

/// ディレクトリ一覧の1エントリ
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub download_ref: Option<String>,
    pub inline_content: Option<String>,
    pub encoding: Option<String>,
}

impl Entry {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Entry::new(name, path, EntryKind::File)
    }

    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Entry::new(name, path, EntryKind::Directory)
    }

    fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        Entry {
            name: name.into(),
            path: path.into(),
            kind,
            download_ref: None,
            inline_content: None,
            encoding: None,
        }
    }
}

/// ファイル内容
///
/// インラインのエンコード済み内容か、追加取得が必要なダウンロード参照のどちらか。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileContent {
    Inline {
        content: String,
        encoding: Option<String>,
    },
    Download {
        url: String,
    },
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// ディレクトリ直下のエントリを返す（ルートは ""）
    async fn list(&self, repo: &RepoId, path: &str) -> Result<Vec<Entry>, FetchError>;

    /// ファイルの内容を返す
    async fn read(&self, repo: &RepoId, path: &str) -> Result<FileContent, FetchError>;

    /// ダウンロード参照から生のテキストを取得する
    async fn download(&self, url: &str) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_repo() {
        assert_eq!(
            RepoId::parse("rust-lang/cargo"),
            Some(RepoId::new("rust-lang", "cargo"))
        );
    }

    #[test]
    fn parses_github_urls() {
        assert_eq!(
            RepoId::parse("https://github.com/tokio-rs/tokio.git"),
            Some(RepoId::new("tokio-rs", "tokio"))
        );
        assert_eq!(
            RepoId::parse("https://github.com/serde-rs/json/"),
            Some(RepoId::new("serde-rs", "json"))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(RepoId::parse("not a repo"), None);
        assert_eq!(RepoId::parse("a/b/c"), None);
        assert_eq!(RepoId::parse(""), None);
    }
}

// ローカルのチェックアウトを ContentFetcher として提供する
//
// .gitignore を尊重し、GitHub と同じく名前順でエントリを返す。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ignore::WalkBuilder;
use log::debug;

use super::{ContentFetcher, Entry, FileContent, RepoId};
use crate::error::FetchError;

pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFetcher { root: root.into() }
    }

    // ".." や絶対パスでルートの外に出ないようにする
    fn resolve(&self, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(path.trim_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FetchError::Malformed(format!("不正なパス: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

fn list_dir(dir: &Path, parent: &str) -> Result<Vec<Entry>, FetchError> {
    if !dir.is_dir() {
        return Err(FetchError::Malformed(format!(
            "{} はディレクトリではありません",
            dir.display()
        )));
    }

    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(false)
        .require_git(false)
        .filter_entry(|e| e.file_name() != ".git")
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let dent = result.map_err(|e| FetchError::Malformed(e.to_string()))?;
        if dent.depth() == 0 {
            continue;
        }
        let name = dent.file_name().to_string_lossy().to_string();
        let path = if parent.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", parent, name)
        };
        let is_dir = dent.file_type().map(|t| t.is_dir()).unwrap_or(false);
        entries.push(if is_dir {
            Entry::directory(name, path)
        } else {
            Entry::file(name, path)
        });
    }
    Ok(entries)
}

#[async_trait]
impl ContentFetcher for LocalFetcher {
    async fn list(&self, _repo: &RepoId, path: &str) -> Result<Vec<Entry>, FetchError> {
        let dir = self.resolve(path)?;
        let parent = path.trim_matches('/').to_string();
        debug!("📁 ローカル一覧: {}", dir.display());
        tokio::task::spawn_blocking(move || list_dir(&dir, &parent))
            .await
            .map_err(|e| FetchError::Io(std::io::Error::other(e)))?
    }

    async fn read(&self, _repo: &RepoId, path: &str) -> Result<FileContent, FetchError> {
        let file = self.resolve(path)?;
        if file.is_dir() {
            return Err(FetchError::Malformed(format!(
                "{} はファイルではありません",
                path
            )));
        }
        let bytes = tokio::fs::read(&file).await?;
        Ok(FileContent::Inline {
            content: BASE64.encode(bytes),
            encoding: Some("base64".to_string()),
        })
    }

    // file:// でもルート配下しか読まない
    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let target = url
            .strip_prefix("file://")
            .ok_or_else(|| FetchError::Malformed(format!("未対応のURL: {}", url)))?;
        let relative = Path::new(target)
            .strip_prefix(&self.root)
            .map_err(|_| FetchError::Malformed(format!("ルート外のURL: {}", url)))?;
        let file = self.resolve(&relative.to_string_lossy())?;
        Ok(tokio::fs::read_to_string(file).await?)
    }
}

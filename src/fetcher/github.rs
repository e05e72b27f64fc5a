// GitHub Contents API を使う ContentFetcher

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{self, IntoUrl, Url, header};

use super::{ContentFetcher, Entry, EntryKind, FileContent, RepoId};
use crate::error::FetchError;
use crate::llm::schemas::github_response::{GitHubContentItem, GitHubContents};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

// GitHubクライアント
pub struct GitHubFetcher {
    client: reqwest::Client,
    api_base: Url,
    token: Option<String>,
    git_ref: Option<String>,
}

impl GitHubFetcher {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        git_ref: Option<String>,
    ) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("codehive-browser"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let api_base = api_base.into();
        let api_base = Url::parse(&api_base)
            .map_err(|e| FetchError::Malformed(format!("不正なAPIのURL {}: {}", api_base, e)))?;
        if api_base.cannot_be_a_base() {
            return Err(FetchError::Malformed(format!("不正なAPIのURL: {}", api_base)));
        }

        Ok(GitHubFetcher {
            client,
            api_base,
            token: token.filter(|t| !t.is_empty()),
            git_ref,
        })
    }

    // パスはセグメントごとにエスケープする（"#" や "?" を含む名前があるため）
    fn contents_url(&self, repo: &RepoId, path: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn get(&self, url: impl IntoUrl) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("token {}", token));
        }
        request
    }

    async fn fetch_contents(
        &self,
        repo: &RepoId,
        path: &str,
    ) -> Result<GitHubContents, FetchError> {
        let url = self.contents_url(repo, path);
        debug!("⬇️ GitHub取得: {}", url);

        let mut request = self.get(url);
        if let Some(git_ref) = &self.git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn to_entry(item: GitHubContentItem) -> Entry {
    let kind = if item.item_type == "dir" {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    Entry {
        name: item.name,
        path: item.path,
        kind,
        download_ref: item.download_url,
        inline_content: item.content,
        encoding: item.encoding,
    }
}

fn to_file_content(item: GitHubContentItem) -> Result<FileContent, FetchError> {
    if item.item_type == "dir" {
        return Err(FetchError::Malformed(format!(
            "{} はディレクトリです",
            item.path
        )));
    }
    match (item.content, item.download_url) {
        (Some(content), _) if !content.trim().is_empty() => Ok(FileContent::Inline {
            content,
            encoding: item.encoding,
        }),
        // 大きなファイルは content が空で返るので download_url を辿る
        (_, Some(url)) => Ok(FileContent::Download { url }),
        (Some(content), None) => Ok(FileContent::Inline {
            content,
            encoding: item.encoding,
        }),
        (None, None) => Err(FetchError::Malformed(format!(
            "{} に内容もダウンロードURLもありません",
            item.path
        ))),
    }
}

#[async_trait]
impl ContentFetcher for GitHubFetcher {
    async fn list(&self, repo: &RepoId, path: &str) -> Result<Vec<Entry>, FetchError> {
        match self.fetch_contents(repo, path).await? {
            GitHubContents::Listing(items) => {
                info!("🗂️ {}:{} のエントリ数: {}", repo, path, items.len());
                Ok(items.into_iter().map(to_entry).collect())
            }
            GitHubContents::Single(item) => Err(FetchError::Malformed(format!(
                "{} はディレクトリではありません",
                item.path
            ))),
        }
    }

    async fn read(&self, repo: &RepoId, path: &str) -> Result<FileContent, FetchError> {
        match self.fetch_contents(repo, path).await? {
            GitHubContents::Single(item) => to_file_content(*item),
            GitHubContents::Listing(_) => Err(FetchError::Malformed(format!(
                "{} はファイルではありません",
                path
            ))),
        }
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(
        item_type: &str,
        content: Option<&str>,
        download_url: Option<&str>,
    ) -> GitHubContentItem {
        GitHubContentItem {
            name: "a.rs".to_string(),
            path: "src/a.rs".to_string(),
            sha: None,
            size: None,
            url: None,
            html_url: None,
            download_url: download_url.map(str::to_string),
            item_type: item_type.to_string(),
            content: content.map(str::to_string),
            encoding: Some("base64".to_string()),
        }
    }

    #[test]
    fn builds_contents_urls() {
        let fetcher = GitHubFetcher::new("https://api.github.com/", None, None).unwrap();
        let repo = RepoId::new("o", "r");
        assert_eq!(
            fetcher.contents_url(&repo, "").as_str(),
            "https://api.github.com/repos/o/r/contents"
        );
        assert_eq!(
            fetcher.contents_url(&repo, "src/lib.rs").as_str(),
            "https://api.github.com/repos/o/r/contents/src/lib.rs"
        );
        assert_eq!(
            fetcher.contents_url(&repo, "/src//lib.rs/").as_str(),
            "https://api.github.com/repos/o/r/contents/src/lib.rs"
        );
    }

    #[test]
    fn escapes_reserved_characters_in_names() {
        let fetcher = GitHubFetcher::new(DEFAULT_API_BASE, None, None).unwrap();
        let repo = RepoId::new("o", "r");

        let url = fetcher.contents_url(&repo, "docs/a#b.md");
        assert_eq!(url.path(), "/repos/o/r/contents/docs/a%23b.md");
        assert_eq!(url.fragment(), None);

        let url = fetcher.contents_url(&repo, "C#/why?.md");
        assert_eq!(url.path(), "/repos/o/r/contents/C%23/why%3F.md");
        assert_eq!(url.query(), None);

        let url = fetcher.contents_url(&repo, "100%/x");
        assert_eq!(url.path(), "/repos/o/r/contents/100%25/x");
    }

    #[test]
    fn keeps_enterprise_base_path() {
        let fetcher = GitHubFetcher::new("https://ghe.example.com/api/v3/", None, None).unwrap();
        let url = fetcher.contents_url(&RepoId::new("o", "r"), "src");
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/o/r/contents/src");
        assert!(GitHubFetcher::new("not a url", None, None).is_err());
    }

    #[test]
    fn dir_items_map_to_directories() {
        let entry = to_entry(item("dir", None, None));
        assert_eq!(entry.kind, EntryKind::Directory);
        let entry = to_entry(item("file", None, Some("https://raw/x")));
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.download_ref.as_deref(), Some("https://raw/x"));
    }

    #[test]
    fn inline_content_is_preferred() {
        let content = to_file_content(item("file", Some("Zm9v"), Some("https://raw/x"))).unwrap();
        assert_eq!(
            content,
            FileContent::Inline {
                content: "Zm9v".to_string(),
                encoding: Some("base64".to_string())
            }
        );
    }

    #[test]
    fn empty_content_falls_back_to_download() {
        let content = to_file_content(item("file", Some(""), Some("https://raw/x"))).unwrap();
        assert_eq!(
            content,
            FileContent::Download {
                url: "https://raw/x".to_string()
            }
        );
        assert!(to_file_content(item("file", None, None)).is_err());
        assert!(to_file_content(item("dir", None, None)).is_err());
    }
}

// リポジトリのファイルツリーを遅延読み込みで辿るナビゲーター
//
// ツリーと表示状態はこの型だけが所有し、更新はすべてコピーオンライトで行う。
// 非同期の操作は begin_* / complete_* の二段階の操作から組み立てられていて、
// イベント駆動のホストは二段階の方を直接使える。

pub mod tree;
pub mod view;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::{StreamExt, stream};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, NavigatorError, ReviewError};
use crate::fetcher::{ContentFetcher, Entry, FileContent, RepoId};
use crate::review::{CodeReviewer, Suggestion};

pub use tree::{NodeKind, TreeNode};
pub use view::{ReviewSuggestions, ViewState};

/// 古い応答の扱い
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// 完了した順にすべて適用する
    #[default]
    ApplyInCompletionOrder,
    /// 後から同じ対象へのリクエストが発行されていれば捨てる
    DiscardSuperseded,
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply-in-completion-order" | "completion-order" => {
                Ok(StalePolicy::ApplyInCompletionOrder)
            }
            "discard-superseded" | "latest" => Ok(StalePolicy::DiscardSuperseded),
            other => Err(format!("未対応のポリシー: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NavigatorOptions {
    pub stale_policy: StalePolicy,
    /// expand_paths で同時に読み込むディレクトリ数
    pub load_concurrency: usize,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        NavigatorOptions {
            stale_policy: StalePolicy::default(),
            load_concurrency: 4,
        }
    }
}

/// 発行済みのディレクトリ読み込み
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryTicket {
    path: String,
    token: u64,
    epoch: u64,
}

impl DirectoryTicket {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 発行済みのファイル読み込み
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTicket {
    path: String,
    token: u64,
    epoch: u64,
}

impl FileTicket {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 発行済みのレビュー依頼。発行時の選択に紐づく
#[derive(Clone, Debug)]
pub struct ReviewTicket {
    path: String,
    content: String,
    generation: u64,
    epoch: u64,
}

impl ReviewTicket {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ToggleAction {
    /// 取得済みなので開閉だけした
    Toggled { expanded: bool },
    /// 未取得なので読み込みが必要
    Load(DirectoryTicket),
    /// ディレクトリではない
    Ignored,
}

pub struct RepoTreeNavigator {
    repo: RepoId,
    fetcher: Arc<dyn ContentFetcher>,
    options: NavigatorOptions,
    roots: Arc<Vec<TreeNode>>,
    view: ViewState,
    next_token: u64,
    // リポジトリを切り替えるたびに進む。古いリポジトリ宛ての応答を捨てるため
    epoch: u64,
    latest_load: HashMap<String, u64>,
    latest_read: u64,
    pending_loads: usize,
    pending_reads: usize,
    pending_reviews: usize,
    selection_generation: u64,
}

impl RepoTreeNavigator {
    /// ルートの一覧を取得してツリーを作る
    pub async fn open(
        repo: RepoId,
        fetcher: Arc<dyn ContentFetcher>,
        options: NavigatorOptions,
    ) -> Result<Self, NavigatorError> {
        info!("🌳 ツリー作成: {}", repo);
        let entries = fetcher.list(&repo, "").await.map_err(|e| {
            error!("❌ ルート一覧の取得に失敗: {} - {}", repo, e);
            NavigatorError::list("", e)
        })?;
        Ok(Self::with_roots(repo, fetcher, options, &entries))
    }

    /// 取得済みのルート一覧からツリーを作る
    pub fn with_roots(
        repo: RepoId,
        fetcher: Arc<dyn ContentFetcher>,
        options: NavigatorOptions,
        root_entries: &[Entry],
    ) -> Self {
        let roots = tree::build_children(&[], "", root_entries);
        RepoTreeNavigator {
            repo,
            fetcher,
            options,
            roots: Arc::new(roots),
            view: ViewState::default(),
            next_token: 0,
            epoch: 0,
            latest_load: HashMap::new(),
            latest_read: 0,
            pending_loads: 0,
            pending_reads: 0,
            pending_reviews: 0,
            selection_generation: 0,
        }
    }

    /// 別のリポジトリに切り替える。失敗したら今の状態を保つ
    pub async fn switch_repository(&mut self, repo: RepoId) -> Result<(), NavigatorError> {
        let fetcher = Arc::clone(&self.fetcher);
        let entries = match fetcher.list(&repo, "").await {
            Ok(entries) => entries,
            Err(e) => return Err(self.report(NavigatorError::list("", e))),
        };
        info!("🔁 リポジトリ切り替え: {} -> {}", self.repo, repo);
        self.repo = repo;
        self.roots = Arc::new(tree::build_children(&[], "", &entries));
        self.view = ViewState::default();
        self.epoch += 1;
        self.latest_load.clear();
        self.pending_loads = 0;
        self.pending_reads = 0;
        self.pending_reviews = 0;
        self.selection_generation += 1;
        Ok(())
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn roots(&self) -> &Arc<Vec<TreeNode>> {
        &self.roots
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        tree::find(&self.roots, path)
    }

    pub fn visible_rows(&self) -> Vec<(usize, &TreeNode)> {
        tree::visible_rows(&self.roots)
    }

    pub fn collapse_all(&mut self) {
        if let Some(roots) = tree::collapse_all(&self.roots) {
            self.roots = roots;
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn refresh_flags(&mut self) {
        self.view.is_loading_directory = self.pending_loads > 0;
        self.view.is_loading_file = self.pending_reads > 0;
        self.view.is_loading_review = self.pending_reviews > 0;
    }

    fn report(&mut self, err: NavigatorError) -> NavigatorError {
        error!("❌ {}", err);
        self.view.last_error = Some(err.clone());
        err
    }

    // ---- ディレクトリ ----

    /// 取得済みなら開閉し、未取得なら読み込みを発行する
    pub fn begin_toggle(&mut self, path: &str) -> ToggleAction {
        let Some(node) = self.find(path) else {
            debug!("存在しないパスの開閉を無視: {}", path);
            return ToggleAction::Ignored;
        };
        if !node.is_directory() {
            debug!("ディレクトリ以外の開閉を無視: {}", path);
            return ToggleAction::Ignored;
        }

        if node.is_loaded() {
            let expanded = !node.is_expanded();
            if let Some(roots) = tree::set_expanded(&self.roots, path, expanded) {
                self.roots = roots;
            }
            return ToggleAction::Toggled { expanded };
        }

        let token = self.issue_token();
        self.latest_load.insert(path.to_string(), token);
        self.pending_loads += 1;
        self.refresh_flags();
        ToggleAction::Load(DirectoryTicket {
            path: path.to_string(),
            token,
            epoch: self.epoch,
        })
    }

    /// 読み込み結果を適用する
    ///
    /// 失敗したら子は未取得のまま残り、再度の開閉で再試行できる。
    pub fn complete_load(
        &mut self,
        ticket: DirectoryTicket,
        result: Result<Vec<Entry>, FetchError>,
    ) -> Result<(), NavigatorError> {
        if ticket.epoch != self.epoch {
            debug!("以前のリポジトリ宛ての応答を破棄: {}", ticket.path);
            return Ok(());
        }
        self.pending_loads = self.pending_loads.saturating_sub(1);
        self.refresh_flags();

        let latest = self.latest_load.get(&ticket.path).copied();
        if latest == Some(ticket.token) {
            self.latest_load.remove(&ticket.path);
        } else if self.options.stale_policy == StalePolicy::DiscardSuperseded {
            debug!("古い読み込み結果を破棄: {}", ticket.path);
            return Ok(());
        }

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                // 先に別の読み込みが成功していれば、遅れて届いた失敗は表示しない
                if self.find(&ticket.path).is_some_and(|n| n.is_loaded()) {
                    debug!("取得済みのため失敗を無視: {} ({})", ticket.path, e);
                    return Ok(());
                }
                return Err(self.report(NavigatorError::list(&ticket.path, e)));
            }
        };

        let children = tree::build_children(&self.roots, &ticket.path, &entries);
        info!("📂 {} を展開 ({} 件)", ticket.path, children.len());
        match tree::load_children(&self.roots, &ticket.path, Arc::new(children)) {
            Some(roots) => self.roots = roots,
            None => debug!("取得済みまたは存在しないため適用しない: {}", ticket.path),
        }
        self.view.last_error = None;
        Ok(())
    }

    pub async fn toggle_directory(&mut self, path: &str) -> Result<(), NavigatorError> {
        match self.begin_toggle(path) {
            ToggleAction::Load(ticket) => {
                let fetcher = Arc::clone(&self.fetcher);
                let result = fetcher.list(&self.repo, ticket.path()).await;
                self.complete_load(ticket, result)
            }
            ToggleAction::Toggled { .. } | ToggleAction::Ignored => Ok(()),
        }
    }

    fn expand_loaded(&mut self, path: &str) {
        if let Some(roots) = tree::set_expanded(&self.roots, path, true) {
            self.roots = roots;
        }
    }

    /// 保存しておいた展開状態を復元する
    ///
    /// 浅い階層から順に、同じ階層の読み込みは並行して行う。
    /// 失敗したものはエラーとして集めて返し、残りは続行する。
    pub async fn expand_paths<S: AsRef<str>>(&mut self, paths: &[S]) -> Vec<NavigatorError> {
        let mut levels: Vec<Vec<String>> = Vec::new();
        for path in paths {
            let path = path.as_ref().trim_matches('/');
            if path.is_empty() {
                continue;
            }
            let depth = path.matches('/').count();
            if levels.len() <= depth {
                levels.resize(depth + 1, Vec::new());
            }
            if !levels[depth].iter().any(|p| p == path) {
                levels[depth].push(path.to_string());
            }
        }

        let mut errors = Vec::new();
        for level in levels {
            let mut tickets = Vec::new();
            for path in &level {
                let state = self.find(path).map(|n| (n.is_directory(), n.is_loaded()));
                match state {
                    Some((true, true)) => self.expand_loaded(path),
                    Some((true, false)) => {
                        if let ToggleAction::Load(ticket) = self.begin_toggle(path) {
                            tickets.push(ticket);
                        }
                    }
                    _ => debug!("展開できないパスを無視: {}", path),
                }
            }

            let fetcher = Arc::clone(&self.fetcher);
            let repo = self.repo.clone();
            let completions = stream::iter(tickets)
                .map(|ticket| {
                    let fetcher = Arc::clone(&fetcher);
                    let repo = repo.clone();
                    async move {
                        let result = fetcher.list(&repo, ticket.path()).await;
                        (ticket, result)
                    }
                })
                .buffer_unordered(self.options.load_concurrency.max(1))
                .collect::<Vec<_>>()
                .await;

            for (ticket, result) in completions {
                if let Err(e) = self.complete_load(ticket, result) {
                    errors.push(e);
                }
            }
        }

        if !errors.is_empty() {
            warn!("⚠️ 展開の復元で {} 件失敗", errors.len());
        }
        errors
    }

    // ---- ファイル ----

    /// ファイルの読み込みを発行する。ファイル以外は None
    pub fn begin_select(&mut self, path: &str) -> Option<FileTicket> {
        match self.find(path) {
            Some(node) if node.is_file() => {}
            _ => {
                debug!("ファイル以外の選択を無視: {}", path);
                return None;
            }
        }
        let token = self.issue_token();
        self.latest_read = token;
        self.pending_reads += 1;
        self.refresh_flags();
        Some(FileTicket {
            path: path.to_string(),
            token,
            epoch: self.epoch,
        })
    }

    /// デコード済みの内容を適用する
    ///
    /// 失敗時は直前の選択と内容をそのまま残す。
    pub fn complete_select(
        &mut self,
        ticket: FileTicket,
        result: Result<String, FetchError>,
    ) -> Result<(), NavigatorError> {
        if ticket.epoch != self.epoch {
            debug!("以前のリポジトリ宛ての応答を破棄: {}", ticket.path);
            return Ok(());
        }
        self.pending_reads = self.pending_reads.saturating_sub(1);
        self.refresh_flags();

        if self.options.stale_policy == StalePolicy::DiscardSuperseded
            && ticket.token != self.latest_read
        {
            debug!("古いファイル内容を破棄: {}", ticket.path);
            return Ok(());
        }

        let content = match result {
            Ok(content) => content,
            Err(e) => return Err(self.report(NavigatorError::read(&ticket.path, e))),
        };

        // 前の選択に紐づく結果はここで無効になる
        self.view.suggestions = None;
        self.selection_generation += 1;
        info!("📄 ファイル表示: {} ({} bytes)", ticket.path, content.len());
        self.view.file_content = Some(content);
        self.view.selected_path = Some(ticket.path);
        self.view.last_error = None;
        Ok(())
    }

    pub async fn select_file(&mut self, path: &str) -> Result<(), NavigatorError> {
        let Some(ticket) = self.begin_select(path) else {
            return Ok(());
        };
        let fetcher = Arc::clone(&self.fetcher);
        let result = fetch_text(fetcher.as_ref(), &self.repo, ticket.path()).await;
        self.complete_select(ticket, result)
    }

    // ---- AIレビュー ----

    pub fn begin_review(&mut self) -> Result<ReviewTicket, ReviewError> {
        let (Some(path), Some(content)) = (&self.view.selected_path, &self.view.file_content)
        else {
            return Err(ReviewError::NothingSelected);
        };
        let ticket = ReviewTicket {
            path: path.clone(),
            content: content.clone(),
            generation: self.selection_generation,
            epoch: self.epoch,
        };
        self.pending_reviews += 1;
        self.refresh_flags();
        Ok(ticket)
    }

    /// 発行時と同じ選択が続いているときだけ結果を適用する
    pub fn complete_review(
        &mut self,
        ticket: ReviewTicket,
        result: Result<Vec<Suggestion>, ReviewError>,
    ) -> Result<(), ReviewError> {
        if ticket.epoch != self.epoch {
            return Ok(());
        }
        self.pending_reviews = self.pending_reviews.saturating_sub(1);
        self.refresh_flags();

        if ticket.generation != self.selection_generation {
            debug!("選択が変わったためレビュー結果を破棄: {}", ticket.path);
            return Ok(());
        }

        let items = result.inspect_err(|e| error!("❌ レビュー失敗: {} - {}", ticket.path, e))?;
        info!("🤖 レビュー結果: {} ({} 件)", ticket.path, items.len());
        self.view.suggestions = Some(ReviewSuggestions {
            path: ticket.path,
            items,
            generated_at: chrono::Utc::now(),
        });
        Ok(())
    }

    pub async fn request_review(&mut self, reviewer: &dyn CodeReviewer) -> Result<(), ReviewError> {
        let ticket = self.begin_review()?;
        let result = reviewer
            .review(&self.repo, ticket.path(), ticket.content())
            .await;
        self.complete_review(ticket, result)
    }
}

/// ファイルを読み、最終的なテキストまで解決する
pub async fn fetch_text(
    fetcher: &dyn ContentFetcher,
    repo: &RepoId,
    path: &str,
) -> Result<String, FetchError> {
    match fetcher.read(repo, path).await? {
        FileContent::Inline { content, encoding } => decode_inline(&content, encoding.as_deref()),
        FileContent::Download { url } => {
            debug!("⬇️ ダウンロード参照を取得: {}", url);
            fetcher.download(&url).await
        }
    }
}

/// インライン内容をテキストにする
///
/// バイナリは対象外なので、UTF-8 として読めないバイトは置換文字になる。
pub fn decode_inline(content: &str, encoding: Option<&str>) -> Result<String, FetchError> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let decoded = BASE64
                .decode(compact)
                .map_err(|e| FetchError::Malformed(format!("Base64デコードエラー: {}", e)))?;
            Ok(String::from_utf8_lossy(&decoded).to_string())
        }
        None | Some("") | Some("none") | Some("utf-8") | Some("utf8") => Ok(content.to_string()),
        Some(other) => Err(FetchError::Malformed(format!(
            "未対応のエンコーディング: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_with_line_breaks() {
        let text = decode_inline("aGVs\nbG8g\nd29y\nbGQ=\n", Some("base64")).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn plain_encodings_pass_through() {
        assert_eq!(decode_inline("abc", None).unwrap(), "abc");
        assert_eq!(decode_inline("abc", Some("UTF-8")).unwrap(), "abc");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(decode_inline("abc", Some("rot13")).is_err());
        assert!(decode_inline("!!!", Some("base64")).is_err());
    }

    #[test]
    fn stale_policy_parses() {
        assert_eq!(
            "discard-superseded".parse::<StalePolicy>(),
            Ok(StalePolicy::DiscardSuperseded)
        );
        assert_eq!(
            "apply-in-completion-order".parse::<StalePolicy>(),
            Ok(StalePolicy::ApplyInCompletionOrder)
        );
        assert!("whatever".parse::<StalePolicy>().is_err());
    }
}

// codehive-browser - リポジトリのファイルツリーを遅延読み込みで閲覧する

pub mod config;
pub mod error;
pub mod fetcher;
pub mod llm;
pub mod navigator;
pub mod review;

pub use error::{FetchError, NavigatorError, ReviewError};
pub use fetcher::{ContentFetcher, Entry, EntryKind, FileContent, RepoId};
pub use navigator::{NavigatorOptions, RepoTreeNavigator, StalePolicy, TreeNode, ViewState};

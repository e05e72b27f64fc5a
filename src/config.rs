// 設定の読み込み
//
// 優先順位: コマンドライン引数 / 環境変数 > 設定ファイル > 既定値

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::fetcher::RepoId;
use crate::fetcher::github::DEFAULT_API_BASE;
use crate::navigator::{NavigatorOptions, StalePolicy};

// コマンドライン引数の定義
#[derive(Parser, Debug, Default)]
#[clap(
    name = "codehive-browser",
    about = "GitHubリポジトリのファイルツリーを遅延読み込みで閲覧するツール",
    version
)]
pub struct Args {
    /// 対象リポジトリ（owner/repo または GitHub の URL）
    #[clap(long, env = "CODEHIVE_REPO")]
    pub repo: Option<String>,

    /// GitHubの代わりにローカルのディレクトリを閲覧する
    #[clap(long, env = "CODEHIVE_LOCAL_DIR", conflicts_with = "repo")]
    pub local: Option<PathBuf>,

    /// ブランチ・タグ・コミット
    #[clap(long, env = "CODEHIVE_GIT_REF")]
    pub git_ref: Option<String>,

    /// GitHubのアクセストークン
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub APIのベースURL
    #[clap(long, env = "GITHUB_API_BASE")]
    pub api_base: Option<String>,

    /// Azure OpenAI のエンドポイント
    #[clap(long, env = "AZURE_OPENAI_ENDPOINT")]
    pub azure_endpoint: Option<String>,

    /// Azure OpenAI のAPIキー
    #[clap(long, env = "AZURE_OPENAI_KEY", hide_env_values = true)]
    pub azure_key: Option<String>,

    /// Azure OpenAI のデプロイ名
    #[clap(long, env = "AZURE_OPENAI_DEPLOYMENT")]
    pub azure_deployment: Option<String>,

    /// Azure OpenAI のAPIバージョン
    #[clap(long, env = "AZURE_OPENAI_API_VERSION")]
    pub azure_api_version: Option<String>,

    /// プロンプトテンプレートのディレクトリ
    #[clap(long, env = "CODEHIVE_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// 古い応答の扱い（apply-in-completion-order / discard-superseded）
    #[clap(long, env = "CODEHIVE_STALE_POLICY")]
    pub stale_policy: Option<StalePolicy>,

    /// 展開の復元時の同時読み込み数
    #[clap(long, env = "CODEHIVE_LOAD_CONCURRENCY")]
    pub load_concurrency: Option<usize>,

    /// JSON設定ファイル
    #[clap(long, env = "CODEHIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// ログレベル
    #[clap(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AzureConfig {
    pub endpoint: String,
    pub key: String,
    pub deployment: String,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// どこを閲覧するか
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    GitHub(RepoId),
    Local(PathBuf),
}

// 設定ファイル用構造体
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub repo: Option<String>,
    pub local: Option<PathBuf>,
    pub git_ref: Option<String>,
    pub github_token: Option<String>,
    pub api_base: Option<String>,
    pub azure: Option<AzureConfig>,
    pub template_dir: Option<PathBuf>,
    pub stale_policy: Option<StalePolicy>,
    pub load_concurrency: Option<usize>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("設定ファイル {} の読み込みに失敗", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("設定ファイル {} の解析に失敗", path.display()))
    }
}

/// 解決済みの設定
#[derive(Clone, Debug)]
pub struct Config {
    pub source: Source,
    pub git_ref: Option<String>,
    pub github_token: Option<String>,
    pub api_base: String,
    pub azure: Option<AzureConfig>,
    pub template_dir: Option<PathBuf>,
    pub navigator: NavigatorOptions,
    pub log_level: log::LevelFilter,
}

impl Config {
    pub fn resolve(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let source = match (args.repo, args.local) {
            (Some(repo), _) => Source::GitHub(parse_repo(&repo)?),
            (None, Some(dir)) => Source::Local(dir),
            (None, None) => match (file.repo, file.local) {
                (Some(repo), _) => Source::GitHub(parse_repo(&repo)?),
                (None, Some(dir)) => Source::Local(dir),
                (None, None) => bail!("--repo か --local のどちらかを指定してください"),
            },
        };

        // Azure の設定は3つ揃ったときだけ引数側を使う
        let azure = match (args.azure_endpoint, args.azure_key, args.azure_deployment) {
            (Some(endpoint), Some(key), Some(deployment)) => Some(AzureConfig {
                endpoint,
                key,
                deployment,
                api_version: None,
            }),
            _ => file.azure,
        }
        .map(|azure| AzureConfig {
            api_version: args.azure_api_version.or(azure.api_version),
            ..azure
        });

        let log_level = match args.log_level.or(file.log_level) {
            Some(level) => level
                .parse::<log::LevelFilter>()
                .map_err(|_| anyhow!("不正なログレベル: {}", level))?,
            None => log::LevelFilter::Info,
        };

        let defaults = NavigatorOptions::default();
        Ok(Config {
            source,
            git_ref: args.git_ref.or(file.git_ref),
            github_token: args.github_token.or(file.github_token),
            api_base: args
                .api_base
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            azure,
            template_dir: args.template_dir.or(file.template_dir),
            navigator: NavigatorOptions {
                stale_policy: args
                    .stale_policy
                    .or(file.stale_policy)
                    .unwrap_or(defaults.stale_policy),
                load_concurrency: args
                    .load_concurrency
                    .or(file.load_concurrency)
                    .unwrap_or(defaults.load_concurrency),
            },
            log_level,
        })
    }
}

fn parse_repo(input: &str) -> Result<RepoId> {
    RepoId::parse(input).ok_or_else(|| anyhow!("リポジトリの形式が不正です: {}", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["codehive-browser"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn args_override_file() {
        let file = FileConfig {
            repo: Some("file/repo".to_string()),
            git_ref: Some("develop".to_string()),
            stale_policy: Some(StalePolicy::DiscardSuperseded),
            ..FileConfig::default()
        };
        let config = Config::merge(
            Args {
                repo: Some("https://github.com/cli/cli".to_string()),
                ..Args::default()
            },
            file,
        )
        .unwrap();
        assert_eq!(config.source, Source::GitHub(RepoId::new("cli", "cli")));
        assert_eq!(config.git_ref.as_deref(), Some("develop"));
        assert_eq!(config.navigator.stale_policy, StalePolicy::DiscardSuperseded);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.log_level, log::LevelFilter::Info);
    }

    #[test]
    fn requires_a_source() {
        assert!(Config::merge(Args::default(), FileConfig::default()).is_err());
        let bad = Args {
            repo: Some("not a repo".to_string()),
            ..Args::default()
        };
        assert!(Config::merge(bad, FileConfig::default()).is_err());
    }

    #[test]
    fn partial_azure_args_fall_back_to_file() {
        let azure = AzureConfig {
            endpoint: "https://eastus.api.cognitive.microsoft.com".to_string(),
            key: "k".to_string(),
            deployment: "gpt-4".to_string(),
            api_version: Some("2024-02-01".to_string()),
        };
        let file = FileConfig {
            local: Some(PathBuf::from(".")),
            azure: Some(azure.clone()),
            ..FileConfig::default()
        };
        let config = Config::merge(
            Args {
                azure_key: Some("other".to_string()),
                ..Args::default()
            },
            file,
        )
        .unwrap();
        assert_eq!(config.azure, Some(azure));
        assert_eq!(config.source, Source::Local(PathBuf::from(".")));
    }

    #[test]
    fn api_version_arg_overrides_file() {
        let file = FileConfig {
            repo: Some("o/r".to_string()),
            ..FileConfig::default()
        };
        let config = Config::merge(
            args(&[
                "--azure-endpoint",
                "https://eastus.api.cognitive.microsoft.com",
                "--azure-key",
                "k",
                "--azure-deployment",
                "gpt-4",
                "--azure-api-version",
                "2024-06-01",
            ]),
            file,
        )
        .unwrap();
        let azure = config.azure.unwrap();
        assert_eq!(azure.deployment, "gpt-4");
        assert_eq!(azure.api_version.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codehive.json");
        std::fs::write(
            &path,
            r#"{
                "repo": "o/r",
                "stale_policy": "discard-superseded",
                "load_concurrency": 2,
                "log_level": "debug",
                "azure": {"endpoint": "https://e", "key": "k", "deployment": "d"}
            }"#,
        )
        .unwrap();
        let config = Config::merge(Args::default(), FileConfig::load(&path).unwrap()).unwrap();
        assert_eq!(config.navigator.load_concurrency, 2);
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert_eq!(config.azure.unwrap().api_version, None);
    }

    #[test]
    fn parses_cli_flags() {
        let parsed = args(&["--local", "/tmp/x", "--stale-policy", "discard-superseded"]);
        assert_eq!(parsed.local, Some(PathBuf::from("/tmp/x")));
        assert_eq!(parsed.stale_policy, Some(StalePolicy::DiscardSuperseded));
    }
}

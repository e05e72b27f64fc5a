// codehive-browser - リポジトリのファイルツリーを端末で閲覧する
//
// 標準入力からコマンドを読み、ナビゲーターの操作を呼び出す表示層。

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use log::{info, warn};
use simple_logger::SimpleLogger;
use tokio::io::{AsyncBufReadExt, BufReader};

use codehive_browser::RepoId;
use codehive_browser::config::{Args, Config, Source};
use codehive_browser::fetcher::{ContentFetcher, GitHubFetcher, LocalFetcher};
use codehive_browser::navigator::RepoTreeNavigator;
use codehive_browser::review::{AzureOpenAIReviewer, CodeReviewer, Endpoint};

const HELP: &str = "\
コマンド:
  tree                 ツリーを表示
  toggle <path>        ディレクトリを開閉
  open <path>          ファイルを表示
  review               表示中のファイルをAIレビュー
  expand <path>...     複数のディレクトリをまとめて展開
  collapse             すべて閉じる
  repo <owner/repo>    別のリポジトリに切り替え
  help                 このヘルプ
  quit                 終了";

fn print_tree(navigator: &RepoTreeNavigator) {
    for (depth, node) in navigator.visible_rows() {
        let marker = if node.is_directory() {
            if node.is_expanded() { "▾ " } else { "▸ " }
        } else {
            "  "
        };
        let selected = if navigator.view().is_selected(&node.path) {
            " ◀"
        } else {
            ""
        };
        println!("{}{}{}{}", "  ".repeat(depth), marker, node.name, selected);
    }
}

fn print_file(navigator: &RepoTreeNavigator) {
    let view = navigator.view();
    match (&view.selected_path, &view.file_content) {
        (Some(path), Some(content)) => {
            println!("--- {} ---", path);
            println!("{}", content);
        }
        _ => println!("ファイルを選択してください"),
    }
}

fn print_suggestions(navigator: &RepoTreeNavigator) {
    let Some(suggestions) = &navigator.view().suggestions else {
        println!("レビュー結果はありません");
        return;
    };
    println!(
        "--- {} のレビュー ({}) ---",
        suggestions.path,
        suggestions.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if suggestions.items.is_empty() {
        println!("指摘はありません");
    }
    for item in &suggestions.items {
        match item.line {
            Some(line) => println!("L{}: {}", line, item.message),
            None => println!("- {}", item.message),
        }
    }
}

fn build_reviewer(config: &Config) -> Option<Box<dyn CodeReviewer>> {
    let azure = config.azure.as_ref()?;
    let endpoint = Endpoint {
        name: "azure".to_string(),
        key: azure.key.clone(),
        endpoint: azure.endpoint.clone(),
    };
    let mut reviewer = AzureOpenAIReviewer::new(endpoint, azure.deployment.clone())
        .with_template_dir(config.template_dir.clone());
    if let Some(api_version) = &azure.api_version {
        reviewer = reviewer.with_api_version(api_version.clone());
    }
    Some(Box::new(reviewer))
}

// メイン関数
#[tokio::main]
async fn main() -> Result<()> {
    // .envファイルを読み込み
    dotenv().ok();

    let args = Args::parse();
    let config = Config::resolve(args)?;

    // ロガー初期化
    SimpleLogger::new()
        .with_level(config.log_level)
        .init()
        .map_err(|e| anyhow!("ロガー初期化に失敗: {}", e))?;

    let (repo, fetcher) = match &config.source {
        Source::GitHub(repo) => {
            let fetcher: Arc<dyn ContentFetcher> = Arc::new(GitHubFetcher::new(
                config.api_base.clone(),
                config.github_token.clone(),
                config.git_ref.clone(),
            )?);
            (repo.clone(), fetcher)
        }
        Source::Local(dir) => {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "local".to_string());
            let fetcher: Arc<dyn ContentFetcher> = Arc::new(LocalFetcher::new(dir.clone()));
            (RepoId::new("local", name), fetcher)
        }
    };

    let reviewer = build_reviewer(&config);
    if reviewer.is_none() {
        info!("Azure OpenAI が未設定のため review は使えません");
    }

    let mut navigator = RepoTreeNavigator::open(repo, fetcher, config.navigator.clone()).await?;
    print_tree(&navigator);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        // 失敗はナビゲーター内でログ済み。状態は直前のまま
        match (command, rest.as_slice()) {
            ("tree", _) => print_tree(&navigator),
            ("toggle", [path]) => {
                if navigator.toggle_directory(path).await.is_ok() {
                    print_tree(&navigator);
                }
            }
            ("open", [path]) => {
                if navigator.select_file(path).await.is_ok() {
                    print_file(&navigator);
                }
            }
            ("review", _) => match &reviewer {
                Some(reviewer) => match navigator.request_review(reviewer.as_ref()).await {
                    Ok(()) => print_suggestions(&navigator),
                    Err(e) => warn!("⚠️ {}", e),
                },
                None => println!("Azure OpenAI が未設定です"),
            },
            ("expand", paths) if !paths.is_empty() => {
                navigator.expand_paths(paths).await;
                print_tree(&navigator);
            }
            ("collapse", _) => {
                navigator.collapse_all();
                print_tree(&navigator);
            }
            ("repo", [id]) => match RepoId::parse(id) {
                Some(repo) => {
                    if navigator.switch_repository(repo).await.is_ok() {
                        print_tree(&navigator);
                    }
                }
                None => println!("リポジトリの形式が不正です: {}", id),
            },
            ("help", _) => println!("{}", HELP),
            ("quit", _) | ("exit", _) => break,
            _ => println!("不明なコマンドです。help を参照してください"),
        }
    }

    info!("✅ 終了");
    Ok(())
}

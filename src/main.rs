// src/main.rs

use anyhow::Context;
use clap::Parser;
use path_absolutize::Absolutize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use menu_route_guard::{
    CredentialStore, FileSource, MemoryCredentialStore, MemoryRouter,
    NavigationGuard, PermissionState, Requirement, RouterOutcome, Settings, StructureError,
    build_route_tree, payload::read_payload, telemetry,
};

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "menu-route-guard",
    version = "0.1.0",
    about = "メニュー/権限ペイロードからルートツリーを組み立て、ナビゲーションと権限を判定して JSON 出力する CLI ツール"
)]
struct Cli {
    /// ペイロード JSON ファイル、または JSON を含むディレクトリ
    #[arg(short = 'p', long = "payload", value_name = "PATH")]
    payload: PathBuf,

    /// 設定ファイル (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// 認証トークン (有無のみ判定に使う)
    #[arg(short = 't', long = "token", value_name = "TOKEN")]
    token: Option<String>,

    /// 判定するナビゲーション先 (複数指定可)
    #[arg(short = 'n', long = "navigate", value_name = "PATH")]
    navigate: Vec<String>,

    /// 判定する権限コード (複数指定可)
    #[arg(long = "check", value_name = "CODE")]
    check: Vec<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    payload: PathBuf,
    routes: &'a menu_route_guard::RouteTree,
    errors: &'a [StructureError],
    checks: Vec<Check>,
    navigations: Vec<Navigation>,
}

#[derive(Serialize)]
struct Check {
    code: String,
    allowed: bool,
}

#[derive(Serialize)]
struct Navigation {
    target: String,
    #[serde(flatten)]
    outcome: RouterOutcome,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("info");

    // 1) CLI 引数をパースし、ペイロードのパスを絶対パス化
    let cli = Cli::parse();
    let payload_path = cli.payload.absolutize()?.to_path_buf();
    let settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("設定 {path:?} の読み込み"))?,
        None => Settings::default(),
    };

    // 2) 事前にペイロードを検証し、構造エラーを表示用に集める
    let payload = read_payload(&payload_path)
        .with_context(|| format!("ペイロード {payload_path:?} の読み込み"))?;
    let preview = build_route_tree(&payload.menus, &settings.routes);
    tracing::info!(
        menus = payload.menus.len(),
        routes = preview.tree.len(),
        errors = preview.errors.len(),
        "ペイロードを解析しました"
    );

    // 3) セッション・ルーター・ガードを組み立てる
    let state = PermissionState::new(
        Arc::new(FileSource::new(&payload_path)),
        settings.routes.clone(),
    );
    let credentials = Arc::new(MemoryCredentialStore::default());
    if let Some(token) = cli.token {
        credentials.set(token);
    }
    let router = Arc::new(MemoryRouter::default());
    let guard = NavigationGuard::new(
        state.clone(),
        router.clone(),
        credentials,
        settings.guard.clone(),
    );
    guard.install(router.as_ref());

    // 4) ナビゲーションを順に判定
    let mut navigations = Vec::with_capacity(cli.navigate.len());
    for target in cli.navigate {
        let outcome = router.push(&target).await?;
        navigations.push(Navigation { target, outcome });
    }

    // 5) 権限コードの判定 (未ロードならここでロード)
    if let Err(err) = state.load().await {
        tracing::warn!(error = %err, "権限情報をロードできませんでした");
    }
    let checks = cli
        .check
        .into_iter()
        .map(|code| {
            let allowed = state.auth(&Requirement::Code(code.clone()));
            Check { code, allowed }
        })
        .collect();

    // 6) 結果を JSON 化して標準出力
    let report = Report {
        payload: payload_path,
        routes: &preview.tree,
        errors: &preview.errors,
        checks,
        navigations,
    };
    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");

    Ok(())
}

// src/error.rs
use crate::model::MenuId;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// メニューフォレストの構造エラー。該当サブツリーは除外され、ビルドは続行する
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureError {
    #[error("メニュー ID {id} が重複しています (後続の定義を除外)")]
    DuplicateId { id: MenuId },

    #[error("メニュー {id} の親 {parent} が存在しません (除外: {dropped:?})")]
    MissingParent {
        id: MenuId,
        parent: MenuId,
        dropped: Vec<MenuId>,
    },

    #[error("メニューの循環参照を検出しました: {cycle:?} (除外: {dropped:?})")]
    Cycle {
        cycle: Vec<MenuId>,
        dropped: Vec<MenuId>,
    },

    #[error("メニュー {id} は深さ {depth} で上限を超えています (除外: {dropped:?})")]
    TooDeep {
        id: MenuId,
        depth: usize,
        dropped: Vec<MenuId>,
    },

    #[error("メニュー {id} ({path}) には子もコンポーネントもありません")]
    MissingView { id: MenuId, path: String },

    #[error("メニュー {id} にルート名がありません")]
    MissingName { id: MenuId },

    #[error("ルート名 '{name}' が重複しています: メニュー {first} と {second} (後者を除外)")]
    DuplicateName {
        name: String,
        first: MenuId,
        second: MenuId,
    },
}

/// バックエンド協調者からの取得失敗
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("認証情報が拒否されました")]
    Unauthorized,
    #[error("バックエンドへの接続に失敗しました: {0}")]
    Transport(String),
    #[error("ペイロードが不正です: {0}")]
    Payload(String),
}

/// ロードハンドルを待つ全呼び出し元に共有される結果
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("権限情報の取得に失敗しました: {0}")]
    Fetch(String),
    #[error("ロード中にセッションが無効化されました")]
    Invalidated,
}

/// `auth()` に渡された要件の形式エラー。呼び出し元には常に拒否として返る
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("権限コードが空です")]
    EmptyCode,
    #[error("all_of の権限リストが空です")]
    EmptyAllOf,
    #[error("権限要件の形式が不正です: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("{target} からのリダイレクトが {hops} 回を超えました")]
    TooManyRedirects { target: String, hops: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイル {path:?} を読み込めません")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("設定ファイルの形式が不正です")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("ペイロード {path:?} を読み込めません")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ペイロード {path:?} の JSON が不正です")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ディレクトリ {0:?} に JSON ペイロードが見つかりませんでした")]
    Empty(PathBuf),
    #[error("ディレクトリの探索に失敗しました")]
    Walk(#[from] walkdir::Error),
}

impl From<PayloadError> for FetchError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Json { .. } => FetchError::Payload(err.to_string()),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

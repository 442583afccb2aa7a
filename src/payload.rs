// src/payload.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FetchError, PayloadError};
use crate::model::MenuNode;
use crate::state::MenuSource;

/// バックエンドから届く権限ペイロード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionPayload {
    /// アクセス可能なメニューノード (順序付き)
    #[serde(default)]
    pub menus: Vec<MenuNode>,

    /// 現在のユーザーに付与された権限コード
    #[serde(default, alias = "permissions")]
    pub codes: BTreeSet<String>,
}

/// メニュー配列だけのペイロードも受け付ける
#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Menus(Vec<MenuNode>),
    Full(PermissionPayload),
}

impl PermissionPayload {
    pub fn from_json(src: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<Wire>(src)? {
            Wire::Menus(menus) => PermissionPayload {
                menus,
                codes: BTreeSet::new(),
            },
            Wire::Full(payload) => payload,
        })
    }

    /// 別ペイロードのメニューを後ろに連結し、権限コードは和集合をとる
    pub fn merge(&mut self, other: PermissionPayload) {
        self.menus.extend(other.menus);
        self.codes.extend(other.codes);
    }
}

/// ディレクトリを再帰的に探索し、`.json` ファイルをパス順に集める
pub fn discover_payload_files(root: &Path) -> Result<Vec<PathBuf>, PayloadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// ファイルなら 1 件、ディレクトリなら配下の全 JSON をマージして読み込む
pub fn read_payload(path: &Path) -> Result<PermissionPayload, PayloadError> {
    if !path.is_dir() {
        return read_payload_file(path);
    }

    let files = discover_payload_files(path)?;
    if files.is_empty() {
        return Err(PayloadError::Empty(path.to_path_buf()));
    }
    let mut merged = PermissionPayload::default();
    for file in files {
        tracing::debug!(path = %file.display(), "ペイロードを読み込みます");
        merged.merge(read_payload_file(&file)?);
    }
    Ok(merged)
}

fn read_payload_file(path: &Path) -> Result<PermissionPayload, PayloadError> {
    let src = fs::read_to_string(path).map_err(|source| PayloadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    PermissionPayload::from_json(&src).map_err(|source| PayloadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// 固定ペイロードを返す取得元 (埋め込み・ウォームリロード用)
#[derive(Debug, Clone)]
pub struct StaticSource {
    payload: PermissionPayload,
}

impl StaticSource {
    pub fn new(payload: PermissionPayload) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl MenuSource for StaticSource {
    async fn fetch(&self) -> Result<PermissionPayload, FetchError> {
        Ok(self.payload.clone())
    }
}

/// ファイル/ディレクトリからペイロードを読む取得元。取得のたびに読み直す
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MenuSource for FileSource {
    async fn fetch(&self) -> Result<PermissionPayload, FetchError> {
        let root = self.root.clone();
        let read = tokio::task::spawn_blocking(move || read_payload(&root))
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(read?)
    }
}

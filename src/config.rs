// src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::builder::BuildOptions;
use crate::error::ConfigError;
use crate::model::normalize_path;

/// 設定ファイル全体
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub guard: GuardConfig,
    pub routes: BuildOptions,
}

/// ナビゲーションガードのリダイレクト先とホワイトリスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub login_path: String,
    pub forbidden_path: String,
    pub not_found_path: String,
    /// ログイン画面に元の遷移先を渡すクエリ名
    pub redirect_param: String,
    /// 認証チェックもロードも行わないパス
    pub whitelist: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            forbidden_path: "/403".to_string(),
            not_found_path: "/404".to_string(),
            redirect_param: "redirect".to_string(),
            whitelist: vec!["/login".to_string(), "/403".to_string(), "/404".to_string()],
        }
    }
}

impl GuardConfig {
    pub fn is_whitelisted(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.whitelist.iter().any(|entry| normalize_path(entry) == path)
    }
}

impl Settings {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }
}

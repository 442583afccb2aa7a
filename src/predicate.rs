// src/predicate.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::PredicateError;
use crate::state::global;

/// 権限要件
///
/// JSON 上の形: `"user:view"` / `["user:view", "user:edit"]` (いずれか) /
/// `{"all_of": ["user:view", "user:edit"]}` (すべて)。それ以外の形は受け付けない
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Requirement {
    Code(String),
    AnyOf(Vec<String>),
    AllOf { all_of: Vec<String> },
}

impl Requirement {
    pub fn any_of<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AnyOf(codes.into_iter().map(Into::into).collect())
    }

    pub fn all_of<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AllOf {
            all_of: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// テンプレート等から渡された任意の値を要件として解釈する
    pub fn from_value(value: &Value) -> Result<Self, PredicateError> {
        let shape = || PredicateError::Shape(value.to_string());
        let requirement = match value {
            Value::String(code) => Requirement::Code(code.clone()),
            Value::Array(items) => Requirement::AnyOf(code_list(items).ok_or_else(shape)?),
            Value::Object(fields) => Requirement::AllOf {
                all_of: all_of_field(fields).ok_or_else(shape)?,
            },
            _ => return Err(shape()),
        };
        requirement.validate()?;
        Ok(requirement)
    }

    pub fn validate(&self) -> Result<(), PredicateError> {
        match self {
            Requirement::Code(code) if code.is_empty() => Err(PredicateError::EmptyCode),
            Requirement::Code(_) => Ok(()),
            Requirement::AnyOf(codes) => {
                if codes.iter().any(String::is_empty) {
                    Err(PredicateError::EmptyCode)
                } else {
                    Ok(())
                }
            }
            Requirement::AllOf { all_of } if all_of.is_empty() => Err(PredicateError::EmptyAllOf),
            Requirement::AllOf { all_of } => {
                if all_of.iter().any(String::is_empty) {
                    Err(PredicateError::EmptyCode)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// 文字列だけからなる配列
fn code_list(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// `all_of` (または `allOf`) の 1 キーだけを持つオブジェクト
fn all_of_field(fields: &Map<String, Value>) -> Option<Vec<String>> {
    if fields.len() != 1 {
        return None;
    }
    let codes = fields.get("all_of").or_else(|| fields.get("allOf"))?;
    code_list(codes.as_array()?)
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Requirement::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for Requirement {
    fn from(code: &str) -> Self {
        Requirement::Code(code.to_string())
    }
}

impl From<String> for Requirement {
    fn from(code: String) -> Self {
        Requirement::Code(code)
    }
}

impl From<Vec<String>> for Requirement {
    fn from(codes: Vec<String>) -> Self {
        Requirement::AnyOf(codes)
    }
}

impl From<&BTreeSet<String>> for Requirement {
    fn from(codes: &BTreeSet<String>) -> Self {
        Requirement::AnyOf(codes.iter().cloned().collect())
    }
}

/// 権限コード集合に対して要件を評価する。形式不正な要件は常に拒否
pub fn evaluate(codes: &BTreeSet<String>, requirement: &Requirement) -> bool {
    if let Err(err) = requirement.validate() {
        tracing::debug!(error = %err, "不正な権限要件を拒否しました");
        return false;
    }
    match requirement {
        Requirement::Code(code) => codes.contains(code),
        Requirement::AnyOf(any) => any.iter().any(|code| codes.contains(code)),
        Requirement::AllOf { all_of } => all_of.iter().all(|code| codes.contains(code)),
    }
}

/// グローバルセッションの権限で要件を評価する。セッション未設定なら拒否
pub fn auth(requirement: &Requirement) -> bool {
    global().is_some_and(|state| evaluate(&state.snapshot().codes, requirement))
}

/// 形式未検証の値で `auth` を呼ぶ。解釈できない値は拒否
pub fn auth_value(value: &Value) -> bool {
    match Requirement::from_value(value) {
        Ok(requirement) => auth(&requirement),
        Err(err) => {
            tracing::debug!(error = %err, "不正な権限要件を拒否しました");
            false
        }
    }
}

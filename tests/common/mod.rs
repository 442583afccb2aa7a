#![allow(dead_code)]

use async_trait::async_trait;
use menu_route_guard::{FetchError, MenuNode, MenuSource, PermissionPayload};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// バックエンド形式のレコードから MenuNode を作る
pub fn menus(records: Value) -> Vec<MenuNode> {
    serde_json::from_value(records).expect("menu records")
}

pub fn admin_menus() -> Vec<MenuNode> {
    menus(json!([
        {"id": 1, "parent": null, "path": "/admin", "component": "layout/admin", "name": "Admin"},
        {"id": 2, "parent": 1, "path": "/admin/users", "component": "system/user/index",
         "name": "Users", "permission_codes": ["user:view"]},
        {"id": 3, "parent": null, "path": "/about", "component": "about", "name": "About",
         "meta": {"requires_auth": false}}
    ]))
}

/// 取得回数を数え、`open()` されるまで応答しない取得元
pub struct GatedSource {
    payload: PermissionPayload,
    calls: AtomicUsize,
    gate: Notify,
}

impl GatedSource {
    pub fn new(menus: Vec<MenuNode>, codes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            payload: PermissionPayload {
                menus,
                codes: codes.iter().map(|c| c.to_string()).collect(),
            },
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        })
    }

    pub fn open(&self) {
        self.gate.notify_waiters();
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MenuSource for GatedSource {
    async fn fetch(&self) -> Result<PermissionPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.payload.clone())
    }
}

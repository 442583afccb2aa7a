// src/state.rs
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

use crate::builder::{BuildOptions, build_route_tree};
use crate::error::{FetchError, LoadError, StructureError};
use crate::model::RouteTree;
use crate::payload::PermissionPayload;
use crate::predicate::{Requirement, evaluate};

/// メニュー/権限ペイロードを取得するバックエンド協調者
#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn fetch(&self) -> Result<PermissionPayload, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// ロード処理の共有ハンドル。同時に待つ呼び出し元は全員同じ結果を受け取る
pub type LoadHandle = Shared<BoxFuture<'static, Result<(), LoadError>>>;

/// ある時点の権限状態 (値として返す。内部の可変状態は公開しない)
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub codes: Arc<BTreeSet<String>>,
    pub tree: Arc<RouteTree>,
    /// 直近のビルドで除外したサブツリーの構造エラー
    pub errors: Arc<Vec<StructureError>>,
    /// 状態が変わるたびに増える
    pub version: u64,
}

impl Snapshot {
    fn empty(version: u64) -> Self {
        Self {
            phase: Phase::Unloaded,
            codes: Arc::default(),
            tree: Arc::default(),
            errors: Arc::default(),
            version,
        }
    }

    pub fn allows(&self, requirement: &Requirement) -> bool {
        evaluate(&self.codes, requirement)
    }
}

pub type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// 変更通知の購読。drop すると解除される
#[must_use = "drop するとすぐに購読が解除されます"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.remove(&self.id);
        }
    }
}

struct Cell {
    snapshot: Snapshot,
    /// invalidate のたびに増える。古い世代のロード結果は捨てる
    generation: u64,
    in_flight: Option<LoadHandle>,
}

struct Inner {
    source: Arc<dyn MenuSource>,
    options: BuildOptions,
    cell: Mutex<Cell>,
    listeners: Arc<Mutex<Listeners>>,
}

/// セッション単位の権限状態 (権限コード + ルートツリー + ライフサイクル)
///
/// 変更は `load()` / `reload()` / `invalidate()` による丸ごとの差し替えだけで、
/// 読み手に中途半端な状態は見えない。
#[derive(Clone)]
pub struct PermissionState {
    inner: Arc<Inner>,
}

impl PermissionState {
    pub fn new(source: Arc<dyn MenuSource>, options: BuildOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                options,
                cell: Mutex::new(Cell {
                    snapshot: Snapshot::empty(0),
                    generation: 0,
                    in_flight: None,
                }),
                listeners: Arc::default(),
            }),
        }
    }

    /// 未ロードならロードを開始する。ロード済みなら即座に完了するハンドルを、
    /// ロード中なら進行中のハンドルを返す
    pub fn load(&self) -> LoadHandle {
        self.start(false)
    }

    /// ロード済みでも取得し直す。完了までは現在の権限とツリーを保持する
    pub fn reload(&self) -> LoadHandle {
        self.start(true)
    }

    fn start(&self, force: bool) -> LoadHandle {
        let (handle, snapshot) = {
            let mut cell = self.inner.cell.lock();
            if let Some(handle) = &cell.in_flight {
                return handle.clone();
            }
            if cell.snapshot.phase == Phase::Loaded && !force {
                return future::ready(Ok(())).boxed().shared();
            }

            let handle = fetch_and_apply(
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.source),
                cell.generation,
            )
            .boxed()
            .shared();
            cell.in_flight = Some(handle.clone());
            cell.snapshot = Snapshot {
                phase: Phase::Loading,
                version: cell.snapshot.version + 1,
                ..cell.snapshot.clone()
            };
            (handle, cell.snapshot.clone())
        };

        info!(generation = self.generation(), "権限情報のロードを開始します");
        self.inner.notify(&snapshot);
        handle
    }

    /// ログアウト・ロール切り替え時に呼ぶ。権限とツリーを破棄して Unloaded に戻す
    ///
    /// ロード中に呼ばれた場合、そのロード結果は完了時に破棄される。
    pub fn invalidate(&self) {
        let snapshot = {
            let mut cell = self.inner.cell.lock();
            cell.generation += 1;
            cell.in_flight = None;
            cell.snapshot = Snapshot::empty(cell.snapshot.version + 1);
            cell.snapshot.clone()
        };
        info!("権限情報を破棄しました");
        self.inner.notify(&snapshot);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.cell.lock().snapshot.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.cell.lock().snapshot.phase
    }

    fn generation(&self) -> u64 {
        self.inner.cell.lock().generation
    }

    pub fn auth(&self, requirement: &Requirement) -> bool {
        self.snapshot().allows(requirement)
    }

    /// 状態が変わるたびに `listener` を呼ぶ
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }
}

impl std::fmt::Debug for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("PermissionState")
            .field("phase", &snapshot.phase)
            .field("codes", &snapshot.codes.len())
            .field("routes", &snapshot.tree.len())
            .finish()
    }
}

async fn fetch_and_apply(
    inner: Weak<Inner>,
    source: Arc<dyn MenuSource>,
    generation: u64,
) -> Result<(), LoadError> {
    let fetched = source.fetch().await;
    match inner.upgrade() {
        Some(inner) => inner.settle(generation, fetched),
        None => Err(LoadError::Invalidated),
    }
}

impl Inner {
    fn settle(
        &self,
        generation: u64,
        fetched: Result<PermissionPayload, FetchError>,
    ) -> Result<(), LoadError> {
        // ツリーの組み立てはロックの外で行う
        let built = fetched.map(|payload| {
            let output = build_route_tree(&payload.menus, &self.options);
            (payload.codes, output)
        });

        let (result, snapshot) = {
            let mut cell = self.cell.lock();
            if cell.generation != generation {
                debug!(generation, current = cell.generation, "無効化済みのロード結果を破棄します");
                return Err(LoadError::Invalidated);
            }
            cell.in_flight = None;
            let version = cell.snapshot.version + 1;
            let result = match built {
                Ok((codes, output)) => {
                    for err in &output.errors {
                        warn!(error = %err, "メニュー構造エラーのためサブツリーを除外しました");
                    }
                    info!(
                        routes = output.tree.len(),
                        codes = codes.len(),
                        errors = output.errors.len(),
                        "権限情報をロードしました"
                    );
                    cell.snapshot = Snapshot {
                        phase: Phase::Loaded,
                        codes: Arc::new(codes),
                        tree: Arc::new(output.tree),
                        errors: Arc::new(output.errors),
                        version,
                    };
                    Ok(())
                }
                Err(err) => {
                    warn!(error = %err, "権限情報のロードに失敗しました");
                    cell.snapshot = Snapshot {
                        phase: Phase::Failed,
                        version,
                        ..cell.snapshot.clone()
                    };
                    Err(LoadError::Fetch(err.to_string()))
                }
            };
            (result, cell.snapshot.clone())
        };

        self.notify(&snapshot);
        result
    }

    fn notify(&self, snapshot: &Snapshot) {
        // コールバック内で購読解除できるようロックを外してから呼ぶ
        let listeners: Vec<Listener> = self.listeners.lock().entries.values().cloned().collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

static GLOBAL: OnceLock<PermissionState> = OnceLock::new();

/// プロセス全体で共有するセッションを設定する。設定済みなら渡した状態を返す
pub fn install_global(state: PermissionState) -> Result<(), PermissionState> {
    GLOBAL.set(state)
}

pub fn global() -> Option<&'static PermissionState> {
    GLOBAL.get()
}

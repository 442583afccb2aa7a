// src/router.rs
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::error::RouterError;
use crate::guard::{Decision, NavigationOutcome};
use crate::model::{RouteRecord, RouteTree, normalize_path};
use crate::state::{PermissionState, Subscription};

/// ルートツリーを受け取り、パスから引けるようにするホストルーター側の窓口
pub trait RouteRegistry: Send + Sync {
    fn replace_routes(&self, tree: &RouteTree);
    fn resolve(&self, path: &str) -> Option<RouteRecord>;
}

/// 遷移前コールバック。遷移先パスを受け取り判定を返す
pub type BeforeEach = Arc<dyn Fn(String) -> BoxFuture<'static, NavigationOutcome> + Send + Sync>;

/// 遷移前フックを登録するホストルーター側の窓口
pub trait NavigationHook {
    fn before_each(&self, hook: BeforeEach);
}

/// 状態が変わるたびに `registry` のルートを丸ごと差し替える
pub fn mount_routes(state: &PermissionState, registry: Arc<dyn RouteRegistry>) -> Subscription {
    let target = Arc::clone(&registry);
    let subscription = state.subscribe(move |snapshot| target.replace_routes(&snapshot.tree));
    registry.replace_routes(&state.snapshot().tree);
    subscription
}

/// リダイレクトを辿る上限
const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouterOutcome {
    /// 最終的に表示した場所と、途中で受けたリダイレクト
    Navigated {
        location: String,
        redirects: Vec<Decision>,
    },
    Superseded,
}

/// メモリ上で動くホストルーター (CLI・テスト・埋め込み用)
#[derive(Default)]
pub struct MemoryRouter {
    routes: RwLock<RouteTree>,
    hooks: RwLock<Vec<BeforeEach>>,
    current: RwLock<Option<String>>,
}

impl MemoryRouter {
    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// フックを順に評価して遷移する。ガードやディレクトリのリダイレクトは辿る
    pub async fn push(&self, target: &str) -> Result<RouterOutcome, RouterError> {
        let mut location = target.to_string();
        let mut redirects = Vec::new();

        for _ in 0..=MAX_REDIRECTS {
            let hooks = self.hooks.read().clone();
            let mut outcome = NavigationOutcome::Decided(Decision::Allowed);
            for hook in hooks {
                outcome = hook(location.clone()).await;
                if outcome != NavigationOutcome::Decided(Decision::Allowed) {
                    break;
                }
            }

            let decision = match outcome {
                NavigationOutcome::Superseded => return Ok(RouterOutcome::Superseded),
                NavigationOutcome::Decided(decision) => decision,
            };
            if let Some(next) = decision.location() {
                location = next.to_string();
                redirects.push(decision);
                continue;
            }

            // 自前のビューを持たないディレクトリは子へ
            if let Some(next) = self.resolve(&location).and_then(|record| record.redirect) {
                location = next;
                continue;
            }

            *self.current.write() = Some(location.clone());
            return Ok(RouterOutcome::Navigated {
                location,
                redirects,
            });
        }

        Err(RouterError::TooManyRedirects {
            target: target.to_string(),
            hops: MAX_REDIRECTS,
        })
    }
}

impl RouteRegistry for MemoryRouter {
    fn replace_routes(&self, tree: &RouteTree) {
        *self.routes.write() = tree.clone();
    }

    fn resolve(&self, path: &str) -> Option<RouteRecord> {
        self.routes.read().find(&normalize_path(path)).cloned()
    }
}

impl NavigationHook for MemoryRouter {
    fn before_each(&self, hook: BeforeEach) {
        self.hooks.write().push(hook);
    }
}

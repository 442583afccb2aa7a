// src/guard.rs
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::GuardConfig;
use crate::error::LoadError;
use crate::predicate::Requirement;
use crate::router::{NavigationHook, RouteRegistry, mount_routes};
use crate::state::{Phase, PermissionState, Snapshot, Subscription};

/// 不透明なトークンの保管場所。ガードは有無しか見ない
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: String);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set(&self, token: String) {
        *self.token.write() = Some(token);
    }

    fn clear(&self) {
        *self.token.write() = None;
    }
}

/// 1 回のナビゲーションに対する判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    RedirectedLogin {
        location: String,
        /// 元の遷移先 (ログイン後に戻る先)
        redirect: Option<String>,
        /// 権限情報のロードに失敗した
        error: bool,
    },
    RedirectedForbidden {
        location: String,
    },
    RedirectedNotFound {
        location: String,
    },
}

impl Decision {
    /// リダイレクト先。許可なら None
    pub fn location(&self) -> Option<&str> {
        match self {
            Decision::Allowed => None,
            Decision::RedirectedLogin { location, .. }
            | Decision::RedirectedForbidden { location }
            | Decision::RedirectedNotFound { location } => Some(location.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationOutcome {
    Decided(Decision),
    /// より新しいナビゲーションに追い越されたため判定を適用しない
    Superseded,
}

impl NavigationOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            NavigationOutcome::Decided(decision) => Some(decision),
            NavigationOutcome::Superseded => None,
        }
    }
}

/// 遷移前に毎回評価されるゲート
///
/// Start → WaitingForPermissions → Deciding → {Allowed, Redirected*}。
/// 各試行には単調増加の通し番号を振り、ロード待ちの間に新しい試行が
/// 発行されていれば判定を捨てる。
pub struct NavigationGuard {
    state: PermissionState,
    registry: Arc<dyn RouteRegistry>,
    credentials: Arc<dyn CredentialStore>,
    config: GuardConfig,
    latest: AtomicU64,
    _routes: Subscription,
}

impl NavigationGuard {
    /// `registry` には以後の状態変化のたびにルートツリーが登録される
    pub fn new(
        state: PermissionState,
        registry: Arc<dyn RouteRegistry>,
        credentials: Arc<dyn CredentialStore>,
        config: GuardConfig,
    ) -> Arc<Self> {
        let routes = mount_routes(&state, Arc::clone(&registry));
        Arc::new(Self {
            state,
            registry,
            credentials,
            config,
            latest: AtomicU64::new(0),
            _routes: routes,
        })
    }

    /// ホストルーターの遷移前フックに登録する
    ///
    /// フックはガードを弱参照で持つ。ガードが破棄された後の遷移は取り消される。
    pub fn install(self: &Arc<Self>, hook: &dyn NavigationHook) {
        let guard = Arc::downgrade(self);
        hook.before_each(Arc::new(move |target: String| match guard.upgrade() {
            Some(guard) => guard.navigate(target),
            None => {
                debug!(%target, "ガードが破棄済みのため遷移を取り消します");
                future::ready(NavigationOutcome::Superseded).boxed()
            }
        }));
    }

    /// 通し番号は呼び出した時点で確定する
    pub fn navigate(self: &Arc<Self>, target: impl Into<String>) -> BoxFuture<'static, NavigationOutcome> {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = Arc::clone(self);
        let target = target.into();
        async move { guard.run(seq, target).await }.boxed()
    }

    async fn run(&self, seq: u64, target: String) -> NavigationOutcome {
        // 1) ホワイトリストは認証チェックもロードもしない
        if self.config.is_whitelisted(&target) {
            debug!(seq, %target, "ホワイトリストのため許可");
            return NavigationOutcome::Decided(Decision::Allowed);
        }

        // 2) 未ロード・ロード中なら共有ハンドルを待つ
        let mut load_failed = false;
        if matches!(self.state.phase(), Phase::Unloaded | Phase::Loading) {
            let mut result = self.state.load().await;
            if result == Err(LoadError::Invalidated) && self.has_credential() {
                // 待機中のロール切り替え: 新しいセッションのロードを一度だけ待ち直す
                result = self.state.load().await;
            }
            load_failed = result.is_err();
        }

        // 3) 待っている間に新しい試行が出ていれば何もしない
        let latest = self.latest.load(Ordering::SeqCst);
        if latest != seq {
            debug!(seq, latest, %target, "新しいナビゲーションに追い越されました");
            return NavigationOutcome::Superseded;
        }

        let snapshot = self.state.snapshot();
        let decision = self.decide(&target, &snapshot, load_failed);
        debug!(seq, %target, ?decision, "ナビゲーション判定");
        NavigationOutcome::Decided(decision)
    }

    fn decide(&self, target: &str, snapshot: &Snapshot, load_failed: bool) -> Decision {
        let load_failed = load_failed || snapshot.phase == Phase::Failed;
        let route = self.registry.resolve(target);

        // ツリーを一度も組めていないうちは未知のパスも認証必須とみなす
        let requires_auth = match &route {
            Some(record) => record.meta.requires_auth,
            None => snapshot.phase != Phase::Loaded,
        };
        if requires_auth && !self.has_credential() {
            return self.login(target, false);
        }
        if requires_auth && load_failed {
            return self.login(target, true);
        }

        let Some(route) = route else {
            return Decision::RedirectedNotFound {
                location: self.config.not_found_path.clone(),
            };
        };
        let codes = &route.meta.permission_codes;
        if !codes.is_empty() && !snapshot.allows(&Requirement::from(codes)) {
            return Decision::RedirectedForbidden {
                location: self.config.forbidden_path.clone(),
            };
        }
        Decision::Allowed
    }

    fn has_credential(&self) -> bool {
        self.credentials.get().is_some_and(|token| !token.is_empty())
    }

    fn login(&self, target: &str, error: bool) -> Decision {
        let mut location = format!(
            "{}?{}={}",
            self.config.login_path,
            self.config.redirect_param,
            urlencoding::encode(target)
        );
        if error {
            location.push_str("&error=permission_load");
        }
        Decision::RedirectedLogin {
            location,
            redirect: Some(target.to_string()),
            error,
        }
    }
}

// src/binder.rs
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use crate::predicate::Requirement;
use crate::state::{PermissionState, Snapshot, Subscription, global};

/// 要素バインダーが依存する購読インターフェース。UI フレームワークはこれにだけ結び付く
pub trait PermissionSource {
    fn evaluate(&self, requirement: &Requirement) -> bool;
    fn subscribe(&self, on_change: Box<dyn Fn(&Snapshot) + Send + Sync>) -> Subscription;
}

impl PermissionSource for PermissionState {
    fn evaluate(&self, requirement: &Requirement) -> bool {
        self.auth(requirement)
    }

    fn subscribe(&self, on_change: Box<dyn Fn(&Snapshot) + Send + Sync>) -> Subscription {
        PermissionState::subscribe(self, move |snapshot| on_change(snapshot))
    }
}

/// 権限で出し入れされる UI 要素
///
/// `unmount` は要素を描画ツリーから取り除くこと (非表示にするだけでは不十分)。
pub trait ElementHost: Send {
    fn mount(&mut self);
    fn unmount(&mut self);
}

struct Bound<H> {
    host: H,
    mounted: bool,
}

impl<H: ElementHost> Bound<H> {
    fn apply(&mut self, allowed: bool) {
        match (allowed, self.mounted) {
            (true, false) => self.host.mount(),
            (false, true) => self.host.unmount(),
            _ => return,
        }
        self.mounted = allowed;
    }
}

/// 要素の存在を権限要件に結び付ける。drop (detach) で購読を解放する
pub struct ElementBinding<H> {
    bound: Arc<Mutex<Bound<H>>>,
    _subscription: Subscription,
}

impl<H: ElementHost + 'static> ElementBinding<H> {
    /// 現在の権限で評価して要素を出し入れし、以後の変化を購読する
    pub fn attach(source: &dyn PermissionSource, requirement: Requirement, host: H) -> Self {
        let bound = Arc::new(Mutex::new(Bound {
            host,
            mounted: false,
        }));
        bound.lock().apply(source.evaluate(&requirement));

        let target = Arc::clone(&bound);
        let subscription = source.subscribe(Box::new(move |snapshot: &Snapshot| {
            let allowed = snapshot.allows(&requirement);
            target.lock().apply(allowed);
        }));

        Self {
            bound,
            _subscription: subscription,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.bound.lock().mounted
    }

    /// 購読を解放する。要素自体はそのまま
    pub fn detach(self) {}
}

/// 宣言的テンプレート向けの入口。グローバルセッションと未検証の要件値で要素を結び付ける
///
/// 要件が解釈できない場合やセッション未設定の場合、要素は描画されない。
pub fn directive<H: ElementHost + 'static>(value: &Value, host: H) -> Option<ElementBinding<H>> {
    let requirement = match Requirement::from_value(value) {
        Ok(requirement) => requirement,
        Err(err) => {
            tracing::debug!(error = %err, "不正な権限要件のため要素を描画しません");
            return None;
        }
    };
    let state = global()?;
    Some(ElementBinding::attach(state, requirement, host))
}

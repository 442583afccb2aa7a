// src/lib.rs
//! サーバーから届くメニュー/権限ペイロードを、ルートツリー・ナビゲーションガード・
//! 要素単位の表示ゲートに変換するクライアント側アクセス制御エンジン

pub mod binder;
pub mod builder;
pub mod config;
pub mod error;
pub mod guard;
pub mod model;
pub mod payload;
pub mod predicate;
pub mod router;
pub mod state;
pub mod telemetry;

pub use binder::{ElementBinding, ElementHost, PermissionSource, directive};
pub use builder::{BuildOptions, BuildOutput, DEFAULT_MAX_DEPTH, HiddenRoutePolicy, build_route_tree};
pub use config::{GuardConfig, Settings};
pub use error::{
    ConfigError, FetchError, LoadError, PayloadError, PredicateError, RouterError, StructureError,
};
pub use guard::{CredentialStore, Decision, MemoryCredentialStore, NavigationGuard, NavigationOutcome};
pub use model::{ComponentRef, MenuId, MenuMeta, MenuNode, RouteMeta, RouteRecord, RouteTree};
pub use payload::{FileSource, PermissionPayload, StaticSource};
pub use predicate::{Requirement, auth, auth_value};
pub use router::{BeforeEach, MemoryRouter, NavigationHook, RouteRegistry, RouterOutcome, mount_routes};
pub use state::{
    LoadHandle, MenuSource, PermissionState, Phase, Snapshot, Subscription, global, install_global,
};

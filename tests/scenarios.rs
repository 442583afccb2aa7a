mod common;

use common::{GatedSource, admin_menus, menus};
use menu_route_guard::{
    BuildOptions, Decision, GuardConfig, MemoryCredentialStore, MemoryRouter, MenuNode,
    NavigationGuard, NavigationOutcome, PermissionPayload, PermissionState, Phase, RouterOutcome,
    StaticSource, StructureError, build_route_tree,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn guard(state: PermissionState, token: Option<&str>) -> Arc<NavigationGuard> {
    let credentials = match token {
        Some(token) => MemoryCredentialStore::with_token(token),
        None => MemoryCredentialStore::default(),
    };
    NavigationGuard::new(
        state,
        Arc::new(MemoryRouter::default()),
        Arc::new(credentials),
        GuardConfig::default(),
    )
}

fn static_state(codes: &[&str]) -> PermissionState {
    PermissionState::new(
        Arc::new(StaticSource::new(PermissionPayload {
            menus: admin_menus(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
        })),
        BuildOptions::default(),
    )
}

#[test]
fn scenario_a_parent_child_paths() {
    let out = build_route_tree(
        &menus(json!([
            {"id": 1, "parent": null, "path": "/admin", "component": "a", "name": "A"},
            {"id": 2, "parent": 1, "path": "/admin/users", "component": "u", "name": "U"}
        ])),
        &BuildOptions::default(),
    );

    assert!(out.errors.is_empty());
    assert_eq!(
        out.tree.flatten(),
        vec![
            (None, "/admin".to_string()),
            (Some("/admin".to_string()), "/admin/users".to_string()),
        ]
    );
}

#[test]
fn scenario_b_cycle_is_reported_not_thrown() {
    let out = build_route_tree(
        &menus(json!([
            {"id": 1, "parent": 2, "path": "/one", "component": "a", "name": "One"},
            {"id": 2, "parent": 1, "path": "/two", "component": "b", "name": "Two"}
        ])),
        &BuildOptions::default(),
    );

    assert!(out.tree.is_empty());
    assert!(matches!(out.errors.as_slice(), [StructureError::Cycle { .. }]));
}

#[tokio::test]
async fn scenario_c_route_codes_gate_navigation() {
    let allowed = guard(static_state(&["user:view"]), Some("token"));
    assert_eq!(
        allowed.navigate("/admin/users").await,
        NavigationOutcome::Decided(Decision::Allowed)
    );

    let denied = guard(static_state(&[]), Some("token"));
    assert!(matches!(
        denied.navigate("/admin/users").await,
        NavigationOutcome::Decided(Decision::RedirectedForbidden { .. })
    ));
}

#[tokio::test]
async fn scenario_d_concurrent_navigations_share_one_fetch() {
    let source = GatedSource::new(admin_menus(), &["user:view"]);
    let state = PermissionState::new(source.clone(), BuildOptions::default());
    let guard = guard(state.clone(), Some("token"));

    let first = tokio::spawn(guard.navigate("/admin/users"));
    let second = tokio::spawn(guard.navigate("/about"));
    tokio::task::yield_now().await;
    assert_eq!(state.phase(), Phase::Loading);
    source.open();

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(source.calls(), 1);
    assert_eq!(first, NavigationOutcome::Superseded);
    assert_eq!(second, NavigationOutcome::Decided(Decision::Allowed));
    assert_eq!(state.phase(), Phase::Loaded);
}

#[tokio::test]
async fn scenario_e_absent_path_is_not_found_regardless_of_credentials() {
    for (token, codes) in [
        (Some("token"), &["user:view"][..]),
        (Some("token"), &[][..]),
        (None, &["user:view"][..]),
    ] {
        let guard = guard(static_state(codes), token);
        assert_eq!(
            guard.navigate("/does/not/exist").await,
            NavigationOutcome::Decided(Decision::RedirectedNotFound {
                location: "/404".to_string(),
            }),
            "token={token:?} codes={codes:?}"
        );
    }
}

#[tokio::test]
async fn many_load_calls_fetch_once() {
    let source = GatedSource::new(admin_menus(), &[]);
    let state = PermissionState::new(source.clone(), BuildOptions::default());

    let waiters: Vec<_> = (0..16).map(|_| tokio::spawn(state.load())).collect();
    tokio::task::yield_now().await;
    source.open();
    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn router_follows_guard_redirects_to_login() {
    let state = static_state(&["user:view"]);
    let router = Arc::new(MemoryRouter::default());
    let guard = NavigationGuard::new(
        state,
        router.clone(),
        Arc::new(MemoryCredentialStore::default()),
        GuardConfig::default(),
    );
    guard.install(router.as_ref());

    let outcome = router.push("/admin/users").await.unwrap();
    let RouterOutcome::Navigated { location, redirects } = outcome else {
        panic!("expected navigation");
    };
    assert_eq!(location, "/login?redirect=%2Fadmin%2Fusers");
    assert!(matches!(redirects.as_slice(), [Decision::RedirectedLogin { error: false, .. }]));
}

#[tokio::test]
async fn logout_redirects_back_to_login() {
    let state = static_state(&["user:view"]);
    let credentials = Arc::new(MemoryCredentialStore::with_token("token"));
    let guard = NavigationGuard::new(
        state.clone(),
        Arc::new(MemoryRouter::default()),
        credentials.clone(),
        GuardConfig::default(),
    );
    assert_eq!(guard.navigate("/admin/users").await.decision(), Some(&Decision::Allowed));

    menu_route_guard::CredentialStore::clear(credentials.as_ref());
    state.invalidate();
    assert!(state.snapshot().tree.is_empty());
    assert!(matches!(
        guard.navigate("/admin/users").await.decision(),
        Some(Decision::RedirectedLogin { .. })
    ));
}

/// 乱数的に作ったフォレストを組み立てて平坦化すると、入力と同じ親子関係に戻る
#[test]
fn tree_round_trip_preserves_parent_child_paths() {
    let mut seed: u64 = 0x5eed;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        seed >> 33
    };

    let mut nodes: Vec<MenuNode> = Vec::new();
    for id in 1..=60_i64 {
        let parent = if id == 1 || next() % 4 == 0 {
            None
        } else {
            Some((next() % (id as u64 - 1)) as i64 + 1)
        };
        nodes.push(MenuNode {
            id,
            parent,
            path: format!("/n{id}"),
            component: Some(format!("views/n{id}")),
            name: format!("N{id}"),
            meta: Default::default(),
            permission_codes: BTreeSet::new(),
            order: (next() % 5) as i64,
            status: true,
            is_catalog: false,
        });
    }
    // 循環を 1 つ混ぜる (除外される)
    nodes.push(serde_json::from_value(json!({"id": 100, "parent": 101, "path": "/c1", "component": "c", "name": "C1"})).unwrap());
    nodes.push(serde_json::from_value(json!({"id": 101, "parent": 100, "path": "/c2", "component": "c", "name": "C2"})).unwrap());

    let out = build_route_tree(&nodes, &BuildOptions::default());
    assert_eq!(out.errors.len(), 1);

    let path_of = |id: i64| format!("/n{id}");
    let expected: BTreeSet<(Option<String>, String)> = nodes
        .iter()
        .filter(|node| node.id <= 60)
        .map(|node| (node.parent.map(path_of), node.path.clone()))
        .collect();
    let actual: BTreeSet<(Option<String>, String)> = out.tree.flatten().into_iter().collect();
    assert_eq!(actual, expected);
}

#[test]
fn backend_shaped_records_build_a_catalog() {
    let out = build_route_tree(
        &menus(json!([
            {"id": 1, "parent": null, "web_path": "/system", "component": null,
             "component_name": "System", "is_catalog": true, "sort": 1},
            {"id": 2, "parent": 1, "web_path": "/system/menu", "component": "system/menu/index",
             "component_name": "Menu", "visible": false, "cache": true, "sort": null}
        ])),
        &BuildOptions::default(),
    );

    assert!(out.is_clean());
    let system = out.tree.find("/system").unwrap();
    assert_eq!(system.redirect.as_deref(), Some("/system/menu"));
    let menu = out.tree.find("/system/menu").unwrap();
    assert!(menu.meta.hidden);
    assert!(menu.meta.keep_alive);
    assert!(out.tree.menu()[0].children.is_empty());
}

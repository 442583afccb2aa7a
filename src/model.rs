// src/model.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// メニューノードの ID (バックエンドの主キー)
pub type MenuId = i64;

/// バックエンドから届くメニューノード 1 件分
///
/// `parent` でフォレストを構成する。ペイロードの記録順は `order` が同値のときの並び順として使う。
/// 受信時は [`MenuRecord`] の形で読み、トップレベルの表示フラグを `meta` に畳み込む。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MenuRecord")]
pub struct MenuNode {
    pub id: MenuId,

    /// 親ノードの ID。`None` ならルート
    pub parent: Option<MenuId>,

    /// ルートのパス (例: "/admin/users")。`/` で始まらなければ親のパスからの相対パス
    pub path: String,

    /// 遅延ロードされるビューへの参照 (例: "system/user/index")
    pub component: Option<String>,

    /// ルート名 (ツリー全体で一意)
    pub name: String,

    pub meta: MenuMeta,

    /// このルートに入るために必要な権限コード
    pub permission_codes: BTreeSet<String>,

    /// 表示順 (昇順)
    pub order: i64,

    /// `false` のメニューは無効化されており、配下ごとツリーに載らない
    pub status: bool,

    /// ディレクトリ。コンポーネントを持たず、最初の子へリダイレクトする
    pub is_catalog: bool,
}

impl MenuNode {
    /// 空文字列のコンポーネント参照は「ビューなし」とみなす。ディレクトリは常にビューなし
    pub fn view(&self) -> Option<&str> {
        if self.is_catalog {
            return None;
        }
        self.component.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// 受信形式のメニューレコード
///
/// バックエンドはキャッシュ・外部リンク・表示有無などをトップレベルに置くことがある。
/// トップレベルの値があれば `meta` 内の値より優先する。
#[derive(Debug, Deserialize)]
struct MenuRecord {
    id: MenuId,
    #[serde(default, alias = "parent_id")]
    parent: Option<MenuId>,
    #[serde(default, alias = "web_path")]
    path: Option<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default, alias = "component_name")]
    name: Option<String>,
    #[serde(default)]
    meta: MenuMeta,
    #[serde(default)]
    permission_codes: BTreeSet<String>,
    #[serde(default, alias = "sort")]
    order: Option<i64>,
    #[serde(default = "default_true")]
    status: bool,
    #[serde(default)]
    is_catalog: bool,
    /// サイドバーに表示するか (hidden の逆)
    #[serde(default)]
    visible: Option<bool>,
    #[serde(default)]
    cache: Option<bool>,
    #[serde(default)]
    is_link: Option<bool>,
    #[serde(default)]
    link_url: Option<String>,
    #[serde(default)]
    is_iframe: Option<bool>,
    #[serde(default)]
    is_affix: Option<bool>,
}

impl From<MenuRecord> for MenuNode {
    fn from(record: MenuRecord) -> Self {
        let mut meta = record.meta;
        if let Some(visible) = record.visible {
            meta.hidden = !visible;
        }
        if let Some(cache) = record.cache {
            meta.keep_alive = cache;
        }
        match record.is_link {
            // 外部リンクでないと明示されたら URL は使わない
            Some(false) => meta.link = None,
            _ => {
                if let Some(url) = record.link_url.filter(|url| !url.trim().is_empty()) {
                    meta.link = Some(url);
                }
            }
        }
        if let Some(iframe) = record.is_iframe {
            meta.iframe = iframe;
        }
        if let Some(affix) = record.is_affix {
            meta.affix = affix;
        }

        Self {
            id: record.id,
            parent: record.parent,
            path: record.path.unwrap_or_default(),
            component: record.component,
            name: record.name.unwrap_or_default(),
            meta,
            permission_codes: record.permission_codes,
            order: record.order.unwrap_or_default(),
            status: record.status,
            is_catalog: record.is_catalog,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuMeta {
    pub title: String,
    pub icon: Option<String>,
    /// サイドバーに表示しない
    pub hidden: bool,
    /// ページキャッシュを有効にする
    #[serde(alias = "cache")]
    pub keep_alive: bool,
    pub requires_auth: bool,
    /// hidden と併用したとき、直接パス指定でも到達させない
    pub unreachable: bool,
    /// 外部リンク URL
    #[serde(alias = "link_url")]
    pub link: Option<String>,
    /// フレーム外表示
    #[serde(alias = "is_iframe")]
    pub iframe: bool,
    /// タブバーに固定
    #[serde(alias = "is_affix")]
    pub affix: bool,
}

impl Default for MenuMeta {
    fn default() -> Self {
        Self {
            title: String::new(),
            icon: None,
            hidden: false,
            keep_alive: false,
            requires_auth: true,
            unreachable: false,
            link: None,
            iframe: false,
            affix: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 遅延ロードされるビューへの参照。ホストルーターが解決する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRef(pub String);

impl ComponentRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// RouteRecord に写し取られるメタ情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMeta {
    pub menu_id: MenuId,
    pub title: String,
    pub icon: Option<String>,
    pub hidden: bool,
    pub keep_alive: bool,
    pub requires_auth: bool,
    pub permission_codes: BTreeSet<String>,
    pub link: Option<String>,
    pub iframe: bool,
    pub affix: bool,
}

impl RouteMeta {
    pub fn from_node(node: &MenuNode) -> Self {
        Self {
            menu_id: node.id,
            title: node.meta.title.clone(),
            icon: node.meta.icon.clone(),
            hidden: node.meta.hidden,
            keep_alive: node.meta.keep_alive,
            requires_auth: node.meta.requires_auth,
            permission_codes: node.permission_codes.clone(),
            link: node.meta.link.clone(),
            iframe: node.meta.iframe,
            affix: node.meta.affix,
        }
    }
}

/// 到達可能な MenuNode 1 件から生成されるルート定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// 親パスを解決済みの完全なパス
    pub path: String,

    /// ツリー全体で一意なルート名
    pub name: String,

    pub component: Option<ComponentRef>,

    /// 自前のビューを持たないディレクトリノードのリダイレクト先
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    pub meta: RouteMeta,

    /// 子ルート (order 昇順)
    #[serde(default)]
    pub children: Vec<RouteRecord>,
}

/// ルートの順序付き列。PermissionState が丸ごと差し替える
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTree {
    routes: Vec<RouteRecord>,
}

impl RouteTree {
    pub fn new(routes: Vec<RouteRecord>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteRecord] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 前順 (親 → 子) で全レコードを辿る
    pub fn iter(&self) -> Records<'_> {
        Records {
            stack: self.routes.iter().rev().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// パスに一致するレコードを探す。完全一致を優先し、なければ `:param` セグメントで照合する
    pub fn find(&self, path: &str) -> Option<&RouteRecord> {
        let path = normalize_path(path);
        self.iter()
            .find(|record| record.path == path)
            .or_else(|| self.iter().find(|record| path_matches(&record.path, &path)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&RouteRecord> {
        self.iter().find(|record| record.name == name)
    }

    /// (親パス, パス) の組に平坦化する
    pub fn flatten(&self) -> Vec<(Option<String>, String)> {
        fn walk(records: &[RouteRecord], parent: Option<&str>, out: &mut Vec<(Option<String>, String)>) {
            for record in records {
                out.push((parent.map(str::to_string), record.path.clone()));
                walk(&record.children, Some(&record.path), out);
            }
        }

        let mut out = Vec::new();
        walk(&self.routes, None, &mut out);
        out
    }

    /// サイドバー描画用: hidden なレコードを配下ごと除いたツリー
    pub fn menu(&self) -> Vec<RouteRecord> {
        fn visible(records: &[RouteRecord]) -> Vec<RouteRecord> {
            records
                .iter()
                .filter(|record| !record.meta.hidden)
                .map(|record| RouteRecord {
                    children: visible(&record.children),
                    ..record.clone()
                })
                .collect()
        }

        visible(&self.routes)
    }
}

pub struct Records<'a> {
    stack: Vec<&'a RouteRecord>,
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a RouteRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.stack.pop()?;
        self.stack.extend(record.children.iter().rev());
        Some(record)
    }
}

/// クエリ・フラグメント・末尾の `/` を取り除き、先頭に `/` を付けたパスにする
pub fn normalize_path(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let trimmed = raw[..end].trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// 子ノードのパスを親の完全パスに対して解決する
pub fn join_path(parent: Option<&str>, path: &str) -> String {
    match parent {
        Some(base) if !path.starts_with('/') => {
            normalize_path(&format!("{}/{}", base.trim_end_matches('/'), path))
        }
        _ => normalize_path(path),
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if !pattern.contains("/:") {
        return false;
    }
    let mut expected = pattern.split('/');
    let mut actual = path.split('/');
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return true,
            (Some(e), Some(a)) if e.starts_with(':') && !a.is_empty() => continue,
            (Some(e), Some(a)) if e == a => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, name: &str, children: Vec<RouteRecord>) -> RouteRecord {
        RouteRecord {
            path: path.to_string(),
            name: name.to_string(),
            component: Some(ComponentRef(format!("views{path}"))),
            redirect: None,
            meta: RouteMeta::from_node(&MenuNode {
                id: 0,
                parent: None,
                path: path.to_string(),
                component: None,
                name: name.to_string(),
                meta: MenuMeta::default(),
                permission_codes: BTreeSet::new(),
                order: 0,
                status: true,
                is_catalog: false,
            }),
            children,
        }
    }

    #[test]
    fn normalize_strips_query_and_trailing_slash() {
        assert_eq!(normalize_path("/admin/users/?page=2"), "/admin/users");
        assert_eq!(normalize_path("admin#top"), "/admin");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn join_resolves_relative_children() {
        assert_eq!(join_path(Some("/admin"), "users"), "/admin/users");
        assert_eq!(join_path(Some("/admin"), "/other"), "/other");
        assert_eq!(join_path(None, "root"), "/root");
    }

    #[test]
    fn find_prefers_exact_over_pattern() {
        let tree = RouteTree::new(vec![record(
            "/user",
            "User",
            vec![
                record("/user/:id", "UserDetail", vec![]),
                record("/user/new", "UserNew", vec![]),
            ],
        )]);

        assert_eq!(tree.find("/user/new").map(|r| r.name.as_str()), Some("UserNew"));
        assert_eq!(tree.find("/user/42?tab=1").map(|r| r.name.as_str()), Some("UserDetail"));
        assert!(tree.find("/user/42/edit").is_none());
        assert!(tree.find("/missing").is_none());
    }

    #[test]
    fn iter_is_preorder_and_flatten_keeps_parents() {
        let tree = RouteTree::new(vec![
            record("/a", "A", vec![record("/a/b", "B", vec![])]),
            record("/c", "C", vec![]),
        ]);

        let names: Vec<_> = tree.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(
            tree.flatten(),
            vec![
                (None, "/a".to_string()),
                (Some("/a".to_string()), "/a/b".to_string()),
                (None, "/c".to_string()),
            ]
        );
    }

    #[test]
    fn menu_drops_hidden_subtrees() {
        let mut hidden = record("/a/secret", "Secret", vec![record("/a/secret/x", "X", vec![])]);
        hidden.meta.hidden = true;
        let tree = RouteTree::new(vec![record("/a", "A", vec![hidden, record("/a/b", "B", vec![])])]);

        let menu = tree.menu();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].children.len(), 1);
        assert_eq!(menu[0].children[0].name, "B");
        // 直接パスでは引き続き到達できる
        assert!(tree.find("/a/secret/x").is_some());
    }

    #[test]
    fn menu_node_accepts_backend_aliases() {
        let node: MenuNode = serde_json::from_value(serde_json::json!({
            "id": 3,
            "parent_id": 1,
            "web_path": "/admin/users",
            "component": "system/user/index",
            "component_name": "UserList",
            "sort": 2,
            "meta": { "title": "Users", "cache": true, "link_url": null }
        }))
        .unwrap();

        assert_eq!(node.parent, Some(1));
        assert_eq!(node.path, "/admin/users");
        assert_eq!(node.name, "UserList");
        assert_eq!(node.order, 2);
        assert!(node.status);
        assert!(node.meta.keep_alive);
        assert!(node.meta.requires_auth);
    }

    #[test]
    fn top_level_display_flags_fold_into_meta() {
        let node: MenuNode = serde_json::from_value(serde_json::json!({
            "id": 9,
            "parent": null,
            "web_path": "/docs",
            "component": null,
            "component_name": "Docs",
            "sort": null,
            "visible": false,
            "cache": true,
            "is_link": true,
            "link_url": "https://example.com/docs",
            "is_iframe": true,
            "is_affix": true,
            "meta": { "cache": false, "affix": false }
        }))
        .unwrap();

        assert!(node.meta.hidden);
        assert!(node.meta.keep_alive);
        assert_eq!(node.meta.link.as_deref(), Some("https://example.com/docs"));
        assert!(node.meta.iframe);
        assert!(node.meta.affix);
        assert_eq!(node.order, 0);
        assert!(!node.is_catalog);
    }

    #[test]
    fn link_url_is_ignored_unless_marked_as_link() {
        let node: MenuNode = serde_json::from_value(serde_json::json!({
            "id": 1,
            "web_path": "/a",
            "component_name": "A",
            "is_link": false,
            "link_url": "https://example.com",
            "visible": true
        }))
        .unwrap();

        assert!(node.meta.link.is_none());
        assert!(!node.meta.hidden);
    }

    #[test]
    fn catalog_flag_hides_the_component() {
        let node: MenuNode = serde_json::from_value(serde_json::json!({
            "id": 1,
            "web_path": "/system",
            "component": "layout/index",
            "component_name": "System",
            "is_catalog": true
        }))
        .unwrap();

        assert!(node.is_catalog);
        assert!(node.view().is_none());
    }

    #[test]
    fn serialized_node_reads_back() {
        let node: MenuNode = serde_json::from_value(serde_json::json!({
            "id": 4,
            "parent": 1,
            "path": "users",
            "component": "system/user/index",
            "name": "Users",
            "permission_codes": ["user:view"],
            "is_catalog": false
        }))
        .unwrap();

        let back: MenuNode = serde_json::from_value(serde_json::to_value(&node).unwrap()).unwrap();
        assert_eq!(back, node);
    }
}

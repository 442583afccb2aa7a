// src/builder.rs
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::StructureError;
use crate::model::{
    ComponentRef, MenuId, MenuMeta, MenuNode, RouteMeta, RouteRecord, RouteTree, join_path,
};

/// hidden なメニューを直接パス指定で到達可能にするかどうか
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HiddenRoutePolicy {
    /// hidden でも出力する。ただし `meta.unreachable` が立っていれば出力しない
    #[default]
    FollowMeta,
    /// hidden なメニューはすべて出力する
    Reachable,
    /// hidden なメニューは配下ごと出力しない
    Excluded,
}

impl HiddenRoutePolicy {
    fn emits(self, meta: &MenuMeta) -> bool {
        if !meta.hidden {
            return true;
        }
        match self {
            HiddenRoutePolicy::FollowMeta => !meta.unreachable,
            HiddenRoutePolicy::Reachable => true,
            HiddenRoutePolicy::Excluded => false,
        }
    }
}

/// 既定のネスト上限
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// 設定で指定できるネスト上限の最大値
pub const MAX_DEPTH_CEILING: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub hidden: HiddenRoutePolicy,
    /// ルートから数えた最大の深さ。超えたサブツリーは除外する
    pub max_depth: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            hidden: HiddenRoutePolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BuildOptions {
    fn depth_limit(&self) -> usize {
        self.max_depth.clamp(1, MAX_DEPTH_CEILING)
    }
}

/// ビルド結果: (部分的な) ルートツリーと、除外したサブツリーの構造エラー
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub tree: RouteTree,
    pub errors: Vec<StructureError>,
}

impl BuildOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// MenuNode のフォレストから RouteTree を組み立てる
///
/// 構造エラーは例外にせず、該当サブツリーを除外したうえで `errors` に集める。
/// 兄弟ノードのビルドはそのまま続行する。
pub fn build_route_tree(nodes: &[MenuNode], options: &BuildOptions) -> BuildOutput {
    let mut builder = Builder::index(nodes, options);

    // 1) ルート (parent = None) から order 昇順で再帰的に変換
    let roots = builder.children_of(None);
    let mut stack = Vec::new();
    let mut routes = Vec::new();
    for root in roots {
        if let Some(record) = builder.convert(root, None, &mut stack) {
            routes.push(record);
        }
    }

    // 2) ルートから辿れなかったノードを分類 (親なし・循環)
    builder.classify_unreached();

    // 3) ルート名の重複は最後にまとめて報告する
    let mut errors = builder.errors;
    errors.extend(builder.name_errors);
    BuildOutput {
        tree: RouteTree::new(routes),
        errors,
    }
}

struct Builder<'a> {
    options: &'a BuildOptions,
    /// ペイロード順 (重複 ID 除去済み)
    ordered: Vec<&'a MenuNode>,
    by_id: HashMap<MenuId, &'a MenuNode>,
    children: HashMap<Option<MenuId>, Vec<&'a MenuNode>>,
    visited: HashSet<MenuId>,
    /// 前順で最初に現れたルート名とそのメニュー ID
    names: HashMap<String, MenuId>,
    errors: Vec<StructureError>,
    name_errors: Vec<StructureError>,
}

impl<'a> Builder<'a> {
    fn index(nodes: &'a [MenuNode], options: &'a BuildOptions) -> Self {
        let mut errors = Vec::new();
        let mut ordered = Vec::with_capacity(nodes.len());
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if by_id.contains_key(&node.id) {
                errors.push(StructureError::DuplicateId { id: node.id });
                continue;
            }
            by_id.insert(node.id, node);
            ordered.push(node);
        }

        let mut children: HashMap<Option<MenuId>, Vec<&MenuNode>> = HashMap::new();
        for node in ordered.iter().copied() {
            children.entry(node.parent).or_default().push(node);
        }
        // sort_by_key は安定ソートなので同順位はペイロード順のまま
        for siblings in children.values_mut() {
            siblings.sort_by_key(|node| node.order);
        }

        Self {
            options,
            ordered,
            by_id,
            children,
            visited: HashSet::new(),
            names: HashMap::new(),
            errors,
            name_errors: Vec::new(),
        }
    }

    fn children_of(&self, parent: Option<MenuId>) -> Vec<&'a MenuNode> {
        self.children.get(&parent).cloned().unwrap_or_default()
    }

    fn convert(
        &mut self,
        node: &'a MenuNode,
        parent_path: Option<&str>,
        stack: &mut Vec<MenuId>,
    ) -> Option<RouteRecord> {
        // 現在の経路に同じ ID が再登場したら循環
        if let Some(start) = stack.iter().position(|id| *id == node.id) {
            let dropped = self.subtree_of(&[node.id]);
            self.visited.extend(dropped.iter().copied());
            self.errors.push(StructureError::Cycle {
                cycle: stack[start..].to_vec(),
                dropped,
            });
            return None;
        }

        // 無効化メニュー・出力しない hidden メニューはエラーにせず配下ごと外す
        if !node.status || !self.options.hidden.emits(&node.meta) {
            let skipped = self.subtree_of(&[node.id]);
            self.visited.extend(skipped);
            return None;
        }

        // 再帰の深さはここで打ち切る
        let depth = stack.len() + 1;
        if depth > self.options.depth_limit() {
            let dropped = self.subtree_of(&[node.id]);
            self.visited.extend(dropped.iter().copied());
            self.errors.push(StructureError::TooDeep {
                id: node.id,
                depth,
                dropped,
            });
            return None;
        }

        self.visited.insert(node.id);
        let name = node.name.trim();
        if name.is_empty() {
            let skipped = self.subtree_of(&[node.id]);
            self.visited.extend(skipped);
            self.errors.push(StructureError::MissingName { id: node.id });
            return None;
        }

        // 前順で先に名前を取ったレコードを残し、後から来た方を配下ごと外す
        if let Some(first) = self.names.get(name) {
            let skipped = self.subtree_of(&[node.id]);
            self.visited.extend(skipped);
            self.name_errors.push(StructureError::DuplicateName {
                name: name.to_string(),
                first: *first,
                second: node.id,
            });
            return None;
        }
        self.names.insert(name.to_string(), node.id);

        let path = join_path(parent_path, &node.path);
        stack.push(node.id);
        let mut children = Vec::new();
        for child in self.children_of(Some(node.id)) {
            if let Some(record) = self.convert(child, Some(&path), stack) {
                children.push(record);
            }
        }
        stack.pop();

        // リダイレクトは除外を済ませた後の子から決める
        let component = node.view().map(|view| ComponentRef(view.to_string()));
        let has_link = node.meta.link.as_deref().is_some_and(|link| !link.is_empty());
        let redirect = if component.is_none() && !has_link {
            // 自前のビューがないディレクトリは最初の非 hidden な子へ
            let first = children
                .iter()
                .find(|child| !child.meta.hidden)
                .or_else(|| children.first());
            match first {
                Some(child) => Some(child.path.clone()),
                None => {
                    // 除外されたレコードの名前は後続に譲る
                    self.names.remove(name);
                    self.errors.push(StructureError::MissingView { id: node.id, path });
                    return None;
                }
            }
        } else {
            None
        };

        Some(RouteRecord {
            path,
            name: name.to_string(),
            component,
            redirect,
            meta: RouteMeta::from_node(node),
            children,
        })
    }

    /// ルートから辿れなかったノードを、親の欠落か循環かに分けて報告する
    fn classify_unreached(&mut self) {
        for node in self.ordered.clone() {
            if self.visited.contains(&node.id) {
                continue;
            }

            let mut chain: Vec<MenuId> = Vec::new();
            let mut current = node;
            loop {
                if let Some(start) = chain.iter().position(|id| *id == current.id) {
                    let cycle = chain[start..].to_vec();
                    let dropped = self.subtree_of(&cycle);
                    self.visited.extend(dropped.iter().copied());
                    self.errors.push(StructureError::Cycle { cycle, dropped });
                    break;
                }
                chain.push(current.id);

                let Some(parent_id) = current.parent else {
                    break;
                };
                match self.by_id.get(&parent_id) {
                    None => {
                        let dropped = self.subtree_of(&[current.id]);
                        self.visited.extend(dropped.iter().copied());
                        self.errors.push(StructureError::MissingParent {
                            id: current.id,
                            parent: parent_id,
                            dropped,
                        });
                        break;
                    }
                    Some(parent) if self.visited.contains(&parent.id) => {
                        let dropped = self.subtree_of(&[current.id]);
                        self.visited.extend(dropped);
                        break;
                    }
                    Some(parent) => current = *parent,
                }
            }
        }
    }

    /// 指定ノードとその子孫の ID (幅優先、各 ID は一度だけ)
    fn subtree_of(&self, starts: &[MenuId]) -> Vec<MenuId> {
        let mut seen: HashSet<MenuId> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: Vec<MenuId> = starts.to_vec();
        let mut cursor = 0;
        while cursor < queue.len() {
            let id = queue[cursor];
            cursor += 1;
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            if let Some(children) = self.children.get(&Some(id)) {
                queue.extend(children.iter().map(|child| child.id));
            }
        }
        out
    }
}

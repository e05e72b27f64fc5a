// リポジトリのディレクトリ構造を写すツリー
//
// 更新はコピーオンライト。変更されたノードの祖先だけが作り直され、
// 関係のない部分木は Arc ごと共有される。

use std::collections::HashSet;
use std::sync::Arc;

use log::warn;

use crate::fetcher::{Entry, EntryKind};

/// ノードの種類
///
/// ファイルは `children` も `expanded` も持たない。
/// `children: None` は「未取得」、`Some(空)` は「取得済みで空」。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory {
        children: Option<Arc<Vec<TreeNode>>>,
        expanded: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    /// 表示名（パスの最後の要素）
    pub name: String,
    /// リポジトリルートからのスラッシュ区切りのパス。ツリー内で一意
    pub path: String,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        TreeNode {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
        }
    }

    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        TreeNode {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Directory {
                children: None,
                expanded: false,
            },
        }
    }

    pub fn from_entry(entry: &Entry) -> Self {
        match entry.kind {
            EntryKind::File => TreeNode::file(&entry.name, &entry.path),
            EntryKind::Directory => TreeNode::directory(&entry.name, &entry.path),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File)
    }

    /// 子の一覧を取得済みかどうか（ファイルは常に false）
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Directory {
                children: Some(_),
                ..
            }
        )
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { expanded: true, .. })
    }

    pub fn children(&self) -> Option<&Arc<Vec<TreeNode>>> {
        match &self.kind {
            NodeKind::Directory { children, .. } => children.as_ref(),
            NodeKind::File => None,
        }
    }

    /// 取得した子を設定して展開した新しいノードを返す
    ///
    /// 取得済みのディレクトリやファイルには適用しない。
    fn with_loaded_children(&self, children: Arc<Vec<TreeNode>>) -> Option<TreeNode> {
        match &self.kind {
            NodeKind::Directory { children: None, .. } => Some(TreeNode {
                name: self.name.clone(),
                path: self.path.clone(),
                kind: NodeKind::Directory {
                    children: Some(children),
                    expanded: true,
                },
            }),
            _ => None,
        }
    }

    fn with_expanded(&self, value: bool) -> Option<TreeNode> {
        match &self.kind {
            NodeKind::Directory { children, expanded } if *expanded != value => Some(TreeNode {
                name: self.name.clone(),
                path: self.path.clone(),
                kind: NodeKind::Directory {
                    children: children.clone(),
                    expanded: value,
                },
            }),
            _ => None,
        }
    }

    fn with_children(&self, new_children: Arc<Vec<TreeNode>>) -> TreeNode {
        let expanded = self.is_expanded();
        TreeNode {
            name: self.name.clone(),
            path: self.path.clone(),
            kind: NodeKind::Directory {
                children: Some(new_children),
                expanded,
            },
        }
    }
}

// `ancestor` が `path` の祖先ディレクトリか
fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// `parent` の直下のパスか（ルートは ""）
pub fn is_direct_child(parent: &str, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let rest = if parent.is_empty() {
        path
    } else if is_ancestor(parent, path) {
        &path[parent.len() + 1..]
    } else {
        return false;
    };
    !rest.is_empty() && !rest.contains('/')
}

/// パスでノードを探す
pub fn find<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if is_ancestor(&node.path, path) {
            if let Some(children) = node.children() {
                if let Some(found) = find(children, path) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// `path` のノードに `transform` を適用した新しいフォレストを返す
///
/// 何も変わらなければ `None`。変更されたノードの祖先だけを作り直し、
/// それ以外の兄弟の部分木はそのまま共有する。
pub fn update_node<F>(
    nodes: &Arc<Vec<TreeNode>>,
    path: &str,
    transform: &mut F,
) -> Option<Arc<Vec<TreeNode>>>
where
    F: FnMut(&TreeNode) -> Option<TreeNode>,
{
    for (index, node) in nodes.iter().enumerate() {
        let replacement = if node.path == path {
            transform(node)
        } else if is_ancestor(&node.path, path) {
            node.children()
                .and_then(|children| update_node(children, path, transform))
                .map(|children| node.with_children(children))
        } else {
            None
        };

        if let Some(replacement) = replacement {
            let mut rebuilt = Vec::with_capacity(nodes.len());
            rebuilt.extend_from_slice(&nodes[..index]);
            rebuilt.push(replacement);
            rebuilt.extend_from_slice(&nodes[index + 1..]);
            return Some(Arc::new(rebuilt));
        }
    }
    None
}

pub fn load_children(
    nodes: &Arc<Vec<TreeNode>>,
    path: &str,
    children: Arc<Vec<TreeNode>>,
) -> Option<Arc<Vec<TreeNode>>> {
    update_node(nodes, path, &mut |node: &TreeNode| {
        node.with_loaded_children(Arc::clone(&children))
    })
}

pub fn set_expanded(
    nodes: &Arc<Vec<TreeNode>>,
    path: &str,
    expanded: bool,
) -> Option<Arc<Vec<TreeNode>>> {
    update_node(nodes, path, &mut |node: &TreeNode| node.with_expanded(expanded))
}

/// 取得済みの子は残したまま全ディレクトリを閉じる
pub fn collapse_all(nodes: &Arc<Vec<TreeNode>>) -> Option<Arc<Vec<TreeNode>>> {
    let mut changed = false;
    let rebuilt: Vec<TreeNode> = nodes
        .iter()
        .map(|node| {
            let collapsed_children = node.children().and_then(collapse_all);
            let base = match collapsed_children {
                Some(children) => {
                    changed = true;
                    node.with_children(children)
                }
                None => node.clone(),
            };
            match base.with_expanded(false) {
                Some(closed) => {
                    changed = true;
                    closed
                }
                None => base,
            }
        })
        .collect();
    changed.then(|| Arc::new(rebuilt))
}

/// 表示順に (深さ, ノード) を並べる。祖先がすべて展開されているノードだけを含む
pub fn visible_rows(nodes: &[TreeNode]) -> Vec<(usize, &TreeNode)> {
    fn walk<'a>(nodes: &'a [TreeNode], depth: usize, rows: &mut Vec<(usize, &'a TreeNode)>) {
        for node in nodes {
            rows.push((depth, node));
            if node.is_expanded() {
                if let Some(children) = node.children() {
                    walk(children, depth + 1, rows);
                }
            }
        }
    }

    let mut rows = Vec::new();
    walk(nodes, 0, &mut rows);
    rows
}

/// ツリー内の全パス（深さ優先）
pub fn all_paths(nodes: &[TreeNode]) -> Vec<&str> {
    let mut paths = Vec::new();
    for node in nodes {
        paths.push(node.path.as_str());
        if let Some(children) = node.children() {
            paths.extend(all_paths(children));
        }
    }
    paths
}

/// 取得したエントリをノードに変換する
///
/// 取得元の順序を保つ。`parent` 直下でないもの、一覧内で重複するもの、
/// 既存ツリーにすでにあるパスは捨てる。
pub fn build_children(existing: &[TreeNode], parent: &str, entries: &[Entry]) -> Vec<TreeNode> {
    let mut seen = HashSet::new();
    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        if !is_direct_child(parent, &entry.path) {
            warn!("⚠️ {} の直下ではないエントリを無視: {}", parent, entry.path);
            continue;
        }
        if !seen.insert(entry.path.as_str()) || find(existing, &entry.path).is_some() {
            warn!("⚠️ 重複したパスを無視: {}", entry.path);
            continue;
        }
        children.push(TreeNode::from_entry(entry));
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> Arc<Vec<TreeNode>> {
        let b = TreeNode::directory("b", "a/b");
        let mut c = TreeNode::directory("c", "a/c");
        c.kind = NodeKind::Directory {
            children: Some(Arc::new(vec![TreeNode::file("x.rs", "a/c/x.rs")])),
            expanded: true,
        };
        let mut a = TreeNode::directory("a", "a");
        a.kind = NodeKind::Directory {
            children: Some(Arc::new(vec![b, c])),
            expanded: true,
        };
        Arc::new(vec![a, TreeNode::file("README.md", "README.md")])
    }

    #[test]
    fn ancestor_requires_separator() {
        assert!(is_ancestor("a", "a/b"));
        assert!(!is_ancestor("a", "ab/c"));
        assert!(!is_ancestor("a", "a"));
    }

    #[test]
    fn direct_child_checks() {
        assert!(is_direct_child("", "src"));
        assert!(!is_direct_child("", "src/lib.rs"));
        assert!(is_direct_child("src", "src/lib.rs"));
        assert!(!is_direct_child("src", "src/a/b.rs"));
        assert!(!is_direct_child("src", "srcx/lib.rs"));
        assert!(!is_direct_child("src", "src/"));
    }

    #[test]
    fn find_walks_loaded_children() {
        let nodes = forest();
        assert_eq!(find(&nodes, "a/c/x.rs").map(|n| n.name.as_str()), Some("x.rs"));
        assert!(find(&nodes, "a/b/nothing").is_none());
    }

    #[test]
    fn update_shares_untouched_subtrees() {
        let nodes = forest();
        let before_c = find(&nodes, "a/c").unwrap().children().unwrap().clone();

        let loaded = Arc::new(vec![TreeNode::file("y.rs", "a/b/y.rs")]);
        let updated = load_children(&nodes, "a/b", loaded).unwrap();

        let b = find(&updated, "a/b").unwrap();
        assert!(b.is_loaded());
        assert!(b.is_expanded());
        let after_c = find(&updated, "a/c").unwrap().children().unwrap();
        assert!(Arc::ptr_eq(&before_c, after_c));
        // 元のフォレストは変更されない
        assert!(!find(&nodes, "a/b").unwrap().is_loaded());
        assert_eq!(updated[1], nodes[1]);
    }

    #[test]
    fn load_does_not_replace_loaded_children() {
        let nodes = forest();
        assert!(load_children(&nodes, "a/c", Arc::new(Vec::new())).is_none());
        assert!(load_children(&nodes, "README.md", Arc::new(Vec::new())).is_none());
    }

    #[test]
    fn set_expanded_is_noop_when_unchanged() {
        let nodes = forest();
        assert!(set_expanded(&nodes, "a", true).is_none());
        let closed = set_expanded(&nodes, "a", false).unwrap();
        assert!(!find(&closed, "a").unwrap().is_expanded());
        assert!(find(&closed, "a/c").unwrap().is_expanded());
    }

    #[test]
    fn collapse_all_keeps_children() {
        let nodes = forest();
        let collapsed = collapse_all(&nodes).unwrap();
        let c = find(&collapsed, "a/c").unwrap();
        assert!(!c.is_expanded());
        assert!(c.is_loaded());
        assert!(collapse_all(&collapsed).is_none());
    }

    #[test]
    fn visible_rows_follow_expansion() {
        let nodes = forest();
        let rows: Vec<_> = visible_rows(&nodes)
            .into_iter()
            .map(|(depth, node)| (depth, node.path.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![(0, "a"), (1, "a/b"), (1, "a/c"), (2, "a/c/x.rs"), (0, "README.md")]
        );

        let closed = set_expanded(&nodes, "a/c", false).unwrap();
        assert_eq!(visible_rows(&closed).len(), 4);
    }

    #[test]
    fn build_children_skips_bad_entries() {
        let nodes = forest();
        let entries = vec![
            Entry::file("y.rs", "a/b/y.rs"),
            Entry::file("y.rs", "a/b/y.rs"),
            Entry::file("deep.rs", "a/b/c/deep.rs"),
            Entry::file("x.rs", "a/c/x.rs"),
            Entry::directory("d", "a/b/d"),
        ];
        let children = build_children(&nodes, "a/b", &entries);
        let paths: Vec<_> = children.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b/y.rs", "a/b/d"]);
        assert!(children[1].is_directory());
        assert!(!children[1].is_loaded());
    }
}

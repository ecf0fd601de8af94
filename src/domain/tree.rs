// ==========================================
// 表格导入框架 - 树形结构
// ==========================================
// 职责: 树节点、节点条目、节点键函数、列结束判定
// 存储: 节点数组 + 下标引用（根节点下标固定为 0）
// ==========================================

use crate::domain::mapping::ColumnMapping;
use std::collections::HashMap;
use std::sync::Arc;

/// 节点下标
pub type NodeId = usize;

/// 根节点下标
pub const ROOT: NodeId = 0;

/// 节点键函数: (行前缀单元格, 层级) → 全树唯一键
pub type NodeKeyFn = Arc<dyn Fn(&[String], usize) -> String + Send + Sync>;

/// 列结束判定: 单元格满足时该位置不产生节点
pub type ColumnEndFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 默认键: 最后一个单元格 + "_" + 层级
pub fn last_value_key(prefix: &[String], rank: usize) -> String {
    let last = prefix.last().map(String::as_str).unwrap_or("");
    format!("{}_{}", last, rank)
}

/// 全前缀键: 所有前缀单元格以 "_" 连接后追加层级
///
/// 不同父节点下的同名单元格生成不同节点
pub fn full_prefix_key(prefix: &[String], rank: usize) -> String {
    let mut key = prefix.join("_");
    key.push('_');
    key.push_str(&rank.to_string());
    key
}

/// 默认列结束判定: 空单元格
pub fn empty_cell_ends_column(cell: &str) -> bool {
    cell.is_empty()
}

// ==========================================
// TreeNodeItem - 叶子节点上挂载的记录
// ==========================================
#[derive(Debug, Clone)]
pub struct TreeNodeItem<R> {
    pub record: R,
    /// 原始矩阵行下标（0 起）
    pub index: usize,
}

impl<R> TreeNodeItem<R> {
    pub fn new(record: R, index: usize) -> Self {
        Self { record, index }
    }
}

// ==========================================
// TreeNode
// ==========================================
#[derive(Debug, Clone)]
pub struct TreeNode<R> {
    id: NodeId,
    key: String,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rank: usize,
    rows: Vec<usize>,
    items: Vec<TreeNodeItem<R>>,
    assigned_id: Option<i64>,
}

impl<R> TreeNode<R> {
    fn new(id: NodeId, key: String, value: String, parent: Option<NodeId>, rank: usize) -> Self {
        Self {
            id,
            key,
            value,
            parent,
            children: Vec::new(),
            rank,
            rows: Vec::new(),
            items: Vec::new(),
            assigned_id: None,
        }
    }

    /// 并行导入时临时占位
    pub(crate) fn placeholder() -> Self {
        Self::new(usize::MAX, String::new(), String::new(), None, 0)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_root() && self.children.is_empty()
    }

    /// 经过该节点的源数据行下标（0 起）
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// 经过该节点的行号（1 起）
    pub fn lines(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r + 1).collect()
    }

    pub fn items(&self) -> &[TreeNodeItem<R>] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [TreeNodeItem<R>] {
        &mut self.items
    }

    /// 导入器写回的落库主键
    pub fn assigned_id(&self) -> Option<i64> {
        self.assigned_id
    }

    pub fn set_id(&mut self, id: i64) {
        self.assigned_id = Some(id);
    }
}

// ==========================================
// Tree
// ==========================================
#[derive(Debug, Clone)]
pub struct Tree<R> {
    nodes: Vec<TreeNode<R>>,
    keys: HashMap<String, NodeId>,
    mapping: Arc<ColumnMapping>,
}

impl<R> Tree<R> {
    pub fn new(mapping: Arc<ColumnMapping>) -> Self {
        Self {
            nodes: vec![TreeNode::new(ROOT, String::new(), String::new(), None, 0)],
            keys: HashMap::new(),
            mapping,
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn root(&self) -> &TreeNode<R> {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode<R>> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode<R>> {
        self.nodes.get_mut(id)
    }

    pub fn find(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode<R>> {
        self.nodes.iter()
    }

    /// 节点总数（含根节点）
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 叶子节点（不含根节点）
    pub fn leaves(&self) -> impl Iterator<Item = &TreeNode<R>> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// 最大层级
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.rank).max().unwrap_or(0)
    }

    /// 某层全部节点（按从根出发的广度优先顺序）
    pub fn rank_nodes(&self, rank: usize) -> Vec<NodeId> {
        let mut frontier = vec![ROOT];
        for _ in 0..rank {
            frontier = frontier
                .iter()
                .flat_map(|id| self.nodes[*id].children.iter().copied())
                .collect();
        }
        frontier
    }

    /// 新增子节点，层级为父节点层级 + 1
    ///
    /// # 返回
    /// - Err: 父节点不存在或键已存在
    pub fn add_child(
        &mut self,
        parent: NodeId,
        key: String,
        value: String,
    ) -> Result<NodeId, String> {
        if self.keys.contains_key(&key) {
            return Err(format!("节点键重复: {}", key));
        }
        let rank = match self.nodes.get(parent) {
            Some(p) => p.rank + 1,
            None => return Err(format!("父节点不存在: {}", parent)),
        };
        let id = self.nodes.len();
        self.nodes
            .push(TreeNode::new(id, key.clone(), value, Some(parent), rank));
        self.nodes[parent].children.push(id);
        self.keys.insert(key, id);
        Ok(id)
    }

    pub(crate) fn push_row(&mut self, id: NodeId, index: usize) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.rows.push(index);
        }
    }

    /// 叶子节点挂载记录
    ///
    /// # 返回
    /// - Err: 目标不是叶子节点
    pub fn attach_item(&mut self, id: NodeId, item: TreeNodeItem<R>) -> Result<(), String> {
        match self.nodes.get_mut(id) {
            Some(node) if node.is_leaf() => {
                node.items.push(item);
                Ok(())
            }
            Some(node) => Err(format!("节点 {} 不是叶子节点", node.key)),
            None => Err(format!("节点不存在: {}", id)),
        }
    }

    /// 取出节点（并行导入用），须配合 put_node 放回
    pub(crate) fn take_node(&mut self, id: NodeId) -> TreeNode<R> {
        std::mem::replace(&mut self.nodes[id], TreeNode::placeholder())
    }

    pub(crate) fn put_node(&mut self, node: TreeNode<R>) {
        let id = node.id;
        self.nodes[id] = node;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_functions() {
        let prefix = vec!["a1".to_string(), "b2".to_string()];
        assert_eq!(last_value_key(&prefix, 2), "b2_2");
        assert_eq!(full_prefix_key(&prefix, 2), "a1_b2_2");
        assert!(empty_cell_ends_column(""));
        assert!(!empty_cell_ends_column("x"));
    }

    #[test]
    fn test_add_child_ranks_and_leaves() {
        let mut tree: Tree<()> = Tree::new(Arc::new(ColumnMapping::default()));
        let a = tree.add_child(ROOT, "a_1".into(), "a".into()).unwrap();
        let b = tree.add_child(a, "b_2".into(), "b".into()).unwrap();
        let c = tree.add_child(a, "c_2".into(), "c".into()).unwrap();
        assert_eq!(tree.node(b).unwrap().rank(), 2);
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.rank_nodes(2), vec![b, c]);
        assert!(tree.add_child(ROOT, "a_1".into(), "a".into()).is_err());
        assert!(tree.attach_item(a, TreeNodeItem::new((), 0)).is_err());
        assert!(tree.attach_item(b, TreeNodeItem::new((), 0)).is_ok());
    }
}

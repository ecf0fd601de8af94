// ==========================================
// 表格导入框架 - 建树
// ==========================================
// 职责: 按层序逐列扫描预处理后的行，去重生成节点，并把记录挂到叶子
// 算法:
// 1. 对层序中第 r 个列号（第 r+1 层），逐行计算节点键
// 2. 键已存在则复用，否则按上一层列号计算父键并挂到父节点下
// 3. 列结束判定命中的单元格不产生节点；更深层若找不到父节点即结构错误
// 4. 全部层完成后，每行物化的记录挂到该行最深的节点（必须是叶子）
// ==========================================

use crate::domain::record::Record;
use crate::domain::row::SourceRow;
use crate::domain::tree::{ColumnEndFn, NodeId, NodeKeyFn, Tree, TreeNodeItem, ROOT};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::materializer::Materializer;
use std::sync::Arc;
use tracing::debug;

pub struct TreeBuilder {
    level_order: Vec<usize>,
    key_fn: NodeKeyFn,
    column_end: ColumnEndFn,
}

impl TreeBuilder {
    /// # 参数
    /// - level_order: 第 r+1 层对应的列号为 level_order[r]
    /// - key_fn: 节点键函数
    /// - column_end: 列结束判定
    pub fn new(level_order: Vec<usize>, key_fn: NodeKeyFn, column_end: ColumnEndFn) -> Self {
        Self {
            level_order,
            key_fn,
            column_end,
        }
    }

    /// 某行在第 rank 层（1 起）的节点键
    fn key_at(&self, cells: &[String], rank: usize) -> String {
        let column = self.level_order[rank - 1];
        (self.key_fn)(&cells[..=column], rank)
    }

    fn check_width(&self, row: &SourceRow) -> ImportResult<()> {
        let needed = self.level_order.iter().max().map(|c| c + 1).unwrap_or(0);
        if row.cells.len() < needed {
            return Err(ImportError::RowStructural {
                line: row.line(),
                message: format!("建树需要 {} 列，实际 {} 列", needed, row.cells.len()),
            });
        }
        Ok(())
    }

    /// 只建树，不挂载记录
    ///
    /// # 返回
    /// - (树, 每行最深节点)
    pub fn build_nodes<R>(
        &self,
        rows: &[SourceRow],
        tree: &mut Tree<R>,
    ) -> ImportResult<Vec<Option<NodeId>>> {
        for row in rows {
            self.check_width(row)?;
        }

        let mut deepest: Vec<Option<NodeId>> = vec![None; rows.len()];

        for (r, &column) in self.level_order.iter().enumerate() {
            let rank = r + 1;
            for (j, row) in rows.iter().enumerate() {
                let cell = &row.cells[column];
                if (self.column_end)(cell) {
                    continue;
                }

                let key = self.key_at(&row.cells, rank);
                let id = match tree.find(&key) {
                    Some(id) => {
                        let existing = tree.node(id).map(|n| n.rank()).unwrap_or(0);
                        if existing != rank {
                            return Err(ImportError::RowStructural {
                                line: row.line(),
                                message: format!(
                                    "节点键 {} 同时出现在第{}层和第{}层",
                                    key, existing, rank
                                ),
                            });
                        }
                        id
                    }
                    None => {
                        let parent = if r == 0 {
                            ROOT
                        } else {
                            let parent_key = self.key_at(&row.cells, rank - 1);
                            tree.find(&parent_key).ok_or(ImportError::ParentNotFound {
                                line: row.line(),
                                rank: rank - 1,
                                key: parent_key,
                            })?
                        };
                        tree.add_child(parent, key, cell.clone())
                            .map_err(ImportError::Structural)?
                    }
                };

                tree.push_row(id, row.index);
                deepest[j] = Some(id);
            }
        }

        debug!(
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            depth = tree.depth(),
            "建树完成"
        );
        Ok(deepest)
    }

    /// 建树并把每行物化的记录挂到其最深节点
    pub fn build<R: Record>(
        &self,
        rows: &[SourceRow],
        materializer: &Materializer<R>,
    ) -> ImportResult<Tree<R>> {
        let mut tree = Tree::new(Arc::clone(materializer.mapping()));
        let deepest = self.build_nodes(rows, &mut tree)?;

        for (row, node) in rows.iter().zip(deepest) {
            let node = node.ok_or_else(|| ImportError::RowStructural {
                line: row.line(),
                message: "该行未产生任何树节点".to_string(),
            })?;
            let record = materializer.materialize(&row.cells, row.line())?;
            tree.attach_item(node, TreeNodeItem::new(record, row.index))
                .map_err(|message| ImportError::RowStructural {
                    line: row.line(),
                    message,
                })?;
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::ColumnMapping;
    use crate::domain::record::NoRecord;
    use crate::domain::tree::{empty_cell_ends_column, full_prefix_key, last_value_key};

    fn rows(data: &[&[&str]]) -> Vec<SourceRow> {
        data.iter()
            .enumerate()
            .map(|(i, r)| SourceRow {
                index: i,
                cells: r.iter().map(|c| c.to_string()).collect(),
            })
            .collect()
    }

    fn builder(level_order: Vec<usize>) -> TreeBuilder {
        TreeBuilder::new(
            level_order,
            Arc::new(last_value_key),
            Arc::new(empty_cell_ends_column),
        )
    }

    fn materializer() -> Materializer<NoRecord> {
        Materializer::new(Arc::new(ColumnMapping::default()), false).unwrap()
    }

    #[test]
    fn test_shared_prefix_builds_two_leaves() {
        let data = rows(&[&["a1", "b2", "c3"], &["a1", "b2", "c4"]]);
        let tree = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap();

        assert_eq!(tree.node_count(), 5);
        let a = tree.find("a1_1").unwrap();
        let b = tree.find("b2_2").unwrap();
        assert_eq!(tree.node(a).unwrap().children(), &[b]);
        assert_eq!(tree.node(b).unwrap().rows(), &[0, 1]);

        let c3 = tree.node(tree.find("c3_3").unwrap()).unwrap();
        let c4 = tree.node(tree.find("c4_3").unwrap()).unwrap();
        assert!(c3.is_leaf() && c4.is_leaf());
        assert_eq!(c3.items().len(), 1);
        assert_eq!(c3.items()[0].index, 0);
        assert_eq!(c4.items()[0].index, 1);
    }

    #[test]
    fn test_rank_invariant() {
        let data = rows(&[&["a", "b", "c"], &["a", "d", "e"], &["f", "g", "h"]]);
        let tree = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap();
        for node in tree.nodes().filter(|n| !n.is_root()) {
            let parent = tree.node(node.parent().unwrap()).unwrap();
            assert_eq!(node.rank(), parent.rank() + 1);

            // 祖先链必须无环地走到根
            let mut visited = vec![node.id()];
            let mut current = node.parent();
            while let Some(id) = current {
                assert!(!visited.contains(&id), "节点 {} 出现环", node.key());
                visited.push(id);
                current = tree.node(id).unwrap().parent();
            }
            assert_eq!(*visited.last().unwrap(), ROOT);
            assert_eq!(visited.len(), node.rank() + 1);
        }
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn test_rebuild_yields_same_shape() {
        let data = rows(&[
            &["a", "b", "c"],
            &["a", "b", "c"],
            &["a", "d", "e"],
            &["f", "g", "h"],
        ]);
        let first = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap();
        let second = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap();

        let key_of = |tree: &Tree<NoRecord>, id: NodeId| tree.node(id).unwrap().key().to_string();
        assert_eq!(first.node_count(), second.node_count());
        for node in first.nodes() {
            let other_id = if node.is_root() { ROOT } else { second.find(node.key()).unwrap() };
            let other = second.node(other_id).unwrap();
            assert_eq!(
                node.parent().map(|p| key_of(&first, p)),
                other.parent().map(|p| key_of(&second, p))
            );
            let children: Vec<String> = node.children().iter().map(|c| key_of(&first, *c)).collect();
            let other_children: Vec<String> =
                other.children().iter().map(|c| key_of(&second, *c)).collect();
            assert_eq!(children, other_children);
            assert_eq!(node.items().len(), other.items().len());
        }
        assert_eq!(first.node(first.find("c_3").unwrap()).unwrap().items().len(), 2);
    }

    #[test]
    fn test_level_order_permutation() {
        // 物理列 1 是顶层，列 0 是第二层
        let data = rows(&[&["x", "top"], &["y", "top"]]);
        let tree = builder(vec![1, 0]).build(&data, &materializer()).unwrap();
        let top = tree.find("top_1").unwrap();
        assert_eq!(tree.node(top).unwrap().children().len(), 2);
    }

    #[test]
    fn test_parent_not_found() {
        // 第 2 层为空被跳过，第 3 层求父键 "_2" 不存在
        let data = rows(&[&["a", "", "c"]]);
        let err = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap_err();
        match err {
            ImportError::ParentNotFound { line, rank, key } => {
                assert_eq!(line, 1);
                assert_eq!(rank, 2);
                assert_eq!(key, "_2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_column_end_shortens_row() {
        let data = rows(&[&["a", "b", "c"], &["d", "", ""]]);
        let tree = builder(vec![0, 1, 2]).build(&data, &materializer()).unwrap();
        let d = tree.node(tree.find("d_1").unwrap()).unwrap();
        assert!(d.is_leaf());
        assert_eq!(d.items().len(), 1);
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn test_item_on_interior_node_is_error() {
        let data = rows(&[&["a", ""], &["a", "b"]]);
        let err = builder(vec![0, 1]).build(&data, &materializer()).unwrap_err();
        assert!(matches!(err, ImportError::RowStructural { line: 1, .. }));
    }

    #[test]
    fn test_full_prefix_separates_branches() {
        let data = rows(&[&["a", "x"], &["b", "x"]]);
        // 默认键下第二行复用第一行的 x_2 节点，b 下没有子节点
        let last = builder(vec![0, 1]).build(&data, &materializer()).unwrap();
        let x = last.node(last.find("x_2").unwrap()).unwrap();
        assert_eq!(x.rows(), &[0, 1]);
        assert!(last.node(last.find("b_1").unwrap()).unwrap().children().is_empty());

        let full = TreeBuilder::new(
            vec![0, 1],
            Arc::new(full_prefix_key),
            Arc::new(empty_cell_ends_column),
        )
        .build(&data, &materializer())
        .unwrap();
        assert_eq!(full.leaf_count(), 2);
        assert!(full.find("a_x_2").is_some() && full.find("b_x_2").is_some());
    }

    #[test]
    fn test_short_row_is_structural() {
        let data = rows(&[&["a"]]);
        let err = builder(vec![0, 1]).build(&data, &materializer()).unwrap_err();
        assert!(err.is_structural());
    }
}

// ==========================================
// 表格导入框架 - 导入扩展点 Trait
// ==========================================
// 职责: 定义流水线的全部扩展接口（不包含实现）
// - 表格读写: TabularSource / TabularWriter
// - 分段流水线: Recognizer / SectionChecker / SectionImporter / PostHandler / FlatMiddleware
// - 树形流水线: LevelImporter / TreeMiddleware
// ==========================================

use crate::domain::record::Record;
use crate::domain::row::{CellMatrix, RowContext, WholeImportContext};
use crate::domain::tree::{Tree, TreeNode};
use crate::domain::types::SectionType;
use crate::importer::error::ImportResult;
use crate::repository::ImportStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// 列回写内容: 列号 → [(原始矩阵行下标, 值)]
pub type ColumnWrites = BTreeMap<usize, Vec<(usize, String)>>;

// ==========================================
// TabularSource / TabularWriter
// ==========================================
// 实现者: CsvSheet, ExcelSheet, UniversalSheet
pub trait TabularSource: Send + Sync {
    /// 读取首个工作表为单元格矩阵（不做任何清洗）
    fn read(&self, path: &Path) -> ImportResult<CellMatrix>;
}

pub trait TabularWriter: Send + Sync {
    /// 按绝对行下标写入若干列
    fn write_columns(&self, path: &Path, writes: &ColumnWrites) -> ImportResult<()>;
}

/// 段识别器: 预处理后的行 → 段类型
pub type Recognizer = Arc<dyn Fn(&[String]) -> SectionType + Send + Sync>;

// ==========================================
// SectionChecker Trait
// ==========================================
// 用途: 检查阶段的行级业务校验（只读，不访问存储）
pub trait SectionChecker<R: Record>: Send + Sync {
    fn check_valid(&self, row: &RowContext<R>) -> ImportResult<()>;
}

impl<R, F> SectionChecker<R> for F
where
    R: Record,
    F: Fn(&RowContext<R>) -> ImportResult<()> + Send + Sync,
{
    fn check_valid(&self, row: &RowContext<R>) -> ImportResult<()> {
        self(row)
    }
}

// ==========================================
// SectionImporter Trait
// ==========================================
// 用途: 导入一行；可直接写库，也可只登记 effect 交给中间件批量写入
#[async_trait]
pub trait SectionImporter<R: Record>: Send + Sync {
    async fn import(&self, store: &dyn ImportStore, row: &mut RowContext<R>) -> ImportResult<()>;
}

// ==========================================
// PostHandler Trait
// ==========================================
// 用途: 全部行导入后的收尾处理（按注册顺序执行）
#[async_trait]
pub trait PostHandler: Send + Sync {
    async fn post_handle(&self, store: &dyn ImportStore) -> ImportResult<()>;
}

// ==========================================
// FlatMiddleware Trait
// ==========================================
// 用途: 分段流水线的横切能力；未实现的钩子为空操作
// 约束: 同一流水线内的中间件调用全部串行化
#[async_trait]
pub trait FlatMiddleware<R: Record>: Send + Sync {
    /// 导入开始前，可看到全部行与列映射
    async fn pre_import(
        &mut self,
        _store: &dyn ImportStore,
        _whole: &WholeImportContext<R>,
    ) -> ImportResult<()> {
        Ok(())
    }

    /// 每行导入成功后
    async fn post_row_import(
        &mut self,
        _store: &dyn ImportStore,
        _row: &RowContext<R>,
    ) -> ImportResult<()> {
        Ok(())
    }

    /// 收尾阶段
    async fn post_handle(&mut self, _store: &dyn ImportStore) -> ImportResult<()> {
        Ok(())
    }
}

// ==========================================
// LevelImporter Trait
// ==========================================
// 用途: 导入树的一个节点；可通过 node.set_id 写回落库主键供子节点使用
#[async_trait]
pub trait LevelImporter<R: Record>: Send + Sync {
    /// # 参数
    /// - node: 当前节点（叶子节点携带 items）
    /// - parent_id: 父节点已写回的主键（根节点或父节点未写回时为 None）
    async fn import_node(
        &self,
        store: &dyn ImportStore,
        node: &mut TreeNode<R>,
        parent_id: Option<i64>,
    ) -> ImportResult<()>;
}

// ==========================================
// TreeMiddleware Trait
// ==========================================
#[async_trait]
pub trait TreeMiddleware<R: Record>: Send + Sync {
    async fn pre_import(&mut self, _store: &dyn ImportStore, _tree: &Tree<R>) -> ImportResult<()> {
        Ok(())
    }

    async fn post_node_import(
        &mut self,
        _store: &dyn ImportStore,
        _node: &TreeNode<R>,
    ) -> ImportResult<()> {
        Ok(())
    }

    async fn post_handle(&mut self, _store: &dyn ImportStore) -> ImportResult<()> {
        Ok(())
    }
}

// ==========================================
// 表格导入框架 - 回写源表格中间件
// ==========================================
// 职责: 收集 rewrite 字段在导入后的取值，收尾时按原始行下标写回源文件
// 适用: 分段流水线（逐行）与树形流水线（逐叶子条目）
// ==========================================

use crate::domain::mapping::ColumnMapping;
use crate::domain::record::Record;
use crate::domain::row::{RowContext, WholeImportContext};
use crate::domain::tree::{Tree, TreeNode};
use crate::importer::error::ImportResult;
use crate::importer::import_traits::{ColumnWrites, FlatMiddleware, TabularWriter, TreeMiddleware};
use crate::repository::ImportStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SheetRewriter {
    path: PathBuf,
    writer: Arc<dyn TabularWriter>,
    /// (字段序号, 列号)
    fields: Vec<(usize, usize)>,
    writes: ColumnWrites,
}

impl SheetRewriter {
    pub fn new(path: impl Into<PathBuf>, writer: Arc<dyn TabularWriter>) -> Self {
        Self {
            path: path.into(),
            writer,
            fields: Vec::new(),
            writes: ColumnWrites::new(),
        }
    }

    /// 已收集的回写内容
    pub fn writes(&self) -> &ColumnWrites {
        &self.writes
    }

    fn prepare(&mut self, mapping: &ColumnMapping) {
        self.fields = mapping
            .rewrite_fields()
            .map(|f| (f.ordinal, f.column))
            .collect();
        debug!(fields = self.fields.len(), "回写字段");
    }

    fn collect<R: Record>(&mut self, record: &R, index: usize) {
        for &(ordinal, column) in &self.fields {
            let value = record.get(ordinal).map(|v| v.to_string()).unwrap_or_default();
            self.writes.entry(column).or_default().push((index, value));
        }
    }

    fn write_back(&mut self) -> ImportResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.writer.write_columns(&self.path, &self.writes)?;
        info!(
            path = %self.path.display(),
            columns = self.writes.len(),
            "回写源表格完成"
        );
        self.writes.clear();
        Ok(())
    }
}

#[async_trait]
impl<R: Record> FlatMiddleware<R> for SheetRewriter {
    async fn pre_import(
        &mut self,
        _store: &dyn ImportStore,
        whole: &WholeImportContext<R>,
    ) -> ImportResult<()> {
        self.prepare(whole.mapping());
        Ok(())
    }

    async fn post_row_import(
        &mut self,
        _store: &dyn ImportStore,
        row: &RowContext<R>,
    ) -> ImportResult<()> {
        self.collect(row.record(), row.index());
        Ok(())
    }

    async fn post_handle(&mut self, _store: &dyn ImportStore) -> ImportResult<()> {
        self.write_back()
    }
}

#[async_trait]
impl<R: Record> TreeMiddleware<R> for SheetRewriter {
    async fn pre_import(&mut self, _store: &dyn ImportStore, tree: &Tree<R>) -> ImportResult<()> {
        self.prepare(tree.mapping());
        Ok(())
    }

    async fn post_node_import(
        &mut self,
        _store: &dyn ImportStore,
        node: &TreeNode<R>,
    ) -> ImportResult<()> {
        if !node.is_leaf() {
            return Ok(());
        }
        for item in node.items() {
            self.collect(&item.record, item.index);
        }
        Ok(())
    }

    async fn post_handle(&mut self, _store: &dyn ImportStore) -> ImportResult<()> {
        self.write_back()
    }
}

// ==========================================
// 表格导入框架 - 批量写入中间件
// ==========================================
// 职责: 收集行导入留下的插入/更新意图，攒满一批后合并为一次执行
// 规则: 达到批大小立即执行；收尾阶段无条件执行剩余语句
// ==========================================

use crate::domain::record::Record;
use crate::domain::row::RowContext;
use crate::importer::error::ImportResult;
use crate::importer::import_traits::FlatMiddleware;
use crate::middleware::effect_statements;
use crate::repository::ImportStore;
use async_trait::async_trait;
use tracing::debug;

pub struct BatchWriter {
    batch_size: usize,
    pending: Vec<String>,
    executed_batches: usize,
    executed_statements: usize,
}

impl BatchWriter {
    /// 批大小为 0 时按 1 处理
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            executed_batches: 0,
            executed_statements: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 已执行的批次数
    pub fn executed_batches(&self) -> usize {
        self.executed_batches
    }

    pub fn executed_statements(&self) -> usize {
        self.executed_statements
    }

    /// 加入一条语句，满批即执行
    pub async fn add(&mut self, store: &dyn ImportStore, sql: String) -> ImportResult<()> {
        self.pending.push(sql);
        if self.pending.len() >= self.batch_size {
            self.flush(store).await?;
        }
        Ok(())
    }

    /// 执行全部待执行语句
    pub async fn flush(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let statements = std::mem::take(&mut self.pending);
        let count = statements.len();
        store.exec_raw(&statements.join("\n")).await?;

        self.executed_batches += 1;
        self.executed_statements += count;
        debug!(
            statements = count,
            batches = self.executed_batches,
            "批量写入执行完成"
        );
        Ok(())
    }
}

#[async_trait]
impl<R: Record> FlatMiddleware<R> for BatchWriter {
    async fn post_row_import(
        &mut self,
        store: &dyn ImportStore,
        row: &RowContext<R>,
    ) -> ImportResult<()> {
        for sql in effect_statements(row.effect()) {
            self.add(store, sql).await?;
        }
        Ok(())
    }

    async fn post_handle(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        self.flush(store).await
    }
}

// ==========================================
// 表格导入框架 - SQL 脚本中间件
// ==========================================
// 职责: 把行导入留下的插入/更新意图写成 .sql 脚本（每行一条语句）
// 可选: 收尾时按批执行脚本
// ==========================================

use crate::domain::record::Record;
use crate::domain::row::RowContext;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_traits::FlatMiddleware;
use crate::middleware::effect_statements;
use crate::repository::ImportStore;
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认缓存语句数
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// 执行脚本时每批语句数
pub const DEFAULT_EXEC_BATCH: usize = 1000;

/// 语句压成一行
///
/// 语句中的换行只可能出现在文本字面量内，改写为字符串拼接
fn single_line(sql: &str) -> String {
    sql.replace('\r', "' || char(13) || '")
        .replace('\n', "' || char(10) || '")
}

pub struct SqlScriptWriter {
    path: PathBuf,
    cache: Vec<String>,
    cache_size: usize,
    execute: bool,
    exec_batch: usize,
    written: usize,
}

impl SqlScriptWriter {
    /// # 参数
    /// - path: 脚本路径（已存在时追加）
    /// - execute: 收尾时是否执行脚本
    pub fn new(path: impl Into<PathBuf>, execute: bool) -> Self {
        Self {
            path: path.into(),
            cache: Vec::with_capacity(DEFAULT_CACHE_SIZE),
            cache_size: DEFAULT_CACHE_SIZE,
            execute,
            exec_batch: DEFAULT_EXEC_BATCH,
            written: 0,
        }
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size.max(1);
        self
    }

    pub fn exec_batch(mut self, size: usize) -> Self {
        self.exec_batch = size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 已写入脚本的语句数
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_cache(&mut self) -> ImportResult<()> {
        if self.cache.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ImportError::FileWriteError(format!("{}: {}", self.path.display(), e)))?;
        for sql in self.cache.drain(..) {
            writeln!(file, "{}", single_line(&sql))
                .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
            self.written += 1;
        }

        debug!(path = %self.path.display(), written = self.written, "SQL 脚本写入");
        Ok(())
    }

    /// 按批执行脚本
    pub async fn run_script(&self, store: &dyn ImportStore) -> ImportResult<usize> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| ImportError::FileReadError(format!("{}: {}", self.path.display(), e)))?;
        let statements: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

        for chunk in statements.chunks(self.exec_batch) {
            store.exec_raw(&chunk.join("\n")).await?;
        }

        info!(
            path = %self.path.display(),
            statements = statements.len(),
            "SQL 脚本执行完成"
        );
        Ok(statements.len())
    }
}

#[async_trait]
impl<R: Record> FlatMiddleware<R> for SqlScriptWriter {
    async fn post_row_import(
        &mut self,
        _store: &dyn ImportStore,
        row: &RowContext<R>,
    ) -> ImportResult<()> {
        self.cache.extend(effect_statements(row.effect()));
        if self.cache.len() >= self.cache_size {
            self.write_cache()?;
        }
        Ok(())
    }

    async fn post_handle(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        self.write_cache()?;
        if self.execute && self.path.exists() {
            self.run_script(store).await?;
        }
        Ok(())
    }
}

// ==========================================
// 表格导入框架 - 导入控制参数
// ==========================================
// 职责: 可序列化的导入参数 + 不可序列化的行/树钩子
// 存储: ImportSettings / TreeSettings 可由 config_kv 覆写
// ==========================================

use crate::domain::tree::{
    empty_cell_ends_column, full_prefix_key, last_value_key, ColumnEndFn, NodeKeyFn,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::preprocess::{default_end_of_data, CellFormatter, Preprocessor, RowPredicate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// 批量写入默认批大小
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// 默认并发上限
pub const DEFAULT_MAX_PARALLEL: usize = 4;

// ==========================================
// ImportSettings - 导入参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// 数据起始行（0 起，默认跳过 1 行表头）
    pub start_row: usize,
    /// 最小列数（None 时由列映射推导）
    pub min_column_count: Option<usize>,
    /// 严格类型: 类型不符在解析阶段即失败
    pub strict_types: bool,
    pub enable_parallel: bool,
    pub max_parallel: usize,
    pub enable_batch: bool,
    pub batch_size: usize,
    pub enable_format_check: bool,
    /// 失败明细落盘目录
    pub failure_dir: Option<PathBuf>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            start_row: 1,
            min_column_count: None,
            strict_types: false,
            enable_parallel: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            enable_batch: false,
            batch_size: DEFAULT_BATCH_SIZE,
            enable_format_check: false,
            failure_dir: None,
        }
    }
}

impl ImportSettings {
    /// 校验参数组合
    pub fn validate(&self) -> ImportResult<()> {
        if self.enable_batch && self.batch_size == 0 {
            return Err(ImportError::ConfigValueError {
                key: "import.batch_size".to_string(),
                value: "0".to_string(),
                message: "启用批量写入时批大小必须大于 0".to_string(),
            });
        }
        if self.enable_parallel && self.max_parallel == 0 {
            return Err(ImportError::ConfigValueError {
                key: "import.max_parallel".to_string(),
                value: "0".to_string(),
                message: "启用并发时并发上限必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 实际并发度（未启用并发时为 1）
    pub fn effective_parallelism(&self) -> usize {
        if self.enable_parallel {
            self.max_parallel.max(1)
        } else {
            1
        }
    }
}

// ==========================================
// ImportControl - 参数 + 行钩子
// ==========================================
#[derive(Clone)]
pub struct ImportControl {
    pub settings: ImportSettings,
    /// 数据结束判定（None 表示读到矩阵末尾）
    pub end_of_data: Option<RowPredicate>,
    /// 返回 true 的行被丢弃
    pub row_filter: Option<RowPredicate>,
    /// 单元格格式化（None 用默认 trim）
    pub cell_formatter: Option<CellFormatter>,
}

impl Default for ImportControl {
    fn default() -> Self {
        Self::new(ImportSettings::default())
    }
}

impl ImportControl {
    pub fn new(settings: ImportSettings) -> Self {
        Self {
            settings,
            end_of_data: Some(Arc::new(default_end_of_data)),
            row_filter: None,
            cell_formatter: None,
        }
    }

    pub fn with_end_of_data(mut self, predicate: Option<RowPredicate>) -> Self {
        self.end_of_data = predicate;
        self
    }

    pub fn with_row_filter(mut self, predicate: RowPredicate) -> Self {
        self.row_filter = Some(predicate);
        self
    }

    pub fn with_cell_formatter(mut self, formatter: CellFormatter) -> Self {
        self.cell_formatter = Some(formatter);
        self
    }

    /// 构造预处理器
    ///
    /// # 参数
    /// - mapped_columns: 列映射推导的最小列数（显式配置优先）
    pub fn preprocessor(&self, mapped_columns: usize) -> Preprocessor {
        let mut p = Preprocessor::new()
            .start_row(self.settings.start_row)
            .end_of_data(self.end_of_data.clone())
            .row_filter(self.row_filter.clone())
            .min_column_count(self.settings.min_column_count.unwrap_or(mapped_columns));
        if let Some(f) = &self.cell_formatter {
            p = p.formatter(Arc::clone(f));
        }
        p
    }
}

// ==========================================
// TreeSettings - 树形导入参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// 最后一个单元格 + 层级
    #[default]
    LastValue,
    /// 全部前缀单元格 + 层级
    FullPrefix,
}

impl KeyStrategy {
    pub fn key_fn(&self) -> NodeKeyFn {
        match self {
            KeyStrategy::LastValue => Arc::new(last_value_key),
            KeyStrategy::FullPrefix => Arc::new(full_prefix_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// 第 r 层（1 起）对应的列号为 level_order[r-1]
    pub level_order: Vec<usize>,
    /// 参与建树的最后一列
    pub tree_boundary: usize,
    /// 每行的列数
    pub column_count: usize,
    /// 同层节点并发导入
    pub parallel_nodes: bool,
    pub key_strategy: KeyStrategy,
}

impl TreeSettings {
    /// 严格层序: 0..=boundary 每列一层
    pub fn strict_order(tree_boundary: usize, column_count: usize) -> Self {
        Self {
            level_order: (0..=tree_boundary).collect(),
            tree_boundary,
            column_count,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ImportResult<()> {
        if self.level_order.is_empty() {
            return Err(ImportError::ConfigValueError {
                key: "tree.level_order".to_string(),
                value: String::new(),
                message: "层序不能为空".to_string(),
            });
        }
        if self.tree_boundary >= self.column_count {
            return Err(ImportError::ConfigValueError {
                key: "tree.boundary".to_string(),
                value: self.tree_boundary.to_string(),
                message: format!("建树边界必须小于列数 {}", self.column_count),
            });
        }
        if let Some(col) = self.level_order.iter().find(|c| **c > self.tree_boundary) {
            return Err(ImportError::ConfigValueError {
                key: "tree.level_order".to_string(),
                value: col.to_string(),
                message: format!("层序列号超出建树边界 {}", self.tree_boundary),
            });
        }
        Ok(())
    }
}

// ==========================================
// TreeControl - 树形参数 + 钩子
// ==========================================
#[derive(Clone)]
pub struct TreeControl {
    pub import: ImportControl,
    pub tree: TreeSettings,
    /// 节点键函数（None 按 key_strategy）
    pub key_fn: Option<NodeKeyFn>,
    /// 列结束判定（None 为空单元格）
    pub column_end: Option<ColumnEndFn>,
}

impl TreeControl {
    pub fn new(import: ImportControl, tree: TreeSettings) -> Self {
        Self {
            import,
            tree,
            key_fn: None,
            column_end: None,
        }
    }

    pub fn with_key_fn(mut self, key_fn: NodeKeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn with_column_end(mut self, column_end: ColumnEndFn) -> Self {
        self.column_end = Some(column_end);
        self
    }

    pub fn resolved_key_fn(&self) -> NodeKeyFn {
        self.key_fn
            .clone()
            .unwrap_or_else(|| self.tree.key_strategy.key_fn())
    }

    pub fn resolved_column_end(&self) -> ColumnEndFn {
        self.column_end
            .clone()
            .unwrap_or_else(|| Arc::new(empty_cell_ends_column))
    }
}

// ==========================================
// 表格导入框架 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 文件 / 结构 / 校验 / 导入单元 / 落库正确性 / 配置 / 阶段
// ==========================================

use crate::checker::CorrectnessViolation;
use crate::domain::types::PipelineStage;
use crate::repository::error::RepositoryError;
use thiserror::Error;

fn join_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件写入失败: {0}")]
    FileWriteError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 结构错误（解析阶段立即失败） =====
    #[error("结构错误: {0}")]
    Structural(String),

    #[error("结构错误 (第{line}行): {message}")]
    RowStructural { line: usize, message: String },

    #[error("第{line}行数据错误: 第{rank}层父节点不存在 (key={key})")]
    ParentNotFound { line: usize, rank: usize, key: String },

    // ===== 内容校验错误 =====
    #[error("数据校验失败: {0}")]
    Validation(String),

    #[error("内容检查失败: {failed_rows} 行未通过")]
    ContentCheckFailed { failed_rows: usize },

    // ===== 导入单元错误 =====
    #[error("第{}行导入失败: {source}", join_lines(.lines))]
    UnitFailed {
        lines: Vec<usize>,
        #[source]
        source: Box<ImportError>,
    },

    // ===== 落库正确性 =====
    #[error(transparent)]
    Correctness(#[from] CorrectnessViolation),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 阶段错误 =====
    #[error("流水线阶段错误: 期望 {expected}，当前 {actual}")]
    InvalidStage {
        expected: PipelineStage,
        actual: PipelineStage,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 包装为导入单元失败
    pub fn unit(lines: Vec<usize>, source: ImportError) -> Self {
        ImportError::UnitFailed {
            lines,
            source: Box::new(source),
        }
    }

    /// 是否属于结构错误
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ImportError::Structural(_)
                | ImportError::RowStructural { .. }
                | ImportError::ParentNotFound { .. }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

// ==========================================
// 表格导入框架 - 导入层
// ==========================================
// 职责: 单元格矩阵 → 类型化记录 → 存储
// 支持: Excel, CSV；分段流水线与树形流水线
// ==========================================

// 模块声明
pub mod error;
pub mod file_parser;
pub mod flat_importer;
pub mod format_checker;
pub mod import_traits;
pub mod materializer;
pub mod preprocess;
pub mod progress;
pub mod recorder;
pub mod tree_builder;
pub mod tree_importer;
pub mod worker_pool;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvSheet, ExcelSheet, UniversalSheet};
pub use flat_importer::FlatImporter;
pub use format_checker::FieldViolation;
pub use materializer::Materializer;
pub use preprocess::{default_end_of_data, format_cell, CellFormatter, Preprocessor, RowPredicate};
pub use progress::{ImportReport, ProgressReporter, ProgressState, ProgressStatus};
pub use recorder::{FailureKind, FailureRecord, UnexpectedRecorder};
pub use tree_builder::TreeBuilder;
pub use tree_importer::TreeImporter;
pub use worker_pool::{PoolOutcome, WorkerPool};

// 重导出 Trait 接口
pub use import_traits::{
    ColumnWrites, FlatMiddleware, LevelImporter, PostHandler, Recognizer, SectionChecker,
    SectionImporter, TabularSource, TabularWriter, TreeMiddleware,
};

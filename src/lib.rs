// ==========================================
// 表格导入框架 - 核心库
// ==========================================
// 职责: 表格 → 类型化记录 → 落库，并在导入后校验落库结果
// 技术栈: Rust + SQLite + tokio
// 流水线: 分段（Parse → Check → Import → PostHandle → CheckCorrect）/ 树形
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录、列映射、行上下文、树
pub mod domain;

// 数据仓储层 - 存储句柄
pub mod repository;

// 导入层 - 预处理、物化、流水线
pub mod importer;

// 中间件 - 批量写入、SQL 脚本、回写源表格
pub mod middleware;

// 落库正确性校验
pub mod checker;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能埋点
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域
pub use domain::{
    CellMatrix, ColumnMapping, FieldSpec, FieldValue, Record, RowContext, SectionType, StoredRow,
    Tree, TreeNode, WholeImportContext,
};

// 存储
pub use repository::{ImportStore, QueryFilter, SqliteStore};

// 流水线
pub use importer::{
    FlatImporter, ImportError, ImportReport, ImportResult, TreeBuilder, TreeImporter,
    UniversalSheet,
};

// 中间件
pub use middleware::{BatchWriter, SheetRewriter, SqlScriptWriter};

// 校验器
pub use checker::{
    CorrectnessChecker, PartRecordContentChecker, RecordCountChecker, SimpleLinkChecker,
};

// 配置
pub use config::{ImportControl, ImportSettings, TreeControl, TreeSettings};

// ==========================================
// 常量定义
// ==========================================

// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "表格导入框架";

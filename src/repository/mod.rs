// ==========================================
// 表格导入框架 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供存储句柄接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod import_store;
pub mod sql_builder;
pub mod sqlite_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_store::{insert_record, last_id, ImportStore, QueryFilter, SortOrder, PRIMARY_KEY};
pub use sqlite_store::SqliteStore;

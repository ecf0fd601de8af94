// ==========================================
// 表格导入框架 - 领域模型层
// ==========================================
// 职责: 记录模型、列映射、行上下文、树形结构
// 红线: 不含数据访问逻辑,不含流水线调度
// ==========================================

pub mod mapping;
pub mod record;
pub mod row;
pub mod tree;
pub mod types;

// 重导出核心类型
pub use mapping::{ColumnMapping, ColumnMappingResolver, DeclaredColumnResolver, FieldDescriptor};
pub use record::{FieldSpec, FieldType, NoRecord, Record, RecordFieldError, RecordShape, StoredRow};
pub use row::{
    CellMatrix, ImportEffect, InsertIntent, RowContext, SourceRow, UpdateIntent,
    WholeImportContext,
};
pub use tree::{
    empty_cell_ends_column, full_prefix_key, last_value_key, ColumnEndFn, NodeId, NodeKeyFn,
    Tree, TreeNode, TreeNodeItem, ROOT,
};
pub use types::{FieldKind, FieldValue, FormatCheckId, PipelineStage, SectionType};

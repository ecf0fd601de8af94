// ==========================================
// 表格导入框架 - 落库正确性校验
// ==========================================
// 职责: 导入前采集基线（pre_collect），导入后比对存储（check_correct）
// 实现: 记录数校验 / 部分记录内容校验 / 关联存在性校验
// ==========================================

pub mod part_record_content;
pub mod record_count;
pub mod simple_link;

use crate::importer::error::ImportResult;
use crate::repository::ImportStore;
use async_trait::async_trait;
use thiserror::Error;

pub use part_record_content::{IdContentExpected, OffsetContentExpected, PartRecordContentChecker};
pub use record_count::{CountExpectation, RecordCountChecker};
pub use simple_link::{LinkFn, LinkRule, LinkTarget, SimpleLinkChecker};

/// 落库结果与期望不符
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectnessViolation {
    #[error("记录数不符 (entity={entity}): 导入前 {before}，期望 {expected}，实际 {actual}")]
    CountMismatch {
        entity: String,
        before: i64,
        expected: i64,
        actual: i64,
    },

    #[error("新增记录不足 (entity={entity}): 期望至少 {expected} 条，实际 {actual} 条")]
    RecordShortfall {
        entity: String,
        expected: usize,
        actual: usize,
    },

    #[error("记录缺失 (entity={entity}, id={id})")]
    RecordMissing { entity: String, id: i64 },

    #[error("内容不符 (entity={entity}, {locator}, field={field}): 期望 {expected}，实际 {actual}")]
    ContentMismatch {
        entity: String,
        locator: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("关联缺失 (entity={entity}, id={id}): {target} 中不存在满足 {condition} 的记录")]
    LinkMissing {
        entity: String,
        id: i64,
        target: String,
        condition: String,
    },

    #[error("关联缺失 (entity={entity}): 新增记录中无满足 {condition} 的记录")]
    LinkConditionUnmatched { entity: String, condition: String },

    #[error("未采集基线: {0}")]
    BaselineMissing(String),
}

// ==========================================
// CorrectnessChecker Trait
// ==========================================
// 用途: 导入前后对存储做一致性比对
// 实现者: RecordCountChecker, PartRecordContentChecker, SimpleLinkChecker
#[async_trait]
pub trait CorrectnessChecker: Send + Sync {
    /// 校验器名称（日志用）
    fn name(&self) -> &'static str;

    /// 导入前采集基线
    async fn pre_collect(&mut self, store: &dyn ImportStore) -> ImportResult<()>;

    /// 导入后比对
    async fn check_correct(&self, store: &dyn ImportStore) -> ImportResult<()>;
}

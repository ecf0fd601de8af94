// ==========================================
// 表格导入框架 - 存储句柄 Trait
// ==========================================
// 职责: 定义流水线、中间件与校验器所需的最小存储接口（不包含实现）
// 约束: 过滤条件一律使用匿名 `?` 占位参数
// ==========================================

use crate::domain::record::{Record, StoredRow};
use crate::domain::types::FieldValue;
use crate::repository::error::RepositoryResult;
use crate::repository::sql_builder::quote_ident;
use async_trait::async_trait;
use std::fmt;

/// 主键列名
pub const PRIMARY_KEY: &str = "id";

// ==========================================
// QueryFilter - 查询条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    clause: Option<String>,
    params: Vec<FieldValue>,
}

impl QueryFilter {
    /// 不加条件
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(clause: impl Into<String>, params: Vec<FieldValue>) -> Self {
        Self {
            clause: Some(clause.into()),
            params,
        }
    }

    pub fn raw(clause: impl Into<String>) -> Self {
        Self::new(clause, Vec::new())
    }

    /// 列等值条件
    pub fn eq(column: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(format!("{} = ?", quote_ident(column)), vec![value.into()])
    }

    /// 主键大于 id
    pub fn id_after(id: i64) -> Self {
        Self::new(
            format!("{} > ?", quote_ident(PRIMARY_KEY)),
            vec![FieldValue::Integer(id)],
        )
    }

    /// AND 组合
    pub fn and(self, other: QueryFilter) -> Self {
        match (self.clause, other.clause) {
            (None, None) => Self::all(),
            (Some(c), None) => Self {
                clause: Some(c),
                params: self.params,
            },
            (None, Some(c)) => Self {
                clause: Some(c),
                params: other.params,
            },
            (Some(a), Some(b)) => {
                let mut params = self.params;
                params.extend(other.params);
                Self {
                    clause: Some(format!("({}) AND ({})", a, b)),
                    params,
                }
            }
        }
    }

    pub fn clause(&self) -> Option<&str> {
        self.clause.as_deref()
    }

    pub fn params(&self) -> &[FieldValue] {
        &self.params
    }

    /// 渲染 WHERE 子句（含前导空格），无条件时为空串
    pub fn where_sql(&self) -> String {
        match &self.clause {
            Some(c) => format!(" WHERE {}", c),
            None => String::new(),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.clause {
            None => write!(f, "<all>"),
            Some(c) if self.params.is_empty() => write!(f, "{}", c),
            Some(c) => write!(f, "{} {:?}", c, self.params),
        }
    }
}

/// 主键排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

// ==========================================
// ImportStore Trait
// ==========================================
// 用途: 流水线持有的存储句柄，事务由调用方控制
// 实现者: SqliteStore
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// 插入一行，返回新主键
    async fn create(&self, entity: &str, row: &StoredRow) -> RepositoryResult<i64>;

    /// 条件更新，返回影响行数
    async fn update(
        &self,
        entity: &str,
        updates: &StoredRow,
        wheres: &StoredRow,
    ) -> RepositoryResult<usize>;

    /// 执行原始 SQL（可包含多条语句）
    async fn exec_raw(&self, sql: &str) -> RepositoryResult<()>;

    /// 条件计数
    async fn query_count(&self, entity: &str, filter: &QueryFilter) -> RepositoryResult<i64>;

    /// 按主键排序查询主键列表
    async fn query_ordered(
        &self,
        entity: &str,
        filter: &QueryFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<i64>>;

    /// 按主键加载整行
    async fn load_by_id(&self, entity: &str, id: i64) -> RepositoryResult<Option<StoredRow>>;
}

/// 插入一条记录（实体名与列来自记录声明）
pub async fn insert_record<R: Record>(store: &dyn ImportStore, record: &R) -> RepositoryResult<i64> {
    store.create(R::ENTITY, &record.to_stored_row()).await
}

/// 实体当前最大主键，空表为 0
pub async fn last_id(store: &dyn ImportStore, entity: &str) -> RepositoryResult<i64> {
    let ids = store
        .query_ordered(entity, &QueryFilter::all(), SortOrder::Desc, Some(1))
        .await?;
    Ok(ids.first().copied().unwrap_or(0))
}

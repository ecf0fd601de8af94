// ==========================================
// 表格导入框架 - 关联存在性校验
// ==========================================
// 职责: 导入后检查源实体新增记录（主键大于基线）的关联是否成立
// 模式:
// - Each: 每条新增记录按函数求出目标实体与条件，目标中须存在满足条件的记录
// - Exists: 新增记录中至少一条满足固定条件
// ==========================================

use crate::checker::{CorrectnessChecker, CorrectnessViolation};
use crate::domain::record::StoredRow;
use crate::importer::error::ImportResult;
use crate::repository::{last_id, ImportStore, QueryFilter, SortOrder};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 关联目标: 目标实体 + 条件
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTarget {
    pub entity: String,
    pub filter: QueryFilter,
}

impl LinkTarget {
    pub fn new(entity: impl Into<String>, filter: QueryFilter) -> Self {
        Self {
            entity: entity.into(),
            filter,
        }
    }
}

/// 新增记录 → 关联目标（None 表示该记录无需关联）
pub type LinkFn = Arc<dyn Fn(&StoredRow) -> Option<LinkTarget> + Send + Sync>;

#[derive(Clone)]
pub enum LinkRule {
    Each(LinkFn),
    Exists(QueryFilter),
}

impl fmt::Debug for LinkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRule::Each(_) => write!(f, "Each(<fn>)"),
            LinkRule::Exists(filter) => write!(f, "Exists({})", filter),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimpleLinkChecker {
    entity: String,
    rules: Vec<LinkRule>,
    /// 导入前源实体最大主键（空表为 0）
    baseline: Option<i64>,
}

impl SimpleLinkChecker {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            rules: Vec::new(),
            baseline: None,
        }
    }

    /// 每条新增记录须关联到目标实体
    pub fn each(
        mut self,
        link: impl Fn(&StoredRow) -> Option<LinkTarget> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(LinkRule::Each(Arc::new(link)));
        self
    }

    /// 新增记录中至少一条满足条件
    pub fn exists(mut self, condition: QueryFilter) -> Self {
        self.rules.push(LinkRule::Exists(condition));
        self
    }

    /// 直接指定基线（跳过 pre_collect）
    pub fn with_baseline(mut self, last_id: i64) -> Self {
        self.baseline = Some(last_id);
        self
    }

    fn range(&self) -> ImportResult<QueryFilter> {
        let baseline = self
            .baseline
            .ok_or_else(|| CorrectnessViolation::BaselineMissing(self.entity.clone()))?;
        Ok(QueryFilter::id_after(baseline))
    }

    async fn check_each(&self, store: &dyn ImportStore, link: &LinkFn) -> ImportResult<()> {
        let ids = store
            .query_ordered(&self.entity, &self.range()?, SortOrder::Asc, None)
            .await?;

        for id in ids {
            let Some(row) = store.load_by_id(&self.entity, id).await? else {
                return Err(CorrectnessViolation::RecordMissing {
                    entity: self.entity.clone(),
                    id,
                }
                .into());
            };
            let Some(target) = link(&row) else {
                continue;
            };
            if store.query_count(&target.entity, &target.filter).await? == 0 {
                return Err(CorrectnessViolation::LinkMissing {
                    entity: self.entity.clone(),
                    id,
                    target: target.entity,
                    condition: target.filter.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn check_exists(&self, store: &dyn ImportStore, condition: &QueryFilter) -> ImportResult<()> {
        let filter = self.range()?.and(condition.clone());
        if store.query_count(&self.entity, &filter).await? == 0 {
            return Err(CorrectnessViolation::LinkConditionUnmatched {
                entity: self.entity.clone(),
                condition: condition.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CorrectnessChecker for SimpleLinkChecker {
    fn name(&self) -> &'static str {
        "simple_link"
    }

    async fn pre_collect(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        let id = last_id(store, &self.entity).await?;
        debug!(entity = %self.entity, last_id = id, "关联校验基线");
        self.baseline = Some(id);
        Ok(())
    }

    async fn check_correct(&self, store: &dyn ImportStore) -> ImportResult<()> {
        for rule in &self.rules {
            match rule {
                LinkRule::Each(link) => self.check_each(store, link).await?,
                LinkRule::Exists(condition) => self.check_exists(store, condition).await?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::error::ImportError;
    use crate::repository::SqliteStore;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, SqliteStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path().to_str().unwrap()).unwrap();
        store
            .connection()
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE resource (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, resource_type INTEGER, resource_id INTEGER);
                 CREATE TABLE drink (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
                 INSERT INTO drink (name) VALUES ('cola');",
            )
            .unwrap();
        (file, store)
    }

    fn drink_link(row: &StoredRow) -> Option<LinkTarget> {
        match row.value("resource_type").as_i64() {
            Some(1) => Some(LinkTarget::new(
                "drink",
                QueryFilter::eq("id", row.value("resource_id")),
            )),
            _ => None,
        }
    }

    async fn add_resource(store: &SqliteStore, kind: i64, target: i64) {
        store
            .create(
                "resource",
                &StoredRow::new()
                    .with("name", "r")
                    .with("resource_type", kind)
                    .with("resource_id", target),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_each_link_present_and_missing() {
        let (_file, store) = store();
        add_resource(&store, 1, 99).await;

        let mut checker = SimpleLinkChecker::new("resource").each(drink_link);
        checker.pre_collect(&store).await.unwrap();

        add_resource(&store, 1, 1).await;
        add_resource(&store, 2, 42).await;
        checker.check_correct(&store).await.unwrap();

        add_resource(&store, 1, 7).await;
        let err = checker.check_correct(&store).await.unwrap_err();
        match err {
            ImportError::Correctness(CorrectnessViolation::LinkMissing { target, condition, .. }) => {
                assert_eq!(target, "drink");
                assert!(condition.contains("\"id\" = ?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exists_rule() {
        let (_file, store) = store();
        let mut checker =
            SimpleLinkChecker::new("resource").exists(QueryFilter::eq("resource_type", 2i64));
        checker.pre_collect(&store).await.unwrap();

        add_resource(&store, 1, 1).await;
        assert!(matches!(
            checker.check_correct(&store).await,
            Err(ImportError::Correctness(CorrectnessViolation::LinkConditionUnmatched { .. }))
        ));

        add_resource(&store, 2, 1).await;
        checker.check_correct(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_rules_is_noop() {
        let (_file, store) = store();
        let mut checker = SimpleLinkChecker::new("resource");
        checker.pre_collect(&store).await.unwrap();
        add_resource(&store, 1, 1000).await;
        checker.check_correct(&store).await.unwrap();
    }
}

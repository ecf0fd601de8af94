// ==========================================
// 表格导入框架 - 记录数校验
// ==========================================
// 职责: 导入前记录各实体（可带范围条件）的记录数，导入后断言增量
// ==========================================

use crate::checker::{CorrectnessChecker, CorrectnessViolation};
use crate::importer::error::ImportResult;
use crate::repository::{ImportStore, QueryFilter};
use async_trait::async_trait;
use tracing::debug;

/// 单个实体的记录数期望
#[derive(Debug, Clone)]
pub struct CountExpectation {
    pub entity: String,
    /// 期望增量（可为负）
    pub delta: i64,
    /// 计数范围（None 为全表）
    pub range: Option<QueryFilter>,
    baseline: Option<i64>,
}

impl CountExpectation {
    pub fn new(entity: impl Into<String>, delta: i64) -> Self {
        Self {
            entity: entity.into(),
            delta,
            range: None,
            baseline: None,
        }
    }

    pub fn with_range(mut self, range: QueryFilter) -> Self {
        self.range = Some(range);
        self
    }

    /// 导入前采集到的记录数
    pub fn baseline(&self) -> Option<i64> {
        self.baseline
    }

    fn filter(&self) -> QueryFilter {
        self.range.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordCountChecker {
    expectations: Vec<CountExpectation>,
}

impl RecordCountChecker {
    pub fn new(expectations: Vec<CountExpectation>) -> Self {
        Self { expectations }
    }

    pub fn expect(mut self, expectation: CountExpectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn expectations(&self) -> &[CountExpectation] {
        &self.expectations
    }
}

#[async_trait]
impl CorrectnessChecker for RecordCountChecker {
    fn name(&self) -> &'static str {
        "record_count"
    }

    async fn pre_collect(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        for exp in self.expectations.iter_mut() {
            let count = store.query_count(&exp.entity, &exp.filter()).await?;
            debug!(entity = %exp.entity, count, "记录数基线");
            exp.baseline = Some(count);
        }
        Ok(())
    }

    async fn check_correct(&self, store: &dyn ImportStore) -> ImportResult<()> {
        for exp in &self.expectations {
            let before = exp
                .baseline
                .ok_or_else(|| CorrectnessViolation::BaselineMissing(exp.entity.clone()))?;
            let actual = store.query_count(&exp.entity, &exp.filter()).await?;
            let expected = before + exp.delta;
            if actual != expected {
                return Err(CorrectnessViolation::CountMismatch {
                    entity: exp.entity.clone(),
                    before,
                    expected,
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::StoredRow;
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
            .execute_batch("CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER);")
            .unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn test_delta_matches() {
        let (_file, store) = store();
        store
            .create("person", &StoredRow::new().with("name", "seed").with("age", 1i64))
            .await
            .unwrap();

        let mut checker = RecordCountChecker::default().expect(CountExpectation::new("person", 2));
        checker.pre_collect(&store).await.unwrap();
        assert_eq!(checker.expectations()[0].baseline(), Some(1));

        for name in ["a", "b"] {
            store
                .create("person", &StoredRow::new().with("name", name).with("age", 30i64))
                .await
                .unwrap();
        }
        checker.check_correct(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_reports_counts() {
        let (_file, store) = store();
        let mut checker = RecordCountChecker::new(vec![CountExpectation::new("person", 2)]);
        checker.pre_collect(&store).await.unwrap();
        store
            .create("person", &StoredRow::new().with("name", "a").with("age", 1i64))
            .await
            .unwrap();

        let err = checker.check_correct(&store).await.unwrap_err();
        match err {
            ImportError::Correctness(CorrectnessViolation::CountMismatch {
                before,
                expected,
                actual,
                ..
            }) => {
                assert_eq!((before, expected, actual), (0, 2, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_range_filter_and_empty_checker() {
        let (_file, store) = store();
        let mut checker = RecordCountChecker::default().expect(
            CountExpectation::new("person", 1).with_range(QueryFilter::eq("age", 18i64)),
        );
        checker.pre_collect(&store).await.unwrap();
        store
            .create("person", &StoredRow::new().with("name", "a").with("age", 18i64))
            .await
            .unwrap();
        store
            .create("person", &StoredRow::new().with("name", "b").with("age", 20i64))
            .await
            .unwrap();
        checker.check_correct(&store).await.unwrap();

        let mut empty = RecordCountChecker::default();
        empty.pre_collect(&store).await.unwrap();
        empty.check_correct(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_without_baseline() {
        let (_file, store) = store();
        let checker = RecordCountChecker::default().expect(CountExpectation::new("person", 0));
        assert!(matches!(
            checker.check_correct(&store).await,
            Err(ImportError::Correctness(CorrectnessViolation::BaselineMissing(_)))
        ));
    }
}

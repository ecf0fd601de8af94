// ==========================================
// 表格导入框架 - 部分记录内容校验
// ==========================================
// 职责: 按偏移或主键定位新增记录，逐字段比对带校验键的字段
// 偏移: 导入前记录实体最大主键 L，导入后第 k 条（1 起）为 L 之后按主键升序的第 k 个
// ==========================================

use crate::checker::{CorrectnessChecker, CorrectnessViolation};
use crate::domain::mapping::{ColumnMappingResolver, DeclaredColumnResolver};
use crate::domain::record::{Record, StoredRow};
use crate::domain::types::FieldValue;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::{last_id, ImportStore, QueryFilter, SortOrder};
use async_trait::async_trait;
use tracing::debug;

/// 期望记录中带校验键的字段值
type CheckedValues = Vec<(String, FieldValue)>;

fn checked_values<E: Record>(
    resolver: &dyn ColumnMappingResolver,
    check_key: &str,
    expected: &E,
) -> CheckedValues {
    let mapping = resolver.resolve(&E::shape());
    mapping
        .checked_fields(check_key)
        .map(|f| {
            let value = expected.get(f.ordinal).unwrap_or_default();
            (f.name.clone(), value)
        })
        .collect()
}

fn compare(
    entity: &str,
    locator: String,
    stored: &StoredRow,
    expected: &CheckedValues,
) -> Result<(), CorrectnessViolation> {
    for (field, want) in expected {
        let got = stored.value(field);
        if !got.matches(want) {
            return Err(CorrectnessViolation::ContentMismatch {
                entity: entity.to_string(),
                locator,
                field: field.clone(),
                expected: want.to_string(),
                actual: got.to_string(),
            });
        }
    }
    Ok(())
}

// ==========================================
// OffsetContentExpected - 按偏移定位
// ==========================================
#[derive(Debug, Clone)]
pub struct OffsetContentExpected {
    entity: String,
    items: Vec<(usize, CheckedValues)>,
    last_id: Option<i64>,
}

impl OffsetContentExpected {
    /// # 参数
    /// - check_key: 只比对列映射中 check 等于该键的字段
    /// - items: (偏移（1 起）, 期望记录)
    pub fn new<E: Record>(check_key: &str, items: Vec<(usize, E)>) -> Self {
        Self::with_resolver(&DeclaredColumnResolver, check_key, items)
    }

    pub fn with_resolver<E: Record>(
        resolver: &dyn ColumnMappingResolver,
        check_key: &str,
        items: Vec<(usize, E)>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|(offset, expected)| (offset, checked_values(resolver, check_key, &expected)))
            .collect();
        Self {
            entity: E::ENTITY.to_string(),
            items,
            last_id: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn max_offset(&self) -> usize {
        self.items.iter().map(|(o, _)| *o).max().unwrap_or(0)
    }

    async fn check(&self, store: &dyn ImportStore) -> ImportResult<()> {
        let last = self
            .last_id
            .ok_or_else(|| CorrectnessViolation::BaselineMissing(self.entity.clone()))?;
        if self.items.iter().any(|(o, _)| *o == 0) {
            return Err(ImportError::Structural(format!(
                "实体 {} 的内容期望偏移须从 1 开始",
                self.entity
            )));
        }

        let max_offset = self.max_offset();
        if max_offset == 0 {
            return Ok(());
        }

        let ids = store
            .query_ordered(
                &self.entity,
                &QueryFilter::id_after(last),
                SortOrder::Asc,
                Some(max_offset),
            )
            .await?;
        if ids.len() != max_offset {
            return Err(CorrectnessViolation::RecordShortfall {
                entity: self.entity.clone(),
                expected: max_offset,
                actual: ids.len(),
            }
            .into());
        }

        for (offset, expected) in &self.items {
            let id = ids[offset - 1];
            let stored = store
                .load_by_id(&self.entity, id)
                .await?
                .ok_or_else(|| CorrectnessViolation::RecordMissing {
                    entity: self.entity.clone(),
                    id,
                })?;
            compare(
                &self.entity,
                format!("offset={}, id={}", offset, id),
                &stored,
                expected,
            )?;
        }
        Ok(())
    }
}

// ==========================================
// IdContentExpected - 按主键定位
// ==========================================
#[derive(Debug, Clone)]
pub struct IdContentExpected {
    entity: String,
    items: Vec<(i64, CheckedValues)>,
}

impl IdContentExpected {
    pub fn new<E: Record>(check_key: &str, items: Vec<(i64, E)>) -> Self {
        Self::with_resolver(&DeclaredColumnResolver, check_key, items)
    }

    pub fn with_resolver<E: Record>(
        resolver: &dyn ColumnMappingResolver,
        check_key: &str,
        items: Vec<(i64, E)>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|(id, expected)| (id, checked_values(resolver, check_key, &expected)))
            .collect();
        Self {
            entity: E::ENTITY.to_string(),
            items,
        }
    }

    async fn check(&self, store: &dyn ImportStore) -> ImportResult<()> {
        for (id, expected) in &self.items {
            let stored = store
                .load_by_id(&self.entity, *id)
                .await?
                .ok_or_else(|| CorrectnessViolation::RecordMissing {
                    entity: self.entity.clone(),
                    id: *id,
                })?;
            compare(&self.entity, format!("id={}", id), &stored, expected)?;
        }
        Ok(())
    }
}

// ==========================================
// PartRecordContentChecker
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PartRecordContentChecker {
    offsets: Vec<OffsetContentExpected>,
    ids: Vec<IdContentExpected>,
}

impl PartRecordContentChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offsets(mut self, expected: OffsetContentExpected) -> Self {
        self.offsets.push(expected);
        self
    }

    pub fn with_ids(mut self, expected: IdContentExpected) -> Self {
        self.ids.push(expected);
        self
    }
}

#[async_trait]
impl CorrectnessChecker for PartRecordContentChecker {
    fn name(&self) -> &'static str {
        "part_record_content"
    }

    async fn pre_collect(&mut self, store: &dyn ImportStore) -> ImportResult<()> {
        for exp in self.offsets.iter_mut() {
            let id = last_id(store, &exp.entity).await?;
            debug!(entity = %exp.entity, last_id = id, "内容校验基线");
            exp.last_id = Some(id);
        }
        Ok(())
    }

    async fn check_correct(&self, store: &dyn ImportStore) -> ImportResult<()> {
        for exp in &self.offsets {
            exp.check(store).await?;
        }
        for exp in &self.ids {
            exp.check(store).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::FieldSpec;
    use crate::repository::{insert_record, SqliteStore};
    use tempfile::NamedTempFile;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Person {
        name: String,
        age: i64,
        note: String,
    }

    crate::impl_record!(Person, "person", {
        name: String => FieldSpec::new("name").check("on"),
        age: i64 => FieldSpec::new("age").check("on"),
        note: String => FieldSpec::new("note"),
    });

    fn person(name: &str, age: i64, note: &str) -> Person {
        Person {
            name: name.to_string(),
            age,
            note: note.to_string(),
        }
    }

    fn store() -> (NamedTempFile, SqliteStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path().to_str().unwrap()).unwrap();
        store
            .connection()
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER, note TEXT);",
            )
            .unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn test_offsets_match_insertion_order_ignoring_unchecked() {
        let (_file, store) = store();
        insert_record(&store, &person("old", 1, "")).await.unwrap();

        let mut checker = PartRecordContentChecker::new().with_offsets(OffsetContentExpected::new(
            "on",
            vec![(1, person("a", 20, "x")), (3, person("c", 22, "different"))],
        ));
        checker.pre_collect(&store).await.unwrap();

        for p in [person("a", 20, "x"), person("b", 21, "y"), person("c", 22, "z")] {
            insert_record(&store, &p).await.unwrap();
        }
        checker.check_correct(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_and_shortfall() {
        let (_file, store) = store();
        let mut checker = PartRecordContentChecker::new().with_offsets(OffsetContentExpected::new(
            "on",
            vec![(1, person("a", 99, ""))],
        ));
        checker.pre_collect(&store).await.unwrap();
        insert_record(&store, &person("a", 20, "")).await.unwrap();
        let err = checker.check_correct(&store).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Correctness(CorrectnessViolation::ContentMismatch { ref field, .. }) if field == "age"
        ));

        let mut short = PartRecordContentChecker::new().with_offsets(OffsetContentExpected::new(
            "on",
            vec![(2, person("b", 1, ""))],
        ));
        short.pre_collect(&store).await.unwrap();
        insert_record(&store, &person("b", 1, "")).await.unwrap();
        assert!(matches!(
            short.check_correct(&store).await,
            Err(ImportError::Correctness(CorrectnessViolation::RecordShortfall { expected: 2, actual: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_id_expectations() {
        let (_file, store) = store();
        let id = insert_record(&store, &person("a", 20, "")).await.unwrap();
        let checker = PartRecordContentChecker::new()
            .with_ids(IdContentExpected::new("on", vec![(id, person("a", 20, "ignored"))]));
        checker.check_correct(&store).await.unwrap();

        let missing = PartRecordContentChecker::new()
            .with_ids(IdContentExpected::new("on", vec![(id + 10, person("a", 20, ""))]));
        assert!(matches!(
            missing.check_correct(&store).await,
            Err(ImportError::Correctness(CorrectnessViolation::RecordMissing { .. }))
        ));
    }

    #[tokio::test]
    async fn test_zero_offset_is_structural() {
        let (_file, store) = store();
        let mut checker = PartRecordContentChecker::new()
            .with_offsets(OffsetContentExpected::new("on", vec![(0, person("a", 1, ""))]));
        checker.pre_collect(&store).await.unwrap();
        assert!(checker.check_correct(&store).await.unwrap_err().is_structural());
    }
}

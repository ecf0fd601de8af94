// ==========================================
// 落库正确性校验集成测试
// ==========================================
// 测试目标: 校验器随流水线采集基线并在导入后比对；调用方事务回滚
// ==========================================

mod test_helpers;

use async_trait::async_trait;
use sheet_import::checker::{
    CorrectnessChecker, CorrectnessViolation, CountExpectation, IdContentExpected,
    LinkTarget, PartRecordContentChecker, RecordCountChecker, SimpleLinkChecker,
};
use sheet_import::config::{ImportControl, ImportSettings};
use sheet_import::domain::{FieldSpec, RowContext, StoredRow};
use sheet_import::importer::{FlatImporter, ImportError, ImportResult, SectionImporter};
use sheet_import::repository::{insert_record, ImportStore, QueryFilter};
use test_helpers::{count_rows, create_test_store, matrix, open_test_connection};

#[derive(Debug, Clone, Default, PartialEq)]
struct Resource {
    name: String,
    resource_type: i64,
    resource_id: i64,
}

sheet_import::impl_record!(Resource, "resource", {
    name: String => FieldSpec::new("name").check("all"),
    resource_type: i64 => FieldSpec::new("resource_type").check("all"),
    resource_id: i64 => FieldSpec::new("resource_id").link("drink"),
});

struct ResourceImporter;

#[async_trait]
impl SectionImporter<Resource> for ResourceImporter {
    async fn import(&self, store: &dyn ImportStore, row: &mut RowContext<Resource>) -> ImportResult<()> {
        insert_record(store, row.record()).await?;
        Ok(())
    }
}

/// resource_type 为 1 的资源须关联到存在的饮品
fn drink_link(row: &StoredRow) -> Option<LinkTarget> {
    match row.value("resource_type").as_i64() {
        Some(1) => Some(LinkTarget::new(
            "drink",
            QueryFilter::eq("id", row.value("resource_id")),
        )),
        _ => None,
    }
}

fn seed_drink(db_path: &str) {
    let conn = open_test_connection(db_path).unwrap();
    conn.execute("INSERT INTO drink (name) VALUES ('cola')", [])
        .unwrap();
}

fn pipeline(store: std::sync::Arc<sheet_import::SqliteStore>) -> FlatImporter<Resource> {
    FlatImporter::one_section(
        store,
        ImportControl::new(ImportSettings::default()),
        ResourceImporter,
    )
    .unwrap()
}

#[tokio::test]
async fn test_link_and_count_pass() {
    let (_temp_file, db_path, store) = create_test_store();
    seed_drink(&db_path);

    let mut pipeline = pipeline(store.clone());
    let checkers: Vec<Box<dyn CorrectnessChecker>> = vec![
        Box::new(RecordCountChecker::new(vec![
            CountExpectation::new("resource", 3),
            CountExpectation::new("resource", 2).with_range(QueryFilter::eq("resource_type", 1i64)),
        ])),
        Box::new(
            SimpleLinkChecker::new("resource")
                .each(drink_link)
                .exists(QueryFilter::eq("resource_type", 2i64)),
        ),
    ];
    pipeline.enable_correctness_check(checkers).await.unwrap();

    let data = matrix(&[
        &["名称", "类型", "关联"],
        &["r1", "1", "1"],
        &["r2", "2", "77"],
        &["r3", "1", "1"],
    ]);
    let report = pipeline.run(data).await.unwrap();
    assert_eq!(report.progress.succeeded, 3);
}

#[tokio::test]
async fn test_missing_link_fails_and_caller_rolls_back() {
    let (_temp_file, db_path, store) = create_test_store();
    seed_drink(&db_path);

    let mut pipeline = pipeline(store.clone());
    let checkers: Vec<Box<dyn CorrectnessChecker>> =
        vec![Box::new(SimpleLinkChecker::new("resource").each(drink_link))];
    pipeline.enable_correctness_check(checkers).await.unwrap();

    let data = matrix(&[
        &["名称", "类型", "关联"],
        &["r1", "1", "1"],
        &["r2", "1", "99"],
    ]);

    store.begin().unwrap();
    let err = pipeline.run(data).await.unwrap_err();
    store.rollback().unwrap();

    match err {
        ImportError::Correctness(CorrectnessViolation::LinkMissing { target, condition, .. }) => {
            assert_eq!(target, "drink");
            assert!(condition.contains("\"id\""));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count_rows(&db_path, "resource"), 0);
}

#[tokio::test]
async fn test_count_mismatch_names_expected_and_actual() {
    let (_temp_file, _db_path, store) = create_test_store();

    let mut pipeline = pipeline(store.clone());
    let checkers: Vec<Box<dyn CorrectnessChecker>> = vec![Box::new(RecordCountChecker::new(
        vec![CountExpectation::new("resource", 5)],
    ))];
    pipeline.enable_correctness_check(checkers).await.unwrap();

    let err = pipeline
        .run(matrix(&[&["名称", "类型", "关联"], &["r1", "2", "0"]]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Correctness(CorrectnessViolation::CountMismatch {
            before: 0,
            expected: 5,
            actual: 1,
            ..
        })
    ));
    assert!(err.to_string().contains("期望 5"));
}

#[tokio::test]
async fn test_id_content_after_import() {
    let (_temp_file, _db_path, store) = create_test_store();

    let mut pipeline = pipeline(store.clone());
    pipeline
        .run(matrix(&[&["名称", "类型", "关联"], &["r1", "2", "5"], &["r2", "3", "6"]]))
        .await
        .unwrap();

    let expected = Resource {
        name: "r2".to_string(),
        resource_type: 3,
        resource_id: 0,
    };
    let checker = PartRecordContentChecker::new()
        .with_ids(IdContentExpected::new("all", vec![(2, expected.clone())]));
    checker.check_correct(store.as_ref()).await.unwrap();

    let wrong = Resource {
        resource_type: 4,
        ..expected
    };
    let checker = PartRecordContentChecker::new()
        .with_ids(IdContentExpected::new("all", vec![(2, wrong)]));
    let err = checker.check_correct(store.as_ref()).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::Correctness(CorrectnessViolation::ContentMismatch { ref field, .. }) if field == "resource_type"
    ));
}

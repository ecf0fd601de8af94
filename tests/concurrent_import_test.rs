// ==========================================
// 并发导入测试
// ==========================================
// 测试目标: 有界并发下的计数一致性、失败后停止准入、并发 + 批量写入
// ==========================================

mod test_helpers;

use async_trait::async_trait;
use sheet_import::config::{ImportControl, ImportSettings};
use sheet_import::domain::{FieldSpec, RowContext};
use sheet_import::importer::{FlatImporter, ImportError, ImportResult, SectionImporter};
use sheet_import::logging;
use sheet_import::repository::{insert_record, ImportStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_helpers::{count_rows, create_test_store};

#[derive(Debug, Clone, Default, PartialEq)]
struct Product {
    name: String,
    count: i64,
    price: f64,
}

sheet_import::impl_record!(Product, "product", {
    name: String => FieldSpec::new("name"),
    count: i64 => FieldSpec::new("count"),
    price: f64 => FieldSpec::new("price"),
});

/// 记录同时在途的最大行数
#[derive(Default)]
struct ProductImporter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fail_on: Option<String>,
    staged: bool,
}

#[async_trait]
impl SectionImporter<Product> for Arc<ProductImporter> {
    async fn import(&self, store: &dyn ImportStore, row: &mut RowContext<Product>) -> ImportResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.as_deref() == Some(row.record().name.as_str()) {
            return Err(ImportError::Validation("拒绝写入".to_string()));
        }
        if self.staged {
            row.stage_insert();
        } else {
            insert_record(store, row.record()).await?;
        }
        Ok(())
    }
}

fn product_matrix(rows: usize) -> Vec<Vec<String>> {
    let mut matrix = vec![vec!["名称".to_string(), "数量".to_string(), "单价".to_string()]];
    for i in 0..rows {
        matrix.push(vec![format!("p{:03}", i), i.to_string(), format!("{}.5", i)]);
    }
    matrix
}

fn parallel_settings(max_parallel: usize) -> ImportSettings {
    let mut settings = ImportSettings::default();
    settings.enable_parallel = true;
    settings.max_parallel = max_parallel;
    settings
}

#[tokio::test]
async fn test_parallel_import_counts_every_row() {
    logging::init_test();
    let (_temp_file, db_path, store) = create_test_store();

    let importer = Arc::new(ProductImporter::default());
    let mut pipeline = FlatImporter::one_section(
        store.clone(),
        ImportControl::new(parallel_settings(4)),
        Arc::clone(&importer),
    )
    .unwrap();

    let start = Instant::now();
    let report = pipeline.run(product_matrix(100)).await.unwrap();
    println!("并发导入 100 行耗时: {:?}", start.elapsed());

    assert_eq!(report.progress.total, 100);
    assert_eq!(report.progress.completed, 100);
    assert_eq!(report.progress.succeeded, 100);
    assert_eq!(report.progress.failed, 0);
    assert!(importer.peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(count_rows(&db_path, "product"), 100);
}

#[tokio::test]
async fn test_parallel_failure_stops_admission() {
    let (_temp_file, db_path, store) = create_test_store();

    let importer = Arc::new(ProductImporter {
        fail_on: Some("p010".to_string()),
        ..ProductImporter::default()
    });
    let mut pipeline = FlatImporter::one_section(
        store.clone(),
        ImportControl::new(parallel_settings(2)),
        Arc::clone(&importer),
    )
    .unwrap();

    let err = pipeline.run(product_matrix(100)).await.unwrap_err();
    match err {
        // p010 位于矩阵第 12 行（表头占第 1 行）
        ImportError::UnitFailed { lines, .. } => assert_eq!(lines, vec![12]),
        other => panic!("unexpected error: {other}"),
    }

    let state = pipeline.progress().snapshot();
    assert_eq!(state.failed, 1);
    assert!(state.completed < 100);
    let imported = count_rows(&db_path, "product");
    assert!(imported >= 10 && imported < 99, "imported = {imported}");
}

#[tokio::test]
async fn test_parallel_import_with_batch_writer() {
    let (_temp_file, db_path, store) = create_test_store();

    let mut settings = parallel_settings(4);
    settings.enable_batch = true;
    settings.batch_size = 7;

    let importer = Arc::new(ProductImporter {
        staged: true,
        ..ProductImporter::default()
    });
    let mut pipeline = FlatImporter::one_section(
        store.clone(),
        ImportControl::new(settings),
        Arc::clone(&importer),
    )
    .unwrap();

    let report = pipeline.run(product_matrix(50)).await.unwrap();
    assert_eq!(report.progress.succeeded, 50);
    assert_eq!(count_rows(&db_path, "product"), 50);
}

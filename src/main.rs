// ==========================================
// 表格导入框架 - 命令行入口
// ==========================================
// 用途: 把一个表格文件的全部数据行原样导入到 SQLite 表
// 表结构: id 自增主键 + c0..cN 文本列（列数取数据行最大宽度）
// ==========================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use sheet_import::checker::{CorrectnessChecker, CountExpectation, RecordCountChecker};
use sheet_import::config::{ConfigManager, ImportConfigReader, ImportControl, ImportSettings};
use sheet_import::domain::{FieldValue, InsertIntent, NoRecord, RowContext, StoredRow};
use sheet_import::importer::{
    FlatImporter, ImportResult, SectionImporter, TabularSource, UniversalSheet,
};
use sheet_import::repository::sql_builder::quote_ident;
use sheet_import::repository::{ImportStore, SqliteStore};
use sheet_import::{logging, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// 表格导入: 读取 CSV/Excel 并写入 SQLite
#[derive(Parser, Debug)]
#[command(name = "sheet-import")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 表格文件 (.csv/.xlsx/.xls)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// 数据库文件（默认: 用户数据目录下的 sheet-import/import.db）
    #[arg(long)]
    db: Option<PathBuf>,

    /// 目标表名（不存在时自动创建）
    #[arg(long)]
    table: String,

    /// 数据起始行（0 起）
    #[arg(long)]
    start_row: Option<usize>,

    /// 并发上限（大于 1 时启用并发导入）
    #[arg(long)]
    parallel: Option<usize>,

    /// 批大小（指定后启用批量写入）
    #[arg(long)]
    batch_size: Option<usize>,

    /// 启用格式校验
    #[arg(long)]
    format_check: bool,

    /// 失败明细目录
    #[arg(long)]
    failure_dir: Option<PathBuf>,

    /// 以 JSON 行输出日志
    #[arg(long)]
    log_json: bool,
}

/// 默认数据库路径
///
/// 优先读取环境变量 SHEET_IMPORT_DB_PATH，其次为用户数据目录
fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHEET_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    match dirs::data_local_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("sheet-import");
            std::fs::create_dir_all(&dir).ok();
            dir.join("import.db")
        }
        None => PathBuf::from("./import.db"),
    }
}

/// 命令行参数覆盖配置表中的导入参数
fn apply_overrides(mut settings: ImportSettings, cli: &Cli) -> ImportSettings {
    if let Some(start_row) = cli.start_row {
        settings.start_row = start_row;
    }
    if let Some(parallel) = cli.parallel {
        settings.enable_parallel = parallel > 1;
        settings.max_parallel = parallel.max(1);
    }
    if let Some(batch_size) = cli.batch_size {
        settings.enable_batch = true;
        settings.batch_size = batch_size;
    }
    if cli.format_check {
        settings.enable_format_check = true;
    }
    if let Some(dir) = &cli.failure_dir {
        settings.failure_dir = Some(dir.clone());
    }
    settings
}

// ==========================================
// RawRowImporter - 按列号原样写入
// ==========================================
struct RawRowImporter {
    table: String,
    columns: usize,
    /// 只登记插入意图，由批量写入中间件执行
    staged: bool,
}

impl RawRowImporter {
    fn stored_row(&self, cells: &[String]) -> StoredRow {
        (0..self.columns)
            .map(|i| {
                let cell = cells.get(i).cloned().unwrap_or_default();
                (format!("c{}", i), FieldValue::from(cell))
            })
            .collect()
    }
}

#[async_trait]
impl SectionImporter<NoRecord> for RawRowImporter {
    async fn import(
        &self,
        store: &dyn ImportStore,
        row: &mut RowContext<NoRecord>,
    ) -> ImportResult<()> {
        let stored = self.stored_row(row.cells());
        if self.staged {
            row.effect_mut().insert = Some(InsertIntent::new(self.table.clone(), stored));
        } else {
            store.create(&self.table, &stored).await?;
        }
        Ok(())
    }
}

async fn ensure_table(store: &SqliteStore, table: &str, columns: usize) -> Result<()> {
    let column_defs: Vec<String> = (0..columns)
        .map(|i| format!("{} TEXT", quote_ident(&format!("c{}", i))))
        .collect();
    let mut defs = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    defs.extend(column_defs);
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(table),
        defs.join(", ")
    );
    store.exec_raw(&sql).await?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let db_path = db_path.to_string_lossy().to_string();
    info!(db = %db_path, file = %cli.file.display(), table = %cli.table, "开始导入");

    let store = SqliteStore::open(&db_path)?;

    // 配置表 → 命令行覆盖
    let config = ConfigManager::from_connection(store.connection())?;
    let settings = config
        .load_import_settings(ImportSettings::default())
        .await?;
    let settings = apply_overrides(settings, &cli);
    settings.validate()?;
    let control = ImportControl::new(settings.clone());

    let matrix = UniversalSheet
        .read(&cli.file)
        .with_context(|| format!("读取表格失败: {}", cli.file.display()))?;
    let data_rows = control.preprocessor(0).run(matrix.clone());
    let columns = data_rows
        .iter()
        .map(|r| r.cells.len())
        .max()
        .unwrap_or(0);

    ensure_table(&store, &cli.table, columns).await?;

    let importer = RawRowImporter {
        table: cli.table.clone(),
        columns,
        staged: settings.enable_batch,
    };
    let shared: Arc<dyn ImportStore> = Arc::new(store.clone());
    let mut pipeline = FlatImporter::one_section(shared, control, importer)?;
    let checkers: Vec<Box<dyn CorrectnessChecker>> = vec![Box::new(RecordCountChecker::new(
        vec![CountExpectation::new(cli.table.clone(), data_rows.len() as i64)],
    ))];

    store.begin()?;
    let result = async {
        pipeline.enable_correctness_check(checkers).await?;
        pipeline.run(matrix).await
    }
    .await;

    match result {
        Ok(report) => {
            store.commit()?;
            info!(run_id = %report.run_id, units = report.units, "导入完成");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "导入失败，回滚");
            store.rollback()?;
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    info!("表格导入框架 v{}", VERSION);
    run(cli).await
}

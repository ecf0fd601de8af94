// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、测试表结构、单元格矩阵构造
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use sheet_import::domain::CellMatrix;
use sheet_import::repository::SqliteStore;
use std::error::Error;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();

    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试数据库连接
pub fn open_test_connection(db_path: &str) -> Result<Connection, Box<dyn Error>> {
    Ok(Connection::open(db_path)?)
}

/// 创建测试数据库并打开共享存储句柄
pub fn create_test_store() -> (NamedTempFile, String, Arc<SqliteStore>) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let store = SqliteStore::open(&db_path).expect("Failed to open store");
    (temp_file, db_path, Arc::new(store))
}

/// 初始化测试表
fn init_schema(conn: &Connection) -> Result<(), Box<dyn Error>> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS person (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            age INTEGER,
            email TEXT
        );

        CREATE TABLE IF NOT EXISTS product (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            count INTEGER,
            price REAL,
            code TEXT
        );

        CREATE TABLE IF NOT EXISTS resource (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            resource_type INTEGER,
            resource_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS drink (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT
        );

        CREATE TABLE IF NOT EXISTS shoes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            size INTEGER
        );

        CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            parent_id INTEGER,
            rank INTEGER
        );

        CREATE TABLE IF NOT EXISTS item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER,
            l1 TEXT,
            l2 TEXT,
            l3 TEXT,
            amount INTEGER
        );
        "#,
    )?;
    Ok(())
}

/// 由字符串切片构造单元格矩阵
pub fn matrix(rows: &[&[&str]]) -> CellMatrix {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// 统计表记录数
pub fn count_rows(db_path: &str, table: &str) -> i64 {
    let conn = open_test_connection(db_path).expect("Failed to open db");
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("Failed to count rows")
}

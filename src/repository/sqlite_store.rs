// ==========================================
// 表格导入框架 - SQLite 存储句柄
// ==========================================
// 职责: ImportStore 的 SQLite 实现 + 调用方事务控制
// 约束: 单条写入/查询全部参数化；实体名统一转义
// ==========================================

use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::domain::record::StoredRow;
use crate::domain::types::FieldValue;
use crate::perf::install_sqlite_tracing;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_store::{ImportStore, QueryFilter, SortOrder, PRIMARY_KEY};
use crate::repository::sql_builder::{insert_placeholders, quote_ident};
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            FieldValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn field_value_from_ref(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(v) => FieldValue::Integer(v),
        ValueRef::Real(v) => FieldValue::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn ensure_entity(entity: &str) -> RepositoryResult<()> {
    if entity.trim().is_empty() {
        return Err(RepositoryError::InvalidEntity(entity.to_string()));
    }
    Ok(())
}

// ==========================================
// SqliteStore
// ==========================================
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开数据库文件
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        install_sqlite_tracing(&mut conn);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（会再次应用统一 PRAGMA，幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 共享底层连接（供 ConfigManager 等复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 调用方事务 =====

    pub fn begin(&self) -> RepositoryResult<()> {
        self.get_conn()?
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    pub fn commit(&self) -> RepositoryResult<()> {
        self.get_conn()?
            .execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    pub fn rollback(&self) -> RepositoryResult<()> {
        self.get_conn()?
            .execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }
}

#[async_trait]
impl ImportStore for SqliteStore {
    async fn create(&self, entity: &str, row: &StoredRow) -> RepositoryResult<i64> {
        ensure_entity(entity)?;
        let sql = insert_placeholders(entity, row);
        let conn = self.get_conn()?;
        conn.execute(&sql, params_from_iter(row.iter().map(|(_, v)| v)))?;
        Ok(conn.last_insert_rowid())
    }

    async fn update(
        &self,
        entity: &str,
        updates: &StoredRow,
        wheres: &StoredRow,
    ) -> RepositoryResult<usize> {
        ensure_entity(entity)?;
        if updates.is_empty() {
            return Ok(0);
        }

        let sets: Vec<String> = updates
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut params: Vec<&FieldValue> = updates.iter().map(|(_, v)| v).collect();
        let mut sql = format!("UPDATE {} SET {}", quote_ident(entity), sets.join(", "));

        if !wheres.is_empty() {
            let conds: Vec<String> = wheres
                .iter()
                .map(|(c, v)| {
                    if v.is_null() {
                        format!("{} IS NULL", quote_ident(c))
                    } else {
                        params.push(v);
                        format!("{} = ?", quote_ident(c))
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conds.join(" AND "));
        }

        let conn = self.get_conn()?;
        let affected = conn.execute(&sql, params_from_iter(params))?;
        Ok(affected)
    }

    async fn exec_raw(&self, sql: &str) -> RepositoryResult<()> {
        debug!(sql_len = sql.len(), "执行原始 SQL");
        self.get_conn()?.execute_batch(sql)?;
        Ok(())
    }

    async fn query_count(&self, entity: &str, filter: &QueryFilter) -> RepositoryResult<i64> {
        ensure_entity(entity)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(entity),
            filter.where_sql()
        );
        let conn = self.get_conn()?;
        let count = conn.query_row(&sql, params_from_iter(filter.params()), |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(count)
    }

    async fn query_ordered(
        &self,
        entity: &str,
        filter: &QueryFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<i64>> {
        ensure_entity(entity)?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {pk} FROM {table}{filter} ORDER BY {pk} {order} LIMIT {limit}",
            pk = quote_ident(PRIMARY_KEY),
            table = quote_ident(entity),
            filter = filter.where_sql(),
            order = order.as_sql(),
            limit = limit,
        );
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(filter.params()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn load_by_id(&self, entity: &str, id: i64) -> RepositoryResult<Option<StoredRow>> {
        ensure_entity(entity)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1",
            quote_ident(entity),
            quote_ident(PRIMARY_KEY)
        );
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let row = stmt
            .query_row([id], |row| {
                let mut out = StoredRow::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), field_value_from_ref(row.get_ref(i)?));
                }
                Ok(out)
            })
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, SqliteStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path().to_str().unwrap()).unwrap();
        {
            let conn = store.get_conn().unwrap();
            conn.execute_batch(
                "CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER, score REAL);",
            )
            .unwrap();
        }
        (file, store)
    }

    #[tokio::test]
    async fn test_create_load_and_count() {
        let (_file, store) = setup();
        let id = store
            .create(
                "person",
                &StoredRow::new().with("name", "tom").with("age", 20i64),
            )
            .await
            .unwrap();
        assert_eq!(id, 1);

        let row = store.load_by_id("person", id).await.unwrap().unwrap();
        assert_eq!(row.value("name"), FieldValue::Text("tom".into()));
        assert_eq!(row.value("age"), FieldValue::Integer(20));
        assert_eq!(row.value("score"), FieldValue::Null);
        assert!(store.load_by_id("person", 99).await.unwrap().is_none());

        let count = store
            .query_count("person", &QueryFilter::eq("name", "tom"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_query_ordered_and_update() {
        let (_file, store) = setup();
        for i in 0..5i64 {
            store
                .create("person", &StoredRow::new().with("age", i))
                .await
                .unwrap();
        }
        let desc = store
            .query_ordered("person", &QueryFilter::all(), SortOrder::Desc, Some(2))
            .await
            .unwrap();
        assert_eq!(desc, vec![5, 4]);
        let asc = store
            .query_ordered("person", &QueryFilter::id_after(3), SortOrder::Asc, None)
            .await
            .unwrap();
        assert_eq!(asc, vec![4, 5]);

        let affected = store
            .update(
                "person",
                &StoredRow::new().with("name", "x"),
                &StoredRow::new().with("age", 1i64),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (_file, store) = setup();
        store.begin().unwrap();
        store
            .create("person", &StoredRow::new().with("name", "tmp"))
            .await
            .unwrap();
        store.rollback().unwrap();
        let count = store
            .query_count("person", &QueryFilter::all())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(store.create("", &StoredRow::new()).await.is_err());
    }
}

// ==========================================
// 表格导入框架 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::{ImportSettings, KeyStrategy, TreeSettings};
use crate::db::open_sqlite_connection;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 预处理
    pub const START_ROW: &str = "import.start_row";
    pub const MIN_COLUMN_COUNT: &str = "import.min_column_count";
    pub const STRICT_TYPES: &str = "import.strict_types";

    // 并发
    pub const ENABLE_PARALLEL: &str = "import.enable_parallel";
    pub const MAX_PARALLEL: &str = "import.max_parallel";

    // 批量写入
    pub const ENABLE_BATCH: &str = "import.enable_batch";
    pub const BATCH_SIZE: &str = "import.batch_size";

    // 校验与失败明细
    pub const ENABLE_FORMAT_CHECK: &str = "import.enable_format_check";
    pub const FAILURE_DIR: &str = "import.failure_dir";

    // 树形导入
    pub const TREE_LEVEL_ORDER: &str = "tree.level_order";
    pub const TREE_BOUNDARY: &str = "tree.boundary";
    pub const TREE_COLUMN_COUNT: &str = "tree.column_count";
    pub const TREE_PARALLEL_NODES: &str = "tree.parallel_nodes";
    pub const TREE_KEY_STRATEGY: &str = "tree.key_strategy";
}

fn lock_error(e: impl std::fmt::Display) -> ImportError {
    ImportError::ConfigReadError {
        key: String::new(),
        message: format!("锁获取失败: {}", e),
    }
}

fn value_error(key: &str, value: &str, message: impl Into<String>) -> ImportError {
    ImportError::ConfigValueError {
        key: key.to_string(),
        value: value.to_string(),
        message: message.into(),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ImportResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| value_error(key, value, "不是合法的非负整数"))
}

fn parse_bool(key: &str, value: &str) -> ImportResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(value_error(key, value, "不是合法的布尔值")),
    }
}

/// 层序: 逗号分隔的列号，如 "0,1,2"
fn parse_level_order(key: &str, value: &str) -> ImportResult<Vec<usize>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_number::<usize>(key, s))
        .collect()
}

fn parse_key_strategy(key: &str, value: &str) -> ImportResult<KeyStrategy> {
    match value.trim().to_lowercase().as_str() {
        "last_value" => Ok(KeyStrategy::LastValue),
        "full_prefix" => Ok(KeyStrategy::FullPrefix),
        _ => Err(value_error(key, value, "仅支持 last_value / full_prefix")),
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        let manager = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        manager.ensure_table()?;
        Ok(manager)
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        {
            let conn_guard = conn.lock().map_err(lock_error)?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }
        let manager = Self { conn };
        manager.ensure_table()?;
        Ok(manager)
    }

    /// 确保 config_kv 表存在
    pub fn ensure_table(&self) -> ImportResult<()> {
        let conn = self.conn.lock().map_err(lock_error)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_id, key)
            )",
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self.conn.lock().map_err(lock_error)?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.conn.lock().map_err(lock_error)?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        debug!(key, value, "配置已写入");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 在失败明细旁记录本次导入使用的配置
    pub fn get_config_snapshot(&self) -> ImportResult<String> {
        let conn = self.conn.lock().map_err(lock_error)?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&json!(config_map))
            .map_err(|e| ImportError::InternalError(e.to_string()))
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的global配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> ImportResult<usize> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)
            .map_err(|e| value_error("snapshot", snapshot_json, e.to_string()))?;

        let mut conn = self.conn.lock().map_err(lock_error)?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 读取并解析一个配置值；不存在时返回 None
    fn read_parsed<T>(
        &self,
        key: &str,
        parse: impl Fn(&str, &str) -> ImportResult<T>,
    ) -> ImportResult<Option<T>> {
        match self.get_config_value(key)? {
            Some(raw) => parse(key, &raw).map(Some),
            None => Ok(None),
        }
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn load_import_settings(&self, base: ImportSettings) -> ImportResult<ImportSettings> {
        let mut s = base;

        // ===== 预处理 =====
        if let Some(v) = self.read_parsed(config_keys::START_ROW, parse_number)? {
            s.start_row = v;
        }
        if let Some(v) = self.read_parsed(config_keys::MIN_COLUMN_COUNT, parse_number)? {
            s.min_column_count = Some(v);
        }
        if let Some(v) = self.read_parsed(config_keys::STRICT_TYPES, parse_bool)? {
            s.strict_types = v;
        }

        // ===== 并发与批量 =====
        if let Some(v) = self.read_parsed(config_keys::ENABLE_PARALLEL, parse_bool)? {
            s.enable_parallel = v;
        }
        if let Some(v) = self.read_parsed(config_keys::MAX_PARALLEL, parse_number)? {
            s.max_parallel = v;
        }
        if let Some(v) = self.read_parsed(config_keys::ENABLE_BATCH, parse_bool)? {
            s.enable_batch = v;
        }
        if let Some(v) = self.read_parsed(config_keys::BATCH_SIZE, parse_number)? {
            s.batch_size = v;
        }

        // ===== 校验 =====
        if let Some(v) = self.read_parsed(config_keys::ENABLE_FORMAT_CHECK, parse_bool)? {
            s.enable_format_check = v;
        }
        if let Some(dir) = self.get_config_value(config_keys::FAILURE_DIR)? {
            let dir = dir.trim();
            s.failure_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }

        s.validate()?;
        Ok(s)
    }

    async fn load_tree_settings(&self, base: TreeSettings) -> ImportResult<TreeSettings> {
        let mut s = base;

        if let Some(v) = self.read_parsed(config_keys::TREE_LEVEL_ORDER, parse_level_order)? {
            s.level_order = v;
        }
        if let Some(v) = self.read_parsed(config_keys::TREE_BOUNDARY, parse_number)? {
            s.tree_boundary = v;
        }
        if let Some(v) = self.read_parsed(config_keys::TREE_COLUMN_COUNT, parse_number)? {
            s.column_count = v;
        }
        if let Some(v) = self.read_parsed(config_keys::TREE_PARALLEL_NODES, parse_bool)? {
            s.parallel_nodes = v;
        }
        if let Some(v) = self.read_parsed(config_keys::TREE_KEY_STRATEGY, parse_key_strategy)? {
            s.key_strategy = v;
        }

        s.validate()?;
        Ok(s)
    }
}

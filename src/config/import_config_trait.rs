// ==========================================
// 表格导入框架 - 导入配置读取 Trait
// ==========================================
// 职责: 定义流水线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含流水线逻辑
// ==========================================

use crate::config::import_settings::{ImportSettings, TreeSettings};
use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 以存储中的配置覆写调用方给出的参数
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 读取导入参数
    ///
    /// # 参数
    /// - base: 调用方默认参数，未配置的键保持原值
    ///
    /// # 返回
    /// - Err(ConfigValueError): 配置值无法解析
    async fn load_import_settings(&self, base: ImportSettings) -> ImportResult<ImportSettings>;

    /// 读取树形导入参数（规则同上）
    async fn load_tree_settings(&self, base: TreeSettings) -> ImportResult<TreeSettings>;
}

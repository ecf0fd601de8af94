// ==========================================
// 表格导入框架 - 行上下文
// ==========================================
// 职责: 源数据行、行导入上下文、导入副作用意图、全量导入上下文
// ==========================================

use crate::domain::mapping::ColumnMapping;
use crate::domain::record::{Record, StoredRow};
use crate::domain::types::SectionType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 原始单元格矩阵（行优先）
pub type CellMatrix = Vec<Vec<String>>;

// ==========================================
// SourceRow - 预处理后的源数据行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    /// 在原始矩阵中的行下标（0 起）
    pub index: usize,
    pub cells: Vec<String>,
}

impl SourceRow {
    /// 面向用户的行号（1 起）
    pub fn line(&self) -> usize {
        self.index + 1
    }
}

// ==========================================
// 导入副作用意图
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertIntent {
    pub entity: String,
    pub row: StoredRow,
}

impl InsertIntent {
    pub fn new(entity: impl Into<String>, row: StoredRow) -> Self {
        Self {
            entity: entity.into(),
            row,
        }
    }

    /// 以记录自身的实体与字段构造插入意图
    pub fn from_record<R: Record>(record: &R) -> Self {
        Self::new(R::ENTITY, record.to_stored_row())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateIntent {
    pub entity: String,
    pub updates: StoredRow,
    pub wheres: StoredRow,
}

/// 单元导入后留给中间件（批量写入/SQL 脚本）消费的意图
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportEffect {
    pub insert: Option<InsertIntent>,
    pub update: Option<UpdateIntent>,
}

impl ImportEffect {
    pub fn is_empty(&self) -> bool {
        self.insert.is_none() && self.update.is_none()
    }
}

// ==========================================
// RowContext - 单行导入上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct RowContext<R> {
    section: SectionType,
    index: usize,
    cells: Vec<String>,
    record: R,
    effect: ImportEffect,
}

impl<R: Record> RowContext<R> {
    pub fn new(section: SectionType, row: SourceRow, record: R) -> Self {
        Self {
            section,
            index: row.index,
            cells: row.cells,
            record,
            effect: ImportEffect::default(),
        }
    }

    pub fn section(&self) -> &SectionType {
        &self.section
    }

    /// 原始矩阵行下标（0 起）
    pub fn index(&self) -> usize {
        self.index
    }

    /// 行号（1 起）
    pub fn line(&self) -> usize {
        self.index + 1
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn cell(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut R {
        &mut self.record
    }

    pub fn effect(&self) -> &ImportEffect {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut ImportEffect {
        &mut self.effect
    }

    /// 把当前记录登记为插入意图
    pub fn stage_insert(&mut self) {
        self.effect.insert = Some(InsertIntent::from_record(&self.record));
    }
}

// ==========================================
// WholeImportContext - 全量导入上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct WholeImportContext<R> {
    rows: Vec<RowContext<R>>,
    mapping: Arc<ColumnMapping>,
}

impl<R: Record> WholeImportContext<R> {
    pub fn new(rows: Vec<RowContext<R>>, mapping: Arc<ColumnMapping>) -> Self {
        Self { rows, mapping }
    }

    pub fn rows(&self) -> &[RowContext<R>] {
        &self.rows
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn take_rows(&mut self) -> Vec<RowContext<R>> {
        std::mem::take(&mut self.rows)
    }

    pub(crate) fn restore_rows(&mut self, mut rows: Vec<RowContext<R>>) {
        rows.sort_by_key(|r| r.index);
        self.rows = rows;
    }
}

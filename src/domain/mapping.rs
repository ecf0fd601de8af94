// ==========================================
// 表格导入框架 - 列映射
// ==========================================
// 职责: 记录字段 → 源列的映射描述与解析
// ==========================================

use crate::domain::record::{FieldSpec, RecordShape};
use crate::domain::types::{FieldKind, FormatCheckId};
use serde::{Deserialize, Serialize};

// ==========================================
// FieldDescriptor - 单字段映射描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// 字段在记录中的序号
    pub ordinal: usize,
    /// 字段名（同落库列名）
    pub name: String,
    pub kind: FieldKind,
    /// 源数据列号（0 起）
    pub column: usize,
    pub rewrite: bool,
    pub check: Option<String>,
    pub format: Option<FormatCheckId>,
    pub link: Option<String>,
}

// ==========================================
// ColumnMapping - 按字段序号排列的映射
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    entity: String,
    fields: Vec<FieldDescriptor>,
}

impl ColumnMapping {
    pub fn new(entity: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            entity: entity.into(),
            fields,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 覆盖全部映射列所需的最小列数
    pub fn min_column_count(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.column + 1)
            .max()
            .unwrap_or(0)
    }

    /// 需要回写源文件的字段
    pub fn rewrite_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.rewrite)
    }

    /// 带格式校验的字段
    pub fn format_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.format.is_some())
    }

    /// 比对分组键等于 key 的字段
    pub fn checked_fields<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |f| f.check.as_deref() == Some(key))
    }
}

// ==========================================
// ColumnMappingResolver Trait
// ==========================================
// 用途: 由记录形状推导列映射
// 实现者: DeclaredColumnResolver（按字段声明）
pub trait ColumnMappingResolver: Send + Sync {
    fn resolve(&self, shape: &RecordShape) -> ColumnMapping;
}

/// 按字段声明解析列映射
///
/// 显式 column 优先；未声明列号的字段取上一字段列号 + 1
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredColumnResolver;

impl DeclaredColumnResolver {
    fn descriptor(ordinal: usize, column: usize, spec: &FieldSpec) -> FieldDescriptor {
        FieldDescriptor {
            ordinal,
            name: spec.name.to_string(),
            kind: spec.kind,
            column,
            rewrite: spec.rewrite,
            check: spec.check.map(str::to_string),
            format: spec.format,
            link: spec.link.map(str::to_string),
        }
    }
}

impl ColumnMappingResolver for DeclaredColumnResolver {
    fn resolve(&self, shape: &RecordShape) -> ColumnMapping {
        let mut next = 0usize;
        let fields = shape
            .fields
            .iter()
            .enumerate()
            .map(|(ordinal, spec)| {
                let column = spec.column.unwrap_or(next);
                next = column + 1;
                Self::descriptor(ordinal, column, spec)
            })
            .collect();
        ColumnMapping::new(shape.entity, fields)
    }
}

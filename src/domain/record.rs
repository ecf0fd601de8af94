// ==========================================
// 表格导入框架 - 记录模型
// ==========================================
// 职责: 字段声明、字段类型转换、Record trait、落库行
// 说明: 不依赖反射，字段按声明序号读写
// ==========================================

use crate::domain::types::{FieldKind, FieldValue, FormatCheckId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// FieldSpec - 字段声明
// ==========================================
// column: 显式列号（None 时由解析器按声明顺序分配）
// rewrite: 导入后回写源文件
// check: 落库比对分组键
// format: 检查阶段的格式校验
// link: 关联目标标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub column: Option<usize>,
    pub rewrite: bool,
    pub check: Option<&'static str>,
    pub format: Option<FormatCheckId>,
    pub link: Option<&'static str>,
}

impl FieldSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            column: None,
            rewrite: false,
            check: None,
            format: None,
            link: None,
        }
    }

    pub const fn of_kind(self, kind: FieldKind) -> Self {
        Self { kind, ..self }
    }

    pub const fn column(self, column: usize) -> Self {
        Self {
            column: Some(column),
            ..self
        }
    }

    pub const fn rewrite(self) -> Self {
        Self {
            rewrite: true,
            ..self
        }
    }

    pub const fn check(self, key: &'static str) -> Self {
        Self {
            check: Some(key),
            ..self
        }
    }

    pub const fn format(self, id: FormatCheckId) -> Self {
        Self {
            format: Some(id),
            ..self
        }
    }

    pub const fn link(self, id: &'static str) -> Self {
        Self {
            link: Some(id),
            ..self
        }
    }
}

/// 字段赋值失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("字段 {field} 赋值失败: {message}")]
pub struct RecordFieldError {
    pub field: String,
    pub message: String,
}

// ==========================================
// FieldType - 字段类型与 FieldValue 互转
// ==========================================
pub trait FieldType: Sized {
    const KIND: FieldKind;

    fn to_value(&self) -> FieldValue;

    fn from_value(value: FieldValue) -> Result<Self, String>;
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: FieldValue) -> Result<Self, String> {
        match value {
            FieldValue::Text(s) => Ok(s),
            FieldValue::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_value(value: FieldValue) -> Result<Self, String> {
        match value {
            FieldValue::Null => Ok(0),
            other => other
                .as_i64()
                .ok_or_else(|| format!("{:?} 不是整数", other)),
        }
    }
}

impl FieldType for i32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_value(value: FieldValue) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{} 超出 i32 范围", wide))
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> FieldValue {
        FieldValue::Real(*self)
    }

    fn from_value(value: FieldValue) -> Result<Self, String> {
        match value {
            FieldValue::Null => Ok(0.0),
            other => other
                .as_f64()
                .ok_or_else(|| format!("{:?} 不是浮点数", other)),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn to_value(&self) -> FieldValue {
        match self {
            Some(v) => v.to_value(),
            None => FieldValue::Null,
        }
    }

    fn from_value(value: FieldValue) -> Result<Self, String> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ==========================================
// RecordShape - 记录形状（实体名 + 字段声明）
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RecordShape {
    pub entity: &'static str,
    pub fields: &'static [FieldSpec],
}

// ==========================================
// Record Trait
// ==========================================
// 用途: 每行（或每个树节点条目）物化出的类型化记录
// 实现者: 业务记录类型（通常由 impl_record! 生成）
pub trait Record: Default + Clone + Send + Sync + fmt::Debug + 'static {
    /// 落库实体名（表名）
    const ENTITY: &'static str;

    /// 字段声明（按序号）
    fn fields() -> &'static [FieldSpec];

    /// 读取第 ordinal 个字段
    fn get(&self, ordinal: usize) -> Option<FieldValue>;

    /// 写入第 ordinal 个字段
    fn set(&mut self, ordinal: usize, value: FieldValue) -> Result<(), RecordFieldError>;

    fn shape() -> RecordShape {
        RecordShape {
            entity: Self::ENTITY,
            fields: Self::fields(),
        }
    }

    /// 按字段名读取
    fn field_value(&self, name: &str) -> Option<FieldValue> {
        Self::fields()
            .iter()
            .position(|f| f.name == name)
            .and_then(|ordinal| self.get(ordinal))
    }

    /// 转为落库行（列名 = 字段名）
    fn to_stored_row(&self) -> StoredRow {
        let mut row = StoredRow::new();
        for (ordinal, spec) in Self::fields().iter().enumerate() {
            if let Some(value) = self.get(ordinal) {
                row.insert(spec.name, value);
            }
        }
        row
    }
}

/// 无记录形状的流水线使用的空记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRecord;

impl Record for NoRecord {
    const ENTITY: &'static str = "";

    fn fields() -> &'static [FieldSpec] {
        &[]
    }

    fn get(&self, _ordinal: usize) -> Option<FieldValue> {
        None
    }

    fn set(&mut self, ordinal: usize, _value: FieldValue) -> Result<(), RecordFieldError> {
        Err(RecordFieldError {
            field: ordinal.to_string(),
            message: "空记录没有字段".to_string(),
        })
    }
}

// ==========================================
// StoredRow - 落库行（列名 → 值，保持列顺序）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRow(IndexMap<String, FieldValue>);

impl StoredRow {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    /// 读取列值，缺失视为 Null
    pub fn value(&self, column: &str) -> FieldValue {
        self.0.get(column).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for StoredRow {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 为结构体生成 Record 实现
///
/// ```ignore
/// impl_record!(Person, "person", {
///     name: String => FieldSpec::new("name").column(0),
///     age: i64 => FieldSpec::new("age").format(FormatCheckId::Int),
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty, $entity:expr, { $( $field:ident : $fty:ty => $spec:expr ),* $(,)? }) => {
        impl $crate::domain::record::Record for $ty {
            const ENTITY: &'static str = $entity;

            fn fields() -> &'static [$crate::domain::record::FieldSpec] {
                const FIELDS: &[$crate::domain::record::FieldSpec] = &[
                    $( $spec.of_kind(<$fty as $crate::domain::record::FieldType>::KIND) ),*
                ];
                FIELDS
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn get(&self, ordinal: usize) -> Option<$crate::domain::types::FieldValue> {
                let mut current = 0usize;
                $(
                    if ordinal == current {
                        return Some($crate::domain::record::FieldType::to_value(&self.$field));
                    }
                    current += 1;
                )*
                None
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn set(
                &mut self,
                ordinal: usize,
                value: $crate::domain::types::FieldValue,
            ) -> Result<(), $crate::domain::record::RecordFieldError> {
                let mut current = 0usize;
                $(
                    if ordinal == current {
                        self.$field = <$fty as $crate::domain::record::FieldType>::from_value(value)
                            .map_err(|message| $crate::domain::record::RecordFieldError {
                                field: stringify!($field).to_string(),
                                message,
                            })?;
                        return Ok(());
                    }
                    current += 1;
                )*
                Err($crate::domain::record::RecordFieldError {
                    field: ordinal.to_string(),
                    message: "字段序号越界".to_string(),
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Person {
        name: String,
        age: i64,
        score: Option<f64>,
    }

    crate::impl_record!(Person, "person", {
        name: String => FieldSpec::new("name").column(0).check("on"),
        age: i64 => FieldSpec::new("age").format(FormatCheckId::Int),
        score: Option<f64> => FieldSpec::new("score").rewrite(),
    });

    #[test]
    fn test_fields_carry_kind_from_type() {
        let fields = Person::fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].kind, FieldKind::Text);
        assert_eq!(fields[1].kind, FieldKind::Integer);
        assert_eq!(fields[2].kind, FieldKind::Real);
        assert_eq!(fields[0].check, Some("on"));
        assert!(fields[2].rewrite);
    }

    #[test]
    fn test_get_set_by_ordinal() {
        let mut p = Person::default();
        p.set(0, FieldValue::Text("tom".into())).unwrap();
        p.set(1, FieldValue::Integer(20)).unwrap();
        p.set(2, FieldValue::Null).unwrap();
        assert_eq!(p.name, "tom");
        assert_eq!(p.age, 20);
        assert_eq!(p.score, None);
        assert_eq!(p.get(1), Some(FieldValue::Integer(20)));
        assert_eq!(p.get(3), None);
        assert!(p.set(3, FieldValue::Null).is_err());
        assert!(p.set(1, FieldValue::Text("abc".into())).is_err());
    }

    #[test]
    fn test_to_stored_row_keeps_declaration_order() {
        let p = Person {
            name: "a".into(),
            age: 1,
            score: Some(2.5),
        };
        let row = p.to_stored_row();
        let columns: Vec<&String> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["name", "age", "score"]);
        assert_eq!(row.value("score"), FieldValue::Real(2.5));
    }
}

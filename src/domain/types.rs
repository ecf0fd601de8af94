// ==========================================
// 表格导入框架 - 领域类型定义
// ==========================================
// 职责: 段类型、字段值、字段类型、格式校验标识、流水线阶段
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 段类型 (Section Type)
// ==========================================
// 识别器为每一行给出段类型，检查器/导入器按段类型注册
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionType(String);

impl SectionType {
    /// 单段导入使用的默认段名
    pub const ONE_SECTION: &'static str = "one_section";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// 单段导入的段类型
    pub fn one_section() -> Self {
        Self::new(Self::ONE_SECTION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SectionType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ==========================================
// 字段类型 (Field Kind)
// ==========================================
// 与 SQLite 存储类对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Real,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "文本"),
            FieldKind::Integer => write!(f, "整数"),
            FieldKind::Real => write!(f, "浮点数"),
        }
    }
}

// ==========================================
// 字段值 (Field Value)
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 按单元格文本与目标类型解析
    ///
    /// # 返回
    /// - Ok(FieldValue::Null): 空单元格
    /// - Err: 文本无法解析为目标类型
    pub fn parse_cell(cell: &str, kind: FieldKind) -> Result<FieldValue, String> {
        if cell.is_empty() {
            return Ok(match kind {
                FieldKind::Text => FieldValue::Text(String::new()),
                _ => FieldValue::Null,
            });
        }
        match kind {
            FieldKind::Text => Ok(FieldValue::Text(cell.to_string())),
            FieldKind::Integer => cell
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("{} 不为{}", cell, kind)),
            FieldKind::Real => cell
                .parse::<f64>()
                .map(FieldValue::Real)
                .map_err(|_| format!("{} 不为{}", cell, kind)),
        }
    }

    /// 落库值比对：整数与浮点按数值比较，其余要求完全一致
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Real(b))
            | (FieldValue::Real(b), FieldValue::Integer(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

// ==========================================
// 格式校验标识 (Format Check Id)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatCheckId {
    Int,
    Float,
    Url,
    Img,
    Cn,
    En,
    Pinyin,
    Hash,
}

impl FormatCheckId {
    /// 由标签文本解析（int/float/url/img/cn/en/pinyin/hash）
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "int" => Some(FormatCheckId::Int),
            "float" => Some(FormatCheckId::Float),
            "url" => Some(FormatCheckId::Url),
            "img" => Some(FormatCheckId::Img),
            "cn" => Some(FormatCheckId::Cn),
            "en" => Some(FormatCheckId::En),
            "pinyin" => Some(FormatCheckId::Pinyin),
            "hash" => Some(FormatCheckId::Hash),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FormatCheckId::Int => "int",
            FormatCheckId::Float => "float",
            FormatCheckId::Url => "url",
            FormatCheckId::Img => "img",
            FormatCheckId::Cn => "cn",
            FormatCheckId::En => "en",
            FormatCheckId::Pinyin => "pinyin",
            FormatCheckId::Hash => "hash",
        }
    }
}

impl fmt::Display for FormatCheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ==========================================
// 流水线阶段 (Pipeline Stage)
// ==========================================
// Idle → Parsed → Checked → Imported → Finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Idle,
    Parsed,
    Checked,
    Imported,
    Finalized,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Idle => write!(f, "IDLE"),
            PipelineStage::Parsed => write!(f, "PARSED"),
            PipelineStage::Checked => write!(f, "CHECKED"),
            PipelineStage::Imported => write!(f, "IMPORTED"),
            PipelineStage::Finalized => write!(f, "FINALIZED"),
        }
    }
}

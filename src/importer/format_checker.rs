// ==========================================
// 表格导入框架 - 字段格式校验
// ==========================================
// 职责: 检查阶段按字段声明的格式标识逐格校验
// 规则: 空单元格一律通过
// ==========================================

use crate::domain::mapping::ColumnMapping;
use crate::domain::types::FormatCheckId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

static IMAGE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(jpg|jpeg|png|gif|bmp)$").expect("valid image regex"));
static PINYIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Zāáǎàēéěèīíǐìōóǒòūúǔùǖǘǚǜü]+$").expect("valid pinyin regex")
});
static HAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Han}").expect("valid han regex"));
static LATIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Latin}").expect("valid latin regex"));
// md5 / sha1 / sha256
static HASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-f0-9]{32}|[a-f0-9]{40}|[a-f0-9]{64})$").expect("valid hash regex")
});

/// 单个字段的格式违规
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub column: usize,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "第{}列({}) 内容 {} 错误: {}",
            self.column + 1,
            self.field,
            self.value,
            self.reason
        )
    }
}

/// 校验单个值
///
/// # 返回
/// - Err(String): 违规原因
pub fn check_value(id: FormatCheckId, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    match id {
        FormatCheckId::Int => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| "不是整数".to_string()),
        FormatCheckId::Float => value
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| "不是浮点数".to_string()),
        FormatCheckId::Url => check_url(value),
        FormatCheckId::Img => {
            check_url(value)?;
            if IMAGE_SUFFIX.is_match(value) {
                Ok(())
            } else {
                Err("不是图片链接".to_string())
            }
        }
        FormatCheckId::Cn => {
            if HAN.is_match(value) {
                Ok(())
            } else {
                Err("不含中文".to_string())
            }
        }
        FormatCheckId::En => {
            if LATIN.is_match(value) {
                Ok(())
            } else {
                Err("不含英文".to_string())
            }
        }
        FormatCheckId::Pinyin => {
            let compact = value.replace(' ', "");
            if PINYIN.is_match(&compact) {
                Ok(())
            } else {
                Err("不是拼音".to_string())
            }
        }
        FormatCheckId::Hash => {
            if HASH.is_match(value) {
                Ok(())
            } else {
                Err("不是 md5/sha1/sha256 摘要".to_string())
            }
        }
    }
}

fn check_url(value: &str) -> Result<(), String> {
    match Url::parse(value) {
        Ok(u) if !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()) => Ok(()),
        _ => Err("不是合法链接".to_string()),
    }
}

/// 按列映射校验一行，返回全部违规
pub fn check_row(mapping: &ColumnMapping, cells: &[String]) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    for field in mapping.format_fields() {
        let Some(id) = field.format else { continue };
        let value = cells.get(field.column).map(String::as_str).unwrap_or("");
        if let Err(reason) = check_value(id, value) {
            violations.push(FieldViolation {
                field: field.name.clone(),
                column: field.column,
                value: value.to_string(),
                reason,
            });
        }
    }
    violations
}

/// 违规列表拼接为一条消息
pub fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::{ColumnMappingResolver, DeclaredColumnResolver};
    use crate::domain::record::{FieldSpec, RecordShape};

    #[test]
    fn test_numeric_checks() {
        assert!(check_value(FormatCheckId::Int, "12").is_ok());
        assert!(check_value(FormatCheckId::Int, "1.5").is_err());
        assert!(check_value(FormatCheckId::Float, "1.5").is_ok());
        assert!(check_value(FormatCheckId::Float, "abc").is_err());
        assert!(check_value(FormatCheckId::Int, "").is_ok());
    }

    #[test]
    fn test_url_and_image_checks() {
        assert!(check_value(FormatCheckId::Url, "https://example.com/a").is_ok());
        assert!(check_value(FormatCheckId::Url, "example.com").is_err());
        assert!(check_value(FormatCheckId::Img, "http://cdn.example.com/a.png").is_ok());
        assert!(check_value(FormatCheckId::Img, "http://cdn.example.com/a.txt").is_err());
    }

    #[test]
    fn test_text_checks() {
        assert!(check_value(FormatCheckId::Cn, "abc中").is_ok());
        assert!(check_value(FormatCheckId::Cn, "abc").is_err());
        assert!(check_value(FormatCheckId::En, "中a").is_ok());
        assert!(check_value(FormatCheckId::En, "中文").is_err());
        assert!(check_value(FormatCheckId::Pinyin, "zhōng guó").is_ok());
        assert!(check_value(FormatCheckId::Pinyin, "中国").is_err());
    }

    #[test]
    fn test_hash_check() {
        assert!(check_value(FormatCheckId::Hash, "d41d8cd98f00b204e9800998ecf8427e").is_ok());
        assert!(check_value(
            FormatCheckId::Hash,
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        )
        .is_ok());
        assert!(check_value(FormatCheckId::Hash, "D41D8CD98F00B204E9800998ECF8427E").is_err());
        assert!(check_value(FormatCheckId::Hash, "abc").is_err());
    }

    #[test]
    fn test_check_row_collects_all_violations() {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::new("name").format(FormatCheckId::Cn),
            FieldSpec::new("age").format(FormatCheckId::Int),
            FieldSpec::new("memo"),
        ];
        let mapping = DeclaredColumnResolver.resolve(&RecordShape {
            entity: "person",
            fields: FIELDS,
        });
        let cells: Vec<String> = ["tom", "x", "whatever"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let violations = check_row(&mapping, &cells);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[1].column, 1);
        assert!(describe(&violations).contains("第2列(age)"));
    }
}

// ==========================================
// 表格导入框架 - SQL 构建工具
// ==========================================
// 职责: 标识符转义、字面量渲染、INSERT/UPDATE 语句生成
// 说明: 字面量语句仅用于批量写入与 SQL 脚本，单条写入走参数化
// ==========================================

use crate::domain::record::StoredRow;
use crate::domain::types::FieldValue;

/// 标识符加双引号并转义内部双引号
///
/// # 示例
/// ```
/// use sheet_import::repository::sql_builder::quote_ident;
/// assert_eq!(quote_ident("person"), "\"person\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// 渲染 SQL 字面量
///
/// - Null → NULL
/// - 文本单引号转义
/// - 非有限浮点数按 NULL 处理
pub fn sql_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "NULL".to_string(),
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Real(v) if v.is_finite() => {
            let s = v.to_string();
            if s.contains(['.', 'e', 'E']) {
                s
            } else {
                format!("{}.0", s)
            }
        }
        FieldValue::Real(_) => "NULL".to_string(),
        FieldValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// 生成 INSERT 字面量语句（以分号结尾）
///
/// 空行生成 `DEFAULT VALUES`
pub fn insert_statement(entity: &str, row: &StoredRow) -> String {
    if row.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES;", quote_ident(entity));
    }
    let columns: Vec<String> = row.iter().map(|(c, _)| quote_ident(c)).collect();
    let values: Vec<String> = row.iter().map(|(_, v)| sql_literal(v)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(entity),
        columns.join(", "),
        values.join(", ")
    )
}

/// 生成 UPDATE 字面量语句（以分号结尾）
///
/// wheres 为空时更新全表；Null 条件渲染为 IS NULL
pub fn update_statement(entity: &str, updates: &StoredRow, wheres: &StoredRow) -> String {
    let sets: Vec<String> = updates
        .iter()
        .map(|(c, v)| format!("{} = {}", quote_ident(c), sql_literal(v)))
        .collect();
    let mut sql = format!("UPDATE {} SET {}", quote_ident(entity), sets.join(", "));
    if !wheres.is_empty() {
        let conds: Vec<String> = wheres
            .iter()
            .map(|(c, v)| match v {
                FieldValue::Null => format!("{} IS NULL", quote_ident(c)),
                other => format!("{} = {}", quote_ident(c), sql_literal(other)),
            })
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }
    sql.push(';');
    sql
}

/// 生成参数化 INSERT（`?` 占位）
pub fn insert_placeholders(entity: &str, row: &StoredRow) -> String {
    if row.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(entity));
    }
    let columns: Vec<String> = row.iter().map(|(c, _)| quote_ident(c)).collect();
    let marks = vec!["?"; row.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(entity),
        columns.join(", "),
        marks
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_literals() {
        let row = StoredRow::new()
            .with("name", "O'Neil")
            .with("age", 30i64)
            .with("score", 2.0f64)
            .with("memo", FieldValue::Null);
        assert_eq!(
            insert_statement("person", &row),
            "INSERT INTO \"person\" (\"name\", \"age\", \"score\", \"memo\") VALUES ('O''Neil', 30, 2.0, NULL);"
        );
        assert_eq!(
            insert_statement("person", &StoredRow::new()),
            "INSERT INTO \"person\" DEFAULT VALUES;"
        );
    }

    #[test]
    fn test_update_statement_conditions() {
        let updates = StoredRow::new().with("price", 9.5f64);
        let wheres = StoredRow::new()
            .with("name", "apple")
            .with("deleted_at", FieldValue::Null);
        assert_eq!(
            update_statement("product", &updates, &wheres),
            "UPDATE \"product\" SET \"price\" = 9.5 WHERE \"name\" = 'apple' AND \"deleted_at\" IS NULL;"
        );
    }

    #[test]
    fn test_insert_placeholders() {
        let row = StoredRow::new().with("a", 1i64).with("b", "x");
        assert_eq!(
            insert_placeholders("t", &row),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES (?, ?)"
        );
    }
}
